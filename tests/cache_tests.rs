//! Tests for the entrypoint cache.
//!
//! Uses an in-memory `ImageSource` that counts fetches, so cache hits and
//! misses can be observed without a registry.

use async_trait::async_trait;
use oci_distribution::Reference;
use oci_distribution::secrets::RegistryAuth;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use steprun::cache::{EntrypointCache, EntrypointResolver};
use steprun::registry::{AnonymousKeychain, FetchedImage, ImageCommand, ImageSource, Keychain};
use steprun::Error;

// =============================================================================
// Test Helpers
// =============================================================================

const DIGEST_A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const DIGEST_B: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const TAG_DIGEST: &str = "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

/// Returns the addressed digest (or `TAG_DIGEST` for tags) and a command
/// naming the repository.
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for CountingSource {
    async fn fetch(&self, reference: &Reference, _: &RegistryAuth) -> steprun::Result<FetchedImage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ImageLookupFailed {
                reference: reference.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(FetchedImage {
            digest: reference.digest().unwrap_or(TAG_DIGEST).to_string(),
            command: ImageCommand::entrypoint([format!("/{}", reference.repository())]),
        })
    }
}

/// Records the identity every lookup was made under.
#[derive(Default)]
struct RecordingKeychain(Mutex<Vec<(String, String)>>);

#[async_trait]
impl Keychain for RecordingKeychain {
    async fn resolve(&self, namespace: &str, sa: &str, _: &Reference) -> steprun::Result<RegistryAuth> {
        self.0
            .lock()
            .unwrap()
            .push((namespace.to_string(), sa.to_string()));
        Ok(RegistryAuth::Anonymous)
    }
}

fn cache(source: &Arc<CountingSource>, capacity: usize) -> EntrypointCache {
    EntrypointCache::with_capacity(source.clone(), Arc::new(AnonymousKeychain), capacity).unwrap()
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[tokio::test]
async fn test_digest_lookup_fetches_once() {
    let source = Arc::new(CountingSource::default());
    let cache = cache(&source, 8);
    let image = format!("registry.example.com/app@{}", DIGEST_A);

    let first = cache.get(&image, "ns", "sa").await.unwrap();
    let second = cache.get(&image, "ns", "sa").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.command.entrypoint, vec!["/app"]);
    assert_eq!(first.pinned, image);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_tag_lookup_always_fetches() {
    let source = Arc::new(CountingSource::default());
    let cache = cache(&source, 8);

    for _ in 0..3 {
        let got = cache.get("registry.example.com/app:v1", "ns", "sa").await.unwrap();
        assert_eq!(got.pinned, format!("registry.example.com/app@{}", TAG_DIGEST));
    }
    assert_eq!(source.fetches(), 3);
    assert!(cache.contains(TAG_DIGEST));
}

#[tokio::test]
async fn test_tag_lookup_populates_digest_entry() {
    let source = Arc::new(CountingSource::default());
    let cache = cache(&source, 8);

    cache.get("registry.example.com/app:v1", "ns", "sa").await.unwrap();
    let pinned = format!("registry.example.com/app@{}", TAG_DIGEST);
    let got = cache.get(&pinned, "ns", "sa").await.unwrap();

    assert_eq!(got.command.entrypoint, vec!["/app"]);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_lru_eviction() {
    let source = Arc::new(CountingSource::default());
    let cache = cache(&source, 1);
    let a = format!("registry.example.com/a@{}", DIGEST_A);
    let b = format!("registry.example.com/b@{}", DIGEST_B);

    cache.get(&a, "ns", "sa").await.unwrap();
    cache.get(&b, "ns", "sa").await.unwrap();
    assert!(!cache.contains(DIGEST_A));
    assert!(cache.contains(DIGEST_B));
    assert_eq!(cache.len(), 1);

    cache.get(&a, "ns", "sa").await.unwrap();
    assert_eq!(source.fetches(), 3);
}

#[tokio::test]
async fn test_identity_passed_to_keychain() {
    let source = Arc::new(CountingSource::default());
    let keychain = Arc::new(RecordingKeychain::default());
    let cache = EntrypointCache::new(source.clone(), keychain.clone());

    cache.get("registry.example.com/app:v1", "team-a", "builder").await.unwrap();

    assert_eq!(
        *keychain.0.lock().unwrap(),
        vec![("team-a".to_string(), "builder".to_string())]
    );
}

// =============================================================================
// Error Tests
// =============================================================================

#[tokio::test]
async fn test_fetch_failure_not_cached() {
    let source = Arc::new(CountingSource {
        fail: true,
        ..Default::default()
    });
    let cache = cache(&source, 8);
    let image = format!("registry.example.com/app@{}", DIGEST_A);

    let err = cache.get(&image, "ns", "sa").await.unwrap_err();
    assert!(matches!(err, Error::ImageLookupFailed { .. }));
    assert!(cache.is_empty());

    cache.get(&image, "ns", "sa").await.unwrap_err();
    assert_eq!(source.fetches(), 2, "no retry inside a lookup");
}

#[tokio::test]
async fn test_invalid_reference_never_fetches() {
    let source = Arc::new(CountingSource::default());
    let cache = cache(&source, 8);

    let err = cache.get("not a reference", "ns", "sa").await.unwrap_err();
    assert!(matches!(err, Error::InvalidImageReference { .. }));
    assert_eq!(source.fetches(), 0);
}

#[test]
fn test_zero_capacity_rejected() {
    let source = Arc::new(CountingSource::default());
    let result = EntrypointCache::with_capacity(source, Arc::new(AnonymousKeychain), 0);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
