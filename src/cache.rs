//! # Entrypoint Cache
//!
//! Memoizes image default commands by manifest digest so repeated runs of
//! digest-pinned images never touch the registry.
//!
//! ## Lookup Rules
//!
//! | Reference | Cached digest | Action |
//! |-----------|---------------|--------|
//! | `img@sha256:..` | yes | return cached command, no network |
//! | `img@sha256:..` | no | fetch, populate, return |
//! | `img:tag` / `img` | any | always fetch (tags are mutable), populate |
//!
//! Eviction is least-recently-used at a fixed capacity. No retries happen
//! here; a failed lookup is returned to the caller as-is.
//!
//! ## Thread Safety
//!
//! The LRU sits behind a mutex held only for the get/put itself, never
//! across a network call. Two concurrent misses for the same image may both
//! fetch; the second put overwrites the first with identical data.

use crate::constants::DEFAULT_ENTRYPOINT_CACHE_SIZE;
use crate::error::{Error, Result};
use crate::registry::{ImageCommand, ImageSource, Keychain, parse_reference, pinned_reference};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// An image resolved to its default command and digest-pinned reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// The image's declared default command.
    pub command: ImageCommand,
    /// `registry/repository@digest`.
    pub pinned: String,
}

/// Resolves the command an image runs when none is given.
#[async_trait]
pub trait EntrypointResolver: Send + Sync {
    /// Looks up `image` using the credentials of `service_account` in
    /// `namespace`.
    async fn get(&self, image: &str, namespace: &str, service_account: &str)
    -> Result<ResolvedImage>;
}

/// Digest-keyed LRU cache in front of a registry.
pub struct EntrypointCache {
    source: Arc<dyn ImageSource>,
    keychain: Arc<dyn Keychain>,
    lru: Mutex<LruCache<String, ImageCommand>>,
}

impl EntrypointCache {
    /// Creates a cache holding [`DEFAULT_ENTRYPOINT_CACHE_SIZE`] digests.
    pub fn new(source: Arc<dyn ImageSource>, keychain: Arc<dyn Keychain>) -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_ENTRYPOINT_CACHE_SIZE)
            .unwrap_or(NonZeroUsize::MIN);
        Self::build(source, keychain, capacity)
    }

    /// Creates a cache with an explicit capacity.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `capacity` is zero.
    pub fn with_capacity(
        source: Arc<dyn ImageSource>,
        keychain: Arc<dyn Keychain>,
        capacity: usize,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidInput("entrypoint cache capacity must be non-zero".to_string())
        })?;
        Ok(Self::build(source, keychain, capacity))
    }

    fn build(
        source: Arc<dyn ImageSource>,
        keychain: Arc<dyn Keychain>,
        capacity: NonZeroUsize,
    ) -> Self {
        Self {
            source,
            keychain,
            lru: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached digests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `digest` is cached. Does not touch recency.
    pub fn contains(&self, digest: &str) -> bool {
        self.lock().contains(digest)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, ImageCommand>> {
        match self.lru.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EntrypointResolver for EntrypointCache {
    async fn get(
        &self,
        image: &str,
        namespace: &str,
        service_account: &str,
    ) -> Result<ResolvedImage> {
        let reference = parse_reference(image)?;

        if let Some(digest) = reference.digest() {
            let cached = self.lock().get(digest).cloned();
            if let Some(command) = cached {
                debug!("Entrypoint cache hit for {}", digest);
                return Ok(ResolvedImage {
                    command,
                    pinned: pinned_reference(&reference, digest),
                });
            }
        }

        let auth = self
            .keychain
            .resolve(namespace, service_account, &reference)
            .await?;
        let fetched = self.source.fetch(&reference, &auth).await?;
        info!("Resolved entrypoint for {} ({})", image, fetched.digest);

        self.lock()
            .put(fetched.digest.clone(), fetched.command.clone());

        Ok(ResolvedImage {
            pinned: pinned_reference(&reference, &fetched.digest),
            command: fetched.command,
        })
    }
}
