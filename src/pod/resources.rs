//! Step resource aggregation.
//!
//! Steps run one at a time, so the pod only needs the largest request of
//! each tracked resource. The whole maximum is placed on the first step and
//! every other step requests zero. Sidecars are never passed here.

use crate::constants::AGGREGATED_RESOURCES;
use crate::spec::{Container, Quantity};
use std::collections::BTreeMap;
use tracing::debug;

/// Moves the per-resource maximum request onto the first step.
///
/// A single step, or steps with no positive request for any tracked
/// resource, are returned unchanged. Limits are never touched.
pub fn set_resources(mut steps: Vec<Container>) -> Vec<Container> {
    if steps.len() < 2 {
        return steps;
    }

    let mut max: BTreeMap<&str, Quantity> = BTreeMap::new();
    for step in &steps {
        for name in AGGREGATED_RESOURCES {
            let Some(q) = step.resources.requests.get(name) else {
                continue;
            };
            if q.is_zero() {
                continue;
            }
            if max.get(name).is_none_or(|cur| q > cur) {
                max.insert(name, q.clone());
            }
        }
    }

    if max.is_empty() {
        return steps;
    }
    debug!("Aggregated step requests: {:?}", max);

    for (i, step) in steps.iter_mut().enumerate() {
        for name in AGGREGATED_RESOURCES {
            let q = if i == 0 {
                match max.get(name) {
                    Some(q) => q.clone(),
                    None => continue,
                }
            } else {
                Quantity::zero()
            };
            step.resources.requests.insert(name.to_string(), q);
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY};
    use crate::spec::ResourceRequirements;

    fn step(requests: &[(&str, &str)]) -> Container {
        Container {
            resources: ResourceRequirements::with_requests(requests.iter().copied()).unwrap(),
            ..Container::new("img")
        }
    }

    fn request<'a>(c: &'a Container, name: &str) -> Option<&'a str> {
        c.resources.requests.get(name).map(Quantity::as_str)
    }

    #[test]
    fn test_single_step_unchanged() {
        let steps = vec![step(&[(RESOURCE_CPU, "2")])];
        assert_eq!(set_resources(steps.clone()), steps);
    }

    #[test]
    fn test_no_requests_unchanged() {
        let steps = vec![
            step(&[]),
            step(&[(RESOURCE_MEMORY, "0Gi")]),
            step(&[(RESOURCE_CPU, "0"), (RESOURCE_EPHEMERAL_STORAGE, "0.0")]),
        ];
        assert_eq!(set_resources(steps.clone()), steps);
    }

    #[test]
    fn test_max_moves_to_first_step() {
        let steps = vec![
            step(&[]),
            step(&[(RESOURCE_CPU, "8"), (RESOURCE_MEMORY, "10Mi")]),
            step(&[(RESOURCE_CPU, "2"), (RESOURCE_MEMORY, "1.9Gi")]),
        ];
        let got = set_resources(steps);

        assert_eq!(request(&got[0], RESOURCE_CPU), Some("8"));
        assert_eq!(request(&got[0], RESOURCE_MEMORY), Some("1.9Gi"));
        assert_eq!(request(&got[0], RESOURCE_EPHEMERAL_STORAGE), None);

        for c in &got[1..] {
            for name in AGGREGATED_RESOURCES {
                assert_eq!(request(c, name), Some("0"));
            }
        }
    }

    #[test]
    fn test_compares_by_value_not_text() {
        let steps = vec![step(&[(RESOURCE_CPU, "1500m")]), step(&[(RESOURCE_CPU, "2")])];
        let got = set_resources(steps);
        assert_eq!(request(&got[0], RESOURCE_CPU), Some("2"));
    }

    #[test]
    fn test_untracked_resources_kept() {
        let steps = vec![
            step(&[("nvidia.com/gpu", "1")]),
            step(&[(RESOURCE_CPU, "1")]),
        ];
        let got = set_resources(steps);
        assert_eq!(request(&got[0], "nvidia.com/gpu"), Some("1"));
        assert_eq!(request(&got[0], RESOURCE_CPU), Some("1"));
        assert_eq!(request(&got[1], RESOURCE_CPU), Some("0"));
    }
}
