//! Rollout plans
//!
//! A plan is an immutable list of weight snapshots. Each one sums to exactly
//! 100, so the invariant can be checked without looking at timing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use strata_core::domain::rollout::WeightSnapshot;

/// Snapshot `k` of `steps` between `current` and `target`
///
/// Each weight is linearly interpolated and rounded half away from zero. The
/// rounding remainder is then added to the largest weight (lowest name on
/// ties) so the snapshot sums to exactly 100.
pub fn interpolate(
    current: &BTreeMap<String, u8>,
    target: &BTreeMap<String, u8>,
    k: u32,
    steps: u32,
) -> BTreeMap<String, u8> {
    let names: BTreeSet<&String> = current.keys().chain(target.keys()).collect();
    let n = i64::from(steps.max(1));
    let k = i64::from(k.min(steps));

    let mut weights: BTreeMap<String, i64> = names
        .into_iter()
        .map(|name| {
            let from = i64::from(current.get(name).copied().unwrap_or(0));
            let to = i64::from(target.get(name).copied().unwrap_or(0));
            // from + (to - from) * k / n, never negative
            let numerator = from * n + (to - from) * k;
            let rounded = (2 * numerator + n) / (2 * n);
            (name.clone(), rounded)
        })
        .collect();

    let mut remainder = 100 - weights.values().sum::<i64>();
    while remainder != 0 {
        let Some(name) = largest_adjustable(&weights, remainder) else {
            break;
        };
        let weight = weights.entry(name).or_insert(0);
        let adjusted = (*weight + remainder).clamp(0, 100);
        remainder -= adjusted - *weight;
        *weight = adjusted;
    }

    weights
        .into_iter()
        .map(|(name, weight)| (name, weight.clamp(0, 100) as u8))
        .collect()
}

/// Largest weight that can still absorb `remainder`; lowest name wins ties
fn largest_adjustable(weights: &BTreeMap<String, i64>, remainder: i64) -> Option<String> {
    let mut best: Option<(&String, i64)> = None;
    for (name, weight) in weights {
        let can_absorb = if remainder > 0 { *weight < 100 } else { *weight > 0 };
        if !can_absorb {
            continue;
        }
        // BTreeMap iterates by name, so strict ">" keeps the lowest name on ties
        match best {
            Some((_, w)) if *weight <= w => {}
            _ => best = Some((name, *weight)),
        }
    }
    best.map(|(name, _)| name.clone())
}

/// Marks an endpoint as having an in-flight plan until dropped
#[derive(Debug)]
pub(crate) struct EndpointLease {
    endpoint: String,
    registry: Arc<Mutex<HashSet<String>>>,
}

impl EndpointLease {
    /// Takes the lease, `None` if another plan already holds it
    pub(crate) fn acquire(registry: &Arc<Mutex<HashSet<String>>>, endpoint: &str) -> Option<Self> {
        let mut held = registry.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(endpoint.to_string()) {
            return None;
        }
        Some(Self {
            endpoint: endpoint.to_string(),
            registry: Arc::clone(registry),
        })
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        let mut held = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.endpoint);
    }
}

/// Ordered weight snapshots from the current to the target distribution
///
/// Owned exclusively by the controller driving the endpoint; the endpoint
/// stays locked against other plans until the plan is dropped.
#[derive(Debug)]
pub struct RolloutPlan {
    endpoint: String,
    snapshots: Vec<WeightSnapshot>,
    next: usize,
    last_committed: Option<WeightSnapshot>,
    committed_steps: usize,
    _lease: EndpointLease,
}

impl RolloutPlan {
    pub(crate) fn new(
        endpoint: String,
        snapshots: Vec<WeightSnapshot>,
        initial: Option<WeightSnapshot>,
        lease: EndpointLease,
    ) -> Self {
        Self {
            endpoint,
            snapshots,
            next: 0,
            last_committed: initial,
            committed_steps: 0,
            _lease: lease,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn snapshots(&self) -> &[WeightSnapshot] {
        &self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Next snapshot to commit, `None` once the plan is exhausted
    pub fn advance(&mut self) -> Option<WeightSnapshot> {
        let snapshot = self.snapshots.get(self.next).cloned()?;
        self.next += 1;
        Some(snapshot)
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.snapshots.len()
    }

    /// Last snapshot known to be live at the backend
    pub fn last_committed(&self) -> Option<&WeightSnapshot> {
        self.last_committed.as_ref()
    }

    pub fn committed_steps(&self) -> usize {
        self.committed_steps
    }

    pub(crate) fn record_commit(&mut self, snapshot: WeightSnapshot) {
        self.last_committed = Some(snapshot);
        self.committed_steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, u8)]) -> BTreeMap<String, u8> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn sum(w: &BTreeMap<String, u8>) -> u32 {
        w.values().map(|v| *v as u32).sum()
    }

    #[test]
    fn test_blue_green_in_three_steps() {
        let current = weights(&[("blue", 100), ("green", 0)]);
        let target = weights(&[("blue", 50), ("green", 50)]);

        let snapshots: Vec<_> = (1..=3).map(|k| interpolate(&current, &target, k, 3)).collect();

        assert_eq!(snapshots[0], weights(&[("blue", 83), ("green", 17)]));
        assert_eq!(snapshots[1], weights(&[("blue", 67), ("green", 33)]));
        assert_eq!(snapshots[2], target);
        assert!(snapshots.iter().all(|s| sum(s) == 100));
    }

    #[test]
    fn test_remainder_goes_to_largest_weight() {
        // 100/3 each: every weight rounds to 33, one point is missing
        let current = weights(&[("a", 100), ("b", 0), ("c", 0)]);
        let target = weights(&[("a", 0), ("b", 50), ("c", 50)]);
        let snap = interpolate(&current, &target, 2, 3);
        // a=33.3 -> 33, b=33.3 -> 33, c=33.3 -> 33; tie broken by lowest name
        assert_eq!(snap, weights(&[("a", 34), ("b", 33), ("c", 33)]));
    }

    #[test]
    fn test_every_snapshot_sums_to_100() {
        let current = weights(&[("a", 40), ("b", 35), ("c", 25), ("d", 0)]);
        let target = weights(&[("a", 0), ("b", 10), ("c", 45), ("d", 45)]);
        for steps in 1..=13 {
            for k in 1..=steps {
                let snap = interpolate(&current, &target, k, steps);
                assert_eq!(sum(&snap), 100, "k={} steps={}", k, steps);
            }
            assert_eq!(interpolate(&current, &target, steps, steps), target);
        }
    }

    #[test]
    fn test_many_small_targets_stay_in_range() {
        let names: Vec<String> = (0..20).map(|i| format!("t{:02}", i)).collect();
        let current: BTreeMap<String, u8> = names.iter().map(|n| (n.clone(), 5)).collect();
        let mut target: BTreeMap<String, u8> = names.iter().map(|n| (n.clone(), 0)).collect();
        target.insert("t00".into(), 100);

        for k in 1..=7 {
            let snap = interpolate(&current, &target, k, 7);
            assert_eq!(sum(&snap), 100);
        }
    }

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let registry = Arc::new(Mutex::new(HashSet::new()));
        let lease = EndpointLease::acquire(&registry, "ep").unwrap();
        assert!(EndpointLease::acquire(&registry, "ep").is_none());
        assert!(EndpointLease::acquire(&registry, "other").is_some());
        drop(lease);
        assert!(EndpointLease::acquire(&registry, "ep").is_some());
    }
}
