//! Three-way partition of a requested child set against the appliance's current one.

use crate::model::{
    Binding, Certificate, HealthMonitor, PersistenceProfile, Pool, PoolGroup, VirtualServer,
};
use std::collections::HashSet;

/// How an item is matched between the requested and the current set.
pub trait Identity {
    /// Stable key; empty means "not created yet".
    fn identity(&self) -> String;

    fn declared_name(&self) -> &str;

    /// Takes over the identity of a same-named item that already exists.
    fn adopt_identity(&mut self, existing: &Self);
}

macro_rules! identity_by_uuid {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                fn identity(&self) -> String {
                    self.source_uuid.clone()
                }

                fn declared_name(&self) -> &str {
                    &self.name
                }

                fn adopt_identity(&mut self, existing: &Self) {
                    self.source_uuid = existing.source_uuid.clone();
                }
            }
        )*
    };
}

identity_by_uuid!(Certificate, HealthMonitor, PersistenceProfile, Pool, PoolGroup, VirtualServer);

impl Identity for Binding {
    fn identity(&self) -> String {
        self.key()
    }

    fn declared_name(&self) -> &str {
        &self.server.ip
    }

    fn adopt_identity(&mut self, _existing: &Self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    /// Requested items with no identity, or with one the current set does not know.
    pub added: Vec<T>,
    /// Current items the request no longer mentions.
    pub removed: Vec<T>,
    /// Requested items whose identity is present in both sets. Matched on presence only,
    /// so an unchanged item is still rewritten.
    pub updated: Vec<T>,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

pub fn diff<T: Identity + Clone>(requested: &[T], source: &[T]) -> Partition<T> {
    let known: HashSet<String> = source
        .iter()
        .map(Identity::identity)
        .filter(|id| !id.is_empty())
        .collect();
    let wanted: HashSet<String> = requested
        .iter()
        .map(Identity::identity)
        .filter(|id| !id.is_empty())
        .collect();

    let mut partition = Partition::default();
    for item in requested {
        let id = item.identity();
        if !id.is_empty() && known.contains(&id) {
            partition.updated.push(item.clone());
        } else {
            partition.added.push(item.clone());
        }
    }
    for item in source {
        let id = item.identity();
        if id.is_empty() || !wanted.contains(&id) {
            partition.removed.push(item.clone());
        }
    }
    partition
}

/// Gives requested items without identity the identity of a same-named current item,
/// so re-applying a declaration by name updates instead of duplicating.
pub fn adopt_by_name<T: Identity>(requested: &mut [T], source: &[T]) {
    for item in requested.iter_mut().filter(|i| i.identity().is_empty()) {
        if let Some(existing) = source
            .iter()
            .find(|s| s.declared_name() == item.declared_name() && !s.identity().is_empty())
        {
            item.adopt_identity(existing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MonitorType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn monitor(name: &str, uuid: &str) -> HealthMonitor {
        let mut m = HealthMonitor::new(name, MonitorType::Http);
        m.source_uuid = uuid.into();
        m
    }

    #[test]
    fn test_partition_rules() {
        let source = vec![monitor("a", "u-a"), monitor("b", "u-b")];
        let requested = vec![monitor("a", "u-a"), monitor("c", ""), monitor("x", "u-x")];

        let p = diff(&requested, &source);
        assert_eq!(p.updated, vec![monitor("a", "u-a")]);
        assert_eq!(p.added, vec![monitor("c", ""), monitor("x", "u-x")]);
        assert_eq!(p.removed, vec![monitor("b", "u-b")]);
    }

    #[test]
    fn test_bindings_match_on_ip_and_port() {
        let source = vec![Binding::new("10.0.0.5", 80), Binding::new("10.0.0.6", 80)];
        let requested = vec![Binding::new("10.0.0.5", 80), Binding::new("10.0.0.6", 8080)];

        let p = diff(&requested, &source);
        assert_eq!(p.updated, vec![Binding::new("10.0.0.5", 80)]);
        assert_eq!(p.added, vec![Binding::new("10.0.0.6", 8080)]);
        assert_eq!(p.removed, vec![Binding::new("10.0.0.6", 80)]);
    }

    #[test]
    fn test_adopt_by_name() {
        let source = vec![monitor("a", "u-a")];
        let mut requested = vec![monitor("a", ""), monitor("b", "")];
        adopt_by_name(&mut requested, &source);

        let p = diff(&requested, &source);
        assert_eq!(p.updated.len(), 1);
        assert_eq!(p.added, vec![monitor("b", "")]);
        assert!(p.removed.is_empty());
    }

    /// added ∩ removed = ∅, updated matches both sides, and
    /// added ∪ updated ∪ (source ∖ removed) covers requested.
    #[test]
    fn test_partition_properties_hold_for_random_sets() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let source: Vec<HealthMonitor> = (0..rng.gen_range(0..8))
                .map(|i| monitor(&format!("s{i}"), &format!("u-{}", rng.gen_range(0..12))))
                .collect();
            let requested: Vec<HealthMonitor> = (0..rng.gen_range(0..8))
                .map(|i| {
                    let uuid = if rng.gen_bool(0.3) {
                        String::new()
                    } else {
                        format!("u-{}", rng.gen_range(0..12))
                    };
                    monitor(&format!("r{i}"), &uuid)
                })
                .collect();

            let p = diff(&requested, &source);
            let ids = |items: &[HealthMonitor]| -> HashSet<String> {
                items.iter().map(|m| m.source_uuid.clone()).filter(|u| !u.is_empty()).collect()
            };
            let source_ids = ids(&source);
            let requested_ids = ids(&requested);

            assert!(ids(&p.added).is_disjoint(&ids(&p.removed)));
            for item in &p.updated {
                assert!(source_ids.contains(&item.source_uuid));
                assert!(requested_ids.contains(&item.source_uuid));
            }
            assert_eq!(p.added.len() + p.updated.len(), requested.len());

            let kept: HashSet<String> = source_ids.difference(&ids(&p.removed)).cloned().collect();
            let mut covered = ids(&p.added);
            covered.extend(ids(&p.updated));
            covered.extend(kept.iter().cloned());
            assert_eq!(covered, requested_ids);
        }
    }
}
