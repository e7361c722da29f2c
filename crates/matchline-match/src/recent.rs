use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

/// Per-viewer grant: the ids from the viewer's last recommendation pull.
#[derive(Debug, Clone)]
struct Grant {
    ids: Vec<Uuid>,
    recorded_at: Instant,
}

/// Short-lived authorization grants letting a viewer open profiles they were
/// just recommended. Each pull replaces the viewer's previous grant, and a
/// grant stops counting once it is older than the ttl.
#[derive(Debug)]
pub struct RecentRecommendations {
    ttl: Duration,
    grants: Mutex<HashMap<Uuid, Grant>>,
}

impl RecentRecommendations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, viewer: Uuid, ids: Vec<Uuid>) {
        let grant = Grant {
            ids,
            recorded_at: Instant::now(),
        };
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(viewer, grant);
    }

    /// Whether `viewer` holds a live grant naming `target`. Expired grants
    /// are evicted on sight.
    pub fn contains(&self, viewer: Uuid, target: Uuid) -> bool {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match grants.get(&viewer) {
            Some(grant) => self.is_expired(grant),
            None => return false,
        };
        if expired {
            grants.remove(&viewer);
            return false;
        }
        grants.get(&viewer).is_some_and(|grant| grant.ids.contains(&target))
    }

    /// Drops every expired grant. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        let before = grants.len();
        grants.retain(|_, grant| grant.recorded_at.elapsed() < self.ttl);
        let removed = before - grants.len();
        if removed > 0 {
            debug!("Purged {} expired recommendation grants", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, grant: &Grant) -> bool {
        grant.recorded_at.elapsed() >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_covers_only_recorded_ids() {
        let recent = RecentRecommendations::new(Duration::from_secs(60));
        let viewer = Uuid::new_v4();
        let shown = Uuid::new_v4();

        recent.record(viewer, vec![shown]);
        assert!(recent.contains(viewer, shown));
        assert!(!recent.contains(viewer, Uuid::new_v4()));
        assert!(!recent.contains(shown, viewer));
    }

    #[test]
    fn new_pull_replaces_previous_grant() {
        let recent = RecentRecommendations::new(Duration::from_secs(60));
        let viewer = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        recent.record(viewer, vec![first]);
        recent.record(viewer, vec![second]);
        assert!(!recent.contains(viewer, first));
        assert!(recent.contains(viewer, second));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn expired_grants_are_ignored_and_purged() {
        let recent = RecentRecommendations::new(Duration::ZERO);
        let viewer = Uuid::new_v4();
        let shown = Uuid::new_v4();

        recent.record(viewer, vec![shown]);
        recent.record(Uuid::new_v4(), vec![shown]);
        assert!(!recent.contains(viewer, shown));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent.purge_expired(), 1);
        assert!(recent.is_empty());
    }
}
