use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use matchline_db::Database;
use matchline_types::CoreError;
use matchline_types::api::Recommendation;
use matchline_types::models::User;

use crate::filter::{Filters, candidates};
use crate::recent::RecentRecommendations;
use crate::scoring;

pub const MAX_RECOMMENDATIONS: usize = 10;

/// Scores, orders and truncates `candidates` for `viewer`. Ties on score are
/// broken by ascending id so a fixed input always yields the same output.
pub fn rank(viewer: &User, candidates: &[User]) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = candidates
        .iter()
        .map(|candidate| {
            let parts = scoring::breakdown(viewer, candidate);
            debug!(
                viewer = %viewer.id,
                candidate = %candidate.id,
                interests = parts.interests,
                location = parts.location,
                age = parts.age,
                completeness = parts.completeness,
                preference = parts.preference,
                total = parts.total(),
                "Scored candidate"
            );
            Recommendation {
                id: candidate.id,
                score: parts.total(),
            }
        })
        .collect();

    ranked.sort_by_key(|r| (Reverse(r.score), r.id));
    ranked.truncate(MAX_RECOMMENDATIONS);
    ranked
}

/// Pull-based recommendation service. Also answers whether a viewer may open
/// another user's profile, since a fresh recommendation is one of the ways to
/// earn that.
pub struct Recommender {
    db: Arc<Database>,
    recent: RecentRecommendations,
}

impl Recommender {
    pub fn new(db: Arc<Database>, grant_ttl: Duration) -> Self {
        Self {
            db,
            recent: RecentRecommendations::new(grant_ttl),
        }
    }

    pub fn recent(&self) -> &RecentRecommendations {
        &self.recent
    }

    /// Ranked candidates for `viewer_id`. Replaces the viewer's grant with
    /// the returned ids.
    pub fn recommend(&self, viewer_id: Uuid, filters: &Filters) -> Result<Vec<Recommendation>, CoreError> {
        let viewer = self
            .db
            .get_user(viewer_id)?
            .ok_or_else(|| CoreError::not_found("user not found"))?;

        if !viewer.is_profile_complete() {
            return Err(CoreError::ProfileIncomplete);
        }

        let mut excluded = self.db.declined_ids(viewer_id)?;
        excluded.extend(self.db.related_ids(viewer_id)?);

        let pool = self.db.list_users()?;
        let eligible = candidates(&viewer, pool, &excluded, filters);
        let ranked = rank(&viewer, &eligible);

        debug!(
            viewer = %viewer_id,
            eligible = eligible.len(),
            returned = ranked.len(),
            "Computed recommendations"
        );

        self.recent.record(viewer_id, ranked.iter().map(|r| r.id).collect());
        Ok(ranked)
    }

    /// A viewer may see a profile that is their own, belongs to someone they
    /// have any connection row with, or was in their last recommendation pull.
    pub fn can_view_profile(&self, viewer: Uuid, target: Uuid) -> Result<bool, CoreError> {
        if viewer == target {
            return Ok(true);
        }
        if self.db.connection_between(viewer, target)?.is_some() {
            return Ok(true);
        }
        Ok(self.recent.contains(viewer, target))
    }

    /// Hide `declined` from `viewer`'s future recommendations.
    pub fn decline(&self, viewer: Uuid, declined: Uuid) -> Result<(), CoreError> {
        if viewer == declined {
            return Err(CoreError::bad_request("cannot decline yourself"));
        }
        if self.db.get_user(declined)?.is_none() {
            return Err(CoreError::not_found("user not found"));
        }
        self.db.decline_user(viewer, declined)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterMode;
    use matchline_types::models::ConnectionStatus;

    fn member(name: &str, age: i32, interests: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            bio: format!("I am {}", name),
            age,
            gender: "female".into(),
            looking_for: "any".into(),
            interests: interests.into(),
            location: "Tallinn".into(),
            ..Default::default()
        }
    }

    fn service(users: &[User]) -> Recommender {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for u in users {
            db.upsert_user(u).unwrap();
        }
        Recommender::new(db, Duration::from_secs(600))
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let viewer = member("viewer", 30, "chess,go");
        let strong = member("strong", 30, "chess,go");
        let weak_a = member("a", 45, "");
        let weak_b = member("b", 45, "");

        let ranked = rank(&viewer, &[weak_a.clone(), strong.clone(), weak_b.clone()]);
        assert_eq!(ranked[0].id, strong.id);
        assert_eq!(ranked[1].score, ranked[2].score);
        assert!(ranked[1].id < ranked[2].id);
    }

    #[test]
    fn rank_truncates_to_ten() {
        let viewer = member("viewer", 30, "x");
        let pool: Vec<User> = (0..25).map(|i| member(&format!("c{}", i), 20 + i, "x")).collect();
        let ranked = rank(&viewer, &pool);
        assert_eq!(ranked.len(), MAX_RECOMMENDATIONS);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn incomplete_viewer_is_rejected() {
        let mut viewer = member("viewer", 30, "x");
        viewer.bio.clear();
        let svc = service(&[viewer.clone(), member("other", 30, "x")]);
        assert!(matches!(
            svc.recommend(viewer.id, &Filters::default()),
            Err(CoreError::ProfileIncomplete)
        ));
    }

    #[test]
    fn unknown_viewer_is_not_found() {
        let svc = service(&[]);
        assert!(matches!(
            svc.recommend(Uuid::new_v4(), &Filters::default()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn excludes_self_declined_and_connected() {
        let viewer = member("viewer", 30, "hiking");
        let declined_by_viewer = member("d1", 30, "hiking");
        let declined_viewer = member("d2", 30, "hiking");
        let pending = member("p", 30, "hiking");
        let accepted = member("a", 30, "hiking");
        let open = member("open", 30, "hiking");
        let svc = service(&[
            viewer.clone(),
            declined_by_viewer.clone(),
            declined_viewer.clone(),
            pending.clone(),
            accepted.clone(),
            open.clone(),
        ]);

        svc.decline(viewer.id, declined_by_viewer.id).unwrap();
        svc.db.decline_user(declined_viewer.id, viewer.id).unwrap();
        svc.db.create_connection(pending.id, viewer.id).unwrap().unwrap();
        let conn = svc.db.create_connection(viewer.id, accepted.id).unwrap().unwrap();
        svc.db.set_connection_status(conn.id, ConnectionStatus::Accepted).unwrap();

        let recs = svc.recommend(viewer.id, &Filters::default()).unwrap();
        let ids: Vec<Uuid> = recs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![open.id]);
    }

    #[test]
    fn filters_narrow_results() {
        let viewer = member("viewer", 30, "hiking");
        let young = member("young", 22, "hiking");
        let peer = member("peer", 31, "hiking");
        let svc = service(&[viewer.clone(), young, peer.clone()]);

        let filters = Filters {
            age: Some(30),
            mode: FilterMode::Age,
            ..Default::default()
        };
        let recs = svc.recommend(viewer.id, &filters).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, peer.id);
    }

    #[test]
    fn pull_grants_profile_visibility() {
        let viewer = member("viewer", 30, "hiking");
        let shown = member("shown", 30, "hiking");
        let stranger = member("stranger", 30, "hiking");
        let svc = service(&[viewer.clone(), shown.clone(), stranger.clone()]);

        assert!(!svc.can_view_profile(viewer.id, shown.id).unwrap());
        svc.decline(viewer.id, stranger.id).unwrap();
        svc.recommend(viewer.id, &Filters::default()).unwrap();

        assert!(svc.can_view_profile(viewer.id, shown.id).unwrap());
        assert!(!svc.can_view_profile(viewer.id, stranger.id).unwrap());
        assert!(svc.can_view_profile(viewer.id, viewer.id).unwrap());
        assert!(!svc.can_view_profile(shown.id, viewer.id).unwrap());
    }

    #[test]
    fn pending_connection_grants_visibility_both_ways() {
        let a = member("a", 30, "x");
        let b = member("b", 30, "x");
        let svc = service(&[a.clone(), b.clone()]);
        svc.db.create_connection(a.id, b.id).unwrap().unwrap();
        assert!(svc.can_view_profile(a.id, b.id).unwrap());
        assert!(svc.can_view_profile(b.id, a.id).unwrap());
    }

    #[test]
    fn declining_unknown_or_self_fails() {
        let a = member("a", 30, "x");
        let svc = service(&[a.clone()]);
        assert!(matches!(svc.decline(a.id, a.id), Err(CoreError::BadRequest(_))));
        assert!(matches!(svc.decline(a.id, Uuid::new_v4()), Err(CoreError::NotFound(_))));
    }
}
