use std::time::Duration;

use tracing::debug;

use matchline_api::state::AppState;

/// Sweeps expired recommendation grants. Lookups already ignore them; this
/// only bounds memory held by viewers who never come back.
pub async fn run_purge_loop(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let removed = state.recommender.recent().purge_expired();
        if removed > 0 {
            debug!(
                "Cleanup: purged {} grants, {} remain",
                removed,
                state.recommender.recent().len()
            );
        }
    }
}
