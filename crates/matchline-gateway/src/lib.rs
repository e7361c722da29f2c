pub mod registry;
pub mod relay;
pub mod session;

pub use registry::{Outbound, Registry, SocketKind};
pub use relay::Relay;

use matchline_types::CoreError;
use tracing::error;

/// Run a blocking store call off the async workers.
pub async fn run_blocking<F, T>(f: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        CoreError::StorageFailure(format!("blocking task failed: {}", e))
    })?
}
