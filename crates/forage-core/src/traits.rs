use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;

/// An expensive, stateful handle required to perform one unit of
/// extraction work (e.g., a controlled browser instance).
///
/// A resource is exclusively owned by the pool except while checked out by
/// exactly one worker. Health is a first-class operation, probed on release
/// rather than discovered through failures on next use.
pub trait Resource: Send + Sync + 'static {
    /// Stable identifier for logging and diagnostics.
    fn id(&self) -> Uuid;

    /// Cheap liveness probe. `false` triggers destroy-and-replace.
    fn is_healthy(&self) -> impl Future<Output = bool> + Send;

    /// Tear down the underlying handle. Failures are logged, not surfaced.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Builds one expensive handle; each call may fail independently.
pub trait ResourceFactory: Send + Sync {
    type Resource: Resource;

    fn create(&self) -> impl Future<Output = Result<Self::Resource, AppError>> + Send;
}

/// Performs the actual page fetch/parse against a checked-out resource.
///
/// Any error is treated as retryable unless it is [`AppError::Fatal`].
pub trait Extractor<R: Resource>: Send + Sync {
    fn extract(
        &self,
        resource: &R,
        target: &str,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}
