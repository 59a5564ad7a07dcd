/// Failures from the storage plumbing under the funnel service. The service's
/// `AppError` wraps these with `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis is not configured or unreachable")]
    RedisUnavailable,

    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
