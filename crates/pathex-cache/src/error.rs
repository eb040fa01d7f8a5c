/// Errors produced by artifact-cache and token-store persistence.
///
/// Callers treat most of these as degradations (render without caching, token unusable) rather
/// than request failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("invalid release version 0")]
    InvalidRelease,
}
