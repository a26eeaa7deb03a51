use thiserror::Error;

/// Failure classes on the acquisition path.
///
/// The scheduler never inspects these beyond success/failure; the variants
/// exist for logs and for tests that pin down *why* a fetch was rejected.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("expected 23-25 hourly points, got {0}")]
    OutOfRangeSampleCount(usize),

    /// A recent fetch for the same key failed; retry suppressed until the
    /// cooldown expires.
    #[error("suppressed by retry cooldown")]
    NotAvailable,
}

pub type FetchResult<T> = Result<T, FetchError>;
