mod relay;

pub use relay::{ApiErrorBody, ApiErrorObject, RelayError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
