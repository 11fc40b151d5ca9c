//! Retry and backoff policy for the fetch stage.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, truncated bodies) and exponential backoff decisions.
//! Retries never cross stage boundaries: only a single fetch attempt is
//! ever repeated.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::AttemptError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
