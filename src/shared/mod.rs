pub mod errors;
pub mod failure;
pub mod retry;
pub mod shutdown;

pub use errors::*;
pub use failure::{Classified, FailureCategory, FailureClassification};
pub use retry::{
    RetryContext, RetryExecutor, RetryFailure, RetryPolicy, RetryResult, RetrySettings,
    RetryStrategy,
};
pub use shutdown::ShutdownCoordinator;
