pub mod progress;
pub mod retry;

pub use progress::{SpeedCalculator, format_bytes, format_duration, format_speed, percentage};
pub use retry::{RetryFailure, RetryPolicy, RetryStrategy, retry_with_policy};
