pub mod error;
pub mod realtime;
pub mod retry;

pub use error::StoreError;
pub use realtime::{validate_key, RealtimeClient};
pub use retry::RetryPolicy;
