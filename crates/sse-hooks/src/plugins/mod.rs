//! Built-in policy plugins.

mod auth;
mod log;
mod retry;

pub use auth::{AuthPlugin, TokenSource};
pub use log::{LogPlugin, LogSink};
pub use retry::RetryPlugin;
