//! Request handler module
//!
//! Maps request paths to handler files and runs them: path resolution,
//! the transport-neutral request type and the per-request dispatcher.

pub mod dispatcher;
pub mod request;
pub mod resolver;

// Re-export main entry points
pub use dispatcher::Dispatcher;
pub use request::DispatchRequest;
