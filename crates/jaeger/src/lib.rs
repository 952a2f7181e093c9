pub mod client;
pub mod decode;
pub mod model;
pub mod source;

pub use client::{JaegerClient, RetryPolicy};
pub use decode::normalize_trace;
pub use source::TraceSource;
