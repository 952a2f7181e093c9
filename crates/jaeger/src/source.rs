use async_trait::async_trait;
use spanscope_core::error::Result;
use spanscope_core::query::TraceSearchParams;

use crate::model::RawTrace;

/// Read access to a tracing backend. Implementations own transport, retries and decoding of
/// the wire envelope; callers receive raw traces ready for normalization.
#[async_trait]
pub trait TraceSource: Send + Sync {
    async fn search_traces(&self, params: &TraceSearchParams) -> Result<Vec<RawTrace>>;

    /// `Ok(None)` when the backend has no trace with this id.
    async fn get_trace(&self, trace_id: &str) -> Result<Option<RawTrace>>;

    async fn list_services(&self) -> Result<Vec<String>>;

    async fn list_operations(&self, service: &str) -> Result<Vec<String>>;

    /// Human readable location of the backend, used in health output.
    fn describe(&self) -> String;
}
