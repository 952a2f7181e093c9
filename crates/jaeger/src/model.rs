//! Serde model of the Jaeger query service's JSON responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const CHILD_OF: &str = "CHILD_OF";

/// Envelope every Jaeger query endpoint wraps its payload in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(rename = "traceID", default)]
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrace {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<RawSpan>,
    #[serde(default)]
    pub processes: HashMap<String, RawProcess>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Timestamps stay as raw JSON so the normalizer can reject anything that is not an integer
/// (or an integer string) of microseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSpan {
    #[serde(rename = "traceID", default)]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(rename = "operationName", default)]
    pub operation_name: String,
    #[serde(default)]
    pub references: Vec<RawReference>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<RawKeyValue>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
    #[serde(rename = "processID", default)]
    pub process_id: Option<String>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReference {
    #[serde(rename = "refType")]
    pub ref_type: String,
    #[serde(rename = "traceID", default)]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawKeyValue {
    pub key: String,
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLog {
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub fields: Vec<RawKeyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProcess {
    #[serde(rename = "serviceName", default)]
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<RawKeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_search_envelope() {
        let raw = r#"{
            "data": [{
                "traceID": "abc",
                "spans": [{
                    "traceID": "abc",
                    "spanID": "s1",
                    "operationName": "GET /",
                    "references": [{"refType": "CHILD_OF", "traceID": "abc", "spanID": "s0"}],
                    "startTime": 1700000000000000,
                    "duration": 1500,
                    "tags": [{"key": "error", "type": "bool", "value": true}],
                    "logs": [],
                    "processID": "p1"
                }],
                "processes": {"p1": {"serviceName": "web", "tags": []}}
            }],
            "total": 0, "limit": 0, "offset": 0, "errors": null
        }"#;
        let env: Envelope<Vec<RawTrace>> = serde_json::from_str(raw).unwrap();
        let traces = env.data.unwrap();
        assert_eq!(traces[0].trace_id, "abc");
        assert_eq!(traces[0].spans[0].references[0].ref_type, CHILD_OF);
        assert_eq!(traces[0].processes["p1"].service_name, "web");
        assert!(env.errors.is_none());
    }

    #[test]
    fn decodes_service_listing() {
        let env: Envelope<Vec<String>> =
            serde_json::from_str(r#"{"data":["web","auth"],"total":2}"#).unwrap();
        assert_eq!(env.data.unwrap(), vec!["web", "auth"]);
        let empty: Envelope<Vec<String>> = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(empty.data.is_none());
    }
}
