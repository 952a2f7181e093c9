//! Renderers that turn an assembled trace (or a service rollup) into downloadable documents.

pub mod csv;
pub mod html;

use std::fmt;
use std::str::FromStr;

use spanscope_core::error::{Result, SpanscopeError};
use spanscope_core::model::trace::Trace;

pub use csv::{service_csv, trace_csv};
pub use html::trace_report;

/// `yyyy-MM-dd HH:mm:ss.fff` in UTC.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Report,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Report => "text/html; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Report => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Report => "report",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = SpanscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "report" | "html" => Ok(Self::Report),
            _ => Err(SpanscopeError::Validation(format!(
                "unknown export format: {s}"
            ))),
        }
    }
}

pub fn trace_json(trace: &Trace) -> Result<String> {
    serde_json::to_string_pretty(trace)
        .map_err(|e| SpanscopeError::Internal(format!("failed to encode trace: {e}")))
}

pub fn render_trace(trace: &Trace, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => trace_json(trace),
        ExportFormat::Csv => Ok(trace_csv(trace)),
        ExportFormat::Report => Ok(trace_report(trace, chrono::Utc::now())),
    }
}

pub fn trace_file_name(trace_id: &str, format: ExportFormat) -> String {
    format!("trace-{trace_id}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::t1;

    #[test]
    fn json_export_is_camel_case() {
        let raw = trace_json(&t1()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["traceId"], "t1");
        assert_eq!(value["rootService"], "web");
        assert_eq!(value["duration"], 100.0);
        assert_eq!(value["spans"][1]["hasError"], true);
    }

    #[test]
    fn formats_parse_and_name_files() {
        assert_eq!("HTML".parse::<ExportFormat>().unwrap(), ExportFormat::Report);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(trace_file_name("abc", ExportFormat::Csv), "trace-abc.csv");
    }
}
