use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMapNode {
    pub id: String,
    pub service_name: String,
    pub call_count: u64,
    /// Running mean of span duration in milliseconds.
    pub avg_duration: f64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMapEdge {
    pub source: String,
    pub target: String,
    pub call_count: u64,
    pub avg_duration: f64,
    pub error_count: u64,
    /// Distinct child operation names, in the order they were first seen.
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMap {
    pub nodes: Vec<ServiceMapNode>,
    pub edges: Vec<ServiceMapEdge>,
}

impl ServiceMap {
    pub fn node(&self, service: &str) -> Option<&ServiceMapNode> {
        self.nodes.iter().find(|n| n.service_name == service)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&ServiceMapEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMapStatistics {
    pub service_count: usize,
    pub connection_count: usize,
    pub operation_count: usize,
    pub trace_count: usize,
    pub most_connected_services: Vec<ServiceConnectivity>,
    pub highest_error_rate_services: Vec<ServiceErrorRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnectivity {
    pub service_name: String,
    pub connection_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceErrorRate {
    pub service_name: String,
    pub call_count: u64,
    pub error_count: u64,
    /// Percentage, rounded to two decimals.
    pub error_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMapView {
    pub service_map: ServiceMap,
    pub statistics: ServiceMapStatistics,
}
