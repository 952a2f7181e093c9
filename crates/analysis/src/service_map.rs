use std::collections::HashMap;

use spanscope_core::model::service_map::{
    ServiceConnectivity, ServiceErrorRate, ServiceMap, ServiceMapEdge, ServiceMapNode,
    ServiceMapStatistics,
};
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;

use crate::stats::percentage;

const TOP_N: usize = 5;

/// Folds a batch of traces into a service dependency graph.
///
/// Nodes count every span of their service. An edge `A -> B` exists only when a span of `B`
/// has its parent, within the same trace, in a different service `A`.
pub fn build_service_map<'a>(traces: impl IntoIterator<Item = &'a Trace>) -> ServiceMap {
    traces
        .into_iter()
        .fold(ServiceMapBuilder::default(), ServiceMapBuilder::observe_trace)
        .finish()
}

#[derive(Default)]
struct ServiceMapBuilder {
    nodes: Vec<ServiceMapNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<ServiceMapEdge>,
    edge_index: HashMap<(String, String), usize>,
}

impl ServiceMapBuilder {
    fn observe_trace(mut self, trace: &Trace) -> Self {
        let mut by_id: HashMap<&str, &Span> = HashMap::with_capacity(trace.spans.len());
        for span in &trace.spans {
            by_id.entry(span.span_id.as_str()).or_insert(span);
        }

        for span in &trace.spans {
            self.record_node(span);

            let Some(parent_id) = span.parent_span_id.as_deref() else {
                continue;
            };
            match by_id.get(parent_id) {
                Some(parent) if parent.service_name != span.service_name => {
                    self.record_edge(&parent.service_name, span);
                }
                Some(_) => {}
                None => {
                    tracing::debug!(
                        trace_id = %trace.trace_id,
                        span_id = %span.span_id,
                        parent_span_id = %parent_id,
                        "parent span not in trace; no edge recorded"
                    );
                }
            }
        }
        self
    }

    fn record_node(&mut self, span: &Span) {
        let idx = match self.node_index.get(&span.service_name) {
            Some(idx) => *idx,
            None => {
                self.nodes.push(ServiceMapNode {
                    id: span.service_name.clone(),
                    service_name: span.service_name.clone(),
                    call_count: 0,
                    avg_duration: 0.0,
                    error_count: 0,
                });
                self.node_index
                    .insert(span.service_name.clone(), self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };

        let node = &mut self.nodes[idx];
        node.call_count += 1;
        node.avg_duration = online_mean(node.avg_duration, node.call_count, span.duration_ms());
        if span.has_error() {
            node.error_count += 1;
        }
    }

    fn record_edge(&mut self, source: &str, span: &Span) {
        let key = (source.to_string(), span.service_name.clone());
        let idx = match self.edge_index.get(&key) {
            Some(idx) => *idx,
            None => {
                self.edges.push(ServiceMapEdge {
                    source: key.0.clone(),
                    target: key.1.clone(),
                    call_count: 0,
                    avg_duration: 0.0,
                    error_count: 0,
                    operations: Vec::new(),
                });
                self.edge_index.insert(key, self.edges.len() - 1);
                self.edges.len() - 1
            }
        };

        let edge = &mut self.edges[idx];
        edge.call_count += 1;
        edge.avg_duration = online_mean(edge.avg_duration, edge.call_count, span.duration_ms());
        if span.has_error() {
            edge.error_count += 1;
        }
        if !edge.operations.contains(&span.operation_name) {
            edge.operations.push(span.operation_name.clone());
        }
    }

    fn finish(self) -> ServiceMap {
        ServiceMap {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

/// `n` is the sample count after including `x`.
fn online_mean(avg: f64, n: u64, x: f64) -> f64 {
    (avg * (n - 1) as f64 + x) / n as f64
}

/// Keeps the named services and the edges running between two of them.
pub fn filter_service_map(map: &ServiceMap, services: &[String]) -> ServiceMap {
    let keep = |name: &str| services.iter().any(|s| s == name);
    ServiceMap {
        nodes: map
            .nodes
            .iter()
            .filter(|n| keep(&n.service_name))
            .cloned()
            .collect(),
        edges: map
            .edges
            .iter()
            .filter(|e| keep(&e.source) && keep(&e.target))
            .cloned()
            .collect(),
    }
}

pub fn service_map_statistics(map: &ServiceMap, trace_count: usize) -> ServiceMapStatistics {
    let mut connectivity: Vec<ServiceConnectivity> = map
        .nodes
        .iter()
        .map(|n| ServiceConnectivity {
            service_name: n.service_name.clone(),
            connection_count: map
                .edges
                .iter()
                .filter(|e| e.source == n.service_name || e.target == n.service_name)
                .count(),
        })
        .filter(|c| c.connection_count > 0)
        .collect();
    connectivity.sort_by(|a, b| b.connection_count.cmp(&a.connection_count));
    connectivity.truncate(TOP_N);

    let mut error_rates: Vec<ServiceErrorRate> = map
        .nodes
        .iter()
        .filter(|n| n.call_count > 0)
        .map(|n| ServiceErrorRate {
            service_name: n.service_name.clone(),
            call_count: n.call_count,
            error_count: n.error_count,
            error_rate: percentage(n.error_count as usize, n.call_count as usize),
        })
        .collect();
    error_rates.sort_by(|a, b| b.error_rate.total_cmp(&a.error_rate));
    error_rates.truncate(TOP_N);

    ServiceMapStatistics {
        service_count: map.nodes.len(),
        connection_count: map.edges.len(),
        operation_count: map.edges.iter().map(|e| e.operations.len()).sum(),
        trace_count,
        most_connected_services: connectivity,
        highest_error_rate_services: error_rates,
    }
}
