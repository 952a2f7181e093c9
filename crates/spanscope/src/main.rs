mod api;
mod client;
mod monitor;
mod output;
mod service;
mod telemetry;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use spanscope_analysis::export::ExportFormat;
use spanscope_core::config::Config;
use spanscope_core::model::comparison::{TraceComparison, TraceComparisonRequest};
use spanscope_core::model::dashboard::DashboardSummary;
use spanscope_core::model::insights::ServiceInsights;
use spanscope_core::model::notification::NotificationList;
use spanscope_core::model::service_map::ServiceMapView;
use spanscope_core::model::span::Span;
use spanscope_core::model::trace::Trace;
use spanscope_core::query::StatusResponse;
use spanscope_core::time::{parse_duration_str, parse_time_or_relative};
use spanscope_jaeger::{JaegerClient, TraceSource};
use spanscope_store::Store;

use crate::api::AppState;
use crate::client::ApiClient;
use crate::monitor::Monitor;
use crate::output::{
    print_comparison_human, print_dashboard_human, print_insights_human,
    print_notification_event_human, print_notifications_human, print_service_map_human,
    print_spans_human, print_status_human, print_trace_human, print_traces_human,
};
use crate::service::TraceService;
use crate::telemetry::{LogFormat, init_cli_tracing, init_server_tracing, shutdown_tracing};

const RETENTION_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Parser, Debug)]
#[command(name = "spanscope")]
#[command(about = "Trace analytics and alerting over a Jaeger backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Address of a running `spanscope serve`")]
    api_addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the HTTP API, retention and monitoring")]
    Serve {
        #[arg(long)]
        jaeger_url: Option<String>,
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long)]
        db_path: Option<PathBuf>,
        #[arg(long, help = "Do not start the background monitor")]
        no_monitor: bool,
    },
    #[command(about = "Show one trace as a span tree")]
    Trace { trace_id: String },
    #[command(about = "Search traces")]
    Search {
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        operation: Option<String>,
        #[arg(long, help = "Tag filters, e.g. error=true,http.status_code=500")]
        tags: Option<String>,
        #[arg(long, help = "e.g. 250ms")]
        min_duration: Option<String>,
        #[arg(long)]
        max_duration: Option<String>,
        #[arg(long, help = "RFC3339 timestamp or relative duration like 15m")]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    #[command(about = "Recent traces that contain errors")]
    Errors {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    #[command(about = "Slowest spans of the last week")]
    Slow {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    #[command(about = "Service dependency map with statistics")]
    ServiceMap {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    #[command(about = "Compare two or more traces")]
    Compare {
        #[arg(required = true, num_args = 2..)]
        trace_ids: Vec<String>,
    },
    #[command(about = "Per-operation statistics for one service")]
    Insights {
        service: String,
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 10)]
        max_traces: usize,
    },
    #[command(about = "Dashboard summary")]
    Dashboard,
    #[command(about = "Export a trace as json, csv or an html report")]
    Export {
        trace_id: String,
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    #[command(about = "List notifications")]
    Notifications {
        #[arg(long)]
        unread: bool,
        #[arg(long, help = "Keep streaming notification events")]
        follow: bool,
    },
    #[command(about = "Server, upstream and store status")]
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Serve {
        jaeger_url,
        http_addr,
        db_path,
        no_monitor,
    } = cli.command
    {
        return run_server(jaeger_url, http_addr, db_path, no_monitor).await;
    }

    init_cli_tracing();
    let client = ApiClient::new(&resolve_api_addr(cli.api_addr))?;
    let json = cli.json;

    match cli.command {
        Commands::Serve { .. } => Ok(()),
        Commands::Trace { trace_id } => {
            let trace: Trace = client
                .get(&format!("/api/traces/{trace_id}"), &[])
                .await?;
            emit(&trace, json, print_trace_human)
        }
        Commands::Search {
            service,
            operation,
            tags,
            min_duration,
            max_duration,
            since,
            until,
            limit,
        } => {
            let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
            if let Some(v) = service {
                query.push(("service", v));
            }
            if let Some(v) = operation {
                query.push(("operation", v));
            }
            if let Some(v) = tags {
                query.push(("tags", v));
            }
            if let Some(v) = min_duration {
                query.push(("minDuration", duration_us(&v)?.to_string()));
            }
            if let Some(v) = max_duration {
                query.push(("maxDuration", duration_us(&v)?.to_string()));
            }
            if let Some(v) = since {
                query.push(("startTimeMin", parse_time_or_relative(&v)?.to_rfc3339()));
            }
            if let Some(v) = until {
                query.push(("startTimeMax", parse_time_or_relative(&v)?.to_rfc3339()));
            }
            let traces: Vec<Trace> = client.get("/api/traces", &query).await?;
            emit(&traces, json, |t| print_traces_human(t))
        }
        Commands::Errors { limit } => {
            let traces: Vec<Trace> = client
                .get("/api/analytics/errors", &[("limit", limit.to_string())])
                .await?;
            emit(&traces, json, |t| print_traces_human(t))
        }
        Commands::Slow { limit } => {
            let spans: Vec<Span> = client
                .get("/api/analytics/slow-spans", &[("limit", limit.to_string())])
                .await?;
            emit(&spans, json, |s| print_spans_human(s))
        }
        Commands::ServiceMap { hours } => {
            let view: ServiceMapView = client
                .get(
                    "/api/service-map/visualization",
                    &[("timeRangeHours", hours.to_string())],
                )
                .await?;
            emit(&view, json, print_service_map_human)
        }
        Commands::Compare { trace_ids } => {
            let cmp: TraceComparison = client
                .post("/api/comparison/traces", &TraceComparisonRequest { trace_ids })
                .await?;
            emit(&cmp, json, print_comparison_human)
        }
        Commands::Insights {
            service,
            hours,
            max_traces,
        } => {
            let insights: ServiceInsights = client
                .get(
                    &format!("/api/services/{service}/insights"),
                    &[
                        ("timeRangeHours", hours.to_string()),
                        ("maxTraces", max_traces.to_string()),
                    ],
                )
                .await?;
            emit(&insights, json, print_insights_human)
        }
        Commands::Dashboard => {
            let summary: DashboardSummary = client.get("/api/dashboard/summary", &[]).await?;
            emit(&summary, json, print_dashboard_human)
        }
        Commands::Export {
            trace_id,
            format,
            output,
        } => {
            let format = ExportFormat::from_str(&format)?;
            let body = client
                .get_text(&format!("/api/export/traces/{trace_id}/{format}"))
                .await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, body)
                        .await
                        .with_context(|| format!("write {}", path.display()))?;
                    eprintln!("wrote {}", path.display());
                }
                None => print!("{body}"),
            }
            Ok(())
        }
        Commands::Notifications { unread, follow } => {
            let path = if unread {
                "/api/notifications/unread"
            } else {
                "/api/notifications"
            };
            let list: NotificationList = client.get(path, &[]).await?;
            emit(&list, json, print_notifications_human)?;
            if follow {
                let events = client.notification_events().await?;
                futures::pin_mut!(events);
                while let Some(event) = events.next().await {
                    let event = event?;
                    emit(&event, json, print_notification_event_human)?;
                }
            }
            Ok(())
        }
        Commands::Status => {
            let status: StatusResponse = client.get("/api/status", &[]).await?;
            emit(&status, json, print_status_human)
        }
    }
}

fn emit<T: Serialize + ?Sized>(value: &T, json: bool, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn resolve_api_addr(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("SPANSCOPE_API_ADDR").ok())
        .unwrap_or_else(|| {
            Config::load()
                .map(|cfg| cfg.http_addr)
                .unwrap_or_else(|_| Config::default().http_addr)
        })
}

fn duration_us(input: &str) -> anyhow::Result<i64> {
    let duration = parse_duration_str(input)?;
    i64::try_from(duration.as_micros()).context("duration too large")
}

async fn run_server(
    jaeger_url: Option<String>,
    http_addr: Option<String>,
    db_path: Option<PathBuf>,
    no_monitor: bool,
) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load configuration")?;
    if let Some(v) = jaeger_url {
        cfg.jaeger_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = http_addr {
        cfg.http_addr = v;
    }
    if let Some(v) = db_path {
        cfg.db_path = v;
    }

    init_server_tracing(LogFormat::from_env());

    let jaeger = JaegerClient::from_config(&cfg).context("configure jaeger client")?;
    let source: Arc<dyn TraceSource> = Arc::new(jaeger);
    let traces = TraceService::new(source, &cfg);
    let store = if cfg.features.notifications {
        Some(Store::open(&cfg.db_path, cfg.notification_limit).context("open notification store")?)
    } else {
        None
    };

    eprintln!("spanscope serve");
    eprintln!("  jaeger: {}", cfg.jaeger_url);
    eprintln!("  http: {}", cfg.http_addr);
    match &store {
        Some(_) => eprintln!("  db: {}", cfg.db_path.display()),
        None => eprintln!("  db: disabled"),
    }

    let listener = tokio::net::TcpListener::bind(&cfg.http_addr)
        .await
        .with_context(|| format!("bind http listener {}", cfg.http_addr))?;
    let app = api::router(AppState {
        traces: traces.clone(),
        store: store.clone(),
        features: cfg.features,
    });
    let server_task = tokio::spawn(async move { axum::serve(listener, app).await });

    let retention_task: Option<tokio::task::JoinHandle<()>> = store.clone().map(|store| {
        let ttl = cfg.notification_ttl;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_INTERVAL);
            loop {
                interval.tick().await;
                match store.prune_ttl(ttl) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "pruned expired notifications"),
                    Err(err) => tracing::warn!(error = ?err, "retention task failed"),
                }
            }
        })
    });

    let monitor_task = match &store {
        Some(store) if !no_monitor => {
            let monitor = Monitor::new(traces.clone(), Arc::new(store.clone()), &cfg);
            Some(tokio::spawn(monitor.run()))
        }
        _ => None,
    };

    tokio::select! {
        res = server_task => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    for task in [retention_task, monitor_task].into_iter().flatten() {
        task.abort();
    }
    shutdown_tracing();
    Ok(())
}
