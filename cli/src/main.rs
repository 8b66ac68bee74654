use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use observer::{logging, HttpBackend, WebSocketConnector};
use observer_core::logs::severity_breakdown;
use observer_core::{
    Anomaly, Completion, Config, ConnectionManager, ConnectionState, InvestigationSession,
    LiveEvent, LiveFeed, LogCorrelator, LogEntry, MonitoringMode, PushMessage, ServiceScope,
    TelemetryBackend, TraceContext, TraceInspector, ViewTab,
};

#[derive(Parser)]
#[command(name = "observer")]
#[command(about = "Live incident investigation for instrumented services", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "observer.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live feed of anomalies and metrics until Ctrl-C
    Watch {
        /// Service to chart (defaults to config)
        #[arg(long)]
        service: Option<ServiceScope>,
        /// Monitoring mode (defaults to config)
        #[arg(long)]
        mode: Option<MonitoringMode>,
        /// Override push channel URL from config
        #[arg(long)]
        push_url: Option<String>,
    },

    /// Print the current alert snapshot
    Alerts {
        #[arg(long)]
        json: bool,
        /// Override backend URL from config
        #[arg(long)]
        server: Option<String>,
    },

    /// Print the metric snapshot for a service and monitoring mode
    Metrics {
        #[arg(long)]
        service: Option<ServiceScope>,
        #[arg(long)]
        mode: Option<MonitoringMode>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Show the span waterfall of one trace
    Trace {
        #[arg(short = 'i', long = "id")]
        trace_id: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Show logs correlated with one trace
    Logs {
        #[arg(short = 'i', long = "id")]
        trace_id: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Investigate an anomaly from the alert list: trace, logs and optionally RCA
    Investigate {
        #[arg(short = 'i', long = "id")]
        trace_id: String,
        /// Also run AI root-cause analysis
        #[arg(long)]
        analyze: bool,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        server: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    logging::init(&config.logging);
    config.validate()?;

    match cli.command {
        Commands::Watch {
            service,
            mode,
            push_url,
        } => {
            let mut config = config;
            if let Some(url) = push_url {
                config.backend.push_url = url;
            }
            let scope = service.unwrap_or_else(|| config.live.default_service.clone());
            let mode = mode.unwrap_or(config.live.monitoring_mode);
            handle_watch(&config, scope, mode).await?;
        }
        Commands::Alerts { json, server } => {
            let backend = backend(&config, server)?;
            handle_alerts(&backend, json).await?;
        }
        Commands::Metrics {
            service,
            mode,
            json,
            server,
        } => {
            let backend = backend(&config, server)?;
            let scope = service.unwrap_or_else(|| config.live.default_service.clone());
            let mode = mode.unwrap_or(config.live.monitoring_mode);
            handle_metrics(&backend, &scope, mode, json).await?;
        }
        Commands::Trace {
            trace_id,
            json,
            server,
        } => {
            let backend = Arc::new(backend(&config, server)?);
            let inspector = TraceInspector::new(backend, &config.investigation.gateway_service);
            let context = inspector.load_trace(&trace_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&context)?);
            } else {
                print_waterfall(&context);
            }
        }
        Commands::Logs {
            trace_id,
            json,
            server,
        } => {
            let correlator = LogCorrelator::new(Arc::new(backend(&config, server)?));
            let logs = correlator.load_logs(&trace_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else {
                print_logs(&trace_id, &logs);
            }
        }
        Commands::Investigate {
            trace_id,
            analyze,
            json,
            server,
        } => {
            let backend = Arc::new(backend(&config, server)?);
            handle_investigate(backend, &config, &trace_id, analyze, json).await?;
        }
        Commands::Config => {
            let mut effective = config;
            if effective.backend.api_key.is_some() {
                effective.backend.api_key = Some("<redacted>".to_string());
            }
            print!("{}", effective.to_toml()?);
        }
    }

    Ok(())
}

fn backend(config: &Config, server: Option<String>) -> Result<HttpBackend> {
    let mut backend_config = config.backend.clone();
    if let Some(url) = server {
        backend_config.base_url = url;
    }
    HttpBackend::new(&backend_config).context("Failed to build HTTP client")
}

async fn handle_watch(config: &Config, scope: ServiceScope, mode: MonitoringMode) -> Result<()> {
    let backend = backend(config, None)?;
    let mut feed = LiveFeed::new(scope, mode);

    if let Err(err) = feed.refresh(&backend).await {
        tracing::warn!(error = %err, "starting without a complete snapshot");
    }
    println!(
        "📡 {} incidents, {} samples for {} / {}",
        feed.incidents().len(),
        feed.metrics().len(),
        feed.scope(),
        feed.mode()
    );

    let (tx, mut rx) = mpsc::channel(256);
    let manager = ConnectionManager::from_config(Arc::new(WebSocketConnector::new()), config);
    println!("🔌 Connecting to {}", manager.endpoint());
    let handle = manager.spawn(tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_event(&feed, &event);
                feed.apply(event);
            }
        }
    }

    // an unread receiver must not keep the connection task waiting for room
    drop(rx);
    handle.shutdown().await.context("Connection task failed")?;
    println!("👋 Stopped, {} incidents", feed.incidents().len());
    Ok(())
}

fn print_event(feed: &LiveFeed, event: &LiveEvent) {
    match event {
        LiveEvent::Status(state) if *state != feed.status() => match state {
            ConnectionState::Connected => println!("🟢 live"),
            ConnectionState::Disconnected => println!("🔴 disconnected, retrying"),
            _ => {}
        },
        LiveEvent::Status(_) => {}
        LiveEvent::Message(PushMessage::History(anomalies)) => {
            println!("🗂  history: {} anomalies", anomalies.len());
        }
        LiveEvent::Message(PushMessage::NewAnomaly(anomaly)) => {
            println!("⚠️  {}", anomaly_row(anomaly));
        }
        LiveEvent::Message(PushMessage::MetricUpdate(sample)) => {
            if feed.scope().matches(&sample.service)
                && sample.metric_type == feed.mode().metric_type()
            {
                println!(
                    "📈 {:<16} {:<16} {:>10.2}",
                    sample.service, sample.metric_type, sample.value
                );
            }
        }
    }
}

async fn handle_alerts(backend: &HttpBackend, json: bool) -> Result<()> {
    let alerts = backend.fetch_alerts().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    println!("🚨 Alerts (total {})", alerts.len());
    println!(
        "{:<25} {:<16} {:<20} {:>10} {}",
        "TIME", "SERVICE", "ROUTE", "MS", "TRACE"
    );
    for anomaly in &alerts {
        println!("{}", anomaly_row(anomaly));
    }
    Ok(())
}

fn anomaly_row(anomaly: &Anomaly) -> String {
    format!(
        "{:<25} {:<16} {:<20} {:>10.1} {}",
        anomaly.timestamp.to_rfc3339(),
        anomaly.service,
        anomaly.route,
        anomaly.duration_ms,
        anomaly.trace_id
    )
}

async fn handle_metrics(
    backend: &HttpBackend,
    scope: &ServiceScope,
    mode: MonitoringMode,
    json: bool,
) -> Result<()> {
    let mut feed = LiveFeed::new(scope.clone(), mode);
    feed.apply_metric_snapshot(backend.fetch_metrics(scope, mode).await?);

    if json {
        let samples: Vec<_> = feed.metrics().iter().collect();
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    println!("📈 {} ({} / {})", mode.chart_label(), scope, mode);
    println!("{:<25} {:<16} {:>10}", "TIME", "SERVICE", "VALUE");
    for sample in feed.chart() {
        println!(
            "{:<25} {:<16} {:>10.2}",
            sample.timestamp.to_rfc3339(),
            sample.service,
            sample.value
        );
    }
    Ok(())
}

async fn handle_investigate(
    backend: Arc<HttpBackend>,
    config: &Config,
    trace_id: &str,
    analyze: bool,
    json: bool,
) -> Result<()> {
    let mut feed = LiveFeed::default();
    feed.apply_alert_snapshot(backend.fetch_alerts().await?);
    let anomaly = feed
        .incidents()
        .find(trace_id)
        .cloned()
        .ok_or_else(|| anyhow!("No alert with trace id {}", trace_id))?;

    let mut session = InvestigationSession::new(backend, &config.investigation.gateway_service);
    session.select_anomaly(anomaly);
    report_failures(session.settle().await);

    if analyze {
        session.select_tab(ViewTab::AiAnalysis);
        report_failures(session.settle().await);
    }

    if json {
        let report = serde_json::json!({
            "anomaly": session.selected(),
            "trace": session.trace(),
            "logs": session.logs(),
            "analysis": session.analysis(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(selected) = session.selected() {
        println!("🔍 Investigating {}", anomaly_row(selected));
    }
    match session.trace() {
        Some(context) => print_waterfall(context),
        None => println!("• Trace unavailable"),
    }
    print_logs(trace_id, session.logs());

    if let Some(result) = session.analysis() {
        println!("\n🤖 Root cause: {}", result.root_cause);
        if let Some(confidence) = result.confidence {
            println!("• Confidence: {:.0}%", confidence * 100.0);
        }
        println!("• Risk: {}", result.risk_prediction);
        for (index, fix) in result.suggested_fixes.iter().enumerate() {
            println!("  {}. {}", index + 1, fix);
        }
    }
    Ok(())
}

fn report_failures(completions: Vec<Completion>) {
    for completion in completions {
        if let Completion::Failed(kind, err) = completion {
            eprintln!("⚠️  {:?} unavailable: {}", kind, err);
        }
    }
}

fn print_waterfall(context: &TraceContext) {
    println!(
        "🧵 Trace {} ({:.2} ms, {} spans)",
        context.trace_id,
        context.duration_ms,
        context.spans.len()
    );
    println!(
        "{:>10} {:>10} {:<9} {:<16} {}",
        "OFFSET", "MS", "KIND", "SERVICE", "SPAN"
    );
    for span in &context.spans {
        println!(
            "{:>10.2} {:>10.2} {:<9} {:<16} {}",
            span.start_offset_ms,
            span.duration_ms,
            span.kind.to_string(),
            span.service,
            span.name
        );
    }
}

fn print_logs(trace_id: &str, logs: &[LogEntry]) {
    println!("\n🪵 Logs for {} ({})", trace_id, logs.len());
    let breakdown: Vec<String> = severity_breakdown(logs)
        .into_iter()
        .map(|(level, count)| format!("{} {}", level, count))
        .collect();
    if !breakdown.is_empty() {
        println!("• {}", breakdown.join("  "));
    }
    for entry in logs {
        println!(
            "  {}  {:<7} {:<16} {}",
            entry.timestamp.to_rfc3339(),
            entry.severity.to_string(),
            entry.service_name,
            entry.body
        );
    }
}
