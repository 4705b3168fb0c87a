//! Host Audit Agent entry point
//!
//! Serves engine metrics and SLO state over HTTP and offers offline
//! verification and threshold evaluation from the command line.

use clap::{Parser, Subcommand};
use colored::Colorize;
use host_audit_agent::handler::{create_router, AppState};
use host_audit_core::engine::{AuditEngine, AuditRequest, ProbeRegistry};
use host_audit_core::slo::{AlertSeverity, Direction, ExportFormat, SloMonitor};
use host_audit_core::{AuditRun, EngineConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "host-audit")]
#[command(about = "Host Audit Agent - audit orchestration, resilience and SLO monitoring")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "AUDIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8090", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Run an audit once and emit the sealed run as JSON
    Run {
        /// Request enrichment from the analysis provider
        #[arg(long)]
        analyze: bool,

        /// Write the run to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify the integrity hash of an exported audit run
    Verify {
        /// Path to the audit run (JSON or YAML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List configured SLO thresholds
    Thresholds,

    /// Evaluate metric values against the SLO thresholds
    Evaluate {
        /// Metric value as name=value, repeatable
        #[arg(short, long = "metric", value_parser = parse_metric, required = true)]
        metrics: Vec<(String, f64)>,

        /// Also print the snapshot in this format (prometheus, structured, json)
        #[arg(long)]
        export: Option<ExportFormat>,
    },
}

fn parse_metric(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value for {}: '{}'", name, value))?;
    Ok((name.trim().to_string(), value))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let mut config = EngineConfig::default();
            config.apply_env();
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn emit_run(run: &AuditRun, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(path = %path.display(), "Audit run written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let engine = AuditEngine::from_config(config, ProbeRegistry::new())?;
            let router = create_router(Arc::new(AppState::new(engine)));

            tracing::info!("Starting Host Audit Agent on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Run { analyze, output } => {
            let engine = AuditEngine::from_config(config, ProbeRegistry::new())?;
            let run = engine.run_audit(AuditRequest { analyze }).await?;
            let summary = engine.summary(&run);

            eprintln!(
                "{} {} risk={} ({}) probes={} findings={}{}",
                "AUDIT".cyan().bold(),
                summary.audit_id,
                summary.risk_score,
                summary.risk_level,
                summary.probes_total,
                summary.findings_total,
                if run.is_partial() { " partial".yellow().to_string() } else { String::new() }
            );

            emit_run(&run, output.as_deref())?;
        }

        Commands::Verify { file } => {
            let content = std::fs::read_to_string(&file)?;
            let run: AuditRun = match file.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
                _ => serde_json::from_str(&content)?,
            };

            match run.verify_integrity() {
                Ok(()) => {
                    println!(
                        "{} {} ({})",
                        "VALID".green().bold(),
                        run.audit_id(),
                        run.integrity_hash()
                    );
                }
                Err(violation) => {
                    println!("{} {}", "TAMPERED".red().bold(), violation);
                    std::process::exit(1);
                }
            }
        }

        Commands::Thresholds => {
            println!(
                "{:<30} {:>12} {:>12}  {:<6} {}",
                "METRIC".bold(),
                "WARNING".bold(),
                "CRITICAL".bold(),
                "DIR".bold(),
                "UNIT".bold()
            );
            for t in &config.slo.thresholds {
                let direction = match t.direction {
                    Direction::Above => ">",
                    Direction::Below => "<",
                };
                println!(
                    "{:<30} {:>12} {:>12}  {:<6} {}",
                    t.metric_name,
                    t.warning_level.to_string().yellow(),
                    t.critical_level.to_string().red(),
                    direction,
                    t.unit.as_str()
                );
            }
        }

        Commands::Evaluate { metrics, export } => {
            let monitor = SloMonitor::new(config.slo.thresholds.clone())
                .with_labels(config.telemetry.labels.clone());

            let mut critical = false;
            for (name, value) in &metrics {
                match monitor.observe(name, *value) {
                    Some(alert) => {
                        let label = match alert.severity {
                            AlertSeverity::Critical => {
                                critical = true;
                                "CRITICAL".red().bold()
                            }
                            AlertSeverity::Warning => "WARNING".yellow().bold(),
                        };
                        println!("{} {}", label, alert.message);
                        if !alert.remediation_hint.is_empty() {
                            println!("         {}", alert.remediation_hint.dimmed());
                        }
                    }
                    None if monitor.threshold(name).is_none() => {
                        println!("{} {} = {} (no threshold)", "SKIP".dimmed(), name, value);
                    }
                    None => println!("{} {} = {}", "OK".green().bold(), name, value),
                }
            }

            if let Some(format) = export {
                println!("{}", monitor.export(format)?);
            }

            if critical {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
