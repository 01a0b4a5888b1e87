//! Chronomed - temporal reasoning over longitudinal medical records.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chronomed::agent::{AnalysisResult, HttpReasoningProvider, HttpSignalProvider, Orchestrator};
use chronomed::analyzer::{ChangeAnalyzer, ClinicalBands};
use chronomed::audit::AuditLog;
use chronomed::config::{ChronomedConfig, ConfigLoader};
use chronomed::store::{DocumentStore, KnowledgeCorpus};
use chronomed::temporal::TemporalContextRetriever;
use chronomed::watcher::{CheckpointStore, UpdateWatcher};

#[derive(Parser)]
#[command(
    name = "chronomed",
    about = "Temporal reasoning over longitudinal medical records",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a config file (default: search .chronomed.toml, then
    /// ~/.config/chronomed/config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document without analyzing it.
    Ingest {
        /// Entity (patient) identifier.
        entity: u64,
        /// Document type tag.
        #[arg(long, default_value = "lab_report")]
        doc_type: String,
        /// Raw document text.
        #[arg(long)]
        text: String,
        /// Metric as name=value, repeatable. Values may carry a unit
        /// ("glucose=180 mg/dL").
        #[arg(long = "metric", value_name = "NAME=VALUE")]
        metrics: Vec<String>,
        /// Document timestamp (RFC 3339). Defaults to now.
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Ingest a document and run the full analysis pipeline.
    Analyze {
        entity: u64,
        #[arg(long, default_value = "lab_report")]
        doc_type: String,
        #[arg(long)]
        text: String,
        #[arg(long = "metric", value_name = "NAME=VALUE")]
        metrics: Vec<String>,
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Ingest a knowledge item (guideline, protocol, research summary).
    IngestKnowledge {
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Show the temporal context for an entity.
    Context {
        entity: u64,
        /// Override the configured lookback window.
        #[arg(long)]
        lookback_days: Option<u32>,
    },
    /// Watch an entity for new history and reanalyze on updates.
    Watch { entity: u64 },
    /// Show recent mirrored analyses for an entity.
    Audit {
        entity: u64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show store status: stream paths and record counts.
    Status,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Parse repeated name=value metric arguments into the raw metric map.
fn parse_metrics(args: &[String]) -> Result<BTreeMap<String, serde_json::Value>, String> {
    let mut metrics = BTreeMap::new();
    for arg in args {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{arg}'"))?;
        let value = match value.parse::<f64>() {
            Ok(n) => serde_json::json!(n),
            Err(_) => serde_json::json!(value),
        };
        metrics.insert(name.to_string(), value);
    }
    Ok(metrics)
}

async fn build_orchestrator(
    config: &ChronomedConfig,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let store = DocumentStore::open(&config.store.data_dir).await?;
    let knowledge = KnowledgeCorpus::open(&config.store.data_dir).await?;
    let mut orchestrator = Orchestrator::new(store, knowledge)
        .with_lookback_days(config.temporal.lookback_days)
        .with_analyzer(ChangeAnalyzer::new(
            config.analyzer.thresholds.clone(),
            Box::new(ClinicalBands),
            config.analyzer.horizon_days,
        ));

    if config.reasoning.enabled {
        match HttpReasoningProvider::from_env(
            config.reasoning.base_url.clone(),
            &config.reasoning.api_key_env,
            config.reasoning.model.clone(),
            config.reasoning.max_tokens,
        ) {
            Ok(provider) => {
                orchestrator = orchestrator.with_reasoning(Arc::new(provider));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Running without the reasoning collaborator");
            }
        }
    }

    if config.signals.enabled {
        orchestrator = orchestrator
            .with_signals(Arc::new(HttpSignalProvider::new(config.signals.base_url.clone())));
    }

    if config.audit.enabled {
        orchestrator = orchestrator.with_audit(AuditLog::open(&config.audit.db_path).await?);
    }

    Ok(orchestrator)
}

fn print_result(result: &AnalysisResult) {
    let state = if result.is_degraded() {
        format!("{}", "degraded".yellow().bold())
    } else {
        format!("{}", "done".green().bold())
    };
    println!(
        "Analysis for entity {} ({state}, confidence {:.2})",
        result.entity_id.bold(),
        result.confidence
    );
    println!("  {}", result.analysis.trend_summary);

    for event in &result.analysis.delta_events {
        println!(
            "  {} {}: {:+.1} ({:+.1}%)",
            "delta".cyan(),
            event.metric,
            event.magnitude,
            event.change_percent
        );
    }
    for progression in &result.analysis.risk_progressions {
        for transition in &progression.transitions {
            println!(
                "  {} {}: {:?} -> {:?}",
                "risk".red(),
                progression.metric,
                transition.from,
                transition.to
            );
        }
    }
    for projection in &result.analysis.projections {
        println!(
            "  {} {}: {:.1} in {} days ({:?})",
            "projection".magenta(),
            projection.metric,
            projection.predicted_value,
            projection.horizon_days,
            projection.confidence
        );
    }

    if let Some(reasoning) = &result.reasoning {
        println!("\n{}", "Reasoning".bold());
        println!("{reasoning}");
    }

    println!("\n{}", "Recommendations".bold());
    for rec in &result.recommendations {
        println!("  - {rec}");
    }
}


#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    match cli.command {
        Commands::Ingest {
            entity,
            doc_type,
            text,
            metrics,
            timestamp,
        } => {
            let metrics = parse_metrics(&metrics)?;
            let store = DocumentStore::open(&config.store.data_dir).await?;
            let document_id = store.ingest(entity, &doc_type, &text, &metrics, timestamp).await?;
            println!("Ingested document {}", document_id.bold());
        }
        Commands::Analyze {
            entity,
            doc_type,
            text,
            metrics,
            timestamp,
        } => {
            let metrics = parse_metrics(&metrics)?;
            let orchestrator = build_orchestrator(&config).await?;
            let result = orchestrator
                .analyze_with_temporal_context(entity, &doc_type, &text, &metrics, timestamp)
                .await?;
            print_result(&result);
        }
        Commands::IngestKnowledge {
            title,
            content,
            source,
        } => {
            let corpus = KnowledgeCorpus::open(&config.store.data_dir).await?;
            let knowledge_id = corpus.ingest(&title, &content, &source).await?;
            println!("Ingested knowledge item {}", knowledge_id.bold());
        }
        Commands::Context {
            entity,
            lookback_days,
        } => {
            let store = DocumentStore::open(&config.store.data_dir).await?;
            let retriever = TemporalContextRetriever::new(store);
            let lookback = lookback_days.unwrap_or(config.temporal.lookback_days);
            let context = retriever.get_context(entity, lookback).await;

            println!(
                "Entity {}: {} document(s) in the last {} days",
                entity.bold(),
                context.documents.len(),
                lookback
            );
            if context.first_analysis {
                println!("  {}", "first analysis, no temporal comparison yet".dimmed());
            }
            for trend in &context.trends {
                println!(
                    "  {}: {} -> {} ({:+.1}%, {:?}, {:+.3}/day)",
                    trend.metric.bold(),
                    trend.first_value,
                    trend.last_value,
                    trend.change_percent,
                    trend.direction,
                    trend.rate_per_day
                );
            }
        }
        Commands::Watch { entity } => {
            let orchestrator = Arc::new(build_orchestrator(&config).await?);
            let checkpoints = Arc::new(CheckpointStore::open(&config.store.data_dir).await?);
            let watcher = Arc::new(UpdateWatcher::new(Arc::clone(&orchestrator), checkpoints));

            let cancel = CancellationToken::new();
            let poll = orchestrator.store().spawn_poll_loop(
                Duration::from_millis(config.store.visibility_interval_ms),
                cancel.clone(),
            );
            let watch = watcher.spawn_watch_loop(
                entity,
                Duration::from_millis(config.watcher.interval_ms),
                cancel.clone(),
            );

            println!("Watching entity {} (Ctrl-C to stop)", entity.bold());
            tokio::signal::ctrl_c().await?;
            cancel.cancel();
            let _ = tokio::join!(poll, watch);
        }
        Commands::Audit { entity, limit } => {
            let audit = AuditLog::open(&config.audit.db_path).await?;
            let results = audit.recent_for_entity(entity, limit).await?;
            if results.is_empty() {
                println!("No mirrored analyses for entity {entity}");
            }
            for result in results {
                println!(
                    "{}  {}  confidence {:.2}  {}",
                    result.analyzed_at.to_rfc3339().dimmed(),
                    result.document_id,
                    result.confidence,
                    result.analysis.trend_summary
                );
            }
        }
        Commands::Status => {
            let store = DocumentStore::open(&config.store.data_dir).await?;
            let corpus = KnowledgeCorpus::open(&config.store.data_dir).await?;
            println!("Data directory: {}", config.store.data_dir.display().bold());
            println!(
                "  documents: {} ({})",
                store.document_count().await,
                store.path().display()
            );
            println!(
                "  knowledge: {} ({})",
                corpus.item_count().await,
                corpus.path().display()
            );
            println!(
                "  visibility interval: {} ms, watch interval: {} ms",
                config.store.visibility_interval_ms, config.watcher.interval_ms
            );
        }
    }

    Ok(())
}
