//! Command-line entrypoint for running enrichment tasks.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusty_enrich::enrichment::{self, EnrichmentTask};
use rusty_enrich::pipeline::{Pipeline, RunSummary};
use rusty_enrich::store::QdrantStore;
use rusty_enrich::{config, inference, logging};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Parser)]
#[command(
    name = "rusty-enrich",
    about = "Enrich Qdrant documents with LLM-generated fields"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every eligible document for a task.
    Run {
        task: EnrichmentTask,
        /// Override QDRANT_COLLECTION_NAME.
        #[arg(long)]
        collection: Option<String>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show how many documents are still eligible for a task.
    Status {
        task: EnrichmentTask,
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    match cli.command {
        Command::Run {
            task,
            collection,
            json,
        } => {
            let pipeline = build_pipeline(task, collection.as_deref())?;
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            let collection = collection
                .as_deref()
                .unwrap_or(&config::get_config().qdrant_collection_name);
            let summary = pipeline
                .run(&cancel)
                .instrument(logging::run_span(&task.to_string(), collection))
                .await
                .with_context(|| format!("{task} run failed"))?;
            print_summary(&summary, json)?;
        }
        Command::Status { task, collection } => {
            let pipeline = build_pipeline(task, collection.as_deref())?;
            let eligible = pipeline
                .count_eligible()
                .await
                .context("failed to count eligible documents")?;
            println!("{task}: {eligible} documents eligible");
        }
    }

    Ok(())
}

fn build_pipeline(task: EnrichmentTask, collection: Option<&str>) -> Result<Pipeline> {
    let config = config::get_config();
    let store = QdrantStore::from_config(config, collection).context("invalid Qdrant settings")?;
    let client =
        inference::build_inference_client(config).context("failed to build inference client")?;
    let enricher = enrichment::build_enricher(task, config, client)
        .with_context(|| format!("failed to prepare {task} task"))?;
    Ok(Pipeline::new(
        Arc::new(store),
        enricher,
        config.pipeline.clone(),
    ))
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; flushing buffered results and stopping");
            cancel.cancel();
        }
    });
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;
        println!("{rendered}");
        return Ok(());
    }

    println!("task:            {}", summary.task);
    println!("termination:     {}", summary.termination);
    println!("total eligible:  {}", summary.total_eligible);
    println!("processed:       {}", summary.processed);
    println!("skipped:         {}", summary.skipped);
    println!("errored:         {}", summary.errored);
    println!(
        "written:         {} in {} flushes ({} failed, {} unflushed)",
        summary.modified, summary.flushes, summary.write_failures, summary.unflushed
    );
    println!("invalidations:   {}", summary.invalidations);
    if let Some(checkpoint) = &summary.checkpoint {
        println!("checkpoint:      {checkpoint}");
    }
    Ok(())
}
