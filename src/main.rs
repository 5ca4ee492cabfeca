use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use service_context::{
    ServiceContext, set_global_service_context,
    callbacks::{CallbackHandler, CbEventType, DebugEventHandler},
    config::default_config::ServiceSettings,
    schema::Document,
    telemetry,
};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Builds a service context from the environment, splits documents into
/// nodes and optionally answers a question over them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Text files to parse into nodes.
    paths: Vec<PathBuf>,

    /// Overrides `CHUNK_SIZE_LIMIT` (tokens per chunk).
    #[arg(long)]
    chunk_size_limit: Option<usize>,

    /// Question sent to the configured LLM with the parsed text as context.
    #[arg(long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment is used as is.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(telemetry::env_filter_with_level("info", Level::INFO))
        .with(telemetry::layer())
        .init();

    let args = Args::parse();

    let mut settings = ServiceSettings::from_env().context("reading service settings")?;
    if args.chunk_size_limit.is_some() {
        settings.chunk_size_limit = args.chunk_size_limit;
    }
    info!(
        llm = %settings.llm.model,
        embedding = %settings.embedding.model,
        chunk_size_limit = ?settings.chunk_size_limit,
        "building service context"
    );

    let ctx = ServiceContext::from_defaults(settings.into_options())?;
    set_global_service_context(Some(ctx.clone()));

    let events = Arc::new(DebugEventHandler::new());
    ctx.callback_manager
        .add_handler(events.clone() as Arc<dyn CallbackHandler>);

    let mut documents = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        documents.push(Document::new(text).with_doc_id(path.display().to_string()));
    }

    let nodes = ctx.node_parser.get_nodes_from_documents(&documents);
    info!(
        documents = documents.len(),
        nodes = nodes.len(),
        chunking_events = events.event_pairs(Some(CbEventType::Chunking)).len(),
        "documents parsed"
    );

    let Some(query) = args.query else {
        return Ok(());
    };
    if nodes.is_empty() {
        warn!("no context nodes; querying the model without context");
    }

    let prompt_template = format!("Context information is below.\n\nAnswer the question: {query}\n");
    let chunks: Vec<String> = nodes.into_iter().map(|n| n.text).collect();
    let compacted = ctx.prompt_helper.compact_text_chunks(&prompt_template, &chunks)?;
    let context = compacted.first().cloned().unwrap_or_default();
    if compacted.len() > 1 {
        warn!(dropped = compacted.len() - 1, "context exceeds one prompt; using the first chunk");
    }

    let prompt = format!("Context information is below.\n{context}\n\nAnswer the question: {query}\n");
    let answer = ctx.llm_predictor.predict(&prompt).await?;
    info!(
        tokens = ctx.llm_predictor.last_token_usage(),
        total_tokens = ctx.llm_predictor.total_tokens_used(),
        "prediction done"
    );
    println!("{answer}");

    Ok(())
}
