use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ai_client::Claude;
use apify_client::ApifyClient;
use rivalscout_common::{Config, DiscoveryPolicy, OrchestrateRequest, Platform, RunMode, SourceKind};
use rivalscout_discovery::semantic::ClaudeSemanticRanker;
use rivalscout_discovery::sources::{
    ClaudeSuggester, DiscoverySources, SearchDiscovery, SerperSearcher, WebSearch,
};
use rivalscout_discovery::store::PgRunStore;
use rivalscout_discovery::validation::{
    ApifyInstagramValidator, SearchPresenceValidator, ValidatorSet,
};
use rivalscout_discovery::{DeadlineOutcome, Orchestrator};
use rivalscout_events::{EventSink, FanoutSink, PgEventStore, TracingSink};

#[derive(Parser)]
#[command(name = "rivalscout", about = "Competitor discovery and ranking for brand research jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover, score and shortlist competitors for a research job.
    Orchestrate {
        #[arg(long)]
        job: Uuid,
        #[arg(long, default_value = "append")]
        mode: RunMode,
        /// Repeat for several platforms.
        #[arg(long = "platform", default_values_t = [Platform::Instagram, Platform::TikTok])]
        platforms: Vec<Platform>,
        #[arg(long, default_value_t = 8)]
        target: u32,
        /// Restrict discovery sources. Defaults to all of them.
        #[arg(long = "source")]
        sources: Vec<SourceKind>,
        /// Stop waiting after this many seconds; the run keeps going.
        #[arg(long)]
        wait_secs: Option<u64>,
    },
    /// Print the decisions of a run (latest by default).
    Shortlist {
        #[arg(long)]
        job: Uuid,
        #[arg(long)]
        run: Option<Uuid>,
    },
    /// Apply database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rivalscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = match cli.command {
        Command::Orchestrate { .. } => Config::from_env(),
        _ => Config::database_from_env(),
    };
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    let store = Arc::new(PgRunStore::new(pool.clone()));

    if let Command::Migrate = cli.command {
        store.migrate().await?;
        info!("Migrations complete");
        return Ok(());
    }

    let policy = match &config.policy_path {
        Some(path) => DiscoveryPolicy::load(path)?,
        None => DiscoveryPolicy::default(),
    };
    info!(version = %policy.version, "Discovery policy loaded");

    let events: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(PgEventStore::new(pool))),
    );
    let orchestrator = build_orchestrator(&config, store, events, policy)?;

    match cli.command {
        Command::Orchestrate {
            job,
            mode,
            platforms,
            target,
            sources,
            wait_secs,
        } => {
            let mut request = OrchestrateRequest::new(mode, platforms, target);
            if !sources.is_empty() {
                request = request.with_sources(sources);
            }

            match wait_secs {
                Some(secs) => {
                    let outcome = orchestrator
                        .orchestrate_with_deadline(job, request, Duration::from_secs(secs))
                        .await?;
                    match outcome {
                        DeadlineOutcome::Completed(result) => print_json(&result.summary)?,
                        DeadlineOutcome::Running { run_id } => {
                            warn!(%run_id, "Run still in progress, check back with `shortlist`");
                            print_json(&serde_json::json!({"runId": run_id, "status": "RUNNING"}))?;
                            // The runtime shuts down with main; keep the process alive for the run.
                            wait_for_run(&orchestrator, job, run_id).await?;
                        }
                    }
                }
                None => {
                    let result = orchestrator.orchestrate(job, request).await?;
                    let shortlist = orchestrator.shortlist(job, Some(result.run_id)).await?;
                    print_json(&shortlist)?;
                }
            }
        }
        Command::Shortlist { job, run } => {
            let shortlist = orchestrator.shortlist(job, run).await?;
            print_json(&shortlist)?;
        }
        Command::Migrate => {}
    }
    Ok(())
}

/// Wire whichever connectors are configured. Missing ones leave their source
/// unconfigured, which a run records as a failed source.
fn build_orchestrator(
    config: &Config,
    store: Arc<PgRunStore>,
    events: Arc<dyn EventSink>,
    policy: DiscoveryPolicy,
) -> Result<Orchestrator> {
    let mut sources = DiscoverySources::new();
    let mut validators = ValidatorSet::new();
    let mut ranker = None;

    let web: Option<Arc<dyn WebSearch>> = match &config.serper_api_key {
        Some(key) => Some(Arc::new(SerperSearcher::new(key)?)),
        None => None,
    };
    if let Some(web) = &web {
        let search = Arc::new(SearchDiscovery::new(web.clone()));
        sources = sources.with_algorithmic(search.clone()).with_direct(search);
        validators = validators.with_tiktok(Arc::new(SearchPresenceValidator::new(web.clone())));
    }

    match (&config.apify_api_token, &web) {
        (Some(token), _) => {
            let apify = ApifyClient::new(token.clone());
            validators = validators.with_instagram(Arc::new(ApifyInstagramValidator::new(apify)));
        }
        (None, Some(web)) => {
            validators =
                validators.with_instagram(Arc::new(SearchPresenceValidator::new(web.clone())));
        }
        (None, None) => warn!("No Instagram validator configured"),
    }

    if let Some(key) = &config.anthropic_api_key {
        let claude = Claude::new(key.clone(), config.claude_model.clone());
        sources = sources.with_ai(Arc::new(ClaudeSuggester::new(claude.clone())));
        ranker = Some(Arc::new(ClaudeSemanticRanker::new(claude)));
    }

    let mut orchestrator = Orchestrator::new(store, events, policy)
        .with_sources(sources)
        .with_validators(validators);
    if let Some(ranker) = ranker {
        orchestrator = orchestrator.with_ranker(ranker);
    }
    Ok(orchestrator)
}

async fn wait_for_run(orchestrator: &Orchestrator, job: Uuid, run_id: Uuid) -> Result<()> {
    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let shortlist = orchestrator.shortlist(job, Some(run_id)).await?;
        if shortlist.status != rivalscout_common::RunStatus::Running {
            info!(%run_id, status = %shortlist.status, "Run finished");
            return Ok(());
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
