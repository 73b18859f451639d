use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder};

use learnsync::{
    BundledDataset, Connectivity, ContentKind, ContentQuery, ContentResolver, DisabledRemote,
    DrainOutcome, KvStore, LearnClient, LearnRemote, SyncConfig, SyncCoordinator, SyncOutcome,
    TcpProbe,
};

type LearnSyncResult<T> = anyhow::Result<T>;

/// Offline-first content and progress sync for the learning client.
#[derive(Parser, Debug)]
#[command(name = "learnsync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve content through remote, cache, bundled dataset and placeholder
    Resolve {
        /// classes, subjects, chapters, subchapters, lesson, quiz or content
        kind: String,
        /// Scope identifier (slug or remote id); not used for `classes`
        id: Option<String>,
    },
    /// Mark a unit complete and try to sync it
    Complete {
        unit_id: String,
        subject_id: String,
        class_id: String,
    },
    /// Record that a unit was opened
    Access {
        unit_id: String,
        subject_id: String,
        class_id: String,
    },
    /// Show completion for a subject
    Progress {
        subject_id: String,
        class_id: String,
        /// Number of units in the subject
        total: usize,
    },
    /// Replay queued mutations
    Drain,
    /// List queued mutations
    Queue,
    /// Delete all local progress records
    Reset,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> LearnSyncResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!("{}=info,reqwest=warn", env!("CARGO_CRATE_NAME"));
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load().context("failed to load configuration")?;
    config.validate()?;

    let store = KvStore::open(&config.db_path)
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))?;
    let dataset = BundledDataset::builtin().context("bundled dataset is corrupt")?;

    if config.force_offline {
        tracing::info!("force-offline mode, remote disabled");
        let offline = || false;
        return run(cli.command, &config, &store, &dataset, &DisabledRemote, &offline).await;
    }

    let mut client = LearnClient::new(&config.base_url, config.request_timeout)
        .context("invalid LEARN_API_BASE_URL")?;
    if let Some(token) = &config.api_token {
        client = client.with_token(token);
    }
    let probe = TcpProbe::for_url(client.base_url(), config.request_timeout);
    tracing::info!(base_url = %config.base_url, has_token = config.api_token.is_some(), "configured learn client");
    run(cli.command, &config, &store, &dataset, &client, &probe).await
}

async fn run<R: LearnRemote, C: Connectivity>(
    command: Command,
    config: &SyncConfig,
    store: &KvStore,
    dataset: &BundledDataset,
    remote: &R,
    connectivity: &C,
) -> LearnSyncResult<()> {
    let sync = SyncCoordinator::new(store, remote, connectivity, config.queue_config());

    match command {
        Command::Resolve { kind, id } => {
            let query = ContentQuery::new(ContentKind::parse(&kind)?, id)?;
            let resolver = ContentResolver::new(store, remote, dataset, &config.resolver_config());
            let resolution = resolver.resolve(&query).await;
            eprintln!("source: {}", resolution.source.as_str());
            println!("{}", serde_json::to_string_pretty(&resolution.payload)?);
        }
        Command::Complete {
            unit_id,
            subject_id,
            class_id,
        } => match sync.record_completion(&unit_id, &subject_id, &class_id).await? {
            SyncOutcome::Confirmed => println!("{unit_id}: completed and synced"),
            SyncOutcome::Queued { mutation_id } => {
                println!("{unit_id}: completed, sync queued as #{mutation_id}")
            }
        },
        Command::Access {
            unit_id,
            subject_id,
            class_id,
        } => {
            let record = sync.record_access(&unit_id, &subject_id, &class_id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Progress {
            subject_id,
            class_id,
            total,
        } => {
            let agg = sync.progress(&subject_id, &class_id, total)?;
            println!(
                "{subject_id} ({class_id}): {}/{total} units, {}%",
                agg.completed_count, agg.percent_complete
            );
        }
        Command::Drain => match sync.replay().await? {
            None => println!("offline, nothing sent"),
            Some(DrainOutcome::AlreadyRunning) => println!("drain already running"),
            Some(DrainOutcome::Drained(report)) => println!(
                "delivered {}, dropped {}, remaining {}",
                report.delivered, report.dropped, report.remaining
            ),
        },
        Command::Queue => {
            let pending = sync.queue().peek_all()?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        Command::Reset => {
            sync.ledger().reset()?;
            println!("progress reset");
        }
    }
    Ok(())
}
