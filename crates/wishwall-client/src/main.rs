//! wishwall - run the wish flow against the in-memory store

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use wishwall_client::{
    ClientConfig, CountdownState, CountdownTicker, PresentationPolicy, PreviewRegistry,
    SubmissionForm, SubmitOutcome, WishFeed, render,
};
use wishwall_core::{
    InMemoryWishStore, PhotoFile, Relation, RemoteWishStore, SystemClock, Wish, WishId,
};
use wishwall_logging::{FileConfig, LogConfig, RotationStrategy, WishwallSubscriberBuilder};

#[derive(Parser)]
#[command(name = "wishwall", version, about = "Wish submission and live feed")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Human-readable logs instead of JSONL
    #[arg(long, global = true)]
    pretty: bool,

    /// Also write JSONL logs to files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log file rotation (daily, hourly, never)
    #[arg(long, global = true, default_value = "daily")]
    log_rotation: RotationStrategy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a wish, watch it arrive in the feed, then delete it remotely
    Demo,
    /// Count down to an instant
    Countdown {
        /// Target instant (RFC 3339)
        #[arg(long)]
        target: DateTime<Utc>,
        /// Stop after this many updates
        #[arg(long, default_value_t = 5)]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = WishwallSubscriberBuilder::new()
        .with_config(LogConfig::default())
        .with_level(cli.log_level.clone())
        .with_pretty(cli.pretty);
    if let Some(directory) = &cli.log_dir {
        logging = logging.with_file_output(FileConfig {
            directory: directory.clone(),
            rotation: cli.log_rotation,
            ..FileConfig::default()
        });
    }
    // Flushes the file writer when main returns
    let _guard = logging.try_init().context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default().with_env_overrides(),
    };

    match cli.command {
        Command::Demo => run_demo(config).await,
        Command::Countdown { target, ticks } => run_countdown(target, ticks).await,
    }
}

async fn run_demo(config: ClientConfig) -> Result<()> {
    let memory = Arc::new(
        InMemoryWishStore::with_channel_capacity(config.event_channel_capacity)
            .with_base_url(config.storage_base_url.clone())
            .with_bucket(config.photo_bucket.clone()),
    );
    let now = Utc::now();
    memory.seed([
        Wish {
            id: WishId::generate(),
            name: "Grace".into(),
            relation: Relation::Relative,
            wish: "So proud of you both!".into(),
            photo_url: None,
            created_at: now - chrono::Duration::days(2),
        },
        Wish {
            id: WishId::generate(),
            name: "Linus".into(),
            relation: Relation::Colleague,
            wish: "Wishing you a lifetime of happiness.".into(),
            photo_url: None,
            created_at: now - chrono::Duration::hours(5),
        },
    ]);
    let store: Arc<dyn RemoteWishStore> = memory.clone();
    let policy = PresentationPolicy::from_config(&config);

    let feed = WishFeed::new(store.clone());
    let subscription = feed
        .start()
        .await
        .context("failed to open the wish subscription")?;
    print!("{}", render(&feed.snapshot(), &policy).to_text());

    let form = SubmissionForm::new(
        store,
        PreviewRegistry::new(),
        Arc::new(SystemClock),
        config,
    )
    .with_feed(feed.clone());

    form.open();
    form.set_name("Ada");
    form.set_relation("Friend");
    form.set_wish("Congrats!!");
    if let Some(preview) = form.stage_photo(PhotoFile::new(
        "ada.png",
        "image/png",
        vec![0x89, b'P', b'N', b'G'],
    ))? {
        println!("photo staged at {preview}");
    }

    let wish = match form.submit().await {
        Ok(SubmitOutcome::Submitted(wish)) => wish,
        Ok(SubmitOutcome::AlreadyInFlight) => anyhow::bail!("a submission was already running"),
        Err(e) => anyhow::bail!(e.user_message()),
    };
    println!("submitted wish {}", wish.id);
    print!("{}", render(&feed.snapshot(), &policy).to_text());

    let mut snapshots = feed.watch();
    memory.delete_wish(&wish.id);
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.wishes.iter().all(|w| w.id != wish.id)),
    )
    .await
    .context("timed out waiting for the delete to arrive")?
    .context("feed closed")?;
    println!("wish {} deleted remotely", wish.id);
    print!("{}", render(&feed.snapshot(), &policy).to_text());

    subscription.close().await;
    Ok(())
}

async fn run_countdown(target: DateTime<Utc>, ticks: u32) -> Result<()> {
    let ticker = CountdownTicker::spawn(target, Arc::new(SystemClock), Duration::from_secs(1));
    let mut states = ticker.watch();

    for _ in 0..ticks {
        let state = *states.borrow_and_update();
        match state {
            CountdownState::Running(left) => println!(
                "{}d {:02}h {:02}m {:02}s",
                left.days, left.hours, left.minutes, left.seconds
            ),
            CountdownState::Elapsed => {
                println!("The celebration has started!");
                return Ok(());
            }
        }
        states.changed().await.context("countdown stopped")?;
    }
    Ok(())
}
