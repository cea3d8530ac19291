use anyhow::Context;
use clap::{Parser, Subcommand};
use resumable_exporter::position::next_key;
use resumable_exporter::{fatal, Config, Exporter, Position};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "resumable-exporter")]
#[command(about = "Resumable Kafka exporter with ZooKeeper checkpoints", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(short, long, default_value = "resumable-exporter", help = "Exporter name")]
    name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Periodically send the current date and checkpoint its timestamp
    SendDates {
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },
    /// Send keyed dates, one transaction per record
    SendDatesTransaction {
        #[arg(long, default_value_t = 10)]
        count: u32,
    },
    /// Print the last saved position
    ShowPosition,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);
    fatal::install_panic_hook();

    info!("Starting resumable-exporter");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path)
        }
        None => Config::from_env(),
    }
    .context("failed to load configuration")?;

    if matches!(args.command, Command::SendDatesTransaction { .. }) {
        config.kafka.transactional = true;
    }

    info!(
        exporter = %args.name,
        zookeeper_url = %config.zookeeper.url,
        kafka_url = %config.kafka.url,
        transactional = config.kafka.transactional,
        "Configuration summary"
    );

    let mut exporter =
        Exporter::new(args.name.clone(), &config).context("failed to build exporter")?;
    exporter.connect().await.context("failed to connect")?;

    let outcome = run(&mut exporter, args.command).await;
    if let Err(e) = &outcome {
        error!("Exporter stopped: {:#}", e);
    }

    exporter.disconnect().await.context("failed to disconnect")?;
    outcome
}

async fn run(exporter: &mut Exporter, command: Command) -> anyhow::Result<()> {
    match command {
        Command::SendDates { interval_secs } => send_dates(exporter, interval_secs).await,
        Command::SendDatesTransaction { count } => send_dates_transaction(exporter, count).await,
        Command::ShowPosition => {
            match exporter.get_last_position().await? {
                Some(position) => println!("{}", position),
                None => println!("no position saved at {}", exporter.position_node()),
            }
            Ok(())
        }
    }
}

async fn send_dates(exporter: &mut Exporter, interval_secs: u64) -> anyhow::Result<()> {
    let last = exporter.get_last_position().await?;
    info!("Last position: {}", describe(last.as_ref()));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        let now = chrono::Utc::now();
        let timestamp = now.timestamp();
        let event = json!({"timestamp": timestamp, "iso_date": now.to_rfc3339()});

        exporter
            .export(event, None, Position::from(json!(timestamp)))
            .await
            .context("export cycle failed")?;
        info!(timestamp, "Saved position");
    }
}

async fn send_dates_transaction(exporter: &mut Exporter, count: u32) -> anyhow::Result<()> {
    exporter.init_transactions().await?;

    for _ in 0..count {
        let last = exporter.get_last_position().await?;
        info!("Last position: {}", describe(last.as_ref()));

        let key = next_key(last.as_ref());
        let now = chrono::Utc::now();
        let timestamp = now.timestamp();
        let event = json!({"timestamp": timestamp, "iso_date": now.to_rfc3339(), "key": key});
        let position = Position::from(json!({"timestamp": timestamp, "key": key}));

        exporter
            .export(event, Some("key"), position.clone())
            .await
            .context("transactional export cycle failed")?;
        info!("Saved position: {}", position);
    }

    Ok(())
}

fn describe(position: Option<&Position>) -> String {
    position.map_or_else(|| "none".to_string(), Position::to_string)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("resumable_exporter=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("resumable_exporter=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
