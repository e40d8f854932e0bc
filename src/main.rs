//! birdfeed command line.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use birdfeed::config::load_settings;
use birdfeed::convert::convert_files;
use birdfeed::fetch::HttpClient;
use birdfeed::images::ImageOutcome;
use birdfeed::render::html::page_document;
use birdfeed::render::CardId;
use birdfeed::session::{Handled, Session, SessionConfig, Visibility};

#[derive(Parser)]
#[command(name = "birdfeed", version, about = "Bird detection feed, rendered headless")]
struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the feed, render it and print the cards
    Show(ShowArgs),
    /// Convert a BirdDB.txt export into the JSON feed
    Convert(ConvertArgs),
}

#[derive(Args)]
struct ShowArgs {
    /// Feed URL
    #[arg(long, env = "BIRDFEED_DATA_URL")]
    url: Option<String>,

    /// Cards per batch
    #[arg(long)]
    page_size: Option<usize>,

    /// Stop after this many batches (default: all)
    #[arg(long)]
    pages: Option<usize>,

    /// Skip illustration lookups
    #[arg(long)]
    no_images: bool,

    /// Keep consecutive detections of a species as separate cards
    #[arg(long)]
    no_fold: bool,

    /// Display offset in minutes east of UTC (default: local zone)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Also write a static HTML snapshot here
    #[arg(long)]
    html: Option<String>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Semicolon-delimited detection export
    #[arg(long, default_value = "BirdDB.txt")]
    db: String,

    /// `<scientific name>_<common name>` per line
    #[arg(long, default_value = "labels.txt")]
    labels: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "birdfeed=info",
        1 => "birdfeed=debug",
        _ => "birdfeed=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Show(args) => show(args).await,
        Command::Convert(args) => convert(args),
    }
}

async fn show(args: ShowArgs) -> anyhow::Result<()> {
    let mut settings = load_settings().await;
    if let Some(url) = args.url {
        settings.data_url = url;
    }
    if let Some(size) = args.page_size {
        settings.page_size = size.max(1);
    }
    if args.no_fold {
        settings.fold_consecutive = false;
    }
    if args.utc_offset.is_some() {
        settings.utc_offset_minutes = args.utc_offset;
    }

    let client = Arc::new(
        HttpClient::with_user_agent(settings.request_timeout(), settings.user_agent.as_deref())
            .context("cannot build HTTP client")?,
    );
    let mut session = Session::new(SessionConfig::from(&settings), client.clone(), client);

    let summary = match session.load().await {
        Ok(summary) => summary,
        Err(_) => {
            let status = session.page().read().await.status().to_string();
            bail!("{}", status);
        }
    };

    let mut lazy: Vec<CardId> = Vec::new();
    let mut batches = 0usize;
    if let Some(first) = summary.first_batch {
        lazy.extend(first.lazy.iter().map(|(id, _)| *id));
        batches += 1;
    }
    while !session.is_complete() && args.pages.map_or(true, |limit| batches < limit) {
        match session.handle(Visibility::Sentinel).await {
            Handled::Batch(report) => {
                lazy.extend(report.lazy.iter().map(|(id, _)| *id));
                batches += 1;
            }
            _ => break,
        }
    }

    if !args.no_images && !lazy.is_empty() {
        resolve_images(&mut session, &lazy).await;
    }

    let page = session.page();
    let page = page.read().await;
    println!("{}", page.status());
    for element in page.cards() {
        let image = element.image.src.as_deref().unwrap_or("-");
        println!("{}  <{}>", element.card.to_line(), image);
    }

    if let Some(path) = args.html {
        let path = expand(&path);
        fs::write(&path, page_document(&settings.site_title, &page))
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!("Wrote HTML snapshot to {}", path.display());
    }

    Ok(())
}

async fn resolve_images(session: &mut Session, cards: &[CardId]) {
    for id in cards {
        session.handle(Visibility::Image(*id)).await;
    }

    let progress = ProgressBar::new(cards.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} illustrations") {
        progress.set_style(style);
    }

    let mut ready = 0usize;
    while let Some((_, outcome)) = session.next_settled().await {
        if outcome == ImageOutcome::Ready {
            ready += 1;
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!(
        "{} of {} illustrations loaded ({} species looked up)",
        ready,
        cards.len(),
        session.cache().len()
    );
}

fn convert(args: ConvertArgs) -> anyhow::Result<()> {
    let json = convert_files(&expand(&args.db), &expand(&args.labels))?;
    match args.output {
        Some(path) => {
            let path = expand(&path);
            fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
