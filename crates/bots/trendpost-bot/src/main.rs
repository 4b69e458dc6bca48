use std::io;
use std::path::PathBuf;

use clap::Parser;
use clap::builder::RangedU64ValueParser;
use reqwest::Client;
use snafu::{ResultExt, Snafu};
use tokio::signal;
use tokio::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use time::OffsetDateTime;
use trendpost_bot::generator::{
    DEFAULT_GEMINI_MODEL, DEFAULT_POST_LANGUAGE, GEMINI_API_BASE, GeminiGenerator,
};
use trendpost_bot::job::{DEFAULT_CANDIDATE_LIMIT, PublicationJob};
use trendpost_bot::publisher::{TELEGRAM_API_BASE, TelegramPublisher};
use trendpost_bot::schedule::{HourMinute, LocalTime, Schedule, trigger_time};
use trendpost_bot::scraper::{HN_FRONTPAGE_URL, HnScraper};
use trendpost_bot::seen::{DEFAULT_SEEN_FILE, SeenStore};
use trendpost_bot::{LOG_TARGET, PROJECT_NAME, run_scheduler_loop};
use url::Url;

#[derive(Debug, Snafu)]
pub enum BotError {
    #[snafu(display("At least one post time is required"))]
    NoPostTimes,
    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("Logging initialization failed"))]
    Logging,
}

pub type BotResult<T> = std::result::Result<T, BotError>;

/// Trendpost Bot - posts trending Hacker News stories, rewritten by Gemini,
/// to a Telegram channel
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Channel to post to, e.g. `@my_channel`
    #[arg(long, env = "TELEGRAM_CHANNEL")]
    pub telegram_channel: String,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Offset of the local timezone from UTC, in hours
    #[arg(
        long,
        env = "TZ_OFFSET",
        default_value_t = 5,
        allow_negative_numbers = true
    )]
    pub tz_offset: i32,

    /// Local times of day to post at, comma separated `HH:MM`
    #[arg(
        long,
        env = "POST_TIMES",
        value_delimiter = ',',
        default_value = "09:00,21:00"
    )]
    pub post_times: Vec<LocalTime>,

    /// Number of top stories to consider per run
    #[arg(
        long,
        env = "CANDIDATE_LIMIT",
        default_value_t = DEFAULT_CANDIDATE_LIMIT,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub candidate_limit: usize,

    /// File keeping the ids of already published stories
    #[arg(long, env = "SEEN_FILE", default_value = DEFAULT_SEEN_FILE)]
    pub seen_file: PathBuf,

    /// Listing page to scrape
    #[arg(long, env = "SOURCE_URL", default_value = HN_FRONTPAGE_URL)]
    pub source_url: Url,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    /// Language the generated posts are written in
    #[arg(long, env = "POST_LANGUAGE", default_value = DEFAULT_POST_LANGUAGE)]
    pub post_language: String,

    #[arg(long, env = "GEMINI_API_BASE", default_value = GEMINI_API_BASE)]
    pub gemini_api_base: String,

    #[arg(long, env = "TELEGRAM_API_BASE", default_value = TELEGRAM_API_BASE)]
    pub telegram_api_base: String,

    /// Timeout for each outgoing HTTP request, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    /// Do not run a publication job immediately at startup
    #[arg(long, env = "SKIP_INITIAL_RUN")]
    pub skip_initial_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> BotResult<()> {
    init_logging()?;

    let opts = Opts::parse();

    run_bot(opts).await
}

async fn run_bot(opts: Opts) -> BotResult<()> {
    if opts.post_times.is_empty() {
        return NoPostTimesSnafu.fail();
    }

    info!(target: LOG_TARGET, "Starting {PROJECT_NAME}");
    info!(
        target: LOG_TARGET,
        channel = %opts.telegram_channel,
        source = %opts.source_url,
        model = %opts.gemini_model,
        language = %opts.post_language,
        candidate_limit = opts.candidate_limit,
        tz_offset = opts.tz_offset,
        seen_file = %opts.seen_file.display(),
        "Bot configuration"
    );

    let schedule = Schedule::from_local_times(&opts.post_times, opts.tz_offset);
    for local in &opts.post_times {
        info!(
            target: LOG_TARGET,
            local = %local,
            utc = %HourMinute(trigger_time(*local, opts.tz_offset)),
            "Scheduled daily post"
        );
    }

    let client = Client::builder()
        .user_agent(concat!("trendpost-bot/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(opts.http_timeout_secs))
        .build()
        .context(HttpClientSnafu)?;

    let fetcher = HnScraper::new(client.clone(), opts.source_url);
    let generator = GeminiGenerator::new(
        client.clone(),
        opts.gemini_api_base,
        opts.gemini_model,
        opts.gemini_api_key,
        opts.post_language,
    );
    let publisher = TelegramPublisher::new(
        client,
        opts.telegram_api_base,
        opts.telegram_token,
        opts.telegram_channel,
    );

    let store = SeenStore::new(opts.seen_file);
    let seen = store.load();

    let mut job = PublicationJob::new(
        Box::new(fetcher),
        Box::new(generator),
        Box::new(publisher),
        store,
        seen,
        opts.candidate_limit,
    );

    if opts.skip_initial_run {
        info!(target: LOG_TARGET, "Skipping initial publication job");
    } else {
        info!(target: LOG_TARGET, "Running initial publication job");
        let outcome = job.run().await;
        info!(target: LOG_TARGET, %outcome, "Initial publication job finished");
    }

    info!(target: LOG_TARGET, "Bot is running. Press Ctrl+C to stop.");

    run_scheduler_loop(schedule, &mut job, OffsetDateTime::now_utc, shutdown_signal()).await;

    info!(target: LOG_TARGET, "Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(target: LOG_TARGET, error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(target: LOG_TARGET, error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub fn init_logging() -> BotResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| BotError::Logging)?;

    Ok(())
}
