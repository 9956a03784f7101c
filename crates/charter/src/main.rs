//! Headless chart driver: loads a symbol, fills the history around the
//! fitted view and prints what happened.
//!
//! Usage: `charter [SYMBOL] [RESOLUTION] [END_DATE]`

use anyhow::{Context, Result};
use chrono::NaiveDate;

use charter::fetch::Direction;
use charter::log_ring::LogRing;
use charter::{ChartSession, HeadlessChart};
use charter_config::Config;
use charter_core::Resolution;
use charter_data::{BarQuery, CsvSource, DataSource, HttpSource, RawRow, SourceError};

/// The configured backend: CSV files when a root is set, HTTP otherwise.
enum Backend {
    Http(HttpSource),
    Csv(CsvSource),
}

impl Backend {
    fn from_config(config: &Config) -> Result<Self> {
        match &config.data.csv_root {
            Some(root) => Ok(Backend::Csv(CsvSource::new(root))),
            None => Ok(Backend::Http(HttpSource::new(
                config.data.base_url.clone(),
                config.data.timeout(),
            )?)),
        }
    }
}

impl DataSource for Backend {
    async fn query(&self, query: &BarQuery) -> Result<Vec<RawRow>, SourceError> {
        match self {
            Backend::Http(source) => source.query(query).await,
            Backend::Csv(source) => source.query(query).await,
        }
    }
}

fn apply_args(config: &mut Config, args: &[String]) -> Result<()> {
    if let Some(symbol) = args.first() {
        config.general.symbol = symbol.clone();
    }
    if let Some(resolution) = args.get(1) {
        config.general.resolution = resolution
            .parse::<Resolution>()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    if let Some(end) = args.get(2) {
        let date = NaiveDate::parse_from_str(end, "%Y-%m-%d").with_context(|| format!("invalid end date {end}"))?;
        config.general.end_date = Some(date);
    }
    Ok(())
}

async fn run() -> Result<()> {
    env_logger::init();

    let mut config = Config::load_default();
    let args: Vec<String> = std::env::args().skip(1).collect();
    apply_args(&mut config, &args)?;

    let backend = Backend::from_config(&config)?;
    let mut session = ChartSession::new(config, backend, HeadlessChart::default());

    let loaded = session.initial_load().await?;
    log::info!("{} {}: {loaded} bars", session.symbol(), session.resolution());

    let added = session.check_and_load().await;
    if added == 0 {
        // The fitted view covers everything; pull one window back anyway.
        session.load_more(Direction::Earlier).await;
    }

    for notice in session.take_notices() {
        println!("{notice}");
    }
    if let (Some(first), Some(last)) = (session.store().first(), session.store().last()) {
        println!("{} bars from {} to {}", session.store().len(), first.time, last.time);
    }

    let name = LogRing::export_file_name(chrono::Utc::now());
    std::fs::write(&name, session.export_logs()).with_context(|| format!("writing {name}"))?;
    println!("Log written to {name}");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
