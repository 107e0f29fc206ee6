use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "candlecache")]
#[command(about = "Cached historical candlestick retrieval", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a candlestick window, filling the local cache as needed
    Fetch {
        /// Trading pair symbol (e.g. BTCUSDT)
        symbol: String,

        /// Candle timeframe (1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 8h, 12h, 1d, 3d, 1w)
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Window start (RFC 3339 or YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// Window end; omit to fetch up to the latest available candle
        #[arg(short, long)]
        end: Option<String>,

        /// Write the result as CSV to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cache directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Show cached series and their coverage
    Status {
        /// Cache directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            symbol,
            timeframe,
            start,
            end,
            output,
            cache_dir,
        } => commands::fetch::run(symbol, timeframe, start, end, output, cache_dir).await,
        Commands::Status { cache_dir } => commands::status::run(cache_dir),
    }
}
