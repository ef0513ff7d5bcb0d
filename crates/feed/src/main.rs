use anyhow::{Context, Result};
use clap::Parser;
use coinwatch_common::config::ControllerConfig;
use coinwatch_common::Coin;
use coinwatch_feed::{
    AggregationController, CacheBackend, DashboardView, FileBackend, MemoryBackend, Phase,
    ReqwestFetcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 암호화폐 가격 대시보드 피드
#[derive(Parser, Debug)]
#[command(name = "coinwatch", version, about = "Polls public price feeds into one dashboard view")]
struct Args {
    /// Coin id as used by CoinGecko/CoinCap
    #[arg(long, default_value = "bitcoin")]
    coin: String,

    /// Ticker symbol used by the exchanges
    #[arg(long, default_value = "BTC")]
    symbol: String,

    /// Days of history to chart
    #[arg(long, default_value_t = 365)]
    days: u32,

    /// Refresh interval in seconds
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Persist the snapshot cache here (in-memory when omitted)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Run a single cycle, print it and exit
    #[arg(long)]
    once: bool,

    /// Print views as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("coinwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("=====================================");

    let config = ControllerConfig {
        coin: Coin::new(args.coin.clone(), args.symbol.clone()),
        days: args.days,
        poll_interval: Duration::from_secs(args.interval.max(1)),
        ..ControllerConfig::default()
    };

    let http = Arc::new(ReqwestFetcher::new().context("failed to build HTTP client")?);
    let backend: Arc<dyn CacheBackend> = match &args.cache_dir {
        Some(dir) => Arc::new(FileBackend::new(dir)),
        None => Arc::new(MemoryBackend::new()),
    };

    let controller = AggregationController::with_defaults(config, http, backend);

    if args.once {
        if !controller.hydrate() {
            controller.refetch().await;
        }
        print_view(&controller.view(), args.json)?;
        return Ok(());
    }

    let mut updates = controller.subscribe();
    controller.mount();
    if controller.view().phase == Phase::CacheHydrated {
        print_view(&controller.view(), args.json)?;
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                if matches!(view.phase, Phase::Settled(_)) {
                    print_view(&view, args.json)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    controller.unmount();
    Ok(())
}

fn print_view(view: &DashboardView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!("{}", view.summary());
    if let Some(reason) = &view.last_failure {
        println!("  degraded: {}", reason);
    }
    for point in view.price_data.iter().rev().take(12).rev() {
        println!("  {}  ${:>9}", point.month, point.price);
    }
    Ok(())
}
