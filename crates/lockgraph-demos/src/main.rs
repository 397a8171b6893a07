use std::sync::Arc;

use facet::Facet;
use figue as args;
use lockgraph::{CycleCheck, LockOrderTracker, TrackerConfig, TrackerStats};
use lockgraph_watchdog::WatchdogConfig;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Print final tracker statistics as JSON on stdout.
    #[facet(args::named, default)]
    json: bool,
    /// full, new-edges or off; falls back to LOCKGRAPH_CYCLE_CHECK.
    #[facet(args::named, default)]
    cycle_check: Option<String>,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    StaticOrders,
    EntityRotation {
        #[facet(args::named, default)]
        threads: Option<usize>,
        #[facet(args::named, default)]
        seconds: Option<u64>,
        #[facet(args::named, default)]
        players: Option<usize>,
        #[facet(args::named, default)]
        monsters: Option<usize>,
    },
    Heartbeat {
        #[facet(args::named, default)]
        interval_ms: Option<u64>,
        #[facet(args::named, default)]
        seconds: Option<u64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;
    let tracker = Arc::new(LockOrderTracker::new(tracker_config(&cli)?));

    match cli.command {
        CommandKind::StaticOrders => {
            println!("Running static lock-order test...");
            scenarios::static_orders::run(&tracker);
            println!("----- static lock-order test finished -----");
        }
        CommandKind::EntityRotation {
            threads,
            seconds,
            players,
            monsters,
        } => {
            let defaults = scenarios::entity_rotation::RotationConfig::default();
            let config = scenarios::entity_rotation::RotationConfig {
                threads: threads.unwrap_or(defaults.threads),
                duration: seconds
                    .map(std::time::Duration::from_secs)
                    .unwrap_or(defaults.duration),
                players: players.unwrap_or(defaults.players),
                monsters: monsters.unwrap_or(defaults.monsters),
            };
            println!("Running entity rotation scenario...");
            scenarios::entity_rotation::run(&tracker, &config)?;
            println!("----- entity rotation scenario completed -----");
        }
        CommandKind::Heartbeat {
            interval_ms,
            seconds,
        } => {
            let mut config = WatchdogConfig::from_env().map_err(|e| e.to_string())?;
            if let Some(ms) = interval_ms {
                config.default_interval = std::time::Duration::from_millis(ms);
            } else if std::env::var(lockgraph_watchdog::ENV_WATCHDOG_INTERVAL_MS).is_err() {
                config.default_interval = scenarios::heartbeat::DEMO_INTERVAL;
            }
            let duration = std::time::Duration::from_secs(seconds.unwrap_or(3));
            let stalls = scenarios::heartbeat::run(config, duration)?;
            println!("watchdog reported {stalls} stall warning(s)");
        }
    }

    tracker.print_statistics();
    if cli.json {
        print_stats_json(&tracker.stats())?;
    }
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("lockgraph-demos")
                .description("Run lockgraph demonstration workloads as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

fn tracker_config(cli: &Cli) -> AnyResult<TrackerConfig> {
    let mut config = TrackerConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(mode) = cli.cycle_check.as_deref() {
        config.cycle_check = mode.parse::<CycleCheck>().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

fn print_stats_json(stats: &TrackerStats) -> AnyResult<()> {
    let json =
        facet_json::to_string_pretty(stats).map_err(|e| format!("encode tracker stats: {e}"))?;
    println!("{json}");
    Ok(())
}
