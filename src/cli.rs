//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvBarSource;
use crate::adapters::csv_export_adapter::CsvRangeExporter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_cache::InMemoryCache;
use crate::domain::error::RangeError;
use crate::domain::pipeline::{detect_broker_offset, RangeService};
use crate::domain::request::{
    parse_timeframe, validate_bars, RangeRequest, DEFAULT_BARS, DEFAULT_TIMEFRAME_MINUTES,
};
use crate::domain::settings::{ServiceSettings, SourceSettings};
use crate::ports::bar_source::BarSource;

#[derive(Parser, Debug)]
#[command(name = "rangescan", about = "Consolidation range scanner for broker price bars")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API and the sweep scheduler
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Compute ranges for one symbol and print them as JSON
    Scan {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "EURUSD")]
        symbol: String,
        #[arg(long, default_value_t = DEFAULT_TIMEFRAME_MINUTES)]
        tf: u32,
        #[arg(long, default_value_t = DEFAULT_BARS)]
        bars: usize,
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Run one sweep over every registered instrument
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        tf: Option<u32>,
        #[arg(long)]
        bars: Option<usize>,
    },
    /// List registered instruments
    Symbols,
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Scan {
            config,
            symbol,
            tf,
            bars,
            lookback,
        } => run_scan(config.as_deref(), &symbol, tf, bars, lookback),
        Command::Sweep { config, tf, bars } => run_sweep(config.as_deref(), tf, bars),
        Command::Symbols => run_symbols(),
        Command::Validate { config } => run_validate(&config),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load an INI file with `RANGESCAN__{SECTION}__{KEY}` environment overrides applied.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path)
        .map(FileConfigAdapter::with_env_overrides)
        .map_err(|e| {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        })
}

/// Settings from a config file, or the built-in defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<ServiceSettings, ExitCode> {
    let settings = match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            let config = load_config(path)?;
            ServiceSettings::from_config(&config)
        }
        None => FileConfigAdapter::from_string("")
            .map(FileConfigAdapter::with_env_overrides)
            .and_then(|config| ServiceSettings::from_config(&config)),
    };
    settings.map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

pub fn build_source(
    settings: &ServiceSettings,
) -> Result<Arc<dyn BarSource + Send + Sync>, RangeError> {
    match &settings.source {
        SourceSettings::Csv { dir } => Ok(Arc::new(CsvBarSource::new(dir.clone()))),
        #[cfg(feature = "bridge")]
        SourceSettings::Bridge { url } => {
            use crate::adapters::http_bar_source::HttpBarSource;
            let source = HttpBarSource::new(url, Duration::from_secs(settings.timeout_secs))?;
            Ok(Arc::new(source))
        }
        #[cfg(not(feature = "bridge"))]
        SourceSettings::Bridge { .. } => Err(RangeError::ConfigInvalid {
            section: "broker".to_string(),
            key: "source".to_string(),
            reason: "bridge feature is required for source = bridge".to_string(),
        }),
    }
}

/// Wire source, cache, exporter and calendar into a service.
///
/// Detects the broker offset from a live tick when the config does not fix
/// it. This blocks on the source, so call it outside any async runtime.
pub fn build_service(settings: &ServiceSettings) -> Result<RangeService, RangeError> {
    let source = build_source(settings)?;
    let mut calendar = settings.session.calendar();

    if settings.session.broker_offset().is_none() {
        let registry = crate::domain::instrument::InstrumentRegistry::default();
        match detect_broker_offset(source.as_ref(), &registry, chrono::Utc::now()) {
            Some(offset) => calendar = calendar.with_broker_offset(offset),
            None => eprintln!("warning: broker offset unknown, assuming UTC"),
        }
    }

    let mut service = RangeService::new(source, Arc::new(InMemoryCache::new()))
        .with_calendar(calendar)
        .with_settings(settings.ranges.clone());
    if let Some(dir) = &settings.export_dir {
        service = service.with_exporter(Arc::new(CsvRangeExporter::new(dir.clone())));
    }
    Ok(service)
}

fn run_scan(
    config_path: Option<&Path>,
    symbol: &str,
    tf: u32,
    bars: usize,
    lookback: Option<usize>,
) -> ExitCode {
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let request = match RangeRequest::new(
        symbol,
        tf,
        bars,
        lookback.unwrap_or(settings.ranges.lookback),
        true,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let service = match build_service(&settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "Scanning {} on {} over {} bars (lookback {})",
        request.symbol, request.timeframe, request.bars, request.lookback
    );
    let response = match service.calculate(&request) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match serde_json::to_string_pretty(&response) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to serialize result: {e}");
            ExitCode::from(1)
        }
    }
}

fn run_sweep(config_path: Option<&Path>, tf: Option<u32>, bars: Option<usize>) -> ExitCode {
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let timeframe = match tf.map(parse_timeframe).transpose() {
        Ok(tf) => tf.unwrap_or(settings.scheduler.timeframe),
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let bars = bars.unwrap_or(settings.scheduler.bars);
    if let Err(e) = validate_bars(bars) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let service = match build_service(&settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Sweeping {} instruments on {}", service.registry().len(), timeframe);
    let counts = service.fetch_all_symbols_data(timeframe, bars);
    let merged = service.get_merged_ranges(None).unwrap_or_default();

    println!("{:<8} {:>6} {:>7}", "symbol", "bars", "ranges");
    for (symbol, count) in &counts {
        let ranges = merged.get(symbol).map(Vec::len).unwrap_or(0);
        println!("{symbol:<8} {count:>6} {ranges:>7}");
    }

    if counts.values().all(|&n| n == 0) {
        eprintln!("error: no instrument returned data");
        return ExitCode::from(5);
    }
    if let Some(dir) = &settings.export_dir {
        eprintln!("Ranges exported to {}", dir.display());
    }
    ExitCode::SUCCESS
}

fn run_symbols() -> ExitCode {
    let registry = crate::domain::instrument::InstrumentRegistry::default();
    println!("{:<8} {:<10} {:>10}", "key", "broker", "band");
    for instrument in registry.instruments() {
        println!(
            "{:<8} {:<10} {:>10}",
            instrument.key, instrument.broker_symbol, instrument.band_width
        );
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    match load_settings(Some(config_path)) {
        Ok(settings) => {
            eprintln!("Config OK");
            eprintln!("  session timezone: {}", settings.session.timezone);
            match settings.session.broker_offset_minutes {
                Some(m) => eprintln!("  broker offset: {m} minutes"),
                None => eprintln!("  broker offset: detected at startup"),
            }
            match &settings.source {
                SourceSettings::Csv { dir } => eprintln!("  source: csv ({})", dir.display()),
                SourceSettings::Bridge { url } => eprintln!("  source: bridge ({url})"),
            }
            eprintln!(
                "  scheduler: {} every {}s ({} bars on {})",
                if settings.scheduler.enabled { "on" } else { "off" },
                settings.scheduler.interval_secs,
                settings.scheduler.bars,
                settings.scheduler.timeframe
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run_serve(config_path: &Path) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::scheduler::{spawn_sweeps, SweepSchedule};
        use crate::adapters::web::{build_router, AppState};
        use std::net::SocketAddr;

        let settings = match load_settings(Some(config_path)) {
            Ok(s) => s,
            Err(code) => return code,
        };

        let addr: SocketAddr = match settings.listen.parse() {
            Ok(a) => a,
            Err(e) => {
                let err = RangeError::ConfigInvalid {
                    section: "web".to_string(),
                    key: "listen".to_string(),
                    reason: format!("{e}"),
                };
                eprintln!("error: {err}");
                return (&err).into();
            }
        };

        let service = match build_service(&settings) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        let state = AppState {
            service: service.clone(),
            sweep_timeframe: settings.scheduler.timeframe,
            sweep_bars: settings.scheduler.bars,
        };
        let router = build_router(state);

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("error: failed to start runtime: {e}");
                return ExitCode::from(1);
            }
        };

        // The blocking HTTP client inside the service must be dropped outside the runtime.
        let result: Result<(), std::io::Error> = runtime.block_on(async {
            if settings.scheduler.enabled {
                spawn_sweeps(
                    service.clone(),
                    SweepSchedule {
                        interval: Duration::from_secs(settings.scheduler.interval_secs),
                        timeframe: settings.scheduler.timeframe,
                        bars: settings.scheduler.bars,
                    },
                );
            }
            eprintln!("Starting web server on {}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        });

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                let err = RangeError::Io(e);
                eprintln!("error: {err}");
                (&err).into()
            }
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}
