use imgwarm::cli::Args;
use imgwarm::config::{self, PreloadConfig};
use imgwarm::core::{KeyState, PreloadCache};
use imgwarm::utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

fn init_logging(args: &Args, app_dir: &Path) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| app_dir.join(config::LOG_FILE));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }

    Ok(())
}

/// Item list from --dir or --manifest (dir wins if both given).
fn load_items(args: &Args) -> Result<Vec<Option<String>>> {
    if let Some(dir) = &args.dir {
        if args.manifest.is_some() {
            warn!("Both --dir and --manifest given, using --dir");
        }
        let files = utils::expand_dir(dir)?;
        return Ok(files
            .into_iter()
            .map(|path| Some(path.to_string_lossy().to_string()))
            .collect());
    }

    match &args.manifest {
        Some(path) => utils::read_manifest(path),
        None => Ok(Vec::new()),
    }
}

fn describe(cache: &PreloadCache, key: &str) -> &'static str {
    match cache.key_state(key) {
        KeyState::Loaded => "loaded",
        KeyState::InFlight => "pending",
        KeyState::Unseen => "failed",
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let app_dir = config::app_dir(args.config_dir.clone());

    if let Err(e) = config::ensure_dir(&app_dir) {
        eprintln!("Warning: {:#}", e);
    }

    init_logging(&args, &app_dir)?;

    info!("imgwarm starting...");
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", app_dir.join(config::CONFIG_FILE).display());

    let settings = PreloadConfig::load_or_default(&app_dir);
    debug!("Settings: {:?}", settings);

    let cache = settings.build_cache();
    cache.prefetch_critical(&settings.critical);

    let items = load_items(&args)?;

    // Foreground batch: what the caller needs now
    let foreground = cache.ensure_loaded_batch(&args.keys);
    if !foreground.wait_timeout(Duration::from_millis(args.timeout_ms)) {
        warn!("Timed out after {}ms waiting for requested images", args.timeout_ms);
    }

    match args.position {
        Some(position) => cache.prefetch_upcoming(position, &items),
        None if !items.is_empty() => {
            info!("{} items loaded but no --position given, skipping look-ahead", items.len())
        }
        None => {}
    }

    if args.settle_ms > 0 {
        std::thread::sleep(Duration::from_millis(args.settle_ms));
    }

    let mut failed = 0usize;
    for key in &args.keys {
        let state = describe(&cache, key);
        if state != "loaded" {
            failed += 1;
        }
        println!("{:<8} {}", state, key);
    }

    let stats = cache.stats();
    println!(
        "loaded={} in_flight={} fetches={} ok={} failed={} hits={} joins={}",
        cache.loaded_count(),
        cache.in_flight_count(),
        stats.fetches,
        stats.successes,
        stats.failures,
        stats.hits,
        stats.joins
    );

    if args.strict && failed > 0 {
        warn!("{} of {} requested images not loaded", failed, args.keys.len());
        std::process::exit(1);
    }

    info!("imgwarm exiting");
    Ok(())
}
