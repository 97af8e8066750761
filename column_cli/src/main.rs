mod cli;
mod error_fmt;
mod replay;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::replay::{ReplayOptions, build_sim_engine, print_summary, run_replay};

fn main() {
    if let Err(e) = real_main() {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn real_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging);
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Replay {
            trace,
            mode,
            power_override,
            flood_pressure,
            every_cycle,
        } => {
            let rows = column_config::load_trace_csv(&trace)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "could not install Ctrl-C handler");
            }

            let opts = ReplayOptions {
                mode: mode.into(),
                power_override,
                flood_pressure,
                every_cycle,
                json: cli.json,
            };
            let summary = run_replay(&cfg, &rows, opts, &shutdown)?;
            print_summary(&summary, cli.json)?;
        }
        Commands::SelfCheck => {
            let rig = build_sim_engine(&cfg)?;
            let t = rig.engine.regulator().thresholds();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "thresholds": t })
                );
            } else {
                println!("OK: config valid, engine assembled on simulated actuators");
                println!(
                    "  heater {} W, cube {} L, flood {:.1} mmHg",
                    cfg.equipment.heater_power_w, cfg.equipment.cube_volume_l, t.flood_mmhg
                );
            }
        }
        Commands::Thresholds => {
            let rig = build_sim_engine(&cfg)?;
            let t = rig.engine.regulator().thresholds();
            if cli.json {
                println!("{}", serde_json::to_string(&t)?);
            } else {
                println!("flood    {:>6.1} mmHg", t.flood_mmhg);
                println!("work     {:>6.1} mmHg", t.work_mmhg);
                println!("warning  {:>6.1} mmHg", t.warning_mmhg);
                println!("critical {:>6.1} mmHg", t.critical_mmhg);
            }
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<column_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = column_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console layer on stderr (JSON or compact) plus an optional JSON file layer.
///
/// `RUST_LOG` wins over `--log-level`, which wins over `[logging] level`.
fn init_tracing(json: bool, cli_level: Option<&str>, logging: &column_config::Logging) {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "column.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_writer(writer).with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
}
