#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::{RunOptions, run_script, self_check};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        tracing::debug!(error = ?e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::info!(config = %cli.config.display(), "configuration loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    match cli.cmd {
        Commands::Run {
            script,
            units,
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            buttons,
        } => {
            let opts = RunOptions::from_config(&cfg, units)?;
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            if buttons {
                return run_buttons(&cfg, &opts, &shutdown);
            }
            let panel = feed_ui::ConsolePanel::new(std::io::stdout());
            let summary = match script {
                Some(path) => {
                    let file = std::fs::File::open(&path)
                        .wrap_err_with(|| format!("open script {}", path.display()))?;
                    run_script(&opts, panel, std::io::BufReader::new(file), &shutdown)?
                }
                None => run_script(&opts, panel, std::io::stdin().lock(), &shutdown)?,
            };
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "keys": summary.keys,
                        "interrupted": summary.interrupted,
                    })
                );
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let opts = RunOptions::from_config(&cfg, None)?;
            self_check(&opts)?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("self-check ok");
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<feed_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = feed_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr so display frames own stdout. An optional JSON
/// file sink comes from `[logging]`.
fn init_tracing(json: bool, level: &str, logging: &feed_config::Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let mut layers: Vec<BoxedLayer> = vec![if json {
        console.json().with_filter(console_filter).boxed()
    } else {
        console.with_filter(console_filter).boxed()
    }];

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "never" => tracing_appender::rolling::never(dir, name),
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            other => eyre::bail!("logging.rotation must be never, daily or hourly, got {other:?}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
            .wrap_err("invalid logging.level")?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn run_buttons(cfg: &feed_config::Config, opts: &RunOptions, shutdown: &AtomicBool) -> Result<()> {
    use feed_hardware::buttons::{ButtonPins, ButtonPoller};

    let rig = run::SimRig::assemble(opts, feed_ui::ConsolePanel::new(std::io::stdout()))?;
    let commands = rig.feed.commands();
    let post_timeout = opts.feed.bus.command.post_timeout();
    let _poller = ButtonPoller::spawn(
        ButtonPins {
            left: cfg.pins.left,
            right: cfg.pins.right,
            rapid: cfg.pins.rapid,
        },
        cfg.buttons.active_low,
        cfg.buttons.debounce_n,
        std::time::Duration::from_millis(cfg.buttons.poll_ms),
        move |id, edge| {
            if let Err(e) = commands.post(run::command_for(id, edge), post_timeout) {
                tracing::warn!(error = %e, "button event dropped");
            }
        },
    )?;
    tracing::info!("reading buttons; Ctrl-C to exit");
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    Ok(())
}
