//! `platecam-cli` – interactive driver for the capture controller
//!
//! This binary runs a [`CaptureController`][platecam_kernel::CaptureController]
//! against the simulated camera and lets the operator play the part of the
//! platform: grant or deny permission, report frames, unplug the device.
//! It:
//!
//! 1. Loads `~/.platecam/config.toml`, writing the defaults on first run.
//! 2. Drops the user into an **interactive REPL** with slash-commands
//!    (`/enter`, `/grant`, `/frame`, `/capture`, `/upload`, `/help`, ...).
//! 3. Intercepts **Ctrl-C** so the camera is released before the process exits.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (defaults to "info").  Set
    // PLATECAM_LOG_FORMAT=json for newline-delimited JSON logs.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("PLATECAM_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – releasing the camera on the next prompt …"
                .yellow()
                .bold()
        );
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to release the camera");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    println!(
        "  Snapshots are written to {}",
        cfg.output_dir.display().to_string().bold()
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(cfg, shutdown);
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___  __      __                        "#.bold().cyan());
    println!("{}", r#"  / _ \/ /__ _ / /____ _______ ___ _  ___ "#.bold().cyan());
    println!("{}", r#" / ___/ / _ `// __/ -_) __/ _ `/  ' \/ _ \"#.bold().cyan());
    println!("{}", r#"/_/  /_/\_,_/ \__/\__/\__/\_,_/_/_/_/\___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "platecam".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Meal photo capture controller (simulated camera)");
    println!();
}
