//! REPL – Read-Eval-Print Loop driving a capture session.
//!
//! The operator plays the platform: `/grant`, `/deny`, `/frame` and
//! `/unplug` deliver the signals a real camera bridge would, tagged with the
//! current attempt.
//!
//! Supported slash-commands:
//!   /help               – show this list
//!   /status             – print the session as JSON
//!   /enter              – open the capture surface and request the camera
//!   /grant              – grant the pending permission prompt
//!   /deny [reason]      – deny the pending permission prompt
//!   /frame <w> <h>      – report a rendered frame of the given size
//!   /unplug             – disconnect the camera mid-stream
//!   /wait               – let the readiness timeout elapse
//!   /flash              – toggle the torch
//!   /zoom <level>       – set the zoom level
//!   /capture [file]     – save the live frame as a JPEG
//!   /upload <file>      – import an image file as a snapshot
//!   /exit               – close the capture surface
//!   /retry              – request the camera again after a failure
//!   /quit               – release everything and leave the CLI

use colored::Colorize;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::broadcast::{self, error::TryRecvError};

use platecam_hal::SimGateway;
use platecam_kernel::{AcquireFailure, CaptureController, Notice, Signal, snapshot_from_path};
use platecam_types::{CameraError, Snapshot};

use crate::config::Config;

type Controller = CaptureController<SimGateway>;

/// Largest width or height `/frame` accepts.
const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL releases the camera
/// and exits.
pub fn run(cfg: Config, shutdown: Arc<AtomicBool>) {
    let gateway = SimGateway::new().with_torch().with_zoom(1.0, 5.0, 0.1);
    let mut ctl = CaptureController::new(gateway, cfg.controller_config());
    let mut notices = ctl.subscribe();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        ctl.tick(Instant::now());
        print_notices(&mut notices);

        print!("{} ", format!("platecam[{}]>", ctl.state()).bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match cmd {
            "/help" => cmd_help(),
            "/status" => cmd_status(&ctl),
            "/enter" => cmd_enter(&mut ctl),
            "/grant" => cmd_grant(&mut ctl),
            "/deny" => cmd_deny(&mut ctl, &args),
            "/frame" => cmd_frame(&mut ctl, &args),
            "/unplug" => cmd_unplug(&mut ctl),
            "/wait" => cmd_wait(&mut ctl),
            "/flash" => match ctl.toggle_flash() {
                Ok(on) => println!("  Flash {}", if on { "on".green() } else { "off".dimmed() }),
                Err(e) => print_error(&e),
            },
            "/zoom" => cmd_zoom(&mut ctl, &args),
            "/capture" => cmd_capture(&mut ctl, &cfg, &args),
            "/upload" => cmd_upload(&cfg, &args),
            "/exit" => ctl.exit(),
            "/retry" => match ctl.retry() {
                Ok(attempt) => println!("  Requesting camera (attempt {})", attempt),
                Err(e) => print_error(&e),
            },
            "/quit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }

        print_notices(&mut notices);
    }

    ctl.exit();
    print_notices(&mut notices);
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "platecam Commands".bold().underline());
    println!("  {}          – print the session as JSON", "/status".bold().cyan());
    println!("  {}           – open the camera", "/enter".bold().cyan());
    println!("  {}           – grant the permission prompt", "/grant".bold().cyan());
    println!("  {}  – deny the permission prompt", "/deny [reason]".bold().cyan());
    println!("  {}  – report a rendered frame", "/frame <w> <h>".bold().cyan());
    println!("  {}          – disconnect the camera", "/unplug".bold().cyan());
    println!("  {}            – let the readiness timeout elapse", "/wait".bold().cyan());
    println!("  {}           – toggle the torch", "/flash".bold().cyan());
    println!("  {}    – set the zoom level", "/zoom <level>".bold().cyan());
    println!("  {}  – save the live frame as JPEG", "/capture [file]".bold().cyan());
    println!("  {}  – import an image file", "/upload <file>".bold().cyan());
    println!("  {}            – close the camera", "/exit".bold().cyan());
    println!("  {}           – try again after a failure", "/retry".bold().cyan());
    println!("  {}            – leave the CLI", "/quit".bold().cyan());
    println!();
}

fn cmd_status(ctl: &Controller) {
    match serde_json::to_string_pretty(&status_json(ctl)) {
        Ok(s) => println!("{s}"),
        Err(e) => println!("{}: {}", "Status error".red(), e),
    }
}

fn status_json(ctl: &Controller) -> serde_json::Value {
    let (width, height) = ctl.frame_size();
    serde_json::json!({
        "state": ctl.state(),
        "attempt": ctl.attempt(),
        "holds_stream": ctl.holds_stream(),
        "frame": { "width": width, "height": height },
        "readiness_remaining_ms": ctl
            .readiness_remaining(Instant::now())
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        "capabilities": ctl.capabilities(),
        "last_error": ctl.last_error().map(ToString::to_string),
    })
}

fn cmd_enter(ctl: &mut Controller) {
    match ctl.enter() {
        Ok(attempt) => println!(
            "  Requesting camera (attempt {}). Use {} or {}.",
            attempt,
            "/grant".bold(),
            "/deny".bold()
        ),
        Err(e) => print_error(&e),
    }
}

fn cmd_grant(ctl: &mut Controller) {
    let attempt = ctl.attempt();
    match ctl.gateway_mut().grant(attempt) {
        Some(stream) => {
            ctl.handle(attempt, Signal::PermissionResolved(Ok(stream)));
            println!(
                "  Permission granted. Report a frame with {}.",
                "/frame <w> <h>".bold()
            );
        }
        None => println!("  {}", "No camera request is pending.".yellow()),
    }
}

fn cmd_deny(ctl: &mut Controller, args: &[&str]) {
    let attempt = ctl.attempt();
    if !ctl.gateway_mut().deny(attempt) {
        println!("  {}", "No camera request is pending.".yellow());
        return;
    }
    let reason = if args.is_empty() {
        "access was blocked by the user".to_string()
    } else {
        args.join(" ")
    };
    ctl.handle(
        attempt,
        Signal::PermissionResolved(Err(AcquireFailure::Denied(reason))),
    );
}

fn cmd_frame(ctl: &mut Controller, args: &[&str]) {
    let Some((width, height)) = parse_frame_size(args) else {
        println!(
            "  Usage: {} (each at most {})",
            "/frame <width> <height>".bold(),
            MAX_FRAME_DIMENSION
        );
        return;
    };
    let attempt = ctl.attempt();
    ctl.gateway_mut().set_frame_size(width, height);
    ctl.handle(attempt, Signal::FrameReported { width, height });
}

fn cmd_unplug(ctl: &mut Controller) {
    let attempt = ctl.attempt();
    ctl.gateway_mut().unplug();
    ctl.handle(attempt, Signal::DeviceErrored("camera disconnected".to_string()));
}

fn cmd_wait(ctl: &mut Controller) {
    let deadline = Instant::now() + ctl.config().readiness_timeout();
    if !ctl.tick(deadline) {
        println!("  {}", "Nothing is waiting for a first frame.".dimmed());
    }
}

fn cmd_zoom(ctl: &mut Controller, args: &[&str]) {
    let Some(value) = args.first().and_then(|v| v.parse::<f64>().ok()) else {
        println!("  Usage: {}", "/zoom <level>".bold());
        return;
    };
    match ctl.set_zoom(value) {
        Ok(level) => println!("  Zoom set to {}", format!("{level:.1}x").bold()),
        Err(e) => print_error(&e),
    }
}

fn cmd_capture(ctl: &mut Controller, cfg: &Config, args: &[&str]) {
    match ctl.capture() {
        Ok(snapshot) => save_and_report(&snapshot, cfg, args.first().copied()),
        Err(e) => print_error(&e),
    }
}

fn cmd_upload(cfg: &Config, args: &[&str]) {
    let Some(path) = args.first() else {
        println!("  Usage: {}", "/upload <file>".bold());
        return;
    };
    match snapshot_from_path(Path::new(path), cfg.jpeg_quality) {
        Ok(snapshot) => save_and_report(&snapshot, cfg, None),
        Err(e) => print_error(&e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn save_and_report(snapshot: &Snapshot, cfg: &Config, target: Option<&str>) {
    let path = match target {
        Some(t) => PathBuf::from(t),
        None => cfg.output_dir.join(snapshot_file_name(snapshot)),
    };
    match write_snapshot(snapshot, &path) {
        Ok(()) => println!(
            "  {} {}x{} snapshot saved to {}",
            "✓".green().bold(),
            snapshot.width,
            snapshot.height,
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving snapshot".red(), e),
    }
}

/// `<timestamp>-<short id>.jpg`, unique per snapshot.
fn snapshot_file_name(snapshot: &Snapshot) -> String {
    let id = snapshot.id.simple().to_string();
    format!(
        "{}-{}.jpg",
        snapshot.captured_at.format("%Y%m%dT%H%M%S"),
        &id[..8]
    )
}

fn write_snapshot(snapshot: &Snapshot, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &snapshot.encoded_image)
}

fn parse_frame_size(args: &[&str]) -> Option<(u32, u32)> {
    let [w, h] = args else {
        return None;
    };
    let (w, h): (u32, u32) = (w.parse().ok()?, h.parse().ok()?);
    (w <= MAX_FRAME_DIMENSION && h <= MAX_FRAME_DIMENSION).then_some((w, h))
}

fn print_error(err: &CameraError) {
    println!("  {} {}", "✗".red().bold(), err);
}

fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    loop {
        match rx.try_recv() {
            Ok(Notice::StateChanged { attempt, from, to }) => {
                let to = if to.is_terminal() {
                    to.to_string().red().bold()
                } else {
                    to.to_string().green()
                };
                println!("  {} {} → {} ({})", "state".dimmed(), from, to, attempt);
            }
            // Command failures are printed where the command returns them.
            Ok(Notice::Warning(_)) => {}
            Err(TryRecvError::Lagged(n)) => {
                println!("  {}", format!("({n} notices dropped)").dimmed());
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platecam_types::{CaptureState, SnapshotSource};

    fn streaming_controller() -> Controller {
        let mut ctl = CaptureController::new(
            SimGateway::new().with_torch(),
            Config::default().controller_config(),
        );
        let attempt = ctl.enter().unwrap();
        let stream = ctl.gateway_mut().grant(attempt).unwrap();
        ctl.handle(attempt, Signal::PermissionResolved(Ok(stream)));
        ctl.gateway_mut().set_frame_size(64, 48);
        ctl.handle(attempt, Signal::FrameReported { width: 64, height: 48 });
        ctl
    }

    #[test]
    fn parse_frame_size_accepts_two_numbers() {
        assert_eq!(parse_frame_size(&["640", "480"]), Some((640, 480)));
        assert_eq!(parse_frame_size(&["640"]), None);
        assert_eq!(parse_frame_size(&["wide", "480"]), None);
        assert_eq!(parse_frame_size(&["1", "2", "3"]), None);
        assert_eq!(parse_frame_size(&["0", "0"]), Some((0, 0)));
    }

    #[test]
    fn parse_frame_size_rejects_absurd_sizes() {
        assert_eq!(parse_frame_size(&["4294967295", "4294967295"]), None);
        assert_eq!(parse_frame_size(&["70000", "480"]), None);
        assert_eq!(parse_frame_size(&["16384", "16384"]), Some((16_384, 16_384)));
    }

    #[test]
    fn oversized_frame_command_is_ignored() {
        let mut ctl = streaming_controller();
        cmd_frame(&mut ctl, &["4294967295", "4294967295"]);
        assert_eq!(ctl.frame_size(), (64, 48));
        assert!(ctl.capture().is_ok());
    }

    #[test]
    fn status_reports_state_and_capabilities() {
        let ctl = streaming_controller();
        let status = status_json(&ctl);
        assert_eq!(status["state"], "streaming");
        assert_eq!(status["frame"]["width"], 64);
        assert_eq!(status["capabilities"]["has_flash"], true);
        assert!(status["last_error"].is_null());
        assert!(status["readiness_remaining_ms"].is_null());
    }

    #[test]
    fn status_reports_last_error() {
        let mut ctl = CaptureController::new(SimGateway::new(), Config::default().controller_config());
        let attempt = ctl.enter().unwrap();
        ctl.gateway_mut().deny(attempt);
        ctl.handle(
            attempt,
            Signal::PermissionResolved(Err(AcquireFailure::Denied("blocked".into()))),
        );
        let status = status_json(&ctl);
        assert_eq!(status["state"], "denied");
        assert!(status["last_error"].as_str().unwrap().contains("blocked"));
        assert!(status["capabilities"].is_null());
    }

    #[test]
    fn captured_snapshot_is_written_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = streaming_controller();
        let snapshot = ctl.capture().unwrap();

        let path = dir.path().join("meals").join(snapshot_file_name(&snapshot));
        write_snapshot(&snapshot, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert!(path.to_string_lossy().ends_with(".jpg"));
        assert_eq!(ctl.state(), CaptureState::Streaming);
    }

    #[test]
    fn file_names_differ_per_snapshot() {
        let mut ctl = streaming_controller();
        let a = ctl.capture().unwrap();
        let b = ctl.capture().unwrap();
        assert_eq!(a.source, SnapshotSource::Camera);
        assert_ne!(snapshot_file_name(&a), snapshot_file_name(&b));
    }

    #[test]
    fn wait_times_out_a_silent_camera() {
        let mut ctl = CaptureController::new(SimGateway::new(), Config::default().controller_config());
        let attempt = ctl.enter().unwrap();
        let stream = ctl.gateway_mut().grant(attempt).unwrap();
        ctl.handle(attempt, Signal::PermissionResolved(Ok(stream)));

        cmd_wait(&mut ctl);
        assert_eq!(ctl.state(), CaptureState::Errored);
        assert_eq!(ctl.gateway().live_streams(), 0);
    }

    #[test]
    fn deny_without_pending_request_changes_nothing() {
        let mut ctl = CaptureController::new(SimGateway::new(), Config::default().controller_config());
        cmd_deny(&mut ctl, &[]);
        assert_eq!(ctl.state(), CaptureState::Idle);
    }
}
