use std::io;
use std::sync::mpsc;
use std::thread;

use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::app::{AppContext, Result, RssForwardError};
use crate::scheduler::{HealthState, Scheduler};
use crate::server::FeedServer;

/// Requests coming from process signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// SIGINT / SIGTERM
    Stop,
    /// SIGUSR1: run a cycle now
    Refresh,
    /// SIGUSR2: start or stop the feed server
    ToggleServer,
}

pub fn log_health(health: HealthState) {
    match health {
        HealthState::InProgress => info!(%health, "Generating feeds"),
        HealthState::Healthy => info!(%health, "All generators succeeded"),
        HealthState::Unhealthy => warn!(%health, "Some generators failed"),
    }
}

/// Main mode: loop (or run once) with optional file server.
pub fn run(ctx: &AppContext, no_server: bool, no_loop: bool) -> Result<()> {
    let general = &ctx.config.general;
    let scheduler = ctx.scheduler().with_state_callback(log_health);

    if no_loop || !general.gen_loop {
        let report = scheduler.execute_single();
        scheduler.close();
        if let Some(report) = report {
            info!(produced = report.produced, failed = report.failed.len(), "Single cycle done");
        }
        return Ok(());
    }

    let signals = listen_for_signals(&ctx.handle());

    if no_server || !general.start_server {
        let controller = scheduler.clone();
        thread::spawn(move || {
            while let Ok(control) = signals.recv() {
                match control {
                    Control::Stop => {
                        controller.stop();
                        break;
                    }
                    Control::Refresh => {
                        controller.execute_single();
                    }
                    Control::ToggleServer => warn!("Feed server is disabled"),
                }
            }
        });
        scheduler.execute_loop(general.refresh_interval(), general.startup_delay());
        shutdown(&scheduler, None);
        return Ok(());
    }

    let mut server = ctx.server();
    server.start()?;
    if let Err(e) = scheduler.start(general.refresh_interval(), general.startup_delay()) {
        server.stop();
        return Err(e.into());
    }

    // A closed channel means the signal listener died; treat it as a stop.
    while let Ok(control) = signals.recv() {
        match control {
            Control::Stop => break,
            Control::Refresh => {
                scheduler.execute_single();
            }
            Control::ToggleServer => {
                let on = !server.is_running();
                if let Err(e) = server.switch_state(on) {
                    error!("Failed to toggle feed server: {}", e);
                }
            }
        }
    }

    shutdown(&scheduler, Some(&mut server));
    Ok(())
}

/// Run one cycle; returns whether every generator succeeded.
pub fn generate(ctx: &AppContext) -> Result<bool> {
    let scheduler = ctx.scheduler().with_state_callback(log_health);
    let report = scheduler.execute_single().unwrap_or_default();
    scheduler.close();

    println!(
        "Generated {} of {} feeds",
        report.produced, report.generators
    );
    for id in &report.failed {
        println!("  failed: {}", id);
    }
    if report.write_errors > 0 {
        println!("  {} write errors", report.write_errors);
    }
    Ok(report.is_healthy())
}

pub fn list_generators(ctx: &AppContext) -> Result<()> {
    let generators = &ctx.config.generators;
    if generators.is_empty() {
        println!("No generators configured");
        return Ok(());
    }

    for spec in generators {
        let state = if spec.enabled { "enabled" } else { "disabled" };
        let auth = spec.auth.as_ref().map_or("none", |a| a.type_name());
        let known = if ctx.catalog.contains(&spec.kind) {
            ""
        } else {
            " (unknown kind)"
        };
        println!(
            "{}  [{}{}]  {}  auth: {}",
            spec.id, spec.kind, known, state, auth
        );
    }
    println!(
        "Output: {}",
        ctx.config.general.data_root.display()
    );
    Ok(())
}

pub fn open_log(ctx: &AppContext) -> Result<()> {
    let path = ctx.config.general.log_file();
    if !path.exists() {
        return Err(RssForwardError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no log file at {}", path.display()),
        )));
    }
    open::that(&path)?;
    Ok(())
}

/// Stop the loop, wait for it, release generators, then stop serving.
fn shutdown(scheduler: &Scheduler, server: Option<&mut FeedServer>) {
    scheduler.stop();
    scheduler.join();
    scheduler.close();
    if let Some(server) = server {
        server.stop();
    }
    info!("Shutdown complete");
}

fn listen_for_signals(runtime: &Handle) -> mpsc::Receiver<Control> {
    let (tx, rx) = mpsc::channel();
    runtime.spawn(async move {
        if let Err(e) = forward_signals(tx).await {
            error!("Failed to install signal handlers: {}", e);
        }
    });
    rx
}

#[cfg(unix)]
async fn forward_signals(tx: mpsc::Sender<Control>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut refresh = signal(SignalKind::user_defined1())?;
    let mut toggle = signal(SignalKind::user_defined2())?;

    loop {
        let control = tokio::select! {
            _ = interrupt.recv() => Control::Stop,
            _ = terminate.recv() => Control::Stop,
            _ = refresh.recv() => Control::Refresh,
            _ = toggle.recv() => Control::ToggleServer,
        };
        info!(?control, "Signal received");
        if tx.send(control).is_err() || control == Control::Stop {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(tx: mpsc::Sender<Control>) -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    let _ = tx.send(Control::Stop);
    Ok(())
}
