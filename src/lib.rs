pub mod bridge;
pub mod cli;
pub mod error;
pub mod session;
pub mod settings;

use anyhow::{Context, Result};
use bridge::{Role, SessionState};
use clap::Parser;
use cli::CliArgs;
use log::{error, info};
use session::{LifecycleController, LifecycleOptions, ScriptedBackend, SessionConfig};
use settings::{load_settings, AppSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use error::{BridgeError, BridgeResult};

/// Install the console logger. `RUST_LOG` wins when set; otherwise `info`, or `debug`
/// in debug mode.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

#[cfg(unix)]
fn register_shutdown(flag: &Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    signal_hook::flag::register(SIGINT, Arc::clone(flag))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(flag))?;
    Ok(())
}

#[cfg(not(unix))]
fn register_shutdown(_flag: &Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

fn print_new_records(state: &SessionState, printed: &mut usize) {
    let history = state.conversation_history();
    if history.len() < *printed {
        // History was cleared.
        *printed = 0;
    }
    for record in &history[*printed..] {
        match record.role {
            Role::User => println!("You: {}", record.content),
            Role::Assistant => println!("Assistant: {}", record.content),
        }
    }
    *printed = history.len();
}

/// Run one session from the console: this thread is the consumer, ticking the bridge
/// until the session ends or the process is interrupted.
pub fn run() -> Result<()> {
    let args = CliArgs::parse();

    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => AppSettings::default(),
    };
    args.apply_to(&mut settings);
    init_logging(settings.debug_mode);

    let shutdown = Arc::new(AtomicBool::new(false));
    register_shutdown(&shutdown).context("failed to install signal handlers")?;

    let config = SessionConfig::from_settings(&settings);
    let backend = Arc::new(ScriptedBackend::new(args.script.clone()));
    let controller = LifecycleController::new(backend, LifecycleOptions::from_settings(&settings));
    let mut state = SessionState::new();

    controller.request_start(&config)?;
    info!("Conversation started, press Ctrl-C to stop");

    let tick = Duration::from_millis(args.tick_ms.max(10));
    let mut printed = 0;
    loop {
        let report = controller.apply_pending(&mut state);
        for e in &report.errors {
            error!("{}", e);
        }
        print_new_records(&state, &mut printed);

        if shutdown.load(Ordering::SeqCst) {
            info!("Interrupted, stopping conversation");
            break;
        }
        if !controller.is_alive() {
            if let Some(e) = controller.last_error() {
                error!("Session ended with error: {}", e);
            }
            break;
        }
        std::thread::sleep(tick);
    }

    let outcome = controller.request_stop()?;
    controller.apply_pending(&mut state);
    print_new_records(&state, &mut printed);
    info!(
        "Conversation finished ({:?}), {} message(s), active: {}",
        outcome,
        state.conversation_history().len(),
        state.is_active()
    );
    Ok(())
}
