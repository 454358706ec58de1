// Process wiring: serial port, key source, interrupt handling
//
// The teleop loop is blocking, so it runs on a blocking task while the async
// side waits for an interrupt signal. In raw mode Ctrl+C arrives as a key and
// the loop handles it itself; the signal path covers `kill -INT` and piped
// sessions.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::bpl::{BplBus, SerialChannel};
use crate::config::{Args, TeleopConfig};
use crate::keyboard::{ByteKeys, KeySource, TerminalKeys};
use crate::messages::Status;
use crate::teleop::{run_session, Teleop, TeleopError};

/// How long an interrupted session gets to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Resolve the config and run one teleop session. Returns how it ended.
pub async fn run(args: Args) -> Result<Status, TeleopError> {
    let config = args.resolve()?;
    info!(
        "Using {} at {} baud, wrist 0x{:02X}, gripper 0x{:02X}",
        config.port, config.baud_rate, config.wrist_id, config.gripper_id
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let session_shutdown = shutdown.clone();

    let mut session =
        tokio::task::spawn_blocking(move || run_blocking(&config, session_shutdown));

    tokio::select! {
        joined = &mut session => joined?,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Interrupt signal received"),
                Err(e) => warn!("Failed to listen for interrupt signal: {}", e),
            }
            shutdown.store(true, Ordering::SeqCst);

            match tokio::time::timeout(SHUTDOWN_GRACE, session).await {
                Ok(joined) => joined?,
                Err(_) => {
                    // A blocking stdin read can't be cancelled; the caller exits the process
                    warn!("Session did not stop within {:?}", SHUTDOWN_GRACE);
                    let status = Status::Interrupted;
                    let mut stdout = io::stdout();
                    writeln!(stdout, "{}", status)
                        .and_then(|_| stdout.flush())
                        .map_err(TeleopError::Output)?;
                    Ok(status)
                }
            }
        }
    }
}

/// Open the port and run the session on the current thread
fn run_blocking(config: &TeleopConfig, shutdown: Arc<AtomicBool>) -> Result<Status, TeleopError> {
    let channel = SerialChannel::open(&config.port, config.baud_rate)?;
    let teleop = Teleop::new(BplBus::new(channel), config);

    let mut keys: Box<dyn KeySource> = if io::stdin().is_terminal() {
        Box::new(TerminalKeys::new(shutdown).map_err(TeleopError::Input)?)
    } else {
        info!("stdin is not a terminal, reading keys from the stream");
        Box::new(ByteKeys::with_shutdown(io::stdin().lock(), shutdown))
    };

    // Not locked for the whole session, so the signal path can still print
    let mut stdout = io::stdout();
    run_session(teleop, &mut keys, &mut stdout)
}
