pub mod commands;
pub mod repl;

pub use commands::{Cli, Commands, Origin};

use std::io::Write;
use tokio::sync::mpsc;

/// Write every handshake to `out` until all senders are dropped.
pub async fn print_handshakes(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut out: impl Write,
) {
    while let Some(message) = rx.recv().await {
        if writeln!(out, "{message}").is_err() {
            break;
        }
    }
}
