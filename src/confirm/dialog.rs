//! Native desktop confirmation dialog.
//!
//! macOS uses `osascript` (`display dialog`), other Unix desktops use
//! `zenity --question`. Both exit with status 1 when the user declines.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ConfirmationRequest, Confirmer};
use crate::error::{Result, SqlGateError};

const EXECUTE_BUTTON: &str = "Execute";
const CANCEL_BUTTON: &str = "Cancel";

/// Confirms through a native dialog window.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogConfirmer;

impl DialogConfirmer {
    pub fn new() -> Self {
        Self
    }
}

/// Quotes a value as an AppleScript string literal.
fn applescript_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn osascript_command(request: &ConfirmationRequest) -> Command {
    let script = format!(
        "display dialog {} with title {} buttons {{\"{CANCEL_BUTTON}\", \"{EXECUTE_BUTTON}\"}} default button \"{CANCEL_BUTTON}\" with icon caution",
        applescript_string(&request.render()),
        applescript_string(&request.title()),
    );
    let mut cmd = Command::new("osascript");
    cmd.arg("-e").arg(script);
    cmd
}

fn zenity_command(request: &ConfirmationRequest) -> Command {
    let mut cmd = Command::new("zenity");
    cmd.arg("--question")
        .arg("--no-markup")
        .arg("--width=640")
        .arg(format!("--title={}", request.title()))
        .arg(format!("--text={}", request.render()))
        .arg(format!("--ok-label={EXECUTE_BUTTON}"))
        .arg(format!("--cancel-label={CANCEL_BUTTON}"));
    cmd
}

fn dialog_command(request: &ConfirmationRequest) -> Command {
    let mut cmd = if cfg!(target_os = "macos") {
        osascript_command(request)
    } else {
        zenity_command(request)
    };
    cmd.kill_on_drop(true);
    cmd
}

#[async_trait]
impl Confirmer for DialogConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        let output = dialog_command(request)
            .output()
            .await
            .map_err(|e| SqlGateError::confirmation(format!("dialog error: {e}")))?;

        debug!("Dialog exited with {:?}", output.status.code());
        match output.status.code() {
            Some(0) if cfg!(target_os = "macos") => {
                Ok(String::from_utf8_lossy(&output.stdout).contains(EXECUTE_BUTTON))
            }
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(SqlGateError::confirmation(format!(
                "dialog error: {} {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}
