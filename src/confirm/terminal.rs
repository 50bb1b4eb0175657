//! Confirmation prompt on the controlling terminal.
//!
//! stdin/stdout carry the protocol, so the prompt talks to `/dev/tty`
//! directly. Runs on the blocking pool.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use async_trait::async_trait;

use super::{ConfirmationRequest, Confirmer};
use crate::error::{Result, SqlGateError};

const DEFAULT_TTY: &str = "/dev/tty";

/// Confirms by asking on a terminal device.
#[derive(Debug, Clone)]
pub struct TerminalConfirmer {
    tty: PathBuf,
}

impl TerminalConfirmer {
    pub fn new() -> Self {
        Self::with_device(DEFAULT_TTY)
    }

    /// Uses another terminal device.
    pub fn with_device(path: impl Into<PathBuf>) -> Self {
        Self { tty: path.into() }
    }
}

impl Default for TerminalConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the request and reads one answer line; only `y`/`yes` approves.
fn prompt<R: BufRead, W: Write>(request: &ConfirmationRequest, input: &mut R, output: &mut W) -> io::Result<bool> {
    writeln!(output, "\n=== {} ===", request.title())?;
    writeln!(output, "{}", request.render())?;
    write!(output, "[y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "terminal closed"));
    }
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        let tty = self.tty.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let device = OpenOptions::new().read(true).write(true).open(&tty)?;
            let mut output = device.try_clone()?;
            let mut input = BufReader::new(device);
            prompt(&request, &mut input, &mut output)
        })
        .await
        .map_err(|e| SqlGateError::confirmation(format!("terminal prompt failed: {e}")))?
        .map_err(|e| SqlGateError::confirmation(format!("terminal prompt failed: {e}")))
    }
}
