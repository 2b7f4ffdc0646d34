//! Child process with a drained stdout pipe.
//!
//! A reader thread copies the child's stdout into a shared pending buffer so
//! the owner can poll it without blocking.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use audio_bridge_core::models::error::BridgeError;

const READ_CHUNK: usize = 4096;

pub struct PipedChild {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    pending: Arc<Mutex<Vec<u8>>>,
    reader: Option<thread::JoinHandle<()>>,
}

impl PipedChild {
    /// Spawn `program` with piped stdout (and stdin when `with_stdin`).
    ///
    /// A missing binary maps to [`BridgeError::InitializationFailed`].
    pub fn spawn(program: &str, args: &[String], with_stdin: bool) -> Result<Self, BridgeError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BridgeError::InitializationFailed(format!("{} not found in PATH", program)),
                _ => BridgeError::Io(format!("failed to spawn {}: {}", program, e)),
            })?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Io(format!("{} has no stdout pipe", program)))?;

        let pending = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pending);
        let name = program.to_string();
        let reader = thread::Builder::new()
            .name(format!("{}-reader", program))
            .spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::debug!("{} stdout read failed: {}", name, e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| BridgeError::Io(format!("failed to spawn reader thread: {}", e)))?;

        log::debug!("Spawned {} (pid {})", program, child.id());
        Ok(Self {
            program: program.to_string(),
            child,
            stdin,
            pending,
            reader: Some(reader),
        })
    }

    /// Everything read from stdout since the last call.
    pub fn take_pending(&self) -> Vec<u8> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Whether the child has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit description once the child is gone.
    pub fn exit_reason(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => Some(format!("{} exited with {}", self.program, status)),
            Err(e) => Some(format!("{} wait failed: {}", self.program, e)),
        }
    }

    pub fn write_stdin(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BridgeError::Io(format!("{} stdin closed", self.program)))?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(())
    }

    /// Close stdin so a filter process can flush and exit on its own.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Kill the child, reap it and join the reader thread.
    pub fn kill(mut self) {
        self.close_stdin();
        if self.is_running() {
            if let Err(e) = self.child.kill() {
                log::warn!("Failed to kill {}: {}", self.program, e);
            }
        }
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
