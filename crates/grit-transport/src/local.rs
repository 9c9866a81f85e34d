//! Local transport: spawn the service binary directly for file paths.
//!
//! This is the reference `Command` implementation and the one the test
//! suite drives end to end (it only needs a git installation). Stderr is
//! drained on a background thread so a misbehaving remote cannot dead-lock
//! the pipe.

use std::io::{Read, Write};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::{Command, Service, TransportError};

/// A subprocess-backed remote command.
pub struct LocalCommand {
    path: String,
    service: Service,
    child: Option<Child>,
    stderr_buf: Arc<Mutex<Vec<u8>>>,
    stderr_thread: Option<JoinHandle<()>>,
}

impl LocalCommand {
    pub fn new(path: String, service: Service) -> Self {
        Self {
            path,
            service,
            child: None,
            stderr_buf: Arc::new(Mutex::new(Vec::new())),
            stderr_thread: None,
        }
    }

    fn child_mut(&mut self) -> Result<&mut Child, TransportError> {
        self.child.as_mut().ok_or(TransportError::NotStarted)
    }
}

impl Command for LocalCommand {
    fn start(&mut self) -> Result<(), TransportError> {
        if self.child.is_some() {
            return Err(TransportError::ConnectionFailed(
                "command already started".into(),
            ));
        }

        let mut child = ProcessCommand::new(self.service.as_str())
            .arg(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!(
                    "failed to spawn {}: {e}",
                    self.service.as_str()
                ))
            })?;

        if let Some(mut stderr) = child.stderr.take() {
            let buf = Arc::clone(&self.stderr_buf);
            self.stderr_thread = Some(std::thread::spawn(move || {
                let mut collected = Vec::new();
                let _ = stderr.read_to_end(&mut collected);
                buf.lock().expect("stderr buffer lock").extend(collected);
            }));
        }

        self.child = Some(child);
        Ok(())
    }

    fn stdin(&mut self) -> Result<&mut dyn Write, TransportError> {
        let child = self.child_mut()?;
        child
            .stdin
            .as_mut()
            .map(|s| s as &mut dyn Write)
            .ok_or(TransportError::NotStarted)
    }

    fn stdout(&mut self) -> Result<&mut dyn Read, TransportError> {
        let child = self.child_mut()?;
        child
            .stdout
            .as_mut()
            .map(|s| s as &mut dyn Read)
            .ok_or(TransportError::NotStarted)
    }

    fn stderr(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(self.stderr_buf.lock().expect("stderr buffer lock").clone())
    }

    fn close_stdin(&mut self) -> Result<(), TransportError> {
        if let Some(child) = self.child.as_mut() {
            drop(child.stdin.take());
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<(), TransportError> {
        let child = self.child_mut()?;
        let status = child.wait()?;
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
        if !status.success() {
            return Err(TransportError::CommandFailed(status.code().unwrap_or(-1)));
        }
        Ok(())
    }
}

impl Drop for LocalCommand {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Unterminated command on drop: reap rather than leak.
            drop(child.stdin.take());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
