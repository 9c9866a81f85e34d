//! Transport abstraction for the grit wire protocol.
//!
//! A transport turns an endpoint plus a service name into a running
//! remote command with the usual three streams. The engine itself ships
//! only the local subprocess transport (spawning `git-upload-pack`
//! directly for file paths); network transports are external collaborators
//! that implement the same `Command` interface.

pub mod endpoint;
pub mod local;

pub use endpoint::{Endpoint, Scheme};

use std::io::{Read, Write};

/// Errors that can occur at the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("remote command exited with code {0}")]
    CommandFailed(i32),

    #[error("command not started")]
    NotStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Service to invoke on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// `git-upload-pack` (fetch/clone).
    UploadPack,
    /// `git-receive-pack` (push). Out of the engine's scope, named for
    /// completeness of the interface.
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }
}

/// A remote service process: three streams plus lifecycle.
///
/// `start` launches the process; `stdin`/`stdout` panic-free access
/// requires a started command. `close` shuts the write half and waits for
/// exit, so a caller holding the read half drains the full response first.
pub trait Command: Send {
    /// Launch the remote process. Fails if already started.
    fn start(&mut self) -> Result<(), TransportError>;

    /// The write half toward the remote.
    fn stdin(&mut self) -> Result<&mut dyn Write, TransportError>;

    /// The read half from the remote.
    fn stdout(&mut self) -> Result<&mut dyn Read, TransportError>;

    /// Everything the remote wrote to stderr so far.
    fn stderr(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Close the write half without waiting.
    fn close_stdin(&mut self) -> Result<(), TransportError>;

    /// Wait for the process to exit. Nonzero exit is `CommandFailed`.
    fn wait(&mut self) -> Result<(), TransportError>;

    /// Close stdin and wait for exit.
    fn close(&mut self) -> Result<(), TransportError> {
        self.close_stdin()?;
        self.wait()
    }
}

/// Open a (not yet started) command for the endpoint and service.
pub fn connect(
    endpoint: &Endpoint,
    service: Service,
) -> Result<Box<dyn Command>, TransportError> {
    match endpoint.scheme {
        Scheme::File | Scheme::Local => Ok(Box::new(local::LocalCommand::new(
            endpoint.path.clone(),
            service,
        ))),
        other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
}
