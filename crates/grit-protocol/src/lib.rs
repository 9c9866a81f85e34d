//! Client side of the git wire protocol (upload-pack v1).
//!
//! Bytes flow bottom-up: pkt-line framing, then the advertised-refs and
//! upload-request codecs, then the session state machine that drives a
//! `git-upload-pack` conversation and hands the packfile stream off to the
//! caller.

pub mod advrefs;
pub mod capability;
pub mod pktline;
pub mod session;
pub mod sideband;
pub mod uploadreq;

pub use advrefs::AdvRefs;
pub use capability::Capabilities;
pub use session::{PackReader, UploadPackSession};
pub use uploadreq::{Depth, UploadRequest};

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed pkt-line length: {0}")]
    MalformedLength(String),

    #[error("pkt-line payload too long: {0} bytes")]
    PayloadTooLong(usize),

    #[error("empty pkt-line payload")]
    EmptyPayload,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("session already connected")]
    AlreadyConnected,

    #[error("session not connected")]
    NotConnected,

    #[error("advertised references already fetched")]
    AdvertisedReferencesAlreadyCalled,

    #[error("server answered with an unsupported ack mode: {0}")]
    UnsupportedAckMode(String),

    #[error("remote repository not found")]
    RepositoryNotFound,

    #[error("remote repository is empty")]
    EmptyRemoteRepository,

    #[error("remote requires authorization")]
    AuthorizationRequired,

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Transport(#[from] grit_transport::TransportError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Short stable tag for operational errors, for façades to render.
    /// Messages may change; tags do not.
    pub fn stable_tag(&self) -> Option<&'static str> {
        match self {
            Self::RepositoryNotFound => Some("repository_not_found"),
            Self::EmptyRemoteRepository => Some("empty_remote_repository"),
            Self::AuthorizationRequired => Some("authorization_required"),
            _ => None,
        }
    }
}
