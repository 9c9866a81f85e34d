//! The upload-pack client session.
//!
//! A session drives one fetch conversation:
//!
//! ```text
//! Idle ──connect──▶ Connected ──advertised_references──▶ InfoFetched
//!      ──fetch──▶ Streaming ──close──▶ Closed
//! ```
//!
//! Each transition is guarded by an explicit state check; misuse surfaces
//! as `AlreadyConnected`, `NotConnected`, or
//! `AdvertisedReferencesAlreadyCalled` instead of protocol garbage. The
//! session negotiates the plain single-`NAK` mode only: servers that
//! answer with multi-ack chatter fail `UnsupportedAckMode`.

use std::io::Read;

use grit_transport::{Command, Endpoint, Service};
use grit_utils::CancelToken;

use crate::advrefs::AdvRefs;
use crate::capability::{Capabilities, KNOWN_CAPABILITIES};
use crate::pktline::{PktLine, Scanner};
use crate::uploadreq::UploadRequest;
use crate::ProtocolError;

/// Client agent token sent with every request.
pub const AGENT: &str = concat!("grit/", env!("CARGO_PKG_VERSION"));

/// Remote stderr prefixes that mean "no such repository".
const REPO_NOT_FOUND_PREFIXES: &[&str] = &[
    "ERROR: Repository not found",               // GitHub
    "conq: repository does not exist",           // Bitbucket
    "remote: ERROR: The project you were looking for could not be found", // GitLab
    "fatal: 'not-found' does not appear to be a git repository",
];

/// Substrings that mean the remote wants credentials.
const AUTH_REQUIRED_MARKERS: &[&str] = &[
    "Permission denied (publickey)",
    "fatal: Authentication failed",
    "fatal: could not read Username",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Connected,
    InfoFetched,
    Streaming,
    Closed,
}

/// One upload-pack conversation. Not safe for concurrent use; a session
/// supports a single outstanding fetch.
pub struct UploadPackSession {
    endpoint: Endpoint,
    command: Option<Box<dyn Command>>,
    state: State,
    server_caps: Capabilities,
}

impl UploadPackSession {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            command: None,
            state: State::Idle,
            server_caps: Capabilities::new(),
        }
    }

    /// Wrap an externally built command (network transports, tests). The
    /// command must not be started yet.
    pub fn with_command(endpoint: Endpoint, command: Box<dyn Command>) -> Self {
        Self {
            endpoint,
            command: Some(command),
            state: State::Idle,
            server_caps: Capabilities::new(),
        }
    }

    /// Open the transport. Fails `AlreadyConnected` when called twice.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.state != State::Idle {
            return Err(ProtocolError::AlreadyConnected);
        }
        if self.command.is_none() {
            self.command = Some(grit_transport::connect(
                &self.endpoint,
                Service::UploadPack,
            )?);
        }
        self.command
            .as_mut()
            .expect("command just ensured")
            .start()?;
        self.state = State::Connected;
        Ok(())
    }

    /// Read the initial reference advertisement. Single-shot: a second
    /// call fails `AdvertisedReferencesAlreadyCalled`.
    ///
    /// Unknown capabilities are dropped before the advertisement is
    /// returned. An empty remote closes the session and reports
    /// `EmptyRemoteRepository`.
    pub fn advertised_references(&mut self) -> Result<AdvRefs, ProtocolError> {
        match self.state {
            State::Connected => {}
            State::Idle | State::Closed => return Err(ProtocolError::NotConnected),
            State::InfoFetched | State::Streaming => {
                return Err(ProtocolError::AdvertisedReferencesAlreadyCalled)
            }
        }

        let command = self.command.as_mut().expect("connected session has command");
        let decoded = AdvRefs::decode(command.stdout()?);

        let mut adv = match decoded {
            Ok(adv) => adv,
            Err(e) => {
                // The remote may have explained itself on stderr; reap the
                // command first so the stderr capture is complete.
                self.state = State::Closed;
                let _ = command.close_stdin();
                let _ = command.wait();
                let stderr = command.stderr().unwrap_or_default();
                return Err(classify_remote_error(&stderr).unwrap_or(e));
            }
        };

        let advertised = adv.capabilities.entries().len();
        adv.capabilities = adv.capabilities.filter_known(KNOWN_CAPABILITIES);
        let dropped = advertised - adv.capabilities.entries().len();
        if dropped > 0 {
            log::debug!("dropped {dropped} unsupported server capabilities");
        }
        self.server_caps = adv.capabilities.clone();

        if adv.is_empty() {
            self.state = State::Closed;
            let command = self.command.as_mut().expect("command present");
            let _ = command.close_stdin();
            let _ = command.wait();
            return Err(ProtocolError::EmptyRemoteRepository);
        }

        self.state = State::InfoFetched;
        Ok(adv)
    }

    /// Send the fetch request and hand back the packfile stream.
    ///
    /// The request is validated, the write half closed after `done`, and
    /// exactly one `NAK` consumed before the hand-off. Closing the
    /// returned reader waits for the remote command to exit.
    pub fn fetch(
        &mut self,
        request: &UploadRequest,
        cancel: &CancelToken,
    ) -> Result<PackReader, ProtocolError> {
        match self.state {
            State::InfoFetched => {}
            State::Idle | State::Closed => return Err(ProtocolError::NotConnected),
            State::Connected => {
                return Err(ProtocolError::Protocol(
                    "advertised references not read yet".into(),
                ))
            }
            State::Streaming => {
                return Err(ProtocolError::Protocol(
                    "a fetch is already outstanding".into(),
                ))
            }
        }

        request.validate()?;
        if cancel.is_canceled() {
            return Err(ProtocolError::Canceled);
        }

        let caps = self.request_capabilities();
        let command = self.command.as_mut().expect("command present");

        request.encode(command.stdin()?, &caps)?;
        command.close_stdin()?;

        if cancel.is_canceled() {
            return Err(ProtocolError::Canceled);
        }
        read_negotiation_close(command.stdout()?)?;

        self.state = State::Streaming;
        Ok(PackReader {
            command: self.command.take(),
        })
    }

    /// Close the session, reaping the transport if still held.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.state = State::Closed;
        if let Some(mut command) = self.command.take() {
            command.close()?;
        }
        Ok(())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Capabilities to put on the first want line: the protocol minimum
    /// plus what the server offers that the engine can use.
    fn request_capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::new();
        if self.server_caps.supports("ofs-delta") {
            caps.set("ofs-delta", None);
        }
        caps.set("report-status", None);
        caps.set("agent", Some(AGENT));
        caps
    }
}

/// A read-closeable packfile stream.
///
/// Everything after the `NAK` is raw pack bytes. `close` waits for the
/// remote command to exit; dropping without closing reaps it without
/// waiting.
pub struct PackReader {
    command: Option<Box<dyn Command>>,
}

impl std::fmt::Debug for PackReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackReader")
            .field("command", &self.command.is_some())
            .finish()
    }
}

impl PackReader {
    /// Finish the stream: wait for the transport command to exit.
    pub fn close(mut self) -> Result<(), ProtocolError> {
        if let Some(mut command) = self.command.take() {
            command.close()?;
        }
        Ok(())
    }
}

impl Read for PackReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let command = self
            .command
            .as_mut()
            .ok_or_else(|| std::io::Error::other("pack reader closed"))?;
        let stdout = command.stdout().map_err(std::io::Error::other)?;
        stdout.read(out)
    }
}

/// Consume the single frame that closes negotiation.
///
/// In the un-negotiated ack mode the server answers `done` with exactly
/// one frame: `NAK` when it found no common base, or a bare `ACK <hash>`
/// for the last common commit. Multi-ack chatter (`ACK <hash> continue`,
/// `common`, `ready`) means the server is in a mode the engine never
/// requested, and fails `UnsupportedAckMode`.
fn read_negotiation_close(reader: impl Read) -> Result<(), ProtocolError> {
    let mut scanner = Scanner::new(reader);
    match scanner.read_pkt()? {
        PktLine::Data(line) => {
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            if text == "NAK" {
                return Ok(());
            }
            if let Some(rest) = text.strip_prefix("ACK ") {
                let mut words = rest.split(' ');
                let hash = words.next().unwrap_or("");
                let status = words.next();
                return match status {
                    None if grit_hash::ObjectId::from_hex(hash).is_ok() => Ok(()),
                    _ => Err(ProtocolError::UnsupportedAckMode(text.to_string())),
                };
            }
            Err(ProtocolError::Protocol(format!(
                "expected NAK, got '{text}'"
            )))
        }
        other => Err(ProtocolError::Protocol(format!(
            "expected NAK, got {other:?}"
        ))),
    }
}

/// Map remote stderr output to a protocol error, when recognizable.
fn classify_remote_error(stderr: &[u8]) -> Option<ProtocolError> {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for line in text.lines() {
        let line = line.trim();
        if REPO_NOT_FOUND_PREFIXES.iter().any(|p| line.starts_with(p))
            || line.contains("does not appear to be a git repository")
        {
            return Some(ProtocolError::RepositoryNotFound);
        }
        if AUTH_REQUIRED_MARKERS.iter().any(|m| line.contains(m)) {
            return Some(ProtocolError::AuthorizationRequired);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::Encoder;
    use grit_hash::ObjectId;
    use grit_transport::TransportError;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    const HASH1: &str = "95d09f2b10159347eece71399a7e2e907ea3df4f";

    /// Scripted command: serves canned stdout/stderr, captures stdin.
    struct MockCommand {
        stdout: Cursor<Vec<u8>>,
        stderr: Vec<u8>,
        stdin: MockStdin,
        started: bool,
        waited: Arc<Mutex<bool>>,
    }

    impl MockCommand {
        fn new(stdout: Vec<u8>) -> Self {
            Self {
                stdout: Cursor::new(stdout),
                stderr: Vec::new(),
                stdin: MockStdin(Arc::new(Mutex::new(Vec::new()))),
                started: false,
                waited: Arc::new(Mutex::new(false)),
            }
        }

        fn with_stderr(mut self, stderr: &str) -> Self {
            self.stderr = stderr.as_bytes().to_vec();
            self
        }

        fn stdin_handle(&self) -> Arc<Mutex<Vec<u8>>> {
            Arc::clone(&self.stdin.0)
        }

        fn waited_handle(&self) -> Arc<Mutex<bool>> {
            Arc::clone(&self.waited)
        }
    }

    struct MockStdin(Arc<Mutex<Vec<u8>>>);
    impl Write for MockStdin {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Command for MockCommand {
        fn start(&mut self) -> Result<(), TransportError> {
            self.started = true;
            Ok(())
        }
        fn stdin(&mut self) -> Result<&mut dyn Write, TransportError> {
            Ok(&mut self.stdin)
        }
        fn stdout(&mut self) -> Result<&mut dyn Read, TransportError> {
            Ok(&mut self.stdout)
        }
        fn stderr(&mut self) -> Result<Vec<u8>, TransportError> {
            Ok(self.stderr.clone())
        }
        fn close_stdin(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        fn wait(&mut self) -> Result<(), TransportError> {
            *self.waited.lock().unwrap() = true;
            Ok(())
        }
    }

    fn advertisement(lines: &[String]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        for line in lines {
            enc.write_text(line).unwrap();
        }
        enc.write_flush().unwrap();
        buf
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("/srv/repo.git").unwrap()
    }

    #[test]
    fn connect_twice_is_already_connected() {
        let stdout = advertisement(&[format!("{HASH1} HEAD\0agent=git/2.39.0")]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();
        assert!(matches!(
            session.connect().unwrap_err(),
            ProtocolError::AlreadyConnected
        ));
    }

    #[test]
    fn advertised_references_requires_connect() {
        let mut session = UploadPackSession::with_command(
            endpoint(),
            Box::new(MockCommand::new(Vec::new())),
        );
        assert!(matches!(
            session.advertised_references().unwrap_err(),
            ProtocolError::NotConnected
        ));
    }

    #[test]
    fn advertised_references_is_single_shot() {
        let stdout = advertisement(&[
            format!("{HASH1} HEAD\0ofs-delta agent=git/2.39.0"),
            format!("{HASH1} refs/heads/main"),
        ]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();

        let adv = session.advertised_references().unwrap();
        assert_eq!(adv.references.len(), 2);
        assert!(matches!(
            session.advertised_references().unwrap_err(),
            ProtocolError::AdvertisedReferencesAlreadyCalled
        ));
    }

    #[test]
    fn unknown_capabilities_are_filtered() {
        let stdout = advertisement(&[format!(
            "{HASH1} HEAD\0ofs-delta brand-new-wire-cap agent=git/2.39.0"
        )]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();

        let adv = session.advertised_references().unwrap();
        assert!(adv.capabilities.supports("ofs-delta"));
        assert!(!adv.capabilities.supports("brand-new-wire-cap"));
    }

    #[test]
    fn empty_remote_repository_sentinel() {
        let stdout = advertisement(&[format!(
            "{} capabilities^{{}}\0agent=git/2.39.0",
            ObjectId::NULL
        )]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();

        let err = session.advertised_references().unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyRemoteRepository));
        assert_eq!(err.stable_tag(), Some("empty_remote_repository"));
    }

    #[test]
    fn stderr_maps_to_repository_not_found() {
        let mut session = UploadPackSession::with_command(
            endpoint(),
            Box::new(
                MockCommand::new(Vec::new())
                    .with_stderr("ERROR: Repository not found.\n"),
            ),
        );
        session.connect().unwrap();

        let err = session.advertised_references().unwrap_err();
        assert!(matches!(err, ProtocolError::RepositoryNotFound));
        assert_eq!(err.stable_tag(), Some("repository_not_found"));
    }

    #[test]
    fn stderr_maps_to_authorization_required() {
        let mut session = UploadPackSession::with_command(
            endpoint(),
            Box::new(
                MockCommand::new(Vec::new())
                    .with_stderr("git@host: Permission denied (publickey).\n"),
            ),
        );
        session.connect().unwrap();

        let err = session.advertised_references().unwrap_err();
        assert!(matches!(err, ProtocolError::AuthorizationRequired));
    }

    #[test]
    fn fetch_before_advertisement_is_rejected() {
        let stdout = advertisement(&[format!("{HASH1} HEAD\0agent=git/2.39.0")]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();

        let request = UploadRequest::new([ObjectId::from_hex(HASH1).unwrap()]);
        assert!(matches!(
            session.fetch(&request, &CancelToken::new()).unwrap_err(),
            ProtocolError::Protocol(_)
        ));
    }

    #[test]
    fn full_fetch_flow_hands_off_pack_stream() {
        // Script: advertisement, then NAK, then raw pack bytes.
        let mut stdout = advertisement(&[
            format!("{HASH1} HEAD\0ofs-delta agent=git/2.39.0"),
            format!("{HASH1} refs/heads/main"),
        ]);
        Encoder::new(&mut stdout).write_text("NAK").unwrap();
        stdout.extend_from_slice(b"PACK....raw-bytes....");

        let mock = MockCommand::new(stdout);
        let sent = mock.stdin_handle();
        let waited = mock.waited_handle();

        let mut session = UploadPackSession::with_command(endpoint(), Box::new(mock));
        session.connect().unwrap();
        let adv = session.advertised_references().unwrap();

        let want = adv.reference("refs/heads/main").unwrap();
        let mut request = UploadRequest::new([want]);
        request.haves = vec![ObjectId::from_hex("6ecf0ef2c2dffb796033e5a02219af86ec6584e5").unwrap()];

        let mut reader = session.fetch(&request, &CancelToken::new()).unwrap();
        let mut pack = Vec::new();
        reader.read_to_end(&mut pack).unwrap();
        assert_eq!(pack, b"PACK....raw-bytes....");

        // Closing the reader waits for the command.
        reader.close().unwrap();
        assert!(*waited.lock().unwrap());

        // The request carried the wants, haves, done, and our agent.
        let sent = sent.lock().unwrap();
        let text = String::from_utf8_lossy(&sent);
        assert!(text.contains(&format!("want {HASH1} ofs-delta report-status agent={AGENT}")));
        assert!(text.contains("have 6ecf0ef2c2dffb796033e5a02219af86ec6584e5"));
        assert!(text.ends_with("0009done\n"));

        // A second fetch on the same session is refused.
        assert!(session.fetch(&request, &CancelToken::new()).is_err());
    }

    #[test]
    fn multi_ack_answer_is_unsupported() {
        let mut stdout = advertisement(&[format!(
            "{HASH1} HEAD\0multi_ack agent=git/2.39.0"
        )]);
        Encoder::new(&mut stdout)
            .write_text(&format!("ACK {HASH1} common"))
            .unwrap();

        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();
        session.advertised_references().unwrap();

        let request = UploadRequest::new([ObjectId::from_hex(HASH1).unwrap()]);
        assert!(matches!(
            session.fetch(&request, &CancelToken::new()).unwrap_err(),
            ProtocolError::UnsupportedAckMode(_)
        ));
    }

    #[test]
    fn canceled_fetch_returns_immediately() {
        let stdout = advertisement(&[format!("{HASH1} HEAD\0agent=git/2.39.0")]);
        let mut session =
            UploadPackSession::with_command(endpoint(), Box::new(MockCommand::new(stdout)));
        session.connect().unwrap();
        session.advertised_references().unwrap();

        let token = CancelToken::new();
        token.cancel();
        let request = UploadRequest::new([ObjectId::from_hex(HASH1).unwrap()]);
        assert!(matches!(
            session.fetch(&request, &token).unwrap_err(),
            ProtocolError::Canceled
        ));
    }

    #[test]
    fn classify_prefixes() {
        assert!(matches!(
            classify_remote_error(b"ERROR: Repository not found.\n"),
            Some(ProtocolError::RepositoryNotFound)
        ));
        assert!(matches!(
            classify_remote_error(b"conq: repository does not exist.\n"),
            Some(ProtocolError::RepositoryNotFound)
        ));
        assert!(matches!(
            classify_remote_error(
                b"fatal: '/x' does not appear to be a git repository\n"
            ),
            Some(ProtocolError::RepositoryNotFound)
        ));
        assert!(matches!(
            classify_remote_error(b"fatal: Authentication failed for 'https://x'\n"),
            Some(ProtocolError::AuthorizationRequired)
        ));
        assert!(classify_remote_error(b"something else entirely\n").is_none());
    }

    #[test]
    fn negotiation_close_parsing() {
        let mut nak = Vec::new();
        Encoder::new(&mut nak).write_text("NAK").unwrap();
        assert!(read_negotiation_close(Cursor::new(nak)).is_ok());

        // Bare final ACK: the no-multi_ack common-base answer.
        let mut plain_ack = Vec::new();
        Encoder::new(&mut plain_ack)
            .write_text(&format!("ACK {HASH1}"))
            .unwrap();
        assert!(read_negotiation_close(Cursor::new(plain_ack)).is_ok());

        // Multi-ack statuses were never requested.
        for status in ["continue", "common", "ready"] {
            let mut ack = Vec::new();
            Encoder::new(&mut ack)
                .write_text(&format!("ACK {HASH1} {status}"))
                .unwrap();
            assert!(matches!(
                read_negotiation_close(Cursor::new(ack)).unwrap_err(),
                ProtocolError::UnsupportedAckMode(_)
            ));
        }

        let mut bad_hash = Vec::new();
        Encoder::new(&mut bad_hash).write_text("ACK not-a-hash").unwrap();
        assert!(read_negotiation_close(Cursor::new(bad_hash)).is_err());

        let mut junk = Vec::new();
        Encoder::new(&mut junk).write_text("ERR upload-pack: oops").unwrap();
        assert!(matches!(
            read_negotiation_close(Cursor::new(junk)).unwrap_err(),
            ProtocolError::Protocol(_)
        ));
    }
}
