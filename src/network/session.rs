//! Session
//!
//! Drives the login handshake and the one-request-at-a-time command cycle
//! over an exclusively owned [`Transport`].
//!
//! ## State Machine
//!
//! ```text
//!  Disconnected ──connect──▶ Connecting ──login──▶ LoggingIn ──!done──▶ Ready ◀─┐
//!                               │                     │                   │     │
//!                               │ connect error       │ !trap / !fatal    │  command
//!                               ▼                     ▼ timeout           │  cycle
//!                             Closed ◀────────────────┴───────────────────┘─────┘
//!                                      disconnect / !fatal / transport error
//! ```

use std::fmt;
use std::time::Instant;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::protocol::{
    read_sentence, write_sentence, Attributes, Command, Reply, ReplyKind, Sentence, Tag,
};
use super::abandoned::AbandonedTags;
use super::client::Client;
use super::transport::Transport;

/// Why a session reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `disconnect()` was called
    Requested,
    AuthenticationFailed(String),
    /// The device sent `!fatal`
    Fatal(String),
    /// Socket failure or peer close
    Transport(String),
    /// Framing failure; the stream lost alignment
    Protocol(String),
}

impl CloseReason {
    pub(crate) fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::AuthenticationFailed(msg) => CloseReason::AuthenticationFailed(msg.clone()),
            ApiError::Protocol(e) => CloseReason::Protocol(e.to_string()),
            ApiError::ConnectionClosed(msg) => CloseReason::Transport(msg.clone()),
            other => CloseReason::Transport(other.to_string()),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => f.write_str("closed by client"),
            CloseReason::AuthenticationFailed(msg) => write!(f, "authentication failed: {}", msg),
            CloseReason::Fatal(msg) => write!(f, "device sent !fatal: {}", msg),
            CloseReason::Transport(msg) => f.write_str(msg),
            CloseReason::Protocol(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Socket connected, login not yet sent
    Connecting,
    LoggingIn,
    Ready,
    Closed(CloseReason),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("Disconnected"),
            SessionState::Connecting => f.write_str("Connecting"),
            SessionState::LoggingIn => f.write_str("LoggingIn"),
            SessionState::Ready => f.write_str("Ready"),
            SessionState::Closed(reason) => write!(f, "Closed ({})", reason),
        }
    }
}

/// Result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// One entry per `!re`
    pub rows: Vec<Attributes>,

    /// Attributes carried by `!done` (e.g. `ret` after an add)
    pub done: Attributes,
}

impl Response {
    /// Rows, with non-empty `!done` attributes appended as a final row
    pub fn into_rows(mut self) -> Vec<Attributes> {
        if !self.done.is_empty() {
            self.rows.push(self.done);
        }
        self.rows
    }
}

/// A connection to one device
///
/// Only one request is in flight at a time. Use [`Session::into_client`]
/// for concurrent tagged requests.
pub struct Session {
    config: Config,
    state: SessionState,
    transport: Option<Transport>,

    /// Next auto-assigned tag
    next_tag: Tag,

    /// Tags whose trailing replies must be skipped
    /// (timed out, trapped or cancelled requests)
    abandoned: AbandonedTags,
}

impl Session {
    /// Create a disconnected session
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            transport: None,
            next_tag: 1,
            abandoned: AbandonedTags::default(),
        }
    }

    /// Create a session over an already open transport, ready for `login`
    pub fn with_transport(config: Config, transport: Transport) -> Self {
        let mut session = Self::new(config);
        session.transport = Some(transport);
        session.state = SessionState::Connecting;
        session
    }

    /// Connect and log in with the credentials from `config`
    pub fn open(config: Config) -> Result<Self> {
        let username = config.username.clone();
        let password = config.password.clone();

        let mut session = Self::new(config);
        session.connect()?;
        session.login(&username, &password)?;
        Ok(session)
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Open the TCP connection
    pub fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(self.invalid_state("Disconnected"));
        }
        self.config.validate()?;
        self.transition(SessionState::Connecting);

        match Transport::connect(&self.config) {
            Ok(transport) => {
                tracing::debug!("Connected to {}", transport.peer_addr());
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                self.close(CloseReason::Transport(e.to_string()));
                Err(e)
            }
        }
    }

    /// Submit plaintext credentials
    ///
    /// Any failure closes the session; a timeout is reported as
    /// `AuthenticationFailed`.
    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state != SessionState::Connecting || self.transport.is_none() {
            return Err(self.invalid_state("Connecting"));
        }
        self.transition(SessionState::LoggingIn);

        let mut command = Command::login(username, password);
        if self.config.auto_tag {
            command.set_tag(self.allocate_tag());
        }

        match self.login_exchange(&command) {
            Ok(()) => {
                self.transition(SessionState::Ready);
                tracing::info!("Logged in as {}", username);
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    ApiError::Timeout => ApiError::AuthenticationFailed(
                        "timed out waiting for login reply".to_string(),
                    ),
                    other => other,
                };
                self.close(CloseReason::from_error(&err));
                Err(err)
            }
        }
    }

    fn login_exchange(&mut self, command: &Command) -> Result<()> {
        let words = command.to_words()?;
        self.send_words(&words)?;

        loop {
            let reply = self.next_reply()?;
            match reply.kind {
                ReplyKind::Done => {
                    if let Some(challenge) = reply.attributes.get("ret") {
                        return Err(ApiError::AuthenticationFailed(format!(
                            "device requested legacy challenge login (ret={})",
                            challenge
                        )));
                    }
                    if let Some(message) = reply.attributes.get("message") {
                        return Err(ApiError::AuthenticationFailed(message.clone()));
                    }
                    return Ok(());
                }
                ReplyKind::Trap => {
                    return Err(ApiError::AuthenticationFailed(
                        reply.into_device_error().message,
                    ));
                }
                ReplyKind::Fatal => return Err(ApiError::AuthenticationFailed(reply.reason())),
                _ => tracing::trace!("Ignoring {:?} during login", reply.kind),
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Run `path` with `attrs`, returning one map per result row
    pub fn execute<I, K, V>(&mut self, path: &str, attrs: I) -> Result<Vec<Attributes>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let command = Command::new(path).attributes(attrs);
        Ok(self.run(&command)?.into_rows())
    }

    /// Send a command and collect its replies until `!done` or `!trap`
    pub fn run(&mut self, command: &Command) -> Result<Response> {
        self.ensure_ready()?;

        let mut command = command.clone();
        if command.tag().is_none() && self.config.auto_tag {
            command.set_tag(self.allocate_tag());
        }
        let tag = command.tag();

        let words = command.to_words()?;
        self.send_words(&words)?;
        tracing::debug!("Sent {} (tag {:?})", command.path(), tag);

        let deadline = self.config.command_timeout().map(|d| Instant::now() + d);
        let mut rows = Vec::new();

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.abandon(tag));
            }

            let reply = match self.next_reply() {
                Ok(reply) => reply,
                Err(ApiError::Timeout) => return Err(self.abandon(tag)),
                Err(e) => return Err(self.fail(e)),
            };

            if reply.kind == ReplyKind::Fatal {
                let reason = CloseReason::Fatal(reply.reason());
                let err = ApiError::ConnectionClosed(reason.to_string());
                self.close(reason);
                return Err(err);
            }

            if !self.belongs_to(&reply, tag) {
                continue;
            }

            match reply.kind {
                ReplyKind::Re => rows.push(reply.attributes),
                ReplyKind::Done => {
                    return Ok(Response {
                        rows,
                        done: reply.attributes,
                    })
                }
                ReplyKind::Trap => {
                    // The device follows a trap with a !done for the same tag
                    if let Some(tag) = tag {
                        self.abandoned.insert(tag);
                    }
                    let err = reply.into_device_error();
                    tracing::debug!("{} trapped: {}", command.path(), err);
                    return Err(ApiError::Device(err));
                }
                _ => tracing::trace!("Ignoring {:?} reply", reply.kind),
            }
        }
    }

    /// Ask the device to stop the request tagged `tag`
    ///
    /// Replies still arriving for `tag` are skipped.
    pub fn cancel(&mut self, tag: Tag) -> Result<()> {
        self.ensure_ready()?;
        self.abandoned.insert(tag);
        self.run(&Command::cancel(tag)).map(|_| ())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the connection; safe to call in any state
    pub fn disconnect(&mut self) {
        if !matches!(self.state, SessionState::Closed(_)) {
            self.close(CloseReason::Requested);
        }
    }

    /// Hand the connection to a multiplexing [`Client`]
    pub fn into_client(mut self) -> Result<Client> {
        self.ensure_ready()?;
        let transport = self
            .transport
            .take()
            .ok_or_else(|| ApiError::ConnectionClosed("transport missing".to_string()))?;
        Client::start(self.config.clone(), transport, self.next_tag)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Reason the session closed, if it has
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match &self.state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn allocate_tag(&mut self) -> Tag {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        tag
    }

    /// Write one sentence; any write failure leaves a partial frame behind
    /// and closes the session
    fn send_words(&mut self, words: &[String]) -> Result<()> {
        tracing::trace!("-> {}", Sentence::from_words(words));

        let result = match self.transport.as_mut() {
            Some(transport) => write_sentence(transport, words),
            None => return Err(self.closed_error()),
        };

        if let Err(e) = result {
            self.close(CloseReason::from_error(&e));
            return Err(e);
        }
        Ok(())
    }

    fn next_reply(&mut self) -> Result<Reply> {
        let max_word_len = self.config.max_word_len;
        let sentence = match self.transport.as_mut() {
            Some(transport) => read_sentence(transport, max_word_len)?,
            None => return Err(self.closed_error()),
        };
        tracing::trace!("<- {}", sentence);
        Reply::parse(&sentence)
    }

    /// Decide whether `reply` answers the request tagged `tag`
    ///
    /// An abandoned tag is skipped up to and including its `!done`, even
    /// when the current request reuses it: the old request's replies were
    /// sent first.
    fn belongs_to(&mut self, reply: &Reply, tag: Option<Tag>) -> bool {
        let got = match reply.tag {
            Some(got) => got,
            // Untagged replies answer the only outstanding request
            None => return true,
        };

        if self.abandoned.contains(got) {
            if reply.kind == ReplyKind::Done {
                self.abandoned.remove(got);
            }
            tracing::debug!("Skipping {:?} for abandoned tag {}", reply.kind, got);
            return false;
        }
        if tag == Some(got) {
            return true;
        }

        tracing::warn!("Dropping {:?} reply for unknown tag {}", reply.kind, got);
        false
    }

    /// Give up on the current request after a timeout
    fn abandon(&mut self, tag: Option<Tag>) -> ApiError {
        match tag {
            Some(tag) => {
                tracing::debug!("Request {} timed out; its late replies will be skipped", tag);
                self.abandoned.insert(tag);
            }
            None => tracing::warn!("Untagged request timed out; late replies cannot be told apart"),
        }
        ApiError::Timeout
    }

    /// Close the session if `err` is fatal, then hand it back
    fn fail(&mut self, err: ApiError) -> ApiError {
        if err.is_fatal() {
            self.close(CloseReason::from_error(&err));
        }
        err
    }

    fn close(&mut self, reason: CloseReason) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
        match reason {
            CloseReason::Requested => tracing::debug!("Session closed by client"),
            ref other => tracing::warn!("Session closed: {}", other),
        }
        self.state = SessionState::Closed(reason);
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Session {} -> {}", self.state, next);
        self.state = next;
    }

    fn ensure_ready(&self) -> Result<()> {
        match &self.state {
            SessionState::Ready => Ok(()),
            SessionState::Closed(_) => Err(self.closed_error()),
            _ => Err(self.invalid_state("Ready")),
        }
    }

    fn closed_error(&self) -> ApiError {
        match &self.state {
            SessionState::Closed(reason) => ApiError::ConnectionClosed(reason.to_string()),
            other => ApiError::ConnectionClosed(format!("no transport in state {}", other)),
        }
    }

    fn invalid_state(&self, expected: &'static str) -> ApiError {
        ApiError::InvalidState {
            expected,
            actual: self.state.to_string(),
        }
    }
}
