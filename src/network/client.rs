//! Multiplexed client
//!
//! Lets several threads keep tagged requests in flight on one connection.
//!
//! ## Concurrency Model: Single Writer / Fan-out Reader
//!
//! - **Writes**: each caller encodes its sentence and writes it while
//!   holding the writer mutex, so sentences never interleave on the wire
//! - **Reads**: one dedicated reader thread owns the receive half, classifies
//!   every sentence and routes it by `.tag` to the caller's completion slot
//! - **Failure**: `!fatal`, a transport error or `disconnect()` fails every
//!   pending slot with `ConnectionClosed`
//!
//! ```text
//!   caller A ──┐                              ┌──▶ slot(tag 7) ──▶ caller A
//!   caller B ──┼─▶ Mutex<writer> ──▶ socket ──▶ reader thread ──▶ slot(tag 8) ──▶ caller B
//!   caller C ──┘                              └──▶ slot(tag 9) ──▶ caller C
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{ApiError, DeviceError, Result};
use crate::protocol::{
    read_sentence, write_sentence, Attributes, Command, Reply, ReplyKind, Sentence, Tag,
};
use super::abandoned::AbandonedTags;
use super::session::{CloseReason, Response, SessionState};
use super::transport::{ShutdownHandle, Transport, TransportReader, TransportWriter};

/// What the reader delivers to a waiting caller
#[derive(Debug)]
enum Event {
    Row(Attributes),
    Done(Attributes),
    Trap(DeviceError),
    Closed(String),
}

// =============================================================================
// Pending Request Table
// =============================================================================

#[derive(Default)]
struct PendingTable {
    /// Completion slot per in-flight tag
    slots: HashMap<Tag, Sender<Event>>,

    /// Tags nobody waits for anymore; replies are skipped until their `!done`,
    /// also when a new request has reused the tag
    abandoned: AbandonedTags,

    /// Set once the connection is gone
    closed: Option<CloseReason>,
}

impl PendingTable {
    fn register(&mut self, tag: Tag) -> Result<Receiver<Event>> {
        if let Some(reason) = &self.closed {
            return Err(ApiError::ConnectionClosed(reason.to_string()));
        }
        if self.slots.contains_key(&tag) {
            return Err(ApiError::InvalidCommand(format!(
                "tag {} is already in flight",
                tag
            )));
        }

        let (tx, rx) = channel::unbounded();
        self.slots.insert(tag, tx);
        Ok(rx)
    }

    fn abandon(&mut self, tag: Tag) {
        if self.slots.remove(&tag).is_some() {
            self.abandoned.insert(tag);
        }
    }

    /// Route one `!re` / `!done` / `!trap` to its slot
    fn dispatch(&mut self, reply: Reply) {
        let tag = match reply.tag {
            Some(tag) => tag,
            None => match self.sole_tag() {
                Some(tag) => tag,
                None => {
                    tracing::warn!(
                        "Dropping untagged {:?} reply with {} requests pending",
                        reply.kind,
                        self.slots.len()
                    );
                    return;
                }
            },
        };

        if self.abandoned.contains(tag) {
            if reply.kind == ReplyKind::Done {
                self.abandoned.remove(tag);
            }
            tracing::debug!("Skipping {:?} for abandoned tag {}", reply.kind, tag);
            return;
        }

        let terminal = reply.is_terminal();
        let trapped = reply.kind == ReplyKind::Trap;
        let event = match reply.kind {
            ReplyKind::Re => Event::Row(reply.attributes),
            ReplyKind::Done => Event::Done(reply.attributes),
            ReplyKind::Trap => Event::Trap(DeviceError::from_attributes(reply.attributes)),
            _ => return,
        };

        let slot = if terminal {
            self.slots.remove(&tag)
        } else {
            self.slots.get(&tag).cloned()
        };

        match slot {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!("Caller for tag {} went away", tag);
                }
                // The device follows a trap with a !done for the same tag
                if trapped {
                    self.abandoned.insert(tag);
                }
            }
            None => tracing::warn!("Dropping reply for unknown tag {}", tag),
        }
    }

    fn sole_tag(&self) -> Option<Tag> {
        if self.slots.len() == 1 {
            self.slots.keys().next().copied()
        } else {
            None
        }
    }

    /// Fail every pending request; returns false if already closed
    fn fail_all(&mut self, reason: CloseReason) -> bool {
        if self.closed.is_some() {
            return false;
        }

        let message = reason.to_string();
        for (_, tx) in self.slots.drain() {
            let _ = tx.send(Event::Closed(message.clone()));
        }
        self.abandoned.clear();
        self.closed = Some(reason);
        true
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    config: Config,
    writer: Mutex<TransportWriter>,
    pending: Mutex<PendingTable>,
    next_tag: AtomicU32,
    shutdown: ShutdownHandle,
}

impl Shared {
    fn close(&self, reason: CloseReason) {
        let first = self.pending.lock().fail_all(reason.clone());
        if first {
            match reason {
                CloseReason::Requested => tracing::debug!("Client disconnected"),
                ref other => tracing::warn!("Connection closed: {}", other),
            }
            self.shutdown.shutdown();
        }
    }

    fn close_reason(&self) -> Option<CloseReason> {
        self.pending.lock().closed.clone()
    }
}

fn reader_loop(mut reader: TransportReader, shared: Arc<Shared>) {
    let max_word_len = shared.config.max_word_len;

    loop {
        let sentence = match read_sentence(&mut reader, max_word_len) {
            Ok(sentence) => sentence,
            Err(ApiError::Timeout) => {
                if shared.close_reason().is_some() {
                    break;
                }
                continue;
            }
            Err(e) => {
                shared.close(CloseReason::from_error(&e));
                break;
            }
        };
        tracing::trace!("<- {}", sentence);

        let reply = match Reply::parse(&sentence) {
            Ok(reply) => reply,
            Err(e) => {
                shared.close(CloseReason::from_error(&e));
                break;
            }
        };

        match reply.kind {
            ReplyKind::Fatal => {
                shared.close(CloseReason::Fatal(reply.reason()));
                break;
            }
            ReplyKind::Re | ReplyKind::Done | ReplyKind::Trap => {
                shared.pending.lock().dispatch(reply)
            }
            _ => tracing::trace!("Ignoring {:?} reply", reply.kind),
        }
    }

    tracing::debug!("Reader thread exiting");
}

// =============================================================================
// Client
// =============================================================================

/// A logged-in connection shared by many callers
///
/// Every request is tagged. Create one with [`Client::open`] or
/// [`crate::Session::into_client`].
pub struct Client {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connect, log in, and start the reader thread
    pub fn open(config: Config) -> Result<Self> {
        super::Session::open(config)?.into_client()
    }

    pub(crate) fn start(config: Config, transport: Transport, first_tag: Tag) -> Result<Self> {
        let (mut reader, writer) = transport.split();

        // Idle waits are enforced per caller; the reader blocks until data or close
        reader.set_read_timeout(None)?;
        let shutdown = writer.shutdown_handle()?;

        let shared = Arc::new(Shared {
            config,
            writer: Mutex::new(writer),
            pending: Mutex::new(PendingTable::default()),
            next_tag: AtomicU32::new(first_tag),
            shutdown,
        });

        let reader_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tikapi-reader".to_string())
            .spawn(move || reader_loop(reader, reader_shared))?;

        Ok(Self {
            shared,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Run `path` with `attrs`, returning one map per result row
    pub fn execute<I, K, V>(&self, path: &str, attrs: I) -> Result<Vec<Attributes>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let command = Command::new(path).attributes(attrs);
        Ok(self.run(&command)?.into_rows())
    }

    /// Send a command and wait for its `!done` or `!trap`
    ///
    /// The idle timeout restarts with every `!re`; `command_timeout_ms`
    /// bounds the whole call.
    pub fn run(&self, command: &Command) -> Result<Response> {
        let (tag, rx) = self.submit(command)?;
        let deadline = self.shared.config.command_timeout().map(|d| Instant::now() + d);
        let mut rows = Vec::new();

        loop {
            match self.wait(tag, &rx, deadline)? {
                Event::Row(row) => rows.push(row),
                Event::Done(done) => return Ok(Response { rows, done }),
                Event::Trap(err) => return Err(ApiError::Device(err)),
                Event::Closed(reason) => return Err(ApiError::ConnectionClosed(reason)),
            }
        }
    }

    /// Send a command and iterate its rows as they arrive
    ///
    /// Meant for long-running commands (`/listen`, monitors). The iterator
    /// waits without an idle timeout; stop it with [`ReplyStream::cancel`].
    pub fn stream(&self, command: &Command) -> Result<ReplyStream<'_>> {
        let (tag, rx) = self.submit(command)?;
        Ok(ReplyStream {
            client: self,
            tag,
            rx,
            done: None,
            finished: false,
        })
    }

    /// Ask the device to stop the request tagged `tag`
    pub fn cancel(&self, tag: Tag) -> Result<()> {
        self.shared.pending.lock().abandon(tag);
        self.run(&Command::cancel(tag)).map(|_| ())
    }

    /// Number of requests awaiting their final reply
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().slots.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.close_reason().is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason()
    }

    /// `Ready` until the connection goes away
    pub fn state(&self) -> SessionState {
        match self.shared.close_reason() {
            Some(reason) => SessionState::Closed(reason),
            None => SessionState::Ready,
        }
    }

    /// Fail pending requests, close the socket and wait for the reader
    pub fn disconnect(&self) {
        self.shared.close(CloseReason::Requested);

        if let Some(handle) = self.reader.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("Reader thread panicked");
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Tag, register and write a command
    fn submit(&self, command: &Command) -> Result<(Tag, Receiver<Event>)> {
        let mut command = command.clone();
        let tag = match command.tag() {
            Some(tag) => tag,
            None => {
                let tag = self.shared.next_tag.fetch_add(1, Ordering::Relaxed);
                command.set_tag(tag);
                tag
            }
        };

        let words = command.to_words()?;
        let rx = self.shared.pending.lock().register(tag)?;
        tracing::trace!("-> {}", Sentence::from_words(&words));

        let written = {
            let mut writer = self.shared.writer.lock();
            write_sentence(&mut *writer, &words)
        };

        if let Err(e) = written {
            self.shared.pending.lock().slots.remove(&tag);
            // A failed write may leave half a sentence on the wire
            self.shared.close(CloseReason::from_error(&e));
            return Err(e);
        }

        tracing::debug!("Sent {} (tag {})", command.path(), tag);
        Ok((tag, rx))
    }

    fn wait(&self, tag: Tag, rx: &Receiver<Event>, deadline: Option<Instant>) -> Result<Event> {
        let idle = self.shared.config.read_timeout();
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let budget = match (idle, remaining) {
            (Some(idle), Some(remaining)) => Some(idle.min(remaining)),
            (idle, remaining) => idle.or(remaining),
        };

        let received = match budget {
            Some(budget) => rx.recv_timeout(budget),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("Request {} timed out; its late replies will be skipped", tag);
                self.shared.pending.lock().abandon(tag);
                Err(ApiError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> ApiError {
        match self.shared.close_reason() {
            Some(reason) => ApiError::ConnectionClosed(reason.to_string()),
            None => ApiError::ConnectionClosed("request slot dropped".to_string()),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.close(CloseReason::Requested);
    }
}

// =============================================================================
// Streaming replies
// =============================================================================

/// Rows of one in-flight request, yielded as they arrive
pub struct ReplyStream<'a> {
    client: &'a Client,
    tag: Tag,
    rx: Receiver<Event>,
    done: Option<Attributes>,
    finished: bool,
}

impl ReplyStream<'_> {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Attributes of the closing `!done`, once it has arrived
    pub fn done_attributes(&self) -> Option<&Attributes> {
        self.done.as_ref()
    }

    /// Send `/cancel` for this request and stop iterating
    pub fn cancel(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.client.cancel(self.tag)
    }
}

impl Iterator for ReplyStream<'_> {
    type Item = Result<Attributes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let event = match self.rx.recv() {
            Ok(event) => event,
            Err(_) => {
                self.finished = true;
                return Some(Err(self.client.closed_error()));
            }
        };

        match event {
            Event::Row(row) => Some(Ok(row)),
            Event::Done(done) => {
                self.finished = true;
                self.done = Some(done);
                None
            }
            Event::Trap(err) => {
                self.finished = true;
                Some(Err(ApiError::Device(err)))
            }
            Event::Closed(reason) => {
                self.finished = true;
                Some(Err(ApiError::ConnectionClosed(reason)))
            }
        }
    }
}

impl Drop for ReplyStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.client.shared.pending.lock().abandon(self.tag);
        }
    }
}
