//! The response correlator: matches server responses to pending commands.
//!
//! The server answers commands strictly in the order it received them,
//! but a single answer may be split over many `Response` frames. Every
//! command is therefore followed on the wire by an empty terminator frame
//! (id [`TERMINATOR_ID`]); when the server echoes that terminator, all
//! fragments for the command have arrived.
//!
//! ```text
//! write: [cmd A][term] [cmd B][term]
//! read:  [A₁][A₂][term echo] [B₁][term echo]
//!                  │                   │
//!                  ▼                   ▼
//!             resolve A           resolve B
//! ```
//!
//! # Completion signals
//!
//! Two signals close the accumulating response:
//!
//! - the terminator echo (empty body, terminator id), and
//! - the sentinel marker, but only when fragments have accumulated. The
//!   terminator echo that is still owed for that command is swallowed
//!   when it shows up. A sentinel with nothing accumulated is a trailing
//!   duplicate and is ignored.
//!
//! # Abandoned commands
//!
//! A command that times out or is hit by a bad packet has its caller
//! rejected immediately, but its slot stays in the queue. The server will
//! still answer it, and the slot soaks that answer up so it isn't
//! attributed to the next command.
//!
//! A bad packet is special: the decoder throws away everything buffered,
//! which may include the abandoned command's terminator echo. Such a slot
//! therefore only soaks up fragments carrying its own wire id. The first
//! fragment with any other id belongs to a later command, so the slot is
//! dropped at that point instead of consuming that command's terminator.

use std::collections::VecDeque;
use std::time::Duration;

use rcon_protocol::{KEEP_ALIVE_ID, TERMINATOR_ID};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::SessionError;

/// A fully reassembled response, tagged with the command that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The command text as submitted.
    pub command: String,
    /// All body fragments, concatenated in arrival order.
    pub body: String,
}

/// Where a command's outcome is delivered. Used exactly once.
pub type ResponseSink = oneshot::Sender<Result<Response, SessionError>>;

/// One slot in the FIFO queue.
struct PendingCommand {
    /// Wire id the command was sent with.
    id: i32,
    command: String,
    /// `None` once the caller has been answered (timeout, desync).
    sink: Option<ResponseSink>,
    deadline: Option<Instant>,
    /// Hit by a bad packet; its terminator echo may have been discarded.
    desynced: bool,
}

impl PendingCommand {
    fn reject(&mut self, err: SessionError) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.send(Err(err));
        }
    }

    fn is_live(&self) -> bool {
        self.sink.is_some()
    }
}

/// Owns the in-flight command queue and the accumulation buffer for one
/// connection.
///
/// The correlator is not thread-safe and doesn't need to be: it is owned
/// by the connection's supervisor task and only touched from there.
pub struct Correlator {
    /// Submitted commands whose terminator echo hasn't arrived, oldest
    /// first.
    queue: VecDeque<PendingCommand>,

    /// Body fragments received so far for the head of the queue.
    accumulating: String,

    /// Terminator echoes still expected for commands that were already
    /// closed out by a sentinel.
    owed_terminators: usize,

    /// Per-command bound; `None` waits forever.
    timeout: Option<Duration>,
}

impl Correlator {
    /// Creates an empty correlator with the given per-command timeout.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            queue: VecDeque::new(),
            accumulating: String::new(),
            owed_terminators: 0,
            timeout,
        }
    }

    /// Appends a command to the tail of the queue.
    ///
    /// Call this *before* writing the command to the socket so a write
    /// failure can reject it through [`fail_all`](Self::fail_all).
    pub fn enqueue(&mut self, id: i32, command: String, sink: ResponseSink) {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        tracing::debug!(id, %command, queued = self.queue.len() + 1, "command enqueued");
        self.queue.push_back(PendingCommand {
            id,
            command,
            sink: Some(sink),
            deadline,
            desynced: false,
        });
    }

    /// Routes one `Response`-type frame.
    ///
    /// Returns the completed response when this frame closed out a live
    /// command.
    ///
    /// # Errors
    /// Returns [`SessionError::ProtocolDesync`] when the body contains an
    /// embedded NUL, i.e. several responses were glued together without a
    /// boundary. The head command is rejected and the accumulator reset
    /// before returning.
    pub fn on_response(&mut self, id: i32, body: &str) -> Result<Option<Response>, SessionError> {
        if body.contains('\0') {
            self.on_bad_packet();
            return Err(SessionError::ProtocolDesync);
        }

        if id == KEEP_ALIVE_ID {
            tracing::trace!("keep-alive echo");
            return Ok(None);
        }

        if body.is_empty() {
            if id == TERMINATOR_ID {
                return Ok(self.on_terminator());
            }
            // A command with no output, or the auth preamble.
            return Ok(None);
        }

        self.drop_desynced_head(id);
        if self.queue.is_empty() {
            tracing::debug!(id, len = body.len(), "dropping unsolicited response fragment");
            return Ok(None);
        }

        self.accumulating.push_str(body);
        Ok(None)
    }

    /// Routes a sentinel marker.
    pub fn on_sentinel(&mut self) -> Option<Response> {
        if self.accumulating.is_empty() {
            tracing::trace!("ignoring trailing sentinel");
            return None;
        }
        self.owed_terminators += 1;
        self.complete_head()
    }

    /// Recovers from a corrupt inbound stream.
    ///
    /// Clears the accumulator and rejects the head command with
    /// [`SessionError::ProtocolDesync`]. Its slot is kept so the rest of
    /// its answer is still consumed, up to the first fragment that carries
    /// a different id.
    pub fn on_bad_packet(&mut self) {
        self.accumulating.clear();
        if let Some(head) = self.queue.front_mut() {
            tracing::warn!(id = head.id, command = %head.command, "rejecting command after bad packet");
            head.reject(SessionError::ProtocolDesync);
            head.desynced = true;
        }
    }

    /// Rejects every live command whose deadline is at or before `now`.
    ///
    /// Returns how many commands timed out.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for (index, pending) in self.queue.iter_mut().enumerate() {
            let due = pending.deadline.is_some_and(|d| d <= now);
            if !(due && pending.is_live()) {
                continue;
            }
            tracing::warn!(command = %pending.command, "command timed out");
            pending.reject(SessionError::CommandTimeout);
            if index == 0 {
                self.accumulating.clear();
            }
            expired += 1;
        }
        expired
    }

    /// The earliest deadline among commands still waiting for an answer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue
            .iter()
            .filter(|p| p.is_live())
            .filter_map(|p| p.deadline)
            .min()
    }

    /// Rejects every pending command with `err` and resets all state.
    ///
    /// Used on disconnect and on close.
    pub fn fail_all(&mut self, err: SessionError) {
        let count = self.queue.iter().filter(|p| p.is_live()).count();
        if count > 0 {
            tracing::info!(count, error = %err, "rejecting pending commands");
        }
        for mut pending in self.queue.drain(..) {
            pending.reject(err.clone());
        }
        self.accumulating.clear();
        self.owed_terminators = 0;
    }

    /// Number of queue slots, including abandoned ones.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of commands whose callers are still waiting.
    pub fn in_flight(&self) -> usize {
        self.queue.iter().filter(|p| p.is_live()).count()
    }

    /// Pops a desynced head once a fragment for another command shows up.
    /// Its terminator echo was lost with the discarded buffer.
    fn drop_desynced_head(&mut self, id: i32) {
        while let Some(head) = self.queue.front() {
            if !head.desynced || head.id == id {
                return;
            }
            tracing::debug!(
                id = head.id,
                next_id = id,
                command = %head.command,
                "dropping desynced command, its terminator was lost"
            );
            self.queue.pop_front();
            self.accumulating.clear();
        }
    }

    fn on_terminator(&mut self) -> Option<Response> {
        if self.owed_terminators > 0 {
            self.owed_terminators -= 1;
            // Anything that trickled in after the sentinel belongs to the
            // command that was already resolved.
            self.accumulating.clear();
            return None;
        }
        self.complete_head()
    }

    fn complete_head(&mut self) -> Option<Response> {
        let body = std::mem::take(&mut self.accumulating);

        let Some(mut pending) = self.queue.pop_front() else {
            return None;
        };

        let Some(sink) = pending.sink.take() else {
            tracing::debug!(
                command = %pending.command,
                len = body.len(),
                "discarding response for abandoned command"
            );
            return None;
        };

        tracing::debug!(command = %pending.command, len = body.len(), "command completed");
        let response = Response {
            command: pending.command,
            body,
        };
        // The caller may have stopped waiting; the response is still
        // returned so it can be published.
        let _ = sink.send(Ok(response.clone()));
        Some(response)
    }
}

// =========================================================================
// Tests
// =========================================================================
