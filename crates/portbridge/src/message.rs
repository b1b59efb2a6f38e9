use std::fmt;

use portbridge_term::OwnedTerm;

use crate::channel::{ChannelId, SeqRef};
use crate::host::Target;

// Wire-level command tags. `CMD_APP_BASE` and above are free for
// application-defined commands; the tags below are reserved.
pub const CMD_STOP: u32 = 1;
pub const CMD_OUTPUT: u32 = 2;
pub const CMD_SEND_TERM: u32 = 3;
pub const CMD_APP_BASE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stop,
    Output,
    SendTerm,
    App(u32),
}

impl Command {
    pub fn code(self) -> u32 {
        match self {
            Command::Stop => CMD_STOP,
            Command::Output => CMD_OUTPUT,
            Command::SendTerm => CMD_SEND_TERM,
            Command::App(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Command {
        match code {
            CMD_STOP => Command::Stop,
            CMD_OUTPUT => Command::Output,
            CMD_SEND_TERM => Command::SendTerm,
            other => Command::App(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Stop => f.write_str("stop"),
            Command::Output => f.write_str("output"),
            Command::SendTerm => f.write_str("send_term"),
            Command::App(code) => write!(f, "app({code})"),
        }
    }
}

/// Release hook for payload memory with a caller-defined owner. Invoked
/// exactly once, with the bytes, when the message is freed.
pub type ReleaseFn = Box<dyn FnOnce(Box<[u8]>) + Send + 'static>;

/// Bytes paired with a release hook. The hook runs on drop, on whichever
/// thread finishes processing the message.
pub struct HookedBytes {
    bytes: Option<Box<[u8]>>,
    release: Option<ReleaseFn>,
}

impl HookedBytes {
    pub fn new(bytes: Box<[u8]>, release: ReleaseFn) -> HookedBytes {
        HookedBytes {
            bytes: Some(bytes),
            release: Some(release),
        }
    }

    pub fn data(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or(&[])
    }
}

impl Drop for HookedBytes {
    fn drop(&mut self) {
        if let (Some(bytes), Some(release)) = (self.bytes.take(), self.release.take()) {
            release(bytes);
        }
    }
}

impl fmt::Debug for HookedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedBytes")
            .field("len", &self.data().len())
            .finish()
    }
}

/// Payload storage. Exactly one disposal mode applies per message.
#[derive(Debug)]
pub enum Payload {
    /// Owned by the message, freed with it.
    Bytes(Box<[u8]>),
    /// Caller-owned memory the message must never free.
    Static(&'static [u8]),
    /// Memory with a caller-supplied release hook.
    Hooked(HookedBytes),
    /// A proxied term; its words and chunk storage are freed with the
    /// message.
    Term(OwnedTerm),
}

impl Payload {
    pub fn data(&self) -> &[u8] {
        match self {
            Payload::Bytes(b) => b,
            Payload::Static(b) => b,
            Payload::Hooked(h) => h.data(),
            Payload::Term(_) => &[],
        }
    }

    pub fn term(&self) -> Option<&OwnedTerm> {
        match self {
            Payload::Term(t) => Some(t),
            _ => None,
        }
    }
}

/// Message envelope. Immutable once enqueued; ownership moves to the
/// queue on send and to the consumer on receive, and the payload's
/// disposal mode runs exactly once when the final owner drops it.
#[derive(Debug)]
pub struct Message {
    pub cmd: Command,
    pub payload: Payload,
    /// Sending channel, stamped at enqueue time by `Channel::send`.
    pub source: Option<ChannelId>,
    /// Reply target for request messages.
    pub from: Option<Target>,
    /// Delivery target for proxied terms.
    pub to: Option<Target>,
    /// Correlation reference matching a reply to its request.
    pub seq: Option<SeqRef>,
}

impl Message {
    fn with_payload(cmd: Command, payload: Payload) -> Message {
        Message {
            cmd,
            payload,
            source: None,
            from: None,
            to: None,
            seq: None,
        }
    }

    /// A message owning a copy of `payload`.
    pub fn new(cmd: Command, payload: &[u8]) -> Message {
        Message::with_payload(cmd, Payload::Bytes(Box::from(payload)))
    }

    pub fn stop() -> Message {
        Message::with_payload(Command::Stop, Payload::Static(&[]))
    }

    pub fn with_static(cmd: Command, payload: &'static [u8]) -> Message {
        Message::with_payload(cmd, Payload::Static(payload))
    }

    pub fn with_release(
        cmd: Command,
        payload: Box<[u8]>,
        release: impl FnOnce(Box<[u8]>) + Send + 'static,
    ) -> Message {
        Message::with_payload(
            cmd,
            Payload::Hooked(HookedBytes::new(payload, Box::new(release))),
        )
    }

    /// A proxied term addressed at `to`, for the host-side pump to
    /// deliver.
    pub fn from_term(to: Target, term: OwnedTerm) -> Message {
        let mut msg = Message::with_payload(Command::SendTerm, Payload::Term(term));
        msg.to = Some(to);
        msg
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn command_codes_round_trip() {
        for cmd in [
            Command::Stop,
            Command::Output,
            Command::SendTerm,
            Command::App(CMD_APP_BASE + 4),
        ] {
            assert_eq!(Command::from_code(cmd.code()), cmd);
        }
    }

    #[test]
    fn release_hook_runs_exactly_once_with_the_bytes() {
        let released = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&released);
        let msg = Message::with_release(Command::Output, Box::from(&b"abc"[..]), move |bytes| {
            assert_eq!(&bytes[..], b"abc");
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(msg.payload.data(), b"abc");
        drop(msg);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_payload_is_not_owned() {
        static GREETING: &[u8] = b"hi";
        let msg = Message::with_static(Command::App(99), GREETING);
        assert_eq!(msg.payload.data(), b"hi");
        assert!(msg.payload.term().is_none());
    }
}
