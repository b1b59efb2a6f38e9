//! The per-worker message channel: a mutex-protected FIFO paired with a
//! wakeup signal, plus the multiplexed poll a worker blocks in.
//!
//! Exactly one thread consumes a channel (`recv`/`poll`); any number of
//! threads may produce (`send`). The signal is raised only on the
//! empty-to-non-empty transition and drained only on the emptying pop, so
//! any number of sends costs one wakeup.

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;
use portbridge_term::{Atom, PortId};

use crate::host::{HostRuntime, Target};
use crate::message::{Command, Message};
use crate::signal::{PipeSignal, Wakeup};

/// Process-unique channel identity, stamped into messages for reply
/// correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Per-channel monotonically increasing correlation reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqRef(pub u32);

// Interest and readiness bits for `poll`.
pub const READ: u8 = 0b01;
pub const WRITE: u8 = 0b10;

/// One caller-supplied descriptor to multiplex alongside the channel's
/// own signal. `ready` is cleared on entry to `poll` and holds the
/// readiness bits on return.
#[derive(Debug, Clone, Copy)]
pub struct IoEvent {
    pub fd: RawFd,
    pub interest: u8,
    pub ready: u8,
}

impl IoEvent {
    pub fn readable(fd: RawFd) -> IoEvent {
        IoEvent {
            fd,
            interest: READ,
            ready: 0,
        }
    }

    pub fn writable(fd: RawFd) -> IoEvent {
        IoEvent {
            fd,
            interest: WRITE,
            ready: 0,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.ready & READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.ready & WRITE != 0
    }
}

/// Outcome of a `poll`. `queued` is the queue length sampled when the
/// signal fired. The count is advisory: the queue may drain concurrently;
/// callers treat any non-zero value as "check the queue with `recv`".
/// A timeout is the all-zero outcome, not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollReady {
    pub queued: usize,
    pub io_ready: usize,
}

/// Reply-delivery strategy, decided once at channel creation from the
/// host capability and never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The host runtime accepts term delivery from any thread.
    Direct,
    /// Replies are deep-copied and queued for the host-side pump.
    Proxied,
}

/// Atoms every channel interns once at creation.
#[derive(Debug, Clone, Copy)]
pub struct WellKnownAtoms {
    pub ok: Atom,
    pub error: Atom,
    pub data: Atom,
    pub bool_true: Atom,
    pub bool_false: Atom,
}

impl WellKnownAtoms {
    pub fn intern(host: &dyn HostRuntime) -> WellKnownAtoms {
        WellKnownAtoms {
            ok: host.intern_atom("ok"),
            error: host.intern_atom("error"),
            data: host.intern_atom("data"),
            bool_true: host.intern_atom("true"),
            bool_false: host.intern_atom("false"),
        }
    }
}

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

pub struct Channel {
    id: ChannelId,
    port: PortId,
    owner: Target,
    delivery: Delivery,
    atoms: WellKnownAtoms,
    queue: Mutex<VecDeque<Message>>,
    signal: PipeSignal,
    next_seq: AtomicU32,
}

impl Channel {
    /// Creates a channel bound to `port` with replies owned by `owner`.
    /// The host's cross-thread-send capability is captured here for the
    /// channel's lifetime. Failure leaves no partial state behind.
    pub fn new(host: &dyn HostRuntime, port: PortId, owner: Target) -> io::Result<Arc<Channel>> {
        let signal = PipeSignal::new()?;
        let delivery = if host.supports_cross_thread_send() {
            Delivery::Direct
        } else {
            Delivery::Proxied
        };
        Ok(Arc::new(Channel {
            id: ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)),
            port,
            owner,
            delivery,
            atoms: WellKnownAtoms::intern(host),
            queue: Mutex::new(VecDeque::new()),
            signal,
            next_seq: AtomicU32::new(0),
        }))
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn owner(&self) -> Target {
        self.owner
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn atoms(&self) -> &WellKnownAtoms {
        &self.atoms
    }

    /// The descriptor an embedder registers with the host poller to be
    /// woken when this channel goes non-empty (the controller-side analog
    /// of the worker's own `poll`).
    pub fn signal_fd(&self) -> RawFd {
        self.signal.wait_fd()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draws the next correlation reference for requests originating from
    /// this channel.
    pub fn next_seq(&self) -> SeqRef {
        SeqRef(self.next_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Appends a message, stamping its source, and wakes the consumer on
    /// the empty-to-non-empty transition. The raise happens under the
    /// queue lock so a receiver can never observe a non-empty queue with
    /// the signal not yet raised. A raise failure is reported but the
    /// message stays queued.
    pub fn send(&self, source: Option<&Channel>, mut msg: Message) -> io::Result<()> {
        msg.source = source.map(|c| c.id);
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(msg);
        let len = queue.len();
        let raised = if len == 1 { self.signal.raise() } else { Ok(()) };
        drop(queue);
        trace!("channel {}: queued, len={len}", self.id.0);
        raised
    }

    /// Non-blocking pop. Drains the signal only when this pop empties the
    /// queue, never on a non-emptying pop: raises coalesce, so a pending
    /// token still stands for the messages queued behind the head.
    pub fn recv(&self) -> Option<Message> {
        let mut queue = self.queue.lock().unwrap();
        let msg = queue.pop_front()?;
        if queue.is_empty() {
            let _ = self.signal.drain();
        }
        drop(queue);
        Some(msg)
    }

    /// Blocks in one `poll(2)`, multiplexing the channel signal with every
    /// caller-supplied descriptor. `None` waits unboundedly; a zero
    /// duration returns immediately. Every entry's readiness is recorded,
    /// never just the first ready one, so later descriptors cannot be
    /// starved. Wait failures surface as errors; a timeout does not.
    pub fn poll(
        &self,
        io_events: &mut [IoEvent],
        timeout: Option<Duration>,
    ) -> io::Result<PollReady> {
        let mut fds = Vec::with_capacity(io_events.len() + 1);
        fds.push(libc::pollfd {
            fd: self.signal.wait_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        let mut index = Vec::with_capacity(io_events.len());
        for (i, ev) in io_events.iter_mut().enumerate() {
            ev.ready = 0;
            if ev.interest == 0 {
                continue;
            }
            let mut events: libc::c_short = 0;
            if ev.interest & READ != 0 {
                events |= libc::POLLIN;
            }
            if ev.interest & WRITE != 0 {
                events |= libc::POLLOUT;
            }
            fds.push(libc::pollfd {
                fd: ev.fd,
                events,
                revents: 0,
            });
            index.push(i);
        }

        let timeout_ms: libc::c_int = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
        };

        trace!(
            "channel {}: poll, nfds={}, timeout_ms={timeout_ms}",
            self.id.0,
            fds.len()
        );
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if rc == 0 {
            return Ok(PollReady::default());
        }

        let mut ready = PollReady::default();
        const READ_MASK: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        const WRITE_MASK: libc::c_short = libc::POLLOUT | libc::POLLERR;
        if fds[0].revents & READ_MASK != 0 {
            ready.queued = self.queue.lock().unwrap().len();
        }
        for (slot, fd) in fds.iter().enumerate().skip(1) {
            let ev = &mut io_events[index[slot - 1]];
            if ev.interest & READ != 0 && fd.revents & READ_MASK != 0 {
                ev.ready |= READ;
            }
            if ev.interest & WRITE != 0 && fd.revents & WRITE_MASK != 0 {
                ev.ready |= WRITE;
            }
            if ev.ready != 0 {
                ready.io_ready += 1;
            }
        }
        Ok(ready)
    }

    /// Enqueues a request carrying a copy of `payload`, stamped with the
    /// source channel's owner as the reply target and the source's next
    /// correlation reference, which is returned for matching the reply.
    pub fn post(&self, source: &Channel, cmd: Command, payload: &[u8]) -> io::Result<SeqRef> {
        let seq = source.next_seq();
        let mut msg = Message::new(cmd, payload);
        msg.from = Some(source.owner);
        msg.seq = Some(seq);
        self.send(Some(source), msg)?;
        Ok(seq)
    }

    /// `post` with the `Output` command tag.
    pub fn output_request(&self, source: &Channel, payload: &[u8]) -> io::Result<SeqRef> {
        self.post(source, Command::Output, payload)
    }
}
