//! Worker-thread message bus for a native host-runtime extension.
//!
//! A controller thread hands blocking operating-system work to dedicated
//! worker threads over per-worker channels: a mutex-protected FIFO paired
//! with a self-pipe wakeup the worker multiplexes, via `poll(2)`, with
//! any descriptors of its own. Replies travel back as encoded terms
//! (`portbridge_term`), delivered straight to the host runtime when it
//! supports cross-thread delivery and proxied through a controller-side
//! queue when it does not.
//!
//! POSIX-only: the wakeup primitive is a self-pipe and the wait is
//! `poll(2)`. The `signal::Wakeup` trait is the seam for other platform
//! strategies.

pub mod channel;
pub mod host;
pub mod message;
pub mod output;
pub mod signal;
pub mod worker;

pub use channel::{
    Channel, ChannelId, Delivery, IoEvent, PollReady, SeqRef, WellKnownAtoms, READ, WRITE,
};
pub use host::{HostRuntime, Target};
pub use message::{
    Command, HookedBytes, Message, Payload, ReleaseFn, CMD_APP_BASE, CMD_OUTPUT, CMD_SEND_TERM,
    CMD_STOP,
};
pub use output::errno_atom;
pub use signal::{PipeSignal, Wakeup};
pub use worker::{Worker, WorkerOptions};

pub use portbridge_term as term;
