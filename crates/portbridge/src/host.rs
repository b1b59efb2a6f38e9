use std::io;

use portbridge_term::{Atom, TermView};

/// Opaque host-side process or port identity. Addressed, never
/// dereferenced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target(pub u64);

/// The host runtime boundary: atom interning and cross-thread term
/// delivery, both treated as given by the embedding driver.
pub trait HostRuntime: Send + Sync {
    /// Interns a symbolic constant and returns its opaque id.
    fn intern_atom(&self, name: &str) -> Atom;

    /// Replays an encoded term against the runtime's term-construction
    /// API, addressed at `target`. When `supports_cross_thread_send` is
    /// false this must only be called from the thread pumping the
    /// controller channel.
    fn send_term(&self, target: Target, term: TermView<'_>) -> io::Result<()>;

    /// Whether `send_term` may be called from any thread. Captured once
    /// at channel creation; it decides between direct and proxied reply
    /// delivery for the channel's lifetime.
    fn supports_cross_thread_send(&self) -> bool;
}
