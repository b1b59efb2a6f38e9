//! Reply delivery. Every reply is an encoded term shaped
//! `(destination, (data, Payload))` or `(seq, Status)`; whether it goes
//! straight to the host runtime or through a proxied message is decided
//! by the channel's delivery strategy, never re-evaluated per call. Both
//! paths produce the same wire shape.

use std::io;
use std::ops::Range;
use std::sync::Arc;

use log::debug;

use portbridge_term::{TermBuffer, TermView};

use crate::channel::{Channel, Delivery, SeqRef};
use crate::host::{HostRuntime, Target};
use crate::message::{Command, Message, Payload};

impl Channel {
    /// Delivers an encoded term to `target`: handed straight to the host
    /// in direct mode, deep-copied and queued on this channel for the
    /// host-side pump in proxied mode.
    pub fn send_term(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        target: Target,
        term: TermView<'_>,
    ) -> io::Result<()> {
        match self.delivery() {
            Delivery::Direct => host.send_term(target, term),
            Delivery::Proxied => {
                debug!("channel {}: proxying term to {:?}", self.id().0, target);
                self.send(source, Message::from_term(target, term.to_owned()))
            }
        }
    }

    /// `send_term` addressed at the channel's owner.
    pub fn output_term(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        term: TermView<'_>,
    ) -> io::Result<()> {
        self.send_term(host, source, self.owner(), term)
    }

    /// Emits `(port, (data, Bytes))` to the owner. Direct mode borrows
    /// `bytes` zero-copy; proxied mode deep-copies them into the queued
    /// message.
    pub fn port_output(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        bytes: &[u8],
    ) -> io::Result<()> {
        let mut t = TermBuffer::new();
        let m = t.tuple_begin();
        t.port(self.port());
        let d = t.tuple_begin();
        t.atom(self.atoms().data);
        t.string(bytes);
        t.tuple_end(d);
        t.tuple_end(m);
        self.send_term(host, source, self.owner(), t.view())
    }

    /// Like `port_output`, with protocol framing prepended to the body at
    /// the term level: header and body stay two chunks, concatenated by
    /// the instruction stream without a physical copy.
    pub fn port_output2(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        header: &[u8],
        body: &[u8],
    ) -> io::Result<()> {
        let mut t = TermBuffer::new();
        let m = t.tuple_begin();
        t.port(self.port());
        let d = t.tuple_begin();
        t.atom(self.atoms().data);
        if body.is_empty() {
            t.string(header);
        } else {
            t.string(body);
            if !header.is_empty() {
                t.string_cons(header);
            }
        }
        t.tuple_end(d);
        t.tuple_end(m);
        self.send_term(host, source, self.owner(), t.view())
    }

    /// `port_output2` with the body sliced out of a refcounted binary;
    /// proxying bumps the refcount instead of copying the body.
    pub fn port_output_shared(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        header: &[u8],
        bin: &Arc<[u8]>,
        range: Range<usize>,
    ) -> io::Result<()> {
        let mut t = TermBuffer::new();
        let m = t.tuple_begin();
        t.port(self.port());
        let d = t.tuple_begin();
        t.atom(self.atoms().data);
        if range.is_empty() {
            t.string(header);
        } else {
            t.string_shared(Arc::clone(bin), range);
            if !header.is_empty() {
                t.string_cons(header);
            }
        }
        t.tuple_end(d);
        t.tuple_end(m);
        self.send_term(host, source, self.owner(), t.view())
    }

    /// Replies `(seq, ok)` to `target`.
    pub fn send_ok(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        target: Target,
        seq: SeqRef,
    ) -> io::Result<()> {
        let mut t = TermBuffer::new();
        let m = t.tuple_begin();
        t.int(i64::from(seq.0));
        t.atom(self.atoms().ok);
        t.tuple_end(m);
        self.send_term(host, source, target, t.view())
    }

    /// Replies `(seq, (error, Reason))` to `target`, with `Reason` the
    /// lowercase atom naming the platform error code.
    pub fn send_error(
        &self,
        host: &dyn HostRuntime,
        source: Option<&Channel>,
        target: Target,
        seq: SeqRef,
        errno: i32,
    ) -> io::Result<()> {
        let reason = host.intern_atom(errno_atom(errno));
        let mut t = TermBuffer::new();
        let m = t.tuple_begin();
        t.int(i64::from(seq.0));
        let e = t.tuple_begin();
        t.atom(self.atoms().error);
        t.atom(reason);
        t.tuple_end(e);
        t.tuple_end(m);
        self.send_term(host, source, target, t.view())
    }

    /// Host-side drain loop for a proxied channel: pops every queued
    /// message, delivers `SendTerm` payloads through the host runtime and
    /// hands everything else to `sink`. Must run on the thread that is
    /// allowed to touch the runtime. Returns the number of messages
    /// drained.
    pub fn pump(
        &self,
        host: &dyn HostRuntime,
        sink: &mut dyn FnMut(Message),
    ) -> io::Result<usize> {
        let mut drained = 0;
        while let Some(msg) = self.recv() {
            drained += 1;
            match msg {
                Message {
                    cmd: Command::SendTerm,
                    payload: Payload::Term(term),
                    to: Some(target),
                    ..
                } => host.send_term(target, term.view())?,
                other => sink(other),
            }
        }
        Ok(drained)
    }
}

/// Lowercase atom name for a platform error code; codes outside the
/// table map to `"unknown"`.
pub fn errno_atom(errno: i32) -> &'static str {
    match errno {
        libc::EPERM => "eperm",
        libc::ENOENT => "enoent",
        libc::ESRCH => "esrch",
        libc::EINTR => "eintr",
        libc::EIO => "eio",
        libc::ENXIO => "enxio",
        libc::EBADF => "ebadf",
        libc::EAGAIN => "eagain",
        libc::ENOMEM => "enomem",
        libc::EACCES => "eacces",
        libc::EFAULT => "efault",
        libc::EBUSY => "ebusy",
        libc::EEXIST => "eexist",
        libc::EXDEV => "exdev",
        libc::ENODEV => "enodev",
        libc::ENOTDIR => "enotdir",
        libc::EISDIR => "eisdir",
        libc::EINVAL => "einval",
        libc::ENFILE => "enfile",
        libc::EMFILE => "emfile",
        libc::EFBIG => "efbig",
        libc::ENOSPC => "enospc",
        libc::ESPIPE => "espipe",
        libc::EROFS => "erofs",
        libc::EPIPE => "epipe",
        libc::ERANGE => "erange",
        libc::EDEADLK => "edeadlk",
        libc::ENAMETOOLONG => "enametoolong",
        libc::ENOSYS => "enosys",
        libc::ENOTEMPTY => "enotempty",
        libc::ELOOP => "eloop",
        libc::EOVERFLOW => "eoverflow",
        libc::ETIMEDOUT => "etimedout",
        libc::ECONNRESET => "econnreset",
        libc::ECONNREFUSED => "econnrefused",
        libc::EADDRINUSE => "eaddrinuse",
        libc::ENOTCONN => "enotconn",
        libc::EINPROGRESS => "einprogress",
        _ => "unknown",
    }
}
