//! Flat term encoding for host-runtime term construction.
//!
//! A term tree (atoms, integers, strings, tuples) is encoded as a prefix
//! instruction stream of tagged words plus a chunk table holding the byte
//! data the stream refers to. The stream is the single source of truth for
//! the wire shape; consumers replay it against the host runtime's
//! term-construction API. String instructions address chunks by index, so
//! the stream stays valid when a term is deep-copied for hand-off to
//! another thread.

mod buffer;
mod scan;
mod term;

pub use buffer::{Mark, TermBuffer, INLINE_WORDS};
pub use scan::direct_elements;
pub use term::{
    Atom, Chunk, OwnedTerm, PortId, RawWord, TermView, OP_ATOM, OP_INT, OP_PORT, OP_STRING,
    OP_STRING_CONS, OP_TUPLE, OP_UINT,
};
