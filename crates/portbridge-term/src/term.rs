use std::ops::Range;
use std::sync::Arc;

/// One word of the encoded instruction stream.
pub type RawWord = u64;

// Opcodes of the term instruction stream. Each instruction is the opcode
// word followed by one operand word (`OP_ATOM`, `OP_INT`, `OP_UINT`,
// `OP_PORT`, `OP_TUPLE`) or two (`OP_STRING`, `OP_STRING_CONS`: chunk
// index, then byte length). `OP_TUPLE`'s operand is the arity; the arity
// child terms follow it. `OP_STRING_CONS` prepends its bytes onto the
// string element immediately before it and pushes no element of its own.
pub const OP_ATOM: RawWord = 1;
pub const OP_INT: RawWord = 2;
pub const OP_UINT: RawWord = 3;
pub const OP_STRING: RawWord = 4;
pub const OP_STRING_CONS: RawWord = 5;
pub const OP_TUPLE: RawWord = 6;
pub const OP_PORT: RawWord = 7;

/// Interned symbolic constant, an opaque id handed out by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(pub u64);

/// Opaque host-side channel identity, used only for addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u64);

/// Backing storage for one string instruction.
#[derive(Debug)]
pub enum Chunk<'a> {
    /// Caller memory, valid for the buffer's lifetime. Zero-copy; a term
    /// holding borrowed chunks can only be delivered directly.
    Borrowed(&'a [u8]),
    /// Memory owned by the term itself, freed with it.
    Owned(Box<[u8]>),
    /// A slice of a refcounted caller binary; detaching bumps the
    /// refcount instead of copying.
    Shared { buf: Arc<[u8]>, range: Range<usize> },
}

impl Chunk<'_> {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Chunk::Borrowed(b) => b,
            Chunk::Owned(b) => b,
            Chunk::Shared { buf, range } => &buf[range.clone()],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Deep-copies borrowed and owned storage; shared storage is
    /// refcounted instead.
    pub(crate) fn detach(&self) -> Chunk<'static> {
        match self {
            Chunk::Borrowed(b) => Chunk::Owned(Box::from(*b)),
            Chunk::Owned(b) => Chunk::Owned(b.clone()),
            Chunk::Shared { buf, range } => Chunk::Shared {
                buf: Arc::clone(buf),
                range: range.clone(),
            },
        }
    }

    /// Like `detach`, but moves owned storage instead of copying it.
    pub(crate) fn into_detached(self) -> Chunk<'static> {
        match self {
            Chunk::Borrowed(b) => Chunk::Owned(Box::from(b)),
            Chunk::Owned(b) => Chunk::Owned(b),
            Chunk::Shared { buf, range } => Chunk::Shared { buf, range },
        }
    }
}

/// A borrowed view of an encoded term: the word stream plus the chunk
/// table its string instructions index into.
#[derive(Debug, Clone, Copy)]
pub struct TermView<'a> {
    pub words: &'a [RawWord],
    pub chunks: &'a [Chunk<'a>],
}

impl TermView<'_> {
    /// Detaches the view from its backing buffer for hand-off to another
    /// thread: words are copied, borrowed chunks are deep-copied, shared
    /// chunks keep their refcount.
    pub fn to_owned(&self) -> OwnedTerm {
        OwnedTerm {
            words: Box::from(self.words),
            chunks: self.chunks.iter().map(Chunk::detach).collect(),
        }
    }
}

/// An encoded term that owns all of its storage.
#[derive(Debug)]
pub struct OwnedTerm {
    pub(crate) words: Box<[RawWord]>,
    pub(crate) chunks: Vec<Chunk<'static>>,
}

impl OwnedTerm {
    pub fn view(&self) -> TermView<'_> {
        TermView {
            words: &self.words,
            chunks: &self.chunks,
        }
    }

    pub fn words(&self) -> &[RawWord] {
        &self.words
    }

    pub fn chunks(&self) -> &[Chunk<'static>] {
        &self.chunks
    }
}
