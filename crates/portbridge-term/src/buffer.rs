use std::ops::Range;
use std::sync::Arc;

use crate::scan;
use crate::term::{
    Atom, Chunk, OwnedTerm, PortId, RawWord, TermView, OP_ATOM, OP_INT, OP_PORT, OP_STRING,
    OP_STRING_CONS, OP_TUPLE, OP_UINT,
};

/// Words of embedded storage before the buffer switches to the heap.
pub const INLINE_WORDS: usize = 16;

/// Word storage: embedded until the first growth, heap after. Growth
/// copies once on the inline-to-heap transition and preserves the logical
/// write cursor; it never shrinks.
enum WordStore {
    Inline {
        buf: [RawWord; INLINE_WORDS],
        used: usize,
    },
    Heap {
        buf: Box<[RawWord]>,
        used: usize,
    },
}

impl WordStore {
    fn inline() -> Self {
        WordStore::Inline {
            buf: [0; INLINE_WORDS],
            used: 0,
        }
    }

    fn heap(capacity: usize) -> Self {
        WordStore::Heap {
            buf: vec![0; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    fn used(&self) -> usize {
        match self {
            WordStore::Inline { used, .. } | WordStore::Heap { used, .. } => *used,
        }
    }

    fn capacity(&self) -> usize {
        match self {
            WordStore::Inline { .. } => INLINE_WORDS,
            WordStore::Heap { buf, .. } => buf.len(),
        }
    }

    fn words(&self) -> &[RawWord] {
        match self {
            WordStore::Inline { buf, used } => &buf[..*used],
            WordStore::Heap { buf, used } => &buf[..*used],
        }
    }

    fn reserve(&mut self, extra: usize) {
        let used = self.used();
        let needed = used + extra;
        if needed <= self.capacity() {
            return;
        }
        let new_cap = needed.max(self.capacity() * 2);
        let mut new_buf = vec![0; new_cap].into_boxed_slice();
        new_buf[..used].copy_from_slice(self.words());
        *self = WordStore::Heap { buf: new_buf, used };
    }

    fn push(&mut self, w: RawWord) {
        debug_assert!(self.used() < self.capacity(), "push without reserve");
        match self {
            WordStore::Inline { buf, used } => {
                buf[*used] = w;
                *used += 1;
            }
            WordStore::Heap { buf, used } => {
                buf[*used] = w;
                *used += 1;
            }
        }
    }

    fn set(&mut self, at: usize, w: RawWord) {
        match self {
            WordStore::Inline { buf, .. } => buf[at] = w,
            WordStore::Heap { buf, .. } => buf[at] = w,
        }
    }

    fn rewind(&mut self) {
        match self {
            WordStore::Inline { used, .. } | WordStore::Heap { used, .. } => *used = 0,
        }
    }
}

/// A saved write-cursor position for patching a tuple's arity once its
/// children have been emitted. Marks nest arbitrarily; each `tuple_end`
/// must close the most recent open `tuple_begin` (strict LIFO). Mismatched
/// pairing is a caller contract violation and is not checked.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    arity_slot: usize,
    body_start: usize,
}

/// Append-only term encoder. Storage starts embedded and moves to the
/// heap transparently on the first emission that does not fit; the word
/// stream produced is identical either way.
pub struct TermBuffer<'a> {
    store: WordStore,
    chunks: Vec<Chunk<'a>>,
}

impl<'a> TermBuffer<'a> {
    pub fn new() -> Self {
        TermBuffer {
            store: WordStore::inline(),
            chunks: Vec::new(),
        }
    }

    /// Heap-resident from the start, sized for `words` words. Used when a
    /// term is known to be large or when the buffer itself must be
    /// long-lived.
    pub fn with_capacity(words: usize) -> Self {
        TermBuffer {
            store: WordStore::heap(words),
            chunks: Vec::new(),
        }
    }

    pub fn used(&self) -> usize {
        self.store.used()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.store.used() == 0
    }

    /// Rewinds the cursor and frees every chunk; word capacity is kept for
    /// the next encoding.
    pub fn reset(&mut self) {
        self.store.rewind();
        self.chunks.clear();
    }

    pub fn view(&self) -> TermView<'_> {
        TermView {
            words: self.store.words(),
            chunks: &self.chunks,
        }
    }

    /// Consumes the buffer into a term owning all of its storage. Owned
    /// chunks move, borrowed chunks are copied, shared chunks keep their
    /// refcount.
    pub fn into_owned(self) -> OwnedTerm {
        OwnedTerm {
            words: Box::from(self.store.words()),
            chunks: self.chunks.into_iter().map(Chunk::into_detached).collect(),
        }
    }

    pub fn atom(&mut self, a: Atom) {
        self.store.reserve(2);
        self.store.push(OP_ATOM);
        self.store.push(a.0);
    }

    pub fn int(&mut self, v: i64) {
        self.store.reserve(2);
        self.store.push(OP_INT);
        self.store.push(v as u64);
    }

    pub fn uint(&mut self, v: u64) {
        self.store.reserve(2);
        self.store.push(OP_UINT);
        self.store.push(v);
    }

    pub fn port(&mut self, p: PortId) {
        self.store.reserve(2);
        self.store.push(OP_PORT);
        self.store.push(p.0);
    }

    /// Emits a string element referencing caller memory, zero-copy. The
    /// bytes must stay valid for the buffer's lifetime; a term holding
    /// borrowed chunks is deep-copied by `TermView::to_owned` before it
    /// crosses a thread boundary.
    pub fn string(&mut self, bytes: &'a [u8]) {
        let idx = self.add_chunk(Chunk::Borrowed(bytes));
        self.emit_string(OP_STRING, idx);
    }

    /// Prepends bytes onto the string element emitted immediately before.
    /// The result is still one element.
    pub fn string_cons(&mut self, bytes: &'a [u8]) {
        let idx = self.add_chunk(Chunk::Borrowed(bytes));
        self.emit_string(OP_STRING_CONS, idx);
    }

    /// Emits a string element slicing a refcounted binary.
    pub fn string_shared(&mut self, buf: Arc<[u8]>, range: Range<usize>) {
        debug_assert!(range.end <= buf.len());
        let idx = self.add_chunk(Chunk::Shared { buf, range });
        self.emit_string(OP_STRING, idx);
    }

    /// Emits a string element referencing a chunk previously created with
    /// `link_alloc` or `link_copy`.
    pub fn string_from_link(&mut self, idx: usize) {
        self.emit_string(OP_STRING, idx);
    }

    /// Opens a tuple: emits the tuple instruction with a reserved arity
    /// slot and returns the mark `tuple_end` patches.
    pub fn tuple_begin(&mut self) -> Mark {
        self.store.reserve(2);
        let at = self.store.used();
        self.store.push(OP_TUPLE);
        self.store.push(0);
        Mark {
            arity_slot: at + 1,
            body_start: at + 2,
        }
    }

    /// Closes a tuple: counts the direct child elements emitted since the
    /// mark (a nested tuple is one element) and patches the arity slot.
    pub fn tuple_end(&mut self, mark: Mark) {
        let n = scan::direct_elements(&self.store.words()[mark.body_start..]);
        self.store.set(mark.arity_slot, n as RawWord);
    }

    /// Allocates a zeroed chunk owned by the buffer and returns its index.
    /// Owned chunks exist so encoded references into caller-transient
    /// memory can be redirected to storage whose lifetime matches the
    /// term; they are freed en masse by `reset` and on drop.
    pub fn link_alloc(&mut self, len: usize) -> usize {
        self.add_chunk(Chunk::Owned(vec![0; len].into_boxed_slice()))
    }

    /// `link_alloc` plus a copy of `src`.
    pub fn link_copy(&mut self, src: &[u8]) -> usize {
        self.add_chunk(Chunk::Owned(Box::from(src)))
    }

    /// Writable access to an owned chunk.
    pub fn chunk_mut(&mut self, idx: usize) -> &mut [u8] {
        match &mut self.chunks[idx] {
            Chunk::Owned(b) => b,
            _ => panic!("chunk {idx} is not buffer-owned"),
        }
    }

    pub fn kv_int(&mut self, key: Atom, value: i64) {
        let m = self.tuple_begin();
        self.atom(key);
        self.int(value);
        self.tuple_end(m);
    }

    pub fn kv_uint(&mut self, key: Atom, value: u64) {
        let m = self.tuple_begin();
        self.atom(key);
        self.uint(value);
        self.tuple_end(m);
    }

    pub fn kv_atom(&mut self, key: Atom, value: Atom) {
        let m = self.tuple_begin();
        self.atom(key);
        self.atom(value);
        self.tuple_end(m);
    }

    pub fn kv_bool(&mut self, key: Atom, value: bool, yes: Atom, no: Atom) {
        let m = self.tuple_begin();
        self.atom(key);
        self.atom(if value { yes } else { no });
        self.tuple_end(m);
    }

    /// The value bytes are copied into an owned chunk first: the encoded
    /// term may be transmitted after the caller's string is gone.
    pub fn kv_string(&mut self, key: Atom, value: &[u8]) {
        let idx = self.link_copy(value);
        let m = self.tuple_begin();
        self.atom(key);
        self.string_from_link(idx);
        self.tuple_end(m);
    }

    fn emit_string(&mut self, op: RawWord, idx: usize) {
        let len = self.chunks[idx].len();
        self.store.reserve(3);
        self.store.push(op);
        self.store.push(idx as u64);
        self.store.push(len as u64);
    }

    fn add_chunk(&mut self, chunk: Chunk<'a>) -> usize {
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }
}

impl Default for TermBuffer<'_> {
    fn default() -> Self {
        Self::new()
    }
}
