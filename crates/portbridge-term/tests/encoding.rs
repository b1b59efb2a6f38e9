use portbridge_term::{direct_elements, Atom, TermBuffer, INLINE_WORDS, OP_TUPLE};

#[test]
fn long_emission_sequences_match_an_unbounded_buffer() {
    let mut grown = TermBuffer::new();
    let mut preallocated = TermBuffer::with_capacity(4096);
    for i in 0..200u64 {
        match i % 4 {
            0 => {
                grown.atom(Atom(i));
                preallocated.atom(Atom(i));
            }
            1 => {
                grown.int(-(i as i64));
                preallocated.int(-(i as i64));
            }
            2 => {
                grown.uint(i * i);
                preallocated.uint(i * i);
            }
            _ => {
                grown.kv_string(Atom(i), b"chunked");
                preallocated.kv_string(Atom(i), b"chunked");
            }
        }
    }
    assert!(grown.capacity() > INLINE_WORDS);
    assert_eq!(grown.view().words, preallocated.view().words);
    assert_eq!(grown.view().chunks.len(), preallocated.view().chunks.len());
}

#[test]
fn deep_nesting_patches_every_level() {
    let depth = 64;
    let mut t = TermBuffer::new();
    let mut marks = Vec::new();
    for _ in 0..depth {
        marks.push(t.tuple_begin());
    }
    t.int(1);
    for m in marks.into_iter().rev() {
        t.tuple_end(m);
    }

    let words = t.view().words;
    for level in 0..depth {
        assert_eq!(words[level * 2], OP_TUPLE);
        assert_eq!(words[level * 2 + 1], 1, "arity at depth {level}");
    }
}

#[test]
fn sibling_count_treats_a_nested_tuple_as_one_element() {
    let mut t = TermBuffer::new();
    t.atom(Atom(1));
    let m = t.tuple_begin();
    t.int(2);
    t.int(3);
    t.tuple_end(m);
    t.kv_uint(Atom(4), 9);
    assert_eq!(direct_elements(t.view().words), 3);
}

#[test]
fn capacity_is_retained_across_reset_cycles() {
    let mut t = TermBuffer::new();
    let mut last_capacity = None;
    for _ in 0..5 {
        for i in 0..100 {
            t.uint(i);
        }
        if let Some(cap) = last_capacity {
            assert_eq!(t.capacity(), cap);
        }
        last_capacity = Some(t.capacity());
        t.reset();
        assert_eq!(t.used(), 0);
        assert!(t.view().chunks.is_empty());
    }
}
