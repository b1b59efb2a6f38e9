#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portbridge::term::{PortId, TermBuffer};
use portbridge::{Channel, Command, Delivery, HostRuntime, Message, SeqRef, Target};

mod common;
use common::{atom, bytes, tuple, SimHost, Value};

const OWNER: Target = Target(42);
const PORT: PortId = PortId(7);

fn channel_for(host: &SimHost) -> Arc<Channel> {
    Channel::new(host, PORT, OWNER).expect("create channel")
}

#[test]
fn direct_send_ok_delivers_immediately() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);
    assert_eq!(ch.delivery(), Delivery::Direct);

    ch.send_ok(&host, None, Target(5), SeqRef(12)).unwrap();

    assert!(ch.is_empty(), "direct delivery must not queue");
    let delivered = host.take_delivered();
    assert_eq!(
        delivered,
        vec![(Target(5), tuple(vec![Value::Int(12), atom("ok")]))]
    );
}

#[test]
fn proxied_send_ok_queues_until_pumped() {
    let host = SimHost::new(false);
    let ch = channel_for(&host);
    assert_eq!(ch.delivery(), Delivery::Proxied);

    ch.send_ok(&host, None, Target(5), SeqRef(3)).unwrap();

    assert!(host.take_delivered().is_empty());
    assert_eq!(ch.len(), 1);

    let mut other = Vec::new();
    let drained = ch.pump(&host, &mut |msg| other.push(msg)).unwrap();
    assert_eq!(drained, 1);
    assert!(other.is_empty());
    assert_eq!(
        host.take_delivered(),
        vec![(Target(5), tuple(vec![Value::Int(3), atom("ok")]))]
    );
}

#[test]
fn send_error_names_the_errno_atom_lowercase() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);

    ch.send_error(&host, None, Target(5), SeqRef(9), libc::ENOENT)
        .unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(
            Target(5),
            tuple(vec![
                Value::Int(9),
                tuple(vec![atom("error"), atom("enoent")]),
            ])
        )]
    );
}

#[test]
fn port_output_wraps_bytes_in_the_data_shape() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);

    ch.port_output(&host, None, b"payload").unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(
            OWNER,
            tuple(vec![
                Value::Port(PORT.0),
                tuple(vec![atom("data"), bytes(b"payload")]),
            ])
        )]
    );
}

#[test]
fn port_output2_concatenates_header_and_body_at_term_level() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);

    ch.port_output2(&host, None, b"HDR:", b"body").unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(
            OWNER,
            tuple(vec![
                Value::Port(PORT.0),
                tuple(vec![atom("data"), bytes(b"HDR:body")]),
            ])
        )]
    );
}

#[test]
fn port_output2_with_empty_body_sends_header_alone() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);

    ch.port_output2(&host, None, b"HDR:", b"").unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(
            OWNER,
            tuple(vec![
                Value::Port(PORT.0),
                tuple(vec![atom("data"), bytes(b"HDR:")]),
            ])
        )]
    );
}

#[test]
fn proxied_output_round_trips_identically_to_direct() {
    let direct_host = SimHost::new(true);
    let direct_ch = channel_for(&direct_host);
    direct_ch
        .port_output2(&direct_host, None, b"len=4;", b"data")
        .unwrap();

    let proxy_host = SimHost::new(false);
    let proxy_ch = channel_for(&proxy_host);
    proxy_ch
        .port_output2(&proxy_host, None, b"len=4;", b"data")
        .unwrap();
    proxy_ch.pump(&proxy_host, &mut |_| {}).unwrap();

    assert_eq!(direct_host.take_delivered(), proxy_host.take_delivered());
}

#[test]
fn proxied_shared_binary_is_refcounted_not_copied() {
    let host = SimHost::new(false);
    let ch = channel_for(&host);
    let bin: Arc<[u8]> = Arc::from(&b"0123456789abcdef"[..]);

    ch.port_output_shared(&host, None, b"h:", &bin, 4..8).unwrap();
    assert_eq!(Arc::strong_count(&bin), 2, "queued message holds the binary");

    ch.pump(&host, &mut |_| {}).unwrap();
    assert_eq!(Arc::strong_count(&bin), 1, "pump released the binary");
    assert_eq!(
        host.take_delivered(),
        vec![(
            OWNER,
            tuple(vec![
                Value::Port(PORT.0),
                tuple(vec![atom("data"), bytes(b"h:4567")]),
            ])
        )]
    );
}

#[test]
fn pump_hands_non_term_messages_to_the_sink_and_releases_them() {
    let host = SimHost::new(false);
    let ch = channel_for(&host);

    let released = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&released);
    ch.send(
        None,
        Message::with_release(Command::App(31), Box::from(&b"hooked"[..]), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    ch.send_ok(&host, None, Target(1), SeqRef(1)).unwrap();

    let mut sunk = Vec::new();
    let drained = ch.pump(&host, &mut |msg| sunk.push(msg.cmd)).unwrap();
    assert_eq!(drained, 2);
    assert_eq!(sunk, vec![Command::App(31)]);
    assert_eq!(host.take_delivered().len(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1, "release hook ran once");
}

#[test]
fn kv_int_decodes_to_key_value_tuple() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);
    let count = host.intern_atom("count");

    let mut t = TermBuffer::new();
    t.kv_int(count, 42);
    ch.output_term(&host, None, t.view()).unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(OWNER, tuple(vec![atom("count"), Value::Int(42)]))]
    );
}

#[test]
fn kv_helpers_encode_through_the_channel_atoms() {
    let host = SimHost::new(true);
    let ch = channel_for(&host);
    let key = host.intern_atom("active");
    let label = host.intern_atom("label");
    let atoms = *ch.atoms();

    let mut t = TermBuffer::new();
    let m = t.tuple_begin();
    t.kv_bool(key, true, atoms.bool_true, atoms.bool_false);
    t.kv_string(label, b"uart0");
    t.tuple_end(m);
    ch.output_term(&host, None, t.view()).unwrap();

    assert_eq!(
        host.take_delivered(),
        vec![(
            OWNER,
            tuple(vec![
                tuple(vec![atom("active"), atom("true")]),
                tuple(vec![atom("label"), bytes(b"uart0")]),
            ])
        )]
    );
}

#[test]
fn proxied_term_with_borrowed_chunks_survives_the_caller_frame() {
    let host = SimHost::new(false);
    let ch = channel_for(&host);

    {
        let transient = b"short-lived".to_vec();
        ch.port_output(&host, None, &transient).unwrap();
        // `transient` drops here; the queued message owns a deep copy.
    }

    ch.pump(&host, &mut |_| {}).unwrap();
    let delivered = host.take_delivered();
    assert_eq!(
        delivered[0].1,
        tuple(vec![
            Value::Port(PORT.0),
            tuple(vec![atom("data"), bytes(b"short-lived")]),
        ])
    );
}
