//! Integration tests for the transport codec.

use taskq::attrs::Attributes;
use taskq::ident::Ident;
use taskq::transport::{Kind, Message, MIME_HEADER, MIME_INLINE};
use taskq::utd;
use taskq::worklog::State;

fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Header form
// ---------------------------------------------------------------------------

#[test]
fn short_descriptor_round_trips_through_the_header_form() {
    let msg = Message::new("example://utd").kind(Kind::Oneshot);
    let env = msg.encode().unwrap();

    assert_eq!(
        env.attributes,
        attrs(&[
            ("id", "00000000000000000000"),
            ("type", "oneshot"),
            ("utd", "example://utd"),
            ("seq", "0"),
            ("mime", MIME_HEADER),
        ])
    );
    assert!(env.data.is_empty());
    assert_eq!(Message::parse(&env).unwrap(), msg);
}

#[test]
fn header_form_preserves_id_seq_and_payload() {
    let msg = Message::with_id(Ident::new(), "example://utd")
        .data(b"payload bytes".to_vec());
    let mut msg = msg;
    msg.seq = 7;

    let env = msg.encode().unwrap();
    assert_eq!(env.attributes.get("mime").unwrap(), MIME_HEADER);
    assert_eq!(env.attributes.get("type").unwrap(), "managed");
    assert_eq!(env.data, b"payload bytes");
    assert_eq!(Message::parse(&env).unwrap(), msg);
}

// ---------------------------------------------------------------------------
// Inline form
// ---------------------------------------------------------------------------

#[test]
fn oversized_descriptor_round_trips_through_the_inline_form() {
    let long = format!("example://utd?pad={}", "x".repeat(1100));
    let msg = Message::new(&long).kind(Kind::Oneshot);
    let env = msg.encode().unwrap();

    assert_eq!(env.attributes, attrs(&[("mime", MIME_INLINE)]));
    let body: serde_json::Value = serde_json::from_slice(&env.data).unwrap();
    assert_eq!(body["utd"], long.as_str());
    assert_eq!(Message::parse(&env).unwrap(), msg);
}

#[test]
fn attrs_and_triggers_round_trip_through_the_inline_form() {
    let msg = Message::with_id(Ident::new(), "example://utd")
        .data(b"data".to_vec())
        .attr("tier", "gold")
        .attr("region", "aq")
        .add_trigger(State::Complete, ["next://step/one", "next://step/two"])
        .add_trigger(State::Failed, ["clean://up"]);

    let env = msg.encode().unwrap();
    assert_eq!(env.attributes, attrs(&[("mime", MIME_INLINE)]));
    assert_eq!(Message::parse(&env).unwrap(), msg);
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn identity_is_stable_under_any_query() {
    let base = "example://utd/zip/zap";
    for q in ["a=1", "a=1&b=2", "", "state_seq=9&x=%20y"] {
        assert_eq!(utd::identity(&format!("{base}?{q}")), base);
        assert_eq!(utd::key(&format!("{base}?{q}")), utd::key(base));
    }
}
