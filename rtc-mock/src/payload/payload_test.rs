use super::*;
use bytes::BytesMut;

#[test]
fn test_payload_from_message() {
    assert_eq!(
        Payload::from_message(true, BytesMut::from("hello")),
        Payload::Text("hello".to_owned())
    );
    assert_eq!(
        Payload::from_message(false, BytesMut::from("hello")),
        Payload::Binary(Bytes::from_static(b"hello"))
    );
    assert_eq!(
        Payload::from_message(true, Bytes::from("héllo ✓")),
        Payload::Text("héllo ✓".to_owned())
    );
    // flagged as text but not UTF-8
    assert_eq!(
        Payload::from_message(true, Bytes::from_static(&[0xff, 0xfe])),
        Payload::Binary(Bytes::from_static(&[0xff, 0xfe]))
    );
}

#[test]
fn test_payload_accessors() {
    let text = Payload::from("abc");
    assert!(text.is_text());
    assert_eq!(text.as_bytes(), b"abc");
    assert_eq!(text.len(), 3);

    let empty = Payload::from(Vec::new());
    assert!(!empty.is_text());
    assert!(empty.is_empty());
}

#[test]
fn test_payload_display() {
    assert_eq!(Payload::from("hi").to_string(), "'hi'");
    assert_eq!(Payload::from(&[1u8, 2][..]).to_string(), "<2 bytes>");
}

#[test]
fn test_payload_serde() -> serde_json::Result<()> {
    let json = serde_json::to_value(Payload::from("hi"))?;
    assert_eq!(json, serde_json::json!({ "kind": "text", "data": "hi" }));

    let binary: Payload = serde_json::from_value(serde_json::json!({
        "kind": "binary",
        "data": [1, 2, 3]
    }))?;
    assert_eq!(binary, Payload::from(vec![1u8, 2, 3]));
    Ok(())
}
