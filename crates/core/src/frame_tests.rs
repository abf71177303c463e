// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn chunk_payload_survives_json() {
    let frame = Frame::chunk(vec![0u8, 1, 2, 250, 255]);
    let json = serde_json::to_string(&frame).unwrap();
    let back: Frame = serde_json::from_str(&json).unwrap();
    assert_eq!(back, frame);

    // Payload must not appear as a raw byte array in the JSON
    assert!(json.contains("\"bytes\":\""), "expected base64 string: {json}");
}

#[test]
fn frame_tags_are_snake_case() {
    let json = serde_json::to_string(&Frame::choke()).unwrap();
    assert!(json.contains("\"type\":\"choke\""));

    let json = serde_json::to_string(&Frame::error(code::QUEUE_FULL, "queue is full")).unwrap();
    assert!(json.contains("\"type\":\"error\""));
    assert!(json.contains("\"code\":1"));
}

#[test]
fn terminal_classification() {
    assert!(!Frame::chunk(b"hi".to_vec()).is_terminal());
    assert!(Frame::choke().is_terminal());
    assert!(Frame::error(code::TRANSPORT, "gone").is_terminal());
    assert!(Frame::error(code::TRANSPORT, "gone").is_error());
    assert!(!Frame::choke().is_error());
}

#[test]
fn invocation_headers_default_empty() {
    let inv: Invocation = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
    assert_eq!(inv.event, "ping");
    assert!(inv.headers.is_empty());

    let inv = Invocation::with_headers("ping", vec![("trace_id".into(), "abc".into())]);
    let json = serde_json::to_string(&inv).unwrap();
    let back: Invocation = serde_json::from_str(&json).unwrap();
    assert_eq!(back.headers.len(), 1);
}
