// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dy_core::code;

#[test]
fn handshake_wire_shape() {
    let msg = WorkerMessage::Handshake {
        uuid: WorkerId::new("4a1b"),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(json, r#"{"type":"handshake","uuid":"4a1b"}"#);

    let back: WorkerMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(back, msg);
}

#[yare::parameterized(
    heartbeat  = { WorkerMessage::Heartbeat },
    terminated = { WorkerMessage::Terminated { code: 0 } },
    terminate  = { WorkerMessage::Terminate { reason: TerminateReason::Shutdown } },
    invoke     = { WorkerMessage::Invoke { channel: 7, event: "ping".into(), headers: vec![] } },
    data_chunk = { WorkerMessage::Data { channel: 7, frame: Frame::chunk(b"hi".to_vec()) } },
    data_error = { WorkerMessage::Data { channel: 7, frame: Frame::error(code::WORKER_DIED, "gone") } },
)]
fn roundtrip(msg: WorkerMessage) {
    let json = serde_json::to_vec(&msg).unwrap();
    let back: WorkerMessage = serde_json::from_slice(&json).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn unknown_message_type_fails_decode() {
    let err = serde_json::from_str::<WorkerMessage>(r#"{"type":"resize"}"#);
    assert!(err.is_err());
}
