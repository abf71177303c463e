// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    shutdown     = { TerminateReason::Shutdown, false },
    seal_timeout = { TerminateReason::SealTimeout, false },
    requested    = { TerminateReason::Requested, false },
    spawn_timeout     = { TerminateReason::SpawnTimeout, true },
    handshake_timeout = { TerminateReason::HandshakeTimeout, true },
    heartbeat_timeout = { TerminateReason::HeartbeatTimeout, true },
)]
fn crash_classification(reason: TerminateReason, crash: bool) {
    assert_eq!(reason.is_crash(), crash);
}

#[test]
fn carries_message_detail() {
    let reason = TerminateReason::WorkerGone {
        message: "exit code 9".to_string(),
    };
    assert!(reason.is_crash());
    assert_eq!(reason.to_string(), "worker gone: exit code 9");

    let json = serde_json::to_string(&reason).unwrap();
    let back: TerminateReason = serde_json::from_str(&json).unwrap();
    assert_eq!(back, reason);
}
