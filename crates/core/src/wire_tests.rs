// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::frame::Frame;
use std::time::Duration;

#[tokio::test]
async fn roundtrip_over_duplex() {
    let (client, server) = tokio::io::duplex(1024);
    let (_, mut client_w) = tokio::io::split(client);
    let (mut server_r, _) = tokio::io::split(server);

    let frame = Frame::chunk(b"hello".to_vec());
    send(&mut client_w, &frame).await.unwrap();

    let back: Frame = recv(&mut server_r).await.unwrap();
    assert_eq!(back, frame);
}

#[tokio::test]
async fn closed_reader_reports_connection_closed() {
    let (client, server) = tokio::io::duplex(64);
    drop(client);
    let (mut server_r, _) = tokio::io::split(server);

    let err = recv::<Frame, _>(&mut server_r).await.unwrap_err();
    assert!(matches!(err, WireError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    use tokio::io::AsyncWriteExt;

    let (client, server) = tokio::io::duplex(64);
    let (_, mut client_w) = tokio::io::split(client);
    let (mut server_r, _) = tokio::io::split(server);

    // Claim a payload far past the cap
    let huge = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    client_w.write_all(&huge).await.unwrap();

    let err = recv::<Frame, _>(&mut server_r).await.unwrap_err();
    assert!(matches!(err, WireError::MessageTooLarge { .. }));
}

#[tokio::test(start_paused = true)]
async fn recv_timeout_expires() {
    let (_client, server) = tokio::io::duplex(64);
    let (mut server_r, _) = tokio::io::split(server);

    let err = recv_timeout::<Frame, _>(&mut server_r, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Timeout));
}

#[test]
fn encode_rejects_oversized_payload() {
    // A frame whose JSON encoding exceeds the cap
    let frame = Frame::chunk(vec![0u8; MAX_MESSAGE_SIZE]);
    let err = encode(&frame).unwrap_err();
    assert!(matches!(err, WireError::MessageTooLarge { .. }));
}
