// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dy-gateway: the forwarding proxy
//!
//! A transparent RPC gateway in front of remote Dockyard nodes. Client
//! invocations are forwarded to a peer chosen by the balancer; every
//! forward frame is buffered until the backend proves itself with a
//! non-error frame, so a recoverably failed invocation can be replayed in
//! order on a different peer.

pub mod balancer;
pub mod buffer;
pub mod connector;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod proxy;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use balancer::{Balancer, RoundRobin};
pub use buffer::ForwardBuffer;
pub use connector::{PeerConn, PeerConnector, TcpConnector};
pub use error::GatewayError;
pub use peer::{Peer, PeerChannel, PeerEvent, PeerPool};
pub use protocol::{PeerRequest, PeerResponse};
pub use proxy::Gateway;
