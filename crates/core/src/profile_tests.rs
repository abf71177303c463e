// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_are_finite_and_valid() {
    let p = Profile::default();
    p.validate().unwrap();
    assert!(p.spawn_timeout() > Duration::ZERO);
    assert!(p.heartbeat_deadline() > p.heartbeat_interval());
    assert!(p.seal_timeout() > Duration::ZERO);
    assert!(p.terminate_grace() > Duration::ZERO);
}

#[test]
fn partial_toml_fills_defaults() {
    let p: Profile = toml::from_str("pool = 3\nconcurrency = 2\n").unwrap();
    assert_eq!(p.pool, 3);
    assert_eq!(p.concurrency, 2);
    assert_eq!(p.queue_limit, Profile::default().queue_limit);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = toml::from_str::<Profile>("pool = 1\nbogus = true\n");
    assert!(err.is_err());
}

#[yare::parameterized(
    zero_concurrency = { 0, 100 },
    zero_ring        = { 1, 0 },
)]
fn invalid_profiles_fail_validation(concurrency: u64, ring: u64) {
    let p = Profile {
        concurrency,
        output_ring_capacity: ring,
        ..Profile::default()
    };
    assert!(p.validate().is_err());
}
