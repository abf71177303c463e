// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let start = clock.now();

    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now() - start, Duration::from_secs(5));

    // Clones observe the same time
    let clone = clock.clone();
    clone.advance(Duration::from_millis(500));
    assert_eq!(clock.now() - start, Duration::from_millis(5500));
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
