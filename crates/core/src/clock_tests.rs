// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn system_clock_returns_increasing_time() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    let t2 = clock.now();
    assert!(t2 > t1);
}

#[test]
fn fake_clock_can_be_advanced() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    clock.advance(Duration::from_secs(60));
    let t2 = clock.now();
    assert!(t2.duration_since(t1) >= Duration::from_secs(60));
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(Duration::from_secs(30));
    let t2 = clock1.now();
    assert!(t2.duration_since(t1) >= Duration::from_secs(30));
}

#[test]
fn fake_clock_advances_wall_clock_in_step() {
    let start = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().unwrap();
    let clock = FakeClock::at(start);

    clock.advance(Duration::from_millis(2500));

    assert_eq!(clock.now_utc_ms(), start.timestamp_millis() + 2500);
}

#[test]
fn fake_clock_set_utc_overrides_wall_clock_only() {
    let clock = FakeClock::new();
    let instant_before = clock.now();

    let pinned = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
    clock.set_utc(pinned);

    assert_eq!(clock.now_utc(), pinned);
    assert_eq!(clock.now(), instant_before);
}
