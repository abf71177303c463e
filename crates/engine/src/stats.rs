// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine statistics.
//!
//! Plain counters for the request/worker ledger, an exponentially weighted
//! rate meter over accepted requests, an EWMA gauge over queue depth
//! (sampled on every queue mutation), and a sliding-window timer for
//! per-channel latency quantiles. Time is always passed in explicitly so
//! the math is testable against a fake clock.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Smoothing horizon for the rate meter and depth gauge.
const EWMA_TAU: Duration = Duration::from_secs(60);

/// Window for latency quantiles.
const TIMER_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time view of the stats, as reported by `info`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub assigned: u64,
    pub cancelled: u64,
    pub spawned: u64,
    pub crashed: u64,
    /// Accepted-requests rate, events per second, EWMA-smoothed.
    pub accept_rate: f64,
    /// Queue depth EWMA.
    pub queue_depth_ewma: f64,
    /// Channel latency quantiles over the sliding window, milliseconds.
    pub latency_ms_p50: Option<u64>,
    pub latency_ms_p90: Option<u64>,
    pub latency_ms_p99: Option<u64>,
}

/// Counters and meters for one engine.
pub struct Stats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub assigned: AtomicU64,
    pub cancelled: AtomicU64,
    pub spawned: AtomicU64,
    pub crashed: AtomicU64,
    meter: Mutex<RateMeter>,
    depth: Mutex<EwmaGauge>,
    timer: Mutex<SlidingTimer>,
}

impl Stats {
    pub fn new(now: Instant) -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            assigned: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            spawned: AtomicU64::new(0),
            crashed: AtomicU64::new(0),
            meter: Mutex::new(RateMeter::new(now)),
            depth: Mutex::new(EwmaGauge::new(now)),
            timer: Mutex::new(SlidingTimer::new(TIMER_WINDOW)),
        }
    }

    /// Count an accepted request and feed the rate meter.
    pub fn mark_accepted(&self, now: Instant) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.meter.lock().mark(now);
    }

    pub fn mark_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Sample the queue depth gauge; call on every queue mutation.
    pub fn sample_queue_depth(&self, depth: usize, now: Instant) {
        self.depth.lock().update(depth as f64, now);
    }

    /// Record one channel's enqueue-to-completion latency.
    pub fn record_latency(&self, elapsed: Duration, now: Instant) {
        self.timer.lock().record(elapsed, now);
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        let quantile = |q: f64| {
            self.timer
                .lock()
                .quantile(q, now)
                .map(|d| d.as_millis() as u64)
        };
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            assigned: self.assigned.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
            crashed: self.crashed.load(Ordering::Relaxed),
            accept_rate: self.meter.lock().rate(now),
            queue_depth_ewma: self.depth.lock().value(now),
            latency_ms_p50: quantile(0.50),
            latency_ms_p90: quantile(0.90),
            latency_ms_p99: quantile(0.99),
        }
    }
}

/// Continuous-time EWMA over inter-arrival rate.
struct RateMeter {
    rate: f64,
    last: Instant,
    primed: bool,
}

impl RateMeter {
    fn new(now: Instant) -> Self {
        Self {
            rate: 0.0,
            last: now,
            primed: false,
        }
    }

    fn mark(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if dt <= 0.0 {
            // Same-instant burst: fold it in as an extra event over tau
            self.rate += 1.0 / EWMA_TAU.as_secs_f64();
            return;
        }
        let instantaneous = 1.0 / dt;
        if !self.primed {
            self.primed = true;
            self.rate = instantaneous;
            return;
        }
        let w = (-dt / EWMA_TAU.as_secs_f64()).exp();
        self.rate = self.rate * w + instantaneous * (1.0 - w);
    }

    fn rate(&self, now: Instant) -> f64 {
        // Decay toward zero while nothing arrives
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        let w = (-dt / EWMA_TAU.as_secs_f64()).exp();
        self.rate * w
    }
}

/// EWMA over irregularly sampled values.
struct EwmaGauge {
    value: f64,
    last: Instant,
    primed: bool,
}

impl EwmaGauge {
    fn new(now: Instant) -> Self {
        Self {
            value: 0.0,
            last: now,
            primed: false,
        }
    }

    fn update(&mut self, sample: f64, now: Instant) {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        if !self.primed {
            self.primed = true;
            self.value = sample;
            return;
        }
        let w = (-dt / EWMA_TAU.as_secs_f64()).exp();
        self.value = self.value * w + sample * (1.0 - w);
    }

    fn value(&self, _now: Instant) -> f64 {
        self.value
    }
}

/// Sliding-window latency samples with quantile readout.
struct SlidingTimer {
    window: Duration,
    samples: std::collections::VecDeque<(Instant, Duration)>,
}

impl SlidingTimer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: std::collections::VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.saturating_duration_since(at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, elapsed: Duration, now: Instant) {
        self.prune(now);
        self.samples.push_back((now, elapsed));
    }

    fn quantile(&mut self, q: f64, now: Instant) -> Option<Duration> {
        self.prune(now);
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().map(|&(_, d)| d).collect();
        sorted.sort();
        let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
        sorted.get(rank.min(sorted.len() - 1)).copied()
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
