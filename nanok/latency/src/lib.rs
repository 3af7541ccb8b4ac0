#![no_std]
#![forbid(unsafe_code)]

//! # nanok latency
//!
//! Measures how long interrupts stay locked. The kernel calls
//! [`LatencyBench::start`] from every `irq_lock` and [`LatencyBench::stop`]
//! from every `irq_unlock`; only the outermost pair of a nested sequence
//! produces a sample. The cost of the measurement itself is calibrated once
//! and subtracted from every sample.
//!
//! Timestamps are passed in by the caller, so the bench works with any
//! free-running counter.

use core::fmt;

use nanok_core::config::LATENCY_CALIBRATION_PASSES;

/// Summary of the samples taken so far, in counter ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    pub min: u32,
    pub max: u32,
    pub samples: u32,
}

impl LatencyReport {
    pub const EMPTY: LatencyReport = LatencyReport { min: 0, max: 0, samples: 0 };

    /// Convert `(min, max)` to nanoseconds for a counter ticking at `clock_hz`.
    pub fn to_nanos(&self, clock_hz: u32) -> (u64, u64) {
        let ns = |ticks: u32| -> u64 {
            if clock_hz == 0 {
                0
            } else {
                u64::from(ticks) * 1_000_000_000 / u64::from(clock_hz)
            }
        };
        (ns(self.min), ns(self.max))
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.samples == 0 {
            write!(f, "interrupt lock latency: no samples")
        } else {
            write!(
                f,
                "interrupt lock latency: min {} max {} ticks over {} samples",
                self.min, self.max, self.samples
            )
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LatencyReport {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "min={} max={} samples={}", self.min, self.max, self.samples);
    }
}

/// Measurement overhead, in ticks, found by [`LatencyBench::calibrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overhead {
    /// Outermost `start`
    pub start: u32,
    /// Each nested `start`/`stop` pair inside the window
    pub nested: u32,
    /// Outermost `stop`
    pub stop: u32,
}

#[derive(Debug)]
pub struct LatencyBench {
    nest: u32,
    nested_in_window: u32,
    start_ts: u32,
    min: u32,
    max: u32,
    samples: u32,
    overhead: Overhead,
}

impl LatencyBench {
    pub const fn new() -> Self {
        Self {
            nest: 0,
            nested_in_window: 0,
            start_ts: 0,
            min: u32::MAX,
            max: 0,
            samples: 0,
            overhead: Overhead { start: 0, nested: 0, stop: 0 },
        }
    }

    /// Interrupts were locked at `now`.
    pub fn start(&mut self, now: u32) {
        if self.nest == 0 {
            self.start_ts = now;
            self.nested_in_window = 0;
        } else {
            self.nested_in_window += 1;
        }
        self.nest += 1;
    }

    /// Interrupts were unlocked at `now`. Returns the sample if this closed
    /// the outermost lock.
    pub fn stop(&mut self, now: u32) -> Option<u32> {
        match self.nest {
            // unlock without a matching lock, e.g. a context resuming with
            // interrupts already open
            0 => None,
            1 => {
                self.nest = 0;
                let overhead = self
                    .overhead
                    .start
                    .saturating_add(self.overhead.stop)
                    .saturating_add(self.overhead.nested.saturating_mul(self.nested_in_window));
                let sample = now.wrapping_sub(self.start_ts).saturating_sub(overhead);
                self.min = self.min.min(sample);
                self.max = self.max.max(sample);
                self.samples = self.samples.saturating_add(1);
                Some(sample)
            }
            _ => {
                self.nest -= 1;
                None
            }
        }
    }

    /// The CPU leaves the locked context at `now`: close the window however
    /// deeply the locks are nested. The matching unlocks that run once the
    /// context resumes find no open window and are ignored.
    pub fn close(&mut self, now: u32) -> Option<u32> {
        if self.nest == 0 {
            return None;
        }
        self.nest = 1;
        self.stop(now)
    }

    /// True while a lock window is open
    pub fn is_measuring(&self) -> bool {
        self.nest != 0
    }

    /// Measure what `start`, a nested `start`/`stop` and `stop` cost when
    /// timed with `clock`, then clear the statistics. Run with interrupts
    /// locked and before any sample is taken.
    pub fn calibrate(&mut self, mut clock: impl FnMut() -> u32) {
        let mut overhead = Overhead::default();
        for _ in 0..LATENCY_CALIBRATION_PASSES.max(1) {
            // what reading the clock alone costs
            let t0 = clock();
            let read_cost = clock().wrapping_sub(t0);

            let t0 = clock();
            self.start(t0);
            overhead.start = clock().wrapping_sub(t0).saturating_sub(read_cost);

            let t0 = clock();
            self.start(t0);
            let _ = self.stop(t0);
            overhead.nested = clock().wrapping_sub(t0).saturating_sub(read_cost);

            let t0 = clock();
            let _ = self.stop(t0);
            overhead.stop = clock().wrapping_sub(t0).saturating_sub(read_cost);
        }
        self.overhead = overhead;
        self.reset();
    }

    pub fn overhead(&self) -> Overhead {
        self.overhead
    }

    pub fn report(&self) -> LatencyReport {
        if self.samples == 0 {
            LatencyReport::EMPTY
        } else {
            LatencyReport { min: self.min, max: self.max, samples: self.samples }
        }
    }

    /// Report and start a fresh measurement period.
    pub fn take_report(&mut self) -> LatencyReport {
        let report = self.report();
        self.reset();
        report
    }

    fn reset(&mut self) {
        self.min = u32::MAX;
        self.max = 0;
        self.samples = 0;
    }
}

impl Default for LatencyBench {
    fn default() -> Self {
        Self::new()
    }
}
