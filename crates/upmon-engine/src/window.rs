//! Bounded per-unit duration history: a capped window of recent raw
//! samples for percentiles, plus a Welford accumulator holding everything
//! recorded since the last baseline rebase. Raw samples evicted from the
//! window are already folded into the accumulator, so history stays
//! bounded no matter how long a unit runs.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct DurationSample {
    pub recorded_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Running mean/variance accumulator (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct BaselineAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    started_at: Option<DateTime<Utc>>,
}

impl BaselineAccumulator {
    pub fn add(&mut self, value: f64, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation; `None` below two samples.
    pub fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / self.count as f64).sqrt())
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::default();
        self.started_at = Some(now);
    }
}

/// Per-unit sample window with a rolling baseline.
pub struct SampleWindow {
    max_samples: usize,
    baseline_span: Duration,
    data: VecDeque<DurationSample>,
    baseline: BaselineAccumulator,
}

impl SampleWindow {
    pub fn new(max_samples: usize, baseline_span_secs: i64) -> Self {
        Self {
            max_samples,
            baseline_span: Duration::seconds(baseline_span_secs),
            data: VecDeque::with_capacity(max_samples),
            baseline: BaselineAccumulator::default(),
        }
    }

    pub fn push(&mut self, duration_ms: i64, now: DateTime<Utc>) {
        // Rebase once the aggregate has covered a full baseline span, so
        // old behavior ages out instead of accumulating forever. The
        // retained raw window re-seeds the new accumulator.
        if let Some(started) = self.baseline.started_at {
            if now - started > self.baseline_span {
                self.baseline.reset(now);
                for sample in &self.data {
                    self.baseline.add(sample.duration_ms as f64, now);
                }
            }
        }
        self.baseline.add(duration_ms as f64, now);
        self.data.push_back(DurationSample {
            recorded_at: now,
            duration_ms,
        });
        while self.data.len() > self.max_samples {
            self.data.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn baseline(&self) -> &BaselineAccumulator {
        &self.baseline
    }

    /// Most recent `n` durations, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<i64> {
        let skip = self.data.len().saturating_sub(n);
        self.data.iter().skip(skip).map(|s| s.duration_ms).collect()
    }

    pub fn latest(&self) -> Option<i64> {
        self.data.back().map(|s| s.duration_ms)
    }

    /// Window mean.
    pub fn avg(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: i64 = self.data.iter().map(|s| s.duration_ms).sum();
        sum as f64 / self.data.len() as f64
    }

    /// Nearest-rank percentile over the retained window: rank is
    /// `ceil(p/100 * n)`, clamped to `[1, n]`, and ties round up. Returns
    /// `None` on an empty window.
    pub fn percentile(&self, p: f64) -> Option<i64> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted: Vec<i64> = self.data.iter().map(|s| s.duration_ms).collect();
        sorted.sort_unstable();
        let n = sorted.len();
        let rank = ((p / 100.0) * n as f64).ceil() as usize;
        let rank = rank.clamp(1, n);
        Some(sorted[rank - 1])
    }
}
