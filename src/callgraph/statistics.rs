//! Online statistics of call durations.
//!
//! Samples are folded in one at a time with Welford's update, and two
//! accumulators combine with Chan's parallel formula, so the result does
//! not depend on the order in which call sites were merged.

/// Running distribution of integer samples
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statistics {
    count: u64,
    total: i64,
    min: Option<i64>,
    max: Option<i64>,
    mean: f64,
    /// Sum of squared differences from the mean
    m2: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample in
    pub fn update(&mut self, value: i64) {
        self.count += 1;
        self.total += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));

        let delta = value as f64 - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value as f64 - self.mean);
    }

    /// Combine with another accumulator
    pub fn merge(&mut self, other: &Statistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (n_a, n_b, n) = (self.count as f64, other.count as f64, count as f64);

        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count = count;
        self.total += other.total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn min(&self) -> Option<i64> {
        self.min
    }

    pub fn max(&self) -> Option<i64> {
        self.max
    }

    /// Mean of the samples, NaN without samples
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Sample variance, NaN with fewer than two samples
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            f64::NAN
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation, NaN with fewer than two samples
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Duration and self time distributions of a call site
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallSiteStatistics {
    pub duration: Statistics,
    pub self_time: Statistics,
}

impl CallSiteStatistics {
    pub fn update(&mut self, duration: i64, self_time: i64) {
        self.duration.update(duration);
        self.self_time.update(self_time);
    }

    pub fn merge(&mut self, other: &CallSiteStatistics) {
        self.duration.merge(&other.duration);
        self.self_time.merge(&other.self_time);
    }
}
