//! Rolling trailing-window state for one (aggregation, entity key, window)
//!
//! Samples are grouped into period-aligned buckets that each keep partial
//! sum/count/max/min. Expired buckets are dropped whole; the boundary bucket
//! is trimmed sample by sample so the answer stays exact. The period only
//! decides how many partials a snapshot folds over.

use std::collections::VecDeque;

/// A value observed at a timestamp (microseconds since epoch)
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    pub ts: i64,
    /// `None` for null source values
    pub value: Option<f64>,
    /// Non-null source value, numeric or not
    pub present: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Partial {
    pub sum: f64,
    pub count: u64,
    pub numeric: u64,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

impl Partial {
    fn add(&mut self, sample: &Sample) {
        if sample.present {
            self.count += 1;
        }
        if let Some(v) = sample.value {
            self.sum += v;
            self.numeric += 1;
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
        }
    }

    fn merge(&mut self, other: &Partial) {
        self.sum += other.sum;
        self.count += other.count;
        self.numeric += other.numeric;
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn avg(&self) -> Option<f64> {
        (self.numeric > 0).then(|| self.sum / self.numeric as f64)
    }
}

#[derive(Debug)]
struct Bucket {
    index: i64,
    samples: VecDeque<Sample>,
    partial: Partial,
}

impl Bucket {
    fn new(index: i64) -> Self {
        Self {
            index,
            samples: VecDeque::new(),
            partial: Partial::default(),
        }
    }

    fn push(&mut self, sample: Sample) {
        self.partial.add(&sample);
        self.samples.push_back(sample);
    }

    fn recompute(&mut self) {
        let mut partial = Partial::default();
        for sample in &self.samples {
            partial.add(sample);
        }
        self.partial = partial;
    }
}

/// Window `(now - length, now]` over samples pushed in timestamp order
#[derive(Debug)]
pub(crate) struct RollingWindow {
    length: i64,
    period: i64,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    pub fn new(length_micros: i64, period_micros: i64) -> Self {
        Self {
            length: length_micros,
            period: period_micros.max(1),
            buckets: VecDeque::new(),
        }
    }

    /// Drop every sample at or before `now - length`
    pub fn evict(&mut self, now: i64) {
        let cutoff = now.saturating_sub(self.length);

        while let Some(front) = self.buckets.front_mut() {
            let newest = front.samples.back().map(|s| s.ts).unwrap_or(i64::MIN);
            if newest <= cutoff {
                self.buckets.pop_front();
                continue;
            }

            let before = front.samples.len();
            while front.samples.front().map_or(false, |s| s.ts <= cutoff) {
                front.samples.pop_front();
            }
            if front.samples.len() != before {
                front.recompute();
            }
            break;
        }
    }

    /// Add a sample; timestamps must be non-decreasing
    pub fn push(&mut self, sample: Sample) {
        let index = sample.ts.div_euclid(self.period);
        match self.buckets.back_mut() {
            Some(bucket) if bucket.index == index => bucket.push(sample),
            _ => {
                let mut bucket = Bucket::new(index);
                bucket.push(sample);
                self.buckets.push_back(bucket);
            }
        }
    }

    /// Aggregate over every live sample
    pub fn snapshot(&self) -> Partial {
        let mut total = Partial::default();
        for bucket in &self.buckets {
            total.merge(&bucket.partial);
        }
        total
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000_000;

    fn sample(minute: i64, value: f64) -> Sample {
        Sample {
            ts: minute * MINUTE,
            value: Some(value),
            present: true,
        }
    }

    fn advance(window: &mut RollingWindow, s: Sample) -> Partial {
        window.evict(s.ts);
        window.push(s);
        window.snapshot()
    }

    #[test]
    fn test_open_lower_boundary() {
        let mut window = RollingWindow::new(2 * MINUTE, MINUTE);

        assert_eq!(advance(&mut window, sample(0, 10.0)).sum, 10.0);
        assert_eq!(advance(&mut window, sample(1, 20.0)).sum, 30.0);
        // t=0 sits exactly on the open boundary of (0, 2]
        let third = advance(&mut window, sample(2, 30.0));
        assert_eq!(third.sum, 50.0);
        assert_eq!(third.count, 2);
        assert_eq!(third.max, Some(30.0));
        assert_eq!(third.min, Some(20.0));
    }

    #[test]
    fn test_boundary_bucket_is_trimmed_exactly() {
        // one hour buckets, 2h window, samples every 20 minutes
        let mut window = RollingWindow::new(120 * MINUTE, 60 * MINUTE);
        for (i, minute) in [0, 20, 40, 60, 80, 100, 120, 140].into_iter().enumerate() {
            let snap = advance(&mut window, sample(minute, (i + 1) as f64));
            let expected: f64 = [0, 20, 40, 60, 80, 100, 120, 140]
                .iter()
                .enumerate()
                .filter(|(_, m)| **m > minute - 120 && **m <= minute)
                .map(|(j, _)| (j + 1) as f64)
                .sum();
            assert_eq!(snap.sum, expected, "at minute {minute}");
        }
        assert!(window.bucket_count() <= 3);
    }

    #[test]
    fn test_null_samples_only_affect_nothing() {
        let mut window = RollingWindow::new(10 * MINUTE, MINUTE);
        let snap = advance(
            &mut window,
            Sample {
                ts: 0,
                value: None,
                present: false,
            },
        );
        assert_eq!(snap.count, 0);
        assert_eq!(snap.avg(), None);
        assert_eq!(snap.max, None);
    }

    #[test]
    fn test_max_recovers_after_eviction() {
        let mut window = RollingWindow::new(3 * MINUTE, 3 * MINUTE);
        advance(&mut window, sample(0, 100.0));
        advance(&mut window, sample(1, 5.0));
        advance(&mut window, sample(2, 7.0));
        let snap = advance(&mut window, sample(3, 1.0));
        assert_eq!(snap.max, Some(7.0));
        assert_eq!(snap.min, Some(1.0));
        assert_eq!(snap.count, 3);
    }
}
