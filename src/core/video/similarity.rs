//! 帧相似度与自适应跳帧阈值

use std::collections::VecDeque;

use super::frame::{luma, Frame};

/// Percentage (0..=100) of pixels whose grayscale difference falls in the
/// lowest of four histogram bins over `[0, 256)`, i.e. below 64.
pub fn calculate_similarity(previous: &Frame, current: &Frame) -> f64 {
    if previous.width != current.width || previous.height != current.height {
        return 0.0;
    }

    let mut hist = [0u64; 4];
    for (a, b) in previous
        .data
        .chunks_exact(3)
        .zip(current.data.chunks_exact(3))
    {
        let diff = [a[0].abs_diff(b[0]), a[1].abs_diff(b[1]), a[2].abs_diff(b[2])];
        hist[(luma(&diff) >> 6) as usize] += 1;
    }

    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0.0;
    }
    100.0 * hist[0] as f64 / total as f64
}

/// Bounded record of how many frames were skipped before each yielded frame.
#[derive(Debug, Clone)]
pub struct SkipHistory {
    entries: VecDeque<u32>,
    capacity: usize,
}

impl SkipHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, skip_count: u32) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(skip_count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Skip threshold adjusted to recent skip behaviour.
    ///
    /// Long runs of short skips lower the threshold by up to `reduce_rate`
    /// of `base`.
    pub fn adjusted_threshold(&self, base: f64, reduce_rate: f64) -> f64 {
        if self.entries.len() <= (self.capacity / 10).max(5) {
            return base;
        }

        let criterion = ((self.capacity as f64 * 0.4) as usize).max(5) as f64;
        let average = mean(self.entries.iter().copied()).sqrt();
        let upper = average.max(1.0);
        let contiguous = longest_run(self.entries.iter().map(|&s| s > 0 && (s as f64) < upper));

        let nerf = 1.0 - 0.5 * ((contiguous as f64 - 5.0).max(0.0) / criterion).min(1.0);

        let nonzero: Vec<u32> = self.entries.iter().copied().filter(|&s| s > 0).collect();
        let count = if nonzero.is_empty() {
            0
        } else {
            let nerfed_upper = (nerf * mean(nonzero.iter().copied()).sqrt()).max(1.0);
            nonzero.iter().filter(|&&s| (s as f64) < nerfed_upper).count()
        };
        let count = (count as f64 - 5.0).max(0.0).min(criterion);

        base * (1.0 - reduce_rate * (count / criterion).powf(1.5))
    }
}

fn mean(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, n) = values.fold((0u64, 0u64), |(s, n), v| (s + v as u64, n + 1));
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

fn longest_run(flags: impl Iterator<Item = bool>) -> usize {
    let mut count = 0;
    let mut best = 0;
    for flag in flags {
        count = if flag { count + 1 } else { 0 };
        best = best.max(count);
    }
    best
}
