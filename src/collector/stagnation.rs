// Detects when scrolling stops producing new content

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// The metric changed since the previous observation
    pub advanced: bool,
    /// Consecutive observations without change
    pub stagnant_count: u32,
}

#[derive(Debug, Clone)]
pub struct StagnationDetector {
    last: Option<u64>,
    stagnant_count: u32,
    threshold: u32,
}

impl StagnationDetector {
    /// No baseline: the first observation only establishes one
    pub fn new(threshold: u32) -> Self {
        Self {
            last: None,
            stagnant_count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Start from a metric measured before the first scroll step
    pub fn with_baseline(baseline: u64, threshold: u32) -> Self {
        Self {
            last: Some(baseline),
            ..Self::new(threshold)
        }
    }

    pub fn observe(&mut self, current: u64) -> Observation {
        if self.last == Some(current) {
            self.stagnant_count += 1;
            Observation {
                advanced: false,
                stagnant_count: self.stagnant_count,
            }
        } else {
            self.last = Some(current);
            self.stagnant_count = 0;
            Observation {
                advanced: true,
                stagnant_count: 0,
            }
        }
    }

    pub fn stagnant_count(&self) -> u32 {
        self.stagnant_count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Threshold reached: no further content is loading
    pub fn is_stagnant(&self) -> bool {
        self.stagnant_count >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_metric_three_times_counts_three() {
        let mut detector = StagnationDetector::with_baseline(4200, 3);
        for expected in 1..=3 {
            let obs = detector.observe(4200);
            assert!(!obs.advanced);
            assert_eq!(obs.stagnant_count, expected);
        }
        assert!(detector.is_stagnant());
    }

    #[test]
    fn test_increasing_sequence_never_stagnates() {
        let mut detector = StagnationDetector::with_baseline(0, 3);
        for height in (1000..20_000).step_by(1000) {
            let obs = detector.observe(height);
            assert!(obs.advanced);
            assert_eq!(obs.stagnant_count, 0);
        }
        assert!(!detector.is_stagnant());
    }

    #[test]
    fn test_growth_resets_counter() {
        let mut detector = StagnationDetector::with_baseline(100, 3);
        detector.observe(100);
        detector.observe(100);
        assert_eq!(detector.stagnant_count(), 2);
        assert_eq!(detector.observe(250).stagnant_count, 0);
        assert_eq!(detector.observe(250).stagnant_count, 1);
    }

    #[test]
    fn test_first_observation_without_baseline_advances() {
        let mut detector = StagnationDetector::new(2);
        assert!(detector.observe(500).advanced);
        assert_eq!(detector.observe(500).stagnant_count, 1);
        assert_eq!(detector.observe(500).stagnant_count, 2);
        assert!(detector.is_stagnant());
    }
}
