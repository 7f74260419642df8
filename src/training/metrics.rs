use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of a single Q-learning episode or heat-map walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeResult {
    pub reward: f64,
    pub steps: usize,
    pub reached: bool,
}

/// Training metrics tracker with rolling window computations.
pub struct TrainingMetrics {
    results: VecDeque<EpisodeResult>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
    best_length: Option<usize>,
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            results: VecDeque::with_capacity(capacity),
            capacity,
            total_episodes: 0,
            best_length: None,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_episode(&mut self, result: EpisodeResult) {
        self.total_episodes += 1;
        if result.reached && self.best_length.map_or(true, |best| result.steps < best) {
            self.best_length = Some(result.steps);
        }
        self.results.push_back(result);
        if self.results.len() > self.capacity {
            self.results.pop_front();
        }
    }

    fn last(&self, last_n: usize) -> impl Iterator<Item = &EpisodeResult> {
        let n = self.results.len().min(last_n);
        self.results.iter().rev().take(n)
    }

    /// Fraction of the last N episodes that reached their target.
    pub fn success_rate(&self, last_n: usize) -> f64 {
        let n = self.results.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        self.last(n).filter(|r| r.reached).count() as f64 / n as f64
    }

    /// Average cumulative reward over the last N episodes.
    pub fn average_reward(&self, last_n: usize) -> f64 {
        let n = self.results.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        self.last(n).map(|r| r.reward).sum::<f64>() / n as f64
    }

    /// Average episode length in steps over the last N episodes.
    pub fn average_length(&self, last_n: usize) -> f64 {
        let n = self.results.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        self.last(n).map(|r| r.steps).sum::<usize>() as f64 / n as f64
    }

    /// Shortest successful episode seen so far, in steps.
    pub fn best_length(&self) -> Option<usize> {
        self.best_length
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Throughput tracker for the training loop.
pub struct TimingMetrics {
    iteration_micros: VecDeque<u32>,
    capacity: usize,
    window_start: Instant,
    window_count: usize,
}

impl TimingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TimingMetrics {
            iteration_micros: VecDeque::with_capacity(capacity),
            capacity,
            window_start: Instant::now(),
            window_count: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_iteration_time(&mut self, d: Duration) {
        self.iteration_micros
            .push_back(d.as_micros().min(u128::from(u32::MAX)) as u32);
        if self.iteration_micros.len() > self.capacity {
            self.iteration_micros.pop_front();
        }
        self.window_count += 1;
    }

    /// Mean of the last `last_n` iteration times in milliseconds.
    pub fn avg_iteration_ms(&self, last_n: usize) -> f64 {
        let n = self.iteration_micros.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let mean = self
            .iteration_micros
            .iter()
            .rev()
            .take(n)
            .map(|&v| v as f64)
            .sum::<f64>()
            / n as f64;
        mean / 1000.0
    }

    /// Iterations per second since the last `reset_window` call.
    pub fn iterations_per_sec(&self) -> f64 {
        let micros = self.window_start.elapsed().as_micros();
        if micros == 0 {
            return 0.0;
        }
        self.window_count as f64 / (micros as f64 / 1_000_000.0)
    }

    /// Reset the throughput window (call after each report).
    pub fn reset_window(&mut self) {
        self.window_start = Instant::now();
        self.window_count = 0;
    }
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(reward: f64, steps: usize, reached: bool) -> EpisodeResult {
        EpisodeResult {
            reward,
            steps,
            reached,
        }
    }

    #[test]
    fn test_success_rate() {
        let mut m = TrainingMetrics::new();
        for _ in 0..7 {
            m.record_episode(result(1.0, 10, true));
        }
        for _ in 0..3 {
            m.record_episode(result(-5.0, 40, false));
        }
        assert!((m.success_rate(10) - 0.7).abs() < 1e-9);
        assert!((m.success_rate(3) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_reward_and_length() {
        let mut m = TrainingMetrics::new();
        m.record_episode(result(10.0, 20, true));
        m.record_episode(result(-2.0, 30, false));
        assert!((m.average_reward(10) - 4.0).abs() < 1e-9);
        assert!((m.average_length(10) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_length_only_counts_successes() {
        let mut m = TrainingMetrics::new();
        m.record_episode(result(0.0, 3, false));
        assert_eq!(m.best_length(), None);
        m.record_episode(result(0.0, 12, true));
        m.record_episode(result(0.0, 9, true));
        m.record_episode(result(0.0, 15, true));
        assert_eq!(m.best_length(), Some(9));
    }

    #[test]
    fn test_window_is_capped_but_total_is_not() {
        let mut m = TrainingMetrics::with_capacity(5);
        for _ in 0..12 {
            m.record_episode(result(1.0, 1, true));
        }
        assert_eq!(m.total_episodes(), 12);
        assert!((m.success_rate(100) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let m = TrainingMetrics::new();
        assert_eq!(m.success_rate(10), 0.0);
        assert_eq!(m.average_reward(10), 0.0);
        assert_eq!(m.average_length(10), 0.0);
    }

    #[test]
    fn test_timing_avg_iteration_ms() {
        let mut t = TimingMetrics::new();
        t.record_iteration_time(Duration::from_micros(2000));
        t.record_iteration_time(Duration::from_micros(4000));
        assert!((t.avg_iteration_ms(100) - 3.0).abs() < 1e-6);
        assert!((t.avg_iteration_ms(1) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_timing_iterations_per_sec_positive() {
        let mut t = TimingMetrics::new();
        for _ in 0..10 {
            t.record_iteration_time(Duration::from_micros(1000));
        }
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.iterations_per_sec() > 0.0);
        t.reset_window();
        assert_eq!(t.iterations_per_sec(), 0.0);
    }
}
