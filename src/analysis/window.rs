use std::collections::VecDeque;

/// Fixed-capacity history of recent samples with mean/variance queries.
///
/// The oldest sample is dropped once capacity is reached.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Population variance; zero until two samples exist.
    pub fn variance(&self) -> f32 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f32>()
            / self.values.len() as f32
    }

    pub fn std_dev(&self) -> f32 {
        self.variance().sqrt()
    }

    /// Maximum of the newest `n` samples.
    pub fn recent_max(&self, n: usize) -> f32 {
        self.values
            .iter()
            .rev()
            .take(n)
            .copied()
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), 3.0);
    }

    #[test]
    fn test_variance() {
        let mut window = RollingWindow::new(4);
        window.push(5.0);
        assert_eq!(window.variance(), 0.0);
        window.push(1.0);
        window.push(5.0);
        window.push(1.0);
        assert_eq!(window.mean(), 3.0);
        assert_eq!(window.variance(), 4.0);
        assert_eq!(window.std_dev(), 2.0);
    }

    #[test]
    fn test_recent_max_looks_only_at_newest() {
        let mut window = RollingWindow::new(10);
        for v in [9.0, 1.0, 2.0, 3.0] {
            window.push(v);
        }
        assert_eq!(window.recent_max(3), 3.0);
        assert_eq!(window.recent_max(10), 9.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.recent_max(3), 0.0);
    }
}
