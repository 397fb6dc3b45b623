//! Early-stopping monitor.

use serde::{Deserialize, Serialize};

/// Direction in which the monitored value improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Minimize,
    Maximize,
}

impl Polarity {
    /// Accuracy-like metric names are maximized; everything else (losses,
    /// errors) is minimized.
    pub fn for_metric(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        const MAXIMIZED: [&str; 6] = ["acc", "f1", "precision", "recall", "sharpe", "r2"];
        if MAXIMIZED.iter().any(|m| name.contains(m)) {
            Self::Maximize
        } else {
            Self::Minimize
        }
    }

    fn worst(self) -> f64 {
        match self {
            Self::Minimize => f64::INFINITY,
            Self::Maximize => f64::NEG_INFINITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    Improving,
    Waiting,
    Stopped,
}

/// Signals termination after `patience` consecutive observations without
/// an improvement larger than `min_delta`.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    polarity: Polarity,
    best: f64,
    wait: usize,
    state: MonitorState,
}

impl EarlyStopping {
    /// `patience` below 1 is raised to 1; a negative `min_delta` is treated
    /// as 0.
    pub fn new(patience: usize, min_delta: f64, monitor: &str) -> Self {
        let polarity = Polarity::for_metric(monitor);
        Self {
            patience: patience.max(1),
            min_delta: min_delta.max(0.0),
            polarity,
            best: polarity.worst(),
            wait: 0,
            state: MonitorState::Improving,
        }
    }

    fn improves(&self, value: f64) -> bool {
        match self.polarity {
            Polarity::Minimize => value < self.best - self.min_delta,
            Polarity::Maximize => value > self.best + self.min_delta,
        }
    }

    /// Feed one epoch's value. Returns `true` once the monitor has stopped.
    /// A NaN never counts as an improvement.
    pub fn should_stop(&mut self, value: f64) -> bool {
        if self.state == MonitorState::Stopped {
            return true;
        }
        if self.improves(value) {
            self.best = value;
            self.wait = 0;
            self.state = MonitorState::Improving;
            return false;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            self.state = MonitorState::Stopped;
            tracing::info!(
                best = self.best,
                patience = self.patience,
                "early stopping triggered"
            );
            true
        } else {
            self.state = MonitorState::Waiting;
            false
        }
    }

    /// Restore bookkeeping on resume.
    pub fn seed(&mut self, best: f64, wait: usize) {
        self.best = best;
        self.wait = wait.min(self.patience.saturating_sub(1));
        self.state = if self.wait == 0 {
            MonitorState::Improving
        } else {
            MonitorState::Waiting
        };
    }

    pub fn reset(&mut self) {
        self.best = self.polarity.worst();
        self.wait = 0;
        self.state = MonitorState::Improving;
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn wait(&self) -> usize {
        self.wait
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patience_three_on_flat_sequence() {
        let mut es = EarlyStopping::new(3, 0.0, "val_loss");
        // First value establishes the baseline.
        assert!(!es.should_stop(1.0));
        assert_eq!(es.state(), MonitorState::Improving);
        assert!(!es.should_stop(1.0));
        assert_eq!(es.state(), MonitorState::Waiting);
        assert!(!es.should_stop(1.0));
        assert!(es.should_stop(1.0));
        assert_eq!(es.state(), MonitorState::Stopped);
        // Sticky until reset.
        assert!(es.should_stop(0.1));
    }

    #[test]
    fn test_improvement_resets_wait() {
        let mut es = EarlyStopping::new(2, 0.0, "val_loss");
        assert!(!es.should_stop(1.0));
        assert!(!es.should_stop(1.1));
        assert_eq!(es.wait(), 1);
        assert!(!es.should_stop(0.9));
        assert_eq!(es.wait(), 0);
        assert_eq!(es.best(), 0.9);
    }

    #[test]
    fn test_min_delta() {
        let mut es = EarlyStopping::new(1, 0.1, "val_loss");
        assert!(!es.should_stop(1.0));
        // 0.95 is better but not by more than 0.1.
        assert!(es.should_stop(0.95));
    }

    #[test]
    fn test_maximize_polarity() {
        assert_eq!(Polarity::for_metric("val_accuracy"), Polarity::Maximize);
        assert_eq!(Polarity::for_metric("val_f1"), Polarity::Maximize);
        assert_eq!(Polarity::for_metric("val_loss"), Polarity::Minimize);
        assert_eq!(Polarity::for_metric("mse"), Polarity::Minimize);

        let mut es = EarlyStopping::new(2, 0.0, "val_accuracy");
        assert!(!es.should_stop(0.5));
        assert!(!es.should_stop(0.6));
        assert!(!es.should_stop(0.55));
        assert!(es.should_stop(0.6));
    }

    #[test]
    fn test_nan_is_not_improvement() {
        let mut es = EarlyStopping::new(1, 0.0, "val_loss");
        assert!(es.should_stop(f64::NAN));
    }

    #[test]
    fn test_reset() {
        let mut es = EarlyStopping::new(1, 0.0, "val_loss");
        es.should_stop(1.0);
        es.should_stop(2.0);
        assert_eq!(es.state(), MonitorState::Stopped);
        es.reset();
        assert_eq!(es.state(), MonitorState::Improving);
        assert_eq!(es.best(), f64::INFINITY);
        assert!(!es.should_stop(5.0));
    }

    #[test]
    fn test_seed_on_resume() {
        let mut es = EarlyStopping::new(3, 0.0, "val_loss");
        es.seed(0.4, 2);
        assert_eq!(es.state(), MonitorState::Waiting);
        assert!(es.should_stop(0.5));
    }
}
