//! Learning-rate controllers.
//!
//! An [`Optimizer`] owns the current learning rate of a run and a step
//! counter. The numeric update itself happens inside the model backend; the
//! controller decides which rate the backend is handed for each batch and
//! decays it on an epoch schedule.

use tc_core::config::OptimizerKind;

/// Stateful learning-rate controller.
pub trait Optimizer: Send {
    fn name(&self) -> &'static str;

    fn learning_rate(&self) -> f64;

    /// Advance by one batch.
    fn step(&mut self);

    /// Batches seen since construction or the last [`reset`](Self::reset).
    fn steps(&self) -> u64;

    /// Apply the epoch schedule after `epoch` (0-based). Returns `true`
    /// when the rate changed. `val_loss` is accepted for schedules that
    /// react to the objective; the built-in variants ignore it.
    fn update_learning_rate(&mut self, epoch: usize, val_loss: f64) -> bool;

    /// Zero the step counter. The learning rate is kept.
    fn reset(&mut self);
}

/// Rate and counter shared by all variants.
#[derive(Debug, Clone, Copy)]
struct LrState {
    lr: f64,
    steps: u64,
}

impl LrState {
    fn new(lr: f64) -> Self {
        Self { lr, steps: 0 }
    }

    fn decay_every(&mut self, epoch: usize, period: usize, factor: f64) -> bool {
        if epoch > 0 && epoch % period == 0 {
            self.lr *= factor;
            true
        } else {
            false
        }
    }
}

macro_rules! lr_state_accessors {
    () => {
        fn learning_rate(&self) -> f64 {
            self.state.lr
        }

        fn step(&mut self) {
            self.state.steps += 1;
        }

        fn steps(&self) -> u64 {
            self.state.steps
        }

        fn reset(&mut self) {
            self.state.steps = 0;
        }
    };
}

/// SGD with momentum: halves the rate every 30 epochs.
#[derive(Debug, Clone)]
pub struct MomentumSgd {
    state: LrState,
}

impl MomentumSgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            state: LrState::new(learning_rate),
        }
    }
}

impl Optimizer for MomentumSgd {
    fn name(&self) -> &'static str {
        "sgd"
    }

    lr_state_accessors!();

    fn update_learning_rate(&mut self, epoch: usize, _val_loss: f64) -> bool {
        self.state.decay_every(epoch, 30, 0.5)
    }
}

/// Adaptive per-parameter (Adam): ×0.95 every 25 epochs.
#[derive(Debug, Clone)]
pub struct Adam {
    state: LrState,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            state: LrState::new(learning_rate),
        }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    lr_state_accessors!();

    fn update_learning_rate(&mut self, epoch: usize, _val_loss: f64) -> bool {
        self.state.decay_every(epoch, 25, 0.95)
    }
}

/// RMS-based: ×0.8 every 15 epochs once past epoch 10.
#[derive(Debug, Clone)]
pub struct RmsProp {
    state: LrState,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            state: LrState::new(learning_rate),
        }
    }
}

impl Optimizer for RmsProp {
    fn name(&self) -> &'static str {
        "rmsprop"
    }

    lr_state_accessors!();

    fn update_learning_rate(&mut self, epoch: usize, _val_loss: f64) -> bool {
        if epoch <= 10 {
            return false;
        }
        self.state.decay_every(epoch, 15, 0.8)
    }
}

/// Step decay: ×0.9 every 20 epochs.
#[derive(Debug, Clone)]
pub struct StepDecay {
    state: LrState,
}

impl StepDecay {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            state: LrState::new(learning_rate),
        }
    }
}

impl Optimizer for StepDecay {
    fn name(&self) -> &'static str {
        "step_decay"
    }

    lr_state_accessors!();

    fn update_learning_rate(&mut self, epoch: usize, _val_loss: f64) -> bool {
        self.state.decay_every(epoch, 20, 0.9)
    }
}

/// Build the controller for `kind` starting at `learning_rate`.
pub fn build_optimizer(kind: OptimizerKind, learning_rate: f64) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Sgd => Box::new(MomentumSgd::new(learning_rate)),
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
        OptimizerKind::Rmsprop => Box::new(RmsProp::new(learning_rate)),
        OptimizerKind::StepDecay => Box::new(StepDecay::new(learning_rate)),
    }
}
