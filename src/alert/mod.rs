mod cooldown;
mod state;
mod step;

pub use cooldown::{CooldownConfig, CooldownDispatcher, TriggerAlert};
pub use state::AlertState;
pub use step::{StepAlert, StepAlertEngine, StepGates, StepMetric};
