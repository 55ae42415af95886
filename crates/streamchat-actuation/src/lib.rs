pub mod actuator;
pub mod decision;
pub mod enigo_actuator;
pub mod filter;

// Public API
pub use actuator::{wait_until_available, ChatActuator, NoopActuator};
pub use decision::{parse_decision, DecisionPayload};
pub use enigo_actuator::EnigoActuator;
pub use filter::{DecisionFilter, FilterLoop, FilterOutcome};
