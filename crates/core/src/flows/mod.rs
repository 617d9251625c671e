pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, RoadsideFlow};
pub use states::{RequestAction, RequestEvent, RequestUpdate, TransitionOutcome};
