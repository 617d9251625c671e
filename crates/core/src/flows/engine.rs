use thiserror::Error;

use crate::domain::service_request::RequestStatus;
use crate::flows::states::{RequestAction, RequestEvent, TransitionOutcome};

pub trait FlowDefinition: Send + Sync {
    fn initial_state(&self) -> RequestStatus;
    fn transition(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct RoadsideFlow;

impl FlowDefinition for RoadsideFlow {
    fn initial_state(&self) -> RequestStatus {
        RequestStatus::RequestAccepted
    }

    fn transition(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_roadside(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> RequestStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &RequestStatus,
        event: &RequestEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }
}

impl Default for FlowEngine<RoadsideFlow> {
    fn default() -> Self {
        Self::new(RoadsideFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {} using event {}", .state.as_str(), .event.name())]
    InvalidTransition { state: RequestStatus, event: RequestEvent },
}

fn transition_roadside(
    current: &RequestStatus,
    event: &RequestEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use RequestAction::{
        AssignEmployee, ClearQuote, IncrementDeclineCount, MarkRevision, ReleaseRequestSlot,
        StoreQuote,
    };
    use RequestStatus::{
        Cancelled, Completed, InProgress, QuoteAccepted, QuoteDeclined, QuoteReceived,
        RequestAccepted,
    };

    let (to, actions) = match (current, event) {
        (Completed, _) | (Cancelled, _) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
        (RequestAccepted, RequestEvent::QuoteIssued(quote)) => {
            (QuoteReceived, vec![StoreQuote(quote.clone())])
        }
        (QuoteDeclined, RequestEvent::QuoteIssued(quote)) => {
            (QuoteReceived, vec![StoreQuote(quote.clone()), MarkRevision])
        }
        (QuoteReceived, RequestEvent::QuoteAccepted) => (QuoteAccepted, Vec::new()),
        (QuoteReceived, RequestEvent::QuoteDeclined) => {
            (QuoteDeclined, vec![ClearQuote, IncrementDeclineCount])
        }
        (QuoteAccepted, RequestEvent::WorkStarted) => (InProgress, Vec::new()),
        (InProgress, RequestEvent::WorkCompleted) => {
            (Completed, vec![ClearQuote, ReleaseRequestSlot])
        }
        (_, RequestEvent::EmployeeAssigned(employee)) => {
            (*current, vec![AssignEmployee(employee.clone())])
        }
        (_, RequestEvent::CancelRequested) => (Cancelled, vec![ClearQuote, ReleaseRequestSlot]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
