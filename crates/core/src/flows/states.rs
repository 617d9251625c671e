use serde::{Deserialize, Serialize};

use crate::domain::service_request::{AssignedEmployee, Quote, RequestStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RequestEvent {
    QuoteIssued(Quote),
    QuoteAccepted,
    QuoteDeclined,
    EmployeeAssigned(AssignedEmployee),
    WorkStarted,
    WorkCompleted,
    CancelRequested,
}

impl RequestEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::QuoteIssued(_) => "quote_issued",
            Self::QuoteAccepted => "quote_accepted",
            Self::QuoteDeclined => "quote_declined",
            Self::EmployeeAssigned(_) => "employee_assigned",
            Self::WorkStarted => "work_started",
            Self::WorkCompleted => "work_completed",
            Self::CancelRequested => "cancel_requested",
        }
    }
}

/// Changes pushed by the backend rather than initiated by the customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestUpdate {
    QuoteIssued { quote: Quote },
    EmployeeAssigned { employee: AssignedEmployee },
    WorkStarted,
    WorkCompleted,
}

impl From<RequestUpdate> for RequestEvent {
    fn from(update: RequestUpdate) -> Self {
        match update {
            RequestUpdate::QuoteIssued { quote } => Self::QuoteIssued(quote),
            RequestUpdate::EmployeeAssigned { employee } => Self::EmployeeAssigned(employee),
            RequestUpdate::WorkStarted => Self::WorkStarted,
            RequestUpdate::WorkCompleted => Self::WorkCompleted,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RequestAction {
    StoreQuote(Quote),
    ClearQuote,
    IncrementDeclineCount,
    MarkRevision,
    AssignEmployee(AssignedEmployee),
    ReleaseRequestSlot,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: RequestEvent,
    pub actions: Vec<RequestAction>,
}

impl TransitionOutcome {
    pub fn releases_slot(&self) -> bool {
        self.actions.contains(&RequestAction::ReleaseRequestSlot)
    }
}
