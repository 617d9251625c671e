use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::flows::states::{RequestAction, TransitionOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRequestId(pub String);

impl ServiceRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ServiceRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    FlatTyre,
    OutOfFuel,
    Other,
    TowTruck,
    Emergency,
    Support,
    Battery,
}

impl ServiceType {
    pub const ALL: [ServiceType; 7] = [
        Self::FlatTyre,
        Self::OutOfFuel,
        Self::Other,
        Self::TowTruck,
        Self::Emergency,
        Self::Support,
        Self::Battery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlatTyre => "flat-tyre",
            Self::OutOfFuel => "out-of-fuel",
            Self::Other => "other",
            Self::TowTruck => "tow-truck",
            Self::Emergency => "emergency",
            Self::Support => "support",
            Self::Battery => "battery",
        }
    }
}

impl std::str::FromStr for ServiceType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unknown service type `{value}`"))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    RequestAccepted,
    QuoteReceived,
    QuoteDeclined,
    QuoteAccepted,
    InProgress,
    Completed,
    Cancelled,
}

/// Simplified three-way status used by status views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::RequestAccepted,
        Self::QuoteReceived,
        Self::QuoteDeclined,
        Self::QuoteAccepted,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses in which a quote may be attached to the request.
    pub fn permits_quote(&self) -> bool {
        matches!(self, Self::QuoteReceived | Self::QuoteAccepted | Self::InProgress)
    }

    pub fn display_status(&self) -> DisplayStatus {
        match self {
            Self::RequestAccepted | Self::QuoteReceived | Self::QuoteDeclined => {
                DisplayStatus::Pending
            }
            Self::QuoteAccepted | Self::InProgress | Self::Completed => DisplayStatus::Accepted,
            Self::Cancelled => DisplayStatus::Declined,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestAccepted => "request_accepted",
            Self::QuoteReceived => "quote_received",
            Self::QuoteDeclined => "quote_declined",
            Self::QuoteAccepted => "quote_accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == value.trim()).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unknown request status `{value}`"))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A priced offer issued by an employee. Never mutated after issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub amount: Decimal,
    pub employee_name: String,
}

impl Quote {
    pub fn new(amount: Decimal, employee_name: impl Into<String>) -> Self {
        Self { amount, employee_name: employee_name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignedEmployee {
    pub name: String,
    pub location: Option<Location>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequestState {
    pub id: ServiceRequestId,
    pub service_type: ServiceType,
    pub status: RequestStatus,
    pub location: Location,
    pub message: String,
    pub assigned_employee: Option<AssignedEmployee>,
    pub current_quote: Option<Quote>,
    pub decline_count: u32,
    pub has_received_revision: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequestState {
    pub fn new(service_type: ServiceType, location: Location, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ServiceRequestId::generate(),
            service_type,
            status: RequestStatus::RequestAccepted,
            location,
            message: message.into(),
            assigned_employee: None,
            current_quote: None,
            decline_count: 0,
            has_received_revision: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_status(&self) -> DisplayStatus {
        self.status.display_status()
    }

    /// Produces the state that results from a transition, leaving `self` untouched.
    pub fn apply(&self, outcome: &TransitionOutcome) -> Result<Self, DomainError> {
        if outcome.from != self.status {
            return Err(DomainError::InvariantViolation(format!(
                "transition computed from {:?} applied to request in {:?}",
                outcome.from, self.status
            )));
        }
        if self.status.is_terminal() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} is terminal ({:?})",
                self.id, self.status
            )));
        }

        let mut next = self.clone();
        next.status = outcome.to;
        for action in &outcome.actions {
            match action {
                RequestAction::StoreQuote(quote) => next.current_quote = Some(quote.clone()),
                RequestAction::ClearQuote => next.current_quote = None,
                RequestAction::IncrementDeclineCount => {
                    next.decline_count = next.decline_count.saturating_add(1);
                }
                RequestAction::MarkRevision => next.has_received_revision = true,
                RequestAction::AssignEmployee(employee) => {
                    next.assigned_employee = Some(employee.clone());
                }
                RequestAction::ReleaseRequestSlot => {}
            }
        }
        next.updated_at = Utc::now();
        next.check_invariants()?;
        Ok(next)
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.current_quote.is_some() && !self.status.permits_quote() {
            return Err(DomainError::InvariantViolation(format!(
                "request {} carries a quote while {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}
