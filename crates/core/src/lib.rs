pub mod audit;
pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod manager;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use backend::{BackendError, InMemoryRequestBackend, RequestBackend};
pub use domain::employee::{Employee, EmployeeDraft, EmployeeFilter, EmployeeId, EmployeeRole};
pub use domain::service_request::{
    AssignedEmployee, DisplayStatus, Location, Quote, RequestStatus, ServiceRequestId,
    ServiceRequestState, ServiceType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, RequestEvent, RequestUpdate, RoadsideFlow};
pub use manager::{ManagerSettings, RequestBinding, ServiceRequestManager, Subscription};
