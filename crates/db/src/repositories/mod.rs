use async_trait::async_trait;
use thiserror::Error;

use roadside_core::audit::AuditEvent;
use roadside_core::domain::employee::{Employee, EmployeeFilter, EmployeeId};
use roadside_core::domain::service_request::{ServiceRequestId, ServiceRequestState};

pub mod audit;
pub mod employee;
pub mod memory;
pub mod service_request;

pub use audit::SqlAuditEventRepository;
pub use employee::SqlEmployeeRepository;
pub use memory::{InMemoryEmployeeRepository, InMemoryServiceRequestRepository};
pub use service_request::{RepositoryBackend, SqlServiceRequestRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    /// Employees matching the filter, ordered by name then id.
    async fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, RepositoryError>;
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;
    /// Returns `false` when no employee had the given id.
    async fn delete(&self, id: &EmployeeId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ServiceRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequestState>, RepositoryError>;
    async fn save(&self, request: ServiceRequestState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_request(
        &self,
        request_id: &ServiceRequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}
