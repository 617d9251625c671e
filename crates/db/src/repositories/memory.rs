use std::collections::HashMap;

use tokio::sync::RwLock;

use roadside_core::domain::employee::{Employee, EmployeeFilter, EmployeeId};
use roadside_core::domain::service_request::{ServiceRequestId, ServiceRequestState};

use super::{EmployeeRepository, RepositoryError, ServiceRequestRepository};

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(filter.apply(employees.values().cloned()))
    }

    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn delete(&self, id: &EmployeeId) -> Result<bool, RepositoryError> {
        let mut employees = self.employees.write().await;
        Ok(employees.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryServiceRequestRepository {
    requests: RwLock<HashMap<String, ServiceRequestState>>,
}

#[async_trait::async_trait]
impl ServiceRequestRepository for InMemoryServiceRequestRepository {
    async fn find_by_id(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequestState>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: ServiceRequestState) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use roadside_core::backend::RequestBackend;
    use roadside_core::domain::employee::{EmployeeDraft, EmployeeFilter, EmployeeRole};
    use roadside_core::domain::service_request::{
        Location, Quote, RequestStatus, ServiceRequestState, ServiceType,
    };
    use roadside_core::flows::RequestUpdate;

    use crate::repositories::{
        EmployeeRepository, InMemoryEmployeeRepository, InMemoryServiceRequestRepository,
        RepositoryBackend, ServiceRequestRepository,
    };

    fn draft(name: &str, role: EmployeeRole) -> EmployeeDraft {
        EmployeeDraft {
            name: name.to_string(),
            email: format!("{}@roadside.test", name.to_lowercase().replace(' ', ".")),
            phone: None,
            role,
            active: true,
        }
    }

    #[tokio::test]
    async fn in_memory_employee_repo_filters_and_deletes() {
        let repo = InMemoryEmployeeRepository::default();
        let kept = draft("Ravi Shah", EmployeeRole::Technician).into_employee().expect("valid");
        let removed = draft("Bea Quinn", EmployeeRole::Admin).into_employee().expect("valid");
        repo.save(kept.clone()).await.expect("save");
        repo.save(removed.clone()).await.expect("save");

        let technicians = repo
            .list(&EmployeeFilter { search: None, role: Some(EmployeeRole::Technician) })
            .await
            .expect("list");
        assert_eq!(technicians, vec![kept.clone()]);

        assert!(repo.delete(&removed.id).await.expect("delete"));
        assert!(!repo.delete(&removed.id).await.expect("delete again"));
        assert_eq!(repo.list(&EmployeeFilter::default()).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn repository_backend_over_memory_accepts_current_quote() {
        let backend = RepositoryBackend::new(InMemoryServiceRequestRepository::default());
        let request =
            ServiceRequestState::new(ServiceType::Battery, Location::new(3.0, 4.0), "dead battery");
        backend.submit_request(&request).await.expect("submit");

        let quote = Quote::new(Decimal::new(65, 0), "Ravi");
        backend
            .record_update(&request.id, RequestUpdate::QuoteIssued { quote: quote.clone() })
            .await
            .expect("quote issued");
        backend.accept_quote(&request.id, &quote).await.expect("accept");

        let stored =
            backend.repository().find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, RequestStatus::QuoteAccepted);
        assert_eq!(stored.current_quote, Some(quote));
    }
}
