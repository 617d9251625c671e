use std::sync::Arc;

use rust_decimal::Decimal;

use roadside_core::audit::{AuditSink, InMemoryAuditSink};
use roadside_core::backend::BackendError;
use roadside_core::domain::service_request::{Location, Quote, RequestStatus, ServiceType};
use roadside_core::errors::ApplicationError;
use roadside_core::flows::RequestUpdate;
use roadside_core::manager::ServiceRequestManager;
use roadside_db::repositories::{
    AuditEventRepository, RepositoryBackend, ServiceRequestRepository, SqlAuditEventRepository,
    SqlServiceRequestRepository,
};
use roadside_db::{connect_with_settings, migrations, DbPool};

type LifecycleResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn migrated_pool() -> LifecycleResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect failed: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrations failed: {error}"))?;
    Ok(pool)
}

type SqlManager = ServiceRequestManager<Arc<RepositoryBackend<SqlServiceRequestRepository>>>;

fn manager_for(pool: &DbPool, sink: &InMemoryAuditSink) -> SqlManager {
    let backend = Arc::new(RepositoryBackend::new(SqlServiceRequestRepository::new(pool.clone())));
    let sink: Arc<dyn AuditSink> = Arc::new(sink.clone());
    ServiceRequestManager::new(backend).with_audit_sink(sink)
}

#[tokio::test]
async fn decline_then_accept_revision_is_persisted() -> LifecycleResult {
    let pool = migrated_pool().await?;
    let sink = InMemoryAuditSink::default();
    let manager = manager_for(&pool, &sink);
    let backend = Arc::clone(manager.backend());

    let id = manager
        .create_request(ServiceType::TowTruck, Location::new(52.52, 13.40), "gearbox failure")
        .await
        .map_err(|error| format!("create failed: {error}"))?;

    let rounds = [
        (Decimal::new(250, 0), RequestStatus::QuoteDeclined),
        (Decimal::new(210, 0), RequestStatus::QuoteAccepted),
    ];
    for (amount, expected_status) in rounds {
        let update = RequestUpdate::QuoteIssued { quote: Quote::new(amount, "Jo Alvarez") };
        backend
            .record_update(&id, update.clone())
            .await
            .map_err(|error| format!("backend rejected quote: {error}"))?;
        manager.apply_update(&id, update).await.map_err(|error| format!("update failed: {error}"))?;

        if expected_status == RequestStatus::QuoteDeclined {
            manager.decline_quote().await.map_err(|error| format!("decline failed: {error}"))?;
        } else {
            manager.accept_quote().await.map_err(|error| format!("accept failed: {error}"))?;
        }

        let stored = backend
            .repository()
            .find_by_id(&id)
            .await
            .map_err(|error| format!("reload failed: {error}"))?
            .ok_or_else(|| "request should be persisted".to_string())?;
        require_eq!(stored.status, expected_status);
    }

    let current = manager.current_request().ok_or_else(|| "request should be active".to_string())?;
    require_eq!(current.decline_count, 1);
    require!(current.has_received_revision, "second quote should be flagged as a revision");

    let audit_repo = SqlAuditEventRepository::new(pool.clone());
    for event in sink.events() {
        audit_repo.append(event).await.map_err(|error| format!("audit append failed: {error}"))?;
    }
    let persisted = audit_repo
        .list_for_request(&id)
        .await
        .map_err(|error| format!("audit list failed: {error}"))?;
    require!(
        persisted.iter().any(|event| event.event_type == "request.created"),
        "request creation should be audited"
    );
    require_eq!(
        persisted.iter().filter(|event| event.event_type == "flow.transition_applied").count(),
        4
    );

    Ok(())
}

#[tokio::test]
async fn stale_local_quote_is_rejected_and_state_is_kept() -> LifecycleResult {
    let pool = migrated_pool().await?;
    let sink = InMemoryAuditSink::default();
    let manager = manager_for(&pool, &sink);
    let backend = Arc::clone(manager.backend());

    let id = manager
        .create_request(ServiceType::FlatTyre, Location::new(0.0, 0.0), "nail in tyre")
        .await
        .map_err(|error| format!("create failed: {error}"))?;

    let issued = RequestUpdate::QuoteIssued { quote: Quote::new(Decimal::new(70, 0), "Kai") };
    backend
        .record_update(&id, issued)
        .await
        .map_err(|error| format!("backend rejected quote: {error}"))?;
    // The client only ever sees a different figure.
    let seen = RequestUpdate::QuoteIssued { quote: Quote::new(Decimal::new(60, 0), "Kai") };
    manager
        .apply_update(&id, seen)
        .await
        .map_err(|error| format!("update failed: {error}"))?;

    let result = manager.accept_quote().await;
    require!(
        matches!(result, Err(ApplicationError::Backend(BackendError::Rejected(_)))),
        "stale quote should be rejected by the backend, got {result:?}"
    );

    let current = manager.current_request().ok_or_else(|| "request should be active".to_string())?;
    require_eq!(current.status, RequestStatus::QuoteReceived);
    require!(
        sink.events().iter().any(|event| event.event_type == "dispatch.failed"),
        "backend rejection should be audited"
    );

    Ok(())
}

#[tokio::test]
async fn cancel_persists_terminal_status_and_frees_the_slot() -> LifecycleResult {
    let pool = migrated_pool().await?;
    let sink = InMemoryAuditSink::default();
    let manager = manager_for(&pool, &sink);

    let first = manager
        .create_request(ServiceType::Battery, Location::new(1.0, 1.0), "won't crank")
        .await
        .map_err(|error| format!("create failed: {error}"))?;
    manager.cancel_request().await.map_err(|error| format!("cancel failed: {error}"))?;

    let stored = manager
        .backend()
        .repository()
        .find_by_id(&first)
        .await
        .map_err(|error| format!("reload failed: {error}"))?
        .ok_or_else(|| "cancelled request should stay persisted".to_string())?;
    require_eq!(stored.status, RequestStatus::Cancelled);
    require!(manager.current_request().is_none(), "slot should be free after cancel");

    let second = manager
        .create_request(ServiceType::Battery, Location::new(1.0, 1.0), "still won't crank")
        .await
        .map_err(|error| format!("second create failed: {error}"))?;
    require!(second != first, "new request should get a fresh id");

    Ok(())
}
