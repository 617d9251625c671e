use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;

use super::{ManagerSettings, ServiceRequestManager};
use crate::audit::{AuditOutcome, InMemoryAuditSink};
use crate::backend::{BackendCall, BackendError, InMemoryRequestBackend};
use crate::domain::service_request::{
    AssignedEmployee, Location, Quote, RequestStatus, ServiceRequestId, ServiceRequestState,
    ServiceType,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::RequestUpdate;

type Manager = ServiceRequestManager<InMemoryRequestBackend>;
type Log = Arc<Mutex<Vec<(&'static str, ServiceRequestState)>>>;

fn manager() -> Manager {
    ServiceRequestManager::new(InMemoryRequestBackend::default())
}

fn record(manager: &Manager, label: &'static str, log: &Log) {
    let log = Arc::clone(log);
    let _subscription = manager.subscribe(move |state: &ServiceRequestState| {
        log.lock().expect("log lock").push((label, state.clone()));
    });
}

fn entries(log: &Log) -> Vec<(&'static str, ServiceRequestState)> {
    log.lock().expect("log lock").clone()
}

async fn create_flat_tyre(manager: &Manager) -> ServiceRequestId {
    manager
        .create_request(ServiceType::FlatTyre, Location::new(1.0, 1.0), "help")
        .await
        .expect("create request")
}

async fn issue_quote(manager: &Manager, id: &ServiceRequestId, amount: i64) {
    manager
        .apply_update(
            id,
            RequestUpdate::QuoteIssued { quote: Quote::new(Decimal::new(amount, 0), "Alex") },
        )
        .await
        .expect("quote issued");
}

#[tokio::test]
async fn scenario_create_then_duplicate_is_rejected() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;

    let state = manager.current_request().expect("active request");
    assert_eq!(state.id, id);
    assert_eq!(state.status, RequestStatus::RequestAccepted);
    assert_eq!(state.service_type, ServiceType::FlatTyre);
    assert_eq!(state.decline_count, 0);

    let error = manager
        .create_request(ServiceType::Battery, Location::new(2.0, 2.0), "again")
        .await
        .expect_err("second request must be rejected");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::DuplicateRequest { ref existing, .. })
            if *existing == id
    ));
    assert_eq!(manager.current_request().map(|state| state.id), Some(id));
}

#[tokio::test]
async fn duplicate_is_rejected_in_every_non_terminal_status() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;
    let mut statuses = vec![manager.current_request().expect("state").status];

    issue_quote(&manager, &id, 50).await;
    statuses.push(manager.current_request().expect("state").status);
    manager.decline_quote().await.expect("decline");
    statuses.push(manager.current_request().expect("state").status);
    issue_quote(&manager, &id, 45).await;
    manager.accept_quote().await.expect("accept");
    statuses.push(manager.current_request().expect("state").status);
    manager.apply_update(&id, RequestUpdate::WorkStarted).await.expect("start");
    statuses.push(manager.current_request().expect("state").status);

    assert_eq!(
        statuses,
        vec![
            RequestStatus::RequestAccepted,
            RequestStatus::QuoteReceived,
            RequestStatus::QuoteDeclined,
            RequestStatus::QuoteAccepted,
            RequestStatus::InProgress,
        ]
    );
    let error = manager
        .create_request(ServiceType::Other, Location::new(0.0, 0.0), "x")
        .await
        .expect_err("in progress blocks new request");
    assert!(matches!(error, ApplicationError::Domain(DomainError::DuplicateRequest { .. })));
}

#[tokio::test]
async fn scenario_accept_outstanding_quote() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 50).await;

    let received = manager.current_request().expect("state");
    assert_eq!(received.status, RequestStatus::QuoteReceived);
    assert_eq!(received.current_quote.as_ref().map(|q| q.employee_name.as_str()), Some("Alex"));

    manager.accept_quote().await.expect("accept");

    let state = manager.current_request().expect("state");
    assert_eq!(state.status, RequestStatus::QuoteAccepted);
    assert_eq!(state.current_quote.map(|quote| quote.amount), Some(Decimal::new(50, 0)));
    assert_eq!(
        manager.backend().calls().last(),
        Some(&BackendCall::AcceptQuote(id, Quote::new(Decimal::new(50, 0), "Alex")))
    );
}

#[tokio::test]
async fn scenario_decline_then_revision() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 50).await;

    manager.decline_quote().await.expect("decline");
    let declined = manager.current_request().expect("state");
    assert_eq!(declined.status, RequestStatus::QuoteDeclined);
    assert_eq!(declined.decline_count, 1);
    assert!(declined.current_quote.is_none());
    assert!(!declined.has_received_revision);

    issue_quote(&manager, &id, 40).await;
    let revised = manager.current_request().expect("state");
    assert_eq!(revised.status, RequestStatus::QuoteReceived);
    assert!(revised.has_received_revision);
    assert_eq!(revised.decline_count, 1);
    assert_eq!(revised.current_quote.map(|quote| quote.amount), Some(Decimal::new(40, 0)));
}

#[tokio::test]
async fn decline_count_strictly_increases_per_valid_decline() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;

    for expected in 1..=3 {
        issue_quote(&manager, &id, 60 - i64::from(expected)).await;
        manager.decline_quote().await.expect("decline");
        assert_eq!(manager.current_request().expect("state").decline_count, expected);
    }
}

#[tokio::test]
async fn decline_outside_quote_received_fails_without_mutation() {
    let manager = manager();

    let error = manager.decline_quote().await.expect_err("nothing to decline");
    assert!(matches!(error, ApplicationError::Domain(DomainError::NoActiveRequest { .. })));

    create_flat_tyre(&manager).await;
    let before = manager.current_request().expect("state");
    let error = manager.decline_quote().await.expect_err("no quote yet");
    assert!(matches!(
        error,
        ApplicationError::Domain(ref domain) if domain.is_invalid_transition()
    ));
    assert_eq!(manager.current_request(), Some(before));
    assert_eq!(manager.backend().calls().len(), 1, "only the submit reached the backend");
}

#[tokio::test]
async fn accept_without_quote_fails_loudly() {
    let manager = manager();
    assert!(manager.accept_quote().await.is_err());

    create_flat_tyre(&manager).await;
    let error = manager.accept_quote().await.expect_err("no quote outstanding");
    assert!(matches!(error, ApplicationError::Domain(DomainError::FlowTransition(_))));
    assert_eq!(manager.current_request().expect("state").status, RequestStatus::RequestAccepted);
}

#[tokio::test]
async fn cancel_notifies_once_then_clears() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 50).await;

    let log: Log = Arc::default();
    record(&manager, "first", &log);
    record(&manager, "second", &log);

    manager.cancel_request().await.expect("cancel");

    let seen = entries(&log);
    assert_eq!(seen.len(), 2);
    for (_, state) in &seen {
        assert_eq!(state.status, RequestStatus::Cancelled);
        assert!(state.current_quote.is_none());
    }
    assert!(manager.current_request().is_none());
    assert_eq!(manager.backend().calls().last(), Some(&BackendCall::Cancel(id)));
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let manager = manager();
    create_flat_tyre(&manager).await;
    let log: Log = Arc::default();
    record(&manager, "view", &log);

    manager.cancel_request().await.expect("first cancel");
    manager.cancel_request().await.expect("second cancel is a no-op");

    assert_eq!(entries(&log).len(), 1);
    assert!(manager.current_request().is_none());
    let cancels = manager
        .backend()
        .calls()
        .into_iter()
        .filter(|call| matches!(call, BackendCall::Cancel(_)))
        .count();
    assert_eq!(cancels, 1);
}

#[tokio::test]
async fn subscribers_receive_identical_snapshots_in_subscription_order() {
    let manager = manager();
    let log: Log = Arc::default();
    record(&manager, "a", &log);
    record(&manager, "b", &log);
    record(&manager, "c", &log);

    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 50).await;

    let seen = entries(&log);
    let labels: Vec<&str> = seen.iter().map(|(label, _)| *label).collect();
    assert_eq!(labels, vec!["a", "b", "c", "a", "b", "c"]);
    assert!(seen[..3].iter().all(|(_, state)| *state == seen[0].1));
    assert!(seen[3..].iter().all(|(_, state)| *state == seen[3].1));
    assert_eq!(seen[0].1.status, RequestStatus::RequestAccepted);
    assert_eq!(seen[3].1.status, RequestStatus::QuoteReceived);
}

#[tokio::test]
async fn unsubscribed_callback_is_not_invoked() {
    let manager = manager();
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let subscription = manager.subscribe(move |state: &ServiceRequestState| {
        sink.lock().expect("log lock").push(("gone", state.clone()));
    });

    assert!(subscription.unsubscribe());
    create_flat_tyre(&manager).await;

    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn backend_failure_leaves_state_unchanged_and_manager_usable() {
    let manager = manager();
    let log: Log = Arc::default();
    record(&manager, "view", &log);

    manager.backend().fail_next(BackendError::Unavailable("offline".to_string()));
    let error = manager
        .create_request(ServiceType::TowTruck, Location::new(3.0, 4.0), "engine dead")
        .await
        .expect_err("backend down");
    assert!(matches!(error, ApplicationError::Backend(BackendError::Unavailable(_))));
    assert!(manager.current_request().is_none());
    assert!(entries(&log).is_empty());

    let id = manager
        .create_request(ServiceType::TowTruck, Location::new(3.0, 4.0), "engine dead")
        .await
        .expect("retry succeeds");
    issue_quote(&manager, &id, 120).await;

    manager.backend().fail_next(BackendError::Rejected("quote expired".to_string()));
    assert!(manager.accept_quote().await.is_err());
    let state = manager.current_request().expect("state");
    assert_eq!(state.status, RequestStatus::QuoteReceived);
    assert!(state.current_quote.is_some());

    manager.backend().fail_next(BackendError::Unavailable("offline".to_string()));
    assert!(manager.cancel_request().await.is_err());
    assert_eq!(manager.current_request().expect("still active").id, id);
}

#[tokio::test]
async fn slow_backend_times_out_as_backend_failure() {
    let backend = InMemoryRequestBackend::default();
    backend.set_delay(Some(Duration::from_millis(200)));
    let manager = ServiceRequestManager::with_settings(
        backend,
        ManagerSettings { ack_timeout: Duration::from_millis(20) },
    );

    let error = manager
        .create_request(ServiceType::Emergency, Location::new(0.0, 0.0), "accident")
        .await
        .expect_err("timeout");

    assert!(matches!(error, ApplicationError::Backend(BackendError::Timeout(_))));
    assert!(manager.current_request().is_none());
}

#[tokio::test]
async fn completion_clears_slot_and_allows_new_request() {
    let manager = manager();
    let id = create_flat_tyre(&manager).await;
    manager
        .apply_update(
            &id,
            RequestUpdate::EmployeeAssigned {
                employee: AssignedEmployee {
                    name: "Alex".to_string(),
                    location: Some(Location::new(1.1, 1.1)),
                },
            },
        )
        .await
        .expect("assign");
    issue_quote(&manager, &id, 50).await;
    manager.accept_quote().await.expect("accept");
    manager.apply_update(&id, RequestUpdate::WorkStarted).await.expect("start");

    let completed =
        manager.apply_update(&id, RequestUpdate::WorkCompleted).await.expect("complete");
    assert_eq!(completed.status, RequestStatus::Completed);
    assert!(completed.current_quote.is_none());
    assert_eq!(completed.assigned_employee.map(|employee| employee.name), Some("Alex".to_string()));
    assert!(manager.current_request().is_none());

    let next = manager
        .create_request(ServiceType::OutOfFuel, Location::new(5.0, 5.0), "empty tank")
        .await
        .expect("slot released");
    let state = manager.current_request().expect("state");
    assert_eq!(state.id, next);
    assert_eq!(state.decline_count, 0);
    assert!(!state.has_received_revision);
}

#[tokio::test]
async fn update_for_other_request_is_rejected() {
    let manager = manager();
    create_flat_tyre(&manager).await;

    let error = manager
        .apply_update(&ServiceRequestId("stale".to_string()), RequestUpdate::WorkStarted)
        .await
        .expect_err("unknown request");

    assert!(matches!(error, ApplicationError::Domain(DomainError::UnknownRequest { .. })));
    assert_eq!(manager.current_request().expect("state").status, RequestStatus::RequestAccepted);
}

#[tokio::test]
async fn callback_may_read_current_request_during_fan_out() {
    let manager = Arc::new(manager());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let reader = Arc::clone(&manager);
    let sink = Arc::clone(&observed);
    let _subscription = manager.subscribe(move |state: &ServiceRequestState| {
        let current = reader.current_request().map(|current| current.status);
        sink.lock().expect("lock").push((state.status, current));
    });

    create_flat_tyre(&manager).await;
    manager.cancel_request().await.expect("cancel");

    assert_eq!(
        *observed.lock().expect("lock"),
        vec![
            (RequestStatus::RequestAccepted, Some(RequestStatus::RequestAccepted)),
            (RequestStatus::Cancelled, Some(RequestStatus::Cancelled)),
        ]
    );
    assert!(manager.current_request().is_none());
}

#[tokio::test]
async fn audit_sink_records_applied_rejected_and_failed() {
    let sink = InMemoryAuditSink::default();
    let manager = manager().with_audit_sink(Arc::new(sink.clone()));
    let id = create_flat_tyre(&manager).await;

    let _ = manager.accept_quote().await;
    issue_quote(&manager, &id, 50).await;
    manager.backend().fail_next(BackendError::Unavailable("offline".to_string()));
    let _ = manager.decline_quote().await;

    let events = sink.events();
    let kinds: Vec<(&str, AuditOutcome)> =
        events.iter().map(|event| (event.event_type.as_str(), event.outcome)).collect();
    assert_eq!(
        kinds,
        vec![
            ("request.created", AuditOutcome::Success),
            ("flow.transition_rejected", AuditOutcome::Rejected),
            ("flow.transition_applied", AuditOutcome::Success),
            ("dispatch.failed", AuditOutcome::Failed),
        ]
    );
    assert!(events.iter().all(|event| event.request_id.as_ref() == Some(&id)));
}

#[tokio::test]
async fn readers_keep_previous_snapshot_while_accept_is_in_flight() {
    let backend = InMemoryRequestBackend::default();
    let manager = Arc::new(ServiceRequestManager::new(backend.clone()));
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 90).await;
    backend.set_delay(Some(Duration::from_millis(150)));

    let accepting = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.accept_quote().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let during = manager.current_request().expect("state while in flight");
    assert_eq!(during.status, RequestStatus::QuoteReceived);
    assert!(during.current_quote.is_some());

    accepting.await.expect("join").expect("accept");
    assert_eq!(manager.current_request().expect("state").status, RequestStatus::QuoteAccepted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_creates_admit_exactly_one_request() {
    let backend = InMemoryRequestBackend::default();
    backend.set_delay(Some(Duration::from_millis(40)));
    let manager = Arc::new(ServiceRequestManager::new(backend.clone()));

    let spawn_create = |service_type: ServiceType| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager.create_request(service_type, Location::new(0.0, 0.0), "stranded").await
        })
    };
    let (first, second) =
        tokio::join!(spawn_create(ServiceType::Battery), spawn_create(ServiceType::TowTruck));
    let results = [first.expect("join"), second.expect("join")];

    let created: Vec<&ServiceRequestId> =
        results.iter().filter_map(|result| result.as_ref().ok()).collect();
    assert_eq!(created.len(), 1);
    let duplicate = results.iter().find_map(|result| result.as_ref().err()).expect("one rejected");
    assert!(matches!(
        duplicate,
        ApplicationError::Domain(DomainError::DuplicateRequest { existing, .. })
            if existing == created[0]
    ));

    let submits =
        backend.calls().into_iter().filter(|call| matches!(call, BackendCall::Submit(_))).count();
    assert_eq!(submits, 1);
    assert_eq!(manager.current_request().map(|state| state.id).as_ref(), Some(created[0]));
}

#[tokio::test]
async fn queued_operations_notify_in_arrival_order() {
    let backend = InMemoryRequestBackend::default();
    let manager = Arc::new(ServiceRequestManager::new(backend.clone()));
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 75).await;

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    record(&manager, "view", &log);
    backend.set_delay(Some(Duration::from_millis(60)));

    let accepting = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.accept_quote().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let cancelling = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.cancel_request().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Queued behind the cancel, so it finds the slot already released.
    let late_update = manager
        .apply_update(
            &id,
            RequestUpdate::EmployeeAssigned {
                employee: AssignedEmployee { name: "Jo".to_string(), location: None },
            },
        )
        .await;

    accepting.await.expect("join").expect("accept");
    cancelling.await.expect("join").expect("cancel");
    assert!(matches!(
        late_update,
        Err(ApplicationError::Domain(DomainError::NoActiveRequest { .. }))
    ));

    let statuses: Vec<RequestStatus> =
        entries(&log).into_iter().map(|(_, state)| state.status).collect();
    assert_eq!(statuses, vec![RequestStatus::QuoteAccepted, RequestStatus::Cancelled]);
    assert!(manager.current_request().is_none());
}

#[tokio::test]
async fn update_queued_before_cancel_is_applied_first() {
    let backend = InMemoryRequestBackend::default();
    let manager = Arc::new(ServiceRequestManager::new(backend.clone()));
    let id = create_flat_tyre(&manager).await;
    issue_quote(&manager, &id, 75).await;

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    record(&manager, "view", &log);
    backend.set_delay(Some(Duration::from_millis(60)));

    let accepting = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.accept_quote().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let assigning = tokio::spawn({
        let manager = Arc::clone(&manager);
        let id = id.clone();
        async move {
            let employee = AssignedEmployee { name: "Jo".to_string(), location: None };
            manager.apply_update(&id, RequestUpdate::EmployeeAssigned { employee }).await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    manager.cancel_request().await.expect("cancel");
    accepting.await.expect("join").expect("accept");
    assigning.await.expect("join").expect("assign");

    let seen: Vec<(RequestStatus, Option<String>)> = entries(&log)
        .into_iter()
        .map(|(_, state)| (state.status, state.assigned_employee.map(|employee| employee.name)))
        .collect();
    assert_eq!(
        seen,
        vec![
            (RequestStatus::QuoteAccepted, None),
            (RequestStatus::QuoteAccepted, Some("Jo".to_string())),
            (RequestStatus::Cancelled, Some("Jo".to_string())),
        ]
    );
}
