use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;
use roadside_core::audit::{AuditSink, InMemoryAuditSink};
use roadside_core::config::{AppConfig, LoadOptions};
use roadside_core::domain::employee::{EmployeeFilter, EmployeeRole};
use roadside_core::domain::service_request::{
    AssignedEmployee, DisplayStatus, Location, Quote, RequestStatus, ServiceRequestId, ServiceType,
};
use roadside_core::flows::RequestUpdate;
use roadside_core::manager::{ManagerSettings, ServiceRequestManager};
use roadside_db::repositories::{
    AuditEventRepository, EmployeeRepository, RepositoryBackend, ServiceRequestRepository,
    SqlAuditEventRepository, SqlEmployeeRepository, SqlServiceRequestRepository,
};
use roadside_db::{connect_with_config, migrations, DbPool, EmployeeRosterSeed};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

const DB_CHECKS: &[&str] =
    &["migration_visibility", "employee_roster", "request_lifecycle", "audit_persistence"];

type Backend = Arc<RepositoryBackend<SqlServiceRequestRepository>>;

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.extend(DB_CHECKS.iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(DB_CHECKS.iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    let pool = match runtime.block_on(connect_with_config(&config.database)) {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed_since(db_started),
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_since(db_started),
                message: format!("failed to connect: {error}"),
            });
            checks.extend(DB_CHECKS.iter().copied().map(skipped));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let settings = ManagerSettings::from(&config.dispatch);
    runtime.block_on(async {
        run_database_checks(&pool, settings, &mut checks).await;
        pool.close().await;
    });

    finalize_report(checks, elapsed_since(started))
}

async fn run_database_checks(
    pool: &DbPool,
    settings: ManagerSettings,
    checks: &mut Vec<SmokeCheck>,
) {
    let remaining = &DB_CHECKS[1..];

    let step = Instant::now();
    if let Err(error) = migrations::run_pending(pool).await {
        let message = format!("migration execution failed: {error}");
        checks.push(fail("migration_visibility", step, message));
        checks.extend(remaining.iter().copied().map(skipped));
        return;
    }
    checks.push(pass("migration_visibility", step, "migrations are visible and executable"));

    let step = Instant::now();
    let technician = match seed_roster(pool).await {
        Ok(technician) => {
            let message = format!("roster verified; quoting as {technician}");
            checks.push(pass("employee_roster", step, message));
            technician
        }
        Err(message) => {
            checks.push(fail("employee_roster", step, message));
            checks.extend(remaining[1..].iter().copied().map(skipped));
            return;
        }
    };

    let step = Instant::now();
    let sink = InMemoryAuditSink::default();
    let request_id = match exercise_lifecycle(pool, settings, &sink, &technician).await {
        Ok(request_id) => {
            checks.push(pass(
                "request_lifecycle",
                step,
                format!("request {request_id} completed after one declined quote"),
            ));
            request_id
        }
        Err(message) => {
            checks.push(fail("request_lifecycle", step, message));
            checks.push(skipped("audit_persistence"));
            return;
        }
    };

    let step = Instant::now();
    match persist_audit_trail(pool, &sink, &request_id).await {
        Ok(count) => {
            checks.push(pass("audit_persistence", step, format!("{count} audit events stored")));
        }
        Err(message) => checks.push(fail("audit_persistence", step, message)),
    }
}

async fn seed_roster(pool: &DbPool) -> Result<String, String> {
    EmployeeRosterSeed::load(pool).await.map_err(|error| format!("seed failed: {error}"))?;
    let verification =
        EmployeeRosterSeed::verify(pool).await.map_err(|error| format!("verify failed: {error}"))?;
    if !verification.all_present {
        return Err("seeded roster is incomplete".to_string());
    }

    let technicians = SqlEmployeeRepository::new(pool.clone())
        .list(&EmployeeFilter { search: None, role: Some(EmployeeRole::Technician) })
        .await
        .map_err(|error| format!("roster query failed: {error}"))?;
    technicians
        .into_iter()
        .find(|employee| employee.active)
        .map(|employee| employee.name)
        .ok_or_else(|| "no active technician in roster".to_string())
}

/// Create, decline a first quote, accept the revision, then run the job to completion.
async fn exercise_lifecycle(
    pool: &DbPool,
    settings: ManagerSettings,
    sink: &InMemoryAuditSink,
    technician: &str,
) -> Result<ServiceRequestId, String> {
    let backend: Backend =
        Arc::new(RepositoryBackend::new(SqlServiceRequestRepository::new(pool.clone())));
    let audit: Arc<dyn AuditSink> = Arc::new(sink.clone());
    let manager =
        ServiceRequestManager::with_settings(Arc::clone(&backend), settings).with_audit_sink(audit);

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    let _subscription = manager.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let id = manager
        .create_request(
            ServiceType::TowTruck,
            Location::new(51.5072, -0.1276),
            "smoke: clutch failure",
        )
        .await
        .map_err(|error| format!("create failed: {error}"))?;

    let first = Quote::new(Decimal::new(18000, 2), technician);
    push_update(&backend, &manager, &id, RequestUpdate::QuoteIssued { quote: first }).await?;
    manager.decline_quote().await.map_err(|error| format!("decline failed: {error}"))?;
    expect_display(&manager, DisplayStatus::Declined)?;

    let revised = Quote::new(Decimal::new(15000, 2), technician);
    push_update(&backend, &manager, &id, RequestUpdate::QuoteIssued { quote: revised }).await?;
    manager.accept_quote().await.map_err(|error| format!("accept failed: {error}"))?;
    expect_display(&manager, DisplayStatus::Accepted)?;

    let assignee = AssignedEmployee { name: technician.to_string(), location: None };
    let assigned = RequestUpdate::EmployeeAssigned { employee: assignee };
    push_update(&backend, &manager, &id, assigned).await?;
    push_update(&backend, &manager, &id, RequestUpdate::WorkStarted).await?;
    push_update(&backend, &manager, &id, RequestUpdate::WorkCompleted).await?;

    if manager.current_request().is_some() {
        return Err("completed request should release the slot".to_string());
    }

    let stored = backend
        .repository()
        .find_by_id(&id)
        .await
        .map_err(|error| format!("reload failed: {error}"))?
        .ok_or_else(|| format!("request {id} was not persisted"))?;
    if stored.status != RequestStatus::Completed || stored.decline_count != 1 {
        return Err(format!(
            "persisted record is {} with {} declines",
            stored.status.as_str(),
            stored.decline_count
        ));
    }

    let seen = notifications.load(Ordering::SeqCst);
    if seen != 8 {
        return Err(format!("expected 8 subscriber notifications, saw {seen}"));
    }

    Ok(id)
}

/// Dispatcher side: persist the change, then push it to the client manager.
async fn push_update(
    backend: &Backend,
    manager: &ServiceRequestManager<Backend>,
    id: &ServiceRequestId,
    update: RequestUpdate,
) -> Result<(), String> {
    backend
        .record_update(id, update.clone())
        .await
        .map_err(|error| format!("backend refused update: {error}"))?;
    manager.apply_update(id, update).await.map_err(|error| format!("update failed: {error}"))?;
    Ok(())
}

fn expect_display(
    manager: &ServiceRequestManager<Backend>,
    expected: DisplayStatus,
) -> Result<(), String> {
    let actual = manager.current_request().map(|state| state.display_status());
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(format!("expected display status {expected:?}, found {actual:?}"))
    }
}

async fn persist_audit_trail(
    pool: &DbPool,
    sink: &InMemoryAuditSink,
    request_id: &ServiceRequestId,
) -> Result<usize, String> {
    let repository = SqlAuditEventRepository::new(pool.clone());
    let events = sink.events();
    let expected =
        events.iter().filter(|event| event.request_id.as_ref() == Some(request_id)).count();

    for event in events {
        repository.append(event).await.map_err(|error| format!("audit append failed: {error}"))?;
    }

    let stored = repository
        .list_for_request(request_id)
        .await
        .map_err(|error| format!("audit reload failed: {error}"))?;
    if stored.len() != expected {
        return Err(format!("stored {} audit events, expected {expected}", stored.len()));
    }
    Ok(stored.len())
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn pass(name: &'static str, started: Instant, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Pass,
        elapsed_ms: elapsed_since(started),
        message: message.into(),
    }
}

fn fail(name: &'static str, started: Instant, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Fail,
        elapsed_ms: elapsed_since(started),
        message: message.into(),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
