//! Owner of the single active service request for a client session.
//!
//! Every operation is serialized behind an async gate. Customer actions are
//! validated against the flow, dispatched to the backend, and only committed
//! once the backend acknowledges them; while a call is in flight readers keep
//! seeing the previous snapshot. Subscribers are notified synchronously, in
//! subscription order, before the gate is released.

pub mod binding;
pub mod observer;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::backend::{BackendError, RequestBackend};
use crate::config::DispatchConfig;
use crate::domain::service_request::{
    Location, ServiceRequestId, ServiceRequestState, ServiceType,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{FlowEngine, RequestEvent, RequestUpdate, RoadsideFlow, TransitionOutcome};

pub use binding::RequestBinding;
pub use observer::{Subscription, SubscriptionId};

use observer::Observers;

const AUDIT_ACTOR: &str = "request-manager";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSettings {
    pub ack_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self { ack_timeout: Duration::from_secs(15) }
    }
}

impl From<&DispatchConfig> for ManagerSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self { ack_timeout: Duration::from_secs(config.ack_timeout_secs) }
    }
}

pub struct ServiceRequestManager<B> {
    backend: B,
    engine: FlowEngine<RoadsideFlow>,
    settings: ManagerSettings,
    gate: AsyncMutex<()>,
    current: Mutex<Option<ServiceRequestState>>,
    observers: Observers<ServiceRequestState>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<B> ServiceRequestManager<B>
where
    B: RequestBackend,
{
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, ManagerSettings::default())
    }

    pub fn with_settings(backend: B, settings: ManagerSettings) -> Self {
        Self {
            backend,
            engine: FlowEngine::default(),
            settings,
            gate: AsyncMutex::new(()),
            current: Mutex::new(None),
            observers: Observers::default(),
            audit: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Latest committed snapshot. Never blocks on an in-flight operation.
    pub fn current_request(&self) -> Option<ServiceRequestState> {
        lock(&self.current).clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<ServiceRequestState>
    where
        F: Fn(&ServiceRequestState) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    pub async fn create_request(
        &self,
        service_type: ServiceType,
        location: Location,
        message: impl Into<String>,
    ) -> Result<ServiceRequestId, ApplicationError> {
        let _gate = self.gate.lock().await;

        if let Some(existing) = self.current_request() {
            if !existing.status.is_terminal() {
                return Err(DomainError::DuplicateRequest {
                    existing: existing.id,
                    status: existing.status,
                }
                .into());
            }
        }

        let request = ServiceRequestState::new(service_type, location, message);
        self.dispatch("submit_request", &request.id, self.backend.submit_request(&request))
            .await?;

        let id = request.id.clone();
        info!(
            event_name = "request.created",
            request_id = %id,
            service_type = request.service_type.as_str(),
            "service request created"
        );
        self.emit_audit(
            audit_context(&id)
                .event("request.created", AuditCategory::Dispatch, AuditOutcome::Success)
                .with_metadata("service_type", request.service_type.as_str()),
        );
        self.commit(request, false);
        Ok(id)
    }

    pub async fn accept_quote(&self) -> Result<(), ApplicationError> {
        let _gate = self.gate.lock().await;

        let current = self.require_current("accept quote")?;
        let outcome = self.plan(&current, RequestEvent::QuoteAccepted)?;
        let quote = current.current_quote.clone().ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "request {} has no quote to accept",
                current.id
            ))
        })?;

        self.dispatch("accept_quote", &current.id, self.backend.accept_quote(&current.id, &quote))
            .await?;
        self.finish(&current, &outcome)
    }

    pub async fn decline_quote(&self) -> Result<(), ApplicationError> {
        let _gate = self.gate.lock().await;

        let current = self.require_current("decline quote")?;
        let outcome = self.plan(&current, RequestEvent::QuoteDeclined)?;
        let quote = current.current_quote.clone().ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "request {} has no quote to decline",
                current.id
            ))
        })?;

        self.dispatch(
            "decline_quote",
            &current.id,
            self.backend.decline_quote(&current.id, &quote),
        )
        .await?;
        self.finish(&current, &outcome)
    }

    /// Cancels the active request. With no active request this is a no-op.
    pub async fn cancel_request(&self) -> Result<(), ApplicationError> {
        let _gate = self.gate.lock().await;

        let Some(current) = self.current_request() else {
            debug!(event_name = "request.cancel_noop", "no active request to cancel");
            return Ok(());
        };
        let outcome = self.plan(&current, RequestEvent::CancelRequested)?;

        self.dispatch("cancel_request", &current.id, self.backend.cancel_request(&current.id))
            .await?;
        self.finish(&current, &outcome)
    }

    /// Applies a change pushed by the backend (quote issued, assignment, progress).
    pub async fn apply_update(
        &self,
        request_id: &ServiceRequestId,
        update: RequestUpdate,
    ) -> Result<ServiceRequestState, ApplicationError> {
        let _gate = self.gate.lock().await;

        let current = self.require_current("apply update")?;
        if &current.id != request_id {
            warn!(
                event_name = "request.update_ignored",
                request_id = %request_id,
                active_request_id = %current.id,
                "update does not match the active request"
            );
            return Err(DomainError::UnknownRequest { received: request_id.clone() }.into());
        }

        let outcome = self.plan(&current, update.into())?;
        let next = current.apply(&outcome)?;
        self.record_transition(&outcome, &current.id);
        self.commit(next.clone(), outcome.releases_slot());
        Ok(next)
    }

    fn require_current(
        &self,
        operation: &'static str,
    ) -> Result<ServiceRequestState, ApplicationError> {
        self.current_request().ok_or(DomainError::NoActiveRequest { operation }.into())
    }

    fn plan(
        &self,
        current: &ServiceRequestState,
        event: RequestEvent,
    ) -> Result<TransitionOutcome, ApplicationError> {
        match self.engine.apply(&current.status, &event) {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                debug!(
                    event_name = "request.transition_rejected",
                    request_id = %current.id,
                    status = current.status.as_str(),
                    event = event.name(),
                    "transition rejected"
                );
                self.emit_audit(
                    audit_context(&current.id)
                        .event(
                            "flow.transition_rejected",
                            AuditCategory::Flow,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("event", event.name())
                        .with_metadata("error", error.to_string()),
                );
                Err(DomainError::from(error).into())
            }
        }
    }

    fn finish(
        &self,
        current: &ServiceRequestState,
        outcome: &TransitionOutcome,
    ) -> Result<(), ApplicationError> {
        let next = current.apply(outcome)?;
        self.record_transition(outcome, &current.id);
        self.commit(next, outcome.releases_slot());
        Ok(())
    }

    async fn dispatch<F>(
        &self,
        operation: &'static str,
        request_id: &ServiceRequestId,
        call: F,
    ) -> Result<(), ApplicationError>
    where
        F: std::future::Future<Output = Result<(), BackendError>>,
    {
        let timeout = self.settings.ack_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        };

        if let Err(error) = &result {
            warn!(
                event_name = "request.backend_failed",
                request_id = %request_id,
                operation,
                error = %error,
                "backend did not acknowledge; local state unchanged"
            );
            self.emit_audit(
                audit_context(request_id)
                    .event("dispatch.failed", AuditCategory::Dispatch, AuditOutcome::Failed)
                    .with_metadata("operation", operation)
                    .with_metadata("error", error.to_string()),
            );
        }

        result.map_err(ApplicationError::from)
    }

    fn record_transition(&self, outcome: &TransitionOutcome, request_id: &ServiceRequestId) {
        info!(
            event_name = "request.transition_applied",
            request_id = %request_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            event = outcome.event.name(),
            "request transition applied"
        );
        self.emit_audit(
            audit_context(request_id)
                .event("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("event", outcome.event.name()),
        );
    }

    fn commit(&self, next: ServiceRequestState, release_slot: bool) {
        *lock(&self.current) = Some(next.clone());
        self.observers.notify(&next);
        if release_slot {
            *lock(&self.current) = None;
            debug!(
                event_name = "request.slot_released",
                request_id = %next.id,
                "request slot released"
            );
        }
    }

    fn emit_audit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.emit(event);
        }
    }
}

fn audit_context(request_id: &ServiceRequestId) -> AuditContext {
    AuditContext::new(Some(request_id.clone()), correlation_id(), AUDIT_ACTOR)
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests;
