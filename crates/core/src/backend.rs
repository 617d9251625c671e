//! The backend collaborator that receives customer actions.
//!
//! The manager only commits a local transition once the backend has
//! acknowledged the corresponding call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::service_request::{Quote, ServiceRequestId, ServiceRequestState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected the action: {0}")]
    Rejected(String),
    #[error("backend did not acknowledge within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait RequestBackend: Send + Sync {
    async fn submit_request(&self, request: &ServiceRequestState) -> Result<(), BackendError>;
    async fn accept_quote(&self, id: &ServiceRequestId, quote: &Quote) -> Result<(), BackendError>;
    async fn decline_quote(&self, id: &ServiceRequestId, quote: &Quote)
        -> Result<(), BackendError>;
    async fn cancel_request(&self, id: &ServiceRequestId) -> Result<(), BackendError>;
}

#[async_trait]
impl<B> RequestBackend for Arc<B>
where
    B: RequestBackend + ?Sized,
{
    async fn submit_request(&self, request: &ServiceRequestState) -> Result<(), BackendError> {
        (**self).submit_request(request).await
    }

    async fn accept_quote(&self, id: &ServiceRequestId, quote: &Quote) -> Result<(), BackendError> {
        (**self).accept_quote(id, quote).await
    }

    async fn decline_quote(
        &self,
        id: &ServiceRequestId,
        quote: &Quote,
    ) -> Result<(), BackendError> {
        (**self).decline_quote(id, quote).await
    }

    async fn cancel_request(&self, id: &ServiceRequestId) -> Result<(), BackendError> {
        (**self).cancel_request(id).await
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Submit(ServiceRequestState),
    AcceptQuote(ServiceRequestId, Quote),
    DeclineQuote(ServiceRequestId, Quote),
    Cancel(ServiceRequestId),
}

#[derive(Debug, Default)]
struct RecorderState {
    calls: Vec<BackendCall>,
    fail_next: Option<BackendError>,
    delay: Option<Duration>,
}

/// Acknowledges everything it receives and keeps a log of calls.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestBackend {
    state: Arc<Mutex<RecorderState>>,
}

impl InMemoryRequestBackend {
    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// The next call fails with `error` and is not recorded.
    pub fn fail_next(&self, error: BackendError) {
        self.with_state(|state| state.fail_next = Some(error));
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.with_state(|state| state.delay = delay);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RecorderState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    async fn record(&self, call: BackendCall) -> Result<(), BackendError> {
        if let Some(delay) = self.with_state(|state| state.delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|state| match state.fail_next.take() {
            Some(error) => Err(error),
            None => {
                state.calls.push(call);
                Ok(())
            }
        })
    }
}

#[async_trait]
impl RequestBackend for InMemoryRequestBackend {
    async fn submit_request(&self, request: &ServiceRequestState) -> Result<(), BackendError> {
        self.record(BackendCall::Submit(request.clone())).await
    }

    async fn accept_quote(&self, id: &ServiceRequestId, quote: &Quote) -> Result<(), BackendError> {
        self.record(BackendCall::AcceptQuote(id.clone(), quote.clone())).await
    }

    async fn decline_quote(
        &self,
        id: &ServiceRequestId,
        quote: &Quote,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::DeclineQuote(id.clone(), quote.clone())).await
    }

    async fn cancel_request(&self, id: &ServiceRequestId) -> Result<(), BackendError> {
        self.record(BackendCall::Cancel(id.clone())).await
    }
}
