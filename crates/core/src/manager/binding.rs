use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::RequestBackend;
use crate::domain::service_request::{
    DisplayStatus, Location, ServiceRequestId, ServiceRequestState, ServiceType,
};
use crate::errors::ApplicationError;
use crate::manager::observer::Subscription;
use crate::manager::ServiceRequestManager;

/// A view's handle on the manager: reactive snapshot plus bound actions.
///
/// Subscribes on construction and unsubscribes when dropped. The snapshot
/// keeps the last notified state, so a cancelled or completed request stays
/// visible until a new one is created.
pub struct RequestBinding<B>
where
    B: RequestBackend,
{
    manager: Arc<ServiceRequestManager<B>>,
    subscription: Option<Subscription<ServiceRequestState>>,
    state: watch::Receiver<Option<ServiceRequestState>>,
}

impl<B> RequestBinding<B>
where
    B: RequestBackend,
{
    pub fn attach(manager: Arc<ServiceRequestManager<B>>) -> Self {
        let (sender, state) = watch::channel(None);
        let sender = Arc::new(sender);

        // Subscribe before reading the snapshot so a commit racing with attach is not lost.
        let notify = Arc::clone(&sender);
        let subscription = manager.subscribe(move |snapshot: &ServiceRequestState| {
            notify.send_replace(Some(snapshot.clone()));
        });
        seed_snapshot(&sender, manager.current_request());

        Self { manager, subscription: Some(subscription), state }
    }

    pub fn state(&self) -> Option<ServiceRequestState> {
        self.state.borrow().clone()
    }

    pub fn display_status(&self) -> Option<DisplayStatus> {
        self.state.borrow().as_ref().map(ServiceRequestState::display_status)
    }

    /// A receiver that can be awaited for the next snapshot.
    pub fn watch(&self) -> watch::Receiver<Option<ServiceRequestState>> {
        self.state.clone()
    }

    pub async fn create_request(
        &self,
        service_type: ServiceType,
        location: Location,
        message: impl Into<String>,
    ) -> Result<ServiceRequestId, ApplicationError> {
        self.manager.create_request(service_type, location, message).await
    }

    pub async fn accept_quote(&self) -> Result<(), ApplicationError> {
        self.manager.accept_quote().await
    }

    pub async fn decline_quote(&self) -> Result<(), ApplicationError> {
        self.manager.decline_quote().await
    }

    pub async fn cancel_request(&self) -> Result<(), ApplicationError> {
        self.manager.cancel_request().await
    }
}

/// Fills an empty channel; a notification that already landed is newer and wins.
fn seed_snapshot(
    sender: &watch::Sender<Option<ServiceRequestState>>,
    current: Option<ServiceRequestState>,
) {
    sender.send_if_modified(|slot| match (slot.is_none(), current) {
        (true, Some(current)) => {
            *slot = Some(current);
            true
        }
        _ => false,
    });
}

impl<B> Drop for RequestBinding<B>
where
    B: RequestBackend,
{
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
