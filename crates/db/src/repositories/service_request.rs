use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::debug;

use roadside_core::backend::{BackendError, RequestBackend};
use roadside_core::domain::service_request::{
    AssignedEmployee, Location, Quote, RequestStatus, ServiceRequestId, ServiceRequestState,
    ServiceType,
};
use roadside_core::flows::{FlowEngine, RequestEvent, RequestUpdate, RoadsideFlow};

use super::{RepositoryError, ServiceRequestRepository};
use crate::DbPool;

pub struct SqlServiceRequestRepository {
    pool: DbPool,
}

impl SqlServiceRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decode_json<T>(raw: Option<String>, column: &str) -> Result<Option<T>, RepositoryError>
where
    T: serde::de::DeserializeOwned,
{
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Decode(format!("invalid {column}: {e}")))
    })
    .transpose()
}

fn encode_json<T: serde::Serialize>(
    value: Option<&T>,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    value
        .map(|inner| {
            serde_json::to_string(inner)
                .map_err(|e| RepositoryError::Decode(format!("cannot encode {column}: {e}")))
        })
        .transpose()
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ServiceRequestState, RepositoryError> {
    let id: String = decode(row, "id")?;
    let service_type_str: String = decode(row, "service_type")?;
    let status_str: String = decode(row, "status")?;
    let latitude: f64 = decode(row, "latitude")?;
    let longitude: f64 = decode(row, "longitude")?;
    let message: String = decode(row, "message")?;
    let assigned_json: Option<String> = decode(row, "assigned_employee_json")?;
    let quote_json: Option<String> = decode(row, "current_quote_json")?;
    let decline_count: i64 = decode(row, "decline_count")?;
    let has_received_revision: bool = decode(row, "has_received_revision")?;
    let created_at_str: String = decode(row, "created_at")?;
    let updated_at_str: String = decode(row, "updated_at")?;

    let service_type = service_type_str
        .parse::<ServiceType>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status = status_str
        .parse::<RequestStatus>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decline_count = u32::try_from(decline_count)
        .map_err(|_| RepositoryError::Decode(format!("invalid decline_count {decline_count}")))?;

    Ok(ServiceRequestState {
        id: ServiceRequestId(id),
        service_type,
        status,
        location: Location::new(latitude, longitude),
        message,
        assigned_employee: decode_json::<AssignedEmployee>(
            assigned_json,
            "assigned_employee_json",
        )?,
        current_quote: decode_json::<Quote>(quote_json, "current_quote_json")?,
        decline_count,
        has_received_revision,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

#[async_trait]
impl ServiceRequestRepository for SqlServiceRequestRepository {
    async fn find_by_id(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequestState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, service_type, status, latitude, longitude, message,
                    assigned_employee_json, current_quote_json, decline_count,
                    has_received_revision, created_at, updated_at
             FROM service_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: ServiceRequestState) -> Result<(), RepositoryError> {
        let assigned_json =
            encode_json(request.assigned_employee.as_ref(), "assigned_employee_json")?;
        let quote_json = encode_json(request.current_quote.as_ref(), "current_quote_json")?;

        sqlx::query(
            "INSERT INTO service_request (id, service_type, status, latitude, longitude, message,
                                          assigned_employee_json, current_quote_json,
                                          decline_count, has_received_revision,
                                          created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 assigned_employee_json = excluded.assigned_employee_json,
                 current_quote_json = excluded.current_quote_json,
                 decline_count = excluded.decline_count,
                 has_received_revision = excluded.has_received_revision,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(request.service_type.as_str())
        .bind(request.status.as_str())
        .bind(request.location.latitude)
        .bind(request.location.longitude)
        .bind(&request.message)
        .bind(&assigned_json)
        .bind(&quote_json)
        .bind(i64::from(request.decline_count))
        .bind(request.has_received_revision)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// A [`RequestBackend`] that acknowledges customer actions by persisting them.
///
/// The stored record is advanced through the same flow table the manager
/// uses, so an action the record does not permit is rejected.
pub struct RepositoryBackend<R> {
    repository: R,
    engine: FlowEngine<RoadsideFlow>,
    writes: Mutex<()>,
}

impl<R> RepositoryBackend<R>
where
    R: ServiceRequestRepository,
{
    pub fn new(repository: R) -> Self {
        Self { repository, engine: FlowEngine::default(), writes: Mutex::new(()) }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Persists a dispatcher-side change before it is pushed to the client.
    pub async fn record_update(
        &self,
        id: &ServiceRequestId,
        update: RequestUpdate,
    ) -> Result<ServiceRequestState, BackendError> {
        self.advance(id, update.into(), None).await
    }

    async fn load(&self, id: &ServiceRequestId) -> Result<ServiceRequestState, BackendError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| BackendError::Rejected(format!("unknown request {id}")))
    }

    /// Loads, checks and saves under one write lock; `quote` must match the stored offer.
    async fn advance(
        &self,
        id: &ServiceRequestId,
        event: RequestEvent,
        quote: Option<&Quote>,
    ) -> Result<ServiceRequestState, BackendError> {
        let _write = self.writes.lock().await;
        let stored = self.load(id).await?;
        if let Some(quote) = quote {
            if stored.current_quote.as_ref() != Some(quote) {
                return Err(BackendError::Rejected(format!(
                    "quote for request {id} is no longer current"
                )));
            }
        }
        let outcome = self
            .engine
            .apply(&stored.status, &event)
            .map_err(|error| BackendError::Rejected(error.to_string()))?;
        let next =
            stored.apply(&outcome).map_err(|error| BackendError::Rejected(error.to_string()))?;

        self.repository.save(next.clone()).await.map_err(unavailable)?;
        debug!(
            event_name = "backend.request_persisted",
            request_id = %id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            "request record advanced"
        );
        Ok(next)
    }
}

fn unavailable(error: RepositoryError) -> BackendError {
    BackendError::Unavailable(error.to_string())
}

#[async_trait]
impl<R> RequestBackend for RepositoryBackend<R>
where
    R: ServiceRequestRepository,
{
    async fn submit_request(&self, request: &ServiceRequestState) -> Result<(), BackendError> {
        self.repository.save(request.clone()).await.map_err(unavailable)
    }

    async fn accept_quote(&self, id: &ServiceRequestId, quote: &Quote) -> Result<(), BackendError> {
        self.advance(id, RequestEvent::QuoteAccepted, Some(quote)).await.map(|_| ())
    }

    async fn decline_quote(
        &self,
        id: &ServiceRequestId,
        quote: &Quote,
    ) -> Result<(), BackendError> {
        self.advance(id, RequestEvent::QuoteDeclined, Some(quote)).await.map(|_| ())
    }

    async fn cancel_request(&self, id: &ServiceRequestId) -> Result<(), BackendError> {
        self.advance(id, RequestEvent::CancelRequested, None).await.map(|_| ())
    }
}
