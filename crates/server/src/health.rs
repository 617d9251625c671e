use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use roadside_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub employee_count: Option<i64>,
    pub open_requests: Option<i64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, counts) = match table_counts(&state.db_pool).await {
        Ok(counts) => (
            HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
            Some(counts),
        ),
        Err(error) => (
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") },
            None,
        ),
    };
    let ready = counts.is_some();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        employee_count: counts.map(|(employees, _)| employees),
        open_requests: counts.map(|(_, open)| open),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn table_counts(pool: &DbPool) -> Result<(i64, i64), sqlx::Error> {
    let employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employee").fetch_one(pool).await?;
    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM service_request WHERE status NOT IN ('completed', 'cancelled')",
    )
    .fetch_one(pool)
    .await?;
    Ok((employees, open))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use roadside_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_with_counts_when_schema_is_present() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.employee_count, Some(0));
        assert_eq!(payload.open_requests, Some(0));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_closed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert!(payload.employee_count.is_none());
    }
}
