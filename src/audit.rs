//! Audit trail of outbound bureau calls.
//!
//! Every bureau call produces exactly one [`ApiCallLog`], and every record is
//! offered to the sink. Writing it is best effort: failures are reported
//! through `tracing` and never reach the caller.

use async_trait::async_trait;
use failsafe::CircuitBreaker;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::circuit_breaker::{create_audit_circuit_breaker, AuditCircuitBreaker};
use crate::errors::{AppError, ResultExt};
use crate::models::ApiCallLog;

/// Durable, append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: ApiCallLog) -> Result<(), AppError>;
}

/// Stores audit records in the `api_call_logs` table.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: ApiCallLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_call_logs (
                user_id, bureau_name, endpoint, masked_request,
                response_status, response_time_ms, error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.bureau_name.as_str())
        .bind(&entry.endpoint)
        .bind(&entry.masked_request)
        .bind(i32::from(entry.response_status))
        .bind(i64::try_from(entry.response_time_ms).unwrap_or(i64::MAX))
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to append API call log")?;

        Ok(())
    }
}

/// Keeps audit records in process memory.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<ApiCallLog>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, oldest first.
    pub async fn entries(&self) -> Vec<ApiCallLog> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: ApiCallLog) -> Result<(), AppError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Upper bound on a single audit write.
const AUDIT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort writer placed in front of an [`AuditSink`].
///
/// Every record is offered to the sink. The breaker only tracks sink health:
/// while it is open, repeated failures are logged at debug level instead of
/// flooding the log with one warning per bureau call.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    breaker: AuditCircuitBreaker,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            breaker: create_audit_circuit_breaker(),
        }
    }

    /// Appends `entry`, swallowing any failure.
    pub async fn record(&self, entry: ApiCallLog) {
        let bureau = entry.bureau_name;
        let endpoint = entry.endpoint.clone();

        let outcome = match timeout(AUDIT_WRITE_TIMEOUT, self.sink.append(entry)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::InternalError(format!(
                "audit write exceeded {:?}",
                AUDIT_WRITE_TIMEOUT
            ))),
        };

        match outcome {
            Ok(()) => {
                // Lets a half-open breaker close again.
                let _ = self.breaker.call(|| Ok::<(), ()>(()));
                tracing::debug!("Audit log stored for {} {}", bureau, endpoint);
            }
            Err(e) => match self.breaker.call(|| Err::<(), AppError>(e)) {
                Err(failsafe::Error::Inner(e)) => {
                    tracing::warn!(
                        "Failed to store audit log for {} {}: {}",
                        bureau,
                        endpoint,
                        e
                    );
                }
                _ => {
                    tracing::debug!(
                        "Audit sink still failing, lost audit log for {} {}",
                        bureau,
                        endpoint
                    );
                }
            },
        }
    }
}
