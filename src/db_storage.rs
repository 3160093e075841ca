use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{BankOffer, CreditAnalysisResult, InterestRate, StoredAnalysis};

/// Durable storage for completed credit analyses, keyed by user.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Stores a finished analysis and returns it as persisted, with the
    /// id and creation time assigned by the store.
    async fn save_analysis(
        &self,
        user_id: &str,
        analysis: &CreditAnalysisResult,
    ) -> Result<StoredAnalysis, AppError>;

    /// All analyses owned by `user_id`, newest first.
    async fn list_analyses(&self, user_id: &str) -> Result<Vec<StoredAnalysis>, AppError>;
}

/// Postgres-backed repository over the `credit_analyses` table.
pub struct PgAnalysisRepository {
    pool: PgPool,
}

impl PgAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AnalysisRow {
    id: Uuid,
    user_id: String,
    client_name: String,
    cpf: String,
    car_model: String,
    car_value: f64,
    serasa_score: i32,
    boa_vista_score: Option<i32>,
    quod_score: Option<i32>,
    interest_rates: Json<Vec<InterestRate>>,
    bank_offers: Json<Vec<BankOffer>>,
    credit_limit: f64,
    approved: bool,
    analysis_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

fn score_from_db(value: i32, column: &str) -> Result<u16, AppError> {
    u16::try_from(value)
        .map_err(|_| AppError::InternalError(format!("Stored {} {} out of range", column, value)))
}

impl TryFrom<AnalysisRow> for StoredAnalysis {
    type Error = AppError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(StoredAnalysis {
            id: row.id,
            user_id: row.user_id,
            analysis: CreditAnalysisResult {
                client_name: row.client_name,
                cpf: row.cpf,
                car_model: row.car_model,
                car_value: row.car_value,
                serasa_score: score_from_db(row.serasa_score, "serasa_score")?,
                boa_vista_score: row
                    .boa_vista_score
                    .map(|s| score_from_db(s, "boa_vista_score"))
                    .transpose()?,
                quod_score: row
                    .quod_score
                    .map(|s| score_from_db(s, "quod_score"))
                    .transpose()?,
                interest_rates: row.interest_rates.0,
                bank_offers: row.bank_offers.0,
                credit_limit: row.credit_limit,
                approved: row.approved,
                analysis_date: row.analysis_date,
            },
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AnalysisRepository for PgAnalysisRepository {
    async fn save_analysis(
        &self,
        user_id: &str,
        analysis: &CreditAnalysisResult,
    ) -> Result<StoredAnalysis, AppError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            INSERT INTO credit_analyses (
                id, user_id, client_name, cpf, car_model, car_value,
                serasa_score, boa_vista_score, quod_score,
                interest_rates, bank_offers, credit_limit, approved, analysis_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING
                id, user_id, client_name, cpf, car_model, car_value,
                serasa_score, boa_vista_score, quod_score,
                interest_rates, bank_offers, credit_limit, approved,
                analysis_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&analysis.client_name)
        .bind(&analysis.cpf)
        .bind(&analysis.car_model)
        .bind(analysis.car_value)
        .bind(i32::from(analysis.serasa_score))
        .bind(analysis.boa_vista_score.map(i32::from))
        .bind(analysis.quod_score.map(i32::from))
        .bind(Json(&analysis.interest_rates))
        .bind(Json(&analysis.bank_offers))
        .bind(analysis.credit_limit)
        .bind(analysis.approved)
        .bind(analysis.analysis_date)
        .fetch_one(&self.pool)
        .await
        .context("Failed to store credit analysis")?;

        let stored = StoredAnalysis::try_from(row)?;
        tracing::info!("Stored credit analysis {} for user {}", stored.id, user_id);
        Ok(stored)
    }

    async fn list_analyses(&self, user_id: &str) -> Result<Vec<StoredAnalysis>, AppError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT
                id, user_id, client_name, cpf, car_model, car_value,
                serasa_score, boa_vista_score, quod_score,
                interest_rates, bank_offers, credit_limit, approved,
                analysis_date, created_at
            FROM credit_analyses
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load analyses for user {}", user_id))?;

        rows.into_iter().map(StoredAnalysis::try_from).collect()
    }
}

/// In-process repository for tests and database-less runs.
#[derive(Default, Clone)]
pub struct MemoryAnalysisRepository {
    analyses: Arc<Mutex<Vec<StoredAnalysis>>>,
}

impl MemoryAnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored analyses across all users.
    pub async fn len(&self) -> usize {
        self.analyses.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.analyses.lock().await.is_empty()
    }
}

#[async_trait]
impl AnalysisRepository for MemoryAnalysisRepository {
    async fn save_analysis(
        &self,
        user_id: &str,
        analysis: &CreditAnalysisResult,
    ) -> Result<StoredAnalysis, AppError> {
        let stored = StoredAnalysis {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            analysis: analysis.clone(),
            created_at: Utc::now(),
        };
        self.analyses.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_analyses(&self, user_id: &str) -> Result<Vec<StoredAnalysis>, AppError> {
        let analyses = self.analyses.lock().await;
        // Appended in creation order; newest first means reverse.
        Ok(analyses
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}
