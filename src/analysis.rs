//! Credit analysis workflow.
//!
//! The subscription tier decides which bureaus are queried. Bureaus run one
//! after another, and the first failure aborts the run: nothing is persisted
//! and no partial result is returned.

use chrono::Utc;
use moka::future::Cache;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLogger;
use crate::bureaus::{BoaVistaClient, Bureau, BureauContext, QuodClient, SerasaClient};
use crate::config::Config;
use crate::crypto::TransmissionKey;
use crate::db_storage::AnalysisRepository;
use crate::errors::{AnalysisError, AppError};
use crate::masking::{document_digits, mask_document};
use crate::models::{
    ClientRequest, CreditAnalysisResult, InterestRate, StoredAnalysis, SubscriptionTier,
};

/// Scores above this average are approved.
pub const APPROVAL_THRESHOLD: f64 = 600.0;

/// Multiplier applied to the score-weighted car value.
pub const CREDIT_LIMIT_FACTOR: f64 = 1.5;

const RATE_PROVIDERS: [&str; 3] = ["Banco A", "Banco B", "Banco C"];

/// Arithmetic mean over the scores actually collected.
pub fn average_score(scores: &[u16]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f64 = scores.iter().map(|&s| f64::from(s)).sum();
    total / scores.len() as f64
}

pub fn credit_limit(average_score: f64, car_value: f64) -> f64 {
    (average_score / 1000.0) * car_value * CREDIT_LIMIT_FACTOR
}

pub fn is_approved(average_score: f64) -> bool {
    average_score > APPROVAL_THRESHOLD
}

// ============ Interest rates ============

/// Source of the interest-rate comparison table.
pub trait InterestRateSource: Send + Sync {
    fn current_rates(&self) -> Vec<InterestRate>;
}

/// Three fixed lenders with uniformly random rates in `[0.8, 2.3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedRates;

impl InterestRateSource for SimulatedRates {
    fn current_rates(&self) -> Vec<InterestRate> {
        let mut rng = rand::thread_rng();
        RATE_PROVIDERS
            .iter()
            .map(|provider| InterestRate {
                provider: provider.to_string(),
                rate: rng.gen_range(0.8..2.3),
            })
            .collect()
    }
}

/// Rates from the `INTEREST_RATE_TABLE` setting.
#[derive(Debug, Clone)]
pub struct StaticRates(pub Vec<InterestRate>);

impl InterestRateSource for StaticRates {
    fn current_rates(&self) -> Vec<InterestRate> {
        self.0.clone()
    }
}

// ============ Aggregator ============

pub struct CreditAnalyzer {
    serasa: SerasaClient,
    boa_vista: BoaVistaClient,
    quod: QuodClient,
    rates: Arc<dyn InterestRateSource>,
}

impl CreditAnalyzer {
    pub fn new(
        serasa: SerasaClient,
        boa_vista: BoaVistaClient,
        quod: QuodClient,
        rates: Arc<dyn InterestRateSource>,
    ) -> Self {
        Self {
            serasa,
            boa_vista,
            quod,
            rates,
        }
    }

    /// Builds the three bureau clients and the rate source from configuration.
    pub fn from_config(config: &Config, audit: AuditLogger) -> Result<Self, AppError> {
        let key = TransmissionKey::derive(&config.encryption_secret, &config.encryption_salt)?;
        let context = BureauContext {
            key: Arc::new(key),
            audit,
            mode: config.response_mode,
        };

        let rates: Arc<dyn InterestRateSource> = match &config.interest_rate_table {
            Some(table) => Arc::new(StaticRates(table.clone())),
            None => Arc::new(SimulatedRates),
        };

        Ok(Self::new(
            SerasaClient::new(&config.serasa, context.clone())?,
            BoaVistaClient::new(&config.boa_vista, context.clone())?,
            QuodClient::new(&config.quod, context)?,
            rates,
        ))
    }

    /// Runs the tier-gated bureau sequence and combines the scores.
    pub async fn perform_credit_analysis(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
        request: &ClientRequest,
    ) -> Result<CreditAnalysisResult, AnalysisError> {
        let masked_cpf = mask_document(&request.cpf);
        tracing::info!(
            "Starting {} credit analysis for {} (user {})",
            tier,
            masked_cpf,
            user_id
        );

        let serasa_score = self.serasa.get_score(user_id, &request.cpf).await?.score;
        let mut scores = vec![serasa_score];

        let boa_vista_score = if tier.includes(Bureau::BoaVista) {
            let score = self.boa_vista.get_score(user_id, &request.cpf).await?.score;
            scores.push(score);
            Some(score)
        } else {
            None
        };

        let quod_score = if tier.includes(Bureau::Quod) {
            let score = self.quod.get_score(user_id, &request.cpf).await?.score;
            scores.push(score);
            Some(score)
        } else {
            None
        };

        let average = average_score(&scores);

        let bank_offers = if tier.includes_bank_offers() {
            self.quod
                .get_bank_offers(user_id, &request.cpf, average, request.car_value)
                .await?
                .offers
        } else {
            Vec::new()
        };

        let result = CreditAnalysisResult {
            client_name: request.client_name.clone(),
            cpf: request.cpf.clone(),
            car_model: request.car_model.clone(),
            car_value: request.car_value,
            serasa_score,
            boa_vista_score,
            quod_score,
            interest_rates: self.rates.current_rates(),
            bank_offers,
            credit_limit: credit_limit(average, request.car_value),
            approved: is_approved(average),
            analysis_date: Utc::now(),
        };

        tracing::info!(
            "Credit analysis for {} finished: {} scores, average {:.1}, approved={}",
            masked_cpf,
            scores.len(),
            average,
            result.approved
        );

        Ok(result)
    }
}

// ============ Service ============

/// Window in which a repeated submission is reported as a duplicate.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(300);

/// Remembers recent submissions by fingerprint.
#[derive(Clone)]
pub struct SubmissionTracker {
    /// Fingerprint -> unix timestamp of the last submission.
    recent: Cache<String, i64>,
}

impl SubmissionTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            recent: Cache::builder()
                .time_to_live(window)
                .max_capacity(10_000)
                .build(),
        }
    }

    /// Records a submission. Returns the seconds since the same submission
    /// was last seen, if it was seen inside the window.
    pub async fn note(&self, user_id: &str, request: &ClientRequest) -> Option<i64> {
        let key = submission_fingerprint(user_id, request);
        let now = Utc::now().timestamp();
        let previous = self.recent.get(&key).await;
        self.recent.insert(key, now).await;
        previous.map(|seen| now - seen)
    }
}

/// Runs analyses and persists the successful ones.
pub struct CreditAnalysisService {
    analyzer: CreditAnalyzer,
    repository: Arc<dyn AnalysisRepository>,
    submissions: SubmissionTracker,
}

impl CreditAnalysisService {
    pub fn new(analyzer: CreditAnalyzer, repository: Arc<dyn AnalysisRepository>) -> Self {
        Self {
            analyzer,
            repository,
            submissions: SubmissionTracker::new(DUPLICATE_WINDOW),
        }
    }

    pub fn analyzer(&self) -> &CreditAnalyzer {
        &self.analyzer
    }

    /// Analyzes `request` and stores the result.
    ///
    /// A failed analysis stores nothing. Duplicate submissions are only
    /// reported; every submission still reaches the bureaus.
    pub async fn analyze_and_store(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
        request: &ClientRequest,
    ) -> Result<StoredAnalysis, AppError> {
        if let Some(elapsed) = self.submissions.note(user_id, request).await {
            tracing::warn!(
                "Duplicate credit analysis for {} by user {} ({} seconds after the previous one); bureaus will be charged again",
                mask_document(&request.cpf),
                user_id,
                elapsed
            );
        }

        let analysis = self
            .analyzer
            .perform_credit_analysis(user_id, tier, request)
            .await?;

        self.repository.save_analysis(user_id, &analysis).await
    }
}

/// SHA-256 over user, CPF digits and car value.
pub fn submission_fingerprint(user_id: &str, request: &ClientRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0]);
    hasher.update(document_digits(&request.cpf).as_bytes());
    hasher.update([0]);
    hasher.update(request.car_value.to_bits().to_be_bytes());
    hex::encode(hasher.finalize())
}
