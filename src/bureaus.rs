//! Clients for the three credit bureaus.
//!
//! Every operation follows the same contract, implemented once in
//! [`BureauTransport::execute`]:
//!
//! 1. encrypt the identity document,
//! 2. POST it to the bureau endpoint with the bureau's auth header and timeout,
//! 3. write exactly one audit entry (masked document, status, latency, error),
//! 4. return the interpreted payload or a [`BureauError::QueryFailed`].
//!
//! No operation retries.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditLogger;
use crate::config::BureauSettings;
use crate::crypto::{encrypt, EncryptedPayload, TransmissionKey};
use crate::errors::{AppError, BureauError};
use crate::masking::mask_document;
use crate::models::{ApiCallLog, BankOffer};
use crate::simulation;

pub const MAX_SCORE: u16 = 1000;

/// The modeled bureaus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bureau {
    Serasa,
    BoaVista,
    Quod,
}

impl Bureau {
    pub fn as_str(self) -> &'static str {
        match self {
            Bureau::Serasa => "serasa",
            Bureau::BoaVista => "boavista",
            Bureau::Quod => "quod",
        }
    }

    /// Header name and value carrying the bureau API key.
    pub fn auth_header(self, api_key: &str) -> (&'static str, String) {
        match self {
            Bureau::Serasa => ("Authorization", format!("Bearer {}", api_key)),
            Bureau::BoaVista => ("X-API-Key", api_key.to_string()),
            Bureau::Quod => ("Authorization", format!("ApiKey {}", api_key)),
        }
    }

    /// Request body skeleton holding the encrypted document.
    fn document_body(self, payload: &EncryptedPayload) -> Map<String, Value> {
        let mut body = Map::new();
        match self {
            Bureau::BoaVista => {
                body.insert("document".to_string(), json!(payload.encrypted_data));
                body.insert("iv".to_string(), json!(payload.iv));
                body.insert("documentType".to_string(), json!("CPF"));
            }
            Bureau::Serasa | Bureau::Quod => {
                body.insert("cpf".to_string(), json!(payload.encrypted_data));
                body.insert("iv".to_string(), json!(payload.iv));
            }
        }
        body
    }
}

impl fmt::Display for Bureau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bureau::Serasa => "Serasa",
            Bureau::BoaVista => "Boa Vista",
            Bureau::Quod => "Quod",
        };
        f.write_str(name)
    }
}

/// How a successful bureau response body is turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Deserialize the bureau's JSON body.
    Live,
    /// Ignore the body and synthesize a randomized payload.
    #[default]
    Simulated,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(ResponseMode::Live),
            "simulated" => Ok(ResponseMode::Simulated),
            other => Err(format!(
                "Unknown bureau response mode '{}' (expected live or simulated)",
                other
            )),
        }
    }
}

// ============ Payloads ============

/// Invariants checked on every payload parsed from a live response.
pub trait BureauPayload {
    fn validate(&self) -> Result<(), String>;
}

fn check_score(score: u16) -> Result<(), String> {
    if score > MAX_SCORE {
        return Err(format!("score {} outside 0..={}", score, MAX_SCORE));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentHistory {
    Good,
    Regular,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerasaScore {
    pub score: u16,
    pub status: String,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl BureauPayload for SerasaScore {
    fn validate(&self) -> Result<(), String> {
        check_score(self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerasaRestrictions {
    pub has_restrictions: bool,
    pub restriction_count: u32,
    pub total_value: f64,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl BureauPayload for SerasaRestrictions {
    fn validate(&self) -> Result<(), String> {
        if !self.total_value.is_finite() || self.total_value < 0.0 {
            return Err(format!("invalid restriction total {}", self.total_value));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoaVistaScore {
    pub score: u16,
    pub risk_level: RiskLevel,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl BureauPayload for BoaVistaScore {
    fn validate(&self) -> Result<(), String> {
        check_score(self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoaVistaCreditLimit {
    pub credit_limit: f64,
    pub suggested_installments: u32,
    pub interest_rate: f64,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl BureauPayload for BoaVistaCreditLimit {
    fn validate(&self) -> Result<(), String> {
        if !self.credit_limit.is_finite() || self.credit_limit < 0.0 {
            return Err(format!("invalid credit limit {}", self.credit_limit));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistory {
    pub payment_history: PaymentHistory,
    pub debt_level: RiskLevel,
    pub credit_utilization: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuodScore {
    pub score: u16,
    pub credit_history: CreditHistory,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

impl BureauPayload for QuodScore {
    fn validate(&self) -> Result<(), String> {
        check_score(self.score)?;
        if self.credit_history.credit_utilization > 100 {
            return Err(format!(
                "credit utilization {} above 100",
                self.credit_history.credit_utilization
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankOffersResponse {
    pub offers: Vec<BankOffer>,
    pub best_offer: usize,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

/// Quod always quotes between two and four lenders.
const BANK_OFFER_COUNT: std::ops::RangeInclusive<usize> = 2..=4;

impl BureauPayload for BankOffersResponse {
    fn validate(&self) -> Result<(), String> {
        if !BANK_OFFER_COUNT.contains(&self.offers.len()) {
            return Err(format!(
                "expected 2 to 4 bank offers, got {}",
                self.offers.len()
            ));
        }
        if self.best_offer >= self.offers.len() {
            return Err(format!(
                "best offer index {} out of {} offers",
                self.best_offer,
                self.offers.len()
            ));
        }
        if let Some(offer) = self.offers.iter().find(|o| o.approval_chance > 100) {
            return Err(format!(
                "approval chance {} above 100 for {}",
                offer.approval_chance, offer.bank_name
            ));
        }
        Ok(())
    }
}

fn parse_payload<T>(body: &[u8]) -> Result<T, String>
where
    T: DeserializeOwned + BureauPayload,
{
    let payload: T =
        serde_json::from_slice(body).map_err(|e| format!("invalid response body: {}", e))?;
    payload.validate()?;
    Ok(payload)
}

// ============ Transport ============

/// Dependencies shared by all bureau clients.
#[derive(Clone)]
pub struct BureauContext {
    pub key: Arc<TransmissionKey>,
    pub audit: AuditLogger,
    pub mode: ResponseMode,
}

/// One outbound bureau operation.
struct BureauCall<'a> {
    operation: &'static str,
    endpoint: &'static str,
    document: &'a str,
    /// Extra request fields, sent in the body and recorded in the audit log.
    fields: Map<String, Value>,
}

/// Encrypted POST + audit + error wrapping for one bureau.
#[derive(Clone)]
pub struct BureauTransport {
    bureau: Bureau,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    context: BureauContext,
}

impl BureauTransport {
    pub fn new(
        bureau: Bureau,
        settings: &BureauSettings,
        context: BureauContext,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create {} client: {}", bureau, e))
            })?;

        Ok(Self {
            bureau,
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            context,
        })
    }

    pub fn bureau(&self) -> Bureau {
        self.bureau
    }

    pub fn mode(&self) -> ResponseMode {
        self.context.mode
    }

    async fn execute<T, F>(
        &self,
        user_id: &str,
        call: BureauCall<'_>,
        interpret: F,
    ) -> Result<T, BureauError>
    where
        F: FnOnce(&[u8]) -> Result<T, String>,
    {
        let encrypted = encrypt(call.document, &self.context.key);

        let mut body = self.bureau.document_body(&encrypted);
        body.extend(call.fields.clone());

        let url = format!("{}{}", self.base_url, call.endpoint);
        let (header_name, header_value) = self.bureau.auth_header(&self.api_key);

        tracing::info!("Querying {} {}", self.bureau, call.endpoint);
        let started = Instant::now();

        let outcome = match self
            .client
            .post(&url)
            .header(header_name, header_value)
            .json(&Value::Object(body))
            .send()
            .await
        {
            Err(e) => Err((e.status().map(|s| s.as_u16()).unwrap_or(500), e.to_string())),
            Ok(response) if !response.status().is_success() => {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err((
                    status.as_u16(),
                    format!(
                        "{} returned status {}: {}",
                        self.bureau,
                        status,
                        truncate(&error_text, 200)
                    ),
                ))
            }
            Ok(response) => {
                let status = response.status().as_u16();
                match response.bytes().await {
                    Ok(bytes) => interpret(&bytes)
                        .map(|payload| (status, payload))
                        .map_err(|e| (status, e)),
                    Err(e) => Err((status, format!("failed to read response body: {}", e))),
                }
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (response_status, error) = match &outcome {
            Ok((status, _)) => (*status, None),
            Err((status, message)) => (*status, Some(message.clone())),
        };

        let mut masked_request = Map::new();
        masked_request.insert("cpf".to_string(), json!(mask_document(call.document)));
        masked_request.extend(call.fields);

        self.context
            .audit
            .record(ApiCallLog {
                user_id: user_id.to_string(),
                bureau_name: self.bureau,
                endpoint: call.endpoint.to_string(),
                masked_request: Value::Object(masked_request),
                response_status,
                response_time_ms: elapsed_ms,
                error,
                created_at: Utc::now(),
            })
            .await;

        match outcome {
            Ok((_, payload)) => {
                tracing::info!(
                    "{} {} answered in {}ms",
                    self.bureau,
                    call.endpoint,
                    elapsed_ms
                );
                Ok(payload)
            }
            Err((status, message)) => {
                tracing::error!(
                    "{} {} failed with status {}: {}",
                    self.bureau,
                    call.endpoint,
                    status,
                    message
                );
                Err(BureauError::QueryFailed {
                    bureau: self.bureau,
                    operation: call.operation,
                    message,
                })
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============ Clients ============

/// Serasa-equivalent bureau: score and restrictions.
#[derive(Clone)]
pub struct SerasaClient {
    transport: BureauTransport,
}

impl SerasaClient {
    pub fn new(settings: &BureauSettings, context: BureauContext) -> Result<Self, AppError> {
        Ok(Self {
            transport: BureauTransport::new(Bureau::Serasa, settings, context)?,
        })
    }

    pub async fn get_score(&self, user_id: &str, cpf: &str) -> Result<SerasaScore, BureauError> {
        let mode = self.transport.mode();
        let call = BureauCall {
            operation: "score",
            endpoint: "/score",
            document: cpf,
            fields: Map::new(),
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => Ok(simulation::serasa_score(&mut rand::thread_rng())),
            })
            .await
    }

    pub async fn get_restrictions(
        &self,
        user_id: &str,
        cpf: &str,
    ) -> Result<SerasaRestrictions, BureauError> {
        let mode = self.transport.mode();
        let call = BureauCall {
            operation: "restrictions",
            endpoint: "/restrictions",
            document: cpf,
            fields: Map::new(),
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => {
                    Ok(simulation::serasa_restrictions(&mut rand::thread_rng()))
                }
            })
            .await
    }
}

/// BoaVista-equivalent bureau: score and credit limit.
#[derive(Clone)]
pub struct BoaVistaClient {
    transport: BureauTransport,
}

impl BoaVistaClient {
    pub fn new(settings: &BureauSettings, context: BureauContext) -> Result<Self, AppError> {
        Ok(Self {
            transport: BureauTransport::new(Bureau::BoaVista, settings, context)?,
        })
    }

    pub async fn get_score(
        &self,
        user_id: &str,
        cpf: &str,
    ) -> Result<BoaVistaScore, BureauError> {
        let mode = self.transport.mode();
        let call = BureauCall {
            operation: "score",
            endpoint: "/credit-score",
            document: cpf,
            fields: Map::new(),
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => {
                    Ok(simulation::boa_vista_score(&mut rand::thread_rng()))
                }
            })
            .await
    }

    /// `income` defaults to zero when the seller did not provide it.
    pub async fn get_credit_limit(
        &self,
        user_id: &str,
        cpf: &str,
        income: Option<f64>,
    ) -> Result<BoaVistaCreditLimit, BureauError> {
        let mode = self.transport.mode();
        let mut fields = Map::new();
        fields.insert("income".to_string(), json!(income.unwrap_or(0.0)));
        let call = BureauCall {
            operation: "credit limit",
            endpoint: "/credit-limit",
            document: cpf,
            fields,
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => {
                    Ok(simulation::boa_vista_credit_limit(&mut rand::thread_rng()))
                }
            })
            .await
    }
}

/// Quod-equivalent bureau: full credit analysis score and bank offers.
#[derive(Clone)]
pub struct QuodClient {
    transport: BureauTransport,
}

impl QuodClient {
    pub fn new(settings: &BureauSettings, context: BureauContext) -> Result<Self, AppError> {
        Ok(Self {
            transport: BureauTransport::new(Bureau::Quod, settings, context)?,
        })
    }

    pub async fn get_score(&self, user_id: &str, cpf: &str) -> Result<QuodScore, BureauError> {
        let mode = self.transport.mode();
        let mut fields = Map::new();
        fields.insert("analysisType".to_string(), json!("complete"));
        let call = BureauCall {
            operation: "score",
            endpoint: "/credit-analysis",
            document: cpf,
            fields,
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => Ok(simulation::quod_score(&mut rand::thread_rng())),
            })
            .await
    }

    pub async fn get_bank_offers(
        &self,
        user_id: &str,
        cpf: &str,
        credit_score: f64,
        loan_amount: f64,
    ) -> Result<BankOffersResponse, BureauError> {
        let mode = self.transport.mode();
        let mut fields = Map::new();
        fields.insert("creditScore".to_string(), json!(credit_score));
        fields.insert("loanAmount".to_string(), json!(loan_amount));
        let call = BureauCall {
            operation: "bank offers",
            endpoint: "/bank-offers",
            document: cpf,
            fields,
        };

        self.transport
            .execute(user_id, call, move |body| match mode {
                ResponseMode::Live => parse_payload(body),
                ResponseMode::Simulated => Ok(simulation::bank_offers(
                    &mut rand::thread_rng(),
                    loan_amount,
                )),
            })
            .await
    }
}
