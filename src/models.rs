use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::bureaus::Bureau;
use crate::masking::document_digits;

// ============ Subscription ============

/// Subscription level gating which bureaus are queried.
///
/// Tiers are ordered: every tier can do everything the tiers below it can.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Basic,
    Premium,
}

impl SubscriptionTier {
    /// Bureaus queried for this tier, in call order.
    pub fn bureaus(self) -> &'static [Bureau] {
        match self {
            SubscriptionTier::Free => &[Bureau::Serasa],
            SubscriptionTier::Basic => &[Bureau::Serasa, Bureau::BoaVista],
            SubscriptionTier::Premium => &[Bureau::Serasa, Bureau::BoaVista, Bureau::Quod],
        }
    }

    pub fn includes(self, bureau: Bureau) -> bool {
        self.bureaus().contains(&bureau)
    }

    /// Bank offers come from the Quod bureau and are a premium feature.
    pub fn includes_bank_offers(self) -> bool {
        self == SubscriptionTier::Premium
    }

    /// Premium unlocks the embedded BI dashboard.
    pub fn includes_embedded_reports(self) -> bool {
        self == SubscriptionTier::Premium
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(SubscriptionTier::Free),
            "basic" => Ok(SubscriptionTier::Basic),
            "premium" => Ok(SubscriptionTier::Premium),
            other => Err(format!("Unknown subscription tier: {}", other)),
        }
    }
}

/// A purchasable plan as shown on the subscription page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub id: SubscriptionTier,
    pub name: &'static str,
    pub price: f64,
    pub monthly_queries: Option<u32>,
    pub accessible_apis: Vec<Bureau>,
    pub features: Vec<&'static str>,
}

/// Catalogue of plans, cheapest first.
pub fn subscription_plans() -> Vec<SubscriptionPlan> {
    vec![
        SubscriptionPlan {
            id: SubscriptionTier::Free,
            name: "Gratuito",
            price: 0.0,
            monthly_queries: Some(5),
            accessible_apis: SubscriptionTier::Free.bureaus().to_vec(),
            features: vec!["Até 5 consultas", "Acesso ao Serasa"],
        },
        SubscriptionPlan {
            id: SubscriptionTier::Basic,
            name: "Básico",
            price: 99.90,
            monthly_queries: Some(50),
            accessible_apis: SubscriptionTier::Basic.bureaus().to_vec(),
            features: vec![
                "Até 50 consultas por mês",
                "Acesso a Serasa e Boa Vista",
                "Relatórios básicos",
            ],
        },
        SubscriptionPlan {
            id: SubscriptionTier::Premium,
            name: "Premium",
            price: 199.90,
            monthly_queries: None,
            accessible_apis: SubscriptionTier::Premium.bureaus().to_vec(),
            features: vec![
                "Consultas ilimitadas",
                "Acesso a Serasa, Boa Vista e Quod",
                "Ofertas bancárias",
                "Relatórios avançados com Power BI",
            ],
        },
    ]
}

// ============ Analysis input/output ============

/// Client and vehicle data entered by the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub client_name: String,
    /// CPF, punctuated or bare digits.
    pub cpf: String,
    pub car_model: String,
    pub car_value: f64,
}

impl ClientRequest {
    /// Input validation performed at the HTTP boundary.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_name.trim().is_empty() {
            return Err("clientName is required".to_string());
        }
        if self.car_model.trim().is_empty() {
            return Err("carModel is required".to_string());
        }
        if document_digits(&self.cpf).len() != 11 {
            return Err("cpf must contain 11 digits".to_string());
        }
        if !self.car_value.is_finite() || self.car_value <= 0.0 {
            return Err("carValue must be a positive number".to_string());
        }
        Ok(())
    }
}

/// Quoted monthly interest rate from one lender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRate {
    pub provider: String,
    pub rate: f64,
}

/// Loan term in months. Only 12, 24, 36, 48 and 60 exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct LoanTerm(u32);

impl LoanTerm {
    pub const ALL: [LoanTerm; 5] = [
        LoanTerm(12),
        LoanTerm(24),
        LoanTerm(36),
        LoanTerm(48),
        LoanTerm(60),
    ];

    pub fn months(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for LoanTerm {
    type Error = String;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        match months {
            12 | 24 | 36 | 48 | 60 => Ok(LoanTerm(months)),
            other => Err(format!("Unsupported loan term: {} months", other)),
        }
    }
}

impl From<LoanTerm> for u32 {
    fn from(term: LoanTerm) -> Self {
        term.0
    }
}

/// A financing offer returned by the bank-offers operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankOffer {
    pub bank_name: String,
    pub interest_rate: f64,
    pub monthly_payment: f64,
    #[serde(rename = "term")]
    pub term_months: LoanTerm,
    pub approval_chance: u8,
}

/// Terminal result of one credit analysis run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAnalysisResult {
    pub client_name: String,
    pub cpf: String,
    pub car_model: String,
    pub car_value: f64,
    pub serasa_score: u16,
    pub boa_vista_score: Option<u16>,
    pub quod_score: Option<u16>,
    pub interest_rates: Vec<InterestRate>,
    pub bank_offers: Vec<BankOffer>,
    pub credit_limit: f64,
    pub approved: bool,
    pub analysis_date: DateTime<Utc>,
}

impl CreditAnalysisResult {
    /// Scores that contributed to this analysis, in bureau order.
    pub fn scores(&self) -> Vec<u16> {
        std::iter::once(self.serasa_score)
            .chain(self.boa_vista_score)
            .chain(self.quod_score)
            .collect()
    }
}

/// A persisted analysis together with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: Uuid,
    pub user_id: String,
    #[serde(flatten)]
    pub analysis: CreditAnalysisResult,
    pub created_at: DateTime<Utc>,
}

// ============ Audit ============

/// Append-only record of one outbound bureau call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallLog {
    pub user_id: String,
    pub bureau_name: Bureau,
    pub endpoint: String,
    /// Request fields with the document masked. Never the ciphertext.
    pub masked_request: serde_json::Value,
    pub response_status: u16,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============ Dashboard ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBucket {
    pub range: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyApprovalRate {
    /// `YYYY-MM`
    pub month: String,
    /// Percentage of approved analyses in the month.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarModelCount {
    pub model: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_analyses: usize,
    pub credit_score_distribution: Vec<ScoreBucket>,
    pub approval_rate_by_month: Vec<MonthlyApprovalRate>,
    pub top_car_models: Vec<CarModelCount>,
    pub average_interest_rates: Vec<InterestRate>,
}
