//! Randomized bureau payloads used when `BUREAU_RESPONSE_MODE=simulated`.
//!
//! The outbound call, audit entry and error handling still happen for real;
//! only the response body is replaced.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::bureaus::{
    BankOffersResponse, BoaVistaCreditLimit, BoaVistaScore, CreditHistory, PaymentHistory,
    QuodScore, RiskLevel, SerasaRestrictions, SerasaScore,
};
use crate::models::{BankOffer, LoanTerm};

const RISK_LEVELS: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

fn score<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.gen_range(0..1000)
}

fn risk_level<R: Rng + ?Sized>(rng: &mut R) -> RiskLevel {
    *RISK_LEVELS.choose(rng).unwrap_or(&RiskLevel::Medium)
}

pub fn serasa_score<R: Rng + ?Sized>(rng: &mut R) -> SerasaScore {
    SerasaScore {
        score: score(rng),
        status: "approved".to_string(),
        last_update: Utc::now(),
    }
}

pub fn serasa_restrictions<R: Rng + ?Sized>(rng: &mut R) -> SerasaRestrictions {
    let total_value = if rng.gen_bool(0.3) {
        f64::from(rng.gen_range(1000u32..6000))
    } else {
        0.0
    };

    SerasaRestrictions {
        has_restrictions: rng.gen_bool(0.3),
        restriction_count: rng.gen_range(0..3),
        total_value,
        last_update: Utc::now(),
    }
}

pub fn boa_vista_score<R: Rng + ?Sized>(rng: &mut R) -> BoaVistaScore {
    BoaVistaScore {
        score: score(rng),
        risk_level: risk_level(rng),
        last_update: Utc::now(),
    }
}

pub fn boa_vista_credit_limit<R: Rng + ?Sized>(rng: &mut R) -> BoaVistaCreditLimit {
    BoaVistaCreditLimit {
        credit_limit: f64::from(rng.gen_range(10_000u32..60_000)),
        suggested_installments: rng.gen_range(12..60),
        interest_rate: 0.8 + rng.gen::<f64>() * 1.5,
        last_update: Utc::now(),
    }
}

pub fn quod_score<R: Rng + ?Sized>(rng: &mut R) -> QuodScore {
    let payment_history = if rng.gen_bool(0.3) {
        PaymentHistory::Good
    } else {
        PaymentHistory::Regular
    };

    QuodScore {
        score: score(rng),
        credit_history: CreditHistory {
            payment_history,
            debt_level: risk_level(rng),
            credit_utilization: rng.gen_range(0..100),
        },
        last_update: Utc::now(),
    }
}

/// Two to four offers from "Banco A", "Banco B", ...
pub fn bank_offers<R: Rng + ?Sized>(rng: &mut R, loan_amount: f64) -> BankOffersResponse {
    let count = rng.gen_range(2..=4usize);

    let offers = (0..count)
        .map(|i| BankOffer {
            bank_name: format!("Banco {}", char::from(b'A' + i as u8)),
            interest_rate: 0.8 + rng.gen::<f64>() * 1.5,
            monthly_payment: loan_amount * (0.02 + rng.gen::<f64>() * 0.05),
            term_months: *LoanTerm::ALL.choose(rng).unwrap_or(&LoanTerm::ALL[2]),
            approval_chance: rng.gen_range(0..100),
        })
        .collect();

    BankOffersResponse {
        offers,
        best_offer: rng.gen_range(0..count),
        last_update: Utc::now(),
    }
}
