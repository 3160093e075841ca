use std::collections::{BTreeMap, HashMap};

use crate::analysis::{average_score, is_approved};
use crate::models::{
    CarModelCount, DashboardData, InterestRate, MonthlyApprovalRate, ScoreBucket, StoredAnalysis,
};

const TOP_CAR_MODELS: usize = 5;

/// Score ranges shown on the distribution chart, as `(label, inclusive upper bound)`.
const SCORE_BUCKETS: [(&str, f64); 5] = [
    ("0-300", 300.0),
    ("301-500", 500.0),
    ("501-700", 700.0),
    ("701-900", 900.0),
    ("901-1000", f64::INFINITY),
];

fn bucket_index(average: f64) -> usize {
    SCORE_BUCKETS
        .iter()
        .position(|(_, upper)| average <= *upper)
        .unwrap_or(SCORE_BUCKETS.len() - 1)
}

/// Aggregates a user's stored analyses into the dashboard charts.
pub fn build_dashboard(analyses: &[StoredAnalysis]) -> DashboardData {
    let mut bucket_counts = [0usize; SCORE_BUCKETS.len()];
    // month -> (approved, total)
    let mut months: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut models: HashMap<&str, usize> = HashMap::new();
    // provider -> (sum, count)
    let mut rates: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

    for stored in analyses {
        let analysis = &stored.analysis;
        let average = average_score(&analysis.scores());
        bucket_counts[bucket_index(average)] += 1;

        let month = analysis.analysis_date.format("%Y-%m").to_string();
        let entry = months.entry(month).or_insert((0, 0));
        if is_approved(average) {
            entry.0 += 1;
        }
        entry.1 += 1;

        *models.entry(analysis.car_model.trim()).or_insert(0) += 1;

        for rate in &analysis.interest_rates {
            let entry = rates.entry(rate.provider.as_str()).or_insert((0.0, 0));
            entry.0 += rate.rate;
            entry.1 += 1;
        }
    }

    let mut top_car_models: Vec<CarModelCount> = models
        .into_iter()
        .map(|(model, count)| CarModelCount {
            model: model.to_string(),
            count,
        })
        .collect();
    top_car_models.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.model.cmp(&b.model)));
    top_car_models.truncate(TOP_CAR_MODELS);

    DashboardData {
        total_analyses: analyses.len(),
        credit_score_distribution: SCORE_BUCKETS
            .iter()
            .zip(bucket_counts)
            .map(|(&(range, _), count)| ScoreBucket { range, count })
            .collect(),
        approval_rate_by_month: months
            .into_iter()
            .map(|(month, (approved, total))| MonthlyApprovalRate {
                month,
                rate: approved as f64 * 100.0 / total as f64,
            })
            .collect(),
        top_car_models,
        average_interest_rates: rates
            .into_iter()
            .map(|(provider, (sum, count))| InterestRate {
                provider: provider.to_string(),
                rate: sum / count as f64,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreditAnalysisResult;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn stored(model: &str, score: u16, month: u32, rate: f64) -> StoredAnalysis {
        let date = Utc.with_ymd_and_hms(2024, month, 10, 12, 0, 0).unwrap();
        StoredAnalysis {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            analysis: CreditAnalysisResult {
                client_name: "Ana".to_string(),
                cpf: "111.222.333-44".to_string(),
                car_model: model.to_string(),
                car_value: 50000.0,
                serasa_score: score,
                boa_vista_score: None,
                quod_score: None,
                interest_rates: vec![InterestRate {
                    provider: "Banco A".to_string(),
                    rate,
                }],
                bank_offers: vec![],
                credit_limit: 0.0,
                approved: f64::from(score) > 600.0,
                analysis_date: date,
            },
            created_at: date,
        }
    }

    #[test]
    fn test_empty_history() {
        let data = build_dashboard(&[]);
        assert_eq!(data.total_analyses, 0);
        assert_eq!(data.credit_score_distribution.len(), 5);
        assert!(data.credit_score_distribution.iter().all(|b| b.count == 0));
        assert!(data.approval_rate_by_month.is_empty());
        assert!(data.top_car_models.is_empty());
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(300.0), 0);
        assert_eq!(bucket_index(300.5), 1);
        assert_eq!(bucket_index(700.0), 2);
        assert_eq!(bucket_index(901.0), 4);
        assert_eq!(bucket_index(1000.0), 4);
    }

    #[test]
    fn test_aggregates_history() {
        let analyses = vec![
            stored("Civic", 800, 1, 1.0),
            stored("Civic", 400, 1, 2.0),
            stored("Corolla", 650, 2, 1.5),
        ];

        let data = build_dashboard(&analyses);

        assert_eq!(data.total_analyses, 3);
        let counts: Vec<usize> = data
            .credit_score_distribution
            .iter()
            .map(|b| b.count)
            .collect();
        assert_eq!(counts, vec![0, 1, 1, 1, 0]);

        assert_eq!(data.approval_rate_by_month.len(), 2);
        assert_eq!(data.approval_rate_by_month[0].month, "2024-01");
        assert_eq!(data.approval_rate_by_month[0].rate, 50.0);
        assert_eq!(data.approval_rate_by_month[1].rate, 100.0);

        assert_eq!(data.top_car_models[0].model, "Civic");
        assert_eq!(data.top_car_models[0].count, 2);

        assert_eq!(data.average_interest_rates.len(), 1);
        assert_eq!(data.average_interest_rates[0].rate, 1.5);
    }

    #[test]
    fn test_top_models_capped_at_five() {
        let analyses: Vec<_> = ["A", "B", "C", "D", "E", "F", "A"]
            .iter()
            .map(|m| stored(m, 500, 3, 1.0))
            .collect();

        let data = build_dashboard(&analyses);
        assert_eq!(data.top_car_models.len(), 5);
        assert_eq!(data.top_car_models[0].model, "A");
        assert_eq!(data.top_car_models[1].model, "B");
    }
}
