/// Integration tests with mocked bureau and Power BI endpoints
/// Exercises the complete analysis workflow without hitting real external services
use credit_analysis_api::analysis::{
    average_score, credit_limit, CreditAnalysisService, CreditAnalyzer,
};
use credit_analysis_api::audit::{AuditLogger, MemoryAuditSink};
use credit_analysis_api::bureaus::{
    BoaVistaClient, Bureau, BureauContext, QuodClient, ResponseMode, SerasaClient,
};
use credit_analysis_api::config::{BureauSettings, Config, PowerBiConfig};
use credit_analysis_api::crypto::{decrypt, TransmissionKey};
use credit_analysis_api::db_storage::{AnalysisRepository, MemoryAnalysisRepository};
use credit_analysis_api::errors::AppError;
use credit_analysis_api::models::{ClientRequest, SubscriptionTier};
use credit_analysis_api::powerbi::PowerBiClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "integration-secret";
const SALT: &str = "integration-salt-0001";

struct Bureaus {
    serasa: MockServer,
    boa_vista: MockServer,
    quod: MockServer,
}

impl Bureaus {
    async fn start() -> Self {
        Self {
            serasa: MockServer::start().await,
            boa_vista: MockServer::start().await,
            quod: MockServer::start().await,
        }
    }
}

/// Any POST answers 200 with an empty object (enough for simulated mode).
async fn accept_all(server: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn settings(base_url: String, api_key: &str) -> BureauSettings {
    BureauSettings {
        base_url,
        api_key: api_key.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn test_config(bureaus: &Bureaus, mode: ResponseMode) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        port: 0,
        jwt_secret: "jwt-secret".to_string(),
        frontend_origin: None,
        encryption_secret: SECRET.to_string(),
        encryption_salt: SALT.to_string(),
        serasa: settings(bureaus.serasa.uri(), "serasa-key"),
        boa_vista: settings(bureaus.boa_vista.uri(), "boavista-key"),
        quod: settings(bureaus.quod.uri(), "quod-key"),
        response_mode: mode,
        interest_rate_table: None,
        powerbi: None,
    }
}

fn context(mode: ResponseMode, sink: &MemoryAuditSink) -> BureauContext {
    BureauContext {
        key: Arc::new(TransmissionKey::derive(SECRET, SALT).unwrap()),
        audit: AuditLogger::new(Arc::new(sink.clone())),
        mode,
    }
}

fn ana() -> ClientRequest {
    ClientRequest {
        client_name: "Ana".to_string(),
        cpf: "111.222.333-44".to_string(),
        car_model: "Civic".to_string(),
        car_value: 80000.0,
    }
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

// ============ Bureau clients ============

#[tokio::test]
async fn test_serasa_score_sends_encrypted_document_and_logs_once() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/score"))
        .and(header("Authorization", "Bearer serasa-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"score": 720, "status": "approved"})),
        )
        .expect(1)
        .mount(&bureaus.serasa)
        .await;

    let sink = MemoryAuditSink::new();
    let config = test_config(&bureaus, ResponseMode::Live);
    let client = SerasaClient::new(&config.serasa, context(ResponseMode::Live, &sink)).unwrap();

    let score = client.get_score("user-1", "111.222.333-44").await.unwrap();
    assert_eq!(score.score, 720);

    // The document travels encrypted and decrypts back to the original
    let bodies = request_bodies(&bureaus.serasa).await;
    let body = &bodies[0];
    let ciphertext = body["cpf"].as_str().unwrap();
    let iv = body["iv"].as_str().unwrap();
    assert_ne!(ciphertext, "111.222.333-44");
    assert_eq!(iv.len(), 32);
    let key = TransmissionKey::derive(SECRET, SALT).unwrap();
    assert_eq!(decrypt(ciphertext, iv, &key).unwrap(), "111.222.333-44");

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, "user-1");
    assert_eq!(logs[0].bureau_name, Bureau::Serasa);
    assert_eq!(logs[0].endpoint, "/score");
    assert_eq!(logs[0].masked_request["cpf"], "111.XXX.XXX-XX");
    assert_eq!(logs[0].response_status, 200);
    assert!(logs[0].error.is_none());
}

#[tokio::test]
async fn test_boa_vista_credit_limit_uses_api_key_header() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/credit-limit"))
        .and(header("X-API-Key", "boavista-key"))
        .and(body_partial_json(json!({"documentType": "CPF"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "creditLimit": 25000.0,
            "suggestedInstallments": 36,
            "interestRate": 1.4
        })))
        .mount(&bureaus.boa_vista)
        .await;

    let sink = MemoryAuditSink::new();
    let config = test_config(&bureaus, ResponseMode::Live);
    let client =
        BoaVistaClient::new(&config.boa_vista, context(ResponseMode::Live, &sink)).unwrap();

    let limit = client
        .get_credit_limit("user-1", "11122233344", None)
        .await
        .unwrap();
    assert_eq!(limit.credit_limit, 25000.0);
    assert_eq!(limit.suggested_installments, 36);

    let bodies = request_bodies(&bureaus.boa_vista).await;
    assert_eq!(bodies[0]["income"].as_f64(), Some(0.0));
    assert!(bodies[0].get("document").is_some());

    // Bare digits are still masked in the audit trail
    let logs = sink.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].masked_request["cpf"], "111.XXX.XXX-XX");
    assert_eq!(logs[0].masked_request["income"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn test_quod_bank_offers_sends_score_and_amount() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/bank-offers"))
        .and(header("Authorization", "ApiKey quod-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offers": [
                {"bankName": "Banco A", "interestRate": 1.1, "monthlyPayment": 2100.0,
                 "term": 48, "approvalChance": 80},
                {"bankName": "Banco B", "interestRate": 1.6, "monthlyPayment": 1900.0,
                 "term": 60, "approvalChance": 55}
            ],
            "bestOffer": 0
        })))
        .mount(&bureaus.quod)
        .await;

    let sink = MemoryAuditSink::new();
    let config = test_config(&bureaus, ResponseMode::Live);
    let client = QuodClient::new(&config.quod, context(ResponseMode::Live, &sink)).unwrap();

    let offers = client
        .get_bank_offers("user-1", "111.222.333-44", 650.0, 80000.0)
        .await
        .unwrap();
    assert_eq!(offers.offers.len(), 2);
    assert_eq!(offers.offers[1].term_months.months(), 60);

    let bodies = request_bodies(&bureaus.quod).await;
    assert_eq!(bodies[0]["creditScore"].as_f64(), Some(650.0));
    assert_eq!(bodies[0]["loanAmount"].as_f64(), Some(80000.0));

    let logs = sink.entries().await;
    assert_eq!(logs[0].endpoint, "/bank-offers");
    assert_eq!(logs[0].masked_request["loanAmount"].as_f64(), Some(80000.0));
}

#[tokio::test]
async fn test_non_success_status_is_logged_and_wrapped() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&bureaus.serasa)
        .await;

    let sink = MemoryAuditSink::new();
    let config = test_config(&bureaus, ResponseMode::Simulated);
    let client =
        SerasaClient::new(&config.serasa, context(ResponseMode::Simulated, &sink)).unwrap();

    let err = client
        .get_score("user-1", "111.222.333-44")
        .await
        .unwrap_err();
    assert_eq!(err.bureau(), Bureau::Serasa);
    let message = err.to_string();
    assert!(message.starts_with("Failed to query Serasa score"));
    assert!(message.contains("503"));

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].response_status, 503);
    assert!(logs[0].error.as_deref().unwrap().contains("maintenance"));
}

#[tokio::test]
async fn test_timeout_is_logged_with_status_500() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"score": 500, "status": "approved"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&bureaus.serasa)
        .await;

    let sink = MemoryAuditSink::new();
    let mut config = test_config(&bureaus, ResponseMode::Live);
    config.serasa.timeout = Duration::from_millis(100);
    let client = SerasaClient::new(&config.serasa, context(ResponseMode::Live, &sink)).unwrap();

    assert!(client.get_score("user-1", "111.222.333-44").await.is_err());

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].response_status, 500);
    assert!(logs[0].error.is_some());
}

#[tokio::test]
async fn test_invalid_live_payload_fails_after_success_status() {
    let bureaus = Bureaus::start().await;

    Mock::given(method("POST"))
        .and(path("/credit-score"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"score": 5000, "riskLevel": "low"})),
        )
        .mount(&bureaus.boa_vista)
        .await;

    let sink = MemoryAuditSink::new();
    let config = test_config(&bureaus, ResponseMode::Live);
    let client =
        BoaVistaClient::new(&config.boa_vista, context(ResponseMode::Live, &sink)).unwrap();

    let err = client
        .get_score("user-1", "111.222.333-44")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("outside"));

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].response_status, 200);
    assert!(logs[0].error.is_some());
}

// ============ Aggregation ============

fn analyzer_for(bureaus: &Bureaus, sink: &MemoryAuditSink) -> CreditAnalyzer {
    let config = test_config(bureaus, ResponseMode::Simulated);
    CreditAnalyzer::from_config(&config, AuditLogger::new(Arc::new(sink.clone()))).unwrap()
}

#[tokio::test]
async fn test_free_tier_queries_serasa_only() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;

    let sink = MemoryAuditSink::new();
    let analyzer = analyzer_for(&bureaus, &sink);

    let result = analyzer
        .perform_credit_analysis("user-1", SubscriptionTier::Free, &ana())
        .await
        .unwrap();

    assert!(result.serasa_score <= 1000);
    assert!(result.boa_vista_score.is_none());
    assert!(result.quod_score.is_none());
    assert!(result.bank_offers.is_empty());
    assert_eq!(result.interest_rates.len(), 3);
    assert_eq!(result.approved, f64::from(result.serasa_score) > 600.0);

    assert_eq!(sink.entries().await.len(), 1);
    assert!(request_bodies(&bureaus.boa_vista).await.is_empty());
    assert!(request_bodies(&bureaus.quod).await.is_empty());
}

#[tokio::test]
async fn test_basic_tier_combines_two_scores() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;
    accept_all(&bureaus.boa_vista).await;

    let sink = MemoryAuditSink::new();
    let analyzer = analyzer_for(&bureaus, &sink);

    let result = analyzer
        .perform_credit_analysis("user-1", SubscriptionTier::Basic, &ana())
        .await
        .unwrap();

    let boa_vista = result.boa_vista_score.expect("basic tier queries Boa Vista");
    assert!(result.quod_score.is_none());
    assert!(result.bank_offers.is_empty());

    let average = average_score(&[result.serasa_score, boa_vista]);
    assert_eq!(result.credit_limit, credit_limit(average, 80000.0));
    assert_eq!(result.approved, average > 600.0);
    assert_eq!(result.client_name, "Ana");
    assert_eq!(sink.entries().await.len(), 2);
}

#[tokio::test]
async fn test_premium_tier_adds_quod_and_bank_offers() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;
    accept_all(&bureaus.boa_vista).await;
    accept_all(&bureaus.quod).await;

    let sink = MemoryAuditSink::new();
    let analyzer = analyzer_for(&bureaus, &sink);

    let result = analyzer
        .perform_credit_analysis("user-1", SubscriptionTier::Premium, &ana())
        .await
        .unwrap();

    assert_eq!(result.scores().len(), 3);
    assert!((2..=4).contains(&result.bank_offers.len()));

    // Bank offers receive the average of all three scores
    let average = average_score(&result.scores());
    let quod_bodies = request_bodies(&bureaus.quod).await;
    assert_eq!(quod_bodies.len(), 2);
    assert_eq!(quod_bodies[1]["creditScore"].as_f64(), Some(average));
    assert_eq!(quod_bodies[1]["loanAmount"].as_f64(), Some(80000.0));

    let endpoints: Vec<String> = sink
        .entries()
        .await
        .into_iter()
        .map(|log| log.endpoint)
        .collect();
    assert_eq!(
        endpoints,
        vec!["/score", "/credit-score", "/credit-analysis", "/bank-offers"]
    );
}

#[tokio::test]
async fn test_premium_failure_on_second_bureau_aborts_without_persisting() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&bureaus.boa_vista)
        .await;
    accept_all(&bureaus.quod).await;

    let sink = MemoryAuditSink::new();
    let analyzer = analyzer_for(&bureaus, &sink);
    let repository = MemoryAnalysisRepository::new();
    let service = CreditAnalysisService::new(analyzer, Arc::new(repository.clone()));

    let err = service
        .analyze_and_store("user-1", SubscriptionTier::Premium, &ana())
        .await
        .unwrap_err();

    match err {
        AppError::AnalysisFailed(message) => {
            assert!(message.starts_with("Credit analysis failed: Failed to query Boa Vista score"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Nothing stored, quod never reached, both attempted calls audited
    assert!(repository.is_empty().await);
    assert!(request_bodies(&bureaus.quod).await.is_empty());

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].bureau_name, Bureau::Serasa);
    assert!(logs[0].error.is_none());
    assert_eq!(logs[1].bureau_name, Bureau::BoaVista);
    assert_eq!(logs[1].response_status, 500);
}

#[tokio::test]
async fn test_premium_unreachable_second_bureau_aborts_without_persisting() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;
    accept_all(&bureaus.quod).await;

    // Nothing listens on a port we just released
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_url = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let sink = MemoryAuditSink::new();
    let mut config = test_config(&bureaus, ResponseMode::Simulated);
    config.boa_vista.base_url = closed_url;
    let analyzer =
        CreditAnalyzer::from_config(&config, AuditLogger::new(Arc::new(sink.clone()))).unwrap();
    let repository = MemoryAnalysisRepository::new();
    let service = CreditAnalysisService::new(analyzer, Arc::new(repository.clone()));

    let err = service
        .analyze_and_store("user-1", SubscriptionTier::Premium, &ana())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AnalysisFailed(_)));

    assert!(repository.is_empty().await);
    assert!(request_bodies(&bureaus.quod).await.is_empty());

    let logs = sink.entries().await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].bureau_name, Bureau::Serasa);
    assert_eq!(logs[1].bureau_name, Bureau::BoaVista);
    assert_eq!(logs[1].endpoint, "/credit-score");
    assert_eq!(logs[1].response_status, 500);
    assert!(logs[1].error.is_some());
}

#[tokio::test]
async fn test_duplicate_submissions_are_not_blocked() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;

    let sink = MemoryAuditSink::new();
    let analyzer = analyzer_for(&bureaus, &sink);
    let repository = MemoryAnalysisRepository::new();
    let service = CreditAnalysisService::new(analyzer, Arc::new(repository.clone()));

    service
        .analyze_and_store("user-1", SubscriptionTier::Free, &ana())
        .await
        .unwrap();
    service
        .analyze_and_store("user-1", SubscriptionTier::Free, &ana())
        .await
        .unwrap();

    assert_eq!(repository.list_analyses("user-1").await.unwrap().len(), 2);
    assert_eq!(sink.entries().await.len(), 2);
}

#[tokio::test]
async fn test_static_rate_table_is_used_when_configured() {
    let bureaus = Bureaus::start().await;
    accept_all(&bureaus.serasa).await;

    let sink = MemoryAuditSink::new();
    let mut config = test_config(&bureaus, ResponseMode::Simulated);
    config.interest_rate_table = Some(
        credit_analysis_api::config::parse_rate_table("Banco X:1.10,Banco Y:1.30").unwrap(),
    );
    let analyzer =
        CreditAnalyzer::from_config(&config, AuditLogger::new(Arc::new(sink.clone()))).unwrap();

    let result = analyzer
        .perform_credit_analysis("user-1", SubscriptionTier::Free, &ana())
        .await
        .unwrap();

    assert_eq!(result.interest_rates.len(), 2);
    assert_eq!(result.interest_rates[0].provider, "Banco X");
    assert_eq!(result.interest_rates[1].rate, 1.30);
}

// ============ Power BI ============

fn powerbi_config(server: &MockServer) -> PowerBiConfig {
    PowerBiConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        tenant_id: "tenant-1".to_string(),
        workspace_id: "ws-1".to_string(),
        report_id: "rep-1".to_string(),
        authority_url: server.uri(),
        api_url: server.uri(),
        embed_base_url: "https://app.powerbi.com/reportEmbed".to_string(),
    }
}

#[tokio::test]
async fn test_powerbi_embed_info_caches_access_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "aad-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1.0/myorg/groups/ws-1/reports/rep-1/GenerateToken"))
        .and(header("Authorization", "Bearer aad-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "embed-token",
            "tokenId": "abc",
            "expiration": "2030-01-01T00:00:00Z"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = PowerBiClient::new(powerbi_config(&server)).unwrap();

    let first = client.embed_info().await.unwrap();
    let second = client.embed_info().await.unwrap();

    assert_eq!(first.embed_token, "embed-token");
    assert_eq!(first.report_id, "rep-1");
    assert_eq!(
        first.embed_url,
        "https://app.powerbi.com/reportEmbed?reportId=rep-1&groupId=ws-1"
    );
    assert_eq!(first.expires_on, second.expires_on);
}

#[tokio::test]
async fn test_powerbi_token_failure_is_external_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = PowerBiClient::new(powerbi_config(&server)).unwrap();
    let err = client.embed_info().await.unwrap_err();

    assert!(matches!(err, AppError::ExternalApiError(_)));
}
