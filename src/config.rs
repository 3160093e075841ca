use std::time::Duration;

use crate::bureaus::{Bureau, ResponseMode};
use crate::models::InterestRate;

/// Connection settings for one bureau.
#[derive(Debug, Clone)]
pub struct BureauSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Credentials and identifiers for the embedded Power BI report.
#[derive(Debug, Clone)]
pub struct PowerBiConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub workspace_id: String,
    pub report_id: String,
    pub authority_url: String,
    pub api_url: String,
    pub embed_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_origin: Option<String>,
    pub encryption_secret: String,
    pub encryption_salt: String,
    pub serasa: BureauSettings,
    pub boa_vista: BureauSettings,
    pub quod: BureauSettings,
    pub response_mode: ResponseMode,
    /// Fixed interest-rate table. `None` means synthetic rates.
    pub interest_rate_table: Option<Vec<InterestRate>>,
    pub powerbi: Option<PowerBiConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            jwt_secret: required("JWT_SECRET")?,
            frontend_origin: optional("FRONTEND_ORIGIN"),
            encryption_secret: required("BUREAU_ENCRYPTION_SECRET")?,
            encryption_salt: required("BUREAU_ENCRYPTION_SALT").and_then(|salt| {
                if salt.len() < 16 {
                    anyhow::bail!("BUREAU_ENCRYPTION_SALT must be at least 16 bytes");
                }
                Ok(salt)
            })?,
            serasa: bureau_settings(Bureau::Serasa)?,
            boa_vista: bureau_settings(Bureau::BoaVista)?,
            quod: bureau_settings(Bureau::Quod)?,
            response_mode: optional("BUREAU_RESPONSE_MODE")
                .map(|mode| mode.parse::<ResponseMode>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?
                .unwrap_or_default(),
            interest_rate_table: optional("INTEREST_RATE_TABLE")
                .map(|table| parse_rate_table(&table))
                .transpose()?,
            powerbi: powerbi_from_env()?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Serasa base URL: {}", config.serasa.base_url);
        tracing::debug!("Boa Vista base URL: {}", config.boa_vista.base_url);
        tracing::debug!("Quod base URL: {}", config.quod.base_url);
        tracing::info!("Bureau response mode: {:?}", config.response_mode);
        if config.powerbi.is_none() {
            tracing::warn!("Power BI not configured; embed token endpoint disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reference endpoint and timeout per bureau.
pub fn bureau_defaults(bureau: Bureau) -> (&'static str, Duration) {
    match bureau {
        Bureau::Serasa => ("https://api.serasa.com.br/v1", Duration::from_millis(10_000)),
        Bureau::BoaVista => (
            "https://api.boavista.com.br/v2",
            Duration::from_millis(8_000),
        ),
        Bureau::Quod => ("https://api.quod.com.br/v1", Duration::from_millis(12_000)),
    }
}

fn env_prefix(bureau: Bureau) -> &'static str {
    match bureau {
        Bureau::Serasa => "SERASA",
        Bureau::BoaVista => "BOAVISTA",
        Bureau::Quod => "QUOD",
    }
}

fn bureau_settings(bureau: Bureau) -> anyhow::Result<BureauSettings> {
    let prefix = env_prefix(bureau);
    let (default_url, default_timeout) = bureau_defaults(bureau);

    let base_url = optional(&format!("{}_BASE_URL", prefix))
        .unwrap_or_else(|| default_url.to_string());
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        anyhow::bail!("{}_BASE_URL must start with http:// or https://", prefix);
    }

    let timeout = match optional(&format!("{}_TIMEOUT_MS", prefix)) {
        Some(raw) => {
            let millis: u64 = raw.parse().map_err(|_| {
                anyhow::anyhow!("{}_TIMEOUT_MS must be a number of milliseconds", prefix)
            })?;
            if millis == 0 {
                anyhow::bail!("{}_TIMEOUT_MS must be greater than zero", prefix);
            }
            Duration::from_millis(millis)
        }
        None => default_timeout,
    };

    Ok(BureauSettings {
        base_url,
        api_key: required(&format!("{}_API_KEY", prefix))?,
        timeout,
    })
}

fn powerbi_from_env() -> anyhow::Result<Option<PowerBiConfig>> {
    let Some(client_id) = optional("POWERBI_CLIENT_ID") else {
        return Ok(None);
    };

    Ok(Some(PowerBiConfig {
        client_id,
        client_secret: required("POWERBI_CLIENT_SECRET")?,
        tenant_id: required("POWERBI_TENANT_ID")?,
        workspace_id: required("POWERBI_WORKSPACE_ID")?,
        report_id: required("POWERBI_REPORT_ID")?,
        authority_url: optional("POWERBI_AUTHORITY_URL")
            .unwrap_or_else(|| "https://login.microsoftonline.com".to_string()),
        api_url: optional("POWERBI_API_URL")
            .unwrap_or_else(|| "https://api.powerbi.com".to_string()),
        embed_base_url: optional("POWERBI_EMBED_URL")
            .unwrap_or_else(|| "https://app.powerbi.com/reportEmbed".to_string()),
    }))
}

/// Parses `Banco A:1.20,Banco B:1.35` into a rate table.
pub fn parse_rate_table(raw: &str) -> anyhow::Result<Vec<InterestRate>> {
    let rates = raw
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let (provider, rate) = entry.rsplit_once(':').ok_or_else(|| {
                anyhow::anyhow!("INTEREST_RATE_TABLE entry '{}' must be provider:rate", entry)
            })?;
            let rate: f64 = rate.trim().parse().map_err(|_| {
                anyhow::anyhow!("INTEREST_RATE_TABLE rate '{}' is not a number", rate)
            })?;
            if !rate.is_finite() || rate < 0.0 {
                anyhow::bail!("INTEREST_RATE_TABLE rate for '{}' must be >= 0", provider);
            }
            Ok(InterestRate {
                provider: provider.trim().to_string(),
                rate,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if rates.is_empty() {
        anyhow::bail!("INTEREST_RATE_TABLE cannot be empty");
    }
    Ok(rates)
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}
