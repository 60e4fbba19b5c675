use std::env;

use chrono::Duration;
use edupay_engine::helpers::{BankDetails, DEFAULT_QR_TEMPLATE};
use epg_common::{helpers::parse_boolean_flag, Secret};
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::errors::ServerError;

const DEFAULT_EPG_HOST: &str = "127.0.0.1";
const DEFAULT_EPG_PORT: u16 = 8480;
const DEFAULT_CLAIM_WINDOW: Duration = Duration::hours(24);
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_MISMATCH_THRESHOLD: u32 = 3;
const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);
const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::days(7);
/// HS256 keys shorter than this are trivially brute-forceable.
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// The time a pending deposit stays claimable before the sweeper marks it expired.
    pub claim_window: Duration,
    /// How often the expiry sweeper wakes up, in seconds.
    pub sweep_interval_secs: u64,
    /// Number of amount mismatches against a pending deposit before it is marked failed.
    pub mismatch_threshold: u32,
    /// The receiving bank account advertised in deposit invoices.
    pub bank: BankConfig,
    /// Settlement webhook authentication.
    pub webhook: WebhookConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_EPG_HOST.to_string(),
            port: DEFAULT_EPG_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            claim_window: DEFAULT_CLAIM_WINDOW,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            mismatch_threshold: DEFAULT_MISMATCH_THRESHOLD,
            bank: BankConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("EPG_HOST").ok().unwrap_or_else(|| DEFAULT_EPG_HOST.into());
        let port = env::var("EPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for EPG_PORT. {e} Using the default, {DEFAULT_EPG_PORT}, instead."
                    );
                    DEFAULT_EPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_EPG_PORT);
        let database_url = env::var("EPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ EPG_DATABASE_URL is not set. Please set it to the URL for the wallet database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for =
            env::var("EPG_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let use_forwarded = env::var("EPG_USE_FORWARDED").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let (claim_window, sweep_interval_secs) = configure_deposit_timers();
        let mismatch_threshold = env::var("EPG_MISMATCH_THRESHOLD")
            .map_err(|_| {
                info!(
                    "🪛️ EPG_MISMATCH_THRESHOLD is not set. Using the default value of {DEFAULT_MISMATCH_THRESHOLD}."
                )
            })
            .and_then(|s| {
                s.parse::<u32>().map_err(|e| warn!("🪛️ Invalid configuration value for EPG_MISMATCH_THRESHOLD. {e}"))
            })
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MISMATCH_THRESHOLD);
        let bank = BankConfig::from_env_or_default();
        let webhook = WebhookConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            claim_window,
            sweep_interval_secs,
            mismatch_threshold,
            bank,
            webhook,
        }
    }
}

fn configure_deposit_timers() -> (Duration, u64) {
    let claim_window = env::var("EPG_CLAIM_WINDOW_HOURS")
        .map_err(|_| {
            info!(
                "🪛️ EPG_CLAIM_WINDOW_HOURS is not set. Using the default value of {} hrs.",
                DEFAULT_CLAIM_WINDOW.num_hours()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::hours)
                .map_err(|e| warn!("🪛️ Invalid configuration value for EPG_CLAIM_WINDOW_HOURS. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_CLAIM_WINDOW);
    let sweep_interval_secs = env::var("EPG_SWEEP_INTERVAL_SECS")
        .map_err(|_| {
            info!(
                "🪛️ EPG_SWEEP_INTERVAL_SECS is not set. Using the default value of {DEFAULT_SWEEP_INTERVAL_SECS} s."
            )
        })
        .and_then(|s| {
            s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for EPG_SWEEP_INTERVAL_SECS. {e}"))
        })
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    (claim_window, sweep_interval_secs)
}

//-------------------------------------------------  BankConfig  -------------------------------------------------------

/// The account that payers transfer into, plus the QR template that encodes it.
#[derive(Clone, Debug, Default)]
pub struct BankConfig {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub qr_template: String,
}

impl BankConfig {
    pub fn from_env_or_default() -> Self {
        let bank_code = env::var("EPG_BANK_CODE").ok().unwrap_or_else(|| {
            error!("🪛️ EPG_BANK_CODE is not set. Deposit invoices will render without a valid bank code.");
            String::default()
        });
        let account_number = env::var("EPG_BANK_ACCOUNT_NUMBER").ok().unwrap_or_else(|| {
            error!("🪛️ EPG_BANK_ACCOUNT_NUMBER is not set. Deposit invoices will render without an account number.");
            String::default()
        });
        let account_name = env::var("EPG_BANK_ACCOUNT_NAME").ok().unwrap_or_else(|| {
            error!("🪛️ EPG_BANK_ACCOUNT_NAME is not set. Deposit invoices will render without an account name.");
            String::default()
        });
        let qr_template = env::var("EPG_QR_TEMPLATE").ok().unwrap_or_else(|| {
            info!("🪛️ EPG_QR_TEMPLATE is not set. Using the standard VietQR quick-link template.");
            DEFAULT_QR_TEMPLATE.to_string()
        });
        Self { bank_code, account_number, account_name, qr_template }
    }

    pub fn details(&self) -> BankDetails {
        BankDetails::new(self.bank_code.clone(), self.account_number.clone(), self.account_name.clone())
    }
}

//-------------------------------------------------  WebhookConfig  ----------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// Shared secret the bank gateway signs settlement payloads with.
    pub hmac_secret: Secret<String>,
    /// If false, the HMAC signature on incoming settlement webhooks is not checked. **DANGER**
    pub hmac_checks: bool,
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("EPG_WEBHOOK_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ EPG_WEBHOOK_HMAC_SECRET is not set. Please set it to the signing key your bank gateway uses for \
                 settlement webhooks."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("EPG_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Anyone who can reach this server can credit wallets.");
        }
        Self { hmac_secret, hmac_checks }
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret used to sign and verify JWTs. Must be at least 32 bytes.
    pub jwt_secret: Secret<String>,
    /// Shared key that the storefront presents on `/auth` to mint token pairs.
    pub api_key: Secret<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. DO NOT \
             operate on production like this since every issued token dies with this process. 🚨️🚨️🚨️"
        );
        let jwt_secret = random_key(64);
        let api_key = random_key(32);
        warn!(
            "🚨️🚨️🚨️ The API key for this session is {api_key}. If this is a production instance, you are doing it \
             wrong! Set the EPG_API_KEY environment variable instead. 🚨️🚨️🚨️"
        );
        Self {
            jwt_secret: Secret::new(jwt_secret),
            api_key: Secret::new(api_key),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
        }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let jwt_secret =
            env::var("EPG_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [EPG_JWT_SECRET]")))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ServerError::ConfigurationError(format!(
                "EPG_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes long. Check your configuration."
            )));
        }
        let api_key =
            env::var("EPG_API_KEY").map_err(|e| ServerError::ConfigurationError(format!("{e} [EPG_API_KEY]")))?;
        let access_token_ttl = env::var("EPG_ACCESS_TOKEN_TTL_MINUTES")
            .map_err(|_| {
                info!(
                    "🪛️ EPG_ACCESS_TOKEN_TTL_MINUTES is not set. Using the default value of {} min.",
                    DEFAULT_ACCESS_TOKEN_TTL.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for EPG_ACCESS_TOKEN_TTL_MINUTES. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL);
        let refresh_token_ttl = env::var("EPG_REFRESH_TOKEN_TTL_DAYS")
            .map_err(|_| {
                info!(
                    "🪛️ EPG_REFRESH_TOKEN_TTL_DAYS is not set. Using the default value of {} days.",
                    DEFAULT_REFRESH_TOKEN_TTL.num_days()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::days)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for EPG_REFRESH_TOKEN_TTL_DAYS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL);
        Ok(Self {
            jwt_secret: Secret::new(jwt_secret),
            api_key: Secret::new(api_key),
            access_token_ttl,
            refresh_token_ttl,
        })
    }
}

fn random_key(len: usize) -> String {
    let mut rng = thread_rng();
    (&mut rng).sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------

/// A subset of the server configuration that is used to configure request handling. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub mismatch_threshold: u32,
    pub claim_window: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            mismatch_threshold: config.mismatch_threshold,
            claim_window: config.claim_window,
        }
    }
}
