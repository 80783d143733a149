/// Configuration management for Repute
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub google: GoogleConfig,
    pub booking: BookingConfig,
    pub scraper: ScraperConfig,
    pub ai: AiConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Where the OAuth callback sends the browser when it is done
    pub dashboard_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

/// Session validation configuration
///
/// Sessions are minted by the frontend; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_secret: String,
    pub session_cookie: String,
}

/// Google Business Profile OAuth and API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub accounts_api_url: String,
    pub locations_api_url: String,
    pub reviews_api_url: String,
}

impl GoogleConfig {
    /// Client credentials are present
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Paid Booking.com review aggregator (RapidAPI)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    pub api_key: Option<String>,
    pub api_host: String,
    pub api_url: String,
}

/// Scraping job service (Apify-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub api_token: Option<String>,
    pub api_url: String,
    pub wait_for_finish_secs: u64,
    pub max_items: u32,
}

/// AI reply drafting (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

/// Sync orchestration knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub synthetic_fallback: bool,
    /// Refresh OAuth tokens this many seconds before they expire
    pub refresh_margin_secs: i64,
    pub http_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `repute=debug,tower_http=info`
    pub level: String,
    pub json: bool,
}

/// Directives used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "repute=debug,tower_http=debug";

impl LoggingConfig {
    /// Tracing filter for `level`, falling back to the default directives when it does not parse
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid log filter {:?}: {}", self.level, e);
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("REPUTE_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("REPUTE_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let dashboard_url = env::var("REPUTE_DASHBOARD_URL")
            .unwrap_or_else(|_| "http://localhost:3000/dashboard".to_string());

        let database_path = env::var("REPUTE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/repute.sqlite"));
        let max_connections = parsed_var("REPUTE_DATABASE_MAX_CONNECTIONS", 10);

        let session_secret = env::var("REPUTE_SESSION_SECRET")
            .map_err(|_| AppError::Validation("Session secret required".to_string()))?;
        let session_cookie =
            env::var("REPUTE_SESSION_COOKIE").unwrap_or_else(|_| "session".to_string());

        let google = GoogleConfig {
            client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            client_secret: non_empty_var("GOOGLE_CLIENT_SECRET"),
            redirect_uri: env::var("GOOGLE_REDIRECT_URI").unwrap_or_else(|_| {
                format!("http://{}:{}/oauth/google/callback", hostname, port)
            }),
            auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            accounts_api_url: env::var("GOOGLE_ACCOUNTS_API_URL").unwrap_or_else(|_| {
                "https://mybusinessaccountmanagement.googleapis.com/v1".to_string()
            }),
            locations_api_url: env::var("GOOGLE_LOCATIONS_API_URL").unwrap_or_else(|_| {
                "https://mybusinessbusinessinformation.googleapis.com/v1".to_string()
            }),
            reviews_api_url: env::var("GOOGLE_REVIEWS_API_URL")
                .unwrap_or_else(|_| "https://mybusiness.googleapis.com/v4".to_string()),
        };

        let booking_host = env::var("BOOKING_API_HOST")
            .unwrap_or_else(|_| "booking-com15.p.rapidapi.com".to_string());
        let booking = BookingConfig {
            api_key: non_empty_var("RAPIDAPI_KEY"),
            api_url: env::var("BOOKING_API_URL")
                .unwrap_or_else(|_| format!("https://{}", booking_host)),
            api_host: booking_host,
        };

        let scraper = ScraperConfig {
            api_token: non_empty_var("APIFY_TOKEN"),
            api_url: env::var("APIFY_API_URL")
                .unwrap_or_else(|_| "https://api.apify.com/v2".to_string()),
            wait_for_finish_secs: parsed_var("APIFY_WAIT_FOR_FINISH_SECS", 120),
            max_items: parsed_var("APIFY_MAX_ITEMS", 50),
        };

        let ai = AiConfig {
            api_key: non_empty_var("OPENAI_API_KEY"),
            api_url: env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        };

        let sync = SyncConfig {
            synthetic_fallback: parsed_var("SYNC_SYNTHETIC_FALLBACK", true),
            refresh_margin_secs: parsed_var("SYNC_TOKEN_REFRESH_MARGIN_SECS", 300),
            http_timeout_secs: parsed_var("SYNC_HTTP_TIMEOUT_SECS", 30),
        };

        let log_level = non_empty_var("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let log_json = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                dashboard_url,
            },
            storage: StorageConfig {
                database_path,
                max_connections,
            },
            authentication: AuthConfig {
                session_secret,
                session_cookie,
            },
            google,
            booking,
            scraper,
            ai,
            sync,
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.session_secret.len() < 32 {
            return Err(AppError::Validation(
                "Session secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(AppError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.sync.refresh_margin_secs < 0 {
            return Err(AppError::Validation(
                "Token refresh margin cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}
