use chrono_tz::Tz;

/// Paths excluded from analytics collection when `FOLIO_ADMIN_PATHS` is unset.
pub const DEFAULT_ADMIN_PATHS: &[&str] = &["/admin", "/dashboard", "/login", "/analytics"];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub geoip_path: String,
    pub auth_mode: AuthMode,
    /// HMAC secret for dashboard tokens. When `None` the server generates one
    /// and persists it in the `settings` table.
    pub jwt_secret: Option<String>,
    pub timezone: Tz,
    pub admin_paths: Vec<String>,
    pub dedup_window_minutes: i64,
    pub cors_origins: Vec<String>,
    pub rate_limit_disable: bool,
    pub duckdb_memory_limit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthMode {
    /// Report routes and the realtime socket are open.
    None,
    /// Report routes require a signed JWT (bearer header or session cookie).
    Token,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("FOLIO_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("FOLIO_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            geoip_path: std::env::var("FOLIO_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            auth_mode: match std::env::var("FOLIO_AUTH").as_deref() {
                Ok("none") => AuthMode::None,
                _ => AuthMode::Token,
            },
            jwt_secret: std::env::var("FOLIO_JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timezone: std::env::var("FOLIO_TIMEZONE")
                .unwrap_or_else(|_| "UTC".to_string())
                .parse::<Tz>()
                .map_err(|e| format!("invalid FOLIO_TIMEZONE: {e}"))?,
            admin_paths: std::env::var("FOLIO_ADMIN_PATHS")
                .map(|v| parse_path_list(&v))
                .unwrap_or_else(|_| default_admin_paths()),
            dedup_window_minutes: {
                let minutes: i64 = std::env::var("FOLIO_DEDUP_WINDOW_MINUTES")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .map_err(|e| format!("invalid FOLIO_DEDUP_WINDOW_MINUTES: {e}"))?;
                if minutes <= 0 {
                    return Err("FOLIO_DEDUP_WINDOW_MINUTES must be positive".to_string());
                }
                minutes
            },
            cors_origins: std::env::var("FOLIO_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit_disable: std::env::var("FOLIO_RATE_LIMIT_DISABLE")
                .map(|v| v == "true")
                .unwrap_or(false),
            duckdb_memory_limit: std::env::var("FOLIO_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
        })
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.dedup_window_minutes)
    }
}

pub fn default_admin_paths() -> Vec<String> {
    DEFAULT_ADMIN_PATHS.iter().map(|p| p.to_string()).collect()
}

/// Split a comma-separated path list, normalising each entry to a leading
/// `/` without a trailing one.
fn parse_path_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let trimmed = s.trim_end_matches('/');
            if trimmed.starts_with('/') {
                trimmed.to_string()
            } else {
                format!("/{trimmed}")
            }
        })
        .filter(|s| s != "/")
        .collect()
}
