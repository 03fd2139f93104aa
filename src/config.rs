use std::env;

use anyhow::{bail, Context};
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => bail!("unknown APP_ENV '{other}' (expected production or development)"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub listen_addr: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_cookie_expires_in_days: i64,
    pub password_reset_ttl: Duration,
    /// Requests per hour allowed per IP on `/api`. Zero disables the limiter.
    pub rate_limit_per_hour: u32,
    pub cors_origins: Vec<String>,

    // Transactional email API (optional)
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            bail!("JWT_SECRET must be at least 32 characters");
        }

        let environment = match var("APP_ENV") {
            Some(v) => Environment::parse(&v)?,
            None => Environment::Development,
        };

        let jwt_expires_in = match var("JWT_EXPIRES_IN") {
            Some(v) => parse_duration(&v)
                .with_context(|| format!("JWT_EXPIRES_IN has an invalid duration '{v}'"))?,
            None => Duration::days(90),
        };

        let email_api_url = var("EMAIL_API_URL").filter(|v| !v.is_empty());
        if environment.is_production() && email_api_url.is_none() {
            bail!("EMAIL_API_URL must be set in production, password reset emails need a transport");
        }

        Ok(Self {
            environment,
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            database_url: var("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_var(&var, "DATABASE_MAX_CONNECTIONS", 20)?,
            jwt_secret,
            jwt_expires_in,
            jwt_cookie_expires_in_days: parse_var(&var, "JWT_COOKIE_EXPIRES_IN", 90)?,
            password_reset_ttl: Duration::minutes(parse_var(
                &var,
                "PASSWORD_RESET_TTL_MINUTES",
                10,
            )?),
            rate_limit_per_hour: parse_var(&var, "RATE_LIMIT_PER_HOUR", 100)?,
            cors_origins: var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            email_api_url,
            email_api_key: var("EMAIL_API_KEY"),
            email_from: var("EMAIL_FROM").unwrap_or_else(|| "Natours <hello@natours.io>".into()),
        })
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value '{v}'")),
        None => Ok(default),
    }
}

/// Parses `90d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&value[..i], c.to_ascii_lowercase()),
        _ => (value, 's'),
    };
    let amount: i64 = digits.trim().parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        'd' => Some(Duration::days(amount)),
        'h' => Some(Duration::hours(amount)),
        'm' => Some(Duration::minutes(amount)),
        's' => Some(Duration::seconds(amount)),
        _ => None,
    }
}
