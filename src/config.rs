use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub secret_key: String,
    pub password_reset_key: String,
    pub activation_max_age_days: i64,
    pub password_reset_max_age_days: i64,
}

impl SigningConfig {
    pub fn activation_max_age_secs(&self) -> i64 {
        self.activation_max_age_days * 24 * 3600
    }

    pub fn password_reset_max_age_secs(&self) -> i64 {
        self.password_reset_max_age_days * 24 * 3600
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from_address: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Scheme and authority used to build absolute links in emails.
    pub public_base_url: String,
    pub signing: SigningConfig,
    pub mail: MailConfig,
    /// Bearer key for the user administration routes. Unset disables them.
    pub admin_api_key: Option<String>,
    pub bind_addr: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let signing = SigningConfig {
            secret_key: std::env::var("SECRET_KEY")?,
            password_reset_key: std::env::var("PASSWORD_RESET_TOKEN_KEY")?,
            activation_max_age_days: env_or("USER_ACTIVATION_TOKEN_MAX_AGE_DAYS", 14),
            password_reset_max_age_days: env_or("PASSWORD_RESET_TOKEN_MAX_AGE_DAYS", 1),
        };
        if signing.secret_key == signing.password_reset_key {
            tracing::warn!("PASSWORD_RESET_TOKEN_KEY equals SECRET_KEY; use a dedicated key");
        }

        let mail = MailConfig {
            from_address: std::env::var("SERVER_EMAIL")
                .unwrap_or_else(|_| "noreply@example.com".into()),
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            smtp_port: env_or("SMTP_PORT", 25),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        };

        let admin_api_key = std::env::var("ADMIN_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set; user administration routes are disabled");
        }

        let bind_addr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        );

        Ok(Self {
            database_url,
            public_base_url,
            signing,
            mail,
            admin_api_key,
            bind_addr,
        })
    }

    /// Joins a site-relative path onto `public_base_url`.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base_url, path)
    }
}
