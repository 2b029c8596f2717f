//! Stateless activation and password-reset tokens.
//!
//! Neither token is stored. Verification re-derives the signature, checks the
//! age against the timestamp embedded at signing, then looks the user up again.
//! Reset tokens embed the current password hash, so changing the password
//! invalidates every reset token issued before the change.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::SigningConfig;
use crate::signing::{SigningError, TimestampSigner};
use crate::users::{repo::UserStore, repo_types::User};

pub const USER_ACTIVATION_TOKEN_SALT: &str = "xenopus_frog:activation-salt";
pub const PASSWORD_RESET_TOKEN_SALT: &str = "xenopus_frog:password-reset-salt";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<SigningError> for TokenError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::SignatureExpired { .. } => TokenError::Expired,
            SigningError::BadSignature(_) | SigningError::Encode(_) => TokenError::Invalid,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivationClaims {
    id: i64,
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PasswordResetClaims {
    id: i64,
    email: String,
    password: String,
}

/// Issues and verifies user tokens with the configured secrets and windows.
#[derive(Debug, Clone)]
pub struct UserTokens {
    activation: TimestampSigner,
    password_reset: TimestampSigner,
    activation_max_age_days: i64,
    activation_max_age_secs: i64,
    password_reset_max_age_secs: i64,
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl UserTokens {
    pub fn new(cfg: &SigningConfig) -> Self {
        Self {
            activation: TimestampSigner::new(&cfg.secret_key, USER_ACTIVATION_TOKEN_SALT),
            password_reset: TimestampSigner::new(&cfg.password_reset_key, PASSWORD_RESET_TOKEN_SALT),
            activation_max_age_days: cfg.activation_max_age_days,
            activation_max_age_secs: cfg.activation_max_age_secs(),
            password_reset_max_age_secs: cfg.password_reset_max_age_secs(),
        }
    }

    pub fn activation_max_age_days(&self) -> i64 {
        self.activation_max_age_days
    }

    pub fn generate_activation_token(&self, user: &User) -> Result<String, SigningError> {
        self.generate_activation_token_at(user, now())
    }

    pub(crate) fn generate_activation_token_at(&self, user: &User, at: i64) -> Result<String, SigningError> {
        let claims = ActivationClaims {
            id: user.id,
            email: user.email.clone(),
        };
        self.activation.sign_object_at(&claims, false, at)
    }

    pub fn generate_password_reset_token(&self, user: &User) -> Result<String, SigningError> {
        self.generate_password_reset_token_at(user, now())
    }

    pub(crate) fn generate_password_reset_token_at(
        &self,
        user: &User,
        at: i64,
    ) -> Result<String, SigningError> {
        let claims = PasswordResetClaims {
            id: user.id,
            email: user.email.clone(),
            password: user.password_hash.clone(),
        };
        self.password_reset.sign_object_at(&claims, true, at)
    }

    /// `max_age` is in seconds and defaults to the configured activation window.
    pub async fn get_user_from_activation_token(
        &self,
        store: &dyn UserStore,
        token: &str,
        max_age: Option<i64>,
    ) -> Result<User, TokenError> {
        self.get_user_from_activation_token_at(store, token, max_age, now())
            .await
    }

    pub(crate) async fn get_user_from_activation_token_at(
        &self,
        store: &dyn UserStore,
        token: &str,
        max_age: Option<i64>,
        at: i64,
    ) -> Result<User, TokenError> {
        let max_age = max_age.unwrap_or(self.activation_max_age_secs);
        let claims: ActivationClaims = self.activation.unsign_object_at(token, max_age, at)?;
        match store.find_by_token_claims(claims.id, &claims.email, None).await? {
            Some(user) => {
                debug!(user_id = user.id, "activation token verified");
                Ok(user)
            }
            None => {
                warn!(user_id = claims.id, "activation token for unknown user");
                Err(TokenError::Invalid)
            }
        }
    }

    pub async fn get_user_from_password_reset_token(
        &self,
        store: &dyn UserStore,
        token: &str,
    ) -> Result<User, TokenError> {
        self.get_user_from_password_reset_token_at(store, token, now())
            .await
    }

    pub(crate) async fn get_user_from_password_reset_token_at(
        &self,
        store: &dyn UserStore,
        token: &str,
        at: i64,
    ) -> Result<User, TokenError> {
        let claims: PasswordResetClaims = self
            .password_reset
            .unsign_object_at(token, self.password_reset_max_age_secs, at)?;
        match store
            .find_by_token_claims(claims.id, &claims.email, Some(&claims.password))
            .await?
        {
            Some(user) => {
                debug!(user_id = user.id, "password reset token verified");
                Ok(user)
            }
            None => {
                warn!(user_id = claims.id, "password reset token no longer matches user");
                Err(TokenError::Invalid)
            }
        }
    }
}
