use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::mail::{EmailTemplates, Mailer, OutgoingEmail, ACTIVATION_TEMPLATE, PASSWORD_RESET_TEMPLATE};
use crate::users::{repo_types::User, tokens::UserTokens};

#[derive(Serialize)]
struct ActivationContext<'a> {
    user: &'a User,
    is_new_user: bool,
    is_resend: bool,
    activation_url: String,
    link_expiry_days: i64,
}

#[derive(Serialize)]
struct PasswordResetContext {
    reset_url: String,
}

/// Builds and dispatches the account emails. Transport failures are returned
/// unchanged; nothing is retried or queued.
#[derive(Clone)]
pub struct AccountMailer {
    mailer: Arc<dyn Mailer>,
    templates: Arc<EmailTemplates>,
    tokens: UserTokens,
    from_address: String,
    public_base_url: String,
}

impl AccountMailer {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        templates: Arc<EmailTemplates>,
        tokens: UserTokens,
        from_address: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            templates,
            tokens,
            from_address: from_address.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn activation_url(&self, token: &str) -> String {
        format!("{}/app/activate/{}/", self.public_base_url, token)
    }

    pub fn password_reset_url(&self, token: &str) -> String {
        format!("{}/app/reset_password/?token={}", self.public_base_url, token)
    }

    async fn send_html(&self, user: &User, subject: &str, html: String) -> anyhow::Result<()> {
        self.mailer
            .send(OutgoingEmail {
                from: self.from_address.clone(),
                to: vec![user.email.clone()],
                subject: subject.to_string(),
                text: String::new(),
                html: Some(html),
            })
            .await
    }

    /// `is_resend` marks an existing user asking for a fresh link.
    pub async fn send_activation_email(
        &self,
        user: &User,
        is_new_user: bool,
        is_resend: bool,
    ) -> anyhow::Result<()> {
        let token = self.tokens.generate_activation_token(user)?;
        let html = self.templates.render(
            ACTIVATION_TEMPLATE,
            &ActivationContext {
                user,
                is_new_user,
                is_resend,
                activation_url: self.activation_url(&token),
                link_expiry_days: self.tokens.activation_max_age_days(),
            },
        )?;
        self.send_html(user, "Activate your account", html).await?;
        info!(user_id = user.id, is_new_user, is_resend, "activation email sent");
        Ok(())
    }

    pub async fn send_password_reset_email(&self, user: &User) -> anyhow::Result<()> {
        let token = self.tokens.generate_password_reset_token(user)?;
        let html = self.templates.render(
            PASSWORD_RESET_TEMPLATE,
            &PasswordResetContext {
                reset_url: self.password_reset_url(&token),
            },
        )?;
        self.send_html(user, "Reset your password", html).await?;
        info!(user_id = user.id, "password reset email sent");
        Ok(())
    }
}
