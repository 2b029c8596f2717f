use anyhow::Context;
use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

pub const ACTIVATION_TEMPLATE: &str = "email/user_signup_activation.html";
pub const PASSWORD_RESET_TEMPLATE: &str = "email/password_reset.html";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// SMTP delivery through lettre. Errors are returned to the caller as-is.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> Self {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(cfg.smtp_host.as_str())
                .port(cfg.smtp_port);
        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        info!(host = %cfg.smtp_host, port = cfg.smtp_port, "smtp mailer configured");
        Self {
            transport: builder.build(),
        }
    }
}

fn build_message(email: &OutgoingEmail) -> anyhow::Result<Message> {
    let mut builder = Message::builder()
        .from(email.from.parse::<Mailbox>().context("parse from address")?)
        .subject(email.subject.clone());
    for to in &email.to {
        builder = builder.to(to.parse::<Mailbox>().with_context(|| format!("parse recipient {to}"))?);
    }
    let message = match &email.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            html.clone(),
        )),
        None => builder.body(email.text.clone()),
    };
    message.context("build email message")
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let message = build_message(&email)?;
        self.transport
            .send(message)
            .await
            .context("smtp send")?;
        debug!(to = ?email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Handlebars registry holding the transactional email bodies.
pub struct EmailTemplates {
    registry: Handlebars<'static>,
}

impl EmailTemplates {
    pub fn new() -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(
                ACTIVATION_TEMPLATE,
                include_str!("../templates/email/user_signup_activation.html"),
            )
            .context("register activation template")?;
        registry
            .register_template_string(
                PASSWORD_RESET_TEMPLATE,
                include_str!("../templates/email/password_reset.html"),
            )
            .context("register password reset template")?;
        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> anyhow::Result<String> {
        self.registry
            .render(name, context)
            .with_context(|| format!("render {name}"))
    }
}
