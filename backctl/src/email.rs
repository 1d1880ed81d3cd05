//! Email service for verification links, one-time passcodes, and password
//! reset messages.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{config::Config, errors::Error, types::TokenId};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    base_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                // File transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                let file_transport = AsyncFileTransport::<Tokio1Executor>::new(emails_dir);
                EmailTransport::File(file_transport)
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            base_url: config.app_url.clone(),
        })
    }

    pub async fn send_verification_email(&self, to_email: &str, token: &str) -> Result<(), Error> {
        let verify_link = format!("{}/verify-email?token={}", self.base_url, token);

        let subject = "Verify your email address";
        let body = self.create_verification_body(&verify_link);

        self.send_email(to_email, subject, &body).await
    }

    pub async fn send_otp_email(&self, to_email: &str, code: &str, ttl_minutes: u64) -> Result<(), Error> {
        let subject = "Your one-time passcode";
        let body = self.create_otp_body(code, ttl_minutes);

        self.send_email(to_email, subject, &body).await
    }

    pub async fn send_password_reset_email(&self, to_email: &str, token_id: &TokenId, token: &str) -> Result<(), Error> {
        let reset_link = format!("{}/reset-password?id={}&token={}", self.base_url, token_id, token);

        let subject = "Password Reset Request";
        let body = self.create_password_reset_body(&reset_link);

        self.send_email(to_email, subject, &body).await
    }

    async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = to_email.parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        let message = builder
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn create_verification_body(&self, verify_link: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Verify your email address</title>
</head>
<body>
    <h2>Verify your email address</h2>

    <p>Hello,</p>

    <p>Thanks for registering. Click the link below to verify your email address and activate your account:</p>

    <p><a href="{verify_link}">Verify your email</a></p>

    <p>Or copy and paste this link into your browser:</p>
    <p>{verify_link}</p>

    <p>If you didn't create an account, you can safely ignore this email.</p>
</body>
</html>"#
        )
    }

    fn create_otp_body(&self, code: &str, ttl_minutes: u64) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Your one-time passcode</title>
</head>
<body>
    <h2>Your one-time passcode</h2>

    <p>Hello,</p>

    <p>Your passcode is:</p>

    <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>

    <p>It expires in {ttl_minutes} minutes. Requesting a new passcode invalidates this one.</p>

    <p>If you didn't request a passcode, you can safely ignore this email.</p>
</body>
</html>"#
        )
    }

    fn create_password_reset_body(&self, reset_link: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password Reset Request</title>
</head>
<body>
    <h2>Password Reset Request</h2>

    <p>Hello,</p>

    <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>

    <p>To reset your password, click the link below:</p>

    <p><a href="{reset_link}">Reset your password</a></p>

    <p>Or copy and paste this link into your browser:</p>
    <p>{reset_link}</p>

    <p>This link will expire shortly for security reasons.</p>
</body>
</html>"#
        )
    }
}
