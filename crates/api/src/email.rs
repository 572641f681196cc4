//! Transactional email
//!
//! Sends account emails via the Resend API. Delivery failures are logged and
//! never fail the request that triggered them.

use crate::config::Config;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub resend_api_key: String,
    pub email_from: String,
    /// Used to build links in emails
    pub app_url: String,
    pub api_base_url: String,
}

impl EmailConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            app_url: config.public_url.trim_end_matches('/').to_string(),
            api_base_url: RESEND_API_URL.to_string(),
        }
    }

    /// Email is disabled when no API key is configured
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Returns whether the provider accepted the message
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> bool {
        if !self.config.is_enabled() {
            tracing::warn!(subject = %subject, "Email not configured, skipping");
            return false;
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_base_url))
            .bearer_auth(&self.config.resend_api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Email sent");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "Failed to send email");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send email");
                false
            }
        }
    }

    fn layout(title: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="cs">
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #1d4ed8;">{title}</h2>
    {body}
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">Fakturace</p>
</body>
</html>"#
        )
    }

    fn button(href: &str, label: &str) -> String {
        format!(
            r#"<p><a href="{href}" style="display: inline-block; padding: 12px 24px; background-color: #1d4ed8; color: white; text-decoration: none; border-radius: 6px;">{label}</a></p>"#
        )
    }

    pub async fn send_email_verification(&self, to: &str, token: &str) -> bool {
        let link = format!("{}/overeni-emailu?token={}", self.config.app_url, token);
        let html = Self::layout(
            "Ověření e-mailové adresy",
            &format!(
                "<p>Dobrý den,</p><p>děkujeme za registraci. Pro dokončení prosím ověřte svou e-mailovou adresu.</p>{}<p style=\"color: #666; font-size: 14px;\">Odkaz je platný 1 hodinu.</p>",
                Self::button(&link, "Ověřit e-mail")
            ),
        );
        self.send_email(to, "Ověřte svůj e-mail", &html).await
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> bool {
        let link = format!("{}/obnova-hesla?token={}", self.config.app_url, token);
        let html = Self::layout(
            "Obnovení hesla",
            &format!(
                "<p>Dobrý den,</p><p>obdrželi jsme žádost o obnovení hesla k vašemu účtu.</p>{}<p style=\"color: #666; font-size: 14px;\">Odkaz je platný 1 hodinu. Pokud jste o obnovení nežádali, tento e-mail ignorujte.</p>",
                Self::button(&link, "Nastavit nové heslo")
            ),
        );
        self.send_email(to, "Obnovení hesla", &html).await
    }

    pub async fn send_password_changed(&self, to: &str) -> bool {
        let html = Self::layout(
            "Heslo bylo změněno",
            "<p>Dobrý den,</p><p>heslo k vašemu účtu bylo právě změněno a všechna přihlášení byla ukončena.</p><p style=\"color: #dc2626; font-size: 14px;\">Pokud jste změnu neprovedli, kontaktujte nás prosím.</p>",
        );
        self.send_email(to, "Heslo bylo změněno", &html).await
    }

    pub async fn send_subscription_activated(&self, to: &str, plan_name: &str) -> bool {
        let html = Self::layout(
            "Předplatné aktivováno",
            &format!(
                "<p>Dobrý den,</p><p>vaše platba byla přijata a tarif <strong>{}</strong> je nyní aktivní.</p>{}",
                plan_name,
                Self::button(&format!("{}/predplatne", self.config.app_url), "Zobrazit předplatné")
            ),
        );
        self.send_email(to, "Předplatné aktivováno", &html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str, api_base_url: String) -> EmailConfig {
        EmailConfig {
            resend_api_key: api_key.to_string(),
            email_from: "Fakturace <noreply@example.cz>".to_string(),
            app_url: "https://app.example.cz".to_string(),
            api_base_url,
        }
    }

    #[tokio::test]
    async fn test_disabled_without_api_key() {
        let service = EmailService::new(config("", "http://127.0.0.1:9".to_string()));
        assert!(!service.is_enabled());
        assert!(!service.send_password_changed("user@example.cz").await);
    }

    #[tokio::test]
    async fn test_verification_email_posts_to_resend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(mockito::Matcher::Regex(
                "overeni-emailu\\?token=abc123".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"id":"email_1"}"#)
            .create_async()
            .await;

        let service = EmailService::new(config("re_test", server.url()));
        assert!(service.send_email_verification("user@example.cz", "abc123").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_is_reported_not_raised() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"invalid from"}"#)
            .create_async()
            .await;

        let service = EmailService::new(config("re_test", server.url()));
        assert!(!service.send_password_reset("user@example.cz", "tok").await);
    }
}
