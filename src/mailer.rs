use serde_json::json;

use crate::auth::ApiError;

/// Client for the transactional mail HTTP gateway. Codes are delivered by
/// email only; nothing here touches SMTP directly.
pub struct EmailService {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
    from: String,
}

impl EmailService {
    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "http://localhost:8025".to_string()),
            api_token: std::env::var("MAIL_API_TOKEN").ok(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@hotel.local".to_string()),
        }
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), ApiError> {
        let Some(token) = self.api_token.as_ref() else {
            tracing::warn!("mail gateway token not configured, dropping mail to {}", to);
            return Err(ApiError::Email);
        };

        let resp = self
            .client
            .post(format!("{}/api/send", self.api_url.trim_end_matches('/')))
            .bearer_auth(token)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "body": html,
                "isHtml": true,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("mail send: {}", e);
                ApiError::Email
            })?;

        if !resp.status().is_success() {
            tracing::debug!("mail gateway responded with {}", resp.status());
            return Err(ApiError::Email);
        }
        Ok(())
    }

    pub async fn send_otp(
        &self,
        to: &str,
        code: &str,
        reason: &str,
        ttl_minutes: i64,
    ) -> Result<(), ApiError> {
        let subject = format!("Your {} code", reason);
        let body = render_otp_email(code, reason, ttl_minutes);
        self.send(to, &subject, &body).await
    }
}

fn render_otp_email(code: &str, reason: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<body style="font-family:Arial,sans-serif;background:#f4f4f4;padding:24px;">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0">
    <tr><td align="center">
      <table role="presentation" width="100%" style="max-width:480px;background:#ffffff;border-radius:8px;padding:32px;">
        <tr><td>
          <h2 style="margin:0 0 16px;color:#1a1a2e;">Hotel back office</h2>
          <p style="margin:0 0 16px;color:#444;">Use this code to finish your {reason}:</p>
          <p style="margin:0 0 16px;font-size:32px;letter-spacing:8px;font-weight:bold;color:#1a1a2e;">{code}</p>
          <p style="margin:0;color:#888;font-size:13px;">The code expires in {ttl_minutes} minutes. If you did not request it, you can ignore this email.</p>
        </td></tr>
      </table>
    </td></tr>
  </table>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_email_carries_code_and_expiry() {
        let body = render_otp_email("042917", "login verification", 10);
        assert!(body.contains("042917"));
        assert!(body.contains("10 minutes"));
        assert!(body.contains("login verification"));
    }
}
