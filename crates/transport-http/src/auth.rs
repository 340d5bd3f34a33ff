// E-mail one-time-code authentication

use crate::client::{map_error, read_json, ApiClient};
use needle_core::{NarrationError, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiClient {
    /// `POST /auth/request-code`; the service e-mails a one-time code
    pub fn request_code(&self, email: &str) -> Result<String> {
        let email = validate_email(email)?;
        let response = self
            .agent
            .post(&self.url("/auth/request-code"))
            .send_json(EmailBody { email })
            .map_err(|e| map_error("POST request-code", e))?;
        let body: StatusBody = read_json(response)?;
        Ok(body
            .message
            .unwrap_or_else(|| "Verification code sent".to_string()))
    }

    /// `POST /auth/verify-code`. On success the service sets the session
    /// cookie, which the agent's cookie store keeps for later calls.
    pub fn verify_code(&self, email: &str, code: &str) -> Result<()> {
        let email = validate_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(NarrationError::InvalidArgument(
                "Verification code is empty".to_string(),
            ));
        }
        let response = self
            .agent
            .post(&self.url("/auth/verify-code"))
            .send_json(VerifyBody { email, code })
            .map_err(|e| map_error("POST verify-code", e))?;
        let body: StatusBody = read_json(response)?;
        match body.status.as_deref() {
            Some("authenticated") => {
                log::info!("Authenticated as {}", email);
                Ok(())
            }
            other => Err(NarrationError::InvalidState(format!(
                "Unexpected verify-code status: {:?}",
                other
            ))),
        }
    }

    /// `POST /auth/logout`
    pub fn logout(&self) -> Result<()> {
        self.agent
            .post(&self.url("/auth/logout"))
            .call()
            .map_err(|e| map_error("POST logout", e))?;
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(NarrationError::InvalidArgument(format!(
            "'{}' is not an e-mail address",
            email
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::validate_email;
    use crate::client::fixture;
    use crate::ApiClient;
    use needle_core::ClientConfig;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ClientConfig::default().with_api_url(base).unwrap())
    }

    #[test]
    fn test_email_validation() {
        assert_eq!(validate_email(" reader@example.com ").unwrap(), "reader@example.com");
        assert!(validate_email("reader").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_verify_code_replays_session_cookie() {
        let (base, requests) = fixture::serve(vec![
            fixture::response(
                "200 OK",
                "application/json",
                &["Set-Cookie: session_token=abc123; HttpOnly; Path=/; SameSite=Strict"],
                br#"{"status":"authenticated"}"#,
            ),
            fixture::json("200 OK", "[]"),
        ]);
        let api = client(&base);

        api.verify_code("reader@example.com", "a1b2c3").unwrap();
        let verify = requests.recv().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&verify.body).unwrap();
        assert_eq!(body, serde_json::json!({"email": "reader@example.com", "code": "a1b2c3"}));

        assert!(api.list_books().unwrap().is_empty());
        let list = requests.recv().unwrap();
        assert!(list.header("cookie").unwrap().contains("session_token=abc123"));
    }

    #[test]
    fn test_request_code_message() {
        let (base, _requests) = fixture::serve(vec![fixture::json(
            "200 OK",
            r#"{"message":"Verification code sent"}"#,
        )]);
        let message = client(&base).request_code("reader@example.com").unwrap();
        assert_eq!(message, "Verification code sent");
    }
}
