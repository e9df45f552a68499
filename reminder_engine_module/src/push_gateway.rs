use std::env;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tracing::warn;

pub const DEFAULT_FCM_API_BASE_URL: &str = "https://fcm.googleapis.com";

const SEND_TIMEOUT_SECS: u64 = 30;

/// Classified result of a single push submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The gateway accepted the message for delivery.
    Delivered,
    /// The delivery address is permanently invalid; the caller must
    /// surface this so the stored token can be cleaned up.
    StaleToken,
    /// Anything retryable. There is no in-window retry; the next
    /// evaluation window's independent draw is the retry mechanism.
    TransientFailure,
}

pub trait PushGateway: Send + Sync {
    fn send(&self, token: &str, title: &str, body: &str) -> PushOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum PushGatewayError {
    #[error("missing FCM_SERVER_KEY")]
    MissingServerKey,
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Push submission via the FCM HTTP API.
pub struct FcmPushGateway {
    client: reqwest::blocking::Client,
    endpoint: String,
    server_key: String,
}

impl FcmPushGateway {
    pub fn new(base_url: &str, server_key: impl Into<String>) -> Result<Self, PushGatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/fcm/send", base_url.trim_end_matches('/')),
            server_key: server_key.into(),
        })
    }

    pub fn from_env() -> Result<Self, PushGatewayError> {
        dotenvy::dotenv().ok();
        let base_url = env::var("FCM_API_BASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_FCM_API_BASE_URL.to_string());
        let server_key = env::var("FCM_SERVER_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(PushGatewayError::MissingServerKey)?;
        Self::new(&base_url, server_key)
    }

    fn classify_response(status: StatusCode, body: &str) -> PushOutcome {
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return PushOutcome::StaleToken;
        }
        if !status.is_success() {
            warn!("push gateway returned {}", status);
            return PushOutcome::TransientFailure;
        }

        let parsed: serde_json::Value = match serde_json::from_str(body) {
            Ok(value) => value,
            // Accepted with an unreadable body; the gateway took it.
            Err(_) => return PushOutcome::Delivered,
        };
        let error = parsed
            .get("results")
            .and_then(|results| results.get(0))
            .and_then(|result| result.get("error"))
            .and_then(|error| error.as_str());
        match error {
            Some("NotRegistered") | Some("InvalidRegistration") => PushOutcome::StaleToken,
            Some(other) => {
                warn!("push gateway error: {}", other);
                PushOutcome::TransientFailure
            }
            None => PushOutcome::Delivered,
        }
    }
}

impl PushGateway for FcmPushGateway {
    fn send(&self, token: &str, title: &str, body: &str) -> PushOutcome {
        let payload = json!({
            "to": token,
            "notification": {
                "title": title,
                "body": body,
                "sound": "default",
                "badge": "1",
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send();

        match response {
            Ok(response) => {
                let status = response.status();
                let text = response.text().unwrap_or_default();
                Self::classify_response(status, &text)
            }
            Err(err) => {
                warn!("push send failed: {}", err);
                PushOutcome::TransientFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn gateway(server: &Server) -> FcmPushGateway {
        FcmPushGateway::new(&server.url(), "test-key").expect("gateway")
    }

    #[test]
    fn successful_send_is_delivered() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/fcm/send")
            .match_header("authorization", "key=test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":1,"failure":0,"results":[{"message_id":"m1"}]}"#)
            .expect(1)
            .create();

        let outcome = gateway(&server).send("token-1", "Final Call", "Lock in now.");
        assert_eq!(outcome, PushOutcome::Delivered);
        mock.assert();
    }

    #[test]
    fn unregistered_token_is_stale() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/fcm/send")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":0,"failure":1,"results":[{"error":"NotRegistered"}]}"#)
            .create();

        let outcome = gateway(&server).send("dead-token", "t", "b");
        assert_eq!(outcome, PushOutcome::StaleToken);
    }

    #[test]
    fn http_not_found_is_stale() {
        let mut server = Server::new();
        let _mock = server.mock("POST", "/fcm/send").with_status(404).create();
        let outcome = gateway(&server).send("dead-token", "t", "b");
        assert_eq!(outcome, PushOutcome::StaleToken);
    }

    #[test]
    fn server_error_is_transient() {
        let mut server = Server::new();
        let _mock = server.mock("POST", "/fcm/send").with_status(503).create();
        let outcome = gateway(&server).send("token-1", "t", "b");
        assert_eq!(outcome, PushOutcome::TransientFailure);
    }

    #[test]
    fn unreachable_gateway_is_transient() {
        // Nothing listens on this port.
        let gateway = FcmPushGateway::new("http://127.0.0.1:9", "test-key").expect("gateway");
        let outcome = gateway.send("token-1", "t", "b");
        assert_eq!(outcome, PushOutcome::TransientFailure);
    }

    #[test]
    fn other_gateway_errors_are_transient() {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/fcm/send")
            .with_status(200)
            .with_body(r#"{"success":0,"failure":1,"results":[{"error":"InternalServerError"}]}"#)
            .create();
        let outcome = gateway(&server).send("token-1", "t", "b");
        assert_eq!(outcome, PushOutcome::TransientFailure);
    }
}
