//! HTTP client for the metadata connector, scheduler and time-series connector.
//!
//! Thin and stateless: every authenticated call takes the bearer token as an
//! argument. Deciding whether a token is still good is the session's job.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Operation, Result};
use crate::models::{
    Ack, CatalogEntry, LoginRequest, LoginResponse, RegisterRequest, SubscribeRequest, Subscription,
    TelemetryRecord,
};

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Setup)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // --- Unauthenticated ---

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let req = self.http.post(format!("{}/login", self.config.postgres_url)).json(&body);
        self.send_json(Operation::Login, req).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Ack> {
        let req = self
            .http
            .post(format!("{}/createUser", self.config.postgres_url))
            .json(request);
        self.send_ack(Operation::Register, req).await
    }

    // --- Bearer-gated ---

    pub async fn available_apis(&self, token: &str) -> Result<Vec<CatalogEntry>> {
        let req = self
            .http
            .get(format!("{}/availableApis", self.config.postgres_url))
            .bearer_auth(token);
        self.send_json(Operation::CatalogFetch, req).await
    }

    pub async fn subscriptions_by_user(&self, token: &str, user_id: &str) -> Result<Vec<Subscription>> {
        let req = self
            .http
            .get(format!(
                "{}/subscriptionsByUserID/{}",
                self.config.postgres_url, user_id
            ))
            .bearer_auth(token);
        self.send_json(Operation::SubscriptionFetch, req).await
    }

    pub async fn subscribe(&self, token: &str, request: &SubscribeRequest) -> Result<Ack> {
        let req = self
            .http
            .post(format!("{}/subscribeApi", self.config.scheduler_url))
            .bearer_auth(token)
            .json(request);
        self.send_ack(Operation::Subscribe, req).await
    }

    pub async fn unsubscribe(&self, token: &str, subscription_id: i64) -> Result<Ack> {
        let req = self
            .http
            .get(format!(
                "{}/unsubscribeApi/{}",
                self.config.scheduler_url, subscription_id
            ))
            .bearer_auth(token);
        self.send_ack(Operation::Unsubscribe, req).await
    }

    pub async fn resubscribe(&self, token: &str, subscription_id: i64) -> Result<Ack> {
        let req = self
            .http
            .get(format!(
                "{}/resubscribeApi/{}",
                self.config.scheduler_url, subscription_id
            ))
            .bearer_auth(token);
        self.send_ack(Operation::Resubscribe, req).await
    }

    /// Rows of the last `timespan_minutes` for one subscription.
    pub async fn telemetry(
        &self,
        token: &str,
        subscription_id: i64,
        timespan_minutes: u32,
    ) -> Result<Vec<TelemetryRecord>> {
        let req = self
            .http
            .get(format!(
                "{}/influxGetData/{}/{}",
                self.config.influx_url, subscription_id, timespan_minutes
            ))
            .bearer_auth(token);
        self.send_json(Operation::TelemetryFetch, req).await
    }

    async fn send_json<T: DeserializeOwned>(&self, op: Operation, req: RequestBuilder) -> Result<T> {
        let resp = self.send(op, req).await?;
        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ClientError::Parse(format!("{op} response: {e}"))
            } else {
                ClientError::Transport { op, source: e }
            }
        })
    }

    async fn send_ack(&self, op: Operation, req: RequestBuilder) -> Result<Ack> {
        let resp = self.send(op, req).await?;
        let text = resp.text().await.map_err(ClientError::transport(op))?;
        Ok(parse_ack(&text, &self.config.message_key))
    }

    /// Issue the request; non-2xx becomes [`ClientError::Request`] carrying the server's text.
    async fn send(&self, op: Operation, req: RequestBuilder) -> Result<Response> {
        debug!(%op, "issuing request");
        let resp = req.send().await.map_err(ClientError::transport(op))?;
        let status = resp.status();
        debug!(%op, %status, "request completed");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = server_message(&body, &self.config.message_key)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(ClientError::Request { op, status, message })
    }
}

/// Status text out of a response body: the message key of a JSON object,
/// otherwise the trimmed raw text. `None` for an empty body.
fn server_message(body: &str, key: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => match map.get(key) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        _ => Some(trimmed.to_string()),
    }
}

fn parse_ack(body: &str, key: &str) -> Ack {
    let value = serde_json::from_str::<serde_json::Value>(body.trim()).unwrap_or(serde_json::Value::Null);
    Ack {
        message: server_message(body, key),
        body: value,
    }
}
