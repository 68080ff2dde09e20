use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Persisted session triple. An empty token means "no session".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub role: String,
    pub user_id: String,
}

impl Credential {
    pub fn new(token: impl Into<String>, role: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role: role.into(),
            user_id: user_id.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

/// Claims read out of the bearer token. Only `exp` is required.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, seconds since the epoch
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// One subscribable upstream API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    #[serde(rename = "availableApiID", alias = "id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Display order as declared; looked up as a set.
    #[serde(rename = "relevantFields", default)]
    pub relevant_fields: Vec<String>,
    #[serde(rename = "subscriptionType", default)]
    pub subscription_type: String,
    pub url: String,
    #[serde(rename = "apiTokenRequired", default)]
    pub api_token_required: bool,
}

impl CatalogEntry {
    pub fn is_relevant(&self, field: &str) -> bool {
        self.relevant_fields.iter().any(|f| f == field)
    }
}

/// Server-reported subscription status. Anything other than ACTIVE or
/// INACTIVE belongs to the error family and keeps the raw text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Error(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Inactive => "INACTIVE",
            SubscriptionStatus::Error(raw) => raw,
        }
    }

    pub fn is_error_family(&self) -> bool {
        matches!(self, SubscriptionStatus::Error(_))
    }
}

impl From<String> for SubscriptionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => SubscriptionStatus::Active,
            "INACTIVE" => SubscriptionStatus::Inactive,
            _ => SubscriptionStatus::Error(raw),
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    #[serde(rename = "subscriptionID")]
    pub subscription_id: i64,
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "availableApiID")]
    pub available_api_id: i64,
    /// Polling interval in seconds
    pub interval: i64,
    pub status: SubscriptionStatus,
    #[serde(rename = "jobName", default)]
    pub job_name: String,
    #[serde(default)]
    pub container: String,
}

/// One time-series row. `raw_value` is JSON text produced by the upstream API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    #[serde(rename = "_time", alias = "time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "subscriptionID", deserialize_with = "int_or_string")]
    pub subscription_id: i64,
    #[serde(rename = "value", alias = "rawValue")]
    pub raw_value: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub role: String,
    #[serde(rename = "userID", deserialize_with = "string_or_number")]
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    PremiumUser,
}

#[derive(Serialize, Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: UserRole,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "apiID")]
    pub api_id: i64,
    pub interval: i64,
}

/// Server acknowledgement: the status text (if any) plus the whole body.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message: Option<String>,
    pub body: serde_json::Value,
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn int_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let raw = string_or_number(de)?;
    raw.trim().parse::<i64>().map_err(serde::de::Error::custom)
}
