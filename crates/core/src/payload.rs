//! Typed payload schemas, one per job type.
//!
//! Payloads arrive as opaque JSON and are checked against these schemas
//! when a job is created. Field failures are collected into a map so the
//! ingress can report every offending field at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Payload rejected by schema validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PayloadError {
    pub message: String,
    /// field name -> what failed
    pub fields: BTreeMap<String, String>,
}

impl PayloadError {
    fn malformed(err: &serde_json::Error) -> Self {
        Self {
            message: format!("invalid payload format: {err}"),
            fields: BTreeMap::new(),
        }
    }

    fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self {
            message: "payload validation failed".to_string(),
            fields,
        }
    }
}

/// Validate `payload` against the schema registered for `job_type`.
///
/// Types outside the allow-list are rejected upstream; an unknown type here
/// is accepted unchanged so the service stays the single gatekeeper.
pub fn validate_payload(job_type: &str, payload: &serde_json::Value) -> Result<(), PayloadError> {
    match job_type {
        "send_email" => decode::<SendEmailPayload>(payload)?.validate(),
        "process_payment" => decode::<ProcessPaymentPayload>(payload)?.validate(),
        "send_webhook" => decode::<SendWebhookPayload>(payload)?.validate(),
        _ => Ok(()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: &serde_json::Value) -> Result<T, PayloadError> {
    serde_json::from_value(payload.clone()).map_err(|e| PayloadError::malformed(&e))
}

/// `send_email` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SendEmailPayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        let mut fields = BTreeMap::new();
        if !is_email(&self.to) {
            fields.insert("to".into(), "must be a valid email address".into());
        }
        if self.subject.trim().is_empty() {
            fields.insert("subject".into(), "must not be empty".into());
        }
        if self.body.trim().is_empty() {
            fields.insert("body".into(), "must not be empty".into());
        }
        finish(fields)
    }
}

/// `process_payment` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentPayload {
    pub payment_id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub method: String,
}

const PAYMENT_METHODS: &[&str] = &["card", "upi", "netbanking", "wallet"];

impl ProcessPaymentPayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        let mut fields = BTreeMap::new();
        if self.payment_id.is_empty() {
            fields.insert("payment_id".into(), "is required".into());
        }
        if self.user_id.is_empty() {
            fields.insert("user_id".into(), "is required".into());
        }
        if !(self.amount > 0.0) {
            fields.insert("amount".into(), "must be greater than zero".into());
        }
        if self.currency.chars().count() != 3 {
            fields.insert("currency".into(), "must be exactly 3 characters".into());
        }
        if !PAYMENT_METHODS.contains(&self.method.as_str()) {
            fields.insert(
                "method".into(),
                "must be one of: card, upi, netbanking, wallet".into(),
            );
        }
        finish(fields)
    }
}

/// `send_webhook` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendWebhookPayload {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: serde_json::Value,
    pub timeout: i64,
}

const WEBHOOK_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

impl SendWebhookPayload {
    pub fn validate(&self) -> Result<(), PayloadError> {
        let mut fields = BTreeMap::new();
        if Url::parse(&self.url).is_err() {
            fields.insert("url".into(), "must be a valid URL".into());
        }
        if !WEBHOOK_METHODS.contains(&self.method.as_str()) {
            fields.insert("method".into(), "must be one of: POST, PUT, PATCH".into());
        }
        if self.body.is_null() {
            fields.insert("body".into(), "is required".into());
        }
        if !(1..=30).contains(&self.timeout) {
            fields.insert("timeout".into(), "must be between 1 and 30".into());
        }
        finish(fields)
    }
}

fn finish(fields: BTreeMap<String, String>) -> Result<(), PayloadError> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(PayloadError::from_fields(fields))
    }
}

// Good enough for an allow-listed ingress; real deliverability is the
// handler's problem.
fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
