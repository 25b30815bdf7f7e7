//! Per-type job handlers.
//!
//! Handlers are selected by `job_type`, never by queue: the queue is a
//! routing partition, and any allow-listed type may land on any queue
//! (including `default`). v1 handlers simulate their side effects with a
//! latency sleep; all of them honor cancellation mid-flight.
//!
//! Handlers must stay idempotent: the queue guarantees at-least-once
//! execution, so a job can run again after a crash or an expired lease.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use relayq_core::{ProcessPaymentPayload, SendEmailPayload, SendWebhookPayload};

/// Run the handler registered for `job_type` against `payload`.
pub async fn dispatch(job_type: &str, ctx: &CancellationToken, payload: &Value) -> Result<Value> {
    match job_type {
        "send_email" => send_email(ctx, payload).await,
        "process_payment" => process_payment(ctx, payload).await,
        "send_webhook" => send_webhook(ctx, payload).await,
        other => Err(anyhow!("no handler for job type: {other}")),
    }
}

async fn send_email(ctx: &CancellationToken, payload: &Value) -> Result<Value> {
    let email: SendEmailPayload =
        serde_json::from_value(payload.clone()).context("decode email payload")?;

    simulate_latency(ctx, Duration::from_millis(100)).await?;

    info!(to = %email.to, subject = %email.subject, "sent email");

    Ok(json!({
        "to": email.to,
        "subject": email.subject,
        "sent_at": Utc::now().to_rfc3339(),
        "message_id": format!("msg_{}", Utc::now().timestamp()),
    }))
}

async fn process_payment(ctx: &CancellationToken, payload: &Value) -> Result<Value> {
    let payment: ProcessPaymentPayload =
        serde_json::from_value(payload.clone()).context("decode payment payload")?;

    simulate_latency(ctx, Duration::from_millis(200)).await?;

    info!(
        payment_id = %payment.payment_id,
        amount = payment.amount,
        currency = %payment.currency,
        "processed payment"
    );

    Ok(json!({
        "payment_id": payment.payment_id,
        "status": "completed",
        "amount": payment.amount,
        "currency": payment.currency,
        "transaction_id": format!("txn_{}", Utc::now().timestamp()),
        "processed_at": Utc::now().to_rfc3339(),
    }))
}

async fn send_webhook(ctx: &CancellationToken, payload: &Value) -> Result<Value> {
    let webhook: SendWebhookPayload =
        serde_json::from_value(payload.clone()).context("decode webhook payload")?;

    // Simulated delivery; the payload's timeout doubles as latency here.
    simulate_latency(ctx, Duration::from_millis(webhook.timeout.max(0) as u64)).await?;

    info!(url = %webhook.url, method = %webhook.method, "delivered webhook");

    Ok(json!({
        "url": webhook.url,
        "method": webhook.method,
        "status_code": 200,
        "response": format!("simulated delivery of: {}", webhook.body),
        "delivered_at": Utc::now().to_rfc3339(),
    }))
}

async fn simulate_latency(ctx: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => bail!("handler canceled"),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn email_handler_returns_receipt() {
        let payload = json!({"to": "a@b.co", "subject": "s", "body": "b"});
        let result = dispatch("send_email", &ctx(), &payload).await.unwrap();
        assert_eq!(result["to"], "a@b.co");
        assert!(result["message_id"].as_str().unwrap().starts_with("msg_"));
    }

    #[tokio::test]
    async fn payment_handler_echoes_amount() {
        let payload = json!({
            "payment_id": "p1", "user_id": "u1",
            "amount": 9.99, "currency": "EUR", "method": "card"
        });
        let result = dispatch("process_payment", &ctx(), &payload).await.unwrap();
        assert_eq!(result["status"], "completed");
        assert_eq!(result["amount"], 9.99);
    }

    #[tokio::test]
    async fn webhook_handler_simulates_delivery() {
        let payload = json!({
            "url": "https://example.com/h", "method": "POST",
            "body": {"k": "v"}, "timeout": 1
        });
        let result = dispatch("send_webhook", &ctx(), &payload).await.unwrap();
        assert_eq!(result["status_code"], 200);
    }

    #[tokio::test]
    async fn unknown_type_is_an_error() {
        let err = dispatch("reindex", &ctx(), &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("no handler"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_an_error() {
        let err = dispatch("send_email", &ctx(), &json!({"to": 1}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("decode email payload"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_handler() {
        let token = CancellationToken::new();
        token.cancel();
        let payload = json!({"to": "a@b.co", "subject": "s", "body": "b"});
        let err = dispatch("send_email", &token, &payload).await.unwrap_err();
        assert!(err.to_string().contains("canceled"));
    }
}
