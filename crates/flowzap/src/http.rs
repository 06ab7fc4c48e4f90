// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook intake and administrative HTTP surface.
//!
//! Thin adapters over the engine: the two webhook handlers normalize the
//! provider payload shapes into core events, everything else is read/CRUD
//! on the registry and trigger matcher. The engine never depends on this
//! layer.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use flowzap_core::error::FlowzapError;
use flowzap_core::event::{InboundMessage, PaymentEvent, PaymentEventKind};
use flowzap_core::funnel::Funnel;
use flowzap_core::snapshot::TriggerEntry;
use flowzap_core::traits::FunnelRegistry;
use flowzap_engine::FunnelEngine;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FunnelEngine>,
}

/// Builds the full intake + admin router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/payment", post(payment_webhook))
        .route("/webhook/message", post(message_webhook))
        .route("/api/stats", get(get_stats))
        .route("/api/conversations", get(list_conversations))
        .route("/api/funnels", get(list_funnels).post(upsert_funnel))
        .route("/api/funnels/{id}", axum::routing::delete(delete_funnel))
        .route("/api/triggers", get(list_triggers).post(add_trigger))
        .route(
            "/api/triggers/{phrase}",
            axum::routing::put(update_trigger).delete(delete_trigger),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(e: FlowzapError) -> (StatusCode, Json<Value>) {
    let status = if e.is_transient() {
        // Lock timeouts are safe to redeliver.
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "success": false, "error": e.to_string() })))
}

// --- webhook intake ---

async fn payment_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let event_name = str_field(&body, &["event"]).to_uppercase();
    let status = first_str(&body, &[&["status"], &["payment_status"]]).to_uppercase();
    let method = first_str(&body, &[&["payment", "method"], &["payment_method"]]).to_uppercase();

    let phone = first_str(&body, &[&["customer", "phone_number"], &["phone"]]);
    if phone.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "invalid phone" })),
        );
    }

    let order_code = {
        let sale = first_str(&body, &[&["sale_id"], &["checkout_id"]]);
        if sale.is_empty() {
            format!("order-{}", uuid::Uuid::new_v4())
        } else {
            sale
        }
    };
    let customer_name = {
        let name = str_field(&body, &["customer", "name"]);
        if name.is_empty() { "Customer".to_string() } else { name }
    };
    let amount = str_field(&body, &["total_price"]);

    let product_code = resolve_product(&state.engine, &body);
    let Some(product_code) = product_code else {
        warn!("payment event with no configured products");
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "no product mapping" })),
        );
    };

    let is_approved = event_name.contains("APPROVED")
        || event_name.contains("PAID")
        || status == "APPROVED";
    let is_pix = method.contains("PIX") || event_name.contains("PIX");

    let kind = if is_approved {
        PaymentEventKind::Approved
    } else if is_pix && event_name.contains("GENERATED") {
        PaymentEventKind::PixGenerated
    } else if is_pix {
        PaymentEventKind::PixPending
    } else {
        info!(event = %event_name, "payment event ignored");
        return (
            StatusCode::OK,
            Json(json!({ "success": true, "outcome": "ignored" })),
        );
    };

    let event = PaymentEvent {
        kind,
        order_code,
        full_phone: phone,
        customer_name,
        product_code: product_code.clone(),
        amount,
    };

    match state.engine.handle_payment_event(event).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "product_code": product_code,
                "result": outcome,
            })),
        ),
        Err(FlowzapError::Validation(message)) => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": message })),
        ),
        Err(e) => error_response(e),
    }
}

async fn message_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(data) = body.get("data") else {
        return (StatusCode::OK, Json(json!({ "success": true })));
    };
    let remote_jid = str_field(data, &["key", "remoteJid"]);
    if remote_jid.is_empty() {
        return (StatusCode::OK, Json(json!({ "success": true })));
    }
    let from_me = data
        .pointer("/key/fromMe")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let text = extract_message_text(data.get("message"));
    let channel_hint = body
        .get("instance")
        .and_then(Value::as_str)
        .map(|s| s.into());

    let full_phone = remote_jid
        .split('@')
        .next()
        .unwrap_or(&remote_jid)
        .to_string();

    let message = InboundMessage {
        full_phone,
        from_me,
        text,
        channel_hint,
    };

    match state.engine.handle_inbound_message(message).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "success": true, "result": outcome })),
        ),
        // Unparseable contact keys are noise, not failures, on this path.
        Err(FlowzapError::Validation(_)) => {
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(e) => error_response(e),
    }
}

/// Pulls the first mapped offer out of the payload's product list, falling
/// back to the default (first configured) product.
fn resolve_product(engine: &FunnelEngine, body: &Value) -> Option<String> {
    if let Some(products) = body.get("products").and_then(Value::as_array) {
        for product in products {
            if let Some(offer_id) = product.get("offer_id").and_then(Value::as_str) {
                if let Some(code) = engine.catalog().resolve_offer(offer_id) {
                    return Some(code.to_string());
                }
            }
        }
    }
    engine.catalog().default_code().map(String::from)
}

/// Text content of an inbound message across the provider's message shapes.
fn extract_message_text(message: Option<&Value>) -> String {
    let Some(message) = message else {
        return String::new();
    };
    for path in [
        &["conversation"][..],
        &["extendedTextMessage", "text"],
        &["imageMessage", "caption"],
        &["videoMessage", "caption"],
    ] {
        let text = str_field(message, path);
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

fn str_field(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for segment in path {
        match current.get(segment) {
            Some(v) => current = v,
            None => return String::new(),
        }
    }
    current.as_str().unwrap_or_default().to_string()
}

fn first_str(value: &Value, paths: &[&[&str]]) -> String {
    for path in paths {
        let s = str_field(value, path);
        if !s.is_empty() {
            return s;
        }
    }
    String::new()
}

// --- operator surface ---

async fn get_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.engine.stats().await;
    Json(json!({ "success": true, "data": stats }))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Value> {
    let mut conversations = state.engine.repository().list();
    if let Some(limit) = query.limit {
        conversations.truncate(limit);
    }
    Json(json!({ "success": true, "data": conversations }))
}

async fn list_funnels(State(state): State<AppState>) -> Json<Value> {
    let funnels: Vec<Value> = state
        .engine
        .registry()
        .list()
        .into_iter()
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.name,
                "step_count": f.steps.len(),
                "steps": f.steps,
            })
        })
        .collect();
    Json(json!({ "success": true, "data": funnels }))
}

async fn upsert_funnel(
    State(state): State<AppState>,
    Json(funnel): Json<Funnel>,
) -> (StatusCode, Json<Value>) {
    if funnel.id.trim().is_empty() || funnel.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "id and name are required" })),
        );
    }
    info!(funnel = %funnel.id, steps = funnel.steps.len(), "funnel saved");
    state.engine.registry().upsert(funnel);
    (StatusCode::OK, Json(json!({ "success": true })))
}

async fn delete_funnel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.engine.registry().remove(&id) {
        info!(funnel = %id, "funnel deleted");
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "funnel not found" })),
        )
    }
}

async fn list_triggers(State(state): State<AppState>) -> Json<Value> {
    let triggers = state.engine.triggers().list().await;
    Json(json!({ "success": true, "data": triggers }))
}

#[derive(Deserialize)]
struct AddTrigger {
    phrase: String,
    funnel_id: String,
}

async fn add_trigger(
    State(state): State<AppState>,
    Json(body): Json<AddTrigger>,
) -> (StatusCode, Json<Value>) {
    if state.engine.registry().get(&body.funnel_id).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "funnel not found" })),
        );
    }
    match state
        .engine
        .triggers()
        .add(TriggerEntry::new(body.phrase, body.funnel_id))
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e.to_string() })),
        ),
    }
}

#[derive(Deserialize)]
struct UpdateTrigger {
    #[serde(default)]
    funnel_id: Option<String>,
    #[serde(default)]
    active: Option<bool>,
}

async fn update_trigger(
    State(state): State<AppState>,
    Path(phrase): Path<String>,
    Json(body): Json<UpdateTrigger>,
) -> (StatusCode, Json<Value>) {
    if let Some(funnel_id) = &body.funnel_id {
        if state.engine.registry().get(funnel_id).is_none() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": "funnel not found" })),
            );
        }
    }
    if state
        .engine
        .triggers()
        .update(&phrase, body.funnel_id, body.active)
        .await
    {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "trigger not found" })),
        )
    }
}

async fn delete_trigger(
    State(state): State<AppState>,
    Path(phrase): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.engine.triggers().remove(&phrase).await {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "trigger not found" })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_extraction_prefers_conversation() {
        let message = json!({
            "conversation": "hello",
            "extendedTextMessage": { "text": "other" },
        });
        assert_eq!(extract_message_text(Some(&message)), "hello");
    }

    #[test]
    fn message_text_falls_back_to_captions() {
        let message = json!({ "imageMessage": { "caption": "look at this" } });
        assert_eq!(extract_message_text(Some(&message)), "look at this");

        let message = json!({ "videoMessage": { "caption": "watch" } });
        assert_eq!(extract_message_text(Some(&message)), "watch");

        assert_eq!(extract_message_text(None), "");
        assert_eq!(extract_message_text(Some(&json!({}))), "");
    }

    #[test]
    fn first_str_takes_first_non_empty_path() {
        let body = json!({ "payment": { "method": "PIX" } });
        assert_eq!(
            first_str(&body, &[&["payment", "method"], &["payment_method"]]),
            "PIX"
        );
        let body = json!({ "payment_method": "CARD" });
        assert_eq!(
            first_str(&body, &[&["payment", "method"], &["payment_method"]]),
            "CARD"
        );
    }
}
