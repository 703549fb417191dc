//! Evolution API webhook intake. The endpoint acknowledges immediately and
//! hands the turn to the agent on a detached task; a slow model reply must
//! never make the webhook caller time out and redeliver.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;
use tracing::{debug, info};

use orcabot_agent::{AgentRuntime, InboundTurn};
use orcabot_whatsapp::{extract_inbound, is_message_event, mask_phone, WebhookPayload};

#[derive(Clone)]
pub struct WebhookState {
    runtime: Arc<AgentRuntime>,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/webhook/evolution", post(receive))
        .with_state(WebhookState { runtime })
}

/// Always answers 200 with a small JSON ack; the payload shape drifts between
/// Evolution versions and a decode mismatch must not trigger redelivery.
async fn receive(
    State(state): State<WebhookState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let Some(turn) = inbound_turn(&body) else {
        debug!(event_name = "webhook.ignored");
        return Json(json!({ "status": "ignored" }));
    };

    info!(event_name = "webhook.received", phone = %mask_phone(&turn.phone));

    let runtime = state.runtime.clone();
    tokio::spawn(async move {
        runtime.handle_inbound(turn).await;
    });

    Json(json!({ "status": "received" }))
}

/// Decodes the payload and filters it down to a processable customer turn.
fn inbound_turn(body: &serde_json::Value) -> Option<InboundTurn> {
    let payload: WebhookPayload = serde_json::from_value(body.clone()).ok()?;

    if !payload.event.as_deref().map(is_message_event).unwrap_or(false) {
        return None;
    }

    let inbound = extract_inbound(&payload)?;
    Some(InboundTurn {
        phone: inbound.phone,
        text: inbound.text,
        sender_name: inbound.sender_name,
    })
}
