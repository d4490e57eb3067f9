//! Inbound SMS webhook — the transport edge for subscriber texts.
//!
//! Twilio posts each inbound message as a form-encoded callback; the
//! handler normalizes the sender, hands the text to the command
//! processor, and relays any reply back out through the SMS sender. The
//! callback is always acknowledged with 200 — provider retries on 5xx
//! would only duplicate inbound commands.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router, extract::State};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::channels::{ChannelSender, normalize_phone};
use crate::commands::CommandProcessor;

#[derive(Clone)]
pub struct WebhookState {
    pub processor: Arc<CommandProcessor>,
    /// Replies go back out the way they came in; absent only in
    /// email-only deployments.
    pub sms: Option<Arc<dyn ChannelSender>>,
}

/// The two Twilio callback fields the engine cares about.
#[derive(Debug, Deserialize)]
pub struct InboundSmsForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/sms", post(handle_inbound_sms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_inbound_sms(
    State(state): State<WebhookState>,
    Form(form): Form<InboundSmsForm>,
) -> StatusCode {
    let sender = normalize_phone(&form.from);

    match state.processor.handle(&sender, &form.body).await {
        Ok(Some(reply)) => match &state.sms {
            Some(sms) => {
                if let Err(e) = sms.send(&sender, &reply).await {
                    error!(to = %sender, error = %e, "Failed to deliver command reply");
                }
            }
            None => warn!(to = %sender, "Reply produced but no SMS sender is configured"),
        },
        Ok(None) => {}
        Err(e) => error!(from = %sender, error = %e, "Command handling failed"),
    }

    StatusCode::OK
}
