//! HTTP surface
//!
//! - `POST /` conversational-agent webhook, always answers 200
//! - `GET /health` liveness probe
//! - `GET /metrics` Prometheus exposition

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use opsql_ir::PipelineResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::metrics::Metrics;
use crate::pipeline::{QuestionPipeline, FALLBACK_QUESTION};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QuestionPipeline>,
    pub metrics: Arc<Metrics>,
}

/// Question and session parameters pulled out of a webhook body
#[derive(Debug, Clone, PartialEq)]
pub struct InboundQuestion {
    pub question: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl InboundQuestion {
    fn fallback() -> Self {
        Self {
            question: FALLBACK_QUESTION.to_string(),
            parameters: serde_json::Map::new(),
        }
    }
}

/// Lenient parse: `text`, then `fulfillmentInfo.tag`, then the fallback
/// question. Each field is read on its own, so a wrongly-typed field only
/// loses itself. Malformed bodies are logged and defaulted, never rejected.
pub fn parse_inbound(body: &[u8]) -> InboundQuestion {
    let request: Value = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            let err = PipelineError::InputMalformed(e.to_string());
            tracing::warn!(kind = err.kind(), "{}", err);
            return InboundQuestion::fallback();
        }
    };

    let question = non_empty_str(request.get("text"))
        .or_else(|| non_empty_str(request.pointer("/fulfillmentInfo/tag")));

    let Some(question) = question else {
        let err =
            PipelineError::InputMalformed("no text or fulfillmentInfo.tag in request".to_string());
        tracing::warn!(kind = err.kind(), "{}", err);
        return InboundQuestion::fallback();
    };

    InboundQuestion {
        question: question.to_string(),
        parameters: request
            .pointer("/sessionInfo/parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub fulfillment_response: FulfillmentResponse,
    #[serde(rename = "sessionInfo")]
    pub session_info: SessionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentResponse {
    pub messages: Vec<ResponseMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMessage {
    Text(MessageText),
    Question(MessageText),
    Sql(MessageText),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageText {
    pub text: Vec<String>,
}

impl MessageText {
    fn single(text: &str) -> Self {
        Self {
            text: vec![text.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub parameters: SessionParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    pub result_text: String,
}

impl From<PipelineResponse> for WebhookResponse {
    fn from(response: PipelineResponse) -> Self {
        Self {
            fulfillment_response: FulfillmentResponse {
                messages: vec![
                    ResponseMessage::Text(MessageText::single(&response.answer)),
                    ResponseMessage::Question(MessageText::single(&response.question)),
                    ResponseMessage::Sql(MessageText::single(&response.sql)),
                ],
            },
            session_info: SessionInfo {
                parameters: SessionParameters {
                    result_text: response.answer,
                },
            },
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(webhook))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("OPSQL webhook listening on {}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookResponse> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("webhook", %request_id);

    async move {
        state.metrics.requests.inc();

        let inbound = parse_inbound(&body);
        tracing::info!(
            parameters = inbound.parameters.len(),
            "Question: {}",
            inbound.question
        );

        let response = state.pipeline.answer(&inbound.question).await;
        Json(WebhookResponse::from(response))
    }
    .instrument(span)
    .await
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
