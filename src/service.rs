use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    guardrail::GuardrailPolicy,
    metrics::{Metrics, Outcome},
    model::{ModelProvider, ModelRequest},
    request_log::{RequestLog, RequestLogEntry},
};

#[derive(Debug, Clone, Default)]
pub struct AnswerInput {
    pub question: String,
    pub context: Option<String>,
    pub client_ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerReply {
    pub request_id: String,
    pub answer: String,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("{reason}")]
    Format { request_id: String, reason: String },
    #[error("{reason}")]
    Blocked { request_id: String, reason: String },
    #[error("model provider error")]
    Upstream {
        request_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AnswerError {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Format { request_id, .. }
            | Self::Blocked { request_id, .. }
            | Self::Upstream { request_id, .. } => request_id,
        }
    }
}

// Every call records exactly one metrics outcome.
pub struct AnswerService {
    model: Arc<dyn ModelProvider>,
    policy: GuardrailPolicy,
    metrics: Arc<Metrics>,
    request_log: Arc<RequestLog>,
}

impl AnswerService {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        policy: GuardrailPolicy,
        metrics: Arc<Metrics>,
        request_log: Arc<RequestLog>,
    ) -> Self {
        Self {
            model,
            policy,
            metrics,
            request_log,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn request_log(&self) -> &Arc<RequestLog> {
        &self.request_log
    }

    pub fn record_bad_request(&self, client_ip: &str) -> String {
        let request_id = Uuid::new_v4().to_string();
        self.metrics.record(Outcome::Error);
        warn!(request_id, client_ip, event = "bad_json", "request body is not valid json");
        request_id
    }

    pub async fn answer(&self, input: AnswerInput) -> Result<AnswerReply, AnswerError> {
        let request_id = Uuid::new_v4().to_string();
        let client_ip = input.client_ip.as_str();

        let verdict = self
            .policy
            .evaluate_input_with_context(&input.question, input.context.as_deref());
        if verdict.blocked {
            let reason = verdict.reason.clone().unwrap_or_default();
            if verdict.is_format_error() {
                self.metrics.record(Outcome::Error);
                info!(request_id, client_ip, event = "bad_question", %reason, "question rejected");
                return Err(AnswerError::Format { request_id, reason });
            }

            let rule = verdict.rule.as_deref().unwrap_or("unknown");
            self.metrics.record(Outcome::Blocked);
            warn!(request_id, client_ip, event = "blocked_input", rule, "input guardrail fired");
            self.request_log
                .push(RequestLogEntry::blocked(&request_id, rule))
                .await;
            return Err(AnswerError::Blocked { request_id, reason });
        }

        let model_answer = match self
            .model
            .complete(ModelRequest::for_question(
                &input.question,
                input.context.as_deref(),
            ))
            .await
        {
            Ok(answer) => answer,
            Err(error) => {
                self.metrics.record(Outcome::Error);
                warn!(request_id, client_ip, event = "model_error", ?error, "model call failed");
                return Err(AnswerError::Upstream {
                    request_id,
                    source: error,
                });
            }
        };

        let (answer, verdict) = self.policy.filter_output(model_answer);
        if verdict.masked {
            let rule = verdict.rule.as_deref().unwrap_or("unknown");
            self.metrics.record(Outcome::Blocked);
            warn!(request_id, client_ip, event = "blocked_output", rule, "output guardrail fired");
            self.request_log
                .push(RequestLogEntry::blocked(&request_id, rule))
                .await;
            return Ok(AnswerReply {
                request_id,
                answer,
                blocked: true,
                reason: verdict.reason,
            });
        }

        self.metrics.record(Outcome::Ok);
        info!(
            request_id,
            client_ip,
            event = "answer_served",
            question_len = input.question.chars().count(),
            "answer served"
        );
        self.request_log
            .push(RequestLogEntry::served(&request_id, &input.question, &answer))
            .await;

        Ok(AnswerReply {
            request_id,
            answer,
            blocked: false,
            reason: None,
        })
    }
}
