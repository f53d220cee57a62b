use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_snippet: Option<String>,
}

impl RequestLogEntry {
    pub fn blocked(id: &str, reason: &str) -> Self {
        Self {
            id: id.to_owned(),
            ts: Utc::now(),
            blocked: true,
            reason: Some(reason.to_owned()),
            question: None,
            answer_snippet: None,
        }
    }

    pub fn served(id: &str, question: &str, answer: &str) -> Self {
        Self {
            id: id.to_owned(),
            ts: Utc::now(),
            blocked: false,
            reason: None,
            question: Some(snippet(question)),
            answer_snippet: Some(snippet(answer)),
        }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

#[derive(Debug)]
pub struct RequestLog {
    entries: RwLock<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl RequestLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub async fn push(&self, entry: RequestLogEntry) {
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn recent(&self, limit: usize) -> Vec<RequestLogEntry> {
        let entries = self.entries.read().await;
        let start = entries.len().saturating_sub(limit);
        entries.iter().skip(start).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
