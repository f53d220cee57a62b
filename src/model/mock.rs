use async_trait::async_trait;

use super::{ModelProvider, ModelRequest};

#[derive(Debug, Default)]
pub struct MockModelProvider;

#[async_trait]
impl ModelProvider for MockModelProvider {
    async fn complete(&self, request: ModelRequest) -> anyhow::Result<String> {
        let question = request
            .user_prompt
            .strip_prefix("Question: ")
            .and_then(|rest| rest.split("\n\nContext:").next())
            .unwrap_or(&request.user_prompt)
            .trim();
        Ok(format!("Mock answer to: {question}"))
    }
}
