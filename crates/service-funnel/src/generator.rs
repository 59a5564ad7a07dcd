use async_trait::async_trait;

use funnel_common::openai::{ChatCompletionRequest, Message, OpenAiClient};

use crate::error::AppError;

/// Produces the assistant's reply for a prepared message list.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, messages: Vec<Message>) -> Result<String, AppError>;
}

/// `TextGenerator` backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: OpenAiClient,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiGenerator {
    pub fn new(client: OpenAiClient, model: impl Into<String>, max_tokens: Option<u32>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, messages: Vec<Message>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: None,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, messages: Vec<Message>) -> Result<String, AppError> {
        let text = self.client.complete_text(self.request(messages)).await?;
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use funnel_common::openai::OpenAiClientError;

    /// Replies with a fixed text (or fails) and records every prompt it saw.
    pub struct ScriptedGenerator {
        reply: Option<String>,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedGenerator {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<Vec<Message>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, messages: Vec<Message>) -> Result<String, AppError> {
            self.calls.lock().unwrap().push(messages);
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(AppError::Upstream(OpenAiClientError::EmptyCompletion)),
            }
        }
    }
}
