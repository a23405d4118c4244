//! Single-shot translation: one engineered prompt, one model call

use async_trait::async_trait;
use nlsql_schema::SchemaDescription;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifact::SqlArtifact;
use crate::llm::{ChatModel, ChatRequest};
use crate::prompt::direct_prompt;
use crate::TranslationStrategy;

#[derive(Debug, Clone)]
pub struct DirectSettings {
    pub dialect: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for DirectSettings {
    fn default() -> Self {
        Self {
            dialect: "DuckDB".to_string(),
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

pub struct DirectStrategy {
    model: Arc<dyn ChatModel>,
    settings: DirectSettings,
}

impl DirectStrategy {
    pub fn new(model: Arc<dyn ChatModel>, settings: DirectSettings) -> Self {
        Self { model, settings }
    }
}

#[async_trait]
impl TranslationStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn translate(&self, question: &str, schema: &SchemaDescription) -> SqlArtifact {
        let request = ChatRequest::prompt(direct_prompt(schema, question, &self.settings.dialect))
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens);

        match self.model.chat(&request).await {
            Ok(reply) => match reply.content {
                Some(text) => {
                    debug!("LLM response: {}", text);
                    SqlArtifact::from_model_text(&text)
                }
                None => SqlArtifact::Failed("Model returned no content".to_string()),
            },
            Err(e) => {
                warn!("Error converting to SQL: {}", e);
                SqlArtifact::Failed(format!("Failed to convert query: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatReply, LlmError};
    use nlsql_schema::bike_stores;
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedModel {
        reply: Result<String, ()>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl CannedModel {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(ChatReply::text(text.clone())),
                Err(()) => Err(LlmError::Timeout(Duration::from_secs(30))),
            }
        }
    }

    #[tokio::test]
    async fn test_translate_cleans_fenced_sql() {
        let model = Arc::new(CannedModel::ok("```sql\nSELECT COUNT(*) FROM sales_stores\n```"));
        let strategy = DirectStrategy::new(model.clone(), DirectSettings::default());

        let artifact = strategy.translate("how many stores?", &bike_stores()).await;
        assert_eq!(artifact, SqlArtifact::Sql("SELECT COUNT(*) FROM sales_stores".to_string()));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_tokens, Some(500));
        assert!(seen[0].temperature < 0.2);
    }

    #[tokio::test]
    async fn test_translate_maps_sentinel_to_refusal() {
        let model = Arc::new(CannedModel::ok("ERROR: This input is not related to the BikeStores database."));
        let strategy = DirectStrategy::new(model, DirectSettings::default());

        let artifact = strategy.translate("tell me a joke", &bike_stores()).await;
        assert!(matches!(artifact, SqlArtifact::Refused(ref r) if r.contains("not related")));
    }

    #[tokio::test]
    async fn test_call_failure_becomes_failed_artifact() {
        let strategy = DirectStrategy::new(Arc::new(CannedModel::failing()), DirectSettings::default());

        let artifact = strategy.translate("how many stores?", &bike_stores()).await;
        match artifact {
            SqlArtifact::Failed(reason) => assert!(reason.starts_with("Failed to convert query")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
