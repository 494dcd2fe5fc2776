//! Question-fetch collaborator
//!
//! A single asynchronous attempt per marker; there is no retry. Failures are
//! handled by the interception protocol (playback resumes).

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Question payload returned to the host untouched
pub type QuestionPayload = serde_json::Value;

/// Fetches the question set associated with a marker
#[async_trait]
pub trait QuestionService: Send + Sync {
    async fn fetch_question(&self, identifier: &str) -> Result<QuestionPayload>;
}

/// In-memory question service
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionService {
    questions: HashMap<String, QuestionPayload>,
}

impl StaticQuestionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object mapping identifiers to payloads
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let questions: HashMap<String, QuestionPayload> = serde_json::from_value(value)?;
        Ok(Self { questions })
    }

    pub fn with_question(mut self, identifier: impl Into<String>, payload: QuestionPayload) -> Self {
        self.questions.insert(identifier.into(), payload);
        self
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[async_trait]
impl QuestionService for StaticQuestionService {
    async fn fetch_question(&self, identifier: &str) -> Result<QuestionPayload> {
        self.questions
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::question(identifier, "no such question set"))
    }
}

/// Question service backed by an HTTP endpoint: `GET <base_url>/<identifier>`
#[cfg(feature = "http")]
pub struct HttpQuestionService {
    base_url: url::Url,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpQuestionService {
    pub fn new(base_url: url::Url, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(mut base_url: url::Url, client: reqwest::Client) -> Self {
        // Url::join drops the last path segment unless it ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { base_url, client }
    }

    /// URL of the question set for `identifier`
    pub fn question_url(&self, identifier: &str) -> Result<url::Url> {
        Ok(self.base_url.join(identifier)?)
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl QuestionService for HttpQuestionService {
    #[instrument(skip(self))]
    async fn fetch_question(&self, identifier: &str) -> Result<QuestionPayload> {
        let url = self.question_url(identifier)?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::QuestionStatus {
                identifier: identifier.to_string(),
                status: status.as_u16(),
            });
        }

        let payload = response.json::<QuestionPayload>().await?;
        debug!(identifier, "Question set fetched");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_service_lookup() {
        let service = StaticQuestionService::new().with_question("q1", json!({"questions": [1, 2]}));

        let payload = service.fetch_question("q1").await.unwrap();
        assert_eq!(payload["questions"], json!([1, 2]));

        let err = service.fetch_question("q2").await.unwrap_err();
        assert!(matches!(err, Error::QuestionFetch { ref identifier, .. } if identifier == "q2"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_static_service_from_json() {
        let service = StaticQuestionService::from_json(json!({"q1": {"a": 1}, "q2": null})).unwrap();
        assert_eq!(service.len(), 2);
        assert!(StaticQuestionService::from_json(json!([1, 2])).is_err());
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_question_url() {
        let base = url::Url::parse("https://api.example.com/questionset/v1/read").unwrap();
        let service = HttpQuestionService::with_client(base, reqwest::Client::new());
        assert_eq!(
            service.question_url("do_2134").unwrap().as_str(),
            "https://api.example.com/questionset/v1/read/do_2134"
        );
    }
}
