//! Typed client for the model manager's REST surface
//!
//! The orchestration layer uses these calls to populate the model
//! picker before a chat session starts; once a session's model identity
//! is fixed the registry plays no further part.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One stored model as reported by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub ai_model_id: i64,
    pub name: String,
    pub pipeline_tag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing stored models
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_desc: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GetModelsResponse {
    models: Vec<ModelDetails>,
}

#[derive(Debug, Deserialize)]
struct SearchHubResponse {
    ai_model_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GgufFileNamesResponse {
    gguf_file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StandardResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct DownloadHubModelRequest<'a> {
    hf_model_id: &'a str,
}

/// HTTP client for the model registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Create a client against a registry base URL, e.g.
    /// `http://127.0.0.1:8000`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// List stored models
    pub async fn models(&self, query: &ModelQuery) -> Result<Vec<ModelDetails>> {
        let response: GetModelsResponse = self
            .http
            .get(format!("{}/models/", self.base_url))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.models)
    }

    /// Search the hub for models matching a name
    pub async fn search_hub(&self, name: &str) -> Result<Vec<String>> {
        let response: SearchHubResponse = self
            .http
            .get(format!(
                "{}/huggingface/search/{}/",
                self.base_url,
                urlencoding::encode(name)
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.ai_model_names)
    }

    /// Download a hub model into the registry
    pub async fn download_hub_model(&self, hf_model_id: &str) -> Result<()> {
        let response: StandardResponse = self
            .http
            .post(format!("{}/download/hf_lang_model/", self.base_url))
            .json(&DownloadHubModelRequest { hf_model_id })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check(response)
    }

    /// Delete a stored model
    pub async fn delete_model(&self, ai_model_id: i64) -> Result<()> {
        let response: StandardResponse = self
            .http
            .delete(format!("{}/model/{}/", self.base_url, ai_model_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check(response)
    }

    /// Duplicate a stored model
    pub async fn copy_model(&self, ai_model_id: i64) -> Result<()> {
        let response: StandardResponse = self
            .http
            .post(format!("{}/model/{}/copy/", self.base_url, ai_model_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check(response)
    }

    /// List the GGUF weight files available for a stored model
    pub async fn gguf_file_names(&self, ai_model_id: i64) -> Result<Vec<String>> {
        let response: GgufFileNamesResponse = self
            .http
            .get(format!("{}/gguf/files/{}/", self.base_url, ai_model_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.gguf_file_names)
    }

    fn check(response: StandardResponse) -> Result<()> {
        if response.success {
            Ok(())
        } else {
            Err(Error::Registry(response.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_details_deserializes_registry_payload() {
        let json = r#"{
            "models": [{
                "ai_model_id": 3,
                "name": "meta-llama/Llama-3.2-1B",
                "pipeline_tag": "text-generation",
                "created_at": "2024-11-02T10:30:00Z",
                "updated_at": "2024-11-03T08:00:00Z"
            }]
        }"#;
        let response: GetModelsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.models.len(), 1);
        assert_eq!(response.models[0].ai_model_id, 3);
        assert_eq!(response.models[0].pipeline_tag, "text-generation");
    }

    #[test]
    fn test_model_query_skips_unset_filters() {
        let query = ModelQuery {
            limit: Some(10),
            name: Some("llama".into()),
            ..Default::default()
        };
        let encoded = serde_json::to_value(&query).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({ "limit": 10, "name": "llama" })
        );
    }

    #[test]
    fn test_standard_response_failure_maps_to_error() {
        let response = StandardResponse {
            success: false,
            message: "Model not found".into(),
        };
        let result = RegistryClient::check(response);
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = RegistryClient::new("http://localhost:8000/");
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
