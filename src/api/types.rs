use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    pub text: Option<String>,
}

/// Body of `GET /query`: exactly one of the two fields is present.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Generated { response: String },
    Failed { error: String },
}

impl QueryResponse {
    pub fn error(message: impl Into<String>) -> Self {
        QueryResponse::Failed {
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
