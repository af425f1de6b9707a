use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorResponse {
    Detailed { error: ErrorDetail },
    Plain { error: String },
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

impl ErrorResponse {
    pub fn message(&self) -> &str {
        match self {
            ErrorResponse::Detailed { error } => &error.message,
            ErrorResponse::Plain { error } => error,
        }
    }
}
