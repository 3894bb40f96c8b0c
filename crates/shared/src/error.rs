use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of a GraphQL `errors` array.
///
/// Managed backends attach their own classification under `errorType`;
/// everything else beyond `message` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(
        default,
        rename = "errorType",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_type: Option<String>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            error_type: None,
        }
    }
}

impl fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            Some(error_type) => write!(f, "{error_type}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Joins a batch of GraphQL errors into one line for logs and error chains.
pub fn join_errors(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
