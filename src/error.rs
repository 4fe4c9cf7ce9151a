use thiserror::Error;

/// A non-success HTTP response from the issue tracker.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Jira API error: {status} {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Status { status, .. } => *status,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status_and_body() {
        let err = ApiError::Status {
            status: 400,
            body: r#"{"errors":{"summary":"required"}}"#.into(),
        };
        assert_eq!(err.status(), 400);
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("summary"));
    }

    #[test]
    fn missing_config_names_the_variable() {
        let err = ConfigError::Missing("JIRA_TOKEN");
        assert_eq!(err.to_string(), "Missing required environment variable: JIRA_TOKEN");
    }
}
