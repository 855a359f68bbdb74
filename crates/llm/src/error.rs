/// Errors produced while talking to the model server
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The server reported an error inside an otherwise successful stream
    #[error("Server error: {0}")]
    Server(String),

    /// Connectivity was lost or the request was cancelled
    #[error("Request aborted: {0}")]
    Aborted(String),

    /// Any other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// A non-streaming body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl StreamError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, StreamError::Aborted(_))
    }

    /// True when the server rejected the request because the model cannot use tools
    pub fn is_tools_unsupported(&self) -> bool {
        let message = match self {
            StreamError::Status { message, .. } | StreamError::Server(message) => {
                message.to_lowercase()
            }
            _ => return false,
        };
        message.contains("does not support tools")
            || (message.contains("tool") && message.contains("not supported"))
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_connect() {
            StreamError::Aborted(error.to_string())
        } else {
            StreamError::Network(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_unsupported_classification() {
        let error = StreamError::Status {
            status: 400,
            message: "registry.ollama.ai/library/gemma:2b does not support tools".to_string(),
        };
        assert!(error.is_tools_unsupported());

        let error = StreamError::Server("Tool calling is not supported for this model".to_string());
        assert!(error.is_tools_unsupported());

        let error = StreamError::Status {
            status: 500,
            message: "model not found".to_string(),
        };
        assert!(!error.is_tools_unsupported());

        // Only server-reported failures can carry the capability signal
        let error = StreamError::Network("does not support tools".to_string());
        assert!(!error.is_tools_unsupported());
    }

    #[test]
    fn test_display_prefers_status_and_message() {
        let error = StreamError::Status {
            status: 404,
            message: "model 'llama9' not found".to_string(),
        };
        assert_eq!(error.to_string(), "HTTP 404: model 'llama9' not found");
        assert!(!error.is_aborted());
        assert!(StreamError::Aborted("connection reset".to_string()).is_aborted());
    }
}
