//! Broadcast hub error types

/// Error type for broadcast hub operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Topic not found
    TopicNotFound(String),
    /// Topic already exists
    TopicAlreadyExists(String),
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::TopicNotFound(name) => {
                write!(f, "data broadcast endpoint not found: {}", name)
            }
            HubError::TopicAlreadyExists(name) => {
                write!(f, "data broadcast endpoint already exists: {}", name)
            }
        }
    }
}

impl std::error::Error for HubError {}
