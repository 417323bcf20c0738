use thiserror::Error;

/// The global scroll-suppression primitive failed.
///
/// Propagated untouched to whoever delivered the triggering event. A failed
/// `apply` leaves the page scrollable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuppressionError {
    #[error("scroll suppression {action} failed: {message}")]
    Primitive {
        action: SuppressionAction,
        message: String,
    },
}

impl SuppressionError {
    pub fn apply(message: impl Into<String>) -> Self {
        SuppressionError::Primitive {
            action: SuppressionAction::Apply,
            message: message.into(),
        }
    }

    pub fn remove(message: impl Into<String>) -> Self {
        SuppressionError::Primitive {
            action: SuppressionAction::Remove,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionAction {
    Apply,
    Remove,
}

impl std::fmt::Display for SuppressionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SuppressionAction::Apply => "apply",
            SuppressionAction::Remove => "remove",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("threshold {0} is outside (0, 1]")]
    InvalidThreshold(f64),
    #[error("suppression property must not be empty")]
    EmptySuppressionProperty,
}
