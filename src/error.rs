use thiserror::Error;

/// Failures reported by a [`crate::live::BrowserDriver`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    /// The session dropped mid-call. The live backend resets and retries once.
    #[error("browser session disconnected: {0}")]
    Disconnected(String),

    /// A cached element no longer exists in the page.
    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("driver command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("expected {expected} resetter policies for initial stage {expected}, got {supplied}")]
    ResetterCount { expected: usize, supplied: usize },

    #[error("unknown observation field: {0}")]
    UnknownField(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action index {index} out of range for action space of size {len}")]
    ActionIndex { index: usize, len: usize },

    #[error("script error in {context}: {message}")]
    Script { context: String, message: String },

    #[error("deferred event `{requested}` started while `{pending}` is still pending")]
    DeferredEventPending { pending: String, requested: String },

    #[error("invalid time advance of {0} seconds")]
    InvalidTimeAdvance(f64),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("could not parse displayed value {text:?} for field {field}")]
    NumericParse { field: String, text: String },

    #[error("invalid state snapshot: {0}")]
    Snapshot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EnvError {
    pub fn script(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        EnvError::Script {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Only a dropped browser session is worth retrying; everything else is
    /// either expected (and not an error) or a configuration fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, EnvError::Driver(DriverError::Disconnected(_)))
    }
}

pub type Result<T, E = EnvError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnects_are_transient() {
        assert!(EnvError::from(DriverError::Disconnected("eof".into())).is_transient());
        assert!(!EnvError::from(DriverError::StaleElement("btnBuyWire".into())).is_transient());
        assert!(!EnvError::UnknownAction("Fly".into()).is_transient());
    }

    #[test]
    fn resetter_count_message_names_both_counts() {
        let err = EnvError::ResetterCount {
            expected: 3,
            supplied: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('1'), "{msg}");
    }
}
