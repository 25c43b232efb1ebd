use std::fmt;

/// Fatal error classes raised by the estimation core
///
/// These abort the whole fit; recoverable problems (a failed preliminary
/// rate fit, implausible rate values during simulation) are logged and
/// handled locally instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The caller-supplied inputs cannot define a fit (degenerate time
    /// axis, mismatched series lengths)
    Configuration(String),
    /// The initial compartment state violates the conservation law
    Consistency(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        CoreError::Consistency(message.into())
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            CoreError::Consistency(msg) => write!(f, "consistency error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}
