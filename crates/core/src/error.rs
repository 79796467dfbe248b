/// Result alias that carries the custom [`WaveLabError`] type.
pub type Result<T> = std::result::Result<T, WaveLabError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum WaveLabError {
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// JSON that fails to parse or serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Frequency text that is not a finite number.
    #[error("Invalid frequency `{input}`.")]
    InvalidFrequency { input: String },
    /// Frequency that parsed but is zero or negative.
    #[error("Frequency must be positive (got {value}).")]
    NonPositiveFrequency { value: f64 },
    /// A configuration or request parameter outside its valid range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },
    #[error("unknown waveform `{0}` (expected sine, square, triangle or sawtooth)")]
    UnknownWaveform(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    /// The audio subsystem could not be acquired or has been released.
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    /// Failure reported by the output device while opening or writing a stream.
    #[error("audio device error: {0}")]
    Device(String),
}

impl WaveLabError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }

    pub(crate) fn invalid_param(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// Errors caused by what the user typed. These are shown as blocking
    /// notifications and never change application state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrequency { .. }
                | Self::NonPositiveFrequency { .. }
                | Self::UnknownWaveform(_)
                | Self::UnknownCommand(_)
        )
    }
}

impl From<&str> for WaveLabError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for WaveLabError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_are_not_tied_to_configuration() {
        let err: WaveLabError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();

        let message = err.to_string();
        assert!(message.starts_with("json error:"));
        assert!(!message.contains("configuration"));
    }
}
