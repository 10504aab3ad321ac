use serde::Serialize;

pub type StreamResult<T> = Result<T, StreamError>;

pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
pub const PIPELINE_IO: &str = "PIPELINE_IO";
pub const INTERNAL: &str = "INTERNAL";

/// Failures that end a streaming session.
///
/// Layout edge cases never show up here: an over-wide word is broken by the
/// layout engine and rendering carries on.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Bad manifest values, unreadable fonts, frame size mismatches. Not retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The encoder process died or refused input, or the preview surface went away.
    #[error("pipeline i/o error: {0}")]
    PipelineIo(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn pipeline_io(msg: impl Into<String>) -> Self {
        Self::PipelineIo(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => CONFIG_INVALID,
            Self::PipelineIo(_) => PIPELINE_IO,
            Self::Other(_) => INTERNAL,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code(), self.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: ErrorEnvelopeBody {
                code: code.to_owned(),
                message: message.into(),
            },
        }
    }

    /// Builds an envelope for any error chain, using the code of the first
    /// [`StreamError`] found in it.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let code = find_stream_error(error)
            .map(StreamError::code)
            .unwrap_or(INTERNAL);
        Self::new(code, format!("{error:#}"))
    }
}

pub fn find_stream_error(error: &anyhow::Error) -> Option<&StreamError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StreamError>())
}
