use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Inbound data that does not have the expected shape.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Network failure, timeout, rate limit or server error. Worth retrying.
    #[error("transient provider error: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// The provider refused the request. Retrying will not help.
    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_payload(message: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transient(status: Option<u16>, message: impl std::fmt::Display) -> Self {
        Self::Transient {
            status,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Anything that failed before a response arrived is a transport
        // problem; status errors are classified by the caller.
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transient(err.status().map(|s| s.as_u16()), err)
        } else if err.is_decode() {
            Self::invalid_payload(err)
        } else {
            Self::external("http request failed", err)
        }
    }
}

impl taskbridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

taskbridge_common::impl_context!();
