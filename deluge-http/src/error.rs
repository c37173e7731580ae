use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse class of a failed call, stable enough to group errors by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    InvalidHeader,
    Request,
    Timeout,
    BodyRead,
}

/// Reasons a call produced no status code, or lost its body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme, expected http or https: {0}")]
    UnsupportedScheme(String),

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("no response head within {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    pub(crate) fn invalid_header(name: &str, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpTransportErrorKind::UnsupportedScheme,
            Self::InvalidHeader { .. } => HttpTransportErrorKind::InvalidHeader,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::Timeout(_) => HttpTransportErrorKind::Timeout,
            Self::BodyRead(_) => HttpTransportErrorKind::BodyRead,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn kinds_round_trip_through_their_names() {
        let err = Error::invalid_header("x bad", "invalid HTTP header name");
        assert_eq!(err.to_string(), "invalid header `x bad`: invalid HTTP header name");
        assert_eq!(err.transport_error_kind().to_string(), "invalid_header");
        assert_eq!(
            "timeout".parse::<HttpTransportErrorKind>().unwrap(),
            Error::Timeout(Duration::from_millis(5)).transport_error_kind()
        );
    }
}
