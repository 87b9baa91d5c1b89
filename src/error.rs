//! Error types for request assembly and execution.
//!
//! Everything the crate can fail with surfaces as a single [`Error`] value.
//! Configuration problems (conflicting options, bad headers, invalid queries)
//! are reported before any network activity; transport failures are wrapped
//! once; classified API errors carry the caller's decoded payload and can be
//! recovered with [`Error::api_error`].

use std::error::Error as StdError;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All failure modes of request assembly and execution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A second body-setting option was applied to the same request.
    #[error("body already exists")]
    BodyAlreadySet,

    /// A header name or value could not be constructed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A structured query value could not be encoded (e.g. not record-like).
    #[error("failed to encode query string: {0}")]
    EncodeQuery(String),

    /// A body value could not be serialized (JSON/XML).
    #[error("failed to encode request body: {0}")]
    EncodeBody(String),

    /// A rate-limit cooldown was configured together with a one-shot
    /// streaming body. A retry would have to re-send a body that can no
    /// longer be read.
    #[error("rate limit cooldown cannot be combined with a streaming body")]
    CooldownNeedsReplayableBody,

    /// The final URL did not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// One or more errors were recorded while composing a multipart form.
    #[error("multipart form composition failed: {}", join_errors(.0))]
    Multipart(Vec<Error>),

    /// I/O failure while reading body content.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure reported by the HTTP transport, propagated verbatim.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A response body could not be decoded into the expected type.
    #[error("failed to decode response body: {0}")]
    DecodeBody(String),

    /// A caller-defined error decoded by a matching error classifier.
    #[error("{0}")]
    Api(#[source] Box<dyn StdError + Send + Sync>),

    /// A rate-limited status matched but no cooldown was registered.
    #[error("rate limit exceeded (status {status})")]
    RateLimited {
        /// Status code that matched the rate-limit classifier.
        status: StatusCode,
    },

    /// The response matched neither the success classifier nor any error
    /// classifier. Carries a full snapshot for diagnosis.
    #[error(
        "unhandled response with status {status}:\n\theaders: {headers:?}\n\tbody: {}",
        String::from_utf8_lossy(.body)
    )]
    UnhandledResponse {
        /// Exact response status code.
        status: StatusCode,
        /// Response header snapshot.
        headers: HeaderMap,
        /// Fully buffered response body.
        body: Bytes,
    },

    /// The call was cancelled through its [`CancelHandle`](crate::CancelHandle).
    #[error("operation cancelled")]
    Cancelled,

    /// A one-shot streaming body was needed a second time.
    #[error("request body cannot be replayed")]
    BodyNotReplayable,
}

impl Error {
    /// Downcast a classified API error back to the caller's error type.
    ///
    /// Returns `Some` only for [`Error::Api`] values whose payload is an `E`.
    pub fn api_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Api(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("api said no: {message}")]
    struct FakeApiError {
        message: String,
    }

    #[test]
    fn api_error_downcasts_to_original_type() {
        let error = Error::Api(Box::new(FakeApiError {
            message: "nope".into(),
        }));

        let api = error.api_error::<FakeApiError>().expect("downcast");
        assert_eq!(api.message, "nope");
        assert!(error.api_error::<std::fmt::Error>().is_none());
    }

    #[test]
    fn multipart_display_joins_all_causes() {
        let error = Error::Multipart(vec![Error::BodyAlreadySet, Error::Cancelled]);
        let text = error.to_string();
        assert!(text.contains("body already exists"));
        assert!(text.contains("operation cancelled"));
    }

    #[test]
    fn unhandled_response_display_includes_status_and_body() {
        let error = Error::UnhandledResponse {
            status: StatusCode::IM_A_TEAPOT,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"short and stout"),
        };
        let text = error.to_string();
        assert!(text.contains("418"));
        assert!(text.contains("short and stout"));
    }
}
