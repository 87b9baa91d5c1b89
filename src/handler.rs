//! Response handler chain: hooks, classifiers, and the rate-limit cooldown.
//!
//! A call carries ordered pre-send and post-receive hooks, one success
//! classifier, and an ordered list of error classifiers. Classification is
//! first-match-wins: the success rule is consulted first and, if it matches,
//! the error rules are never evaluated; among error rules registration order
//! is the only tie-break.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

use crate::cancel::CancelHandle;
use crate::error::{Error, Result};
use crate::options::RequestOption;

/// Hook applied to the built request right before each dispatch.
pub(crate) type BeforeSendHook = Box<dyn Fn(&mut reqwest::Request) -> Result<()> + Send + Sync>;

/// Hook applied to the response right after it is received, before
/// classification.
pub(crate) type AfterReceiveHook = Box<dyn Fn(&reqwest::Response) -> Result<()> + Send + Sync>;

/// Cooldown invoked when the rate-limited classifier matches. `Ok` means
/// "retry now"; an error is propagated to the caller.
pub(crate) type CooldownFn =
    Box<dyn Fn(CancelHandle, RateLimitSignal) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Success classifier: a status set plus a body extractor.
pub(crate) struct SuccessHandler<T> {
    pub(crate) statuses: Vec<u16>,
    pub(crate) extract: Box<dyn Fn(&[u8]) -> Result<T> + Send + Sync>,
}

/// Error classifier: a status set plus an error producer.
pub(crate) struct ErrorHandler {
    pub(crate) statuses: Vec<u16>,
    pub(crate) producer: Producer,
}

pub(crate) enum Producer {
    /// The distinguished rate-limited sentinel; consumed by the engine's
    /// retry transition, never surfaced while a cooldown is registered.
    RateLimited,
    /// Decode the response body into a caller-defined error value.
    Decode(Box<dyn Fn(&[u8]) -> Error + Send + Sync>),
}

/// Ordered handler collections for one call. Assembled once, immutable for
/// the duration of the call.
pub(crate) struct HandlerChain<T> {
    pub(crate) before_send: Vec<BeforeSendHook>,
    pub(crate) after_receive: Vec<AfterReceiveHook>,
    pub(crate) success: Option<SuccessHandler<T>>,
    pub(crate) failures: Vec<ErrorHandler>,
    pub(crate) cooldown: Option<CooldownFn>,
}

impl<T> Default for HandlerChain<T> {
    fn default() -> Self {
        Self {
            before_send: Vec::new(),
            after_receive: Vec::new(),
            success: None,
            failures: Vec::new(),
            cooldown: None,
        }
    }
}

/// Start a success rule for the given status codes.
///
/// The rule must be finished with one of [`SuccessRule::json`],
/// [`SuccessRule::xml`], [`SuccessRule::decode_with`], or
/// [`SuccessRule::ignore`] to become an applicable option.
pub fn on_success<S>(statuses: S) -> SuccessRule
where
    S: IntoIterator<Item = u16>,
{
    SuccessRule {
        statuses: statuses.into_iter().collect(),
    }
}

/// Builder for the success classifier, produced by [`on_success`].
pub struct SuccessRule {
    statuses: Vec<u16>,
}

impl SuccessRule {
    /// Decode a matching response body as JSON into `T`.
    pub fn json<T>(self) -> RequestOption<T>
    where
        T: DeserializeOwned,
    {
        self.decode_with(|body| {
            serde_json::from_slice(body).map_err(|e| Error::DecodeBody(e.to_string()))
        })
    }

    /// Decode a matching response body as XML into `T`.
    pub fn xml<T>(self) -> RequestOption<T>
    where
        T: DeserializeOwned,
    {
        self.decode_with(|body| {
            quick_xml::de::from_reader(body).map_err(|e| Error::DecodeBody(e.to_string()))
        })
    }

    /// Extract the outcome from a matching response body with a custom
    /// decoder.
    pub fn decode_with<T, F>(self, decode: F) -> RequestOption<T>
    where
        F: Fn(&[u8]) -> Result<T> + Send + Sync + 'static,
    {
        RequestOption::success(SuccessHandler {
            statuses: self.statuses,
            extract: Box::new(decode),
        })
    }

    /// Treat a matching response as success and discard its body.
    pub fn ignore(self) -> RequestOption<()> {
        self.decode_with(|_| Ok(()))
    }
}

/// Start an error rule for the given status codes.
///
/// Rules are evaluated in registration order after the success classifier has
/// not matched; the first matching rule determines the outcome.
pub fn on_error<S>(statuses: S) -> ErrorRule
where
    S: IntoIterator<Item = u16>,
{
    ErrorRule {
        statuses: statuses.into_iter().collect(),
    }
}

/// Builder for one error classifier, produced by [`on_error`].
pub struct ErrorRule {
    statuses: Vec<u16>,
}

impl ErrorRule {
    /// Decode a matching response body as JSON into the error type `E`.
    ///
    /// The second type parameter is the call's success type and is normally
    /// inferred: `on_error([404]).json::<NotFound, _>()`.
    pub fn json<E, T>(self) -> RequestOption<T>
    where
        E: DeserializeOwned + StdError + Send + Sync + 'static,
    {
        self.decode_with(|body| {
            serde_json::from_slice::<E>(body).map_err(|e| Error::DecodeBody(e.to_string()))
        })
    }

    /// Decode a matching response body as XML into the error type `E`.
    pub fn xml<E, T>(self) -> RequestOption<T>
    where
        E: DeserializeOwned + StdError + Send + Sync + 'static,
    {
        self.decode_with(|body| {
            quick_xml::de::from_reader::<_, E>(body).map_err(|e| Error::DecodeBody(e.to_string()))
        })
    }

    /// Produce the error value from a matching response body with a custom
    /// decoder. A decode failure is itself the terminal error.
    pub fn decode_with<E, T, F>(self, decode: F) -> RequestOption<T>
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(&[u8]) -> Result<E> + Send + Sync + 'static,
    {
        RequestOption::failure(ErrorHandler {
            statuses: self.statuses,
            producer: Producer::Decode(Box::new(move |body| match decode(body) {
                Ok(api) => Error::Api(Box::new(api)),
                Err(error) => error,
            })),
        })
    }
}

/// Start a rate-limit rule for the given status codes.
///
/// The rule must be finished with [`RateLimitRule::cooldown`]; a matching
/// response then triggers the cooldown and, if it succeeds, a retry of the
/// same request. The retry loop is unbounded by construction; bounding it is
/// the cooldown's responsibility (see [`cooldown_unless_cancelled`]).
pub fn on_rate_limit<S>(statuses: S) -> RateLimitRule
where
    S: IntoIterator<Item = u16>,
{
    RateLimitRule {
        statuses: statuses.into_iter().collect(),
    }
}

/// Builder for the rate-limit classifier, produced by [`on_rate_limit`].
pub struct RateLimitRule {
    statuses: Vec<u16>,
}

impl RateLimitRule {
    /// Register the cooldown to run between a rate-limited response and the
    /// retry. Registration order of the underlying classifier is preserved
    /// relative to [`on_error`] rules.
    pub fn cooldown<T, F, Fut>(self, handler: F) -> RequestOption<T>
    where
        F: Fn(CancelHandle, RateLimitSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        RequestOption::rate_limit(
            ErrorHandler {
                statuses: self.statuses,
                producer: Producer::RateLimited,
            },
            Box::new(move |cancel, signal| handler(cancel, signal).boxed()),
        )
    }
}

/// Snapshot of a rate-limited response, handed to the cooldown.
///
/// The body is fully buffered before the cooldown runs, so payload retry
/// hints stay readable even though the underlying connection is already
/// released for the retry.
#[derive(Clone, Debug)]
pub struct RateLimitSignal {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RateLimitSignal {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Status code that matched the rate-limit classifier.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response header snapshot.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parse the `Retry-After` header, either as a number of seconds or as
    /// an HTTP date. A date in the past yields a zero duration.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }

        let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
        let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        Some(delta.to_std().unwrap_or(Duration::ZERO))
    }
}

/// Wrap a cooldown so that it checks for cancellation before each invocation
/// and aborts immediately with [`Error::Cancelled`] if already cancelled.
pub fn cooldown_unless_cancelled<F, Fut>(
    handler: F,
) -> impl Fn(CancelHandle, RateLimitSignal) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static
where
    F: Fn(CancelHandle, RateLimitSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    move |cancel, signal| {
        if cancel.is_cancelled() {
            return futures::future::ready(Err(Error::Cancelled)).boxed();
        }
        handler(cancel, signal).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signal_with_retry_after(value: &str) -> RateLimitSignal {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, value.parse().unwrap());
        RateLimitSignal::new(StatusCode::TOO_MANY_REQUESTS, headers, Bytes::new())
    }

    #[test]
    fn retry_after_parses_seconds() {
        let signal = signal_with_retry_after("120");
        assert_eq!(signal.retry_after(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_parses_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(90);
        let signal = signal_with_retry_after(&future.to_rfc2822());
        let wait = signal.retry_after().expect("parsed");
        assert!(wait <= Duration::from_secs(90));
        assert!(wait >= Duration::from_secs(80));
    }

    #[test]
    fn retry_after_in_the_past_is_zero() {
        let past = chrono::Utc::now() - chrono::Duration::seconds(90);
        let signal = signal_with_retry_after(&past.to_rfc2822());
        assert_eq!(signal.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_missing_or_garbage_is_none() {
        let signal =
            RateLimitSignal::new(StatusCode::TOO_MANY_REQUESTS, HeaderMap::new(), Bytes::new());
        assert_eq!(signal.retry_after(), None);
        assert_eq!(signal_with_retry_after("soonish").retry_after(), None);
    }

    #[tokio::test]
    async fn cooldown_unless_cancelled_aborts_without_invoking_inner() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner_calls = calls.clone();
        let wrapped = cooldown_unless_cancelled(move |_cancel, _signal| {
            let inner_calls = inner_calls.clone();
            async move {
                inner_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let cancel = CancelHandle::new();
        cancel.cancel();
        let signal =
            RateLimitSignal::new(StatusCode::TOO_MANY_REQUESTS, HeaderMap::new(), Bytes::new());

        let result = wrapped(cancel, signal).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cooldown_unless_cancelled_delegates_when_live() {
        let wrapped = cooldown_unless_cancelled(|_cancel, _signal| async { Ok(()) });
        let signal =
            RateLimitSignal::new(StatusCode::TOO_MANY_REQUESTS, HeaderMap::new(), Bytes::new());
        assert!(wrapped(CancelHandle::new(), signal).await.is_ok());
    }
}
