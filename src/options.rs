//! Request configuration options and the accumulator they apply to.
//!
//! Each option is one independently specified configuration fragment: a URL
//! piece, a header, a body source, or a handler. Options are applied in
//! order against one [`RequestParams`] value; the first failing option
//! aborts the rest. Option constructors themselves are infallible — failures
//! detected at construction time (a bad header name, a query value that does
//! not encode) are captured inside the option and surfaced when it is
//! applied, before any network activity.

use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::cancel::CancelHandle;
use crate::error::{Error, Result};
use crate::handler::{
    AfterReceiveHook, BeforeSendHook, CooldownFn, ErrorHandler, HandlerChain, SuccessHandler,
};
use crate::transport::{HttpTransport, default_client};
use crate::url::UrlBuilder;

/// One configuration fragment for a single call.
///
/// Options are created by the free functions in this module (`with_*`,
/// `before_send`, `after_receive`) and by the classifier builders
/// ([`on_success`](crate::on_success), [`on_error`](crate::on_error),
/// [`on_rate_limit`](crate::on_rate_limit)). The type parameter is the
/// call's success type.
pub struct RequestOption<T> {
    kind: Kind<T>,
}

enum Kind<T> {
    Cancel(CancelHandle),
    Client(reqwest::Client),
    Transport(Arc<dyn HttpTransport>),
    Paths(Vec<String>),
    Query(Result<String>),
    Header {
        entry: Result<(HeaderName, HeaderValue)>,
        append: bool,
    },
    Body {
        source: Result<BodySource>,
        content_type: Option<HeaderValue>,
    },
    BeforeSend(BeforeSendHook),
    AfterReceive(AfterReceiveHook),
    Success(SuccessHandler<T>),
    Failure(ErrorHandler),
    RateLimit {
        handler: ErrorHandler,
        cooldown: CooldownFn,
    },
}

/// The request body, at most one per call.
///
/// A buffered body is replayable across rate-limit retries; a streaming body
/// is one-shot, which is why descriptor validation rejects the combination
/// of a streaming body and a cooldown.
pub(crate) enum BodySource {
    Buffered(Bytes),
    Streaming(Option<reqwest::Body>),
}

impl<T> RequestOption<T> {
    fn from_kind(kind: Kind<T>) -> Self {
        Self { kind }
    }

    pub(crate) fn success(handler: SuccessHandler<T>) -> Self {
        Self::from_kind(Kind::Success(handler))
    }

    pub(crate) fn failure(handler: ErrorHandler) -> Self {
        Self::from_kind(Kind::Failure(handler))
    }

    pub(crate) fn rate_limit(handler: ErrorHandler, cooldown: CooldownFn) -> Self {
        Self::from_kind(Kind::RateLimit { handler, cooldown })
    }

    pub(crate) fn body(
        source: Result<BodySource>,
        content_type: Option<HeaderValue>,
    ) -> Self {
        Self::from_kind(Kind::Body {
            source,
            content_type,
        })
    }

    fn apply(self, params: &mut RequestParams<T>) -> Result<()> {
        match self.kind {
            Kind::Cancel(handle) => params.cancel = Some(handle),
            Kind::Client(client) => params.client = Some(client),
            Kind::Transport(transport) => params.transport = Some(transport),
            Kind::Paths(paths) => params.url.append_paths(paths),
            Kind::Query(encoded) => params.url.append_raw_query(encoded?),
            Kind::Header { entry, append } => {
                let (name, value) = entry?;
                if append {
                    params.headers.append(name, value);
                } else {
                    params.headers.insert(name, value);
                }
            }
            Kind::Body {
                source,
                content_type,
            } => {
                if params.body.is_some() {
                    return Err(Error::BodyAlreadySet);
                }
                params.body = Some(source?);
                if let Some(value) = content_type {
                    params.headers.insert(CONTENT_TYPE, value);
                }
            }
            Kind::BeforeSend(hook) => params.chain.before_send.push(hook),
            Kind::AfterReceive(hook) => params.chain.after_receive.push(hook),
            Kind::Success(handler) => params.chain.success = Some(handler),
            Kind::Failure(handler) => params.chain.failures.push(handler),
            Kind::RateLimit { handler, cooldown } => {
                params.chain.failures.push(handler);
                params.chain.cooldown = Some(cooldown);
            }
        }

        Ok(())
    }
}

/// Accumulated state of one pending call.
///
/// Created per call, populated synchronously by applying options in order,
/// validated once, and dropped when the call returns (retries included).
pub(crate) struct RequestParams<T> {
    pub(crate) cancel: Option<CancelHandle>,
    pub(crate) client: Option<reqwest::Client>,
    pub(crate) transport: Option<Arc<dyn HttpTransport>>,
    pub(crate) url: UrlBuilder,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<BodySource>,
    pub(crate) chain: HandlerChain<T>,
}

impl<T> std::fmt::Debug for RequestParams<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestParams")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl<T> RequestParams<T> {
    /// Apply all options in order (fail fast), inject set-if-absent defaults
    /// for the cancel handle and the client, then run cross-field
    /// validation.
    pub(crate) fn assemble(options: Vec<RequestOption<T>>) -> Result<Self> {
        let mut params = Self {
            cancel: None,
            client: None,
            transport: None,
            url: UrlBuilder::new(),
            headers: HeaderMap::new(),
            body: None,
            chain: HandlerChain::default(),
        };

        for option in options {
            option.apply(&mut params)?;
        }

        params.cancel.get_or_insert_with(CancelHandle::new);
        params.client.get_or_insert_with(default_client);

        // A rate-limited retry re-dispatches the same request; a one-shot
        // streaming body cannot be re-read.
        if params.chain.cooldown.is_some()
            && matches!(params.body, Some(BodySource::Streaming(_)))
        {
            return Err(Error::CooldownNeedsReplayableBody);
        }

        Ok(params)
    }

    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone().unwrap_or_default()
    }

    /// Produce the body for one attempt. Buffered bodies are cloned per
    /// attempt; a streaming body can only be taken once.
    pub(crate) fn take_attempt_body(&mut self) -> Result<Option<reqwest::Body>> {
        match &mut self.body {
            None => Ok(None),
            Some(BodySource::Buffered(bytes)) => Ok(Some(reqwest::Body::from(bytes.clone()))),
            Some(BodySource::Streaming(slot)) => {
                slot.take().map(Some).ok_or(Error::BodyNotReplayable)
            }
        }
    }

    pub(crate) async fn dispatch(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        if let Some(transport) = &self.transport {
            return transport.send(request).await;
        }
        match &self.client {
            Some(client) => client.execute(request).await.map_err(Error::from),
            None => default_client().execute(request).await.map_err(Error::from),
        }
    }
}

/// Set the cancellation handle for this call.
pub fn with_cancel<T>(handle: CancelHandle) -> RequestOption<T> {
    RequestOption::from_kind(Kind::Cancel(handle))
}

/// Set the `reqwest` client for this call, overriding the shared default.
pub fn with_client<T>(client: reqwest::Client) -> RequestOption<T> {
    RequestOption::from_kind(Kind::Client(client))
}

/// Route this call through a custom [`HttpTransport`] instead of a client.
pub fn with_transport<T>(transport: Arc<dyn HttpTransport>) -> RequestOption<T> {
    RequestOption::from_kind(Kind::Transport(transport))
}

/// Append path segments to the URL, each trimmed of `/` on both ends. The
/// resulting URL is not escaped.
pub fn with_paths<T, I, S>(paths: I) -> RequestOption<T>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RequestOption::from_kind(Kind::Paths(paths.into_iter().map(Into::into).collect()))
}

/// Append one properly escaped query fragment encoded from the given
/// record-like value.
pub fn with_query<T, Q>(query: &Q) -> RequestOption<T>
where
    Q: Serialize + ?Sized,
{
    let encoded =
        serde_html_form::to_string(query).map_err(|e| Error::EncodeQuery(e.to_string()));
    RequestOption::from_kind(Kind::Query(encoded))
}

fn header_entry(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::InvalidHeader(format!("invalid header name {name:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidHeader(format!("invalid header value {value:?}: {e}")))?;
    Ok((name, value))
}

/// Set a header, replacing any previous values for the same name. Names are
/// canonicalized here, at configuration time.
pub fn with_header<T>(name: &str, value: &str) -> RequestOption<T> {
    RequestOption::from_kind(Kind::Header {
        entry: header_entry(name, value),
        append: false,
    })
}

/// Append one more value for a header name, keeping any previous values.
pub fn with_header_append<T>(name: &str, value: &str) -> RequestOption<T> {
    RequestOption::from_kind(Kind::Header {
        entry: header_entry(name, value),
        append: true,
    })
}

fn known_header<T>(name: HeaderName, value: &str) -> RequestOption<T> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidHeader(format!("invalid header value: {e}")));
    RequestOption::from_kind(Kind::Header {
        entry: value.map(|v| (name, v)),
        append: false,
    })
}

/// Set the `Content-Type` representation header, overwriting the previous
/// one, if any.
pub fn with_content_type<T>(value: &str) -> RequestOption<T> {
    known_header(CONTENT_TYPE, value)
}

/// Set the `Accept` request header, overwriting the previous one, if any.
pub fn with_accept<T>(value: &str) -> RequestOption<T> {
    known_header(ACCEPT, value)
}

/// Set the `Authorization` request header with the given value.
pub fn with_auth<T>(value: &str) -> RequestOption<T> {
    known_header(AUTHORIZATION, value)
}

/// Set the `Authorization` header to a bearer token.
pub fn with_bearer_auth<T>(token: &str) -> RequestOption<T> {
    with_auth(&format!("Bearer {token}"))
}

/// Set the `Authorization` header to HTTP Basic Authentication with the
/// given username and password.
pub fn with_basic_auth<T>(username: &str, password: &str) -> RequestOption<T> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    with_auth(&format!("Basic {encoded}"))
}

/// Use the given bytes as the body content. Errors with
/// [`Error::BodyAlreadySet`] if a body is already configured.
pub fn with_bytes<T>(data: impl Into<Bytes>) -> RequestOption<T> {
    RequestOption::body(Ok(BodySource::Buffered(data.into())), None)
}

/// Use the given text as the body content and set the content type to
/// `text/plain`.
pub fn with_text<T>(data: impl Into<String>) -> RequestOption<T> {
    RequestOption::body(
        Ok(BodySource::Buffered(Bytes::from(data.into()))),
        Some(HeaderValue::from_static("text/plain")),
    )
}

/// Encode the given value as JSON for the body content and set the content
/// type to `application/json`.
pub fn with_json<T, B>(data: &B) -> RequestOption<T>
where
    B: Serialize + ?Sized,
{
    let encoded = serde_json::to_vec(data)
        .map(|bytes| BodySource::Buffered(Bytes::from(bytes)))
        .map_err(|e| Error::EncodeBody(e.to_string()));
    RequestOption::body(encoded, Some(HeaderValue::from_static("application/json")))
}

/// Encode the given value as XML for the body content and set the content
/// type to `application/xml`.
pub fn with_xml<T, B>(data: &B) -> RequestOption<T>
where
    B: Serialize + ?Sized,
{
    let encoded = quick_xml::se::to_string(data)
        .map(|text| BodySource::Buffered(Bytes::from(text)))
        .map_err(|e| Error::EncodeBody(e.to_string()));
    RequestOption::body(encoded, Some(HeaderValue::from_static("application/xml")))
}

/// Stream the given reader as the body content. The body is one-shot and
/// therefore cannot be combined with a rate-limit cooldown.
pub fn with_body_reader<T, R>(reader: R) -> RequestOption<T>
where
    R: AsyncRead + Send + 'static,
{
    let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
    RequestOption::body(Ok(BodySource::Streaming(Some(body))), None)
}

/// Add a hook that runs on the built request right before each dispatch.
/// Hooks run in registration order; the first failure aborts the call.
pub fn before_send<T, F>(hook: F) -> RequestOption<T>
where
    F: Fn(&mut reqwest::Request) -> Result<()> + Send + Sync + 'static,
{
    RequestOption::from_kind(Kind::BeforeSend(Box::new(hook)))
}

/// Add a hook that runs on every received response before classification.
/// Hooks run in registration order; the first failure aborts the attempt.
pub fn after_receive<T, F>(hook: F) -> RequestOption<T>
where
    F: Fn(&reqwest::Response) -> Result<()> + Send + Sync + 'static,
{
    RequestOption::from_kind(Kind::AfterReceive(Box::new(hook)))
}
