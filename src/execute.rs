//! The request/response execution engine.
//!
//! One call is strictly sequential: assemble and validate the configuration,
//! materialize the URL once, then loop attempts. Each attempt builds the
//! native request, runs the pre-send hooks, dispatches through the transport
//! (raced against cancellation), runs the post-receive hooks, and classifies
//! the response. The only non-terminal outcome is the rate-limit retry
//! transition, taken when the rate-limited classifier matches and the
//! cooldown succeeds. The loop has no attempt cap by construction; bounding
//! it is the cooldown's (and the caller's) responsibility.

use reqwest::{Method, Url};
use tracing::debug;

use crate::cancel::CancelHandle;
use crate::error::{Error, Result};
use crate::handler::{Producer, RateLimitSignal};
use crate::options::{RequestOption, RequestParams};

/// Outcome of handling one attempt's response.
enum Disposition<T> {
    Done(T),
    Retry,
}

/// Send an HTTP request with the given method, base URL, and options, and
/// classify the response.
///
/// Options are applied in order; see the `with_*` constructors,
/// [`on_success`](crate::on_success), [`on_error`](crate::on_error), and
/// [`on_rate_limit`](crate::on_rate_limit). The success type `T` is produced
/// by the success classifier; register `on_success(..).ignore()` and call
/// `execute::<()>` when the body does not matter.
pub async fn execute<T>(
    method: Method,
    base_url: &str,
    options: Vec<RequestOption<T>>,
) -> Result<T> {
    let mut params = RequestParams::assemble(options)?;

    let target = params.url.build(base_url);
    let url = Url::parse(&target).map_err(|e| Error::InvalidUrl(format!("{target}: {e}")))?;
    let cancel = params.cancel_handle();

    let mut attempt: u32 = 1;
    loop {
        let mut request = reqwest::Request::new(method.clone(), url.clone());
        // Headers were canonicalized at configuration time; raw insertion.
        *request.headers_mut() = params.headers.clone();
        *request.body_mut() = params.take_attempt_body()?;

        for hook in &params.chain.before_send {
            hook(&mut request)?;
        }

        debug!(target: "dimsum::http", %method, %url, attempt, "sending request");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = params.dispatch(request) => sent?,
        };

        debug!(
            target: "dimsum::http",
            status = response.status().as_u16(),
            "received response"
        );

        match handle(&params, &cancel, response).await? {
            Disposition::Done(value) => return Ok(value),
            Disposition::Retry => {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                attempt += 1;
            }
        }
    }
}

/// Run the post-receive hooks and classify one response.
///
/// The response is consumed or dropped exactly once on every exit path:
/// reading the body consumes it, and every other path drops it on return.
async fn handle<T>(
    params: &RequestParams<T>,
    cancel: &CancelHandle,
    response: reqwest::Response,
) -> Result<Disposition<T>> {
    for hook in &params.chain.after_receive {
        hook(&response)?;
    }

    let status = response.status();

    if let Some(success) = &params.chain.success {
        if success.statuses.contains(&status.as_u16()) {
            let body = response.bytes().await?;
            debug!(target: "dimsum::http", status = status.as_u16(), "classified as success");
            return (success.extract)(&body).map(Disposition::Done);
        }
    }

    for failure in &params.chain.failures {
        if !failure.statuses.contains(&status.as_u16()) {
            continue;
        }

        match &failure.producer {
            Producer::RateLimited => {
                let Some(cooldown) = &params.chain.cooldown else {
                    return Err(Error::RateLimited { status });
                };

                let headers = response.headers().clone();
                let body = response.bytes().await?;
                let signal = RateLimitSignal::new(status, headers, body);
                debug!(
                    target: "dimsum::http",
                    status = status.as_u16(),
                    "rate limited, running cooldown before retry"
                );
                cooldown(cancel.clone(), signal).await?;
                return Ok(Disposition::Retry);
            }
            Producer::Decode(decode) => {
                let body = response.bytes().await?;
                return Err(decode(&body));
            }
        }
    }

    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Err(Error::UnhandledResponse {
        status,
        headers,
        body,
    })
}

/// Shortcut for [`execute`] with the `GET` method.
pub async fn get<T>(url: &str, options: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::GET, url, options).await
}

/// Shortcut for [`execute`] with the `POST` method.
pub async fn post<T>(url: &str, options: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::POST, url, options).await
}

/// Shortcut for [`execute`] with the `PUT` method.
pub async fn put<T>(url: &str, options: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::PUT, url, options).await
}

/// Shortcut for [`execute`] with the `DELETE` method.
pub async fn delete<T>(url: &str, options: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::DELETE, url, options).await
}

/// Shortcut for [`execute`] with the `OPTIONS` method.
pub async fn options<T>(url: &str, opts: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::OPTIONS, url, opts).await
}

/// Shortcut for [`execute`] with the `PATCH` method.
pub async fn patch<T>(url: &str, options: Vec<RequestOption<T>>) -> Result<T> {
    execute(Method::PATCH, url, options).await
}
