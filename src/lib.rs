//! Composable request options and response classification on top of `reqwest`.
//!
//! A call is assembled from independent configuration fragments — URL
//! pieces, headers, a body source, handlers — applied in order against one
//! request descriptor, then executed. The response is classified into
//! exactly one of three buckets: success, recognized error, or rate-limited,
//! with the rate-limited case retried automatically after a caller-supplied
//! cooldown.
//!
//! ```rust,ignore
//! use dimsum::{get, on_error, on_rate_limit, on_success, with_paths, with_query};
//!
//! let user: User = get(
//!     "https://api.example.com",
//!     vec![
//!         with_paths(["users", "42"]),
//!         with_query(&Filter { verbose: true }),
//!         on_success([200]).json(),
//!         on_error([404]).json::<NotFound, _>(),
//!         on_rate_limit([429]).cooldown(|_cancel, signal| async move {
//!             tokio::time::sleep(signal.retry_after().unwrap_or_default()).await;
//!             Ok(())
//!         }),
//!     ],
//! )
//! .await?;
//! ```
//!
//! The underlying transport is an opaque collaborator: the default is a
//! shared `reqwest` client, replaceable per call with
//! [`with_client`] or a custom [`HttpTransport`].

mod cancel;
mod error;
mod execute;
mod handler;
mod multipart;
mod options;
mod transport;
mod url;

pub use bytes::Bytes;
pub use reqwest::{Method, StatusCode};

pub use cancel::CancelHandle;
pub use error::{Error, Result};
pub use execute::{delete, execute, get, options, patch, post, put};
pub use handler::{
    ErrorRule, RateLimitRule, RateLimitSignal, SuccessRule, cooldown_unless_cancelled, on_error,
    on_rate_limit, on_success,
};
pub use multipart::MultipartForm;
pub use options::{
    RequestOption, after_receive, before_send, with_accept, with_auth, with_basic_auth,
    with_bearer_auth, with_body_reader, with_bytes, with_cancel, with_client, with_content_type,
    with_header, with_header_append, with_json, with_paths, with_query, with_text, with_transport,
    with_xml,
};
pub use transport::HttpTransport;
pub use url::UrlBuilder;
