//! Multipart/form-data body composition.
//!
//! The builder is fluent: every operation returns the builder, and errors
//! are recorded rather than raised so composition can continue. A section
//! that fails to read is recorded but does not stop later sections from
//! being attempted; finalization surfaces the union of all recorded errors,
//! and produces no content if any occurred.

use std::path::Path;

use bytes::Bytes;
use reqwest::header::HeaderValue;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::options::{BodySource, RequestOption};

/// Builder for a multipart/form-data request body.
///
/// Sections appear in insertion order; duplicate names produce duplicate
/// sections. Content sources are consumed and dropped immediately after
/// being fully read, whether the read succeeded or not.
pub struct MultipartForm {
    boundary: String,
    buf: Vec<u8>,
    has_sections: bool,
    errors: Vec<Error>,
}

impl MultipartForm {
    /// Create an empty form with a random boundary.
    pub fn new() -> Self {
        Self {
            boundary: uuid::Uuid::new_v4().simple().to_string(),
            buf: Vec::new(),
            has_sections: false,
            errors: Vec::new(),
        }
    }

    /// The multipart boundary used by this form.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Add a plain field section with the given name and string content.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.begin_section();
        let header = format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            escape_quotes(name)
        );
        self.buf.extend_from_slice(header.as_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Add a file section read from the given path. The filename is the
    /// path's final component and the content type is inferred from it.
    pub async fn file(mut self, name: &str, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match tokio::fs::File::open(path).await {
            Ok(file) => self.reader_as_file(name, file, &filename).await,
            Err(error) => {
                self.errors.push(Error::Io(error));
                self
            }
        }
    }

    /// Add a file section from any reader, as if it were a file with the
    /// given name. The content type is inferred from the filename, falling
    /// back to `application/octet-stream`.
    pub async fn reader_as_file<R>(self, name: &str, content: R, filename: &str) -> Self
    where
        R: AsyncRead + Unpin + Send,
    {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        self.reader_with_content_type(name, content, filename, mime.essence_str())
            .await
    }

    /// Add a file section from any reader with an explicit content type,
    /// bypassing filename-based inference.
    pub async fn reader_with_content_type<R>(
        mut self,
        name: &str,
        mut content: R,
        filename: &str,
        content_type: &str,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send,
    {
        self.begin_section();
        let header = format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            escape_quotes(name),
            escape_quotes(filename),
            content_type
        );
        self.buf.extend_from_slice(header.as_bytes());

        let mut data = Vec::new();
        match content.read_to_end(&mut data).await {
            Ok(_) => self.buf.extend_from_slice(&data),
            Err(error) => self.errors.push(Error::Io(error)),
        }
        drop(content);

        self
    }

    /// Finalize the form into a body option.
    ///
    /// If any errors were recorded during composition, applying the option
    /// fails with [`Error::Multipart`] carrying all of them and no content
    /// is produced. The option is subject to the usual body-conflict check.
    pub fn body<T>(self) -> RequestOption<T> {
        match self.finish() {
            Ok((bytes, content_type)) => {
                RequestOption::body(Ok(BodySource::Buffered(bytes)), Some(content_type))
            }
            Err(error) => RequestOption::body(Err(error), None),
        }
    }

    fn begin_section(&mut self) {
        if self.has_sections {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.has_sections = true;
    }

    fn finish(mut self) -> Result<(Bytes, HeaderValue)> {
        if !self.errors.is_empty() {
            return Err(Error::Multipart(self.errors));
        }

        self.buf.extend_from_slice(b"\r\n--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");

        let content_type =
            HeaderValue::from_str(&format!("multipart/form-data; boundary={}", self.boundary))
                .map_err(|e| Error::InvalidHeader(e.to_string()))?;

        Ok((Bytes::from(self.buf), content_type))
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
