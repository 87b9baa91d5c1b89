//! URL assembly from path segments and pre-encoded query fragments.

use serde::Serialize;

use crate::error::{Error, Result};

/// Assembles path segments and query fragments into one URL string.
///
/// Segments are trimmed of leading/trailing `/` before storage and joined
/// with exactly one separator; query fragments are joined with `&` behind a
/// single `?`. Path segments are not percent-escaped by this builder; the
/// caller is responsible for URL-safety of raw path content. Query values are
/// escaped by the structured encoder.
#[derive(Clone, Debug, Default)]
pub struct UrlBuilder {
    length: usize,
    paths: Vec<String>,
    queries: Vec<String>,
}

impl UrlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append path segments, each trimmed of `/` on both ends. An empty
    /// segment is kept and contributes a lone separator.
    pub fn append_paths<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let trimmed = path.as_ref().trim_matches('/').to_owned();
            self.length += 1 + trimmed.len();
            self.paths.push(trimmed);
        }
    }

    /// Encode one record-like value as a query fragment and append it.
    ///
    /// List-valued fields become repeated keys. Values that cannot be
    /// converted into key/value pairs (e.g. a bare integer) are an error.
    pub fn append_query<Q>(&mut self, query: &Q) -> Result<()>
    where
        Q: Serialize + ?Sized,
    {
        let encoded =
            serde_html_form::to_string(query).map_err(|e| Error::EncodeQuery(e.to_string()))?;
        self.append_raw_query(encoded);
        Ok(())
    }

    /// Append an already-encoded query fragment verbatim.
    pub(crate) fn append_raw_query(&mut self, query: String) {
        self.length += 1 + query.len();
        self.queries.push(query);
    }

    /// Build the absolute URL: base stripped of trailing `/`, then
    /// `/segment` per stored path in append order, then `?` and the
    /// `&`-joined query fragments, if any.
    pub fn build(&self, base: &str) -> String {
        let base = base.trim_end_matches('/');

        let mut url = String::with_capacity(base.len() + self.length);
        url.push_str(base);

        for path in &self.paths {
            url.push('/');
            url.push_str(path);
        }

        if self.queries.is_empty() {
            return url;
        }

        url.push('?');
        url.push_str(&self.queries[0]);

        for query in &self.queries[1..] {
            url.push('&');
            url.push_str(query);
        }

        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Filter {
        first: String,
        second: Vec<String>,
    }

    #[test]
    fn empty_builder_returns_base_as_is() {
        let builder = UrlBuilder::new();
        assert_eq!(builder.build(""), "");
        assert_eq!(builder.build("https://www.example.com"), "https://www.example.com");
    }

    #[test]
    fn trailing_separators_are_stripped_from_base() {
        let builder = UrlBuilder::new();
        assert_eq!(builder.build("https://www.example.com/"), "https://www.example.com");
    }

    #[test]
    fn single_path_is_joined_with_one_separator() {
        let mut builder = UrlBuilder::new();
        builder.append_paths(["one"]);
        assert_eq!(builder.build("https://www.example.com"), "https://www.example.com/one");
    }

    #[test]
    fn path_separators_are_trimmed_before_joining() {
        let mut builder = UrlBuilder::new();
        builder.append_paths(["/one/"]);
        assert_eq!(builder.build("https://www.example.com"), "https://www.example.com/one");
    }

    #[test]
    fn multiple_paths_keep_append_order() {
        let mut builder = UrlBuilder::new();
        builder.append_paths(["/one", "two/", "/three/four"]);
        assert_eq!(
            builder.build("https://www.example.com"),
            "https://www.example.com/one/two/three/four"
        );
    }

    #[test]
    fn empty_segment_contributes_a_lone_separator() {
        let mut builder = UrlBuilder::new();
        builder.append_paths(["one", "", "two"]);
        assert_eq!(
            builder.build("https://www.example.com"),
            "https://www.example.com/one//two"
        );
    }

    #[test]
    fn structured_query_is_encoded_with_repeated_keys_for_lists() {
        let filter = Filter {
            first: "1".into(),
            second: vec!["2".into(), "3".into(), "4".into(), "5".into()],
        };

        let mut builder = UrlBuilder::new();
        builder.append_query(&filter).unwrap();
        assert_eq!(
            builder.build("https://www.example.com"),
            "https://www.example.com?first=1&second=2&second=3&second=4&second=5"
        );
    }

    #[test]
    fn non_record_query_value_is_an_error() {
        let mut builder = UrlBuilder::new();
        let err = builder.append_query(&42).unwrap_err();
        assert!(matches!(err, Error::EncodeQuery(_)));
    }

    #[test]
    fn query_fragments_preserve_append_order_with_single_ampersands() {
        #[derive(Serialize)]
        struct Page {
            page: u32,
        }

        let mut builder = UrlBuilder::new();
        builder.append_query(&Filter { first: "1".into(), second: vec![] }).unwrap();
        builder.append_query(&Page { page: 2 }).unwrap();
        builder.append_query(&Page { page: 3 }).unwrap();

        let url = builder.build("https://www.example.com");
        assert_eq!(url, "https://www.example.com?first=1&page=2&page=3");
        assert_eq!(url.matches('&').count(), 2);
        assert_eq!(url.matches('?').count(), 1);
    }

    #[test]
    fn paths_and_query_combine() {
        let filter = Filter {
            first: "1".into(),
            second: vec!["2".into()],
        };

        let mut builder = UrlBuilder::new();
        builder.append_query(&filter).unwrap();
        builder.append_paths(["/one/two/three/four/"]);
        assert_eq!(
            builder.build("https://www.example.com"),
            "https://www.example.com/one/two/three/four?first=1&second=2"
        );
    }
}
