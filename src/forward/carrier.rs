//! Request-scoped state carried from the federation handler to the
//! forwarding client.
//!
//! # Responsibilities
//! - Hold the passthrough query parameters of one incoming request
//! - Hold the allow-listed headers of one incoming request
//! - Derive new contexts instead of mutating existing ones
//!
//! # Design Decisions
//! - Passed explicitly down the call chain; there is no ambient lookup
//! - Bags are behind `Arc` so deriving a context is a pointer copy
//! - Parameters and headers live in separate slots and cannot shadow each other

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName};

/// Ordered multi-map of query parameter names to their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(raw: &str) -> Self {
        let mut params = Self::new();
        for (name, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            params.add(name.into_owned(), value.into_owned());
        }
        params
    }

    /// Append a value under `name`, keeping any values already present.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove `name` and return its values.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        self.0.remove(name).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(name, value)` pairs, names sorted, values in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Encode as an `application/x-www-form-urlencoded` string.
    pub fn encode(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.pairs() {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.add(name, value);
        }
        params
    }
}

/// Per-request context handed to every backend call.
///
/// Immutable once built: `with_params` and `with_headers` consume the
/// context and return a derived one. A fresh context is created for every
/// incoming request, so nothing carried here outlives that request.
#[derive(Debug, Clone, Default)]
pub struct ForwardContext {
    params: Option<Arc<QueryParams>>,
    headers: Option<Arc<HeaderMap>>,
}

impl ForwardContext {
    /// An empty context carrying nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context carrying `params`. Empty parameters leave the context as is.
    pub fn with_params(self, params: QueryParams) -> Self {
        if params.is_empty() {
            return self;
        }
        Self {
            params: Some(Arc::new(params)),
            ..self
        }
    }

    /// Carried parameters, if any were attached.
    pub fn params(&self) -> Option<&QueryParams> {
        self.params.as_deref()
    }

    /// Derive a context carrying the values of `allow_list` headers found in `source`.
    ///
    /// Names with no values in `source` are skipped. An empty allow-list
    /// leaves the context as is.
    pub fn with_headers(self, allow_list: &[HeaderName], source: &HeaderMap) -> Self {
        if allow_list.is_empty() {
            return self;
        }
        let mut carried = HeaderMap::new();
        for name in allow_list {
            for value in source.get_all(name) {
                carried.append(name.clone(), value.clone());
            }
        }
        Self {
            headers: Some(Arc::new(carried)),
            ..self
        }
    }

    /// Carried headers, if any were attached.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_deref()
    }
}
