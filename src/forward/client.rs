//! Authenticated forwarding client.
//!
//! Wraps any [`Transport`] and decorates every outbound request, in order:
//!
//! ```text
//! request
//!     → method guard (reject non-GET, synthesize 405, stop)
//!     → replay carried query parameters (append)
//!     → replay carried headers (append)
//!     → set Authorization: Bearer <token> (replace)
//!     → inner transport
//! ```

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use thiserror::Error;

use crate::forward::carrier::{ForwardContext, QueryParams};
use crate::forward::token::{validate_token, TokenError};
use crate::forward::transport::{Transport, TransportError};

/// Errors raised while building a [`ForwardingClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// An option slot was empty.
    #[error("client option #{index} is missing")]
    NilOption { index: usize },

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Draft configuration that options mutate during construction.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    authorization: Option<HeaderValue>,
    reject_non_get: bool,
}

impl ClientSettings {
    pub fn has_token(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn reject_non_get(&self) -> bool {
        self.reject_non_get
    }
}

/// A single construction step over [`ClientSettings`].
pub type ClientOption = Box<dyn FnOnce(&mut ClientSettings) -> Result<(), ClientError> + Send>;

/// Validate `raw` and install it as the bearer credential.
pub fn with_token(raw: impl Into<String>) -> ClientOption {
    let raw = raw.into();
    Box::new(move |settings| {
        let token = validate_token(&raw)?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TokenError::InvalidToken)?;
        value.set_sensitive(true);
        settings.authorization = Some(value);
        Ok(())
    })
}

/// Reject every request that is not a safe method instead of forwarding it.
pub fn with_get() -> ClientOption {
    Box::new(|settings| {
        settings.reject_non_get = true;
        Ok(())
    })
}

/// Request metadata attached to responses synthesized by the method guard.
#[derive(Debug, Clone)]
pub struct RejectedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Transport decorator injecting auth and carried request context.
///
/// Settings are fixed at construction, so one client can be shared by all
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct ForwardingClient<T> {
    inner: T,
    settings: ClientSettings,
}

impl<T: Transport> ForwardingClient<T> {
    /// Apply `options` in order to a default draft and wrap `inner`.
    ///
    /// Fails on the first missing option or the first option that rejects
    /// its value; nothing is constructed in that case.
    pub fn build<I>(inner: T, options: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = Option<ClientOption>>,
    {
        let mut settings = ClientSettings::default();
        for (index, option) in options.into_iter().enumerate() {
            let option = option.ok_or(ClientError::NilOption { index })?;
            option(&mut settings)?;
        }
        Ok(Self { inner, settings })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Apply carried context and credentials to `request`.
    fn decorate(
        &self,
        ctx: &ForwardContext,
        request: &mut Request<Bytes>,
    ) -> Result<(), TransportError> {
        if let Some(params) = ctx.params() {
            *request.uri_mut() = append_query(request.uri(), params)?;
        }

        if let Some(carried) = ctx.headers() {
            let headers = request.headers_mut();
            for (name, value) in carried {
                headers.append(name.clone(), value.clone());
            }
        }

        if let Some(authorization) = &self.settings.authorization {
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, authorization.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for ForwardingClient<T> {
    async fn send(
        &self,
        ctx: &ForwardContext,
        mut request: Request<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        if self.settings.reject_non_get && !request.method().is_safe() {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "Rejected non-GET upstream request"
            );
            return Ok(method_not_allowed(&request));
        }

        if let Err(e) = self.decorate(ctx, &mut request) {
            tracing::warn!(uri = %request.uri(), error = %e, "Failed to apply carried parameters");
            return Err(e);
        }

        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            headers = ?request.headers().keys().collect::<Vec<_>>(),
            "Forwarded request"
        );

        self.inner.send(ctx, request).await
    }
}

/// Build the response returned in place of a rejected request.
fn method_not_allowed(request: &Request<Bytes>) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
    response.extensions_mut().insert(RejectedRequest {
        method: request.method().clone(),
        uri: request.uri().clone(),
        headers: request.headers().clone(),
    });
    response
}

/// Return `uri` with every carried parameter appended to its query string.
fn append_query(uri: &Uri, params: &QueryParams) -> Result<Uri, TransportError> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Some(existing) = uri.query() {
        serializer.extend_pairs(url::form_urlencoded::parse(existing.as_bytes()));
    }
    serializer.extend_pairs(params.pairs());
    let query = serializer.finish();

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        format!("{}?{}", uri.path(), query)
            .parse()
            .map_err(|e| TransportError::InvalidRequest(format!("{e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::http::HeaderName;

    const VALID_TOKEN: &str = "Any Regular ASCII string";

    /// Records the last request it was given and answers 200.
    #[derive(Default)]
    struct RecordingTransport {
        last: Mutex<Option<(Method, Uri, HeaderMap)>>,
    }

    impl RecordingTransport {
        fn last(&self) -> Option<(Method, Uri, HeaderMap)> {
            self.last.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            _ctx: &ForwardContext,
            request: Request<Bytes>,
        ) -> Result<Response<Bytes>, TransportError> {
            *self.last.lock().unwrap() = Some((
                request.method().clone(),
                request.uri().clone(),
                request.headers().clone(),
            ));
            Ok(Response::new(Bytes::from_static(b"ok")))
        }
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::get(uri).body(Bytes::new()).unwrap()
    }

    fn post(uri: &str) -> Request<Bytes> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"query=up"))
            .unwrap()
    }

    fn build(options: Vec<Option<ClientOption>>) -> ForwardingClient<Arc<RecordingTransport>> {
        ForwardingClient::build(Arc::new(RecordingTransport::default()), options).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_header_injected() {
        for raw in [VALID_TOKEN.to_string(), format!("   {VALID_TOKEN}  ")] {
            let client = build(vec![Some(with_token(raw))]);
            client.send(&ForwardContext::new(), get("/test")).await.unwrap();

            let (_, _, headers) = client.inner().last().unwrap();
            assert_eq!(headers[header::AUTHORIZATION], format!("Bearer {VALID_TOKEN}").as_str());
        }
    }

    #[tokio::test]
    async fn test_bearer_replaces_existing_authorization() {
        let client = build(vec![Some(with_token(VALID_TOKEN))]);
        let mut request = get("/test");
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        client.send(&ForwardContext::new(), request).await.unwrap();

        let (_, _, headers) = client.inner().last().unwrap();
        let values: Vec<_> = headers.get_all(header::AUTHORIZATION).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], format!("Bearer {VALID_TOKEN}").as_str());
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        for raw in ["", "   ", "bearer must be ascii: áéíóú"] {
            let result = ForwardingClient::build(RecordingTransport::default(), [Some(with_token(raw))]);
            assert!(matches!(result, Err(ClientError::Token(TokenError::InvalidToken))));
        }
    }

    #[test]
    fn test_nil_option() {
        let result = ForwardingClient::build(
            RecordingTransport::default(),
            [Some(with_get()), None, Some(with_token(VALID_TOKEN))],
        );
        assert!(matches!(result, Err(ClientError::NilOption { index: 1 })));
    }

    #[tokio::test]
    async fn test_regular_client_forwards_post() {
        let client = build(vec![]);
        let response = client.send(&ForwardContext::new(), post("/test")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let (method, _, _) = client.inner().last().unwrap();
        assert_eq!(method, Method::POST);
    }

    #[tokio::test]
    async fn test_with_get_rejects_post() {
        let client = build(vec![Some(with_get()), Some(with_token(VALID_TOKEN))]);
        let params: QueryParams = [("env", "prod")].into_iter().collect();
        let ctx = ForwardContext::new().with_params(params);

        let response = client.send(&ctx, post("/test")).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.body().is_empty());
        assert!(response.headers().is_empty());
        let rejected = response.extensions().get::<RejectedRequest>().unwrap();
        assert_eq!(rejected.method, Method::POST);
        // Nothing was applied before the guard
        assert_eq!(rejected.uri, "/test");
        assert!(!rejected.headers.contains_key(header::AUTHORIZATION));
        assert!(client.inner().last().is_none());
    }

    #[tokio::test]
    async fn test_with_get_allows_get() {
        let client = build(vec![Some(with_get())]);
        let response = client.send(&ForwardContext::new(), get("/test")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(client.inner().last().is_some());
    }

    #[tokio::test]
    async fn test_params_replayed_additively() {
        let client = build(vec![]);
        let params = QueryParams::parse("key1=val1&key2=val2&query=extra");
        let ctx = ForwardContext::new().with_params(params);

        client.send(&ctx, get("/api/v1/query?query=up")).await.unwrap();

        let (_, uri, _) = client.inner().last().unwrap();
        let sent = QueryParams::parse(uri.query().unwrap());
        assert_eq!(sent.get_all("query"), ["up", "extra"]);
        assert_eq!(sent.get_all("key1"), ["val1"]);
        assert_eq!(sent.get_all("key2"), ["val2"]);
        assert_eq!(uri.path(), "/api/v1/query");
    }

    #[tokio::test]
    async fn test_unreplayable_params_fail_the_request() {
        let client = build(vec![]);
        let ctx = ForwardContext::new().with_params(QueryParams::parse("env=prod"));

        // Authority-form URIs cannot carry a query string
        let result = client.send(&ctx, get("thanos:9090")).await;

        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
        assert!(client.inner().last().is_none());
    }

    #[tokio::test]
    async fn test_no_params_leaves_query_untouched() {
        let client = build(vec![]);
        client
            .send(&ForwardContext::new(), get("/api/v1/query?query=up"))
            .await
            .unwrap();

        let (_, uri, _) = client.inner().last().unwrap();
        assert_eq!(uri, "/api/v1/query?query=up");
    }

    #[tokio::test]
    async fn test_headers_replayed_additively() {
        let client = build(vec![]);
        let mut source = HeaderMap::new();
        source.insert("x-scope-orgid", HeaderValue::from_static("tenant-a"));
        let ctx = ForwardContext::new()
            .with_headers(&[HeaderName::from_static("x-scope-orgid")], &source);

        let mut request = get("/test");
        request
            .headers_mut()
            .insert("x-scope-orgid", HeaderValue::from_static("existing"));
        client.send(&ctx, request).await.unwrap();

        let (_, _, headers) = client.inner().last().unwrap();
        let values: Vec<_> = headers.get_all("x-scope-orgid").iter().collect();
        assert_eq!(values, ["existing", "tenant-a"]);
    }
}
