//! Local dispatcher
//!
//! Replays a relayed request against `http://localhost:<port>` and
//! captures status, headers and the full body.
//!
//! Only the first value of each inbound header is forwarded. `Host` and
//! `Content-Length` are left to the HTTP client, which derives them from
//! the URL and the body.

use crate::protocol::{canonical_header_key, Headers, Message, Response};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use reqwest::{Client, Method, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Local call errors
#[derive(Debug, Error)]
pub enum LocalCallError {
    /// The request could not be constructed (bad method, path or header)
    #[error("Could not build local request: {0}")]
    Build(String),

    /// The local server could not be reached or did not answer in time
    #[error("Local server unreachable: {0}")]
    Network(#[source] reqwest::Error),

    /// The response body was truncated
    #[error("Error reading local response body: {0}")]
    BodyRead(#[source] reqwest::Error),
}

/// Issues relayed requests against the local server
#[derive(Debug, Clone)]
pub struct LocalDispatcher {
    client: Client,
    port: u16,
}

impl LocalDispatcher {
    /// Create a dispatcher for `localhost:<port>` with a whole-call timeout
    pub fn new(port: u16, timeout: Duration) -> Result<Self, LocalCallError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| LocalCallError::Build(e.to_string()))?;

        Ok(Self { client, port })
    }

    /// Replay a relayed message
    pub async fn forward(&self, message: &Message) -> Result<Response, LocalCallError> {
        self.dispatch(
            &message.method,
            &message.path,
            &message.headers,
            message.body.clone(),
        )
        .await
    }

    /// Issue `method path` against the local server
    pub async fn dispatch(
        &self,
        method: &str,
        path: &str,
        headers: &Headers,
        body: Bytes,
    ) -> Result<Response, LocalCallError> {
        // Empty method defaults to GET
        let method = if method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| LocalCallError::Build(format!("invalid method {:?}", method)))?
        };

        let url = self.local_url(path)?;

        let request = self
            .client
            .request(method, url)
            .headers(first_values(headers)?)
            .body(body)
            .build()
            .map_err(|e| LocalCallError::Build(e.to_string()))?;

        debug!(method = %request.method(), url = %request.url(), "Calling local server");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(LocalCallError::Network)?;

        let status_code = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers
                .entry(canonical_header_key(name.as_str()))
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let body = response.bytes().await.map_err(LocalCallError::BodyRead)?;

        Ok(Response {
            status_code,
            headers,
            body,
        })
    }

    /// `http://localhost:<port><path>`, refusing paths that would move the authority
    fn local_url(&self, path: &str) -> Result<Url, LocalCallError> {
        if !path.starts_with('/') {
            return Err(LocalCallError::Build(format!(
                "path {:?} does not start with '/'",
                path
            )));
        }

        let url = Url::parse(&format!("http://localhost:{}{}", self.port, path))
            .map_err(|e| LocalCallError::Build(format!("invalid path {:?}: {}", path, e)))?;

        if url.host_str() != Some("localhost")
            || url.port_or_known_default() != Some(self.port)
            || !url.username().is_empty()
        {
            return Err(LocalCallError::Build(format!(
                "path {:?} leaves localhost:{}",
                path, self.port
            )));
        }

        Ok(url)
    }
}

/// Narrow multi-valued headers to their first value
fn first_values(headers: &Headers) -> Result<HeaderMap, LocalCallError> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (name, values) in headers {
        let Some(first) = values.first() else {
            continue;
        };

        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| LocalCallError::Build(format!("invalid header name {:?}", name)))?;
        if name == HOST || name == CONTENT_LENGTH {
            continue;
        }

        let value = HeaderValue::from_str(first)
            .map_err(|_| LocalCallError::Build(format!("invalid value for header {}", name)))?;
        map.append(name, value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes as AxumBytes;
    use axum::http::{header::SET_COOKIE, HeaderMap as AxumHeaders, Method as AxumMethod, StatusCode, Uri};
    use axum::response::{AppendHeaders, IntoResponse};
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn echo(method: AxumMethod, uri: Uri, body: AxumBytes) -> String {
        format!("{} {} {}", method, uri.path(), String::from_utf8_lossy(&body))
    }

    async fn header_echo(headers: AxumHeaders) -> String {
        headers
            .get_all("x-multi")
            .iter()
            .map(|v| v.to_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn cookies() -> impl IntoResponse {
        (
            StatusCode::CREATED,
            AppendHeaders([(SET_COOKIE, "a=1"), (SET_COOKIE, "b=2")]),
            "made",
        )
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(2)).await;
        "too late"
    }

    async fn local_server() -> u16 {
        let app = Router::new()
            .route("/headers", get(header_echo))
            .route("/cookies", get(cookies))
            .route("/slow", get(slow))
            .fallback(echo);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_dispatch_echo() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(10)).unwrap();

        let response = dispatcher
            .dispatch("GET", "/foo", &Headers::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(&response.body[..], b"GET /foo ");
    }

    #[tokio::test]
    async fn test_dispatch_with_body() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(10)).unwrap();

        let message = Message {
            method: "POST".to_string(),
            path: "/submit?x=1".to_string(),
            body: Bytes::from_static(b"payload"),
            ..Default::default()
        };
        let response = dispatcher.forward(&message).await.unwrap();

        assert_eq!(&response.body[..], b"POST /submit payload");
    }

    #[tokio::test]
    async fn test_only_first_header_value_is_forwarded() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(10)).unwrap();

        let mut headers = Headers::new();
        headers.insert(
            "X-Multi".to_string(),
            vec!["first".to_string(), "second".to_string()],
        );
        headers.insert("X-Nothing".to_string(), Vec::new());
        headers.insert("Host".to_string(), vec!["public.example".to_string()]);

        let response = dispatcher
            .dispatch("GET", "/headers", &headers, Bytes::new())
            .await
            .unwrap();

        assert_eq!(&response.body[..], b"first");
    }

    #[tokio::test]
    async fn test_response_headers_keep_all_values() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(10)).unwrap();

        let response = dispatcher
            .dispatch("GET", "/cookies", &Headers::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.status_code, 201);
        assert_eq!(response.headers["Set-Cookie"], vec!["a=1", "b=2"]);
        assert!(response.headers.contains_key("Content-Type"));
    }

    #[tokio::test]
    async fn test_build_errors() {
        let dispatcher = LocalDispatcher::new(1, Duration::from_secs(1)).unwrap();

        let err = dispatcher
            .dispatch("BAD METHOD", "/", &Headers::new(), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LocalCallError::Build(_)));

        let mut headers = Headers::new();
        headers.insert("bad name".to_string(), vec!["v".to_string()]);
        let err = dispatcher
            .dispatch("GET", "/", &headers, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LocalCallError::Build(_)));
    }

    #[tokio::test]
    async fn test_path_cannot_change_authority() {
        let other_port = local_server().await;
        let dispatcher = LocalDispatcher::new(8888, Duration::from_secs(2)).unwrap();

        for path in [
            format!("@127.0.0.1:{}/x", other_port),
            format!(".evil.example:{}/x", other_port),
            "x".to_string(),
            String::new(),
        ] {
            let err = dispatcher
                .dispatch("GET", &path, &Headers::new(), Bytes::new())
                .await
                .unwrap_err();
            assert!(matches!(err, LocalCallError::Build(_)), "path {:?}", path);
        }
    }

    #[test]
    fn test_local_url_stays_on_localhost() {
        let dispatcher = LocalDispatcher::new(3000, Duration::from_secs(1)).unwrap();

        let url = dispatcher.local_url("//elsewhere.example/a?b=1").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(3000));
        assert_eq!(url.path(), "//elsewhere.example/a");
        assert_eq!(url.query(), Some("b=1"));
    }

    #[tokio::test]
    async fn test_empty_method_is_get() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(10)).unwrap();

        let response = dispatcher
            .dispatch("", "/plain", &Headers::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(&response.body[..], b"GET /plain ");
    }

    /// Server announcing a 100 byte body and hanging up after 5
    async fn truncating_server() -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_truncated_body_is_body_read_error() {
        let port = truncating_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(5)).unwrap();

        let err = dispatcher
            .dispatch("GET", "/", &Headers::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LocalCallError::BodyRead(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dispatcher = LocalDispatcher::new(port, Duration::from_secs(2)).unwrap();
        let err = dispatcher
            .dispatch("GET", "/", &Headers::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LocalCallError::Network(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let port = local_server().await;
        let dispatcher = LocalDispatcher::new(port, Duration::from_millis(200)).unwrap();

        let err = dispatcher
            .dispatch("GET", "/slow", &Headers::new(), Bytes::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LocalCallError::Network(_)));
    }
}
