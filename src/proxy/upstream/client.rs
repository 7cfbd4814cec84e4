// Backend HTTP client: URL building, bearer injection, per-request timeout.

use reqwest::{header, Client, Method, Response};
use serde_json::Value;
use std::time::Duration;

use crate::error::ProxyError;

#[derive(Debug)]
pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        let http_client = Client::builder()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    /// Build `{base}/api/{path}/` with an optional query string.
    fn api_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(qs) if !qs.is_empty() => format!("{}/api/{}/?{}", self.base_url, path, qs),
            _ => format!("{}/api/{}/", self.base_url, path),
        }
    }

    /// POST a JSON body to an absolute backend path without a bearer token.
    /// Used by the auth endpoints (login, token refresh).
    pub async fn post_json_unauthenticated(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Response, reqwest::Error> {
        self.http_client
            .post(format!("{}{}", self.base_url, path))
            .timeout(self.request_timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
    }

    /// Forward a JSON request to `{base}/api/{path}/?{query}`. A timed-out
    /// call surfaces as `GatewayTimeout`, distinct from other failures.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &str,
        access_token: &str,
        body: Option<&Value>,
    ) -> Result<Response, ProxyError> {
        let url = self.api_url(path, Some(query));

        let mut request = self
            .http_client
            .request(method, url)
            .timeout(self.request_timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(access_token);

        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Forward a rebuilt multipart form to `{base}/api/{path}/`. No explicit
    /// content-type header: reqwest derives it so the boundary is correct.
    pub async fn send_multipart(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Response, ProxyError> {
        Ok(self
            .http_client
            .request(method, self.api_url(path, None))
            .timeout(self.request_timeout)
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = UpstreamClient::new("https://backend.example.com", Duration::from_secs(30));

        assert_eq!(
            client.api_url("users", Some("page=1&page_size=25")),
            "https://backend.example.com/api/users/?page=1&page_size=25"
        );
        assert_eq!(
            client.api_url("projects/7/members", None),
            "https://backend.example.com/api/projects/7/members/"
        );
        assert_eq!(
            client.api_url("users", Some("")),
            "https://backend.example.com/api/users/"
        );
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base() {
        let client = UpstreamClient::new("https://backend.example.com/", Duration::from_secs(30));
        assert_eq!(
            client.api_url("users", None),
            "https://backend.example.com/api/users/"
        );
    }

    #[tokio::test]
    async fn test_send_json_injects_bearer_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/users/")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[]}"#)
            .create_async()
            .await;

        let client = UpstreamClient::new(server.url(), Duration::from_secs(5));
        let response = client
            .send_json(Method::GET, "users", "page=1", "token-123", None)
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_gateway_timeout() {
        // A listener that accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _socket = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = UpstreamClient::new(format!("http://{}", addr), Duration::from_millis(200));
        let err = client
            .send_json(Method::GET, "users", "page=1", "tok", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::GatewayTimeout));
        server.abort();
    }
}
