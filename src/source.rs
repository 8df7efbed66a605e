use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::article::Article;
use crate::config::ApiConfig;

pub const NO_CONNECTIVITY_MESSAGE: &str = "No internet connection.";
pub const API_FALLBACK_MESSAGE: &str = "Failed to fetch news from API.";
pub const TRANSPORT_FALLBACK_MESSAGE: &str = "Failed to fetch news. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("No internet connection.")]
    NoConnectivity,

    /// The API answered, but not with a usable article list
    #[error("{0}")]
    Api(String),

    /// The request never produced a response
    #[error("{0}")]
    Transport(String),
}

impl FeedError {
    pub fn api(message: Option<String>) -> Self {
        match message {
            Some(message) if !message.is_empty() => FeedError::Api(message),
            _ => FeedError::Api(API_FALLBACK_MESSAGE.to_string()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            FeedError::Transport(TRANSPORT_FALLBACK_MESSAGE.to_string())
        } else {
            FeedError::Transport(message)
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::transport(err.to_string())
    }
}

/// Which endpoint a fetch goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlineRequest {
    /// Top stories for the configured region
    Headlines,
    /// Free-text search across all articles
    Search(String),
}

impl HeadlineRequest {
    /// Empty queries select headline mode. Whitespace-only queries do too when
    /// `trim` is set; otherwise they are searched for verbatim.
    pub fn from_query(query: Option<&str>, trim: bool) -> Self {
        let query = match query {
            Some(q) if trim => q.trim(),
            Some(q) => q,
            None => "",
        };

        if query.is_empty() {
            HeadlineRequest::Headlines
        } else {
            HeadlineRequest::Search(query.to_string())
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            HeadlineRequest::Headlines => None,
            HeadlineRequest::Search(q) => Some(q),
        }
    }
}

#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn fetch(&self, request: &HeadlineRequest) -> Result<Vec<Article>, FeedError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    articles: Option<Vec<Article>>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiResponse {
    fn into_articles(self) -> Result<Vec<Article>, FeedError> {
        match (self.status.as_deref(), self.articles) {
            (Some("ok"), Some(articles)) => Ok(articles),
            _ => Err(FeedError::api(self.message)),
        }
    }
}

/// NewsAPI v2 client.
pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    country: String,
}

impl NewsApiClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            country: config.country.clone(),
        })
    }

    fn build_request(&self, request: &HeadlineRequest) -> reqwest::RequestBuilder {
        match request {
            HeadlineRequest::Headlines => self
                .client
                .get(format!("{}/top-headlines", self.base_url))
                .query(&[("country", self.country.as_str()), ("apiKey", self.api_key.as_str())]),
            HeadlineRequest::Search(q) => self
                .client
                .get(format!("{}/everything", self.base_url))
                .query(&[("q", q.as_str()), ("apiKey", self.api_key.as_str())]),
        }
    }

    /// Interpret a response body. NewsAPI reports failures as JSON with a
    /// non-2xx status, so the body is read before the status is considered.
    pub fn parse_body(status: u16, body: &[u8]) -> Result<Vec<Article>, FeedError> {
        match serde_json::from_slice::<ApiResponse>(body) {
            Ok(parsed) => parsed.into_articles(),
            Err(_) if !(200..300).contains(&status) => Err(FeedError::Api(format!(
                "Request failed with status code {}",
                status
            ))),
            Err(_) => Err(FeedError::api(None)),
        }
    }
}

#[async_trait]
impl HeadlineSource for NewsApiClient {
    async fn fetch(&self, request: &HeadlineRequest) -> Result<Vec<Article>, FeedError> {
        match request {
            HeadlineRequest::Headlines => info!("Fetching top headlines for '{}'", self.country),
            HeadlineRequest::Search(q) => info!("Searching articles for '{}'", q),
        }

        let response = self.build_request(request).send().await.map_err(|e| {
            error!("News API request failed: {}", e);
            FeedError::from(e)
        })?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            error!("Failed to read News API response: {}", e);
            FeedError::from(e)
        })?;

        match Self::parse_body(status, &bytes) {
            Ok(articles) => {
                info!("Received {} articles", articles.len());
                Ok(articles)
            }
            Err(e) => {
                warn!("News API returned an error (status {}): {}", status, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod request_tests {
        use super::*;

        #[test]
        fn test_no_query_is_headlines() {
            assert_eq!(
                HeadlineRequest::from_query(None, true),
                HeadlineRequest::Headlines
            );
        }

        #[test]
        fn test_empty_query_is_headlines() {
            assert_eq!(
                HeadlineRequest::from_query(Some(""), false),
                HeadlineRequest::Headlines
            );
        }

        #[test]
        fn test_query_is_search() {
            assert_eq!(
                HeadlineRequest::from_query(Some("rust"), true),
                HeadlineRequest::Search("rust".to_string())
            );
        }

        #[test]
        fn test_whitespace_query_trimmed() {
            assert_eq!(
                HeadlineRequest::from_query(Some("   "), true),
                HeadlineRequest::Headlines
            );
            assert_eq!(
                HeadlineRequest::from_query(Some("  rust "), true),
                HeadlineRequest::Search("rust".to_string())
            );
        }

        #[test]
        fn test_whitespace_query_verbatim() {
            assert_eq!(
                HeadlineRequest::from_query(Some("   "), false),
                HeadlineRequest::Search("   ".to_string())
            );
        }

        #[test]
        fn test_query_accessor() {
            assert_eq!(HeadlineRequest::Headlines.query(), None);
            assert_eq!(
                HeadlineRequest::Search("x".to_string()).query(),
                Some("x")
            );
        }
    }

    mod parse_body_tests {
        use super::*;

        #[test]
        fn test_ok_body() {
            let body = br#"{"status":"ok","totalResults":1,"articles":[{"title":"T1","url":"a","publishedAt":"2024-01-01T00:00:00Z"}]}"#;
            let articles = NewsApiClient::parse_body(200, body).unwrap();

            assert_eq!(articles.len(), 1);
            assert_eq!(articles[0].title, "T1");
            assert_eq!(articles[0].url.as_deref(), Some("a"));
        }

        #[test]
        fn test_ok_with_empty_list() {
            let body = br#"{"status":"ok","articles":[]}"#;
            let articles = NewsApiClient::parse_body(200, body).unwrap();
            assert!(articles.is_empty());
        }

        #[test]
        fn test_missing_articles_uses_fallback() {
            let body = br#"{"status":"ok"}"#;
            let err = NewsApiClient::parse_body(200, body).unwrap_err();
            assert_eq!(err, FeedError::Api(API_FALLBACK_MESSAGE.to_string()));
        }

        #[test]
        fn test_missing_status_uses_fallback() {
            let body = br#"{"articles":[]}"#;
            let err = NewsApiClient::parse_body(200, body).unwrap_err();
            assert_eq!(err, FeedError::Api(API_FALLBACK_MESSAGE.to_string()));
        }

        #[test]
        fn test_error_body_uses_server_message() {
            let body = br#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
            let err = NewsApiClient::parse_body(401, body).unwrap_err();
            assert_eq!(err, FeedError::Api("Your API key is invalid.".to_string()));
        }

        #[test]
        fn test_non_json_error_status() {
            let err = NewsApiClient::parse_body(502, b"<html>Bad Gateway</html>").unwrap_err();
            assert_eq!(
                err,
                FeedError::Api("Request failed with status code 502".to_string())
            );
        }

        #[test]
        fn test_non_json_success_status() {
            let err = NewsApiClient::parse_body(200, b"not json").unwrap_err();
            assert_eq!(err, FeedError::Api(API_FALLBACK_MESSAGE.to_string()));
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_empty_api_message_falls_back() {
            assert_eq!(
                FeedError::api(Some(String::new())),
                FeedError::Api(API_FALLBACK_MESSAGE.to_string())
            );
        }

        #[test]
        fn test_empty_transport_message_falls_back() {
            assert_eq!(
                FeedError::transport(""),
                FeedError::Transport(TRANSPORT_FALLBACK_MESSAGE.to_string())
            );
        }

        #[test]
        fn test_display() {
            assert_eq!(FeedError::NoConnectivity.to_string(), NO_CONNECTIVITY_MESSAGE);
            assert_eq!(FeedError::Api("boom".to_string()).to_string(), "boom");
        }
    }

    mod client_tests {
        use super::*;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client_for(server: &MockServer) -> NewsApiClient {
            let config = ApiConfig {
                base_url: format!("{}/v2", server.uri()),
                api_key: "test-key".to_string(),
                ..Default::default()
            };
            NewsApiClient::new(&config).unwrap()
        }

        #[tokio::test]
        async fn test_headlines_endpoint() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/v2/top-headlines"))
                .and(query_param("country", "us"))
                .and(query_param("apiKey", "test-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "ok",
                    "articles": [{ "title": "Headline", "url": "https://a.example" }]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let articles = client_for(&server)
                .fetch(&HeadlineRequest::Headlines)
                .await
                .unwrap();
            assert_eq!(articles.len(), 1);
            assert_eq!(articles[0].title, "Headline");
        }

        #[tokio::test]
        async fn test_search_endpoint_encodes_query() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/v2/everything"))
                .and(query_param("q", "rust & tokio"))
                .and(query_param("apiKey", "test-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "ok",
                    "articles": []
                })))
                .expect(1)
                .mount(&server)
                .await;

            let articles = client_for(&server)
                .fetch(&HeadlineRequest::Search("rust & tokio".to_string()))
                .await
                .unwrap();
            assert!(articles.is_empty());
        }

        #[tokio::test]
        async fn test_api_error_response() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                    "status": "error",
                    "code": "rateLimited",
                    "message": "You have made too many requests recently."
                })))
                .mount(&server)
                .await;

            let err = client_for(&server)
                .fetch(&HeadlineRequest::Headlines)
                .await
                .unwrap_err();
            assert_eq!(
                err,
                FeedError::Api("You have made too many requests recently.".to_string())
            );
        }

        #[tokio::test]
        async fn test_transport_error() {
            // Nothing listens on the discard port
            let config = ApiConfig {
                base_url: "http://127.0.0.1:9/v2".to_string(),
                timeout_secs: 2,
                ..Default::default()
            };
            let client = NewsApiClient::new(&config).unwrap();

            let err = client.fetch(&HeadlineRequest::Headlines).await.unwrap_err();
            assert!(matches!(err, FeedError::Transport(_)));
        }
    }
}
