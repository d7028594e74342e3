use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::RETRY_AFTER;
use http::StatusCode;
use reqwest::{Client, Response};

use crate::config::DEFAULT_EXTRACT_URL;
use crate::error::FetchError;
use crate::model::{ExtractResponse, Page};

#[async_trait]
pub trait PageFetcher {
    /// Fetches the page that starts at `token`.
    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError>;
}

pub struct MdsClient {
    pub client: Client,
    pub url: String,
}

impl MdsClient {
    pub fn new(client: Client) -> Self {
        MdsClient { client, url: DEFAULT_EXTRACT_URL.to_string() }
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        MdsClient { client, url: url.into() }
    }
}

#[async_trait]
impl PageFetcher for MdsClient {
    async fn fetch_page(&self, token: &str) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("resume", token)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.text().await?;
                let extract = serde_json::from_str::<ExtractResponse>(&body)?;
                let page = Page::try_from(extract)?;
                tracing::debug!(
                    records = page.records.len(),
                    remaining = ?page.stats.remaining,
                    has_next = page.next_token.is_some(),
                    "fetched page"
                );
                Ok(page)
            }
            status => Err(status_error(status, response).await),
        }
    }
}

async fn status_error(status: StatusCode, response: Response) -> FetchError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_retry_after(value, Utc::now()));
    let body = response.text().await.unwrap_or_default();
    FetchError::Status { status, retry_after, body }
}

/// `Retry-After` is either delay seconds or an HTTP date; a date in the past
/// means no wait at all.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IsRetryable;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> MdsClient {
        MdsClient::with_url(Client::new(), format!("{}/api/v1/extract", server.url()))
    }

    #[tokio::test]
    async fn given_resume_token_when_fetch_page_then_records_and_next_token() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::UrlEncoded("resume".into(), "T0".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": [{"id": 1}, {"id": 2}],
                    "resume": "T1",
                    "has_next": true,
                    "stats": {"total": 4, "remaining": 2}
                })
                .to_string(),
            )
            .create_async()
            .await;

        // When
        let page = client_for(&server).fetch_page("T0").await.unwrap();

        // Then
        assert_eq!(page.records, vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(page.next_token.as_deref(), Some("T1"));
        assert_eq!(page.stats.total, Some(4));
    }

    #[tokio::test]
    async fn given_last_page_when_fetch_page_then_no_next_token() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::UrlEncoded("resume".into(), "T3".into()))
            .with_status(200)
            .with_body(json!({"data": [{"id": 9}], "has_next": false}).to_string())
            .create_async()
            .await;

        // When
        let page = client_for(&server).fetch_page("T3").await.unwrap();

        // Then
        assert_eq!(page.next_token, None);
        assert_eq!(page.final_token, None);
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn given_throttled_request_when_fetch_page_then_transient_with_hint() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "3")
            .with_body("slow down")
            .create_async()
            .await;

        // When
        let error = client_for(&server).fetch_page("T0").await.unwrap_err();

        // Then
        assert!(error.is_retryable());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    }

    #[tokio::test]
    async fn given_rejected_token_when_fetch_page_then_permanent_error() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("token expired")
            .create_async()
            .await;

        // When
        let error = client_for(&server).fetch_page("T0").await.unwrap_err();

        // Then
        assert!(!error.is_retryable());
        assert_eq!(error.to_string(), "server answered 403 Forbidden: token expired");
    }

    #[tokio::test]
    async fn given_garbage_body_when_fetch_page_then_decode_error() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        // When
        let error = client_for(&server).fetch_page("T0").await.unwrap_err();

        // Then
        assert!(matches!(error, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn given_accepted_status_when_fetch_page_then_page_is_read() {
        // Given
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/extract")
            .match_query(Matcher::UrlEncoded("resume".into(), "T0".into()))
            .with_status(203)
            .with_body(json!({"data": [{"id": 1}], "resume": "T1", "has_next": true}).to_string())
            .create_async()
            .await;

        // When
        let page = client_for(&server).fetch_page("T0").await.unwrap();

        // Then
        assert_eq!(page.next_token.as_deref(), Some("T1"));
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_retry_after(" 12 ", now), Some(Duration::from_secs(12)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:29:30 GMT", now),
            Some(Duration::from_secs(90))
        );
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
