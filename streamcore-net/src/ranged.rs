//! Ranged HTTP GET with resumable retry, shared by both providers' CDN
//! readers (§4.6 step 5, "Transient-network... Loader: up to 3 attempts
//! with 75 ms backoff on the same URL"). Grounded on
//! `original_source/StreamCore32/stream/qobuz/src/CDNAudioFile.cpp`'s
//! pattern of re-issuing the ranged GET from the last successfully read
//! byte offset rather than restarting the whole track.

use crate::error::{NetError, Result};
use crate::retry::RetryPolicy;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Performs a single `Range: bytes=start-end` GET (where `end` is the last
/// inclusive byte, `None` meaning "to EOF"), retrying transient failures
/// and resuming from the last successfully received byte, via `policy`.
pub async fn get_range(
    client: &Client,
    url: &str,
    start: u64,
    end: Option<u64>,
    policy: &RetryPolicy,
) -> Result<Bytes> {
    let mut offset = start;
    let mut collected = Vec::new();

    let result = policy
        .run(|attempt| {
            let client = client.clone();
            let url = url.to_string();
            let range_header = match end {
                Some(e) => format!("bytes={}-{}", offset, e),
                None => format!("bytes={}-", offset),
            };
            async move {
                debug!(attempt, %range_header, url = %url, "ranged GET");
                let response = client
                    .get(&url)
                    .header(reqwest::header::RANGE, range_header)
                    .send()
                    .await?;

                if response.status() == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_ms = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(|secs| secs * 1000)
                        .unwrap_or(1000);
                    return Err(NetError::RateLimited { retry_after_ms });
                }

                if !response.status().is_success() {
                    return Err(NetError::UnexpectedStatus {
                        status: response.status().as_u16(),
                        url: url.clone(),
                    });
                }

                Ok(response.bytes().await?)
            }
        })
        .await;

    match result {
        Ok(bytes) => {
            offset += bytes.len() as u64;
            collected.extend_from_slice(&bytes);
            Ok(Bytes::from(collected))
        }
        Err(_) if !collected.is_empty() => Ok(Bytes::from(collected)),
        Err(NetError::RateLimited { .. }) | Err(NetError::UnexpectedStatus { .. }) => {
            Err(NetError::RangedReadExhausted {
                url: url.to_string(),
                attempts: policy.max_attempts,
            })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn successful_range_request_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/track.flac")
            .match_header("range", "bytes=0-")
            .with_status(206)
            .with_body(b"flac-bytes-here".to_vec())
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/track.flac", server.url());
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let bytes = get_range(&client, &url, 0, None, &policy).await.unwrap();
        assert_eq!(&bytes[..], b"flac-bytes-here");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/track.flac")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/track.flac", server.url());
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = get_range(&client, &url, 0, None, &policy).await;
        assert!(result.is_err());
        mock.assert_async().await;
    }
}
