//! Network sources of compressed audio

use crate::constants::{CONNECT_TIMEOUT, INGEST_CHANNEL_CAPACITY, USER_AGENT};
use crate::decoder::{ChannelReader, FrameDecoder, Mp3FrameDecoder};
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An open stream ready to be decoded
pub struct Connection {
    pub decoder: Box<dyn FrameDecoder>,
    /// URL that answered
    pub url: String,
    /// Station name announced by the server (`icy-name`)
    pub stream_name: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("stream_name", &self.stream_name)
            .finish_non_exhaustive()
    }
}

/// Something that can open a live stream
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Opens the stream. A stop request while connecting yields
    /// [`StreamError::Cancelled`].
    async fn connect(&self, cancel: CancellationToken) -> Result<Connection>;

    /// Human readable description for log messages
    fn describe(&self) -> String;
}

/// MP3 over HTTP (Icecast/Shoutcast), with URLs tried in priority order
#[derive(Debug, Clone)]
pub struct HttpStreamSource {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl HttpStreamSource {
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Self::with_client(urls, client)
    }

    pub fn with_client<I, S>(urls: I, client: reqwest::Client) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls
            .into_iter()
            .map(Into::into)
            .filter(|u: &String| !u.trim().is_empty())
            .collect();
        if urls.is_empty() {
            return Err(StreamError::NoSource);
        }
        Ok(Self { urls, client })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn open(&self, url: &str, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            result = self.client.get(url).header("Icy-MetaData", "0").send() => {
                result.map_err(|e| StreamError::transport(format!("HTTP request failed for {}: {}", url, e)))?
            }
        };

        if !response.status().is_success() {
            return Err(StreamError::transport(format!(
                "HTTP request returned status {}: {}",
                response.status(),
                url
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl StreamSource for HttpStreamSource {
    async fn connect(&self, cancel: CancellationToken) -> Result<Connection> {
        let mut last_error = StreamError::NoSource;

        for url in &self.urls {
            tracing::debug!("Connecting to {}", url);
            let response = match self.open(url, &cancel).await {
                Ok(response) => response,
                Err(StreamError::Cancelled) => return Err(StreamError::Cancelled),
                Err(err) => {
                    tracing::warn!("{}", err);
                    last_error = err;
                    continue;
                }
            };

            let stream_name = response
                .headers()
                .get("icy-name")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            let (tx, rx) = mpsc::channel::<Result<Bytes>>(INGEST_CHANNEL_CAPACITY);
            spawn_ingest(response, tx, cancel.clone());

            return Ok(Connection {
                decoder: Box::new(Mp3FrameDecoder::new(ChannelReader::new(rx))),
                url: url.clone(),
                stream_name,
            });
        }

        Err(last_error)
    }

    fn describe(&self) -> String {
        self.urls.join(", ")
    }
}

/// Forwards the response body into the decoder channel until the body ends,
/// the decoder goes away or a stop is requested.
fn spawn_ingest(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<Bytes>>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = tx.send(Ok(chunk)) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    if !cancel.is_cancelled() {
                        let _ = tx.send(Err(StreamError::from(err))).await;
                    }
                    break;
                }
                None => break,
            }
        }
        tracing::trace!("Ingest task finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_at_least_one_url() {
        assert_eq!(
            HttpStreamSource::new(Vec::<String>::new()).unwrap_err(),
            StreamError::NoSource
        );
        assert_eq!(
            HttpStreamSource::new(vec!["  "]).unwrap_err(),
            StreamError::NoSource
        );
    }

    #[test]
    fn test_keeps_priority_order() {
        let source = HttpStreamSource::new(vec!["http://a/live", "http://b/live"]).unwrap();
        assert_eq!(source.urls(), &["http://a/live", "http://b/live"]);
        assert_eq!(source.describe(), "http://a/live, http://b/live");
    }
}
