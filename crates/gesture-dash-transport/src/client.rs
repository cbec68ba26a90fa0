//! HTTP implementation of [`RemoteControl`] plus the NDJSON event feed.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use gesture_dash_core::{CommandAck, FeedMessage, HandsMode, RemoteControl, RemoteError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::{
    codec::{FramedRead, LinesCodec, LinesCodecError},
    io::StreamReader,
};

use crate::protocol::{
    EVENTS, FLIP_CAMERA, FeedError, HandsModeResponse, MirrorResponse, START_CAMERA, STOP_CAMERA,
    SkeletonResponse, TOGGLE_HANDS_MODE, TOGGLE_SKELETON, decode_feed_line,
};

/// Longest feed line accepted.
pub const MAX_FEED_LINE: usize = 64 * 1024;

/// Boxed stream of feed messages.
pub type EventFeed = BoxStream<'static, Result<FeedMessage, FeedError>>;

fn transport(err: &reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

/// Talks to the gesture service over HTTP.
#[derive(Clone)]
pub struct HttpRemoteControl {
    client: Client,
    base_url: String,
}

impl HttpRemoteControl {
    /// Create a client for the service at `base_url`, e.g. `http://127.0.0.1:5000`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create with a preconfigured reqwest client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Service root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a command and decode the JSON reply.
    ///
    /// Failure replies still carry a JSON body, so the body is decoded
    /// regardless of status; only an undecodable error status counts as a
    /// transport failure.
    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport(&e))?;

        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                RemoteError::Decode(e.to_string())
            } else {
                RemoteError::Transport(format!("HTTP {status}"))
            }
        })
    }

    /// Open the event channel.
    ///
    /// The returned stream ends when the service closes the connection.
    ///
    /// # Errors
    /// Returns an error if the channel cannot be opened.
    pub async fn event_feed(&self) -> Result<EventFeed, RemoteError> {
        let response = self
            .client
            .get(self.url(EVENTS))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport(&e))?;
        tracing::debug!(url = %response.url(), "event feed opened");

        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FEED_LINE));

        Ok(lines
            .filter_map(|line| async move {
                match line {
                    Ok(line) => decode_feed_line(&line).transpose(),
                    Err(LinesCodecError::Io(e)) => Some(Err(FeedError::Io(e))),
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        Some(Err(FeedError::LineTooLong(MAX_FEED_LINE)))
                    }
                }
            })
            .boxed())
    }
}

#[async_trait]
impl RemoteControl for HttpRemoteControl {
    async fn start_camera(&self) -> Result<CommandAck, RemoteError> {
        self.post(START_CAMERA).await
    }

    async fn stop_camera(&self) -> Result<CommandAck, RemoteError> {
        self.post(STOP_CAMERA).await
    }

    async fn toggle_mirror(&self) -> Result<Option<bool>, RemoteError> {
        let reply: MirrorResponse = self.post(FLIP_CAMERA).await?;
        reply.ack.into_result()?;
        Ok(reply.flipped)
    }

    async fn toggle_skeleton(&self) -> Result<Option<bool>, RemoteError> {
        let reply: SkeletonResponse = self.post(TOGGLE_SKELETON).await?;
        reply.ack.into_result()?;
        Ok(reply.skeleton)
    }

    async fn toggle_hands_mode(&self) -> Result<HandsMode, RemoteError> {
        let reply: HandsModeResponse = self.post(TOGGLE_HANDS_MODE).await?;
        reply.ack.into_result()?;
        reply
            .mode
            .ok_or_else(|| RemoteError::Decode("reply is missing the hands mode".into()))
    }
}
