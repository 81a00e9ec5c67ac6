//! Websocket transport for change subscriptions.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::phoenix::{ChangeFilter, Inbound, PhoenixFrame};
use super::{ChannelEvent, ChannelStatus, Subscription, SubscriptionSink};
use crate::{Error, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_REF: &str = "1";

/// Build the realtime websocket URL for a project base URL.
#[must_use]
pub fn realtime_socket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!(
        "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        urlencoding::encode(anon_key)
    )
}

/// Opens one websocket per subscription and feeds decoded inserts into it.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    socket_url: String,
}

/// How a channel task ended
enum Ending {
    Released,
    ClosedByServer,
}

impl RealtimeClient {
    #[must_use]
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            socket_url: realtime_socket_url(base_url, anon_key),
        }
    }

    #[must_use]
    pub fn socket_url(&self) -> &str {
        &self.socket_url
    }

    /// Subscribe to inserts matching `filter`.
    ///
    /// Returns immediately; the first event is `Status(Connecting)`. A dropped
    /// connection ends the stream with `Closed` or `Error`, there is no
    /// automatic reconnect.
    pub fn subscribe_inserts<T>(
        &self,
        filter: ChangeFilter,
        access_token: Option<String>,
    ) -> Subscription<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (subscription, sink) = Subscription::channel();
        let socket_url = self.socket_url.clone();
        tokio::spawn(run_channel(socket_url, filter, access_token, sink));
        subscription
    }
}

async fn run_channel<T>(
    socket_url: String,
    filter: ChangeFilter,
    access_token: Option<String>,
    mut sink: SubscriptionSink<T>,
) where
    T: DeserializeOwned + Send + 'static,
{
    if !sink.status(ChannelStatus::Connecting).await {
        return;
    }

    let topic = filter.topic();
    match drive(&socket_url, &filter, access_token.as_deref(), &mut sink).await {
        Ok(Ending::Released) => {
            tracing::debug!(%topic, "Realtime channel released");
        }
        Ok(Ending::ClosedByServer) => {
            tracing::info!(%topic, "Realtime channel closed by server");
            sink.status(ChannelStatus::Closed).await;
        }
        Err(error) => {
            tracing::warn!(%topic, "Realtime channel failed: {error}");
            sink.status(ChannelStatus::Error(error.to_string())).await;
        }
    }
}

async fn drive<T>(
    socket_url: &str,
    filter: &ChangeFilter,
    access_token: Option<&str>,
    sink: &mut SubscriptionSink<T>,
) -> Result<Ending>
where
    T: DeserializeOwned,
{
    let connected = tokio::select! {
        result = connect_async(socket_url) => result,
        () = sink.released() => return Ok(Ending::Released),
    };
    let (stream, _) = connected.map_err(|error| Error::Realtime(error.to_string()))?;
    let (mut write, mut read) = stream.split();

    let topic = filter.topic();
    let mut next_ref: u64 = 1;
    send_frame(
        &mut write,
        &PhoenixFrame::join(filter, access_token, JOIN_REF),
    )
    .await?;

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            () = sink.released() => {
                next_ref += 1;
                let leave = PhoenixFrame::leave(&topic, &next_ref.to_string());
                if let Err(error) = send_frame(&mut write, &leave).await {
                    tracing::debug!("Failed to leave realtime channel: {error}");
                }
                let _ = write.close().await;
                return Ok(Ending::Released);
            }
            _ = heartbeat.tick() => {
                next_ref += 1;
                send_frame(&mut write, &PhoenixFrame::heartbeat(&next_ref.to_string())).await?;
            }
            incoming = read.next() => {
                let text = match incoming {
                    None | Some(Ok(WsMessage::Close(_))) => {
                        return Err(Error::Realtime("connection closed".to_string()));
                    }
                    Some(Err(error)) => return Err(Error::Realtime(error.to_string())),
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };

                let frame: PhoenixFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(error) => {
                        tracing::debug!("Skipping undecodable realtime frame: {error}");
                        continue;
                    }
                };

                match frame.classify(&topic, JOIN_REF) {
                    Inbound::Joined => {
                        tracing::debug!(%topic, "Realtime channel joined");
                        if !sink.status(ChannelStatus::Subscribed).await {
                            return Ok(Ending::Released);
                        }
                    }
                    Inbound::Insert(record) => match serde_json::from_value::<T>(record) {
                        Ok(row) => {
                            if !sink.send(ChannelEvent::Insert(row)).await {
                                return Ok(Ending::Released);
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%topic, "Dropping malformed realtime record: {error}");
                        }
                    },
                    Inbound::Failed(reason) => return Err(Error::Realtime(reason)),
                    Inbound::Closed => return Ok(Ending::ClosedByServer),
                    Inbound::Ignored => {}
                }
            }
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &PhoenixFrame) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let encoded = serde_json::to_string(frame)?;
    write
        .send(WsMessage::Text(encoded.into()))
        .await
        .map_err(|error| Error::Realtime(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn socket_url_switches_scheme() {
        assert_eq!(
            realtime_socket_url("https://demo.supabase.co/", "anon key"),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon%20key&vsn=1.0.0"
        );
        assert_eq!(
            realtime_socket_url("http://127.0.0.1:54321", "k"),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[tokio::test]
    async fn unreachable_socket_reports_connecting_then_error() {
        let client = RealtimeClient {
            socket_url: "ws://127.0.0.1:1/realtime/v1/websocket".to_string(),
        };
        let mut subscription = client.subscribe_inserts::<Message>(
            ChangeFilter::inserts("messages", "conversation_id", "abc"),
            None,
        );

        assert_eq!(
            subscription.next().await,
            Some(ChannelEvent::Status(ChannelStatus::Connecting))
        );
        match subscription.next().await {
            Some(ChannelEvent::Status(ChannelStatus::Error(_))) => {}
            other => panic!("expected error status, got {other:?}"),
        }
        assert_eq!(subscription.next().await, None);
    }
}
