//! WebSocket implementation of the stream transport.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use skylink_env::{LinkError, StreamEvent, StreamTransport};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Stream transport over a WebSocket connection.
///
/// The sink and source halves live behind separate locks so sends and the
/// event loop never contend. Reconnection policy stays in `StreamLink`;
/// this type only opens sockets when told to.
pub struct WsTransport {
    url: String,
    sink: Mutex<Option<WsSink>>,
    source: Mutex<Option<WsSource>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: Mutex::new(None),
            source: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&self) -> Result<(), LinkError> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LinkError::connect(e.to_string()))?;
        let (sink, source) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<(), LinkError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(LinkError::NotConnected)?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| LinkError::send(e.to_string()))
    }

    async fn next_event(&self) -> Option<StreamEvent> {
        loop {
            let item = {
                let mut guard = self.source.lock().await;
                let source = guard.as_mut()?;
                source.next().await
            };

            match item {
                Some(Ok(Message::Text(text))) => return Some(StreamEvent::Message(text)),
                Some(Ok(Message::Close(_))) | None => return Some(StreamEvent::Closed),
                Some(Ok(other)) => {
                    // Control and binary frames carry nothing for us
                    debug!(?other, "ignoring non-text frame");
                }
                Some(Err(e)) => return Some(StreamEvent::Error(e.to_string())),
            }
        }
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        *self.source.lock().await = None;
    }
}
