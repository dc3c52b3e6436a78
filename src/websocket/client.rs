//! WebSocket client for the book feed
//!
//! Owns at most one connection. Subscription requests go out as text frames;
//! inbound frames are reduced to feed text or a bare sign of life.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

use crate::error::{FeedError, Result};
use crate::parser::SubscriptionRequest;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame read from the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// JSON payload for the parser
    Text(String),
    /// Ping, pong or raw frame; proves the peer is alive but carries no data
    Control,
}

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl WebSocketClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open a connection, replacing any previous one
    pub async fn connect(&mut self) -> Result<()> {
        self.close().await;
        info!(url = %self.endpoint, "Connecting to book feed");

        let (stream, response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| FeedError::WebSocketConnection(format!("{}: {}", self.endpoint, e)))?;

        info!(status = ?response.status(), "Book feed connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Send a subscribe or unsubscribe request
    pub async fn send_request(&mut self, request: &SubscriptionRequest) -> Result<()> {
        let text = request.to_json()?;
        debug!(request = %text, "Sending request");
        self.send(Message::Text(text)).await
    }

    /// Ask the peer for a pong
    pub async fn ping(&mut self) -> Result<()> {
        self.send(Message::Ping(Vec::new())).await
    }

    /// Wait for the next frame
    ///
    /// Pings are answered by tungstenite on the next read or write. A close
    /// frame, a transport error or the end of the stream drops the connection.
    pub async fn recv(&mut self) -> Result<Inbound> {
        let next = self.connected()?.next().await;

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                self.stream = None;
                return Err(FeedError::WebSocketMessage(e.to_string()));
            }
            None => {
                self.stream = None;
                return Err(FeedError::WebSocketConnection("stream ended".to_string()));
            }
        };

        match message {
            Message::Text(text) => {
                trace!(len = text.len(), "Text frame");
                Ok(Inbound::Text(text))
            }
            Message::Binary(data) => String::from_utf8(data)
                .map(Inbound::Text)
                .map_err(|e| FeedError::ParseError(format!("binary frame is not UTF-8: {}", e))),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Control),
            Message::Close(frame) => {
                warn!(frame = ?frame, "Feed closed the connection");
                self.stream = None;
                Err(FeedError::WebSocketConnection("closed by peer".to_string()))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection, if any
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "Close handshake failed");
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        self.connected()?
            .send(message)
            .await
            .map_err(|e| FeedError::WebSocketMessage(e.to_string()))
    }

    fn connected(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| FeedError::WebSocketConnection("not connected".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Product;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Local feed that replays `frames` to the first client and then closes
    async fn scripted_feed(frames: Vec<Message>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            for frame in frames {
                ws.send(frame).await.unwrap();
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut client = WebSocketClient::new("wss://www.cryptofacilities.com/ws/v1");
        assert!(!client.is_connected());

        let err = client
            .send_request(&SubscriptionRequest::subscribe(Product::XbtUsd))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::WebSocketConnection(_)));
        assert!(client.recv().await.is_err());
        assert!(client.ping().await.is_err());

        // closing without a connection is a no-op
        client.close().await;
    }

    #[tokio::test]
    async fn test_recv_classifies_frames() {
        let url = scripted_feed(vec![
            Message::Text(r#"{"event":"info","version":1}"#.to_string()),
            Message::Ping(vec![1]),
            Message::Binary(br#"{"event":"alert"}"#.to_vec()),
        ])
        .await;

        let mut client = WebSocketClient::new(&url);
        client.connect().await.unwrap();
        assert!(client.is_connected());

        assert_eq!(
            client.recv().await.unwrap(),
            Inbound::Text(r#"{"event":"info","version":1}"#.to_string())
        );
        assert_eq!(client.recv().await.unwrap(), Inbound::Control);
        assert_eq!(
            client.recv().await.unwrap(),
            Inbound::Text(r#"{"event":"alert"}"#.to_string())
        );

        assert!(client.recv().await.is_err());
        assert!(!client.is_connected());
    }
}
