//! WebSocket client for the deploy server.
//!
//! One [`Connection`] per publish run. Requests are stop-and-wait: each call
//! sends one message and waits for the matching reply before returning, so
//! the server never holds more than one of our operations at a time.

use crate::diff::Operation;
use crate::utils::errors::{PublishError, Result};
use deploy_core::protocol::{CONNECTION_KEY_HEADER, PROTOCOL_VERSION};
use deploy_core::{ClientMessage, Manifest, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Authenticated connection to a deploy server
pub struct Connection {
    socket: Socket,
    reply_timeout: Duration,
}

impl Connection {
    /// Connect, present the shared secret and wait for `hello`.
    ///
    /// A refused key surfaces as [`PublishError::Authentication`].
    pub async fn connect(url: &str, secret: &str, reply_timeout: Duration) -> Result<Self> {
        let mut request = url.into_client_request()?;
        let key = HeaderValue::from_str(secret)
            .map_err(|_| PublishError::Config("shared secret is not a valid header value".to_string()))?;
        request.headers_mut().insert(CONNECTION_KEY_HEADER, key);

        info!("Connecting to deploy server: {}", url);

        let socket = match connect_async(request).await {
            Ok((socket, _)) => socket,
            Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                return Err(PublishError::Authentication);
            }
            Err(e) => return Err(e.into()),
        };

        let mut connection = Self {
            socket,
            reply_timeout,
        };

        match connection.recv("hello").await? {
            ServerMessage::Hello { version } => {
                if version != PROTOCOL_VERSION {
                    warn!(
                        "Server speaks protocol {}, this publisher speaks {}",
                        version, PROTOCOL_VERSION
                    );
                }
                info!("Connected to deploy server (protocol {})", version);
                Ok(connection)
            }
            other => Err(unexpected("hello", &other)),
        }
    }

    /// Send one message and wait for its reply.
    ///
    /// An `error` reply becomes [`PublishError::Remote`]; the connection is
    /// still usable afterwards.
    pub async fn request(&mut self, message: &ClientMessage) -> Result<ServerMessage> {
        let operation = message.operation();
        let json = serde_json::to_string(message)?;
        debug!("Sending {} for {}", operation, message.site());
        self.socket.send(Message::Text(json.into())).await?;

        match self.recv(operation).await? {
            ServerMessage::Error {
                operation,
                kind,
                site,
                path,
                message: text,
            } => Err(PublishError::Remote {
                operation,
                kind,
                site: site.unwrap_or_else(|| message.site().to_string()),
                path,
                message: text,
            }),
            reply => Ok(reply),
        }
    }

    pub async fn get_manifest(&mut self, site: &str) -> Result<Manifest> {
        let request = ClientMessage::GetManifest {
            site: site.to_string(),
        };
        match self.request(&request).await? {
            ServerMessage::Manifest { site: got, manifest } if got == site => Ok(manifest),
            other => Err(unexpected("manifest", &other)),
        }
    }

    pub async fn create_site(&mut self, site: &str) -> Result<()> {
        let request = ClientMessage::CreateSite {
            site: site.to_string(),
        };
        match self.request(&request).await? {
            ServerMessage::SiteCreated { site: got } if got == site => Ok(()),
            other => Err(unexpected("siteCreated", &other)),
        }
    }

    /// Apply one diff operation and wait for the acknowledgement
    pub async fn apply(&mut self, site: &str, operation: Operation) -> Result<()> {
        let expected = operation.path().to_string();
        let message = operation.into_message(site);

        match self.request(&message).await? {
            ServerMessage::Stored { path, .. } | ServerMessage::Deleted { path, .. }
                if path == expected =>
            {
                Ok(())
            }
            other => Err(unexpected(message.operation(), &other)),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }

    /// Next text frame as a server message. Pings are answered by the
    /// underlying stream.
    async fn recv(&mut self, waiting_for: &str) -> Result<ServerMessage> {
        loop {
            let frame = tokio::time::timeout(self.reply_timeout, self.socket.next())
                .await
                .map_err(|_| PublishError::Timeout(waiting_for.to_string()))?;

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(_))) | None => return Err(PublishError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn unexpected(expected: &str, got: &ServerMessage) -> PublishError {
    PublishError::Protocol(format!("expected {} reply, got {:?}", expected, got))
}
