//! WebSocket を使った Transport 実装
//!
//! ## 責務
//!
//! - メッセージングサーバへの WebSocket 接続の確立と認証ハンドシェイク
//! - ドメインコマンドのワイヤ形式への直列化と送信
//! - 受信フレームの復号とドメインイベントへの変換
//!
//! ## 設計ノート
//!
//! 接続ごとに読み書き 2 本のポンプタスクを生やし、チャンネル対として
//! 呼び出し側へ返します。壊れたフレームはここで警告ログとともに破棄され、
//! セッション層には届きません（復号境界での回復）。再接続の判断は
//! 接続スーパーバイザの責務で、この実装は一切再試行しません。

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::domain::{
    ClientCommand, HandshakeAuth, ServerEvent, Transport, TransportConnection, TransportError,
};
use crate::infrastructure::dto::websocket::{WireCommand, WireEvent};

/// WebSocket-backed [`Transport`]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// # Arguments
    ///
    /// * `url` - WebSocket endpoint, e.g. `ws://127.0.0.1:8080/ws`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, auth: &HandshakeAuth) -> Result<TransportConnection, TransportError> {
        // Token and identity travel as handshake metadata
        let url = format!(
            "{}?userId={}&token={}",
            self.url,
            auth.user_id.as_str(),
            auth.token
        );

        let (ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        // Register the identity before any other traffic
        let register = WireCommand::from(ClientCommand::Register {
            user_id: auth.user_id.clone(),
        });
        let register_json =
            serde_json::to_string(&register).map_err(|e| TransportError::Protocol(e.to_string()))?;
        write
            .send(Message::Text(register_json.into()))
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<ClientCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();

        // Write pump: domain commands → JSON frames
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let wire = WireCommand::from(command);
                let json = match serde_json::to_string(&wire) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("failed to serialize command: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    tracing::warn!("failed to send command: {}", e);
                    break;
                }
            }
        });

        // Read pump: JSON frames → domain events. Dropping `event_tx` ends
        // the event stream, which the supervisor observes as a lost
        // connection.
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WireEvent>(&text) {
                        Ok(wire) => match ServerEvent::try_from(wire) {
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("malformed event payload discarded: {}", e);
                            }
                        },
                        Err(e) => {
                            tracing::warn!("unparseable frame discarded: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("websocket read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(TransportConnection {
            commands: command_tx,
            events: event_rx,
        })
    }
}
