//! HTTP を使った HistoryService 実装
//!
//! ## 責務
//!
//! - 履歴サービスの REST エンドポイントからルーム一覧・メッセージ履歴を取得
//! - すべてのリクエストに設定されたパスコードヘッダを付与
//! - レスポンス DTO のドメインモデルへの変換（壊れた要素は警告して読み飛ばす）

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::domain::{ChatMessage, HistoryError, HistoryService, Room, RoomId, UserId};
use crate::infrastructure::dto::http::RoomDto;
use crate::infrastructure::dto::websocket::MessageDto;

use async_trait::async_trait;

/// Header carrying the history-service credential
const PASSCODE_HEADER: &str = "x-chat-passcode";

/// REST-backed [`HistoryService`]
pub struct HttpHistoryService {
    client: Client,
    base_url: String,
    passcode: String,
}

impl HttpHistoryService {
    /// # Arguments
    ///
    /// * `base_url` - Service root without a trailing slash
    /// * `passcode` - Credential sent on every request
    pub fn new(base_url: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            passcode: passcode.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HistoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(PASSCODE_HEADER, &self.passcode)
            .send()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| HistoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl HistoryService for HttpHistoryService {
    async fn fetch_rooms(&self, user_id: &UserId) -> Result<Vec<Room>, HistoryError> {
        let dtos: Vec<RoomDto> = self
            .get_json(&format!("/chat/users/{}/rooms", user_id.as_str()))
            .await?;
        // 一部の要素が壊れていても一覧全体は返す
        let rooms = dtos
            .into_iter()
            .filter_map(|dto| match Room::try_from(dto) {
                Ok(room) => Some(room),
                Err(e) => {
                    tracing::warn!("skipping malformed room in listing: {}", e);
                    None
                }
            })
            .collect();
        Ok(rooms)
    }

    async fn fetch_messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, HistoryError> {
        let dtos: Vec<MessageDto> = self
            .get_json(&format!("/chat/rooms/{}/messages", room_id.as_str()))
            .await?;
        let messages = dtos
            .into_iter()
            .filter_map(|dto| match ChatMessage::try_from(dto) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("skipping malformed message in history: {}", e);
                    None
                }
            })
            .collect();
        Ok(messages)
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<Room, HistoryError> {
        let dto: RoomDto = self
            .get_json(&format!("/chat/rooms/{}", room_id.as_str()))
            .await?;
        Room::try_from(dto).map_err(|e| HistoryError::Decode(e.to_string()))
    }
}
