//! History service response DTOs.

use serde::{Deserialize, Serialize};

/// Room payload as returned by the history service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub id: String,
    /// "direct" or "group"
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub participants: Vec<String>,
    pub created_by: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    #[serde(default)]
    pub message_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_dto_deserializes_with_optional_fields_missing() {
        // テスト項目: プレビューのない新規ルームが変換される
        // given (前提条件):
        let json = r#"{
            "id": "room-1",
            "kind": "direct",
            "participants": ["u1", "u2"],
            "createdBy": "u1",
            "createdAt": 1000
        }"#;

        // when (操作):
        let dto: RoomDto = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(dto.id, "room-1");
        assert_eq!(dto.name, None);
        assert_eq!(dto.last_message, None);
        assert_eq!(dto.message_count, 0);
    }
}
