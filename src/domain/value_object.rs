//! ドメイン層の値オブジェクト定義
//!
//! 外部から渡される文字列（サーバ発行 ID、メッセージ本文など）は
//! 値オブジェクトのコンストラクタで検証してから型に閉じ込めます。
//! 一度構築された値は常に妥当であることが保証されます。

use std::fmt;

use super::error::ValidationError;

/// メッセージ本文の最大文字数
pub const MAX_MESSAGE_BODY_CHARS: usize = 2000;

macro_rules! opaque_id {
    ($name:ident, $label:literal) => {
        /// Server-assigned opaque identifier
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(ValidationError::Empty($label));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(RoomId, "room id");
opaque_id!(UserId, "user id");
opaque_id!(MessageId, "message id");

/// メッセージ本文
///
/// 空文字列と上限超過を拒否します。削除済みメッセージの本文は
/// 墓碑として保持されるため、構築後に空にされることはありません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Empty("message body"));
        }
        if value.chars().count() > MAX_MESSAGE_BODY_CHARS {
            return Err(ValidationError::TooLong {
                field: "message body",
                max: MAX_MESSAGE_BODY_CHARS,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 画像ホスティングサービスが返した永続 URL への参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ValidationError::Empty("image url"));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Unix タイムスタンプ（ミリ秒）
///
/// メッセージの時刻はサーバが権威を持つため、クライアント側で
/// 並べ替えには使用しません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_accepts_non_empty_value() {
        // テスト項目: 空でない文字列から RoomId が構築できる
        // given (前提条件):
        let raw = "room-1".to_string();

        // when (操作):
        let result = RoomId::new(raw);

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(result.unwrap().as_str(), "room-1");
    }

    #[test]
    fn test_room_id_rejects_empty_value() {
        // テスト項目: 空文字列からの構築はエラーになる
        // given (前提条件):
        let raw = "".to_string();

        // when (操作):
        let result = RoomId::new(raw);

        // then (期待する結果):
        assert_eq!(result, Err(ValidationError::Empty("room id")));
    }

    #[test]
    fn test_room_id_rejects_whitespace_only_value() {
        // テスト項目: 空白のみの文字列からの構築はエラーになる
        // given (前提条件):
        let raw = "   ".to_string();

        // when (操作):
        let result = RoomId::new(raw);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_message_body_accepts_normal_text() {
        // テスト項目: 通常のテキストから MessageBody が構築できる
        // given (前提条件):
        let raw = "Hello!".to_string();

        // when (操作):
        let result = MessageBody::new(raw);

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(result.unwrap().as_str(), "Hello!");
    }

    #[test]
    fn test_message_body_rejects_empty_text() {
        // テスト項目: 空のメッセージ本文はエラーになる
        // given (前提条件):
        let raw = "".to_string();

        // when (操作):
        let result = MessageBody::new(raw);

        // then (期待する結果):
        assert_eq!(result, Err(ValidationError::Empty("message body")));
    }

    #[test]
    fn test_message_body_rejects_oversized_text() {
        // テスト項目: 上限を超える本文はエラーになる
        // given (前提条件):
        let raw = "a".repeat(MAX_MESSAGE_BODY_CHARS + 1);

        // when (操作):
        let result = MessageBody::new(raw);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ValidationError::TooLong {
                field: "message body",
                max: MAX_MESSAGE_BODY_CHARS,
            })
        );
    }

    #[test]
    fn test_message_body_accepts_text_at_limit() {
        // テスト項目: ちょうど上限の長さの本文は受理される
        // given (前提条件):
        let raw = "a".repeat(MAX_MESSAGE_BODY_CHARS);

        // when (操作):
        let result = MessageBody::new(raw);

        // then (期待する結果):
        assert!(result.is_ok());
    }

    #[test]
    fn test_timestamp_preserves_value() {
        // テスト項目: Timestamp が渡された値を保持する
        // given (前提条件):
        let millis = 1672498800123;

        // when (操作):
        let timestamp = Timestamp::new(millis);

        // then (期待する結果):
        assert_eq!(timestamp.value(), millis);
    }
}
