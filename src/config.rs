//! Client configuration.

use serde::Deserialize;

/// Configuration for constructing a chat client against real backends.
///
/// The realtime transport and the history service are separate collaborators
/// with separate endpoints; the history service additionally expects a
/// passcode header on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// WebSocket endpoint of the messaging server (e.g. `ws://127.0.0.1:8080/ws`)
    pub ws_url: String,
    /// Base URL of the REST history service (e.g. `https://api.example.com`)
    pub history_base_url: String,
    /// Credential sent as a header on every history request
    pub history_passcode: String,
}

impl ChatConfig {
    pub fn new(
        ws_url: impl Into<String>,
        history_base_url: impl Into<String>,
        history_passcode: impl Into<String>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            history_base_url: history_base_url.into(),
            history_passcode: history_passcode.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserializes_from_json() {
        // テスト項目: 設定が JSON から読み込める
        // given (前提条件):
        let json = r#"{
            "ws_url": "ws://127.0.0.1:8080/ws",
            "history_base_url": "http://127.0.0.1:3000",
            "history_passcode": "secret"
        }"#;

        // when (操作):
        let config: ChatConfig = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(config.ws_url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.history_base_url, "http://127.0.0.1:3000");
        assert_eq!(config.history_passcode, "secret");
    }
}
