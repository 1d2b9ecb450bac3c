//! Transport trait 定義
//!
//! ドメイン層が必要とするメッセージングサーバへの接続インターフェースを
//! 定義します。具体的な実装（WebSocket）は Infrastructure 層が提供します
//! （依存性の逆転）。
//!
//! ## 設計ノート
//!
//! 1 回の `open` が 1 本の論理接続に対応します。接続はコマンド送信用の
//! チャンネルとイベント受信用のチャンネルの対として表現され、イベント
//! チャンネルが閉じた時点で接続断とみなします。再接続の判断と実行は
//! 呼び出し側（接続スーパーバイザ）の責務です。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::event::{ClientCommand, ServerEvent};
use super::value_object::UserId;

/// 接続ハンドシェイクに添付する認証情報
#[derive(Debug, Clone)]
pub struct HandshakeAuth {
    pub user_id: UserId,
    /// Short-lived bearer token supplied by the identity provider
    pub token: String,
}

/// 確立済みの論理接続
///
/// `commands` の送信は失敗しうる（接続が既に死んでいる）。
/// `events` が `None` を返したら接続は終了している。
pub struct TransportConnection {
    pub commands: mpsc::UnboundedSender<ClientCommand>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// メッセージングサーバへの永続双方向接続のファクトリ
#[async_trait]
pub trait Transport: Send + Sync {
    /// 認証情報をハンドシェイクに添えて接続を確立する
    async fn open(&self, auth: &HandshakeAuth) -> Result<TransportConnection, TransportError>;
}
