//! IdentityProvider trait 定義
//!
//! 認証はこのコアの外側の関心事です。コアは安定したユーザ ID と、
//! 接続のたびに必要に応じて更新されるベアラートークンだけを要求します。

use async_trait::async_trait;

use super::error::IdentityError;
use super::value_object::UserId;

/// 認証・アイデンティティ提供者へのインターフェース
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// ログイン中ユーザの安定 ID
    fn user_id(&self) -> UserId;

    /// ログイン中ユーザの表示名（送信時に非正規化される）
    fn display_name(&self) -> String;

    /// 有効なベアラートークンを返す（必要なら内部で更新する）
    async fn bearer_token(&self) -> Result<String, IdentityError>;
}

/// 固定値を返す IdentityProvider 実装
///
/// テストや、トークン更新を別レイヤで済ませている組み込み先向け。
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: UserId,
    display_name: String,
    token: String,
}

impl StaticIdentity {
    pub fn new(user_id: UserId, display_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> UserId {
        self.user_id.clone()
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    async fn bearer_token(&self) -> Result<String, IdentityError> {
        Ok(self.token.clone())
    }
}
