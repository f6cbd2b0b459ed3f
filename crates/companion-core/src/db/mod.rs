use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, DbError};

pub mod supabase;

#[cfg(test)]
pub mod fake;

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A conversation row. Created on the first turn of a new chat, touched on
/// every subsequent turn, never deleted by this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub openai_thread_id: String,
    pub title: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A message row. Append-only per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// Usage/entitlement row, keyed by user. Mutated only by the webhook path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub is_subscribed: bool,
    pub message_count: i64,
    pub free_quota: i64,
    pub paid_quota: i64,
}

/// Identity resolved from a bearer token.
///
/// Carries the caller's own access token so that row operations are issued
/// under it; row-level security in the database is the primary access-control
/// mechanism, not application-side id checks.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub email: Option<String>,
    pub access_token: String,
}

/// Client seam for the hosted database (auth + row API).
///
/// Per-user operations take the resolved [`AuthedUser`] and run under the
/// caller's token. The entitlement operations are service-scoped and are only
/// reachable from the signature-verified webhook path.
#[async_trait]
pub trait Database: Send + Sync {
    /// Resolve a bearer token to a user identity via the auth service.
    async fn resolve_user(&self, access_token: &str) -> Result<AuthedUser, AuthError>;

    /// Insert a new conversation owned by the caller, returning the row.
    async fn insert_conversation(
        &self,
        auth: &AuthedUser,
        thread_id: &str,
        title: &str,
    ) -> Result<Conversation, DbError>;

    /// Refresh a conversation's updated_at, scoped to the owner.
    async fn touch_conversation(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<(), DbError>;

    /// Append a message row to a conversation.
    async fn insert_message(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), DbError>;

    /// The caller's conversations, most recently updated first.
    async fn list_conversations(&self, auth: &AuthedUser) -> Result<Vec<Conversation>, DbError>;

    /// Look up a conversation by id regardless of owner. Service-scoped;
    /// used for the explicit ownership check before returning messages.
    async fn get_conversation(&self, conversation_id: i64)
        -> Result<Option<Conversation>, DbError>;

    /// Messages of a conversation in chronological order.
    async fn list_messages(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<Vec<StoredMessage>, DbError>;

    /// Subscription checkout: set the subscription flag and zero every
    /// counter.
    async fn reset_entitlements(&self, user_id: &str) -> Result<(), DbError>;

    /// One-time purchase: atomically add credits to the paid counter.
    async fn add_paid_quota(&self, user_id: &str, amount: i64) -> Result<(), DbError>;
}
