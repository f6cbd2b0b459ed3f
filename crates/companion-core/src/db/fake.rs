//! In-memory [`Database`] implementation used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AuthError, DbError};
use crate::util;

use super::{AuthedUser, Conversation, Database, Role, StoredMessage, UsageRecord};

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    messages: Vec<StoredMessage>,
    usage: HashMap<String, UsageRecord>,
    next_id: i64,
}

/// Fake database: bearer tokens map directly to user ids, rows live in
/// vectors.
#[derive(Default)]
pub struct FakeDb {
    tokens: HashMap<String, String>,
    tables: Mutex<Tables>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bearer token resolving to the given user id.
    pub fn with_user(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }

    /// Seed a usage row for a user.
    pub fn with_usage(self, record: UsageRecord) -> Self {
        self.tables
            .lock()
            .unwrap()
            .usage
            .insert(record.user_id.clone(), record);
        self
    }

    pub fn conversation_count(&self) -> usize {
        self.tables.lock().unwrap().conversations.len()
    }

    pub fn messages_for(&self, conversation_id: i64) -> Vec<StoredMessage> {
        self.tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn usage_for(&self, user_id: &str) -> Option<UsageRecord> {
        self.tables.lock().unwrap().usage.get(user_id).cloned()
    }
}

#[async_trait]
impl Database for FakeDb {
    async fn resolve_user(&self, access_token: &str) -> Result<AuthedUser, AuthError> {
        let user_id = self
            .tokens
            .get(access_token)
            .ok_or(AuthError::InvalidToken)?;
        Ok(AuthedUser {
            id: user_id.clone(),
            email: Some(format!("{user_id}@example.com")),
            access_token: access_token.to_string(),
        })
    }

    async fn insert_conversation(
        &self,
        auth: &AuthedUser,
        thread_id: &str,
        title: &str,
    ) -> Result<Conversation, DbError> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let now = util::timestamp();
        let conversation = Conversation {
            id: tables.next_id,
            user_id: auth.id.clone(),
            openai_thread_id: thread_id.to_string(),
            title: title.to_string(),
            status: "active".to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn touch_conversation(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(c) = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.user_id == auth.id)
        {
            c.updated_at = util::timestamp();
        }
        Ok(())
    }

    async fn insert_message(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let message = StoredMessage {
            id: tables.next_id,
            conversation_id,
            user_id: auth.id.clone(),
            role,
            content: content.to_string(),
            created_at: util::timestamp(),
        };
        tables.messages.push(message);
        Ok(())
    }

    async fn list_conversations(&self, auth: &AuthedUser) -> Result<Vec<Conversation>, DbError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.user_id == auth.id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<Option<Conversation>, DbError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn list_messages(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.user_id == auth.id)
            .cloned()
            .collect())
    }

    async fn reset_entitlements(&self, user_id: &str) -> Result<(), DbError> {
        let mut tables = self.tables.lock().unwrap();
        tables.usage.insert(
            user_id.to_string(),
            UsageRecord {
                user_id: user_id.to_string(),
                is_subscribed: true,
                message_count: 0,
                free_quota: 0,
                paid_quota: 0,
            },
        );
        Ok(())
    }

    async fn add_paid_quota(&self, user_id: &str, amount: i64) -> Result<(), DbError> {
        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .usage
            .entry(user_id.to_string())
            .or_insert_with(|| UsageRecord {
                user_id: user_id.to_string(),
                is_subscribed: false,
                message_count: 0,
                free_quota: 0,
                paid_quota: 0,
            });
        record.paid_quota += amount;
        Ok(())
    }
}
