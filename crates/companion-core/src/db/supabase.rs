use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::error::{AuthError, DbError};
use crate::util::{self, http};

use super::{AuthedUser, Conversation, Database, Role, StoredMessage};

/// Supabase client: GoTrue for identity resolution, PostgREST for rows.
///
/// Per-user calls carry the caller's JWT so row-level security policies
/// apply; entitlement updates from the webhook path use the service-role key.
pub struct SupabaseDb {
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseDb {
    pub fn new(base_url: String, anon_key: String, service_role_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_role_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            config.supabase_service_role_key.clone(),
        )
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Request acting as the authenticated user (RLS applies).
    fn as_user(
        &self,
        method: reqwest::Method,
        table: &str,
        auth: &AuthedUser,
    ) -> reqwest::RequestBuilder {
        http::client()
            .request(method, self.rest_url(table))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", auth.access_token))
    }

    /// Request acting as the service role (bypasses RLS).
    fn as_service(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        http::client()
            .request(method, self.rest_url(table))
            .header("apikey", &self.service_role_key)
            .header(
                "Authorization",
                format!("Bearer {}", self.service_role_key),
            )
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, DbError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DbError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Database for SupabaseDb {
    async fn resolve_user(&self, access_token: &str) -> Result<AuthedUser, AuthError> {
        let response = http::client()
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidToken);
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?;
        let id = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidToken)?
            .to_string();
        let email = data
            .get("email")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        debug!(user_id = %id, "resolved bearer token");
        Ok(AuthedUser {
            id,
            email,
            access_token: access_token.to_string(),
        })
    }

    async fn insert_conversation(
        &self,
        auth: &AuthedUser,
        thread_id: &str,
        title: &str,
    ) -> Result<Conversation, DbError> {
        let response = self
            .as_user(reqwest::Method::POST, "conversations", auth)
            .header("Prefer", "return=representation")
            .json(&json!({
                "user_id": auth.id,
                "openai_thread_id": thread_id,
                "title": title,
                "status": "active",
            }))
            .send()
            .await?;
        let rows: Vec<Conversation> = self.check(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::Parse("insert returned no row".to_string()))
    }

    async fn touch_conversation(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<(), DbError> {
        let response = self
            .as_user(reqwest::Method::PATCH, "conversations", auth)
            .query(&[
                ("id", format!("eq.{conversation_id}")),
                ("user_id", format!("eq.{}", auth.id)),
            ])
            .json(&json!({ "updated_at": util::timestamp() }))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn insert_message(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), DbError> {
        let response = self
            .as_user(reqwest::Method::POST, "messages", auth)
            .json(&json!({
                "conversation_id": conversation_id,
                "user_id": auth.id,
                "role": role.as_str(),
                "content": content,
            }))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn list_conversations(&self, auth: &AuthedUser) -> Result<Vec<Conversation>, DbError> {
        let owner = format!("eq.{}", auth.id);
        let response = self
            .as_user(reqwest::Method::GET, "conversations", auth)
            .query(&[
                ("select", "*"),
                ("user_id", owner.as_str()),
                ("order", "updated_at.desc"),
            ])
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<Option<Conversation>, DbError> {
        let filter = format!("eq.{conversation_id}");
        let response = self
            .as_service(reqwest::Method::GET, "conversations")
            .query(&[("select", "*"), ("id", filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows: Vec<Conversation> = self.check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn list_messages(
        &self,
        auth: &AuthedUser,
        conversation_id: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let filter = format!("eq.{conversation_id}");
        let response = self
            .as_user(reqwest::Method::GET, "messages", auth)
            .query(&[
                ("select", "*"),
                ("conversation_id", filter.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;
        Ok(self.check(response).await?.json().await?)
    }

    async fn reset_entitlements(&self, user_id: &str) -> Result<(), DbError> {
        let response = self
            .as_service(reqwest::Method::PATCH, "usage")
            .query(&[("user_id", format!("eq.{user_id}"))])
            .json(&json!({
                "is_subscribed": true,
                "message_count": 0,
                "free_quota": 0,
                "paid_quota": 0,
            }))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn add_paid_quota(&self, user_id: &str, amount: i64) -> Result<(), DbError> {
        // Single-statement increment in the database; concurrent webhook
        // deliveries for the same user must not lose credit.
        let response = self
            .as_service(reqwest::Method::POST, "rpc/add_paid_quota")
            .json(&json!({
                "p_user_id": user_id,
                "p_amount": amount,
            }))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}
