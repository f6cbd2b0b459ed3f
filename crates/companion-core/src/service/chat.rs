use tracing::{info, warn};

use crate::assistant::{self, AssistantApi, FALLBACK_REPLY, RUN_DEADLINE};
use crate::config::Config;
use crate::db::{AuthedUser, Database, Role};
use crate::error::{CompanionError, ConfigError, Result};

/// One inbound chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub text: String,
    pub thread_id: Option<String>,
    pub conversation_db_id: Option<i64>,
}

/// Outcome of a chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub result: String,
    pub openai_thread_id: String,
    pub conversation_db_id: i64,
    /// True when the run did not complete and the fallback reply was
    /// substituted.
    pub degraded: bool,
}

/// Run a single chat turn: create or touch the conversation, persist the
/// user message, drive an assistant run to completion, persist and return
/// the reply.
///
/// A run that ends in any non-success terminal status (including the poll
/// deadline) degrades to [`FALLBACK_REPLY`] instead of failing the turn; the
/// assistant message row is written either way.
pub async fn send_message(
    assistant: &dyn AssistantApi,
    db: &dyn Database,
    config: &Config,
    auth: &AuthedUser,
    turn: ChatTurn,
) -> Result<ChatReply> {
    let text = turn.text.trim();
    if text.is_empty() {
        return Err(CompanionError::InvalidRequest(
            "Message content (text) is required and cannot be empty".to_string(),
        ));
    }

    // Fail fast before any side effect.
    if !config.openai_configured() {
        return Err(ConfigError::NoApiKey.into());
    }
    if config.openai_assistant_id.is_empty() {
        return Err(ConfigError::NoAssistantId.into());
    }

    let (thread_id, conversation_id) = match (turn.thread_id, turn.conversation_db_id) {
        (None, None) => {
            let thread_id = assistant.create_thread().await?;
            let title = format!(
                "Conversation {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M")
            );
            // An insert failure aborts the turn: no run, no message rows.
            let conversation = db.insert_conversation(auth, &thread_id, &title).await?;
            info!(
                user_id = %auth.id,
                conversation_id = conversation.id,
                thread_id = %thread_id,
                "started new conversation"
            );
            (thread_id, conversation.id)
        }
        (Some(thread_id), Some(conversation_id)) => {
            db.touch_conversation(auth, conversation_id).await?;
            (thread_id, conversation_id)
        }
        _ => {
            return Err(CompanionError::InvalidRequest(
                "Inconsistent conversation state. Please start a new chat.".to_string(),
            ));
        }
    };

    // The user's input is recorded before the run starts, so a crash
    // mid-call never loses it.
    db.insert_message(auth, conversation_id, Role::User, text)
        .await?;

    assistant.add_user_message(&thread_id, text).await?;
    let run = assistant
        .create_run(&thread_id, &config.openai_assistant_id)
        .await?;
    let run = assistant::run_to_completion(assistant, &thread_id, run, RUN_DEADLINE).await?;

    let (reply, degraded) = if run.status.is_success() {
        match assistant.latest_assistant_text(&thread_id).await? {
            Some(reply) => (reply, false),
            None => {
                warn!(thread_id = %thread_id, run_id = %run.id, "completed run produced no assistant text");
                (FALLBACK_REPLY.to_string(), true)
            }
        }
    } else {
        warn!(
            thread_id = %thread_id,
            run_id = %run.id,
            status = %run.status,
            error = run.last_error.as_deref().unwrap_or(""),
            "assistant run did not complete successfully"
        );
        (FALLBACK_REPLY.to_string(), true)
    };

    db.insert_message(auth, conversation_id, Role::Assistant, &reply)
        .await?;

    Ok(ChatReply {
        result: reply,
        openai_thread_id: thread_id,
        conversation_db_id: conversation_id,
        degraded,
    })
}
