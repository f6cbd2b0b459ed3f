//! In-memory [`AssistantApi`] implementation used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AssistantError;

use super::{AssistantApi, Run, RunStatus};

pub struct FakeAssistant {
    reply: Option<String>,
    /// Statuses returned by successive `get_run` calls; once drained the run
    /// reports `Completed` (or `InProgress` forever when `always_pending`).
    statuses: Mutex<VecDeque<RunStatus>>,
    always_pending: bool,
    initial_status: RunStatus,
    threads: AtomicUsize,
    polls: AtomicUsize,
    user_messages: Mutex<Vec<(String, String)>>,
}

impl FakeAssistant {
    /// An assistant whose runs complete immediately with the given reply.
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            statuses: Mutex::new(VecDeque::new()),
            always_pending: false,
            initial_status: RunStatus::Completed,
            threads: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            user_messages: Mutex::new(Vec::new()),
        }
    }

    /// An assistant whose runs start out already failed.
    pub fn failing() -> Self {
        Self {
            reply: None,
            statuses: Mutex::new(VecDeque::new()),
            always_pending: false,
            initial_status: RunStatus::Failed,
            threads: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            user_messages: Mutex::new(Vec::new()),
        }
    }

    /// Runs start out `queued` and report the given statuses on successive
    /// polls.
    pub fn with_run_statuses(mut self, statuses: Vec<RunStatus>) -> Self {
        self.initial_status = RunStatus::Queued;
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Runs never leave `in_progress`; exercises the poll deadline.
    pub fn always_in_progress(mut self) -> Self {
        self.initial_status = RunStatus::Queued;
        self.always_pending = true;
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn user_message_count(&self) -> usize {
        self.user_messages.lock().unwrap().len()
    }
}

#[async_trait]
impl AssistantApi for FakeAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let n = self.threads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("thread_fake_{n}"))
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        self.user_messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<Run, AssistantError> {
        Ok(Run {
            id: "run_fake".to_string(),
            status: self.initial_status.clone(),
            last_error: match self.initial_status {
                RunStatus::Failed => Some("synthetic failure".to_string()),
                _ => None,
            },
        })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let status = if self.always_pending {
            RunStatus::InProgress
        } else {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RunStatus::Completed)
        };
        Ok(Run {
            id: run_id.to_string(),
            status,
            last_error: None,
        })
    }

    async fn latest_assistant_text(
        &self,
        _thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        Ok(self.reply.clone())
    }
}
