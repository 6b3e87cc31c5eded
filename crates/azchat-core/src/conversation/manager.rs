//! Conversation session manager
//!
//! Maps one chat turn onto either a chat-completions call carrying the
//! whole history, or a run against a remote thread.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::llm::{
    is_valid_remote_id, AssistantBackend, ChatMessage, CompletionBackend, RunStatus, SamplingParams,
};
use crate::poll::{poll_run, PollOutcome, PollPolicy};
use crate::session::{SessionState, SessionStore};
use crate::{Error, Result};

use super::reply::{latest_assistant_text, ChatReply, RunReply, RunResult, REQUIRES_ACTION_ADVISORY};

/// Remote API a manager talks to
#[derive(Clone)]
pub enum ChatBackend {
    /// Stateless: full history resent on every call
    Completions {
        backend: Arc<dyn CompletionBackend>,
        system_prompt: String,
        sampling: SamplingParams,
    },
    /// Stateful: history lives in a remote thread
    Assistant {
        backend: Arc<dyn AssistantBackend>,
        assistant_id: String,
        policy: PollPolicy,
    },
}

/// Mint a conversation id of the form `conv_<unix seconds>_<pid>`
pub fn mint_conversation_id() -> String {
    format!("conv_{}_{}", chrono::Utc::now().timestamp(), std::process::id())
}

/// Owns the per-session conversation state
pub struct ConversationManager {
    store: Arc<dyn SessionStore>,
    backend: ChatBackend,
    session_lifetime: Duration,
    /// One lock per session id so turns of the same session never interleave
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn SessionStore>, backend: ChatBackend, session_lifetime: Duration) -> Self {
        Self {
            store,
            backend,
            session_lifetime,
            locks: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &ChatBackend {
        &self.backend
    }

    async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    async fn load_or_new(&self, session_id: &str) -> Result<SessionState> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(self.session_lifetime)))
    }

    async fn persist(&self, session_id: &str, state: &mut SessionState) -> Result<()> {
        state.touch(self.session_lifetime);
        self.store.save(session_id, state).await
    }

    /// Adopt `explicit` if given, else keep the session's id, else mint one.
    fn resolve_conversation_id(state: &mut SessionState, explicit: Option<&str>) -> String {
        if let Some(id) = explicit.filter(|id| !id.trim().is_empty()) {
            state.conversation_id = Some(id.to_string());
            return id.to_string();
        }
        if let Some(id) = state.conversation_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let id = mint_conversation_id();
        state.conversation_id = Some(id.clone());
        id
    }

    /// Return the session's conversation id, adopting or minting one as needed.
    pub async fn get_or_create_conversation_id(
        &self,
        session_id: &str,
        explicit: Option<&str>,
    ) -> Result<String> {
        let _guard = self.lock(session_id).await;
        let mut state = self.load_or_new(session_id).await?;
        let id = Self::resolve_conversation_id(&mut state, explicit);
        self.persist(session_id, &mut state).await?;
        Ok(id)
    }

    /// Clear all session state; the next turn starts a fresh conversation.
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        let _guard = self.lock(session_id).await;
        self.store.remove(session_id).await?;
        info!("Session {} reset", session_id);
        Ok(())
    }

    /// Clear the session and immediately start a new, empty conversation.
    pub async fn new_conversation(&self, session_id: &str) -> Result<String> {
        let _guard = self.lock(session_id).await;
        let mut state = SessionState::new(self.session_lifetime);
        let id = mint_conversation_id();
        state.conversation_id = Some(id.clone());
        self.persist(session_id, &mut state).await?;
        info!("Session {} started conversation {}", session_id, id);
        Ok(id)
    }

    /// Conversation history held for the session (completions mode)
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .map(|state| state.messages)
            .unwrap_or_default())
    }

    /// Run one chat turn.
    ///
    /// `explicit_id` is a conversation id in completions mode and a thread
    /// id in assistant mode; when given it replaces the session's current one.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        explicit_id: Option<&str>,
    ) -> Result<ChatReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("No message provided".to_string()));
        }

        let _guard = self.lock(session_id).await;

        match &self.backend {
            ChatBackend::Completions {
                backend,
                system_prompt,
                sampling,
            } => {
                self.complete_turn(session_id, text, explicit_id, backend.as_ref(), system_prompt, *sampling)
                    .await
            }
            ChatBackend::Assistant {
                backend,
                assistant_id,
                policy,
            } => {
                self.run_turn(session_id, text, explicit_id, backend.as_ref(), assistant_id, policy)
                    .await
            }
        }
    }

    async fn complete_turn(
        &self,
        session_id: &str,
        text: &str,
        explicit_id: Option<&str>,
        backend: &dyn CompletionBackend,
        system_prompt: &str,
        sampling: SamplingParams,
    ) -> Result<ChatReply> {
        let mut state = self.load_or_new(session_id).await?;
        let conversation_id = Self::resolve_conversation_id(&mut state, explicit_id);
        self.persist(session_id, &mut state).await?;

        let mut messages = state.messages.clone();
        if messages.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(text));

        debug!(
            "Conversation {}: sending {} messages",
            conversation_id,
            messages.len()
        );

        let completion = backend.complete(&messages, sampling).await?;
        let response = completion
            .reply_text()
            .ok_or_else(|| Error::Api("Completion returned no message content".to_string()))?
            .to_string();

        messages.push(ChatMessage::assistant(&response));
        state.messages = messages;
        self.persist(session_id, &mut state).await?;

        Ok(ChatReply::Completion {
            conversation_id,
            response,
        })
    }

    async fn run_turn(
        &self,
        session_id: &str,
        text: &str,
        explicit_thread: Option<&str>,
        backend: &dyn AssistantBackend,
        assistant_id: &str,
        policy: &PollPolicy,
    ) -> Result<ChatReply> {
        let explicit_thread = explicit_thread.map(str::trim).filter(|id| !id.is_empty());
        if let Some(thread_id) = explicit_thread {
            if !is_valid_remote_id(thread_id) {
                warn!("Rejected thread id {:?} for session {}", thread_id, session_id);
                return Err(Error::Validation("Invalid thread_id".to_string()));
            }
        }

        let mut state = self.load_or_new(session_id).await?;
        if let Some(thread_id) = explicit_thread {
            state.thread_id = Some(thread_id.to_string());
        }

        let thread_id = match state.thread_id.clone() {
            Some(thread_id) => thread_id,
            None => {
                let thread = backend.create_thread().await?;
                state.thread_id = Some(thread.id.clone());
                thread.id
            }
        };
        self.persist(session_id, &mut state).await?;

        backend.add_user_message(&thread_id, text).await?;
        let run = backend.create_run(&thread_id, assistant_id).await?;
        let run_id = run.id.clone();

        let (tid, rid) = (thread_id.as_str(), run_id.as_str());
        let outcome = poll_run(policy, run, move || backend.retrieve_run(tid, rid)).await?;
        let status = outcome.status().to_string();

        let result = match &outcome {
            PollOutcome::Finished(run) if run.status == RunStatus::Completed => {
                let messages = backend.list_messages(&thread_id).await?;
                match latest_assistant_text(&messages.data) {
                    Some(answer) => RunResult::Answer(answer),
                    None => RunResult::Failed(
                        "Run completed but the thread has no assistant reply".to_string(),
                    ),
                }
            }
            PollOutcome::Finished(run) if run.status == RunStatus::RequiresAction => {
                RunResult::ActionRequired(REQUIRES_ACTION_ADVISORY.to_string())
            }
            PollOutcome::Finished(run) => {
                let detail = run
                    .last_error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| format!("Run ended with status {}", status));
                RunResult::Failed(detail)
            }
            PollOutcome::TimedOut { elapsed, .. } => RunResult::Failed(format!(
                "Run did not finish within {} seconds",
                elapsed.as_secs()
            )),
        };

        if let RunResult::Failed(detail) = &result {
            warn!("Run {} on thread {}: {} ({})", run_id, thread_id, status, detail);
        }

        Ok(ChatReply::Run(RunReply {
            thread_id,
            status,
            result,
        }))
    }

    /// Drop expired sessions and locks nobody holds
    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self.store.purge_expired().await?;
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        ChatChoice, ChatCompletionResponse, ChatMessageResponse, MessageList, Role, Run, RunError,
        TextValue, Thread, ThreadContent, ThreadMessage,
    };
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingCompletions {
        calls: StdMutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionBackend for RecordingCompletions {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _sampling: SamplingParams,
        ) -> Result<ChatCompletionResponse> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            if self.fail {
                return Err(Error::Api("503 Service Unavailable: overloaded".to_string()));
            }
            Ok(ChatCompletionResponse {
                id: "chatcmpl".to_string(),
                model: "test".to_string(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatMessageResponse {
                        role: "assistant".to_string(),
                        content: Some(format!("reply {}", calls.len())),
                    },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }
    }

    struct ScriptedAssistant {
        statuses: StdMutex<VecDeque<RunStatus>>,
        messages: Vec<ThreadMessage>,
        threads_created: StdMutex<u32>,
        posted: StdMutex<Vec<(String, String)>>,
        last_error: Option<RunError>,
    }

    impl ScriptedAssistant {
        fn new(statuses: &[RunStatus], messages: Vec<ThreadMessage>) -> Self {
            Self {
                statuses: StdMutex::new(statuses.iter().copied().collect()),
                messages,
                threads_created: StdMutex::new(0),
                posted: StdMutex::new(Vec::new()),
                last_error: None,
            }
        }

        fn run(&self, thread_id: &str, status: RunStatus) -> Run {
            Run {
                id: "run_1".to_string(),
                thread_id: thread_id.to_string(),
                status,
                last_error: self.last_error.clone(),
            }
        }
    }

    #[async_trait]
    impl AssistantBackend for ScriptedAssistant {
        async fn create_thread(&self) -> Result<Thread> {
            let mut created = self.threads_created.lock().unwrap();
            *created += 1;
            Ok(Thread {
                id: format!("thread_{}", created),
                created_at: 0,
            })
        }

        async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<()> {
            self.posted
                .lock()
                .unwrap()
                .push((thread_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run> {
            Ok(self.run(thread_id, RunStatus::Queued))
        }

        async fn retrieve_run(&self, thread_id: &str, _run_id: &str) -> Result<Run> {
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RunStatus::InProgress);
            Ok(self.run(thread_id, status))
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<MessageList> {
            Ok(MessageList {
                data: self.messages.clone(),
            })
        }
    }

    fn thread_message(id: &str, role: Role, created_at: i64, text: &str) -> ThreadMessage {
        ThreadMessage {
            id: id.to_string(),
            role,
            created_at,
            content: vec![ThreadContent::Text {
                text: TextValue {
                    value: text.to_string(),
                },
            }],
        }
    }

    fn completions_manager(backend: Arc<RecordingCompletions>) -> ConversationManager {
        ConversationManager::new(
            Arc::new(InMemorySessionStore::new()),
            ChatBackend::Completions {
                backend,
                system_prompt: "SYSTEM".to_string(),
                sampling: SamplingParams::default(),
            },
            Duration::days(7),
        )
    }

    fn assistant_manager(backend: Arc<ScriptedAssistant>) -> ConversationManager {
        ConversationManager::new(
            Arc::new(InMemorySessionStore::new()),
            ChatBackend::Assistant {
                backend,
                assistant_id: "asst_1".to_string(),
                policy: PollPolicy::default(),
            },
            Duration::hours(8),
        )
    }

    fn is_minted_id(id: &str) -> bool {
        let parts: Vec<&str> = id.split('_').collect();
        parts.len() == 3
            && parts[0] == "conv"
            && !parts[1].is_empty()
            && parts[1].chars().all(|c| c.is_ascii_digit())
            && !parts[2].is_empty()
            && parts[2].chars().all(|c| c.is_ascii_digit())
    }

    // ------------------------------------------------------------------
    // Conversation ids
    // ------------------------------------------------------------------

    #[test]
    fn test_minted_id_format() {
        let id = mint_conversation_id();
        assert!(is_minted_id(&id), "unexpected id {}", id);
        assert!(id.ends_with(&format!("_{}", std::process::id())));
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_and_adopts() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));

        let first = manager.get_or_create_conversation_id("s1", None).await.unwrap();
        let second = manager.get_or_create_conversation_id("s1", None).await.unwrap();
        assert!(is_minted_id(&first));
        assert_eq!(first, second);

        let adopted = manager
            .get_or_create_conversation_id("s1", Some("conv_custom"))
            .await
            .unwrap();
        assert_eq!(adopted, "conv_custom");
        assert_eq!(
            manager.get_or_create_conversation_id("s1", None).await.unwrap(),
            "conv_custom"
        );
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));
        manager
            .get_or_create_conversation_id("s1", Some("conv_a"))
            .await
            .unwrap();
        let other = manager.get_or_create_conversation_id("s2", None).await.unwrap();
        assert_ne!(other, "conv_a");
    }

    // ------------------------------------------------------------------
    // Completions mode
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let backend = Arc::new(RecordingCompletions::default());
        let manager = completions_manager(backend.clone());

        for text in ["", "   ", "\n\t"] {
            let err = manager.send_message("s1", text, None).await.unwrap_err();
            assert!(err.is_validation());
        }
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hello_on_empty_session() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));

        let reply = manager.send_message("s1", "Hello", None).await.unwrap();

        match reply {
            ChatReply::Completion {
                conversation_id,
                response,
            } => {
                assert!(is_minted_id(&conversation_id));
                assert!(!response.is_empty());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_order_sent_to_backend() {
        let backend = Arc::new(RecordingCompletions::default());
        let manager = completions_manager(backend.clone());

        manager.send_message("s1", "first", None).await.unwrap();
        manager.send_message("s1", "  second  ", None).await.unwrap();

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0], vec![ChatMessage::system("SYSTEM"), ChatMessage::user("first")]);
        assert_eq!(
            calls[1],
            vec![
                ChatMessage::system("SYSTEM"),
                ChatMessage::user("first"),
                ChatMessage::assistant("reply 1"),
                ChatMessage::user("second"),
            ]
        );
        drop(calls);

        let history = manager.history("s1").await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[4], ChatMessage::assistant("reply 2"));
    }

    #[tokio::test]
    async fn test_conversation_id_reused_across_turns() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));

        let first = manager.send_message("s1", "a", None).await.unwrap();
        let second = manager.send_message("s1", "b", None).await.unwrap();

        let id = |reply: &ChatReply| match reply {
            ChatReply::Completion { conversation_id, .. } => conversation_id.clone(),
            _ => unreachable!(),
        };
        assert_eq!(id(&first), id(&second));
    }

    #[tokio::test]
    async fn test_reset_starts_fresh() {
        let backend = Arc::new(RecordingCompletions::default());
        let manager = completions_manager(backend.clone());

        manager
            .send_message("s1", "hi", Some("conv_before"))
            .await
            .unwrap();
        manager.reset("s1").await.unwrap();

        assert!(manager.history("s1").await.unwrap().is_empty());

        let reply = manager.send_message("s1", "again", None).await.unwrap();
        match reply {
            ChatReply::Completion { conversation_id, .. } => {
                assert_ne!(conversation_id, "conv_before");
                assert!(is_minted_id(&conversation_id));
            }
            _ => unreachable!(),
        }

        // System instruction is sent again after reset
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[1][0], ChatMessage::system("SYSTEM"));
        assert_eq!(calls[1].len(), 2);
    }

    #[tokio::test]
    async fn test_new_conversation_clears_history() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));
        manager.send_message("s1", "hi", None).await.unwrap();

        let id = manager.new_conversation("s1").await.unwrap();

        assert!(is_minted_id(&id));
        assert!(manager.history("s1").await.unwrap().is_empty());
        assert_eq!(manager.get_or_create_conversation_id("s1", None).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_failed_completion_leaves_history_untouched() {
        let backend = Arc::new(RecordingCompletions {
            fail: true,
            ..Default::default()
        });
        let manager = completions_manager(backend);

        let err = manager.send_message("s1", "hi", None).await.unwrap_err();

        assert_eq!(err.kind(), "ApiError");
        assert!(manager.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_turns_do_not_lose_history() {
        let manager = Arc::new(completions_manager(Arc::new(RecordingCompletions::default())));

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.send_message("s1", &format!("msg {}", i), None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // system + 8 * (user + assistant)
        assert_eq!(manager.history("s1").await.unwrap().len(), 17);
    }

    // ------------------------------------------------------------------
    // Assistant mode
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_assistant_completed_returns_newest_reply() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::InProgress, RunStatus::Completed],
            vec![
                thread_message("m1", Role::Assistant, 10, "stale answer"),
                thread_message("m2", Role::User, 20, "Hello"),
                thread_message("m3", Role::Assistant, 30, "fresh answer"),
            ],
        ));
        let manager = assistant_manager(backend.clone());

        let reply = manager.send_message("s1", "Hello", None).await.unwrap();

        let ChatReply::Run(run) = reply else {
            panic!("expected run reply");
        };
        assert_eq!(run.thread_id, "thread_1");
        assert_eq!(run.status, "completed");
        assert_eq!(run.result, RunResult::Answer("fresh answer".to_string()));
        assert_eq!(
            backend.posted.lock().unwrap()[0],
            ("thread_1".to_string(), "Hello".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_thread_created_once() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::Completed, RunStatus::Completed],
            vec![thread_message("m1", Role::Assistant, 1, "answer")],
        ));
        let manager = assistant_manager(backend.clone());

        manager.send_message("s1", "one", None).await.unwrap();
        manager.send_message("s1", "two", None).await.unwrap();

        assert_eq!(*backend.threads_created.lock().unwrap(), 1);
        let posted = backend.posted.lock().unwrap();
        assert!(posted.iter().all(|(thread, _)| thread == "thread_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_explicit_thread_is_adopted() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::Completed],
            vec![thread_message("m1", Role::Assistant, 1, "answer")],
        ));
        let manager = assistant_manager(backend.clone());

        let reply = manager
            .send_message("s1", "hi", Some("thread_existing"))
            .await
            .unwrap();

        let ChatReply::Run(run) = reply else { unreachable!() };
        assert_eq!(run.thread_id, "thread_existing");
        assert_eq!(*backend.threads_created.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_hostile_thread_id_rejected() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::Completed],
            vec![thread_message("m1", Role::Assistant, 1, "answer")],
        ));
        let manager = assistant_manager(backend.clone());
        manager.send_message("s1", "first", None).await.unwrap();

        let err = manager
            .send_message("s1", "hi", Some("x/../../assistants/asst_other#"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(backend.posted.lock().unwrap().len(), 1);
        let state = manager.store.load("s1").await.unwrap().unwrap();
        assert_eq!(state.thread_id.as_deref(), Some("thread_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_requires_action_returns_advisory() {
        let backend = Arc::new(ScriptedAssistant::new(&[RunStatus::RequiresAction], vec![]));
        let manager = assistant_manager(backend);

        let ChatReply::Run(run) = manager.send_message("s1", "use a tool", None).await.unwrap() else {
            unreachable!()
        };

        assert_eq!(run.status, "requires_action");
        assert_eq!(
            run.result,
            RunResult::ActionRequired(REQUIRES_ACTION_ADVISORY.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_failed_keeps_thread() {
        let mut scripted = ScriptedAssistant::new(
            &[RunStatus::Failed, RunStatus::Completed],
            vec![thread_message("m1", Role::Assistant, 1, "recovered")],
        );
        scripted.last_error = Some(RunError {
            code: "server_error".to_string(),
            message: "something broke".to_string(),
        });
        let backend = Arc::new(scripted);
        let manager = assistant_manager(backend.clone());

        let ChatReply::Run(run) = manager.send_message("s1", "hi", None).await.unwrap() else {
            unreachable!()
        };
        assert_eq!(run.status, "failed");
        assert_eq!(
            run.result,
            RunResult::Failed("server_error: something broke".to_string())
        );

        // Retry lands on the same thread
        let ChatReply::Run(run) = manager.send_message("s1", "again", None).await.unwrap() else {
            unreachable!()
        };
        assert_eq!(run.thread_id, "thread_1");
        assert_eq!(*backend.threads_created.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_timeout() {
        // Never leaves in_progress
        let backend = Arc::new(ScriptedAssistant::new(&[], vec![]));
        let manager = assistant_manager(backend);
        let started = tokio::time::Instant::now();

        let ChatReply::Run(run) = manager.send_message("s1", "hi", None).await.unwrap() else {
            unreachable!()
        };

        assert_eq!(run.status, "timeout");
        assert_eq!(
            run.result,
            RunResult::Failed("Run did not finish within 60 seconds".to_string())
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_completed_without_reply_is_failure() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::Completed],
            vec![thread_message("m1", Role::User, 1, "hi")],
        ));
        let manager = assistant_manager(backend);

        let ChatReply::Run(run) = manager.send_message("s1", "hi", None).await.unwrap() else {
            unreachable!()
        };
        assert_eq!(run.status, "completed");
        assert!(matches!(run.result, RunResult::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_assistant_reset_creates_new_thread() {
        let backend = Arc::new(ScriptedAssistant::new(
            &[RunStatus::Completed, RunStatus::Completed],
            vec![thread_message("m1", Role::Assistant, 1, "answer")],
        ));
        let manager = assistant_manager(backend.clone());

        manager.send_message("s1", "one", None).await.unwrap();
        manager.reset("s1").await.unwrap();
        let ChatReply::Run(run) = manager.send_message("s1", "two", None).await.unwrap() else {
            unreachable!()
        };

        assert_eq!(run.thread_id, "thread_2");
    }

    #[tokio::test]
    async fn test_purge_drops_idle_locks() {
        let manager = completions_manager(Arc::new(RecordingCompletions::default()));
        manager.get_or_create_conversation_id("s1", None).await.unwrap();
        assert_eq!(manager.locks.len(), 1);

        manager.purge_expired().await.unwrap();
        assert_eq!(manager.locks.len(), 0);
    }
}
