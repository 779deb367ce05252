//! Per-case chat session.
//!
//! The user's message is appended and persisted before the request leaves, so
//! a failed or abandoned turn never loses what the user typed. Only one turn
//! may be in flight at a time; a second send is rejected, not queued.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use caseflow_core::cases::RunResult;
use caseflow_core::chat::{ChatMessage, ChatRequest, default_suggested_questions};
use caseflow_core::limits::CHAT_HISTORY_WINDOW;

use crate::archive::{ArchiveError, CaseArchive};
use crate::transport::{ChatTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a chat message is already being sent for this case")]
    Busy,
    #[error("chat is unavailable until the case has a run result")]
    NotReady,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<ChatMessage>,
    suggested: Vec<String>,
    result: Option<RunResult>,
    sending: bool,
    last_error: Option<String>,
}

pub struct ChatSession<T> {
    case_id: String,
    archive: Arc<CaseArchive>,
    transport: Arc<T>,
    state: Mutex<SessionState>,
}

/// Clears the in-flight flag on every exit path, including a dropped future.
struct SendingGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).sending = false;
    }
}

impl<T: ChatTransport> ChatSession<T> {
    /// Load the transcript and run result for `case_id`.
    ///
    /// Load failures are recorded in [`last_error`](Self::last_error); the
    /// session then starts empty and stays usable.
    pub fn open(
        case_id: impl Into<String>,
        archive: Arc<CaseArchive>,
        transport: Arc<T>,
    ) -> Self {
        let case_id = case_id.into();
        let mut state = SessionState {
            suggested: default_suggested_questions(),
            ..SessionState::default()
        };

        match archive.get_chat(&case_id) {
            Ok(messages) => state.messages = messages,
            Err(e) => {
                tracing::warn!(
                    case_id = %case_id,
                    error = %e,
                    "Chat transcript could not be loaded"
                );
                state.last_error = Some(e.to_string());
            }
        }
        match archive.get_result(&case_id) {
            Ok(result) => state.result = result,
            Err(e) => {
                tracing::warn!(case_id = %case_id, error = %e, "Run result could not be loaded");
                state.last_error = Some(e.to_string());
            }
        }

        Self {
            case_id,
            archive,
            transport,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// Provide the run result when it arrives after the session was opened.
    pub fn attach_result(&self, result: RunResult) {
        self.lock().result = Some(result);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn suggested_questions(&self) -> Vec<String> {
        self.lock().suggested.clone()
    }

    pub fn is_sending(&self) -> bool {
        self.lock().sending
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Send one user turn and return the assistant's reply.
    ///
    /// Blank input is ignored (`Ok(None)`). On transport failure the user
    /// message stays in the transcript and the error is returned; calling
    /// again with the same text appends exactly one more user message.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (request, _guard) = {
            let mut state = self.lock();
            let Some(result) = state.result.clone() else {
                return Err(ChatError::NotReady);
            };
            if state.sending {
                return Err(ChatError::Busy);
            }

            // History is the latest transcript as of now, excluding the new message.
            let skip = state.messages.len().saturating_sub(CHAT_HISTORY_WINDOW);
            let history = state.messages[skip..].to_vec();

            state.messages.push(ChatMessage::user(text, Utc::now()));
            state.sending = true;
            state.last_error = None;
            if let Err(e) = self.archive.save_chat(&self.case_id, &state.messages) {
                tracing::warn!(case_id = %self.case_id, error = %e, "User message not persisted");
                state.last_error = Some(e.to_string());
            }

            let request = ChatRequest {
                case_id: self.case_id.clone(),
                message: text.to_string(),
                process_result: Some(result),
                history,
            };
            (request, SendingGuard { state: &self.state })
        };

        let outcome = self.transport.send_chat(request).await;

        let mut state = self.lock();
        match outcome {
            Ok(response) => {
                let reply = response.message;
                state.messages.push(reply.clone());
                if let Some(suggested) = response.suggested_questions.filter(|q| !q.is_empty()) {
                    state.suggested = suggested;
                }
                if let Err(e) = self.archive.save_chat(&self.case_id, &state.messages) {
                    tracing::warn!(
                        case_id = %self.case_id,
                        error = %e,
                        "Assistant reply not persisted"
                    );
                    state.last_error = Some(e.to_string());
                }
                Ok(Some(reply))
            }
            Err(e) => {
                tracing::warn!(case_id = %self.case_id, error = %e, "Chat turn failed");
                state.last_error = Some(e.to_string());
                Err(ChatError::Transport(e))
            }
        }
    }

    /// Drop the transcript in memory and in the archive, restoring the
    /// default suggested questions.
    pub fn clear_chat(&self) -> Result<(), ChatError> {
        let mut state = self.lock();
        state.messages.clear();
        state.suggested = default_suggested_questions();
        state.last_error = None;
        self.archive.save_chat(&self.case_id, &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::time::Duration;

    use caseflow_core::chat::{ChatResponse, ChatRole};
    use caseflow_core::demo::DemoScript;
    use tokio::sync::Notify;

    use super::*;
    use crate::store::MemoryStore;

    /// Replies from a queue and records every request it saw.
    #[derive(Default)]
    struct QueuedTransport {
        replies: Mutex<VecDeque<Result<ChatResponse, TransportError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl QueuedTransport {
        fn push_ok(&self, content: &str, suggested: Option<Vec<String>>) {
            self.replies.lock().expect("lock").push_back(Ok(ChatResponse {
                message: ChatMessage::assistant(content, Utc::now()),
                suggested_questions: suggested,
            }));
        }

        fn push_err(&self) {
            self.replies
                .lock()
                .expect("lock")
                .push_back(Err(TransportError::Unreachable("connection refused".into())));
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl ChatTransport for QueuedTransport {
        fn send_chat(
            &self,
            request: ChatRequest,
        ) -> impl Future<Output = Result<ChatResponse, TransportError>> + Send {
            self.requests.lock().expect("lock").push(request);
            let reply = self
                .replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Unreachable("no reply queued".into())));
            async move { reply }
        }
    }

    /// Blocks every request until released.
    #[derive(Default)]
    struct GatedTransport {
        gate: Notify,
    }

    impl ChatTransport for GatedTransport {
        fn send_chat(
            &self,
            _request: ChatRequest,
        ) -> impl Future<Output = Result<ChatResponse, TransportError>> + Send {
            async move {
                self.gate.notified().await;
                Ok(ChatResponse {
                    message: ChatMessage::assistant("released", Utc::now()),
                    suggested_questions: None,
                })
            }
        }
    }

    fn archive_with_result(case_id: &str) -> Arc<CaseArchive> {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let result = DemoScript::standard()
            .final_result()
            .cloned()
            .expect("demo result");
        archive.save_result(case_id, &result).expect("save result");
        archive
    }

    #[tokio::test]
    async fn blank_message_is_a_no_op() {
        let transport = Arc::new(QueuedTransport::default());
        let session = ChatSession::open("c1", archive_with_result("c1"), transport.clone());
        assert!(session.send_message("   ").await.expect("no error").is_none());
        assert!(session.messages().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn send_without_result_is_rejected_without_side_effects() {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let transport = Arc::new(QueuedTransport::default());
        let session = ChatSession::open("c1", archive.clone(), transport.clone());

        let err = session.send_message("hello").await.expect_err("not ready");
        assert!(matches!(err, ChatError::NotReady));
        assert!(session.messages().is_empty());
        assert!(archive.get_chat("c1").expect("read").is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn attached_result_makes_the_session_ready() {
        let archive = Arc::new(CaseArchive::new(Arc::new(MemoryStore::new())));
        let transport = Arc::new(QueuedTransport::default());
        transport.push_ok("Start with the trade office.", None);
        let session = ChatSession::open("c1", archive.clone(), transport.clone());
        assert!(matches!(
            session.send_message("Where do I start?").await,
            Err(ChatError::NotReady)
        ));

        let result = DemoScript::standard()
            .final_result()
            .cloned()
            .expect("demo result");
        session.attach_result(result.clone());
        let reply = session
            .send_message("Where do I start?")
            .await
            .expect("turn should succeed")
            .expect("reply expected");

        assert_eq!(reply.content, "Start with the trade office.");
        assert_eq!(transport.requests()[0].process_result, Some(result));
        assert_eq!(archive.get_chat("c1").expect("read").len(), 2);
    }

    #[tokio::test]
    async fn successful_turn_persists_both_messages_and_updates_suggestions() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(QueuedTransport::default());
        transport.push_ok("You need a passport.", Some(vec!["What next?".to_string()]));
        let session = ChatSession::open("c1", archive.clone(), transport.clone());

        let reply = session
            .send_message("  Which documents?  ")
            .await
            .expect("turn should succeed")
            .expect("reply expected");
        assert_eq!(reply.role, ChatRole::Assistant);

        let stored = archive.get_chat("c1").expect("read");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, ChatRole::User);
        assert_eq!(stored[0].content, "Which documents?");
        assert_eq!(stored[1].content, "You need a passport.");
        assert_eq!(session.suggested_questions(), vec!["What next?".to_string()]);

        let request = &transport.requests()[0];
        assert_eq!(request.case_id, "c1");
        assert!(request.history.is_empty());
        assert!(request.process_result.is_some());
    }

    #[tokio::test]
    async fn failed_turn_keeps_user_message_and_retry_appends_one() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(QueuedTransport::default());
        transport.push_err();
        transport.push_ok("Answer", None);
        let session = ChatSession::open("c1", archive.clone(), transport.clone());

        let err = session.send_message("Total cost?").await.expect_err("first turn fails");
        assert!(matches!(err, ChatError::Transport(_)));
        assert!(!session.is_sending());
        assert!(session.last_error().is_some());
        let stored = archive.get_chat("c1").expect("read");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "Total cost?");

        session.send_message("Total cost?").await.expect("retry succeeds");
        let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["Total cost?", "Total cost?", "Answer"]);
        assert_eq!(archive.get_chat("c1").expect("read").len(), 3);
        assert!(session.last_error().is_none());

        // The retry's history carries the failed attempt, not the new message.
        let retry = &transport.requests()[1];
        assert_eq!(retry.history.len(), 1);
    }

    #[tokio::test]
    async fn history_is_bounded_to_latest_messages() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(QueuedTransport::default());
        for i in 0..7 {
            transport.push_ok(&format!("answer {i}"), None);
        }
        let session = ChatSession::open("c1", archive, transport.clone());

        for i in 0..7 {
            session
                .send_message(&format!("question {i}"))
                .await
                .expect("turn should succeed");
        }

        let last = transport.requests().pop().expect("requests recorded");
        assert_eq!(last.history.len(), CHAT_HISTORY_WINDOW);
        assert_eq!(last.message, "question 6");
        // 12 messages existed before the last question; the oldest two are cut.
        assert_eq!(last.history[0].content, "question 1");
        assert_eq!(
            last.history.last().map(|m| m.content.as_str()),
            Some("answer 5")
        );
    }

    #[tokio::test]
    async fn second_send_is_rejected_while_first_is_outstanding() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(GatedTransport::default());
        let session = Arc::new(ChatSession::open("c1", archive, transport.clone()));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.send_message("first").await })
        };
        while !session.is_sending() {
            tokio::task::yield_now().await;
        }

        let err = session.send_message("second").await.expect_err("busy");
        assert!(matches!(err, ChatError::Busy));

        transport.gate.notify_one();
        let reply = first
            .await
            .expect("task should join")
            .expect("first turn should succeed");
        assert!(reply.is_some());

        let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["first", "released"]);
    }

    #[tokio::test]
    async fn dropped_send_releases_in_flight_flag() {
        let archive = archive_with_result("c1");
        let session = ChatSession::open("c1", archive.clone(), Arc::new(GatedTransport::default()));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), session.send_message("hello")).await;
        assert!(timed_out.is_err());
        assert!(!session.is_sending());
        assert_eq!(archive.get_chat("c1").expect("read").len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_the_turn() {
        let store = Arc::new(MemoryStore::new());
        let archive = Arc::new(CaseArchive::new(store.clone()));
        let result = DemoScript::standard().final_result().cloned().expect("demo result");
        archive.save_result("c1", &result).expect("save result");
        store.set_quota(Some(0));

        let transport = Arc::new(QueuedTransport::default());
        transport.push_ok("Answer", None);
        let session = ChatSession::open("c1", archive, transport.clone());

        let reply = session.send_message("hi").await.expect("turn should succeed");
        assert!(reply.is_some());
        assert_eq!(session.messages().len(), 2);
        assert!(session.last_error().is_some());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn clear_restores_defaults_and_empties_archive() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(QueuedTransport::default());
        transport.push_ok("Answer", Some(vec!["Custom?".to_string()]));
        let session = ChatSession::open("c1", archive.clone(), transport);
        session.send_message("hi").await.expect("turn should succeed");

        session.clear_chat().expect("clear should succeed");
        assert!(session.messages().is_empty());
        assert_eq!(session.suggested_questions(), default_suggested_questions());
        assert!(archive.get_chat("c1").expect("read").is_empty());
    }

    #[tokio::test]
    async fn reopened_session_sees_persisted_transcript() {
        let archive = archive_with_result("c1");
        let transport = Arc::new(QueuedTransport::default());
        transport.push_ok("Answer", None);
        ChatSession::open("c1", archive.clone(), transport.clone())
            .send_message("hi")
            .await
            .expect("turn should succeed");

        let reopened = ChatSession::open("c1", archive, transport);
        assert_eq!(reopened.messages().len(), 2);
    }
}
