//! Session orchestration for the Charla client.
//!
//! `SessionManager` owns the conversation history and notes store for
//! one session and drives the three user-triggered flows against the
//! backend:
//!
//! - chat: `Idle → Composing → AwaitingResponse → Settled`
//! - upload: `Idle → Uploading → Done`
//! - note save: `Idle → Collecting → Creating → Done`
//!
//! The flows are independent state machines. Both stores only ever
//! grow (history appends, notes prepend), so the flows interleave
//! freely without corrupting either store.

pub mod api_client;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use charla_core::config::ClientConfig;
use charla_core::error::Result;
use charla_core::notes::{NoteSummary, NotesStore};
use charla_core::session::{ConversationHistory, FeatureToggles, Role, Turn};

use crate::api_client::{ApiClient, ChatRequest};

/// Fixed assistant text used when the backend returns no answer.
pub const FALLBACK_ANSWER: &str = "(sin respuesta)";

/// Upload status line while a file is being sent and indexed.
pub const UPLOAD_IN_PROGRESS: &str = "Subiendo...";

/// Outcome of a send intent.
///
/// Rejection is a precondition no-op, not a failure: transport and
/// parse errors are reported separately through `CharlaError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was empty or whitespace-only; nothing changed.
    Rejected,
    /// The assistant answered (or the fixed fallback text was used).
    Answered {
        /// Assistant turn content as appended to the history.
        content: String,
        /// Filenames of retrieval sources cited by the backend.
        sources: Vec<String>,
    },
}

/// Outcome of an upload intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No usable file was selected; nothing changed.
    Rejected,
    /// The file was indexed into the retrieval corpus.
    Indexed {
        /// Number of text fragments added to the index.
        chunks: u64,
    },
}

/// Outcome of a note-save intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteOutcome {
    /// Title or body was missing; nothing changed.
    Rejected,
    /// The note was created and prepended to the store.
    Saved(NoteSummary),
}

/// Manages conversation state and request orchestration for a session.
///
/// The manager is the sole writer of both stores; the presentation
/// layer holds an `Arc` to it and reads through the snapshot methods.
pub struct SessionManager {
    api: ApiClient,
    /// Append-only conversation history, seeded with the system turn.
    history: Arc<RwLock<ConversationHistory>>,
    /// Note summaries, most recent first.
    notes: Arc<RwLock<NotesStore>>,
    /// Current feature toggles; read at request-composition time only.
    toggles: Arc<RwLock<FeatureToggles>>,
    /// Display text for the upload flow.
    upload_status: Arc<RwLock<String>>,
    /// Set while a chat request is awaiting its response, so the
    /// presentation can disable the send trigger.
    chat_in_flight: Arc<AtomicBool>,
}

impl SessionManager {
    /// Creates a manager for the configured backend endpoint.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(ApiClient::new(config))
    }

    /// Creates a manager around an existing API client.
    pub fn with_client(api: ApiClient) -> Self {
        Self {
            api,
            history: Arc::new(RwLock::new(ConversationHistory::new())),
            notes: Arc::new(RwLock::new(NotesStore::new())),
            toggles: Arc::new(RwLock::new(FeatureToggles::default())),
            upload_status: Arc::new(RwLock::new(String::new())),
            chat_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Probes the backend health endpoint once at session start.
    ///
    /// An unreachable backend is logged and reported, never fatal.
    pub async fn check_backend(&self) -> bool {
        match self.api.health().await {
            Ok(status) if status == "ok" => true,
            Ok(status) => {
                tracing::warn!("Backend reported unexpected health status: {}", status);
                true
            }
            Err(err) => {
                tracing::warn!("Backend health check failed: {}", err);
                false
            }
        }
    }

    /// One-time bulk load of note summaries at session start.
    ///
    /// A failed fetch leaves the store empty rather than blocking the
    /// session; the failure is logged as a recoverable transport error.
    pub async fn load_notes(&self) {
        match self.api.list_notes().await {
            Ok(list) => {
                let count = list.len();
                self.notes.write().await.initialize(list);
                tracing::info!("Loaded {} note summaries", count);
            }
            Err(err) => {
                tracing::warn!("Initial notes fetch failed, starting empty: {}", err);
            }
        }
    }

    /// Returns the current ordered conversation history.
    pub async fn history(&self) -> Vec<Turn> {
        self.history.read().await.snapshot()
    }

    /// Returns the note summaries, most recent first.
    pub async fn notes(&self) -> Vec<NoteSummary> {
        self.notes.read().await.snapshot()
    }

    /// Returns the current feature toggles.
    pub async fn toggles(&self) -> FeatureToggles {
        *self.toggles.read().await
    }

    /// Sets the retrieval toggle and returns the new state.
    pub async fn set_use_rag(&self, enabled: bool) -> FeatureToggles {
        let mut toggles = self.toggles.write().await;
        toggles.use_rag = enabled;
        *toggles
    }

    /// Sets the web-lookup toggle and returns the new state.
    pub async fn set_use_wiki(&self, enabled: bool) -> FeatureToggles {
        let mut toggles = self.toggles.write().await;
        toggles.use_wiki = enabled;
        *toggles
    }

    /// Returns the current upload flow status text.
    pub async fn upload_status(&self) -> String {
        self.upload_status.read().await.clone()
    }

    /// Whether a chat request is currently awaiting its response.
    pub fn is_sending(&self) -> bool {
        self.chat_in_flight.load(Ordering::SeqCst)
    }

    /// Sends one chat turn through the full chat flow.
    ///
    /// Empty or whitespace-only input is rejected as a no-op. Accepted
    /// input appends the user turn immediately and composes the request
    /// from the history snapshot and the toggles frozen at that instant;
    /// the snapshot and the append happen in one critical section, so
    /// concurrent sends each capture their own consistent prefix.
    ///
    /// # Errors
    ///
    /// Returns a transport, API, or parse error when the request fails.
    /// The optimistic user turn stays in the history either way: the
    /// user's utterance is a fact of the conversation regardless of the
    /// server outcome.
    pub async fn send_message(&self, input: &str) -> Result<SendOutcome> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(SendOutcome::Rejected);
        }

        // Composing: toggles are frozen here for this request.
        let toggles = *self.toggles.read().await;
        let messages = {
            let mut history = self.history.write().await;
            history.append(Role::User, trimmed);
            history.snapshot()
        };

        let request = ChatRequest {
            messages,
            use_rag: toggles.use_rag,
            use_wiki: toggles.use_wiki,
        };

        // AwaitingResponse: the single suspension point of the flow.
        self.chat_in_flight.store(true, Ordering::SeqCst);
        let response = self.api.chat(&request).await;
        self.chat_in_flight.store(false, Ordering::SeqCst);
        let response = response?;

        // Settled: never leave a gap in the conversation.
        let content = response
            .answer
            .filter(|answer| !answer.is_empty())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
        self.history
            .write()
            .await
            .append(Role::Assistant, content.clone());

        let sources = response
            .sources
            .into_iter()
            .filter_map(|source| source.source)
            .collect();

        Ok(SendOutcome::Answered { content, sources })
    }

    /// Uploads one file to extend the retrieval corpus.
    ///
    /// A path without a usable filename is rejected as a no-op and the
    /// status text is left untouched. Otherwise the status reflects the
    /// in-progress, indexed, or failed state of the flow.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read, or a transport,
    /// API, or parse error when the request fails.
    pub async fn upload_path(&self, path: &Path) -> Result<UploadOutcome> {
        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            return Ok(UploadOutcome::Rejected);
        };
        let filename = filename.to_string();

        *self.upload_status.write().await = UPLOAD_IN_PROGRESS.to_string();

        let result = self.upload_inner(path, &filename).await;
        match &result {
            Ok(UploadOutcome::Indexed { chunks }) => {
                *self.upload_status.write().await = format!("Indexado: {chunks} fragmentos");
            }
            Ok(UploadOutcome::Rejected) => {}
            Err(err) => {
                *self.upload_status.write().await = format!("Error al subir: {err}");
            }
        }
        result
    }

    async fn upload_inner(&self, path: &Path, filename: &str) -> Result<UploadOutcome> {
        let bytes = tokio::fs::read(path).await?;
        let response = self.api.upload(filename, bytes).await?;
        tracing::info!(
            "Indexed {} chunks from {}",
            response.chunks_indexed,
            response.file.as_deref().unwrap_or(filename)
        );
        Ok(UploadOutcome::Indexed {
            chunks: response.chunks_indexed,
        })
    }

    /// Saves one note through the note-save flow.
    ///
    /// Missing or empty title or body aborts as a no-op; user
    /// cancellation is indistinguishable from empty input by design.
    /// On success the summary is prepended with a client-generated
    /// creation timestamp, accepted as approximate.
    ///
    /// # Errors
    ///
    /// Returns a transport, API, or parse error when the request fails;
    /// the store is not mutated in that case.
    pub async fn save_note(&self, title: &str, body: &str) -> Result<NoteOutcome> {
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() || body.is_empty() {
            return Ok(NoteOutcome::Rejected);
        }

        let created = self.api.create_note(title, body).await?;
        let summary = NoteSummary {
            id: created.id,
            title: created.title,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.notes.write().await.prepend(summary.clone());
        tracing::info!("Note saved: {} (id {})", summary.title, summary.id);

        Ok(NoteOutcome::Saved(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charla_core::session::DEFAULT_SYSTEM_PROMPT;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn manager_for(server: &MockServer) -> SessionManager {
        SessionManager::new(&ClientConfig::new(server.uri()))
    }

    /// Matches a chat request whose final message is the given user text.
    struct LastUserIs(&'static str);

    impl wiremock::Match for LastUserIs {
        fn matches(&self, request: &Request) -> bool {
            let Ok(body) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
                return false;
            };
            body["messages"]
                .as_array()
                .and_then(|messages| messages.last())
                .and_then(|turn| turn["content"].as_str())
                == Some(self.0)
        }
    }

    async fn mount_chat_answer(server: &MockServer, answer: &str) {
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": answer })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_accepted_send_appends_user_then_assistant() {
        let server = MockServer::start().await;
        mount_chat_answer(&server, "¡Hola!").await;
        let manager = manager_for(&server);

        let outcome = manager.send_message("hola").await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Answered {
                content: "¡Hola!".to_string(),
                sources: Vec::new(),
            }
        );

        let history = manager.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[1].content, "hola");
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(history[2].content, "¡Hola!");
    }

    #[tokio::test]
    async fn test_history_grows_two_per_accepted_send() {
        let server = MockServer::start().await;
        mount_chat_answer(&server, "claro").await;
        let manager = manager_for(&server);

        for i in 0..4 {
            manager.send_message(&format!("mensaje {i}")).await.unwrap();
        }
        assert_eq!(manager.history().await.len(), 1 + 2 * 4);
    }

    #[tokio::test]
    async fn test_empty_send_is_a_noop() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        assert_eq!(manager.send_message("").await.unwrap(), SendOutcome::Rejected);
        assert_eq!(
            manager.send_message("   \t  ").await.unwrap(),
            SendOutcome::Rejected
        );
        assert_eq!(manager.history().await.len(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_answer_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        manager.send_message("hola").await.unwrap();
        let history = manager.history().await;
        assert_eq!(history[2].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_empty_answer_uses_fallback() {
        let server = MockServer::start().await;
        mount_chat_answer(&server, "").await;
        let manager = manager_for(&server);

        manager.send_message("hola").await.unwrap();
        assert_eq!(manager.history().await[2].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_chat_failure_keeps_only_user_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let err = manager.send_message("hola").await.unwrap_err();
        assert!(err.is_api());

        // No rollback of the user's own turn, and no assistant turn.
        let history = manager.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::User);
        assert!(!manager.is_sending());
    }

    #[tokio::test]
    async fn test_toggles_frozen_at_composition() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "tarde" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        let manager = Arc::new(manager_for(&server));

        let sender = Arc::clone(&manager);
        let handle = tokio::spawn(async move { sender.send_message("hola").await });

        // Flip both toggles while the request is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.set_use_rag(false).await;
        manager.set_use_wiki(false).await;

        handle.await.unwrap().unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["use_rag"], json!(true));
        assert_eq!(body["use_wiki"], json!(true));
    }

    #[tokio::test]
    async fn test_back_to_back_sends_keep_per_send_ordering() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(LastUserIs("uno"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "resp-uno" }))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(LastUserIs("dos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "answer": "resp-dos" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let (first, second) = tokio::join!(
            manager.send_message("uno"),
            manager.send_message("dos"),
        );
        first.unwrap();
        second.unwrap();

        let history = manager.history().await;
        assert_eq!(history.len(), 5);

        let position = |content: &str| {
            history
                .iter()
                .position(|turn| turn.content == content)
                .unwrap()
        };
        // Each assistant reply lands strictly after its own user turn.
        assert!(position("uno") < position("resp-uno"));
        assert!(position("dos") < position("resp-dos"));

        // Each dispatched request captured its own consistent prefix:
        // system turn first, its own user turn last.
        for request in server.received_requests().await.unwrap() {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let messages = body["messages"].as_array().unwrap();
            assert_eq!(messages[0]["role"], json!("system"));
            assert_eq!(messages.last().unwrap()["role"], json!("user"));
        }
    }

    #[tokio::test]
    async fn test_answer_sources_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "según tus documentos...",
                "sources": [ { "source": "datos.txt" }, {} ]
            })))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let outcome = manager.send_message("qué dicen mis datos?").await.unwrap();
        match outcome {
            SendOutcome::Answered { sources, .. } => {
                assert_eq!(sources, vec!["datos.txt".to_string()]);
            }
            other => panic!("Expected Answered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_notes_populates_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 5, "title": "reciente", "created_at": "2026-02-01T10:00:00" }
            ])))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        manager.load_notes().await;
        let notes = manager.notes().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, 5);
    }

    #[tokio::test]
    async fn test_failed_notes_fetch_leaves_store_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        manager.load_notes().await;
        assert!(manager.notes().await.is_empty());
    }

    #[tokio::test]
    async fn test_note_save_prepends_at_front() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "title": "vieja", "created_at": "2026-01-01T10:00:00" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/note"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 2, "title": "nueva" })),
            )
            .mount(&server)
            .await;
        let manager = manager_for(&server);
        manager.load_notes().await;

        let outcome = manager.save_note("nueva", "contenido").await.unwrap();
        match outcome {
            NoteOutcome::Saved(summary) => {
                assert_eq!(summary.id, 2);
                assert!(!summary.created_at.is_empty());
            }
            other => panic!("Expected Saved, got {other:?}"),
        }

        let notes = manager.notes().await;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "nueva");
        assert_eq!(notes[1].title, "vieja");
    }

    #[tokio::test]
    async fn test_note_save_with_empty_fields_is_a_noop() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        assert_eq!(
            manager.save_note("", "contenido").await.unwrap(),
            NoteOutcome::Rejected
        );
        assert_eq!(
            manager.save_note("título", "  ").await.unwrap(),
            NoteOutcome::Rejected
        );
        assert!(manager.notes().await.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_note_save_failure_does_not_mutate_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/note"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let err = manager.save_note("título", "contenido").await.unwrap_err();
        assert!(err.is_api());
        assert!(manager.notes().await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_reports_indexed_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "file": "datos.txt", "chunks_indexed": 7 }),
            ))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"contenido de prueba").unwrap();

        let outcome = manager.upload_path(file.path()).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Indexed { chunks: 7 });
        assert_eq!(manager.upload_status().await, "Indexado: 7 fragmentos");
    }

    #[tokio::test]
    async fn test_upload_failure_sets_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500).set_body_string("index down"))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"contenido").unwrap();

        let err = manager.upload_path(file.path()).await.unwrap_err();
        assert!(err.is_api());
        assert!(manager.upload_status().await.starts_with("Error al subir"));
    }

    #[tokio::test]
    async fn test_path_without_filename_is_a_noop() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        let outcome = manager.upload_path(Path::new("/")).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Rejected);
        // The status text stays exactly as it was.
        assert_eq!(manager.upload_status().await, "");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_sets_error_status() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        let err = manager
            .upload_path(Path::new("/no/existe/datos.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, charla_core::CharlaError::Io { .. }));
        assert!(manager.upload_status().await.starts_with("Error al subir"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_system_turn_invariant_across_flows() {
        let server = MockServer::start().await;
        mount_chat_answer(&server, "ok").await;
        Mock::given(method("POST"))
            .and(path("/tools/note"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "title": "nota" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "file": "f.txt", "chunks_indexed": 1 }),
            ))
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"x").unwrap();

        manager.send_message("hola").await.unwrap();
        manager.save_note("nota", "cuerpo").await.unwrap();
        manager.upload_path(file.path()).await.unwrap();
        manager.send_message("y ahora?").await.unwrap();

        let history = manager.history().await;
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(history.len(), 5);
    }
}
