//! Turn orchestration.
//!
//! One turn reads a snapshot of persona state, then issues two independent
//! backend calls from it:
//!
//! 1. **Chat**: compose, generate, split into prose/code, append to the log.
//!    A backend failure becomes a visible error reply.
//! 2. **Reflection**: spawned as its own task under a deadline; its reply is
//!    parsed into trait and memory writes. Any failure leaves state unchanged.
//!
//! The reply is returned as soon as the chat half finishes. The reflection
//! half comes back as a [`ReflectionHandle`] the caller may await or drop.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::context_window::{ContextWindowBuilder, TrimPolicy};
use super::prompts::{PersonaSnapshot, PromptComposer, ReflectionPrompt};
use super::reflection::{apply_directives, parse_reflection, AppliedReflection, ReflectionDirectives};
use super::response_splitter::split_response;
use crate::llms::base_llm::{generate_with_timeout, TextGenerator, DEFAULT_REQUEST_TIMEOUT};
use crate::memory::storage::StateHandle;
use crate::persona::{NewInteraction, CURIOSITY, DEFAULT_CURIOSITY};

/// Default deadline for the reflection call.
pub const DEFAULT_REFLECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Prefix of the reply shown when the chat call fails.
pub const CHAT_ERROR_PREFIX: &str = "Error generating response";

/// Tunables for [`PersonaEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub persona_name: String,
    /// Interactions pulled into the context window.
    pub context_turns: usize,
    /// Line cap on the context window.
    pub max_transcript_lines: usize,
    pub chat_timeout: Duration,
    pub reflection_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persona_name: crate::persona::DEFAULT_PERSONA_NAME.to_string(),
            context_turns: super::context_window::DEFAULT_CONTEXT_TURNS,
            max_transcript_lines: super::context_window::DEFAULT_MAX_LINES,
            chat_timeout: DEFAULT_REQUEST_TIMEOUT,
            reflection_timeout: DEFAULT_REFLECTION_TIMEOUT,
        }
    }
}

/// The user-facing result of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub prose: String,
    pub code: Option<String>,
    /// Fence language, `"text"` when there is no tag or no block.
    pub language: String,
    /// Unsplit backend text; this is what the log stores.
    #[serde(skip)]
    pub raw: String,
    /// True when `prose` is the error sentinel rather than a model reply.
    pub failed: bool,
}

/// How the reflection half of a turn ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReflectionOutcome {
    /// The reply was parsed; `applied` lists what was written.
    Applied {
        directives: ReflectionDirectives,
        applied: AppliedReflection,
    },
    /// The backend call failed or timed out. Nothing was written.
    BackendFailed { error: String },
    /// The task was cancelled or panicked.
    Aborted { error: String },
}

impl ReflectionOutcome {
    /// True when at least one store write happened.
    pub fn changed_state(&self) -> bool {
        match self {
            ReflectionOutcome::Applied { applied, .. } => {
                applied.trait_written.is_some() || !applied.memories_written.is_empty()
            }
            _ => false,
        }
    }
}

/// The running reflection task of one turn.
#[derive(Debug)]
pub struct ReflectionHandle {
    turn_id: Uuid,
    task: JoinHandle<ReflectionOutcome>,
}

impl ReflectionHandle {
    /// Wait for the reflection to finish.
    pub async fn wait(self) -> ReflectionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(turn_id = %self.turn_id, error = %e, "reflection task aborted");
                ReflectionOutcome::Aborted {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Let the reflection finish in the background. It still logs its result.
    pub fn detach(self) {
        tracing::debug!(turn_id = %self.turn_id, "reflection detached");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Result of [`PersonaEngine::turn`].
#[derive(Debug)]
pub struct ChatTurn {
    pub turn_id: Uuid,
    pub reply: ChatReply,
    /// Log sequence id, `None` when the chat call failed or the append failed.
    pub interaction_id: Option<i64>,
    pub reflection: ReflectionHandle,
}

/// Drives turns for one persona over one set of stores.
#[derive(Clone)]
pub struct PersonaEngine {
    state: StateHandle,
    generator: Arc<dyn TextGenerator>,
    composer: PromptComposer,
    window: ContextWindowBuilder,
    settings: EngineSettings,
}

impl std::fmt::Debug for PersonaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaEngine")
            .field("generator", &self.generator)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PersonaEngine {
    pub fn new(state: StateHandle, generator: Arc<dyn TextGenerator>, settings: EngineSettings) -> Self {
        let composer = PromptComposer::new(settings.persona_name.clone());
        let window = ContextWindowBuilder::new(
            settings.context_turns,
            settings.persona_name.clone(),
            TrimPolicy::MaxLines(settings.max_transcript_lines),
        );
        Self {
            state,
            generator,
            composer,
            window,
            settings,
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn window(&self) -> &ContextWindowBuilder {
        &self.window
    }

    /// Current curiosity, falling back to the default on absence or a read
    /// failure so a prompt can always be composed.
    pub fn current_curiosity(&self) -> f64 {
        match self.state.traits.trait_value_or_default(CURIOSITY) {
            Ok(value) => value.unwrap_or(DEFAULT_CURIOSITY),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read curiosity, using default");
                DEFAULT_CURIOSITY
            }
        }
    }

    /// Context window from the log; empty on a read failure.
    pub fn context_window(&self) -> Vec<String> {
        self.window
            .build(self.state.interactions.as_ref())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to load context window");
                Vec::new()
            })
    }

    /// Snapshot with the context window rebuilt from the log.
    pub fn snapshot(&self) -> PersonaSnapshot {
        PersonaSnapshot {
            curiosity: self.current_curiosity(),
            transcript: self.context_window(),
        }
    }

    /// Run one turn with the context window rebuilt from the log.
    pub async fn turn(&self, actor: &str, utterance: &str) -> ChatTurn {
        let snapshot = self.snapshot();
        self.run_turn(actor, utterance, snapshot).await
    }

    /// Run one turn with a caller-maintained transcript (the CLI buffer).
    pub async fn turn_with_transcript(
        &self,
        actor: &str,
        utterance: &str,
        transcript: Vec<String>,
    ) -> ChatTurn {
        let snapshot = PersonaSnapshot {
            curiosity: self.current_curiosity(),
            transcript,
        };
        self.run_turn(actor, utterance, snapshot).await
    }

    async fn run_turn(&self, actor: &str, utterance: &str, snapshot: PersonaSnapshot) -> ChatTurn {
        let turn_id = Uuid::new_v4();
        tracing::info!(%turn_id, actor, chars = utterance.len(), "turn started");

        let reflection = self.spawn_reflection(
            turn_id,
            self.composer.reflection_prompt(&snapshot, utterance),
        );

        let chat_prompt = self.composer.chat_prompt(&snapshot, actor, utterance);
        let reply = match generate_with_timeout(
            self.generator.as_ref(),
            chat_prompt.as_str(),
            self.settings.chat_timeout,
        )
        .await
        {
            Ok(raw) => {
                let raw = raw.trim().to_string();
                tracing::debug!(%turn_id, response = %raw, "chat response");
                let split = split_response(&raw);
                ChatReply {
                    language: split.language_or_default().to_string(),
                    prose: split.prose,
                    code: split.code,
                    raw,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::error!(%turn_id, error = %e, "chat generation failed");
                let message = format!("{}: {}", CHAT_ERROR_PREFIX, e);
                ChatReply {
                    prose: message.clone(),
                    code: None,
                    language: crate::chat::response_splitter::DEFAULT_LANGUAGE.to_string(),
                    raw: message,
                    failed: true,
                }
            }
        };

        let interaction_id = if reply.failed {
            None
        } else {
            match self
                .state
                .interactions
                .append_interaction(&NewInteraction::new(actor, utterance, reply.raw.clone()))
            {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!(%turn_id, error = %e, "failed to save interaction");
                    None
                }
            }
        };

        tracing::info!(%turn_id, failed = reply.failed, has_code = reply.code.is_some(), "turn replied");
        ChatTurn {
            turn_id,
            reply,
            interaction_id,
            reflection,
        }
    }

    fn spawn_reflection(&self, turn_id: Uuid, prompt: ReflectionPrompt) -> ReflectionHandle {
        let generator = Arc::clone(&self.generator);
        let state = self.state.clone();
        let timeout = self.settings.reflection_timeout;

        let task = tokio::spawn(async move {
            let outcome = reflect(generator.as_ref(), &state, &prompt, timeout).await;
            match &outcome {
                ReflectionOutcome::Applied { applied, .. } => tracing::info!(
                    %turn_id,
                    trait_written = ?applied.trait_written,
                    memories = applied.memories_written.len(),
                    failures = applied.failures.len(),
                    "reflection applied"
                ),
                ReflectionOutcome::BackendFailed { error } => {
                    tracing::warn!(%turn_id, %error, "reflection skipped, state unchanged")
                }
                ReflectionOutcome::Aborted { .. } => {}
            }
            outcome
        });

        ReflectionHandle { turn_id, task }
    }
}

/// The reflection pass: generate, parse, apply. Never returns an error.
pub async fn reflect(
    generator: &dyn TextGenerator,
    state: &StateHandle,
    prompt: &ReflectionPrompt,
    timeout: Duration,
) -> ReflectionOutcome {
    let raw = match generate_with_timeout(generator, prompt.as_str(), timeout).await {
        Ok(raw) => raw,
        Err(e) => {
            return ReflectionOutcome::BackendFailed {
                error: e.to_string(),
            }
        }
    };
    tracing::debug!(response = %raw, "reflection response");

    let directives = parse_reflection(&raw);
    for ambiguity in &directives.ambiguities {
        tracing::debug!(%ambiguity, "reflection ambiguity");
    }

    let applied = apply_directives(&directives, state);
    ReflectionOutcome::Applied {
        directives,
        applied,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::storage::{InMemoryStore, InteractionLog, MemoryStore, TraitStore};
    use crate::persona::{Interaction, PersonaTrait};
    use crate::utilities::errors::{BackendError, StorageError, StorageResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Backend double that answers chat and reflection prompts from a script.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedGenerator {
        pub chat: Option<String>,
        pub reflection: Option<String>,
        pub reflection_delay: Duration,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(chat: &str, reflection: &str) -> Self {
            Self {
                chat: Some(chat.to_string()),
                reflection: Some(reflection.to_string()),
                ..Self::default()
            }
        }

        pub(crate) fn chat_prompts(&self) -> Vec<String> {
            self.prompts
                .lock()
                .iter()
                .filter(|p| p.starts_with("You are"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
            self.prompts.lock().push(prompt.to_string());
            let scripted = if prompt.starts_with("You are") {
                self.chat.clone()
            } else {
                if !self.reflection_delay.is_zero() {
                    tokio::time::sleep(self.reflection_delay).await;
                }
                self.reflection.clone()
            };
            scripted.ok_or_else(|| BackendError::Transport {
                message: "connection refused".to_string(),
            })
        }
    }

    /// Store double whose every write is rejected.
    #[derive(Debug, Default)]
    pub(crate) struct RejectingStore;

    fn rejected() -> StorageError {
        StorageError::InvalidRecord {
            message: "store is read-only".to_string(),
        }
    }

    impl TraitStore for RejectingStore {
        fn get_trait(&self, _name: &str) -> StorageResult<Option<PersonaTrait>> {
            Ok(None)
        }

        fn set_trait(&self, _name: &str, _value: f64) -> StorageResult<()> {
            Err(rejected())
        }

        fn list_traits(&self) -> StorageResult<Vec<PersonaTrait>> {
            Ok(Vec::new())
        }
    }

    impl InteractionLog for RejectingStore {
        fn append_interaction(&self, _interaction: &NewInteraction) -> StorageResult<i64> {
            Err(rejected())
        }

        fn recent_interactions(&self, _limit: usize) -> StorageResult<Vec<Interaction>> {
            Ok(Vec::new())
        }
    }

    fn engine_with(generator: ScriptedGenerator) -> (Arc<InMemoryStore>, Arc<ScriptedGenerator>, PersonaEngine) {
        let store = Arc::new(InMemoryStore::seeded());
        let generator = Arc::new(generator);
        let engine = PersonaEngine::new(
            StateHandle::from_backend(store.clone()),
            generator.clone(),
            EngineSettings::default(),
        );
        (store, generator, engine)
    }

    #[tokio::test]
    async fn test_turn_splits_reply_and_applies_reflection() {
        let (store, _gen, engine) = engine_with(ScriptedGenerator::new(
            "Here.\n```python\nprint(1)\n```",
            "Curiosity should rise to 7.5.\nForm a memory:\nLabel: Bob Content: Asked for code",
        ));

        let turn = engine.turn("bob", "show me code").await;
        assert_eq!(turn.reply.prose, "Here.");
        assert_eq!(turn.reply.code.as_deref(), Some("print(1)"));
        assert_eq!(turn.reply.language, "python");
        assert!(!turn.reply.failed);
        assert_eq!(turn.interaction_id, Some(1));

        let outcome = turn.reflection.wait().await;
        assert!(outcome.changed_state());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 7.5);
        assert_eq!(store.get_memory("Bob").unwrap().unwrap().content, "Asked for code");

        let logged = store.recent_interactions(5).unwrap();
        assert_eq!(logged[0].response, "Here.\n```python\nprint(1)\n```");
    }

    #[tokio::test]
    async fn test_chat_failure_is_visible_and_not_logged() {
        let (store, _gen, engine) = engine_with(ScriptedGenerator {
            chat: None,
            reflection: Some("curiosity: 6".to_string()),
            ..ScriptedGenerator::default()
        });

        let turn = engine.turn("bob", "hello").await;
        assert!(turn.reply.failed);
        assert!(turn.reply.prose.starts_with("Error generating response:"));
        assert!(turn.reply.code.is_none());
        assert_eq!(turn.reply.language, "text");
        assert!(turn.interaction_id.is_none());
        assert!(store.recent_interactions(5).unwrap().is_empty());

        // reflection is independent of the chat call
        turn.reflection.wait().await;
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 6.0);
    }

    #[tokio::test]
    async fn test_reflection_failure_leaves_state_unchanged() {
        let (store, _gen, engine) = engine_with(ScriptedGenerator {
            chat: Some("Greetings, traveler.".to_string()),
            reflection: None,
            ..ScriptedGenerator::default()
        });

        let turn = engine.turn("amy", "hi").await;
        assert_eq!(turn.reply.prose, "Greetings, traveler.");
        let outcome = turn.reflection.wait().await;
        assert!(matches!(outcome, ReflectionOutcome::BackendFailed { .. }));
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);
        assert_eq!(store.recent_interactions(5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_reflection_does_not_block_reply() {
        let (store, _gen, engine) = engine_with(ScriptedGenerator {
            reflection_delay: Duration::from_millis(500),
            ..ScriptedGenerator::new("Hm.", "curiosity 9")
        });

        let turn = engine.turn("amy", "a riddle").await;
        assert_eq!(turn.reply.prose, "Hm.");
        assert!(!turn.reflection.is_finished());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);

        turn.reflection.wait().await;
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 9.0);
    }

    #[tokio::test]
    async fn test_reflection_timeout_is_fail_open() {
        let store = Arc::new(InMemoryStore::seeded());
        let generator = Arc::new(ScriptedGenerator {
            reflection_delay: Duration::from_secs(5),
            ..ScriptedGenerator::new("ok", "curiosity 1")
        });
        let engine = PersonaEngine::new(
            StateHandle::from_backend(store.clone()),
            generator,
            EngineSettings {
                reflection_timeout: Duration::from_millis(50),
                ..EngineSettings::default()
            },
        );

        let outcome = engine.turn("amy", "hi").await.reflection.wait().await;
        match outcome {
            ReflectionOutcome::BackendFailed { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);
    }

    #[tokio::test]
    async fn test_malformed_reflection_never_fails_turn() {
        let (store, _gen, engine) =
            engine_with(ScriptedGenerator::new("Sure.", "curiosity??? memory!!! label: content:"));
        let turn = engine.turn("amy", "hi").await;
        assert_eq!(turn.reply.prose, "Sure.");
        let outcome = turn.reflection.wait().await;
        assert!(!outcome.changed_state());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);
        assert!(store.list_recent_memories(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_in_context() {
        let (_store, generator, engine) = engine_with(ScriptedGenerator::new("Hello Bob.", "nothing"));

        engine.turn("bob", "I'm Bob").await.reflection.wait().await;
        engine.turn("bob", "Remember me?").await.reflection.wait().await;

        let prompts = generator.chat_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("bob: I'm Bob\nZoral: Hello Bob.\nbob: Remember me?\nZoral:"));
        assert!(prompts[1].contains("curiosity level of 5.0/10"));
    }

    #[tokio::test]
    async fn test_turn_with_transcript_uses_given_lines() {
        let (_store, generator, engine) = engine_with(ScriptedGenerator::new("Yes.", "nothing"));
        let turn = engine
            .turn_with_transcript("cli", "well?", vec!["cli: earlier".to_string()])
            .await;
        turn.reflection.wait().await;
        assert!(generator.chat_prompts()[0].contains("Past interactions:\ncli: earlier\ncli: well?"));
    }

    #[tokio::test]
    async fn test_failed_log_append_still_returns_reply() {
        let memories = Arc::new(InMemoryStore::seeded());
        let rejecting = Arc::new(RejectingStore);
        let engine = PersonaEngine::new(
            StateHandle::new(memories.clone(), memories.clone(), rejecting),
            Arc::new(ScriptedGenerator::new("Still here.", "curiosity 6")),
            EngineSettings::default(),
        );

        let turn = engine.turn("amy", "hello").await;
        assert_eq!(turn.reply.prose, "Still here.");
        assert!(!turn.reply.failed);
        assert!(turn.interaction_id.is_none());

        turn.reflection.wait().await;
        assert_eq!(memories.get_trait("curiosity").unwrap().unwrap().value, 6.0);
    }

    #[tokio::test]
    async fn test_failed_trait_write_does_not_stop_memory_writes() {
        let store = Arc::new(InMemoryStore::seeded());
        let engine = PersonaEngine::new(
            StateHandle::new(Arc::new(RejectingStore), store.clone(), store.clone()),
            Arc::new(ScriptedGenerator::new(
                "Noted.",
                "curiosity: 8\nmemory\nLabel: Alice Content: She is friendly\nLabel: Bob Content: He plays chess",
            )),
            EngineSettings::default(),
        );

        let outcome = engine.turn("amy", "hi").await.reflection.wait().await;
        match &outcome {
            ReflectionOutcome::Applied { applied, .. } => {
                assert_eq!(applied.trait_written, None);
                assert_eq!(applied.failures.len(), 1);
                assert!(applied.failures[0].contains("read-only"));
                assert_eq!(applied.memories_written, vec!["Alice".to_string(), "Bob".to_string()]);
            }
            other => panic!("expected applied reflection, got {:?}", other),
        }
        assert!(outcome.changed_state());
        assert_eq!(store.get_trait("curiosity").unwrap().unwrap().value, 5.0);
        assert_eq!(store.get_memory("Bob").unwrap().unwrap().content, "He plays chess");
    }
}
