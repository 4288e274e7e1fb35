//! One conversational turn: history → prompt → model → reply → history.

use crate::generator::{GenerationError, TextGenerator};
use crate::prompt::{build_prompt, extract_reply, stream_words, APOLOGY};
use crate::session::{Exchange, SessionStore};
use std::sync::Arc;
use std::time::Duration;

/// Result of a chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Reply as recorded in the session history
    pub reply: String,
    /// Chunks for the streamed response body
    pub chunks: Vec<String>,
}

/// Runs chat turns against a shared session store and generator.
pub struct ChatService {
    store: Arc<SessionStore>,
    generator: Arc<dyn TextGenerator>,
    instruction: String,
    timeout: Option<Duration>,
}

impl ChatService {
    pub fn new(
        store: Arc<SessionStore>,
        generator: Arc<dyn TextGenerator>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            instruction: instruction.into(),
            timeout: None,
        }
    }

    /// Bound each generation call. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer `message` in the context of `session_id` and record the exchange.
    ///
    /// Generation failures never surface as errors: they are logged and the
    /// fixed apology takes the place of the reply.
    pub async fn respond(&self, session_id: &str, message: &str) -> ChatReply {
        let history = self.store.get_or_create(session_id);
        let prompt = build_prompt(&self.instruction, &history, message);

        tracing::debug!(
            session_id = %session_id,
            history_len = history.len(),
            prompt_chars = prompt.chars().count(),
            "Generating reply"
        );

        let chunks = match self.generate(&prompt).await {
            Ok(raw) => stream_words(&extract_reply(&raw)),
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    backend = self.generator.name(),
                    error = %e,
                    "Error generating response"
                );
                vec![APOLOGY.to_string()]
            }
        };

        let reply = chunks.concat();

        self.store
            .append(session_id, Exchange::new(message, reply.clone()));

        ChatReply { reply, chunks }
    }

    /// Full transcript (prompt plus continuation) for reply extraction.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let call = self.generator.generate(prompt);
        let continuation = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GenerationError::Timeout {
                    backend: self.generator.name().to_string(),
                    secs: limit.as_secs(),
                }
            })??,
            None => call.await?,
        };

        if self.generator.echoes_prompt() {
            Ok(continuation)
        } else {
            Ok(format!("{prompt}{continuation}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns canned continuations and records every prompt it sees.
    struct ScriptedGenerator {
        continuation: Result<String, ()>,
        echo: bool,
        delay: Option<Duration>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn replying(continuation: &str) -> Self {
            Self {
                continuation: Ok(continuation.to_string()),
                echo: false,
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                continuation: Err(()),
                ..Self::replying("")
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn echoes_prompt(&self) -> bool {
            self.echo
        }

        async fn probe(&self) -> Result<(), GenerationError> {
            Ok(())
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.continuation {
                Ok(text) if self.echo => Ok(format!("{prompt}{text}")),
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(GenerationError::Request {
                    backend: "scripted".into(),
                    message: "connection refused".into(),
                }),
            }
        }
    }

    fn service(generator: Arc<ScriptedGenerator>) -> (ChatService, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::default());
        let service = ChatService::new(Arc::clone(&store), generator, "Be kind.");
        (service, store)
    }

    #[tokio::test]
    async fn test_respond_records_exchange() {
        let generator = Arc::new(ScriptedGenerator::replying(" That sounds tough.\nUser: ok"));
        let (service, store) = service(Arc::clone(&generator));

        let reply = service.respond("s1", "I had a bad day").await;

        assert_eq!(reply.reply, "That sounds tough.");
        assert_eq!(reply.chunks, vec!["That ", "sounds ", "tough."]);
        assert_eq!(
            store.history("s1").unwrap(),
            vec![Exchange::new("I had a bad day", "That sounds tough.")]
        );
        assert_eq!(generator.prompts(), vec!["Be kind.\n\nUser: I had a bad day\nAssistant:"]);
    }

    #[tokio::test]
    async fn test_respond_includes_history_in_prompt() {
        let generator = Arc::new(ScriptedGenerator::replying(" Noted."));
        let (service, _store) = service(Arc::clone(&generator));

        service.respond("s1", "first").await;
        service.respond("s1", "second").await;

        let prompts = generator.prompts();
        assert!(prompts[1].contains("User: first\nAssistant: Noted.\n\n"));
        assert!(prompts[1].ends_with("User: second\nAssistant:"));
    }

    #[tokio::test]
    async fn test_respond_with_echoing_backend() {
        let generator = Arc::new(ScriptedGenerator {
            echo: true,
            ..ScriptedGenerator::replying(" Breathe slowly.")
        });
        let (service, _store) = service(generator);

        let reply = service.respond("s1", "help").await;
        assert_eq!(reply.reply, "Breathe slowly.");
    }

    #[tokio::test]
    async fn test_generation_failure_substitutes_apology() {
        let (service, store) = service(Arc::new(ScriptedGenerator::failing()));

        let reply = service.respond("s1", "hello").await;

        assert_eq!(reply.reply, APOLOGY);
        assert_eq!(reply.chunks, vec![APOLOGY]);
        assert_eq!(store.history("s1").unwrap()[0].assistant, APOLOGY);
    }

    #[tokio::test]
    async fn test_timeout_substitutes_apology() {
        let generator = Arc::new(ScriptedGenerator {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedGenerator::replying(" too late")
        });
        let (service, _store) = service(generator);
        let service = service.with_timeout(Some(Duration::from_millis(10)));

        let reply = service.respond("s1", "hello").await;
        assert_eq!(reply.chunks, vec![APOLOGY]);
    }

    #[tokio::test]
    async fn test_reply_whitespace_is_collapsed() {
        let (service, store) = service(Arc::new(ScriptedGenerator::replying(" One\n\ntwo   three ")));

        let reply = service.respond("s1", "hi").await;
        assert_eq!(reply.reply, "One two three");
        assert_eq!(store.history("s1").unwrap()[0].assistant, "One two three");
    }

    #[tokio::test]
    async fn test_history_capped_across_turns() {
        let (service, store) = service(Arc::new(ScriptedGenerator::replying(" ok")));

        for n in 0..7 {
            service.respond("s1", &format!("message {n}")).await;
        }

        let history = store.history("s1").unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].user, "message 2");
    }

    #[tokio::test]
    async fn test_clear_forgets_history() {
        let generator = Arc::new(ScriptedGenerator::replying(" ok"));
        let (service, store) = service(Arc::clone(&generator));

        service.respond("s1", "remember this").await;
        store.clear("s1");
        service.respond("s1", "fresh start").await;

        let prompts = generator.prompts();
        assert!(!prompts[1].contains("remember this"));
        assert_eq!(store.history("s1").unwrap().len(), 1);
    }
}
