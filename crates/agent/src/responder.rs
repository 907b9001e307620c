use promobot_core::prompt::PromptAssembler;
use promobot_core::{Catalog, ConversationState, PromptError};
use thiserror::Error;
use tracing::debug;

use crate::llm::{CompletionClient, CompletionError};

#[derive(Debug, Error)]
pub enum RespondError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl RespondError {
    pub fn is_missing_user_message(&self) -> bool {
        matches!(self, Self::Prompt(PromptError::MissingUserMessage))
    }
}

/// Generates the next reply to the supplier from the dialogue log.
///
/// Exactly one completion request per invocation; no batching, streaming, or
/// caching. On success the reply is appended to both logs; on failure
/// nothing assistant-side is appended, so the caller can surface a fallback
/// and let the user retry.
pub struct DialogueResponder<C> {
    client: C,
    assembler: PromptAssembler,
    catalog: Catalog,
}

impl<C> DialogueResponder<C>
where
    C: CompletionClient,
{
    pub fn new(client: C, catalog: Catalog) -> Self {
        Self { client, assembler: PromptAssembler::new(), catalog }
    }

    pub async fn respond(&self, state: &mut ConversationState) -> Result<String, RespondError> {
        // The precondition check happens before any endpoint call: prompt
        // assembly rejects a log with no user turn.
        let prompt = self.assembler.dialogue_prompt(state, &self.catalog)?;
        let raw = self.client.complete(&prompt).await?;
        let reply = first_line(&raw).to_owned();

        state.record_assistant(reply.clone());
        debug!(
            event_name = "agent.responder.reply_generated",
            reply_chars = reply.chars().count(),
            "dialogue responder produced a reply"
        );
        Ok(reply)
    }
}

/// Everything up to (not including) the first line break.
fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default().trim_end_matches('\r')
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use promobot_core::{Catalog, ConversationState, Message, Role};

    use super::{first_line, DialogueResponder};
    use crate::llm::{CompletionClient, CompletionError};

    /// Records every submitted prompt; replies with a fixed script.
    struct RecordingClient {
        reply: Result<String, CompletionError>,
        prompts: Mutex<Vec<Vec<Message>>>,
    }

    impl RecordingClient {
        fn replying(reply: &str) -> Self {
            Self { reply: Ok(reply.to_owned()), prompts: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self {
                reply: Err(CompletionError::Transport("connection reset".to_owned())),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.prompts.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
            self.prompts.lock().expect("lock").push(messages.to_vec());
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn missing_user_message_fails_before_any_endpoint_call() {
        let responder =
            DialogueResponder::new(RecordingClient::replying("ответ"), Catalog::default());
        let mut state = ConversationState::new();

        let error = responder.respond(&mut state).await.expect_err("no user turn");
        assert!(error.is_missing_user_message());
        assert_eq!(responder.client.call_count(), 0);
    }

    #[tokio::test]
    async fn reply_is_the_first_line_and_lands_in_both_logs() {
        let responder = DialogueResponder::new(
            RecordingClient::replying("Hello there.\nHow can I help?"),
            Catalog::default(),
        );
        let mut state = ConversationState::new();
        state.record_user("hi");

        let reply = responder.respond(&mut state).await.expect("respond");

        assert_eq!(reply, "Hello there.");
        assert_eq!(
            state.dialogue_log().last(),
            Some(&Message::assistant("Hello there."))
        );
        assert_eq!(
            state.stage_analysis_log().last(),
            Some(&Message::assistant("Hello there."))
        );
        assert_eq!(responder.client.call_count(), 1);
    }

    #[tokio::test]
    async fn assembled_prompt_carries_the_product_mapping() {
        let responder =
            DialogueResponder::new(RecordingClient::replying("Принято."), Catalog::default());
        let mut state = ConversationState::new();
        state.record_user("Я хочу акцию на Несквик со скидкой 10% на март");

        responder.respond(&mut state).await.expect("respond");

        let prompts = responder.client.prompts.lock().expect("lock");
        let submitted = prompts.first().expect("one call");
        assert!(submitted
            .iter()
            .filter(|message| message.role == Role::System)
            .any(|message| message.text.contains("\"Несквик\": \"12345\"")));
    }

    #[tokio::test]
    async fn completion_failure_leaves_the_assistant_side_untouched() {
        let responder = DialogueResponder::new(RecordingClient::failing(), Catalog::default());
        let mut state = ConversationState::new();
        state.record_user("hi");
        let log_len_before = state.dialogue_log().len();

        let error = responder.respond(&mut state).await.expect_err("transport failure");
        assert!(!error.is_missing_user_message());
        assert_eq!(state.dialogue_log().len(), log_len_before);
        assert!(state.dialogue_log().iter().all(|message| message.role != Role::Assistant));
    }

    #[test]
    fn first_line_handles_crlf_and_empty_input() {
        assert_eq!(first_line("Hello there.\r\nrest"), "Hello there.");
        assert_eq!(first_line("single line"), "single line");
        assert_eq!(first_line(""), "");
    }
}
