//! Per-chat session state and the text-message workflow.

use std::collections::HashMap;

use async_trait::async_trait;
use promobot_agent::{
    ClassifyError, CompletionClient, DialogueResponder, RespondError, StageClassifier,
};
use promobot_core::{ApplicationError, Catalog, ConversationState, DomainError, PromptError};
use promobot_telegram::events::{
    EventContext, EventHandlerError, SessionService, TextMessageEvent, LAUNCH_NOTICE, STOP_NOTICE,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns one [`ConversationState`] per chat id and runs the two-model
/// workflow for every incoming text: classify the stage from one log,
/// generate the reply from the other.
///
/// The state for a chat is taken out of the map before any completion call
/// and reinserted afterwards, so the map lock is never held across an await
/// on the endpoint. Messages from different chats therefore proceed
/// concurrently; messages within one chat are serialized by the poll loop.
pub struct SessionController<C> {
    sessions: Mutex<HashMap<i64, ConversationState>>,
    classifier: StageClassifier<C>,
    responder: DialogueResponder<C>,
}

impl<C> SessionController<C>
where
    C: CompletionClient + Clone,
{
    pub fn new(client: C, catalog: Catalog) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            classifier: StageClassifier::new(client.clone()),
            responder: DialogueResponder::new(client, catalog),
        }
    }

    /// Snapshot of a chat's state, if a session exists.
    pub async fn session_snapshot(&self, chat_id: i64) -> Option<ConversationState> {
        self.sessions.lock().await.get(&chat_id).cloned()
    }
}

fn classify_failure(error: ClassifyError) -> ApplicationError {
    match error {
        ClassifyError::Prompt(PromptError::MissingUserMessage) => {
            ApplicationError::Domain(DomainError::MissingUserMessage)
        }
        ClassifyError::Prompt(PromptError::Render(source)) => {
            ApplicationError::Configuration(source.to_string())
        }
        ClassifyError::Completion(source) => ApplicationError::Completion(source.to_string()),
    }
}

fn respond_failure(error: RespondError) -> ApplicationError {
    match error {
        RespondError::Prompt(PromptError::MissingUserMessage) => {
            ApplicationError::Domain(DomainError::MissingUserMessage)
        }
        RespondError::Prompt(PromptError::Render(source)) => {
            ApplicationError::Configuration(source.to_string())
        }
        RespondError::Completion(source) => ApplicationError::Completion(source.to_string()),
    }
}

#[async_trait]
impl<C> SessionService for SessionController<C>
where
    C: CompletionClient + Clone,
{
    async fn start_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        self.sessions.lock().await.insert(chat_id, ConversationState::new());
        info!(
            event_name = "session.started",
            correlation_id = %ctx.correlation_id,
            chat_id,
            "session initialized"
        );
        Ok(LAUNCH_NOTICE.to_owned())
    }

    async fn end_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        let removed = self.sessions.lock().await.remove(&chat_id).is_some();
        info!(
            event_name = "session.ended",
            correlation_id = %ctx.correlation_id,
            chat_id,
            removed,
            "session torn down"
        );
        Ok(STOP_NOTICE.to_owned())
    }

    /// The full per-message workflow. Failures never bubble out as handler
    /// errors; the supplier always receives a Russian reply, either the
    /// generated one or a fixed fallback.
    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        let mut state = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&event.chat_id).unwrap_or_else(ConversationState::new)
        };

        state.record_user(event.text.clone());

        match self.classifier.classify(&state).await {
            Ok(stage) => {
                state.set_stage(stage);
                info!(
                    event_name = "session.stage_classified",
                    correlation_id = %ctx.correlation_id,
                    chat_id = event.chat_id,
                    stage = %stage,
                    "stage classifier updated the session"
                );
            }
            Err(error) => {
                // The previous stage label stays; classification is advisory
                // and must not block the dialogue reply.
                let application = classify_failure(error);
                warn!(
                    event_name = "session.stage_classification_failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = event.chat_id,
                    error = %application,
                    "stage classification failed; keeping previous stage"
                );
            }
        }

        let reply = match self.responder.respond(&mut state).await {
            Ok(reply) => reply,
            Err(error) => {
                let interface =
                    respond_failure(error).into_interface(ctx.correlation_id.clone());
                warn!(
                    event_name = "session.reply_generation_failed",
                    correlation_id = %ctx.correlation_id,
                    chat_id = event.chat_id,
                    error = %interface,
                    "reply generation failed; sending fallback notice"
                );
                interface.user_message().to_owned()
            }
        };

        self.sessions.lock().await.insert(event.chat_id, state);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use promobot_agent::{CompletionClient, CompletionError};
    use promobot_core::{Catalog, Message, Role, Stage};
    use promobot_telegram::events::{
        EventContext, SessionService, TextMessageEvent, LAUNCH_NOTICE, STOP_NOTICE,
    };

    use super::SessionController;

    /// Pops one scripted result per completion call; shared across clones.
    #[derive(Clone)]
    struct ScriptedClient {
        replies: Arc<Mutex<VecDeque<Result<String, CompletionError>>>>,
    }

    impl ScriptedClient {
        fn with_replies(replies: Vec<Result<String, CompletionError>>) -> Self {
            Self { replies: Arc::new(Mutex::new(replies.into())) }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, CompletionError> {
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_owned())))
        }
    }

    fn text_event(chat_id: i64, text: &str) -> TextMessageEvent {
        TextMessageEvent { chat_id, user_id: Some(1), text: text.to_owned() }
    }

    #[tokio::test]
    async fn text_message_runs_classification_and_reply_generation() {
        // First completion answers the classifier, second the responder.
        let client = ScriptedClient::with_replies(vec![
            Ok("2".to_owned()),
            Ok("Скидка 10% на Несквик принята.\nлишняя строка".to_owned()),
        ]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        controller.start_session(42, &ctx).await.expect("start");
        let reply = controller
            .handle_text(&text_event(42, "Хочу акцию на Несквик со скидкой 10%"), &ctx)
            .await
            .expect("handle text");

        assert_eq!(reply, "Скидка 10% на Несквик принята.");

        let state = controller.session_snapshot(42).await.expect("session exists");
        assert_eq!(state.current_stage(), Stage::Discount);
        assert_eq!(state.dialogue_log().last(), Some(&Message::assistant(reply.as_str())));
        assert!(state
            .dialogue_log()
            .iter()
            .any(|message| message.role == Role::User
                && message.text == "Хочу акцию на Несквик со скидкой 10%"));
    }

    #[tokio::test]
    async fn text_without_prior_start_creates_a_session() {
        let client = ScriptedClient::with_replies(vec![
            Ok("1".to_owned()),
            Ok("Какой товар вас интересует?".to_owned()),
        ]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        let reply =
            controller.handle_text(&text_event(7, "привет"), &ctx).await.expect("handle text");

        assert_eq!(reply, "Какой товар вас интересует?");
        assert!(controller.session_snapshot(7).await.is_some());
    }

    #[tokio::test]
    async fn completion_failure_yields_fallback_and_no_assistant_turn() {
        let client = ScriptedClient::with_replies(vec![
            Err(CompletionError::Transport("connection reset".to_owned())),
            Err(CompletionError::Transport("connection reset".to_owned())),
        ]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        controller.start_session(5, &ctx).await.expect("start");
        let reply = controller.handle_text(&text_event(5, "запрос"), &ctx).await.expect("fallback");

        assert_eq!(reply, "Сервис временно недоступен. Попробуйте повторить запрос чуть позже.");

        let state = controller.session_snapshot(5).await.expect("session kept");
        assert!(state.dialogue_log().iter().all(|message| message.role != Role::Assistant));
        // The user's turn stays so a retry continues the same conversation.
        assert!(state.dialogue_log().iter().any(|message| message.role == Role::User));
    }

    #[tokio::test]
    async fn classification_failure_keeps_previous_stage_but_still_replies() {
        let client = ScriptedClient::with_replies(vec![
            Err(CompletionError::Status { code: 503 }),
            Ok("Уточните, пожалуйста, период акции.".to_owned()),
        ]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        controller.start_session(9, &ctx).await.expect("start");
        let reply = controller.handle_text(&text_event(9, "акция"), &ctx).await.expect("reply");

        assert_eq!(reply, "Уточните, пожалуйста, период акции.");
        let state = controller.session_snapshot(9).await.expect("session kept");
        assert_eq!(state.current_stage(), Stage::Intake);
    }

    #[tokio::test]
    async fn start_resets_an_existing_session() {
        let client = ScriptedClient::with_replies(vec![
            Ok("3".to_owned()),
            Ok("Принято.".to_owned()),
        ]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        controller.start_session(11, &ctx).await.expect("start");
        controller.handle_text(&text_event(11, "март"), &ctx).await.expect("reply");
        let before = controller.session_snapshot(11).await.expect("state");
        assert!(before.has_user_message());

        let notice = controller.start_session(11, &ctx).await.expect("restart");
        assert_eq!(notice, LAUNCH_NOTICE);

        let after = controller.session_snapshot(11).await.expect("state");
        assert!(!after.has_user_message());
        assert_eq!(after.current_stage(), Stage::Intake);
    }

    #[tokio::test]
    async fn stop_removes_the_session() {
        let client = ScriptedClient::with_replies(vec![]);
        let controller = SessionController::new(client, Catalog::default());
        let ctx = EventContext::default();

        controller.start_session(13, &ctx).await.expect("start");
        let notice = controller.end_session(13, &ctx).await.expect("stop");

        assert_eq!(notice, STOP_NOTICE);
        assert!(controller.session_snapshot(13).await.is_none());
    }
}
