use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

/// Fixed transport-layer replies. The bot speaks Russian.
pub const LAUNCH_NOTICE: &str = "Бот запущен! Вы можете начать вводить запросы.";
pub const STOP_NOTICE: &str = "Сессия завершена. Отправьте /start, чтобы начать заново.";
pub const TEXT_ONLY_NOTICE: &str = "Бот принимает только текст.";
pub const UNKNOWN_COMMAND_NOTICE: &str = "Неизвестная команда. Доступны /start и /stop.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateEnvelope {
    pub update_id: i64,
    pub event: TelegramEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelegramEvent {
    Command(CommandPayload),
    TextMessage(TextMessageEvent),
    NonText(NonTextEvent),
    Unsupported { update_kind: String },
}

impl TelegramEvent {
    pub fn event_type(&self) -> TelegramEventType {
        match self {
            Self::Command(_) => TelegramEventType::Command,
            Self::TextMessage(_) => TelegramEventType::TextMessage,
            Self::NonText(_) => TelegramEventType::NonText,
            Self::Unsupported { .. } => TelegramEventType::Unsupported,
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Command(payload) => Some(payload.chat_id),
            Self::TextMessage(event) => Some(event.chat_id),
            Self::NonText(event) => Some(event.chat_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TelegramEventType {
    Command,
    TextMessage,
    NonText,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandPayload {
    pub chat_id: i64,
    /// Leading-slash command token, e.g. `/start`.
    pub command: String,
    pub args: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub chat_id: i64,
    pub user_id: Option<i64>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonTextEvent {
    pub chat_id: i64,
    /// What the message carried instead of text (photo, sticker, ...).
    pub payload_kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Replied(OutboundMessage),
    Processed,
    Ignored,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("session command handler failure: {0}")]
    Command(String),
    #[error("session text handler failure: {0}")]
    Text(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> TelegramEventType;
    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<TelegramEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired with the in-memory echo service; the server replaces the
/// service with the real session controller.
pub fn default_dispatcher() -> EventDispatcher {
    let service = Arc::new(NoopSessionService);
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler::new(service.clone()));
    dispatcher.register(TextMessageHandler::new(service));
    dispatcher.register(NonTextHandler);
    dispatcher
}

/// Seam between the transport and the session controller.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// `/start`: (re)initialize the session; returns the launch notice.
    async fn start_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError>;

    /// `/stop`: tear the session down; returns the stop notice.
    async fn end_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError>;

    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError>;
}

#[async_trait]
impl<T> SessionService for Arc<T>
where
    T: SessionService + ?Sized,
{
    async fn start_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        (**self).start_session(chat_id, ctx).await
    }

    async fn end_session(
        &self,
        chat_id: i64,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        (**self).end_session(chat_id, ctx).await
    }

    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        (**self).handle_text(event, ctx).await
    }
}

pub struct CommandHandler<S> {
    service: S,
}

impl<S> CommandHandler<S>
where
    S: SessionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for CommandHandler<S>
where
    S: SessionService + 'static,
{
    fn event_type(&self) -> TelegramEventType {
        TelegramEventType::Command
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TelegramEvent::Command(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let text = match payload.command.as_str() {
            "/start" => self.service.start_session(payload.chat_id, ctx).await?,
            "/stop" => self.service.end_session(payload.chat_id, ctx).await?,
            _ => UNKNOWN_COMMAND_NOTICE.to_owned(),
        };

        Ok(HandlerResult::Replied(OutboundMessage { chat_id: payload.chat_id, text }))
    }
}

pub struct TextMessageHandler<S> {
    service: S,
}

impl<S> TextMessageHandler<S>
where
    S: SessionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for TextMessageHandler<S>
where
    S: SessionService + 'static,
{
    fn event_type(&self) -> TelegramEventType {
        TelegramEventType::TextMessage
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TelegramEvent::TextMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let text = self.service.handle_text(event, ctx).await?;
        Ok(HandlerResult::Replied(OutboundMessage { chat_id: event.chat_id, text }))
    }
}

/// Any non-text payload gets the fixed "text only" notice.
pub struct NonTextHandler;

#[async_trait]
impl EventHandler for NonTextHandler {
    fn event_type(&self) -> TelegramEventType {
        TelegramEventType::NonText
    }

    async fn handle(
        &self,
        envelope: &UpdateEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TelegramEvent::NonText(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(HandlerResult::Replied(OutboundMessage {
            chat_id: event.chat_id,
            text: TEXT_ONLY_NOTICE.to_owned(),
        }))
    }
}

/// Echo service used by [`default_dispatcher`] and tests.
#[derive(Default)]
pub struct NoopSessionService;

#[async_trait]
impl SessionService for NoopSessionService {
    async fn start_session(
        &self,
        _chat_id: i64,
        _ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        Ok(LAUNCH_NOTICE.to_owned())
    }

    async fn end_session(
        &self,
        _chat_id: i64,
        _ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        Ok(STOP_NOTICE.to_owned())
    }

    async fn handle_text(
        &self,
        event: &TextMessageEvent,
        _ctx: &EventContext,
    ) -> Result<String, EventHandlerError> {
        Ok(format!("получено: {}", event.text))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        default_dispatcher, CommandPayload, EventContext, EventDispatcher, HandlerResult,
        NonTextEvent, TelegramEvent, TextMessageEvent, UpdateEnvelope, LAUNCH_NOTICE,
        TEXT_ONLY_NOTICE, UNKNOWN_COMMAND_NOTICE,
    };

    fn envelope(update_id: i64, event: TelegramEvent) -> UpdateEnvelope {
        UpdateEnvelope { update_id, event }
    }

    #[tokio::test]
    async fn dispatcher_routes_start_command_to_launch_notice() {
        let dispatcher = default_dispatcher();
        let envelope = envelope(
            1,
            TelegramEvent::Command(CommandPayload {
                chat_id: 42,
                command: "/start".to_owned(),
                args: String::new(),
            }),
        );

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        let HandlerResult::Replied(message) = result else {
            panic!("expected a reply");
        };
        assert_eq!(message.chat_id, 42);
        assert_eq!(message.text, LAUNCH_NOTICE);
    }

    #[tokio::test]
    async fn unknown_commands_get_the_guidance_notice() {
        let dispatcher = default_dispatcher();
        let envelope = envelope(
            2,
            TelegramEvent::Command(CommandPayload {
                chat_id: 42,
                command: "/help".to_owned(),
                args: String::new(),
            }),
        );

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        let HandlerResult::Replied(message) = result else {
            panic!("expected a reply");
        };
        assert_eq!(message.text, UNKNOWN_COMMAND_NOTICE);
    }

    #[tokio::test]
    async fn text_messages_flow_through_the_session_service() {
        let dispatcher = default_dispatcher();
        let envelope = envelope(
            3,
            TelegramEvent::TextMessage(TextMessageEvent {
                chat_id: 7,
                user_id: Some(99),
                text: "хочу акцию".to_owned(),
            }),
        );

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        let HandlerResult::Replied(message) = result else {
            panic!("expected a reply");
        };
        assert_eq!(message.text, "получено: хочу акцию");
    }

    #[tokio::test]
    async fn non_text_payloads_get_the_text_only_notice() {
        let dispatcher = default_dispatcher();
        let envelope = envelope(
            4,
            TelegramEvent::NonText(NonTextEvent {
                chat_id: 7,
                payload_kind: "photo".to_owned(),
            }),
        );

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        let HandlerResult::Replied(message) = result else {
            panic!("expected a reply");
        };
        assert_eq!(message.text, TEXT_ONLY_NOTICE);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let envelope = envelope(
            5,
            TelegramEvent::TextMessage(TextMessageEvent {
                chat_id: 7,
                user_id: None,
                text: "hello".to_owned(),
            }),
        );

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn default_dispatcher_registers_handlers() {
        let dispatcher = default_dispatcher();
        assert_eq!(dispatcher.handler_count(), 3);
    }
}
