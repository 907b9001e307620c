//! Telegram transport layer: update events, the dispatcher seam between the
//! transport and the session controller, and the long-poll runner.
//!
//! The Bot API itself stays behind the [`poller::UpdateTransport`] trait so
//! the whole layer runs against scripted transports in tests.

pub mod events;
pub mod poller;

pub use events::{
    EventContext, EventDispatcher, HandlerResult, OutboundMessage, SessionService, TelegramEvent,
    UpdateEnvelope,
};
pub use poller::{LongPollRunner, ReconnectPolicy, TransportError, UpdateTransport};
