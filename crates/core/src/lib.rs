pub mod catalog;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod prompt;
pub mod stage;

pub use catalog::Catalog;
pub use conversation::{ConversationState, Message, Role};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use prompt::{PromptAssembler, PromptError};
pub use stage::Stage;
