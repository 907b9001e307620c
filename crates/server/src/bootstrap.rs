use std::sync::Arc;

use promobot_core::config::{AppConfig, ConfigError, LoadOptions};
use promobot_core::Catalog;
use promobot_telegram::events::{
    CommandHandler, EventDispatcher, NonTextHandler, TextMessageHandler,
};
use promobot_telegram::poller::{LongPollRunner, ReconnectPolicy};
use thiserror::Error;
use tracing::info;

use crate::completion::HttpCompletionClient;
use crate::session::SessionController;
use crate::telegram_api::BotApiTransport;

pub struct Application {
    pub config: AppConfig,
    pub runner: LongPollRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

/// Wires the full update path: Bot API transport, event dispatcher, session
/// controller, completion client.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let completion_client =
        HttpCompletionClient::new(&config.llm).map_err(BootstrapError::HttpClient)?;
    let controller = Arc::new(SessionController::new(completion_client, Catalog::default()));

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(CommandHandler::new(controller.clone()));
    dispatcher.register(TextMessageHandler::new(controller));
    dispatcher.register(NonTextHandler);

    let transport =
        Arc::new(BotApiTransport::new(&config.telegram).map_err(BootstrapError::HttpClient)?);
    let runner = LongPollRunner::new(transport, dispatcher, ReconnectPolicy::default());

    info!(
        event_name = "system.bootstrap.wired",
        correlation_id = "bootstrap",
        "update path assembled"
    );

    Ok(Application { config, runner })
}
