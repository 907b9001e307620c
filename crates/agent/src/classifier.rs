use promobot_core::prompt::PromptAssembler;
use promobot_core::{ConversationState, PromptError, Stage};
use thiserror::Error;
use tracing::debug;

use crate::llm::{CompletionClient, CompletionError};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Infers the current negotiation stage from the stage-analysis log.
///
/// A malformed or empty completion (no digit, digit outside 1-5) degrades to
/// [`Stage::Intake`] rather than failing; only transport-level failures
/// surface as errors.
pub struct StageClassifier<C> {
    client: C,
    assembler: PromptAssembler,
}

impl<C> StageClassifier<C>
where
    C: CompletionClient,
{
    pub fn new(client: C) -> Self {
        Self { client, assembler: PromptAssembler::new() }
    }

    /// Legal on a state with zero user messages: the trailer compels the
    /// model to answer "1" when there is no history.
    pub async fn classify(&self, state: &ConversationState) -> Result<Stage, ClassifyError> {
        let prompt = self.assembler.stage_prompt(state)?;
        let raw = self.client.complete(&prompt).await?;
        let stage = stage_from_response(&raw);

        debug!(
            event_name = "agent.classifier.stage_inferred",
            stage = %stage,
            "stage classifier produced a label"
        );
        Ok(stage)
    }
}

fn stage_from_response(raw: &str) -> Stage {
    first_digit_run(raw)
        .and_then(|run| run.chars().next())
        .and_then(Stage::from_digit)
        .unwrap_or(Stage::Intake)
}

/// First contiguous run of ASCII digits anywhere in the text.
fn first_digit_run(text: &str) -> Option<&str> {
    let start = text.find(|ch: char| ch.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
    Some(&rest[..end])
}
