use crate::prompt::{DIALOGUE_SEED_TEMPLATE, STAGE_SEED_TEMPLATE};
use crate::stage::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a message log. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// Per-session record of the negotiation: two parallel message logs (one for
/// stage analysis, one for the substantive dialogue) and the stage the
/// classifier last inferred.
///
/// Both logs start with their system seed template and are append-only
/// afterwards. State lives purely in process memory; it is replaced wholesale
/// on re-initialization and dropped when the session ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationState {
    stage_analysis_log: Vec<Message>,
    dialogue_log: Vec<Message>,
    current_stage: Stage,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        let mut state = Self {
            stage_analysis_log: Vec::new(),
            dialogue_log: Vec::new(),
            current_stage: Stage::Intake,
        };
        state.initialize();
        state
    }

    /// Resets both logs to their seed templates and the stage to `Intake`.
    /// Idempotent.
    pub fn initialize(&mut self) {
        self.stage_analysis_log = vec![Message::system(STAGE_SEED_TEMPLATE)];
        self.dialogue_log = vec![Message::system(DIALOGUE_SEED_TEMPLATE)];
        self.current_stage = Stage::Intake;
    }

    /// Appends a user turn to both logs. Text is accepted verbatim, empty
    /// strings included.
    pub fn record_user(&mut self, text: impl Into<String>) {
        let message = Message::user(text.into());
        self.stage_analysis_log.push(message.clone());
        self.dialogue_log.push(message);
    }

    /// Appends an assistant turn to both logs.
    pub fn record_assistant(&mut self, text: impl Into<String>) {
        let message = Message::assistant(text.into());
        self.stage_analysis_log.push(message.clone());
        self.dialogue_log.push(message);
    }

    pub fn stage_analysis_log(&self) -> &[Message] {
        &self.stage_analysis_log
    }

    pub fn dialogue_log(&self) -> &[Message] {
        &self.dialogue_log
    }

    pub fn has_user_message(&self) -> bool {
        self.dialogue_log.iter().any(|message| message.role == Role::User)
    }

    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.current_stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationState, Role};
    use crate::stage::Stage;

    #[test]
    fn fresh_state_holds_one_system_seed_per_log() {
        let state = ConversationState::new();

        assert_eq!(state.stage_analysis_log().len(), 1);
        assert_eq!(state.dialogue_log().len(), 1);
        assert_eq!(state.stage_analysis_log()[0].role, Role::System);
        assert_eq!(state.dialogue_log()[0].role, Role::System);
        assert_eq!(state.current_stage(), Stage::Intake);
        assert!(!state.has_user_message());
    }

    #[test]
    fn records_grow_both_logs_by_exactly_one_element() {
        let mut state = ConversationState::new();
        let seed = state.dialogue_log()[0].clone();

        let turns = ["хочу акцию", "", "на Несквик"];
        for (index, text) in turns.iter().enumerate() {
            state.record_user(*text);
            assert_eq!(state.stage_analysis_log().len(), 2 + index * 2);
            state.record_assistant("ок");
            assert_eq!(state.dialogue_log().len(), 3 + index * 2);
        }

        // Seed element is never removed or mutated.
        assert_eq!(state.dialogue_log()[0], seed);
        assert!(state.has_user_message());
    }

    #[test]
    fn initialize_is_idempotent_and_discards_history() {
        let mut state = ConversationState::new();
        state.record_user("сообщение");
        state.record_assistant("ответ");
        state.set_stage(Stage::Region);

        state.initialize();
        state.initialize();

        assert_eq!(state, ConversationState::new());
    }

    #[test]
    fn empty_user_text_is_accepted() {
        let mut state = ConversationState::new();
        state.record_user("");
        assert!(state.has_user_message());
        assert_eq!(state.dialogue_log().last().map(|m| m.text.as_str()), Some(""));
    }
}
