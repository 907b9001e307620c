use tera::{Context, Tera};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::conversation::{ConversationState, Message, Role};

/// Seed for the stage-analysis log: describes the five negotiation stages.
pub const STAGE_SEED_TEMPLATE: &str = "\
Вы консультант, помогающий определить, на каком этапе разговора находится диалог с пользователем.
Определите, каким должен быть следующий непосредственный этап разговора о промо-акции, выбрав один из следующих вариантов:
1. Заявка. Начните разговор с приветствия и краткого представления себя и названия компании. Уточните, какой товар интересует поставщика.
2. Скидка. Убедитесь, что поставщик указывает скидку, и она соответствует требованиям.
3. Период. Убедитесь, что период проведения акции указан корректно.
4. Регион. Убедитесь, что поставщик указывает регионы, где будет действовать промо.
5. Подтверждение. Подтвердите заявку или дайте рекомендации по исправлению.";

/// Trailer for the stage prompt: compels a single-digit answer and defines
/// the empty-history default.
pub const STAGE_TRAILER_TEMPLATE: &str = "\
Отвечайте только цифрой от 1 до 5, чтобы лучше понять, на каком этапе следует продолжить разговор.
Ответ должен состоять только из одной цифры, без слов.
Если истории разговоров нет, выведите 1.
Больше ничего не отвечайте и ничего не добавляйте к своему ответу.

Текущая стадия разговора:";

/// Seed for the dialogue log. The placeholders are filled with catalog data
/// at prompt-assembly time, not when the log is seeded.
pub const DIALOGUE_SEED_TEMPLATE: &str = "\
Ваша задача - помочь поставщику подготовить заявку на проведение промо-акции.
Вы имеете следующие данные:
- Коды товаров: {{ product_codes }}.
- Названия товаров: {{ product_names }}.
- Соответствие \"название товара: код товара\": {{ product_name_code }}.
- Регионы Российской Федерации: {{ regions }}.

Вам необходимо вычленить из запроса поставщика следующие переменные:
- period: Период проведения промо (номер недели или месяц).
- discount: Скидка поставщика (%).
- type: 'недельное' или 'месячное'.";

/// Trailer for the dialogue prompt: forces a single-line reply so the
/// responder can take everything up to the first line break verbatim.
pub const DIALOGUE_TRAILER_TEMPLATE: &str = "\
Ответьте поставщику одним сообщением в одну строку, без пояснений и служебного текста.
Если каких-то данных для заявки не хватает, попросите недостающие данные в этом же сообщении.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("at least one user message is required before requesting a completion")]
    MissingUserMessage,
    #[error("prompt template rendering failed: {0}")]
    Render(#[from] tera::Error),
}

/// Turns a message log plus a fixed system trailer into the ordered message
/// list submitted to the completion endpoint. System-role messages are
/// treated as templates and rendered with the catalog substitutions; user
/// and assistant turns pass through untouched (they may legitimately contain
/// brace characters).
#[derive(Clone, Debug, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Dialogue log + extraction trailer, catalog substitutions applied.
    ///
    /// Fails with [`PromptError::MissingUserMessage`] when the log holds no
    /// user turn: the system never requests a reply to an empty history.
    pub fn dialogue_prompt(
        &self,
        state: &ConversationState,
        catalog: &Catalog,
    ) -> Result<Vec<Message>, PromptError> {
        if !state.has_user_message() {
            return Err(PromptError::MissingUserMessage);
        }

        let context = substitution_context(catalog);
        assemble(state.dialogue_log(), DIALOGUE_TRAILER_TEMPLATE, &context)
    }

    /// Stage-analysis log + digit-only classification trailer.
    ///
    /// Deliberately has no user-message precondition: classification on an
    /// empty history is legal and the trailer compels the answer "1".
    pub fn stage_prompt(&self, state: &ConversationState) -> Result<Vec<Message>, PromptError> {
        assemble(state.stage_analysis_log(), STAGE_TRAILER_TEMPLATE, &Context::new())
    }
}

fn assemble(
    log: &[Message],
    trailer_template: &str,
    context: &Context,
) -> Result<Vec<Message>, PromptError> {
    let mut messages = Vec::with_capacity(log.len() + 1);
    for message in log {
        match message.role {
            Role::System => messages.push(Message::system(render(&message.text, context)?)),
            _ => messages.push(message.clone()),
        }
    }
    messages.push(Message::system(render(trailer_template, context)?));
    Ok(messages)
}

fn render(template: &str, context: &Context) -> Result<String, tera::Error> {
    Tera::one_off(template, context, false)
}

fn substitution_context(catalog: &Catalog) -> Context {
    let mut context = Context::new();
    context.insert("product_codes", &catalog.product_codes_joined());
    context.insert("product_names", &catalog.product_names_joined());
    context.insert("product_name_code", &catalog.name_code_pairs_joined());
    context.insert("regions", &catalog.regions_joined());
    context
}

#[cfg(test)]
mod tests {
    use super::{PromptAssembler, PromptError};
    use crate::catalog::Catalog;
    use crate::conversation::{ConversationState, Role};

    #[test]
    fn dialogue_prompt_requires_a_user_message() {
        let assembler = PromptAssembler::new();
        let state = ConversationState::new();

        let error = assembler
            .dialogue_prompt(&state, &Catalog::default())
            .expect_err("fresh state has no user turn");
        assert!(matches!(error, PromptError::MissingUserMessage));
    }

    #[test]
    fn dialogue_prompt_substitutes_catalog_data_into_the_seed() {
        let assembler = PromptAssembler::new();
        let mut state = ConversationState::new();
        state.record_user("Я хочу акцию на Несквик со скидкой 10% на март");

        let prompt = assembler
            .dialogue_prompt(&state, &Catalog::default())
            .expect("prompt should assemble");

        assert!(prompt[0].text.contains("\"Несквик\": \"12345\""));
        assert!(prompt[0].text.contains("ЦФО"));
        // seed + user turn + trailer
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt.last().map(|m| m.role), Some(Role::System));
        assert!(prompt.last().expect("trailer").text.contains("одним сообщением"));
    }

    #[test]
    fn user_text_with_braces_passes_through_unrendered() {
        let assembler = PromptAssembler::new();
        let mut state = ConversationState::new();
        state.record_user("скидка {{ 10 }} процентов");

        let prompt = assembler
            .dialogue_prompt(&state, &Catalog::default())
            .expect("user braces must not hit the template engine");
        assert_eq!(prompt[1].text, "скидка {{ 10 }} процентов");
    }

    #[test]
    fn stage_prompt_assembles_without_any_user_message() {
        let assembler = PromptAssembler::new();
        let state = ConversationState::new();

        let prompt = assembler.stage_prompt(&state).expect("stage prompt needs no user turn");

        assert_eq!(prompt.len(), 2);
        assert!(prompt[0].text.contains("Заявка"));
        assert!(prompt[1].text.contains("цифрой от 1 до 5"));
    }

    #[test]
    fn stage_prompt_carries_the_full_analysis_history() {
        let assembler = PromptAssembler::new();
        let mut state = ConversationState::new();
        state.record_user("хочу акцию");
        state.record_assistant("какой товар?");

        let prompt = assembler.stage_prompt(&state).expect("prompt should assemble");
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[1].text, "хочу акцию");
        assert_eq!(prompt[2].text, "какой товар?");
    }
}
