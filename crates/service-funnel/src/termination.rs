use crate::model::ConversationTurn;

pub const DEFAULT_HISTORY_THRESHOLD: usize = 4;
pub const DEFAULT_TRIGGER_PHRASE: &str = "final recommendation";

/// Decides when the funnel stops asking and hands off to the contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationPolicy {
    history_threshold: usize,
    trigger_phrase: String,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_THRESHOLD, DEFAULT_TRIGGER_PHRASE)
    }
}

impl TerminationPolicy {
    pub fn new(history_threshold: usize, trigger_phrase: &str) -> Self {
        Self {
            history_threshold,
            trigger_phrase: trigger_phrase.to_lowercase(),
        }
    }

    /// True once the history is long enough, or when the assistant's reply
    /// mentions the trigger phrase in any letter case.
    pub fn should_show_form(&self, history: &[ConversationTurn], assistant_message: &str) -> bool {
        history.len() >= self.history_threshold
            || assistant_message
                .to_lowercase()
                .contains(&self.trigger_phrase)
    }
}
