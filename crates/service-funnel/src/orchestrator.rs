/// Per-turn coordinator for funnel conversations.
///
/// Holds no session state: each call receives the full history from the caller,
/// asks the text generator for exactly one reply, and derives the funnel outcome
/// (next question, options, form hand-off, resolved service) from the catalog.
use std::sync::Arc;

use tracing::{debug, info};

use funnel_common::openai::Message;

use crate::catalog::CatalogIndex;
use crate::error::AppError;
use crate::generator::TextGenerator;
use crate::matching::MatchPolicy;
use crate::model::{ConversationPhase, ConversationTurn, TurnResult};
use crate::resolver::ServiceResolver;
use crate::termination::TerminationPolicy;
use crate::traversal::FunnelTraversal;

const UNKNOWN_CATEGORY: &str = "Unknown category";

pub struct ConversationOrchestrator {
    catalog: Arc<CatalogIndex>,
    matcher: Box<dyn MatchPolicy>,
    termination: TerminationPolicy,
    generator: Arc<dyn TextGenerator>,
}

impl ConversationOrchestrator {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        matcher: Box<dyn MatchPolicy>,
        termination: TerminationPolicy,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            catalog,
            matcher,
            termination,
            generator,
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn traversal(&self) -> FunnelTraversal<'_> {
        FunnelTraversal::new(&self.catalog, self.matcher.as_ref())
    }

    pub fn resolver(&self) -> ServiceResolver<'_> {
        ServiceResolver::new(&self.catalog, self.matcher.as_ref())
    }

    /// Run one conversational turn.
    ///
    /// An absent or unknown `category_id` still gets a reply from the generator,
    /// but without a funnel question, next question or resolved service.
    pub async fn handle_turn(
        &self,
        category_id: Option<i64>,
        history: &[ConversationTurn],
        message: &str,
    ) -> Result<TurnResult, AppError> {
        if message.trim().is_empty() {
            return Err(AppError::Validation("message must not be empty".to_string()));
        }

        let category_id = category_id.filter(|&id| self.catalog.contains(id));
        let phase_before = ConversationPhase::of_history(history);
        let traversal = self.traversal();

        let current_question = match category_id {
            Some(id) => traversal.current_question(id, history)?,
            None => None,
        };
        debug!(
            category_id = ?category_id,
            phase = ?phase_before,
            current_question = ?current_question,
            "handling turn"
        );

        let messages =
            self.build_messages(category_id, current_question.as_deref(), history, message);
        let assistant_message = self.generator.generate(messages).await?;

        let (next_question, options) = match category_id {
            Some(id) => traversal.next_question(id, history),
            None => (None, Vec::new()),
        };

        let show_form = self
            .termination
            .should_show_form(history, &assistant_message);
        let service_id = if show_form {
            category_id.and_then(|id| self.resolver().resolve(id, history, &assistant_message))
        } else {
            None
        };
        let phase = if show_form {
            ConversationPhase::AwaitingForm
        } else {
            ConversationPhase::InFunnel
        };

        info!(
            category_id = ?category_id,
            turns = history.len(),
            show_form,
            service_id = ?service_id,
            next_question = ?next_question,
            "turn complete"
        );

        Ok(TurnResult {
            message: assistant_message,
            show_form,
            next_question,
            options,
            service_id,
            phase,
        })
    }

    /// System prompt naming the category the assistant is helping with.
    pub fn system_message(&self, category_id: Option<i64>) -> String {
        let name = category_id
            .and_then(|id| self.catalog.category_name(id).ok())
            .unwrap_or(UNKNOWN_CATEGORY);
        format!("You are a helpful assistant for {name}.")
    }

    fn build_messages(
        &self,
        category_id: Option<i64>,
        current_question: Option<&str>,
        history: &[ConversationTurn],
        message: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(self.system_message(category_id)));
        if let Some(question) = current_question {
            messages.push(Message::system(format!(
                "The current question is: {question}"
            )));
        }
        messages.extend(
            history
                .iter()
                .map(|turn| Message::new(turn.role.as_str(), turn.content.clone())),
        );
        messages.push(Message::user(message));
        messages
    }
}
