use crate::catalog::CatalogIndex;
use crate::error::AppError;
use crate::matching::MatchPolicy;
use crate::model::{ConversationTurn, ServiceRecord};

/// Picks the catalog service a conversation has narrowed down to.
pub struct ServiceResolver<'a> {
    catalog: &'a CatalogIndex,
    matcher: &'a dyn MatchPolicy,
}

impl<'a> ServiceResolver<'a> {
    pub fn new(catalog: &'a CatalogIndex, matcher: &'a dyn MatchPolicy) -> Self {
        Self { catalog, matcher }
    }

    /// Service id of the first record (catalog order) whose every path token
    /// appears, ignoring case, somewhere in the conversation text plus the
    /// latest assistant reply.
    ///
    /// Clients replay the opening question as the first assistant turn, so a
    /// path's first token is normally present in the history.
    pub fn resolve(
        &self,
        category_id: i64,
        history: &[ConversationTurn],
        assistant_message: &str,
    ) -> Option<i64> {
        let search_text = conversation_text(history, assistant_message);
        self.catalog
            .records_for(category_id)
            .iter()
            .find(|record| {
                record
                    .question_path
                    .iter()
                    .all(|token| self.matcher.contains(&search_text, &token.to_lowercase()))
            })
            .map(|record| record.service_id)
    }

    /// First record whose funnel contains `answers`, ignoring case.
    pub fn final_service(&self, category_id: i64, answers: &str) -> Result<&'a ServiceRecord, AppError> {
        let records = self.catalog.records_for(category_id);
        if records.is_empty() {
            return Err(AppError::NotFound("Category not found".to_string()));
        }
        records
            .iter()
            .find(|r| self.matcher.contains_ignore_case(&r.funnel_text(), answers))
            .ok_or_else(|| AppError::NotFound("No matching service found".to_string()))
    }
}

fn conversation_text(history: &[ConversationTurn], assistant_message: &str) -> String {
    history
        .iter()
        .map(|t| t.content.as_str())
        .chain(std::iter::once(assistant_message))
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
