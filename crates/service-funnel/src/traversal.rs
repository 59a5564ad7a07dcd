/// Question traversal over a category's funnel paths.
///
/// There is no merged decision tree: each lookup scans the category's records in
/// catalog order and the first hit wins. Everything here is a pure function of
/// the catalog and the arguments.
use tracing::warn;

use crate::catalog::CatalogIndex;
use crate::error::AppError;
use crate::matching::MatchPolicy;
use crate::model::{ConversationTurn, QuestionStep, Role};

pub struct FunnelTraversal<'a> {
    catalog: &'a CatalogIndex,
    matcher: &'a dyn MatchPolicy,
}

impl<'a> FunnelTraversal<'a> {
    pub fn new(catalog: &'a CatalogIndex, matcher: &'a dyn MatchPolicy) -> Self {
        Self { catalog, matcher }
    }

    /// The question the conversation is currently on.
    ///
    /// With no history this is the category's first question (and fails for an
    /// unknown category). Otherwise it is the last turn's content when that turn
    /// came from the assistant. A trailing non-assistant turn means the caller
    /// skipped the assistant reply; that is logged and yields `None`.
    pub fn current_question(
        &self,
        category_id: i64,
        history: &[ConversationTurn],
    ) -> Result<Option<String>, AppError> {
        let Some(last) = history.last() else {
            return Ok(Some(self.catalog.first_question(category_id)?.to_string()));
        };
        if last.role == Role::Assistant {
            return Ok(Some(last.content.clone()));
        }
        warn!(
            category_id,
            role = last.role.as_str(),
            turns = history.len(),
            "history does not end on an assistant turn, no current question"
        );
        Ok(None)
    }

    /// The next question after the current one, with the answer options for it.
    ///
    /// The next question is the token following the current question in the first
    /// record (catalog order) whose path holds it as an exact, non-final token.
    /// Options are the final tokens of every record whose funnel contains the next
    /// question, de-duplicated in first-seen order.
    pub fn next_question(
        &self,
        category_id: i64,
        history: &[ConversationTurn],
    ) -> (Option<String>, Vec<String>) {
        let Ok(Some(current)) = self.current_question(category_id, history) else {
            return (None, Vec::new());
        };
        let records = self.catalog.records_for(category_id);

        let Some(next) = records.iter().find_map(|r| r.token_after(&current)) else {
            return (None, Vec::new());
        };

        let mut options = Vec::new();
        for record in records {
            if !self.matcher.contains(&record.funnel_text(), next) {
                continue;
            }
            if let Some(last) = record.last_token() {
                push_unique(&mut options, last);
            }
        }
        (Some(next.to_string()), options)
    }

    /// Question step for a client that tracks the current question itself.
    ///
    /// Without a current question this is the opening question, offered with
    /// every record's second step. With one, candidates are the records whose
    /// funnel contains it; the next question is the first token following it
    /// among those, and options are the tokens following the next question.
    pub fn step_from(
        &self,
        category_id: i64,
        current_question: Option<&str>,
    ) -> Result<QuestionStep, AppError> {
        let records = self.catalog.records_for(category_id);
        if records.is_empty() {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        let Some(current) = current_question else {
            let question = self.catalog.first_question(category_id)?.to_string();
            let mut options = Vec::new();
            for record in records {
                if let Some(second) = record.question_path.get(1) {
                    push_unique(&mut options, second);
                }
            }
            return Ok(QuestionStep { question, options });
        };

        let candidates: Vec<_> = records
            .iter()
            .filter(|r| self.matcher.contains(&r.funnel_text(), current))
            .collect();

        let next = candidates
            .iter()
            .find_map(|r| r.token_after(current))
            .ok_or_else(|| AppError::NotFound("No more questions".to_string()))?;

        let mut options = Vec::new();
        for record in &candidates {
            if let Some(option) = record.token_after(next) {
                push_unique(&mut options, option);
            }
        }

        Ok(QuestionStep {
            question: next.to_string(),
            options,
        })
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
