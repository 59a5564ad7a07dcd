use serde::{Deserialize, Serialize};

/// Token separator inside a catalog question funnel, e.g. `"Type > Leak > Faucet"`.
pub const FUNNEL_DELIMITER: &str = " > ";

/// One catalog entry: a service reachable at the end of its question path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub category_id: i64,
    pub category_name: String,
    pub service_id: i64,
    /// Question/answer steps ordered from most general to most specific. Never empty.
    pub question_path: Vec<String>,
}

impl ServiceRecord {
    /// The path re-joined into the catalog's delimited form.
    pub fn funnel_text(&self) -> String {
        self.question_path.join(FUNNEL_DELIMITER)
    }

    pub fn last_token(&self) -> Option<&str> {
        self.question_path.last().map(String::as_str)
    }

    /// The token right after the first exact occurrence of `token`, if any.
    pub fn token_after(&self, token: &str) -> Option<&str> {
        let idx = self.question_path.iter().position(|t| t == token)?;
        self.question_path.get(idx + 1).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Where a conversation stands in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    AwaitingFirstQuestion,
    InFunnel,
    AwaitingForm,
    Complete,
}

impl ConversationPhase {
    /// Phase implied by the history a caller sent, before the turn is processed.
    pub fn of_history(history: &[ConversationTurn]) -> Self {
        if history.iter().any(|t| t.role == Role::Assistant) {
            ConversationPhase::InFunnel
        } else {
            ConversationPhase::AwaitingFirstQuestion
        }
    }
}

/// Result of one conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    pub message: String,
    pub show_form: bool,
    pub next_question: Option<String>,
    pub options: Vec<String>,
    pub service_id: Option<i64>,
    pub phase: ConversationPhase,
}

/// A question with its answer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStep {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub category_name: String,
}

/// Wire form of a `ServiceRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub category_id: i64,
    pub category_name: String,
    pub service_id: i64,
    pub question_funnel: String,
}

impl From<&ServiceRecord> for ServiceSummary {
    fn from(record: &ServiceRecord) -> Self {
        Self {
            category_id: record.category_id,
            category_name: record.category_name.clone(),
            service_id: record.service_id,
            question_funnel: record.funnel_text(),
        }
    }
}
