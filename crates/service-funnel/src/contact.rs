/// Contact submissions collected once the funnel hands off to the form.
///
/// Storage sits behind `ContactSink`. Redis is used when `REDIS_URL` is set;
/// otherwise submissions live in process memory and are lost on restart.
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use funnel_common::ids::{new_record_id, unix_now_secs};
use funnel_common::redis::RedisStore;

use crate::error::AppError;

const SUBMISSION_KEY_PREFIX: &str = "funnel:submission:";
const SUBMISSION_LIST_KEY: &str = "funnel:submissions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub zipcode: String,
    pub address: String,
    pub phone: String,
    pub service_id: i64,
}

impl ContactInfo {
    /// Required fields must be non-blank and the email must look like an address.
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("zipcode", &self.zipcode),
            ("address", &self.address),
            ("phone", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} must not be empty")));
            }
        }
        if !email_re().is_match(self.email.trim()) {
            return Err(AppError::Validation(format!(
                "email is not a valid address: {}",
                self.email.trim()
            )));
        }
        Ok(())
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub submission_id: String,
    pub submitted_at: u64,
    #[serde(flatten)]
    pub info: ContactInfo,
}

#[async_trait]
pub trait ContactSink: Send + Sync {
    async fn store(&self, submission: &ContactSubmission) -> Result<(), AppError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Validate, stamp and store a submission.
pub async fn submit_contact_info(
    sink: &dyn ContactSink,
    info: ContactInfo,
) -> Result<ContactSubmission, AppError> {
    info.validate()?;
    let salt = format!("{}|{}|{}", info.email, info.phone, info.service_id);
    let submission = ContactSubmission {
        submission_id: new_record_id(salt.as_bytes()),
        submitted_at: unix_now_secs(),
        info,
    };
    sink.store(&submission).await?;
    info!(
        submission_id = %submission.submission_id,
        service_id = submission.info.service_id,
        backend = sink.backend(),
        "contact info stored"
    );
    Ok(submission)
}

/// Redis-backed sink when `redis_url` yields a usable client, in-memory otherwise.
///
/// An unreachable but well-formed URL still selects Redis so submissions fail
/// loudly instead of vanishing into process memory.
pub async fn contact_sink_for(redis_url: Option<&str>) -> Arc<dyn ContactSink> {
    let Some(url) = redis_url else {
        warn!("REDIS_URL not set, contact submissions are kept in memory");
        return Arc::new(MemoryContactSink::new());
    };
    let store = RedisStore::new(Some(url));
    if !store.is_configured() {
        warn!("REDIS_URL is not a valid redis URL, contact submissions are kept in memory");
        return Arc::new(MemoryContactSink::new());
    }
    if store.is_available().await {
        info!("redis connected");
    } else {
        warn!("redis unavailable at startup, submissions will fail until it is reachable");
    }
    Arc::new(RedisContactSink::new(store))
}

pub struct RedisContactSink {
    redis: RedisStore,
}

impl RedisContactSink {
    pub fn new(redis: RedisStore) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ContactSink for RedisContactSink {
    async fn store(&self, submission: &ContactSubmission) -> Result<(), AppError> {
        let raw = serde_json::to_string(submission)
            .map_err(funnel_common::error::CommonError::from)?;
        let key = format!("{SUBMISSION_KEY_PREFIX}{}", submission.submission_id);
        self.redis.set(&key, &raw).await?;
        self.redis
            .rpush(SUBMISSION_LIST_KEY, &submission.submission_id)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[derive(Default)]
pub struct MemoryContactSink {
    submissions: Mutex<Vec<ContactSubmission>>,
}

impl MemoryContactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submissions(&self) -> Vec<ContactSubmission> {
        self.submissions.lock().await.clone()
    }
}

#[async_trait]
impl ContactSink for MemoryContactSink {
    async fn store(&self, submission: &ContactSubmission) -> Result<(), AppError> {
        self.submissions.lock().await.push(submission.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
