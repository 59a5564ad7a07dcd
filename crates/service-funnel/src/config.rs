use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::matching::MatchPolicyKind;
use crate::termination::{DEFAULT_HISTORY_THRESHOLD, DEFAULT_TRIGGER_PHRASE};

/// Application configuration loaded explicitly from environment variables.
///
/// The catalog path has no default; everything else does. OpenAI client
/// settings are read separately by `OpenAiClientConfig::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// CSV catalog with `Category ID,Category Name,Service ID,Question Funnel` columns.
    pub catalog_path: PathBuf,
    /// Socket address the HTTP server binds, e.g. "127.0.0.1:8000".
    pub listen_addr: String,
    /// Browser origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Redis connection URL. `None` keeps contact submissions in memory.
    pub redis_url: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub form_history_threshold: usize,
    pub form_trigger_phrase: String,
    pub match_policy: MatchPolicyKind,
    /// Requests per second allowed on /chat. `None` disables limiting.
    pub rate_limit_rps: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CATALOG_PATH`: path to the service catalog CSV
    ///
    /// Optional:
    /// - `LISTEN_ADDR` (default "127.0.0.1:8000")
    /// - `CORS_ALLOWED_ORIGINS`, comma separated (default "http://localhost:5173")
    /// - `REDIS_URL`
    /// - `OPENAI_MODEL` (default "gpt-3.5-turbo"), `OPENAI_MAX_TOKENS` (default 150, 0 = unset)
    /// - `FORM_HISTORY_THRESHOLD` (default 4), `FORM_TRIGGER_PHRASE` (default "final recommendation")
    /// - `MATCH_POLICY`: "substring" (default) or "word"
    /// - `RATE_LIMIT_RPS`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let catalog_path = get("CATALOG_PATH").map(PathBuf::from).ok_or_else(|| {
            AppError::Config("CATALOG_PATH environment variable is required".to_string())
        })?;
        if !catalog_path.is_file() {
            return Err(AppError::Config(format!(
                "catalog file not found at {}",
                catalog_path.display()
            )));
        }

        let listen_addr = get("LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string());

        let cors_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let max_tokens = match get("OPENAI_MAX_TOKENS") {
            Some(raw) => Some(parse_number::<u32>("OPENAI_MAX_TOKENS", &raw)?).filter(|&n| n > 0),
            None => Some(150),
        };

        let form_history_threshold = match get("FORM_HISTORY_THRESHOLD") {
            Some(raw) => parse_number::<usize>("FORM_HISTORY_THRESHOLD", &raw)?,
            None => DEFAULT_HISTORY_THRESHOLD,
        };

        let form_trigger_phrase =
            get("FORM_TRIGGER_PHRASE").unwrap_or_else(|| DEFAULT_TRIGGER_PHRASE.to_string());

        let match_policy = match get("MATCH_POLICY") {
            Some(raw) => raw.parse()?,
            None => MatchPolicyKind::default(),
        };

        let rate_limit_rps = match get("RATE_LIMIT_RPS") {
            Some(raw) => Some(parse_number::<u32>("RATE_LIMIT_RPS", &raw)?).filter(|&n| n > 0),
            None => None,
        };

        Ok(Self {
            catalog_path,
            listen_addr,
            cors_origins,
            redis_url: get("REDIS_URL"),
            model,
            max_tokens,
            form_history_threshold,
            form_trigger_phrase,
            match_policy,
            rate_limit_rps,
        })
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.parse::<T>()
        .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn catalog_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "Category ID,Category Name,Service ID,Question Funnel\n1,Plumbing,10,type > leak\n",
        )
        .unwrap();
        file
    }

    fn load(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let file = catalog_file();
        let path = file.path().to_string_lossy().to_string();
        let config = load(&[("CATALOG_PATH", path.as_str())]).unwrap();

        assert_eq!(config.catalog_path(), file.path());
        assert_eq!(config.listen_addr, "127.0.0.1:8000");
        assert_eq!(config.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.max_tokens, Some(150));
        assert_eq!(config.form_history_threshold, 4);
        assert_eq!(config.form_trigger_phrase, "final recommendation");
        assert_eq!(config.match_policy, MatchPolicyKind::Substring);
        assert_eq!(config.rate_limit_rps, None);
    }

    #[test]
    fn overrides_apply() {
        let file = catalog_file();
        let path = file.path().to_string_lossy().to_string();
        let config = load(&[
            ("CATALOG_PATH", path.as_str()),
            ("LISTEN_ADDR", "0.0.0.0:9000"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test ,"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("OPENAI_MAX_TOKENS", "0"),
            ("FORM_HISTORY_THRESHOLD", "6"),
            ("MATCH_POLICY", "word"),
            ("RATE_LIMIT_RPS", "5"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(
            config.cors_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.max_tokens, None);
        assert_eq!(config.form_history_threshold, 6);
        assert_eq!(config.match_policy, MatchPolicyKind::Word);
        assert_eq!(config.rate_limit_rps, Some(5));
    }

    #[test]
    fn catalog_path_is_required_and_must_exist() {
        assert!(matches!(load(&[]), Err(AppError::Config(_))));
        assert!(matches!(
            load(&[("CATALOG_PATH", "/no/such/catalog.csv")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let file = catalog_file();
        let path = file.path().to_string_lossy().to_string();
        let err = load(&[("CATALOG_PATH", path.as_str()), ("FORM_HISTORY_THRESHOLD", "four")]).unwrap_err();
        assert!(err.to_string().contains("FORM_HISTORY_THRESHOLD"));
    }
}
