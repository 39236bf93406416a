use std::time::Duration;

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Hard ceiling on generation calls per repair loop.
pub const MAX_ATTEMPTS_CEILING: u32 = 3;

/// Environment variable overriding [`GenerationConfig::model`].
pub const MODEL_ENV: &str = "OPENAI_MODEL";

/// Configuration for generation requests.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Per-request timeout, including connection and body read.
    pub timeout: Duration,

    /// Ask the provider for a JSON object response.
    pub json_mode: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout: Duration::from_secs(60),
            json_mode: true,
        }
    }
}

impl GenerationConfig {
    /// Defaults, with the model taken from `OPENAI_MODEL` when set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(MODEL_ENV) {
            Ok(model) if !model.trim().is_empty() => config.with_model(model.trim()),
            _ => config,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

/// Budget for the validate-and-repair loop.
///
/// `max_attempts` counts every generation call, the first one included.
///
/// ```
/// use crm_triage::config::RepairConfig;
///
/// assert_eq!(RepairConfig::default().max_attempts, 2);
/// assert_eq!(RepairConfig::new(0).max_attempts, 1);
/// assert_eq!(RepairConfig::new(9).max_attempts, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairConfig {
    pub max_attempts: u32,
}

impl RepairConfig {
    /// Clamps `max_attempts` into `1..=3`.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CEILING),
        }
    }

    /// A single call with no repair round.
    pub fn no_repair() -> Self {
        Self::new(1)
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert!((config.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.max_tokens, 4000);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.json_mode);
    }

    #[test]
    fn builders_chain() {
        let config = GenerationConfig::default()
            .with_model("gpt-4o")
            .with_temperature(0.0)
            .with_max_tokens(512)
            .with_timeout(Duration::from_secs(5))
            .with_json_mode(false);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 512);
        assert!(!config.json_mode);
    }

    #[test]
    fn repair_budget_is_clamped() {
        assert_eq!(RepairConfig::new(1).max_attempts, 1);
        assert_eq!(RepairConfig::new(3).max_attempts, 3);
        assert_eq!(RepairConfig::new(u32::MAX).max_attempts, 3);
        assert_eq!(RepairConfig::no_repair().max_attempts, 1);
    }
}
