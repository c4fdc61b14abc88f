//! Configuration parsing and validation for axcess.
//!
//! A single TOML file carries the server settings, provider credentials, the
//! models catalog (aliases and model specs) and the routing policy set. The
//! catalog and the policies are validated once and then shared read-only.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Currency used when a model's pricing does not name one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: Vec<ProviderConfig>,
    pub catalog: Arc<ModelsCatalog>,
    pub policies: Arc<PoliciesConfig>,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was auto-discovered from a convention env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Google,
}

impl ProviderKind {
    /// Infer the kind from a provider name such as "openai".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "google" | "gemini" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    /// Public API base URL used when the config does not override it.
    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Openai => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Vendor-standard environment variables checked for a key, in order.
    pub fn vendor_env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Openai => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Google => &["GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider credentials and endpoint.
///
/// `name` is what model specs refer to in their `provider` field.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    /// Base URL; `None` means the vendor default
    pub url: Option<String>,
    pub api_key: Option<ApiKey>,
    /// Request timeout enforced by the adapter's HTTP client
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        self.url.as_deref().unwrap_or(self.kind.default_url())
    }
}

fn default_timeout_secs() -> u64 {
    120
}

/// Output token limits for one model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCap {
    pub default: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard: Option<u32>,
}

/// Per-token prices for one model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ModelPricing {
    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
    }
}

/// A backend model as described in the catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    pub max_output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub cap: ModelCap,
    pub pricing: ModelPricing,
}

/// Aliases and the models they point at.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelsCatalog {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelSpec>,
}

impl ModelsCatalog {
    /// Model key an alias points at.
    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn model(&self, model_key: &str) -> Option<&ModelSpec> {
        self.models.get(model_key)
    }

    /// First alias (in key order) that points at `model_key`.
    pub fn alias_for_model(&self, model_key: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, target)| target.as_str() == model_key)
            .map(|(alias, _)| alias.as_str())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, spec) in &self.models {
            let path = format!("models.\"{}\"", key);
            require_non_blank(&spec.provider, &format!("{}.provider", path))?;
            require_non_blank(&spec.model, &format!("{}.model", path))?;
            require_positive(
                spec.max_output_tokens,
                &format!("{}.max_output_tokens", path),
            )?;
            if let Some(temperature) = spec.temperature {
                require_finite(temperature, &format!("{}.temperature", path))?;
            }
            require_positive(spec.cap.default, &format!("{}.cap.default", path))?;
            if let Some(hard) = spec.cap.hard {
                require_positive(hard, &format!("{}.cap.hard", path))?;
            }
            require_price(spec.pricing.input, &format!("{}.pricing.input", path))?;
            require_price(spec.pricing.output, &format!("{}.pricing.output", path))?;
            if let Some(currency) = &spec.pricing.currency {
                require_non_blank(currency, &format!("{}.pricing.currency", path))?;
            }
        }

        for (alias, target) in &self.aliases {
            if alias.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "aliases: alias names must not be blank".to_string(),
                ));
            }
            require_non_blank(target, &format!("aliases.\"{}\"", alias))?;
            if !self.models.contains_key(target) {
                return Err(ConfigError::Validation(format!(
                    "aliases.\"{}\" points at unknown model \"{}\"",
                    alias, target
                )));
            }
        }

        Ok(())
    }
}

/// Per-language routing adjustment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LanguageHeuristic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Prompt-size range selecting an alias. The range is `[min, max)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenBucket {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u64>,
}

impl TokenBucket {
    pub fn contains(&self, estimated_tokens: u64) -> bool {
        let min = self.min_prompt_tokens.unwrap_or(0);
        let max = self.max_prompt_tokens.unwrap_or(u64::MAX);
        estimated_tokens >= min && estimated_tokens < max
    }
}

/// Alias selection policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingPolicy {
    pub default_alias: String,
    #[serde(default)]
    pub language_heuristics: BTreeMap<String, LanguageHeuristic>,
    #[serde(default)]
    pub token_buckets: Vec<TokenBucket>,
    #[serde(default)]
    pub fallbacks: BTreeMap<String, Vec<String>>,
}

/// Output caps by tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapsPolicy {
    pub default: u32,
    #[serde(default)]
    pub tiers: BTreeMap<String, u32>,
}

impl CapsPolicy {
    pub fn tier(&self, tier: &str) -> Option<u32> {
        self.tiers.get(tier).copied().filter(|cap| *cap > 0)
    }
}

/// Sampling temperatures by request domain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemperaturesPolicy {
    pub default: f64,
    /// Open set of domains, conventionally "code" and "creative"
    #[serde(default)]
    pub domains: BTreeMap<String, f64>,
}

impl TemperaturesPolicy {
    pub fn domain(&self, domain: &str) -> Option<f64> {
        self.domains.get(domain).copied()
    }
}

/// The full policy set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoliciesConfig {
    pub routing: RoutingPolicy,
    pub caps: CapsPolicy,
    pub temperatures: TemperaturesPolicy,
}

impl PoliciesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let routing = &self.routing;
        require_non_blank(&routing.default_alias, "policies.routing.default_alias")?;

        for (language, heuristic) in &routing.language_heuristics {
            let path = format!("policies.routing.language_heuristics.{}", language);
            if let Some(alias) = &heuristic.alias {
                require_non_blank(alias, &format!("{}.alias", path))?;
            }
            if let Some(temperature) = heuristic.temperature {
                require_finite(temperature, &format!("{}.temperature", path))?;
            }
        }

        for (idx, bucket) in routing.token_buckets.iter().enumerate() {
            require_non_blank(
                &bucket.alias,
                &format!("policies.routing.token_buckets[{}].alias", idx),
            )?;
        }

        require_positive(self.caps.default, "policies.caps.default")?;
        for (tier, cap) in &self.caps.tiers {
            require_positive(*cap, &format!("policies.caps.tiers.{}", tier))?;
        }

        require_finite(self.temperatures.default, "policies.temperatures.default")?;
        for (domain, temperature) in &self.temperatures.domains {
            require_finite(
                *temperature,
                &format!("policies.temperatures.domains.{}", domain),
            )?;
        }

        Ok(())
    }

    /// Drop blank fallback entries; they carry no routing meaning.
    fn normalize(&mut self) {
        for list in self.routing.fallbacks.values_mut() {
            list.retain(|alias| !alias.trim().is_empty());
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn require_non_blank(value: &str, path: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-empty string",
            path
        )));
    }
    Ok(())
}

fn require_positive(value: u32, path: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{} must be greater than 0",
            path
        )));
    }
    Ok(())
}

fn require_finite(value: f64, path: &str) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::Validation(format!(
            "{} must be a finite number",
            path
        )));
    }
    Ok(())
}

fn require_price(value: f64, path: &str) -> Result<(), ConfigError> {
    require_finite(value, path)?;
    if value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must not be negative",
            path
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_env(path).map(|(config, _)| config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        let (config, _) = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.catalog.validate()?;
        self.policies.validate()?;

        let mut seen = HashSet::new();
        for (idx, provider) in self.providers.iter().enumerate() {
            require_non_blank(&provider.name, &format!("providers[{}].name", idx))?;
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "providers[{}].name \"{}\" is declared more than once",
                    idx, provider.name
                )));
            }
            if let Some(url) = &provider.url {
                require_non_blank(url, &format!("providers[{}].url", idx))?;
            }
        }

        if self.providers.is_empty() {
            tracing::warn!("No providers configured - every delegation will fail");
        }

        for (key, spec) in &self.catalog.models {
            if !seen.contains(spec.provider.as_str()) {
                tracing::warn!(
                    model = %key,
                    provider = %spec.provider,
                    "Model references a provider with no [[providers]] entry"
                );
            }
        }

        Ok(())
    }

    /// Read accessor for the models catalog.
    pub fn catalog(&self) -> Arc<ModelsCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Read accessor for the policy set.
    pub fn policies(&self) -> Arc<PoliciesConfig> {
        Arc::clone(&self.policies)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },
}

/// Raw provider config deserialized directly from TOML.
/// api_key is `Option<String>` so it may contain `${VAR}` references not yet expanded.
#[derive(Deserialize)]
pub struct RawProviderConfig {
    name: String,
    kind: Option<ProviderKind>,
    url: Option<String>,
    api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    providers: Vec<RawProviderConfig>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    models: BTreeMap<String, ModelSpec>,
    policies: PoliciesConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_name: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_name.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_name.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in provider '{}')",
                var_name, provider_name
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Derive the convention-based env var name for a provider.
///
/// - "openai" -> "AXCESS_OPENAI_API_KEY"
/// - "azure-east" -> "AXCESS_AZURE_EAST_API_KEY"
pub fn convention_env_var_name(provider_name: &str) -> String {
    let upper_snake = provider_name.to_uppercase().replace(['-', ' '], "_");
    format!("AXCESS_{}_API_KEY", upper_snake)
}

/// Try the axcess convention variable, then the vendor-standard ones.
fn convention_key_lookup<F>(
    provider_name: &str,
    kind: ProviderKind,
    lookup: &F,
) -> Option<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    std::iter::once(convention_env_var_name(provider_name))
        .chain(kind.vendor_env_vars().iter().map(|v| v.to_string()))
        .find_map(|var_name| {
            lookup(&var_name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (var_name, value))
        })
}

impl Config {
    /// Convert raw (deserialized) config to final config with env var expansion.
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        Self::from_raw_with(raw, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_raw`] with an injectable environment lookup.
    ///
    /// For each provider:
    /// - `api_key` containing `${VAR}` is expanded, source = `EnvExpanded`
    /// - a literal `api_key` is wrapped directly, source = `Literal`
    /// - an absent `api_key` is looked up as `AXCESS_<NAME>_API_KEY` and then
    ///   the vendor variable, source = `Convention(var_name)` or `None`
    pub fn from_raw_with<F>(
        raw: RawConfig,
        lookup: F,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::with_capacity(raw.providers.len());
        let mut key_sources = Vec::with_capacity(raw.providers.len());

        for (idx, rp) in raw.providers.into_iter().enumerate() {
            let kind = match rp.kind.or_else(|| ProviderKind::from_name(&rp.name)) {
                Some(kind) => kind,
                None => {
                    return Err(ConfigError::Validation(format!(
                        "providers[{}].kind is required for provider \"{}\" (openai, anthropic or google)",
                        idx, rp.name
                    )))
                }
            };

            let (api_key, source) = match rp.api_key {
                Some(ref raw_key) if raw_key.contains("${") => {
                    let expanded = expand_env_vars_with(raw_key, &rp.name, &lookup)?;
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Some(ref raw_key) => (Some(ApiKey::from(raw_key.as_str())), KeySource::Literal),
                None => match convention_key_lookup(&rp.name, kind, &lookup) {
                    Some((var_name, value)) => {
                        (Some(ApiKey::from(value)), KeySource::Convention(var_name))
                    }
                    None => (None, KeySource::None),
                },
            };

            let url = match rp.url {
                Some(ref raw_url) => Some(expand_env_vars_with(raw_url, &rp.name, &lookup)?),
                None => None,
            };

            key_sources.push((rp.name.clone(), source));

            providers.push(ProviderConfig {
                name: rp.name,
                kind,
                url,
                api_key,
                timeout_secs: rp.timeout_secs,
            });
        }

        let mut policies = raw.policies;
        policies.normalize();

        let config = Config {
            server: raw.server,
            providers,
            catalog: Arc::new(ModelsCatalog {
                aliases: raw.aliases,
                models: raw.models,
            }),
            policies: Arc::new(policies),
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Load configuration from a TOML file with environment variable expansion.
    ///
    /// Returns the config and per-provider key source information.
    pub fn from_file_with_env(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
        let (config, key_sources) = Self::from_raw(raw)?;
        config.validate()?;

        Ok((config, key_sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: &str = r#"
        [policies.routing]
        default_alias = "fast"

        [policies.caps]
        default = 2048

        [policies.temperatures]
        default = 0.7
    "#;

    const MODEL: &str = r#"
        [models."openai:gpt-4o-mini"]
        provider = "openai"
        model = "gpt-4o-mini"
        max_output_tokens = 16384
        cap = { default = 4096, hard = 8192 }
        pricing = { input = 0.00000015, output = 0.0000006 }
    "#;

    fn parse(extra: &str) -> Result<Config, ConfigError> {
        Config::parse_str(&format!("{}\n{}\n{}", MODEL, POLICIES, extra))
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_str(POLICIES).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert!(config.providers.is_empty());
        assert!(config.catalog.models.is_empty());
        assert_eq!(config.policies.caps.default, 2048);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:9000"

            [[providers]]
            name = "openai"
            api_key = "sk-literal"

            [[providers]]
            name = "claude"
            kind = "anthropic"
            url = "https://proxy.example.com/v1"
            timeout_secs = 30

            [aliases]
            fast = "openai:gpt-4o-mini"

            [models."openai:gpt-4o-mini"]
            provider = "openai"
            model = "gpt-4o-mini"
            max_output_tokens = 16384
            temperature = 0.4
            cap = { default = 4096 }
            pricing = { input = 0.00000015, output = 0.0000006, currency = "EUR" }

            [policies.routing]
            default_alias = "fast"
            token_buckets = [{ alias = "fast", max_prompt_tokens = 1000 }]

            [policies.routing.language_heuristics.pt]
            temperature = 0.5

            [policies.routing.fallbacks]
            fast = ["fast", ""]

            [policies.caps]
            default = 1024
            tiers = { free = 512, pro = 4096 }

            [policies.temperatures]
            default = 0.7
            domains = { code = 0.2, creative = 1.1 }

            [logging]
            level = "debug"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Openai);
        assert_eq!(config.providers[0].base_url(), "https://api.openai.com/v1");
        assert_eq!(config.providers[1].kind, ProviderKind::Anthropic);
        assert_eq!(config.providers[1].base_url(), "https://proxy.example.com/v1");
        assert_eq!(config.providers[1].timeout_secs, 30);
        assert_eq!(config.catalog.alias_target("fast"), Some("openai:gpt-4o-mini"));
        let spec = config.catalog.model("openai:gpt-4o-mini").unwrap();
        assert_eq!(spec.pricing.currency(), "EUR");
        assert_eq!(spec.cap.hard, None);
        assert_eq!(config.policies.caps.tier("pro"), Some(4096));
        assert_eq!(config.policies.temperatures.domain("code"), Some(0.2));
        assert_eq!(config.policies.routing.fallbacks["fast"], vec!["fast"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_default_currency_is_usd() {
        let config = parse("").unwrap();
        let spec = config.catalog.model("openai:gpt-4o-mini").unwrap();
        assert_eq!(spec.pricing.currency(), "USD");
    }

    #[test]
    fn test_alias_to_unknown_model_fails() {
        let err = parse("[aliases]\nfast = \"openai:missing\"")
            .unwrap_err()
            .to_string();
        assert!(err.contains("aliases.\"fast\""), "{}", err);
        assert!(err.contains("openai:missing"), "{}", err);
    }

    #[test]
    fn test_zero_cap_names_field_path() {
        let toml = r#"
            [models."m"]
            provider = "openai"
            model = "gpt"
            max_output_tokens = 100
            cap = { default = 0 }
            pricing = { input = 0.0, output = 0.0 }
        "#;
        let err = Config::parse_str(&format!("{}\n{}", toml, POLICIES))
            .unwrap_err()
            .to_string();
        assert!(err.contains("models.\"m\".cap.default"), "{}", err);
    }

    #[test]
    fn test_negative_price_fails() {
        let toml = r#"
            [models."m"]
            provider = "openai"
            model = "gpt"
            max_output_tokens = 100
            cap = { default = 10 }
            pricing = { input = -1.0, output = 0.0 }
        "#;
        let err = Config::parse_str(&format!("{}\n{}", toml, POLICIES))
            .unwrap_err()
            .to_string();
        assert!(err.contains("models.\"m\".pricing.input"), "{}", err);
    }

    #[test]
    fn test_missing_policies_block_fails() {
        let result = Config::parse_str(MODEL);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_blank_default_alias_fails() {
        let toml = r#"
            [policies.routing]
            default_alias = "  "
            [policies.caps]
            default = 10
            [policies.temperatures]
            default = 0.7
        "#;
        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("policies.routing.default_alias"), "{}", err);
    }

    #[test]
    fn test_zero_tier_cap_fails() {
        let toml = r#"
            [policies.routing]
            default_alias = "fast"
            [policies.caps]
            default = 10
            tiers = { free = 0 }
            [policies.temperatures]
            default = 0.7
        "#;
        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("policies.caps.tiers.free"), "{}", err);
    }

    #[test]
    fn test_unknown_provider_kind_requires_kind() {
        let err = parse("[[providers]]\nname = \"azure-east\"")
            .unwrap_err()
            .to_string();
        assert!(err.contains("providers[0].kind"), "{}", err);
    }

    #[test]
    fn test_duplicate_provider_name_fails() {
        let err = parse("[[providers]]\nname = \"openai\"\n[[providers]]\nname = \"openai\"")
            .unwrap_err()
            .to_string();
        assert!(err.contains("more than once"), "{}", err);
    }

    #[test]
    fn test_alias_for_model_reverse_lookup() {
        let config = parse("[aliases]\nfast = \"openai:gpt-4o-mini\"").unwrap();
        assert_eq!(config.catalog.alias_for_model("openai:gpt-4o-mini"), Some("fast"));
        assert_eq!(config.catalog.alias_for_model("other"), None);
    }

    #[test]
    fn test_token_bucket_bounds() {
        let bucket = TokenBucket {
            alias: "small".to_string(),
            min_prompt_tokens: Some(10),
            max_prompt_tokens: Some(20),
        };
        assert!(!bucket.contains(9));
        assert!(bucket.contains(10));
        assert!(bucket.contains(19));
        assert!(!bucket.contains(20));

        let open = TokenBucket {
            alias: "any".to_string(),
            min_prompt_tokens: None,
            max_prompt_tokens: None,
        };
        assert!(open.contains(0));
        assert!(open.contains(u64::MAX - 1));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("super-secret-token");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_display_redaction() {
        let key = ApiKey::from("super-secret-token");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("real-secret-value");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_provider_config_debug_redaction() {
        let config = parse("[[providers]]\nname = \"openai\"\napi_key = \"sk-abcd1234secret\"").unwrap();
        let debug_output = format!("{:?}", config.providers[0]);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk-abcd1234secret"));
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_single_var() {
        let lookup = |name: &str| match name {
            "MY_KEY" => Some("sk-abcd".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${MY_KEY}", "test", lookup).unwrap();
        assert_eq!(result, "sk-abcd");
    }

    #[test]
    fn test_expand_multiple_vars() {
        let lookup = |name: &str| match name {
            "SCHEME" => Some("https".to_string()),
            "HOST" => Some("example.com".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${SCHEME}://${HOST}/v1", "test", lookup).unwrap();
        assert_eq!(result, "https://example.com/v1");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("literal-value", "test", lookup).unwrap();
        assert_eq!(result, "literal-value");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let lookup = |_: &str| None;
        let err = expand_env_vars_with("${MISSING}", "provider-alpha", lookup)
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("provider-alpha"), "Error should name the provider");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_convention_env_var_name() {
        assert_eq!(convention_env_var_name("openai"), "AXCESS_OPENAI_API_KEY");
        assert_eq!(
            convention_env_var_name("azure-east"),
            "AXCESS_AZURE_EAST_API_KEY"
        );
    }

    // ── from_raw_with tests (injected environment) ──

    fn make_raw_config(provider_name: &str, api_key: Option<String>) -> RawConfig {
        let toml = format!(
            "[[providers]]\nname = \"{}\"\n{}\n{}",
            provider_name,
            api_key
                .map(|k| format!("api_key = \"{}\"", k))
                .unwrap_or_default(),
            POLICIES
        );
        toml::from_str(&toml).unwrap()
    }

    #[test]
    fn test_from_raw_literal_key() {
        let raw = make_raw_config("openai", Some("literal-key-value".to_string()));
        let (config, key_sources) = Config::from_raw_with(raw, |_| None).unwrap();

        assert_eq!(key_sources, vec![("openai".to_string(), KeySource::Literal)]);
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "literal-key-value"
        );
    }

    #[test]
    fn test_from_raw_env_expanded_key() {
        let raw = make_raw_config("openai", Some("${MY_OPENAI}".to_string()));
        let (config, key_sources) = Config::from_raw_with(raw, |name| {
            (name == "MY_OPENAI").then(|| "sk-expanded".to_string())
        })
        .unwrap();

        assert_eq!(key_sources[0].1, KeySource::EnvExpanded);
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "sk-expanded"
        );
    }

    #[test]
    fn test_from_raw_convention_key_wins_over_vendor() {
        let raw = make_raw_config("openai", None);
        let (config, key_sources) = Config::from_raw_with(raw, |name| match name {
            "AXCESS_OPENAI_API_KEY" => Some("sk-convention".to_string()),
            "OPENAI_API_KEY" => Some("sk-vendor".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(
            key_sources[0].1,
            KeySource::Convention("AXCESS_OPENAI_API_KEY".to_string())
        );
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "sk-convention"
        );
    }

    #[test]
    fn test_from_raw_vendor_key() {
        let raw = make_raw_config("google", None);
        let (_, key_sources) = Config::from_raw_with(raw, |name| {
            (name == "GOOGLE_AI_API_KEY").then(|| "g-key".to_string())
        })
        .unwrap();

        assert_eq!(
            key_sources[0].1,
            KeySource::Convention("GOOGLE_AI_API_KEY".to_string())
        );
    }

    #[test]
    fn test_from_raw_no_key() {
        let raw = make_raw_config("anthropic", None);
        let (config, key_sources) = Config::from_raw_with(raw, |_| None).unwrap();

        assert_eq!(key_sources[0].1, KeySource::None);
        assert!(config.providers[0].api_key.is_none());
    }

    #[test]
    fn test_from_raw_missing_env_var_fails() {
        let raw = make_raw_config("openai", Some("${DEFINITELY_MISSING}".to_string()));
        let err = Config::from_raw_with(raw, |_| None).unwrap_err().to_string();
        assert!(err.contains("DEFINITELY_MISSING"), "{}", err);
        assert!(err.contains("openai"), "{}", err);
    }
}
