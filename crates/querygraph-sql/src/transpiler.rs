//! Transpiler context
//!
//! Owns the configuration, the strategy chain and the parse cache. Cheap to
//! share across threads by reference.

use crate::cache::{CacheStats, ParseCache};
use crate::fallback::FallbackOrchestrator;
use crate::generator::{GeneratorOptions, SqlGenerator};
use crate::result::{GenerateResult, ParseResult, StrategyKind};
use crate::roundtrip::{RoundTripResult, RoundTripValidator};
use querygraph_core::{Config, ConfigError, QueryModel};
use std::path::Path;
use tracing::debug;

pub struct Transpiler {
    config: Config,
    orchestrator: FallbackOrchestrator,
    cache: ParseCache,
    validator: RoundTripValidator,
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Transpiler {
    pub fn new(config: Config) -> Self {
        let orchestrator = FallbackOrchestrator::new(config.dialect, config.limits.clone());
        let cache = ParseCache::new(config.cache.capacity);

        // Round trips compare single-line output, whatever the configured layout
        let validator = RoundTripValidator::new(config_generator_options(&config).with_format(false));

        Self {
            config,
            orchestrator,
            cache,
            validator,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(Config::from_file(path)?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generator options from the `[generator]` section
    pub fn generator_options(&self) -> GeneratorOptions {
        config_generator_options(&self.config)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Parse SQL into a query model
    pub fn parse(&self, sql: &str) -> ParseResult {
        let key = ParseCache::key(self.config.dialect, sql);
        if let Some(cached) = self.cache.get(&key) {
            debug!("parse cache hit");
            return cached;
        }

        let result = self.orchestrator.parse(sql);

        // Degraded and pattern results keep raw text (unparsed SQL, error
        // locations, expression snippets) that differs between equal keys
        if result.success && result.strategy == StrategyKind::Ast {
            self.cache.insert(key, result.clone());
        }
        result
    }

    /// Render a model as SQL
    pub fn generate(&self, model: &QueryModel, options: &GeneratorOptions) -> GenerateResult {
        SqlGenerator::new(options.clone()).generate(model).into()
    }

    /// Parse, regenerate and compare
    pub fn validate_round_trip(&self, sql: &str) -> RoundTripResult {
        let parsed = self.parse(sql);
        self.validator.validate(sql, parsed)
    }
}

fn config_generator_options(config: &Config) -> GeneratorOptions {
    GeneratorOptions::from_config(&config.generator, config.dialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygraph_core::{CacheConfig, DialectConfig, FilterValue};

    #[test]
    fn repeated_parse_hits_cache() {
        let transpiler = Transpiler::default();

        let first = transpiler.parse("SELECT * FROM users");
        let second = transpiler.parse("SELECT *\n  FROM users");

        assert_eq!(first, second);
        assert_eq!(transpiler.cache_stats().hits, 1);
    }

    #[test]
    fn string_literal_whitespace_is_not_shared_through_cache() {
        let transpiler = Transpiler::default();

        let first = transpiler.parse("SELECT * FROM users WHERE name = 'a  b'");
        let second = transpiler.parse("SELECT * FROM users WHERE name = 'a b'");

        let value = |result: &ParseResult| result.model().and_then(|m| m.filters[0].value.clone());
        assert_eq!(value(&first), Some(FilterValue::Text("a  b".to_string())));
        assert_eq!(value(&second), Some(FilterValue::Text("a b".to_string())));
        assert_eq!(transpiler.cache_stats().hits, 0);
    }

    #[test]
    fn failed_parses_are_not_cached() {
        let transpiler = Transpiler::default();

        let first = transpiler.parse("SELECT FROM WHERE");
        let second = transpiler.parse("SELECT   FROM   WHERE");

        assert_eq!(first.data.and_then(|m| m.unparsed).as_deref(), Some("SELECT FROM WHERE"));
        assert_eq!(
            second.data.and_then(|m| m.unparsed).as_deref(),
            Some("SELECT   FROM   WHERE")
        );
        assert_eq!(transpiler.cache_stats().entries, 0);
    }

    #[test]
    fn disabled_cache_still_parses() {
        let config = Config {
            cache: CacheConfig { capacity: 0 },
            ..Config::default()
        };
        let transpiler = Transpiler::new(config);

        assert!(transpiler.parse("SELECT * FROM users").success);
        assert!(transpiler.parse("SELECT * FROM users").success);
        assert_eq!(transpiler.cache_stats().entries, 0);
    }

    #[test]
    fn generator_options_follow_config() {
        let config = Config::from_toml(
            r#"
dialect = "postgres"

[generator]
use_aliases = false
"#,
        )
        .unwrap();
        let transpiler = Transpiler::new(config);

        let options = transpiler.generator_options();
        assert_eq!(options.dialect, DialectConfig::Postgres);
        assert!(!options.use_aliases);
    }

    #[test]
    fn generate_reports_failures_as_results() {
        let transpiler = Transpiler::default();
        let result = transpiler.generate(&QueryModel::new(), &GeneratorOptions::default());

        assert!(!result.success);
        assert!(result.sql.is_none());
    }

    #[test]
    fn transpiler_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transpiler>();
    }
}
