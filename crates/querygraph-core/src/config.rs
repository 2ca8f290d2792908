//! Transpiler configuration (querygraph.toml)

use serde::{Deserialize, Serialize};

/// SQL dialect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// Generic ANSI SQL
    Ansi,

    /// PostgreSQL SQL dialect
    Postgres,

    /// MySQL / MariaDB SQL dialect
    MySql,

    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// Microsoft SQL Server dialect
    MsSql,

    /// Oracle SQL dialect
    Oracle,

    /// SQLite SQL dialect
    Sqlite,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Ansi
    }
}

impl DialectConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ansi => "ansi",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::BigQuery => "bigquery",
            Self::Snowflake => "snowflake",
            Self::MsSql => "mssql",
            Self::Oracle => "oracle",
            Self::Sqlite => "sqlite",
        }
    }

    /// Opening and closing identifier quote characters
    pub fn identifier_quotes(&self) -> (char, char) {
        match self {
            Self::MySql => ('`', '`'),
            Self::MsSql | Self::Oracle => ('[', ']'),
            Self::Ansi | Self::Postgres | Self::BigQuery | Self::Snowflake | Self::Sqlite => ('"', '"'),
        }
    }
}

impl std::str::FromStr for DialectConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ansi" | "generic" => Ok(Self::Ansi),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "bigquery" => Ok(Self::BigQuery),
            "snowflake" => Ok(Self::Snowflake),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            "oracle" => Ok(Self::Oracle),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::ParseError(format!("unknown dialect '{}'", other))),
        }
    }
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input-size guards enforced before the grammar library runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum query length in characters
    pub max_query_length: usize,

    /// Maximum number of table references (FROM + JOIN keywords)
    pub max_tables: usize,

    /// Maximum number of JOIN keywords
    pub max_joins: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_length: 100_000,
            max_tables: 50,
            max_joins: 30,
        }
    }
}

/// Defaults for SQL generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Target dialect (defaults to the parsing dialect when absent)
    pub dialect: Option<DialectConfig>,

    /// Emit one clause item per line
    pub format: bool,

    /// Emit table aliases
    pub use_aliases: bool,

    /// Reorder joins INNER, LEFT, RIGHT, FULL
    pub optimize_joins: bool,

    /// Quote every identifier, not only those that need it
    pub quote_all_identifiers: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            format: true,
            use_aliases: true,
            optimize_joins: false,
            quote_all_identifiers: false,
        }
    }
}

/// Parse result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached parse results; 0 disables the cache
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect used for parsing
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Input-size guards
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Generator defaults
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Parse cache
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Dialect the generator targets
    pub fn generator_dialect(&self) -> DialectConfig {
        self.generator.dialect.unwrap_or(self.dialect)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, DialectConfig::Ansi);
        assert_eq!(config.limits.max_joins, 30);
        assert!(config.generator.use_aliases);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            dialect = "mysql"

            [limits]
            max_tables = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectConfig::MySql);
        assert_eq!(config.limits.max_tables, 5);
        assert_eq!(config.limits.max_query_length, 100_000);
        assert_eq!(config.cache.capacity, 128);
        assert_eq!(config.generator_dialect(), DialectConfig::MySql);
    }

    #[test]
    fn generator_dialect_override() {
        let config = Config::from_toml(
            r#"
            dialect = "postgres"

            [generator]
            dialect = "mssql"
            format = false
            "#,
        )
        .unwrap();

        assert_eq!(config.generator_dialect(), DialectConfig::MsSql);
        assert!(!config.generator.format);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = Config::from_toml("dialect = 42").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("querygraph.toml");

        let mut config = Config::default();
        config.dialect = DialectConfig::Snowflake;
        config.cache.capacity = 0;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn dialect_quotes() {
        assert_eq!(DialectConfig::MySql.identifier_quotes(), ('`', '`'));
        assert_eq!(DialectConfig::Postgres.identifier_quotes(), ('"', '"'));
        assert_eq!(DialectConfig::MsSql.identifier_quotes(), ('[', ']'));
    }

    #[test]
    fn dialect_from_str() {
        assert_eq!("PostgreSQL".parse::<DialectConfig>().unwrap(), DialectConfig::Postgres);
        assert!("cobol".parse::<DialectConfig>().is_err());
    }
}
