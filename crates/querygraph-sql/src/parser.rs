//! SQL parsing using datafusion-sqlparser-rs
//!
//! Guards the input, parses SQL into an AST and maps grammar failures onto the
//! transpiler error taxonomy.

use querygraph_core::{DialectConfig, LimitsConfig, Location, TranspileError};
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    BigQueryDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// SQL parser with configurable dialect and input guards
pub struct SqlParser {
    dialect: Box<dyn Dialect + Send + Sync>,
    limits: LimitsConfig,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self::from_dialect(&DialectConfig::Ansi)
    }

    /// Create a parser from a dialect config
    ///
    /// Oracle has no dedicated grammar and uses the generic one.
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        let dialect: Box<dyn Dialect + Send + Sync> = match dialect {
            DialectConfig::Ansi | DialectConfig::Oracle => Box::new(GenericDialect {}),
            DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
            DialectConfig::MySql => Box::new(MySqlDialect {}),
            DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
            DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
            DialectConfig::MsSql => Box::new(MsSqlDialect {}),
            DialectConfig::Sqlite => Box::new(SQLiteDialect {}),
        };

        Self {
            dialect,
            limits: LimitsConfig::default(),
        }
    }

    /// Replace the input-size guards
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Reject empty and pathological inputs before invoking the grammar
    pub fn check_input(&self, sql: &str) -> Result<(), TranspileError> {
        check_input(sql, &self.limits)
    }

    /// Parse SQL string into AST
    ///
    /// Input guards run first; grammar failures become `TranspileError::Syntax`.
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, TranspileError> {
        self.check_input(sql)?;
        self.parse_unguarded(sql)
    }

    /// Parse without the input guards, for callers that already ran them
    pub fn parse_unguarded(&self, sql: &str) -> Result<ParsedSql, TranspileError> {
        let statements = Parser::parse_sql(&*self.dialect, sql).map_err(|e| {
            let message = e.to_string();
            let location = error_location(&message);
            TranspileError::Syntax { message, location }
        })?;

        Ok(ParsedSql {
            sql: sql.to_string(),
            statements,
            quoted_identifiers: self.quoted_identifiers(sql),
        })
    }

    /// Values of every delimited identifier token (`"x"`, `` `x` ``, `[x]`)
    fn quoted_identifiers(&self, sql: &str) -> BTreeSet<String> {
        Tokenizer::new(&*self.dialect, sql)
            .tokenize()
            .map(|tokens| {
                tokens
                    .into_iter()
                    .filter_map(|token| match token {
                        Token::Word(word) if word.quote_style.is_some() => Some(word.value),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Input guards shared by every parsing strategy
pub fn check_input(sql: &str, limits: &LimitsConfig) -> Result<(), TranspileError> {
    if sql.trim().is_empty() {
        return Err(TranspileError::InputValidation("query is empty".to_string()));
    }

    let length = sql.chars().count();
    if length > limits.max_query_length {
        return Err(TranspileError::InputValidation(format!(
            "query is {} characters long, the maximum is {}",
            length, limits.max_query_length
        )));
    }

    let joins = join_keyword().find_iter(sql).count();
    if joins > limits.max_joins {
        return Err(TranspileError::InputValidation(format!(
            "query has {} joins, the maximum is {}",
            joins, limits.max_joins
        )));
    }

    let tables = joins + from_keyword().find_iter(sql).count();
    if tables > limits.max_tables {
        return Err(TranspileError::InputValidation(format!(
            "query references {} tables, the maximum is {}",
            tables, limits.max_tables
        )));
    }

    Ok(())
}

fn join_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bjoin\b").expect("valid regex"))
}

fn from_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfrom\b").expect("valid regex"))
}

/// Pull `Line: N, Column: M` out of a sqlparser error message
fn error_location(message: &str) -> Option<Location> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Line: (\d+), Column:? (\d+)").expect("valid regex"));

    let caps = re.captures(message)?;
    let line = caps.get(1)?.as_str().parse().ok()?;
    let column = caps.get(2)?.as_str().parse().ok()?;
    Some(Location::new(line, column))
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,

    /// Identifiers written with delimiters in `sql`
    pub quoted_identifiers: BTreeSet<String>,
}
