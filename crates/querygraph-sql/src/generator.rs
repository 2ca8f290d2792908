//! SQL generation
//!
//! Renders a [`QueryModel`] back into SQL text for a target dialect. The
//! generator never mutates the model; anything it has to rewrite to produce
//! valid SQL is reported as a warning.

use crate::extractor::is_plain_identifier;
use querygraph_core::{
    AggregateFunction, Diagnostic, DiagnosticCode, DialectConfig, FilterOperator, FilterValue,
    GeneratorConfig, JoinRelation, JoinType, QueryModel, SortDirection, TableNode, TranspileError,
    UNKNOWN_TABLE, WILDCARD,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Words that always need quoting when used as an identifier
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "create", "cross",
    "default", "delete", "desc", "distinct", "else", "end", "exists", "false", "fetch", "from",
    "full", "group", "having", "in", "index", "inner", "insert", "into", "is", "join", "key",
    "left", "like", "limit", "not", "null", "offset", "on", "or", "order", "outer", "over",
    "partition", "primary", "right", "select", "set", "table", "then", "top", "true", "union",
    "update", "user", "using", "values", "when", "where", "window", "with",
];

/// Rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    pub dialect: DialectConfig,

    /// One clause per line, list items indented
    pub format: bool,

    /// Emit table aliases and qualify columns with them
    pub use_aliases: bool,

    /// Emit joins ordered INNER, LEFT, RIGHT, FULL
    pub optimize_joins: bool,

    /// Quote every identifier instead of only those that need it
    pub quote_all_identifiers: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self::from_config(&GeneratorConfig::default(), DialectConfig::default())
    }
}

impl GeneratorOptions {
    /// Options from configuration; `dialect` applies when the config names none
    pub fn from_config(config: &GeneratorConfig, dialect: DialectConfig) -> Self {
        Self {
            dialect: config.dialect.unwrap_or(dialect),
            format: config.format,
            use_aliases: config.use_aliases,
            optimize_joins: config.optimize_joins,
            quote_all_identifiers: config.quote_all_identifiers,
        }
    }

    pub fn with_dialect(mut self, dialect: DialectConfig) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    pub fn with_aliases(mut self, use_aliases: bool) -> Self {
        self.use_aliases = use_aliases;
        self
    }
}

/// Rough size class of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// `tables + 2·joins + filters + 1.5·aggregations`, bucketed at 3 and 8
    pub fn of(model: &QueryModel) -> Self {
        let score = model.tables.len() as f64
            + 2.0 * model.joins.len() as f64
            + model.filters.len() as f64
            + 1.5 * model.aggregations.len() as f64;

        if score <= 3.0 {
            Self::Simple
        } else if score <= 8.0 {
            Self::Medium
        } else {
            Self::Complex
        }
    }
}

/// Output of a successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    pub sql: String,
    pub warnings: Vec<Diagnostic>,
    pub complexity: Complexity,
}

/// Renders query models as SQL
#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    options: GeneratorOptions,
}

impl SqlGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Render `model` as SQL
    pub fn generate(&self, model: &QueryModel) -> Result<GeneratedSql, TranspileError> {
        if model.is_unparsed() {
            return Err(TranspileError::Generation(
                "model holds unparsed SQL and has no structure to render".to_string(),
            ));
        }

        model.validate()?;

        let visible: Vec<&TableNode> = model.visible_tables().collect();
        if visible.is_empty() {
            return Err(TranspileError::Generation("no tables".to_string()));
        }

        let mut render = Render::new(model, &visible, &self.options);
        let sql = render.query()?;

        Ok(GeneratedSql {
            sql,
            warnings: render.warnings,
            complexity: Complexity::of(model),
        })
    }
}

/// State for rendering one model
struct Render<'a> {
    model: &'a QueryModel,
    visible: &'a [&'a TableNode],
    options: &'a GeneratorOptions,

    /// Table id to the qualifier used in column references
    references: HashMap<&'a str, String>,

    /// Table id to the alias written after the table in FROM/JOIN
    aliases: HashMap<&'a str, String>,

    hidden: HashSet<&'a str>,
    warnings: Vec<Diagnostic>,
}

impl<'a> Render<'a> {
    fn new(model: &'a QueryModel, visible: &'a [&'a TableNode], options: &'a GeneratorOptions) -> Self {
        let hidden = model
            .tables
            .iter()
            .filter(|t| t.is_hidden())
            .map(|t| t.id.as_str())
            .collect();

        let mut render = Self {
            model,
            visible,
            options,
            references: HashMap::new(),
            aliases: HashMap::new(),
            hidden,
            warnings: Vec::new(),
        };
        render.assign_aliases();
        render
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings
            .push(Diagnostic::warning(DiagnosticCode::GenerationAdjusted, message));
    }

    // ------------------------------------------------------------------
    // Aliases and identifiers
    // ------------------------------------------------------------------

    fn assign_aliases(&mut self) {
        let visible = self.visible;
        let mut taken: HashSet<String> = HashSet::new();

        if self.options.use_aliases {
            // Aliases written in the SQL are kept verbatim and reserved first
            for table in visible.iter().copied() {
                if let Some(alias) = &table.alias {
                    taken.insert(alias.to_lowercase());
                    self.bind_alias(table, alias.clone());
                }
            }

            for (index, table) in visible.iter().copied().enumerate() {
                if table.alias.is_some() {
                    continue;
                }
                let base = if table.is_virtual() {
                    table.name.clone()
                } else {
                    derive_alias(&table.name)
                };
                let alias = unique_alias(&base, index + 1, &mut taken);
                self.bind_alias(table, alias);
            }
            return;
        }

        // Without aliases columns are qualified by table name; only virtual
        // tables and repeated names still need one
        let mut seen: HashSet<String> = HashSet::new();
        for table in visible.iter().copied() {
            let repeated = !seen.insert(table.qualified_name().to_lowercase());
            if table.is_virtual() || repeated || !table.column_aliases.is_empty() {
                let alias = table.alias.clone().unwrap_or_else(|| table.id.clone());
                self.bind_alias(table, alias);
            } else {
                let reference = self.table_name(table);
                self.references.insert(table.id.as_str(), reference);
            }
        }
    }

    fn bind_alias(&mut self, table: &'a TableNode, alias: String) {
        let quoted = self.ident(&alias);
        self.references.insert(table.id.as_str(), quoted.clone());
        self.aliases.insert(table.id.as_str(), quoted);
    }

    fn ident(&self, name: &str) -> String {
        let (open, close) = self.options.dialect.identifier_quotes();
        let reserved = RESERVED_WORDS.contains(&name.to_lowercase().as_str());
        let delimited = self.model.quoted_identifiers.contains(name);

        if self.options.quote_all_identifiers || reserved || delimited || !is_plain_identifier(name) {
            let escaped = name.replace(close, &format!("{}{}", close, close));
            format!("{}{}{}", open, escaped, close)
        } else {
            name.to_string()
        }
    }

    /// Dotted path with every part quoted as needed
    fn path(&self, dotted: &str) -> String {
        dotted.split('.').map(|part| self.ident(part)).collect::<Vec<_>>().join(".")
    }

    fn table_name(&self, table: &TableNode) -> String {
        table
            .name_parts()
            .into_iter()
            .map(|part| self.ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn is_hidden(&self, table: &str) -> bool {
        self.hidden.contains(table)
    }

    /// `qualifier.column` for a model table reference
    fn column(&self, table: &str, column: &str) -> String {
        let column_sql = if column == WILDCARD {
            WILDCARD.to_string()
        } else if table == UNKNOWN_TABLE {
            self.path(column)
        } else {
            self.ident(column)
        };

        match self.references.get(table) {
            Some(reference) => format!("{}.{}", reference, column_sql),
            None => column_sql,
        }
    }

    /// A GROUP BY / ORDER BY entry: remap `tableId.column`, keep expressions verbatim
    fn reference(&self, text: &str) -> String {
        if is_plain_identifier(text) {
            return self.ident(text);
        }
        if let Some((table, column)) = text.split_once('.') {
            if is_plain_identifier(table) && is_plain_identifier(column) {
                if self.references.contains_key(table) {
                    return self.column(table, column);
                }
                return format!("{}.{}", self.ident(table), self.ident(column));
            }
        }
        text.to_string()
    }

    fn literal(&self, value: &FilterValue) -> String {
        match value {
            FilterValue::Number(n) => n.clone(),
            FilterValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            FilterValue::Boolean(b) => match (self.options.dialect, *b) {
                (DialectConfig::MsSql, true) => "1".to_string(),
                (DialectConfig::MsSql, false) => "0".to_string(),
                (_, true) => "TRUE".to_string(),
                (_, false) => "FALSE".to_string(),
            },
            FilterValue::Null => "NULL".to_string(),
            FilterValue::List(items) => format!(
                "({})",
                items.iter().map(|v| self.literal(v)).collect::<Vec<_>>().join(", ")
            ),
        }
    }

    fn predicate(&self, left: String, operator: FilterOperator, value: Option<&FilterValue>) -> String {
        match value {
            _ if operator.is_null_check() => format!("{} {}", left, operator.as_sql()),
            Some(value) => format!("{} {} {}", left, operator.as_sql(), self.literal(value)),
            // Rejected by model validation
            None => format!("{} {} NULL", left, operator.as_sql()),
        }
    }

    fn aggregate(&self, function: AggregateFunction, table: &str, column: &str, expression: Option<&str>) -> String {
        let argument = match expression {
            Some(expression) => expression.to_string(),
            None if table == WILDCARD || (column == WILDCARD && table == UNKNOWN_TABLE) => WILDCARD.to_string(),
            None => self.column(table, column),
        };
        let distinct = if function.is_distinct() { "DISTINCT " } else { "" };
        format!("{}({}{})", function.sql_name(), distinct, argument)
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn query(&mut self) -> Result<String, TranspileError> {
        let mut clauses = Vec::new();

        clauses.push(self.select_clause());

        let (from, join_predicates) = self.from_clause()?;
        clauses.extend(from);

        if let Some(clause) = self.where_clause(join_predicates) {
            clauses.push(clause);
        }

        let group_by: Vec<String> = self
            .model
            .group_by_columns
            .iter()
            .map(|c| self.reference(c))
            .collect();
        if !group_by.is_empty() {
            clauses.push(format!("GROUP BY {}", group_by.join(", ")));
        }

        let having: Vec<String> = self
            .model
            .having
            .iter()
            .map(|h| {
                let left = self.aggregate(h.function, &h.table, &h.column, None);
                self.predicate(left, h.operator, h.value.as_ref())
            })
            .collect();
        if !having.is_empty() {
            clauses.push(format!("HAVING {}", having.join(self.and_separator())));
        }

        let mut order_by: Vec<String> = self
            .model
            .order_by_columns
            .iter()
            .map(|o| match o.direction {
                SortDirection::Asc => self.reference(&o.column),
                SortDirection::Desc => format!("{} DESC", self.reference(&o.column)),
            })
            .collect();

        let paging = self.paging_clauses(&mut order_by);
        if !order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", order_by.join(", ")));
        }
        clauses.extend(paging);

        let separator = if self.options.format { "\n" } else { " " };
        Ok(clauses.join(separator))
    }

    fn list_separator(&self) -> &'static str {
        if self.options.format {
            ",\n  "
        } else {
            ", "
        }
    }

    fn and_separator(&self) -> &'static str {
        if self.options.format {
            "\n  AND "
        } else {
            " AND "
        }
    }

    fn select_clause(&self) -> String {
        let mut items = Vec::new();

        for column in &self.model.select_columns {
            if self.is_hidden(&column.table) {
                continue;
            }
            let mut item = match &column.expression {
                Some(expression) => expression.clone(),
                None if column.table == WILDCARD => WILDCARD.to_string(),
                None => self.column(&column.table, &column.column),
            };
            if let Some(alias) = &column.alias {
                item = format!("{} AS {}", item, self.ident(alias));
            }
            items.push(item);
        }

        for agg in &self.model.aggregations {
            if self.is_hidden(&agg.table) {
                continue;
            }
            let mut item = self.aggregate(agg.function, &agg.table, &agg.column, agg.expression.as_deref());
            if let Some(alias) = &agg.alias {
                item = format!("{} AS {}", item, self.ident(alias));
            }
            items.push(item);
        }

        if items.is_empty() {
            items.push(WILDCARD.to_string());
        }

        let mut head = String::from("SELECT");
        if self.model.distinct {
            head.push_str(" DISTINCT");
        }
        if let (DialectConfig::MsSql, Some(limit), None) = (self.options.dialect, self.model.limit, self.model.offset) {
            head.push_str(&format!(" TOP {}", limit));
        }

        let lead = if self.options.format { "\n  " } else { " " };
        format!("{}{}{}", head, lead, items.join(self.list_separator()))
    }

    fn table_factor(&self, table: &TableNode) -> String {
        let base = match &table.derived {
            Some(subquery) => format!("({})", subquery),
            None => self.table_name(table),
        };

        let aliased = match self.aliases.get(table.id.as_str()) {
            Some(alias) if self.options.dialect == DialectConfig::Oracle => format!("{} {}", base, alias),
            Some(alias) => format!("{} AS {}", base, alias),
            None => return base,
        };

        if table.column_aliases.is_empty() {
            aliased
        } else {
            format!("{} ({})", aliased, table.column_aliases.join(", "))
        }
    }

    fn join_keyword(join_type: JoinType) -> &'static str {
        match join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }

    fn equality(&self, join: &JoinRelation) -> String {
        format!(
            "{} = {}",
            self.column(&join.source_table, &join.source_column),
            self.column(&join.target_table, &join.target_column)
        )
    }

    /// FROM and JOIN lines plus join equalities that must move to WHERE
    fn from_clause(&mut self) -> Result<(Vec<String>, Vec<String>), TranspileError> {
        let model = self.model;
        let mut pending: Vec<&'a JoinRelation> = model
            .joins
            .iter()
            .filter(|j| !self.is_hidden(&j.source_table) && !self.is_hidden(&j.target_table))
            .collect();

        if self.options.optimize_joins {
            pending.sort_by_key(|j| j.join_type.priority());
        }

        let visible = self.visible;
        let first = visible[0];
        let mut in_scope: HashSet<&str> = HashSet::from([first.id.as_str()]);
        let mut lines = vec![format!("FROM {}", self.table_factor(first))];
        let mut predicates = Vec::new();

        loop {
            let next = pending.iter().position(|j| {
                in_scope.contains(j.source_table.as_str()) || in_scope.contains(j.target_table.as_str())
            });

            if let Some(index) = next {
                let join = pending.remove(index);
                let source_in = in_scope.contains(join.source_table.as_str());
                let target_in = in_scope.contains(join.target_table.as_str());

                if source_in && target_in {
                    if join.join_type != JoinType::Inner {
                        self.warn(format!(
                            "{} join '{}' connects tables already joined and was rendered as an inner condition in WHERE",
                            join.join_type, join.id
                        ));
                    }
                    predicates.push(self.equality(join));
                    continue;
                }

                let (new_table, join_type) = if source_in {
                    (join.target_table.as_str(), join.join_type)
                } else {
                    (join.source_table.as_str(), join.join_type.mirrored())
                };

                let table = self.lookup(new_table)?;
                lines.push(format!(
                    "{} {} ON {}",
                    Self::join_keyword(join_type),
                    self.table_factor(table),
                    self.equality(join)
                ));
                in_scope.insert(new_table);
                continue;
            }

            let unreached = visible.iter().copied().find(|t| !in_scope.contains(t.id.as_str()));
            match unreached {
                Some(table) => {
                    lines.push(format!("CROSS JOIN {}", self.table_factor(table)));
                    in_scope.insert(table.id.as_str());
                }
                None => break,
            }
        }

        if self.options.format {
            Ok((lines, predicates))
        } else {
            Ok((vec![lines.join(" ")], predicates))
        }
    }

    fn lookup(&self, id: &str) -> Result<&'a TableNode, TranspileError> {
        self.model
            .table(id)
            .ok_or_else(|| TranspileError::ReferentialIntegrity(format!("join references unknown table '{}'", id)))
    }

    fn where_clause(&self, join_predicates: Vec<String>) -> Option<String> {
        let mut conditions = join_predicates;

        for filter in &self.model.filters {
            if self.is_hidden(&filter.table) {
                continue;
            }
            let left = self.column(&filter.table, &filter.column);
            conditions.push(self.predicate(left, filter.operator, filter.value.as_ref()));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(format!("WHERE {}", conditions.join(self.and_separator())))
        }
    }

    /// LIMIT/OFFSET in the dialect's syntax; may add an ORDER BY item
    fn paging_clauses(&mut self, order_by: &mut Vec<String>) -> Vec<String> {
        let limit = self.model.limit;
        let offset = self.model.offset;
        let mut clauses = Vec::new();

        match self.options.dialect {
            DialectConfig::MsSql => {
                // TOP covers the limit-only case in the SELECT clause
                if let Some(offset) = offset {
                    if order_by.is_empty() {
                        order_by.push("(SELECT NULL)".to_string());
                        self.warn("OFFSET requires ORDER BY in this dialect; ORDER BY (SELECT NULL) was added");
                    }
                    clauses.push(format!("OFFSET {} ROWS", offset));
                    if let Some(limit) = limit {
                        clauses.push(format!("FETCH NEXT {} ROWS ONLY", limit));
                    }
                }
            }
            DialectConfig::Oracle => {
                if let Some(offset) = offset {
                    clauses.push(format!("OFFSET {} ROWS", offset));
                }
                if let Some(limit) = limit {
                    clauses.push(format!("FETCH FIRST {} ROWS ONLY", limit));
                }
            }
            dialect => {
                match (limit, offset) {
                    (Some(limit), _) => clauses.push(format!("LIMIT {}", limit)),
                    (None, Some(_)) if dialect == DialectConfig::MySql => {
                        self.warn("OFFSET without LIMIT is not valid in this dialect; the maximum row count was added");
                        clauses.push(format!("LIMIT {}", u64::MAX));
                    }
                    (None, Some(_)) if dialect == DialectConfig::Sqlite => {
                        self.warn("OFFSET without LIMIT is not valid in this dialect; LIMIT -1 was added");
                        clauses.push("LIMIT -1".to_string());
                    }
                    _ => {}
                }
                if let Some(offset) = offset {
                    clauses.push(format!("OFFSET {}", offset));
                }
            }
        }

        clauses
    }
}

/// Initials of the name's words, lower case, at most three letters
fn derive_alias(name: &str) -> String {
    let initials: String = name
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter_map(|word| word.chars().next())
        .filter(|c| c.is_ascii_alphabetic())
        .flat_map(char::to_lowercase)
        .take(3)
        .collect();

    if initials.is_empty() {
        "t".to_string()
    } else {
        initials
    }
}

/// Disambiguate `base` with the table ordinal until it is free
fn unique_alias(base: &str, ordinal: usize, taken: &mut HashSet<String>) -> String {
    let is_free = |candidate: &str, taken: &HashSet<String>| {
        !taken.contains(&candidate.to_lowercase()) && !RESERVED_WORDS.contains(&candidate.to_lowercase().as_str())
    };

    let mut candidate = base.to_string();
    let mut suffix = ordinal;
    while !is_free(&candidate, taken) {
        candidate = format!("{}{}", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.to_lowercase());
    candidate
}
