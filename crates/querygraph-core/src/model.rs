//! Canonical query model
//!
//! The Query Model is the system of record between the SQL text and the
//! visual canvas. It is dialect independent and treated as an immutable value:
//! the extractor builds one wholesale, the generator only reads it.

use crate::error::TranspileError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};

/// Table reference used for unqualified columns
pub const UNKNOWN_TABLE: &str = "unknown";

/// Table reference (and column name) used for wildcards
pub const WILDCARD: &str = "*";

/// Catalog/schema name used when the SQL does not qualify a table
pub const DEFAULT_NAMESPACE: &str = "default";

const GRID_BASE_X: f64 = 100.0;
const GRID_BASE_Y: f64 = 100.0;
const GRID_SPACING: f64 = 250.0;
const GRID_COLUMNS: usize = 3;

/// Canvas coordinate of a table node (UI only, no semantic meaning)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Deterministic grid slot for the table at `index` in extraction order
    pub fn grid(index: usize) -> Self {
        Self {
            x: GRID_BASE_X + (index % GRID_COLUMNS) as f64 * GRID_SPACING,
            y: GRID_BASE_Y + (index / GRID_COLUMNS) as f64 * GRID_SPACING,
        }
    }
}

/// A table on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNode {
    /// Unique within a model
    pub id: String,

    pub name: String,

    #[serde(default = "default_namespace")]
    pub schema: String,

    #[serde(default = "default_namespace")]
    pub catalog: String,

    /// Alias written in the SQL text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Column names, populated by the catalog browser
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub position: Position,

    /// SQL of the subquery this virtual table stands for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<String>,

    /// Id of the virtual table this table was merged from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Column list of a virtual table's alias, `AS t (a, b)`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_aliases: Vec<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl TableNode {
    /// Create a table in the default catalog and schema
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schema: default_namespace(),
            catalog: default_namespace(),
            alias: None,
            columns: Vec::new(),
            position: Position::default(),
            derived: None,
            parent: None,
            column_aliases: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self.schema = schema.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Name parts as they should appear in SQL, omitting defaulted levels
    ///
    /// A non-default catalog forces the schema to be written as well.
    pub fn name_parts(&self) -> Vec<&str> {
        let has_catalog = self.catalog != DEFAULT_NAMESPACE;
        let has_schema = self.schema != DEFAULT_NAMESPACE;

        let mut parts = Vec::with_capacity(3);
        if has_catalog {
            parts.push(self.catalog.as_str());
        }
        if has_catalog || has_schema {
            parts.push(self.schema.as_str());
        }
        parts.push(self.name.as_str());
        parts
    }

    /// Dotted name, e.g. `sales.public.orders`
    pub fn qualified_name(&self) -> String {
        self.name_parts().join(".")
    }

    /// True for a table standing in for a FROM subquery
    pub fn is_virtual(&self) -> bool {
        self.derived.is_some()
    }

    /// True for a table that lives inside a virtual table's subquery
    pub fn is_hidden(&self) -> bool {
        self.parent.is_some()
    }
}

/// Join type supported on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// Ordering used by the join reordering heuristic
    pub fn priority(&self) -> u8 {
        match self {
            Self::Inner => 0,
            Self::Left => 1,
            Self::Right => 2,
            Self::Full => 3,
        }
    }

    /// The equivalent join type when the two sides are swapped
    pub fn mirrored(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
        }
    }
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column-equality join between two tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRelation {
    pub id: String,
    pub source_table: String,
    pub target_table: String,
    pub source_column: String,
    pub target_column: String,
    pub join_type: JoinType,
}

/// One item of the SELECT list that is not an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectColumn {
    pub id: String,

    /// Table id, [`UNKNOWN_TABLE`] or [`WILDCARD`]
    pub table: String,

    pub column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Verbatim SQL for items that are not plain column references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl SelectColumn {
    pub fn new(id: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            column: column.into(),
            alias: None,
            expression: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == WILDCARD
    }
}

/// Comparison operator of a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Operator to use when the operands are swapped (`5 < x` becomes `x > 5`)
    pub fn mirrored(&self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::LessThan => Self::GreaterThan,
            Self::GreaterThanOrEqual => Self::LessThanOrEqual,
            Self::LessThanOrEqual => Self::GreaterThanOrEqual,
            other => *other,
        }
    }

    pub fn is_null_check(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    pub fn expects_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// Literal operand of a filter or having condition
///
/// Numbers keep their literal text so that `1.50` survives a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(String),
    Text(String),
    Boolean(bool),
    Null,
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn number(value: impl std::fmt::Display) -> Self {
        Self::Number(value.to_string())
    }

    fn from_json(value: serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Boolean(b)),
            serde_json::Value::Number(n) => Ok(Self::Number(n.to_string())),
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            serde_json::Value::Object(_) => Err("filter value cannot be an object".to_string()),
        }
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => match n.parse::<serde_json::Number>() {
                Ok(number) => number.serialize(serializer),
                Err(_) => serializer.serialize_str(n),
            },
            Self::Text(s) => serializer.serialize_str(s),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Null => serializer.serialize_unit(),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

/// One top-level predicate of the WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub id: String,
    pub table: String,
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<FilterValue>,
}

impl FilterCondition {
    pub fn new(
        id: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        operator: FilterOperator,
        value: Option<FilterValue>,
    ) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            column: column.into(),
            operator,
            value,
        }
    }
}

/// Aggregate functions the canvas knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    CountDistinct,
}

impl AggregateFunction {
    /// Recognize an aggregate by function name
    pub fn from_name(name: &str, distinct: bool) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "COUNT" if distinct => Self::CountDistinct,
            "COUNT" => Self::Count,
            "SUM" => Self::Sum,
            "AVG" => Self::Avg,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            _ => return None,
        };
        Some(function)
    }

    /// Function name as written in SQL
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Count | Self::CountDistinct => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    pub fn is_distinct(&self) -> bool {
        matches!(self, Self::CountDistinct)
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountDistinct => write!(f, "COUNT_DISTINCT"),
            other => write!(f, "{}", other.sql_name()),
        }
    }
}

/// An aggregate in the SELECT list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationBlock {
    pub id: String,
    pub table: String,
    pub column: String,
    pub function: AggregateFunction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Verbatim argument when it is not a column reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// An `AGG(col) <op> literal` predicate of the HAVING clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HavingCondition {
    pub id: String,
    pub function: AggregateFunction,
    pub table: String,
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<FilterValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByColumn {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// The canonical representation of one query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    #[serde(default)]
    pub tables: Vec<TableNode>,

    #[serde(default)]
    pub joins: Vec<JoinRelation>,

    #[serde(default)]
    pub select_columns: Vec<SelectColumn>,

    #[serde(default)]
    pub filters: Vec<FilterCondition>,

    #[serde(default)]
    pub aggregations: Vec<AggregationBlock>,

    #[serde(default)]
    pub group_by_columns: Vec<String>,

    #[serde(default)]
    pub order_by_columns: Vec<OrderByColumn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    #[serde(default)]
    pub distinct: bool,

    #[serde(default)]
    pub having: Vec<HavingCondition>,

    /// Original text of a query that could not be parsed at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unparsed: Option<String>,

    /// Identifiers that were delimited in the source text; they stay quoted
    /// on regeneration so case-folding dialects keep resolving them
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub quoted_identifiers: BTreeSet<String>,
}

impl QueryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty model carrying the original text as an opaque marker
    pub fn unparsed(sql: impl Into<String>) -> Self {
        Self {
            unparsed: Some(sql.into()),
            ..Self::default()
        }
    }

    pub fn is_unparsed(&self) -> bool {
        self.unparsed.is_some()
    }

    pub fn table(&self, id: &str) -> Option<&TableNode> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn has_table(&self, id: &str) -> bool {
        self.table(id).is_some()
    }

    /// Tables that appear directly in the outer FROM clause
    pub fn visible_tables(&self) -> impl Iterator<Item = &TableNode> {
        self.tables.iter().filter(|t| !t.is_hidden())
    }

    /// Check the structural invariants of the model
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), TranspileError> {
        let mut ids = HashSet::new();
        for table in &self.tables {
            if !ids.insert(table.id.as_str()) {
                return Err(TranspileError::ReferentialIntegrity(format!(
                    "duplicate table id '{}'",
                    table.id
                )));
            }
        }

        for table in &self.tables {
            if let Some(parent) = &table.parent {
                if !ids.contains(parent.as_str()) {
                    return Err(TranspileError::ReferentialIntegrity(format!(
                        "table '{}' belongs to unknown virtual table '{}'",
                        table.id, parent
                    )));
                }
            }
        }

        for join in &self.joins {
            for endpoint in [&join.source_table, &join.target_table] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(TranspileError::ReferentialIntegrity(format!(
                        "join '{}' references unknown table '{}'",
                        join.id, endpoint
                    )));
                }
            }
        }

        let check_ref = |kind: &str, id: &str, table: &str| {
            if table == UNKNOWN_TABLE || table == WILDCARD || ids.contains(table) {
                Ok(())
            } else {
                Err(TranspileError::ReferentialIntegrity(format!(
                    "{} '{}' references unknown table '{}'",
                    kind, id, table
                )))
            }
        };

        for column in &self.select_columns {
            check_ref("column", &column.id, &column.table)?;
        }
        for filter in &self.filters {
            check_ref("filter", &filter.id, &filter.table)?;
            check_operand("filter", &filter.id, filter.operator, filter.value.as_ref())?;
        }
        for agg in &self.aggregations {
            check_ref("aggregation", &agg.id, &agg.table)?;
        }
        for having in &self.having {
            check_ref("having condition", &having.id, &having.table)?;
            check_operand("having condition", &having.id, having.operator, having.value.as_ref())?;
        }

        Ok(())
    }

    /// Counts and references used to compare two models structurally
    pub fn shape(&self) -> ModelShape {
        let mut tables: Vec<String> = self.tables.iter().map(|t| t.qualified_name()).collect();
        tables.sort();

        let mut joins: Vec<String> = self
            .joins
            .iter()
            .map(|j| {
                let source = self.table(&j.source_table).map(|t| t.qualified_name()).unwrap_or_default();
                let target = self.table(&j.target_table).map(|t| t.qualified_name()).unwrap_or_default();
                format!("{} {}.{} = {}.{}", j.join_type, source, j.source_column, target, j.target_column)
            })
            .collect();
        joins.sort();

        ModelShape {
            tables,
            joins,
            select_columns: self.select_columns.len(),
            filters: self.filters.len(),
            aggregations: self.aggregations.len(),
            group_by: self.group_by_columns.len(),
            order_by: self.order_by_columns.len(),
            limit: self.limit,
        }
    }
}

fn check_operand(
    kind: &str,
    id: &str,
    operator: FilterOperator,
    value: Option<&FilterValue>,
) -> Result<(), TranspileError> {
    if operator.is_null_check() {
        return Ok(());
    }
    match value {
        None => Err(TranspileError::Generation(format!(
            "{} '{}' uses '{}' without a value",
            kind,
            id,
            operator.as_sql()
        ))),
        Some(FilterValue::List(items)) if operator.expects_list() && items.is_empty() => {
            Err(TranspileError::Generation(format!("{} '{}' has an empty IN list", kind, id)))
        }
        Some(FilterValue::List(_)) if !operator.expects_list() => Err(TranspileError::Generation(format!(
            "{} '{}' uses a list with '{}'",
            kind,
            id,
            operator.as_sql()
        ))),
        _ => Ok(()),
    }
}

/// Structural summary of a model, insensitive to ids, aliases and positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelShape {
    /// Sorted qualified table names
    pub tables: Vec<String>,

    /// Sorted `TYPE source.col = target.col` descriptions
    pub joins: Vec<String>,

    pub select_columns: usize,
    pub filters: usize,
    pub aggregations: usize,
    pub group_by: usize,
    pub order_by: usize,
    pub limit: Option<u64>,
}
