//! Pattern-based extraction
//!
//! Recognizes the plain `SELECT <columns> FROM <table> [JOIN <table> ON a.x = b.y]*`
//! shape with regular expressions, for inputs the grammar library rejects
//! (vendor syntax elsewhere in an otherwise simple query is the usual cause).
//! The whole text must match; there is no partial recognition.

use crate::extractor::Extraction;
use querygraph_core::{
    Diagnostic, DiagnosticCode, JoinRelation, JoinType, Position, QueryModel, SelectColumn,
    TableNode, TranspileError, DEFAULT_NAMESPACE, UNKNOWN_TABLE, WILDCARD,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Identifier, optionally quoted with `"`, backticks or brackets
const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

const KEYWORDS: &[&str] = &[
    "as", "inner", "left", "right", "full", "outer", "cross", "join", "on", "where", "group",
    "order", "limit", "having", "union",
];

fn statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*SELECT\s+(?P<columns>.+?)\s+FROM\s+(?P<from>.+?)\s*;?\s*$")
            .expect("valid regex")
    })
}

fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^{0}(?:\.{0}){{0,2}}$", IDENT)).expect("valid regex")
    })
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{}$", IDENT)).expect("valid regex"))
}

/// `qualifier.column`, qualifier up to three parts
fn column_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^(?P<qualifier>{0}(?:\.{0}){{0,2}})\.(?P<column>{0})$",
            IDENT
        ))
        .expect("valid regex")
    })
}

/// `[qualifier.]column [[AS] alias]` in the SELECT list
fn select_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^(?P<path>{0}(?:\.{0}){{0,3}}|(?:{0}\.)?\*)(?:\s+(?:AS\s+)?(?P<alias>{0}))?$",
            IDENT
        ))
        .expect("valid regex")
    })
}

/// A single delimited identifier
fn delimited_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]+"|`[^`]+`|\[[^\]]+\]"#).expect("valid regex"))
}

fn unquote(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('`') && trimmed.ends_with('`'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));

    if quoted && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split on `.` outside quotes
fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for c in path.chars() {
        match closing {
            Some(close) if c == close => {
                closing = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None => match c {
                '"' | '`' => {
                    closing = Some(c);
                    current.push(c);
                }
                '[' => {
                    closing = Some(']');
                    current.push(c);
                }
                '.' => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts.iter().map(|p| unquote(p)).collect()
}

/// Split the SELECT list on top-level commas
fn split_columns(columns: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;

    for c in columns.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Whitespace tokens, with `=` split out
fn tokenize(text: &str) -> Vec<String> {
    text.replace('=', " = ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(&token.to_lowercase().as_str())
}

/// Regex matcher for simple SELECT/JOIN queries
#[derive(Debug, Default)]
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Build a model from `sql`, or fail with a syntax error when it does not
    /// match the recognized shape
    pub fn extract(&self, sql: &str) -> Result<Extraction, TranspileError> {
        let caps = statement_re()
            .captures(sql)
            .ok_or_else(|| no_match("expected SELECT ... FROM ..."))?;

        let mut builder = PatternBuilder::default();
        builder.from_clause(&caps["from"])?;
        builder.select_list(&caps["columns"]);

        builder.model.validate()?;

        Ok(Extraction {
            model: builder.model,
            warnings: builder.warnings,
        })
    }
}

fn no_match(detail: &str) -> TranspileError {
    TranspileError::syntax(format!("query does not match the simple SELECT/JOIN pattern: {}", detail))
}

#[derive(Default)]
struct PatternBuilder {
    model: QueryModel,
    warnings: Vec<Diagnostic>,
    qualifiers: HashMap<String, String>,
}

impl PatternBuilder {
    fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.warnings.push(Diagnostic::warning(code, message));
    }

    /// Remember every delimited identifier in `text`
    fn record_delimited(&mut self, text: &str) {
        for m in delimited_re().find_iter(text) {
            self.model.quoted_identifiers.insert(unquote(m.as_str()));
        }
    }

    fn from_clause(&mut self, from: &str) -> Result<(), TranspileError> {
        self.record_delimited(from);
        let tokens = tokenize(from);
        let mut pos = 0;

        self.table_ref(&tokens, &mut pos)?;

        while pos < tokens.len() {
            let join_type = self.join_keyword(&tokens, &mut pos)?;
            let joined = self.table_ref(&tokens, &mut pos)?;

            if let Some(join_type) = join_type {
                if !tokens.get(pos).is_some_and(|t| t.eq_ignore_ascii_case("on")) {
                    return Err(no_match("JOIN without ON"));
                }
                pos += 1;

                let start = pos;
                while pos < tokens.len() && !starts_join(&tokens[pos]) {
                    pos += 1;
                }
                self.join_condition(&tokens[start..pos], join_type, &joined)?;
            }
        }

        Ok(())
    }

    /// `None` for CROSS JOIN
    fn join_keyword(&self, tokens: &[String], pos: &mut usize) -> Result<Option<JoinType>, TranspileError> {
        let mut next = || {
            let token = tokens.get(*pos).map(|t| t.to_lowercase());
            *pos += 1;
            token
        };

        let first = next().ok_or_else(|| no_match("unexpected end of FROM clause"))?;
        let join_type = match first.as_str() {
            "join" => return Ok(Some(JoinType::Inner)),
            "inner" => JoinType::Inner,
            "left" => JoinType::Left,
            "right" => JoinType::Right,
            "full" => JoinType::Full,
            "cross" => {
                return match next().as_deref() {
                    Some("join") => Ok(None),
                    _ => Err(no_match("expected JOIN after CROSS")),
                }
            }
            other => return Err(no_match(&format!("unexpected '{}' in FROM clause", other))),
        };

        let mut token = next();
        if token.as_deref() == Some("outer") && join_type != JoinType::Inner {
            token = next();
        }
        match token.as_deref() {
            Some("join") => Ok(Some(join_type)),
            _ => Err(no_match("expected JOIN")),
        }
    }

    /// `name [[AS] alias]`; returns the table id
    fn table_ref(&mut self, tokens: &[String], pos: &mut usize) -> Result<String, TranspileError> {
        let name = tokens.get(*pos).ok_or_else(|| no_match("expected a table name"))?;
        if !table_name_re().is_match(name) || is_keyword(name) {
            return Err(no_match(&format!("'{}' is not a table name", name)));
        }
        *pos += 1;

        let mut alias = None;
        if tokens.get(*pos).is_some_and(|t| t.eq_ignore_ascii_case("as")) {
            *pos += 1;
            let token = tokens.get(*pos).ok_or_else(|| no_match("expected an alias after AS"))?;
            if !ident_re().is_match(token) {
                return Err(no_match(&format!("'{}' is not an alias", token)));
            }
            alias = Some(unquote(token));
            *pos += 1;
        } else if let Some(token) = tokens.get(*pos) {
            if ident_re().is_match(token) && !is_keyword(token) {
                alias = Some(unquote(token));
                *pos += 1;
            }
        }

        Ok(self.add_table(split_path(name), alias))
    }

    fn add_table(&mut self, parts: Vec<String>, alias: Option<String>) -> String {
        let mut levels = parts.iter().rev();
        let name = levels.next().cloned().unwrap_or_default();
        let schema = levels.next().cloned().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let catalog = levels.next().cloned().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let base = alias.clone().unwrap_or_else(|| name.clone());
        let mut id = base.clone();
        let mut n = 1;
        while self.model.tables.iter().any(|t| t.id.eq_ignore_ascii_case(&id)) {
            n += 1;
            id = format!("{}_{}", base, n);
        }

        let mut node = TableNode::new(id.clone(), name.clone())
            .with_namespace(catalog, schema)
            .with_position(Position::grid(self.model.tables.len()));
        node.alias = alias.clone();
        self.model.tables.push(node);

        if let Some(alias) = &alias {
            self.qualifiers.insert(alias.to_lowercase(), id.clone());
        }
        self.qualifiers
            .entry(parts.join(".").to_lowercase())
            .or_insert_with(|| id.clone());
        self.qualifiers
            .entry(name.to_lowercase())
            .or_insert_with(|| id.clone());
        id
    }

    fn resolve(&self, qualifier: &[String]) -> Option<String> {
        let full = qualifier.join(".").to_lowercase();
        self.qualifiers
            .get(&full)
            .or_else(|| qualifier.last().and_then(|q| self.qualifiers.get(&q.to_lowercase())))
            .cloned()
    }

    fn join_condition(
        &mut self,
        tokens: &[String],
        join_type: JoinType,
        joined: &str,
    ) -> Result<(), TranspileError> {
        let text = tokens.join(" ");
        if text.to_lowercase().contains("select") {
            return Err(TranspileError::UnsupportedConstruct(format!(
                "subquery in join condition '{}'",
                text
            )));
        }

        // Only `a.x = b.y [AND c.z = d.w]*`; anything else is outside the idiom
        let equalities: Vec<&[String]> = tokens.split(|t| t.eq_ignore_ascii_case("and")).collect();
        let well_formed = equalities.iter().all(|equality| {
            matches!(equality, [left, eq, right]
                if eq == "=" && column_ref_re().is_match(left) && column_ref_re().is_match(right))
        });
        if !well_formed {
            return Err(no_match(&format!("unsupported join condition '{}'", text)));
        }

        let equality = match equalities.as_slice() {
            [[left, _, right]] => self.column_ref(left).zip(self.column_ref(right)),
            _ => None,
        };

        let Some(((left_table, left_column), (right_table, right_column))) = equality else {
            self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!("join condition '{}' is not a single column equality and was dropped", text),
            );
            return Ok(());
        };

        let (source, source_column, target, target_column) = if left_table == joined && right_table != joined {
            (right_table, right_column, left_table, left_column)
        } else {
            (left_table, left_column, right_table, right_column)
        };

        if target != joined {
            self.warn(
                DiagnosticCode::AmbiguousColumn,
                format!("join condition '{}' does not reference the joined table", text),
            );
        }

        let id = format!("join_{}", self.model.joins.len() + 1);
        self.model.joins.push(JoinRelation {
            id,
            source_table: source,
            target_table: target,
            source_column,
            target_column,
            join_type,
        });
        Ok(())
    }

    /// Resolve `qualifier.column` to `(table id, column)`
    fn column_ref(&self, token: &str) -> Option<(String, String)> {
        let caps = column_ref_re().captures(token)?;
        let qualifier = split_path(&caps["qualifier"]);
        let table = self.resolve(&qualifier)?;
        Some((table, unquote(&caps["column"])))
    }

    fn select_list(&mut self, columns: &str) {
        for item in split_columns(columns) {
            let id = format!("col_{}", self.model.select_columns.len() + 1);

            let column = match select_item_re().captures(&item) {
                Some(caps) => {
                    self.record_delimited(&item);
                    let alias = caps.name("alias").map(|a| unquote(a.as_str()));
                    let mut parts = split_path(&caps["path"]);
                    let column = parts.pop().unwrap_or_default();

                    let table = if parts.is_empty() {
                        if column == WILDCARD {
                            WILDCARD.to_string()
                        } else {
                            UNKNOWN_TABLE.to_string()
                        }
                    } else {
                        match self.resolve(&parts) {
                            Some(table) => table,
                            None => {
                                self.warn(
                                    DiagnosticCode::AmbiguousColumn,
                                    format!("'{}' does not name a table in FROM", parts.join(".")),
                                );
                                UNKNOWN_TABLE.to_string()
                            }
                        }
                    };

                    let mut column = SelectColumn::new(id, table, column);
                    column.alias = alias;
                    column
                }
                None => {
                    self.warn(
                        DiagnosticCode::ExpressionPreserved,
                        format!("expression '{}' is kept as verbatim SQL", item),
                    );
                    let mut column = SelectColumn::new(id, UNKNOWN_TABLE, item.clone());
                    column.expression = Some(item);
                    column
                }
            };

            self.model.select_columns.push(column);
        }
    }
}

fn starts_join(token: &str) -> bool {
    matches!(
        token.to_lowercase().as_str(),
        "join" | "inner" | "left" | "right" | "full" | "cross"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(sql: &str) -> Extraction {
        PatternMatcher::new().extract(sql).unwrap()
    }

    #[test]
    fn single_table_with_alias() {
        let result = extract("SELECT u.id, u.name AS full_name FROM app.users u;");
        let model = &result.model;

        assert_eq!(model.tables.len(), 1);
        assert_eq!(model.tables[0].id, "u");
        assert_eq!(model.tables[0].schema, "app");
        assert_eq!(model.select_columns.len(), 2);
        assert_eq!(model.select_columns[1].alias.as_deref(), Some("full_name"));
        assert!(model.select_columns.iter().all(|c| c.table == "u"));
    }

    #[test]
    fn join_chain_with_three_part_names() {
        let result = extract(
            "select * from prod.sales.orders as o \
             left outer join prod.sales.customers as c on o.customer_id = c.id \
             join prod.sales.items i on i.order_id=o.id",
        );
        let model = &result.model;

        assert_eq!(model.tables.len(), 3);
        assert_eq!(model.tables[1].catalog, "prod");
        assert_eq!(model.joins.len(), 2);
        assert_eq!(model.joins[0].join_type, JoinType::Left);
        assert_eq!(model.joins[0].target_table, "c");
        // Joined table is always the target
        assert_eq!(model.joins[1].source_table, "o");
        assert_eq!(model.joins[1].target_table, "i");
        assert_eq!(model.joins[1].target_column, "order_id");
        assert_eq!(model.select_columns[0].table, WILDCARD);
    }

    #[test]
    fn compound_condition_is_dropped() {
        let result = extract("SELECT * FROM a JOIN b ON a.id = b.id AND a.k = b.k");

        assert_eq!(result.model.tables.len(), 2);
        assert!(result.model.joins.is_empty());
        assert_eq!(result.warnings[0].code, DiagnosticCode::JoinConditionDropped);
    }

    #[test]
    fn trailing_clauses_after_join_do_not_match() {
        for sql in [
            "SELECT * FROM a JOIN b ON a.id = b.id WHERE b.x = = 1",
            "SELECT * FROM a JOIN b ON a.id = b.id ORDER BY a.id",
            "SELECT * FROM a JOIN b ON a.id = b.id LIMIT 5",
            "SELECT * FROM a JOIN b ON a.id = b.id AND b.qty > 0",
            "SELECT * FROM a JOIN b ON a.id = b.id $$",
        ] {
            let err = PatternMatcher::new().extract(sql).unwrap_err();
            assert!(matches!(err, TranspileError::Syntax { .. }), "{}", sql);
        }
    }

    #[test]
    fn quoted_identifiers() {
        let result = extract(r#"SELECT "o"."Order Id" FROM "Sales"."Orders" "o""#);
        let model = &result.model;

        assert_eq!(model.tables[0].name, "Orders");
        assert_eq!(model.tables[0].schema, "Sales");
        assert_eq!(model.select_columns[0].column, "Order Id");
        assert_eq!(model.select_columns[0].table, "o");

        let quoted: Vec<&str> = model.quoted_identifiers.iter().map(String::as_str).collect();
        assert_eq!(quoted, vec!["Order Id", "Orders", "Sales", "o"]);
    }

    #[test]
    fn literals_in_expressions_are_not_identifiers() {
        let result = extract(r#"SELECT CONCAT(u.name, '"x"') AS label FROM users u"#);
        assert!(result.model.quoted_identifiers.is_empty());
    }

    #[test]
    fn expressions_are_preserved() {
        let result = extract("SELECT COALESCE(a.x, 0) AS x, a.y FROM a");
        assert_eq!(result.model.select_columns.len(), 2);
        assert!(result.model.select_columns[0].expression.is_some());
    }

    #[test]
    fn where_clause_does_not_match() {
        let err = PatternMatcher::new()
            .extract("SELECT * FROM a WHERE a.x = 1")
            .unwrap_err();
        assert!(matches!(err, TranspileError::Syntax { .. }));
    }

    #[test]
    fn non_select_does_not_match() {
        assert!(PatternMatcher::new().extract("DROP TABLE users").is_err());
    }

    #[test]
    fn split_helpers() {
        assert_eq!(split_path(r#""a.b".c"#), vec!["a.b".to_string(), "c".to_string()]);
        assert_eq!(
            split_columns("a, COALESCE(b, 'x,y'), c"),
            vec!["a".to_string(), "COALESCE(b, 'x,y')".to_string(), "c".to_string()]
        );
    }
}
