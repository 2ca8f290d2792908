//! AST extraction
//!
//! Walks a sqlparser AST and builds the canonical [`QueryModel`]. Constructs
//! the model cannot represent exactly are approximated and reported as
//! warnings; constructs it cannot represent at all are rejected with a typed
//! error.

use crate::parser::ParsedSql;
use crate::scope::TableScope;
use querygraph_core::{
    AggregateFunction, AggregationBlock, Diagnostic, DiagnosticCode, FilterCondition,
    FilterOperator, FilterValue, HavingCondition, JoinRelation, JoinType, OrderByColumn, Position,
    QueryModel, SelectColumn, SortDirection, TableNode, TranspileError, DEFAULT_NAMESPACE,
    UNKNOWN_TABLE, WILDCARD,
};
use sqlparser::ast::{
    BinaryOperator, DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, JoinConstraint, JoinOperator, ObjectName, Query, Select,
    SelectItem, SetExpr, Statement, TableAlias, TableFactor, TableWithJoins, UnaryOperator, Value,
};
use std::collections::{HashMap, HashSet};

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub model: QueryModel,
    pub warnings: Vec<Diagnostic>,
}

/// Builds query models from parsed SQL
#[derive(Debug, Default)]
pub struct AstExtractor;

impl AstExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the query model from a parsed statement list
    ///
    /// Only a single query statement is accepted. The returned model has
    /// passed [`QueryModel::validate`].
    pub fn extract(&self, parsed: &ParsedSql) -> Result<Extraction, TranspileError> {
        let statement = match parsed.statements.as_slice() {
            [] => {
                return Err(TranspileError::InputValidation(
                    "query contains no statement".to_string(),
                ))
            }
            [statement] => statement,
            _ => {
                return Err(TranspileError::UnsupportedConstruct(format!(
                    "{} statements in one query; only a single SELECT is supported",
                    parsed.statements.len()
                )))
            }
        };

        let query = match statement {
            Statement::Query(query) => query,
            other => {
                return Err(TranspileError::UnsupportedConstruct(format!(
                    "{} statements are not supported; only SELECT queries can be modelled",
                    statement_kind(other)
                )))
            }
        };

        let mut state = ExtractionState::default();
        let mut scope = TableScope::new();
        state.extract_query(query, &mut scope, &Context::outer())?;

        state.model.validate()?;
        state.model.quoted_identifiers = parsed.quoted_identifiers.clone();

        Ok(Extraction {
            model: state.model,
            warnings: state.warnings,
        })
    }
}

/// Leading keyword(s) of a statement, for error messages
fn statement_kind(statement: &Statement) -> String {
    let text = statement.to_string();
    let mut words = text.split_whitespace().map(str::to_uppercase);
    let first = words.next().unwrap_or_default();

    match first.as_str() {
        "CREATE" | "DROP" | "ALTER" => match words.find(|w| w != "OR" && w != "REPLACE") {
            Some(object) => format!("{} {}", first, object),
            None => first,
        },
        _ => first,
    }
}

/// Where the SELECT being extracted sits in the query
#[derive(Debug, Clone)]
struct Context {
    /// The outermost SELECT: owns ORDER BY, LIMIT, GROUP BY and HAVING
    outer: bool,

    /// Virtual table the extracted items belong to
    parent: Option<String>,

    /// Drop wildcard select items instead of merging them
    skip_wildcards: bool,

    /// Merge GROUP BY and HAVING into the model
    grouping: bool,
}

impl Context {
    fn outer() -> Self {
        Self {
            outer: true,
            parent: None,
            skip_wildcards: false,
            grouping: true,
        }
    }

    fn cte(&self) -> Self {
        Self {
            outer: false,
            parent: self.parent.clone(),
            skip_wildcards: true,
            grouping: self.parent.is_none(),
        }
    }

    fn subquery(parent: &str) -> Self {
        Self {
            outer: false,
            parent: Some(parent.to_string()),
            skip_wildcards: false,
            grouping: false,
        }
    }
}

/// A column reference split into qualifier and column name
struct ColumnRef {
    qualifier: Vec<String>,
    column: String,
}

#[derive(Default)]
struct ExtractionState {
    model: QueryModel,
    warnings: Vec<Diagnostic>,
    counters: HashMap<&'static str, usize>,
    table_ids: HashSet<String>,
    cte_references: HashMap<String, usize>,
}

impl ExtractionState {
    fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.warnings.push(Diagnostic::warning(code, message));
    }

    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{}_{}", prefix, counter)
    }

    fn unique_table_id(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.table_ids.contains(&candidate.to_lowercase()) {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }
        self.table_ids.insert(candidate.to_lowercase());
        candidate
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn extract_query(
        &mut self,
        query: &Query,
        scope: &mut TableScope,
        ctx: &Context,
    ) -> Result<(), TranspileError> {
        if let Some(with) = &query.with {
            if with.recursive {
                return Err(TranspileError::UnsupportedConstruct(
                    "recursive CTEs cannot be modelled".to_string(),
                ));
            }

            for cte in &with.cte_tables {
                let name = cte.alias.name.value.clone();
                let first_new_table = self.model.tables.len();

                let mut cte_scope = scope.child();
                self.extract_query(&cte.query, &mut cte_scope, &ctx.cte())?;

                let target = self.model.tables.get(first_new_table).map(|t| t.id.clone());
                scope.register_cte(&name, target);

                let dropped = dropped_cte_clauses(&cte.query);
                let message = if dropped.is_empty() {
                    format!("CTE '{}' was inlined into the outer query", name)
                } else {
                    format!(
                        "CTE '{}' was inlined into the outer query; its {} clauses were dropped",
                        name,
                        dropped.join(", ")
                    )
                };
                self.warn(DiagnosticCode::CteFlattened, message);
            }
        }

        match query.body.as_ref() {
            SetExpr::Select(select) => self.extract_select(select, scope, ctx)?,
            SetExpr::Query(inner) => self.extract_query(inner, scope, ctx)?,
            SetExpr::SetOperation { op, .. } => {
                return Err(TranspileError::UnsupportedConstruct(format!(
                    "{} set operations cannot be modelled",
                    op
                )))
            }
            SetExpr::Values(_) => {
                return Err(TranspileError::UnsupportedConstruct(
                    "VALUES lists cannot be modelled".to_string(),
                ))
            }
            other => {
                return Err(TranspileError::UnsupportedConstruct(format!(
                    "query body '{}' cannot be modelled",
                    other
                )))
            }
        }

        if ctx.outer {
            self.extract_order_and_limit(query, scope);
        }

        Ok(())
    }

    fn extract_order_and_limit(&mut self, query: &Query, scope: &TableScope) {
        if let Some(order_by) = &query.order_by {
            for item in &order_by.exprs {
                let direction = if item.asc == Some(false) {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                let column = self.reference_text(&item.expr, scope);
                self.model.order_by_columns.push(OrderByColumn { column, direction });
            }
        }

        if let Some(limit) = &query.limit {
            match literal_u64(limit) {
                Some(n) => self.model.limit = Some(n),
                None => self.warn(
                    DiagnosticCode::Warning,
                    format!("LIMIT {} is not a constant and was dropped", limit),
                ),
            }
        }

        if let Some(fetch) = &query.fetch {
            match fetch.quantity.as_ref().and_then(literal_u64) {
                Some(n) if !fetch.percent => self.model.limit = Some(n),
                _ => self.warn(
                    DiagnosticCode::Warning,
                    format!("'{}' cannot be modelled and was dropped", fetch),
                ),
            }
        }

        if let Some(offset) = &query.offset {
            match literal_u64(&offset.value) {
                Some(n) => self.model.offset = Some(n),
                None => self.warn(
                    DiagnosticCode::Warning,
                    format!("OFFSET {} is not a constant and was dropped", offset.value),
                ),
            }
        }
    }

    fn extract_select(
        &mut self,
        select: &Select,
        scope: &mut TableScope,
        ctx: &Context,
    ) -> Result<(), TranspileError> {
        if ctx.outer {
            self.model.distinct = select.distinct.is_some();

            if let Some(top) = &select.top {
                let text = top.to_string();
                match leading_integer(&text) {
                    Some(n) if !text.to_uppercase().contains("PERCENT") => self.model.limit = Some(n),
                    _ => self.warn(
                        DiagnosticCode::Warning,
                        format!("'{}' cannot be modelled and was dropped", text),
                    ),
                }
            }
        }

        for table_with_joins in &select.from {
            self.extract_table_with_joins(table_with_joins, scope, ctx)?;
        }

        for item in &select.projection {
            self.extract_select_item(item, scope, ctx);
        }

        if let Some(selection) = &select.selection {
            self.extract_where(selection, scope, ctx)?;
        }

        if ctx.grouping {
            self.extract_group_by(&select.group_by, scope);

            if let Some(having) = &select.having {
                self.extract_having(having, scope);
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // FROM and JOIN
    // ------------------------------------------------------------------

    /// Returns the id of the first table of the chain
    fn extract_table_with_joins(
        &mut self,
        table_with_joins: &TableWithJoins,
        scope: &mut TableScope,
        ctx: &Context,
    ) -> Result<Option<String>, TranspileError> {
        let first = self.extract_table_factor(&table_with_joins.relation, scope, ctx)?;
        let mut previous = first.clone();

        for join in &table_with_joins.joins {
            let joined = self.extract_table_factor(&join.relation, scope, ctx)?;
            self.extract_join(&join.join_operator, previous.as_deref(), joined.as_deref(), scope)?;

            if joined.is_some() {
                previous = joined;
            }
        }

        Ok(first)
    }

    fn extract_table_factor(
        &mut self,
        factor: &TableFactor,
        scope: &mut TableScope,
        ctx: &Context,
    ) -> Result<Option<String>, TranspileError> {
        match factor {
            TableFactor::Table {
                name,
                alias,
                args,
                with_hints,
                version,
                partitions,
                ..
            } => {
                if args.is_some() {
                    return Err(TranspileError::UnsupportedConstruct(format!(
                        "table function '{}' cannot be modelled",
                        factor
                    )));
                }
                if !with_hints.is_empty()
                    || version.is_some()
                    || !partitions.is_empty()
                    || has_sample(factor)
                {
                    return Err(TranspileError::UnsupportedConstruct(format!(
                        "table modifiers in '{}' cannot be modelled",
                        factor
                    )));
                }

                let parts = name_parts(name);
                let column_aliases = alias_columns(alias.as_ref());
                let alias = alias.as_ref().map(|a| a.name.value.clone());

                if let [single] = parts.as_slice() {
                    if let Some(binding) = scope.cte(single).cloned() {
                        if !column_aliases.is_empty() {
                            return Err(TranspileError::UnsupportedConstruct(format!(
                                "column aliases on CTE reference '{}' cannot be modelled",
                                factor
                            )));
                        }
                        return Ok(self.reference_cte(single, binding.target, alias.as_deref(), scope));
                    }
                }

                let id = self.add_table(&parts, alias, scope, ctx);
                if !column_aliases.is_empty() {
                    if let Some(node) = self.model.tables.iter_mut().find(|t| t.id == id) {
                        node.column_aliases = column_aliases;
                    }
                }
                Ok(Some(id))
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias: table_alias,
            } => {
                if *lateral {
                    return Err(TranspileError::UnsupportedConstruct(format!(
                        "LATERAL subquery '{}' cannot be modelled",
                        factor
                    )));
                }

                let alias = table_alias.as_ref().map(|a| a.name.value.clone());
                let column_aliases = alias_columns(table_alias.as_ref());
                let base = match &alias {
                    Some(alias) => alias.clone(),
                    None => self.next_id("subquery"),
                };
                let id = self.unique_table_id(&base);

                let mut node = TableNode::new(id.clone(), base.clone())
                    .with_position(Position::grid(self.model.tables.len()));
                node.alias = alias.clone();
                node.derived = Some(subquery.to_string());
                node.parent = ctx.parent.clone();
                node.column_aliases = column_aliases.clone();
                self.model.tables.push(node);

                scope.register_table(&id, &[base.clone()], alias.as_deref());

                let mut inner_scope = scope.child();
                self.extract_query(subquery, &mut inner_scope, &Context::subquery(&id))?;

                let message = if column_aliases.is_empty() {
                    format!("subquery '{}' in FROM was turned into a virtual table", base)
                } else {
                    format!(
                        "subquery '{}' in FROM was turned into a virtual table with columns ({})",
                        base,
                        column_aliases.join(", ")
                    )
                };
                self.warn(DiagnosticCode::SubqueryFlattened, message);
                Ok(Some(id))
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.extract_table_with_joins(table_with_joins, scope, ctx)
            }
            other => Err(TranspileError::UnsupportedConstruct(format!(
                "table expression '{}' cannot be modelled",
                other
            ))),
        }
    }

    fn add_table(
        &mut self,
        parts: &[String],
        alias: Option<String>,
        scope: &mut TableScope,
        ctx: &Context,
    ) -> String {
        let mut levels = parts.iter().rev();
        let name = levels.next().cloned().unwrap_or_default();
        let schema = levels.next().cloned().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let catalog = levels.next().cloned().unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let base = alias.clone().unwrap_or_else(|| name.clone());
        let id = self.unique_table_id(&base);

        let mut node = TableNode::new(id.clone(), name)
            .with_namespace(catalog, schema)
            .with_position(Position::grid(self.model.tables.len()));
        node.alias = alias.clone();
        node.parent = ctx.parent.clone();
        self.model.tables.push(node);

        scope.register_table(&id, parts, alias.as_deref());
        id
    }

    fn reference_cte(
        &mut self,
        name: &str,
        target: Option<String>,
        alias: Option<&str>,
        scope: &mut TableScope,
    ) -> Option<String> {
        let references = {
            let count = self.cte_references.entry(name.to_lowercase()).or_insert(0);
            *count += 1;
            *count
        };
        if references == 2 {
            self.warn(
                DiagnosticCode::CteFlattened,
                format!(
                    "CTE '{}' is referenced more than once; all references share one inlined copy",
                    name
                ),
            );
        }

        let target = target?;
        scope.register_alias(name, &target);
        if let Some(alias) = alias {
            scope.register_alias(alias, &target);
        }
        Some(target)
    }

    fn extract_join(
        &mut self,
        operator: &JoinOperator,
        previous: Option<&str>,
        joined: Option<&str>,
        scope: &TableScope,
    ) -> Result<(), TranspileError> {
        let (join_type, constraint) = match operator {
            JoinOperator::Inner(c) => (JoinType::Inner, c),
            JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            JoinOperator::RightOuter(c) => (JoinType::Right, c),
            JoinOperator::FullOuter(c) => (JoinType::Full, c),
            JoinOperator::CrossJoin => return Ok(()),
            other => {
                self.warn(
                    DiagnosticCode::JoinTypeUnsupported,
                    format!(
                        "{} joins cannot be modelled; the table was kept without a relation",
                        variant_name(other)
                    ),
                );
                return Ok(());
            }
        };

        let (previous, joined) = match (previous, joined) {
            (Some(p), Some(j)) => (p, j),
            _ => {
                self.warn(
                    DiagnosticCode::JoinConditionDropped,
                    "join against an empty CTE was dropped",
                );
                return Ok(());
            }
        };

        match constraint {
            JoinConstraint::On(expr) => {
                if contains_subquery(expr) {
                    return Err(TranspileError::UnsupportedConstruct(format!(
                        "subquery in join condition '{}'",
                        expr
                    )));
                }
                self.extract_join_condition(expr, join_type, previous, joined, scope);
            }
            JoinConstraint::Using(columns) if columns.len() == 1 => {
                let column = unquote(&columns[0].to_string());
                self.push_join(join_type, previous, &column, joined, &column);
            }
            JoinConstraint::Using(_) => self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!("multi-column USING on '{}' cannot be modelled and was dropped", joined),
            ),
            JoinConstraint::Natural => self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!("NATURAL join on '{}' has no explicit condition and was dropped", joined),
            ),
            JoinConstraint::None => self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!("join on '{}' has no condition", joined),
            ),
        }

        Ok(())
    }

    fn extract_join_condition(
        &mut self,
        expr: &Expr,
        join_type: JoinType,
        previous: &str,
        joined: &str,
        scope: &TableScope,
    ) {
        let equality = match strip_nested(expr) {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => column_ref(left).zip(column_ref(right)),
            _ => None,
        };

        let Some((left, right)) = equality else {
            self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!(
                    "join condition '{}' is not a single column equality and was dropped",
                    expr
                ),
            );
            return;
        };

        let left_table = self.resolve_join_side(&left, scope);
        let right_table = self.resolve_join_side(&right, scope);

        let (left_table, right_table) = match (left_table, right_table) {
            (Ok(l), Ok(r)) => (l, r),
            (Err(()), Err(())) => {
                self.warn(
                    DiagnosticCode::AmbiguousColumn,
                    format!(
                        "unqualified join condition '{}' was attributed to '{}' and '{}'",
                        expr, previous, joined
                    ),
                );
                (previous.to_string(), joined.to_string())
            }
            (Ok(l), Err(())) => {
                let r = if l == joined { previous } else { joined };
                (l, r.to_string())
            }
            (Err(()), Ok(r)) => {
                let l = if r == joined { previous } else { joined };
                (l.to_string(), r)
            }
        };

        if left_table == UNKNOWN_TABLE || right_table == UNKNOWN_TABLE {
            self.warn(
                DiagnosticCode::JoinConditionDropped,
                format!("join condition '{}' references an unknown table and was dropped", expr),
            );
            return;
        }

        if left_table == joined && right_table != joined {
            self.push_join(join_type, &right_table, &right.column, &left_table, &left.column);
        } else {
            self.push_join(join_type, &left_table, &left.column, &right_table, &right.column);
        }
    }

    /// `Err(())` for an unqualified column
    fn resolve_join_side(&self, column: &ColumnRef, scope: &TableScope) -> Result<String, ()> {
        if column.qualifier.is_empty() {
            return Err(());
        }
        Ok(scope
            .resolve(&column.qualifier)
            .unwrap_or(UNKNOWN_TABLE)
            .to_string())
    }

    fn push_join(&mut self, join_type: JoinType, source: &str, source_column: &str, target: &str, target_column: &str) {
        let id = self.next_id("join");
        self.model.joins.push(JoinRelation {
            id,
            source_table: source.to_string(),
            target_table: target.to_string(),
            source_column: source_column.to_string(),
            target_column: target_column.to_string(),
            join_type,
        });
    }

    // ------------------------------------------------------------------
    // SELECT list
    // ------------------------------------------------------------------

    fn extract_select_item(&mut self, item: &SelectItem, scope: &TableScope, ctx: &Context) {
        match item {
            SelectItem::UnnamedExpr(expr) => self.extract_select_expr(expr, None, scope, ctx),
            SelectItem::ExprWithAlias { expr, alias } => {
                self.extract_select_expr(expr, Some(alias.value.clone()), scope, ctx)
            }
            SelectItem::Wildcard(_) => {
                if !ctx.skip_wildcards {
                    self.push_select_column(WILDCARD.to_string(), WILDCARD.to_string(), None, None, scope, ctx);
                }
            }
            SelectItem::QualifiedWildcard(name, _) => {
                if ctx.skip_wildcards {
                    return;
                }
                let table = self.resolve_qualifier(&name_parts(name), scope);
                if table == UNKNOWN_TABLE {
                    self.warn(
                        DiagnosticCode::AmbiguousColumn,
                        format!("'{}.*' does not name a table in FROM", name),
                    );
                }
                self.push_select_column(table, WILDCARD.to_string(), None, None, scope, ctx);
            }
        }
    }

    fn extract_select_expr(&mut self, expr: &Expr, alias: Option<String>, scope: &TableScope, ctx: &Context) {
        if let Some(column) = column_ref(expr) {
            let table = self.resolve_column_table(&column, scope);
            if table == UNKNOWN_TABLE && !column.qualifier.is_empty() {
                // Qualifier is not a table (struct field, outer reference): keep it verbatim
                let text = expr.to_string();
                self.push_select_column(UNKNOWN_TABLE.to_string(), text.clone(), alias, Some(text), scope, ctx);
            } else {
                self.push_select_column(table, column.column, alias, None, scope, ctx);
            }
            return;
        }

        if let Expr::Function(function) = expr {
            if let Some((aggregate, table, column, expression)) = self.aggregate_call(function, scope) {
                let Some(table) = self.attribute(table, scope, ctx) else {
                    return;
                };
                let id = self.next_id("agg");
                self.model.aggregations.push(AggregationBlock {
                    id,
                    table,
                    column,
                    function: aggregate,
                    alias,
                    expression,
                });
                return;
            }
        }

        let text = expr.to_string();
        let reason = match expr {
            Expr::Function(function) if function.over.is_some() => "window function",
            _ => "expression",
        };
        if ctx.parent.is_none() {
            self.warn(
                DiagnosticCode::ExpressionPreserved,
                format!("{} '{}' is kept as verbatim SQL", reason, text),
            );
        }
        let column = alias.clone().unwrap_or_else(|| text.clone());
        self.push_select_column(UNKNOWN_TABLE.to_string(), column, alias, Some(text), scope, ctx);
    }

    fn push_select_column(
        &mut self,
        table: String,
        column: String,
        alias: Option<String>,
        expression: Option<String>,
        scope: &TableScope,
        ctx: &Context,
    ) {
        let Some(table) = self.attribute(table, scope, ctx) else {
            return;
        };
        let id = self.next_id("col");
        self.model.select_columns.push(SelectColumn {
            id,
            table,
            column,
            alias,
            expression,
        });
    }

    /// Recognize a plain aggregate call: `(function, table, column, expression)`
    fn aggregate_call(
        &self,
        function: &Function,
        scope: &TableScope,
    ) -> Option<(AggregateFunction, String, String, Option<String>)> {
        if function.over.is_some() || function.filter.is_some() {
            return None;
        }

        let (distinct, args) = match &function.args {
            FunctionArguments::List(list) => (
                matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct)),
                &list.args,
            ),
            _ => return None,
        };

        let aggregate = AggregateFunction::from_name(&function.name.to_string(), distinct)?;
        if distinct && aggregate != AggregateFunction::CountDistinct {
            return None;
        }

        let [FunctionArg::Unnamed(arg)] = args.as_slice() else {
            return None;
        };

        match arg {
            FunctionArgExpr::Wildcard => Some((aggregate, WILDCARD.to_string(), WILDCARD.to_string(), None)),
            FunctionArgExpr::QualifiedWildcard(name) => {
                let table = self.resolve_qualifier(&name_parts(name), scope);
                Some((aggregate, table, WILDCARD.to_string(), None))
            }
            FunctionArgExpr::Expr(arg) => match column_ref(arg) {
                Some(column) => {
                    let table = self.resolve_column_table(&column, scope);
                    if table == UNKNOWN_TABLE && !column.qualifier.is_empty() {
                        let text = arg.to_string();
                        Some((aggregate, UNKNOWN_TABLE.to_string(), text.clone(), Some(text)))
                    } else {
                        Some((aggregate, table, column.column, None))
                    }
                }
                None => {
                    let text = arg.to_string();
                    Some((aggregate, UNKNOWN_TABLE.to_string(), text.clone(), Some(text)))
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // WHERE
    // ------------------------------------------------------------------

    fn extract_where(&mut self, selection: &Expr, scope: &TableScope, ctx: &Context) -> Result<(), TranspileError> {
        let mut leaves = Vec::new();
        let exact = collect_conjuncts(selection, &mut leaves);
        if !exact {
            self.warn(
                DiagnosticCode::FilterApproximated,
                format!(
                    "WHERE clause '{}' is not a pure conjunction; its conditions were flattened",
                    selection
                ),
            );
        }

        for leaf in leaves {
            self.extract_filter(leaf, scope, ctx);
        }
        Ok(())
    }

    fn extract_filter(&mut self, expr: &Expr, scope: &TableScope, ctx: &Context) {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let Some(operator) = comparison_operator(op) else {
                    return self.skip_filter(expr);
                };

                if let (Some(column), Some(value)) = (column_ref(left), literal(right)) {
                    return self.push_filter(&column, operator, Some(value), scope, ctx);
                }
                if let (Some(value), Some(column)) = (literal(left), column_ref(right)) {
                    return self.push_filter(&column, operator.mirrored(), Some(value), scope, ctx);
                }
                if let (Some(l), Some(r), FilterOperator::Equals) = (column_ref(left), column_ref(right), operator) {
                    if self.implicit_join(&l, &r, scope) {
                        self.warn(
                            DiagnosticCode::ImplicitJoin,
                            format!("predicate '{}' was turned into an INNER join", expr),
                        );
                        return;
                    }
                }
                self.skip_filter(expr)
            }
            Expr::Like {
                negated,
                expr: target,
                pattern,
                escape_char: None,
                ..
            } => match (column_ref(target), literal(pattern)) {
                (Some(column), Some(value @ FilterValue::Text(_))) => {
                    let operator = if *negated { FilterOperator::NotLike } else { FilterOperator::Like };
                    self.push_filter(&column, operator, Some(value), scope, ctx)
                }
                _ => self.skip_filter(expr),
            },
            Expr::InList {
                expr: target,
                list,
                negated,
            } => {
                let values: Option<Vec<FilterValue>> = list.iter().map(literal).collect();
                match (column_ref(target), values) {
                    (Some(column), Some(values)) if !values.is_empty() => {
                        let operator = if *negated { FilterOperator::NotIn } else { FilterOperator::In };
                        self.push_filter(&column, operator, Some(FilterValue::List(values)), scope, ctx)
                    }
                    _ => self.skip_filter(expr),
                }
            }
            Expr::IsNull(target) => match column_ref(target) {
                Some(column) => self.push_filter(&column, FilterOperator::IsNull, None, scope, ctx),
                None => self.skip_filter(expr),
            },
            Expr::IsNotNull(target) => match column_ref(target) {
                Some(column) => self.push_filter(&column, FilterOperator::IsNotNull, None, scope, ctx),
                None => self.skip_filter(expr),
            },
            Expr::Between {
                expr: target,
                negated: false,
                low,
                high,
            } => match (column_ref(target), literal(low), literal(high)) {
                (Some(column), Some(low), Some(high)) => {
                    self.push_filter(&column, FilterOperator::GreaterThanOrEqual, Some(low), scope, ctx);
                    self.push_filter(&column, FilterOperator::LessThanOrEqual, Some(high), scope, ctx);
                }
                _ => self.skip_filter(expr),
            },
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => match column_ref(expr) {
                // Bare boolean column
                Some(column) => self.push_filter(&column, FilterOperator::Equals, Some(FilterValue::Boolean(true)), scope, ctx),
                None => self.skip_filter(expr),
            },
            _ => self.skip_filter(expr),
        }
    }

    fn skip_filter(&mut self, expr: &Expr) {
        self.warn(
            DiagnosticCode::FilterSkipped,
            format!("condition '{}' cannot be represented as a filter and was dropped", expr),
        );
    }

    fn push_filter(
        &mut self,
        column: &ColumnRef,
        operator: FilterOperator,
        value: Option<FilterValue>,
        scope: &TableScope,
        ctx: &Context,
    ) {
        let (table, column_name) = self.filter_target(column, scope);
        let Some(table) = self.attribute(table, scope, ctx) else {
            return;
        };
        let id = self.next_id("filter");
        self.model
            .filters
            .push(FilterCondition::new(id, table, column_name, operator, value));
    }

    /// Table and column for a filter; unresolved qualifiers stay in the column
    fn filter_target(&self, column: &ColumnRef, scope: &TableScope) -> (String, String) {
        let table = self.resolve_column_table(column, scope);
        if table == UNKNOWN_TABLE && !column.qualifier.is_empty() {
            let mut path = column.qualifier.clone();
            path.push(column.column.clone());
            (table, path.join("."))
        } else {
            (table, column.column.clone())
        }
    }

    /// Turn `a.x = b.y` between two FROM tables into a join
    fn implicit_join(&mut self, left: &ColumnRef, right: &ColumnRef, scope: &TableScope) -> bool {
        if left.qualifier.is_empty() || right.qualifier.is_empty() {
            return false;
        }
        let (Some(l), Some(r)) = (scope.resolve(&left.qualifier), scope.resolve(&right.qualifier)) else {
            return false;
        };
        if l == r {
            return false;
        }
        let (l, r) = (l.to_string(), r.to_string());
        self.push_join(JoinType::Inner, &l, &left.column, &r, &right.column);
        true
    }

    // ------------------------------------------------------------------
    // GROUP BY / HAVING
    // ------------------------------------------------------------------

    fn extract_group_by(&mut self, group_by: &GroupByExpr, scope: &TableScope) {
        match group_by {
            GroupByExpr::Expressions(exprs, _) => {
                for expr in exprs {
                    let column = self.reference_text(expr, scope);
                    if !self.model.group_by_columns.contains(&column) {
                        self.model.group_by_columns.push(column);
                    }
                }
            }
            GroupByExpr::All(_) => self.warn(
                DiagnosticCode::Warning,
                "GROUP BY ALL cannot be modelled and was dropped",
            ),
        }
    }

    fn extract_having(&mut self, having: &Expr, scope: &TableScope) {
        let mut leaves = Vec::new();
        if !collect_conjuncts(having, &mut leaves) {
            self.warn(
                DiagnosticCode::FilterApproximated,
                format!("HAVING clause '{}' is not a pure conjunction; its conditions were flattened", having),
            );
        }

        for leaf in leaves {
            let condition = match leaf {
                Expr::BinaryOp { left, op, right } => comparison_operator(op).and_then(|operator| {
                    match (left.as_ref(), right.as_ref()) {
                        (Expr::Function(f), value) => literal(value).map(|v| (f, operator, v)),
                        (value, Expr::Function(f)) => literal(value).map(|v| (f, operator.mirrored(), v)),
                        _ => None,
                    }
                }),
                _ => None,
            };

            let aggregate = condition.and_then(|(function, operator, value)| {
                self.aggregate_call(function, scope)
                    .filter(|(_, _, _, expression)| expression.is_none())
                    .map(|(aggregate, table, column, _)| (aggregate, table, column, operator, value))
            });

            match aggregate {
                Some((function, table, column, operator, value)) => {
                    let id = self.next_id("having");
                    self.model.having.push(HavingCondition {
                        id,
                        function,
                        table,
                        column,
                        operator,
                        value: Some(value),
                    });
                }
                None => self.warn(
                    DiagnosticCode::FilterSkipped,
                    format!("HAVING condition '{}' cannot be modelled and was dropped", leaf),
                ),
            }
        }
    }

    // ------------------------------------------------------------------
    // Resolution helpers
    // ------------------------------------------------------------------

    fn resolve_qualifier(&self, qualifier: &[String], scope: &TableScope) -> String {
        scope.resolve(qualifier).unwrap_or(UNKNOWN_TABLE).to_string()
    }

    fn resolve_column_table(&self, column: &ColumnRef, scope: &TableScope) -> String {
        if column.qualifier.is_empty() {
            UNKNOWN_TABLE.to_string()
        } else {
            self.resolve_qualifier(&column.qualifier, scope)
        }
    }

    /// Items of a virtual table's subquery must point at one of its tables
    ///
    /// Returns `None` when such an item has nowhere to live.
    fn attribute(&self, table: String, scope: &TableScope, ctx: &Context) -> Option<String> {
        if ctx.parent.is_none() || (table != UNKNOWN_TABLE && table != WILDCARD) {
            return Some(table);
        }
        scope.first_table().map(str::to_string)
    }

    /// GROUP BY / ORDER BY reference: `column`, `<tableId>.column` or verbatim SQL
    fn reference_text(&self, expr: &Expr, scope: &TableScope) -> String {
        let plain = |s: &str| is_plain_identifier(s);

        match column_ref(expr) {
            Some(column) if plain(&column.column) && column.qualifier.iter().all(|q| plain(q)) => {
                if column.qualifier.is_empty() {
                    return column.column;
                }
                match scope.resolve(&column.qualifier) {
                    Some(table) if plain(table) => format!("{}.{}", table, column.column),
                    _ => format!("{}.{}", column.qualifier.join("."), column.column),
                }
            }
            _ => expr.to_string(),
        }
    }
}

// ----------------------------------------------------------------------
// Free helpers over the AST
// ----------------------------------------------------------------------

/// Clauses of a CTE body that inlining cannot carry
fn dropped_cte_clauses(query: &Query) -> Vec<&'static str> {
    let mut dropped = Vec::new();
    if let SetExpr::Select(select) = query.body.as_ref() {
        if select.distinct.is_some() {
            dropped.push("DISTINCT");
        }
        if select.top.is_some() {
            dropped.push("TOP");
        }
    }
    if query.order_by.is_some() {
        dropped.push("ORDER BY");
    }
    if query.limit.is_some() || query.fetch.is_some() {
        dropped.push("LIMIT");
    }
    if query.offset.is_some() {
        dropped.push("OFFSET");
    }
    dropped
}

fn alias_columns(alias: Option<&TableAlias>) -> Vec<String> {
    alias
        .map(|a| a.columns.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default()
}

/// `TABLESAMPLE` / `SAMPLE` after a table name
fn has_sample(factor: &TableFactor) -> bool {
    let text = factor.to_string().to_uppercase();
    let aliased_sample = matches!(
        factor,
        TableFactor::Table { alias: Some(alias), .. } if alias.name.value.eq_ignore_ascii_case("sample")
    );
    text.contains(" TABLESAMPLE ") || (!aliased_sample && text.contains(" SAMPLE "))
}

fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|ident| ident.value.clone()).collect()
}

fn strip_nested(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => strip_nested(inner),
        other => other,
    }
}

fn column_ref(expr: &Expr) -> Option<ColumnRef> {
    match strip_nested(expr) {
        Expr::Identifier(ident) => Some(ColumnRef {
            qualifier: Vec::new(),
            column: ident.value.clone(),
        }),
        Expr::CompoundIdentifier(idents) if idents.len() >= 2 => {
            let (column, qualifier) = idents.split_last()?;
            Some(ColumnRef {
                qualifier: qualifier.iter().map(|i| i.value.clone()).collect(),
                column: column.value.clone(),
            })
        }
        _ => None,
    }
}

fn literal(expr: &Expr) -> Option<FilterValue> {
    match strip_nested(expr) {
        Expr::Value(value) => match value {
            Value::Number(n, _) => Some(FilterValue::Number(n.to_string())),
            Value::SingleQuotedString(s) => Some(FilterValue::Text(s.clone())),
            Value::Boolean(b) => Some(FilterValue::Boolean(*b)),
            Value::Null => Some(FilterValue::Null),
            _ => None,
        },
        Expr::UnaryOp { op, expr } => match (op, literal(expr)?) {
            (UnaryOperator::Minus, FilterValue::Number(n)) => Some(FilterValue::Number(format!("-{}", n))),
            (UnaryOperator::Plus, FilterValue::Number(n)) => Some(FilterValue::Number(n)),
            _ => None,
        },
        _ => None,
    }
}

fn literal_u64(expr: &Expr) -> Option<u64> {
    match literal(expr)? {
        FilterValue::Number(n) => n.parse().ok(),
        _ => None,
    }
}

fn leading_integer(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn comparison_operator(op: &BinaryOperator) -> Option<FilterOperator> {
    match op {
        BinaryOperator::Eq => Some(FilterOperator::Equals),
        BinaryOperator::NotEq => Some(FilterOperator::NotEquals),
        BinaryOperator::Gt => Some(FilterOperator::GreaterThan),
        BinaryOperator::Lt => Some(FilterOperator::LessThan),
        BinaryOperator::GtEq => Some(FilterOperator::GreaterThanOrEqual),
        BinaryOperator::LtEq => Some(FilterOperator::LessThanOrEqual),
        _ => None,
    }
}

/// Flatten an AND tree into its leaves
///
/// Returns false when an OR (or other non-AND connective) had to be flattened.
fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) -> bool {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let l = collect_conjuncts(left, out);
            let r = collect_conjuncts(right, out);
            l && r
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
            false
        }
        Expr::Nested(inner) => collect_conjuncts(inner, out),
        other => {
            out.push(other);
            true
        }
    }
}

fn contains_subquery(expr: &Expr) -> bool {
    match expr {
        Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => true,
        Expr::BinaryOp { left, right, .. } => contains_subquery(left) || contains_subquery(right),
        Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => contains_subquery(inner),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => contains_subquery(inner),
        Expr::InList { expr, list, .. } => contains_subquery(expr) || list.iter().any(contains_subquery),
        Expr::Between { expr, low, high, .. } => {
            contains_subquery(expr) || contains_subquery(low) || contains_subquery(high)
        }
        _ => false,
    }
}

/// `LeftSemi(...)` → `LeftSemi`
fn variant_name(operator: &JoinOperator) -> String {
    let debug = format!("{:?}", operator);
    debug
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_string()
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
        .to_string()
}

pub(crate) fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn extract(sql: &str) -> Extraction {
        let parsed = SqlParser::new().parse(sql).unwrap();
        AstExtractor::new().extract(&parsed).unwrap()
    }

    fn extract_err(sql: &str) -> TranspileError {
        let parsed = SqlParser::new().parse(sql).unwrap();
        AstExtractor::new().extract(&parsed).unwrap_err()
    }

    fn has_warning(extraction: &Extraction, code: DiagnosticCode) -> bool {
        extraction.warnings.iter().any(|w| w.code == code)
    }

    #[test]
    fn select_star_single_table() {
        let result = extract("SELECT * FROM t1");
        let model = &result.model;

        assert_eq!(model.tables.len(), 1);
        assert_eq!(model.tables[0].id, "t1");
        assert_eq!(model.tables[0].schema, DEFAULT_NAMESPACE);
        assert!(model.joins.is_empty());
        assert_eq!(model.select_columns.len(), 1);
        assert_eq!(model.select_columns[0].column, "*");
        assert_eq!(model.select_columns[0].table, WILDCARD);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn three_part_names_and_inner_join() {
        let result = extract("SELECT a.x, b.y FROM s.c.a AS a INNER JOIN s.c.b AS b ON a.id = b.id");
        let model = &result.model;

        assert_eq!(model.tables.len(), 2);
        for table in &model.tables {
            assert_eq!(table.catalog, "s");
            assert_eq!(table.schema, "c");
        }
        assert_eq!(model.joins.len(), 1);
        let join = &model.joins[0];
        assert_eq!(join.join_type, JoinType::Inner);
        assert_eq!((join.source_table.as_str(), join.target_table.as_str()), ("a", "b"));
        assert_eq!((join.source_column.as_str(), join.target_column.as_str()), ("id", "id"));
        assert_eq!(model.select_columns.len(), 2);
        assert_eq!(model.select_columns[1].table, "b");
        assert_eq!(model.select_columns[1].column, "y");
    }

    #[test]
    fn aggregates_filters_grouping_and_limit() {
        let result = extract(
            "SELECT COUNT(*), dept FROM employees WHERE active = 1 GROUP BY dept ORDER BY dept LIMIT 10",
        );
        let model = &result.model;

        assert_eq!(model.tables.len(), 1);
        assert_eq!(model.aggregations.len(), 1);
        assert_eq!(model.aggregations[0].function, AggregateFunction::Count);
        assert_eq!(model.aggregations[0].column, "*");
        assert_eq!(model.select_columns.len(), 1);
        assert_eq!(model.filters.len(), 1);
        assert_eq!(model.filters[0].column, "active");
        assert_eq!(model.filters[0].operator, FilterOperator::Equals);
        assert_eq!(model.filters[0].value, Some(FilterValue::Number("1".into())));
        assert_eq!(model.group_by_columns, vec!["dept".to_string()]);
        assert_eq!(model.order_by_columns.len(), 1);
        assert_eq!(model.order_by_columns[0].direction, SortDirection::Asc);
        assert_eq!(model.limit, Some(10));
    }

    #[test]
    fn ddl_is_rejected() {
        let err = extract_err("CREATE TABLE t (id INT)");
        match err {
            TranspileError::UnsupportedConstruct(message) => assert!(message.contains("CREATE TABLE")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn dml_is_rejected() {
        assert!(matches!(
            extract_err("DELETE FROM users WHERE id = 1"),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn multiple_statements_rejected() {
        assert!(matches!(
            extract_err("SELECT 1; SELECT 2"),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn union_rejected() {
        assert!(matches!(
            extract_err("SELECT id FROM a UNION SELECT id FROM b"),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn compound_join_condition_is_dropped_with_warning() {
        let result = extract(
            "SELECT * FROM orders o JOIN items i ON o.id = i.order_id AND o.region = i.region",
        );

        assert_eq!(result.model.tables.len(), 2);
        assert!(result.model.joins.is_empty());
        assert!(has_warning(&result, DiagnosticCode::JoinConditionDropped));
    }

    #[test]
    fn inequality_join_is_dropped_with_warning() {
        let result = extract("SELECT * FROM a JOIN b ON a.start < b.stop");
        assert!(result.model.joins.is_empty());
        assert!(has_warning(&result, DiagnosticCode::JoinConditionDropped));
    }

    #[test]
    fn join_condition_written_backwards_is_normalized() {
        let result = extract("SELECT * FROM orders o LEFT JOIN customers c ON c.id = o.customer_id");
        let join = &result.model.joins[0];

        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(join.source_table, "o");
        assert_eq!(join.source_column, "customer_id");
        assert_eq!(join.target_table, "c");
        assert_eq!(join.target_column, "id");
    }

    #[test]
    fn join_types_are_mapped() {
        let result = extract(
            "SELECT * FROM a \
             LEFT JOIN b ON a.id = b.a_id \
             RIGHT JOIN c ON b.id = c.b_id \
             FULL OUTER JOIN d ON c.id = d.c_id",
        );
        let types: Vec<JoinType> = result.model.joins.iter().map(|j| j.join_type).collect();
        assert_eq!(types, vec![JoinType::Left, JoinType::Right, JoinType::Full]);
    }

    #[test]
    fn using_single_column_becomes_equality() {
        let result = extract("SELECT * FROM orders JOIN items USING (order_id)");
        let join = &result.model.joins[0];

        assert_eq!(join.source_table, "orders");
        assert_eq!(join.target_table, "items");
        assert_eq!(join.source_column, "order_id");
        assert_eq!(join.target_column, "order_id");
    }

    #[test]
    fn cross_join_keeps_table_without_relation() {
        let result = extract("SELECT * FROM a CROSS JOIN b");
        assert_eq!(result.model.tables.len(), 2);
        assert!(result.model.joins.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn subquery_in_join_condition_is_rejected() {
        assert!(matches!(
            extract_err("SELECT * FROM a JOIN b ON a.id IN (SELECT id FROM c)"),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn or_filters_are_flattened_with_warning() {
        let result = extract("SELECT * FROM users WHERE status = 'active' OR age > 30");

        assert_eq!(result.model.filters.len(), 2);
        assert!(has_warning(&result, DiagnosticCode::FilterApproximated));
    }

    #[test]
    fn nested_and_groups_flatten_without_warning() {
        let result = extract("SELECT * FROM users WHERE (age > 18 AND age < 65) AND country = 'NZ'");

        assert_eq!(result.model.filters.len(), 3);
        assert!(!has_warning(&result, DiagnosticCode::FilterApproximated));
    }

    #[test]
    fn filter_operator_coverage() {
        let result = extract(
            "SELECT * FROM users u WHERE u.name LIKE 'A%' AND u.email NOT LIKE '%@test.com' \
             AND u.role IN ('admin', 'owner') AND u.id NOT IN (1, 2) \
             AND u.deleted_at IS NULL AND u.verified_at IS NOT NULL \
             AND u.score <> 0 AND u.age >= -1",
        );
        let ops: Vec<FilterOperator> = result.model.filters.iter().map(|f| f.operator).collect();

        assert_eq!(
            ops,
            vec![
                FilterOperator::Like,
                FilterOperator::NotLike,
                FilterOperator::In,
                FilterOperator::NotIn,
                FilterOperator::IsNull,
                FilterOperator::IsNotNull,
                FilterOperator::NotEquals,
                FilterOperator::GreaterThanOrEqual,
            ]
        );
        assert!(result.model.filters.iter().all(|f| f.table == "u"));
        assert_eq!(result.model.filters[7].value, Some(FilterValue::Number("-1".into())));
        assert_eq!(result.model.filters[4].value, None);
    }

    #[test]
    fn literal_on_left_mirrors_operator() {
        let result = extract("SELECT * FROM users WHERE 18 < age");
        let filter = &result.model.filters[0];

        assert_eq!(filter.column, "age");
        assert_eq!(filter.operator, FilterOperator::GreaterThan);
    }

    #[test]
    fn between_is_split() {
        let result = extract("SELECT * FROM sales WHERE amount BETWEEN 10 AND 20");
        let ops: Vec<FilterOperator> = result.model.filters.iter().map(|f| f.operator).collect();

        assert_eq!(ops, vec![FilterOperator::GreaterThanOrEqual, FilterOperator::LessThanOrEqual]);
    }

    #[test]
    fn implicit_join_from_where() {
        let result = extract("SELECT * FROM orders o, customers c WHERE o.customer_id = c.id AND c.active = true");

        assert_eq!(result.model.joins.len(), 1);
        assert_eq!(result.model.joins[0].join_type, JoinType::Inner);
        assert_eq!(result.model.filters.len(), 1);
        assert!(has_warning(&result, DiagnosticCode::ImplicitJoin));
    }

    #[test]
    fn unsupported_predicate_is_skipped() {
        let result = extract("SELECT * FROM users WHERE LOWER(name) = 'bob'");

        assert!(result.model.filters.is_empty());
        assert!(has_warning(&result, DiagnosticCode::FilterSkipped));
    }

    #[test]
    fn count_distinct_and_aliases() {
        let result = extract(
            "SELECT c.region, COUNT(DISTINCT o.customer_id) AS buyers, SUM(o.total) AS revenue \
             FROM orders o JOIN customers c ON o.customer_id = c.id GROUP BY c.region",
        );
        let model = &result.model;

        assert_eq!(model.aggregations.len(), 2);
        assert_eq!(model.aggregations[0].function, AggregateFunction::CountDistinct);
        assert_eq!(model.aggregations[0].table, "o");
        assert_eq!(model.aggregations[0].alias.as_deref(), Some("buyers"));
        assert_eq!(model.aggregations[1].function, AggregateFunction::Sum);
        assert_eq!(model.group_by_columns, vec!["c.region".to_string()]);
    }

    #[test]
    fn window_function_is_preserved_verbatim() {
        let result = extract(
            "SELECT name, ROW_NUMBER() OVER (PARTITION BY dept ORDER BY salary DESC) AS rn FROM employees",
        );
        let model = &result.model;

        assert!(model.aggregations.is_empty());
        assert_eq!(model.select_columns.len(), 2);
        let rn = &model.select_columns[1];
        assert_eq!(rn.alias.as_deref(), Some("rn"));
        assert!(rn.expression.as_deref().unwrap().contains("ROW_NUMBER()"));
        assert!(has_warning(&result, DiagnosticCode::ExpressionPreserved));
    }

    #[test]
    fn aggregate_over_window_is_not_an_aggregation() {
        let result = extract("SELECT SUM(amount) OVER (PARTITION BY account) FROM ledger");
        assert!(result.model.aggregations.is_empty());
        assert_eq!(result.model.select_columns.len(), 1);
    }

    #[test]
    fn having_conditions() {
        let result = extract(
            "SELECT dept, COUNT(*) AS n FROM employees GROUP BY dept HAVING COUNT(*) > 5 AND 100 <= SUM(salary)",
        );
        let having = &result.model.having;

        assert_eq!(having.len(), 2);
        assert_eq!(having[0].function, AggregateFunction::Count);
        assert_eq!(having[0].operator, FilterOperator::GreaterThan);
        assert_eq!(having[1].function, AggregateFunction::Sum);
        assert_eq!(having[1].operator, FilterOperator::GreaterThanOrEqual);
    }

    #[test]
    fn order_direction_offset_and_distinct() {
        let result = extract("SELECT DISTINCT u.name FROM users u ORDER BY u.name DESC, u.id LIMIT 5 OFFSET 10");
        let model = &result.model;

        assert!(model.distinct);
        assert_eq!(model.order_by_columns[0].column, "u.name");
        assert_eq!(model.order_by_columns[0].direction, SortDirection::Desc);
        assert_eq!(model.order_by_columns[1].direction, SortDirection::Asc);
        assert_eq!(model.limit, Some(5));
        assert_eq!(model.offset, Some(10));
    }

    #[test]
    fn cte_is_inlined() {
        let result = extract(
            "WITH active AS (SELECT id, name FROM users WHERE active = true) \
             SELECT a.name FROM active a",
        );
        let model = &result.model;

        assert_eq!(model.tables.len(), 1);
        assert_eq!(model.tables[0].name, "users");
        assert_eq!(model.filters.len(), 1);
        // CTE columns merged plus the outer column resolved onto the CTE's table
        assert_eq!(model.select_columns.len(), 3);
        assert_eq!(model.select_columns[2].table, "users");
        assert!(has_warning(&result, DiagnosticCode::CteFlattened));
    }

    #[test]
    fn cte_wildcards_are_not_merged() {
        let result = extract("WITH base AS (SELECT * FROM users) SELECT id FROM base");
        assert_eq!(result.model.select_columns.len(), 1);
        assert_eq!(result.model.select_columns[0].column, "id");
    }

    #[test]
    fn cte_joined_to_table() {
        let result = extract(
            "WITH recent AS (SELECT * FROM orders WHERE created_at > '2024-01-01') \
             SELECT c.name FROM customers c JOIN recent r ON c.id = r.customer_id",
        );
        let model = &result.model;

        assert_eq!(model.tables.len(), 2);
        assert_eq!(model.joins.len(), 1);
        assert_eq!(model.joins[0].source_table, "c");
        assert_eq!(model.joins[0].target_table, "orders");
    }

    #[test]
    fn recursive_cte_rejected() {
        assert!(matches!(
            extract_err(
                "WITH RECURSIVE nums AS (SELECT 1 AS n UNION ALL SELECT n + 1 FROM nums WHERE n < 5) \
                 SELECT n FROM nums"
            ),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn subquery_becomes_virtual_table() {
        let result = extract(
            "SELECT t.total FROM (SELECT customer_id, SUM(amount) AS total FROM payments GROUP BY customer_id) AS t",
        );
        let model = &result.model;

        assert_eq!(model.tables.len(), 2);
        let virtual_table = &model.tables[0];
        assert_eq!(virtual_table.id, "t");
        assert!(virtual_table.is_virtual());
        assert!(virtual_table.derived.as_deref().unwrap().contains("payments"));

        let hidden = &model.tables[1];
        assert_eq!(hidden.name, "payments");
        assert_eq!(hidden.parent.as_deref(), Some("t"));

        // Inner items are attributed to the hidden table
        assert!(model.aggregations.iter().all(|a| a.table == "payments"));
        assert!(has_warning(&result, DiagnosticCode::SubqueryFlattened));
    }

    #[test]
    fn cte_grouping_is_merged() {
        let result = extract(
            "WITH t AS (SELECT dept, COUNT(*) AS c FROM e GROUP BY dept HAVING COUNT(*) > 1) \
             SELECT dept, c FROM t",
        );
        let model = &result.model;

        assert_eq!(model.group_by_columns, vec!["dept".to_string()]);
        assert_eq!(model.having.len(), 1);
        assert_eq!(model.aggregations.len(), 1);
    }

    #[test]
    fn cte_dropped_clauses_are_named() {
        let result = extract(
            "WITH top_users AS (SELECT id FROM users ORDER BY id LIMIT 5) SELECT id FROM top_users",
        );
        let warning = result
            .warnings
            .iter()
            .find(|w| w.code == DiagnosticCode::CteFlattened)
            .unwrap();

        assert!(warning.message.contains("ORDER BY"));
        assert!(warning.message.contains("LIMIT"));
        assert_eq!(result.model.limit, None);
    }

    #[test]
    fn derived_column_aliases_are_kept() {
        let result = extract("SELECT t.a FROM (SELECT id FROM users) AS t (a)");
        let virtual_table = &result.model.tables[0];

        assert_eq!(virtual_table.id, "t");
        assert_eq!(virtual_table.column_aliases, vec!["a".to_string()]);
        let warning = result
            .warnings
            .iter()
            .find(|w| w.code == DiagnosticCode::SubqueryFlattened)
            .unwrap();
        assert!(warning.message.contains("(a)"));
    }

    #[test]
    fn table_column_aliases_are_kept() {
        let result = extract("SELECT u.a FROM users AS u (a, b)");
        assert_eq!(
            result.model.tables[0].column_aliases,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn table_functions_are_rejected() {
        assert!(matches!(
            extract_err("SELECT g FROM generate_series(1, 3) AS g"),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn lateral_subquery_is_rejected() {
        assert!(matches!(
            extract_err(
                "SELECT u.id, o.total FROM users u, LATERAL (SELECT SUM(amount) AS total FROM orders WHERE orders.user_id = u.id) AS o"
            ),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn table_hints_are_rejected() {
        let parsed = SqlParser::from_dialect(&querygraph_core::DialectConfig::MsSql)
            .parse("SELECT id FROM users WITH (NOLOCK)")
            .unwrap();
        assert!(matches!(
            AstExtractor::new().extract(&parsed).unwrap_err(),
            TranspileError::UnsupportedConstruct(_)
        ));
    }

    #[test]
    fn delimited_identifiers_reach_the_model() {
        let result = extract(r#"SELECT "UserId" FROM "Users""#);
        let quoted: Vec<&str> = result.model.quoted_identifiers.iter().map(String::as_str).collect();
        assert_eq!(quoted, vec!["UserId", "Users"]);
    }

    #[test]
    fn duplicate_table_ids_are_suffixed() {
        let result = extract("SELECT * FROM emp JOIN emp ON emp.manager_id = emp.id");
        let ids: Vec<&str> = result.model.tables.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["emp", "emp_2"]);
    }

    #[test]
    fn positions_follow_grid() {
        let result = extract("SELECT * FROM a, b, c, d");
        let positions: Vec<Position> = result.model.tables.iter().map(|t| t.position).collect();

        assert_eq!(positions[0], Position::grid(0));
        assert_eq!(positions[3], Position { x: 100.0, y: 350.0 });
    }

    #[test]
    fn statement_kind_names() {
        let parsed = SqlParser::new().parse("CREATE OR REPLACE VIEW v AS SELECT 1").unwrap();
        assert_eq!(statement_kind(&parsed.statements[0]), "CREATE VIEW");
    }

    #[test]
    fn plain_identifier_check() {
        assert!(is_plain_identifier("order_total"));
        assert!(is_plain_identifier("_x1"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("first name"));
        assert!(!is_plain_identifier(""));
    }
}
