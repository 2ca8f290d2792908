//! Name resolution for table qualifiers and CTEs
//!
//! Maps every name a column may be qualified with (alias, bare table name,
//! fully qualified name, CTE name) to the id of the table node it refers to.

use std::collections::HashMap;

/// A CTE visible in the current scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteBinding {
    /// Id of the table the inlined CTE resolves to (its first table)
    pub target: Option<String>,
}

/// Qualifier resolution for one SELECT scope
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    /// Lowercased qualifier to table id
    qualifiers: HashMap<String, String>,

    /// Table ids registered in this scope, in FROM order
    tables: Vec<String>,

    /// CTE names visible in this scope
    ctes: HashMap<String, CteBinding>,
}

impl TableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope for a nested query: sees the CTEs, not the outer tables
    pub fn child(&self) -> Self {
        Self {
            qualifiers: HashMap::new(),
            tables: Vec::new(),
            ctes: self.ctes.clone(),
        }
    }

    /// Register a table reference
    ///
    /// The alias always wins; the fully qualified and bare names resolve to
    /// the first table registered under them.
    pub fn register_table(&mut self, id: &str, name_parts: &[String], alias: Option<&str>) {
        self.tables.push(id.to_string());

        if let Some(alias) = alias {
            self.qualifiers.insert(alias.to_lowercase(), id.to_string());
        }

        if !name_parts.is_empty() {
            self.qualifiers
                .entry(name_parts.join(".").to_lowercase())
                .or_insert_with(|| id.to_string());
        }

        if let Some(bare) = name_parts.last() {
            self.qualifiers
                .entry(bare.to_lowercase())
                .or_insert_with(|| id.to_string());
        }
    }

    /// Make `qualifier` resolve to an already registered table
    pub fn register_alias(&mut self, qualifier: &str, id: &str) {
        self.qualifiers.insert(qualifier.to_lowercase(), id.to_string());
        if !self.tables.iter().any(|t| t == id) {
            self.tables.push(id.to_string());
        }
    }

    pub fn register_cte(&mut self, name: &str, target: Option<String>) {
        self.ctes.insert(name.to_lowercase(), CteBinding { target });
    }

    pub fn cte(&self, name: &str) -> Option<&CteBinding> {
        self.ctes.get(&name.to_lowercase())
    }

    /// Resolve a (possibly multi-part) qualifier to a table id
    pub fn resolve(&self, qualifier: &[String]) -> Option<&str> {
        let full = qualifier.join(".").to_lowercase();
        if let Some(id) = self.qualifiers.get(&full) {
            return Some(id.as_str());
        }

        let bare = qualifier.last()?.to_lowercase();
        self.qualifiers.get(&bare).map(String::as_str)
    }

    /// First table of the FROM clause
    pub fn first_table(&self) -> Option<&str> {
        self.tables.first().map(String::as_str)
    }
}
