//! Core data model: context state, schema snapshots, table stats and
//! execution records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// HTTP methods the simulator accepts for a fake endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| ValidationError::UnsupportedMethod(s.trim().to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-controlled context for the fictitious backend.
///
/// `endpoint` always starts with `/`; construct through
/// [`ContextState::validated`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextState {
    pub generic_prompt: String,
    pub stored_prompt: String,
    pub method: HttpMethod,
    pub endpoint: String,
}

impl ContextState {
    /// Validate and normalize the operator-editable fields, keeping the
    /// generic instruction as given.
    pub fn validated(
        generic_prompt: impl Into<String>,
        prompt: &str,
        method: &str,
        endpoint: &str,
    ) -> Result<Self, ValidationError> {
        let stored_prompt = normalize_prompt(prompt)?;
        let method = method.parse::<HttpMethod>()?;
        let endpoint = normalize_endpoint(endpoint)?;
        Ok(Self {
            generic_prompt: generic_prompt.into(),
            stored_prompt,
            method,
            endpoint,
        })
    }
}

pub fn normalize_prompt(prompt: &str) -> Result<String, ValidationError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    Ok(trimmed.to_string())
}

/// Trim and ensure a single leading `/`.
pub fn normalize_endpoint(endpoint: &str) -> Result<String, ValidationError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyEndpoint);
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// User tables in lexicographic order, columns in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(mut tables: Vec<TableSchema>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// One line per table: `name(col TYPE NOT NULL, ...)`.
impl fmt::Display for SchemaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tables.is_empty() {
            return f.write_str("(no tables yet)");
        }
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let mut col = c.name.clone();
                    if !c.declared_type.is_empty() {
                        col.push(' ');
                        col.push_str(&c.declared_type);
                    }
                    if !c.nullable {
                        col.push_str(" NOT NULL");
                    }
                    col
                })
                .collect();
            write!(f, "{}({})", table.name, columns.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStat {
    pub table: String,
    pub row_count: i64,
}

/// Per-table row counts, same ordering as [`SchemaSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TableStats(pub Vec<TableStat>);

impl TableStats {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn row_count(&self, table: &str) -> Option<i64> {
        self.0
            .iter()
            .find(|s| s.table == table)
            .map(|s| s.row_count)
    }

    pub fn as_pairs(&self) -> Vec<(&str, i64)> {
        self.0
            .iter()
            .map(|s| (s.table.as_str(), s.row_count))
            .collect()
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        let lines: Vec<String> = self
            .0
            .iter()
            .map(|s| {
                let noun = if s.row_count == 1 { "row" } else { "rows" };
                format!("{}: {} {}", s.table, s.row_count, noun)
            })
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Statements a phase ran to completion, plus the stats observed after
/// its commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub executed_sql: Vec<String>,
    pub table_stats: TableStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!(" Get ".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(
            "HEAD".parse::<HttpMethod>(),
            Err(ValidationError::UnsupportedMethod("HEAD".into()))
        );
    }

    #[test]
    fn endpoint_gets_leading_slash() {
        assert_eq!(normalize_endpoint("orders/1").unwrap(), "/orders/1");
        assert_eq!(normalize_endpoint("  /orders ").unwrap(), "/orders");
        assert_eq!(
            normalize_endpoint("   "),
            Err(ValidationError::EmptyEndpoint)
        );
    }

    #[test]
    fn validated_context_normalizes_all_fields() {
        let ctx = ContextState::validated("generic", "  a bookshop  ", "post", "books").unwrap();
        assert_eq!(ctx.stored_prompt, "a bookshop");
        assert_eq!(ctx.method, HttpMethod::Post);
        assert_eq!(ctx.endpoint, "/books");
        assert_eq!(ctx.generic_prompt, "generic");
    }

    #[test]
    fn empty_snapshot_renders_marker() {
        assert_eq!(SchemaSnapshot::default().to_string(), "(no tables yet)");
        assert_eq!(TableStats::default().to_string(), "(none)");
    }

    #[test]
    fn snapshot_renders_sorted_tables() {
        let snapshot = SchemaSnapshot::new(vec![
            TableSchema {
                name: "orders".into(),
                columns: vec![ColumnInfo {
                    name: "id".into(),
                    declared_type: "INTEGER".into(),
                    nullable: false,
                }],
            },
            TableSchema {
                name: "customers".into(),
                columns: vec![
                    ColumnInfo {
                        name: "id".into(),
                        declared_type: "INTEGER".into(),
                        nullable: false,
                    },
                    ColumnInfo {
                        name: "name".into(),
                        declared_type: "TEXT".into(),
                        nullable: true,
                    },
                ],
            },
        ]);
        assert_eq!(
            snapshot.to_string(),
            "customers(id INTEGER NOT NULL, name TEXT)\norders(id INTEGER NOT NULL)"
        );
    }

    #[test]
    fn stats_render_and_serialize() {
        let stats = TableStats(vec![
            TableStat {
                table: "customers".into(),
                row_count: 1,
            },
            TableStat {
                table: "orders".into(),
                row_count: 3,
            },
        ]);
        assert_eq!(stats.to_string(), "customers: 1 row\norders: 3 rows");
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!([
                {"table": "customers", "rowCount": 1},
                {"table": "orders", "rowCount": 3}
            ])
        );
    }
}
