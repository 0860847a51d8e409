//! Prompt assembly for the two simulation phases and scenario generation.
//!
//! Every builder here is a pure function of its arguments. Section order is
//! fixed: generic instruction, method, endpoint, context, schema, row
//! counts, payload, closing directive.

use std::fmt::Write;

use serde_json::Value;

use crate::types::{ContextState, HttpMethod, SchemaSnapshot, TableStats};

const NO_BODY: &str = "(no body)";

const SCHEMA_DIRECTIVE: &str = "\
Prepare the database schema this request needs.
Respond with a single JSON object of the form {\"create\": \"...\", \"alter\": \"...\"}.
- Both keys must always be present; use an empty string when nothing is needed.
- Never create a table that already exists; use CREATE TABLE IF NOT EXISTS.
- Never reference a table that is not in the current schema without creating it first.
- Only CREATE and ALTER statements are allowed here: no INSERT, UPDATE, DELETE or SELECT.
- Use SQLite syntax; separate multiple statements with semicolons.";

const DATA_DIRECTIVE: &str = "\
Produce the data changes and the query that answers this request.
Respond with a single JSON object of the form {\"dml\": \"...\", \"select\": \"...\"}.
- Both keys must always be present; dml may be an empty string.
- select is mandatory: one SELECT whose rows are the response body.
- Do not create, alter or drop tables here.
- dml runs first, then select, inside one transaction.
- Use SQLite syntax; separate multiple dml statements with semicolons.";

const SCENARIO_DIRECTIVE: &str = "\
Invent a small, plausible fictitious REST backend to simulate.
Respond with a single JSON object of the form
{\"prompt\": \"...\", \"method\": \"...\", \"endpoint\": \"...\", \"payload\": {...}}.
- prompt: two or three sentences describing the domain and its main entities.
- method: one of GET, POST, PUT, PATCH, DELETE.
- endpoint: a path starting with /.
- payload: a sample JSON request body for that call, or null for GET and DELETE.";

/// Everything a phase prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub payload: Option<&'a Value>,
    pub method: HttpMethod,
    pub endpoint: &'a str,
    pub context: &'a ContextState,
    pub snapshot: &'a SchemaSnapshot,
    pub stats: &'a TableStats,
}

pub fn build_schema_prompt(inputs: PromptInputs<'_>) -> String {
    assemble(inputs, SCHEMA_DIRECTIVE)
}

/// Same layout as the schema prompt; `snapshot` and `stats` must come from
/// the store after the schema phase committed.
pub fn build_data_prompt(inputs: PromptInputs<'_>) -> String {
    assemble(inputs, DATA_DIRECTIVE)
}

pub fn build_scenario_prompt(generic_prompt: &str) -> String {
    format!("{}\n\n{SCENARIO_DIRECTIVE}\n", generic_prompt.trim())
}

fn assemble(inputs: PromptInputs<'_>, directive: &str) -> String {
    let mut out = String::with_capacity(1024);
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{}", inputs.context.generic_prompt.trim());
    let _ = writeln!(out);
    let _ = writeln!(out, "HTTP method: {}", inputs.method);
    let _ = writeln!(out, "Endpoint: {}", inputs.endpoint);
    let _ = writeln!(out);
    let _ = writeln!(out, "Backend description:");
    let _ = writeln!(out, "{}", inputs.context.stored_prompt);
    let _ = writeln!(out);
    let _ = writeln!(out, "Current schema:");
    let _ = writeln!(out, "{}", inputs.snapshot);
    let _ = writeln!(out);
    let _ = writeln!(out, "Row counts:");
    let _ = writeln!(out, "{}", inputs.stats);
    let _ = writeln!(out);
    let _ = writeln!(out, "Request body:");
    let _ = writeln!(out, "{}", render_payload(inputs.payload));
    let _ = writeln!(out);
    let _ = writeln!(out, "{directive}");
    out
}

fn render_payload(payload: Option<&Value>) -> String {
    match payload {
        None | Some(Value::Null) => NO_BODY.to_string(),
        Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnInfo, TableSchema, TableStat};
    use serde_json::json;

    fn context() -> ContextState {
        ContextState::validated("You simulate REST APIs.", "A bookshop.", "POST", "/books").unwrap()
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{needle:?} missing from prompt:\n{haystack}"))
    }

    #[test]
    fn empty_store_uses_markers() {
        let context = context();
        let snapshot = SchemaSnapshot::default();
        let stats = TableStats::default();
        let prompt = build_schema_prompt(PromptInputs {
            payload: None,
            method: context.method,
            endpoint: &context.endpoint,
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        });
        assert!(prompt.contains("(no tables yet)"));
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("(no body)"));
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let context = context();
        let snapshot = SchemaSnapshot::new(vec![TableSchema {
            name: "books".into(),
            columns: vec![ColumnInfo {
                name: "title".into(),
                declared_type: "TEXT".into(),
                nullable: false,
            }],
        }]);
        let stats = TableStats(vec![TableStat {
            table: "books".into(),
            row_count: 3,
        }]);
        let payload = json!({"title": "Dune"});
        let prompt = build_data_prompt(PromptInputs {
            payload: Some(&payload),
            method: HttpMethod::Put,
            endpoint: "/books/1",
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        });

        let order = [
            "You simulate REST APIs.",
            "HTTP method: PUT",
            "Endpoint: /books/1",
            "A bookshop.",
            "books(title TEXT NOT NULL)",
            "books: 3 rows",
            "\"title\": \"Dune\"",
            "{\"dml\": \"...\", \"select\": \"...\"}",
        ];
        let positions: Vec<usize> = order.iter().map(|n| position(&prompt, n)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }

    #[test]
    fn null_payload_is_no_body() {
        let context = context();
        let snapshot = SchemaSnapshot::default();
        let stats = TableStats::default();
        let prompt = build_schema_prompt(PromptInputs {
            payload: Some(&Value::Null),
            method: context.method,
            endpoint: &context.endpoint,
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        });
        assert!(prompt.contains("Request body:\n(no body)"));
    }

    #[test]
    fn directives_differ_by_phase() {
        let context = context();
        let snapshot = SchemaSnapshot::default();
        let stats = TableStats::default();
        let inputs = PromptInputs {
            payload: None,
            method: context.method,
            endpoint: &context.endpoint,
            context: &context,
            snapshot: &snapshot,
            stats: &stats,
        };
        let schema = build_schema_prompt(inputs);
        let data = build_data_prompt(inputs);
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS"));
        assert!(!schema.contains("\"select\""));
        assert!(data.contains("select is mandatory"));
        assert_eq!(schema, build_schema_prompt(inputs));
    }

    #[test]
    fn scenario_prompt_asks_for_all_fields() {
        let prompt = build_scenario_prompt("  You simulate REST APIs.  ");
        assert!(prompt.starts_with("You simulate REST APIs.\n"));
        for key in ["\"prompt\"", "\"method\"", "\"endpoint\"", "\"payload\""] {
            assert!(prompt.contains(key));
        }
    }
}
