//! Completion-envelope decoding.
//!
//! A phase's completion may arrive in one of three shapes. The keyed shape
//! for the phase always wins; then a bare array of statements; then an
//! `{"sql": [...]}` wrapper. Anything else decodes to no statements at all,
//! leaving the executors to report the more specific domain error.

use serde_json::Value;

/// Which half of the pipeline an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Schema,
    Data,
}

impl Phase {
    /// The two keys of the phase's keyed shape, in execution order.
    pub fn keys(self) -> (&'static str, &'static str) {
        match self {
            Phase::Schema => ("create", "alter"),
            Phase::Data => ("dml", "select"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Schema => "schema",
            Phase::Data => "data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `{create, alter}` or `{dml, select}`; missing keys decode as "".
    Keyed { first: String, second: String },
    ArrayForm(Vec<String>),
    WrappedForm(Vec<String>),
    Unrecognized,
}

/// Decode a completion for `phase`, never failing.
pub fn decode(phase: Phase, value: &Value) -> Envelope {
    let (first_key, second_key) = phase.keys();

    if let Value::Object(map) = value {
        if map.contains_key(first_key) || map.contains_key(second_key) {
            return Envelope::Keyed {
                first: field_text(map.get(first_key)),
                second: field_text(map.get(second_key)),
            };
        }
    }

    if let Value::Array(items) = value {
        return Envelope::ArrayForm(string_items(items));
    }

    if let Some(Value::Array(items)) = value.get("sql") {
        return Envelope::WrappedForm(string_items(items));
    }

    Envelope::Unrecognized
}

impl Envelope {
    /// Effective statement list in execution order.
    ///
    /// Every field or element is split into single statements, so the last
    /// entry is the statement that actually runs last.
    pub fn statements(&self) -> Vec<String> {
        match self {
            Envelope::Keyed { first, second } => [first, second]
                .into_iter()
                .flat_map(|s| split_statements(s))
                .collect(),
            Envelope::ArrayForm(list) | Envelope::WrappedForm(list) => {
                list.iter().flat_map(|s| split_statements(s)).collect()
            }
            Envelope::Unrecognized => Vec::new(),
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Envelope::Keyed { .. })
    }

    /// The two SQL fields as they should be reported to the caller.
    ///
    /// Keyed shapes report their fields verbatim. Fallback lists report the
    /// last statement as the second field and everything before it, joined,
    /// as the first: for the data phase that makes the last array element
    /// the authoritative `select`.
    pub fn reported_fields(&self) -> (String, String) {
        match self {
            Envelope::Keyed { first, second } => (first.clone(), second.clone()),
            Envelope::ArrayForm(list) | Envelope::WrappedForm(list) => match list.split_last() {
                Some((last, rest)) => (join_statements(rest), last.clone()),
                None => (String::new(), String::new()),
            },
            Envelope::Unrecognized => (String::new(), String::new()),
        }
    }
}

/// Keyed fields are usually strings; tolerate a list of statements too.
fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => join_statements(&string_items(items)),
        _ => String::new(),
    }
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_statements(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| s.trim_end().trim_end_matches(';').to_string())
        .collect::<Vec<_>>()
        .join(";\n")
}

/// Split SQL text into single statements on top-level `;`.
///
/// Semicolons inside string literals, quoted identifiers, comments and the
/// `BEGIN ... END` body of a `CREATE TRIGGER` do not split. Pieces holding
/// only whitespace or comments are dropped; the terminating `;` is not kept.
pub fn split_statements(sql: &str) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        i = match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => skip_quoted(bytes, i + 1, quote),
            b'[' => skip_past(bytes, i + 1, b"]"),
            b'-' if bytes.get(i + 1) == Some(&b'-') => skip_past(bytes, i + 2, b"\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_past(bytes, i + 2, b"*/"),
            b';' => {
                let candidate = &sql[start..i];
                if !inside_trigger_body(candidate) {
                    push_statement(&mut statements, candidate);
                    start = i + 1;
                }
                i + 1
            }
            _ => i + 1,
        };
    }
    push_statement(&mut statements, &sql[start..]);
    statements
}

fn push_statement(statements: &mut Vec<String>, piece: &str) {
    if !strip_trivia(piece).is_empty() {
        statements.push(piece.trim().to_string());
    }
}

/// Index just past the closing quote; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Index just past the next `needle`, or the end of input.
fn skip_past(bytes: &[u8], from: usize, needle: &[u8]) -> usize {
    bytes
        .get(from..)
        .and_then(|rest| rest.windows(needle.len()).position(|w| w == needle))
        .map(|pos| from + pos + needle.len())
        .unwrap_or(bytes.len())
}

/// A `CREATE [TEMP] TRIGGER` whose body has not reached `END` yet.
fn inside_trigger_body(candidate: &str) -> bool {
    let words: Vec<String> = strip_trivia(candidate)
        .split_whitespace()
        .take(3)
        .map(str::to_ascii_uppercase)
        .collect();
    let is_trigger = match words.as_slice() {
        [create, trigger, ..] if create == "CREATE" && trigger == "TRIGGER" => true,
        [create, temp, trigger] => {
            create == "CREATE" && (temp == "TEMP" || temp == "TEMPORARY") && trigger == "TRIGGER"
        }
        _ => false,
    };
    if !is_trigger {
        return false;
    }
    let tail = candidate.trim_end();
    let ends_with_end = tail.len() >= 3
        && tail
            .get(tail.len() - 3..)
            .is_some_and(|w| w.eq_ignore_ascii_case("end"))
        && !tail[..tail.len() - 3]
            .ends_with(|c: char| c.is_ascii_alphanumeric() || c == '_');
    !ends_with_end
}

/// The statement with leading whitespace and comments removed.
fn strip_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return rest;
        }
    }
}

/// Leading keyword of a statement, uppercased; empty when there is none.
fn first_keyword(sql: &str) -> String {
    strip_trivia(sql)
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// True when the statement's first keyword is `SELECT`, ignoring case,
/// leading whitespace and SQL comments.
pub fn is_read_query(sql: &str) -> bool {
    first_keyword(sql) == "SELECT"
}

/// True for statements that open, close or nest a transaction.
pub fn is_transaction_control(sql: &str) -> bool {
    matches!(
        first_keyword(sql).as_str(),
        "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE"
    )
}
