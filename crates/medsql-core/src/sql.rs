// SQL text utilities: question cleanup, query rewrites, read-only checks,
// identifier quoting and cache keys.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

pub const DISTINCT_NOTE: &str = "Added DISTINCT to prevent duplicate rows from joins";
pub const PARTIAL_MATCH_NOTE: &str = "Modified for case-insensitive and partial string matching";
pub const CASE_MATCH_NOTE: &str = "Modified for case-insensitive string matching";

/// Statement keywords a read-only query may start with.
const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "PRAGMA", "EXPLAIN", "VALUES"];

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

fn line_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"--[^\n]*")
}

fn block_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"(?s)/\*.*?\*/")
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\s+")
}

/// String literals and every identifier quoting form SQLite accepts.
fn quoted_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|`(?:[^`]|``)*`|\[[^\]]*\]"#)
}

/// `column = 'value'`, or a quoted span to be copied through untouched.
/// Quoted spans come first so text inside a literal never matches.
fn string_equality() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|\b(?P<column>(?:\w+\.)?\w+)\s*=\s*'(?P<value>(?:[^']|'')*)'"#,
    )
}

/// Strip SQL-style comments from a user question, collapse whitespace runs
/// and trim.
pub fn preprocess_question(text: &str) -> String {
    let without_blocks = block_comment().replace_all(text, " ");
    let without_lines = line_comment().replace_all(&without_blocks, " ");
    whitespace()
        .replace_all(&without_lines, " ")
        .trim()
        .to_string()
}

/// Insert `DISTINCT` after the first `SELECT` of a join query that neither
/// groups nor already de-duplicates.
pub fn add_distinct_for_joins(sql: &str) -> (String, Option<&'static str>) {
    static JOIN: OnceLock<Regex> = OnceLock::new();
    static GROUP_BY: OnceLock<Regex> = OnceLock::new();
    static DISTINCT: OnceLock<Regex> = OnceLock::new();
    static SELECT: OnceLock<Regex> = OnceLock::new();

    let has_join = compiled(&JOIN, r"(?i)\bjoin\b").is_match(sql);
    let has_group_by = compiled(&GROUP_BY, r"(?i)\bgroup\s+by\b").is_match(sql);
    let has_distinct = compiled(&DISTINCT, r"(?i)\bdistinct\b").is_match(sql);

    if !has_join || has_group_by || has_distinct {
        return (sql.to_string(), None);
    }

    let select = compiled(&SELECT, r"(?i)\bselect\b");
    if !select.is_match(sql) {
        return (sql.to_string(), None);
    }
    let rewritten = select.replacen(sql, 1, "SELECT DISTINCT").into_owned();
    (rewritten, Some(DISTINCT_NOTE))
}

/// Make `column = 'value'` comparisons case-insensitive. Queries without any
/// `LIKE` also get partial matching.
pub fn relax_string_matching(sql: &str) -> (String, Option<&'static str>) {
    let partial = !sql.to_uppercase().contains("LIKE");
    let mut changed = false;
    let rewritten = string_equality()
        .replace_all(sql, |caps: &Captures| {
            let (Some(column), Some(value)) = (caps.name("column"), caps.name("value")) else {
                return caps[0].to_string();
            };
            changed = true;
            // `value` keeps its doubled-quote escapes.
            let (column, value) = (column.as_str(), value.as_str());
            if partial {
                format!("LOWER({column}) LIKE LOWER('%{value}%')")
            } else {
                format!("LOWER({column}) = LOWER('{value}')")
            }
        })
        .into_owned();

    if !changed {
        return (sql.to_string(), None);
    }
    let note = if partial { PARTIAL_MATCH_NOTE } else { CASE_MATCH_NOTE };
    (rewritten, Some(note))
}

/// The first fenced ```sql (or ```sqlite) block in a markdown answer.
pub fn extract_sql_block(markdown: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = compiled(&RE, r"(?is)```\s*(?:sqlite|sql)\b\s*\n?(.*?)```");
    re.captures(markdown)
        .map(|caps| caps[1].trim().to_string())
        .filter(|sql| !sql.is_empty())
}

/// Whether `sql` is a single statement that cannot modify the database.
pub fn is_read_only(sql: &str) -> bool {
    static WRITE: OnceLock<Regex> = OnceLock::new();
    static REPLACE_INTO: OnceLock<Regex> = OnceLock::new();

    let stripped = quoted_span().replace_all(sql, "''");
    let stripped = block_comment().replace_all(&stripped, " ");
    let stripped = line_comment().replace_all(&stripped, " ");
    let body = stripped.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    if body.is_empty() || body.contains(';') {
        return false;
    }

    let leader = body
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_uppercase();
    if !READ_ONLY_LEADERS.contains(&leader.as_str()) {
        return false;
    }
    // `PRAGMA name = value` changes settings.
    if leader == "PRAGMA" && body.contains('=') {
        return false;
    }

    let write = compiled(
        &WRITE,
        r"(?i)\b(insert|update|delete|drop|alter|create|attach|detach|vacuum|reindex)\b",
    );
    // REPLACE is also a scalar function, so only the statement form counts.
    let replace_into = compiled(&REPLACE_INTO, r"(?i)\breplace\s+into\b");
    !write.is_match(body) && !replace_into.is_match(body)
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Cache key for a query: SHA-256 of the whitespace-normalised text.
pub fn query_key(sql: &str) -> String {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
