// Database tools offered to the model.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::client::ToolCall;

pub const LIST_TABLES: &str = "list_tables";
pub const DESCRIBE_TABLE: &str = "describe_table";
pub const RUN_SQL_QUERY: &str = "run_sql_query";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },

    #[error("invalid arguments for `{name}`: {message}")]
    InvalidArguments { name: String, message: String },
}

/// Tool definitions in chat-completions `tools` form.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": LIST_TABLES,
                "description": "List all tables in the medical practice database with their row counts.",
                "parameters": { "type": "object", "properties": {} }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": DESCRIBE_TABLE,
                "description": "Show the columns, relationships and sample rows of one table.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "table_name": { "type": "string", "description": "Exact table name" }
                    },
                    "required": ["table_name"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": RUN_SQL_QUERY,
                "description": "Run a read-only SQLite SELECT query and return the rows as a markdown table.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "A single SELECT statement" },
                        "limit": { "type": "integer", "description": "Maximum rows to return (default 100)" }
                    },
                    "required": ["query"]
                }
            }
        }),
    ]
}

/// A validated tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    ListTables,
    DescribeTable { table_name: String },
    RunSqlQuery { query: String, limit: Option<usize> },
}

#[derive(Deserialize)]
struct DescribeArgs {
    table_name: String,
}

#[derive(Deserialize)]
struct RunSqlArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

impl ToolInvocation {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        let name = call.function.name.as_str();
        let raw = match call.function.arguments.trim() {
            "" | "null" => "{}",
            other => other,
        };
        let invalid = |message: String| ToolError::InvalidArguments {
            name: name.to_string(),
            message,
        };

        match name {
            LIST_TABLES => Ok(ToolInvocation::ListTables),
            DESCRIBE_TABLE => {
                let args: DescribeArgs =
                    serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
                if args.table_name.trim().is_empty() {
                    return Err(invalid("table_name must not be empty".into()));
                }
                Ok(ToolInvocation::DescribeTable {
                    table_name: args.table_name.trim().to_string(),
                })
            }
            RUN_SQL_QUERY => {
                let args: RunSqlArgs =
                    serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
                if args.query.trim().is_empty() {
                    return Err(invalid("query must not be empty".into()));
                }
                Ok(ToolInvocation::RunSqlQuery {
                    query: args.query,
                    limit: args.limit,
                })
            }
            other => Err(ToolError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::ListTables => LIST_TABLES,
            ToolInvocation::DescribeTable { .. } => DESCRIBE_TABLE,
            ToolInvocation::RunSqlQuery { .. } => RUN_SQL_QUERY,
        }
    }

    /// One-line description for activity displays.
    pub fn summary(&self) -> String {
        match self {
            ToolInvocation::ListTables => "list tables".to_string(),
            ToolInvocation::DescribeTable { table_name } => format!("describe {table_name}"),
            ToolInvocation::RunSqlQuery { query, .. } => {
                let flat = query.split_whitespace().collect::<Vec<_>>().join(" ");
                let mut short: String = flat.chars().take(80).collect();
                if flat.chars().count() > 80 {
                    short.push('…');
                }
                format!("run {short}")
            }
        }
    }
}
