// Prompt templates for answering practice-data questions.
//
// The user prompt carries the full schema (with sample rows) so most
// questions can be answered with a single `run_sql_query` call; the
// remaining tools let the model look things up when it needs more.

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

pub const AGENT_DESCRIPTION: &str = "You are a medical practice database expert who helps non-technical staff understand their practice data.";

/// Return the static system prompt for all question-answering calls.
pub fn system_prompt() -> String {
    format!(
        "{AGENT_DESCRIPTION}\n\
         \n\
         The practice data lives in a read-only SQLite database. You have three tools:\n\
         - list_tables: table names with row counts\n\
         - describe_table: columns, relationships and sample rows of one table\n\
         - run_sql_query: run a single SELECT statement and get the rows back\n\
         \n\
         Always run the SQL you propose with run_sql_query before describing its results; \
         never invent numbers. Only SELECT statements are allowed. \
         Write your final answer in markdown and include the SQL you ran in a ```sql block."
    )
}

// ---------------------------------------------------------------------------
// User prompt
// ---------------------------------------------------------------------------

pub const QUERY_GUIDANCE: &str = "\
# Query Requirements:
1. ALWAYS use DISTINCT when performing JOINs to avoid duplicate rows
2. Use LOWER() function for case-insensitive string comparisons
3. Use LIKE with wildcards (%) for partial string matching
4. Format dates consistently using strftime() function
5. When appropriate, include GROUP BY for aggregation
6. Use meaningful column aliases for better readability
7. Convert raw data into insights when appropriate
8. Limit result sets to a reasonable size (max 100 rows)
9. Add proper error handling for empty result sets

# Response Format:
0. Write the explanation in plain English with normal spacing between words
1. A brief explanation of how you're approaching the question
2. The SQL query (clearly formatted and with comments)
3. The results in a clean, readable format (use markdown tables for structured data)
4. A plain language explanation of what the results mean
5. (If applicable) Data quality issues identified in the results
6. (If applicable) Recommendations based on the data
";

/// Combine the rendered schema, the query guidance and the question.
pub fn build_user_prompt(schema_markdown: &str, question: &str) -> String {
    format!(
        "{schema_markdown}\n\
         \n\
         {QUERY_GUIDANCE}\n\
         User Query: {question}\n\
         \n\
         Respond with the information requested using the format above. Be thorough but concise.\n\
         Explain medical terminology and SQL concepts in simple terms that non-technical users can understand.\n"
    )
}
