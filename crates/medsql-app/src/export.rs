// Export of answers to markdown and CSV files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::info;

use medsql_core::db::{QueryResult, SqlValue};

use crate::agent::AgentAnswer;

/// Write `answer_<timestamp>.md` and, when the answer has a query result,
/// `answer_<timestamp>.csv` into `dir`. Returns the written paths.
pub fn export_answer(answer: &AgentAnswer, dir: &Path, now: DateTime<Local>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let stem = format!("answer_{}", now.format("%Y%m%d_%H%M%S"));
    let mut written = Vec::new();

    let md_path = dir.join(format!("{stem}.md"));
    fs::write(&md_path, render_markdown(answer, now))
        .with_context(|| format!("failed to write {}", md_path.display()))?;
    written.push(md_path);

    if let Some(result) = &answer.last_result {
        let csv_path = dir.join(format!("{stem}.csv"));
        write_csv(result, &csv_path)?;
        written.push(csv_path);
    }

    info!("Exported answer to {}", dir.display());
    Ok(written)
}

fn render_markdown(answer: &AgentAnswer, now: DateTime<Local>) -> String {
    let mut out = format!(
        "# {}\n\n_Exported {} · processed in {:.2} seconds_\n\n{}\n",
        answer.question,
        now.format("%Y-%m-%d %H:%M:%S"),
        answer.elapsed.as_secs_f64(),
        answer.markdown.trim_end()
    );
    if let Some(sql) = &answer.sql {
        if answer.markdown.contains(sql.as_str()) {
            return out;
        }
        out.push_str(&format!("\n## SQL\n\n```sql\n{sql}\n```\n"));
    }
    out
}

fn write_csv(result: &QueryResult, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer
        .write_record(&result.columns)
        .context("failed to write CSV header")?;
    for row in &result.rows {
        writer
            .write_record(row.iter().map(csv_field))
            .context("failed to write CSV row")?;
    }
    writer.flush().context("failed to flush CSV")?;
    Ok(())
}

fn csv_field(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone;
    use medsql_llm::client::Usage;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("medsql-export-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn answer(result: Option<QueryResult>) -> AgentAnswer {
        AgentAnswer {
            question: "List all purchase orders from Medline Industries".into(),
            response: "Two orders were found.".into(),
            markdown: "Two orders were found.".into(),
            sql: Some("SELECT po_number FROM purchase_orders".into()),
            improved_sql: None,
            rewrite_notes: Vec::new(),
            last_result: result.map(Arc::new),
            tool_calls: Vec::new(),
            elapsed: Duration::from_millis(1500),
            usage: Usage::default(),
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn writes_markdown_and_csv() {
        let dir = temp_dir("both");
        let result = QueryResult {
            columns: vec!["po_number".into(), "vendor".into()],
            rows: vec![
                vec![SqlValue::Text("PO-1001".into()), SqlValue::Text("Medline, Inc".into())],
                vec![SqlValue::Text("PO-1002".into()), SqlValue::Null],
            ],
            truncated: false,
        };

        let paths = export_answer(&answer(Some(result)), &dir, fixed_time()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("answer_20250314_092653.md"));
        assert!(paths[1].ends_with("answer_20250314_092653.csv"));

        let md = fs::read_to_string(&paths[0]).unwrap();
        assert!(md.starts_with("# List all purchase orders from Medline Industries\n"));
        assert!(md.contains("processed in 1.50 seconds"));
        assert!(md.contains("```sql\nSELECT po_number FROM purchase_orders\n```"));

        let csv = fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(
            csv,
            "po_number,vendor\nPO-1001,\"Medline, Inc\"\nPO-1002,\n"
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn markdown_only_without_result() {
        let dir = temp_dir("md");
        let paths = export_answer(&answer(None), &dir, fixed_time()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].extension().is_some_and(|e| e == "md"));
        let _ = fs::remove_dir_all(&dir);
    }
}
