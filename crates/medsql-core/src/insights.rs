// Data-quality notes appended to answers.

use crate::db::QueryResult;

const NO_RESULTS_NOTE: &str = "
### Data Quality Note
No results were found. This could be due to:
- The search criteria being too specific
- Possible data entry inconsistencies in the database
- The information may not be recorded in the system

Consider broadening your search terms or checking alternative spellings.
";

const LARGE_RESULT_NOTE: &str = "
### Data Interpretation Note
A large number of results were returned. Consider:
- Adding more specific filters to narrow your search
- Looking for patterns or trends in the data rather than individual records
- Exporting the results for further analysis if needed
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityNote {
    NoResults,
    LargeResult,
}

impl QualityNote {
    pub fn markdown(self) -> &'static str {
        match self {
            QualityNote::NoResults => NO_RESULTS_NOTE,
            QualityNote::LargeResult => LARGE_RESULT_NOTE,
        }
    }
}

/// Pick the note for an answer, if any. Empty results win over large ones.
pub fn detect_quality_note(content: &str, last_result: Option<&QueryResult>) -> Option<QualityNote> {
    let lower = content.to_lowercase();

    let empty = lower.contains("no results")
        || lower.contains("no rows")
        || last_result.is_some_and(|r| r.is_empty() && !r.columns.is_empty());
    if empty {
        return Some(QualityNote::NoResults);
    }

    let large = lower.contains("many results")
        || lower.contains("large number")
        || last_result.is_some_and(|r| r.truncated);
    large.then_some(QualityNote::LargeResult)
}

pub fn append_data_quality_insights(content: &str, last_result: Option<&QueryResult>) -> String {
    match detect_quality_note(content, last_result) {
        Some(note) => format!("{content}{}", note.markdown()),
        None => content.to_string(),
    }
}
