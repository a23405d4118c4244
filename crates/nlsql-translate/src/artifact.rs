//! Translation output: executable SQL or an explicit refusal/failure

use serde::{Deserialize, Serialize};

/// Marker the model is instructed to start a refusal with
pub const REFUSAL_MARKER: &str = "ERROR:";

/// Result of a translation strategy
///
/// Only [`SqlArtifact::Sql`] may ever reach the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum SqlArtifact {
    /// Cleaned SQL text, no fences or surrounding whitespace
    Sql(String),
    /// The model judged the question unanswerable, off-topic, vague or unsafe
    Refused(String),
    /// Transport, quota, timeout or malformed-response failure
    Failed(String),
}

impl SqlArtifact {
    /// Classify raw model text
    pub fn from_model_text(raw: &str) -> Self {
        let sql = clean_sql(raw);
        if sql.is_empty() {
            return SqlArtifact::Failed("Model returned an empty response".to_string());
        }
        match refusal_reason(&sql) {
            Some(reason) => SqlArtifact::Refused(reason),
            None => SqlArtifact::Sql(sql),
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            SqlArtifact::Sql(sql) => Some(sql),
            _ => None,
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, SqlArtifact::Sql(_))
    }

    /// Outcome label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            SqlArtifact::Sql(_) => "sql",
            SqlArtifact::Refused(_) => "refused",
            SqlArtifact::Failed(_) => "failed",
        }
    }
}

/// Strip markdown code fences and surrounding whitespace
pub fn clean_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```SQL"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}

/// Reason text when the model answered with the refusal marker
fn refusal_reason(text: &str) -> Option<String> {
    let unquoted = text.trim_matches(|c: char| c == '"' || c == '\'').trim_start();
    let head = unquoted.get(..REFUSAL_MARKER.len())?;
    if !head.eq_ignore_ascii_case(REFUSAL_MARKER) {
        return None;
    }
    let reason = unquoted[REFUSAL_MARKER.len()..].trim();
    Some(if reason.is_empty() {
        "The question cannot be answered from this database".to_string()
    } else {
        reason.to_string()
    })
}
