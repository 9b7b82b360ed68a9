use serde::{Deserialize, Serialize};

/// A single issue reported by a line-oriented engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 1-based line number (0 when the finding is not tied to a line).
    pub line: u32,
    pub issue_type: String,
    pub description: String,
    pub recommendation: String,
}

impl Finding {
    pub fn new(
        line: u32,
        issue_type: impl Into<String>,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            line,
            issue_type: issue_type.into(),
            description: description.into(),
            recommendation: recommendation.into(),
        }
    }
}
