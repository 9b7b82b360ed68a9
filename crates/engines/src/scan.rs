//! Line-scanning helpers shared by the heuristic engines.

use std::sync::LazyLock;

use regex::Regex;

use sentinel_core::AnalysisJob;

use crate::engine::EngineError;
use crate::finding::Finding;

/// A regex checked against every source line independently.
pub(crate) struct LineRule {
    pub pattern: &'static LazyLock<Regex>,
    pub issue_type: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
}

impl LineRule {
    pub fn scan(&self, source: &str, out: &mut Vec<Finding>) {
        for (i, line) in source.lines().enumerate() {
            if self.pattern.is_match(line) {
                out.push(Finding::new(
                    line_no(i),
                    self.issue_type,
                    self.description,
                    self.recommendation,
                ));
            }
        }
    }
}

static CONTRACT_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(contract|library|interface)\s+[A-Za-z_][A-Za-z0-9_]*").expect("static regex"));

pub(crate) static FUNCTION_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\s+([A-Za-z0-9_]+)\s*\(").expect("static regex"));

/// Reject jobs that contain no Solidity unit at all.
pub(crate) fn require_contract(job: &AnalysisJob) -> Result<(), EngineError> {
    if CONTRACT_DECL.is_match(&job.source_payload) {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(
            "no contract, library or interface definition found".to_string(),
        ))
    }
}

/// Index of the nearest line at or above `from` that declares a function.
pub(crate) fn enclosing_function(lines: &[&str], from: usize) -> Option<usize> {
    (0..=from).rev().find(|&j| FUNCTION_DECL.is_match(lines[j]))
}

pub(crate) fn line_no(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use sentinel_core::AnalysisKind;

    use super::*;

    #[test]
    fn contract_required() {
        let ok = AnalysisJob::new(AnalysisKind::Security, "contract X {}");
        let bad = AnalysisJob::new(AnalysisKind::Security, "just some text");
        assert!(require_contract(&ok).is_ok());
        assert!(matches!(require_contract(&bad), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn finds_enclosing_function() {
        let src = ["contract X {", "  function a() public {", "    x();", "  }"];
        assert_eq!(enclosing_function(&src, 2), Some(1));
        assert_eq!(enclosing_function(&src, 0), None);
    }
}
