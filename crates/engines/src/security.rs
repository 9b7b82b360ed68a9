//! Core security heuristics over Solidity source.

use std::sync::LazyLock;

use regex::Regex;

use sentinel_core::{AnalysisJob, AnalysisKind};

use crate::engine::{AnalysisEngine, EngineError};
use crate::finding::Finding;
use crate::scan::{LineRule, line_no, require_contract};

static TX_ORIGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\btx\.origin\b").expect("static regex"));
static SELFDESTRUCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(selfdestruct|suicide)\s*\(").expect("static regex"));
static DELEGATECALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.delegatecall\s*[({]").expect("static regex"));
static LOW_LEVEL_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.call\s*[({]").expect("static regex"));
static WEAK_RANDOMNESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"keccak256\s*\(.*\bblock\.(timestamp|difficulty|prevrandao)\b|\bblock\.(timestamp|difficulty|prevrandao)\b\s*%")
        .expect("static regex")
});
static FLOATING_PRAGMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pragma\s+solidity\s*[\^>]").expect("static regex"));

/// Pattern-based security review.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityEngine;

impl AnalysisEngine for SecurityEngine {
    type Output = Vec<Finding>;

    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Security
    }

    fn analyze(&self, job: &AnalysisJob) -> Result<Self::Output, EngineError> {
        require_contract(job)?;

        let rules = [
            LineRule {
                pattern: &TX_ORIGIN,
                issue_type: "tx.origin Authorization",
                description: "`tx.origin` is used; it identifies the original sender, not the immediate caller.",
                recommendation: "Use `msg.sender` for authorization checks. `tx.origin` checks can be bypassed through an intermediate contract.",
            },
            LineRule {
                pattern: &SELFDESTRUCT,
                issue_type: "Self-Destruct",
                description: "The contract can destroy itself.",
                recommendation: "Remove `selfdestruct` or gate it behind strict, audited access control.",
            },
            LineRule {
                pattern: &DELEGATECALL,
                issue_type: "Delegatecall",
                description: "`delegatecall` executes foreign code against this contract's storage.",
                recommendation: "Only delegate to trusted, immutable targets and never to user-supplied addresses.",
            },
            LineRule {
                pattern: &WEAK_RANDOMNESS,
                issue_type: "Weak Randomness",
                description: "Block attributes are used as a source of randomness.",
                recommendation: "Block values are observable and partially controllable. Use a verifiable randomness source.",
            },
            LineRule {
                pattern: &FLOATING_PRAGMA,
                issue_type: "Floating Pragma",
                description: "The compiler version is not pinned.",
                recommendation: "Pin the exact compiler version the contract was tested with.",
            },
        ];

        let mut findings = Vec::new();
        for rule in &rules {
            rule.scan(&job.source_payload, &mut findings);
        }

        for (i, line) in job.source_payload.lines().enumerate() {
            if LOW_LEVEL_CALL.is_match(line) && !line.contains('=') && !line.contains("require(") {
                findings.push(Finding::new(
                    line_no(i),
                    "Unchecked Low-Level Call",
                    "The success flag of a low-level call is ignored.",
                    "Capture the return value (`(bool ok, ) = addr.call(...)`) and `require(ok)`.",
                ));
            }
        }

        findings.sort_by_key(|f| f.line);
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Vec<Finding> {
        SecurityEngine
            .analyze(&AnalysisJob::new(AnalysisKind::Security, src))
            .unwrap()
    }

    #[test]
    fn clean_contract_has_no_findings() {
        assert!(run("contract X{}").is_empty());
    }

    #[test]
    fn flags_tx_origin_and_unchecked_call() {
        let src = "pragma solidity ^0.8.0;\ncontract W {\n  function w(address a) external {\n    require(tx.origin == owner);\n    a.call{value: 1}(\"\");\n  }\n}";
        let findings = run(src);
        let types: Vec<_> = findings.iter().map(|f| f.issue_type.as_str()).collect();

        assert_eq!(
            types,
            vec!["Floating Pragma", "tx.origin Authorization", "Unchecked Low-Level Call"]
        );
        assert_eq!(findings[1].line, 4);
        assert_eq!(findings[2].line, 5);
    }

    #[test]
    fn checked_call_is_not_flagged() {
        let src = "contract W {\n (bool ok, ) = a.call(\"\");\n}";
        assert!(run(src).is_empty());
    }

    #[test]
    fn rejects_non_solidity_input() {
        let err = SecurityEngine
            .analyze(&AnalysisJob::new(AnalysisKind::Security, "hello"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
