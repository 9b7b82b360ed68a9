//! Consensus/finality assumptions that do not carry over to slower chains.

use std::sync::LazyLock;

use regex::Regex;

use sentinel_core::{AnalysisJob, AnalysisKind};

use crate::engine::{AnalysisEngine, EngineError};
use crate::finding::Finding;
use crate::scan::{line_no, require_contract};

static COMMIT_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s+(commit|register|submit)\s*\(\s*bytes32").expect("static regex")
});
static REVEAL_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"function\s+(reveal|claim|solve)\s*\(").expect("static regex"));
static BLOCK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bblock\.number\b").expect("static regex"));
static SPOT_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(getReserves|token0|token1|balanceOf)\s*\(\s*\)").expect("static regex")
});
static PRICE_FEED_CONTRACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"contract\s+[A-Za-z0-9_]+\s+is\s+(AggregatorV3Interface|Chainlink|PriceOracle)")
        .expect("static regex")
});
static CRITICAL_SETTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s+(set|change)(Admin|Owner|Pauser|Operator)\s*\(").expect("static regex")
});
static TIME_LOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(block\.timestamp|block\.number)\b.*(>=|>)").expect("static regex")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsensusComplianceEngine;

impl AnalysisEngine for ConsensusComplianceEngine {
    type Output = Vec<Finding>;

    fn kind(&self) -> AnalysisKind {
        AnalysisKind::ConsensusCompliance
    }

    fn analyze(&self, job: &AnalysisJob) -> Result<Self::Output, EngineError> {
        require_contract(job)?;

        let code = job.source_payload.as_str();
        let mut findings = Vec::new();

        if COMMIT_FN.is_match(code) && REVEAL_FN.is_match(code) && !BLOCK_NUMBER.is_match(code) {
            findings.push(Finding::new(
                first_line_matching(code, &REVEAL_FN),
                "Reorg Safety Hazard (Implicit Finality Assumption)",
                "A commit-reveal scheme does not use `block.number` to enforce a delay between phases.",
                "Safe under fast finality, but reorg-prone elsewhere. Enforce a block delay between commit and reveal.",
            ));
        }

        if !PRICE_FEED_CONTRACT.is_match(code) {
            for (i, line) in code.lines().enumerate() {
                if SPOT_PRICE.is_match(line) {
                    findings.push(Finding::new(
                        line_no(i),
                        "Spot Price Oracle Hazard",
                        "Direct read of a DEX spot price detected; vulnerable to flash-loan manipulation.",
                        "Use a TWAP or a decentralized oracle network for price feeds.",
                    ));
                }
            }
        }

        if CRITICAL_SETTER.is_match(code) && !TIME_LOCK.is_match(code) {
            findings.push(Finding::new(
                first_line_matching(code, &CRITICAL_SETTER),
                "Multi-Transaction Dependency Hazard",
                "A critical role can be reassigned and used immediately, without a time-lock.",
                "Use a two-step, time-locked handover (propose, then accept after `block.timestamp + DELAY`).",
            ));
        }

        Ok(findings)
    }
}

fn first_line_matching(code: &str, re: &Regex) -> u32 {
    code.lines()
        .position(|l| re.is_match(l))
        .map(line_no)
        .unwrap_or(0)
}
