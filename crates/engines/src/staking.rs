//! Staking precompile interaction checks.

use std::sync::LazyLock;

use regex::Regex;

use sentinel_core::{AnalysisJob, AnalysisKind};

use crate::engine::{AnalysisEngine, EngineError};
use crate::finding::Finding;
use crate::scan::{enclosing_function, line_no, require_contract};

const STAKING_PRECOMPILES: &[(&str, &str)] =
    &[("0x0100000000000000000000000000000000000000", "P-Chain Handler")];

static PAYABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpayable\b").expect("static regex"));
static LOW_LEVEL_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(call|delegatecall|staticcall)\s*[({]").expect("static regex"));
static ACCESS_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(onlyOwner|onlyRole|_checkRole)\b|require\s*\(\s*msg\.sender\s*==")
        .expect("static regex")
});
static EXTERNALLY_VISIBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(public|external)\b").expect("static regex"));

/// Reviews direct use of staking precompiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct StakingPrecompileEngine;

impl AnalysisEngine for StakingPrecompileEngine {
    type Output = Vec<Finding>;

    fn kind(&self) -> AnalysisKind {
        AnalysisKind::StakingPrecompile
    }

    fn analyze(&self, job: &AnalysisJob) -> Result<Self::Output, EngineError> {
        require_contract(job)?;

        let lines: Vec<&str> = job.source_payload.lines().collect();
        let mut findings = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let lowered = line.to_lowercase();
            for (address, name) in STAKING_PRECOMPILES {
                if !lowered.contains(address) {
                    continue;
                }

                let line_num = line_no(i);
                findings.push(Finding::new(
                    line_num,
                    "P-Chain Precompile Interaction",
                    format!("Direct interaction with the {name} precompile detected."),
                    "This is a powerful, low-level operation. Review its correctness and security properties.",
                ));

                let signature = enclosing_function(&lines, i).map(|j| lines[j]).unwrap_or("");

                if !PAYABLE.is_match(signature) {
                    findings.push(Finding::new(
                        line_num,
                        "Missing Payable Modifier",
                        format!(
                            "The function containing the precompile call ('{}') is not marked `payable`.",
                            signature.trim()
                        ),
                        "Functions that forward value to staking precompiles must be `payable`.",
                    ));
                }

                if LOW_LEVEL_CALL.is_match(line) && !line.contains("require(") && !line.contains('=') {
                    findings.push(Finding::new(
                        line_num,
                        "Unchecked Return Value",
                        "The return value of a low-level call to a precompile is not checked.",
                        "Check the `success` flag and `require(success)` to prevent silent failures.",
                    ));
                }

                if EXTERNALLY_VISIBLE.is_match(signature)
                    && !ACCESS_CONTROL.is_match(signature)
                    && !guarded_body(&lines, i)
                {
                    findings.push(Finding::new(
                        line_num,
                        "Weak Access Control",
                        "A public/external function interacting with a staking precompile lacks explicit access control.",
                        "Restrict staking state changes (e.g. `onlyOwner`, multi-sig or governance).",
                    ));
                }
            }
        }

        Ok(findings)
    }
}

/// Whether an access-control check appears between the enclosing function's
/// start and the end of its body (first closing brace after `at`).
fn guarded_body(lines: &[&str], at: usize) -> bool {
    let start = enclosing_function(lines, at).unwrap_or(at);
    for line in &lines[start..] {
        if ACCESS_CONTROL.is_match(line) {
            return true;
        }
        if line.contains('}') {
            break;
        }
    }
    false
}
