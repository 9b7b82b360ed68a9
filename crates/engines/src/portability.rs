//! Subnet portability checks: assumptions that only hold on the C-Chain.

use std::sync::LazyLock;

use regex::Regex;

use sentinel_core::{AnalysisJob, AnalysisKind};

use crate::engine::{AnalysisEngine, EngineError};
use crate::finding::Finding;
use crate::scan::{LineRule, line_no, require_contract};

const CCHAIN_ONLY_ADDRESSES: &[(&str, &str)] = &[
    ("0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10", "Trader Joe V1 Router"),
    ("0x60aE616a2155Ee3d9A68541Ba4544862310933d4", "Trader Joe V2 Router"),
    ("0xE54Ca86531e17Ef3616d22Ca28b0D458b6C89106", "Pangolin Router"),
    ("0xd00ae08403B959254dbA1188b832b412A4461b95", "Benqi Lending Market (qiAVAX)"),
    ("0x2b2C81e08f1Af8835a78Bb2A90AE924ACE0eA4be", "Aave V2 Lending Pool"),
];

static CHAINID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bchainid\b").expect("static regex"));
static MSG_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmsg\.value\b").expect("static regex"));
static BALANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.balance\b").expect("static regex"));
static HARDCODED_GAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.call\s*\{\s*gas\s*:").expect("static regex"));

#[derive(Debug, Default, Clone, Copy)]
pub struct SubnetPortabilityEngine;

impl AnalysisEngine for SubnetPortabilityEngine {
    type Output = Vec<Finding>;

    fn kind(&self) -> AnalysisKind {
        AnalysisKind::SubnetPortability
    }

    fn analyze(&self, job: &AnalysisJob) -> Result<Self::Output, EngineError> {
        require_contract(job)?;

        let rules = [
            LineRule {
                pattern: &CHAINID,
                issue_type: "Hardcoded Chain Assumption",
                description: "The `chainid` opcode was used.",
                recommendation: "Avoid `chainid` in core logic; on a new Subnet the value differs and may break the contract.",
            },
            LineRule {
                pattern: &MSG_VALUE,
                issue_type: "Native Token Assumption",
                description: "`msg.value` assumes a native, value-bearing token.",
                recommendation: "Many Subnets use a valueless or absent native token; logic relying on `msg.value > 0` may not be portable.",
            },
            LineRule {
                pattern: &BALANCE,
                issue_type: "Native Token Assumption",
                description: "`.balance` assumes a native, value-bearing token.",
                recommendation: "The native token of a custom Subnet may not be AVAX; balance checks may not behave as expected.",
            },
            LineRule {
                pattern: &HARDCODED_GAS,
                issue_type: "Hardcoded Gas Amount",
                description: "A low-level call with a hardcoded gas amount was detected.",
                recommendation: "Subnets may price opcodes differently. Avoid hardcoding gas.",
            },
        ];

        let mut findings = Vec::new();
        for rule in &rules {
            rule.scan(&job.source_payload, &mut findings);
        }

        for (i, line) in job.source_payload.lines().enumerate() {
            let lowered = line.to_lowercase();
            for (address, name) in CCHAIN_ONLY_ADDRESSES {
                if lowered.contains(&address.to_lowercase()) {
                    findings.push(Finding::new(
                        line_no(i),
                        "C-Chain Dependency",
                        format!("A hardcoded address for a known C-Chain protocol ({name}) was found."),
                        "This contract will not exist on a new Subnet. Pass protocol addresses in the constructor or a setter.",
                    ));
                }
            }
        }

        findings.sort_by_key(|f| f.line);
        Ok(findings)
    }
}
