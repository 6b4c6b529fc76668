//! Reports of single runs, and chain records for the scoring tools.

use std::path::Path;

use chainbench_bolts::{fs::write_file_atomic, Error};
use serde::{Deserialize, Serialize};

use crate::{
    adapter::{CaseDescriptor, Variant, VulnKind},
    assertion::{Assignment, Violation},
    exposure::Channel,
    ledger::{Action, LedgerReport, Segment},
    symbolic::BuildMode,
};

/// The outcome of one harness run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The case id
    pub case: String,
    /// The variant that ran
    pub variant: Variant,
    /// The exposure channel
    pub channel: Channel,
    /// Where the site values came from
    pub mode: BuildMode,
    /// Whether the payload file existed
    pub payload_found: bool,
    /// The ledger counters at the end of the run
    pub ledger: LedgerReport,
    /// The violated property, if the run reported one
    pub violation: Option<Violation>,
}

impl RunReport {
    /// Returns `true` if the routine ran to completion without violating its property
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violation.is_none()
    }
}

/// Where a violated assertion lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Source file
    pub file: String,
    /// Source line
    pub line: u32,
}

/// A symbolic variable and the value of the counterexample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// The site name
    pub name: String,
    /// The value leading to the violation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

/// The effect recorded for the case
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    /// Segment of the region
    pub segment: Segment,
    /// Action of the effect
    pub action: Action,
}

/// One step of a vulnerability chain, as consumed by the chain scoring tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// The vulnerability class
    #[serde(rename = "type")]
    pub kind: VulnKind,
    /// The CWE number
    pub cwe: u32,
    /// The step name, the case id
    pub step: String,
    /// Location of the violated assertion
    pub location: Option<Location>,
    /// The symbolic variables
    pub variables: Vec<Variable>,
    /// The bounds assumed for the variables
    pub assumptions: Vec<String>,
    /// The assertion, as written
    pub assertion: String,
    /// The negated assertion, which the counterexample satisfies
    pub postcondition: String,
    /// The effect of the case
    pub effect: EffectRecord,
}

impl ChainRecord {
    /// Builds the record of `violation` for `desc`
    #[must_use]
    pub fn new(desc: &CaseDescriptor, violation: &Violation) -> Self {
        let symbolic: Vec<&Assignment> = violation
            .assignments
            .iter()
            .filter(|assignment| assignment.symbolic)
            .collect();
        let property = &violation.property;

        Self {
            kind: desc.kind,
            cwe: desc.cwe,
            step: desc.id.to_string(),
            location: Some(Location {
                file: property.file.to_string(),
                line: property.line,
            }),
            variables: symbolic
                .iter()
                .map(|assignment| Variable {
                    name: assignment.name.clone(),
                    value: Some(assignment.value),
                })
                .collect(),
            assumptions: symbolic
                .iter()
                .flat_map(|assignment| assignment.bounds.assumptions(&assignment.name))
                .collect(),
            assertion: format!("safety_assert!({})", property.expr),
            postcondition: property.postcondition(),
            effect: EffectRecord {
                segment: desc.segment,
                action: desc.action,
            },
        }
    }
}

/// Writes `records` as pretty JSON to `path`
pub fn write_chain_records<P>(path: P, records: &[ChainRecord]) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let json = serde_json::to_vec_pretty(records)?;
    write_file_atomic(path, &json)?;
    Ok(())
}
