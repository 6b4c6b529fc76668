//! The uniform entrypoint contract of a case, and the one adapter that runs all of them.

use core::fmt::{self, Debug};

use chainbench_bolts::Error;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::{
    context::CaseContext,
    ledger::{Action, Segment},
};

/// A routine of a case
pub type Routine = fn(&mut CaseContext<'_>) -> Result<(), Error>;

/// Which routine of a case to run
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Variant {
    /// The flawed routine
    #[default]
    Bad,
    /// The fixed routine
    Good,
}

/// The vulnerability class a case belongs to, used in chain records
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VulnKind {
    /// Out of bounds write on the heap
    HeapOverflow,
    /// Arithmetic overflow
    IntOverflow,
}

/// Describes a case: its metadata, the region and effect the adapter records, and its routines
#[derive(Copy, Clone)]
pub struct CaseDescriptor {
    /// The unique id of this case
    pub id: &'static str,
    /// The CWE number, such as `122`
    pub cwe: u32,
    /// The vulnerability class
    pub kind: VulnKind,
    /// Segment of the region the adapter creates
    pub segment: Segment,
    /// Action of the effect the adapter pushes
    pub action: Action,
    /// Offset of the region the adapter creates
    pub region_offset: u64,
    /// Size of the region the adapter creates
    pub region_size: u64,
    /// Offset of the effect the adapter pushes
    pub effect_offset: u64,
    /// Length of the effect the adapter pushes
    pub effect_len: u64,
    /// The flawed routine
    pub bad: Routine,
    /// The fixed routine, if the case has one
    pub good: Option<Routine>,
}

impl Debug for CaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseDescriptor")
            .field("id", &self.id)
            .field("cwe", &self.cwe)
            .field("kind", &self.kind)
            .field("segment", &self.segment)
            .field("action", &self.action)
            .field("has_good", &self.good.is_some())
            .finish_non_exhaustive()
    }
}

impl CaseDescriptor {
    /// Creates a descriptor recording a one byte region and an empty effect
    #[must_use]
    pub const fn new(
        id: &'static str,
        cwe: u32,
        kind: VulnKind,
        segment: Segment,
        action: Action,
        bad: Routine,
    ) -> Self {
        Self {
            id,
            cwe,
            kind,
            segment,
            action,
            region_offset: 0,
            region_size: 1,
            effect_offset: 0,
            effect_len: 0,
            bad,
            good: None,
        }
    }

    /// Adds the fixed routine
    #[must_use]
    pub const fn with_good(mut self, good: Routine) -> Self {
        self.good = Some(good);
        self
    }

    /// The variants this case offers
    #[must_use]
    pub fn variants(&self) -> Vec<Variant> {
        if self.good.is_some() {
            vec![Variant::Bad, Variant::Good]
        } else {
            vec![Variant::Bad]
        }
    }

    /// The routine for `variant`
    pub fn routine(&self, variant: Variant) -> Result<Routine, Error> {
        match variant {
            Variant::Bad => Ok(self.bad),
            Variant::Good => self
                .good
                .ok_or_else(|| Error::key_not_found(format!("case {} has no good variant", self.id))),
        }
    }
}

/// Runs any case under the same contract
#[derive(Debug, Default, Copy, Clone)]
pub struct CaseAdapter;

impl CaseAdapter {
    /// Records the region and the effect of `desc`, then invokes `variant`.
    pub fn run(desc: &CaseDescriptor, variant: Variant, ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let routine = desc.routine(variant)?;

        let ledger = ctx.ledger();
        let region = ledger.create_region(desc.segment, desc.region_offset, desc.region_size)?;
        ledger.push_effect(region, desc.effect_offset, desc.effect_len, desc.action)?;

        log::debug!("running {} ({variant})", desc.id);
        routine(ctx)
    }
}
