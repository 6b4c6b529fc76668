//! The region/effect ledger records the abstract memory regions a case touches and the
//! operations ("effects") performed on them, together with the payload of the run.
//!
//! A [`Ledger`] is owned by exactly one run at a time and is threaded by `&mut` through the
//! exposure, the [`crate::context::CaseContext`] and the [`crate::adapter::CaseAdapter`].

use core::fmt::{self, Display};
use std::path::Path;

use chainbench_bolts::Error;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::payload::Payload;

/// The memory segment a region lives in
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Segment {
    /// Dynamically allocated memory
    Heap,
    /// Stack memory
    Stack,
    /// Static or global data
    Data,
    /// Anything else
    Other,
}

/// What an effect does to its region
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Action {
    /// A memory read
    Read,
    /// A memory write
    Write,
    /// A security relevant non-memory operation, such as an arithmetic operation
    Trigger,
}

/// The id of a [`Region`], unique and strictly increasing within a run
#[repr(transparent)]
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegionId(pub u32);

impl Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous abstract memory area. Immutable once created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    segment: Segment,
    offset: u64,
    size: u64,
}

impl Region {
    /// The id of this region
    #[must_use]
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// The segment of this region
    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// The base offset of this region
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The extent of this region
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// An operation performed against a [`Region`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    /// The region this effect targets
    pub region: RegionId,
    /// Byte offset within the region
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
    /// What happened
    pub action: Action,
}

/// The counters of a [`Ledger`], printed at the end of a run for the scoring tools
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReport {
    /// Number of regions created
    pub regions: usize,
    /// Number of effects pushed
    pub effects: usize,
    /// Number of payload bytes held
    pub payload_len: usize,
    /// Whether the payload source was larger than the buffer
    pub payload_truncated: bool,
}

impl Display for LedgerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[CB] single_done effects={} regions={} payload_len={}",
            self.effects, self.regions, self.payload_len
        )?;
        if self.payload_truncated {
            write!(f, " payload_truncated=1")?;
        }
        Ok(())
    }
}

/// A serializable view of everything a [`Ledger`] recorded
#[derive(Debug, Serialize)]
pub struct LedgerSnapshot<'a> {
    /// All regions, in creation order
    pub regions: &'a [Region],
    /// All effects, in push order
    pub effects: &'a [Effect],
    /// The counters
    pub report: LedgerReport,
}

/// Records regions and effects of a single run, and holds its payload
#[derive(Debug, Clone)]
pub struct Ledger {
    regions: Vec<Region>,
    effects: Vec<Effect>,
    payload: Payload,
}

impl Ledger {
    /// Creates an empty ledger with a payload buffer of `payload_capacity` bytes.
    pub fn new(payload_capacity: usize) -> Result<Self, Error> {
        Ok(Self {
            regions: Vec::new(),
            effects: Vec::new(),
            payload: Payload::new(payload_capacity)?,
        })
    }

    /// Zeroes the payload and forgets all regions and effects.
    /// Call once before each independent run; calling it again is harmless.
    pub fn reset(&mut self) {
        self.regions.clear();
        self.effects.clear();
        self.payload.zero();
    }

    /// Registers a new region and returns its id.
    ///
    /// Regions may overlap or alias each other; no validation is done here.
    pub fn create_region(
        &mut self,
        segment: Segment,
        offset: u64,
        size: u64,
    ) -> Result<RegionId, Error> {
        // ids are indices, so they increase strictly within a run
        let id = RegionId(u32::try_from(self.regions.len())?);
        self.regions.push(Region {
            id,
            segment,
            offset,
            size,
        });
        log::trace!("region {id}: {segment} offset={offset} size={size}");
        Ok(id)
    }

    /// Appends an effect against `region`.
    ///
    /// Fails with [`Error::InvalidRegion`] if `region` was not created in this run.
    pub fn push_effect(
        &mut self,
        region: RegionId,
        offset: u64,
        len: u64,
        action: Action,
    ) -> Result<(), Error> {
        if self.region(region).is_none() {
            log::error!("effect {action} pushed against unknown region {region}");
            return Err(Error::invalid_region(region.0));
        }
        self.effects.push(Effect {
            region,
            offset,
            len,
            action,
        });
        log::trace!("effect on region {region}: {action} offset={offset} len={len}");
        Ok(())
    }

    /// The region with the given id, if it was created in this run
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize)
    }

    /// All regions, in creation order
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// All effects, in push order
    #[must_use]
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// The payload of this run
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The payload of this run, mutable
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Loads the payload from `path`, see [`Payload::load_file`].
    pub fn load_payload<P>(&mut self, path: P) -> Result<bool, Error>
    where
        P: AsRef<Path>,
    {
        self.payload.load_file(path)
    }

    /// The counters of this ledger
    #[must_use]
    pub fn report(&self) -> LedgerReport {
        LedgerReport {
            regions: self.regions.len(),
            effects: self.effects.len(),
            payload_len: self.payload.len(),
            payload_truncated: self.payload.is_truncated(),
        }
    }

    /// A serializable view of this ledger
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot<'_> {
        LedgerSnapshot {
            regions: &self.regions,
            effects: &self.effects,
            report: self.report(),
        }
    }
}
