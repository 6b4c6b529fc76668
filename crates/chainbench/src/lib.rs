/*!
Welcome to `ChainBench`
*/
#![doc = include_str!("../../../README.md")]
/*! */
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]
#![cfg_attr(not(test), warn(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
))]
#![cfg_attr(test, deny(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use,
))]

pub use chainbench_bolts as bolts;
pub use chainbench_bolts::Error;

pub mod adapter;
pub mod assertion;
pub mod context;
pub mod explore;
pub mod exposure;
pub mod harness;
pub mod ledger;
pub mod payload;
pub mod registry;
pub mod report;
pub mod symbolic;

/// The most used types, for routines and runners alike
pub mod prelude {
    pub use crate::{
        adapter::{CaseAdapter, CaseDescriptor, Routine, Variant, VulnKind},
        assertion::{OnViolation, Property, Violation},
        context::CaseContext,
        explore::{ExplorationReport, Explorer, ExplorerConfig},
        exposure::{Channel, Exposure, ExposedInput},
        harness::{Harness, HarnessConfig, EXIT_MISSING_PAYLOAD, EXIT_USAGE},
        ledger::{Action, Ledger, LedgerReport, RegionId, Segment},
        payload::Payload,
        registry::CaseRegistry,
        report::{ChainRecord, RunReport},
        safety_assert,
        symbolic::{BuildMode, Bounds, Site, ValueSource},
        Error,
    };
}
