//! The seeded vulnerable routines of the benchmark.
//!
//! Every case keeps the flawed logic of its Juliet test case, draws the one value the symbolic
//! backend may control through [`chainbench::context::CaseContext::next_value`] and checks
//! its safety property right before the unsafe operation.
#![cfg_attr(not(test), warn(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
))]

use std::process;

use chainbench::{adapter::CaseDescriptor, registry::CaseRegistry, Error};
use chainbench_bolts::EXIT_ALLOC_FAILURE;

pub mod cwe122_char_memcpy;
pub mod cwe122_wchar_memmove;
pub mod cwe190_int_fscanf_multiply;

/// All cases of this crate
pub const CASES: &[CaseDescriptor] = &[
    cwe122_char_memcpy::CASE,
    cwe122_wchar_memmove::CASE,
    cwe190_int_fscanf_multiply::CASE,
];

/// A registry holding all [`CASES`]
pub fn registry() -> Result<CaseRegistry, Error> {
    let mut registry = CaseRegistry::new();
    for desc in CASES {
        registry.register(*desc)?;
    }
    Ok(registry)
}

/// Allocates `len` elements set to `fill`. Exits with [`EXIT_ALLOC_FAILURE`] if the
/// allocation fails, like the Juliet cases do when `malloc` returns `NULL`.
pub(crate) fn alloc_buffer<T: Copy>(len: usize, fill: T) -> Vec<T> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(len).is_err() {
        log::error!("allocating {len} elements failed");
        process::exit(EXIT_ALLOC_FAILURE);
    }
    buf.resize(len, fill);
    buf
}

/// Prints a NUL terminated byte string and a newline
pub(crate) fn print_line(bytes: &[u8]) {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    println!("{}", String::from_utf8_lossy(&bytes[..end]));
}

/// Prints a NUL terminated wide string and a newline
pub(crate) fn print_wide_line(wide: &[u32]) {
    let line: String = wide
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| char::from_u32(*c).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::{registry, CASES};

    #[test]
    fn test_registry_holds_all_cases() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), CASES.len());
        for desc in CASES {
            assert_eq!(registry.get(desc.id).unwrap().cwe, desc.cwe);
            assert!(desc.good.is_some());
        }
    }
}
