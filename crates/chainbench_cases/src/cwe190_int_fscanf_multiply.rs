//! CWE-190 integer overflow: an `int` read from stdin is doubled without a range check.

use chainbench::{
    adapter::{CaseDescriptor, VulnKind},
    context::CaseContext,
    ledger::{Action, Segment},
    safety_assert,
    symbolic::{Bounds, Site},
    Error,
};

use crate::print_line;

/// The case id
pub const ID: &str = "CWE190_Integer_Overflow__int_fscanf_multiply_01";

/// The scanned integer
pub const DATA: Site = Site::new(
    "data",
    Bounds::new_const(i32::MIN as i64, i32::MAX as i64),
);

/// The case descriptor
pub const CASE: CaseDescriptor = CaseDescriptor::new(
    ID,
    190,
    VulnKind::IntOverflow,
    Segment::Data,
    Action::Trigger,
    bad,
)
.with_good(good);

/// Scans a decimal `int` the way `fscanf("%d")` does: leading whitespace, an optional sign,
/// then digits. Input that does not scan, or does not fit an `int`, leaves the value at 0.
#[must_use]
pub fn scan_int(bytes: &[u8]) -> i32 {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start();
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.strip_prefix('+').unwrap_or(text)),
    };
    let len = rest.bytes().take_while(u8::is_ascii_digit).count();
    format!("{sign}{}", &rest[..len]).parse().unwrap_or(0)
}

fn read_data(ctx: &mut CaseContext<'_>) -> Result<i32, Error> {
    ctx.next_value(&DATA, |ctx| Ok(i64::from(scan_int(&ctx.stdin_bytes()?))))
}

/// Doubles any positive input
pub fn bad(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    let data = read_data(ctx)?;
    if data > 0 {
        safety_assert!(ctx, data <= i32::MAX / 2);
        let result = data * 2;
        print_line(result.to_string().as_bytes());
    }
    Ok(())
}

/// Only doubles inputs small enough to be doubled
pub fn good(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    let data = read_data(ctx)?;
    if data > 0 {
        if data < i32::MAX / 2 {
            safety_assert!(ctx, data <= i32::MAX / 2);
            let result = data * 2;
            print_line(result.to_string().as_bytes());
        } else {
            print_line(b"data value is too large to perform arithmetic safely.");
        }
    }
    Ok(())
}
