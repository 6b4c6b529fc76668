//! The safety-property assertion, evaluated once per case right before the unsafe operation.

use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::symbolic::Bounds;

/// What happens when a safety property does not hold
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OnViolation {
    /// Abort the process, like a failed C `assert`
    #[default]
    Abort,
    /// Record the violation and unwind the routine with [`chainbench_bolts::Error::SafetyViolation`]
    Report,
}

/// A safety property, as written at its assertion site
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Property {
    /// The asserted expression, verbatim
    pub expr: &'static str,
    /// Source file of the assertion
    pub file: &'static str,
    /// Source line of the assertion
    pub line: u32,
}

impl Property {
    /// The location of this assertion, as `file:line`
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// The negated property, the condition under which the unsafe operation misbehaves
    #[must_use]
    pub fn postcondition(&self) -> String {
        format!("!({})", self.expr)
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` at {}:{}", self.expr, self.file, self.line)
    }
}

/// A property that did not hold, together with the site values that led to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The violated property
    pub property: Property,
    /// The values drawn for symbolic sites on the way, in draw order
    pub assignments: Vec<Assignment>,
}

/// A value one site took during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// The site name
    pub name: String,
    /// The value used by the routine
    pub value: i64,
    /// Whether the value came from a symbolic source
    pub symbolic: bool,
    /// The bounds assumed for the site
    pub bounds: Bounds,
}

/// Checks a safety property on a [`crate::context::CaseContext`].
///
/// Under [`OnViolation::Abort`] a failing check never returns. Under
/// [`OnViolation::Report`] it returns early from the enclosing routine with
/// [`chainbench_bolts::Error::SafetyViolation`].
#[macro_export]
macro_rules! safety_assert {
    ($ctx:expr, $cond:expr $(,)?) => {
        $ctx.check(
            $cond,
            $crate::assertion::Property {
                expr: stringify!($cond),
                file: file!(),
                line: line!(),
            },
        )?
    };
}
