//! Sources for the one value per case that is either the concrete literal of the flawed
//! routine or a bounded symbolic value.
//!
//! Control flow of a case is identical in both modes, only the origin of this value differs.

use core::{
    fmt::{self, Debug, Display},
    str::FromStr,
};
use std::{borrow::Cow, sync::OnceLock};

use chainbench_bolts::Error;
use hashbrown::HashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

/// Whether values come from the routine itself or from the symbolic backend
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BuildMode {
    /// Replay the literal (or the scanned input) of the C routine
    #[default]
    Concrete,
    /// Draw a bounded value from a [`ValueSource`]
    Symbolic,
}

/// An inclusive range of admissible values for a symbolic site
///
/// Serialized as a string in any syntax [`Bounds::from_str`] accepts, such as `"0..=120"`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bounds {
    lo: i64,
    hi: i64,
}

impl Bounds {
    /// Creates new bounds, `lo` and `hi` included.
    pub fn new(lo: i64, hi: i64) -> Result<Self, Error> {
        if lo > hi {
            return Err(Error::illegal_argument(format!(
                "empty bounds: lower {lo} is above upper {hi}"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Creates new bounds in a `const` context. `lo` must not be above `hi`.
    #[must_use]
    pub const fn new_const(lo: i64, hi: i64) -> Self {
        assert!(lo <= hi, "empty bounds");
        Self { lo, hi }
    }

    /// The lower bound, included
    #[must_use]
    pub fn lo(&self) -> i64 {
        self.lo
    }

    /// The upper bound, included
    #[must_use]
    pub fn hi(&self) -> i64 {
        self.hi
    }

    /// Returns `true` if `value` lies within these bounds
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        (self.lo..=self.hi).contains(&value)
    }

    /// The number of values within these bounds, as `i128` so the full `i64` range fits
    #[must_use]
    pub fn span(&self) -> i128 {
        i128::from(self.hi) - i128::from(self.lo) + 1
    }

    /// Renders these bounds as assumptions on `name`, as found in chain records
    #[must_use]
    pub fn assumptions(&self, name: &str) -> Vec<String> {
        vec![
            format!("{name} >= {}", self.lo),
            format!("{name} <= {}", self.hi),
        ]
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.lo, self.hi)
    }
}

fn bounds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // `lo<=name<=hi`, `lo..hi`, `lo..=hi` and `lo,hi`
        Regex::new(
            r"^\s*(-?\d+)\s*(?:<=\s*[A-Za-z_][A-Za-z0-9_]*\s*<=|\.\.=|\.\.|,)\s*(-?\d+)\s*$",
        )
        .unwrap_or_else(|_| unreachable!("bounds regex is valid"))
    })
}

impl FromStr for Bounds {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = bounds_regex()
            .captures(s)
            .ok_or_else(|| Error::illegal_argument(format!("unrecognized bounds `{s}`")))?;
        let lo: i64 = caps[1].parse()?;
        let hi: i64 = caps[2].parse()?;
        Self::new(lo, hi)
    }
}

impl TryFrom<String> for Bounds {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Bounds> for String {
    fn from(bounds: Bounds) -> Self {
        bounds.to_string()
    }
}

/// A point in a routine where a concrete value may be replaced by a symbolic one
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Site {
    /// The name of the value, as used in assignments and reports
    pub name: &'static str,
    /// The documented bounds of the symbolic value
    pub bounds: Bounds,
}

impl Site {
    /// Creates a new site
    #[must_use]
    pub const fn new(name: &'static str, bounds: Bounds) -> Self {
        Self { name, bounds }
    }
}

/// What a [`ValueSource`] decided for a site
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Draw {
    /// Use the concrete value of the routine
    Concrete,
    /// Use this value, already within the site's bounds
    Symbolic(i64),
}

/// Supplies the values of symbolic sites
pub trait ValueSource: Debug {
    /// The [`BuildMode`] this source stands for
    fn mode(&self) -> BuildMode;

    /// Decides the value of `site`.
    ///
    /// Fails with [`Error::Infeasible`] if the value would fall outside of the site's bounds.
    fn draw(&mut self, site: &Site) -> Result<Draw, Error>;

    /// The bounds this source assumes for `site`
    fn bounds_of(&self, site: &Site) -> Bounds {
        site.bounds
    }
}

/// A source that always replays the concrete value
#[derive(Debug, Default, Copy, Clone)]
pub struct ConcreteSource;

impl ValueSource for ConcreteSource {
    fn mode(&self) -> BuildMode {
        BuildMode::Concrete
    }

    fn draw(&mut self, _site: &Site) -> Result<Draw, Error> {
        Ok(Draw::Concrete)
    }
}

/// A symbolic source with explicit values per site, like a replayed backend test vector
#[derive(Debug, Default, Clone)]
pub struct AssignedSource {
    values: HashMap<Cow<'static, str>, i64>,
    bounds: HashMap<Cow<'static, str>, Bounds>,
}

impl AssignedSource {
    /// Creates a source without assignments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to the site called `name`
    pub fn assign<S>(&mut self, name: S, value: i64) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.values.insert(name.into(), value);
        self
    }

    /// Replaces the documented bounds of the site called `name`
    pub fn bound<S>(&mut self, name: S, bounds: Bounds) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.bounds.insert(name.into(), bounds);
        self
    }
}

impl<S> FromIterator<(S, i64)> for AssignedSource
where
    S: Into<Cow<'static, str>>,
{
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (name, value) in iter {
            source.assign(name, value);
        }
        source
    }
}

impl ValueSource for AssignedSource {
    fn mode(&self) -> BuildMode {
        BuildMode::Symbolic
    }

    fn draw(&mut self, site: &Site) -> Result<Draw, Error> {
        let value = *self
            .values
            .get(site.name)
            .ok_or_else(|| Error::key_not_found(format!("no value assigned to `{}`", site.name)))?;
        let bounds = self.bounds_of(site);
        if !bounds.contains(value) {
            return Err(Error::infeasible(format!(
                "{} = {value} is outside of {bounds}",
                site.name
            )));
        }
        Ok(Draw::Symbolic(value))
    }

    fn bounds_of(&self, site: &Site) -> Bounds {
        self.bounds.get(site.name).copied().unwrap_or(site.bounds)
    }
}

/// Parses a `name=value` assignment, as passed on the command line
pub fn parse_assignment(s: &str) -> Result<(String, i64), Error> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| Error::illegal_argument(format!("expected name=value, got `{s}`")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::illegal_argument(format!("empty name in `{s}`")));
    }
    Ok((name.to_string(), value.trim().parse()?))
}

/// Parses a `name=bounds` override, as passed on the command line
pub fn parse_bound_override(s: &str) -> Result<(String, Bounds), Error> {
    let (name, bounds) = s
        .split_once('=')
        .ok_or_else(|| Error::illegal_argument(format!("expected name=bounds, got `{s}`")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::illegal_argument(format!("empty name in `{s}`")));
    }
    Ok((name.to_string(), bounds.parse()?))
}

#[cfg(test)]
mod tests {
    use chainbench_bolts::Error;

    use super::{
        parse_assignment, parse_bound_override, AssignedSource, Bounds, Draw, Site, ValueSource,
    };

    const SITE: Site = Site::new("copy_len", Bounds::new_const(0, 120));

    #[test]
    fn test_bounds_syntax() {
        let expected = Bounds::new(-100, 100).unwrap();
        for s in ["-100<=x<=100", "-100..100", "-100..=100", "-100,100", " -100 , 100 "] {
            assert_eq!(s.parse::<Bounds>().unwrap(), expected, "{s}");
        }
        assert!("100..-100".parse::<Bounds>().is_err());
        assert!("1..2..3".parse::<Bounds>().is_err());
        assert!("x".parse::<Bounds>().is_err());
    }

    #[test]
    fn test_bounds_span() {
        let full = Bounds::new(i64::MIN, i64::MAX).unwrap();
        assert_eq!(full.span(), 1_i128 << 64);
        assert_eq!(SITE.bounds.span(), 121);
        assert!(SITE.bounds.contains(120));
        assert!(!SITE.bounds.contains(121));
    }

    #[test]
    fn test_assigned_source() {
        let mut source: AssignedSource = [("copy_len", 51)].into_iter().collect();
        assert_eq!(source.draw(&SITE).unwrap(), Draw::Symbolic(51));

        source.assign("copy_len", 121);
        assert!(matches!(source.draw(&SITE), Err(Error::Infeasible(..))));

        source.bound("copy_len", Bounds::new(0, 200).unwrap());
        assert_eq!(source.draw(&SITE).unwrap(), Draw::Symbolic(121));

        let mut empty = AssignedSource::new();
        assert!(matches!(empty.draw(&SITE), Err(Error::KeyNotFound(..))));
    }

    #[test]
    fn test_parse_cli_values() {
        assert_eq!(
            parse_assignment("copy_len=51").unwrap(),
            ("copy_len".to_string(), 51)
        );
        assert!(parse_assignment("copy_len").is_err());
        assert!(parse_assignment("=5").is_err());

        let (name, bounds) = parse_bound_override("data=-5..=5").unwrap();
        assert_eq!(name, "data");
        assert_eq!(bounds, Bounds::new(-5, 5).unwrap());
    }
}
