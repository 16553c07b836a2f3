//! OSGi versions, ranges and the masks that derive import ranges from
//! exported versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::VersionError;

pub(crate) const VERSION_PATTERN: &str = r"[0-9]{1,9}(?:\.[0-9]{1,9}(?:\.[0-9]{1,9}(?:\.[0-9A-Za-z_-]+)?)?)?";
const MASK: &str = r"[\-+=~0-9]{0,3}[=~s]?";

static STRICT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{VERSION_PATTERN}$")).expect("version pattern"));
static STRICT_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:[\(\[]{VERSION_PATTERN},{VERSION_PATTERN}[\]\)]|{VERSION_PATTERN})$")).expect("range pattern")
});
static FUZZY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(\d+)(\.(\d+)(\.(\d+))?)?([^a-zA-Z0-9](.*))?$").expect("fuzzy version pattern")
});
static FUZZY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([\(\[])\s*([-\da-zA-Z.]+)\s*,\s*([-\da-zA-Z.]+)\s*([\]\)])$")
        .expect("fuzzy range pattern")
});
static FUZZY_MODIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(\d+[.-])*(.*)$").expect("modifier pattern"));
static MASK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{MASK}$")).expect("mask pattern"));
static RANGE_MASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^([\(\[])({MASK}),({MASK})([\]\)])$")).expect("range mask pattern")
});
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").expect("placeholder pattern"));

/// `major.minor.micro[.qualifier]`; a missing qualifier sorts lowest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if !STRICT_VERSION.is_match(text) {
            return Err(VersionError::InvalidVersion(text.to_string()));
        }
        let mut parts = text.splitn(4, '.');
        let mut number = || -> Result<u32, VersionError> {
            parts
                .next()
                .map_or(Ok(0), |part| part.parse())
                .map_err(|_| VersionError::InvalidVersion(text.to_string()))
        };
        let major = number()?;
        let minor = number()?;
        let micro = number()?;
        let qualifier = parts.next().map(str::to_string);
        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn micro(&self) -> u32 {
        self.micro
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    fn segment(&self, index: usize) -> i64 {
        match index {
            0 => i64::from(self.major),
            1 => i64::from(self.minor),
            _ => i64::from(self.micro),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ".{qualifier}")?;
        }
        Ok(())
    }
}

/// An interval of versions. A bare version is the range from it upwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRange {
    low: Version,
    high: Option<Version>,
    include_low: bool,
    include_high: bool,
}

impl VersionRange {
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        let invalid = || VersionError::InvalidRange(text.to_string());
        let include_low = match text.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => {
                let low = Version::parse(text).map_err(|_| invalid())?;
                return Ok(Self::at_least(low));
            }
        };
        let include_high = match text.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };
        let inner = &text[1..text.len() - 1];
        let (low, high) = inner.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            low: Version::parse(low).map_err(|_| invalid())?,
            high: Some(Version::parse(high).map_err(|_| invalid())?),
            include_low,
            include_high,
        })
    }

    pub fn at_least(low: Version) -> Self {
        Self {
            low,
            high: None,
            include_low: true,
            include_high: false,
        }
    }

    pub fn low(&self) -> &Version {
        &self.low
    }

    pub fn high(&self) -> Option<&Version> {
        self.high.as_ref()
    }

    pub fn is_range(&self) -> bool {
        self.high.is_some()
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above = if self.include_low {
            version >= &self.low
        } else {
            version > &self.low
        };
        let below = match &self.high {
            None => true,
            Some(high) if self.include_high => version <= high,
            Some(high) => version < high,
        };
        above && below
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.high {
            None => write!(f, "{}", self.low),
            Some(high) => write!(
                f,
                "{}{},{}{}",
                if self.include_low { '[' } else { '(' },
                self.low,
                high,
                if self.include_high { ']' } else { ')' }
            ),
        }
    }
}

/// True when `text` is a well-formed version or version range.
pub fn is_version_range(text: &str) -> bool {
    STRICT_RANGE.is_match(text.trim()) && VersionRange::parse(text).is_ok()
}

/// Rewrites loosely formatted versions, such as Maven's, into OSGi syntax.
///
/// `1.2-beta3` becomes `1.2.0.beta3`. Values that are already valid are
/// returned unchanged, as is anything that does not start with a number.
pub fn cleanup_version(version: &str) -> String {
    if is_version_range(version) {
        return version.to_string();
    }

    if let Some(caps) = FUZZY_RANGE.captures(version) {
        return format!(
            "{}{},{}{}",
            &caps[1],
            cleanup_version(&caps[2]),
            cleanup_version(&caps[3]),
            &caps[4]
        );
    }

    let Some(caps) = FUZZY_VERSION.captures(version) else {
        return version.to_string();
    };
    let group = |index: usize| caps.get(index).map(|m| m.as_str());
    let major = strip_leading_zeroes(group(1));
    let mut minor = strip_leading_zeroes(group(3));
    let mut micro = strip_leading_zeroes(group(5));
    let mut qualifier = group(7).map(str::to_string);

    if qualifier.is_none() {
        if !fits_in_int(&minor) {
            qualifier = Some(std::mem::replace(&mut minor, "0".to_string()));
        } else if !fits_in_int(&micro) {
            qualifier = Some(std::mem::replace(&mut micro, "0".to_string()));
        }
    }

    let mut result = format!("{major}.{minor}.{micro}");
    if let Some(qualifier) = qualifier {
        result.push('.');
        cleanup_modifier(&mut result, &qualifier);
    }
    result
}

fn strip_leading_zeroes(group: Option<&str>) -> String {
    let Some(group) = group else {
        return "0".to_string();
    };
    let zeroes = group
        .bytes()
        .take(group.len().saturating_sub(1))
        .take_while(|b| *b == b'0')
        .count();
    group[zeroes..].to_string()
}

/// Digit strings longer than nine characters are dates or build stamps, not
/// version segments.
fn fits_in_int(digits: &str) -> bool {
    digits.len() < 10 || (digits.len() == 10 && digits < "2147483647")
}

fn cleanup_modifier(result: &mut String, modifier: &str) {
    let modifier = FUZZY_MODIFIER
        .captures(modifier)
        .and_then(|caps| caps.get(2))
        .map_or(modifier, |m| m.as_str());
    result.extend(
        modifier
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-'),
    );
}

/// Applies a version mask such as `==+` to `version`.
///
/// Positions 0 to 2 use `=` to keep, `+`/`-` to step, a digit to replace and
/// `~` to drop the segment. Position 3 copies the qualifier for `=`, or for
/// `s` only when the qualifier is a snapshot.
pub fn apply_mask(version: &Version, mask: &str) -> Result<String, VersionError> {
    if !MASK_PATTERN.is_match(mask) {
        return Err(VersionError::InvalidMask(mask.to_string()));
    }
    let mut segments = Vec::new();
    for (index, c) in mask.chars().enumerate() {
        if c == '~' {
            continue;
        }
        let segment = if index == 3 {
            match (c, version.qualifier()) {
                ('s', Some(q)) if !q.ends_with("SNAPSHOT") => None,
                (_, q) => q.map(str::to_string),
            }
        } else if let Some(digit) = c.to_digit(10) {
            Some(digit.to_string())
        } else {
            let value = version.segment(index);
            Some(match c {
                '+' => value + 1,
                '-' => value - 1,
                _ => value,
            }
            .to_string())
        };
        if let Some(segment) = segment {
            segments.push(segment);
        }
    }
    Ok(segments.join("."))
}

/// Builds a range from a mask like `[==,=+)` around `version`.
///
/// A result that contains neither of its endpoints is reported as
/// [`VersionError::InvalidRange`] carrying the produced text.
pub fn range_from_mask(version: &Version, mask: &str) -> Result<String, VersionError> {
    let caps = RANGE_MASK
        .captures(mask.trim())
        .ok_or_else(|| VersionError::InvalidMask(mask.to_string()))?;
    let text = format!(
        "{}{},{}{}",
        &caps[1],
        apply_mask(version, &caps[2])?,
        apply_mask(version, &caps[3])?,
        &caps[4]
    );
    let range = VersionRange::parse(&text)?;
    let low_included = range.includes(range.low());
    let high_included = range.high().is_some_and(|high| range.includes(high));
    if !(low_included || high_included) {
        return Err(VersionError::InvalidRange(text));
    }
    Ok(text)
}

/// Expands `${@}`, `${version;MASK[;VERSION]}` and `${range;MASK[;VERSION]}`.
///
/// `current` is the value of `${@}`. Unknown placeholders are left as they
/// are, as is `${range}` when no version is available.
pub fn substitute(text: &str, current: Option<&str>) -> Result<String, VersionError> {
    let mut failure = None;
    let expanded = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
        match expand(&caps[1], current) {
            Ok(Some(value)) => value,
            Ok(None) => caps[0].to_string(),
            Err(err) => {
                failure.get_or_insert(err);
                caps[0].to_string()
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(expanded.into_owned()),
    }
}

fn expand(body: &str, current: Option<&str>) -> Result<Option<String>, VersionError> {
    let args: Vec<&str> = body.split(';').collect();
    match args.as_slice() {
        ["@"] => Ok(current.map(str::to_string)),
        ["version", mask, rest @ ..] if rest.len() <= 1 => {
            let version = match rest.first().copied().or(current) {
                Some(v) => Version::parse(v)?,
                None => Version::default(),
            };
            apply_mask(&version, mask).map(Some)
        }
        ["range", mask, rest @ ..] if rest.len() <= 1 => {
            let Some(version) = rest.first().copied().or(current) else {
                return Ok(None);
            };
            range_from_mask(&Version::parse(version)?, mask).map(Some)
        }
        _ => Ok(None),
    }
}

/// Import range for a package exported at `export_version`.
///
/// An explicit range is cleaned and expanded with `${@}` bound to the
/// export version. Otherwise `policy` is used: either a range mask such as
/// `[==,+)` or text containing placeholders.
pub fn import_range(
    export_version: &str,
    explicit: Option<&str>,
    policy: &str,
) -> Result<String, VersionError> {
    match explicit {
        Some(range) => substitute(&cleanup_version(range), Some(export_version)),
        None if policy.contains("${") => substitute(policy, Some(export_version)),
        None => range_from_mask(&Version::parse(export_version)?, policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).expect("version")
    }

    #[test]
    fn parse_and_order() {
        assert_eq!(v("1").to_string(), "1.0.0");
        assert_eq!(v("1.2.3.beta").qualifier(), Some("beta"));
        assert!(v("1.2.3") < v("1.2.3.a"));
        assert!(v("1.2.3.a") < v("1.2.3.b"));
        assert!(v("1.10") > v("1.9"));
        assert!(Version::parse("1.2.3.4.5").is_err());
        assert!(Version::parse("x").is_err());
        assert_eq!(v("2.0"), Version::new(2, 0, 0));
    }

    #[test]
    fn ranges() {
        let range = VersionRange::parse("[1.2,2)").expect("range");
        assert!(range.includes(&v("1.2")));
        assert!(range.includes(&v("1.9.9")));
        assert!(!range.includes(&v("2")));
        assert_eq!(range.to_string(), "[1.2.0,2.0.0)");

        let open = VersionRange::parse("(1,2]").expect("range");
        assert!(!open.includes(&v("1")));
        assert!(open.includes(&v("2")));

        let floor = VersionRange::parse("1.5").expect("floor");
        assert!(!floor.is_range());
        assert!(floor.includes(&v("99")));

        assert!(VersionRange::parse("[1,2").is_err());
        assert!(is_version_range("[1.0,2)"));
        assert!(!is_version_range("1.0-beta"));
    }

    #[test]
    fn cleanup_matches_known_inputs() {
        for (input, expected) in [
            ("1.2-beta3", "1.2.0.beta3"),
            ("000001.0003.00000-SNAPSHOT", "1.3.0.SNAPSHOT"),
            ("0-SNAPSHOT", "0.0.0.SNAPSHOT"),
            ("1.3.0.0-0-01-0-SNAPSHOT", "1.3.0.0-0-01-0-SNAPSHOT"),
            ("0.9.0.1.2.3.4.5-incubator-SNAPSHOT", "0.9.0.incubator-SNAPSHOT"),
            ("0.4aug123", "0.0.0.4aug123"),
            ("0.9.4aug123", "0.9.0.4aug123"),
            ("1.2.3-123", "1.2.3.123"),
            ("1.123x", "1.0.0.123x"),
            ("0.9.0.4.3.4.5.6.6", "0.9.0.6"),
            ("1.2", "1.2"),
            ("1", "1"),
            ("1.2.x", "1.2.0.x"),
            ("1.2:x", "1.2.0.x"),
            ("1#x", "1.0.0.x"),
            ("1.&^%$#date2007/03/04", "1.0.0.date20070304"),
            ("[1.2-beta,2)", "[1.2.0.beta,2)"),
            ("[1.0,2.0)", "[1.0,2.0)"),
            ("latest", "latest"),
        ] {
            assert_eq!(cleanup_version(input), expected, "cleanup of {input}");
        }
    }

    #[test]
    fn oversized_segments_become_qualifiers() {
        assert_eq!(cleanup_version("1.20120909123012"), "1.0.0.20120909123012");
        assert_eq!(cleanup_version("1.2.2147483648"), "1.2.0.2147483648");
    }

    #[test]
    fn masks() {
        let version = v("1.2.3.q");
        assert_eq!(apply_mask(&version, "+==").expect("mask"), "2.2.3");
        assert_eq!(apply_mask(&version, "==").expect("mask"), "1.2");
        assert_eq!(apply_mask(&version, "===").expect("mask"), "1.2.3");
        assert_eq!(apply_mask(&version, "====").expect("mask"), "1.2.3.q");
        assert_eq!(apply_mask(&version, "=~+").expect("mask"), "1.4");
        assert_eq!(apply_mask(&version, "=+0").expect("mask"), "1.3.0");
        assert!(apply_mask(&version, "abc").is_err());
    }

    #[test]
    fn snapshot_mask_keeps_only_snapshot_qualifiers() {
        assert_eq!(apply_mask(&v("1.2.3.q"), "===s").expect("mask"), "1.2.3");
        assert_eq!(
            apply_mask(&v("1.2.3.2024-SNAPSHOT"), "===s").expect("mask"),
            "1.2.3.2024-SNAPSHOT"
        );
    }

    #[test]
    fn policy_ranges() {
        assert_eq!(range_from_mask(&v("1.2.0"), "[==,+)").expect("range"), "[1.2,2)");
        assert_eq!(range_from_mask(&v("1.2.3"), "[==,=+)").expect("range"), "[1.2,1.3)");
        assert_eq!(
            range_from_mask(&v("1.2"), "[=+,=+)"),
            Err(VersionError::InvalidRange("[1.3,1.3)".to_string()))
        );
        assert!(range_from_mask(&v("1.2"), "==").is_err());
    }

    #[test]
    fn placeholders() {
        assert_eq!(substitute("${@}", Some("1.4.0")).expect("subst"), "1.4.0");
        assert_eq!(
            substitute("${range;[==,+)}", Some("1.4.0")).expect("subst"),
            "[1.4,2)"
        );
        assert_eq!(
            substitute("${range;[==,+);3.1}", None).expect("subst"),
            "[3.1,4)"
        );
        assert_eq!(
            substitute("[${version;==},${version;+})", Some("1.2.3")).expect("subst"),
            "[1.2,2)"
        );
        assert!(substitute("${range;[==,+);x}", None).is_err());
        assert_eq!(substitute("${range;[==,+)}", None).expect("subst"), "${range;[==,+)}");
        assert_eq!(substitute("${other}", Some("1")).expect("subst"), "${other}");
    }

    #[test]
    fn import_ranges() {
        assert_eq!(import_range("1.2.0", None, "[==,+)").expect("range"), "[1.2,2)");
        assert_eq!(
            import_range("1.2.0", None, "${range;[==,=+)}").expect("range"),
            "[1.2,1.3)"
        );
        assert_eq!(
            import_range("1.2.0", Some("[${@},3)"), "[==,+)").expect("range"),
            "[1.2.0,3)"
        );
        assert_eq!(import_range("1.2.0", Some("1.0-beta"), "[==,+)").expect("range"), "1.0.0.beta");
        assert!(import_range("garbage", None, "[==,+)").is_err());
    }
}
