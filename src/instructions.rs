//! Wildcard selection instructions evaluated in declaration order.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::descriptors::{Descriptors, PackageRef, DUPLICATE_MARKER};
use crate::error::HeaderError;
use crate::header::{Attrs, Parameters};
use crate::packages::Packages;

/// One compiled selection pattern with its clause attributes.
#[derive(Clone, Debug)]
pub struct Instruction {
    input: String,
    matcher: Matcher,
    negated: bool,
    literal: bool,
    optional: bool,
    any: bool,
    duplicate: bool,
    case_insensitive: bool,
    attrs: Attrs,
}

#[derive(Clone, Debug)]
enum Matcher {
    Literal(String),
    Pattern(Regex),
}

impl Instruction {
    /// Compiles `!`, `=`, `:i` and the duplicate marker, then the glob itself.
    pub fn new(input: &str, attrs: Attrs) -> Result<Self, HeaderError> {
        let duplicate = input.ends_with(DUPLICATE_MARKER);
        let mut pattern = input.trim_end_matches(DUPLICATE_MARKER);

        let negated = pattern.starts_with('!');
        if negated {
            pattern = &pattern[1..];
        }
        let case_insensitive = pattern.ends_with(":i");
        if case_insensitive {
            pattern = &pattern[..pattern.len() - 2];
        }
        let forced_literal = pattern.starts_with('=');
        if forced_literal {
            pattern = &pattern[1..];
        }

        let literal = forced_literal || !pattern.contains(['*', '?', '|']);
        let matcher = if literal && !case_insensitive {
            Matcher::Literal(pattern.to_string())
        } else {
            let source = if literal {
                regex::escape(pattern)
            } else {
                glob_to_regex(pattern)
            };
            let regex = RegexBuilder::new(&format!("^(?:{source})$"))
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|err| HeaderError {
                    header: input.to_string(),
                    offset: 0,
                    reason: err.to_string(),
                })?;
            Matcher::Pattern(regex)
        };

        Ok(Self {
            input: input.to_string(),
            any: !negated && pattern == "*",
            optional: attrs.get("resolution:") == Some("optional"),
            matcher,
            negated,
            literal,
            duplicate,
            case_insensitive,
            attrs,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(literal) => literal == name,
            Matcher::Pattern(regex) => regex.is_match(name),
        }
    }

    /// The name selected by a literal instruction.
    pub fn literal(&self) -> Option<&str> {
        match &self.matcher {
            Matcher::Literal(literal) => Some(literal),
            Matcher::Pattern(_) if self.literal => {
                let without_negation = self.input.strip_prefix('!').unwrap_or(&self.input);
                let trimmed = without_negation
                    .trim_end_matches(DUPLICATE_MARKER)
                    .trim_end_matches(":i");
                Some(trimmed.strip_prefix('=').unwrap_or(trimmed))
            }
            Matcher::Pattern(_) => None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

/// Converts a glob into a regular expression body.
///
/// `*` matches any run, `?` at most one character and `|` separates
/// alternatives. A trailing `.*` also matches the bare prefix, so
/// `com.acme.*` selects `com.acme` itself.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        match c {
            '.' if index + 2 == chars.len() && chars[index + 1] == '*' => {
                out.push_str("(\\..*)?");
                index += 1;
            }
            '*' => out.push_str(".*"),
            '?' => out.push_str(".?"),
            '|' => out.push('|'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        index += 1;
    }
    out
}

/// Ordered list of instructions compiled from a header.
#[derive(Clone, Debug, Default)]
pub struct Instructions {
    instructions: Vec<Instruction>,
}

/// Outcome of [`Instructions::select`].
#[derive(Debug, Default)]
pub struct Selection {
    pub matched: Packages,
    /// Instructions that selected nothing and carry no exemption.
    pub unused: Vec<Instruction>,
}

impl Instructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: &Parameters) -> Result<Self, HeaderError> {
        let instructions = parameters
            .iter()
            .map(|(key, attrs)| Instruction::new(key, attrs.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { instructions })
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// First instruction matching `name`, if any.
    pub fn matcher(&self, name: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.matches(name))
    }

    /// Selects packages from `candidates` in instruction order.
    ///
    /// Each candidate is claimed by the first instruction that matches it.
    /// Negated instructions claim and discard. Literal instructions that
    /// matched nothing are still added, since they name a package rather
    /// than filter one.
    pub fn select(&self, registry: &Descriptors, candidates: &Packages) -> Selection {
        let mut remaining: Vec<&PackageRef> = candidates.keys().collect();
        remaining.sort();
        let mut matched = Packages::new();
        let mut unmatched = Vec::new();

        for instruction in &self.instructions {
            let mut hit = false;
            remaining.retain(|package| {
                if package.is_metadata() {
                    return false;
                }
                if !instruction.matches(package.fqn()) {
                    return true;
                }
                hit = true;
                if !instruction.is_negated() {
                    matched.merge(
                        registry,
                        package,
                        instruction.is_duplicate(),
                        &[candidates.get(package), Some(instruction.attrs())],
                    );
                }
                false
            });
            if !hit && !instruction.is_any() {
                unmatched.push(instruction);
            }
        }

        let mut unused = Vec::new();
        for instruction in unmatched {
            if instruction.is_literal() && !instruction.is_negated() {
                if let Some(literal) = instruction.literal() {
                    let package = registry.package_ref(literal);
                    matched.merge(registry, &package, true, &[Some(instruction.attrs())]);
                }
                continue;
            }
            if instruction.is_negated() || instruction.is_optional() {
                continue;
            }
            unused.push(instruction.clone());
        }

        Selection { matched, unused }
    }

    /// Names from `names` kept by these instructions. With `negated_only`
    /// set, only names hit by a negated instruction are returned.
    pub fn select_names<'a>(&self, names: impl IntoIterator<Item = &'a str>, negated_only: bool) -> Vec<&'a str> {
        names
            .into_iter()
            .filter(|name| match self.matcher(name) {
                Some(instruction) => instruction.is_negated() == negated_only,
                None => false,
            })
            .collect()
    }
}
