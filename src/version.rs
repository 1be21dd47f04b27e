// src/version.rs

//! Version comparison and dependency constraint handling.
//!
//! Starpack versions are dot-separated numeric components ("1.2.3").
//! Missing trailing components compare as zero, so "1.2" == "1.2.0".
//! Dependency entries in a catalog are either a bare package name or
//! `name OP version` with OP one of >, >=, <, <=, =, ==, !=.

use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

/// Split a version string into numeric components. Unparseable
/// components default to zero.
fn parse_components(ver: &str) -> Vec<i64> {
    ver.split('.')
        .map(|part| part.trim().parse::<i64>().unwrap_or(0))
        .collect()
}

/// Compare two dotted version strings component-wise, zero-padding the
/// shorter side.
pub fn compare(a: &str, b: &str) -> Ordering {
    let pa = parse_components(a);
    let pb = parse_components(b);
    let n = pa.len().max(pb.len());

    for i in 0..n {
        let ca = pa.get(i).copied().unwrap_or(0);
        let cb = pb.get(i).copied().unwrap_or(0);
        match ca.cmp(&cb) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// Constraint operators recognized in dependency strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ConstraintOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            "=" | "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }

    /// Evaluate `candidate OP required`.
    pub fn evaluate(&self, candidate: &str, required: &str) -> bool {
        let ord = compare(candidate, required);
        match self {
            Self::Greater => ord == Ordering::Greater,
            Self::GreaterOrEqual => ord != Ordering::Less,
            Self::Less => ord == Ordering::Less,
            Self::LessOrEqual => ord != Ordering::Greater,
            Self::Equal => ord == Ordering::Equal,
            Self::NotEqual => ord != Ordering::Equal,
        }
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A version constraint attached to a dependency.
///
/// `op` is `None` when the operator text was not recognized; such a
/// constraint never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Option<ConstraintOp>,
    pub version: String,
}

impl Constraint {
    pub fn satisfied_by(&self, candidate: &str) -> bool {
        match self.op {
            Some(op) => op.evaluate(candidate, &self.version),
            None => false,
        }
    }
}

/// A parsed dependency entry: a package name plus an optional constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub constraint: Option<Constraint>,
}

impl Dependency {
    /// Parse a dependency string.
    ///
    /// Accepted forms: `"name"`, `"name >= 1.2"`, `"name>=1.2"`.
    /// An unknown operator is warned and recorded as non-matching.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        // Find the first operator character; everything before it is the name.
        let op_start = s.find(|c| c == '>' || c == '<' || c == '=' || c == '!');
        let Some(start) = op_start else {
            return Self {
                name: s.to_string(),
                constraint: None,
            };
        };

        let name = s[..start].trim().to_string();
        let rest = &s[start..];
        let op_len = rest
            .char_indices()
            .take_while(|(_, c)| matches!(c, '>' | '<' | '=' | '!'))
            .count();
        let op_str = &rest[..op_len];
        let version = rest[op_len..].trim().to_string();

        let op = ConstraintOp::parse(op_str);
        if op.is_none() {
            warn!("Unknown version comparison operator '{}' in dependency '{}'", op_str, s);
        }

        Self {
            name,
            constraint: Some(Constraint { op, version }),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(c) => match c.op {
                Some(op) => write!(f, "{} {} {}", self.name, op, c.version),
                None => write!(f, "{} ? {}", self.name, c.version),
            },
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_basic() {
        assert_eq!(compare("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare("1.2.3", "1.2.4"), Ordering::Less);
        assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
    }

    #[test]
    fn test_compare_zero_padding() {
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare("1.2.0.0", "1.2"), Ordering::Equal);
        assert_eq!(compare("1.2.1", "1.2"), Ordering::Greater);
    }

    #[test]
    fn test_compare_antisymmetric() {
        let pairs = [("1.0", "2.0"), ("1.2.3", "1.2"), ("3", "3.0.0")];
        for (a, b) in pairs {
            assert_eq!(compare(a, b), compare(b, a).reverse());
        }
    }

    #[test]
    fn test_compare_unparseable_component_is_zero() {
        assert_eq!(compare("1.x.3", "1.0.3"), Ordering::Equal);
    }

    #[test]
    fn test_dependency_bare_name() {
        let d = Dependency::parse("openssl");
        assert_eq!(d.name, "openssl");
        assert!(d.constraint.is_none());
    }

    #[test]
    fn test_dependency_with_constraint() {
        let d = Dependency::parse("zlib >= 1.2.11");
        assert_eq!(d.name, "zlib");
        let c = d.constraint.unwrap();
        assert_eq!(c.op, Some(ConstraintOp::GreaterOrEqual));
        assert_eq!(c.version, "1.2.11");
        assert!(c.satisfied_by("1.3"));
        assert!(c.satisfied_by("1.2.11"));
        assert!(!c.satisfied_by("1.2.10"));
    }

    #[test]
    fn test_dependency_no_spaces() {
        let d = Dependency::parse("ncurses==6.4");
        assert_eq!(d.name, "ncurses");
        let c = d.constraint.unwrap();
        assert_eq!(c.op, Some(ConstraintOp::Equal));
        assert_eq!(c.version, "6.4");
    }

    #[test]
    fn test_dependency_not_equal() {
        let d = Dependency::parse("gcc != 13.1");
        let c = d.constraint.unwrap();
        assert!(c.satisfied_by("13.2"));
        assert!(!c.satisfied_by("13.1"));
    }

    #[test]
    fn test_malformed_operator_never_matches() {
        let d = Dependency::parse("foo >< 1.0");
        let c = d.constraint.unwrap();
        assert_eq!(c.op, None);
        assert!(!c.satisfied_by("1.0"));
        assert!(!c.satisfied_by("2.0"));
    }

    #[test]
    fn test_constraint_ops() {
        assert!(ConstraintOp::Greater.evaluate("2.0", "1.9"));
        assert!(!ConstraintOp::Greater.evaluate("1.9", "1.9"));
        assert!(ConstraintOp::LessOrEqual.evaluate("1.9", "1.9"));
        assert!(ConstraintOp::Less.evaluate("1.8", "1.9"));
        assert!(ConstraintOp::Equal.evaluate("1.2", "1.2.0"));
    }
}
