//! Choice paths: positions in the search tree.
//!
//! A path is the sequence of branch indices taken from the root of the choice
//! tree. The textual form is `{c0, c1, c2}` (decimal, comma-separated,
//! brace-wrapped; `{}` is the root). That form is the only serialization the
//! checker prints, and [`Path::from_str`] parses it back so a path copied from
//! a failing run's output can be replayed directly.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One branch index at a node of the search tree. Valid values at a node with
/// `n_opts` branches are `0..n_opts`.
pub type Choice = u8;

/// Paths are short (one entry per decision in a trial) and cloned on every
/// steal, so keep them inline up to 16 choices.
type ChoiceVec = SmallVec<[Choice; 16]>;

/// A root-to-node path in the search tree. A path of length `L` identifies a
/// node at depth `L`; the empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(ChoiceVec);

impl Path {
    /// The empty path (the tree root).
    pub fn new() -> Self {
        Path(ChoiceVec::new())
    }

    pub fn push(&mut self, choice: Choice) {
        self.0.push(choice);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Choice] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Choice> {
        self.0.iter()
    }
}

impl From<Vec<Choice>> for Path {
    fn from(choices: Vec<Choice>) -> Self {
        Path(ChoiceVec::from_vec(choices))
    }
}

impl From<&[Choice]> for Path {
    fn from(choices: &[Choice]) -> Self {
        Path(ChoiceVec::from_slice(choices))
    }
}

impl<const N: usize> From<[Choice; N]> for Path {
    fn from(choices: [Choice; N]) -> Self {
        Path(ChoiceVec::from_slice(&choices))
    }
}

impl FromIterator<Choice> for Path {
    fn from_iter<I: IntoIterator<Item = Choice>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Choice;

    fn index(&self, depth: usize) -> &Choice {
        &self.0[depth]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, choice) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{choice}")?;
        }
        write!(f, "}}")
    }
}

/// Failure to parse the `{c0, c1, ...}` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    /// The input was not wrapped in `{` ... `}`.
    #[error("path must be brace-wrapped, got {0:?}")]
    MissingBraces(String),

    /// An element was not a decimal choice in `0..=255`.
    #[error("invalid choice {0:?} in path")]
    InvalidChoice(String),
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| PathParseError::MissingBraces(s.to_string()))?;
        if inner.trim().is_empty() {
            return Ok(Path::new());
        }
        inner
            .split(',')
            .map(|token| {
                let token = token.trim();
                token
                    .parse::<Choice>()
                    .map_err(|_| PathParseError::InvalidChoice(token.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn display_matches_external_form() {
        assert_snapshot!(Path::new().to_string(), @"{}");
        assert_snapshot!(Path::from([0]).to_string(), @"{0}");
        assert_snapshot!(Path::from([1, 0, 2]).to_string(), @"{1, 0, 2}");
        assert_snapshot!(Path::from([255, 0]).to_string(), @"{255, 0}");
    }

    #[test]
    fn parse_round_trips() {
        for path in [
            Path::new(),
            Path::from([0]),
            Path::from([1, 0, 2]),
            Path::from([9, 10, 11, 255]),
        ] {
            assert_eq!(path.to_string().parse::<Path>().unwrap(), path);
        }
    }

    #[test]
    fn parse_tolerates_whitespace() {
        assert_eq!(" { 1,0 , 2 } ".parse::<Path>().unwrap(), Path::from([1, 0, 2]));
        assert_eq!("{ }".parse::<Path>().unwrap(), Path::new());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "1, 0".parse::<Path>(),
            Err(PathParseError::MissingBraces("1, 0".to_string()))
        );
        assert_eq!(
            "{1, x}".parse::<Path>(),
            Err(PathParseError::InvalidChoice("x".to_string()))
        );
        assert_eq!(
            "{256}".parse::<Path>(),
            Err(PathParseError::InvalidChoice("256".to_string()))
        );
        assert_eq!(
            "{1,,2}".parse::<Path>(),
            Err(PathParseError::InvalidChoice("".to_string()))
        );
    }

    #[test]
    fn parse_error_messages() {
        assert_snapshot!(
            PathParseError::MissingBraces("1, 0".to_string()).to_string(),
            @r#"path must be brace-wrapped, got "1, 0""#
        );
        assert_snapshot!(
            PathParseError::InvalidChoice("x".to_string()).to_string(),
            @r#"invalid choice "x" in path"#
        );
    }
}
