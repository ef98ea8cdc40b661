pub mod glob;
pub mod version;

use std::{cmp::Ordering, convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use self::glob::{GlobMatcher, PatternError};

/// A predicate over registry tags.
pub type TagMatcher = Box<dyn Fn(&str) -> bool + Send + Sync>;
/// A total order over registry tags, the biggest tag is the one that should be running.
pub type TagRanker = fn(&str, &str) -> Ordering;

/// The strategy name used when a pattern has no type prefix, or an unknown one.
pub const DEFAULT_PATTERN_TYPE: &str = "glob";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternType {
    Glob,
    Semver,
    Other(String),
}

impl PatternType {
    pub fn name(&self) -> &str {
        match self {
            PatternType::Glob => "glob",
            PatternType::Semver => "semver",
            PatternType::Other(name) => name,
        }
    }
}

impl From<&str> for PatternType {
    fn from(name: &str) -> Self {
        match name {
            "glob" => PatternType::Glob,
            "semver" => PatternType::Semver,
            other => PatternType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A tag pattern, written as `<type>:<pattern>` or just `<pattern>`.
///
/// e.g. `glob:5.*`, `semver:1.0.0` or `1.*.*`. Without a type the default glob strategy is
/// used and the whole string is the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagPattern {
    raw: String,
    pattern_type: PatternType,
    pattern: String,
}

impl TagPattern {
    pub fn parse(raw: &str) -> Self {
        let (pattern_type, pattern) = match raw.split_once(':') {
            Some((type_name, pattern)) if !pattern.is_empty() => (PatternType::from(type_name), pattern),
            _ => (PatternType::from(DEFAULT_PATTERN_TYPE), raw),
        };

        Self {
            raw: raw.to_string(),
            pattern_type,
            pattern: pattern.to_string(),
        }
    }

    pub fn pattern_type(&self) -> &PatternType {
        &self.pattern_type
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TagPattern {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for TagPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// How tags are matched and ranked for one pattern type.
///
/// Matching and ranking are looked up separately, a strategy is free to pair any matcher
/// with any ranker. The glob entry ranks with version ordering even though glob matches can
/// be tags that are not versions at all.
struct Strategy {
    name: &'static str,
    matcher: fn(&str) -> Result<TagMatcher, PatternError>,
    ranker: fn() -> TagRanker,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "glob",
        matcher: glob_matcher,
        ranker: version_ranker,
    },
    // Parsed, but there is no semver range matching yet, so it behaves like glob.
    Strategy {
        name: "semver",
        matcher: glob_matcher,
        ranker: version_ranker,
    },
];

fn glob_matcher(pattern: &str) -> Result<TagMatcher, PatternError> {
    let glob = GlobMatcher::new(pattern)?;
    Ok(Box::new(move |tag: &str| glob.is_match(tag)))
}

fn version_ranker() -> TagRanker {
    version::compare_versions
}

fn strategy_for(pattern_type: &PatternType) -> &'static Strategy {
    let find = |name: &str| STRATEGIES.iter().find(|s| s.name == name);

    match find(pattern_type.name()) {
        Some(strategy) => strategy,
        None => {
            warn!("Unknown tag pattern type '{}', using '{}'", pattern_type, DEFAULT_PATTERN_TYPE);
            find(DEFAULT_PATTERN_TYPE).unwrap_or(&STRATEGIES[0])
        }
    }
}

/// Compile the pattern into a predicate over tags.
///
/// A pattern that fails to compile produces a matcher that matches nothing, so one bad label
/// can't take down the rest of a pass.
pub fn compile_matcher(pattern: &TagPattern) -> TagMatcher {
    let strategy = strategy_for(pattern.pattern_type());
    match (strategy.matcher)(pattern.pattern()) {
        Ok(matcher) => matcher,
        Err(e) => {
            warn!("Tag pattern '{}' does not compile, no tags will match: {}", pattern, e);
            Box::new(|_: &str| false)
        }
    }
}

/// Compile the pattern into an order over tags.
pub fn compile_ranker(pattern: &TagPattern) -> TagRanker {
    (strategy_for(pattern.pattern_type()).ranker)()
}
