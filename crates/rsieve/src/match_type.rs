//! Match types: quantified comparison styles.
//!
//! `is`, `contains` and `matches` are core (operand codes 0..2); `regex`
//! and the relational `:count`/`:value` pair ship as extensions in
//! `exts/`. The hidden `@match-types` extension seeds the validator
//! registry with the core three.

use rustc_hash::FxHashMap;

use rsieve_binary::{CodecError, Reader};

use crate::comparator::Comparator;
use crate::error::RuntimeError;
use crate::extension::{ExtId, Extension, OperandSource};
use crate::validate::Validator;

/// Relational operator carried by `:count` / `:value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Relation {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Eq => "eq",
            Self::Ne => "ne",
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Gt => 0,
            Self::Ge => 1,
            Self::Lt => 2,
            Self::Le => 3,
            Self::Eq => 4,
            Self::Ne => 5,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Gt),
            1 => Some(Self::Ge),
            2 => Some(Self::Lt),
            3 => Some(Self::Le),
            4 => Some(Self::Eq),
            5 => Some(Self::Ne),
            _ => None,
        }
    }

    #[must_use]
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Gt => ordering == Greater,
            Self::Ge => ordering != Less,
            Self::Lt => ordering == Less,
            Self::Le => ordering != Greater,
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
        }
    }
}

/// Lazily compiled regex patterns, cached per run.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: FxHashMap<(String, bool), Option<regex::Regex>>,
}

impl RegexCache {
    /// Compile or fetch. `None` records a pattern that failed to compile.
    pub fn get(&mut self, pattern: &str, case_insensitive: bool) -> Option<&regex::Regex> {
        self.compiled
            .entry((pattern.to_string(), case_insensitive))
            .or_insert_with(|| {
                match regex::RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                {
                    Ok(re) => Some(re),
                    Err(err) => {
                        tracing::warn!(pattern, %err, "invalid regular expression in sieve test");
                        None
                    }
                }
            })
            .as_ref()
    }
}

/// Everything a match evaluation may touch.
pub struct MatchContext<'a> {
    pub comparator: &'static dyn Comparator,
    pub relation: Option<Relation>,
    pub regexes: &'a mut RegexCache,
    /// `${0}`, `${1}`... captured by the last successful `matches`/`regex`.
    pub captured: &'a mut Vec<String>,
}

/// A quantified comparison style.
pub trait MatchType: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extra wire parameters following the operand (the relational pair
    /// reads its relation code here).
    fn read_params(&self, rd: &mut Reader<'_>) -> Result<Option<Relation>, CodecError> {
        let _ = rd;
        Ok(None)
    }

    /// Match one value against one key.
    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, RuntimeError>;

    /// Match a value list against a key list; true on the first hit.
    /// `:count` overrides this to look at the list as a whole.
    fn matches(
        &self,
        ctx: &mut MatchContext<'_>,
        values: &[String],
        keys: &[String],
    ) -> Result<bool, RuntimeError> {
        for value in values {
            for key in keys {
                if self.match_one(ctx, value, key)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

// ============= Core match types =============

/// `:is` - exact equality under the comparator.
pub struct IsMatch;

impl MatchType for IsMatch {
    fn name(&self) -> &'static str {
        "is"
    }

    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, RuntimeError> {
        Ok(ctx.comparator.equals(value, key))
    }
}

/// `:contains` - substring under the comparator.
pub struct ContainsMatch;

impl MatchType for ContainsMatch {
    fn name(&self) -> &'static str {
        "contains"
    }

    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, RuntimeError> {
        match ctx.comparator.contains(value, key) {
            Some(hit) => Ok(hit),
            None => {
                tracing::warn!(
                    comparator = ctx.comparator.name(),
                    "comparator does not support substring matching"
                );
                Ok(false)
            }
        }
    }
}

/// `:matches` - Sieve glob. `*` matches any run, `?` one character, and a
/// backslash makes the next character literal. Wildcard spans are captured
/// as match values.
pub struct GlobMatch;

impl MatchType for GlobMatch {
    fn name(&self) -> &'static str {
        "matches"
    }

    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, RuntimeError> {
        let mut spans = Vec::new();
        if glob_match(key, value, ctx.comparator.case_insensitive(), &mut spans) {
            *ctx.captured = std::iter::once(value.to_string()).chain(spans).collect();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

pub static IS: IsMatch = IsMatch;
pub static CONTAINS: ContainsMatch = ContainsMatch;
pub static MATCHES: GlobMatch = GlobMatch;

/// Core match-type operand table. Index = wire code.
pub static CORE_MATCH_TYPES: [&'static dyn MatchType; 3] = [&IS, &CONTAINS, &MATCHES];

pub const CORE_IS: u8 = 0;
pub const CORE_CONTAINS: u8 = 1;
pub const CORE_MATCHES: u8 = 2;

/// Default match type when none is specified.
#[must_use]
pub fn default_match_type() -> &'static dyn MatchType {
    &IS
}

/// Hidden preloaded extension owning the core match-type tags.
pub struct MatchTypeExtension;

impl Extension for MatchTypeExtension {
    fn name(&self) -> &'static str {
        "@match-types"
    }

    fn validator_load(&self, _id: ExtId, validator: &mut Validator<'_>) {
        validator.register_match_type("is", OperandSource::Core(CORE_IS), &IS, false);
        validator.register_match_type(
            "contains",
            OperandSource::Core(CORE_CONTAINS),
            &CONTAINS,
            false,
        );
        validator.register_match_type(
            "matches",
            OperandSource::Core(CORE_MATCHES),
            &MATCHES,
            false,
        );
    }
}

// ============= Glob matcher =============

/// Match `value` against the Sieve glob `pattern`, pushing the text
/// consumed by each wildcard into `spans` on success.
pub fn glob_match(pattern: &str, value: &str, fold_case: bool, spans: &mut Vec<String>) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    spans.clear();
    glob_rec(&pattern, &value, fold_case, spans)
}

fn chars_eq(a: char, b: char, fold_case: bool) -> bool {
    if fold_case {
        a.to_ascii_lowercase() == b.to_ascii_lowercase()
    } else {
        a == b
    }
}

fn glob_rec(pattern: &[char], value: &[char], fold_case: bool, spans: &mut Vec<String>) -> bool {
    match pattern.first() {
        None => value.is_empty(),
        Some('*') => {
            // Try the shortest consumption first so `${1}` captures are
            // minimal from the left.
            for take in 0..=value.len() {
                let mark = spans.len();
                spans.push(value[..take].iter().collect());
                if glob_rec(&pattern[1..], &value[take..], fold_case, spans) {
                    return true;
                }
                spans.truncate(mark);
            }
            false
        }
        Some('?') => {
            if value.is_empty() {
                return false;
            }
            let mark = spans.len();
            spans.push(value[0].to_string());
            if glob_rec(&pattern[1..], &value[1..], fold_case, spans) {
                return true;
            }
            spans.truncate(mark);
            false
        }
        Some('\\') if pattern.len() > 1 => {
            if value.first().is_some_and(|&v| chars_eq(pattern[1], v, fold_case)) {
                glob_rec(&pattern[2..], &value[1..], fold_case, spans)
            } else {
                false
            }
        }
        Some(&p) => {
            if value.first().is_some_and(|&v| chars_eq(p, v, fold_case)) {
                glob_rec(&pattern[1..], &value[1..], fold_case, spans)
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str, value: &str) -> bool {
        let mut spans = Vec::new();
        glob_match(pattern, value, false, &mut spans)
    }

    #[test]
    fn test_glob_star() {
        assert!(glob("a*b", "ab"));
        assert!(glob("a*b", "aXYZb"));
        assert!(glob("a*b", "abab"));
        assert!(!glob("a*b", "ba"));
        assert!(!glob("a*b", "abc"));
        assert!(glob("*", ""));
        assert!(glob("*", "anything"));
    }

    #[test]
    fn test_glob_question() {
        assert!(glob("a?c", "abc"));
        assert!(!glob("a?c", "ac"));
        assert!(!glob("a?c", "abbc"));
    }

    #[test]
    fn test_glob_escapes_literal() {
        assert!(glob(r"a\*b", "a*b"));
        assert!(!glob(r"a\*b", "aXb"));
        assert!(glob(r"a\?b", "a?b"));
        assert!(!glob(r"a\?b", "axb"));
    }

    #[test]
    fn test_glob_captures() {
        let mut spans = Vec::new();
        assert!(glob_match("from-*-to-?", "from-alice-to-b", false, &mut spans));
        assert_eq!(spans, vec!["alice".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_glob_case_fold() {
        let mut spans = Vec::new();
        assert!(glob_match("SALE*", "sale today", true, &mut spans));
        assert!(!glob_match("SALE*", "sale today", false, &mut spans));
    }

    #[test]
    fn test_relation_holds() {
        use std::cmp::Ordering;
        assert!(Relation::Ge.holds(Ordering::Equal));
        assert!(Relation::Ge.holds(Ordering::Greater));
        assert!(!Relation::Ge.holds(Ordering::Less));
        assert!(Relation::Ne.holds(Ordering::Less));
        assert!(!Relation::Eq.holds(Ordering::Greater));
    }

    #[test]
    fn test_relation_codes_roundtrip() {
        for rel in [
            Relation::Gt,
            Relation::Ge,
            Relation::Lt,
            Relation::Le,
            Relation::Eq,
            Relation::Ne,
        ] {
            assert_eq!(Relation::from_code(rel.code()), Some(rel));
            assert_eq!(Relation::parse(rel.name()), Some(rel));
        }
    }

    #[test]
    fn test_regex_cache_bad_pattern() {
        let mut cache = RegexCache::default();
        assert!(cache.get("(unclosed", false).is_none());
        // Cached failure.
        assert!(cache.get("(unclosed", false).is_none());
        assert!(cache.get("a+", false).is_some());
    }

    struct FakeCmp;
    impl Comparator for FakeCmp {
        fn name(&self) -> &'static str {
            "i;octet"
        }
        fn compare(&self, a: &str, b: &str) -> std::cmp::Ordering {
            a.cmp(b)
        }
        fn contains(&self, h: &str, n: &str) -> Option<bool> {
            Some(h.contains(n))
        }
    }

    #[test]
    fn test_match_list_short_circuit() {
        static CMP: FakeCmp = FakeCmp;
        let mut regexes = RegexCache::default();
        let mut captured = Vec::new();
        let mut ctx = MatchContext {
            comparator: &CMP,
            relation: None,
            regexes: &mut regexes,
            captured: &mut captured,
        };
        let values = vec!["one".to_string(), "two".to_string()];
        let keys = vec!["zero".to_string(), "two".to_string()];
        assert!(IS.matches(&mut ctx, &values, &keys).unwrap());
        assert!(!IS.matches(&mut ctx, &values, &["three".to_string()]).unwrap());
    }
}
