//! The `regex` extension (draft-ietf-sieve-regex): regular-expression
//! match type.
//!
//! Patterns compile lazily with a per-run cache; a pattern that fails to
//! compile makes the test false with a warning rather than aborting the
//! script.

use crate::extension::{ExtId, Extension, OperandSource};
use crate::match_type::{MatchContext, MatchType};
use crate::validate::Validator;

pub struct RegexExtension;

static MATCH_TYPES: [&'static dyn MatchType; 1] = [&REGEX];

impl Extension for RegexExtension {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_match_type("regex", OperandSource::Ext { ext: id, sub: 0 }, &REGEX, false);
    }

    fn match_types(&self) -> &'static [&'static dyn MatchType] {
        &MATCH_TYPES
    }
}

/// `:regex` - the key is a regular expression; capture groups become
/// match values.
pub struct RegexMatch;

impl MatchType for RegexMatch {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, crate::error::RuntimeError> {
        let Some(re) = ctx.regexes.get(key, ctx.comparator.case_insensitive()) else {
            return Ok(false);
        };
        match re.captures(value) {
            Some(caps) => {
                *ctx.captured = caps
                    .iter()
                    .map(|group| group.map_or(String::new(), |m| m.as_str().to_string()))
                    .collect();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub static REGEX: RegexMatch = RegexMatch;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{CASEMAP, OCTET};
    use crate::match_type::RegexCache;

    fn run(
        comparator: &'static dyn crate::comparator::Comparator,
        value: &str,
        pattern: &str,
    ) -> (bool, Vec<String>) {
        let mut regexes = RegexCache::default();
        let mut captured = Vec::new();
        let mut ctx = MatchContext {
            comparator,
            relation: None,
            regexes: &mut regexes,
            captured: &mut captured,
        };
        let hit = REGEX.match_one(&mut ctx, value, pattern).unwrap();
        (hit, captured)
    }

    #[test]
    fn test_basic_match() {
        let (hit, caps) = run(&OCTET, "ticket-1234", r"ticket-([0-9]+)");
        assert!(hit);
        assert_eq!(caps, vec!["ticket-1234".to_string(), "1234".to_string()]);
    }

    #[test]
    fn test_case_follows_comparator() {
        assert!(run(&CASEMAP, "SALE today", "sale").0);
        assert!(!run(&OCTET, "SALE today", "sale").0);
    }

    #[test]
    fn test_bad_pattern_is_false() {
        assert!(!run(&OCTET, "anything", "(unclosed").0);
    }
}
