//! The `relational` extension (RFC 5231): `:count` and `:value` match
//! types over {gt, ge, lt, le, eq, ne}.

use rsieve_binary::{CodecError, Reader};

use crate::error::RuntimeError;
use crate::extension::{ExtId, Extension, OperandSource};
use crate::match_type::{MatchContext, MatchType, Relation};
use crate::validate::Validator;

const SUB_COUNT: u8 = 0;
const SUB_VALUE: u8 = 1;

pub struct RelationalExtension;

static MATCH_TYPES: [&'static dyn MatchType; 2] = [&COUNT, &VALUE];

impl Extension for RelationalExtension {
    fn name(&self) -> &'static str {
        "relational"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_match_type(
            "count",
            OperandSource::Ext { ext: id, sub: SUB_COUNT },
            &COUNT,
            true,
        );
        validator.register_match_type(
            "value",
            OperandSource::Ext { ext: id, sub: SUB_VALUE },
            &VALUE,
            true,
        );
    }

    fn match_types(&self) -> &'static [&'static dyn MatchType] {
        &MATCH_TYPES
    }
}

fn read_relation(rd: &mut Reader<'_>) -> Result<Option<Relation>, CodecError> {
    let offset = rd.pos();
    let code = rd.read_u8()?;
    Relation::from_code(code)
        .map(Some)
        .ok_or_else(|| CodecError::Invalid(format!("bad relation code {code} at offset {offset}")))
}

fn relation(ctx: &MatchContext<'_>) -> Result<Relation, RuntimeError> {
    ctx.relation
        .ok_or_else(|| RuntimeError::Script("relational match without a relation".to_string()))
}

/// `:value` - relational comparison of each value against each key.
pub struct ValueMatch;

impl MatchType for ValueMatch {
    fn name(&self) -> &'static str {
        "value"
    }

    fn read_params(&self, rd: &mut Reader<'_>) -> Result<Option<Relation>, CodecError> {
        read_relation(rd)
    }

    fn match_one(
        &self,
        ctx: &mut MatchContext<'_>,
        value: &str,
        key: &str,
    ) -> Result<bool, RuntimeError> {
        let relation = relation(ctx)?;
        Ok(relation.holds(ctx.comparator.compare(value, key)))
    }
}

/// `:count` - relational comparison of the number of values.
pub struct CountMatch;

impl MatchType for CountMatch {
    fn name(&self) -> &'static str {
        "count"
    }

    fn read_params(&self, rd: &mut Reader<'_>) -> Result<Option<Relation>, CodecError> {
        read_relation(rd)
    }

    fn match_one(
        &self,
        _ctx: &mut MatchContext<'_>,
        _value: &str,
        _key: &str,
    ) -> Result<bool, RuntimeError> {
        Err(RuntimeError::Script(
            "count match evaluated per-value".to_string(),
        ))
    }

    fn matches(
        &self,
        ctx: &mut MatchContext<'_>,
        values: &[String],
        keys: &[String],
    ) -> Result<bool, RuntimeError> {
        let relation = relation(ctx)?;
        let count = values.len() as u64;
        for key in keys {
            let Ok(expected) = key.trim().parse::<u64>() else {
                tracing::warn!(key, "non-numeric :count key ignored");
                continue;
            };
            if relation.holds(count.cmp(&expected)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub static COUNT: CountMatch = CountMatch;
pub static VALUE: ValueMatch = ValueMatch;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{CASEMAP, NUMERIC};
    use crate::match_type::RegexCache;

    fn ctx<'a>(
        comparator: &'static dyn crate::comparator::Comparator,
        relation: Relation,
        regexes: &'a mut RegexCache,
        captured: &'a mut Vec<String>,
    ) -> MatchContext<'a> {
        MatchContext {
            comparator,
            relation: Some(relation),
            regexes,
            captured,
        }
    }

    #[test]
    fn test_count() {
        let mut regexes = RegexCache::default();
        let mut captured = Vec::new();
        let values = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let mut c = ctx(&CASEMAP, Relation::Ge, &mut regexes, &mut captured);
        assert!(COUNT.matches(&mut c, &values, &["3".to_string()]).unwrap());
        assert!(COUNT.matches(&mut c, &values, &["2".to_string()]).unwrap());
        assert!(!COUNT.matches(&mut c, &values, &["4".to_string()]).unwrap());

        let mut c = ctx(&CASEMAP, Relation::Lt, &mut regexes, &mut captured);
        assert!(!COUNT.matches(&mut c, &values, &["3".to_string()]).unwrap());
        // Non-numeric keys are skipped.
        assert!(!COUNT.matches(&mut c, &values, &["x".to_string()]).unwrap());
    }

    #[test]
    fn test_value_numeric() {
        let mut regexes = RegexCache::default();
        let mut captured = Vec::new();
        let mut c = ctx(&NUMERIC, Relation::Gt, &mut regexes, &mut captured);
        assert!(VALUE.match_one(&mut c, "10", "9").unwrap());
        assert!(!VALUE.match_one(&mut c, "9", "10").unwrap());
    }

    #[test]
    fn test_missing_relation_is_error() {
        let mut regexes = RegexCache::default();
        let mut captured = Vec::new();
        let mut c = MatchContext {
            comparator: &CASEMAP,
            relation: None,
            regexes: &mut regexes,
            captured: &mut captured,
        };
        assert!(VALUE.match_one(&mut c, "a", "b").is_err());
    }
}
