//! Comparators: string equality and ordering conventions.
//!
//! `i;octet` and `i;ascii-casemap` are core (operand codes 0 and 1);
//! `i;ascii-numeric` is a separate requirable extension. The hidden
//! `@comparators` extension owns the `:comparator` tag and seeds the
//! validator registry with the core pair.

use std::cmp::Ordering;

use crate::extension::{ExtId, Extension, NamedExtension, OperandSource};
use crate::validate::Validator;

/// String comparison convention bound to a test.
pub trait Comparator: Send + Sync {
    /// Registered name, e.g. `i;ascii-casemap`.
    fn name(&self) -> &'static str;

    /// Total order used by `is` equality and relational `:value`.
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Substring match for `:contains`. `None` when the comparator has no
    /// substring semantics (`i;ascii-numeric`).
    fn contains(&self, haystack: &str, needle: &str) -> Option<bool>;

    /// Whether pattern matching under this comparator folds ASCII case.
    fn case_insensitive(&self) -> bool {
        false
    }

    fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

// ============= Core comparators =============

/// Byte identity.
pub struct OctetComparator;

impl Comparator for OctetComparator {
    fn name(&self) -> &'static str {
        "i;octet"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }

    fn contains(&self, haystack: &str, needle: &str) -> Option<bool> {
        Some(haystack.contains(needle))
    }
}

/// ASCII case-fold, then byte identity. The default comparator.
pub struct CasemapComparator;

impl Comparator for CasemapComparator {
    fn name(&self) -> &'static str {
        "i;ascii-casemap"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let a = a.bytes().map(|b| b.to_ascii_lowercase());
        let b = b.bytes().map(|b| b.to_ascii_lowercase());
        a.cmp(b)
    }

    fn contains(&self, haystack: &str, needle: &str) -> Option<bool> {
        if needle.is_empty() {
            return Some(true);
        }
        let haystack = haystack.to_ascii_lowercase();
        let needle = needle.to_ascii_lowercase();
        Some(haystack.contains(&needle))
    }

    fn case_insensitive(&self) -> bool {
        true
    }
}

/// RFC 4790 `i;ascii-numeric`: compare the leading digit run as a number;
/// a value with no leading digits sorts above every number.
pub struct NumericComparator;

impl NumericComparator {
    /// Leading digit run as a number; `None` means positive infinity.
    fn numeric_prefix(value: &str) -> Option<u64> {
        let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        // Saturate on absurdly long digit runs rather than erroring.
        Some(digits.parse().unwrap_or(u64::MAX))
    }
}

impl Comparator for NumericComparator {
    fn name(&self) -> &'static str {
        "i;ascii-numeric"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (Self::numeric_prefix(a), Self::numeric_prefix(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn contains(&self, _haystack: &str, _needle: &str) -> Option<bool> {
        None
    }
}

pub static OCTET: OctetComparator = OctetComparator;
pub static CASEMAP: CasemapComparator = CasemapComparator;
pub static NUMERIC: NumericComparator = NumericComparator;

/// Core comparator operand table. Index = wire code.
pub static CORE_COMPARATORS: [&'static dyn Comparator; 2] = [&OCTET, &CASEMAP];

pub const CORE_OCTET: u8 = 0;
pub const CORE_CASEMAP: u8 = 1;

/// The default comparator when `:comparator` is absent.
#[must_use]
pub fn default_comparator() -> &'static dyn Comparator {
    &CASEMAP
}

// ============= Extensions =============

/// Hidden preloaded extension owning the `:comparator` tag and the core
/// comparator registrations.
pub struct ComparatorExtension;

impl Extension for ComparatorExtension {
    fn name(&self) -> &'static str {
        "@comparators"
    }

    fn validator_load(&self, _id: ExtId, validator: &mut Validator<'_>) {
        validator.register_comparator("i;octet", OperandSource::Core(CORE_OCTET), &OCTET);
        validator.register_comparator(
            "i;ascii-casemap",
            OperandSource::Core(CORE_CASEMAP),
            &CASEMAP,
        );
    }
}

/// `comparator-i;ascii-numeric` extension.
pub struct NumericComparatorExtension;

static NUMERIC_COMPARATORS: [&'static dyn Comparator; 1] = [&NUMERIC];

impl Extension for NumericComparatorExtension {
    fn name(&self) -> &'static str {
        "comparator-i;ascii-numeric"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_comparator(
            "i;ascii-numeric",
            OperandSource::Ext { ext: id, sub: 0 },
            &NUMERIC,
        );
    }

    fn comparators(&self) -> &'static [&'static dyn Comparator] {
        &NUMERIC_COMPARATORS
    }
}

/// The requirable no-op capabilities for the core pair.
#[must_use]
pub fn dummy_extensions() -> [NamedExtension; 2] {
    [
        NamedExtension {
            name: "comparator-i;octet",
        },
        NamedExtension {
            name: "comparator-i;ascii-casemap",
        },
    ]
}
