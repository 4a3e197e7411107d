//! Bundled extensions.
//!
//! Registration order is the capability order: the preloaded hidden trio
//! takes the lowest ids, then the requirable core capabilities, then the
//! optional extensions.

pub mod copy;
pub mod envelope;
pub mod fileinto;
pub mod imap4flags;
pub mod regex;
pub mod reject;
pub mod relational;
pub mod subaddress;
pub mod vacation;
pub mod variables;

use std::sync::Arc;

use crate::address_part::AddressPartExtension;
use crate::comparator::{ComparatorExtension, NumericComparatorExtension, dummy_extensions};
use crate::config::SieveConfig;
use crate::error::Result;
use crate::match_type::MatchTypeExtension;
use crate::registry::ExtensionRegistry;

/// Register the bundled extension set with a fresh registry.
pub fn register_bundled(registry: &mut ExtensionRegistry, config: &SieveConfig) -> Result<()> {
    // Preloaded trio: always ids 0..2.
    registry.register_required(Arc::new(ComparatorExtension))?;
    registry.register_required(Arc::new(MatchTypeExtension))?;
    registry.register_required(Arc::new(AddressPartExtension))?;

    // Requirable names for the core comparators.
    for dummy in dummy_extensions() {
        registry.register(Arc::new(dummy))?;
    }

    registry.register(Arc::new(fileinto::FileintoExtension))?;
    registry.register(Arc::new(reject::RejectExtension))?;
    registry.register(Arc::new(envelope::EnvelopeExtension))?;
    registry.register(Arc::new(vacation::VacationExtension))?;
    registry.register(Arc::new(subaddress::SubaddressExtension))?;
    registry.register(Arc::new(NumericComparatorExtension))?;
    registry.register(Arc::new(relational::RelationalExtension))?;
    registry.register(Arc::new(regex::RegexExtension))?;
    registry.register(Arc::new(imap4flags::Imap4FlagsExtension::new()))?;
    registry.register(Arc::new(copy::CopyExtension))?;
    registry.register(Arc::new(variables::VariablesExtension))?;

    if config.allow_deprecated {
        registry.register(Arc::new(imap4flags::Imap4FlagsExtension::deprecated()))?;
    }

    Ok(())
}
