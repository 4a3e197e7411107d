//! Address parts: selectors over parsed addresses.
//!
//! `all`, `localpart` and `domain` are core (operand codes 0..2); the
//! `subaddress` extension adds `user` and `detail` in `exts/`.

use crate::extension::{ExtId, Extension, OperandSource};
use crate::msg::Address;
use crate::validate::Validator;

/// Extracts the matched substring from a parsed address. `None` means the
/// address has no such part and matches nothing.
pub trait AddressPart: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, address: &Address) -> Option<String>;
}

/// `:all` - the whole `mailbox@domain`.
pub struct AllPart;

impl AddressPart for AllPart {
    fn name(&self) -> &'static str {
        "all"
    }

    fn extract(&self, address: &Address) -> Option<String> {
        Some(address.email())
    }
}

/// `:localpart` - the mailbox.
pub struct LocalPart;

impl AddressPart for LocalPart {
    fn name(&self) -> &'static str {
        "localpart"
    }

    fn extract(&self, address: &Address) -> Option<String> {
        Some(address.mailbox.clone())
    }
}

/// `:domain` - the domain, when the address has one.
pub struct DomainPart;

impl AddressPart for DomainPart {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn extract(&self, address: &Address) -> Option<String> {
        if address.domain.is_empty() {
            None
        } else {
            Some(address.domain.clone())
        }
    }
}

pub static ALL: AllPart = AllPart;
pub static LOCALPART: LocalPart = LocalPart;
pub static DOMAIN: DomainPart = DomainPart;

/// Core address-part operand table. Index = wire code.
pub static CORE_ADDRESS_PARTS: [&'static dyn AddressPart; 3] = [&ALL, &LOCALPART, &DOMAIN];

pub const CORE_ALL: u8 = 0;
pub const CORE_LOCALPART: u8 = 1;
pub const CORE_DOMAIN: u8 = 2;

/// Default address part when none is specified.
#[must_use]
pub fn default_address_part() -> &'static dyn AddressPart {
    &ALL
}

/// Hidden preloaded extension owning the core address-part tags.
pub struct AddressPartExtension;

impl Extension for AddressPartExtension {
    fn name(&self) -> &'static str {
        "@address-parts"
    }

    fn validator_load(&self, _id: ExtId, validator: &mut Validator<'_>) {
        validator.register_address_part("all", OperandSource::Core(CORE_ALL), &ALL);
        validator.register_address_part(
            "localpart",
            OperandSource::Core(CORE_LOCALPART),
            &LOCALPART,
        );
        validator.register_address_part("domain", OperandSource::Core(CORE_DOMAIN), &DOMAIN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        Address {
            name: Some("Alice".into()),
            mailbox: "alice".into(),
            domain: "example.org".into(),
        }
    }

    #[test]
    fn test_core_parts() {
        let a = addr();
        assert_eq!(ALL.extract(&a).as_deref(), Some("alice@example.org"));
        assert_eq!(LOCALPART.extract(&a).as_deref(), Some("alice"));
        assert_eq!(DOMAIN.extract(&a).as_deref(), Some("example.org"));
    }

    #[test]
    fn test_domain_of_bare_mailbox() {
        let a = Address {
            name: None,
            mailbox: "postmaster".into(),
            domain: String::new(),
        };
        assert_eq!(DOMAIN.extract(&a), None);
        assert_eq!(ALL.extract(&a).as_deref(), Some("postmaster"));
    }

    #[test]
    fn test_table_order() {
        assert_eq!(CORE_ADDRESS_PARTS[CORE_ALL as usize].name(), "all");
        assert_eq!(
            CORE_ADDRESS_PARTS[CORE_LOCALPART as usize].name(),
            "localpart"
        );
        assert_eq!(CORE_ADDRESS_PARTS[CORE_DOMAIN as usize].name(), "domain");
    }
}
