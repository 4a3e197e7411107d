//! The `subaddress` extension (RFC 5233): `:user` and `:detail` address
//! parts for `user+detail@domain` style addresses.

use crate::address_part::AddressPart;
use crate::extension::{ExtId, Extension, OperandSource};
use crate::msg::Address;
use crate::validate::Validator;

const SUB_USER: u8 = 0;
const SUB_DETAIL: u8 = 1;

pub struct SubaddressExtension;

static ADDRESS_PARTS: [&'static dyn AddressPart; 2] = [&USER, &DETAIL];

impl Extension for SubaddressExtension {
    fn name(&self) -> &'static str {
        "subaddress"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_address_part("user", OperandSource::Ext { ext: id, sub: SUB_USER }, &USER);
        validator.register_address_part(
            "detail",
            OperandSource::Ext { ext: id, sub: SUB_DETAIL },
            &DETAIL,
        );
    }

    fn address_parts(&self) -> &'static [&'static dyn AddressPart] {
        &ADDRESS_PARTS
    }
}

/// `:user` - the mailbox up to the separator.
pub struct UserPart;

impl AddressPart for UserPart {
    fn name(&self) -> &'static str {
        "user"
    }

    fn extract(&self, address: &Address) -> Option<String> {
        match address.mailbox.split_once('+') {
            Some((user, _)) => Some(user.to_string()),
            None => Some(address.mailbox.clone()),
        }
    }
}

/// `:detail` - the mailbox past the separator; absent when there is none.
pub struct DetailPart;

impl AddressPart for DetailPart {
    fn name(&self) -> &'static str {
        "detail"
    }

    fn extract(&self, address: &Address) -> Option<String> {
        address
            .mailbox
            .split_once('+')
            .map(|(_, detail)| detail.to_string())
    }
}

pub static USER: UserPart = UserPart;
pub static DETAIL: DetailPart = DetailPart;

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(mailbox: &str) -> Address {
        Address {
            name: None,
            mailbox: mailbox.into(),
            domain: "example.org".into(),
        }
    }

    #[test]
    fn test_user_and_detail() {
        let a = addr("alice+lists");
        assert_eq!(USER.extract(&a).as_deref(), Some("alice"));
        assert_eq!(DETAIL.extract(&a).as_deref(), Some("lists"));
    }

    #[test]
    fn test_without_separator() {
        let a = addr("alice");
        assert_eq!(USER.extract(&a).as_deref(), Some("alice"));
        assert_eq!(DETAIL.extract(&a), None);
    }

    #[test]
    fn test_empty_detail() {
        let a = addr("alice+");
        assert_eq!(DETAIL.extract(&a).as_deref(), Some(""));
    }
}
