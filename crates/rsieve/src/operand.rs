//! Operand encoding conventions.
//!
//! Every operand starts with a one-byte class code. Codes below 128 are
//! the core classes defined here; codes of 128 and above select the
//! extension-dependency entry `code - 128`, which then resolves within
//! that extension's contributed operand table (with a trailing sub-variant
//! byte when the extension contributes more than one of the kind).
//!
//! The comparator / match-type / address-part / side-effect classes use
//! the same sub-128 split for their payload byte: small values index the
//! core table of that class, larger ones go through the dependency table.

use crate::address_part::{AddressPart, CORE_ADDRESS_PARTS, default_address_part};
use crate::comparator::{CORE_COMPARATORS, Comparator, default_comparator};
use crate::error::RuntimeError;
use crate::extension::{Extension, SideEffect, SideEffectValue};
use crate::interp::{CodeReader, Runtime};
use crate::match_type::{CORE_MATCH_TYPES, MatchType, Relation, default_match_type};
use rsieve_binary::CodecError;

// Operand class codes.
pub const OPERAND_NUMBER: u8 = 0;
pub const OPERAND_STRING: u8 = 1;
pub const OPERAND_STRING_LIST: u8 = 2;
pub const OPERAND_COMPARATOR: u8 = 3;
pub const OPERAND_MATCH_TYPE: u8 = 4;
pub const OPERAND_ADDRESS_PART: u8 = 5;
pub const OPERAND_SIDE_EFFECT: u8 = 6;
pub const OPERAND_VARIABLE_REF: u8 = 7;

// Optional-operand trailer codes. Codes from `OPT_CUSTOM_BASE` on are
// operation-specific.
pub const OPT_END: u8 = 0;
pub const OPT_COMPARATOR: u8 = 1;
pub const OPT_MATCH_TYPE: u8 = 2;
pub const OPT_ADDRESS_PART: u8 = 3;
pub const OPT_SIDE_EFFECT: u8 = 4;
pub const OPT_CUSTOM_BASE: u8 = 5;

impl<'a> CodeReader<'a> {
    fn expect_class(&mut self, class: u8) -> Result<(), CodecError> {
        let offset = self.rd.pos();
        let got = self.rd.read_u8()?;
        if got == class {
            Ok(())
        } else {
            Err(CodecError::UnknownOperand { offset, class: got })
        }
    }

    /// Read an opcode and resolve it to an operation. Codes of 128 and
    /// above select an extension's operation table; the sub-code follows.
    pub fn read_opcode(&mut self) -> Result<&'static dyn crate::extension::Operation, CodecError> {
        let offset = self.rd.pos();
        let code = self.rd.read_u8()?;
        if code < 128 {
            return crate::core::CORE_OPS
                .get(code as usize)
                .copied()
                .ok_or(CodecError::UnknownOpcode { offset, code });
        }
        let dep = self.dep((code - 128) as usize)?;
        let sub = self.rd.read_u8()?;
        dep.ext
            .operations()
            .get(sub as usize)
            .copied()
            .ok_or(CodecError::UnknownOpcode { offset, code: sub })
    }

    pub fn read_number(&mut self) -> Result<u64, CodecError> {
        self.expect_class(OPERAND_NUMBER)?;
        self.rd.read_varint()
    }

    /// Read a string operand, substituting variables when the binary uses
    /// an extension string operand.
    pub fn read_string(&mut self, rt: &mut Runtime<'_>) -> Result<String, RuntimeError> {
        let offset = self.rd.pos();
        let class = self.rd.read_u8().map_err(CodecError::from)?;
        match class {
            OPERAND_STRING => Ok(self.rd.read_string().map_err(CodecError::from)?.to_string()),
            code if code >= 128 => {
                let dep = self.dep((code - 128) as usize)?;
                let ops = dep.ext.string_operands();
                let op = if ops.len() > 1 {
                    let sub = self.rd.read_u8().map_err(CodecError::from)?;
                    ops.get(sub as usize)
                } else {
                    ops.first()
                };
                let op = op.ok_or(CodecError::UnknownOperand {
                    offset,
                    class: code,
                })?;
                op.read(rt, self)
            }
            class => Err(CodecError::UnknownOperand { offset, class }.into()),
        }
    }

    /// Dump-safe string read: renders variable operands symbolically.
    pub fn dump_string(&mut self) -> Result<String, CodecError> {
        let offset = self.rd.pos();
        let class = self.rd.read_u8()?;
        match class {
            OPERAND_STRING => Ok(format!("\"{}\"", self.rd.read_string()?)),
            code if code >= 128 => {
                let dep = self.dep((code - 128) as usize)?;
                let ops = dep.ext.string_operands();
                let op = if ops.len() > 1 {
                    let sub = self.rd.read_u8()?;
                    ops.get(sub as usize)
                } else {
                    ops.first()
                };
                let op = op.ok_or(CodecError::UnknownOperand {
                    offset,
                    class: code,
                })?;
                op.dump(self)
            }
            class => Err(CodecError::UnknownOperand { offset, class }),
        }
    }

    pub fn read_string_list(&mut self, rt: &mut Runtime<'_>) -> Result<Vec<String>, RuntimeError> {
        self.expect_class(OPERAND_STRING_LIST)?;
        let count = self.rd.read_varint().map_err(CodecError::from)?;
        let mut items = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            items.push(self.read_string(rt)?);
        }
        Ok(items)
    }

    pub fn dump_string_list(&mut self) -> Result<Vec<String>, CodecError> {
        self.expect_class(OPERAND_STRING_LIST)?;
        let count = self.rd.read_varint()?;
        let mut items = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            items.push(self.dump_string()?);
        }
        Ok(items)
    }

    /// Read a `${name}` target reference (the `set` command destination).
    pub fn read_variable_ref(&mut self) -> Result<String, CodecError> {
        self.expect_class(OPERAND_VARIABLE_REF)?;
        Ok(self.rd.read_string()?.to_string())
    }

    /// Shared <128 core / ≥128 extension selector for class operands.
    fn read_selector<T: ?Sized + 'static>(
        &mut self,
        core: &'static [&'static T],
        table: impl Fn(&dyn Extension) -> &'static [&'static T],
    ) -> Result<&'static T, CodecError> {
        let offset = self.rd.pos();
        let code = self.rd.read_u8()?;
        if code < 128 {
            return core
                .get(code as usize)
                .copied()
                .ok_or(CodecError::UnknownOperand {
                    offset,
                    class: code,
                });
        }
        let dep = self.dep((code - 128) as usize)?;
        let items = table(dep.ext.as_ref());
        let item = if items.len() > 1 {
            let sub = self.rd.read_u8()?;
            items.get(sub as usize)
        } else {
            items.first()
        };
        item.copied().ok_or(CodecError::UnknownOperand {
            offset,
            class: code,
        })
    }

    pub fn read_comparator(&mut self) -> Result<&'static dyn Comparator, CodecError> {
        self.expect_class(OPERAND_COMPARATOR)?;
        self.read_selector(&CORE_COMPARATORS, |ext| ext.comparators())
    }

    pub fn read_match_type(
        &mut self,
    ) -> Result<(&'static dyn MatchType, Option<Relation>), CodecError> {
        self.expect_class(OPERAND_MATCH_TYPE)?;
        let def = self.read_selector(&CORE_MATCH_TYPES, |ext| ext.match_types())?;
        let relation = def.read_params(&mut self.rd)?;
        Ok((def, relation))
    }

    pub fn read_address_part(&mut self) -> Result<&'static dyn AddressPart, CodecError> {
        self.expect_class(OPERAND_ADDRESS_PART)?;
        self.read_selector(&CORE_ADDRESS_PARTS, |ext| ext.address_parts())
    }

    pub fn read_side_effect(
        &mut self,
        rt: &mut Runtime<'_>,
    ) -> Result<(&'static dyn SideEffect, SideEffectValue), RuntimeError> {
        self.expect_class(OPERAND_SIDE_EFFECT)?;
        let def = self.read_selector(&[], |ext| ext.side_effects())?;
        let value = def.read(rt, self)?;
        Ok((def, value))
    }

    pub fn dump_side_effect(&mut self) -> Result<&'static dyn SideEffect, CodecError> {
        self.expect_class(OPERAND_SIDE_EFFECT)?;
        self.read_selector(&[], |ext| ext.side_effects())
    }
}

/// Decoded optional-operand trailer of a test or action.
pub struct TestOptionals {
    pub comparator: &'static dyn Comparator,
    pub match_type: &'static dyn MatchType,
    pub relation: Option<Relation>,
    pub address_part: &'static dyn AddressPart,
    pub effects: Vec<(&'static dyn SideEffect, SideEffectValue)>,
}

impl Default for TestOptionals {
    fn default() -> Self {
        Self {
            comparator: default_comparator(),
            match_type: default_match_type(),
            relation: None,
            address_part: default_address_part(),
            effects: Vec::new(),
        }
    }
}

impl TestOptionals {
    /// Explicit `:flags` payload, if one was attached.
    #[must_use]
    pub fn flags(&self) -> Option<&[String]> {
        self.effects.iter().find_map(|(_, value)| match value {
            SideEffectValue::Flags(flags) => Some(flags.as_slice()),
            SideEffectValue::Copy => None,
        })
    }

    /// Whether `:copy` was attached.
    #[must_use]
    pub fn copy(&self) -> bool {
        self.effects
            .iter()
            .any(|(_, value)| matches!(value, SideEffectValue::Copy))
    }
}

/// Read an optional trailer, dispatching operation-specific codes to
/// `custom`. `custom` returns false for codes it does not understand,
/// which aborts the decode - unknown optionals must never be skipped
/// silently.
pub fn read_trailer_with<F>(
    rt: &mut Runtime<'_>,
    rd: &mut CodeReader<'_>,
    mut custom: F,
) -> Result<TestOptionals, RuntimeError>
where
    F: FnMut(u8, &mut Runtime<'_>, &mut CodeReader<'_>) -> Result<bool, RuntimeError>,
{
    let mut opts = TestOptionals::default();
    let marker = rd.rd.read_u8().map_err(CodecError::from)?;
    if marker == 0 {
        return Ok(opts);
    }
    loop {
        let offset = rd.rd.pos();
        let code = rd.rd.read_u8().map_err(CodecError::from)?;
        match code {
            OPT_END => return Ok(opts),
            OPT_COMPARATOR => opts.comparator = rd.read_comparator()?,
            OPT_MATCH_TYPE => {
                let (def, relation) = rd.read_match_type()?;
                opts.match_type = def;
                opts.relation = relation;
            }
            OPT_ADDRESS_PART => opts.address_part = rd.read_address_part()?,
            OPT_SIDE_EFFECT => {
                let effect = rd.read_side_effect(rt)?;
                opts.effects.push(effect);
            }
            code => {
                if !custom(code, rt, rd)? {
                    return Err(CodecError::UnknownOptional { offset, code }.into());
                }
            }
        }
    }
}

/// Read a trailer that carries no operation-specific codes.
pub fn read_trailer(
    rt: &mut Runtime<'_>,
    rd: &mut CodeReader<'_>,
) -> Result<TestOptionals, RuntimeError> {
    read_trailer_with(rt, rd, |_, _, _| Ok(false))
}
