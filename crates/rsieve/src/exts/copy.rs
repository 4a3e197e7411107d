//! The `copy` extension (RFC 3894): `:copy` on `fileinto`/`redirect`
//! preserves the implicit keep.

use rsieve_binary::CodecError;

use crate::dump::Dumper;
use crate::error::RuntimeError;
use crate::extension::{ExtId, Extension, OperandSource, SideEffect, SideEffectValue};
use crate::interp::{CodeReader, Runtime};
use crate::validate::Validator;

pub struct CopyExtension;

static SIDE_EFFECTS: [&'static dyn SideEffect; 1] = [&COPY];

impl Extension for CopyExtension {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_effect("copy", OperandSource::Ext { ext: id, sub: 0 }, &COPY);
    }

    fn side_effects(&self) -> &'static [&'static dyn SideEffect] {
        &SIDE_EFFECTS
    }
}

pub struct CopyEffect;

impl SideEffect for CopyEffect {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn applies_to(&self, command: &str) -> bool {
        matches!(command, "fileinto" | "redirect")
    }

    fn read(
        &self,
        _rt: &mut Runtime<'_>,
        _rd: &mut CodeReader<'_>,
    ) -> Result<SideEffectValue, RuntimeError> {
        Ok(SideEffectValue::Copy)
    }

    fn dump(&self, _d: &mut Dumper<'_>) -> Result<(), CodecError> {
        Ok(())
    }
}

pub static COPY: CopyEffect = CopyEffect;
