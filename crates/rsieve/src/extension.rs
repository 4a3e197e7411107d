//! The extension capability surface.
//!
//! Everything pluggable in the engine - commands, tests, opcodes, operand
//! kinds, comparators, match types, address parts, side effects - is
//! contributed by an [`Extension`]. The core language itself uses the same
//! seams; only its operand tables are wired in at fixed positions below
//! code 128.

use crate::address_part::AddressPart;
use crate::comparator::Comparator;
use crate::error::{RuntimeError, SieveError};
use crate::interp::{CodeReader, Runtime};
use crate::match_type::MatchType;
use crate::validate::Validator;
use rsieve_binary::CodecError;

/// Instance-local dense extension id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExtId(pub(crate) u32);

impl ExtId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a resolved operand comes from: the fixed core table of its class,
/// or an extension (with a sub-variant when the extension contributes more
/// than one of that kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandSource {
    Core(u8),
    Ext { ext: ExtId, sub: u8 },
}

/// A validated operand: its wire identity plus the definition to call.
pub struct ResolvedOperand<T: ?Sized + 'static> {
    pub source: OperandSource,
    pub def: &'static T,
}

impl<T: ?Sized> Clone for ResolvedOperand<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            def: self.def,
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ResolvedOperand<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOperand")
            .field("source", &self.source)
            .finish()
    }
}

/// One executable operation (opcode body).
pub trait Operation: Send + Sync {
    /// Mnemonic used by the dumper.
    fn name(&self) -> &'static str;

    /// Read operands and act. Tests set the runtime's test register;
    /// actions append to the result; jumps reposition the reader.
    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> Result<(), RuntimeError>;

    /// Render operands for the binary dumper.
    fn dump(&self, d: &mut crate::dump::Dumper<'_>) -> Result<(), CodecError>;
}

/// Value produced by decoding a side-effect operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SideEffectValue {
    /// Explicit IMAP flags for a storing action.
    Flags(Vec<String>),
    /// Preserve the implicit keep (`:copy`).
    Copy,
}

/// A side effect attachable to action operations via the optional-operand
/// trailer.
pub trait SideEffect: Send + Sync {
    /// Tag name that selects this effect (`copy`, `flags`).
    fn name(&self) -> &'static str;

    /// Whether this effect may be attached to the named command.
    fn applies_to(&self, command: &str) -> bool;

    /// Parameter following the tag (`:flags` takes a string list).
    fn param_kind(&self) -> crate::command::ParamKind {
        crate::command::ParamKind::None
    }

    /// Decode the wire payload.
    fn read(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>)
    -> Result<SideEffectValue, RuntimeError>;

    /// Render the payload for the dumper.
    fn dump(&self, d: &mut crate::dump::Dumper<'_>) -> Result<(), CodecError>;
}

/// String-producing operand contributed by an extension (the `variables`
/// substitution string is the one shipped in-tree).
pub trait StringOperand: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode and produce the runtime string value.
    fn read(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> Result<String, RuntimeError>;

    /// Decode for the dumper, producing a symbolic rendering.
    fn dump(&self, rd: &mut CodeReader<'_>) -> Result<String, CodecError>;
}

/// An engine extension.
///
/// Hooks default to no-ops so small extensions stay small. Names starting
/// with `@` are hidden: they never appear in the capability string and
/// cannot be `require`d.
pub trait Extension: Send + Sync {
    /// Capability name (`fileinto`, `comparator-i;ascii-numeric`, ...).
    fn name(&self) -> &'static str;

    /// One-time load hook, run when the extension is registered with an
    /// instance.
    fn load(&self) -> Result<(), SieveError> {
        Ok(())
    }

    /// Register commands, tests and tag claimers. Runs at validator
    /// creation for the preloaded trio and on `require` for everything
    /// else.
    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        let _ = (id, validator);
    }

    /// Set up per-run interpreter state.
    fn interpreter_load(&self, id: ExtId, rt: &mut Runtime<'_>) {
        let _ = (id, rt);
    }

    /// Operations owned by this extension, indexed by sub-code.
    fn operations(&self) -> &'static [&'static dyn Operation] {
        &[]
    }

    /// Comparators contributed, indexed by sub-variant.
    fn comparators(&self) -> &'static [&'static dyn Comparator] {
        &[]
    }

    /// Match types contributed, indexed by sub-variant.
    fn match_types(&self) -> &'static [&'static dyn MatchType] {
        &[]
    }

    /// Address parts contributed, indexed by sub-variant.
    fn address_parts(&self) -> &'static [&'static dyn AddressPart] {
        &[]
    }

    /// Side effects contributed, indexed by sub-variant.
    fn side_effects(&self) -> &'static [&'static dyn SideEffect] {
        &[]
    }

    /// String operands contributed, indexed by sub-variant.
    fn string_operands(&self) -> &'static [&'static dyn StringOperand] {
        &[]
    }
}

/// Extensions with a name and nothing else. The dummy
/// `comparator-i;octet` / `comparator-i;ascii-casemap` capabilities are
/// instances: requiring them is legal but the comparators themselves are
/// core.
pub struct NamedExtension {
    pub name: &'static str,
}

impl Extension for NamedExtension {
    fn name(&self) -> &'static str {
        self.name
    }
}
