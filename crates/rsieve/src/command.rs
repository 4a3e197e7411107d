//! The command/test handler surface.
//!
//! Every Sieve command and test - core or extension - implements
//! [`Command`]. The validator drives the declarative parts (positional
//! arity and types, tag sets, sub-test and block arity) and calls
//! `validate` for semantics; the generator calls `generate` to emit
//! bytecode.

use rsieve_ast::{ArgValue, NodeKind};

use crate::address_part::AddressPart;
use crate::comparator::Comparator;
use crate::error::Result;
use crate::extension::{ResolvedOperand, SideEffect};
use crate::generate::Generator;
use crate::match_type::{MatchType, Relation};
use crate::validate::{Scanned, ValidateCtx};

/// Parameter following one of a command's own tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    None,
    Number,
    String,
    StringList,
}

/// One tag a command registers for itself (`:over`, `:days`, ...).
#[derive(Clone, Copy, Debug)]
pub struct TagSpec {
    pub name: &'static str,
    pub param: ParamKind,
}

/// Positional argument type. A one-element string list satisfies `String`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PosKind {
    String,
    StringList,
    Number,
}

/// One positional argument slot.
#[derive(Clone, Copy, Debug)]
pub struct PosSpec {
    pub name: &'static str,
    pub kind: PosKind,
}

/// Sub-test arity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtestArity {
    None,
    One,
    OneOrMore,
}

/// Declarative grammar of one command.
#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub positional: &'static [PosSpec],
    pub subtests: SubtestArity,
    /// Whether a `{ ... }` block is required (commands only).
    pub block: bool,
    /// Accept `:comparator` and match-type tags.
    pub match_tags: bool,
    /// Accept address-part tags.
    pub address_tag: bool,
    /// Accept side-effect tags (`:copy`, `:flags`).
    pub effect_tags: bool,
    pub own_tags: &'static [TagSpec],
}

impl CommandSpec {
    /// Plain spec: fixed positionals, nothing else.
    #[must_use]
    pub const fn plain(positional: &'static [PosSpec]) -> Self {
        Self {
            positional,
            subtests: SubtestArity::None,
            block: false,
            match_tags: false,
            address_tag: false,
            effect_tags: false,
            own_tags: &[],
        }
    }
}

/// Resolved `:comparator`/match-type/address-part tags of one test.
#[derive(Clone, Debug, Default)]
pub struct MatchArgs {
    pub comparator: Option<ResolvedOperand<dyn Comparator>>,
    pub match_type: Option<ResolvedOperand<dyn MatchType>>,
    pub relation: Option<Relation>,
    pub address_part: Option<ResolvedOperand<dyn AddressPart>>,
}

/// A resolved side-effect tag with its raw payload.
#[derive(Clone, Debug)]
pub struct ResolvedEffect {
    pub op: ResolvedOperand<dyn SideEffect>,
    /// Payload argument (a string list for `:flags`); `None` for bare
    /// tags like `:copy`.
    pub arg: Option<ArgValue>,
}

/// `vacation` tag values.
#[derive(Clone, Debug, Default)]
pub struct VacationData {
    pub days: Option<u64>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub addresses: Vec<String>,
    pub handle: Option<String>,
    pub mime: bool,
}

/// `set` case modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseModifier {
    Lower,
    Upper,
}

/// Validator-produced per-command bookkeeping, stored in a side table
/// keyed by node id.
#[derive(Clone, Debug, Default)]
pub enum CommandData {
    #[default]
    None,
    /// Match-style test.
    Match(MatchArgs),
    /// Action with optional side effects.
    Action(Vec<ResolvedEffect>),
    /// `size` discriminator.
    Size { over: bool },
    Vacation(VacationData),
    Set {
        name: String,
        case: Option<CaseModifier>,
    },
}

/// A command or test handler.
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> NodeKind;
    fn spec(&self) -> &'static CommandSpec;

    /// Semantic validation beyond the declarative spec. Errors are
    /// reported through the context; `None` means validation failed.
    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData>;

    /// Emit the opcode and operands for one node. `info` carries the
    /// validator's annotations, including the tag-stripped positional
    /// arguments.
    fn generate(
        &self,
        generator: &mut Generator<'_>,
        node: rsieve_ast::NodeId,
        info: &crate::validate::ResolvedNode,
    ) -> Result<()>;
}
