//! Base actions: `keep`, `discard`, `redirect`.

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{Command, CommandData, CommandSpec, MatchArgs, PosKind, PosSpec};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::Operation;
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::operand::read_trailer;
use crate::result::Action;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx};

fn action_effects(info: &ResolvedNode) -> &[crate::command::ResolvedEffect] {
    match &info.data {
        CommandData::Action(effects) => effects,
        _ => &[],
    }
}

// ============= keep =============

pub struct CmdKeep;

static KEEP_SPEC: CommandSpec = CommandSpec {
    positional: &[],
    subtests: crate::command::SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: true,
    own_tags: &[],
};

impl Command for CmdKeep {
    fn name(&self) -> &'static str {
        "keep"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &KEEP_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::Action(scanned.effects))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_KEEP);
        let no_match_args = MatchArgs::default();
        let items = Generator::match_trailer_items(&no_match_args, action_effects(info));
        generator.emit_trailer(&items)
    }
}

pub struct KeepOp;

impl Operation for KeepOp {
    fn name(&self) -> &'static str {
        "KEEP"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let flags = opts
            .flags()
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| crate::exts::imap4flags::current_flags(rt));
        rt.trace(TraceLevel::Actions, || "action: keep".to_string());
        rt.result.add(Action::Keep { flags })
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()
    }
}

// ============= discard =============

pub struct CmdDiscard;

static DISCARD_SPEC: CommandSpec = CommandSpec::plain(&[]);

impl Command for CmdDiscard {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &DISCARD_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, _scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::None)
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, _info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_DISCARD);
        Ok(())
    }
}

pub struct DiscardOp;

impl Operation for DiscardOp {
    fn name(&self) -> &'static str {
        "DISCARD"
    }

    fn execute(&self, rt: &mut Runtime<'_>, _rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        rt.trace(TraceLevel::Actions, || "action: discard".to_string());
        rt.result.add(Action::Discard)
    }

    fn dump(&self, _d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        Ok(())
    }
}

// ============= redirect =============

pub struct CmdRedirect;

static REDIRECT_SPEC: CommandSpec = CommandSpec {
    positional: &[PosSpec {
        name: "address",
        kind: PosKind::String,
    }],
    subtests: crate::command::SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: true,
    own_tags: &[],
};

impl Command for CmdRedirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &REDIRECT_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        let address = scanned.positionals[0].value.as_single_string()?;
        if address.trim().is_empty() {
            ctx.error("redirect address must not be empty");
            return None;
        }
        Some(CommandData::Action(scanned.effects))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_REDIRECT);
        let no_match_args = MatchArgs::default();
        let items = Generator::match_trailer_items(&no_match_args, action_effects(info));
        generator.emit_trailer(&items)?;
        let address = info.positionals[0]
            .value
            .as_single_string()
            .ok_or_else(|| SieveError::Internal("redirect address lost".to_string()))?;
        generator.emit_string(address)
    }
}

pub struct RedirectOp;

impl Operation for RedirectOp {
    fn name(&self) -> &'static str {
        "REDIRECT"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let address = rd.read_string(rt)?;
        rt.trace(TraceLevel::Actions, || format!("action: redirect \"{address}\""));
        rt.result.add(Action::Redirect {
            address,
            copy: opts.copy(),
        })
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let address = d.string_operand()?;
        d.line(format!("address: {address}"));
        Ok(())
    }
}

pub static CMD_KEEP: CmdKeep = CmdKeep;
pub static CMD_DISCARD: CmdDiscard = CmdDiscard;
pub static CMD_REDIRECT: CmdRedirect = CmdRedirect;

pub static KEEP_OP: KeepOp = KeepOp;
pub static DISCARD_OP: DiscardOp = DiscardOp;
pub static REDIRECT_OP: RedirectOp = RedirectOp;
