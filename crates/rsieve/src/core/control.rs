//! Control flow: `require`, `if`/`elsif`/`else`, `stop`, and the jump
//! operations everything conditional compiles down to.

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{Command, CommandData, CommandSpec, PosKind, PosSpec, SubtestArity};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::Operation;
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::validate::{REQUIRE_PLACEMENT_ERROR, ResolvedNode, Scanned, ValidateCtx};

// ============= require =============

pub struct CmdRequire;

static REQUIRE_SPEC: CommandSpec = CommandSpec::plain(&[PosSpec {
    name: "capabilities",
    kind: PosKind::StringList,
}]);

impl Command for CmdRequire {
    fn name(&self) -> &'static str {
        "require"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &REQUIRE_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        if !ctx.is_toplevel() || !ctx.validator.is_require_allowed() {
            ctx.error(REQUIRE_PLACEMENT_ERROR);
            return None;
        }
        let location = ctx.location();
        let names: Vec<String> = scanned.positionals[0]
            .value
            .as_string_list()?
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let mut ok = true;
        for name in &names {
            if !ctx.validator.require_extension(name, location) {
                ok = false;
            }
        }
        ok.then_some(CommandData::None)
    }

    fn generate(&self, _gen: &mut Generator<'_>, _node: NodeId, _info: &ResolvedNode) -> Result<()> {
        // Declarative only; the dependency table is seeded from the
        // validator's require list.
        Ok(())
    }
}

// ============= if / elsif / else =============

pub struct CmdIf;
pub struct CmdElsif;
pub struct CmdElse;

static IF_SPEC: CommandSpec = CommandSpec {
    positional: &[],
    subtests: SubtestArity::One,
    block: true,
    match_tags: false,
    address_tag: false,
    effect_tags: false,
    own_tags: &[],
};

static ELSE_SPEC: CommandSpec = CommandSpec {
    positional: &[],
    subtests: SubtestArity::None,
    block: true,
    match_tags: false,
    address_tag: false,
    effect_tags: false,
    own_tags: &[],
};

macro_rules! conditional_command {
    ($ty:ident, $name:literal, $spec:ident) => {
        impl Command for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn kind(&self) -> NodeKind {
                NodeKind::Command
            }

            fn spec(&self) -> &'static CommandSpec {
                &$spec
            }

            fn validate(
                &self,
                _ctx: &mut ValidateCtx<'_, '_>,
                _scanned: Scanned,
            ) -> Option<CommandData> {
                Some(CommandData::None)
            }

            fn generate(
                &self,
                _gen: &mut Generator<'_>,
                _node: NodeId,
                _info: &ResolvedNode,
            ) -> Result<()> {
                // Conditional chains are generated structurally by the
                // block generator.
                Err(SieveError::Internal(concat!(
                    "'",
                    $name,
                    "' reached the generic generation path"
                )
                .to_string()))
            }
        }
    };
}

conditional_command!(CmdIf, "if", IF_SPEC);
conditional_command!(CmdElsif, "elsif", IF_SPEC);
conditional_command!(CmdElse, "else", ELSE_SPEC);

// ============= stop =============

pub struct CmdStop;

static STOP_SPEC: CommandSpec = CommandSpec::plain(&[]);

impl Command for CmdStop {
    fn name(&self) -> &'static str {
        "stop"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &STOP_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, _scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::None)
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, _info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_STOP);
        Ok(())
    }
}

// ============= Operations =============

fn read_jump_target(rd: &mut CodeReader<'_>) -> std::result::Result<usize, RuntimeError> {
    let offset = rd.rd.read_i32().map_err(CodecError::from)?;
    let base = rd.rd.pos() as i64;
    let target = base + i64::from(offset);
    if target < 0 || target > rd.rd.len() as i64 {
        return Err(RuntimeError::Corrupt(CodecError::Invalid(format!(
            "jump target {target} outside program"
        ))));
    }
    Ok(target as usize)
}

pub struct JmpOp;

impl Operation for JmpOp {
    fn name(&self) -> &'static str {
        "JMP"
    }

    fn execute(&self, _rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let target = read_jump_target(rd)?;
        rd.rd.seek(target).map_err(CodecError::from)?;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_jump()
    }
}

pub struct JmpTrueOp;

impl Operation for JmpTrueOp {
    fn name(&self) -> &'static str {
        "JMPTRUE"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let target = read_jump_target(rd)?;
        if rt.test_result {
            rd.rd.seek(target).map_err(CodecError::from)?;
        }
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_jump()
    }
}

pub struct JmpFalseOp;

impl Operation for JmpFalseOp {
    fn name(&self) -> &'static str {
        "JMPFALSE"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let target = read_jump_target(rd)?;
        if !rt.test_result {
            rd.rd.seek(target).map_err(CodecError::from)?;
        }
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_jump()
    }
}

pub struct StopOp;

impl Operation for StopOp {
    fn name(&self) -> &'static str {
        "STOP"
    }

    fn execute(&self, rt: &mut Runtime<'_>, _rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        rt.trace(TraceLevel::Commands, || "stop".to_string());
        rt.stopped = true;
        Ok(())
    }

    fn dump(&self, _d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        Ok(())
    }
}

pub static CMD_REQUIRE: CmdRequire = CmdRequire;
pub static CMD_IF: CmdIf = CmdIf;
pub static CMD_ELSIF: CmdElsif = CmdElsif;
pub static CMD_ELSE: CmdElse = CmdElse;
pub static CMD_STOP: CmdStop = CmdStop;

pub static JMP_OP: JmpOp = JmpOp;
pub static JMP_TRUE_OP: JmpTrueOp = JmpTrueOp;
pub static JMP_FALSE_OP: JmpFalseOp = JmpFalseOp;
pub static STOP_OP: StopOp = StopOp;
