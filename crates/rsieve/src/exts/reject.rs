//! The `reject` extension (RFC 5429).

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{Command, CommandData, CommandSpec, PosKind, PosSpec};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{ExtId, Extension, Operation};
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::result::Action;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_REJECT: u8 = 0;

pub struct RejectExtension;

static OPS: [&'static dyn Operation; 1] = [&REJECT_OP];

impl Extension for RejectExtension {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &CMD_REJECT);
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }
}

pub struct CmdReject;

static REJECT_SPEC: CommandSpec = CommandSpec::plain(&[PosSpec {
    name: "reason",
    kind: PosKind::String,
}]);

impl Command for CmdReject {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &REJECT_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, _scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::None)
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("reject without extension id".to_string()))?;
        generator.emit_ext_opcode(ext, SUB_REJECT)?;
        let reason = info.positionals[0]
            .value
            .as_single_string()
            .ok_or_else(|| SieveError::Internal("reject reason lost".to_string()))?;
        generator.emit_string(reason)
    }
}

pub struct RejectOp;

impl Operation for RejectOp {
    fn name(&self) -> &'static str {
        "REJECT"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let reason = rd.read_string(rt)?;
        rt.trace(TraceLevel::Actions, || "action: reject".to_string());
        rt.result.add(Action::Reject { reason })
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        let reason = d.string_operand()?;
        d.line(format!("reason: {reason}"));
        Ok(())
    }
}

pub static CMD_REJECT: CmdReject = CmdReject;
pub static REJECT_OP: RejectOp = RejectOp;
