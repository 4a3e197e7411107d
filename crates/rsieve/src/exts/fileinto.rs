//! The `fileinto` extension (RFC 5228 §4.1).

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{Command, CommandData, CommandSpec, MatchArgs, PosKind, PosSpec};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{ExtId, Extension, Operation};
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::operand::read_trailer;
use crate::result::Action;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_FILEINTO: u8 = 0;

pub struct FileintoExtension;

static OPS: [&'static dyn Operation; 1] = [&FILEINTO_OP];

impl Extension for FileintoExtension {
    fn name(&self) -> &'static str {
        "fileinto"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &CMD_FILEINTO);
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }
}

pub struct CmdFileinto;

static FILEINTO_SPEC: CommandSpec = CommandSpec {
    positional: &[PosSpec {
        name: "folder",
        kind: PosKind::String,
    }],
    subtests: crate::command::SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: true,
    own_tags: &[],
};

impl Command for CmdFileinto {
    fn name(&self) -> &'static str {
        "fileinto"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &FILEINTO_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        let folder = scanned.positionals[0].value.as_single_string()?;
        if folder.is_empty() {
            ctx.error("fileinto folder must not be empty");
            return None;
        }
        Some(CommandData::Action(scanned.effects))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("fileinto without extension id".to_string()))?;
        generator.emit_ext_opcode(ext, SUB_FILEINTO)?;
        let effects = match &info.data {
            CommandData::Action(effects) => effects.as_slice(),
            _ => &[],
        };
        generator.emit_trailer(&Generator::match_trailer_items(&MatchArgs::default(), effects))?;
        let folder = info.positionals[0]
            .value
            .as_single_string()
            .ok_or_else(|| SieveError::Internal("fileinto folder lost".to_string()))?;
        generator.emit_string(folder)
    }
}

pub struct FileintoOp;

impl Operation for FileintoOp {
    fn name(&self) -> &'static str {
        "FILEINTO"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let folder = rd.read_string(rt)?;
        let flags = opts
            .flags()
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| super::imap4flags::current_flags(rt));
        rt.trace(TraceLevel::Actions, || {
            format!("action: fileinto \"{folder}\"")
        });
        rt.result.add(Action::FileInto {
            folder,
            flags,
            copy: opts.copy(),
        })
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let folder = d.string_operand()?;
        d.line(format!("folder: {folder}"));
        Ok(())
    }
}

pub static CMD_FILEINTO: CmdFileinto = CmdFileinto;
pub static FILEINTO_OP: FileintoOp = FileintoOp;
