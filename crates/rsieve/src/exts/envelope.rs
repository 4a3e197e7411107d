//! The `envelope` extension (RFC 5228 §5.4): tests against the SMTP
//! envelope rather than message headers.

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{Command, CommandData, CommandSpec, PosKind, PosSpec, SubtestArity};
use crate::config::TraceLevel;
use crate::core::run_match;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{ExtId, Extension, Operation};
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::msg::parse_addresses;
use crate::operand::read_trailer;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_ENVELOPE: u8 = 0;

pub struct EnvelopeExtension;

static OPS: [&'static dyn Operation; 1] = [&ENVELOPE_OP];

impl Extension for EnvelopeExtension {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &TST_ENVELOPE);
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }
}

pub struct TstEnvelope;

static ENVELOPE_SPEC: CommandSpec = CommandSpec {
    positional: &[
        PosSpec {
            name: "envelope parts",
            kind: PosKind::StringList,
        },
        PosSpec {
            name: "key list",
            kind: PosKind::StringList,
        },
    ],
    subtests: SubtestArity::None,
    block: false,
    match_tags: true,
    address_tag: true,
    effect_tags: false,
    own_tags: &[],
};

impl Command for TstEnvelope {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &ENVELOPE_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        for part in scanned.positionals[0].value.as_string_list()? {
            if !part.eq_ignore_ascii_case("from") && !part.eq_ignore_ascii_case("to") {
                ctx.error(format!("unknown envelope part '{part}'"));
                return None;
            }
        }
        Some(CommandData::Match(scanned.match_args))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("envelope without extension id".to_string()))?;
        generator.emit_ext_opcode(ext, SUB_ENVELOPE)?;
        let args = match &info.data {
            CommandData::Match(args) => Generator::match_trailer_items(args, &[]),
            _ => Vec::new(),
        };
        generator.emit_trailer(&args)?;
        generator.emit_string_list_arg(&info.positionals[0].value)?;
        generator.emit_string_list_arg(&info.positionals[1].value)
    }
}

pub struct EnvelopeOp;

impl Operation for EnvelopeOp {
    fn name(&self) -> &'static str {
        "ENVELOPE"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let parts = rd.read_string_list(rt)?;
        let keys = rd.read_string_list(rt)?;

        let mut values = Vec::new();
        for part in &parts {
            let raw = if part.eq_ignore_ascii_case("from") {
                rt.message.envelope_sender()
            } else {
                rt.message.envelope_recipient()
            };
            let Some(raw) = raw else { continue };
            for address in parse_addresses(raw) {
                if let Some(value) = opts.address_part.extract(&address) {
                    values.push(value);
                }
            }
        }

        let matched = run_match(rt, &opts, &values, &keys)?;
        rt.trace(TraceLevel::Tests, || {
            format!("test: envelope {parts:?} -> {matched}")
        });
        rt.test_result = matched;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let parts = d.string_list_operand()?;
        d.line(format!("parts: [{}]", parts.join(", ")));
        let keys = d.string_list_operand()?;
        d.line(format!("keys: [{}]", keys.join(", ")));
        Ok(())
    }
}

pub static TST_ENVELOPE: TstEnvelope = TstEnvelope;
pub static ENVELOPE_OP: EnvelopeOp = EnvelopeOp;
