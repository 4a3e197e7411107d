//! The `vacation` extension (RFC 5230): auto-replies with a reply
//! throttle.

use rsieve_ast::{ArgValue, NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{
    Command, CommandData, CommandSpec, ParamKind, PosKind, PosSpec, SubtestArity, TagSpec,
    VacationData,
};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{ExtId, Extension, Operation};
use crate::generate::{Generator, TrailerItem};
use crate::interp::{CodeReader, Runtime};
use crate::operand::{OPT_CUSTOM_BASE, read_trailer_with};
use crate::result::Action;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_VACATION: u8 = 0;

/// Default reply throttle in days.
const DEFAULT_DAYS: u64 = 7;
const MAX_DAYS: u64 = 30;

// Operation-specific optional codes.
const OPT_DAYS: u8 = OPT_CUSTOM_BASE;
const OPT_SUBJECT: u8 = OPT_CUSTOM_BASE + 1;
const OPT_FROM: u8 = OPT_CUSTOM_BASE + 2;
const OPT_ADDRESSES: u8 = OPT_CUSTOM_BASE + 3;
const OPT_HANDLE: u8 = OPT_CUSTOM_BASE + 4;
const OPT_MIME: u8 = OPT_CUSTOM_BASE + 5;

pub struct VacationExtension;

static OPS: [&'static dyn Operation; 1] = [&VACATION_OP];

impl Extension for VacationExtension {
    fn name(&self) -> &'static str {
        "vacation"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &CMD_VACATION);
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }
}

pub struct CmdVacation;

static VACATION_SPEC: CommandSpec = CommandSpec {
    positional: &[PosSpec {
        name: "reason",
        kind: PosKind::String,
    }],
    subtests: SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: false,
    own_tags: &[
        TagSpec {
            name: "days",
            param: ParamKind::Number,
        },
        TagSpec {
            name: "subject",
            param: ParamKind::String,
        },
        TagSpec {
            name: "from",
            param: ParamKind::String,
        },
        TagSpec {
            name: "addresses",
            param: ParamKind::StringList,
        },
        TagSpec {
            name: "handle",
            param: ParamKind::String,
        },
        TagSpec {
            name: "mime",
            param: ParamKind::None,
        },
    ],
};

impl Command for CmdVacation {
    fn name(&self) -> &'static str {
        "vacation"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &VACATION_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        let mut data = VacationData::default();
        for tag in &scanned.own {
            match (tag.name, &tag.value) {
                ("days", Some(ArgValue::Number(days))) => {
                    // Clamp rather than reject, per the RFC's site-policy
                    // latitude.
                    data.days = Some((*days).clamp(1, MAX_DAYS));
                }
                ("subject", Some(value)) => {
                    data.subject = value.as_single_string().map(str::to_string);
                }
                ("from", Some(value)) => {
                    data.from = value.as_single_string().map(str::to_string);
                }
                ("addresses", Some(value)) => {
                    data.addresses = value
                        .as_string_list()?
                        .iter()
                        .map(|s| (*s).to_string())
                        .collect();
                }
                ("handle", Some(value)) => {
                    data.handle = value.as_single_string().map(str::to_string);
                }
                ("mime", None) => data.mime = true,
                _ => {
                    ctx.error("invalid vacation tag arguments");
                    return None;
                }
            }
        }
        Some(CommandData::Vacation(data))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("vacation without extension id".to_string()))?;
        let CommandData::Vacation(data) = &info.data else {
            return Err(SieveError::Internal("vacation data lost".to_string()));
        };
        generator.emit_ext_opcode(ext, SUB_VACATION)?;

        let mut items = Vec::new();
        if let Some(days) = data.days {
            items.push(TrailerItem::Number(OPT_DAYS, days));
        }
        if let Some(subject) = &data.subject {
            items.push(TrailerItem::Str(OPT_SUBJECT, subject));
        }
        if let Some(from) = &data.from {
            items.push(TrailerItem::Str(OPT_FROM, from));
        }
        if !data.addresses.is_empty() {
            items.push(TrailerItem::StrList(
                OPT_ADDRESSES,
                data.addresses.iter().map(String::as_str).collect(),
            ));
        }
        if let Some(handle) = &data.handle {
            items.push(TrailerItem::Str(OPT_HANDLE, handle));
        }
        if data.mime {
            items.push(TrailerItem::Flag(OPT_MIME));
        }
        generator.emit_trailer(&items)?;

        let reason = info.positionals[0]
            .value
            .as_single_string()
            .ok_or_else(|| SieveError::Internal("vacation reason lost".to_string()))?;
        generator.emit_string(reason)
    }
}

pub struct VacationOp;

impl Operation for VacationOp {
    fn name(&self) -> &'static str {
        "VACATION"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let mut days = DEFAULT_DAYS;
        let mut subject = None;
        let mut from = None;
        let mut addresses = Vec::new();
        let mut handle = None;
        let mut mime = false;

        read_trailer_with(rt, rd, |code, rt, rd| {
            match code {
                OPT_DAYS => days = rd.read_number()?,
                OPT_SUBJECT => subject = Some(rd.read_string(rt)?),
                OPT_FROM => from = Some(rd.read_string(rt)?),
                OPT_ADDRESSES => addresses = rd.read_string_list(rt)?,
                OPT_HANDLE => handle = Some(rd.read_string(rt)?),
                OPT_MIME => mime = true,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let reason = rd.read_string(rt)?;

        rt.trace(TraceLevel::Actions, || "action: vacation".to_string());
        rt.result.add(Action::Vacation {
            reason,
            subject,
            from,
            addresses,
            handle,
            days,
            mime,
        })
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer_with(|d, code| {
            match code {
                OPT_DAYS => {
                    let days = d.number_operand()?;
                    d.line(format!(":days {days}"));
                }
                OPT_SUBJECT => {
                    let subject = d.string_operand()?;
                    d.line(format!(":subject {subject}"));
                }
                OPT_FROM => {
                    let from = d.string_operand()?;
                    d.line(format!(":from {from}"));
                }
                OPT_ADDRESSES => {
                    let addresses = d.string_list_operand()?;
                    d.line(format!(":addresses [{}]", addresses.join(", ")));
                }
                OPT_HANDLE => {
                    let handle = d.string_operand()?;
                    d.line(format!(":handle {handle}"));
                }
                OPT_MIME => d.line(":mime"),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let reason = d.string_operand()?;
        d.line(format!("reason: {reason}"));
        Ok(())
    }
}

pub static CMD_VACATION: CmdVacation = CmdVacation;
pub static VACATION_OP: VacationOp = VacationOp;
