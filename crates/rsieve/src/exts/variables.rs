//! The `variables` extension (RFC 5229): the `set` command, `${...}`
//! substitution in strings, and match-value capture.
//!
//! Strings containing substitutions compile to an extension-owned string
//! operand: a sequence of literal, named-variable and match-value parts.
//! An invalid `${...}` sequence is literal text, per the RFC.

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{
    CaseModifier, Command, CommandData, CommandSpec, ParamKind, PosKind, PosSpec, SubtestArity,
    TagSpec,
};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{ExtId, Extension, Operation, StringOperand};
use crate::generate::{Generator, TrailerItem};
use crate::interp::{CodeReader, Runtime};
use crate::operand::{OPT_CUSTOM_BASE, read_trailer_with};
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_SET: u8 = 0;

const OPT_LOWER: u8 = OPT_CUSTOM_BASE;
const OPT_UPPER: u8 = OPT_CUSTOM_BASE + 1;

// Part tags of the substitution string operand.
const PART_LITERAL: u8 = 0;
const PART_VARIABLE: u8 = 1;
const PART_MATCH_VALUE: u8 = 2;

pub struct VariablesExtension;

static OPS: [&'static dyn Operation; 1] = [&SET_OP];
static STRING_OPERANDS: [&'static dyn StringOperand; 1] = [&VAR_STRING];

impl Extension for VariablesExtension {
    fn name(&self) -> &'static str {
        "variables"
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &CMD_SET);
        validator.enable_variables();
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }

    fn string_operands(&self) -> &'static [&'static dyn StringOperand] {
        &STRING_OPERANDS
    }
}

// ============= String compilation =============

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable(String),
    MatchValue(u32),
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split a source string into substitution parts. Returns a single
/// literal part when the string has no valid `${...}` references.
fn parse_parts(value: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let (before, from_ref) = rest.split_at(start);
        literal.push_str(before);
        match from_ref[2..].find('}') {
            Some(end) => {
                let name = &from_ref[2..2 + end];
                let part = if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                    name.parse::<u32>().ok().map(Part::MatchValue)
                } else if is_valid_name(name) {
                    Some(Part::Variable(name.to_ascii_lowercase()))
                } else {
                    None
                };
                match part {
                    Some(part) => {
                        if !literal.is_empty() {
                            parts.push(Part::Literal(std::mem::take(&mut literal)));
                        }
                        parts.push(part);
                    }
                    None => {
                        // Not a valid reference; keep the text verbatim.
                        literal.push_str(&from_ref[..2 + end + 1]);
                    }
                }
                rest = &from_ref[2 + end + 1..];
            }
            None => {
                literal.push_str(from_ref);
                rest = "";
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() || parts.is_empty() {
        parts.push(Part::Literal(literal));
    }
    parts
}

/// Whether a string contains at least one valid substitution.
pub(crate) fn uses_variables(value: &str) -> bool {
    parse_parts(value)
        .iter()
        .any(|part| !matches!(part, Part::Literal(_)))
}

/// Emit the substitution string operand for `value`.
pub(crate) fn emit_var_string(
    generator: &mut Generator<'_>,
    ext: ExtId,
    value: &str,
) -> Result<()> {
    let parts = parse_parts(value);
    generator.emit_ext_operand(ext, 0, STRING_OPERANDS.len())?;
    let writer = generator.writer_mut();
    writer.write_varint(parts.len() as u64);
    for part in &parts {
        match part {
            Part::Literal(text) => {
                writer.write_u8(PART_LITERAL);
                writer.write_string(text);
            }
            Part::Variable(name) => {
                writer.write_u8(PART_VARIABLE);
                writer.write_string(name);
            }
            Part::MatchValue(index) => {
                writer.write_u8(PART_MATCH_VALUE);
                writer.write_varint(u64::from(*index));
            }
        }
    }
    Ok(())
}

/// The substitution string operand.
pub struct VarStringOperand;

impl StringOperand for VarStringOperand {
    fn name(&self) -> &'static str {
        "var-string"
    }

    fn read(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<String, RuntimeError> {
        let count = rd.rd.read_varint().map_err(CodecError::from)?;
        let mut out = String::new();
        for _ in 0..count {
            let tag = rd.rd.read_u8().map_err(CodecError::from)?;
            match tag {
                PART_LITERAL => out.push_str(rd.rd.read_string().map_err(CodecError::from)?),
                PART_VARIABLE => {
                    let name = rd.rd.read_string().map_err(CodecError::from)?;
                    if let Some(value) = rt.vars.get(name) {
                        out.push_str(value);
                    }
                }
                PART_MATCH_VALUE => {
                    let index = rd.rd.read_varint().map_err(CodecError::from)? as usize;
                    if let Some(value) = rt.captured.get(index) {
                        out.push_str(value);
                    }
                }
                tag => {
                    return Err(CodecError::Invalid(format!(
                        "bad substitution part tag {tag}"
                    ))
                    .into());
                }
            }
        }
        Ok(out)
    }

    fn dump(&self, rd: &mut CodeReader<'_>) -> std::result::Result<String, CodecError> {
        let count = rd.rd.read_varint()?;
        let mut out = String::from("\"");
        for _ in 0..count {
            match rd.rd.read_u8()? {
                PART_LITERAL => out.push_str(rd.rd.read_string()?),
                PART_VARIABLE => {
                    let name = rd.rd.read_string()?;
                    out.push_str("${");
                    out.push_str(name);
                    out.push('}');
                }
                PART_MATCH_VALUE => {
                    let index = rd.rd.read_varint()?;
                    out.push_str(&format!("${{{index}}}"));
                }
                tag => {
                    return Err(CodecError::Invalid(format!(
                        "bad substitution part tag {tag}"
                    )));
                }
            }
        }
        out.push('"');
        Ok(out)
    }
}

// ============= set =============

pub struct CmdSet;

static SET_SPEC: CommandSpec = CommandSpec {
    positional: &[
        PosSpec {
            name: "name",
            kind: PosKind::String,
        },
        PosSpec {
            name: "value",
            kind: PosKind::String,
        },
    ],
    subtests: SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: false,
    own_tags: &[
        TagSpec {
            name: "lower",
            param: ParamKind::None,
        },
        TagSpec {
            name: "upper",
            param: ParamKind::None,
        },
    ],
};

impl Command for CmdSet {
    fn name(&self) -> &'static str {
        "set"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    fn spec(&self) -> &'static CommandSpec {
        &SET_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        let name = scanned.positionals[0].value.as_single_string()?;
        if !is_valid_name(name) {
            ctx.error(format!("invalid variable name '{name}'"));
            return None;
        }
        let case = match (
            scanned.own_tag("lower").is_some(),
            scanned.own_tag("upper").is_some(),
        ) {
            (true, true) => {
                ctx.error("':lower' and ':upper' are mutually exclusive");
                return None;
            }
            (true, false) => Some(CaseModifier::Lower),
            (false, true) => Some(CaseModifier::Upper),
            (false, false) => None,
        };
        Some(CommandData::Set {
            name: name.to_ascii_lowercase(),
            case,
        })
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("set without extension id".to_string()))?;
        let CommandData::Set { name, case } = &info.data else {
            return Err(SieveError::Internal("set data lost".to_string()));
        };
        generator.emit_ext_opcode(ext, SUB_SET)?;
        let items = match case {
            Some(CaseModifier::Lower) => vec![TrailerItem::Flag(OPT_LOWER)],
            Some(CaseModifier::Upper) => vec![TrailerItem::Flag(OPT_UPPER)],
            None => Vec::new(),
        };
        generator.emit_trailer(&items)?;
        generator.emit_variable_ref(name);
        let value = info.positionals[1]
            .value
            .as_single_string()
            .ok_or_else(|| SieveError::Internal("set value lost".to_string()))?;
        generator.emit_string(value)
    }
}

pub struct SetOp;

impl Operation for SetOp {
    fn name(&self) -> &'static str {
        "SET"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let mut case = None;
        read_trailer_with(rt, rd, |code, _rt, _rd| match code {
            OPT_LOWER => {
                case = Some(CaseModifier::Lower);
                Ok(true)
            }
            OPT_UPPER => {
                case = Some(CaseModifier::Upper);
                Ok(true)
            }
            _ => Ok(false),
        })?;
        let name = rd.read_variable_ref()?;
        let mut value = rd.read_string(rt)?;
        match case {
            Some(CaseModifier::Lower) => value = value.to_lowercase(),
            Some(CaseModifier::Upper) => value = value.to_uppercase(),
            None => {}
        }
        rt.trace(TraceLevel::Commands, || format!("set \"{name}\""));
        rt.vars.insert(name, value);
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer_with(|d, code| match code {
            OPT_LOWER => {
                d.line(":lower");
                Ok(true)
            }
            OPT_UPPER => {
                d.line(":upper");
                Ok(true)
            }
            _ => Ok(false),
        })?;
        let name = d.variable_ref_operand()?;
        d.line(format!("name: {name}"));
        let value = d.string_operand()?;
        d.line(format!("value: {value}"));
        Ok(())
    }
}

pub static CMD_SET: CmdSet = CmdSet;
pub static SET_OP: SetOp = SetOp;
pub static VAR_STRING: VarStringOperand = VarStringOperand;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_literal() {
        assert_eq!(
            parse_parts("no variables here"),
            vec![Part::Literal("no variables here".into())]
        );
    }

    #[test]
    fn test_parse_named_and_numbered() {
        assert_eq!(
            parse_parts("hi ${name}, you are ${1}"),
            vec![
                Part::Literal("hi ".into()),
                Part::Variable("name".into()),
                Part::Literal(", you are ".into()),
                Part::MatchValue(1),
            ]
        );
    }

    #[test]
    fn test_invalid_reference_stays_literal() {
        assert_eq!(
            parse_parts("cost: ${12abc}"),
            vec![Part::Literal("cost: ${12abc}".into())]
        );
        assert_eq!(
            parse_parts("open ${unclosed"),
            vec![Part::Literal("open ${unclosed".into())]
        );
    }

    #[test]
    fn test_uses_variables() {
        assert!(uses_variables("hello ${name}"));
        assert!(uses_variables("${0}"));
        assert!(!uses_variables("hello"));
        assert!(!uses_variables("not a ref ${ }"));
    }

    #[test]
    fn test_variable_names_case_insensitive() {
        assert_eq!(parse_parts("${Name}"), vec![Part::Variable("name".into())]);
    }
}
