//! The `imap4flags` extension (RFC 5232): flag-editing commands, the
//! `hasflag` test and the `:flags` side effect on storing actions.
//!
//! The internal flag set lives in a per-run interpreter context. Storing
//! actions without an explicit `:flags` snapshot the internal set at
//! append time, and the implicit keep follows it as well, so flag edits
//! are persisted rather than lost at script end.
//!
//! The superseded `imapflags` draft name is available as a separate
//! registration behind the `allow_deprecated` config flag.

use rsieve_ast::{NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{
    Command, CommandData, CommandSpec, ParamKind, PosKind, PosSpec, SubtestArity,
};
use crate::config::TraceLevel;
use crate::core::run_match;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::{
    ExtId, Extension, Operation, OperandSource, SideEffect, SideEffectValue,
};
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::operand::read_trailer;
use crate::validate::{ResolvedNode, Scanned, ValidateCtx, Validator};

const SUB_SETFLAG: u8 = 0;
const SUB_ADDFLAG: u8 = 1;
const SUB_REMOVEFLAG: u8 = 2;
const SUB_HASFLAG: u8 = 3;

/// Context key shared by the current and the deprecated registration.
const CTX_KEY: &str = "imap4flags";

/// Per-run internal flag set.
#[derive(Debug, Default)]
pub(crate) struct FlagsCtx {
    pub flags: Vec<String>,
}

/// Current internal flag set; empty when the extension is not active.
pub(crate) fn current_flags(rt: &Runtime<'_>) -> Vec<String> {
    rt.context::<FlagsCtx>(CTX_KEY)
        .map(|ctx| ctx.flags.clone())
        .unwrap_or_default()
}

/// Split flag strings on whitespace and drop duplicates, preserving
/// first-seen order.
fn normalize(flags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for input in flags {
        for flag in input.split_whitespace() {
            if !out.iter().any(|f| f.eq_ignore_ascii_case(flag)) {
                out.push(flag.to_string());
            }
        }
    }
    out
}

pub struct Imap4FlagsExtension {
    name: &'static str,
}

impl Imap4FlagsExtension {
    /// The current RFC 5232 registration.
    #[must_use]
    pub fn new() -> Self {
        Self { name: "imap4flags" }
    }

    /// The deprecated draft name, kept for old scripts.
    #[must_use]
    pub fn deprecated() -> Self {
        Self { name: "imapflags" }
    }
}

impl Default for Imap4FlagsExtension {
    fn default() -> Self {
        Self::new()
    }
}

static OPS: [&'static dyn Operation; 4] =
    [&SETFLAG_OP, &ADDFLAG_OP, &REMOVEFLAG_OP, &HASFLAG_OP];
static SIDE_EFFECTS: [&'static dyn SideEffect; 1] = [&FLAGS_EFFECT];

impl Extension for Imap4FlagsExtension {
    fn name(&self) -> &'static str {
        self.name
    }

    fn validator_load(&self, id: ExtId, validator: &mut Validator<'_>) {
        validator.register_command(id, &CMD_SETFLAG);
        validator.register_command(id, &CMD_ADDFLAG);
        validator.register_command(id, &CMD_REMOVEFLAG);
        validator.register_command(id, &TST_HASFLAG);
        validator.register_effect("flags", OperandSource::Ext { ext: id, sub: 0 }, &FLAGS_EFFECT);
    }

    fn interpreter_load(&self, _id: ExtId, rt: &mut Runtime<'_>) {
        rt.set_context(CTX_KEY, Box::new(FlagsCtx::default()));
    }

    fn operations(&self) -> &'static [&'static dyn Operation] {
        &OPS
    }

    fn side_effects(&self) -> &'static [&'static dyn SideEffect] {
        &SIDE_EFFECTS
    }
}

// ============= :flags side effect =============

pub struct FlagsEffect;

impl SideEffect for FlagsEffect {
    fn name(&self) -> &'static str {
        "flags"
    }

    fn applies_to(&self, command: &str) -> bool {
        matches!(command, "keep" | "fileinto")
    }

    fn param_kind(&self) -> ParamKind {
        ParamKind::StringList
    }

    fn read(
        &self,
        rt: &mut Runtime<'_>,
        rd: &mut CodeReader<'_>,
    ) -> std::result::Result<SideEffectValue, RuntimeError> {
        let flags = rd.read_string_list(rt)?;
        Ok(SideEffectValue::Flags(normalize(&flags)))
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        let flags = d.string_list_operand()?;
        d.line(format!("flags: [{}]", flags.join(", ")));
        Ok(())
    }
}

// ============= Flag-editing commands =============

macro_rules! flag_command {
    ($cmd:ident, $cmd_static:ident, $name:literal, $sub:expr) => {
        pub struct $cmd;

        impl Command for $cmd {
            fn name(&self) -> &'static str {
                $name
            }

            fn kind(&self) -> NodeKind {
                NodeKind::Command
            }

            fn spec(&self) -> &'static CommandSpec {
                static SPEC: CommandSpec = CommandSpec::plain(&[PosSpec {
                    name: "flag list",
                    kind: PosKind::StringList,
                }]);
                &SPEC
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
                generator: &mut Generator<'_>,
                _node: NodeId,
                info: &ResolvedNode,
            ) -> Result<()> {
                let ext = info.ext.ok_or_else(|| {
                    SieveError::Internal(concat!($name, " without extension id").to_string())
                })?;
                generator.emit_ext_opcode(ext, $sub)?;
                generator.emit_string_list_arg(&info.positionals[0].value)
            }
        }

        pub static $cmd_static: $cmd = $cmd;
    };
}

flag_command!(CmdSetflag, CMD_SETFLAG, "setflag", SUB_SETFLAG);
flag_command!(CmdAddflag, CMD_ADDFLAG, "addflag", SUB_ADDFLAG);
flag_command!(CmdRemoveflag, CMD_REMOVEFLAG, "removeflag", SUB_REMOVEFLAG);

// ============= Flag-editing operations =============

#[derive(Clone, Copy)]
enum FlagEdit {
    Set,
    Add,
    Remove,
}

fn edit_flags(
    rt: &mut Runtime<'_>,
    rd: &mut CodeReader<'_>,
    edit: FlagEdit,
) -> std::result::Result<(), RuntimeError> {
    let flags = normalize(&rd.read_string_list(rt)?);
    let Some(ctx) = rt.context_mut::<FlagsCtx>(CTX_KEY) else {
        return Err(RuntimeError::Script(
            "flag operation without imap4flags context".to_string(),
        ));
    };
    match edit {
        FlagEdit::Set => ctx.flags = flags,
        FlagEdit::Add => {
            for flag in flags {
                if !ctx.flags.iter().any(|f| f.eq_ignore_ascii_case(&flag)) {
                    ctx.flags.push(flag);
                }
            }
        }
        FlagEdit::Remove => {
            ctx.flags
                .retain(|f| !flags.iter().any(|r| r.eq_ignore_ascii_case(f)));
        }
    }
    // Flag edits carry over to whatever stores the message next,
    // including the implicit keep.
    let flags = current_flags(rt);
    rt.result.implicit_keep_flags = flags;
    Ok(())
}

macro_rules! flag_operation {
    ($op:ident, $op_static:ident, $mnemonic:literal, $edit:expr) => {
        pub struct $op;

        impl Operation for $op {
            fn name(&self) -> &'static str {
                $mnemonic
            }

            fn execute(
                &self,
                rt: &mut Runtime<'_>,
                rd: &mut CodeReader<'_>,
            ) -> std::result::Result<(), RuntimeError> {
                rt.trace(TraceLevel::Commands, || $mnemonic.to_lowercase());
                edit_flags(rt, rd, $edit)
            }

            fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
                let flags = d.string_list_operand()?;
                d.line(format!("flags: [{}]", flags.join(", ")));
                Ok(())
            }
        }

        pub static $op_static: $op = $op;
    };
}

flag_operation!(SetflagOp, SETFLAG_OP, "SETFLAG", FlagEdit::Set);
flag_operation!(AddflagOp, ADDFLAG_OP, "ADDFLAG", FlagEdit::Add);
flag_operation!(RemoveflagOp, REMOVEFLAG_OP, "REMOVEFLAG", FlagEdit::Remove);

// ============= hasflag test =============

pub struct TstHasflag;

static HASFLAG_SPEC: CommandSpec = CommandSpec {
    positional: &[PosSpec {
        name: "flag list",
        kind: PosKind::StringList,
    }],
    subtests: SubtestArity::None,
    block: false,
    match_tags: true,
    address_tag: false,
    effect_tags: false,
    own_tags: &[],
};

impl Command for TstHasflag {
    fn name(&self) -> &'static str {
        "hasflag"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &HASFLAG_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::Match(scanned.match_args))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let ext = info
            .ext
            .ok_or_else(|| SieveError::Internal("hasflag without extension id".to_string()))?;
        generator.emit_ext_opcode(ext, SUB_HASFLAG)?;
        let args = match &info.data {
            CommandData::Match(args) => Generator::match_trailer_items(args, &[]),
            _ => Vec::new(),
        };
        generator.emit_trailer(&args)?;
        generator.emit_string_list_arg(&info.positionals[0].value)
    }
}

pub struct HasflagOp;

impl Operation for HasflagOp {
    fn name(&self) -> &'static str {
        "HASFLAG"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let keys = rd.read_string_list(rt)?;
        let values = current_flags(rt);
        let matched = run_match(rt, &opts, &values, &keys)?;
        rt.trace(TraceLevel::Tests, || {
            format!("test: hasflag {keys:?} -> {matched}")
        });
        rt.test_result = matched;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let keys = d.string_list_operand()?;
        d.line(format!("flags: [{}]", keys.join(", ")));
        Ok(())
    }
}

pub static TST_HASFLAG: TstHasflag = TstHasflag;
pub static HASFLAG_OP: HasflagOp = HasflagOp;
pub static FLAGS_EFFECT: FlagsEffect = FlagsEffect;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let input = vec!["\\Seen \\Flagged".to_string(), "\\seen".to_string()];
        assert_eq!(normalize(&input), vec!["\\Seen", "\\Flagged"]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&["   ".to_string()]).is_empty());
    }
}
