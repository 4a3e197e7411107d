//! Base tests: `true`, `false`, `not`, `allof`, `anyof`, `header`,
//! `address`, `exists`, `size`.

use rsieve_ast::{ArgValue, NodeId, NodeKind};
use rsieve_binary::CodecError;

use crate::command::{
    Command, CommandData, CommandSpec, MatchArgs, ParamKind, PosKind, PosSpec, SubtestArity,
    TagSpec,
};
use crate::config::TraceLevel;
use crate::dump::Dumper;
use crate::error::{Result, RuntimeError, SieveError};
use crate::extension::Operation;
use crate::generate::Generator;
use crate::interp::{CodeReader, Runtime};
use crate::msg::parse_addresses;
use crate::operand::{TestOptionals, read_trailer};
use crate::validate::{ResolvedNode, Scanned, ValidateCtx};

/// Evaluate a match over collected values, updating the test register.
pub(crate) fn run_match(
    rt: &mut Runtime<'_>,
    opts: &TestOptionals,
    values: &[String],
    keys: &[String],
) -> std::result::Result<bool, RuntimeError> {
    let mut ctx = rt.match_context(opts.comparator, opts.relation);
    opts.match_type.matches(&mut ctx, values, keys)
}

fn match_args(info: &ResolvedNode) -> &MatchArgs {
    static DEFAULT: MatchArgs = MatchArgs {
        comparator: None,
        match_type: None,
        relation: None,
        address_part: None,
    };
    match &info.data {
        CommandData::Match(args) => args,
        _ => &DEFAULT,
    }
}

// ============= true / false =============

macro_rules! const_test {
    ($cmd:ident, $op:ident, $name:literal, $mnemonic:literal, $opcode:expr, $value:literal) => {
        pub struct $cmd;

        impl Command for $cmd {
            fn name(&self) -> &'static str {
                $name
            }

            fn kind(&self) -> NodeKind {
                NodeKind::Test
            }

            fn spec(&self) -> &'static CommandSpec {
                static SPEC: CommandSpec = CommandSpec::plain(&[]);
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
                _info: &ResolvedNode,
            ) -> Result<()> {
                generator.emit_opcode($opcode);
                Ok(())
            }
        }

        pub struct $op;

        impl Operation for $op {
            fn name(&self) -> &'static str {
                $mnemonic
            }

            fn execute(
                &self,
                rt: &mut Runtime<'_>,
                _rd: &mut CodeReader<'_>,
            ) -> std::result::Result<(), RuntimeError> {
                rt.test_result = $value;
                Ok(())
            }

            fn dump(&self, _d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
                Ok(())
            }
        }
    };
}

const_test!(TstTrue, TrueOp, "true", "TRUE", super::OP_TRUE, true);
const_test!(TstFalse, FalseOp, "false", "FALSE", super::OP_FALSE, false);

// ============= not / allof / anyof =============

macro_rules! compound_test {
    ($ty:ident, $name:literal, $arity:expr) => {
        pub struct $ty;

        impl Command for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn kind(&self) -> NodeKind {
                NodeKind::Test
            }

            fn spec(&self) -> &'static CommandSpec {
                static SPEC: CommandSpec = CommandSpec {
                    positional: &[],
                    subtests: $arity,
                    block: false,
                    match_tags: false,
                    address_tag: false,
                    effect_tags: false,
                    own_tags: &[],
                };
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
                _gen: &mut Generator<'_>,
                _node: NodeId,
                _info: &ResolvedNode,
            ) -> Result<()> {
                // Compound tests lower to jump chains in the test
                // generator; they own no opcode.
                Err(SieveError::Internal(concat!(
                    "compound test '",
                    $name,
                    "' reached the generic generation path"
                )
                .to_string()))
            }
        }
    };
}

compound_test!(TstNot, "not", SubtestArity::One);
compound_test!(TstAllof, "allof", SubtestArity::OneOrMore);
compound_test!(TstAnyof, "anyof", SubtestArity::OneOrMore);

// ============= header =============

pub struct TstHeader;

static HEADER_SPEC: CommandSpec = CommandSpec {
    positional: &[
        PosSpec {
            name: "header names",
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
    address_tag: false,
    effect_tags: false,
    own_tags: &[],
};

impl Command for TstHeader {
    fn name(&self) -> &'static str {
        "header"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &HEADER_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::Match(scanned.match_args))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_HEADER);
        let items = Generator::match_trailer_items(match_args(info), &[]);
        generator.emit_trailer(&items)?;
        generator.emit_string_list_arg(&info.positionals[0].value)?;
        generator.emit_string_list_arg(&info.positionals[1].value)
    }
}

pub struct HeaderOp;

impl Operation for HeaderOp {
    fn name(&self) -> &'static str {
        "HEADER"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let names = rd.read_string_list(rt)?;
        let keys = rd.read_string_list(rt)?;

        let mut values = Vec::new();
        for name in &names {
            for value in rt.message.header(name) {
                values.push(value.trim().to_string());
            }
        }

        let matched = run_match(rt, &opts, &values, &keys)?;
        rt.trace(TraceLevel::Tests, || {
            format!("test: header {names:?} -> {matched}")
        });
        rt.test_result = matched;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let names = d.string_list_operand()?;
        d.line(format!("headers: [{}]", names.join(", ")));
        let keys = d.string_list_operand()?;
        d.line(format!("keys: [{}]", keys.join(", ")));
        Ok(())
    }
}

// ============= address =============

pub struct TstAddress;

static ADDRESS_SPEC: CommandSpec = CommandSpec {
    positional: &[
        PosSpec {
            name: "header list",
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

impl Command for TstAddress {
    fn name(&self) -> &'static str {
        "address"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &ADDRESS_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::Match(scanned.match_args))
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_ADDRESS);
        let items = Generator::match_trailer_items(match_args(info), &[]);
        generator.emit_trailer(&items)?;
        generator.emit_string_list_arg(&info.positionals[0].value)?;
        generator.emit_string_list_arg(&info.positionals[1].value)
    }
}

pub struct AddressOp;

impl Operation for AddressOp {
    fn name(&self) -> &'static str {
        "ADDRESS"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let opts = read_trailer(rt, rd)?;
        let names = rd.read_string_list(rt)?;
        let keys = rd.read_string_list(rt)?;

        let mut values = Vec::new();
        for name in &names {
            for raw in rt.message.header(name) {
                for address in parse_addresses(raw) {
                    if let Some(part) = opts.address_part.extract(&address) {
                        values.push(part);
                    }
                }
            }
        }
        if rt.config.trace_addresses {
            rt.trace(TraceLevel::Matching, || {
                format!("address test values: {values:?}")
            });
        }

        let matched = run_match(rt, &opts, &values, &keys)?;
        rt.trace(TraceLevel::Tests, || {
            format!("test: address {names:?} -> {matched}")
        });
        rt.test_result = matched;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        d.dump_trailer()?;
        let names = d.string_list_operand()?;
        d.line(format!("headers: [{}]", names.join(", ")));
        let keys = d.string_list_operand()?;
        d.line(format!("keys: [{}]", keys.join(", ")));
        Ok(())
    }
}

// ============= exists =============

pub struct TstExists;

static EXISTS_SPEC: CommandSpec = CommandSpec::plain(&[PosSpec {
    name: "header names",
    kind: PosKind::StringList,
}]);

impl Command for TstExists {
    fn name(&self) -> &'static str {
        "exists"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &EXISTS_SPEC
    }

    fn validate(&self, _ctx: &mut ValidateCtx<'_, '_>, _scanned: Scanned) -> Option<CommandData> {
        Some(CommandData::None)
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        generator.emit_opcode(super::OP_EXISTS);
        generator.emit_string_list_arg(&info.positionals[0].value)
    }
}

pub struct ExistsOp;

impl Operation for ExistsOp {
    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let names = rd.read_string_list(rt)?;
        let matched = names.iter().all(|name| !rt.message.header(name).is_empty());
        rt.trace(TraceLevel::Tests, || {
            format!("test: exists {names:?} -> {matched}")
        });
        rt.test_result = matched;
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        let names = d.string_list_operand()?;
        d.line(format!("headers: [{}]", names.join(", ")));
        Ok(())
    }
}

// ============= size =============

pub struct TstSize;

static SIZE_SPEC: CommandSpec = CommandSpec {
    positional: &[PosSpec {
        name: "limit",
        kind: PosKind::Number,
    }],
    subtests: SubtestArity::None,
    block: false,
    match_tags: false,
    address_tag: false,
    effect_tags: false,
    own_tags: &[
        TagSpec {
            name: "over",
            param: ParamKind::None,
        },
        TagSpec {
            name: "under",
            param: ParamKind::None,
        },
    ],
};

impl Command for TstSize {
    fn name(&self) -> &'static str {
        "size"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Test
    }

    fn spec(&self) -> &'static CommandSpec {
        &SIZE_SPEC
    }

    fn validate(&self, ctx: &mut ValidateCtx<'_, '_>, scanned: Scanned) -> Option<CommandData> {
        let over = scanned.own_tag("over").is_some();
        let under = scanned.own_tag("under").is_some();
        match (over, under) {
            (true, true) => {
                ctx.error(
                    "exactly one of the ':under' or ':over' tags must be specified \
                     for the size test, but more were found",
                );
                None
            }
            (false, false) => {
                ctx.error(
                    "the size test requires either the :under or the :over tag to be specified",
                );
                None
            }
            (over, _) => Some(CommandData::Size { over }),
        }
    }

    fn generate(&self, generator: &mut Generator<'_>, _node: NodeId, info: &ResolvedNode) -> Result<()> {
        let CommandData::Size { over } = &info.data else {
            return Err(SieveError::Internal("size test without discriminator".to_string()));
        };
        generator.emit_opcode(if *over {
            super::OP_SIZE_OVER
        } else {
            super::OP_SIZE_UNDER
        });
        let ArgValue::Number(limit) = &info.positionals[0].value else {
            return Err(SieveError::Internal("size limit lost".to_string()));
        };
        generator.emit_number(*limit);
        Ok(())
    }
}

pub struct SizeOverOp;

impl Operation for SizeOverOp {
    fn name(&self) -> &'static str {
        "SIZE-OVER"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let limit = rd.read_number()?;
        let size = rt.message_size();
        rt.test_result = size > limit;
        rt.trace(TraceLevel::Tests, || {
            format!("test: size {size} :over {limit} -> {}", size > limit)
        });
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        let limit = d.number_operand()?;
        d.line(format!("limit: {limit}"));
        Ok(())
    }
}

pub struct SizeUnderOp;

impl Operation for SizeUnderOp {
    fn name(&self) -> &'static str {
        "SIZE-UNDER"
    }

    fn execute(&self, rt: &mut Runtime<'_>, rd: &mut CodeReader<'_>) -> std::result::Result<(), RuntimeError> {
        let limit = rd.read_number()?;
        let size = rt.message_size();
        rt.test_result = size < limit;
        rt.trace(TraceLevel::Tests, || {
            format!("test: size {size} :under {limit} -> {}", size < limit)
        });
        Ok(())
    }

    fn dump(&self, d: &mut Dumper<'_>) -> std::result::Result<(), CodecError> {
        let limit = d.number_operand()?;
        d.line(format!("limit: {limit}"));
        Ok(())
    }
}

pub static TST_TRUE: TstTrue = TstTrue;
pub static TST_FALSE: TstFalse = TstFalse;
pub static TST_NOT: TstNot = TstNot;
pub static TST_ALLOF: TstAllof = TstAllof;
pub static TST_ANYOF: TstAnyof = TstAnyof;
pub static TST_HEADER: TstHeader = TstHeader;
pub static TST_ADDRESS: TstAddress = TstAddress;
pub static TST_EXISTS: TstExists = TstExists;
pub static TST_SIZE: TstSize = TstSize;

pub static TRUE_OP: TrueOp = TrueOp;
pub static FALSE_OP: FalseOp = FalseOp;
pub static HEADER_OP: HeaderOp = HeaderOp;
pub static ADDRESS_OP: AddressOp = AddressOp;
pub static EXISTS_OP: ExistsOp = ExistsOp;
pub static SIZE_OVER_OP: SizeOverOp = SizeOverOp;
pub static SIZE_UNDER_OP: SizeUnderOp = SizeUnderOp;
