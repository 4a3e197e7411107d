//! Semantic validation pass.
//!
//! Walks the AST top-down, resolves every command and tag against the
//! registries populated by the enabled extensions, enforces the `require`
//! placement rule, and records per-node annotations in a side table for
//! the generator. Tags are claimed in order by: the command's own tag set,
//! then the comparator / match-type / address-part claimer registries,
//! then the side-effect registry.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use rsieve_ast::{ArgValue, Argument, Ast, Diagnostics, Location, NodeId, NodeKind};

use crate::address_part::AddressPart;
use crate::command::{
    Command, CommandData, MatchArgs, ParamKind, PosKind, ResolvedEffect, SubtestArity,
};
use crate::comparator::Comparator;
use crate::config::SieveConfig;
use crate::extension::{ExtId, Extension, ResolvedOperand, SideEffect};
use crate::match_type::{MatchType, Relation};
use crate::registry::ExtensionRegistry;

pub(crate) const REQUIRE_PLACEMENT_ERROR: &str =
    "require commands can only be placed at top level at the beginning of the file";

/// Registered match type plus whether it consumes a relation parameter.
#[derive(Clone)]
pub struct MatchTypeReg {
    pub op: ResolvedOperand<dyn MatchType>,
    pub relational: bool,
}

/// One of a command's own tags, as scanned from the argument list.
#[derive(Clone, Debug)]
pub struct OwnTag {
    pub name: &'static str,
    pub value: Option<ArgValue>,
    pub location: Location,
}

/// Scanned and resolved arguments of one command.
#[derive(Default)]
pub struct Scanned {
    pub match_args: MatchArgs,
    pub effects: Vec<ResolvedEffect>,
    pub own: Vec<OwnTag>,
    pub positionals: Vec<Argument>,
}

impl Scanned {
    #[must_use]
    pub fn own_tag(&self, name: &str) -> Option<&OwnTag> {
        self.own.iter().find(|t| t.name == name)
    }
}

/// A registered command plus the extension that contributed it.
#[derive(Clone, Copy)]
struct CommandReg {
    cmd: &'static dyn Command,
    ext: Option<ExtId>,
}

/// Per-node validator output.
pub struct ResolvedNode {
    pub command: &'static dyn Command,
    /// Extension owning this command; `None` for the core language.
    pub ext: Option<ExtId>,
    pub data: CommandData,
    /// Positional arguments with all tags (and tag parameters) stripped.
    pub positionals: Vec<Argument>,
}

/// The validated script: the AST side table plus compile-unit state the
/// generator needs.
pub struct ValidatedScript {
    pub resolved: Vec<Option<ResolvedNode>>,
    /// Required extensions in `require` order.
    pub required: Vec<ExtId>,
    pub vars_enabled: bool,
}

/// The validation pass.
pub struct Validator<'a> {
    registry: &'a ExtensionRegistry,
    config: &'a SieveConfig,
    diags: &'a mut Diagnostics,
    commands: FxHashMap<&'static str, CommandReg>,
    comparators: FxHashMap<&'static str, ResolvedOperand<dyn Comparator>>,
    match_types: FxHashMap<&'static str, MatchTypeReg>,
    address_parts: FxHashMap<&'static str, ResolvedOperand<dyn AddressPart>>,
    effects: FxHashMap<&'static str, ResolvedOperand<dyn SideEffect>>,
    required: Vec<ExtId>,
    vars_enabled: bool,
    require_allowed: bool,
}

impl<'a> Validator<'a> {
    pub fn new(
        registry: &'a ExtensionRegistry,
        config: &'a SieveConfig,
        diags: &'a mut Diagnostics,
    ) -> Self {
        let mut validator = Self {
            registry,
            config,
            diags,
            commands: FxHashMap::default(),
            comparators: FxHashMap::default(),
            match_types: FxHashMap::default(),
            address_parts: FxHashMap::default(),
            effects: FxHashMap::default(),
            required: Vec::new(),
            vars_enabled: false,
            require_allowed: true,
        };

        for cmd in crate::core::CORE_COMMANDS {
            validator.register_core_command(*cmd);
        }

        // Preloaded hidden extensions seed the claimer registries.
        let preloaded: Vec<(ExtId, Arc<dyn Extension>)> = registry
            .enabled()
            .filter(|(_, ext)| ext.name().starts_with('@'))
            .map(|(id, ext)| (id, ext.clone()))
            .collect();
        for (id, ext) in preloaded {
            ext.validator_load(id, &mut validator);
        }

        validator
    }

    #[must_use]
    pub fn config(&self) -> &SieveConfig {
        self.config
    }

    // ============= Registration (called from extension hooks) =============

    fn register_core_command(&mut self, cmd: &'static dyn Command) {
        self.commands.insert(cmd.name(), CommandReg { cmd, ext: None });
    }

    /// Register an extension-contributed command or test.
    pub fn register_command(&mut self, ext: ExtId, cmd: &'static dyn Command) {
        self.commands
            .insert(cmd.name(), CommandReg { cmd, ext: Some(ext) });
    }

    pub fn register_comparator(
        &mut self,
        name: &'static str,
        source: crate::extension::OperandSource,
        def: &'static dyn Comparator,
    ) {
        self.comparators
            .insert(name, ResolvedOperand { source, def });
    }

    pub fn register_match_type(
        &mut self,
        name: &'static str,
        source: crate::extension::OperandSource,
        def: &'static dyn MatchType,
        relational: bool,
    ) {
        self.match_types.insert(
            name,
            MatchTypeReg {
                op: ResolvedOperand { source, def },
                relational,
            },
        );
    }

    pub fn register_address_part(
        &mut self,
        name: &'static str,
        source: crate::extension::OperandSource,
        def: &'static dyn AddressPart,
    ) {
        self.address_parts
            .insert(name, ResolvedOperand { source, def });
    }

    pub fn register_effect(
        &mut self,
        name: &'static str,
        source: crate::extension::OperandSource,
        def: &'static dyn SideEffect,
    ) {
        self.effects.insert(name, ResolvedOperand { source, def });
    }

    /// Mark the `variables` machinery active for this compile unit.
    pub fn enable_variables(&mut self) {
        self.vars_enabled = true;
    }

    #[must_use]
    pub fn variables_enabled(&self) -> bool {
        self.vars_enabled
    }

    // ============= Require handling =============

    /// Resolve a `require`d capability: find it among the enabled
    /// extensions, run its validator hook once, and record it for the
    /// binary's dependency table.
    pub fn require_extension(&mut self, name: &str, location: Location) -> bool {
        let registry = self.registry;
        match registry.get_by_name(name) {
            None => {
                self.diags.error(
                    Some(location),
                    format!("unknown Sieve capability '{name}'"),
                );
                false
            }
            Some((id, ext)) => {
                if !self.required.contains(&id) {
                    self.required.push(id);
                    let ext = ext.clone();
                    ext.validator_load(id, self);
                }
                true
            }
        }
    }

    // ============= The pass =============

    /// Validate a parsed script. `Some` iff zero errors were reported.
    pub fn run(mut self, ast: &Ast) -> Option<ValidatedScript> {
        let mut resolved: Vec<Option<ResolvedNode>> = Vec::new();
        resolved.resize_with(ast.len(), || None);

        self.validate_sequence(ast, ast.roots(), true, &mut resolved);

        if self.diags.has_errors() {
            None
        } else {
            Some(ValidatedScript {
                resolved,
                required: self.required,
                vars_enabled: self.vars_enabled,
            })
        }
    }

    fn validate_sequence(
        &mut self,
        ast: &Ast,
        ids: &[NodeId],
        toplevel: bool,
        resolved: &mut Vec<Option<ResolvedNode>>,
    ) {
        let mut prev_name: Option<String> = None;
        for &id in ids {
            let name = ast.node(id).name.clone();

            if matches!(name.as_str(), "elsif" | "else")
                && !matches!(prev_name.as_deref(), Some("if" | "elsif"))
            {
                self.diags.error(
                    Some(ast.node(id).location),
                    format!("'{name}' without a matching 'if'"),
                );
                prev_name = Some(name);
                continue;
            }

            self.validate_node(ast, id, resolved);

            if toplevel && name != "require" {
                self.require_allowed = false;
            }
            prev_name = Some(name);
        }
    }

    fn validate_node(
        &mut self,
        ast: &Ast,
        id: NodeId,
        resolved: &mut Vec<Option<ResolvedNode>>,
    ) {
        let node = ast.node(id);
        let location = node.location;

        let Some(&CommandReg { cmd, ext }) = self.commands.get(node.name.as_str()) else {
            let what = match node.kind {
                NodeKind::Command => "command",
                NodeKind::Test => "test",
            };
            self.diags.error(
                Some(location),
                format!("unknown {what} '{}' (missing require?)", node.name),
            );
            // Still walk children to surface their problems.
            self.validate_children(ast, id, resolved);
            return;
        };

        if cmd.kind() != node.kind {
            let (is, not) = match cmd.kind() {
                NodeKind::Command => ("command", "test"),
                NodeKind::Test => ("test", "command"),
            };
            self.diags.error(
                Some(location),
                format!("'{}' is a {is}, it cannot be used as a {not}", node.name),
            );
            self.validate_children(ast, id, resolved);
            return;
        }

        let spec = cmd.spec();

        // Sub-test arity.
        let test_count = node.tests.len();
        let arity_ok = match spec.subtests {
            SubtestArity::None => test_count == 0,
            SubtestArity::One => test_count == 1,
            SubtestArity::OneOrMore => test_count >= 1,
        };
        if !arity_ok {
            let expected = match spec.subtests {
                SubtestArity::None => "no test",
                SubtestArity::One => "exactly one test",
                SubtestArity::OneOrMore => "at least one test",
            };
            self.diags.error(
                Some(location),
                format!(
                    "the '{}' {} expects {expected}, but {test_count} found",
                    node.name,
                    kind_word(node.kind),
                ),
            );
        }

        // Block arity (commands only; the grammar never attaches blocks to
        // tests).
        if node.kind == NodeKind::Command && spec.block != node.has_block {
            let msg = if spec.block {
                format!("the '{}' command requires a block", node.name)
            } else {
                format!("the '{}' command does not allow a block", node.name)
            };
            self.diags.error(Some(location), msg);
        }

        if let Some(scanned) = self.scan_args(ast, id, cmd) {
            let positionals = scanned.positionals.clone();
            let mut ctx = ValidateCtx {
                validator: self,
                ast,
                node: id,
            };
            if let Some(data) = cmd.validate(&mut ctx, scanned) {
                resolved[id.index()] = Some(ResolvedNode {
                    command: cmd,
                    ext,
                    data,
                    positionals,
                });
            }
        }

        self.validate_children(ast, id, resolved);
    }

    fn validate_children(
        &mut self,
        ast: &Ast,
        id: NodeId,
        resolved: &mut Vec<Option<ResolvedNode>>,
    ) {
        let node = ast.node(id);
        let tests = node.tests.clone();
        let block = node.block.clone();
        for test in tests {
            self.validate_node(ast, test, resolved);
        }
        self.validate_sequence(ast, &block, false, resolved);
    }

    // ============= Argument scanning =============

    fn scan_args(&mut self, ast: &Ast, id: NodeId, cmd: &'static dyn Command) -> Option<Scanned> {
        let node = ast.node(id);
        let spec = cmd.spec();
        let args = &node.args;
        let mut scanned = Scanned::default();
        let mut ok = true;
        let mut i = 0usize;

        while i < args.len() {
            let arg = &args[i];
            i += 1;
            let ArgValue::Tag(tag) = &arg.value else {
                scanned.positionals.push(arg.clone());
                continue;
            };
            let tag = tag.as_str();

            // 1. The command's own tag set.
            if let Some(ts) = spec.own_tags.iter().find(|t| t.name == tag) {
                if scanned.own.iter().any(|o| o.name == ts.name) {
                    self.diags.error(
                        Some(arg.location),
                        format!("tag ':{tag}' specified more than once"),
                    );
                    ok = false;
                    continue;
                }
                let value = if ts.param == ParamKind::None {
                    None
                } else {
                    match self.consume_param(args, &mut i, ts.param) {
                        Some(value) => Some(value),
                        None => {
                            self.diags.error(
                                Some(arg.location),
                                format!(
                                    "tag ':{tag}' requires a {} parameter",
                                    param_word(ts.param)
                                ),
                            );
                            ok = false;
                            continue;
                        }
                    }
                };
                scanned.own.push(OwnTag {
                    name: ts.name,
                    value,
                    location: arg.location,
                });
                continue;
            }

            // 2. Comparator claimer.
            if spec.match_tags && tag == "comparator" {
                if scanned.match_args.comparator.is_some() {
                    self.diags
                        .error(Some(arg.location), "':comparator' specified more than once");
                    ok = false;
                    continue;
                }
                let name = self
                    .consume_param(args, &mut i, ParamKind::String)
                    .and_then(|value| value.as_single_string().map(str::to_string));
                let Some(name) = name else {
                    self.diags.error(
                        Some(arg.location),
                        "':comparator' requires a string parameter",
                    );
                    ok = false;
                    continue;
                };
                match self.comparators.get(name.as_str()) {
                    Some(op) => scanned.match_args.comparator = Some(op.clone()),
                    None => {
                        self.diags.error(
                            Some(arg.location),
                            format!("unknown comparator '{name}' (missing require?)"),
                        );
                        ok = false;
                    }
                }
                continue;
            }

            // 3. Match-type claimer.
            if spec.match_tags {
                if let Some(reg) = self.match_types.get(tag).cloned() {
                    if scanned.match_args.match_type.is_some() {
                        self.diags.error(
                            Some(arg.location),
                            "match type specified more than once",
                        );
                        ok = false;
                        continue;
                    }
                    if reg.relational {
                        let relation = match self.consume_param(args, &mut i, ParamKind::String) {
                            Some(ArgValue::Str(rel)) => Relation::parse(&rel),
                            Some(ArgValue::StringList(items)) if items.len() == 1 => {
                                Relation::parse(&items[0])
                            }
                            _ => None,
                        };
                        match relation {
                            Some(relation) => scanned.match_args.relation = Some(relation),
                            None => {
                                self.diags.error(
                                    Some(arg.location),
                                    format!(
                                        "':{tag}' requires a relational operator \
                                         (gt, ge, lt, le, eq or ne)"
                                    ),
                                );
                                ok = false;
                                continue;
                            }
                        }
                    }
                    scanned.match_args.match_type = Some(reg.op);
                    continue;
                }
            }

            // 4. Address-part claimer.
            if spec.address_tag {
                if let Some(op) = self.address_parts.get(tag).cloned() {
                    if scanned.match_args.address_part.is_some() {
                        self.diags.error(
                            Some(arg.location),
                            "address part specified more than once",
                        );
                        ok = false;
                        continue;
                    }
                    scanned.match_args.address_part = Some(op);
                    continue;
                }
            }

            // 5. Side-effect claimer.
            if spec.effect_tags {
                if let Some(op) = self.effects.get(tag).cloned() {
                    if !op.def.applies_to(cmd.name()) {
                        self.diags.error(
                            Some(arg.location),
                            format!("tag ':{tag}' cannot be used with '{}'", cmd.name()),
                        );
                        ok = false;
                        continue;
                    }
                    if scanned
                        .effects
                        .iter()
                        .any(|e| e.op.def.name() == op.def.name())
                    {
                        self.diags.error(
                            Some(arg.location),
                            format!("tag ':{tag}' specified more than once"),
                        );
                        ok = false;
                        continue;
                    }
                    let param = op.def.param_kind();
                    let value = if param == ParamKind::None {
                        None
                    } else {
                        match self.consume_param(args, &mut i, param) {
                            Some(value) => Some(value),
                            None => {
                                self.diags.error(
                                    Some(arg.location),
                                    format!(
                                        "tag ':{tag}' requires a {} parameter",
                                        param_word(param)
                                    ),
                                );
                                ok = false;
                                continue;
                            }
                        }
                    };
                    scanned.effects.push(ResolvedEffect {
                        op,
                        arg: value,
                    });
                    continue;
                }
            }

            self.diags.error(
                Some(arg.location),
                format!(
                    "unknown tagged argument ':{tag}' for the '{}' {}",
                    cmd.name(),
                    kind_word(node.kind),
                ),
            );
            ok = false;
        }

        // Positional arity and types.
        let want = spec.positional;
        if scanned.positionals.len() != want.len() {
            self.diags.error(
                Some(node.location),
                format!(
                    "the '{}' {} requires {} positional argument(s), but {} found",
                    cmd.name(),
                    kind_word(node.kind),
                    want.len(),
                    scanned.positionals.len()
                ),
            );
            return None;
        }
        for (pos, arg) in want.iter().zip(&scanned.positionals) {
            let matches = match pos.kind {
                PosKind::Number => matches!(arg.value, ArgValue::Number(_)),
                PosKind::String => arg.value.as_single_string().is_some(),
                PosKind::StringList => arg.value.as_string_list().is_some(),
            };
            if !matches {
                self.diags.error(
                    Some(arg.location),
                    format!(
                        "the '{}' {} expects its {} argument to be a {}, but {} was found",
                        cmd.name(),
                        kind_word(node.kind),
                        pos.name,
                        pos_word(pos.kind),
                        arg.value.type_name()
                    ),
                );
                ok = false;
            }
        }

        ok.then_some(scanned)
    }

    /// Consume the parameter argument following a tag.
    fn consume_param(
        &mut self,
        args: &[Argument],
        i: &mut usize,
        kind: ParamKind,
    ) -> Option<ArgValue> {
        let arg = args.get(*i)?;
        let ok = match kind {
            ParamKind::None => false,
            ParamKind::Number => matches!(arg.value, ArgValue::Number(_)),
            ParamKind::String => arg.value.as_single_string().is_some(),
            ParamKind::StringList => arg.value.as_string_list().is_some(),
        };
        if !ok {
            return None;
        }
        *i += 1;
        Some(arg.value.clone())
    }

    pub(crate) fn error(&mut self, location: Location, message: impl Into<String>) {
        self.diags.error(Some(location), message);
    }

    pub(crate) fn is_require_allowed(&self) -> bool {
        self.require_allowed
    }
}

fn kind_word(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Command => "command",
        NodeKind::Test => "test",
    }
}

fn param_word(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::None => "no",
        ParamKind::Number => "number",
        ParamKind::String => "string",
        ParamKind::StringList => "string list",
    }
}

fn pos_word(kind: PosKind) -> &'static str {
    match kind {
        PosKind::Number => "number",
        PosKind::String => "string",
        PosKind::StringList => "string list",
    }
}

/// Context handed to `Command::validate`.
pub struct ValidateCtx<'v, 'a> {
    pub validator: &'v mut Validator<'a>,
    pub ast: &'v Ast,
    pub node: NodeId,
}

impl ValidateCtx<'_, '_> {
    #[must_use]
    pub fn node(&self) -> &rsieve_ast::Node {
        self.ast.node(self.node)
    }

    #[must_use]
    pub fn location(&self) -> Location {
        self.node().location
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let location = self.location();
        self.validator.error(location, message);
    }

    /// Whether this node sits directly at script top level.
    #[must_use]
    pub fn is_toplevel(&self) -> bool {
        self.node().parent.is_none()
    }
}
