//! Code generation.
//!
//! A single forward pass over the validated AST. Forward jumps are
//! emitted as 32-bit placeholders collected in [`JumpList`]s and patched
//! once their target is known. `allof`/`anyof` become short-circuited
//! jump chains; `not` flips the polarity of the next conditional jump.
//! Every extension whose handler is hit gets linked into the binary's
//! dependency table.

use rsieve_ast::{ArgValue, Ast, Node, NodeId};
use rsieve_binary::{BLOCK_PROGRAM, Binary, Writer};

use crate::command::{MatchArgs, ResolvedEffect};
use crate::error::{Result, SieveError};
use crate::extension::{ExtId, OperandSource, ResolvedOperand};
use crate::match_type::Relation;
use crate::operand::{
    OPERAND_ADDRESS_PART, OPERAND_COMPARATOR, OPERAND_MATCH_TYPE, OPERAND_NUMBER,
    OPERAND_SIDE_EFFECT, OPERAND_STRING, OPERAND_STRING_LIST, OPERAND_VARIABLE_REF,
    OPT_ADDRESS_PART, OPT_COMPARATOR, OPT_END, OPT_MATCH_TYPE, OPT_SIDE_EFFECT,
};
use crate::registry::ExtensionRegistry;
use crate::validate::{ResolvedNode, ValidatedScript};

/// Collected forward-jump placeholders sharing one target.
#[derive(Debug, Default)]
pub struct JumpList {
    slots: Vec<usize>,
}

impl JumpList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, slot: usize) {
        self.slots.push(slot);
    }

    /// Patch all collected slots to jump to the current position.
    pub fn resolve(self, generator: &mut Generator<'_>) {
        let target = generator.writer.len();
        for slot in self.slots {
            let offset = target as i64 - (slot as i64 + 4);
            generator.writer.patch_i32(slot, offset as i32);
        }
    }
}

/// One entry of an optional-operand trailer to emit.
pub enum TrailerItem<'x> {
    Comparator(&'x ResolvedOperand<dyn crate::comparator::Comparator>),
    MatchType(
        &'x ResolvedOperand<dyn crate::match_type::MatchType>,
        Option<Relation>,
    ),
    AddressPart(&'x ResolvedOperand<dyn crate::address_part::AddressPart>),
    Effect(&'x ResolvedEffect),
    Number(u8, u64),
    Str(u8, &'x str),
    StrList(u8, Vec<&'x str>),
    /// Presence-only custom code (`:mime`).
    Flag(u8),
}

/// The code generator for one compile unit.
pub struct Generator<'a> {
    writer: Writer,
    binary: Binary,
    registry: &'a ExtensionRegistry,
    validated: &'a ValidatedScript,
    ast: &'a Ast,
    vars_ext: Option<ExtId>,
}

impl<'a> Generator<'a> {
    pub fn new(
        registry: &'a ExtensionRegistry,
        validated: &'a ValidatedScript,
        ast: &'a Ast,
        script_name: &str,
        fingerprint: u64,
    ) -> Self {
        let mut binary = Binary::new(script_name, fingerprint, crate::ENGINE_VERSION);
        // Seed the dependency table in require order so forward
        // compatibility checks see every declared capability.
        for &id in &validated.required {
            if let Some(ext) = registry.get(id) {
                binary.link_extension(ext.name());
            }
        }
        let vars_ext = if validated.vars_enabled {
            registry.get_by_name("variables").map(|(id, _)| id)
        } else {
            None
        };
        Self {
            writer: Writer::new(),
            binary,
            registry,
            validated,
            ast,
            vars_ext,
        }
    }

    /// Generate the whole program and finish the binary.
    pub fn run(mut self) -> Result<Binary> {
        let roots: Vec<NodeId> = self.ast.roots().to_vec();
        self.generate_block(&roots)?;
        let program = std::mem::take(&mut self.writer).into_bytes();
        self.binary.set_block(BLOCK_PROGRAM, program);
        tracing::debug!(
            script = self.binary.script_name(),
            bytes = self.binary.program().len(),
            extensions = ?self.binary.extensions(),
            "sieve code generation complete"
        );
        Ok(self.binary)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        self.ast.node(id)
    }

    fn resolved(&self, id: NodeId) -> Result<&'a ResolvedNode> {
        self.validated.resolved[id.index()]
            .as_ref()
            .ok_or_else(|| {
                SieveError::Internal(format!(
                    "no validation record for node {} '{}'",
                    id.index(),
                    self.ast.node(id).name
                ))
            })
    }

    // ============= Statement sequences =============

    /// Generate a block of commands, folding `if`/`elsif`/`else` chains.
    pub fn generate_block(&mut self, ids: &[NodeId]) -> Result<()> {
        let mut i = 0;
        while i < ids.len() {
            let node = self.ast.node(ids[i]);
            if node.name == "if" {
                let mut chain = vec![ids[i]];
                i += 1;
                while i < ids.len()
                    && matches!(self.ast.node(ids[i]).name.as_str(), "elsif" | "else")
                {
                    chain.push(ids[i]);
                    i += 1;
                }
                self.generate_conditional(&chain)?;
            } else {
                let info = self.resolved(ids[i])?;
                info.command.generate(self, ids[i], info)?;
                i += 1;
            }
        }
        Ok(())
    }

    /// An `if`/`elsif`/`else` chain: each branch tests, jumps past its
    /// body on false, and jumps to the chain end after its body.
    fn generate_conditional(&mut self, chain: &[NodeId]) -> Result<()> {
        let mut end_jumps = JumpList::new();
        for (index, &id) in chain.iter().enumerate() {
            let node = self.ast.node(id);
            let block: Vec<NodeId> = node.block.clone();
            if node.name == "else" {
                self.generate_block(&block)?;
            } else {
                let test = node.tests[0];
                let mut false_jumps = JumpList::new();
                self.generate_test(test, &mut false_jumps, false)?;
                self.generate_block(&block)?;
                if index + 1 < chain.len() {
                    self.emit_jump(&mut end_jumps);
                }
                false_jumps.resolve(self);
            }
        }
        end_jumps.resolve(self);
        Ok(())
    }

    // ============= Tests =============

    /// Generate a test. When it settles on `jump_if`, control transfers
    /// to `jumps`; otherwise it falls through.
    pub fn generate_test(
        &mut self,
        id: NodeId,
        jumps: &mut JumpList,
        jump_if: bool,
    ) -> Result<()> {
        let node = self.ast.node(id);
        match node.name.as_str() {
            "not" => {
                let inner = node.tests[0];
                self.generate_test(inner, jumps, !jump_if)
            }
            "allof" => {
                let tests: Vec<NodeId> = node.tests.clone();
                if jump_if {
                    // All but the last short-circuit to a local false
                    // label; the last transfers on true.
                    let mut fall_out = JumpList::new();
                    let (last, rest) = tests.split_last().expect("validated arity");
                    for &test in rest {
                        self.generate_test(test, &mut fall_out, false)?;
                    }
                    self.generate_test(*last, jumps, true)?;
                    fall_out.resolve(self);
                    Ok(())
                } else {
                    for test in tests {
                        self.generate_test(test, jumps, false)?;
                    }
                    Ok(())
                }
            }
            "anyof" => {
                let tests: Vec<NodeId> = node.tests.clone();
                if jump_if {
                    for test in tests {
                        self.generate_test(test, jumps, true)?;
                    }
                    Ok(())
                } else {
                    let mut fall_out = JumpList::new();
                    let (last, rest) = tests.split_last().expect("validated arity");
                    for &test in rest {
                        self.generate_test(test, &mut fall_out, true)?;
                    }
                    self.generate_test(*last, jumps, false)?;
                    fall_out.resolve(self);
                    Ok(())
                }
            }
            _ => {
                let info = self.resolved(id)?;
                info.command.generate(self, id, info)?;
                self.emit_branch(jumps, jump_if);
                Ok(())
            }
        }
    }

    // ============= Emitters =============

    pub fn emit_opcode(&mut self, code: u8) {
        self.writer.write_u8(code);
    }

    /// Emit an extension-owned opcode: dependency selector plus sub-code.
    pub fn emit_ext_opcode(&mut self, ext: ExtId, sub: u8) -> Result<()> {
        let selector = self.ext_selector(ext)?;
        self.writer.write_u8(selector);
        self.writer.write_u8(sub);
        Ok(())
    }

    /// Unconditional jump into a jump list.
    pub fn emit_jump(&mut self, jumps: &mut JumpList) {
        self.writer.write_u8(crate::core::OP_JMP);
        jumps.add(self.writer.reserve_i32());
    }

    /// Conditional jump consuming the test register.
    pub fn emit_branch(&mut self, jumps: &mut JumpList, jump_if: bool) {
        self.writer.write_u8(if jump_if {
            crate::core::OP_JMP_TRUE
        } else {
            crate::core::OP_JMP_FALSE
        });
        jumps.add(self.writer.reserve_i32());
    }

    pub fn emit_number(&mut self, value: u64) {
        self.writer.write_u8(OPERAND_NUMBER);
        self.writer.write_varint(value);
    }

    /// Emit a string operand; strings using `${...}` go through the
    /// variables extension's substitution operand when it is active.
    pub fn emit_string(&mut self, value: &str) -> Result<()> {
        if let Some(ext) = self.vars_ext {
            if crate::exts::variables::uses_variables(value) {
                return crate::exts::variables::emit_var_string(self, ext, value);
            }
        }
        self.writer.write_u8(OPERAND_STRING);
        self.writer.write_string(value);
        Ok(())
    }

    pub fn emit_string_list<S: AsRef<str>>(&mut self, items: &[S]) -> Result<()> {
        self.writer.write_u8(OPERAND_STRING_LIST);
        self.writer.write_varint(items.len() as u64);
        for item in items {
            self.emit_string(item.as_ref())?;
        }
        Ok(())
    }

    /// Emit a positional string-list argument.
    pub fn emit_string_list_arg(&mut self, arg: &ArgValue) -> Result<()> {
        let items = arg
            .as_string_list()
            .ok_or_else(|| SieveError::Internal("expected string list argument".to_string()))?;
        self.emit_string_list(&items)
    }

    pub fn emit_variable_ref(&mut self, name: &str) {
        self.writer.write_u8(OPERAND_VARIABLE_REF);
        self.writer.write_string(name);
    }

    fn ext_selector(&mut self, ext: ExtId) -> Result<u8> {
        let name = self
            .registry
            .get(ext)
            .ok_or_else(|| SieveError::Internal("unregistered extension id".to_string()))?
            .name();
        let index = self.binary.link_extension(name);
        if index >= 127 {
            return Err(SieveError::Internal(
                "extension dependency table overflow".to_string(),
            ));
        }
        Ok(128 + index as u8)
    }

    fn emit_source<T: ?Sized + 'static>(
        &mut self,
        source: OperandSource,
        variants: impl Fn(&dyn crate::extension::Extension) -> &'static [&'static T],
    ) -> Result<()> {
        match source {
            OperandSource::Core(code) => self.writer.write_u8(code),
            OperandSource::Ext { ext, sub } => {
                let selector = self.ext_selector(ext)?;
                self.writer.write_u8(selector);
                let count = self
                    .registry
                    .get(ext)
                    .map_or(0, |e| variants(e.as_ref()).len());
                if count > 1 {
                    self.writer.write_u8(sub);
                }
            }
        }
        Ok(())
    }

    pub fn emit_comparator(
        &mut self,
        op: &ResolvedOperand<dyn crate::comparator::Comparator>,
    ) -> Result<()> {
        self.writer.write_u8(OPERAND_COMPARATOR);
        self.emit_source(op.source, |ext| ext.comparators())
    }

    pub fn emit_match_type(
        &mut self,
        op: &ResolvedOperand<dyn crate::match_type::MatchType>,
        relation: Option<Relation>,
    ) -> Result<()> {
        self.writer.write_u8(OPERAND_MATCH_TYPE);
        self.emit_source(op.source, |ext| ext.match_types())?;
        if let Some(relation) = relation {
            self.writer.write_u8(relation.code());
        }
        Ok(())
    }

    pub fn emit_address_part(
        &mut self,
        op: &ResolvedOperand<dyn crate::address_part::AddressPart>,
    ) -> Result<()> {
        self.writer.write_u8(OPERAND_ADDRESS_PART);
        self.emit_source(op.source, |ext| ext.address_parts())
    }

    pub fn emit_effect(&mut self, effect: &ResolvedEffect) -> Result<()> {
        self.writer.write_u8(OPERAND_SIDE_EFFECT);
        self.emit_source(effect.op.source, |ext| ext.side_effects())?;
        if let Some(arg) = &effect.arg {
            self.emit_string_list_arg(arg)?;
        }
        Ok(())
    }

    /// Emit an optional-operand trailer.
    pub fn emit_trailer(&mut self, items: &[TrailerItem<'_>]) -> Result<()> {
        if items.is_empty() {
            self.writer.write_u8(0);
            return Ok(());
        }
        self.writer.write_u8(1);
        for item in items {
            match item {
                TrailerItem::Comparator(op) => {
                    self.writer.write_u8(OPT_COMPARATOR);
                    self.emit_comparator(op)?;
                }
                TrailerItem::MatchType(op, relation) => {
                    self.writer.write_u8(OPT_MATCH_TYPE);
                    self.emit_match_type(op, *relation)?;
                }
                TrailerItem::AddressPart(op) => {
                    self.writer.write_u8(OPT_ADDRESS_PART);
                    self.emit_address_part(op)?;
                }
                TrailerItem::Effect(effect) => {
                    self.writer.write_u8(OPT_SIDE_EFFECT);
                    self.emit_effect(effect)?;
                }
                TrailerItem::Number(code, value) => {
                    self.writer.write_u8(*code);
                    self.emit_number(*value);
                }
                TrailerItem::Str(code, value) => {
                    self.writer.write_u8(*code);
                    self.emit_string(value)?;
                }
                TrailerItem::StrList(code, items) => {
                    self.writer.write_u8(*code);
                    self.emit_string_list(items)?;
                }
                TrailerItem::Flag(code) => {
                    self.writer.write_u8(*code);
                }
            }
        }
        self.writer.write_u8(OPT_END);
        Ok(())
    }

    /// Trailer items for a match-style test: only explicitly specified
    /// tags are encoded; decoders fill in the defaults.
    #[must_use]
    pub fn match_trailer_items<'x>(
        args: &'x MatchArgs,
        effects: &'x [ResolvedEffect],
    ) -> Vec<TrailerItem<'x>> {
        let mut items = Vec::new();
        if let Some(op) = &args.comparator {
            items.push(TrailerItem::Comparator(op));
        }
        if let Some(op) = &args.match_type {
            items.push(TrailerItem::MatchType(op, args.relation));
        }
        if let Some(op) = &args.address_part {
            items.push(TrailerItem::AddressPart(op));
        }
        for effect in effects {
            items.push(TrailerItem::Effect(effect));
        }
        items
    }

    /// Raw access for extension-owned operand encodings.
    pub(crate) fn writer_mut(&mut self) -> &mut Writer {
        &mut self.writer
    }

    /// Selector byte(s) for an extension-owned operand class.
    pub(crate) fn emit_ext_operand(
        &mut self,
        ext: ExtId,
        sub: u8,
        variants: usize,
    ) -> Result<()> {
        let selector = self.ext_selector(ext)?;
        self.writer.write_u8(selector);
        if variants > 1 {
            self.writer.write_u8(sub);
        }
        Ok(())
    }
}

/// Compile a validated AST into a binary.
pub fn generate(
    registry: &ExtensionRegistry,
    validated: &ValidatedScript,
    ast: &Ast,
    script_name: &str,
    fingerprint: u64,
) -> Result<Binary> {
    Generator::new(registry, validated, ast, script_name, fingerprint).run()
}
