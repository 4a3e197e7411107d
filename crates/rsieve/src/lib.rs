//! rsieve - a Sieve (RFC 5228) mail filtering engine.
//!
//! Compiles Sieve scripts to a compact, versioned bytecode and executes
//! the bytecode against messages, producing a deduplicated action set.
//! Extensions plug into every stage: validation, code generation, the
//! operand codec, and the interpreter's opcode table.
//!
//! # Example
//!
//! ```ignore
//! use rsieve::{Sieve, SieveConfig, Diagnostics, Script};
//!
//! let sieve = Sieve::new(SieveConfig::default())?;
//! let mut diags = Diagnostics::new();
//! let script = Script::inline("filter", r#"require "fileinto"; fileinto "Spam";"#);
//! let binary = sieve.compile(&script, &mut diags)?;
//! let status = sieve.execute(&binary, &message, &mut delivery);
//! ```

mod address_part;
mod command;
mod comparator;
mod config;
mod core;
mod deliver;
mod dump;
mod error;
mod extension;
mod exts;
mod generate;
mod interp;
mod match_type;
mod msg;
mod multiscript;
mod operand;
mod registry;
mod result;
pub mod testing;
mod validate;

use std::path::Path;
use std::sync::Arc;

pub use rsieve_ast::{
    ArgValue, Ast, Diagnostic, Diagnostics, Location, NodeId, NodeKind, Script, Severity,
};
pub use rsieve_binary::{Binary, BinaryError};

pub use crate::address_part::AddressPart;
pub use crate::command::{
    CaseModifier, Command, CommandData, CommandSpec, MatchArgs, ParamKind, PosKind, PosSpec,
    ResolvedEffect, SubtestArity, TagSpec, VacationData,
};
pub use crate::comparator::Comparator;
pub use crate::config::{SieveConfig, TraceLevel};
pub use crate::deliver::{DeliveryError, DeliveryTarget, VacationResponse};
pub use crate::error::{ExecStatus, Result, RuntimeError, SieveError};
pub use crate::extension::{ExtId, Extension, Operation, SideEffect, SideEffectValue};
pub use crate::interp::{CodeReader, Interpreter, LinkedProgram, Runtime};
pub use crate::match_type::{MatchContext, MatchType, RegexCache, Relation};
pub use crate::msg::{Address, Message, parse_addresses};
pub use crate::multiscript::Multiscript;
pub use crate::registry::ExtensionRegistry;
pub use crate::result::{Action, SieveResult};
pub use crate::validate::{ResolvedNode, Scanned, ValidateCtx, ValidatedScript, Validator};

/// Engine version recorded in binary headers; bumped when generated
/// bytecode changes incompatibly.
pub const ENGINE_VERSION: u64 = 1;

/// One Sieve engine instance: a configured extension set plus the
/// compile and execute entry points.
///
/// Instances are cheap to keep around and immutable once constructed;
/// binaries compiled by one instance load in any instance whose enabled
/// extension set is a superset of the binary's dependencies.
pub struct Sieve {
    registry: ExtensionRegistry,
    config: SieveConfig,
}

impl Sieve {
    /// Build an instance with the bundled extensions and the given
    /// configuration (including its `sieve_extensions` enable list).
    pub fn new(config: SieveConfig) -> Result<Self> {
        let mut registry = ExtensionRegistry::new();
        exts::register_bundled(&mut registry, &config)?;
        if let Some(spec) = &config.extensions {
            registry.set_enabled(spec);
        }
        tracing::debug!(
            capabilities = %registry.capability_string(),
            "sieve instance initialised"
        );
        Ok(Self { registry, config })
    }

    /// Instance with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(SieveConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &SieveConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Register an additional (host-provided) extension.
    pub fn register_extension(&mut self, ext: Arc<dyn Extension>) -> Result<ExtId> {
        self.registry.register(ext)
    }

    /// The capability string: enabled, non-hidden extensions in
    /// registration order.
    #[must_use]
    pub fn capabilities(&self) -> String {
        self.registry.capability_string()
    }

    // ============= Compilation =============

    /// Compile a script source to a binary. Diagnostics accumulate in
    /// `diags`; on failure no binary is produced.
    pub fn compile(&self, script: &Script, diags: &mut Diagnostics) -> Result<Binary> {
        let source = script.load(Some(self.config.max_script_size))?;
        let fingerprint = Script::fingerprint(&source);

        let Some(ast) = rsieve_ast::parse(&source, diags) else {
            return Err(SieveError::NotValid(script.name().to_string()));
        };

        let validator = Validator::new(&self.registry, &self.config, diags);
        let Some(validated) = validator.run(&ast) else {
            return Err(SieveError::NotValid(script.name().to_string()));
        };

        let binary = generate::generate(
            &self.registry,
            &validated,
            &ast,
            script.name(),
            fingerprint,
        )?;
        tracing::debug!(script = script.name(), "script successfully compiled");
        Ok(binary)
    }

    /// Compile an in-memory source.
    pub fn compile_source(
        &self,
        name: &str,
        source: &str,
        diags: &mut Diagnostics,
    ) -> Result<Binary> {
        self.compile(&Script::inline(name, source), diags)
    }

    /// Load a cached binary when it is up to date with the script source,
    /// otherwise (re)compile and refresh the cache.
    pub fn open(
        &self,
        script: &Script,
        binary_path: Option<&Path>,
        diags: &mut Diagnostics,
    ) -> Result<Binary> {
        let source = script.load(Some(self.config.max_script_size))?;
        let fingerprint = Script::fingerprint(&source);

        if let Some(path) = binary_path {
            match Binary::load(path) {
                Ok(binary) if binary.up_to_date(fingerprint) => {
                    // Binary must also still link against this instance.
                    if interp::link(&self.registry, &binary).is_ok() {
                        return Ok(binary);
                    }
                    tracing::debug!(
                        path = %path.display(),
                        "cached binary does not link here, recompiling"
                    );
                }
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "cached binary is stale, recompiling");
                }
                Err(BinaryError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "discarding unreadable binary");
                }
            }
        }

        let binary = self.compile(script, diags)?;
        if let Some(path) = binary_path {
            if let Err(err) = binary.save(path, None) {
                tracing::warn!(path = %path.display(), %err, "failed to cache compiled binary");
            }
        }
        Ok(binary)
    }

    // ============= Execution =============

    /// Bind a binary to this instance's extension set.
    pub fn link<'a>(&self, binary: &'a Binary) -> Result<LinkedProgram<'a>> {
        interp::link(&self.registry, binary)
    }

    /// Run a binary into an existing result without executing actions.
    /// Returns the run status and whether the script ended via `stop`.
    pub fn run_into(
        &self,
        binary: &Binary,
        message: &dyn Message,
        result: &mut SieveResult,
    ) -> (ExecStatus, bool) {
        let program = match self.link(binary) {
            Ok(program) => program,
            Err(err) => {
                tracing::error!(script = binary.script_name(), %err, "cannot execute binary");
                return (ExecStatus::BinCorrupt, false);
            }
        };
        let mut interpreter = Interpreter::new(&program, message, &self.config, result);
        let status = interpreter.run();
        (status, interpreter.stopped())
    }

    /// Run a binary and execute the resulting actions, falling back to
    /// implicit keep on runtime errors so the message is never lost.
    pub fn execute(
        &self,
        binary: &Binary,
        message: &dyn Message,
        deliver: &mut dyn DeliveryTarget,
    ) -> ExecStatus {
        let mut result = SieveResult::new(&self.config);
        let (status, _) = self.run_into(binary, message, &mut result);
        match status {
            ExecStatus::Ok => result.execute(deliver, true),
            // Corrupt binaries are the caller's problem to resolve; an
            // implicit keep here could duplicate mail once the binary is
            // fixed and redelivered.
            ExecStatus::BinCorrupt => ExecStatus::BinCorrupt,
            ExecStatus::Failure | ExecStatus::ResourceLimit => {
                match result.implicit_keep(deliver) {
                    ExecStatus::Ok => ExecStatus::Failure,
                    ExecStatus::TempFailure => ExecStatus::TempFailure,
                    _ => ExecStatus::KeepFailed,
                }
            }
            other => other,
        }
    }

    /// Start a multiscript chain for one message.
    #[must_use]
    pub fn multiscript<'a>(&'a self, message: &'a dyn Message) -> Multiscript<'a> {
        Multiscript::new(self, message)
    }

    // ============= Debugging =============

    /// Human-readable listing of a binary's program block.
    pub fn dump(&self, binary: &Binary) -> Result<String> {
        let program = self.link(binary)?;
        dump::dump_program(&program)
    }
}
