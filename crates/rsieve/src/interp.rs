//! The bytecode interpreter.
//!
//! Executes one program block against one message, maintaining the boolean
//! test register, the per-extension runtime contexts, and the accumulated
//! result. Operations read their own operands through [`CodeReader`];
//! control-flow operations reposition it.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use rsieve_binary::{Binary, Reader};

use crate::config::{SieveConfig, TraceLevel};
use crate::error::{ExecStatus, Result, SieveError};
use crate::extension::{ExtId, Extension};
use crate::match_type::{MatchContext, RegexCache, Relation};
use crate::msg::Message;
use crate::registry::ExtensionRegistry;
use crate::result::SieveResult;

/// One entry of a binary's extension-dependency table, resolved against
/// the registry of the executing instance.
pub struct LinkedDep {
    pub id: ExtId,
    pub ext: Arc<dyn Extension>,
}

/// A binary bound to the extension set of one instance, ready to execute
/// or dump.
pub struct LinkedProgram<'a> {
    pub binary: &'a Binary,
    pub deps: Vec<LinkedDep>,
}

impl std::fmt::Debug for LinkedDep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedDep")
            .field("id", &self.id)
            .field("ext", &self.ext.name())
            .finish()
    }
}

impl std::fmt::Debug for LinkedProgram<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedProgram")
            .field("binary", &self.binary)
            .field("deps", &self.deps)
            .finish()
    }
}

/// Resolve a binary's dependency table. Fails with `BinCorrupt` when the
/// binary references an extension that is not registered and enabled here;
/// a binary whose extension set is a subset of the enabled set always
/// links.
pub fn link<'a>(registry: &ExtensionRegistry, binary: &'a Binary) -> Result<LinkedProgram<'a>> {
    let mut deps = Vec::with_capacity(binary.extensions().len());
    for name in binary.extensions() {
        let Some((id, ext)) = registry.get_by_name(name) else {
            return Err(SieveError::BinCorrupt(format!(
                "binary references unknown extension '{name}'"
            )));
        };
        deps.push(LinkedDep {
            id,
            ext: ext.clone(),
        });
    }
    Ok(LinkedProgram { binary, deps })
}

/// Cursor over the program block plus the linked dependency table needed
/// to resolve extension opcodes and operands.
pub struct CodeReader<'a> {
    pub rd: Reader<'a>,
    pub deps: &'a [LinkedDep],
}

impl<'a> CodeReader<'a> {
    #[must_use]
    pub fn new(code: &'a [u8], deps: &'a [LinkedDep]) -> Self {
        Self {
            rd: Reader::new(code),
            deps,
        }
    }

    pub(crate) fn dep(&self, index: usize) -> std::result::Result<&'a LinkedDep, rsieve_binary::CodecError> {
        self.deps
            .get(index)
            .ok_or(rsieve_binary::CodecError::BadExtensionIndex { index })
    }
}

/// Mutable state of one execution.
pub struct Runtime<'a> {
    pub message: &'a dyn Message,
    pub config: &'a SieveConfig,
    pub result: &'a mut SieveResult,
    pub script_name: &'a str,
    /// The boolean test register consumed by conditional jumps.
    pub test_result: bool,
    /// Set by `stop`; ends the run after the current operation.
    pub stopped: bool,
    /// Named variables (populated by the `variables` extension).
    pub vars: FxHashMap<String, String>,
    /// `${0}`, `${1}`... from the last successful wildcard/regex match.
    pub captured: Vec<String>,
    pub regexes: RegexCache,
    contexts: FxHashMap<&'static str, Box<dyn Any>>,
    cached_size: Option<u64>,
}

impl<'a> Runtime<'a> {
    pub fn new(
        message: &'a dyn Message,
        config: &'a SieveConfig,
        result: &'a mut SieveResult,
        script_name: &'a str,
    ) -> Self {
        Self {
            message,
            config,
            result,
            script_name,
            test_result: false,
            stopped: false,
            vars: FxHashMap::default(),
            captured: Vec::new(),
            regexes: RegexCache::default(),
            contexts: FxHashMap::default(),
            cached_size: None,
        }
    }

    /// Physical message size, read once per run.
    pub fn message_size(&mut self) -> u64 {
        *self.cached_size.get_or_insert_with(|| self.message.size())
    }

    // ============= Per-extension contexts =============

    pub fn set_context(&mut self, extension: &'static str, context: Box<dyn Any>) {
        self.contexts.insert(extension, context);
    }

    pub fn context_mut<T: 'static>(&mut self, extension: &str) -> Option<&mut T> {
        self.contexts.get_mut(extension)?.downcast_mut::<T>()
    }

    pub fn context<T: 'static>(&self, extension: &str) -> Option<&T> {
        self.contexts.get(extension)?.downcast_ref::<T>()
    }

    // ============= Matching =============

    /// Borrow the pieces a match evaluation needs.
    pub fn match_context(
        &mut self,
        comparator: &'static dyn crate::comparator::Comparator,
        relation: Option<Relation>,
    ) -> MatchContext<'_> {
        MatchContext {
            comparator,
            relation,
            regexes: &mut self.regexes,
            captured: &mut self.captured,
        }
    }

    // ============= Tracing =============

    /// Emit a runtime trace line when the configured level allows it.
    pub fn trace(&self, level: TraceLevel, message: impl FnOnce() -> String) {
        if self.config.trace_level >= level {
            tracing::trace!(
                target: "rsieve::trace",
                script = self.script_name,
                "{}",
                message()
            );
        }
    }
}

/// Append a line to the per-user log file, when one is configured.
fn user_log(config: &SieveConfig, script: &str, message: &str) {
    let Some(path) = &config.user_log else { return };
    use std::io::Write;
    let entry = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "sieve: {script}: {message}"));
    if let Err(err) = entry {
        tracing::warn!(path = %path.display(), %err, "cannot write sieve user log");
    }
}

/// Drives one program to completion against one message.
pub struct Interpreter<'a> {
    reader: CodeReader<'a>,
    rt: Runtime<'a>,
    deadline: Option<Instant>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        program: &'a LinkedProgram<'a>,
        message: &'a dyn Message,
        config: &'a SieveConfig,
        result: &'a mut SieveResult,
    ) -> Self {
        let mut rt = Runtime::new(message, config, result, program.binary.script_name());
        for dep in &program.deps {
            dep.ext.interpreter_load(dep.id, &mut rt);
        }
        Self {
            reader: CodeReader::new(program.binary.program(), &program.deps),
            rt,
            deadline: config.max_cpu_time.map(|limit: Duration| Instant::now() + limit),
        }
    }

    /// Whether the last run ended via `stop`.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.rt.stopped
    }

    /// Run to completion. On a runtime error the accumulated result is
    /// left as-is and the error's status is returned.
    pub fn run(&mut self) -> ExecStatus {
        loop {
            if self.rt.stopped || self.reader.rd.at_end() {
                return ExecStatus::Ok;
            }
            if let Some(deadline) = self.deadline {
                if Instant::now() > deadline {
                    tracing::error!(
                        script = self.rt.script_name,
                        "sieve execution aborted: cpu time limit exceeded"
                    );
                    user_log(
                        self.rt.config,
                        self.rt.script_name,
                        "execution aborted: cpu time limit exceeded",
                    );
                    return crate::error::RuntimeError::CpuLimit.status();
                }
            }

            let offset = self.reader.rd.pos();
            let op = match self.reader.read_opcode() {
                Ok(op) => op,
                Err(err) => {
                    tracing::error!(
                        script = self.rt.script_name,
                        offset,
                        %err,
                        "sieve bytecode decode failed"
                    );
                    return ExecStatus::BinCorrupt;
                }
            };

            self.rt
                .trace(TraceLevel::Commands, || format!("{:08x}: {}", offset, op.name()));

            if let Err(err) = op.execute(&mut self.rt, &mut self.reader) {
                tracing::error!(
                    script = self.rt.script_name,
                    offset,
                    operation = op.name(),
                    %err,
                    "sieve runtime error"
                );
                user_log(self.rt.config, self.rt.script_name, &err.to_string());
                return err.status();
            }
        }
    }
}
