//! Human-readable binary listings.
//!
//! Renders one operation per line with its absolute byte offset, followed
//! by indented operand lines. Extension operands are resolved through the
//! linked dependency table, so dumping fails on the same binaries that
//! execution would refuse.

use std::fmt::Write as _;

use rsieve_binary::CodecError;

use crate::error::{Result, SieveError};
use crate::interp::{CodeReader, LinkedProgram};

pub struct Dumper<'a> {
    pub code: CodeReader<'a>,
    out: String,
}

impl<'a> Dumper<'a> {
    #[must_use]
    pub fn new(program: &'a LinkedProgram<'a>) -> Self {
        Self {
            code: CodeReader::new(program.binary.program(), &program.deps),
            out: String::new(),
        }
    }

    /// Emit one indented operand line.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "          {}", text.as_ref());
    }

    // ============= Operand helpers for Operation::dump =============

    pub fn number_operand(&mut self) -> std::result::Result<u64, CodecError> {
        self.code.read_number()
    }

    pub fn string_operand(&mut self) -> std::result::Result<String, CodecError> {
        self.code.dump_string()
    }

    pub fn string_list_operand(&mut self) -> std::result::Result<Vec<String>, CodecError> {
        self.code.dump_string_list()
    }

    pub fn variable_ref_operand(&mut self) -> std::result::Result<String, CodecError> {
        self.code.read_variable_ref()
    }

    /// Dump a jump operand as its resolved absolute target.
    pub fn dump_jump(&mut self) -> std::result::Result<(), CodecError> {
        let offset = self.code.rd.read_i32()?;
        let target = self.code.rd.pos() as i64 + i64::from(offset);
        self.line(format!("-> {target:08x}"));
        Ok(())
    }

    /// Dump an optional trailer with operation-specific codes handled by
    /// `custom`.
    pub fn dump_trailer_with<F>(&mut self, mut custom: F) -> std::result::Result<(), CodecError>
    where
        F: FnMut(&mut Self, u8) -> std::result::Result<bool, CodecError>,
    {
        let marker = self.code.rd.read_u8()?;
        if marker == 0 {
            return Ok(());
        }
        loop {
            let offset = self.code.rd.pos();
            let code = self.code.rd.read_u8()?;
            match code {
                crate::operand::OPT_END => return Ok(()),
                crate::operand::OPT_COMPARATOR => {
                    let cmp = self.code.read_comparator()?;
                    self.line(format!(":comparator \"{}\"", cmp.name()));
                }
                crate::operand::OPT_MATCH_TYPE => {
                    let (def, relation) = self.code.read_match_type()?;
                    match relation {
                        Some(rel) => self.line(format!(":{} \"{}\"", def.name(), rel.name())),
                        None => self.line(format!(":{}", def.name())),
                    }
                }
                crate::operand::OPT_ADDRESS_PART => {
                    let part = self.code.read_address_part()?;
                    self.line(format!(":{}", part.name()));
                }
                crate::operand::OPT_SIDE_EFFECT => {
                    let def = self.code.dump_side_effect()?;
                    self.line(format!(":{}", def.name()));
                    def.dump(self)?;
                }
                code => {
                    if !custom(self, code)? {
                        return Err(CodecError::UnknownOptional { offset, code });
                    }
                }
            }
        }
    }

    /// Dump a trailer without operation-specific codes.
    pub fn dump_trailer(&mut self) -> std::result::Result<(), CodecError> {
        self.dump_trailer_with(|_, _| Ok(false))
    }
}

/// Produce the full listing for a linked binary.
pub fn dump_program(program: &LinkedProgram<'_>) -> Result<String> {
    let mut dumper = Dumper::new(program);

    let mut header = String::new();
    let _ = writeln!(header, "# sieve binary: {}", program.binary.script_name());
    let extensions = program.binary.extensions();
    if extensions.is_empty() {
        let _ = writeln!(header, "# extensions: (none)");
    } else {
        let _ = writeln!(header, "# extensions: {}", extensions.join(" "));
    }

    while !dumper.code.rd.at_end() {
        let offset = dumper.code.rd.pos();
        let op = dumper.code.read_opcode().map_err(|err| {
            SieveError::BinCorrupt(format!("dump failed at offset {offset}: {err}"))
        })?;
        let _ = writeln!(dumper.out, "{offset:08x}: {}", op.name());
        op.dump(&mut dumper).map_err(|err| {
            SieveError::BinCorrupt(format!("dump failed at offset {offset}: {err}"))
        })?;
    }

    header.push_str(&dumper.out);
    Ok(header)
}
