//! The compiled binary artefact.
//!
//! Layout on disk:
//!
//! ```text
//! magic "RSVB"
//! format-version varint
//! engine-version varint
//! checksum u64            xxh3 of everything after this field
//! timestamp varint        generation time, seconds since epoch
//! fingerprint u64         xxh3 of the source script
//! script-name string
//! extension count varint, then <count> length-prefixed names
//! block count varint, then per block: id varint, length varint, bytes
//! ```
//!
//! Opcodes and operands inside blocks reference extensions by index into
//! the dependency name table, never by registry id, so a binary is
//! portable across processes with different registration orders.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use xxhash_rust::xxh3::xxh3_64;

use crate::codec::{CodecError, Reader, Writer};

pub const MAGIC: [u8; 4] = *b"RSVB";
pub const FORMAT_VERSION: u64 = 1;

/// Block id of the main program.
pub const BLOCK_PROGRAM: u64 = 0;
/// First block id available to extension contexts.
pub const BLOCK_FIRST_EXTENSION: u64 = 1;

/// Errors around loading and saving binaries.
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("corrupt binary: {0}")]
    Corrupt(String),
    #[error("unsupported binary format version {0}")]
    UnsupportedVersion(u64),
    #[error("corrupt binary: {0}")]
    Codec(#[from] CodecError),
    #[error("binary io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct Block {
    pub id: u64,
    pub data: Vec<u8>,
}

/// A compiled, persistable Sieve program.
#[derive(Clone, Debug)]
pub struct Binary {
    format_version: u64,
    engine_version: u64,
    timestamp: u64,
    fingerprint: u64,
    script_name: String,
    extensions: Vec<String>,
    blocks: Vec<Block>,
}

impl Binary {
    #[must_use]
    pub fn new(script_name: impl Into<String>, fingerprint: u64, engine_version: u64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            format_version: FORMAT_VERSION,
            engine_version,
            timestamp,
            fingerprint,
            script_name: script_name.into(),
            extensions: Vec::new(),
            blocks: Vec::new(),
        }
    }

    #[must_use]
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub const fn engine_version(&self) -> u64 {
        self.engine_version
    }

    /// Whether this binary still matches the given source fingerprint.
    #[must_use]
    pub const fn up_to_date(&self, source_fingerprint: u64) -> bool {
        self.fingerprint == source_fingerprint
    }

    // ============= Extension dependency table =============

    /// Names of the extensions this binary references, in first-use order.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Index of an extension in the dependency table, adding it on first
    /// use.
    pub fn link_extension(&mut self, name: &str) -> usize {
        if let Some(index) = self.extension_index(name) {
            return index;
        }
        self.extensions.push(name.to_string());
        self.extensions.len() - 1
    }

    #[must_use]
    pub fn extension_index(&self, name: &str) -> Option<usize> {
        self.extensions.iter().position(|n| n == name)
    }

    #[must_use]
    pub fn extension_name(&self, index: usize) -> Option<&str> {
        self.extensions.get(index).map(String::as_str)
    }

    // ============= Blocks =============

    pub fn set_block(&mut self, id: u64, data: Vec<u8>) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.id == id) {
            block.data = data;
        } else {
            self.blocks.push(Block { id, data });
        }
    }

    #[must_use]
    pub fn block(&self, id: u64) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .map(|b| b.data.as_slice())
    }

    /// The main program block. Empty when nothing was generated.
    #[must_use]
    pub fn program(&self) -> &[u8] {
        self.block(BLOCK_PROGRAM).unwrap_or(&[])
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    // ============= Serialisation =============

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Writer::new();
        body.write_varint(self.timestamp);
        body.write_u64(self.fingerprint);
        body.write_string(&self.script_name);
        body.write_varint(self.extensions.len() as u64);
        for name in &self.extensions {
            body.write_string(name);
        }
        body.write_varint(self.blocks.len() as u64);
        for block in &self.blocks {
            body.write_varint(block.id);
            body.write_varint(block.data.len() as u64);
            body.write_bytes(&block.data);
        }
        let body = body.into_bytes();

        let mut out = Writer::new();
        out.write_bytes(&MAGIC);
        out.write_varint(self.format_version);
        out.write_varint(self.engine_version);
        out.write_u64(xxh3_64(&body));
        out.write_bytes(&body);
        out.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BinaryError> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_bytes(4).map_err(|_| {
            BinaryError::Corrupt("file too short for magic".to_string())
        })?;
        if magic != MAGIC {
            return Err(BinaryError::Corrupt("bad magic".to_string()));
        }
        let format_version = reader.read_varint()?;
        if format_version != FORMAT_VERSION {
            return Err(BinaryError::UnsupportedVersion(format_version));
        }
        let engine_version = reader.read_varint()?;
        let checksum = reader.read_u64()?;
        let body_start = reader.pos();
        if xxh3_64(&bytes[body_start..]) != checksum {
            return Err(BinaryError::Corrupt("checksum mismatch".to_string()));
        }

        let timestamp = reader.read_varint()?;
        let fingerprint = reader.read_u64()?;
        let script_name = reader.read_string()?.to_string();

        let ext_count = reader.read_varint()?;
        let mut extensions = Vec::new();
        for _ in 0..ext_count {
            extensions.push(reader.read_string()?.to_string());
        }

        let block_count = reader.read_varint()?;
        let mut blocks = Vec::new();
        for _ in 0..block_count {
            let id = reader.read_varint()?;
            let len = usize::try_from(reader.read_varint()?)
                .map_err(|_| BinaryError::Corrupt("block length overflow".to_string()))?;
            let data = reader.read_bytes(len)?.to_vec();
            blocks.push(Block { id, data });
        }
        if !reader.at_end() {
            return Err(BinaryError::Corrupt("trailing bytes".to_string()));
        }

        Ok(Self {
            format_version,
            engine_version,
            timestamp,
            fingerprint,
            script_name,
            extensions,
            blocks,
        })
    }

    /// Save atomically: write to a temporary file in the target directory,
    /// then rename into place. Default mode 0o600.
    pub fn save(&self, path: impl AsRef<Path>, mode: Option<u32>) -> Result<(), BinaryError> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        file.write_all(&self.to_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = mode.unwrap_or(0o600);
            fs::set_permissions(file.path(), fs::Permissions::from_mode(mode))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        file.persist(path).map_err(|err| BinaryError::Io(err.error))?;
        tracing::debug!(path = %path.display(), "sieve binary saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BinaryError> {
        let bytes = fs::read(path.as_ref())?;
        let binary = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            script = %binary.script_name,
            "sieve binary loaded"
        );
        Ok(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Binary {
        let mut binary = Binary::new("main", 0xDEAD_BEEF, 1);
        binary.link_extension("fileinto");
        binary.link_extension("vacation");
        binary.set_block(BLOCK_PROGRAM, vec![1, 2, 3, 4]);
        binary.set_block(7, vec![9]);
        binary
    }

    #[test]
    fn test_roundtrip() {
        let binary = sample();
        let decoded = Binary::from_bytes(&binary.to_bytes()).unwrap();
        assert_eq!(decoded.script_name(), "main");
        assert_eq!(decoded.fingerprint(), 0xDEAD_BEEF);
        assert_eq!(decoded.extensions(), &["fileinto", "vacation"]);
        assert_eq!(decoded.program(), &[1, 2, 3, 4]);
        assert_eq!(decoded.block(7), Some(&[9u8][..]));
    }

    #[test]
    fn test_link_extension_dedups() {
        let mut binary = Binary::new("main", 0, 1);
        assert_eq!(binary.link_extension("copy"), 0);
        assert_eq!(binary.link_extension("regex"), 1);
        assert_eq!(binary.link_extension("copy"), 0);
        assert_eq!(binary.extensions().len(), 2);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Binary::from_bytes(&bytes),
            Err(BinaryError::Corrupt(_))
        ));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Binary::from_bytes(&bytes),
            Err(BinaryError::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_bytes();
        assert!(Binary::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.svbin");
        let binary = sample();
        binary.save(&path, None).unwrap();
        let loaded = Binary::load(&path).unwrap();
        assert_eq!(loaded.program(), binary.program());
        assert!(loaded.up_to_date(0xDEAD_BEEF));
        assert!(!loaded.up_to_date(1));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
