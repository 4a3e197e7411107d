//! Sieve bytecode container: wire codec, block table and on-disk format.

mod binary;
mod codec;

pub use binary::{
    BLOCK_FIRST_EXTENSION, BLOCK_PROGRAM, Binary, BinaryError, Block, FORMAT_VERSION, MAGIC,
};
pub use codec::{CodecError, Reader, Writer};
