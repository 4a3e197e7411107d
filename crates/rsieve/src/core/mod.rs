//! Core language: control flow, the base actions and the base tests.
//!
//! Core opcodes occupy codes 0..128 of the operation space; everything
//! else dispatches through the binary's extension-dependency table.

mod actions;
mod control;
mod tests;

pub use actions::{CMD_DISCARD, CMD_KEEP, CMD_REDIRECT};
pub use control::{CMD_ELSE, CMD_ELSIF, CMD_IF, CMD_REQUIRE, CMD_STOP};
pub use tests::{
    TST_ADDRESS, TST_ALLOF, TST_ANYOF, TST_EXISTS, TST_FALSE, TST_HEADER, TST_NOT, TST_SIZE,
    TST_TRUE,
};
pub(crate) use tests::run_match;

use crate::command::Command;
use crate::extension::Operation;

// Core opcodes.
pub const OP_JMP: u8 = 0;
pub const OP_JMP_TRUE: u8 = 1;
pub const OP_JMP_FALSE: u8 = 2;
pub const OP_STOP: u8 = 3;
pub const OP_KEEP: u8 = 4;
pub const OP_DISCARD: u8 = 5;
pub const OP_REDIRECT: u8 = 6;
pub const OP_TRUE: u8 = 7;
pub const OP_FALSE: u8 = 8;
pub const OP_HEADER: u8 = 9;
pub const OP_ADDRESS: u8 = 10;
pub const OP_EXISTS: u8 = 11;
pub const OP_SIZE_OVER: u8 = 12;
pub const OP_SIZE_UNDER: u8 = 13;

/// Core operation table, indexed by opcode.
pub static CORE_OPS: [&'static dyn Operation; 14] = [
    &control::JMP_OP,
    &control::JMP_TRUE_OP,
    &control::JMP_FALSE_OP,
    &control::STOP_OP,
    &actions::KEEP_OP,
    &actions::DISCARD_OP,
    &actions::REDIRECT_OP,
    &tests::TRUE_OP,
    &tests::FALSE_OP,
    &tests::HEADER_OP,
    &tests::ADDRESS_OP,
    &tests::EXISTS_OP,
    &tests::SIZE_OVER_OP,
    &tests::SIZE_UNDER_OP,
];

/// Commands and tests available without any `require`.
pub static CORE_COMMANDS: &[&'static dyn Command] = &[
    &control::CMD_REQUIRE,
    &control::CMD_IF,
    &control::CMD_ELSIF,
    &control::CMD_ELSE,
    &control::CMD_STOP,
    &actions::CMD_KEEP,
    &actions::CMD_DISCARD,
    &actions::CMD_REDIRECT,
    &tests::TST_TRUE,
    &tests::TST_FALSE,
    &tests::TST_NOT,
    &tests::TST_ALLOF,
    &tests::TST_ANYOF,
    &tests::TST_HEADER,
    &tests::TST_ADDRESS,
    &tests::TST_EXISTS,
    &tests::TST_SIZE,
];
