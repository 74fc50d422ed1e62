// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # dgml-bundle
//!
//! Reader for the DGMLB compiled dialog format. Loads a bundle into an
//! owned, immutable [`Tree`]: sections of typed graph nodes with resolved
//! strings, verbatim bytecode, and text fragments. The tree is the input
//! to the dialog VM in `dgml-vm`; any number of VMs can share one tree.
//!
//! The [`builder`] module is the write half of the format, used by tests
//! and tools.

pub mod builder;
pub mod error;
pub mod layout;
pub mod reader;
pub mod strings;
pub mod tree;

use std::path::Path;

pub use error::{LoadError, Result};
pub use layout::{Instr, NO_NODE, NodeType, OpCode, Span, VarType};
pub use strings::{Str, StringTable};
pub use tree::{
    Choice, ChoiceOption, DefaultValue, EnvDefault, Fragment, Goto, If, MarkupDef, Node, NodeKind,
    Rand, Run, Say, Section, Text, Tree,
};

/// Load a tree from raw bundle bytes. The buffer can be released
/// afterwards; the tree owns everything it needs.
pub fn load_bundle(bytes: &[u8]) -> Result<Tree> {
    let reader = reader::Reader::new(bytes);
    tree::materialize(&reader)
}

/// Load a tree from a bundle file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Tree> {
    let bytes = std::fs::read(path)?;
    load_bundle(&bytes)
}
