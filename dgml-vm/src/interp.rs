// dgml-vm - Dialog virtual machine for compiled DGML bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Text interpolation.
//!
//! Expands a fragment sequence into the VM's scratch buffers: literal
//! fragments pass the tree's string through untouched, variable
//! fragments format the variable's current value. Formatted numbers land
//! in a fixed-capacity byte buffer that is reset at the start of every
//! advance; bools use static literals and string variables stay borrowed
//! from the env store. Exhausting any scratch fails the interpolation.

use std::fmt;
use std::fmt::Write as _;

use dgml_bundle::Text;

use crate::error::InterpError;
use crate::value::Value;
use crate::vm::{Markup, Vm};

/// Where a produced fragment's text lives.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotText<'t> {
    /// A literal fragment: the tree's own string.
    Tree(&'t str),
    /// A static literal ("", "true", "false").
    Literal(&'static str),
    /// A formatted number in the interpolation buffer.
    Interp { off: u32, len: u32 },
    /// The current value of a string variable.
    EnvStr(usize),
}

/// One produced fragment: text plus a range of the markup scratch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FragSlot<'t> {
    pub(crate) text: SlotText<'t>,
    pub(crate) markup_start: u32,
    pub(crate) markup_len: u32,
}

/// Fixed-capacity byte buffer for formatted variable values.
#[derive(Debug)]
pub(crate) struct InterpBuf {
    bytes: Vec<u8>,
    capacity: usize,
}

impl InterpBuf {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.bytes.clear();
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Format a value at the current offset; fails instead of growing
    /// past the configured capacity.
    fn format(&mut self, value: impl fmt::Display) -> Result<(u32, u32), InterpError> {
        let start = self.bytes.len();
        let mut writer = Capped {
            bytes: &mut self.bytes,
            capacity: self.capacity,
        };
        if write!(writer, "{}", value).is_err() {
            self.bytes.truncate(start);
            return Err(InterpError::BufferFull);
        }
        Ok((start as u32, (self.bytes.len() - start) as u32))
    }
}

struct Capped<'a> {
    bytes: &'a mut Vec<u8>,
    capacity: usize,
}

impl fmt::Write for Capped<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.bytes.len() + s.len() > self.capacity {
            return Err(fmt::Error);
        }
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl<'t> Vm<'t> {
    /// Expand `text` into the fragment scratch and return the produced
    /// `(start, len)` range.
    pub(crate) fn interpolate(&mut self, text: &'t Text) -> Result<(u32, u32), InterpError> {
        let tree = self.tree;
        let start = self.frag_slots.len();
        if start + text.fragments.len() > self.frag_capacity {
            return Err(InterpError::FragmentsFull);
        }

        for frag in &text.fragments {
            let markup_start = self.markup_slots.len();
            if markup_start + frag.markup.len() > self.markup_capacity {
                return Err(InterpError::MarkupFull);
            }
            for pair in &frag.markup {
                self.markup_slots.push(Markup {
                    name: tree.resolve(pair.name),
                    value: tree.resolve(pair.value),
                });
            }

            let slot_text = if frag.is_variable {
                let name = tree.resolve(frag.text);
                match self.env.index_of(name) {
                    None => SlotText::Literal(""),
                    Some(idx) => match self.env.value_at(idx) {
                        Value::Unset => SlotText::Literal(""),
                        Value::Bool(true) => SlotText::Literal("true"),
                        Value::Bool(false) => SlotText::Literal("false"),
                        Value::Int(i) => {
                            let (off, len) = self.interp.format(i)?;
                            SlotText::Interp { off, len }
                        }
                        Value::Float(f) => {
                            let (off, len) = self.interp.format(f)?;
                            SlotText::Interp { off, len }
                        }
                        Value::Str(_) => SlotText::EnvStr(idx),
                    },
                }
            } else {
                SlotText::Tree(tree.resolve(frag.text))
            };

            self.frag_slots.push(FragSlot {
                text: slot_text,
                markup_start: markup_start as u32,
                markup_len: frag.markup.len() as u32,
            });
        }

        Ok((start as u32, text.fragments.len() as u32))
    }
}
