// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! On-disk layout of the DGMLB format.
//!
//! Everything in the file is little-endian and all records are 4-byte
//! aligned. An offset of zero means "invalid" or "empty", because the file
//! header lives at offset zero. Node indices use `NO_NODE` as the
//! "terminate on reaching" sentinel.

/// File magic: `\0DGMLB01`.
pub const MAGIC: [u8; 8] = [0x00, b'D', b'G', b'M', b'L', b'B', b'0', b'1'];

/// Sentinel node index meaning "terminate on reaching".
pub const NO_NODE: u32 = u32::MAX;

/// Header size: magic + file_size + five spans.
pub const HEADER_SIZE: usize = 8 + 4 + 5 * SPAN_SIZE;

/// Size of a `(offset, count)` span.
pub const SPAN_SIZE: usize = 8;

/// Size of an env-var record: name + type + default value.
pub const ENV_VAR_SIZE: usize = 12;

/// Size of a section record: name + nodes span + entry node.
pub const SECTION_SIZE: usize = 16;

/// Size of a node record: 17 fields of 4 bytes.
pub const NODE_SIZE: usize = 68;

/// Size of a choice-option record: cond span + line id + text span + dest.
pub const OPTION_SIZE: usize = 24;

/// Size of a text-fragment record: string + markup span + is_variable.
pub const FRAGMENT_SIZE: usize = 16;

/// Size of a markup record: key + value.
pub const MARKUP_SIZE: usize = 8;

/// Size of a bytecode record: op + param.
pub const BYTECODE_SIZE: usize = 8;

/// A region of the file: `offset` in bytes, `count` in elements.
///
/// For the string region the element is a byte; everywhere else the field
/// comment in the header says which record the span points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: u32,
    pub count: u32,
}

impl Span {
    /// True if the span references no elements.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy)]
pub struct RawHeader {
    pub file_size: u32,
    /// Packed length-prefixed strings; count is in bytes.
    pub strings: Span,
    /// Section records.
    pub sections: Span,
    /// String handles, one per speaker.
    pub speaker_ids: Span,
    /// Env-var records.
    pub env_variables: Span,
    /// Markup records; the value is a validation regex for the authoring side.
    pub env_markup: Span,
}

/// Raw env-var record. `default_value` is 0/1 for bool, a bit-cast `i32`
/// for int, a bit-cast IEEE-754 `f32` for float, and a string handle for
/// string.
#[derive(Debug, Clone, Copy)]
pub struct RawEnvVar {
    pub name: u32,
    pub var_type: u32,
    pub default_value: u32,
}

/// Raw section record.
#[derive(Debug, Clone, Copy)]
pub struct RawSection {
    pub name: u32,
    pub nodes: Span,
    pub entry_node: u32,
}

/// Raw node record. The on-disk node carries the fields of every variant
/// together; which of them are meaningful depends on `node_type`.
#[derive(Debug, Clone, Copy)]
pub struct RawNode {
    pub id: u32,
    pub say_speaker_id: u32,
    pub tags: Span,
    pub code: Span,
    pub choice_options: Span,
    pub rand_nodes: Span,
    pub text: Span,
    pub section_idx: u32,
    pub next_node: u32,
    pub if_true_dest: u32,
    pub if_false_dest: u32,
    pub node_type: u32,
}

/// Raw choice-option record.
#[derive(Debug, Clone, Copy)]
pub struct RawOption {
    pub cond: Span,
    pub line_id: u32,
    pub text: Span,
    pub dest: u32,
}

/// Raw text-fragment record.
#[derive(Debug, Clone, Copy)]
pub struct RawFragment {
    pub string: u32,
    pub markup: Span,
    pub is_variable: u32,
}

/// Raw markup record.
#[derive(Debug, Clone, Copy)]
pub struct RawMarkup {
    pub key: u32,
    pub value: u32,
}

/// One bytecode instruction, kept verbatim from the file. String-typed
/// parameters (`PushString`, `GetVar`, `SetVar`) stay raw string handles
/// and are resolved by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub op: u32,
    pub param: u32,
}

/// Node type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Choice = 1,
    Goto = 2,
    If = 3,
    Rand = 4,
    Run = 5,
    Say = 6,
}

impl NodeType {
    /// Decode the on-disk discriminant; `None` for anything unknown.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(NodeType::Choice),
            2 => Some(NodeType::Goto),
            3 => Some(NodeType::If),
            4 => Some(NodeType::Rand),
            5 => Some(NodeType::Run),
            6 => Some(NodeType::Say),
            _ => None,
        }
    }
}

/// Env-var type discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
}

impl VarType {
    /// Decode the on-disk discriminant; `None` for anything unknown.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(VarType::Bool),
            2 => Some(VarType::Int),
            3 => Some(VarType::Float),
            4 => Some(VarType::String),
            _ => None,
        }
    }
}

/// Bytecode instructions for the dialog expression VM.
///
/// Instructions operate on a value stack. Binary operators pop the right
/// hand side first, then the left hand side, and push the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Push Bool; param is 0 or 1.
    PushBool = 1,

    /// Push Int; param is an `i32` bit-cast to `u32`, widened to `i64`.
    PushInt = 2,

    /// Push Float; param is an IEEE-754 `f32` bit-cast to `u32`.
    PushFloat = 3,

    /// Push String; param is a string handle.
    PushString = 4,

    /// Push the current value of the variable named by the string handle
    /// in param; Unset if the variable does not exist.
    GetVar = 5,

    /// Pop a value and store it into the variable named by the string
    /// handle in param.
    SetVar = 6,

    /// Pop a Bool and push its negation.
    Not = 7,

    /// Addition.
    Add = 8,

    /// Subtraction.
    Sub = 9,

    /// Multiplication.
    Mul = 10,

    /// Division.
    Div = 11,

    /// Logical or.
    Or = 12,

    /// Logical and.
    And = 13,

    /// Less than.
    Lt = 14,

    /// Less than or equal.
    Le = 15,

    /// Greater than.
    Gt = 16,

    /// Greater than or equal.
    Ge = 17,

    /// Equality.
    Eq = 18,

    /// Inequality.
    Ne = 19,
}

impl OpCode {
    /// Decode the on-disk opcode; `None` for anything unknown.
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(OpCode::PushBool),
            2 => Some(OpCode::PushInt),
            3 => Some(OpCode::PushFloat),
            4 => Some(OpCode::PushString),
            5 => Some(OpCode::GetVar),
            6 => Some(OpCode::SetVar),
            7 => Some(OpCode::Not),
            8 => Some(OpCode::Add),
            9 => Some(OpCode::Sub),
            10 => Some(OpCode::Mul),
            11 => Some(OpCode::Div),
            12 => Some(OpCode::Or),
            13 => Some(OpCode::And),
            14 => Some(OpCode::Lt),
            15 => Some(OpCode::Le),
            16 => Some(OpCode::Gt),
            17 => Some(OpCode::Ge),
            18 => Some(OpCode::Eq),
            19 => Some(OpCode::Ne),
            _ => None,
        }
    }

    /// Mnemonic for disassembly and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::PushBool => "PUSH_BOOL",
            OpCode::PushInt => "PUSH_INT",
            OpCode::PushFloat => "PUSH_FLOAT",
            OpCode::PushString => "PUSH_STRING",
            OpCode::GetVar => "GET_VAR",
            OpCode::SetVar => "SET_VAR",
            OpCode::Not => "NOT",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Or => "OR",
            OpCode::And => "AND",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
        }
    }

    /// True for instructions whose param is a string handle.
    pub fn has_string_param(&self) -> bool {
        matches!(self, OpCode::PushString | OpCode::GetVar | OpCode::SetVar)
    }
}
