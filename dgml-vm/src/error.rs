// dgml-vm - Dialog virtual machine for compiled DGML bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types for VM execution.

use std::fmt;

/// Errors from bytecode evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Push beyond the configured stack capacity.
    StackOverflow,
    /// A binary operator found fewer than two operands.
    MissingOperand(&'static str),
    /// Operand types are invalid for the operator.
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    /// NOT applied to a non-bool.
    NotBool { got: &'static str },
    /// An if or option condition did not yield a bool.
    NonBoolCondition { got: &'static str },
    /// Integer division by zero.
    DivisionByZero,
    /// Unknown opcode.
    InvalidOp(u32),
    /// A string parameter does not resolve through the string table.
    BadStringHandle(u32),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::StackOverflow => write!(f, "stack overflow"),
            EvalError::MissingOperand(op) => {
                write!(f, "missing operands for {}", op)
            }
            EvalError::TypeMismatch { op, lhs, rhs } => {
                write!(f, "invalid operand types for {}: {} and {}", op, lhs, rhs)
            }
            EvalError::NotBool { got } => {
                write!(f, "operand of NOT must be bool, got {}", got)
            }
            EvalError::NonBoolCondition { got } => {
                write!(f, "condition must yield bool, got {}", got)
            }
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::InvalidOp(op) => write!(f, "invalid bytecode op {}", op),
            EvalError::BadStringHandle(handle) => {
                write!(f, "invalid string handle {:#x} in bytecode", handle)
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// Errors from text interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpError {
    /// The interpolation byte buffer is exhausted.
    BufferFull,
    /// The fragment scratch is exhausted.
    FragmentsFull,
    /// The markup scratch is exhausted.
    MarkupFull,
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::BufferFull => write!(f, "interpolation buffer exhausted"),
            InterpError::FragmentsFull => write!(f, "fragment scratch exhausted"),
            InterpError::MarkupFull => write!(f, "markup scratch exhausted"),
        }
    }
}

impl std::error::Error for InterpError {}

/// Errors returned by [`crate::Vm::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceError {
    /// `advance` called before a successful `enter`.
    NotEntered,
    /// An option index was given but the previous result was not a
    /// choice, or the index is out of range. Retryable with a valid
    /// index.
    InvalidOption { index: usize, num_options: usize },
    /// The per-advance step budget was exhausted.
    MaxIterations(usize),
    /// Interpolation ran out of scratch space. Not retryable at the
    /// current buffer sizing.
    Interp(InterpError),
    /// Bytecode evaluation failed.
    Eval(EvalError),
}

impl fmt::Display for AdvanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvanceError::NotEntered => write!(f, "advance called before enter"),
            AdvanceError::InvalidOption { index, num_options } => {
                write!(f, "invalid option {} of {}", index, num_options)
            }
            AdvanceError::MaxIterations(max) => {
                write!(f, "exceeded {} steps in one advance", max)
            }
            AdvanceError::Interp(err) => write!(f, "{}", err),
            AdvanceError::Eval(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AdvanceError {}

impl From<EvalError> for AdvanceError {
    fn from(err: EvalError) -> Self {
        AdvanceError::Eval(err)
    }
}

impl From<InterpError> for AdvanceError {
    fn from(err: InterpError) -> Self {
        AdvanceError::Interp(err)
    }
}

/// Errors returned by [`crate::Vm::enter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterError {
    /// No section with the given name.
    UnknownSection(String),
    /// No node with the given id in the section.
    UnknownNode { section: String, node_id: String },
}

impl fmt::Display for EnterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnterError::UnknownSection(name) => write!(f, "unknown section '{}'", name),
            EnterError::UnknownNode { section, node_id } => {
                write!(f, "no node '{}' in section '{}'", node_id, section)
            }
        }
    }
}

impl std::error::Error for EnterError {}
