// dgml-vm - Dialog virtual machine for compiled DGML bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode evaluation.
//!
//! Programs are straight-line `(op, param)` pairs over a value stack; the
//! stack is cleared on entry and the topmost remaining value (or Unset)
//! is the result. Arithmetic and ordered comparisons promote Int to
//! Float when the operands mix; OR/AND coerce numeric operands through
//! truthiness; EQ/NE additionally accept bools and compare strings by
//! content. Everything else is a type error.

use dgml_bundle::{Instr, OpCode};

use crate::error::EvalError;
use crate::stack::StackVal;
use crate::value::Value;
use crate::vm::Vm;

impl<'t> Vm<'t> {
    /// Run one bytecode program and return its result value.
    pub(crate) fn eval(&mut self, code: &'t [Instr]) -> Result<StackVal<'t>, EvalError> {
        let tree = self.tree;
        self.stack.clear();

        for instr in code {
            let op = OpCode::from_u32(instr.op).ok_or(EvalError::InvalidOp(instr.op))?;
            match op {
                OpCode::PushBool => self.stack.push(StackVal::Bool(instr.param != 0))?,
                OpCode::PushInt => self
                    .stack
                    .push(StackVal::Int(instr.param as i32 as i64))?,
                OpCode::PushFloat => self
                    .stack
                    .push(StackVal::Float(f32::from_bits(instr.param)))?,
                OpCode::PushString => {
                    let s = tree
                        .strings()
                        .lookup(instr.param)
                        .ok_or(EvalError::BadStringHandle(instr.param))?;
                    self.stack.push(StackVal::TreeStr(s))?;
                }

                OpCode::GetVar => {
                    let name = tree
                        .strings()
                        .lookup(instr.param)
                        .ok_or(EvalError::BadStringHandle(instr.param))?;
                    let val = match self.env.index_of(name) {
                        None => StackVal::Unset,
                        Some(idx) => match self.env.value_at(idx) {
                            Value::Bool(b) => StackVal::Bool(b),
                            Value::Int(i) => StackVal::Int(i),
                            Value::Float(f) => StackVal::Float(f),
                            Value::Str(_) => StackVal::EnvStr(idx),
                            Value::Unset => StackVal::Unset,
                        },
                    };
                    self.stack.push(val)?;
                }
                OpCode::SetVar => {
                    let name = tree
                        .strings()
                        .lookup(instr.param)
                        .ok_or(EvalError::BadStringHandle(instr.param))?;
                    let val = self.stack.pop();
                    if let Some(idx) = self.env.index_of(name) {
                        let stored = match val {
                            StackVal::Bool(b) => self.env.set_at(idx, Value::Bool(b)),
                            StackVal::Int(i) => self.env.set_at(idx, Value::Int(i)),
                            StackVal::Float(f) => self.env.set_at(idx, Value::Float(f)),
                            StackVal::TreeStr(s) => self.env.set_at(idx, Value::Str(s)),
                            StackVal::EnvStr(src) => self.env.copy_str_var(idx, src),
                            StackVal::Unset => false,
                        };
                        if stored && !self.changed.iter().any(|n| *n == name) {
                            self.changed.push(self.env.name_at(idx));
                        }
                    }
                }

                OpCode::Not => match self.stack.pop() {
                    StackVal::Bool(b) => self.stack.push(StackVal::Bool(!b))?,
                    other => {
                        return Err(EvalError::NotBool {
                            got: other.type_name(),
                        });
                    }
                },

                OpCode::Add => self.binary_num_op(i64::wrapping_add, |a, b| a + b, "ADD")?,
                OpCode::Sub => self.binary_num_op(i64::wrapping_sub, |a, b| a - b, "SUB")?,
                OpCode::Mul => self.binary_num_op(i64::wrapping_mul, |a, b| a * b, "MUL")?,
                OpCode::Div => self.div_op()?,

                OpCode::Or => self.logical_op(|a, b| a || b, "OR")?,
                OpCode::And => self.logical_op(|a, b| a && b, "AND")?,

                OpCode::Lt => self.comparison_op(|a, b| a < b, |a, b| a < b, "LT")?,
                OpCode::Le => self.comparison_op(|a, b| a <= b, |a, b| a <= b, "LE")?,
                OpCode::Gt => self.comparison_op(|a, b| a > b, |a, b| a > b, "GT")?,
                OpCode::Ge => self.comparison_op(|a, b| a >= b, |a, b| a >= b, "GE")?,

                OpCode::Eq => self.equality_op(false, "EQ")?,
                OpCode::Ne => self.equality_op(true, "NE")?,
            }
        }

        Ok(self.stack.top())
    }

    /// Evaluate an if or option condition; the result must be a bool.
    pub(crate) fn eval_condition(&mut self, code: &'t [Instr]) -> Result<bool, EvalError> {
        match self.eval(code)? {
            StackVal::Bool(b) => Ok(b),
            other => Err(EvalError::NonBoolCondition {
                got: other.type_name(),
            }),
        }
    }

    /// Pop both operands of a binary operator, rejecting missing ones.
    fn pop_operands(
        &mut self,
        op: &'static str,
    ) -> Result<(StackVal<'t>, StackVal<'t>), EvalError> {
        let rhs = self.stack.pop();
        let lhs = self.stack.pop();
        if matches!(lhs, StackVal::Unset) || matches!(rhs, StackVal::Unset) {
            return Err(EvalError::MissingOperand(op));
        }
        Ok((lhs, rhs))
    }

    fn binary_num_op<FI, FF>(
        &mut self,
        int_op: FI,
        float_op: FF,
        name: &'static str,
    ) -> Result<(), EvalError>
    where
        FI: Fn(i64, i64) -> i64,
        FF: Fn(f32, f32) -> f32,
    {
        let (lhs, rhs) = self.pop_operands(name)?;
        let result = match (lhs, rhs) {
            (StackVal::Int(a), StackVal::Int(b)) => StackVal::Int(int_op(a, b)),
            (StackVal::Int(a), StackVal::Float(b)) => StackVal::Float(float_op(a as f32, b)),
            (StackVal::Float(a), StackVal::Int(b)) => StackVal::Float(float_op(a, b as f32)),
            (StackVal::Float(a), StackVal::Float(b)) => StackVal::Float(float_op(a, b)),
            _ => return Err(type_mismatch(name, lhs, rhs)),
        };
        self.stack.push(result)
    }

    /// Division gets its own handler: integer division by zero is an
    /// error, float division follows IEEE-754.
    fn div_op(&mut self) -> Result<(), EvalError> {
        let (lhs, rhs) = self.pop_operands("DIV")?;
        let result = match (lhs, rhs) {
            (StackVal::Int(_), StackVal::Int(0)) => return Err(EvalError::DivisionByZero),
            (StackVal::Int(a), StackVal::Int(b)) => StackVal::Int(a.wrapping_div(b)),
            (StackVal::Int(a), StackVal::Float(b)) => StackVal::Float(a as f32 / b),
            (StackVal::Float(a), StackVal::Int(b)) => StackVal::Float(a / b as f32),
            (StackVal::Float(a), StackVal::Float(b)) => StackVal::Float(a / b),
            _ => return Err(type_mismatch("DIV", lhs, rhs)),
        };
        self.stack.push(result)
    }

    fn comparison_op<FI, FF>(
        &mut self,
        int_op: FI,
        float_op: FF,
        name: &'static str,
    ) -> Result<(), EvalError>
    where
        FI: Fn(i64, i64) -> bool,
        FF: Fn(f32, f32) -> bool,
    {
        let (lhs, rhs) = self.pop_operands(name)?;
        let result = match (lhs, rhs) {
            (StackVal::Int(a), StackVal::Int(b)) => int_op(a, b),
            (StackVal::Int(a), StackVal::Float(b)) => float_op(a as f32, b),
            (StackVal::Float(a), StackVal::Int(b)) => float_op(a, b as f32),
            (StackVal::Float(a), StackVal::Float(b)) => float_op(a, b),
            _ => return Err(type_mismatch(name, lhs, rhs)),
        };
        self.stack.push(StackVal::Bool(result))
    }

    fn logical_op<F>(&mut self, op: F, name: &'static str) -> Result<(), EvalError>
    where
        F: Fn(bool, bool) -> bool,
    {
        let (lhs, rhs) = self.pop_operands(name)?;
        // Numeric operands coerce through truthiness; strings do not.
        let (a, b) = match (lhs, rhs) {
            (StackVal::Bool(a), StackVal::Bool(b)) => (a, b),
            (StackVal::Int(a), StackVal::Int(b)) => (a != 0, b != 0),
            (StackVal::Int(a), StackVal::Float(b)) => (a != 0, b != 0.0),
            (StackVal::Float(a), StackVal::Int(b)) => (a != 0.0, b != 0),
            (StackVal::Float(a), StackVal::Float(b)) => (a != 0.0, b != 0.0),
            _ => return Err(type_mismatch(name, lhs, rhs)),
        };
        self.stack.push(StackVal::Bool(op(a, b)))
    }

    fn equality_op(&mut self, negate: bool, name: &'static str) -> Result<(), EvalError> {
        let (lhs, rhs) = self.pop_operands(name)?;
        let eq = match (lhs, rhs) {
            (StackVal::Bool(a), StackVal::Bool(b)) => a == b,
            (StackVal::Int(a), StackVal::Int(b)) => a == b,
            (StackVal::Int(a), StackVal::Float(b)) => a as f32 == b,
            (StackVal::Float(a), StackVal::Int(b)) => a == b as f32,
            (StackVal::Float(a), StackVal::Float(b)) => a == b,
            (
                StackVal::TreeStr(_) | StackVal::EnvStr(_),
                StackVal::TreeStr(_) | StackVal::EnvStr(_),
            ) => self.resolve_str(lhs) == self.resolve_str(rhs),
            _ => return Err(type_mismatch(name, lhs, rhs)),
        };
        self.stack.push(StackVal::Bool(eq != negate))
    }

    /// The text of a string operand.
    fn resolve_str(&self, val: StackVal<'t>) -> &str {
        match val {
            StackVal::TreeStr(s) => s,
            StackVal::EnvStr(idx) => self.env.str_at(idx),
            _ => "",
        }
    }
}

fn type_mismatch(op: &'static str, lhs: StackVal<'_>, rhs: StackVal<'_>) -> EvalError {
    EvalError::TypeMismatch {
        op,
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}
