// dgml-vm - Dialog virtual machine for compiled DGML bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # dgml-vm
//!
//! The dialog machine for DGML bundles. A [`Vm`] borrows a loaded
//! [`dgml_bundle::Tree`], keeps its own environment and cursor, and
//! yields one interactive result per [`Vm::advance`]: a line of dialog,
//! a choice, or the end of the section.
//!
//! ```
//! use dgml_bundle::builder::{BundleBuilder, Frag, Inst};
//! use dgml_bundle::NO_NODE;
//! use dgml_vm::{StepKind, Vm, VmParams};
//!
//! let mut b = BundleBuilder::new();
//! b.env_int("coins", 0);
//! let s = b.section("intro", 0);
//! s.run(&[Inst::PushInt(5), Inst::SetVar("coins".into())], 1);
//! s.say("guide", &[Frag::lit("You have "), Frag::var("coins")], NO_NODE);
//! let tree = dgml_bundle::load_bundle(&b.finish()).unwrap();
//!
//! let mut vm = Vm::new(&tree, VmParams::default());
//! vm.enter("intro", None).unwrap();
//! let step = vm.advance(None).unwrap();
//! match step.kind {
//!     StepKind::Say(say) => {
//!         assert_eq!(say.speaker_id, "guide");
//!         assert_eq!(say.fragments.to_text(), "You have 5");
//!     }
//!     _ => panic!("expected say"),
//! }
//! ```

mod env;
mod eval;
mod interp;
mod stack;

pub mod error;
pub mod rng;
pub mod value;
pub mod vm;

pub use error::{AdvanceError, EnterError, EvalError, InterpError};
pub use rng::RngParam;
pub use value::Value;
pub use vm::{
    Choice, Fragments, Markup, OptionView, Say, Step, StepKind, TextFragment, Vm, VmParams,
};
