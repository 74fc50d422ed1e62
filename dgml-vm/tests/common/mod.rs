// dgml-vm - Shared test helpers
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Builds bundles through `dgml_bundle::builder` and loads them for
//! real, so every VM test also exercises the format round trip.

// Not every test binary uses every helper.
#![allow(dead_code)]

use dgml_bundle::Tree;
use dgml_bundle::builder::BundleBuilder;
use dgml_vm::{Step, StepKind};

pub fn build(f: impl FnOnce(&mut BundleBuilder)) -> Tree {
    let mut b = BundleBuilder::new();
    f(&mut b);
    dgml_bundle::load_bundle(&b.finish()).expect("test bundle should load")
}

/// The concatenated text of a say step.
pub fn say_text(step: &Step<'_>) -> String {
    match &step.kind {
        StepKind::Say(say) => say.fragments.to_text(),
        other => panic!("expected say, got {:?}", other),
    }
}

/// The speaker of a say step.
pub fn say_speaker<'a>(step: &Step<'a>) -> &'a str {
    match &step.kind {
        StepKind::Say(say) => say.speaker_id,
        other => panic!("expected say, got {:?}", other),
    }
}

pub fn expect_end(step: &Step<'_>) {
    assert!(
        matches!(step.kind, StepKind::End),
        "expected end, got {:?}",
        step.kind
    );
}
