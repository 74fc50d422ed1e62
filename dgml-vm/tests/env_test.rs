// dgml-vm - Environment API tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Env access through the public VM interface:
//! - Defaults from the bundle
//! - Set/get round trips with type preservation
//! - String capacity limits
//! - Enumeration for host-side persistence

mod common;

use common::build;
use dgml_vm::{Value, Vm, VmParams};

fn vm_tree() -> dgml_bundle::Tree {
    build(|b| {
        b.env_bool("seen_intro", false);
        b.env_int("coins", 12);
        b.env_float("reputation", -0.25);
        b.env_str("title", "nobody");
        b.section("main", 0);
    })
}

#[test]
fn defaults_come_from_the_bundle() {
    let tree = vm_tree();
    let vm = Vm::new(&tree, VmParams::default());
    assert_eq!(vm.get_env("seen_intro"), Value::Bool(false));
    assert_eq!(vm.get_env("coins"), Value::Int(12));
    assert_eq!(vm.get_env("reputation"), Value::Float(-0.25));
    assert_eq!(vm.get_env("title"), Value::Str("nobody"));
    assert_eq!(vm.get_env("unknown"), Value::Unset);
}

#[test]
fn set_then_get_returns_the_value() {
    let tree = vm_tree();
    let mut vm = Vm::new(&tree, VmParams::default());

    assert!(vm.set_env("seen_intro", Value::Bool(true)));
    assert!(vm.set_env("coins", Value::Int(-99)));
    assert!(vm.set_env("reputation", Value::Float(1.5)));
    assert!(vm.set_env("title", Value::Str("captain")));

    assert_eq!(vm.get_env("seen_intro"), Value::Bool(true));
    assert_eq!(vm.get_env("coins"), Value::Int(-99));
    assert_eq!(vm.get_env("reputation"), Value::Float(1.5));
    assert_eq!(vm.get_env("title"), Value::Str("captain"));
}

#[test]
fn type_changes_are_rejected() {
    let tree = vm_tree();
    let mut vm = Vm::new(&tree, VmParams::default());

    assert!(!vm.set_env("coins", Value::Bool(true)));
    assert!(!vm.set_env("coins", Value::Float(2.0)));
    assert!(!vm.set_env("coins", Value::Str("rich")));
    assert!(!vm.set_env("coins", Value::Unset));
    assert_eq!(vm.get_env("coins"), Value::Int(12));
}

#[test]
fn unknown_variables_cannot_be_created() {
    let tree = vm_tree();
    let mut vm = Vm::new(&tree, VmParams::default());
    assert!(!vm.set_env("made_up", Value::Int(1)));
    assert_eq!(vm.get_env("made_up"), Value::Unset);
}

#[test]
fn string_writes_respect_the_configured_capacity() {
    let tree = vm_tree();
    let mut vm = Vm::new(
        &tree,
        VmParams {
            env_var_string_capacity: 8,
            ..VmParams::default()
        },
    );

    assert!(vm.set_env("title", Value::Str("12345678")));
    assert_eq!(vm.get_env("title"), Value::Str("12345678"));

    assert!(!vm.set_env("title", Value::Str("123456789")));
    assert_eq!(vm.get_env("title"), Value::Str("12345678"));
}

#[test]
fn string_length_is_preserved_bytewise() {
    let tree = vm_tree();
    let mut vm = Vm::new(&tree, VmParams::default());
    // Embedded NUL and multi-byte characters survive unchanged.
    let value = "a\u{0}b\u{e9}";
    assert!(vm.set_env("title", Value::Str(value)));
    assert_eq!(vm.get_env("title"), Value::Str(value));
}

#[test]
fn env_vars_enumerates_in_declaration_order() {
    let tree = vm_tree();
    let mut vm = Vm::new(&tree, VmParams::default());
    vm.set_env("coins", Value::Int(1));

    let vars: Vec<(String, String)> = vm
        .env_vars()
        .map(|(name, value)| (name.to_string(), format!("{:?}", value)))
        .collect();
    assert_eq!(vars.len(), 4);
    assert_eq!(vars[0].0, "seen_intro");
    assert_eq!(vars[1], ("coins".to_string(), "Int(1)".to_string()));
    assert_eq!(vars[3].0, "title");
}

#[test]
fn save_and_restore_round_trip() {
    // The host persistence pattern: enumerate, then feed back.
    let tree = vm_tree();
    let mut source = Vm::new(&tree, VmParams::default());
    source.set_env("coins", Value::Int(777));
    source.set_env("title", Value::Str("archivist"));

    let saved: Vec<(String, String)> = source
        .env_vars()
        .map(|(name, value)| {
            let rendered = match value {
                Value::Unset => String::new(),
                Value::Bool(b) => b.to_string(),
                Value::Int(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Str(s) => s.to_string(),
            };
            (name.to_string(), rendered)
        })
        .collect();

    let mut restored = Vm::new(&tree, VmParams::default());
    for (name, raw) in &saved {
        let value = match restored.get_env(name) {
            Value::Unset => panic!("unknown var {}", name),
            Value::Bool(_) => Value::Bool(raw == "true"),
            Value::Int(_) => Value::Int(raw.parse().unwrap()),
            Value::Float(_) => Value::Float(raw.parse().unwrap()),
            Value::Str(_) => Value::Str(raw),
        };
        assert!(restored.set_env(name, value), "failed to restore {}", name);
    }

    assert_eq!(restored.get_env("coins"), Value::Int(777));
    assert_eq!(restored.get_env("title"), Value::Str("archivist"));
    assert_eq!(restored.get_env("seen_intro"), Value::Bool(false));
}
