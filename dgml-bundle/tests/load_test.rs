// dgml-bundle - Bundle loading tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Round-trip tests through the builder and loader:
//! - Header validation (magic, truncation)
//! - Section, node, and env-var materialization
//! - Text fragments with markup
//! - Load failure on malformed node records

use dgml_bundle::builder::{BundleBuilder, Frag, Inst, OptionDef};
use dgml_bundle::{DefaultValue, LoadError, NO_NODE, NodeKind, load_bundle};

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

#[test]
fn empty_bundle_loads() {
    let bytes = BundleBuilder::new().finish();
    let tree = load_bundle(&bytes).unwrap();
    assert!(tree.sections().is_empty());
    assert!(tree.env_defaults().is_empty());
}

#[test]
fn wrong_magic_is_rejected() {
    let mut bytes = BundleBuilder::new().finish();
    bytes[1] = b'X';
    assert!(matches!(load_bundle(&bytes), Err(LoadError::BadMagic)));
}

#[test]
fn short_buffer_is_rejected() {
    let bytes = BundleBuilder::new().finish();
    assert!(load_bundle(&bytes[..10]).is_err());
}

#[test]
fn truncated_file_is_rejected() {
    let mut b = BundleBuilder::new();
    b.section("s", 0).jump(NO_NODE);
    let bytes = b.finish();
    // Chop the tail off; file_size in the header no longer fits.
    let short = &bytes[..bytes.len() - 8];
    assert!(matches!(
        load_bundle(short),
        Err(LoadError::Truncated { .. })
    ));
}

#[test]
fn sections_and_nodes_materialize() {
    let mut b = BundleBuilder::new();
    b.speaker("guide");
    b.markup_def("color", "[a-z]+");
    b.env_int("coins", 7);
    {
        let s = b.section("intro", 1);
        s.jump(1).id("start");
        s.say("guide", &[Frag::lit("hello")], NO_NODE)
            .id("line")
            .tag("greeting")
            .tag("intro");
    }
    {
        let s = b.section("end", 0);
        s.say("guide", &[Frag::lit("bye")], NO_NODE);
    }
    let tree = load_bundle(&b.finish()).unwrap();

    assert_eq!(tree.sections().len(), 2);
    let (idx, intro) = tree.section_by_name("intro").unwrap();
    assert_eq!(idx, 0);
    assert_eq!(tree.resolve(intro.name), "intro");
    assert_eq!(intro.entry_node, 1);
    assert_eq!(intro.nodes.len(), 2);

    let goto = &intro.nodes[0];
    assert_eq!(tree.resolve(goto.id), "start");
    match &goto.kind {
        NodeKind::Goto(g) => assert_eq!(g.next, 1),
        other => panic!("expected goto, got {:?}", other),
    }

    let say = &intro.nodes[1];
    let tags: Vec<&str> = say.tags.iter().map(|t| tree.resolve(*t)).collect();
    assert_eq!(tags, ["greeting", "intro"]);
    match &say.kind {
        NodeKind::Say(s) => {
            assert_eq!(tree.resolve(s.speaker_id), "guide");
            assert_eq!(s.next, NO_NODE);
            assert_eq!(s.text.fragments.len(), 1);
            assert_eq!(tree.resolve(s.text.fragments[0].text), "hello");
            assert!(!s.text.fragments[0].is_variable);
        }
        other => panic!("expected say, got {:?}", other),
    }

    assert!(tree.section_by_name("missing").is_none());
    assert_eq!(tree.speakers().collect::<Vec<_>>(), ["guide"]);
    assert_eq!(tree.markup_defs().len(), 1);
    assert_eq!(tree.resolve(tree.markup_defs()[0].name), "color");
}

#[test]
fn env_defaults_decode_per_type() {
    let mut b = BundleBuilder::new();
    b.env_bool("seen", true);
    b.env_int("coins", -3);
    b.env_float("health", 0.5);
    b.env_str("title", "traveller");
    let tree = load_bundle(&b.finish()).unwrap();

    let vars = tree.env_defaults();
    assert_eq!(vars.len(), 4);
    assert_eq!(tree.resolve(vars[0].name), "seen");
    assert!(matches!(vars[0].value, DefaultValue::Bool(true)));
    assert!(matches!(vars[1].value, DefaultValue::Int(-3)));
    assert!(matches!(vars[2].value, DefaultValue::Float(v) if v == 0.5));
    match vars[3].value {
        DefaultValue::Str(s) => assert_eq!(tree.resolve(s), "traveller"),
        ref other => panic!("expected string default, got {:?}", other),
    }
}

#[test]
fn choice_options_and_markup_materialize() {
    let mut b = BundleBuilder::new();
    b.env_bool("brave", false);
    {
        let s = b.section("s", 0);
        s.choice(&[
            OptionDef::new(
                &[Frag::lit("Fight").with_markup("bold", "")],
                1,
            )
            .cond(&[Inst::GetVar("brave".into())])
            .line_id("opt.fight"),
            OptionDef::new(&[Frag::lit("Flee")], 2),
        ]);
        s.say("a", &[Frag::lit("won")], NO_NODE);
        s.say("a", &[Frag::lit("ran")], NO_NODE);
    }
    let tree = load_bundle(&b.finish()).unwrap();

    let section = &tree.sections()[0];
    let NodeKind::Choice(choice) = &section.nodes[0].kind else {
        panic!("expected choice");
    };
    assert_eq!(choice.options.len(), 2);

    let fight = &choice.options[0];
    assert_eq!(fight.dest, 1);
    assert_eq!(tree.resolve(fight.line_id), "opt.fight");
    assert_eq!(fight.cond.len(), 1);
    assert_eq!(fight.text.fragments[0].markup.len(), 1);
    assert_eq!(
        tree.resolve(fight.text.fragments[0].markup[0].name),
        "bold"
    );

    let flee = &choice.options[1];
    assert!(flee.cond.is_empty());
    assert_eq!(flee.dest, 2);
}

#[test]
fn markup_defs_exclude_fragment_markup() {
    // The markup array holds header definitions and per-fragment pairs
    // side by side; the header span must cover only the definitions.
    let mut b = BundleBuilder::new();
    b.markup_def("bold", "");
    b.markup_def("color", "[a-z]+");
    b.section("s", 0).say(
        "a",
        &[
            Frag::lit("loud").with_markup("bold", ""),
            Frag::lit("pink").with_markup("color", "magenta"),
        ],
        NO_NODE,
    );
    let tree = load_bundle(&b.finish()).unwrap();

    let defs: Vec<&str> = tree
        .markup_defs()
        .iter()
        .map(|m| tree.resolve(m.name))
        .collect();
    assert_eq!(defs, ["bold", "color"]);

    let NodeKind::Say(say) = &tree.sections()[0].nodes[0].kind else {
        panic!("expected say");
    };
    assert_eq!(say.text.fragments[0].markup.len(), 1);
    assert_eq!(tree.resolve(say.text.fragments[0].markup[0].name), "bold");
    assert_eq!(
        tree.resolve(say.text.fragments[1].markup[0].value),
        "magenta"
    );
}

#[test]
fn variable_fragments_keep_their_flag() {
    let mut b = BundleBuilder::new();
    b.env_int("n", 1);
    b.section("s", 0)
        .say("a", &[Frag::lit("n="), Frag::var("n")], NO_NODE);
    let tree = load_bundle(&b.finish()).unwrap();

    let NodeKind::Say(say) = &tree.sections()[0].nodes[0].kind else {
        panic!("expected say");
    };
    assert!(!say.text.fragments[0].is_variable);
    assert!(say.text.fragments[1].is_variable);
    assert_eq!(tree.resolve(say.text.fragments[1].text), "n");
}

#[test]
fn invalid_node_type_fails_the_load() {
    let mut b = BundleBuilder::new();
    b.section("s", 0).jump(NO_NODE);
    let mut bytes = b.finish();

    // Walk the header to the single node record and corrupt its type
    // field (the last of the 17 u32 fields).
    let sections_off = u32_at(&bytes, 20) as usize;
    let nodes_off = u32_at(&bytes, sections_off + 4) as usize;
    let type_off = nodes_off + 16 * 4;
    bytes[type_off..type_off + 4].copy_from_slice(&99u32.to_le_bytes());

    assert!(matches!(
        load_bundle(&bytes),
        Err(LoadError::InvalidNodeType(99))
    ));
}

#[test]
fn invalid_var_type_fails_the_load() {
    let mut b = BundleBuilder::new();
    b.env_int("n", 0);
    let mut bytes = b.finish();

    let env_off = u32_at(&bytes, 36) as usize;
    let type_off = env_off + 4;
    bytes[type_off..type_off + 4].copy_from_slice(&77u32.to_le_bytes());

    assert!(matches!(
        load_bundle(&bytes),
        Err(LoadError::InvalidVarType(77))
    ));
}

#[test]
fn empty_rand_fails_the_load() {
    let mut b = BundleBuilder::new();
    b.section("s", 0).rand(&[]);
    assert!(matches!(
        load_bundle(&b.finish()),
        Err(LoadError::EmptyRand { section: 0, node: 0 })
    ));
}

#[test]
fn bytecode_copies_verbatim() {
    let mut b = BundleBuilder::new();
    b.env_int("n", 0);
    b.section("s", 0).run(
        &[
            Inst::PushInt(-5),
            Inst::PushFloat(1.25),
            Inst::Add,
            Inst::SetVar("n".into()),
        ],
        NO_NODE,
    );
    let tree = load_bundle(&b.finish()).unwrap();

    let NodeKind::Run(run) = &tree.sections()[0].nodes[0].kind else {
        panic!("expected run");
    };
    assert_eq!(run.code.len(), 4);
    assert_eq!(run.code[0].param, -5i32 as u32);
    assert_eq!(run.code[1].param, 1.25f32.to_bits());
    // The SET_VAR param is a string handle resolvable through the table.
    assert_eq!(tree.strings().lookup(run.code[3].param), Some("n"));
}

#[test]
fn string_handles_are_deduplicated() {
    let mut b = BundleBuilder::new();
    {
        let s = b.section("s", 0);
        s.say("narrator", &[Frag::lit("again")], 1);
        s.say("narrator", &[Frag::lit("again")], NO_NODE);
    }
    let tree = load_bundle(&b.finish()).unwrap();
    let nodes = &tree.sections()[0].nodes;
    let (NodeKind::Say(a), NodeKind::Say(b)) = (&nodes[0].kind, &nodes[1].kind) else {
        panic!("expected two says");
    };
    assert_eq!(a.speaker_id, b.speaker_id);
    assert_eq!(a.text.fragments[0].text, b.text.fragments[0].text);
}
