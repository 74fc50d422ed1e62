// dgml - Terminal player and inspector for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

use dgml_bundle::{DefaultValue, NodeKind, OpCode, Tree};
use dgml_vm::{Choice, Fragments, StepKind, Value, Vm, VmParams};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const FAINT: &str = "\x1b[2m";
const MAGENTA: &str = "\x1b[35m";

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version") | Some("-v") => println!("dgml v0.1.0"),
        Some("play") => play(&args[1..]),
        Some("dump") => dump(&args[1..]),
        Some("help") | Some("-h") | Some("--help") | None => help(),
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            help();
            process::exit(1);
        }
    }
}

fn help() {
    println!(
        r#"dgml - play and inspect compiled DGML dialog bundles

USAGE:
    dgml play <bundle> [--section NAME] [--node ID] [--env FILE]
    dgml dump <bundle>

COMMANDS:
    play    Run a bundle interactively; --env persists variables between runs
    dump    Print the bundle's speakers, variables, markup, and sections
"#
    );
}

fn load_tree(path: &str) -> Tree {
    match dgml_bundle::load_file(path) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("Error loading '{}': {}", path, err);
            process::exit(1);
        }
    }
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|pos| args.get(pos + 1))
        .map(String::as_str)
}

fn play(args: &[String]) {
    let Some(path) = args.first() else {
        eprintln!("play: missing bundle path");
        process::exit(1);
    };
    let tree = load_tree(path);

    let section = match flag_value(args, "--section") {
        Some(name) => name.to_string(),
        None => match tree.sections().first() {
            Some(sec) => tree.resolve(sec.name).to_string(),
            None => {
                eprintln!("Bundle has no sections");
                process::exit(1);
            }
        },
    };
    let node_id = flag_value(args, "--node");
    let env_path = flag_value(args, "--env");

    let mut vm = Vm::new(&tree, VmParams::default());
    if let Err(err) = vm.enter(&section, node_id) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }

    if let Some(path) = env_path {
        restore_env(&mut vm, path);
    }

    let mut option = None;
    loop {
        let step = match vm.advance(option) {
            Ok(step) => step,
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        };
        option = None;

        match step.kind {
            StepKind::Say(say) => {
                print!("{}: ", say.speaker_id);
                render_fragments(say.fragments);
            }
            StepKind::Choice(choice) => {
                option = Some(prompt_option(choice));
            }
            StepKind::End => break,
        }
    }
    println!("<< END >>");

    if let Some(path) = env_path {
        save_env(&vm, path);
    }
}

fn render_fragments(fragments: Fragments<'_>) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for frag in fragments.iter() {
        for markup in frag.markup {
            if markup.name == "bold" {
                let _ = out.write_all(BOLD.as_bytes());
            } else if markup.name == "color" && markup.value == "magenta" {
                let _ = out.write_all(MAGENTA.as_bytes());
            }
        }
        let _ = out.write_all(frag.text.as_bytes());
        let _ = out.write_all(RESET.as_bytes());
    }
    let _ = out.write_all(b"\n");
}

/// List the options and read an answer. Disabled options are shown
/// faint and refused here; the runtime itself would accept them.
fn prompt_option(choice: Choice<'_>) -> usize {
    for (i, option) in choice.iter().enumerate() {
        if option.enabled {
            print!("{}{}. ", RESET, i + 1);
        } else {
            print!("{}{}X. ", RESET, FAINT);
        }
        render_fragments(option.fragments);
    }

    let enabled: Vec<bool> = choice.iter().map(|o| o.enabled).collect();
    let stdin = io::stdin();
    loop {
        print!("Answer: ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                println!("\nNo input. Aborting.");
                process::exit(1);
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("Read error: {}", err);
                process::exit(1);
            }
        }

        let Ok(num) = input.trim().parse::<usize>() else {
            println!("Invalid input.");
            continue;
        };
        if num < 1 || num > enabled.len() {
            println!("Out of range.");
            continue;
        }
        if !enabled[num - 1] {
            println!("Not a valid option.");
            continue;
        }
        return num - 1;
    }
}

/// Restore env vars from a `name value` line file written by `save_env`.
/// Values parse according to each variable's declared type.
fn restore_env(vm: &mut Vm<'_>, path: &str) {
    if !Path::new(path).exists() {
        return;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading '{}': {}", path, err);
            return;
        }
    };

    for line in content.lines() {
        let Some((name, raw)) = line.split_once(' ') else {
            continue;
        };
        let value = match vm.get_env(name) {
            Value::Unset => {
                eprintln!("Ignoring unknown env var '{}'", name);
                continue;
            }
            Value::Bool(_) => Value::Bool(raw == "true"),
            Value::Int(_) => match raw.parse() {
                Ok(i) => Value::Int(i),
                Err(_) => continue,
            },
            Value::Float(_) => match raw.parse() {
                Ok(f) => Value::Float(f),
                Err(_) => continue,
            },
            Value::Str(_) => Value::Str(raw),
        };
        if !vm.set_env(name, value) {
            eprintln!("Could not restore env var '{}'", name);
        }
    }
}

fn save_env(vm: &Vm<'_>, path: &str) {
    let mut out = String::new();
    for (name, value) in vm.env_vars() {
        match value {
            Value::Unset => {}
            Value::Bool(b) => out.push_str(&format!("{} {}\n", name, b)),
            Value::Int(i) => out.push_str(&format!("{} {}\n", name, i)),
            Value::Float(f) => out.push_str(&format!("{} {}\n", name, f)),
            Value::Str(s) => out.push_str(&format!("{} {}\n", name, s)),
        }
    }
    if let Err(err) = fs::write(path, out) {
        eprintln!("Error writing '{}': {}", path, err);
    }
}

fn dump(args: &[String]) {
    let Some(path) = args.first() else {
        eprintln!("dump: missing bundle path");
        process::exit(1);
    };
    let tree = load_tree(path);

    println!("speakers:");
    for speaker in tree.speakers() {
        println!("  {}", speaker);
    }

    println!("vars:");
    for var in tree.env_defaults() {
        let name = tree.resolve(var.name);
        match var.value {
            DefaultValue::Bool(b) => println!("  {}: {}", name, b),
            DefaultValue::Int(i) => println!("  {}: {}", name, i),
            DefaultValue::Float(f) => println!("  {}: {}", name, f),
            DefaultValue::Str(s) => println!("  {}: {}", name, tree.resolve(s)),
        }
    }

    println!("markup:");
    for markup in tree.markup_defs() {
        println!(
            "  {}: {}",
            tree.resolve(markup.name),
            tree.resolve(markup.value)
        );
    }

    for section in tree.sections() {
        println!(
            "section {} (entry {}):",
            tree.resolve(section.name),
            section.entry_node
        );
        for (i, node) in section.nodes.iter().enumerate() {
            let id = tree.resolve(node.id);
            match &node.kind {
                NodeKind::Say(say) => println!(
                    "  {} [{}] say {}: {} -> {}",
                    i,
                    id,
                    tree.resolve(say.speaker_id),
                    text_preview(&tree, &say.text),
                    dest(say.next)
                ),
                NodeKind::Choice(choice) => {
                    println!("  {} [{}] choice", i, id);
                    for opt in &choice.options {
                        println!(
                            "      {} -> {}{}",
                            text_preview(&tree, &opt.text),
                            dest(opt.dest),
                            if opt.cond.is_empty() { "" } else { " (cond)" }
                        );
                    }
                }
                NodeKind::Goto(goto) => println!("  {} [{}] goto {}", i, id, dest(goto.next)),
                NodeKind::If(branch) => println!(
                    "  {} [{}] if {} then {} else {}",
                    i,
                    id,
                    code_preview(&tree, &branch.cond),
                    dest(branch.true_dest),
                    dest(branch.false_dest)
                ),
                NodeKind::Rand(rand) => println!("  {} [{}] rand {:?}", i, id, rand.targets),
                NodeKind::Run(run) => println!(
                    "  {} [{}] run {} -> {}",
                    i,
                    id,
                    code_preview(&tree, &run.code),
                    dest(run.next)
                ),
            }
        }
    }
}

fn dest(node: u32) -> String {
    if node == dgml_bundle::NO_NODE {
        "end".to_string()
    } else {
        node.to_string()
    }
}

fn text_preview(tree: &Tree, text: &dgml_bundle::Text) -> String {
    let mut out = String::from("\"");
    for frag in &text.fragments {
        if frag.is_variable {
            out.push_str("${");
            out.push_str(tree.resolve(frag.text));
            out.push('}');
        } else {
            out.push_str(tree.resolve(frag.text));
        }
    }
    out.push('"');
    out
}

fn code_preview(tree: &Tree, code: &[dgml_bundle::Instr]) -> String {
    let mut out = String::from("{");
    for (i, instr) in code.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match OpCode::from_u32(instr.op) {
            Some(op) if op.has_string_param() => {
                out.push_str(op.name());
                out.push('(');
                out.push_str(tree.strings().lookup(instr.param).unwrap_or("?"));
                out.push(')');
            }
            Some(OpCode::PushInt) => {
                out.push_str(&format!("PUSH_INT({})", instr.param as i32));
            }
            Some(OpCode::PushFloat) => {
                out.push_str(&format!("PUSH_FLOAT({})", f32::from_bits(instr.param)));
            }
            Some(OpCode::PushBool) => {
                out.push_str(&format!("PUSH_BOOL({})", instr.param));
            }
            Some(op) => out.push_str(op.name()),
            None => out.push_str("INVALID"),
        }
    }
    out.push('}');
    out
}
