// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Programmatic bundle writer.
//!
//! Emits the binary layout described in [`crate::layout`]: header, packed
//! string region, then the record arrays, everything little-endian and
//! 4-byte aligned. This is the write half of the format for tests and
//! tools; the DGML authoring compiler lives elsewhere.
//!
//! ```
//! use dgml_bundle::builder::{BundleBuilder, Frag, Inst};
//! use dgml_bundle::NO_NODE;
//!
//! let mut b = BundleBuilder::new();
//! b.env_int("coins", 0);
//! let s = b.section("intro", 0);
//! s.run(&[Inst::PushInt(5), Inst::SetVar("coins".into())], 1);
//! s.say("guide", &[Frag::lit("You have "), Frag::var("coins")], NO_NODE)
//!     .id("greeting");
//! let bytes = b.finish();
//! let tree = dgml_bundle::load_bundle(&bytes).unwrap();
//! assert_eq!(tree.sections().len(), 1);
//! ```

use rustc_hash::FxHashMap;

use crate::layout::{
    BYTECODE_SIZE, ENV_VAR_SIZE, FRAGMENT_SIZE, HEADER_SIZE, MAGIC, MARKUP_SIZE, NODE_SIZE,
    NodeType, OPTION_SIZE, OpCode, SECTION_SIZE, VarType,
};

/// One builder-level text fragment.
#[derive(Debug, Clone)]
pub struct Frag {
    text: String,
    is_variable: bool,
    markup: Vec<(String, String)>,
}

impl Frag {
    /// A literal fragment.
    pub fn lit(text: &str) -> Self {
        Self {
            text: text.into(),
            is_variable: false,
            markup: Vec::new(),
        }
    }

    /// A variable fragment; `name` is the variable's name.
    pub fn var(name: &str) -> Self {
        Self {
            text: name.into(),
            is_variable: true,
            markup: Vec::new(),
        }
    }

    /// Attach a markup pair.
    pub fn with_markup(mut self, name: &str, value: &str) -> Self {
        self.markup.push((name.into(), value.into()));
        self
    }
}

/// One builder-level bytecode instruction, carrying its real value; the
/// builder interns strings and bit-casts numerics on serialization.
#[derive(Debug, Clone)]
pub enum Inst {
    PushBool(bool),
    PushInt(i32),
    PushFloat(f32),
    PushString(String),
    GetVar(String),
    SetVar(String),
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// One option of a choice node under construction.
#[derive(Debug, Clone)]
pub struct OptionDef {
    text: Vec<Frag>,
    cond: Vec<Inst>,
    line_id: String,
    dest: u32,
}

impl OptionDef {
    /// An always-enabled option.
    pub fn new(text: &[Frag], dest: u32) -> Self {
        Self {
            text: text.to_vec(),
            cond: Vec::new(),
            line_id: String::new(),
            dest,
        }
    }

    /// Gate the option on a bytecode condition.
    pub fn cond(mut self, cond: &[Inst]) -> Self {
        self.cond = cond.to_vec();
        self
    }

    /// Attach a localization line id.
    pub fn line_id(mut self, id: &str) -> Self {
        self.line_id = id.into();
        self
    }
}

/// A node under construction. Returned by the [`SectionDef`] node
/// methods so id and tags can be chained on.
#[derive(Debug)]
pub struct NodeDef {
    id: String,
    tags: Vec<String>,
    kind: NodeDefKind,
}

#[derive(Debug)]
enum NodeDefKind {
    Say {
        speaker: String,
        text: Vec<Frag>,
        next: u32,
    },
    Choice {
        options: Vec<OptionDef>,
    },
    Goto {
        next: u32,
    },
    If {
        cond: Vec<Inst>,
        true_dest: u32,
        false_dest: u32,
    },
    Rand {
        targets: Vec<u32>,
    },
    Run {
        code: Vec<Inst>,
        next: u32,
    },
}

impl NodeDef {
    /// Set the node id.
    pub fn id(&mut self, id: &str) -> &mut Self {
        self.id = id.into();
        self
    }

    /// Add a tag.
    pub fn tag(&mut self, tag: &str) -> &mut Self {
        self.tags.push(tag.into());
        self
    }
}

/// A section under construction.
#[derive(Debug)]
pub struct SectionDef {
    name: String,
    entry_node: u32,
    nodes: Vec<NodeDef>,
}

impl SectionDef {
    fn push(&mut self, kind: NodeDefKind) -> &mut NodeDef {
        self.nodes.push(NodeDef {
            id: String::new(),
            tags: Vec::new(),
            kind,
        });
        self.nodes.last_mut().unwrap()
    }

    /// Append a say node.
    pub fn say(&mut self, speaker: &str, text: &[Frag], next: u32) -> &mut NodeDef {
        self.push(NodeDefKind::Say {
            speaker: speaker.into(),
            text: text.to_vec(),
            next,
        })
    }

    /// Append a choice node.
    pub fn choice(&mut self, options: &[OptionDef]) -> &mut NodeDef {
        self.push(NodeDefKind::Choice {
            options: options.to_vec(),
        })
    }

    /// Append a goto node.
    pub fn jump(&mut self, next: u32) -> &mut NodeDef {
        self.push(NodeDefKind::Goto { next })
    }

    /// Append an if node.
    pub fn branch(&mut self, cond: &[Inst], true_dest: u32, false_dest: u32) -> &mut NodeDef {
        self.push(NodeDefKind::If {
            cond: cond.to_vec(),
            true_dest,
            false_dest,
        })
    }

    /// Append a rand node.
    pub fn rand(&mut self, targets: &[u32]) -> &mut NodeDef {
        self.push(NodeDefKind::Rand {
            targets: targets.to_vec(),
        })
    }

    /// Append a run node.
    pub fn run(&mut self, code: &[Inst], next: u32) -> &mut NodeDef {
        self.push(NodeDefKind::Run {
            code: code.to_vec(),
            next,
        })
    }
}

/// Builds a complete bundle in memory.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    sections: Vec<SectionDef>,
    env_vars: Vec<(String, VarType, VarDefault)>,
    speakers: Vec<String>,
    markup_defs: Vec<(String, String)>,
}

#[derive(Debug)]
enum VarDefault {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a speaker id.
    pub fn speaker(&mut self, id: &str) -> &mut Self {
        self.speakers.push(id.into());
        self
    }

    /// Declare a markup name with its validation regex.
    pub fn markup_def(&mut self, name: &str, value: &str) -> &mut Self {
        self.markup_defs.push((name.into(), value.into()));
        self
    }

    /// Declare a bool env var.
    pub fn env_bool(&mut self, name: &str, default: bool) -> &mut Self {
        self.env_vars
            .push((name.into(), VarType::Bool, VarDefault::Bool(default)));
        self
    }

    /// Declare an int env var.
    pub fn env_int(&mut self, name: &str, default: i32) -> &mut Self {
        self.env_vars
            .push((name.into(), VarType::Int, VarDefault::Int(default)));
        self
    }

    /// Declare a float env var.
    pub fn env_float(&mut self, name: &str, default: f32) -> &mut Self {
        self.env_vars
            .push((name.into(), VarType::Float, VarDefault::Float(default)));
        self
    }

    /// Declare a string env var.
    pub fn env_str(&mut self, name: &str, default: &str) -> &mut Self {
        self.env_vars
            .push((name.into(), VarType::String, VarDefault::Str(default.into())));
        self
    }

    /// Start a section whose entry node is `entry_node`.
    pub fn section(&mut self, name: &str, entry_node: u32) -> &mut SectionDef {
        self.sections.push(SectionDef {
            name: name.into(),
            entry_node,
            nodes: Vec::new(),
        });
        self.sections.last_mut().unwrap()
    }

    /// Serialize the bundle.
    pub fn finish(&self) -> Vec<u8> {
        let mut strings = StringPool::new(HEADER_SIZE as u32);
        self.intern_all(&mut strings);

        // Count every record so array offsets are known up front.
        let num_nodes: usize = self.sections.iter().map(|s| s.nodes.len()).sum();
        let mut num_options = 0usize;
        let mut num_frags = 0usize;
        let mut num_markup = self.markup_defs.len();
        let mut num_u32s = 0usize; // rand targets and tag handle lists
        let mut num_code = 0usize;
        for section in &self.sections {
            for node in &section.nodes {
                num_u32s += node.tags.len();
                match &node.kind {
                    NodeDefKind::Say { text, .. } => {
                        num_frags += text.len();
                        num_markup += text.iter().map(|f| f.markup.len()).sum::<usize>();
                    }
                    NodeDefKind::Choice { options } => {
                        num_options += options.len();
                        for opt in options {
                            num_frags += opt.text.len();
                            num_markup += opt.text.iter().map(|f| f.markup.len()).sum::<usize>();
                            num_code += opt.cond.len();
                        }
                    }
                    NodeDefKind::If { cond, .. } => num_code += cond.len(),
                    NodeDefKind::Run { code, .. } => num_code += code.len(),
                    NodeDefKind::Rand { targets } => num_u32s += targets.len(),
                    NodeDefKind::Goto { .. } => {}
                }
            }
        }

        let strings_off = HEADER_SIZE as u32;
        let strings_len = strings.bytes.len() as u32;
        let mut off = align4(strings_off + strings_len);
        let speakers_off = take(&mut off, self.speakers.len(), 4);
        let env_off = take(&mut off, self.env_vars.len(), ENV_VAR_SIZE);
        let markup_off = take(&mut off, num_markup, MARKUP_SIZE);
        let sections_off = take(&mut off, self.sections.len(), SECTION_SIZE);
        let nodes_off = take(&mut off, num_nodes, NODE_SIZE);
        let options_off = take(&mut off, num_options, OPTION_SIZE);
        let frags_off = take(&mut off, num_frags, FRAGMENT_SIZE);
        let rand_off = take(&mut off, num_u32s, 4);
        let code_off = take(&mut off, num_code, BYTECODE_SIZE);
        let file_size = off;

        let mut out = Vec::with_capacity(file_size as usize);

        // Header: magic, file size, then the spans in declaration order.
        out.extend(MAGIC);
        p32(&mut out, file_size);
        p32(&mut out, strings_off);
        p32(&mut out, strings_len);
        p32(&mut out, sections_off);
        p32(&mut out, self.sections.len() as u32);
        p32(&mut out, speakers_off);
        p32(&mut out, self.speakers.len() as u32);
        p32(&mut out, env_off);
        p32(&mut out, self.env_vars.len() as u32);
        // The markup array holds the header's definitions first, then
        // every fragment's markup pairs; only the definitions belong to
        // the header span.
        p32(&mut out, markup_off);
        p32(&mut out, self.markup_defs.len() as u32);
        debug_assert_eq!(out.len(), HEADER_SIZE);

        // Strings.
        out.extend(&strings.bytes);
        pad4(&mut out);

        // Speakers.
        debug_assert_eq!(out.len() as u32, speakers_off);
        for id in &self.speakers {
            p32(&mut out, strings.handle(id));
        }

        // Env vars.
        debug_assert_eq!(out.len() as u32, env_off);
        for (name, ty, default) in &self.env_vars {
            p32(&mut out, strings.handle(name));
            p32(&mut out, *ty as u32);
            p32(
                &mut out,
                match default {
                    VarDefault::Bool(b) => *b as u32,
                    VarDefault::Int(i) => *i as u32,
                    VarDefault::Float(f) => f.to_bits(),
                    VarDefault::Str(s) => strings.handle(s),
                },
            );
        }

        // Markup: header defs first, fragment markup appended as nodes
        // are serialized.
        debug_assert_eq!(out.len() as u32, markup_off);
        let mut markup = Vec::with_capacity(num_markup * MARKUP_SIZE);
        for (name, value) in &self.markup_defs {
            p32(&mut markup, strings.handle(name));
            p32(&mut markup, strings.handle(value));
        }

        // Walk sections and nodes, appending sub-records to their own
        // arrays with running element cursors.
        let mut sections_buf = Vec::with_capacity(self.sections.len() * SECTION_SIZE);
        let mut nodes_buf = Vec::with_capacity(num_nodes * NODE_SIZE);
        let mut options_buf = Vec::with_capacity(num_options * OPTION_SIZE);
        let mut frags_buf = Vec::with_capacity(num_frags * FRAGMENT_SIZE);
        let mut rand_buf = Vec::with_capacity(num_u32s * 4);
        let mut code_buf = Vec::with_capacity(num_code * BYTECODE_SIZE);

        let mut node_cursor = 0u32;
        for (section_idx, section) in self.sections.iter().enumerate() {
            p32(&mut sections_buf, strings.handle(&section.name));
            p32(&mut sections_buf, nodes_off + node_cursor * NODE_SIZE as u32);
            p32(&mut sections_buf, section.nodes.len() as u32);
            p32(&mut sections_buf, section.entry_node);
            node_cursor += section.nodes.len() as u32;

            for node in &section.nodes {
                serialize_node(
                    node,
                    section_idx as u32,
                    &strings,
                    &mut nodes_buf,
                    &mut Cursors {
                        options_off,
                        options_buf: &mut options_buf,
                        frags_off,
                        frags_buf: &mut frags_buf,
                        markup_off,
                        markup_buf: &mut markup,
                        rand_off,
                        rand_buf: &mut rand_buf,
                        code_off,
                        code_buf: &mut code_buf,
                    },
                );
            }
        }

        out.extend(&markup);
        debug_assert_eq!(out.len() as u32, sections_off);
        out.extend(&sections_buf);
        out.extend(&nodes_buf);
        out.extend(&options_buf);
        out.extend(&frags_buf);
        out.extend(&rand_buf);
        out.extend(&code_buf);
        debug_assert_eq!(out.len() as u32, file_size);

        out
    }

    fn intern_all(&self, strings: &mut StringPool) {
        for id in &self.speakers {
            strings.intern(id);
        }
        for (name, value) in &self.markup_defs {
            strings.intern(name);
            strings.intern(value);
        }
        for (name, _, default) in &self.env_vars {
            strings.intern(name);
            if let VarDefault::Str(s) = default {
                strings.intern(s);
            }
        }
        for section in &self.sections {
            strings.intern(&section.name);
            for node in &section.nodes {
                strings.intern(&node.id);
                for tag in &node.tags {
                    strings.intern(tag);
                }
                match &node.kind {
                    NodeDefKind::Say { speaker, text, .. } => {
                        strings.intern(speaker);
                        intern_text(strings, text);
                    }
                    NodeDefKind::Choice { options } => {
                        for opt in options {
                            strings.intern(&opt.line_id);
                            intern_text(strings, &opt.text);
                            intern_code(strings, &opt.cond);
                        }
                    }
                    NodeDefKind::If { cond, .. } => intern_code(strings, cond),
                    NodeDefKind::Run { code, .. } => intern_code(strings, code),
                    NodeDefKind::Goto { .. } | NodeDefKind::Rand { .. } => {}
                }
            }
        }
    }
}

struct Cursors<'b> {
    options_off: u32,
    options_buf: &'b mut Vec<u8>,
    frags_off: u32,
    frags_buf: &'b mut Vec<u8>,
    markup_off: u32,
    markup_buf: &'b mut Vec<u8>,
    rand_off: u32,
    rand_buf: &'b mut Vec<u8>,
    code_off: u32,
    code_buf: &'b mut Vec<u8>,
}

impl Cursors<'_> {
    fn text(&mut self, strings: &StringPool, frags: &[Frag]) -> (u32, u32) {
        let offset = self.frags_off + self.frags_buf.len() as u32;
        // Fragment records first, then their markup; both cursors advance
        // within one pass, so markup spans are emitted before the records.
        let mut records = Vec::with_capacity(frags.len() * FRAGMENT_SIZE);
        for frag in frags {
            let markup_offset = self.markup_off + self.markup_buf.len() as u32;
            for (name, value) in &frag.markup {
                p32(self.markup_buf, strings.handle(name));
                p32(self.markup_buf, strings.handle(value));
            }
            p32(&mut records, strings.handle(&frag.text));
            p32(&mut records, if frag.markup.is_empty() { 0 } else { markup_offset });
            p32(&mut records, frag.markup.len() as u32);
            p32(&mut records, frag.is_variable as u32);
        }
        self.frags_buf.extend(records);
        (offset, frags.len() as u32)
    }

    fn code(&mut self, strings: &StringPool, code: &[Inst]) -> (u32, u32) {
        let offset = self.code_off + self.code_buf.len() as u32;
        for inst in code {
            let (op, param) = encode_inst(strings, inst);
            p32(self.code_buf, op as u32);
            p32(self.code_buf, param);
        }
        (offset, code.len() as u32)
    }
}

fn serialize_node(
    node: &NodeDef,
    section_idx: u32,
    strings: &StringPool,
    nodes_buf: &mut Vec<u8>,
    cursors: &mut Cursors<'_>,
) {
    use crate::layout::NO_NODE;

    let mut tags_span = (0u32, 0u32);
    if !node.tags.is_empty() {
        // Tag handle lists ride in the rand-targets array; both are plain
        // u32 arrays and the reader does not care which records surround
        // them.
        tags_span = (
            cursors.rand_off + cursors.rand_buf.len() as u32,
            node.tags.len() as u32,
        );
        for tag in &node.tags {
            p32(cursors.rand_buf, strings.handle(tag));
        }
    }

    let mut code_span = (0u32, 0u32);
    let mut options_span = (0u32, 0u32);
    let mut rand_span = (0u32, 0u32);
    let mut text_span = (0u32, 0u32);
    let mut speaker = 0u32;
    let mut next_node = NO_NODE;
    let mut true_dest = NO_NODE;
    let mut false_dest = NO_NODE;

    let node_type = match &node.kind {
        NodeDefKind::Say {
            speaker: sp,
            text,
            next,
        } => {
            speaker = strings.handle(sp);
            text_span = cursors.text(strings, text);
            next_node = *next;
            NodeType::Say
        }
        NodeDefKind::Choice { options } => {
            options_span = (
                cursors.options_off + cursors.options_buf.len() as u32,
                options.len() as u32,
            );
            // Two passes: sub-records of every option first would reorder
            // the option array itself, so emit each option record inline
            // while its text/cond land in their own arrays.
            let mut records = Vec::with_capacity(options.len() * OPTION_SIZE);
            for opt in options {
                let cond_span = if opt.cond.is_empty() {
                    (0, 0)
                } else {
                    cursors.code(strings, &opt.cond)
                };
                let opt_text = cursors.text(strings, &opt.text);
                p32(&mut records, cond_span.0);
                p32(&mut records, cond_span.1);
                p32(&mut records, strings.handle(&opt.line_id));
                p32(&mut records, opt_text.0);
                p32(&mut records, opt_text.1);
                p32(&mut records, opt.dest);
            }
            cursors.options_buf.extend(records);
            NodeType::Choice
        }
        NodeDefKind::Goto { next } => {
            next_node = *next;
            NodeType::Goto
        }
        NodeDefKind::If {
            cond,
            true_dest: t,
            false_dest: f,
        } => {
            code_span = cursors.code(strings, cond);
            true_dest = *t;
            false_dest = *f;
            NodeType::If
        }
        NodeDefKind::Rand { targets } => {
            rand_span = (
                cursors.rand_off + cursors.rand_buf.len() as u32,
                targets.len() as u32,
            );
            for target in targets {
                p32(cursors.rand_buf, *target);
            }
            NodeType::Rand
        }
        NodeDefKind::Run { code, next } => {
            code_span = cursors.code(strings, code);
            next_node = *next;
            NodeType::Run
        }
    };

    p32(nodes_buf, strings.handle(&node.id));
    p32(nodes_buf, speaker);
    p32(nodes_buf, tags_span.0);
    p32(nodes_buf, tags_span.1);
    p32(nodes_buf, code_span.0);
    p32(nodes_buf, code_span.1);
    p32(nodes_buf, options_span.0);
    p32(nodes_buf, options_span.1);
    p32(nodes_buf, rand_span.0);
    p32(nodes_buf, rand_span.1);
    p32(nodes_buf, text_span.0);
    p32(nodes_buf, text_span.1);
    p32(nodes_buf, section_idx);
    p32(nodes_buf, next_node);
    p32(nodes_buf, true_dest);
    p32(nodes_buf, false_dest);
    p32(nodes_buf, node_type as u32);
}

fn encode_inst(strings: &StringPool, inst: &Inst) -> (OpCode, u32) {
    match inst {
        Inst::PushBool(b) => (OpCode::PushBool, *b as u32),
        Inst::PushInt(i) => (OpCode::PushInt, *i as u32),
        Inst::PushFloat(f) => (OpCode::PushFloat, f.to_bits()),
        Inst::PushString(s) => (OpCode::PushString, strings.handle(s)),
        Inst::GetVar(s) => (OpCode::GetVar, strings.handle(s)),
        Inst::SetVar(s) => (OpCode::SetVar, strings.handle(s)),
        Inst::Not => (OpCode::Not, 0),
        Inst::Add => (OpCode::Add, 0),
        Inst::Sub => (OpCode::Sub, 0),
        Inst::Mul => (OpCode::Mul, 0),
        Inst::Div => (OpCode::Div, 0),
        Inst::Or => (OpCode::Or, 0),
        Inst::And => (OpCode::And, 0),
        Inst::Lt => (OpCode::Lt, 0),
        Inst::Le => (OpCode::Le, 0),
        Inst::Gt => (OpCode::Gt, 0),
        Inst::Ge => (OpCode::Ge, 0),
        Inst::Eq => (OpCode::Eq, 0),
        Inst::Ne => (OpCode::Ne, 0),
    }
}

fn intern_text(strings: &mut StringPool, text: &[Frag]) {
    for frag in text {
        strings.intern(&frag.text);
        for (name, value) in &frag.markup {
            strings.intern(name);
            strings.intern(value);
        }
    }
}

fn intern_code(strings: &mut StringPool, code: &[Inst]) {
    for inst in code {
        match inst {
            Inst::PushString(s) | Inst::GetVar(s) | Inst::SetVar(s) => {
                strings.intern(s);
            }
            _ => {}
        }
    }
}

/// Deduplicating string pool producing the packed region.
#[derive(Debug)]
struct StringPool {
    bytes: Vec<u8>,
    base_offset: u32,
    index: FxHashMap<String, u32>,
}

impl StringPool {
    fn new(base_offset: u32) -> Self {
        Self {
            bytes: Vec::new(),
            base_offset,
            index: FxHashMap::default(),
        }
    }

    /// Intern a string and return its handle. The empty string is the
    /// absent sentinel 0.
    fn intern(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        if let Some(handle) = self.index.get(s) {
            return *handle;
        }
        let handle = self.base_offset + self.bytes.len() as u32;
        self.bytes.extend((s.len() as u32).to_le_bytes());
        self.bytes.extend(s.as_bytes());
        self.bytes.push(0);
        self.index.insert(s.into(), handle);
        handle
    }

    /// Handle of an already-interned string.
    fn handle(&self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        self.index[s]
    }
}

fn p32(buf: &mut Vec<u8>, v: u32) {
    buf.extend(v.to_le_bytes());
}

fn align4(off: u32) -> u32 {
    (off + 3) & !3
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn take(off: &mut u32, count: usize, size: usize) -> u32 {
    let at = *off;
    *off += (count * size) as u32;
    at
}
