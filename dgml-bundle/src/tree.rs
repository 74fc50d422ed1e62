// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The materialized dialog tree.
//!
//! [`Tree`] is the owned, immutable in-memory form of a bundle: file
//! offsets are replaced with resolved [`Str`] views and node indices, and
//! the on-disk node record (which carries the fields of every variant at
//! once) becomes a proper tagged [`NodeKind`]. A tree can be shared by any
//! number of VMs; all mutable state lives in the VM.

use rustc_hash::FxHashMap;

use crate::error::{LoadError, Result};
use crate::layout::{Instr, NodeType, RawHeader, Span, VarType};
use crate::reader::Reader;
use crate::strings::{Str, StringTable};

/// A loaded, immutable dialog tree.
#[derive(Debug)]
pub struct Tree {
    strings: StringTable,
    sections: Vec<Section>,
    section_index: FxHashMap<Box<str>, u32>,
    env_defaults: Vec<EnvDefault>,
    speakers: Vec<Str>,
    markup_defs: Vec<MarkupDef>,
}

/// A named dialog graph: an ordered array of nodes plus the entry index.
#[derive(Debug)]
pub struct Section {
    pub name: Str,
    pub nodes: Vec<Node>,
    pub entry_node: u32,
}

/// One vertex of a section graph.
#[derive(Debug)]
pub struct Node {
    pub id: Str,
    pub tags: Box<[Str]>,
    pub kind: NodeKind,
}

/// Node payload, keyed by the on-disk node type.
#[derive(Debug)]
pub enum NodeKind {
    Say(Say),
    Choice(Choice),
    Goto(Goto),
    If(If),
    Rand(Rand),
    Run(Run),
}

/// A line of dialog. Interactive: the VM stops here.
#[derive(Debug)]
pub struct Say {
    pub speaker_id: Str,
    pub text: Text,
    pub next: u32,
}

/// A branching choice. Interactive: the VM stops here.
#[derive(Debug)]
pub struct Choice {
    pub options: Box<[ChoiceOption]>,
}

/// One selectable option of a [`Choice`]. An empty `cond` means "always
/// enabled"; a non-empty one must evaluate to a boolean.
#[derive(Debug)]
pub struct ChoiceOption {
    pub text: Text,
    pub cond: Box<[Instr]>,
    pub line_id: Str,
    pub dest: u32,
}

/// Unconditional jump.
#[derive(Debug)]
pub struct Goto {
    pub next: u32,
}

/// Conditional branch; `cond` must evaluate to a boolean.
#[derive(Debug)]
pub struct If {
    pub cond: Box<[Instr]>,
    pub true_dest: u32,
    pub false_dest: u32,
}

/// Uniformly random jump into a non-empty target set.
#[derive(Debug)]
pub struct Rand {
    pub targets: Box<[u32]>,
}

/// Run a bytecode program for its side effects; the result is discarded.
#[derive(Debug)]
pub struct Run {
    pub code: Box<[Instr]>,
    pub next: u32,
}

/// An ordered sequence of text fragments.
#[derive(Debug, Default)]
pub struct Text {
    pub fragments: Box<[Fragment]>,
}

/// One fragment of a text: either a literal string or, when
/// `is_variable` is set, the name of a variable whose current value is
/// substituted at interpolation time. Markup rides along either way.
#[derive(Debug)]
pub struct Fragment {
    pub text: Str,
    pub is_variable: bool,
    pub markup: Box<[MarkupDef]>,
}

/// An ordered `(name, value)` pair attached to a fragment, or, in the
/// header's markup list, a markup declaration whose value is a validation
/// regex for the authoring side. Interpretation is host-defined.
#[derive(Debug, Clone, Copy)]
pub struct MarkupDef {
    pub name: Str,
    pub value: Str,
}

/// Default value of an env var, as declared in the bundle.
#[derive(Debug)]
pub struct EnvDefault {
    pub name: Str,
    pub value: DefaultValue,
}

/// The decoded 32-bit default-value slot of an env var.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(Str),
}

impl Tree {
    /// The text of a resolved string view.
    pub fn resolve(&self, s: Str) -> &str {
        self.strings.resolve(s)
    }

    /// The string table, for resolving bytecode string parameters.
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// All sections, in bundle order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section by name.
    pub fn section_by_name(&self, name: &str) -> Option<(u32, &Section)> {
        let idx = *self.section_index.get(name)?;
        Some((idx, &self.sections[idx as usize]))
    }

    /// Env-var declarations, in bundle order.
    pub fn env_defaults(&self) -> &[EnvDefault] {
        &self.env_defaults
    }

    /// Speaker ids declared by the bundle.
    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.speakers.iter().map(|s| self.resolve(*s))
    }

    /// Markup declared by the bundle; values are validation regexes.
    pub fn markup_defs(&self) -> &[MarkupDef] {
        &self.markup_defs
    }
}

/// Materialize a tree from raw bundle bytes. Called through
/// [`crate::load_bundle`].
pub(crate) fn materialize(reader: &Reader<'_>) -> Result<Tree> {
    let header = reader.header()?;

    let strings = StringTable::new(
        reader.span_bytes(header.strings, 1)?,
        header.strings.offset,
    );

    let env_defaults = load_env_defaults(reader, &strings, &header)?;

    let mut speakers = Vec::with_capacity(header.speaker_ids.count as usize);
    for handle in reader.handles(header.speaker_ids)? {
        speakers.push(strings.get(handle)?);
    }

    let mut markup_defs = Vec::with_capacity(header.env_markup.count as usize);
    for m in 0..header.env_markup.count {
        let raw = reader.markup(header.env_markup, m)?;
        markup_defs.push(MarkupDef {
            name: strings.get(raw.key)?,
            value: strings.get(raw.value)?,
        });
    }

    let mut sections = Vec::with_capacity(header.sections.count as usize);
    let mut section_index = FxHashMap::default();
    for s in 0..header.sections.count {
        let raw = reader.section(header.sections, s)?;
        let name = strings.get(raw.name)?;

        let mut nodes = Vec::with_capacity(raw.nodes.count as usize);
        for n in 0..raw.nodes.count {
            nodes.push(load_node(reader, &strings, raw.nodes, s, n)?);
        }

        section_index.insert(strings.resolve(name).into(), s);
        sections.push(Section {
            name,
            nodes,
            entry_node: raw.entry_node,
        });
    }

    Ok(Tree {
        strings,
        sections,
        section_index,
        env_defaults,
        speakers,
        markup_defs,
    })
}

fn load_env_defaults(
    reader: &Reader<'_>,
    strings: &StringTable,
    header: &RawHeader,
) -> Result<Vec<EnvDefault>> {
    let mut defaults = Vec::with_capacity(header.env_variables.count as usize);
    for v in 0..header.env_variables.count {
        let raw = reader.env_var(header.env_variables, v)?;
        let value = match VarType::from_u32(raw.var_type)
            .ok_or(LoadError::InvalidVarType(raw.var_type))?
        {
            VarType::Bool => DefaultValue::Bool(raw.default_value != 0),
            VarType::Int => DefaultValue::Int(raw.default_value as i32 as i64),
            VarType::Float => DefaultValue::Float(f32::from_bits(raw.default_value)),
            VarType::String => DefaultValue::Str(strings.get(raw.default_value)?),
        };
        defaults.push(EnvDefault {
            name: strings.get(raw.name)?,
            value,
        });
    }
    Ok(defaults)
}

fn load_node(
    reader: &Reader<'_>,
    strings: &StringTable,
    nodes_span: Span,
    section: u32,
    index: u32,
) -> Result<Node> {
    let raw = reader.node(nodes_span, index)?;

    let mut tags = Vec::with_capacity(raw.tags.count as usize);
    for handle in reader.handles(raw.tags)? {
        tags.push(strings.get(handle)?);
    }

    let kind = match NodeType::from_u32(raw.node_type)
        .ok_or(LoadError::InvalidNodeType(raw.node_type))?
    {
        NodeType::Say => NodeKind::Say(Say {
            speaker_id: strings.get(raw.say_speaker_id)?,
            text: load_text(reader, strings, raw.text)?,
            next: raw.next_node,
        }),
        NodeType::Choice => {
            let mut options = Vec::with_capacity(raw.choice_options.count as usize);
            for o in 0..raw.choice_options.count {
                let opt = reader.option(raw.choice_options, o)?;
                options.push(ChoiceOption {
                    text: load_text(reader, strings, opt.text)?,
                    cond: reader.bytecode(opt.cond)?.into(),
                    line_id: strings.get(opt.line_id)?,
                    dest: opt.dest,
                });
            }
            NodeKind::Choice(Choice {
                options: options.into(),
            })
        }
        NodeType::Goto => NodeKind::Goto(Goto {
            next: raw.next_node,
        }),
        NodeType::If => NodeKind::If(If {
            cond: reader.bytecode(raw.code)?.into(),
            true_dest: raw.if_true_dest,
            false_dest: raw.if_false_dest,
        }),
        NodeType::Rand => {
            let targets = reader.indices(raw.rand_nodes)?;
            if targets.is_empty() {
                return Err(LoadError::EmptyRand {
                    section,
                    node: index,
                });
            }
            NodeKind::Rand(Rand {
                targets: targets.into(),
            })
        }
        NodeType::Run => NodeKind::Run(Run {
            code: reader.bytecode(raw.code)?.into(),
            next: raw.next_node,
        }),
    };

    Ok(Node {
        id: strings.get(raw.id)?,
        tags: tags.into(),
        kind,
    })
}

fn load_text(reader: &Reader<'_>, strings: &StringTable, span: Span) -> Result<Text> {
    let mut fragments = Vec::with_capacity(span.count as usize);
    for f in 0..span.count {
        let raw = reader.fragment(span, f)?;
        let mut markup = Vec::with_capacity(raw.markup.count as usize);
        for m in 0..raw.markup.count {
            let pair = reader.markup(raw.markup, m)?;
            markup.push(MarkupDef {
                name: strings.get(pair.key)?,
                value: strings.get(pair.value)?,
            });
        }
        fragments.push(Fragment {
            text: strings.get(raw.string)?,
            is_variable: raw.is_variable != 0,
            markup: markup.into(),
        });
    }
    Ok(Text {
        fragments: fragments.into(),
    })
}
