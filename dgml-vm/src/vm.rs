// dgml-vm - Dialog virtual machine for compiled DGML bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The dialog machine.
//!
//! A [`Vm`] borrows an immutable [`Tree`] and owns all mutable state:
//! the env store, the eval stack, the cursor, and the scratch buffers
//! that back [`Step`] results. Scratch is allocated once at creation and
//! reused; a `Step` borrows the VM, so the borrow checker enforces the
//! rule that its contents are only valid until the next call.
//!
//! `advance` walks internal nodes (goto/if/run/rand) until it reaches an
//! interactive node (say/choice), the terminate sentinel, or the step
//! budget.

use dgml_bundle::{Node, NodeKind, Tree};

use crate::env::EnvStore;
use crate::error::{AdvanceError, EnterError};
use crate::interp::{FragSlot, InterpBuf, SlotText};
use crate::rng::{RngParam, RngSource};
use crate::stack::EvalStack;
use crate::value::Value;

/// Creation parameters for [`Vm::new`].
#[derive(Debug)]
pub struct VmParams {
    /// Bytes for formatted variable values per advance.
    pub interp_buf_capacity: usize,
    /// Fixed buffer capacity of each string env var.
    pub env_var_string_capacity: usize,
    /// Eval stack capacity in values.
    pub bytecode_stack_size: usize,
    /// Node-visit budget of one advance.
    pub max_steps_per_advance: usize,
    /// RNG for rand nodes.
    pub rng: RngParam,
}

impl Default for VmParams {
    fn default() -> Self {
        Self {
            interp_buf_capacity: 1024,
            env_var_string_capacity: 128,
            bytecode_stack_size: 64,
            max_steps_per_advance: 128,
            rng: RngParam::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    section: u32,
    node: u32,
}

/// One produced choice option: a fragment range plus the enabled flag.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OptionSlot {
    frag_start: u32,
    frag_len: u32,
    enabled: bool,
}

/// The dialog machine. Several VMs may share one tree; each owns its
/// environment and cursor.
#[derive(Debug)]
pub struct Vm<'t> {
    pub(crate) tree: &'t Tree,
    pub(crate) env: EnvStore<'t>,
    pub(crate) stack: EvalStack<'t>,
    pub(crate) interp: InterpBuf,
    pub(crate) frag_slots: Vec<FragSlot<'t>>,
    pub(crate) frag_capacity: usize,
    pub(crate) markup_slots: Vec<Markup<'t>>,
    pub(crate) markup_capacity: usize,
    pub(crate) changed: Vec<&'t str>,
    option_slots: Vec<OptionSlot>,
    tag_slots: Vec<&'t str>,
    trace: Vec<&'t str>,
    rng: RngSource,
    max_steps: usize,
    cursor: Option<Cursor>,
}

impl<'t> Vm<'t> {
    /// Create a VM bound to `tree`. All scratch buffers are sized here:
    /// the fragment and markup scratch to the worst-case single node
    /// (a say's fragments, or the sum across a choice's options), the
    /// trace to the step budget.
    pub fn new(tree: &'t Tree, params: VmParams) -> Self {
        let mut max_options = 0;
        let mut max_frags = 0;
        let mut max_markup = 0;
        let mut max_tags = 0;
        for section in tree.sections() {
            for node in &section.nodes {
                max_tags = max_tags.max(node.tags.len());
                match &node.kind {
                    NodeKind::Say(say) => {
                        max_frags = max_frags.max(say.text.fragments.len());
                        max_markup = max_markup.max(markup_count(&say.text));
                    }
                    NodeKind::Choice(choice) => {
                        let frags: usize =
                            choice.options.iter().map(|o| o.text.fragments.len()).sum();
                        let markup: usize =
                            choice.options.iter().map(|o| markup_count(&o.text)).sum();
                        max_options = max_options.max(choice.options.len());
                        max_frags = max_frags.max(frags);
                        max_markup = max_markup.max(markup);
                    }
                    _ => {}
                }
            }
        }

        let env = EnvStore::from_tree(tree, params.env_var_string_capacity);
        let num_vars = env.len();
        Self {
            tree,
            env,
            stack: EvalStack::new(params.bytecode_stack_size),
            interp: InterpBuf::new(params.interp_buf_capacity),
            frag_slots: Vec::with_capacity(max_frags),
            frag_capacity: max_frags,
            markup_slots: Vec::with_capacity(max_markup),
            markup_capacity: max_markup,
            changed: Vec::with_capacity(num_vars),
            option_slots: Vec::with_capacity(max_options),
            tag_slots: Vec::with_capacity(max_tags),
            trace: Vec::with_capacity(params.max_steps_per_advance),
            rng: RngSource::from_param(params.rng),
            max_steps: params.max_steps_per_advance,
            cursor: None,
        }
    }

    /// The tree this VM is bound to.
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// Position the cursor at a section's entry node, or at the node
    /// with the given id.
    pub fn enter(&mut self, section: &str, node_id: Option<&str>) -> Result<(), EnterError> {
        let (section_idx, sec) = self
            .tree
            .section_by_name(section)
            .ok_or_else(|| EnterError::UnknownSection(section.into()))?;

        let node = match node_id {
            Some(id) => sec
                .nodes
                .iter()
                .position(|n| self.tree.resolve(n.id) == id)
                .ok_or_else(|| EnterError::UnknownNode {
                    section: section.into(),
                    node_id: id.into(),
                })? as u32,
            None => sec.entry_node,
        };

        self.cursor = Some(Cursor {
            section: section_idx,
            node,
        });
        Ok(())
    }

    /// Walk the graph until the next interactive node, the end of the
    /// section, or an error.
    ///
    /// Pass `Some(index)` only when the previous result was a
    /// [`StepKind::Choice`]; the cursor then moves to that option's
    /// destination first. A disabled option is still selectable; the
    /// enabled flag is advisory for hosts.
    ///
    /// Everything the returned [`Step`] references lives in VM scratch
    /// that the next call overwrites; the borrow ties it to exactly that
    /// window.
    pub fn advance(&mut self, option_index: Option<usize>) -> Result<Step<'_>, AdvanceError> {
        let tree = self.tree;
        let Some(cursor) = self.cursor else {
            return Err(AdvanceError::NotEntered);
        };
        let section = &tree.sections()[cursor.section as usize];
        let mut current = cursor.node;

        if let Some(index) = option_index {
            let options = match section.nodes.get(current as usize).map(|n| &n.kind) {
                Some(NodeKind::Choice(choice)) => &choice.options,
                _ => {
                    return Err(AdvanceError::InvalidOption {
                        index,
                        num_options: 0,
                    });
                }
            };
            if index >= options.len() {
                return Err(AdvanceError::InvalidOption {
                    index,
                    num_options: options.len(),
                });
            }
            current = options[index].dest;
            self.set_node(cursor, current);
        }

        self.interp.reset();
        self.frag_slots.clear();
        self.markup_slots.clear();
        self.option_slots.clear();
        self.tag_slots.clear();
        self.trace.clear();
        self.changed.clear();

        let mut last: Option<&'t Node> = None;
        while (current as usize) < section.nodes.len() {
            let node = &section.nodes[current as usize];
            self.trace.push(tree.resolve(node.id));
            last = Some(node);

            match &node.kind {
                NodeKind::Say(say) => {
                    current = say.next;
                    self.set_node(cursor, current);
                    let (start, len) = self.interpolate(&say.text)?;
                    let speaker = tree.resolve(say.speaker_id);
                    return Ok(self.step(
                        Some(node),
                        StepPayload::Say {
                            speaker,
                            start,
                            len,
                        },
                    ));
                }
                NodeKind::Choice(choice) => {
                    for opt in &choice.options {
                        let enabled = if opt.cond.is_empty() {
                            true
                        } else {
                            self.eval_condition(&opt.cond)?
                        };
                        let (start, len) = self.interpolate(&opt.text)?;
                        self.option_slots.push(OptionSlot {
                            frag_start: start,
                            frag_len: len,
                            enabled,
                        });
                    }
                    // The cursor stays on the choice node until an
                    // option is selected.
                    return Ok(self.step(Some(node), StepPayload::Choice));
                }
                NodeKind::Goto(goto) => current = goto.next,
                NodeKind::If(branch) => {
                    current = if self.eval_condition(&branch.cond)? {
                        branch.true_dest
                    } else {
                        branch.false_dest
                    };
                }
                NodeKind::Rand(rand) => {
                    let draw = self.rng.next() % rand.targets.len() as u64;
                    current = rand.targets[draw as usize];
                }
                NodeKind::Run(run) => {
                    self.eval(&run.code)?;
                    current = run.next;
                }
            }

            self.set_node(cursor, current);
            if self.trace.len() >= self.max_steps {
                return Err(AdvanceError::MaxIterations(self.max_steps));
            }
        }

        Ok(self.step(last, StepPayload::End))
    }

    /// Current value of an env var; [`Value::Unset`] if it does not
    /// exist.
    pub fn get_env(&self, name: &str) -> Value<'_> {
        self.env.get(name)
    }

    /// Store an env value. Returns false if the variable does not exist,
    /// the type does not match, or a string payload exceeds its buffer.
    pub fn set_env(&mut self, name: &str, value: Value<'_>) -> bool {
        self.env.set(name, value)
    }

    /// All env vars with their current values, in declaration order.
    pub fn env_vars(&self) -> impl Iterator<Item = (&'t str, Value<'_>)> {
        self.env.iter()
    }

    /// Node ids visited by the most recent advance. Also populated when
    /// the advance returned an error.
    pub fn last_visited(&self) -> &[&str] {
        &self.trace
    }

    /// Variables written by the most recent advance, deduplicated in
    /// insertion order. Also populated when the advance returned an
    /// error.
    pub fn last_changed_vars(&self) -> &[&str] {
        &self.changed
    }

    fn set_node(&mut self, cursor: Cursor, node: u32) {
        self.cursor = Some(Cursor {
            section: cursor.section,
            node,
        });
    }

    fn step(&mut self, node: Option<&'t Node>, payload: StepPayload<'t>) -> Step<'_> {
        let tree = self.tree;
        let node_id = match node {
            Some(n) => tree.resolve(n.id),
            None => "",
        };
        if let Some(n) = node {
            self.tag_slots
                .extend(n.tags.iter().map(|t| tree.resolve(*t)));
        }

        let ctx = FragCtx {
            interp: self.interp.bytes(),
            markup: &self.markup_slots,
            env: &self.env,
        };
        let kind = match payload {
            StepPayload::End => StepKind::End,
            StepPayload::Say {
                speaker,
                start,
                len,
            } => StepKind::Say(Say {
                speaker_id: speaker,
                fragments: Fragments {
                    slots: &self.frag_slots[start as usize..(start + len) as usize],
                    ctx,
                },
            }),
            StepPayload::Choice => StepKind::Choice(Choice {
                slots: &self.option_slots,
                frags: &self.frag_slots,
                ctx,
            }),
        };

        Step {
            node_id,
            tags: &self.tag_slots,
            visited: &self.trace,
            changed_vars: &self.changed,
            kind,
        }
    }
}

enum StepPayload<'t> {
    End,
    Say {
        speaker: &'t str,
        start: u32,
        len: u32,
    },
    Choice,
}

fn markup_count(text: &dgml_bundle::Text) -> usize {
    text.fragments.iter().map(|f| f.markup.len()).sum()
}

/// The result of one [`Vm::advance`]. Everything here borrows VM
/// scratch; the next call on the same VM overwrites it.
#[derive(Debug)]
pub struct Step<'a> {
    /// Id of the node that produced this result; empty when the advance
    /// terminated without visiting one.
    pub node_id: &'a str,
    /// Tags of that node.
    pub tags: &'a [&'a str],
    /// Ids of every node visited by this advance, in visit order.
    pub visited: &'a [&'a str],
    /// Variables written by this advance, deduplicated in insertion
    /// order.
    pub changed_vars: &'a [&'a str],
    pub kind: StepKind<'a>,
}

/// Payload of a [`Step`].
#[derive(Debug)]
pub enum StepKind<'a> {
    /// The walk reached the terminate sentinel or ran past the section.
    End,
    Say(Say<'a>),
    Choice(Choice<'a>),
}

/// A line of dialog.
#[derive(Debug, Clone, Copy)]
pub struct Say<'a> {
    pub speaker_id: &'a str,
    pub fragments: Fragments<'a>,
}

/// A branching choice.
#[derive(Debug, Clone, Copy)]
pub struct Choice<'a> {
    slots: &'a [OptionSlot],
    frags: &'a [FragSlot<'a>],
    ctx: FragCtx<'a>,
}

impl<'a> Choice<'a> {
    /// Number of options. Zero is a valid choice.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the choice has no options.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// One option.
    pub fn get(&self, index: usize) -> Option<OptionView<'a>> {
        let slot = self.slots.get(index)?;
        Some(self.view(*slot))
    }

    /// All options in order.
    pub fn iter(self) -> impl Iterator<Item = OptionView<'a>> + 'a {
        self.slots.iter().map(move |slot| self.view(*slot))
    }

    fn view(&self, slot: OptionSlot) -> OptionView<'a> {
        OptionView {
            enabled: slot.enabled,
            fragments: Fragments {
                slots: &self.frags
                    [slot.frag_start as usize..(slot.frag_start + slot.frag_len) as usize],
                ctx: self.ctx,
            },
        }
    }
}

/// One option of a [`Choice`]. `enabled` reflects the option's condition
/// but does not stop a host from selecting it.
#[derive(Debug, Clone, Copy)]
pub struct OptionView<'a> {
    pub enabled: bool,
    pub fragments: Fragments<'a>,
}

/// The interpolated fragments of a say line or an option label.
#[derive(Debug, Clone, Copy)]
pub struct Fragments<'a> {
    slots: &'a [FragSlot<'a>],
    ctx: FragCtx<'a>,
}

impl<'a> Fragments<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// One fragment with its text resolved.
    pub fn get(&self, index: usize) -> Option<TextFragment<'a>> {
        self.slots.get(index).map(|slot| self.ctx.fragment(slot))
    }

    /// All fragments in order.
    pub fn iter(self) -> impl Iterator<Item = TextFragment<'a>> + 'a {
        self.slots.iter().map(move |slot| self.ctx.fragment(slot))
    }

    /// Concatenated fragment text. Allocates; rendering hosts that care
    /// about markup walk the fragments instead.
    pub fn to_text(self) -> String {
        self.iter().map(|f| f.text).collect()
    }
}

/// One interpolated fragment.
#[derive(Debug, Clone, Copy)]
pub struct TextFragment<'a> {
    pub text: &'a str,
    pub markup: &'a [Markup<'a>],
}

/// A resolved markup pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markup<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, Copy)]
struct FragCtx<'a> {
    interp: &'a [u8],
    markup: &'a [Markup<'a>],
    env: &'a EnvStore<'a>,
}

impl<'a> FragCtx<'a> {
    fn fragment(&self, slot: &FragSlot<'a>) -> TextFragment<'a> {
        let text = match slot.text {
            SlotText::Tree(s) => s,
            SlotText::Literal(s) => s,
            SlotText::Interp { off, len } => {
                let bytes = &self.interp[off as usize..(off + len) as usize];
                // The buffer only ever holds formatted numbers.
                std::str::from_utf8(bytes).unwrap_or("")
            }
            SlotText::EnvStr(idx) => self.env.str_at(idx),
        };
        TextFragment {
            text,
            markup: &self.markup
                [slot.markup_start as usize..(slot.markup_start + slot.markup_len) as usize],
        }
    }
}
