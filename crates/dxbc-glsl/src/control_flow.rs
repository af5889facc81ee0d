//! Pairs structured flow-control instructions and resolves subroutine labels.
//!
//! The scan keeps an explicit stack of open blocks, so nesting depth is
//! bounded by the bytecode rather than the host call stack.

use tracing::debug;

use crate::error::{ControlFlowError, ControlFlowErrorKind};
use crate::sm4::opcode::{Opcode, OpcodeClass};
use crate::sm4_ir::{Instruction, OperandArena, OperandType, Program};

/// One `label` and the instruction range of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelEntry {
    pub id: u32,
    /// Position of the `label` instruction itself.
    pub start: usize,
    /// Exclusive end of the body: the closing top-level `ret`, the next
    /// `label`, or the end of the stream.
    pub end: usize,
}

impl LabelEntry {
    pub fn body(&self) -> core::ops::Range<usize> {
        self.start + 1..self.end
    }
}

/// Labels in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    pub fn get(&self, id: u32) -> Option<&LabelEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of [`link_control_flow`]: a parallel array of partner positions
/// plus the label table.
///
/// `links[i]` is:
/// - for `if`/`else`: the next `else` or the `endif`;
/// - for `switch`/`case`/`default`: the next `case`/`default` or the `endswitch`;
/// - for `loop`: the `endloop`;
/// - for `endif`/`endloop`/`endswitch`: the opener;
/// - `None` for everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedControlFlow {
    pub links: Vec<Option<usize>>,
    pub labels: LabelTable,
    /// Exclusive end of the main body: the first top-level `ret` before any
    /// label, else the first label, else the stream length.
    pub main_end: usize,
    /// True when `main_end` points at a top-level `ret` (the natural end).
    pub main_has_ret: bool,
}

impl LinkedControlFlow {
    pub fn partner(&self, pos: usize) -> Option<usize> {
        self.links.get(pos).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Loop,
    Switch,
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    opener: usize,
    /// Latest link point: the `if`/`else` or `switch`/`case` waiting for its
    /// successor.
    last: usize,
    seen_else: bool,
}

/// Links the flow-control instructions of `instructions`.
pub fn link_control_flow(
    instructions: &[Instruction],
    operands: &OperandArena,
) -> Result<LinkedControlFlow, ControlFlowError> {
    let err = |inst_index, kind| ControlFlowError { inst_index, kind };

    let mut links = vec![None; instructions.len()];
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut labels: Vec<LabelEntry> = Vec::new();
    let mut open_label: Option<usize> = None;
    let mut main_end: Option<usize> = None;
    let mut main_has_ret = false;
    let mut calls: Vec<(usize, u32)> = Vec::new();

    for (pos, inst) in instructions.iter().enumerate() {
        let op = inst.opcode;
        match op {
            Opcode::If => stack.push(OpenBlock {
                kind: BlockKind::If,
                opener: pos,
                last: pos,
                seen_else: false,
            }),
            Opcode::Loop => stack.push(OpenBlock {
                kind: BlockKind::Loop,
                opener: pos,
                last: pos,
                seen_else: false,
            }),
            Opcode::Switch => stack.push(OpenBlock {
                kind: BlockKind::Switch,
                opener: pos,
                last: pos,
                seen_else: false,
            }),
            Opcode::Else => match stack.last_mut() {
                Some(top) if top.kind == BlockKind::If && !top.seen_else => {
                    links[top.last] = Some(pos);
                    top.last = pos;
                    top.seen_else = true;
                }
                _ => return Err(err(pos, ControlFlowErrorKind::MisplacedBranch(op))),
            },
            Opcode::Case | Opcode::Default => match stack.last_mut() {
                Some(top) if top.kind == BlockKind::Switch => {
                    links[top.last] = Some(pos);
                    top.last = pos;
                }
                _ => return Err(err(pos, ControlFlowErrorKind::MisplacedBranch(op))),
            },
            Opcode::EndIf | Opcode::EndLoop | Opcode::EndSwitch => {
                let want = match op {
                    Opcode::EndIf => BlockKind::If,
                    Opcode::EndLoop => BlockKind::Loop,
                    _ => BlockKind::Switch,
                };
                match stack.pop() {
                    Some(top) if top.kind == want => {
                        links[top.last] = Some(pos);
                        links[pos] = Some(top.opener);
                    }
                    _ => return Err(err(pos, ControlFlowErrorKind::UnmatchedClose(op))),
                }
            }
            Opcode::Break | Opcode::Breakc => {
                if !stack
                    .iter()
                    .any(|b| matches!(b.kind, BlockKind::Loop | BlockKind::Switch))
                {
                    return Err(err(pos, ControlFlowErrorKind::MisplacedBranch(op)));
                }
            }
            Opcode::Continue | Opcode::Continuec => {
                if !stack.iter().any(|b| b.kind == BlockKind::Loop) {
                    return Err(err(pos, ControlFlowErrorKind::MisplacedBranch(op)));
                }
            }
            Opcode::Label => {
                if !stack.is_empty() {
                    return Err(err(pos, ControlFlowErrorKind::LabelInsideBlock));
                }
                let id = label_id(inst, operands, 0).unwrap_or(u32::MAX);
                if labels.iter().any(|l| l.id == id) {
                    return Err(err(pos, ControlFlowErrorKind::DuplicateLabel(id)));
                }
                if let Some(open) = open_label.take() {
                    labels[open].end = pos;
                }
                if main_end.is_none() {
                    main_end = Some(pos);
                }
                labels.push(LabelEntry {
                    id,
                    start: pos,
                    end: instructions.len(),
                });
                open_label = Some(labels.len() - 1);
            }
            Opcode::Ret if stack.is_empty() => {
                if let Some(open) = open_label.take() {
                    labels[open].end = pos;
                } else if main_end.is_none() {
                    main_end = Some(pos);
                    main_has_ret = true;
                }
            }
            Opcode::Call => {
                if let Some(id) = label_id(inst, operands, 0) {
                    calls.push((pos, id));
                }
            }
            Opcode::Callc => {
                if let Some(id) = label_id(inst, operands, 1) {
                    calls.push((pos, id));
                }
            }
            _ if op.class() == OpcodeClass::PhaseMarker => {
                if let Some(top) = stack.last() {
                    let opener = instructions[top.opener].opcode;
                    return Err(err(top.opener, ControlFlowErrorKind::Unterminated(opener)));
                }
            }
            _ => {}
        }
    }

    if let Some(top) = stack.last() {
        let opener = instructions[top.opener].opcode;
        return Err(err(top.opener, ControlFlowErrorKind::Unterminated(opener)));
    }

    for (pos, id) in calls {
        if !labels.iter().any(|l| l.id == id) {
            return Err(err(pos, ControlFlowErrorKind::UnknownLabel(id)));
        }
    }

    let linked = LinkedControlFlow {
        links,
        labels: LabelTable { entries: labels },
        main_end: main_end.unwrap_or(instructions.len()),
        main_has_ret,
    };
    debug!(
        instructions = instructions.len(),
        labels = linked.labels.len(),
        main_end = linked.main_end,
        "linked control flow"
    );
    Ok(linked)
}

fn label_id(inst: &Instruction, operands: &OperandArena, slot: usize) -> Option<u32> {
    let id = *inst.operands().get(slot)?;
    let op = &operands[id];
    (op.ty == OperandType::Label).then(|| op.register()).flatten()
}

impl Program {
    /// Runs [`link_control_flow`] over the instruction list and stores the
    /// result on the program.
    pub fn link(&mut self) -> Result<&LinkedControlFlow, ControlFlowError> {
        let linked = link_control_flow(&self.instructions, &self.operands)?;
        Ok(self.control_flow.insert(linked))
    }
}
