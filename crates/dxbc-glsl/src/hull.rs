//! Splits a hull-shader program into its control-point, fork and join
//! phases.
//!
//! `hs_decls` and the declarations that precede the first phase marker are
//! shared by every phase. Each marker opens a phase that owns the
//! declarations and instructions up to the next marker.

use core::ops::Range;

use tracing::debug;

use crate::error::TranslateError;
use crate::sm4::opcode::Opcode;
use crate::sm4_ir::{DeclKind, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    ControlPoint,
    Fork,
    Join,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HullPhase {
    pub kind: PhaseKind,
    /// Instruction range of the phase body, the marker excluded.
    pub instructions: Range<usize>,
    /// Indices into [`Program::declarations`].
    pub declarations: Vec<usize>,
    /// `dcl_hs_fork_phase_instance_count` / `dcl_hs_join_phase_instance_count`;
    /// 1 for the control-point phase.
    pub instance_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HullPhases {
    pub shared_declarations: Vec<usize>,
    pub control_point: Option<HullPhase>,
    pub forks: Vec<HullPhase>,
    pub joins: Vec<HullPhase>,
}

impl HullPhases {
    pub fn iter(&self) -> impl Iterator<Item = &HullPhase> {
        self.control_point
            .iter()
            .chain(self.forks.iter())
            .chain(self.joins.iter())
    }
}

fn phase_kind(op: Opcode) -> Option<PhaseKind> {
    match op {
        Opcode::HsControlPointPhase => Some(PhaseKind::ControlPoint),
        Opcode::HsForkPhase => Some(PhaseKind::Fork),
        Opcode::HsJoinPhase => Some(PhaseKind::Join),
        _ => None,
    }
}

/// Partitions `program` into phases. A program without any marker is
/// treated as a single control-point phase.
pub fn split_hull_phases(program: &Program) -> Result<HullPhases, TranslateError> {
    let markers: Vec<(usize, PhaseKind)> = program
        .instructions
        .iter()
        .enumerate()
        .filter_map(|(i, inst)| phase_kind(inst.opcode).map(|k| (i, k)))
        .collect();

    let mut phases = HullPhases::default();

    let Some(&(first, _)) = markers.first() else {
        phases.shared_declarations = (0..program.declarations.len()).collect();
        phases.control_point = Some(HullPhase {
            kind: PhaseKind::ControlPoint,
            instructions: 0..program.instructions.len(),
            declarations: Vec::new(),
            instance_count: 1,
        });
        return Ok(phases);
    };

    if let Some((pos, inst)) = program
        .instructions
        .iter()
        .enumerate()
        .take(first)
        .find(|(_, inst)| inst.opcode != Opcode::Nop)
    {
        return Err(TranslateError::UnsupportedInstruction {
            inst_index: pos,
            opcode: inst.opcode,
            reason: "instruction outside of any hull-shader phase".into(),
        });
    }

    phases.shared_declarations = program
        .declarations
        .iter()
        .enumerate()
        .filter(|(_, d)| d.inst_pos <= first)
        .map(|(i, _)| i)
        .collect();

    for (n, &(marker, kind)) in markers.iter().enumerate() {
        let end = markers
            .get(n + 1)
            .map_or(program.instructions.len(), |&(next, _)| next);
        let declarations: Vec<usize> = program
            .declarations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.inst_pos > marker && d.inst_pos <= end)
            .map(|(i, _)| i)
            .collect();
        let instance_count = declarations
            .iter()
            .find_map(|&i| match program.declarations[i].kind {
                DeclKind::HsForkPhaseInstanceCount(n) | DeclKind::HsJoinPhaseInstanceCount(n) => {
                    Some(n)
                }
                _ => None,
            })
            .unwrap_or(1);
        let phase = HullPhase {
            kind,
            instructions: marker + 1..end,
            declarations,
            instance_count,
        };
        match kind {
            PhaseKind::ControlPoint => {
                if phases.control_point.is_some() {
                    return Err(TranslateError::UnsupportedInstruction {
                        inst_index: marker,
                        opcode: Opcode::HsControlPointPhase,
                        reason: "more than one control-point phase".into(),
                    });
                }
                phases.control_point = Some(phase);
            }
            PhaseKind::Fork => phases.forks.push(phase),
            PhaseKind::Join => phases.joins.push(phase),
        }
    }

    debug!(
        control_point = phases.control_point.is_some(),
        forks = phases.forks.len(),
        joins = phases.joins.len(),
        "split hull-shader phases"
    );
    Ok(phases)
}
