// Copyright 2024 Cornell University
// released under MIT License

use cranelift_entity::entity_impl;
use log::debug;
use rustc_hash::FxHashMap;

use crate::errors::{MoverCheckError, MoverResult};
use crate::ir::*;
use crate::subst::{Substituter, Substitution};

/// Commutativity classification of an atomic action
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum MoverType {
    /// Atomic, but commutes with nothing
    Atomic,
    Right,
    Left,
    Both,
}

impl MoverType {
    /// Reads the mover tag of a postcondition. `atomic` wins over `right`,
    /// which wins over `left`, which wins over `both`. Returns `None` for
    /// postconditions that are not atomic-action specifications.
    pub fn from_attributes(ensures: &Ensures) -> Option<MoverType> {
        [
            ("atomic", MoverType::Atomic),
            ("right", MoverType::Right),
            ("left", MoverType::Left),
            ("both", MoverType::Both),
        ]
        .into_iter()
        .find(|(attribute, _)| ensures.has_attribute(attribute))
        .map(|(_, mover)| mover)
    }

    pub fn is_right_mover(&self) -> bool {
        matches!(self, MoverType::Right | MoverType::Both)
    }

    pub fn is_left_mover(&self) -> bool {
        matches!(self, MoverType::Left | MoverType::Both)
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ActionId(u32);
entity_impl!(ActionId, "action");

/// One copy of an action's state and control flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCopy {
    pub ins: Vec<VarId>,
    pub outs: Vec<VarId>,
    pub locals: Vec<VarId>,
    /// `blocks[0]` is the entry block
    pub blocks: Vec<BlockId>,
    /// Leading assertions of the entry block, one boolean expression each
    pub gate: Vec<ExprId>,
}

impl ActionCopy {
    pub fn entry(&self) -> BlockId {
        self.blocks[0]
    }
}

/// Everything the checker builders need to know about one atomic action.
/// The `primary` copy uses the procedure's own parameters and locals; the
/// `shadow` copy is a structurally identical duplicate over fresh variables
/// and blocks, so that two instances of actions can be reasoned about side
/// by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub proc: ProcId,
    pub name: String,
    pub mover: MoverType,
    pub primary: ActionCopy,
    pub shadow: ActionCopy,
}

impl ActionInfo {
    /// Builds the `ActionInfo` for `proc`, whose mover-tagged postcondition
    /// has `body` as its condition. `program` is the checker program; its
    /// copy of the entry block gets its gate converted into assumptions.
    pub fn new(
        program: &mut Program,
        proc: ProcId,
        body: &CodeExpr,
        mover: MoverType,
    ) -> MoverResult<Self> {
        let procedure = program[proc].clone();
        if !procedure.type_params.is_empty() {
            return Err(MoverCheckError::TypeParameters {
                proc_name: procedure.name,
            });
        }
        if body.blocks.is_empty() {
            return Err(MoverCheckError::EmptyAction {
                proc_name: procedure.name,
            });
        }

        let gate = extract_gate(program, body.blocks[0]);
        debug!(
            "action {} ({:?}) has {} gate conjunct(s)",
            procedure.name,
            mover,
            gate.len()
        );

        let mut subst = Substitution::default();
        let shadow_ins = shadow_vars(program, &procedure.ins, &mut subst);
        let shadow_outs = shadow_vars(program, &procedure.outs, &mut subst);
        let shadow_locals = shadow_vars(program, &body.locals, &mut subst);

        let substituter = Substituter::uniform(&subst);
        let shadow_gate = gate
            .iter()
            .map(|expr| substituter.apply(program, *expr))
            .collect();
        let shadow_blocks = shadow_blocks(program, &procedure.name, &body.blocks, &substituter)?;

        Ok(Self {
            proc,
            name: procedure.name,
            mover,
            primary: ActionCopy {
                ins: procedure.ins,
                outs: procedure.outs,
                locals: body.locals.clone(),
                blocks: body.blocks.clone(),
                gate,
            },
            shadow: ActionCopy {
                ins: shadow_ins,
                outs: shadow_outs,
                locals: shadow_locals,
                blocks: shadow_blocks,
                gate: shadow_gate,
            },
        })
    }

    pub fn is_right_mover(&self) -> bool {
        self.mover.is_right_mover()
    }

    pub fn is_left_mover(&self) -> bool {
        self.mover.is_left_mover()
    }
}

/// Turns the maximal prefix of assertions of `entry` into assumptions and
/// returns the asserted expressions.
fn extract_gate(program: &mut Program, entry: BlockId) -> Vec<ExprId> {
    let mut gate = vec![];
    for cmd in program[entry].cmds.iter_mut() {
        let Cmd::Assert(expr) = *cmd else {
            break;
        };
        gate.push(expr);
        *cmd = Cmd::Assume(expr);
    }
    gate
}

fn shadow_vars(program: &mut Program, vars: &[VarId], subst: &mut Substitution) -> Vec<VarId> {
    vars.iter()
        .map(|var| {
            let shadow = program.add_var(program[*var].shadow());
            let reference = program.var(shadow);
            subst.insert(*var, reference);
            shadow
        })
        .collect()
}

/// Clones `blocks` with every command substituted and every successor
/// pointing into the clone. Value returns become `return true`.
fn shadow_blocks(
    program: &mut Program,
    proc_name: &str,
    blocks: &[BlockId],
    substituter: &Substituter,
) -> MoverResult<Vec<BlockId>> {
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut shadows = Vec::with_capacity(blocks.len());
    for block_id in blocks {
        let block = program[*block_id].clone();
        let cmds = block
            .cmds
            .iter()
            .map(|cmd| substituter.apply_cmd(program, cmd))
            .collect();
        let label = format!("{}{}", Origin::Shadow.prefix(), block.label);
        let shadow = program.add_block(&label, cmds, Transfer::Return);
        block_map.insert(*block_id, shadow);
        shadows.push(shadow);
    }

    for (block_id, shadow) in blocks.iter().zip(&shadows) {
        let transfer = match program[*block_id].transfer.clone() {
            Transfer::ReturnExpr(_) => Transfer::ReturnExpr(program.tt()),
            Transfer::Goto(targets) => {
                let targets = targets
                    .iter()
                    .map(|target| {
                        block_map.get(target).copied().ok_or_else(|| {
                            MoverCheckError::ForeignTarget {
                                proc_name: proc_name.to_string(),
                                label: program[*block_id].label.clone(),
                            }
                        })
                    })
                    .collect::<MoverResult<Vec<_>>>()?;
                Transfer::Goto(targets)
            }
            Transfer::Return => Transfer::Return,
        };
        program[*shadow].transfer = transfer;
    }
    Ok(shadows)
}
