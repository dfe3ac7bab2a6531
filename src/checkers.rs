// Copyright 2024 Cornell University
// released under MIT License

use log::debug;
use rustc_hash::FxHashMap;

use crate::action::ActionInfo;
use crate::errors::{MoverCheckError, MoverResult};
use crate::ir::*;
use crate::ownership::OwnershipService;
use crate::subst::{Substituter, Substitution};
use crate::transition::TransitionRelation;

/// The three kinds of proof obligation generated for a pair of actions
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckerKind {
    /// `second; first` can be reordered into `first; second`
    Commutativity,
    /// running `second` does not invalidate the gate of `first`
    GatePreservation,
    /// running `second` does not make a failing `first` succeed
    FailurePreservation,
}

impl CheckerKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            CheckerKind::Commutativity => "CommutativityChecker",
            CheckerKind::GatePreservation => "GatePreservationChecker",
            CheckerKind::FailurePreservation => "FailurePreservationChecker",
        }
    }

    pub fn checker_name(&self, first: &ActionInfo, second: &ActionInfo) -> String {
        format!("{}_{}_{}", self.prefix(), first.name, second.name)
    }

    /// Synthesizes the checker procedure of this kind for `(first, second)`
    pub fn build(
        &self,
        program: &mut Program,
        ownership: &dyn OwnershipService,
        first: &ActionInfo,
        second: &ActionInfo,
    ) -> MoverResult<ProcId> {
        debug!("building {}", self.checker_name(first, second));
        match self {
            CheckerKind::Commutativity => commutativity_checker(program, ownership, first, second),
            CheckerKind::GatePreservation => {
                gate_preservation_checker(program, ownership, first, second)
            }
            CheckerKind::FailurePreservation => {
                failure_preservation_checker(program, ownership, first, second)
            }
        }
    }
}

/// One disjointness precondition per ownership domain that any of the
/// globals, `first`'s inputs or `second`'s shadow inputs belong to.
pub fn disjointness_requires(
    program: &mut Program,
    ownership: &dyn OwnershipService,
    first: &ActionInfo,
    second: &ActionInfo,
) -> Vec<ExprId> {
    let candidates: Vec<(VarId, VarId)> = program
        .global_variables()
        .chain(first.primary.ins.iter().copied())
        .map(|var| (var, var))
        .chain(
            second
                .primary
                .ins
                .iter()
                .copied()
                .zip(second.shadow.ins.iter().copied()),
        )
        .collect();

    let mut requires = vec![];
    for domain in ownership.domain_names() {
        // the domain is looked up on the primary variable
        let scope: Vec<VarId> = candidates
            .iter()
            .filter(|(primary, _)| ownership.find_domain(program, *primary) == Some(domain.as_str()))
            .map(|(_, var)| *var)
            .collect();
        if !scope.is_empty() {
            requires.push(ownership.disjointness_expr(program, domain, &scope));
        }
    }
    requires
}

/// Clones a CFG with successors remapped into the clone. Value returns
/// become a jump to `exit` when one is given, and a plain `return` otherwise.
pub fn clone_blocks(
    program: &mut Program,
    action_name: &str,
    blocks: &[BlockId],
    exit: Option<BlockId>,
) -> MoverResult<Vec<BlockId>> {
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut clones = Vec::with_capacity(blocks.len());
    for block_id in blocks {
        let block = program[*block_id].clone();
        let clone = program.add_block(&block.label, block.cmds, Transfer::Return);
        block_map.insert(*block_id, clone);
        clones.push(clone);
    }

    for (block_id, clone) in blocks.iter().zip(&clones) {
        let transfer = match program[*block_id].transfer.clone() {
            Transfer::ReturnExpr(_) => match exit {
                Some(exit) => Transfer::Goto(vec![exit]),
                None => Transfer::Return,
            },
            Transfer::Goto(targets) => Transfer::Goto(
                targets
                    .iter()
                    .map(|target| {
                        block_map
                            .get(target)
                            .copied()
                            .ok_or_else(|| MoverCheckError::ForeignTarget {
                                proc_name: action_name.to_string(),
                                label: program[*block_id].label.clone(),
                            })
                    })
                    .collect::<MoverResult<Vec<_>>>()?,
            ),
            Transfer::Return => Transfer::Return,
        };
        program[*clone].transfer = transfer;
    }
    Ok(clones)
}

fn inputs(first: &ActionInfo, second: &ActionInfo) -> Vec<VarId> {
    first
        .primary
        .ins
        .iter()
        .chain(&second.shadow.ins)
        .copied()
        .collect()
}

fn outputs(first: &ActionInfo, second: &ActionInfo) -> Vec<VarId> {
    first
        .primary
        .outs
        .iter()
        .chain(&second.shadow.outs)
        .copied()
        .collect()
}

fn add_checker(
    program: &mut Program,
    proc: Procedure,
    locals: Vec<VarId>,
    blocks: Vec<BlockId>,
) -> ProcId {
    let imp = Implementation {
        name: proc.name.clone(),
        proc: ProcId::default(),
        ins: proc.ins.clone(),
        outs: proc.outs.clone(),
        locals,
        blocks,
    };
    let proc = program.add_procedure(proc);
    program.add_implementation(Implementation { proc, ..imp });
    proc
}

/// Runs `first` and then `second`'s shadow copy and requires the final
/// state to be reachable by running them in the opposite order.
pub fn commutativity_checker(
    program: &mut Program,
    ownership: &dyn OwnershipService,
    first: &ActionInfo,
    second: &ActionInfo,
) -> MoverResult<ProcId> {
    let second_blocks = clone_blocks(program, &second.name, &second.shadow.blocks, None)?;
    let first_blocks = clone_blocks(
        program,
        &first.name,
        &first.primary.blocks,
        Some(second_blocks[0]),
    )?;

    let mut proc = Procedure::new(&CheckerKind::Commutativity.checker_name(first, second));
    proc.ins = inputs(first, second);
    proc.outs = outputs(first, second);
    proc.requires = disjointness_requires(program, ownership, first, second);
    let relation = TransitionRelation::sequenced(program, first, second).compute()?;
    proc.ensures.push(Ensures::new(Condition::Expr(relation)));

    let locals = first
        .primary
        .locals
        .iter()
        .chain(&second.shadow.locals)
        .copied()
        .collect();
    let blocks = first_blocks.into_iter().chain(second_blocks).collect();
    Ok(add_checker(program, proc, locals, blocks))
}

/// Assumes `first`'s gate, runs `second`'s shadow copy and requires the
/// gate to still hold.
pub fn gate_preservation_checker(
    program: &mut Program,
    ownership: &dyn OwnershipService,
    first: &ActionInfo,
    second: &ActionInfo,
) -> MoverResult<ProcId> {
    let blocks = clone_blocks(program, &second.name, &second.shadow.blocks, None)?;

    let mut proc = Procedure::new(&CheckerKind::GatePreservation.checker_name(first, second));
    proc.ins = inputs(first, second);
    proc.outs = outputs(first, second);
    proc.requires = disjointness_requires(program, ownership, first, second);
    for conjunct in &first.primary.gate {
        proc.requires.push(*conjunct);
        proc.ensures.push(Ensures::new(Condition::Expr(*conjunct)));
    }

    Ok(add_checker(
        program,
        proc,
        second.shadow.locals.clone(),
        blocks,
    ))
}

/// Assumes that `first`'s gate fails and that `second`'s gate holds, and
/// requires some run of `second` to end in a state where `first`'s gate
/// still fails. The body is empty; everything lives in the contract.
pub fn failure_preservation_checker(
    program: &mut Program,
    ownership: &dyn OwnershipService,
    first: &ActionInfo,
    second: &ActionInfo,
) -> MoverResult<ProcId> {
    let relation = TransitionRelation::new(program, second).compute()?;
    let first_gate = program.conjunction(&first.primary.gate);
    let gate_fails = program.not(first_gate);

    let mut proc = Procedure::new(&CheckerKind::FailurePreservation.checker_name(first, second));
    proc.ins = inputs(first, second);
    proc.requires = disjointness_requires(program, ownership, first, second);
    proc.requires.push(gate_fails);
    proc.requires.extend(second.shadow.gate.iter().copied());

    // post_ copies replace current values, pre_ copies replace prior values
    let mut post = Substitution::default();
    let mut pre = Substitution::default();
    let mut bound = vec![];
    let globals: Vec<VarId> = program.global_variables().collect();
    for var in globals {
        bind(program, var, Origin::Post, &mut post, &mut bound);
    }
    for var in &second.shadow.outs {
        bind(program, *var, Origin::Post, &mut post, &mut bound);
        bind(program, *var, Origin::Pre, &mut pre, &mut bound);
    }
    for var in &second.shadow.locals {
        bind(program, *var, Origin::Pre, &mut pre, &mut bound);
    }

    let mut condition = program.and(relation, gate_fails);
    if !bound.is_empty() {
        let body = Substituter::new(&post, &pre).apply(program, condition);
        condition = program.exists(bound, body);
    }
    proc.ensures.push(Ensures::new(Condition::Expr(condition)));

    let body = program.add_block("L", vec![], Transfer::Return);
    Ok(add_checker(program, proc, vec![], vec![body]))
}

fn bind(
    program: &mut Program,
    var: VarId,
    origin: Origin,
    subst: &mut Substitution,
    bound: &mut Vec<VarId>,
) {
    let bv = program.add_bound_like(var, origin);
    let reference = program.var(bv);
    subst.insert(var, reference);
    bound.push(bv);
}
