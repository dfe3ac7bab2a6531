// Copyright 2024 Cornell University
// released under MIT License

use std::fs::File;
use std::io::{BufWriter, Write};

use cranelift_entity::PrimaryMap;
use itertools::Itertools;
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::action::{ActionId, ActionInfo, MoverType};
use crate::checkers::CheckerKind;
use crate::diagnostic::{DiagnosticHandler, Level};
use crate::errors::{MoverCheckError, MoverResult};
use crate::ir::*;
use crate::options::MoverCheckOptions;
use crate::ownership::OwnershipService;
use crate::serialize::serialize;

/// Builds the checker program for one input program: discovers the atomic
/// actions and synthesizes every obligation their mover types call for.
pub struct MoverChecker<'a> {
    ownership: &'a dyn OwnershipService,
    /// the checker program under construction
    program: Program,
    actions: PrimaryMap<ActionId, ActionInfo>,
    checkers: FxHashMap<(CheckerKind, ActionId, ActionId), ProcId>,
}

impl<'a> MoverChecker<'a> {
    pub fn new(input: &Program, ownership: &'a dyn OwnershipService) -> Self {
        Self {
            ownership,
            program: input.checker_base(),
            actions: PrimaryMap::new(),
            checkers: FxHashMap::default(),
        }
    }

    /// Registers an `ActionInfo` for every mover-tagged postcondition of
    /// `input`. Tagged postconditions that are not code expressions are
    /// reported and skipped; a second tagged postcondition on the same
    /// procedure is an error.
    pub fn collect_actions(
        &mut self,
        input: &Program,
        handler: &mut DiagnosticHandler,
    ) -> MoverResult<()> {
        for proc in input.procedures() {
            let mut tagged = false;
            for ensures in &input[proc].ensures {
                let Some(mover) = MoverType::from_attributes(ensures) else {
                    continue;
                };
                if tagged {
                    return Err(MoverCheckError::MultipleActions {
                        proc_name: input[proc].name.clone(),
                    });
                }
                tagged = true;
                match &ensures.condition {
                    Condition::Code(body) => {
                        let action = ActionInfo::new(&mut self.program, proc, body, mover)?;
                        self.actions.push(action);
                    }
                    Condition::Expr(_) => {
                        let message =
                            "mover annotation on a postcondition that is not a code expression is ignored";
                        warn!("{}: {}", input[proc].name, message);
                        handler.emit_diagnostic_proc(&input[proc].name, message, Level::Warning);
                    }
                }
            }
        }
        info!("found {} atomic action(s)", self.actions.len());
        Ok(())
    }

    pub fn actions(&self) -> impl Iterator<Item = (ActionId, &ActionInfo)> + '_ {
        self.actions.iter()
    }

    pub fn action(&self, id: ActionId) -> &ActionInfo {
        &self.actions[id]
    }

    /// The checker of the given kind for `(first, second)`, synthesizing it
    /// on first request
    pub fn require(
        &mut self,
        kind: CheckerKind,
        first: ActionId,
        second: ActionId,
    ) -> MoverResult<ProcId> {
        if let Some(proc) = self.checkers.get(&(kind, first, second)) {
            return Ok(*proc);
        }
        let proc = kind.build(
            &mut self.program,
            self.ownership,
            &self.actions[first],
            &self.actions[second],
        )?;
        self.checkers.insert((kind, first, second), proc);
        Ok(proc)
    }

    /// The checker of the given kind for `(first, second)`, if it was built
    pub fn checker(&self, kind: CheckerKind, first: ActionId, second: ActionId) -> Option<ProcId> {
        self.checkers.get(&(kind, first, second)).copied()
    }

    pub fn num_checkers(&self) -> usize {
        self.checkers.len()
    }

    /// Requests the obligations for every ordered pair of actions:
    /// a right mover `first` must commute to the right of `second` and must
    /// not break `second`'s gate; a left mover `first` must commute to the
    /// left of `second`, keep its own gate under `second` and keep `second`
    /// failing.
    pub fn add_all_checkers(&mut self) -> MoverResult<()> {
        let ids: Vec<ActionId> = self.actions.keys().collect();
        for first in ids.iter().copied() {
            let mover = self.actions[first].mover;
            if mover == MoverType::Atomic {
                continue;
            }
            for second in ids.iter().copied() {
                if mover.is_right_mover() {
                    self.require(CheckerKind::Commutativity, first, second)?;
                    self.require(CheckerKind::GatePreservation, second, first)?;
                }
                if mover.is_left_mover() {
                    self.require(CheckerKind::Commutativity, second, first)?;
                    self.require(CheckerKind::GatePreservation, first, second)?;
                    self.require(CheckerKind::FailurePreservation, second, first)?;
                }
            }
        }
        info!("generated {} mover checker(s)", self.checkers.len());
        Ok(())
    }

    /// Finishes the checker program, erasing ownership ghost state
    pub fn into_program(self) -> Program {
        let mut program = self.program;
        self.ownership.erase(&mut program);
        program
    }
}

/// Builds the checker program for `input`. Returns `None` when the input
/// has no atomic actions, in which case there is nothing to check.
pub fn add_checkers(
    input: &Program,
    ownership: &dyn OwnershipService,
    handler: &mut DiagnosticHandler,
) -> MoverResult<Option<Program>> {
    let mut checker = MoverChecker::new(input, ownership);
    checker.collect_actions(input, handler)?;
    if checker.actions.is_empty() {
        info!("no atomic actions, skipping mover checks");
        return Ok(None);
    }
    checker.add_all_checkers()?;
    Ok(Some(checker.into_program()))
}

fn banner() -> String {
    format!(
        "// {} version {}\n// {}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::args().join(" ")
    )
}

/// Runs mover checking on `input` and writes the checker program to the
/// configured output file. Returns whether a file was written. Errors are
/// reported through `handler` before being returned.
pub fn run(
    input: &Program,
    ownership: &dyn OwnershipService,
    handler: &mut DiagnosticHandler,
    options: &MoverCheckOptions,
) -> MoverResult<bool> {
    let result = add_checkers(input, ownership, handler).and_then(|program| match program {
        None => Ok(false),
        Some(program) => {
            let mut out = BufWriter::new(File::create(&options.output)?);
            if options.show_env {
                write!(out, "{}", banner())?;
            }
            writeln!(out)?;
            serialize(&mut out, &program)?;
            out.flush()?;
            info!("wrote mover checks to {}", options.output.display());
            Ok(true)
        }
    });
    if let Err(err) = &result {
        handler.emit_general_message(&err.to_string(), Level::Error);
    }
    result
}
