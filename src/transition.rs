// Copyright 2024 Cornell University
// released under MIT License

use log::trace;

use crate::action::ActionInfo;
use crate::errors::{MoverCheckError, MoverResult};
use crate::ir::*;
use crate::subst::{Substituter, Substitution};

/// Symbolic execution of one action (`second`'s shadow copy), optionally
/// followed by another (`first`'s primary copy), producing a formula over
/// `old(..)` (prior) and current values of the globals and out-parameters.
/// The formula holds iff some completing execution relates the two states.
///
/// Path conditions are built backwards: starting from "nothing changed",
/// every block on the DFS stack is visited from the last executed one to the
/// entry, and within a block from the last command to the first.
pub struct TransitionRelation<'a> {
    program: &'a mut Program,
    first: Option<&'a ActionInfo>,
    second: &'a ActionInfo,
    dfs_stack: Vec<BlockId>,
    relation: ExprId,
}

impl<'a> TransitionRelation<'a> {
    /// Transition relation of `second` alone
    pub fn new(program: &'a mut Program, second: &'a ActionInfo) -> Self {
        Self::build(program, None, second)
    }

    /// Transition relation of `second` followed by `first`
    pub fn sequenced(
        program: &'a mut Program,
        first: &'a ActionInfo,
        second: &'a ActionInfo,
    ) -> Self {
        Self::build(program, Some(first), second)
    }

    fn build(program: &'a mut Program, first: Option<&'a ActionInfo>, second: &'a ActionInfo) -> Self {
        let relation = program.ff();
        Self {
            program,
            first,
            second,
            dfs_stack: vec![],
            relation,
        }
    }

    pub fn compute(mut self) -> MoverResult<ExprId> {
        let entry = self.second.shadow.entry();
        self.search(entry, false)?;

        let mut subst = Substitution::default();
        let mut bound = vec![];
        let first_locals = self.first.map(|first| first.primary.locals.as_slice());
        for local in first_locals
            .unwrap_or_default()
            .iter()
            .chain(&self.second.shadow.locals)
        {
            let origin = self.program[*local].origin();
            let bv = self.program.add_bound_like(*local, origin);
            let reference = self.program.var(bv);
            subst.insert(*local, reference);
            bound.push(bv);
        }

        if bound.is_empty() {
            return Ok(self.relation);
        }
        let body = Substituter::uniform(&subst).apply(self.program, self.relation);
        Ok(self.program.exists(bound, body))
    }

    fn search(&mut self, block_id: BlockId, in_first: bool) -> MoverResult<()> {
        if self.dfs_stack.contains(&block_id) {
            return Err(MoverCheckError::CyclicAction {
                label: self.program[block_id].label.clone(),
            });
        }
        self.dfs_stack.push(block_id);
        let first = self.first;
        match self.program[block_id].transfer.clone() {
            Transfer::ReturnExpr(_) => match first {
                Some(first) if !in_first => self.search(first.primary.entry(), true)?,
                _ => {
                    let path_condition = self.path_condition()?;
                    self.relation = self.program.or(self.relation, path_condition);
                }
            },
            Transfer::Goto(targets) => {
                for target in targets {
                    self.search(target, in_first)?;
                }
            }
            Transfer::Return => {
                return Err(MoverCheckError::UnrecognizedTransfer {
                    label: self.program[block_id].label.clone(),
                });
            }
        }
        self.dfs_stack.pop();
        Ok(())
    }

    /// Globals and out-parameters that keep their value unless assigned
    fn frame(&self) -> Vec<VarId> {
        let first_outs = self.first.map(|first| first.primary.outs.as_slice());
        self.program
            .global_variables()
            .chain(first_outs.unwrap_or_default().iter().copied())
            .chain(self.second.shadow.outs.iter().copied())
            .collect()
    }

    fn path_condition(&mut self) -> MoverResult<ExprId> {
        let mut condition = self.program.tt();
        for var in self.frame() {
            let current = self.program.var(var);
            let prior = self.program.var(var);
            let prior = self.program.old(prior);
            let unchanged = self.program.eq(current, prior);
            condition = self.program.and(unchanged, condition);
        }

        let no_subst = Substitution::default();
        for block_id in self.dfs_stack.clone().into_iter().rev() {
            let block = self.program[block_id].clone();
            for cmd in block.cmds.iter().rev() {
                match cmd {
                    Cmd::Assume(expr) => {
                        let assumption = self.program.old(*expr);
                        condition = self.program.and(assumption, condition);
                    }
                    Cmd::Assign(pairs) => {
                        let assignment: Substitution = pairs.iter().copied().collect();
                        condition = Substituter::new(&no_subst, &assignment)
                            .apply(self.program, condition);
                    }
                    Cmd::Assert(_) => {
                        return Err(MoverCheckError::UnsupportedCommand {
                            label: block.label,
                            kind: cmd.kind_name(),
                        });
                    }
                }
            }
        }
        trace!("path of {} block(s) closed", self.dfs_stack.len());
        Ok(condition)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::action::MoverType;
    use crate::ir::tests::{build_branching_program, build_incr_decr_program};
    use rustc_hash::FxHashMap;

    /// Derives the checker program of `input` together with the actions of
    /// all of its procedures (first postcondition each)
    pub(crate) fn checker_with_actions(input: &Program) -> (Program, Vec<ActionInfo>) {
        let mut program = input.checker_base();
        let infos = input
            .procedures()
            .map(|proc| {
                let ensures = input[proc].ensures[0].clone();
                let mover = MoverType::from_attributes(&ensures).unwrap();
                let Condition::Code(body) = ensures.condition else {
                    panic!("expected a code expression");
                };
                ActionInfo::new(&mut program, proc, &body, mover).unwrap()
            })
            .collect();
        (program, infos)
    }

    /// Values of integer/boolean formulas over a prior and a current state
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Value {
        Int(i64),
        Bool(bool),
    }

    impl Value {
        fn int(self) -> i64 {
            match self {
                Value::Int(i) => i,
                Value::Bool(_) => panic!("expected an integer"),
            }
        }

        fn bool(self) -> bool {
            match self {
                Value::Bool(b) => b,
                Value::Int(_) => panic!("expected a boolean"),
            }
        }
    }

    /// Evaluates quantifier-free formulas; `old(..)` reads from `prior`
    pub(crate) fn eval(
        program: &Program,
        expr: ExprId,
        prior: &FxHashMap<VarId, Value>,
        current: &FxHashMap<VarId, Value>,
        in_old: bool,
    ) -> Value {
        match &program[expr] {
            Expr::Const(Literal::Bool(b)) => Value::Bool(*b),
            Expr::Const(Literal::Int(i)) => Value::Int(*i),
            Expr::Var(v) => {
                let state = if in_old { prior } else { current };
                state[v]
            }
            Expr::Old(inner) => eval(program, *inner, prior, current, true),
            Expr::Unary(UnaryOp::Not, inner) => {
                Value::Bool(!eval(program, *inner, prior, current, in_old).bool())
            }
            Expr::Unary(UnaryOp::Neg, inner) => {
                Value::Int(-eval(program, *inner, prior, current, in_old).int())
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = eval(program, *lhs, prior, current, in_old);
                let r = eval(program, *rhs, prior, current, in_old);
                match op {
                    BinOp::And => Value::Bool(l.bool() && r.bool()),
                    BinOp::Or => Value::Bool(l.bool() || r.bool()),
                    BinOp::Implies => Value::Bool(!l.bool() || r.bool()),
                    BinOp::Iff => Value::Bool(l.bool() == r.bool()),
                    BinOp::Eq => Value::Bool(l == r),
                    BinOp::Neq => Value::Bool(l != r),
                    BinOp::Lt => Value::Bool(l.int() < r.int()),
                    BinOp::Le => Value::Bool(l.int() <= r.int()),
                    BinOp::Gt => Value::Bool(l.int() > r.int()),
                    BinOp::Ge => Value::Bool(l.int() >= r.int()),
                    BinOp::Add => Value::Int(l.int() + r.int()),
                    BinOp::Sub => Value::Int(l.int() - r.int()),
                    BinOp::Mul => Value::Int(l.int() * r.int()),
                    BinOp::Div => Value::Int(l.int() / r.int()),
                    BinOp::Mod => Value::Int(l.int() % r.int()),
                }
            }
            other => panic!("cannot evaluate {other:?}"),
        }
    }

    fn x_states(x: VarId, pre: i64, post: i64) -> (FxHashMap<VarId, Value>, FxHashMap<VarId, Value>) {
        (
            [(x, Value::Int(pre))].into_iter().collect(),
            [(x, Value::Int(post))].into_iter().collect(),
        )
    }

    #[test]
    fn single_action_relation() {
        let (mut program, infos) = checker_with_actions(&build_incr_decr_program());
        let x = program.lookup("x").unwrap();
        let decr = &infos[1];

        let relation = TransitionRelation::new(&mut program, decr).compute().unwrap();
        for pre in -2..4 {
            for post in -3..4 {
                let (prior, current) = x_states(x, pre, post);
                let expected = pre > 0 && post == pre - 1;
                assert_eq!(
                    eval(&program, relation, &prior, &current, false),
                    Value::Bool(expected),
                    "pre = {pre}, post = {post}"
                );
            }
        }
    }

    #[test]
    fn sequenced_relation_runs_second_then_first() {
        let (mut program, infos) = checker_with_actions(&build_incr_decr_program());
        let x = program.lookup("x").unwrap();
        let (incr, decr) = (&infos[0], &infos[1]);

        // Decr runs first (as `second`), then Incr: x is unchanged overall,
        // provided Decr's gate held initially
        let relation = TransitionRelation::sequenced(&mut program, incr, decr)
            .compute()
            .unwrap();
        for pre in -2..4 {
            for post in -3..5 {
                let (prior, current) = x_states(x, pre, post);
                let expected = pre > 0 && post == pre;
                assert_eq!(
                    eval(&program, relation, &prior, &current, false),
                    Value::Bool(expected),
                    "pre = {pre}, post = {post}"
                );
            }
        }
    }

    #[test]
    fn locals_are_existentially_bound() {
        let (mut program, infos) = checker_with_actions(&build_branching_program());
        let take = &infos[0];

        let relation = TransitionRelation::new(&mut program, take).compute().unwrap();
        let Expr::Quantifier(Quant::Exists, bound, _) = program[relation].clone() else {
            panic!("expected an existential");
        };
        assert_eq!(bound.len(), 1);
        assert_eq!(program[bound[0]].kind(), VarKind::Bound);
        assert_eq!(program[bound[0]].name(), "t");
    }

    #[test]
    fn every_path_is_disjoined() {
        let (mut program, infos) = checker_with_actions(&build_branching_program());
        let take = &infos[0];

        let relation = TransitionRelation::new(&mut program, take).compute().unwrap();
        let Expr::Quantifier(_, _, body) = program[relation].clone() else {
            panic!("expected an existential");
        };
        // false || path(Pos) || path(Neg)
        let Expr::Binary(BinOp::Or, rest, _) = program[body].clone() else {
            panic!("expected a disjunction");
        };
        let Expr::Binary(BinOp::Or, start, _) = program[rest].clone() else {
            panic!("expected a disjunction");
        };
        assert_eq!(program[start], Expr::Const(Literal::Bool(false)));
    }

    /// Structural equality of `a` and `b` where the bound variables of `a`
    /// may be renamed to those of `b`
    fn equal_up_to_bound_names(
        program: &Program,
        a: ExprId,
        b: ExprId,
        renaming: &mut FxHashMap<VarId, VarId>,
    ) -> bool {
        match (program[a].clone(), program[b].clone()) {
            (Expr::Const(x), Expr::Const(y)) => x == y,
            (Expr::Var(x), Expr::Var(y)) => renaming.get(&x).copied().unwrap_or(x) == y,
            (Expr::Old(x), Expr::Old(y)) => equal_up_to_bound_names(program, x, y, renaming),
            (Expr::Unary(op1, x), Expr::Unary(op2, y)) => {
                op1 == op2 && equal_up_to_bound_names(program, x, y, renaming)
            }
            (Expr::Binary(op1, l1, r1), Expr::Binary(op2, l2, r2)) => {
                op1 == op2
                    && equal_up_to_bound_names(program, l1, l2, renaming)
                    && equal_up_to_bound_names(program, r1, r2, renaming)
            }
            (Expr::Call(f1, args1), Expr::Call(f2, args2)) => {
                f1 == f2
                    && args1.len() == args2.len()
                    && args1
                        .iter()
                        .zip(&args2)
                        .all(|(x, y)| equal_up_to_bound_names(program, *x, *y, renaming))
            }
            (Expr::Quantifier(q1, b1, e1), Expr::Quantifier(q2, b2, e2)) => {
                if q1 != q2 || b1.len() != b2.len() {
                    return false;
                }
                renaming.extend(b1.iter().copied().zip(b2.iter().copied()));
                equal_up_to_bound_names(program, e1, e2, renaming)
            }
            _ => false,
        }
    }

    #[test]
    fn shadow_relation_maps_back_to_primary_relation() {
        let (mut program, infos) = checker_with_actions(&build_branching_program());
        let take = infos[0].clone();
        let shadow_relation = TransitionRelation::new(&mut program, &take).compute().unwrap();

        // the same action executed over its own parameters and locals
        let own = ActionInfo {
            shadow: take.primary.clone(),
            ..take.clone()
        };
        let own_relation = TransitionRelation::new(&mut program, &own).compute().unwrap();
        assert!(!equal_up_to_bound_names(
            &program,
            shadow_relation,
            own_relation,
            &mut FxHashMap::default()
        ));

        let mut back = Substitution::default();
        for (primary, shadow) in [
            (&take.primary.ins, &take.shadow.ins),
            (&take.primary.outs, &take.shadow.outs),
            (&take.primary.locals, &take.shadow.locals),
        ] {
            for (p, s) in primary.iter().zip(shadow) {
                let reference = program.var(*p);
                back.insert(*s, reference);
            }
        }
        let restored = Substituter::uniform(&back).apply(&mut program, shadow_relation);
        assert!(equal_up_to_bound_names(
            &program,
            restored,
            own_relation,
            &mut FxHashMap::default()
        ));
    }

    #[test]
    fn leftover_assertion_is_fatal() {
        let mut program = build_incr_decr_program();
        let incr = program.find_procedure("Incr").unwrap();
        let Condition::Code(body) = program[incr].ensures[0].condition.clone() else {
            panic!("expected a code expression");
        };
        let tt = program.tt();
        program[body.blocks[0]].cmds.push(Cmd::Assert(tt));
        let info = ActionInfo::new(&mut program, incr, &body, MoverType::Right).unwrap();

        let result = TransitionRelation::new(&mut program, &info).compute();
        assert!(matches!(
            result,
            Err(MoverCheckError::UnsupportedCommand { kind: "assert", .. })
        ));
    }

    #[test]
    fn plain_return_is_fatal() {
        let mut program = build_incr_decr_program();
        let incr = program.find_procedure("Incr").unwrap();
        let Condition::Code(body) = program[incr].ensures[0].condition.clone() else {
            panic!("expected a code expression");
        };
        program[body.blocks[0]].transfer = Transfer::Return;
        let info = ActionInfo::new(&mut program, incr, &body, MoverType::Right).unwrap();

        let result = TransitionRelation::new(&mut program, &info).compute();
        assert!(matches!(
            result,
            Err(MoverCheckError::UnrecognizedTransfer { .. })
        ));
    }

    #[test]
    fn cycles_are_fatal() {
        let mut program = build_incr_decr_program();
        let incr = program.find_procedure("Incr").unwrap();
        let Condition::Code(body) = program[incr].ensures[0].condition.clone() else {
            panic!("expected a code expression");
        };
        program[body.blocks[0]].transfer = Transfer::Goto(vec![body.blocks[0]]);
        let info = ActionInfo::new(&mut program, incr, &body, MoverType::Right).unwrap();

        let result = TransitionRelation::new(&mut program, &info).compute();
        assert!(matches!(result, Err(MoverCheckError::CyclicAction { .. })));
    }
}
