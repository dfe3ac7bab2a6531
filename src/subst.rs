// Copyright 2024 Cornell University
// released under MIT License

use rustc_hash::FxHashMap;

use crate::ir::*;

/// Maps variables to the expression that should replace them
pub type Substitution = FxHashMap<VarId, ExprId>;

/// Whether a variable reference is evaluated in the current state or, being
/// underneath an `old(..)`, in the prior state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    Current,
    Prior,
}

/// Rewrites variable references using one substitution outside of `old(..)`
/// and another one inside of it. Variables without a mapping are left
/// untouched, and subtrees in which nothing changes are shared with the
/// input instead of being copied.
pub struct Substituter<'a> {
    outside_old: &'a Substitution,
    inside_old: &'a Substitution,
}

impl<'a> Substituter<'a> {
    pub fn new(outside_old: &'a Substitution, inside_old: &'a Substitution) -> Self {
        Self {
            outside_old,
            inside_old,
        }
    }

    /// The same substitution regardless of `old(..)`
    pub fn uniform(subst: &'a Substitution) -> Self {
        Self::new(subst, subst)
    }

    pub fn apply(&self, program: &mut Program, expr: ExprId) -> ExprId {
        self.visit(program, expr, StateMode::Current)
    }

    fn visit(&self, program: &mut Program, expr_id: ExprId, mode: StateMode) -> ExprId {
        let rewritten = match program[expr_id].clone() {
            Expr::Const(_) => return expr_id,
            Expr::Var(var) => {
                let subst = match mode {
                    StateMode::Current => self.outside_old,
                    StateMode::Prior => self.inside_old,
                };
                return subst.get(&var).copied().unwrap_or(expr_id);
            }
            Expr::Old(inner) => {
                let new_inner = self.visit(program, inner, StateMode::Prior);
                if new_inner == inner {
                    return expr_id;
                }
                Expr::Old(new_inner)
            }
            Expr::Unary(op, inner) => {
                let new_inner = self.visit(program, inner, mode);
                if new_inner == inner {
                    return expr_id;
                }
                Expr::Unary(op, new_inner)
            }
            Expr::Binary(op, lhs, rhs) => {
                let new_lhs = self.visit(program, lhs, mode);
                let new_rhs = self.visit(program, rhs, mode);
                if new_lhs == lhs && new_rhs == rhs {
                    return expr_id;
                }
                Expr::Binary(op, new_lhs, new_rhs)
            }
            Expr::Call(func, args) => {
                let new_args: Vec<ExprId> = args
                    .iter()
                    .map(|arg| self.visit(program, *arg, mode))
                    .collect();
                if new_args == args {
                    return expr_id;
                }
                Expr::Call(func, new_args)
            }
            Expr::Quantifier(quant, bound, body) => {
                let new_body = self.visit(program, body, mode);
                if new_body == body {
                    return expr_id;
                }
                Expr::Quantifier(quant, bound, new_body)
            }
        };
        program.e(rewritten)
    }

    /// Substitutes into a command. An assignment target is renamed when the
    /// current-state substitution maps it to another variable.
    pub fn apply_cmd(&self, program: &mut Program, cmd: &Cmd) -> Cmd {
        match cmd {
            Cmd::Assert(expr) => Cmd::Assert(self.apply(program, *expr)),
            Cmd::Assume(expr) => Cmd::Assume(self.apply(program, *expr)),
            Cmd::Assign(pairs) => Cmd::Assign(
                pairs
                    .iter()
                    .map(|(lhs, rhs)| (self.rename(program, *lhs), self.apply(program, *rhs)))
                    .collect(),
            ),
        }
    }

    fn rename(&self, program: &Program, var: VarId) -> VarId {
        match self.outside_old.get(&var).map(|expr| &program[*expr]) {
            Some(Expr::Var(target)) => *target,
            _ => var,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vars() -> (Program, VarId, VarId) {
        let mut program = Program::new();
        let x = program.add_global("x", Type::Int);
        let y = program.add_global("y", Type::Int);
        (program, x, y)
    }

    #[test]
    fn missing_mapping_leaves_expression_untouched() {
        let (mut program, x, y) = two_vars();
        let x_expr = program.var(x);
        let old_x = program.old(x_expr);
        let y_expr = program.var(y);
        let sum = program.binary(BinOp::Add, old_x, y_expr);

        let empty = Substitution::default();
        let result = Substituter::uniform(&empty).apply(&mut program, sum);
        assert_eq!(result, sum);
    }

    #[test]
    fn modes_are_selected_by_old() {
        // x + old(x) with x -> 1 outside and x -> 2 inside gives 1 + old(2)
        let (mut program, x, _) = two_vars();
        let x_expr = program.var(x);
        let x_expr2 = program.var(x);
        let old_x = program.old(x_expr2);
        let sum = program.binary(BinOp::Add, x_expr, old_x);

        let one = program.int(1);
        let two = program.int(2);
        let outside: Substitution = [(x, one)].into_iter().collect();
        let inside: Substitution = [(x, two)].into_iter().collect();
        let result = Substituter::new(&outside, &inside).apply(&mut program, sum);

        let Expr::Binary(BinOp::Add, lhs, rhs) = program[result].clone() else {
            panic!("expected a sum");
        };
        assert_eq!(lhs, one);
        let Expr::Old(inner) = program[rhs].clone() else {
            panic!("expected old(..)");
        };
        assert_eq!(inner, two);
    }

    #[test]
    fn mode_is_restored_after_nested_old() {
        // old(old(x) + y) + y: every y sits in prior mode except the last one
        let (mut program, x, y) = two_vars();
        let x_expr = program.var(x);
        let old_x = program.old(x_expr);
        let y_inner = program.var(y);
        let inner_sum = program.binary(BinOp::Add, old_x, y_inner);
        let outer_old = program.old(inner_sum);
        let y_outer = program.var(y);
        let sum = program.binary(BinOp::Add, outer_old, y_outer);

        let cur = program.int(10);
        let prior = program.int(20);
        let outside: Substitution = [(y, cur)].into_iter().collect();
        let inside: Substitution = [(y, prior)].into_iter().collect();
        let result = Substituter::new(&outside, &inside).apply(&mut program, sum);

        let Expr::Binary(_, lhs, rhs) = program[result].clone() else {
            panic!("expected a sum");
        };
        assert_eq!(rhs, cur);
        let Expr::Old(inner) = program[lhs].clone() else {
            panic!("expected old(..)");
        };
        let Expr::Binary(_, _, inner_y) = program[inner].clone() else {
            panic!("expected a sum");
        };
        assert_eq!(inner_y, prior);
    }

    #[test]
    fn assignment_targets_are_renamed() {
        let (mut program, x, y) = two_vars();
        let y_ref = program.var(y);
        let x_ref = program.var(x);
        let subst: Substitution = [(x, y_ref)].into_iter().collect();
        let cmd = Cmd::Assign(vec![(x, x_ref)]);
        let renamed = Substituter::uniform(&subst).apply_cmd(&mut program, &cmd);
        assert_eq!(renamed, Cmd::Assign(vec![(y, y_ref)]));
    }
}
