// Copyright 2024 Cornell University
// released under MIT License

use crate::ir::*;

/// The parts of an ownership (linear resource) analysis that mover checking
/// consumes. The analysis itself lives outside of this crate.
pub trait OwnershipService {
    /// All tracked domains, in a stable order
    fn domain_names(&self) -> &[String];

    /// The domain `var` belongs to, if any
    fn find_domain<'p>(&self, program: &'p Program, var: VarId) -> Option<&'p str>;

    /// A predicate stating that the resources held by `scope` do not overlap
    fn disjointness_expr(&self, program: &mut Program, domain: &str, scope: &[VarId]) -> ExprId;

    /// Removes ownership ghost state that is redundant in the checker program
    fn erase(&self, _program: &mut Program) {}
}

/// Ownership information read off `{:linear "D"}` annotations on variables.
/// Disjointness of `n` variables in domain `D` is expressed as
/// `Disjoint_D_n(v1, ..., vn)`, an uninterpreted predicate that is declared
/// in the program on first use. All variables of one domain share a type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinearDomains {
    domains: Vec<String>,
}

impl LinearDomains {
    /// Collects every domain mentioned by a variable of `program`, in order
    /// of first appearance
    pub fn from_program(program: &Program) -> Self {
        let mut domains: Vec<String> = vec![];
        for var in program.var_ids() {
            if let Some(domain) = program[var].linear() {
                if !domains.iter().any(|d| d == domain) {
                    domains.push(domain.to_string());
                }
            }
        }
        Self { domains }
    }

    pub fn disjointness_function(domain: &str, arity: usize) -> String {
        format!("Disjoint_{domain}_{arity}")
    }
}

impl OwnershipService for LinearDomains {
    fn domain_names(&self) -> &[String] {
        &self.domains
    }

    fn find_domain<'p>(&self, program: &'p Program, var: VarId) -> Option<&'p str> {
        program[var].linear()
    }

    fn disjointness_expr(&self, program: &mut Program, domain: &str, scope: &[VarId]) -> ExprId {
        let name = Self::disjointness_function(domain, scope.len());
        let arg_types = scope.iter().map(|var| program[*var].tpe().clone()).collect();
        program.declare_function(Function {
            name: name.clone(),
            args: arg_types,
            ret: Type::Bool,
        });
        let args = scope.iter().map(|var| program.var(*var)).collect();
        program.e(Expr::Call(name, args))
    }

    /// Drops every linear annotation
    fn erase(&self, program: &mut Program) {
        for var in program.var_ids() {
            program[var].set_linear(None);
        }
    }
}
