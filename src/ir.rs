// Copyright 2024 Cornell University
// released under MIT License

use baa::BitVecValue;
use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use std::ops::{Index, IndexMut};

/// A whole program: arenas for every IR entity plus the ordered list of
/// top-level declarations. Handles (`VarId`, `ExprId`, ...) are only
/// meaningful with respect to the `Program` that created them (or a
/// program derived from it via [`Program::checker_base`]).
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Top-level declarations, in source order
    pub decls: Vec<Decl>,

    vars: PrimaryMap<VarId, Variable>,
    exprs: PrimaryMap<ExprId, Expr>,
    blocks: PrimaryMap<BlockId, Block>,
    procs: PrimaryMap<ProcId, Procedure>,
    impls: PrimaryMap<ImplId, Implementation>,

    /// Globals and constants by name (these are identified by name in the
    /// surface language)
    by_name: FxHashMap<String, VarId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the starting point of a checker program: all arenas are
    /// shared with `self` so that handles stay valid, but only the global
    /// declarations (types, constants, functions, axioms and then global
    /// variables) are kept.
    pub fn checker_base(&self) -> Program {
        let mut decls: Vec<Decl> = self
            .decls
            .iter()
            .filter(|decl| {
                matches!(
                    decl,
                    Decl::Type(_) | Decl::Constant(_) | Decl::Function(_) | Decl::Axiom(_)
                )
            })
            .cloned()
            .collect();
        decls.extend(self.global_variables().map(Decl::Global));
        Program {
            decls,
            ..self.clone()
        }
    }

    /// add a new expression to the program
    pub fn e(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr)
    }

    pub fn add_var(&mut self, var: Variable) -> VarId {
        self.vars.push(var)
    }

    pub fn add_global(&mut self, name: &str, tpe: Type) -> VarId {
        assert!(
            !self.by_name.contains_key(name),
            "we already have a global named {name}!"
        );
        let id = self.vars.push(Variable::new(name, tpe, VarKind::Global));
        self.by_name.insert(name.to_string(), id);
        self.decls.push(Decl::Global(id));
        id
    }

    pub fn add_constant(&mut self, name: &str, tpe: Type) -> VarId {
        assert!(
            !self.by_name.contains_key(name),
            "we already have a constant named {name}!"
        );
        let id = self.vars.push(Variable::new(name, tpe, VarKind::Constant));
        self.by_name.insert(name.to_string(), id);
        self.decls.push(Decl::Constant(id));
        id
    }

    pub fn add_param(&mut self, name: &str, tpe: Type, dir: Dir) -> VarId {
        self.vars
            .push(Variable::new(name, tpe, VarKind::Param(dir)))
    }

    pub fn add_local(&mut self, name: &str, tpe: Type) -> VarId {
        self.vars.push(Variable::new(name, tpe, VarKind::Local))
    }

    /// Creates a bound variable with the name and type of `like`
    pub fn add_bound_like(&mut self, like: VarId, origin: Origin) -> VarId {
        let template = &self.vars[like];
        let bound = Variable {
            name: template.name.clone(),
            tpe: template.tpe.clone(),
            kind: VarKind::Bound,
            origin,
            linear: None,
        };
        self.vars.push(bound)
    }

    pub fn add_block(&mut self, label: &str, cmds: Vec<Cmd>, transfer: Transfer) -> BlockId {
        self.blocks.push(Block {
            label: label.to_string(),
            cmds,
            transfer,
        })
    }

    pub fn add_procedure(&mut self, proc: Procedure) -> ProcId {
        let id = self.procs.push(proc);
        self.decls.push(Decl::Procedure(id));
        id
    }

    pub fn add_implementation(&mut self, imp: Implementation) -> ImplId {
        let id = self.impls.push(imp);
        self.decls.push(Decl::Implementation(id));
        id
    }

    /// Declares `function` after the existing types, constants and functions,
    /// unless a function of that name is declared already
    pub fn declare_function(&mut self, function: Function) {
        let declared = self
            .decls
            .iter()
            .any(|decl| matches!(decl, Decl::Function(f) if f.name == function.name));
        if declared {
            return;
        }
        let pos = self
            .decls
            .iter()
            .position(|decl| {
                !matches!(decl, Decl::Type(_) | Decl::Constant(_) | Decl::Function(_))
            })
            .unwrap_or(self.decls.len());
        self.decls.insert(pos, Decl::Function(function));
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Global variables in declaration order
    pub fn global_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Global(v) => Some(*v),
            _ => None,
        })
    }

    /// Procedures in declaration order
    pub fn procedures(&self) -> impl Iterator<Item = ProcId> + '_ {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Procedure(p) => Some(*p),
            _ => None,
        })
    }

    /// Implementations in declaration order
    pub fn implementations(&self) -> impl Iterator<Item = ImplId> + '_ {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Implementation(i) => Some(*i),
            _ => None,
        })
    }

    pub fn find_procedure(&self, name: &str) -> Option<ProcId> {
        self.procedures().find(|p| self.procs[*p].name == name)
    }

    pub fn var_ids(&self) -> Vec<VarId> {
        self.vars.keys().collect()
    }

    // expression helpers

    pub fn tt(&mut self) -> ExprId {
        self.e(Expr::Const(Literal::Bool(true)))
    }

    pub fn ff(&mut self) -> ExprId {
        self.e(Expr::Const(Literal::Bool(false)))
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.e(Expr::Const(Literal::Int(value)))
    }

    pub fn var(&mut self, var: VarId) -> ExprId {
        self.e(Expr::Var(var))
    }

    pub fn old(&mut self, expr: ExprId) -> ExprId {
        self.e(Expr::Old(expr))
    }

    pub fn not(&mut self, expr: ExprId) -> ExprId {
        self.e(Expr::Unary(UnaryOp::Not, expr))
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.e(Expr::Binary(op, lhs, rhs))
    }

    pub fn and(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Or, lhs, rhs)
    }

    pub fn eq(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.binary(BinOp::Eq, lhs, rhs)
    }

    pub fn exists(&mut self, bound: Vec<VarId>, body: ExprId) -> ExprId {
        self.e(Expr::Quantifier(Quant::Exists, bound, body))
    }

    /// `e1 && (e2 && (... && true))`, the shape used for gate conjunctions
    pub fn conjunction(&mut self, exprs: &[ExprId]) -> ExprId {
        let mut conj = self.tt();
        for expr in exprs {
            conj = self.and(*expr, conj);
        }
        conj
    }
}

impl Index<VarId> for Program {
    type Output = Variable;

    fn index(&self, index: VarId) -> &Self::Output {
        &self.vars[index]
    }
}

impl IndexMut<VarId> for Program {
    fn index_mut(&mut self, index: VarId) -> &mut Self::Output {
        &mut self.vars[index]
    }
}

impl Index<ExprId> for Program {
    type Output = Expr;

    fn index(&self, index: ExprId) -> &Self::Output {
        &self.exprs[index]
    }
}

impl Index<BlockId> for Program {
    type Output = Block;

    fn index(&self, index: BlockId) -> &Self::Output {
        &self.blocks[index]
    }
}

impl IndexMut<BlockId> for Program {
    fn index_mut(&mut self, index: BlockId) -> &mut Self::Output {
        &mut self.blocks[index]
    }
}

impl Index<ProcId> for Program {
    type Output = Procedure;

    fn index(&self, index: ProcId) -> &Self::Output {
        &self.procs[index]
    }
}

impl IndexMut<ProcId> for Program {
    fn index_mut(&mut self, index: ProcId) -> &mut Self::Output {
        &mut self.procs[index]
    }
}

impl Index<ImplId> for Program {
    type Output = Implementation;

    fn index(&self, index: ImplId) -> &Self::Output {
        &self.impls[index]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// A type constructor
    Type(String),
    Constant(VarId),
    Function(Function),
    Axiom(ExprId),
    Global(VarId),
    Procedure(ProcId),
    Implementation(ImplId),
}

/// An uninterpreted function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub args: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Int,
    BitVec(u32),
    /// User-declared type constructor
    Named(String),
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Dir {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum VarKind {
    Global,
    Constant,
    Param(Dir),
    Local,
    /// Introduced by a quantifier, never declared
    Bound,
}

/// Where a variable came from. This only influences how the variable is
/// displayed; identity is always the `VarId`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Origin {
    Source,
    Shadow,
    Pre,
    Post,
}

impl Origin {
    pub fn prefix(&self) -> &'static str {
        match self {
            Origin::Source => "",
            Origin::Shadow => "that_",
            Origin::Pre => "pre_",
            Origin::Post => "post_",
        }
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VarId(u32);
entity_impl!(VarId, "var");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    tpe: Type,
    kind: VarKind,
    origin: Origin,
    /// Name of the linear domain this variable belongs to, if any
    linear: Option<String>,
}

impl Variable {
    pub fn new(name: &str, tpe: Type, kind: VarKind) -> Self {
        Self {
            name: name.to_string(),
            tpe,
            kind,
            origin: Origin::Source,
            linear: None,
        }
    }

    pub fn with_linear(mut self, domain: &str) -> Self {
        self.linear = Some(domain.to_string());
        self
    }

    /// A fresh copy of this variable for a disjoint copy of program state
    pub fn shadow(&self) -> Self {
        Self {
            origin: Origin::Shadow,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tpe(&self) -> &Type {
        &self.tpe
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn linear(&self) -> Option<&str> {
        self.linear.as_deref()
    }

    pub fn set_linear(&mut self, domain: Option<String>) {
        self.linear = domain;
    }

    pub fn is_global(&self) -> bool {
        self.kind == VarKind::Global
    }

    /// Name as the variable should be displayed, before uniquification
    pub fn display_name(&self) -> String {
        format!("{}{}", self.origin.prefix(), self.name)
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ExprId(u32);
entity_impl!(ExprId, "expr");

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    BitVec(BitVecValue),
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Implies,
    Iff,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Quant {
    Forall,
    Exists,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Expr {
    // nullary
    Const(Literal),
    Var(VarId),
    /// Value of the wrapped expression in the state before the enclosing
    /// procedure or action ran
    Old(ExprId),
    // unary
    Unary(UnaryOp, ExprId),
    // binary
    Binary(BinOp, ExprId, ExprId),
    /// Application of a declared function
    Call(String, Vec<ExprId>),
    Quantifier(Quant, Vec<VarId>, ExprId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cmd {
    Assert(ExprId),
    Assume(ExprId),
    /// Simultaneous assignment `x1, ..., xn := e1, ..., en`
    Assign(Vec<(VarId, ExprId)>),
}

impl Cmd {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Cmd::Assert(_) => "assert",
            Cmd::Assume(_) => "assume",
            Cmd::Assign(_) => "assign",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transfer {
    Goto(Vec<BlockId>),
    /// Exit of a code expression, carrying the expression's value
    ReturnExpr(ExprId),
    /// Exit of an implementation
    Return,
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub label: String,
    pub cmds: Vec<Cmd>,
    pub transfer: Transfer,
}

/// A structured body used as the condition of an atomic-action postcondition.
/// `blocks[0]` is the entry block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeExpr {
    pub locals: Vec<VarId>,
    pub blocks: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Expr(ExprId),
    Code(CodeExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensures {
    /// Boolean attributes such as `right` in `ensures {:right} ...`
    pub attributes: Vec<String>,
    pub condition: Condition,
}

impl Ensures {
    pub fn new(condition: Condition) -> Self {
        Self {
            attributes: vec![],
            condition,
        }
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attributes.push(attribute.to_string());
        self
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProcId(u32);
entity_impl!(ProcId, "proc");

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Procedure {
    pub name: String,
    pub type_params: Vec<String>,
    pub ins: Vec<VarId>,
    pub outs: Vec<VarId>,
    pub requires: Vec<ExprId>,
    pub ensures: Vec<Ensures>,
}

impl Procedure {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ImplId(u32);
entity_impl!(ImplId, "impl");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    pub proc: ProcId,
    pub ins: Vec<VarId>,
    pub outs: Vec<VarId>,
    pub locals: Vec<VarId>,
    /// `blocks[0]` is the entry block
    pub blocks: Vec<BlockId>,
}
