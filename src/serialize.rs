// Copyright 2024 Cornell University
// released under MIT License

use std::io::Write;

use baa::BitVecOps;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::*;

/// Serializes a whole program to a `String`
pub fn serialize_to_string(program: &Program) -> std::io::Result<String> {
    let mut out = Vec::new();
    serialize(&mut out, program)?;
    let out = String::from_utf8(out).expect("serializer only emits UTF-8");
    Ok(out)
}

/// Assigns every variable a printable name. Distinct variables may share a
/// display name (a shadow copy of a bound variable, two checkers' locals,
/// ...), so names are made unique within one declaration by appending
/// `_1`, `_2`, ... Globals, constants and functions are shared by all
/// declarations and keep their names.
#[derive(Debug, Clone, Default)]
struct Namer {
    taken: FxHashSet<String>,
    names: FxHashMap<VarId, String>,
}

impl Namer {
    fn for_program(program: &Program) -> Self {
        let mut namer = Self::default();
        for decl in &program.decls {
            match decl {
                Decl::Global(var) | Decl::Constant(var) => {
                    let name = program[*var].name().to_string();
                    namer.taken.insert(name.clone());
                    namer.names.insert(*var, name);
                }
                Decl::Function(function) => {
                    namer.taken.insert(function.name.clone());
                }
                _ => {}
            }
        }
        namer
    }

    fn name(&mut self, program: &Program, var: VarId) -> String {
        if let Some(name) = self.names.get(&var) {
            return name.clone();
        }
        let base = program[var].display_name();
        let mut name = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.taken.insert(name.clone());
        self.names.insert(var, name.clone());
        name
    }

    fn typed(&mut self, program: &Program, var: VarId) -> String {
        format!("{}: {}", self.name(program, var), program[var].tpe())
    }
}

/// Pretty prints a `Type`
impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::BitVec(width) => write!(f, "bv{width}"),
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Pretty-printer for `BinOp`s
impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "==>",
            BinOp::Iff => "<==>",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
        };
        write!(f, "{op}")
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::BitVec(bv) => write!(f, "{}bv{}", bv.to_dec_str(), bv.width()),
        }
    }
}

/// Pretty-prints an expression on its own, outside of any declaration
pub fn serialize_expr(program: &Program, expr_id: ExprId) -> String {
    let mut namer = Namer::for_program(program);
    expr_to_string(program, &mut namer, expr_id)
}

fn expr_to_string(program: &Program, namer: &mut Namer, expr_id: ExprId) -> String {
    match &program[expr_id] {
        Expr::Const(literal) => literal.to_string(),
        Expr::Var(var) => namer.name(program, *var),
        Expr::Old(inner) => format!("old({})", expr_to_string(program, namer, *inner)),
        Expr::Unary(UnaryOp::Not, inner) => {
            format!("!{}", expr_to_string(program, namer, *inner))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            format!("(- {})", expr_to_string(program, namer, *inner))
        }
        Expr::Binary(op, lhs, rhs) => {
            let e1 = expr_to_string(program, namer, *lhs);
            let e2 = expr_to_string(program, namer, *rhs);
            format!("({e1} {op} {e2})")
        }
        Expr::Call(func, args) => {
            let args = args
                .iter()
                .map(|arg| expr_to_string(program, namer, *arg))
                .join(", ");
            format!("{func}({args})")
        }
        Expr::Quantifier(quant, bound, body) => {
            let quant = match quant {
                Quant::Forall => "forall",
                Quant::Exists => "exists",
            };
            let bound = bound.iter().map(|var| namer.typed(program, *var)).join(", ");
            let body = expr_to_string(program, namer, *body);
            format!("({quant} {bound} :: {body})")
        }
    }
}

fn cmd_to_string(program: &Program, namer: &mut Namer, cmd: &Cmd) -> String {
    match cmd {
        Cmd::Assert(expr) => format!("assert {};", expr_to_string(program, namer, *expr)),
        Cmd::Assume(expr) => format!("assume {};", expr_to_string(program, namer, *expr)),
        Cmd::Assign(pairs) => {
            let lhs = pairs.iter().map(|(var, _)| namer.name(program, *var)).join(", ");
            let rhs = pairs
                .iter()
                .map(|(_, expr)| expr_to_string(program, namer, *expr))
                .join(", ");
            format!("{lhs} := {rhs};")
        }
    }
}

/// Block labels, unique within one body
fn label_blocks(program: &Program, blocks: &[BlockId]) -> FxHashMap<BlockId, String> {
    let mut taken: FxHashSet<String> = FxHashSet::default();
    let mut labels = FxHashMap::default();
    for block in blocks {
        let base = &program[*block].label;
        let mut label = base.clone();
        let mut suffix = 1;
        while taken.contains(&label) {
            label = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.insert(label.clone());
        labels.insert(*block, label);
    }
    labels
}

fn transfer_to_string(
    program: &Program,
    namer: &mut Namer,
    labels: &FxHashMap<BlockId, String>,
    transfer: &Transfer,
) -> String {
    match transfer {
        Transfer::Goto(targets) => format!(
            "goto {};",
            targets
                .iter()
                .map(|target| labels
                    .get(target)
                    .cloned()
                    .unwrap_or_else(|| program[*target].label.clone()))
                .join(", ")
        ),
        Transfer::ReturnExpr(expr) => {
            format!("return {};", expr_to_string(program, namer, *expr))
        }
        Transfer::Return => "return;".to_string(),
    }
}

fn code_expr_to_string(program: &Program, namer: &mut Namer, code: &CodeExpr) -> String {
    let labels = label_blocks(program, &code.blocks);
    let mut parts = vec![];
    for local in &code.locals {
        parts.push(format!("var {};", namer.typed(program, *local)));
    }
    for block in &code.blocks {
        parts.push(format!("{}:", labels[block]));
        for cmd in &program[*block].cmds {
            parts.push(cmd_to_string(program, namer, cmd));
        }
        parts.push(transfer_to_string(
            program,
            namer,
            &labels,
            &program[*block].transfer,
        ));
    }
    format!("|{{ {} }}|", parts.join(" "))
}

fn signature(program: &Program, namer: &mut Namer, ins: &[VarId], outs: &[VarId]) -> String {
    let ins = ins.iter().map(|var| namer.typed(program, *var)).join(", ");
    if outs.is_empty() {
        format!("({ins})")
    } else {
        let outs = outs.iter().map(|var| namer.typed(program, *var)).join(", ");
        format!("({ins}) returns ({outs})")
    }
}

/// Pretty-prints a procedure declaration together with its contract
pub fn serialize_procedure(
    out: &mut impl Write,
    program: &Program,
    proc: &Procedure,
) -> std::io::Result<()> {
    let mut namer = Namer::for_program(program);
    let type_params = if proc.type_params.is_empty() {
        String::new()
    } else {
        format!("<{}>", proc.type_params.join(", "))
    };
    writeln!(
        out,
        "procedure {}{}{};",
        proc.name,
        type_params,
        signature(program, &mut namer, &proc.ins, &proc.outs)
    )?;
    for requires in &proc.requires {
        writeln!(
            out,
            "{}requires {};",
            "  ".repeat(1),
            expr_to_string(program, &mut namer, *requires)
        )?;
    }
    for ensures in &proc.ensures {
        let attributes = ensures
            .attributes
            .iter()
            .map(|attribute| format!("{{:{attribute}}} "))
            .join("");
        let condition = match &ensures.condition {
            Condition::Expr(expr) => expr_to_string(program, &mut namer, *expr),
            Condition::Code(code) => code_expr_to_string(program, &mut namer, code),
        };
        writeln!(out, "{}ensures {}{};", "  ".repeat(1), attributes, condition)?;
    }
    Ok(())
}

/// Pretty-prints an implementation, one command per line
pub fn serialize_implementation(
    out: &mut impl Write,
    program: &Program,
    imp: &Implementation,
) -> std::io::Result<()> {
    let mut namer = Namer::for_program(program);
    writeln!(
        out,
        "implementation {}{}",
        imp.name,
        signature(program, &mut namer, &imp.ins, &imp.outs)
    )?;
    writeln!(out, "{{")?;
    for local in &imp.locals {
        writeln!(out, "{}var {};", "  ".repeat(1), namer.typed(program, *local))?;
    }
    if !imp.locals.is_empty() {
        writeln!(out)?;
    }

    let labels = label_blocks(program, &imp.blocks);
    for (ii, block_id) in imp.blocks.iter().enumerate() {
        if ii > 0 {
            writeln!(out)?;
        }
        let block = &program[*block_id];
        writeln!(out, "{}{}:", "  ".repeat(1), labels[block_id])?;
        for cmd in &block.cmds {
            writeln!(
                out,
                "{}{}",
                "  ".repeat(2),
                cmd_to_string(program, &mut namer, cmd)
            )?;
        }
        writeln!(
            out,
            "{}{}",
            "  ".repeat(2),
            transfer_to_string(program, &mut namer, &labels, &block.transfer)
        )?;
    }
    writeln!(out, "}}")?;
    Ok(())
}

/// Pretty-prints all declarations in order. Single-line declarations are
/// grouped; every procedure and implementation is preceded by a blank line.
pub fn serialize(out: &mut impl Write, program: &Program) -> std::io::Result<()> {
    let mut namer = Namer::for_program(program);
    for (ii, decl) in program.decls.iter().enumerate() {
        match decl {
            Decl::Type(name) => writeln!(out, "type {name};")?,
            Decl::Constant(var) => writeln!(out, "const {};", namer.typed(program, *var))?,
            Decl::Function(function) => writeln!(
                out,
                "function {}({}): {};",
                function.name,
                function.args.iter().join(", "),
                function.ret
            )?,
            Decl::Axiom(expr) => writeln!(
                out,
                "axiom {};",
                expr_to_string(program, &mut namer, *expr)
            )?,
            Decl::Global(var) => writeln!(out, "var {};", namer.typed(program, *var))?,
            Decl::Procedure(proc) => {
                if ii > 0 {
                    writeln!(out)?;
                }
                serialize_procedure(out, program, &program[*proc])?;
            }
            Decl::Implementation(imp) => {
                if ii > 0 {
                    writeln!(out)?;
                }
                serialize_implementation(out, program, &program[*imp])?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use std::path::Path;

    use baa::BitVecValue;
    use insta::Settings;

    use super::*;
    use crate::checkers::{failure_preservation_checker, gate_preservation_checker};
    use crate::ir::tests::build_incr_decr_program;
    use crate::ownership::LinearDomains;
    use crate::transition::tests::checker_with_actions;

    fn snap(name: &str, content: String) {
        let mut settings = Settings::clone_current();
        settings.set_snapshot_path(Path::new("../tests/snapshots"));
        settings.bind(|| {
            insta::assert_snapshot!(name, content);
        });
    }

    #[test]
    fn serialize_decr_incr_checkers() {
        let (mut program, infos) = checker_with_actions(&build_incr_decr_program());
        let (incr, decr) = (&infos[0], &infos[1]);
        let ownership = LinearDomains::default();
        gate_preservation_checker(&mut program, &ownership, decr, incr).unwrap();
        failure_preservation_checker(&mut program, &ownership, decr, incr).unwrap();

        snap("decr_incr_checkers", serialize_to_string(&program).unwrap());
    }

    #[test]
    fn serialize_literals() {
        let mut program = Program::new();
        let bv = program.e(Expr::Const(Literal::BitVec(BitVecValue::from_u64(5, 8))));
        let minus = program.int(-3);
        let neg = program.e(Expr::Unary(UnaryOp::Neg, minus));
        assert_eq!(serialize_expr(&program, bv), "5bv8");
        assert_eq!(serialize_expr(&program, neg), "(- -3)");
    }

    #[test]
    fn serialize_global_declarations() {
        let mut program = Program::new();
        program.decls.push(Decl::Type("Pid".to_string()));
        let n = program.add_constant("N", Type::Int);
        program.decls.push(Decl::Function(Function {
            name: "Disjoint_tid".to_string(),
            args: vec![Type::Named("Pid".to_string()), Type::BitVec(32)],
            ret: Type::Bool,
        }));
        let n_expr = program.var(n);
        let zero = program.int(0);
        let positive = program.binary(BinOp::Gt, n_expr, zero);
        program.decls.push(Decl::Axiom(positive));
        program.add_global("owner", Type::Named("Pid".to_string()));

        assert_eq!(
            serialize_to_string(&program).unwrap(),
            "type Pid;\n\
             const N: int;\n\
             function Disjoint_tid(Pid, bv32): bool;\n\
             axiom (N > 0);\n\
             var owner: Pid;\n"
        );
    }

    #[test]
    fn colliding_names_are_made_unique() {
        let mut program = Program::new();
        let x = program.add_global("x", Type::Int);
        let x_param = program.add_param("x", Type::Int, Dir::In);
        let that_x = program.add_var(program[x_param].shadow());
        let lhs = program.var(x_param);
        let rhs = program.var(x);
        let same = program.eq(lhs, rhs);
        let bound = program.add_bound_like(x_param, Origin::Source);
        let body = program.var(bound);
        let body = program.eq(body, lhs);
        let quantified = program.e(Expr::Quantifier(Quant::Forall, vec![bound], body));

        let mut proc = Procedure::new("P");
        proc.ins = vec![x_param, that_x];
        proc.requires = vec![same, quantified];
        let mut out = Vec::new();
        serialize_procedure(&mut out, &program, &proc).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "procedure P(x_1: int, that_x: int);\n  \
             requires (x_1 == x);\n  \
             requires (forall x_2: int :: (x_2 == x_1));\n"
        );
    }

    #[test]
    fn duplicate_labels_are_made_unique() {
        let mut program = Program::new();
        let second = program.add_block("A", vec![], Transfer::Return);
        let first = program.add_block("A", vec![], Transfer::Goto(vec![second]));
        let proc = program.add_procedure(Procedure::new("Q"));
        let imp = Implementation {
            name: "Q".to_string(),
            proc,
            ins: vec![],
            outs: vec![],
            locals: vec![],
            blocks: vec![first, second],
        };
        let mut out = Vec::new();
        serialize_implementation(&mut out, &program, &imp).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "implementation Q()\n{\n  A:\n    goto A_1;\n\n  A_1:\n    return;\n}\n"
        );
    }

    #[test]
    fn code_expressions_are_printed_inline() {
        let program = build_incr_decr_program();
        let incr = program.find_procedure("Incr").unwrap();
        let mut out = Vec::new();
        serialize_procedure(&mut out, &program, &program[incr]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "procedure Incr();\n  \
             ensures {:right} |{ A: assert true; x := (x + 1); return true; }|;\n"
        );
    }
}
