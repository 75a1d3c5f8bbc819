//! Source printer for translation units.
//!
//! Output is normalized C: one statement per line, four-space indentation,
//! pragma lines in column one. Printing a parsed unit and parsing the result
//! again yields the same tree.

use crate::frontend::ast::*;
use crate::utils::pretty::{format_list, format_list_with, CodeFormatter};

/// Print a whole translation unit, pragmas included.
pub fn print_unit(unit: &TranslationUnit) -> String {
    let mut f = CodeFormatter::default_indent();
    for (i, item) in unit.items.iter().enumerate() {
        if i > 0 && matches!(item, Item::Function(_) | Item::Record(_)) {
            f.newline();
        }
        print_item(&mut f, item);
    }
    f.finish()
}

fn print_item(f: &mut CodeFormatter, item: &Item) {
    match item {
        Item::Function(func) => print_function(f, func),
        Item::Decl(decl) => f.writeln(&format!("{};", decl_text(decl))),
        Item::Record(record) => {
            f.writeln(&format!("{} {} {{", record.kind, record.name));
            f.indent();
            for member in &record.members {
                match member {
                    RecordMember::Field(decl) => f.writeln(&format!("{};", decl_text(decl))),
                    RecordMember::Method(func) => print_function(f, func),
                    RecordMember::Access(access) => {
                        f.dedent();
                        f.writeln(&format!("{}:", access));
                        f.indent();
                    }
                    RecordMember::Pragmas(group) => print_pragmas(f, &group.pragmas),
                }
            }
            f.dedent();
            f.writeln("};");
        }
        Item::Pragmas(group) => print_pragmas(f, &group.pragmas),
    }
}

fn print_function(f: &mut CodeFormatter, func: &Function) {
    let params = format_list_with(&func.params, ", ", |p| {
        format!("{} {}", p.ty, p.declarator).trim_end().to_string()
    });
    let header = format!("{} {}({})", func.return_type, func.name, params);
    match &func.body {
        Some(body) => {
            f.write(&header);
            f.write(" ");
            print_block(f, body);
        }
        None => f.writeln(&format!("{};", header)),
    }
}

fn print_pragmas(f: &mut CodeFormatter, pragmas: &[Pragma]) {
    for pragma in pragmas {
        f.write_unindented(&pragma.to_string());
    }
}

fn decl_text(decl: &Decl) -> String {
    format!("{} {}", decl.ty, format_list(&decl.declarators, ", "))
}

fn print_block(f: &mut CodeFormatter, block: &Block) {
    f.writeln("{");
    f.indent();
    for stmt in &block.statements {
        print_stmt(f, stmt);
    }
    f.dedent();
    f.writeln("}");
}

/// Print a sub-statement: blocks stay on the header line, anything else is indented.
fn print_body(f: &mut CodeFormatter, body: &Stmt) {
    match &body.kind {
        StmtKind::Block(block) => {
            f.write(" ");
            print_block(f, block);
        }
        _ => {
            f.newline();
            f.indent();
            print_stmt(f, body);
            f.dedent();
        }
    }
}

/// Text of a `for` initializer, without its semicolon.
fn init_text(init: &Stmt) -> String {
    match &init.kind {
        StmtKind::Decl(decl) => decl_text(decl),
        StmtKind::Expr(expr) => expr.to_string(),
        _ => String::new(),
    }
}

fn opt_text(expr: &Option<Expr>) -> String {
    expr.as_ref().map(|e| e.to_string()).unwrap_or_default()
}

fn print_stmt(f: &mut CodeFormatter, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(expr) => f.writeln(&format!("{};", expr)),
        StmtKind::Decl(decl) => f.writeln(&format!("{};", decl_text(decl))),
        StmtKind::Block(block) => print_block(f, block),
        StmtKind::If { condition, then_branch, else_branch } => {
            f.write(&format!("if ({})", condition));
            print_body(f, then_branch);
            if let Some(else_branch) = else_branch {
                f.write("else");
                print_body(f, else_branch);
            }
        }
        StmtKind::Loop(lp) => match &lp.kind {
            LoopKind::For { init, condition, step } => {
                let init = init.as_deref().map(init_text).unwrap_or_default();
                f.write(&format!("for ({}; {}; {})", init, opt_text(condition), opt_text(step)));
                print_body(f, &lp.body);
            }
            LoopKind::While { condition } => {
                f.write(&format!("while ({})", condition));
                print_body(f, &lp.body);
            }
            LoopKind::DoWhile { condition } => {
                f.write("do");
                print_body(f, &lp.body);
                f.writeln(&format!("while ({});", condition));
            }
        },
        StmtKind::Return(Some(value)) => f.writeln(&format!("return {};", value)),
        StmtKind::Return(None) => f.writeln("return;"),
        StmtKind::Break => f.writeln("break;"),
        StmtKind::Continue => f.writeln("continue;"),
        StmtKind::Empty => f.writeln(";"),
        StmtKind::Annotated { pragmas, stmt } => {
            print_pragmas(f, pragmas);
            if let Some(stmt) = stmt {
                print_stmt(f, stmt);
            }
        }
    }
}
