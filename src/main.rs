//! looptrans Command Line Interface
//!
//! Usage:
//!   looptrans [OPTIONS] <input-file>
//!   looptrans --help
//!
//! Examples:
//!   looptrans kernel.c                          # Print annotation trees
//!   looptrans --emit=llvm kernel.c              # LLVM-style metadata nodes
//!   looptrans --emit=directives kernel.c        # List parsed pragmas
//!   looptrans --werror -o out.json --emit=json kernel.c

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use looptrans::codegen::{self, Format};
use looptrans::frontend::ast::{AstVisitor, Loop, Pragma, Stmt, StmtKind};
use looptrans::frontend::print_unit;
use looptrans::utils::{Diagnostic, SourceMap};
use looptrans::DirectiveConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// looptrans - loop-transformation pragma processor
#[derive(Parser, Debug)]
#[command(name = "looptrans")]
#[command(version)]
#[command(about = "Parse, check and lower loop-transformation pragmas", long_about = None)]
struct Cli {
    /// Input C source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// What to emit
    #[arg(long, default_value = "metadata")]
    emit: EmitKind,

    /// Do not warn about transformation orders the pass pipeline cannot honor
    #[arg(long)]
    no_pass_order_warnings: bool,

    /// Treat warnings as errors
    #[arg(long)]
    werror: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Indented annotation trees
    Metadata,
    /// Numbered LLVM-style metadata nodes
    Llvm,
    /// Metadata as JSON
    Json,
    /// The normalized source, pragmas included
    Source,
    /// One line per parsed pragma
    Directives,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("looptrans v{}", looptrans::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;

    let config = build_config(&cli);
    debug!("Directive config: {:?}", config);

    let compilation = looptrans::compile_with(&source, &config)
        .with_context(|| format!("Failed to parse {:?}", cli.input))?;

    let file = cli.input.display().to_string();
    let source_map = SourceMap::new(&source);
    for diag in &compilation.diagnostics {
        if diag.is_warning() && cli.quiet {
            continue;
        }
        eprintln!("{}", report(&file, &source_map, diag));
    }

    let output = match cli.emit {
        EmitKind::Metadata => codegen::render(&compilation.metadata, Format::Tree)?,
        EmitKind::Llvm => codegen::render(&compilation.metadata, Format::Llvm)?,
        EmitKind::Json => codegen::render(&compilation.metadata, Format::Json)?,
        EmitKind::Source => print_unit(&compilation.unit),
        EmitKind::Directives => {
            let mut lister = PragmaLister::default();
            lister.visit_unit(&compilation.unit);
            lister.lines.join("")
        }
    };
    write_output(cli.output.as_deref(), &output)?;

    if compilation.has_errors() {
        info!("{} error(s)", compilation.errors().count());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn build_config(cli: &Cli) -> DirectiveConfig {
    DirectiveConfig::default()
        .with_pass_order_warnings(!cli.no_pass_order_warnings)
        .with_warnings_as_errors(cli.werror)
}

/// Lists every pragma with the loop it precedes.
#[derive(Default)]
struct PragmaLister {
    lines: Vec<String>,
}

impl AstVisitor for PragmaLister {
    fn visit_pragma(&mut self, pragma: &Pragma) {
        self.lines.push(format!("{}: {}\n", pragma.span().start_line, pragma));
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Annotated { pragmas, stmt: follower } => {
                let target = follower.as_deref().and_then(Stmt::as_loop).map(loop_label);
                for pragma in pragmas {
                    self.visit_pragma(pragma);
                    if let (Some(label), Some(line)) = (&target, self.lines.last_mut()) {
                        line.insert_str(line.len() - 1, &format!("    -> {}", label));
                    }
                }
                if let Some(follower) = follower {
                    self.visit_stmt(follower);
                }
            }
            StmtKind::Loop(lp) => self.visit_loop(lp),
            StmtKind::Block(block) => self.visit_block(block),
            StmtKind::If { then_branch, else_branch, .. } => {
                self.visit_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(else_branch);
                }
            }
            _ => {}
        }
    }
}

/// A diagnostic followed by its source line and a caret.
fn report(file: &str, source_map: &SourceMap, diag: &Diagnostic) -> String {
    let mut text = format!("{}:{}", file, diag);
    if let Some(line) = source_map.line(diag.span.start_line) {
        let caret = " ".repeat(diag.span.start_column.saturating_sub(1));
        text.push_str(&format!("\n    {}\n    {}^", line, caret));
    }
    text
}

fn loop_label(lp: &Loop) -> String {
    format!("{} loop at line {}", lp.kind.keyword(), lp.span.start_line)
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
