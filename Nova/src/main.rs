//! Command-line driver: tokenize, parse, compile, run, or disassemble a
//! single source file.
//!
//! Generalized from a plain `fn main` dispatching on raw `env::args()`
//! to a `clap`-derived subcommand dispatcher, the shape a multi-mode
//! dev-tool binary conventionally uses instead of hand-rolled argument
//! parsing.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser as ClapParser, Subcommand};
use log::info;

use core::errors::CompileError;
use core::utils::line_col;

#[derive(ClapParser)]
#[command(name = "nova", version, about = "Toolchain for the nova language: tokenize, parse, compile, run, and disassemble source files")]
struct Cli {
    /// Only log errors, regardless of `RUST_LOG`.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Raise log verbosity one level per occurrence (`-v` = debug, `-vv` = trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a file and run its `main` function.
    Run { file: PathBuf },
    /// Print the raw token stream produced for a file.
    Tokens { file: PathBuf },
    /// Print the parsed declarations (functions, structs) in a file.
    Ast { file: PathBuf },
    /// Print the disassembled bytecode for every function in a file.
    Disassemble { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins if set; otherwise `--quiet`/`--verbose` pick a
/// default filter, matching the flags documented on [`Cli`].
fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run { file } => run_file(&file),
        Command::Tokens { file } => print_tokens(&file),
        Command::Ast { file } => print_ast(&file),
        Command::Disassemble { file } => print_disassembly(&file),
    }
}

fn read_source(file: &PathBuf) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

fn run_file(file: &PathBuf) -> Result<()> {
    let source = read_source(file)?;
    let stream = lexer::Tokenizer::create(&source).map_err(|e| diagnostic(&source, &e))?;
    let ast = parser::Parser::new(&stream, &source).parse_file().map_err(|errs| diagnostics(&source, &errs))?;
    let program = compiler::compile_file(&ast).map_err(|errs| diagnostics(&source, &errs))?;

    let (index, function) = program.find("main", &source, &stream).context("no `main` function declared")?;
    info!("running `main` (function_index={index}, stack_slots={})", function.stack_slots);

    let mut machine = vm::Vm::new(&program);
    let result = machine.call(index).map_err(|e| anyhow::anyhow!("runtime error: {e}"))?;
    if let Some(value) = result {
        println!("{value}");
    }
    Ok(())
}

fn print_tokens(file: &PathBuf) -> Result<()> {
    let source = read_source(file)?;
    let stream = lexer::Tokenizer::create(&source).map_err(|e| diagnostic(&source, &e))?;

    for idx in 0..stream.len() as core::tokens::TokenIdx {
        let token = stream.token(idx);
        let loc = line_col(&source, token.location());
        let lexeme = stream.lexeme(idx, &source);
        println!("{:>4} {}:{:<4} {:<20?} {lexeme:?}", idx, loc.line, loc.col, token.kind());
    }
    Ok(())
}

fn print_ast(file: &PathBuf) -> Result<()> {
    let source = read_source(file)?;
    let ast = parser::Parser::parse_source(&source).map_err(|errs| diagnostics(&source, &errs))?;

    for function in &ast.functions {
        println!("{:#?}", function);
    }
    for def in &ast.structs {
        println!("{:#?}", def);
    }
    Ok(())
}

fn print_disassembly(file: &PathBuf) -> Result<()> {
    let source = read_source(file)?;
    let stream = lexer::Tokenizer::create(&source).map_err(|e| diagnostic(&source, &e))?;
    let ast = parser::Parser::new(&stream, &source).parse_file().map_err(|errs| diagnostics(&source, &errs))?;
    let program = compiler::compile_file(&ast).map_err(|errs| diagnostics(&source, &errs))?;

    print!("{}", tools::disassemble_program(&program, &source, &stream));
    Ok(())
}

/// Formats a single compile error with a `line:col` prefix when it has a
/// known location (see [`CompileError::location`]).
fn diagnostic(source: &str, err: &CompileError) -> anyhow::Error {
    match err.location() {
        Some(at) => {
            let loc = line_col(source, at);
            anyhow::anyhow!("{}:{}: {err}", loc.line, loc.col)
        }
        None => anyhow::anyhow!("{err}"),
    }
}

/// Like [`diagnostic`], but for the common case of a whole batch of
/// errors collected from one compilation pass.
fn diagnostics(source: &str, errs: &[CompileError]) -> anyhow::Error {
    let rendered: Vec<String> = errs.iter().map(|e| diagnostic(source, e).to_string()).collect();
    anyhow::anyhow!("{}", rendered.join("\n"))
}
