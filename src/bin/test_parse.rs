//! Bytecode disassembly driver.
//!
//! Reads Cypheri source (file argument or standard input), runs the full
//! tokenize/parse pipeline and prints a disassembly of every function to
//! the output (file argument or standard output). A syntax error is
//! reported on the output stream and the exit code stays zero; only I/O
//! failures exit nonzero.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser as ClapParser;
use miette::{IntoDiagnostic, Result};

use cypheri::lexer::tokenize;
use cypheri::nametable::NameTable;
use cypheri::parser::parse;

#[derive(ClapParser, Debug)]
#[command(name = "cypheri_test_parse", about = "Disassemble a compiled Cypheri module")]
struct Cli {
    /// Source file; standard input when omitted
    input: Option<PathBuf>,

    /// Dump destination; standard output when omitted
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let source = read_input(cli.input.as_deref()).into_diagnostic()?;
    let mut out = open_output(cli.output.as_deref()).into_diagnostic()?;

    let mut names = NameTable::new();
    match parse(tokenize(&source, &mut names), &names) {
        Ok(module) => {
            write!(out, "{}", module.disassemble(&names)).into_diagnostic()?;
        }
        Err(err) => {
            writeln!(out, "Error: \n{}", err).into_diagnostic()?;
            eprintln!("{:?}", miette::Report::new(err.with_source(&source)));
        }
    }

    Ok(())
}

fn read_input(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}

fn open_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(fs::File::create(path)?)),
        None => Ok(Box::new(io::stdout())),
    }
}
