//! Token-stream dump driver.
//!
//! Reads Cypheri source (file argument or standard input), tokenizes it and
//! prints one line per token to the output (file argument or standard
//! output). A syntax error is reported on the output stream and the exit
//! code stays zero; only I/O failures exit nonzero.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use cypheri::lexer::tokenize;
use cypheri::nametable::NameTable;
use cypheri::token::TokenKind;

#[derive(Parser, Debug)]
#[command(name = "cypheri_test_tokenize", about = "Dump the Cypheri token stream")]
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
    let result = tokenize(&source, &mut names);

    if let Some(err) = result.error {
        writeln!(out, "Error: \n{}", err).into_diagnostic()?;
        eprintln!("{:?}", miette::Report::new(err.with_source(&source)));
        return Ok(());
    }

    for token in &result.tokens {
        write!(out, "{}:\t{{ type=\"{}\"", token.loc, token.kind.name()).into_diagnostic()?;
        match token.kind {
            TokenKind::Integer(value) => {
                write!(out, ", value={}", value).into_diagnostic()?;
            }
            TokenKind::Number(value) => {
                write!(out, ", value={}", value).into_diagnostic()?;
            }
            TokenKind::Str(idx) => {
                write!(out, ", value=\"{}\"", result.str_literals[idx]).into_diagnostic()?;
            }
            TokenKind::Identifier(id) => {
                write!(out, ", value=\"{}\"({})", names.get_name(id), id).into_diagnostic()?;
            }
            _ => {}
        }
        writeln!(out, " }}").into_diagnostic()?;
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
