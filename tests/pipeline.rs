//! End-to-end tests over the library surface the drivers use: source text
//! in, token stream or disassembly text out.

use cypheri::lexer::tokenize;
use cypheri::nametable::NameTable;
use cypheri::parser::parse;
use cypheri::token::TokenKind;

fn disassemble(source: &str) -> String {
    let mut names = NameTable::new();
    let result = tokenize(source, &mut names);
    assert!(result.error.is_none(), "lexer error: {:?}", result.error);
    let module = parse(result, &names).expect("parse failed");
    module.disassemble(&names).to_string()
}

#[test]
fn disassembles_a_small_function() {
    let text = disassemble("Function f() Return 1 + 2 * 3; End");
    assert_eq!(
        text,
        "Function f(args = 0, locals = 0):\n\
         \t+0000: LII\t1\n\
         \t+0001: LII\t2\n\
         \t+0002: LII\t3\n\
         \t+0003: MUL\n\
         \t+0004: ADD\n\
         \t+0005: RET\n\
         \n"
    );
}

#[test]
fn disassembles_locals_and_globals() {
    let text = disassemble(
        "Function main(n) \
           Declare total = n; \
           total += helper(total, 2); \
           Return total; \
         End",
    );
    assert_eq!(
        text,
        "Function main(args = 1, locals = 2):\n\
         \t+0000: LDLOCAL\t0\n\
         \t+0001: LDLOCAL\t1\n\
         \t+0002: LDLOCAL\t1\n\
         \t+0003: LII\t2\n\
         \t+0004: LDGLOBAL\thelper\n\
         \t+0005: CALL\t2\n\
         \t+0006: LDLOCAL\t1\n\
         \t+0007: SWP\n\
         \t+0008: ADD\n\
         \t+0009: STLOCAL\t1\n\
         \t+0010: LDLOCAL\t1\n\
         \t+0011: RET\n\
         \n"
    );
}

#[test]
fn disassembles_branches_with_patched_targets() {
    let text = disassemble("Function f(a) If a Then Return 1; Else Return 2; End End");
    assert_eq!(
        text,
        "Function f(args = 1, locals = 1):\n\
         \t+0000: LDLOCAL\t0\n\
         \t+0001: JZ\t5\n\
         \t+0002: LII\t1\n\
         \t+0003: RET\n\
         \t+0004: JMP\t7\n\
         \t+0005: LII\t2\n\
         \t+0006: RET\n\
         \n"
    );
}

#[test]
fn reports_the_first_error_with_location() {
    let mut names = NameTable::new();
    let result = tokenize("Function f()\n  Return 1 +;\nEnd", &mut names);
    assert!(result.error.is_none());
    let err = parse(result, &names).unwrap_err();
    assert_eq!(err.to_string(), "2:13: Syntax error: primary expression expected.");
}

#[test]
fn lexical_errors_survive_the_parse_call() {
    let mut names = NameTable::new();
    let result = tokenize("Function f() Declare x = 99999999999999999999; End", &mut names);
    let err = parse(result, &names).unwrap_err();
    assert_eq!(err.message, "Integer literal overflow");
    assert_eq!((err.location.line, err.location.column), (1, 26));
}

#[test]
fn token_stream_matches_the_dump_contract() {
    let mut names = NameTable::new();
    let result = tokenize("Declare x = \"hi\";", &mut names);
    assert!(result.error.is_none());

    let kinds: Vec<TokenKind> = result.tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Declare,
            TokenKind::Identifier(0),
            TokenKind::Eq,
            TokenKind::Str(0),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
    assert_eq!(result.str_literals, vec!["hi".to_string()]);
    assert_eq!(names.get_name(0), "x");
}

#[test]
fn string_literals_flow_into_the_module_pool() {
    let mut names = NameTable::new();
    let result = tokenize(
        "Function f() Return \"first\"; End Function g() Return \"second\"; End",
        &mut names,
    );
    let module = parse(result, &names).expect("parse failed");
    assert_eq!(
        module.str_lits,
        vec!["first".to_string(), "second".to_string()]
    );

    let text = module.disassemble(&names).to_string();
    assert!(text.contains("LISTR\t\"first\""));
    assert!(text.contains("LISTR\t\"second\""));
}
