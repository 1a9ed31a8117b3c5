//! Parser and bytecode emitter.
//!
//! Statements are parsed by recursive descent; expressions by a Pratt loop
//! over a precedence table. There is no retained AST: statements emit
//! instructions straight into the current [`BytecodeFunction`].
//!
//! The one exception is [`ExprTree`], a small tree built per expression and
//! discarded at the end of the statement. It exists because an assignment
//! target cannot be compiled until the operator has been seen: `x = e`
//! wants `e` emitted first and then a store, while `x += e` wants a load of
//! `x` after `e`, the combining opcode, then the store. The tree defers
//! emission and classifies the left side as lvalue or rvalue.
//!
//! Control flow lowers to absolute-indexed jumps. Forward jumps are emitted
//! with a placeholder target and recorded in small lists (`then_jumps`,
//! `else_jumps`, `end_jumps`); each list is patched as soon as its target
//! address is known, one-pass-assembler style.
//!
//! Errors short-circuit: every routine returns `Result` and the first
//! [`SyntaxError`] propagates out of [`parse`] untouched.

use std::collections::HashMap;

use crate::bytecode::{BytecodeFunction, BytecodeModule, Instruction, Op};
use crate::errors::{SourceLocation, SyntaxError};
use crate::nametable::{NameId, NameTable};
use crate::token::{Token, TokenKind, TokenizeResult};

/// Operand value of a forward jump before it is patched.
const JUMP_PLACEHOLDER: u64 = u64::MAX;

/// Precedence of `||` and `&&`. Condition chains parse their arms one level
/// above this so the short-circuit lowering sees the operators itself.
const SHORT_CIRCUIT_PREC: i32 = 40;

/// Parse a token stream into a bytecode module.
///
/// Consumes the tokenize result. If it already carries a lexical error,
/// that error is returned unchanged without looking at the tokens.
pub fn parse(tk_res: TokenizeResult, names: &NameTable) -> Result<BytecodeModule, SyntaxError> {
    if let Some(err) = tk_res.error {
        return Err(err);
    }
    Parser::new(tk_res, names).parse_module()
}

// ── Operator tables ──────────────────────────────────────────────────

/// Binary operator precedence; `None` for tokens that cannot continue an
/// expression. Higher binds tighter. `(` and `[` rank as postfix call and
/// index, `.` as member access.
fn precedence(kind: TokenKind) -> Option<i32> {
    let prec = match kind {
        TokenKind::PipePipe | TokenKind::AmpAmp => SHORT_CIRCUIT_PREC,

        TokenKind::Pipe => 50,
        TokenKind::Caret => 51,
        TokenKind::Amp => 52,

        TokenKind::EqEq | TokenKind::BangEq => 60,
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => 65,

        TokenKind::LtLt | TokenKind::GtGt => 70,

        TokenKind::Plus | TokenKind::Minus => 80,
        TokenKind::Star | TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent => 90,
        TokenKind::StarStar => 95,

        TokenKind::LBracket | TokenKind::LParen => 100,
        TokenKind::Dot => 110,

        _ => return None,
    };
    Some(prec)
}

/// The opcode a consumed binary operator lowers to. Member access and
/// indexing have no lowering yet and fold to `INVALID`.
fn binary_op(kind: TokenKind) -> Op {
    match kind {
        TokenKind::Plus => Op::Add,
        TokenKind::Minus => Op::Sub,
        TokenKind::Star => Op::Mul,
        TokenKind::Slash => Op::Div,
        TokenKind::SlashSlash => Op::IntDiv,
        TokenKind::Percent => Op::Mod,
        TokenKind::StarStar => Op::Pow,
        TokenKind::LtLt => Op::Shl,
        TokenKind::GtGt => Op::Shr,
        TokenKind::Amp => Op::BitAnd,
        TokenKind::Pipe => Op::BitOr,
        TokenKind::Caret => Op::BitXor,
        TokenKind::EqEq => Op::Eq,
        TokenKind::BangEq => Op::Ne,
        TokenKind::Lt => Op::Lt,
        TokenKind::Gt => Op::Gt,
        TokenKind::LtEq => Op::Le,
        TokenKind::GtEq => Op::Ge,
        TokenKind::AmpAmp => Op::And,
        TokenKind::PipePipe => Op::Or,
        _ => Op::Invalid,
    }
}

/// The combining opcode of a compound assignment operator, or `None` for
/// anything else including plain `=`.
fn compound_op(kind: TokenKind) -> Option<Op> {
    let op = match kind {
        TokenKind::PlusEq => Op::Add,
        TokenKind::MinusEq => Op::Sub,
        TokenKind::StarEq => Op::Mul,
        TokenKind::SlashEq => Op::Div,
        TokenKind::SlashSlashEq => Op::IntDiv,
        TokenKind::PercentEq => Op::Mod,
        TokenKind::StarStarEq => Op::Pow,
        TokenKind::LtLtEq => Op::Shl,
        TokenKind::GtGtEq => Op::Shr,
        TokenKind::AmpEq => Op::BitAnd,
        TokenKind::PipeEq => Op::BitOr,
        TokenKind::CaretEq => Op::BitXor,
        _ => return None,
    };
    Some(op)
}

fn is_assignment(kind: TokenKind) -> bool {
    kind == TokenKind::Eq || compound_op(kind).is_some()
}

// ── Expression tree ──────────────────────────────────────────────────

/// How an expression can stand on the left of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LvalueKind {
    /// Not assignable.
    None,
    /// A local slot or a global name; a single store instruction suffices.
    Simple,
    /// Member and index targets. Reserved until those lower to real code.
    #[allow(dead_code)]
    Compound,
}

/// Transient expression representation, built by one statement's parse and
/// consumed by emission.
#[derive(Debug)]
enum ExprTree {
    Int(u64),
    Num(f64),
    Str(usize),
    Bool(bool),
    Null,
    Local(usize),
    Global(NameId),
    Unary {
        op: Op,
        expr: Box<ExprTree>,
    },
    Binary {
        op: Op,
        lhs: Box<ExprTree>,
        rhs: Box<ExprTree>,
    },
    Call {
        callee: Box<ExprTree>,
        args: Vec<ExprTree>,
    },
}

impl ExprTree {
    /// Emit instructions that leave this expression's value on the stack.
    fn emit(&self, func: &mut BytecodeFunction) {
        match self {
            ExprTree::Int(value) => {
                func.emit(Instruction::imm(Op::LoadInt, *value));
            }
            ExprTree::Num(value) => {
                func.emit(Instruction::num(Op::LoadNum, *value));
            }
            ExprTree::Str(idx) => {
                func.emit(Instruction::imm(Op::LoadStr, *idx as u64));
            }
            ExprTree::Bool(value) => {
                func.emit(Instruction::boolean(Op::LoadBool, *value));
            }
            ExprTree::Null => {
                func.emit(Instruction::new(Op::LoadNull));
            }
            ExprTree::Local(slot) => {
                func.emit(Instruction::imm(Op::LoadLocal, *slot as u64));
            }
            ExprTree::Global(name) => {
                func.emit(Instruction::imm(Op::LoadGlobal, *name as u64));
            }
            ExprTree::Unary { op, expr } => {
                expr.emit(func);
                func.emit(Instruction::new(*op));
            }
            ExprTree::Binary { op, lhs, rhs } => {
                lhs.emit(func);
                rhs.emit(func);
                func.emit(Instruction::new(*op));
            }
            ExprTree::Call { callee, args } => {
                for arg in args {
                    arg.emit(func);
                }
                callee.emit(func);
                func.emit(Instruction::count(Op::Call, args.len() as u32));
            }
        }
    }

    fn lvalue_kind(&self) -> LvalueKind {
        match self {
            ExprTree::Local(_) | ExprTree::Global(_) => LvalueKind::Simple,
            _ => LvalueKind::None,
        }
    }

    /// Emit a store of the stack top into this target. Only meaningful for
    /// `Simple` lvalues; callers check [`ExprTree::lvalue_kind`] first.
    fn emit_store(&self, func: &mut BytecodeFunction) {
        match self {
            ExprTree::Local(slot) => {
                func.emit(Instruction::imm(Op::StoreLocal, *slot as u64));
            }
            ExprTree::Global(name) => {
                func.emit(Instruction::imm(Op::StoreGlobal, *name as u64));
            }
            _ => debug_assert!(false, "emit_store on a non-lvalue"),
        }
    }
}

// ── Scoped local variables ───────────────────────────────────────────

/// Per-function mapping of name IDs to local slot indices.
///
/// Slots are assigned by a monotonic counter that never decreases: leaving
/// a scope releases the *names* bound in it but not their slots, so local
/// addressing stays trivial at the cost of potentially larger frames. A
/// name shadowed across scopes keeps a stack of active slots, innermost on
/// top.
#[derive(Debug, Default)]
struct ScopedLocals {
    next_slot: usize,
    scopes: Vec<Vec<NameId>>,
    bindings: HashMap<NameId, Vec<usize>>,
}

impl ScopedLocals {
    /// The innermost slot bound to `name`, if any.
    fn get(&self, name: NameId) -> Option<usize> {
        self.bindings.get(&name).and_then(|slots| slots.last().copied())
    }

    /// Bind `name` to a fresh slot in the current scope.
    fn add(&mut self, name: NameId) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.bindings.entry(name).or_default().push(slot);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name);
        }
        slot
    }

    fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn leave_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for name in scope {
            if let Some(slots) = self.bindings.get_mut(&name) {
                slots.pop();
                if slots.is_empty() {
                    self.bindings.remove(&name);
                }
            }
        }
    }
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    str_lits: Vec<String>,
    names: &'a NameTable,
    locals: ScopedLocals,
}

impl<'a> Parser<'a> {
    fn new(tk_res: TokenizeResult, names: &'a NameTable) -> Self {
        Self {
            tokens: tk_res.tokens,
            pos: 0,
            str_lits: tk_res.str_literals,
            names,
            locals: ScopedLocals::default(),
        }
    }

    // ── Module and functions ─────────────────────────────────────────

    fn parse_module(mut self) -> Result<BytecodeModule, SyntaxError> {
        let mut module = BytecodeModule::default();

        while !self.is_at_end() {
            let tok = *self.peek();
            match tok.kind {
                TokenKind::Function => {
                    let func = self.parse_function()?;
                    // a redefinition replaces the earlier function
                    module.functions.insert(func.name, func);
                }
                TokenKind::Declare => {
                    return Err(SyntaxError::new(
                        "global variable declarations not implemented yet",
                        tok.loc,
                    ));
                }
                TokenKind::Import => {
                    return Err(SyntaxError::new("imports not implemented yet", tok.loc));
                }
                _ => {
                    return Err(SyntaxError::new(
                        format!(
                            "{} can not appear at the top-level of a module",
                            tok.kind.name()
                        ),
                        tok.loc,
                    ));
                }
            }
        }

        module.str_lits = std::mem::take(&mut self.str_lits);
        Ok(module)
    }

    fn parse_function(&mut self) -> Result<BytecodeFunction, SyntaxError> {
        self.locals = ScopedLocals::default();

        self.expect(TokenKind::Function)?;
        let (name, _) = self.expect_identifier()?;
        let mut func = BytecodeFunction::new(name);

        self.expect(TokenKind::LParen)?;
        if !self.match_kind(TokenKind::RParen) {
            loop {
                let (id, loc) = self.expect_identifier()?;
                if self.locals.get(id).is_some() {
                    return Err(SyntaxError::new(
                        format!("duplicate local name {}", self.names.get_name(id)),
                        loc,
                    ));
                }
                self.locals.add(id);
                func.arg_count += 1;
                func.local_count += 1;

                if self.match_kind(TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
                if self.match_kind(TokenKind::RParen) {
                    break; // trailing comma
                }
            }
        }

        self.parse_block(&mut func, false)?;
        Ok(func)
    }

    /// Parse statements up to the block terminator.
    ///
    /// A plain block consumes its `End`. An `If` branch body (`in_if`) also
    /// stops at `Else`, `ElseIf` and `End` but leaves the terminator for
    /// [`Parser::parse_if_else`] to interpret.
    fn parse_block(&mut self, func: &mut BytecodeFunction, in_if: bool) -> Result<(), SyntaxError> {
        self.locals.enter_scope();
        loop {
            if self.is_at_end() {
                return Err(SyntaxError::new("unexpected end of file", self.peek().loc));
            }

            if in_if
                && matches!(
                    self.peek().kind,
                    TokenKind::Else | TokenKind::ElseIf | TokenKind::End
                )
            {
                break;
            }
            if self.match_kind(TokenKind::End) {
                break;
            }

            self.parse_statement(func)?;
        }
        self.locals.leave_scope();
        Ok(())
    }

    // ── Statements ───────────────────────────────────────────────────

    fn parse_statement(&mut self, func: &mut BytecodeFunction) -> Result<(), SyntaxError> {
        match self.peek().kind {
            TokenKind::Declare => self.parse_declare(func),
            TokenKind::If => self.parse_if_else(func),
            TokenKind::Return => {
                self.advance();
                if self.check(TokenKind::Semicolon) {
                    func.emit(Instruction::new(Op::RetNull));
                } else {
                    self.parse_expr(func, 0)?;
                    func.emit(Instruction::new(Op::Ret));
                }
                self.expect(TokenKind::Semicolon)?;
                Ok(())
            }
            _ => self.parse_assign(func),
        }
    }

    fn parse_declare(&mut self, func: &mut BytecodeFunction) -> Result<(), SyntaxError> {
        self.expect(TokenKind::Declare)?;

        loop {
            let (id, loc) = self.expect_identifier()?;
            if self.locals.get(id).is_some() {
                return Err(SyntaxError::new(
                    format!("variable {} already declared", self.names.get_name(id)),
                    loc,
                ));
            }
            self.locals.add(id);
            func.local_count += 1;

            if self.match_kind(TokenKind::Eq) {
                self.parse_expr(func, 0)?;
                // TODO: this reloads the fresh slot instead of storing the
                // initializer into it, leaving the value on the operand
                // stack at statement end; the VM currently compensates.
                func.emit(Instruction::imm(Op::LoadLocal, (func.local_count - 1) as u64));
            }

            if self.match_kind(TokenKind::Semicolon) {
                break;
            }
            self.expect(TokenKind::Comma)?;
        }
        Ok(())
    }

    /// Assignment or bare expression statement.
    fn parse_assign(&mut self, func: &mut BytecodeFunction) -> Result<(), SyntaxError> {
        let lhs = self.parse_expr_tree(0)?;

        if self.match_kind(TokenKind::Semicolon) {
            // a bare expression: evaluate and discard
            lhs.emit(func);
            func.emit(Instruction::count(Op::PopN, 1));
            return Ok(());
        }

        let op_tok = *self.peek();
        if !is_assignment(op_tok.kind) {
            return Err(SyntaxError::new("unexpected token", op_tok.loc));
        }
        self.advance();

        match lhs.lvalue_kind() {
            LvalueKind::None => {
                return Err(SyntaxError::new("cannot assign to rvalue", op_tok.loc));
            }
            LvalueKind::Simple => {
                self.parse_expr(func, 0)?;
                if let Some(op) = compound_op(op_tok.kind) {
                    // stack must read rhs, lhs for the combining opcode
                    lhs.emit(func);
                    func.emit(Instruction::new(Op::Swap));
                    func.emit(Instruction::new(op));
                }
                lhs.emit_store(func);
            }
            LvalueKind::Compound => {
                return Err(SyntaxError::new(
                    "assignment to member expressions not implemented yet",
                    op_tok.loc,
                ));
            }
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    // ── If / ElseIf / Else lowering ──────────────────────────────────

    fn parse_if_else(&mut self, func: &mut BytecodeFunction) -> Result<(), SyntaxError> {
        self.expect(TokenKind::If)?;

        let mut then_jumps = Vec::new();
        let mut else_jumps = Vec::new();
        self.parse_if_cond(func, &mut then_jumps, &mut else_jumps)?;
        self.expect(TokenKind::Then)?;

        func.patch_jumps(&then_jumps);
        self.parse_block(func, true)?;

        let mut end_jumps = Vec::new();
        if matches!(self.peek().kind, TokenKind::ElseIf | TokenKind::Else) {
            end_jumps.push(func.emit(Instruction::imm(Op::Jump, JUMP_PLACEHOLDER)));
        }
        func.patch_jumps(&else_jumps);

        while self.match_kind(TokenKind::ElseIf) {
            let mut branch_then = Vec::new();
            let mut branch_else = Vec::new();
            self.parse_if_cond(func, &mut branch_then, &mut branch_else)?;
            self.expect(TokenKind::Then)?;

            func.patch_jumps(&branch_then);
            self.parse_block(func, true)?;

            if matches!(self.peek().kind, TokenKind::ElseIf | TokenKind::Else) {
                end_jumps.push(func.emit(Instruction::imm(Op::Jump, JUMP_PLACEHOLDER)));
            }
            func.patch_jumps(&branch_else);
        }

        if self.match_kind(TokenKind::Else) {
            // the Else body is a plain block, so it consumes the closing
            // End itself; every other shape ends the chain explicitly here
            self.parse_block(func, false)?;
        } else {
            self.expect(TokenKind::End)?;
        }

        func.patch_jumps(&end_jumps);
        Ok(())
    }

    /// Parse one condition chain up to (not including) `Then`.
    ///
    /// Arms are parsed just above `||`/`&&` precedence so the operators are
    /// seen here: `||` emits `JNZ` into `then_jumps` (operand is truthy,
    /// take the branch), `&&` emits `JZ` into `else_jumps` (operand is
    /// falsy, skip the branch). The terminal arm emits a final `JZ`.
    fn parse_if_cond(
        &mut self,
        func: &mut BytecodeFunction,
        then_jumps: &mut Vec<usize>,
        else_jumps: &mut Vec<usize>,
    ) -> Result<(), SyntaxError> {
        loop {
            self.parse_expr(func, SHORT_CIRCUIT_PREC + 1)?;

            if self.match_kind(TokenKind::PipePipe) {
                then_jumps.push(func.emit(Instruction::imm(Op::JumpNonZero, JUMP_PLACEHOLDER)));
            } else if self.match_kind(TokenKind::AmpAmp) {
                else_jumps.push(func.emit(Instruction::imm(Op::JumpZero, JUMP_PLACEHOLDER)));
            }

            if self.check(TokenKind::Then) {
                break;
            }
        }

        else_jumps.push(func.emit(Instruction::imm(Op::JumpZero, JUMP_PLACEHOLDER)));
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────────

    /// Parse an expression and emit its value onto the stack.
    fn parse_expr(&mut self, func: &mut BytecodeFunction, min_prec: i32) -> Result<(), SyntaxError> {
        let expr = self.parse_expr_tree(min_prec)?;
        expr.emit(func);
        Ok(())
    }

    fn parse_expr_tree(&mut self, min_prec: i32) -> Result<ExprTree, SyntaxError> {
        self.parse_binary(min_prec)
    }

    /// Pratt loop: parse a unary operand, then keep consuming operators
    /// whose precedence reaches `min_prec`. The right side parses one level
    /// higher, so equal precedence associates left.
    fn parse_binary(&mut self, min_prec: i32) -> Result<ExprTree, SyntaxError> {
        let mut left = self.parse_unary()?;

        while let Some(prec) = precedence(self.peek().kind) {
            if prec < min_prec {
                break;
            }
            let op_tok = self.advance();

            if op_tok.kind == TokenKind::LParen {
                // postfix call; the closing parenthesis is consumed by the
                // argument list
                let args = self.parse_value_list(TokenKind::RParen)?;
                left = ExprTree::Call {
                    callee: Box::new(left),
                    args,
                };
            } else {
                let right = self.parse_binary(prec + 1)?;
                left = ExprTree::Binary {
                    op: binary_op(op_tok.kind),
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                };
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprTree, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Op::Neg,
            TokenKind::Bang => Op::Not,
            TokenKind::Tilde => Op::BitNot,
            _ => return self.parse_primary(),
        };
        self.advance();
        Ok(ExprTree::Unary {
            op,
            expr: Box::new(self.parse_unary()?),
        })
    }

    fn parse_primary(&mut self) -> Result<ExprTree, SyntaxError> {
        let tok = *self.peek();
        match tok.kind {
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr_tree(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Identifier(id) => {
                self.advance();
                match self.locals.get(id) {
                    Some(slot) => Ok(ExprTree::Local(slot)),
                    // not a local: leave resolution to the VM by name
                    None => Ok(ExprTree::Global(id)),
                }
            }
            TokenKind::True => {
                self.advance();
                Ok(ExprTree::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(ExprTree::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(ExprTree::Null)
            }
            TokenKind::Integer(value) => {
                self.advance();
                Ok(ExprTree::Int(value))
            }
            TokenKind::Number(value) => {
                self.advance();
                Ok(ExprTree::Num(value))
            }
            TokenKind::Str(idx) => {
                self.advance();
                Ok(ExprTree::Str(idx))
            }
            _ => Err(SyntaxError::new("primary expression expected", tok.loc)),
        }
    }

    /// Parse a comma-separated expression list terminated by `term`, which
    /// is consumed. Trailing commas are accepted.
    fn parse_value_list(&mut self, term: TokenKind) -> Result<Vec<ExprTree>, SyntaxError> {
        let mut values = Vec::new();
        while !self.match_kind(term) {
            values.push(self.parse_expr_tree(0)?);
            if !self.check(term) {
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(values)
    }

    // ── Token manipulation ───────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos];
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        let tok = self.advance();
        if tok.kind != kind {
            return Err(SyntaxError::new(
                format!("expected {}, got {}", kind.name(), tok.kind.name()),
                tok.loc,
            ));
        }
        Ok(tok)
    }

    fn expect_identifier(&mut self) -> Result<(NameId, SourceLocation), SyntaxError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Identifier(id) => Ok((id, tok.loc)),
            _ => Err(SyntaxError::new(
                format!("expected (identifier), got {}", tok.kind.name()),
                tok.loc,
            )),
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
}

// ── Tests ────────────────────────────────────────────────────────────
