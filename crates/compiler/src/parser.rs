//! Parser for Tarn source
//!
//! Recursive descent over statements with precedence climbing for
//! expressions. The parser resolves names as it goes: every `NAME` in
//! r-value position becomes a reference to a local, an upvalue
//! (materialized through each enclosing function on demand) or a
//! synthetic global. The first syntactic violation aborts the whole parse
//! with a [`CompilerError`].

use crate::ast::{
    BinaryOp, Expr, ExprId, ExprKind, FunctionExpr, FunctionId, Literal, Scope, ScopeId, Stmt,
    StmtId, StmtKind, Symbol, SymbolId, SyntaxTree, UnaryOp,
};
use crate::diagnostics::CompilerError;
use crate::intern::{Name, StringPool};
use crate::lexer::{Lexer, Token};
use crate::types::{TypeTag, ValueType};

/// Locals allowed in one `local` declaration chain.
const MAXVARS: usize = 125;

/// Longest accepted user-defined type name, in bytes.
const MAX_TYPE_NAME: usize = 255;

/// Priority for unary operators.
const UNARY_PRIORITY: u8 = 12;

/// (left, right) binding priorities; right < left means right-associative.
fn priority(op: BinaryOp) -> (u8, u8) {
    match op {
        BinaryOp::Or => (1, 1),
        BinaryOp::And => (2, 2),
        BinaryOp::Less
        | BinaryOp::Greater
        | BinaryOp::LessEqual
        | BinaryOp::GreaterEqual
        | BinaryOp::Equal
        | BinaryOp::NotEqual => (3, 3),
        BinaryOp::BitOr => (4, 4),
        BinaryOp::BitXor => (5, 5),
        BinaryOp::BitAnd => (6, 6),
        BinaryOp::Shl | BinaryOp::Shr => (7, 7),
        BinaryOp::Concat => (9, 8),
        BinaryOp::Add | BinaryOp::Sub => (10, 10),
        BinaryOp::Mul | BinaryOp::Mod | BinaryOp::Div | BinaryOp::IntDiv => (11, 11),
        BinaryOp::Pow => (14, 13),
    }
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    let op = match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Percent => BinaryOp::Mod,
        Token::Caret => BinaryOp::Pow,
        Token::Slash => BinaryOp::Div,
        Token::DoubleSlash => BinaryOp::IntDiv,
        Token::Ampersand => BinaryOp::BitAnd,
        Token::Pipe => BinaryOp::BitOr,
        Token::Tilde => BinaryOp::BitXor,
        Token::Shl => BinaryOp::Shl,
        Token::Shr => BinaryOp::Shr,
        Token::Concat => BinaryOp::Concat,
        Token::NotEqual => BinaryOp::NotEqual,
        Token::Equal => BinaryOp::Equal,
        Token::Less => BinaryOp::Less,
        Token::LessEqual => BinaryOp::LessEqual,
        Token::Greater => BinaryOp::Greater,
        Token::GreaterEqual => BinaryOp::GreaterEqual,
        Token::And => BinaryOp::And,
        Token::Or => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn unary_op(token: &Token) -> Option<UnaryOp> {
    let op = match token {
        Token::Not => UnaryOp::Not,
        Token::Minus => UnaryOp::Minus,
        Token::Tilde => UnaryOp::BitNot,
        Token::Hash => UnaryOp::Len,
        Token::ToInteger => UnaryOp::ToInteger,
        Token::ToNumber => UnaryOp::ToNumber,
        Token::ToIntegerArray => UnaryOp::ToIntegerArray,
        Token::ToNumberArray => UnaryOp::ToNumberArray,
        Token::ToTable => UnaryOp::ToTable,
        Token::ToString => UnaryOp::ToString,
        Token::ToClosure => UnaryOp::ToClosure,
        Token::ToType(_) => UnaryOp::ToType,
        _ => return None,
    };
    Some(op)
}

/// Parse one chunk into `tree`, returning the root (vararg) function.
pub fn parse_chunk(
    source: &str,
    chunk_name: &str,
    tree: &mut SyntaxTree,
    pool: &mut StringPool,
) -> Result<FunctionId, CompilerError> {
    let mut parser = Parser {
        lexer: Lexer::new(source, chunk_name),
        tree,
        pool,
        current_function: None,
        current_scope: None,
    };
    parser.parse_chunk()
}

struct Parser<'a, 'src> {
    lexer: Lexer<'src>,
    tree: &'a mut SyntaxTree,
    pool: &'a mut StringPool,
    current_function: Option<FunctionId>,
    current_scope: Option<ScopeId>,
}

impl<'a, 'src> Parser<'a, 'src> {
    // ---------------- token plumbing ----------------

    fn advance(&mut self) -> Result<(), CompilerError> {
        self.lexer.advance(self.pool)
    }

    fn syntax_error(&self, message: impl std::fmt::Display) -> CompilerError {
        CompilerError::syntax(self.lexer.chunk_name(), self.lexer.line(), message)
    }

    fn error_expected(&self, token: &Token) -> CompilerError {
        self.syntax_error(format!("{} expected", token.describe(self.pool)))
    }

    /// Consume `expected` if it is the current token.
    fn test_next(&mut self, expected: &Token) -> Result<bool, CompilerError> {
        if self.lexer.current() == expected {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check(&self, expected: &Token) -> Result<(), CompilerError> {
        if self.lexer.current() == expected {
            Ok(())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn check_next(&mut self, expected: &Token) -> Result<(), CompilerError> {
        self.check(expected)?;
        self.advance()
    }

    /// Match a closing token against its opener, reporting the opening
    /// line when they differ.
    fn check_match(
        &mut self,
        what: &Token,
        who: &Token,
        where_line: u32,
    ) -> Result<(), CompilerError> {
        if self.test_next(what)? {
            return Ok(());
        }
        if where_line == self.lexer.line() {
            Err(self.error_expected(what))
        } else {
            Err(self.syntax_error(format!(
                "{} expected (to close {} at line {})",
                what.describe(self.pool),
                who.describe(self.pool),
                where_line
            )))
        }
    }

    /// Expect a `NAME` and consume it.
    fn check_name(&mut self) -> Result<Name, CompilerError> {
        match *self.lexer.current() {
            Token::Name(name) => {
                self.advance()?;
                Ok(name)
            }
            _ => Err(self.syntax_error("<name> expected")),
        }
    }

    // ---------------- arena helpers ----------------

    fn new_expr(&mut self, ty: ValueType, kind: ExprKind) -> ExprId {
        let line = self.lexer.last_line();
        self.tree.exprs.alloc(Expr { line, ty, kind })
    }

    fn new_stmt(&mut self, kind: StmtKind) -> StmtId {
        let line = self.lexer.last_line();
        self.tree.stmts.alloc(Stmt { line, kind })
    }

    fn func(&self) -> FunctionId {
        self.current_function.expect("no current function")
    }

    fn scope(&self) -> ScopeId {
        self.current_scope.expect("no current scope")
    }

    // ---------------- scopes and functions ----------------

    /// Start a new block scope. The first scope of a function becomes its
    /// main block; its parent may belong to the enclosing function.
    fn new_scope(&mut self) -> ScopeId {
        let function = self.func();
        let scope = self.tree.scopes.alloc(Scope {
            parent: self.current_scope,
            function,
            symbols: Vec::new(),
        });
        self.current_scope = Some(scope);
        let f = &mut self.tree.functions[function];
        if f.main_block.is_none() {
            f.main_block = Some(scope);
        }
        scope
    }

    fn end_scope(&mut self) {
        let scope = self.scope();
        self.current_scope = self.tree.scopes[scope].parent;
        debug_assert!(
            self.current_scope.is_some()
                || Some(scope) == self.tree.functions[self.func()].main_block
        );
    }

    /// Create a function expression nested in the current one (if any) and
    /// open its main scope.
    fn new_function(&mut self) -> FunctionId {
        let line = self.lexer.line();
        let function = self
            .tree
            .functions
            .alloc(FunctionExpr::new(line, self.current_function));
        if let Some(parent) = self.current_function {
            self.tree.functions[parent].child_functions.push(function);
        }
        self.current_function = Some(function);
        self.new_scope();
        function
    }

    fn end_function(&mut self) -> FunctionId {
        self.end_scope();
        let function = self.func();
        self.current_function = self.tree.functions[function].parent;
        function
    }

    // ---------------- symbols and resolution ----------------

    fn new_local_symbol(&mut self, name: Name, ty: ValueType) -> SymbolId {
        let scope = self.scope();
        self.tree.symbols.alloc(Symbol::Local { name, ty, scope })
    }

    /// Register a declared local in its scope and its function's local
    /// list.
    fn add_local_to_scope(&mut self, symbol: SymbolId) {
        let scope = self.scope();
        self.tree.scopes[scope].symbols.push(symbol);
        let function = self.func();
        self.tree.functions[function].locals.push(symbol);
    }

    /// Reverse-order search so the most recent declaration shadows older
    /// ones of the same name.
    fn search_in_scope(&self, scope: ScopeId, name: Name) -> Option<SymbolId> {
        self.tree.scopes[scope]
            .symbols
            .iter()
            .rev()
            .copied()
            .find(|&sym| matches!(self.tree.symbols[sym], Symbol::Local { name: n, .. } if n == name))
    }

    fn search_upvalue(&self, function: FunctionId, name: Name) -> Option<SymbolId> {
        self.tree.functions[function]
            .upvalues
            .iter()
            .copied()
            .find(|&up| {
                let Symbol::Upvalue { target, .. } = self.tree.symbols[up] else {
                    unreachable!("upvalue list holds only upvalues");
                };
                self.tree.symbol_name(target) == name
            })
    }

    /// Add an upvalue for `target` to `function` unless one exists.
    /// Returns true when a new entry was created.
    fn add_upvalue(&mut self, function: FunctionId, target: SymbolId) -> bool {
        debug_assert!(matches!(self.tree.symbols[target], Symbol::Local { .. }));
        let exists = self.tree.functions[function].upvalues.iter().any(|&up| {
            matches!(self.tree.symbols[up], Symbol::Upvalue { target: t, .. } if t == target)
        });
        if exists {
            return false;
        }
        let index = self.tree.functions[function].upvalues.len() as u32;
        let ty = self.tree.symbol_type(target);
        let upvalue = self.tree.symbols.alloc(Symbol::Upvalue {
            target,
            function,
            index,
            ty,
        });
        self.tree.functions[function].upvalues.push(upvalue);
        true
    }

    /// Ensure every function from `from` up to (excluding) `declarer` has
    /// an upvalue entry for `target`.
    fn add_upvalue_in_levels_upto(
        &mut self,
        from: FunctionId,
        declarer: FunctionId,
        target: SymbolId,
    ) {
        debug_assert_ne!(from, declarer);
        let mut current = Some(from);
        while let Some(function) = current {
            if function == declarer {
                break;
            }
            if !self.add_upvalue(function, target) {
                // This level already has it, so all levels above do too.
                break;
            }
            current = self.tree.functions[function].parent;
        }
    }

    /// Search scopes of the current function innermost-out, then its
    /// upvalues, then parent functions likewise. The flag reports whether
    /// the hit is a local of the starting function.
    fn search_for_variable(&self, name: Name) -> Option<(SymbolId, bool)> {
        let start_function = self.func();
        let mut scope = self.current_scope;
        while let Some(first) = scope {
            let function = self.tree.scopes[first].function;
            let mut cursor = Some(first);
            while let Some(sid) = cursor {
                if self.tree.scopes[sid].function != function {
                    break;
                }
                if let Some(symbol) = self.search_in_scope(sid, name) {
                    return Some((symbol, function == start_function));
                }
                cursor = self.tree.scopes[sid].parent;
            }
            if let Some(upvalue) = self.search_upvalue(function, name) {
                return Some((upvalue, false));
            }
            scope = cursor;
        }
        None
    }

    /// Resolve `NAME` into a symbol reference expression, materializing
    /// upvalue chains as needed; unresolved names become globals.
    fn new_symbol_reference(&mut self) -> Result<ExprId, CompilerError> {
        let name = self.check_name()?;
        let current = self.func();
        let symbol = match self.search_for_variable(name) {
            Some((symbol, is_local)) => {
                // (declarer, target) when upvalue entries must be threaded
                // through every level down to the user.
                let chain = match &self.tree.symbols[symbol] {
                    Symbol::Local { scope, .. } if !is_local => {
                        Some((self.tree.scopes[*scope].function, symbol))
                    }
                    Symbol::Upvalue {
                        function, target, ..
                    } if *function != current => Some((*function, *target)),
                    _ => None,
                };
                match chain {
                    Some((declarer, target)) => {
                        self.add_upvalue_in_levels_upto(current, declarer, target);
                        self.search_upvalue(current, name)
                            .expect("upvalue just materialized")
                    }
                    None => symbol,
                }
            }
            None => self.tree.symbols.alloc(Symbol::Global { name }),
        };
        let ty = self.tree.symbol_type(symbol);
        Ok(self.new_expr(ty, ExprKind::SymbolRef(symbol)))
    }

    // ---------------- expressions ----------------

    fn new_literal(&mut self, literal: Literal) -> ExprId {
        let tag = match literal {
            Literal::Nil => TypeTag::Nil,
            Literal::True | Literal::False => TypeTag::Boolean,
            Literal::Integer(_) => TypeTag::Integer,
            Literal::Float(_) => TypeTag::Number,
            Literal::Str(_) => TypeTag::String,
        };
        self.new_expr(ValueType::new(tag), ExprKind::Literal(literal))
    }

    fn new_string_literal(&mut self, name: Name) -> ExprId {
        self.new_literal(Literal::Str(name))
    }

    /// `['.' | ':'] NAME` — the dot or colon is already consumed.
    fn new_field_selector(&mut self, name: Name) -> ExprId {
        let literal = self.new_string_literal(name);
        self.new_expr(ValueType::any(), ExprKind::FieldSelector(literal))
    }

    fn parse_field_selector(&mut self) -> Result<ExprId, CompilerError> {
        self.advance()?; // skip '.' or ':'
        let name = self.check_name()?;
        Ok(self.new_field_selector(name))
    }

    /// `'[' expr ']'`
    fn parse_yindex(&mut self) -> Result<ExprId, CompilerError> {
        self.advance()?; // skip '['
        let expr = self.parse_expression()?;
        self.check_next(&Token::RBracket)?;
        Ok(self.new_expr(ValueType::any(), ExprKind::Index(expr)))
    }

    fn new_indexed_assign(&mut self, key: Option<ExprId>, value: ExprId) -> ExprId {
        let ty = self.tree.exprs[value].ty;
        self.new_expr(ty, ExprKind::TableElementAssign { key, value })
    }

    /// `recfield -> (NAME | '[' exp ']') = exp`
    fn parse_recfield(&mut self) -> Result<ExprId, CompilerError> {
        let key = if let Token::Name(name) = *self.lexer.current() {
            self.advance()?;
            self.new_field_selector(name)
        } else {
            self.parse_yindex()?
        };
        self.check_next(&Token::Assign)?;
        let value = self.parse_expression()?;
        Ok(self.new_indexed_assign(Some(key), value))
    }

    fn parse_field(&mut self) -> Result<ExprId, CompilerError> {
        match *self.lexer.current() {
            Token::Name(_) => {
                if *self.lexer.lookahead(self.pool)? == Token::Assign {
                    self.parse_recfield()
                } else {
                    let value = self.parse_expression()?;
                    Ok(self.new_indexed_assign(None, value))
                }
            }
            Token::LBracket => self.parse_recfield(),
            _ => {
                let value = self.parse_expression()?;
                Ok(self.new_indexed_assign(None, value))
            }
        }
    }

    /// `constructor -> '{' [ field { (',' | ';') field } [','|';'] ] '}'`
    fn parse_table_constructor(&mut self) -> Result<ExprId, CompilerError> {
        let line = self.lexer.line();
        self.check_next(&Token::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if *self.lexer.current() == Token::RBrace {
                break;
            }
            fields.push(self.parse_field()?);
            if !(self.test_next(&Token::Comma)? || self.test_next(&Token::Semicolon)?) {
                break;
            }
        }
        self.check_match(&Token::RBrace, &Token::LBrace, line)?;
        Ok(self.new_expr(
            ValueType::new(TypeTag::Table),
            ExprKind::Table { fields },
        ))
    }

    /// `NAME { '.' NAME }` — user-defined type names may be dotted.
    fn parse_user_type_name(&mut self, first: Name) -> Result<Name, CompilerError> {
        if !self.test_next(&Token::Dot)? {
            return Ok(first);
        }
        let mut full = self.pool.get(first).to_string();
        loop {
            let part = self.check_name()?;
            full.push('.');
            full.push_str(self.pool.get(part));
            if full.len() > MAX_TYPE_NAME {
                return Err(CompilerError::semantic(
                    self.lexer.chunk_name(),
                    self.lexer.line(),
                    "user-defined type name is too long",
                ));
            }
            if !self.test_next(&Token::Dot)? {
                break;
            }
        }
        Ok(self.pool.intern(&full))
    }

    /// `NAME [':' TYPE]` where TYPE is a builtin type keyword, optionally
    /// `[]`-suffixed for integer/number, or a (dotted) user type name.
    fn parse_local_variable_declaration(&mut self) -> Result<SymbolId, CompilerError> {
        let name = self.check_name()?;
        let mut ty = ValueType::any();
        if self.test_next(&Token::Colon)? {
            let type_name = self.check_name()?;
            ty = match self.pool.get(type_name) {
                "integer" => ValueType::new(TypeTag::Integer),
                "number" => ValueType::new(TypeTag::Number),
                "closure" => ValueType::new(TypeTag::Function),
                "table" => ValueType::new(TypeTag::Table),
                "string" => ValueType::new(TypeTag::String),
                "boolean" => ValueType::new(TypeTag::Boolean),
                "any" => ValueType::any(),
                _ => ValueType::user(self.parse_user_type_name(type_name)?),
            };
            if ty.is_numeric() && self.test_next(&Token::LBracket)? {
                self.check_next(&Token::RBracket)?;
                ty = ValueType::new(if ty.is_number() {
                    TypeTag::NumberArray
                } else {
                    TypeTag::IntegerArray
                });
            }
        }
        Ok(self.new_local_symbol(name, ty))
    }

    /// `parlist -> [ param { ',' param } ]`; returns is_vararg.
    fn parse_parameter_list(&mut self, function: FunctionId) -> Result<bool, CompilerError> {
        let mut is_vararg = false;
        if *self.lexer.current() == Token::RParen {
            return Ok(false);
        }
        loop {
            match *self.lexer.current() {
                Token::Name(_) => {
                    let symbol = self.parse_local_variable_declaration()?;
                    self.tree.functions[function].args.push(symbol);
                    self.add_local_to_scope(symbol);
                }
                Token::Ellipsis => {
                    self.advance()?;
                    is_vararg = true;
                }
                _ => return Err(self.syntax_error("<name> or '...' expected")),
            }
            if is_vararg || !self.test_next(&Token::Comma)? {
                break;
            }
        }
        Ok(is_vararg)
    }

    /// `body -> '(' parlist ')' block END`
    fn parse_function_body(
        &mut self,
        function: FunctionId,
        is_method: bool,
        line: u32,
    ) -> Result<(), CompilerError> {
        self.check_next(&Token::LParen)?;
        if is_method {
            let self_name = self.pool.intern("self");
            let symbol = self.new_local_symbol(self_name, ValueType::any());
            self.tree.functions[function].args.push(symbol);
            self.add_local_to_scope(symbol);
        }
        let is_vararg = self.parse_parameter_list(function)?;
        {
            let f = &mut self.tree.functions[function];
            f.is_vararg = is_vararg;
            f.is_method = is_method;
        }
        self.check_next(&Token::RParen)?;
        let mut body = Vec::new();
        self.parse_statement_list(&mut body)?;
        self.tree.functions[function].statements = body;
        self.check_match(&Token::End, &Token::Function, line)
    }

    /// `explist -> expr { ',' expr }`
    fn parse_expression_list(&mut self, list: &mut Vec<ExprId>) -> Result<(), CompilerError> {
        list.push(self.parse_expression()?);
        while self.test_next(&Token::Comma)? {
            list.push(self.parse_expression()?);
        }
        Ok(())
    }

    /// Call arguments: `'(' [explist] ')' | constructor | STRING`.
    fn parse_function_call(
        &mut self,
        method_name: Option<Name>,
        line: u32,
    ) -> Result<ExprId, CompilerError> {
        let mut args = Vec::new();
        match *self.lexer.current() {
            Token::LParen => {
                self.advance()?;
                if *self.lexer.current() != Token::RParen {
                    self.parse_expression_list(&mut args)?;
                }
                self.check_match(&Token::RParen, &Token::LParen, line)?;
            }
            Token::LBrace => {
                args.push(self.parse_table_constructor()?);
            }
            Token::Str(name) => {
                self.advance()?;
                args.push(self.new_string_literal(name));
            }
            _ => return Err(self.syntax_error("function arguments expected")),
        }
        Ok(self.new_expr(ValueType::any(), ExprKind::Call { method_name, args }))
    }

    /// `primaryexp -> NAME | '(' expr ')'`
    fn parse_primary_expression(&mut self) -> Result<ExprId, CompilerError> {
        match *self.lexer.current() {
            Token::LParen => {
                let line = self.lexer.line();
                self.advance()?;
                let expr = self.parse_expression()?;
                self.check_match(&Token::RParen, &Token::LParen, line)?;
                Ok(expr)
            }
            Token::Name(_) => self.new_symbol_reference(),
            _ => Err(self.syntax_error("unexpected symbol")),
        }
    }

    /// `suffixedexp -> primaryexp { '.' NAME | '[' exp ']' | ':' NAME
    /// funcargs | funcargs }`
    fn parse_suffixed_expression(&mut self) -> Result<ExprId, CompilerError> {
        let line = self.lexer.line();
        let primary = self.parse_primary_expression()?;
        let mut ty = self.tree.exprs[primary].ty;
        let mut suffixes = Vec::new();
        loop {
            match *self.lexer.current() {
                Token::Dot => {
                    suffixes.push(self.parse_field_selector()?);
                    ty = ValueType::any();
                }
                Token::LBracket => {
                    suffixes.push(self.parse_yindex()?);
                    ty = ValueType::any();
                }
                Token::Colon => {
                    self.advance()?;
                    let method = self.check_name()?;
                    suffixes.push(self.parse_function_call(Some(method), line)?);
                    ty = ValueType::any();
                }
                Token::LParen | Token::Str(_) | Token::LBrace => {
                    suffixes.push(self.parse_function_call(None, line)?);
                    ty = ValueType::any();
                }
                _ => break,
            }
        }
        Ok(self.new_expr(ty, ExprKind::Suffixed { primary, suffixes }))
    }

    /// `simpleexp -> FLT | INT | STRING | nil | true | false | '...' |
    /// constructor | function body | suffixedexp`
    fn parse_simple_expression(&mut self) -> Result<ExprId, CompilerError> {
        let expr = match *self.lexer.current() {
            Token::Float(value) => {
                self.advance()?;
                self.new_literal(Literal::Float(value))
            }
            Token::Integer(value) => {
                self.advance()?;
                self.new_literal(Literal::Integer(value))
            }
            Token::Str(name) => {
                self.advance()?;
                self.new_literal(Literal::Str(name))
            }
            Token::Nil => {
                self.advance()?;
                self.new_literal(Literal::Nil)
            }
            Token::True => {
                self.advance()?;
                self.new_literal(Literal::True)
            }
            Token::False => {
                self.advance()?;
                self.new_literal(Literal::False)
            }
            Token::Ellipsis => {
                return Err(self.syntax_error("var args not supported"));
            }
            Token::LBrace => self.parse_table_constructor()?,
            Token::Function => {
                let line = self.lexer.line();
                self.advance()?;
                let function = self.new_function();
                self.parse_function_body(function, false, line)?;
                self.end_function();
                self.new_expr(
                    ValueType::new(TypeTag::Function),
                    ExprKind::Function(function),
                )
            }
            _ => self.parse_suffixed_expression()?,
        };
        Ok(expr)
    }

    fn unary_result_type(&self, op: UnaryOp, operand: ExprId, user: Option<Name>) -> ValueType {
        let vt = self.tree.exprs[operand].ty;
        match op {
            UnaryOp::Not => ValueType::new(TypeTag::Boolean),
            UnaryOp::Minus => {
                if vt.is_numeric() {
                    vt
                } else {
                    ValueType::any()
                }
            }
            UnaryOp::BitNot => {
                if vt.is_integer() {
                    vt
                } else {
                    ValueType::any()
                }
            }
            UnaryOp::Len => ValueType::new(TypeTag::Integer),
            UnaryOp::ToInteger => ValueType::new(TypeTag::Integer),
            UnaryOp::ToNumber => ValueType::new(TypeTag::Number),
            UnaryOp::ToIntegerArray => ValueType::new(TypeTag::IntegerArray),
            UnaryOp::ToNumberArray => ValueType::new(TypeTag::NumberArray),
            UnaryOp::ToTable => ValueType::new(TypeTag::Table),
            UnaryOp::ToString => ValueType::new(TypeTag::String),
            UnaryOp::ToClosure => ValueType::new(TypeTag::Function),
            UnaryOp::ToType => ValueType::user(user.expect("user type name")),
        }
    }

    fn binary_result_type(&self, op: BinaryOp, left: ExprId, right: ExprId) -> ValueType {
        let lt = self.tree.exprs[left].ty;
        let rt = self.tree.exprs[right].ty;
        let both_int = lt.is_integer() && rt.is_integer();
        let both_numeric = lt.is_numeric() && rt.is_numeric();
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IntDiv => {
                if both_int {
                    ValueType::new(TypeTag::Integer)
                } else if both_numeric {
                    ValueType::new(TypeTag::Number)
                } else {
                    ValueType::any()
                }
            }
            BinaryOp::Mod => {
                if both_int {
                    ValueType::new(TypeTag::Integer)
                } else if both_numeric {
                    ValueType::new(TypeTag::Number)
                } else {
                    ValueType::any()
                }
            }
            BinaryOp::Pow => {
                if both_numeric {
                    ValueType::new(TypeTag::Number)
                } else {
                    ValueType::any()
                }
            }
            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Shl
            | BinaryOp::Shr => {
                if both_int {
                    ValueType::new(TypeTag::Integer)
                } else {
                    ValueType::any()
                }
            }
            BinaryOp::Concat => ValueType::new(TypeTag::String),
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => ValueType::new(TypeTag::Boolean),
            BinaryOp::And | BinaryOp::Or => {
                if lt == rt {
                    lt
                } else {
                    ValueType::any()
                }
            }
        }
    }

    /// `subexpr -> (simpleexp | unop subexpr) { binop subexpr }` with
    /// precedence climbing; returns the first untreated operator.
    fn parse_sub_expression(
        &mut self,
        limit: u8,
    ) -> Result<(ExprId, Option<BinaryOp>), CompilerError> {
        let mut expr = if let Some(uop) = unary_op(self.lexer.current()) {
            let user = match *self.lexer.current() {
                Token::ToType(name) => {
                    self.advance()?;
                    Some(self.parse_user_type_name(name)?)
                }
                _ => {
                    self.advance()?;
                    None
                }
            };
            let (operand, _) = self.parse_sub_expression(UNARY_PRIORITY)?;
            let ty = self.unary_result_type(uop, operand, user);
            self.new_expr(
                ty,
                ExprKind::Unary {
                    op: uop,
                    expr: operand,
                },
            )
        } else {
            self.parse_simple_expression()?
        };
        let mut op = binary_op(self.lexer.current());
        while let Some(bop) = op {
            if priority(bop).0 <= limit {
                break;
            }
            self.advance()?;
            let (right, next_op) = self.parse_sub_expression(priority(bop).1)?;
            let ty = self.binary_result_type(bop, expr, right);
            expr = self.new_expr(
                ty,
                ExprKind::Binary {
                    op: bop,
                    left: expr,
                    right,
                },
            );
            op = next_op;
        }
        Ok((expr, op))
    }

    fn parse_expression(&mut self) -> Result<ExprId, CompilerError> {
        let (expr, _) = self.parse_sub_expression(0)?;
        Ok(expr)
    }

    // ---------------- statements ----------------

    /// True when the current token ends a block; `until` only when asked.
    fn block_follow(&self, with_until: bool) -> bool {
        match self.lexer.current() {
            Token::Else | Token::Elseif | Token::End | Token::Eos => true,
            Token::Until => with_until,
            _ => false,
        }
    }

    fn parse_block(&mut self, body: &mut Vec<StmtId>) -> Result<ScopeId, CompilerError> {
        let scope = self.new_scope();
        self.parse_statement_list(body)?;
        self.end_scope();
        Ok(scope)
    }

    /// `goto NAME` or `break`; break records the sentinel label `break`.
    fn parse_goto_statement(&mut self) -> Result<StmtId, CompilerError> {
        let (label, is_break) = if self.test_next(&Token::Goto)? {
            (self.check_name()?, false)
        } else {
            self.advance()?; // skip 'break'
            (self.pool.intern("break"), true)
        };
        let scope = self.scope();
        Ok(self.new_stmt(StmtKind::Goto {
            label,
            is_break,
            scope,
        }))
    }

    fn skip_noop_statements(&mut self) -> Result<(), CompilerError> {
        while *self.lexer.current() == Token::Semicolon {
            self.advance()?;
        }
        Ok(())
    }

    /// `label -> '::' NAME '::'` (the first `::` and the name are already
    /// consumed).
    fn parse_label_statement(&mut self, label: Name) -> Result<StmtId, CompilerError> {
        self.check_next(&Token::DoubleColon)?;
        let scope = self.scope();
        let symbol = self.tree.symbols.alloc(Symbol::Label { name: label, scope });
        self.tree.scopes[scope].symbols.push(symbol);
        let stmt = self.new_stmt(StmtKind::Label { symbol });
        self.skip_noop_statements()?;
        Ok(stmt)
    }

    /// `whilestat -> while cond do block end`
    fn parse_while_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        self.advance()?; // skip 'while'
        let condition = self.parse_expression()?;
        self.check_next(&Token::Do)?;
        let mut body = Vec::new();
        let scope = self.parse_block(&mut body)?;
        self.check_match(&Token::End, &Token::While, line)?;
        Ok(self.new_stmt(StmtKind::While {
            condition,
            scope,
            body,
        }))
    }

    /// `repeatstat -> repeat block until cond`; the condition sees the
    /// loop scope.
    fn parse_repeat_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        self.advance()?; // skip 'repeat'
        let scope = self.new_scope();
        let mut body = Vec::new();
        self.parse_statement_list(&mut body)?;
        self.check_match(&Token::Until, &Token::Repeat, line)?;
        let condition = self.parse_expression()?;
        self.end_scope();
        Ok(self.new_stmt(StmtKind::Repeat {
            condition,
            scope,
            body,
        }))
    }

    /// `fornum -> NAME = exp1 ',' exp1 [',' exp1] do block end`
    fn parse_fornum_statement(
        &mut self,
        scope: ScopeId,
        var_name: Name,
    ) -> Result<StmtKind, CompilerError> {
        let var = self.new_local_symbol(var_name, ValueType::any());
        self.add_local_to_scope(var);
        self.check_next(&Token::Assign)?;
        let mut exprs = vec![self.parse_expression()?];
        self.check_next(&Token::Comma)?;
        exprs.push(self.parse_expression()?);
        if self.test_next(&Token::Comma)? {
            exprs.push(self.parse_expression()?);
        }
        self.check_next(&Token::Do)?;
        let mut body = Vec::new();
        let body_scope = self.parse_block(&mut body)?;
        Ok(StmtKind::ForNum {
            scope,
            var,
            exprs,
            body_scope,
            body,
        })
    }

    /// `forlist -> NAME {',' NAME} in explist do block end`
    fn parse_for_list(
        &mut self,
        scope: ScopeId,
        first_name: Name,
    ) -> Result<StmtKind, CompilerError> {
        let mut vars = Vec::new();
        let var = self.new_local_symbol(first_name, ValueType::any());
        self.add_local_to_scope(var);
        vars.push(var);
        while self.test_next(&Token::Comma)? {
            let name = self.check_name()?;
            let var = self.new_local_symbol(name, ValueType::any());
            self.add_local_to_scope(var);
            vars.push(var);
        }
        self.check_next(&Token::In)?;
        let mut exprs = Vec::new();
        self.parse_expression_list(&mut exprs)?;
        self.check_next(&Token::Do)?;
        let mut body = Vec::new();
        let body_scope = self.parse_block(&mut body)?;
        Ok(StmtKind::ForIn {
            scope,
            vars,
            exprs,
            body_scope,
            body,
        })
    }

    /// `forstat -> for (fornum | forlist) end`
    fn parse_for_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        let scope = self.new_scope(); // holds the loop variables
        self.advance()?; // skip 'for'
        let var_name = self.check_name()?;
        let kind = match *self.lexer.current() {
            Token::Assign => self.parse_fornum_statement(scope, var_name)?,
            Token::Comma | Token::In => self.parse_for_list(scope, var_name)?,
            _ => return Err(self.syntax_error("'=' or 'in' expected")),
        };
        self.check_match(&Token::End, &Token::For, line)?;
        self.end_scope();
        Ok(self.new_stmt(kind))
    }

    /// `test_then_block -> [if | elseif] cond then block`
    fn parse_if_cond_then_block(&mut self) -> Result<StmtId, CompilerError> {
        self.advance()?; // skip 'if' or 'elseif'
        let condition = self.parse_expression()?;
        self.check_next(&Token::Then)?;
        let mut body = Vec::new();
        let scope;
        if matches!(self.lexer.current(), Token::Goto | Token::Break) {
            scope = self.new_scope();
            body.push(self.parse_goto_statement()?);
            self.skip_noop_statements()?;
            if self.block_follow(false) {
                // The goto is the whole block.
                self.end_scope();
                return Ok(self.new_stmt(StmtKind::TestThen {
                    condition,
                    scope,
                    body,
                }));
            }
        } else {
            scope = self.new_scope();
        }
        self.parse_statement_list(&mut body)?;
        self.end_scope();
        Ok(self.new_stmt(StmtKind::TestThen {
            condition,
            scope,
            body,
        }))
    }

    /// `ifstat -> if cond then block {elseif cond then block} [else
    /// block] end`
    fn parse_if_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        let mut arms = vec![self.parse_if_cond_then_block()?];
        while *self.lexer.current() == Token::Elseif {
            arms.push(self.parse_if_cond_then_block()?);
        }
        let mut else_body = Vec::new();
        let else_scope = if self.test_next(&Token::Else)? {
            Some(self.parse_block(&mut else_body)?)
        } else {
            None
        };
        self.check_match(&Token::End, &Token::If, line)?;
        Ok(self.new_stmt(StmtKind::If {
            arms,
            else_scope,
            else_body,
        }))
    }

    /// `local function NAME body` — parsed as `local NAME; NAME =
    /// function body` so the body can refer to itself.
    fn parse_local_function_statement(&mut self) -> Result<StmtId, CompilerError> {
        let name = self.check_name()?;
        let symbol = self.new_local_symbol(name, ValueType::new(TypeTag::Function));
        self.add_local_to_scope(symbol);
        let line = self.lexer.line();
        let function = self.new_function();
        self.parse_function_body(function, false, line)?;
        self.end_function();
        let func_expr = self.new_expr(
            ValueType::new(TypeTag::Function),
            ExprKind::Function(function),
        );
        Ok(self.new_stmt(StmtKind::Local {
            vars: vec![symbol],
            exprs: vec![func_expr],
        }))
    }

    /// `localstat -> local NAME [':' TYPE] {',' NAME [':' TYPE]} ['='
    /// explist]`
    fn parse_local_statement(&mut self) -> Result<StmtId, CompilerError> {
        let mut vars = Vec::new();
        loop {
            vars.push(self.parse_local_variable_declaration()?);
            if vars.len() >= MAXVARS {
                return Err(self.syntax_error("too many local variables"));
            }
            if !self.test_next(&Token::Comma)? {
                break;
            }
        }
        let mut exprs = Vec::new();
        if self.test_next(&Token::Assign)? {
            self.parse_expression_list(&mut exprs)?;
        }
        // Locals enter scope only after the initializers are parsed, so
        // `local x = x` reads the outer x.
        for &var in &vars {
            self.add_local_to_scope(var);
        }
        Ok(self.new_stmt(StmtKind::Local { vars, exprs }))
    }

    /// `funcname -> NAME {'.' NAME} [':' NAME]`
    fn parse_function_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        self.advance()?; // skip 'function'
        let name = self.new_symbol_reference()?;
        let mut selectors = Vec::new();
        while *self.lexer.current() == Token::Dot {
            selectors.push(self.parse_field_selector()?);
        }
        let method_name = if *self.lexer.current() == Token::Colon {
            Some(self.parse_field_selector()?)
        } else {
            None
        };
        let is_method = method_name.is_some();
        let function = self.new_function();
        self.parse_function_body(function, is_method, line)?;
        self.end_function();
        Ok(self.new_stmt(StmtKind::FunctionDecl {
            name,
            selectors,
            method_name,
            function,
        }))
    }

    /// Function call or (multi-)assignment; until `=` shows up we do not
    /// know which.
    fn parse_expression_statement(&mut self) -> Result<StmtId, CompilerError> {
        let mut first = vec![self.parse_suffixed_expression()?];
        while self.test_next(&Token::Comma)? {
            first.push(self.parse_suffixed_expression()?);
        }
        let (vars, exprs) = if self.test_next(&Token::Assign)? {
            let mut exprs = Vec::new();
            self.parse_expression_list(&mut exprs)?;
            (first, exprs)
        } else {
            (Vec::new(), first)
        };
        Ok(self.new_stmt(StmtKind::Expression { vars, exprs }))
    }

    /// `retstat -> return [explist] [';']`
    fn parse_return_statement(&mut self) -> Result<StmtId, CompilerError> {
        let mut exprs = Vec::new();
        if !(self.block_follow(true) || *self.lexer.current() == Token::Semicolon) {
            self.parse_expression_list(&mut exprs)?;
        }
        self.test_next(&Token::Semicolon)?;
        Ok(self.new_stmt(StmtKind::Return { exprs }))
    }

    fn parse_do_statement(&mut self, line: u32) -> Result<StmtId, CompilerError> {
        self.advance()?; // skip 'do'
        let mut body = Vec::new();
        let scope = self.parse_block(&mut body)?;
        self.check_match(&Token::End, &Token::Do, line)?;
        Ok(self.new_stmt(StmtKind::Do { scope, body }))
    }

    fn parse_statement(&mut self) -> Result<Option<StmtId>, CompilerError> {
        let line = self.lexer.line();
        let stmt = match *self.lexer.current() {
            Token::Semicolon => {
                self.advance()?;
                return Ok(None);
            }
            Token::If => self.parse_if_statement(line)?,
            Token::While => self.parse_while_statement(line)?,
            Token::Do => self.parse_do_statement(line)?,
            Token::For => self.parse_for_statement(line)?,
            Token::Repeat => self.parse_repeat_statement(line)?,
            Token::Function => self.parse_function_statement(line)?,
            Token::Local => {
                self.advance()?;
                if self.test_next(&Token::Function)? {
                    self.parse_local_function_statement()?
                } else {
                    self.parse_local_statement()?
                }
            }
            Token::DoubleColon => {
                self.advance()?;
                let label = self.check_name()?;
                self.parse_label_statement(label)?
            }
            Token::Return => {
                self.advance()?;
                self.parse_return_statement()?
            }
            Token::Break | Token::Goto => self.parse_goto_statement()?,
            _ => self.parse_expression_statement()?,
        };
        Ok(Some(stmt))
    }

    /// `statlist -> { stat [';'] }`; `return` ends the list.
    fn parse_statement_list(&mut self, list: &mut Vec<StmtId>) -> Result<(), CompilerError> {
        while !self.block_follow(true) {
            let was_return = *self.lexer.current() == Token::Return;
            if let Some(stmt) = self.parse_statement()? {
                list.push(stmt);
            }
            if was_return {
                break;
            }
        }
        Ok(())
    }

    /// The whole chunk is wrapped in a vararg function.
    fn parse_chunk(&mut self) -> Result<FunctionId, CompilerError> {
        self.advance()?; // read first token
        let main = self.new_function();
        self.tree.functions[main].is_vararg = true;
        let mut body = Vec::new();
        self.parse_statement_list(&mut body)?;
        self.tree.functions[main].statements = body;
        self.end_function();
        debug_assert!(self.current_function.is_none());
        debug_assert!(self.current_scope.is_none());
        self.check(&Token::Eos)?;
        self.tree.root = Some(main);
        Ok(main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind, Symbol};

    fn parse(source: &str) -> (SyntaxTree, StringPool, FunctionId) {
        let mut tree = SyntaxTree::new();
        let mut pool = StringPool::new();
        let main = parse_chunk(source, "test", &mut tree, &mut pool).expect("parse failed");
        (tree, pool, main)
    }

    fn parse_error(source: &str) -> CompilerError {
        let mut tree = SyntaxTree::new();
        let mut pool = StringPool::new();
        parse_chunk(source, "test", &mut tree, &mut pool).expect_err("expected a parse error")
    }

    #[test]
    fn test_empty_chunk_is_vararg_with_root_scope() {
        let (tree, _, main) = parse("");
        let f = &tree.functions[main];
        assert!(f.is_vararg);
        assert!(f.statements.is_empty());
        let scope = f.main_block.expect("root scope");
        assert!(tree.scopes[scope].symbols.is_empty());
        assert_eq!(tree.scopes[scope].function, main);
    }

    #[test]
    fn test_typed_local_declarations() {
        let (tree, _, main) = parse("local a: integer, b: number[], c: geo.Point = 1, {}, nil");
        let f = &tree.functions[main];
        assert_eq!(f.locals.len(), 3);
        let tys: Vec<TypeTag> = f
            .locals
            .iter()
            .map(|&s| tree.symbol_type(s).tag)
            .collect();
        assert_eq!(
            tys,
            vec![TypeTag::Integer, TypeTag::NumberArray, TypeTag::UserData]
        );
    }

    #[test]
    fn test_user_type_name_round_trips() {
        let (tree, pool, main) = parse("local p: geo.shapes.Point");
        let f = &tree.functions[main];
        let ty = tree.symbol_type(f.locals[0]);
        assert_eq!(pool.get(ty.name.unwrap()), "geo.shapes.Point");
    }

    #[test]
    fn test_reverse_shadowing_resolves_latest_declaration() {
        let (tree, _, main) = parse("local x = 1 local x = 2 return x");
        let f = &tree.functions[main];
        assert_eq!(f.locals.len(), 2);
        let Some(&ret) = f.statements.last() else {
            panic!()
        };
        let StmtKind::Return { exprs } = &tree.stmts[ret].kind else {
            panic!("expected return")
        };
        let ExprKind::Suffixed { primary, .. } = &tree.exprs[exprs[0]].kind else {
            panic!("expected suffixed")
        };
        let ExprKind::SymbolRef(sym) = tree.exprs[*primary].kind else {
            panic!("expected symbol ref")
        };
        assert_eq!(sym, f.locals[1], "latest declaration wins");
    }

    #[test]
    fn test_local_initializer_sees_outer_binding() {
        let (tree, _, main) = parse("local x = 1 do local x = x end");
        let outer = tree.functions[main].locals[0];
        let Some(&do_stmt) = tree.functions[main].statements.last() else {
            panic!()
        };
        let StmtKind::Do { body, .. } = &tree.stmts[do_stmt].kind else {
            panic!()
        };
        let StmtKind::Local { exprs, .. } = &tree.stmts[body[0]].kind else {
            panic!()
        };
        let ExprKind::Suffixed { primary, .. } = &tree.exprs[exprs[0]].kind else {
            panic!()
        };
        let ExprKind::SymbolRef(sym) = tree.exprs[*primary].kind else {
            panic!()
        };
        assert_eq!(sym, outer);
    }

    #[test]
    fn test_unresolved_name_becomes_global() {
        let (tree, pool, main) = parse("print(1)");
        let f = &tree.functions[main];
        let StmtKind::Expression { exprs, .. } = &tree.stmts[f.statements[0]].kind else {
            panic!()
        };
        let ExprKind::Suffixed { primary, .. } = &tree.exprs[exprs[0]].kind else {
            panic!()
        };
        let ExprKind::SymbolRef(sym) = tree.exprs[*primary].kind else {
            panic!()
        };
        let Symbol::Global { name } = tree.symbols[sym] else {
            panic!("expected global")
        };
        assert_eq!(pool.get(name), "print");
        // Globals never enter scopes.
        let scope = f.main_block.unwrap();
        assert!(tree.scopes[scope].symbols.is_empty());
    }

    #[test]
    fn test_upvalue_materialized_for_closure() {
        let (tree, _, main) = parse("local x = 1 return function() return x end");
        let child = tree.functions[main].child_functions[0];
        let ups = &tree.functions[child].upvalues;
        assert_eq!(ups.len(), 1);
        let Symbol::Upvalue { target, index, .. } = tree.symbols[ups[0]] else {
            panic!()
        };
        assert_eq!(index, 0);
        assert_eq!(target, tree.functions[main].locals[0]);
    }

    #[test]
    fn test_transitive_upvalue_chain_is_complete() {
        let (tree, _, main) =
            parse("local x = 1 return function() return function() return x end end");
        let mid = tree.functions[main].child_functions[0];
        let inner = tree.functions[mid].child_functions[0];
        let target = tree.functions[main].locals[0];
        for f in [mid, inner] {
            let ups = &tree.functions[f].upvalues;
            assert_eq!(ups.len(), 1, "every level carries the upvalue");
            let Symbol::Upvalue {
                target: t, index, ..
            } = tree.symbols[ups[0]]
            else {
                panic!()
            };
            assert_eq!(t, target);
            assert_eq!(index, 0);
        }
    }

    #[test]
    fn test_upvalue_deduplicated_on_reuse() {
        let (tree, _, main) = parse("local x = 1 return function() return x + x end");
        let child = tree.functions[main].child_functions[0];
        assert_eq!(tree.functions[child].upvalues.len(), 1);
    }

    #[test]
    fn test_sibling_closures_get_own_upvalue_entries() {
        let (tree, _, main) = parse(
            "local x = 1 local y = 2 return function() return x + y end",
        );
        let child = tree.functions[main].child_functions[0];
        let ups = &tree.functions[child].upvalues;
        assert_eq!(ups.len(), 2);
        let indices: Vec<u32> = ups
            .iter()
            .map(|&u| {
                let Symbol::Upvalue { index, .. } = tree.symbols[u] else {
                    panic!()
                };
                index
            })
            .collect();
        assert_eq!(indices, vec![0, 1], "dense insertion-order indices");
    }

    #[test]
    fn test_return_must_be_last() {
        // A statement after return fails when the block continues.
        let err = parse_error("return 1 local x = 2");
        assert!(err.message().contains("expected"));
    }

    #[test]
    fn test_operator_precedence_shape() {
        // 1 + 2 * 3 parses as 1 + (2 * 3).
        let (tree, _, main) = parse("return 1 + 2 * 3");
        let StmtKind::Return { exprs } = &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &tree.exprs[exprs[0]].kind else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Add);
        let ExprKind::Binary { op: rop, .. } = &tree.exprs[*right].kind else {
            panic!("rhs should be the multiplication")
        };
        assert_eq!(*rop, BinaryOp::Mul);
    }

    #[test]
    fn test_power_is_right_associative() {
        let (tree, _, main) = parse("return 2 ^ 3 ^ 4");
        let StmtKind::Return { exprs } = &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        let ExprKind::Binary { op, left, right } = &tree.exprs[exprs[0]].kind else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(tree.exprs[*left].kind, ExprKind::Literal(_)));
        assert!(matches!(
            tree.exprs[*right].kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn test_typed_arithmetic_types_flow() {
        let (tree, _, main) = parse("local a: integer = 1 local b: integer = 2 return a + b");
        let StmtKind::Return { exprs } = &tree.stmts[tree.functions[main].statements[2]].kind
        else {
            panic!()
        };
        assert_eq!(tree.exprs[exprs[0]].ty.tag, TypeTag::Integer);
    }

    #[test]
    fn test_method_declaration_injects_self() {
        let (tree, pool, main) = parse("t = {} function t:m() return self end");
        let child = tree.functions[main].child_functions[0];
        let f = &tree.functions[child];
        assert!(f.is_method);
        assert_eq!(f.args.len(), 1);
        assert_eq!(pool.get(tree.symbol_name(f.args[0])), "self");
    }

    #[test]
    fn test_break_records_sentinel_label() {
        let (tree, pool, main) = parse("while true do break end");
        let StmtKind::While { body, .. } = &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        let StmtKind::Goto {
            label, is_break, ..
        } = tree.stmts[body[0]].kind
        else {
            panic!()
        };
        assert!(is_break);
        assert_eq!(pool.get(label), "break");
    }

    #[test]
    fn test_goto_and_label() {
        let (tree, pool, main) = parse("::top:: x = x + 1 goto top");
        let stmts = &tree.functions[main].statements;
        let StmtKind::Label { symbol } = tree.stmts[stmts[0]].kind else {
            panic!()
        };
        assert_eq!(pool.get(tree.symbol_name(symbol)), "top");
        let StmtKind::Goto { is_break, .. } = tree.stmts[stmts[2]].kind else {
            panic!()
        };
        assert!(!is_break);
    }

    #[test]
    fn test_varargs_expression_is_rejected() {
        let err = parse_error("local a = ...");
        assert!(err.message().contains("var args not supported"));
    }

    #[test]
    fn test_too_many_locals_rejected() {
        let names: Vec<String> = (0..130).map(|i| format!("v{i}")).collect();
        let source = format!("local {}", names.join(", "));
        let err = parse_error(&source);
        assert!(err.message().contains("too many local variables"));
    }

    #[test]
    fn test_missing_end_reports_opening_line() {
        let err = parse_error("while true do\nlocal x = 1\n");
        assert!(err.message().contains("to close"));
        assert!(err.message().contains("line 1"));
    }

    #[test]
    fn test_multi_assignment_parses() {
        let (tree, _, main) = parse("a, b = 1, 2");
        let StmtKind::Expression { vars, exprs } =
            &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        assert_eq!(vars.len(), 2);
        assert_eq!(exprs.len(), 2);
    }

    #[test]
    fn test_if_elseif_else_arms() {
        let (tree, _, main) = parse("if a then x = 1 elseif b then x = 2 else x = 3 end");
        let StmtKind::If {
            arms, else_scope, ..
        } = &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        assert_eq!(arms.len(), 2);
        assert!(else_scope.is_some());
    }

    #[test]
    fn test_method_call_sugar() {
        let (tree, pool, main) = parse("o:m(1)");
        let StmtKind::Expression { exprs, .. } =
            &tree.stmts[tree.functions[main].statements[0]].kind
        else {
            panic!()
        };
        let ExprKind::Suffixed { suffixes, .. } = &tree.exprs[exprs[0]].kind else {
            panic!()
        };
        let ExprKind::Call { method_name, args } = &tree.exprs[suffixes[0]].kind else {
            panic!()
        };
        assert_eq!(pool.get(method_name.unwrap()), "m");
        assert_eq!(args.len(), 1);
    }
}
