//! Read-only walkers over the syntax tree and the IR
//!
//! Downstream consumers (code generators, tests) traverse the parsed
//! chunk through these accessors instead of matching on node internals.
//! The `as_*` downcasts are checked: callers narrow the tag first and a
//! mismatch is a caller bug, reported by panic.

use crate::ast::{
    BinaryOp, ExprId, ExprKind, FunctionId, Literal, ScopeId, StmtId, StmtKind, SymbolId,
    SyntaxTree, UnaryOp,
};
use crate::intern::Name;
use crate::ir::{BasicBlock, Instruction, Module, Proc, ProcId};

/// View of one `if`/`elseif` arm.
pub struct TestThenView<'t> {
    pub condition: ExprId,
    pub scope: ScopeId,
    pub body: &'t [StmtId],
}

/// View of an `if` statement.
pub struct IfView<'t> {
    pub arms: &'t [StmtId],
    pub else_scope: Option<ScopeId>,
    pub else_body: &'t [StmtId],
}

/// View of a `while` or `repeat` loop.
pub struct LoopView<'t> {
    pub condition: ExprId,
    pub scope: ScopeId,
    pub body: &'t [StmtId],
}

/// View of a numeric `for`.
pub struct ForNumView<'t> {
    pub scope: ScopeId,
    pub var: SymbolId,
    pub exprs: &'t [ExprId],
    pub body_scope: ScopeId,
    pub body: &'t [StmtId],
}

/// View of a generic `for`.
pub struct ForInView<'t> {
    pub scope: ScopeId,
    pub vars: &'t [SymbolId],
    pub exprs: &'t [ExprId],
    pub body_scope: ScopeId,
    pub body: &'t [StmtId],
}

/// View of a `function name.sel:m() ... end` statement.
pub struct FunctionDeclView<'t> {
    pub name: ExprId,
    pub selectors: &'t [ExprId],
    pub method_name: Option<ExprId>,
    pub function: FunctionId,
}

impl SyntaxTree {
    /// The top-level chunk function. Panics when nothing was parsed.
    pub fn main_function(&self) -> FunctionId {
        self.root.expect("no parsed chunk")
    }

    pub fn function_is_vararg(&self, f: FunctionId) -> bool {
        self.functions[f].is_vararg
    }

    pub fn function_is_method(&self, f: FunctionId) -> bool {
        self.functions[f].is_method
    }

    pub fn function_parent(&self, f: FunctionId) -> Option<FunctionId> {
        self.functions[f].parent
    }

    /// Root scope of the function.
    pub fn function_scope(&self, f: FunctionId) -> ScopeId {
        self.functions[f].main_block.expect("function has no scope")
    }

    pub fn function_children(&self, f: FunctionId) -> &[FunctionId] {
        &self.functions[f].child_functions
    }

    pub fn function_statements(&self, f: FunctionId) -> &[StmtId] {
        &self.functions[f].statements
    }

    pub fn function_args(&self, f: FunctionId) -> &[SymbolId] {
        &self.functions[f].args
    }

    pub fn function_locals(&self, f: FunctionId) -> &[SymbolId] {
        &self.functions[f].locals
    }

    pub fn function_upvalues(&self, f: FunctionId) -> &[SymbolId] {
        &self.functions[f].upvalues
    }

    // ---- statement downcasts ----

    pub fn as_return(&self, s: StmtId) -> &[ExprId] {
        match &self.stmts[s].kind {
            StmtKind::Return { exprs } => exprs,
            other => panic!("expected return statement, found {:?}", other),
        }
    }

    pub fn as_goto(&self, s: StmtId) -> (Name, bool, ScopeId) {
        match self.stmts[s].kind {
            StmtKind::Goto {
                label,
                is_break,
                scope,
            } => (label, is_break, scope),
            ref other => panic!("expected goto statement, found {:?}", other),
        }
    }

    pub fn as_label(&self, s: StmtId) -> SymbolId {
        match self.stmts[s].kind {
            StmtKind::Label { symbol } => symbol,
            ref other => panic!("expected label statement, found {:?}", other),
        }
    }

    pub fn as_do(&self, s: StmtId) -> (ScopeId, &[StmtId]) {
        match &self.stmts[s].kind {
            StmtKind::Do { scope, body } => (*scope, body),
            other => panic!("expected do statement, found {:?}", other),
        }
    }

    pub fn as_test_then(&self, s: StmtId) -> TestThenView<'_> {
        match &self.stmts[s].kind {
            StmtKind::TestThen {
                condition,
                scope,
                body,
            } => TestThenView {
                condition: *condition,
                scope: *scope,
                body,
            },
            other => panic!("expected test-then arm, found {:?}", other),
        }
    }

    pub fn as_if(&self, s: StmtId) -> IfView<'_> {
        match &self.stmts[s].kind {
            StmtKind::If {
                arms,
                else_scope,
                else_body,
            } => IfView {
                arms,
                else_scope: *else_scope,
                else_body,
            },
            other => panic!("expected if statement, found {:?}", other),
        }
    }

    pub fn as_while(&self, s: StmtId) -> LoopView<'_> {
        match &self.stmts[s].kind {
            StmtKind::While {
                condition,
                scope,
                body,
            } => LoopView {
                condition: *condition,
                scope: *scope,
                body,
            },
            other => panic!("expected while statement, found {:?}", other),
        }
    }

    pub fn as_repeat(&self, s: StmtId) -> LoopView<'_> {
        match &self.stmts[s].kind {
            StmtKind::Repeat {
                condition,
                scope,
                body,
            } => LoopView {
                condition: *condition,
                scope: *scope,
                body,
            },
            other => panic!("expected repeat statement, found {:?}", other),
        }
    }

    pub fn as_for_num(&self, s: StmtId) -> ForNumView<'_> {
        match &self.stmts[s].kind {
            StmtKind::ForNum {
                scope,
                var,
                exprs,
                body_scope,
                body,
            } => ForNumView {
                scope: *scope,
                var: *var,
                exprs,
                body_scope: *body_scope,
                body,
            },
            other => panic!("expected numeric for, found {:?}", other),
        }
    }

    pub fn as_for_in(&self, s: StmtId) -> ForInView<'_> {
        match &self.stmts[s].kind {
            StmtKind::ForIn {
                scope,
                vars,
                exprs,
                body_scope,
                body,
            } => ForInView {
                scope: *scope,
                vars,
                exprs,
                body_scope: *body_scope,
                body,
            },
            other => panic!("expected generic for, found {:?}", other),
        }
    }

    pub fn as_local(&self, s: StmtId) -> (&[SymbolId], &[ExprId]) {
        match &self.stmts[s].kind {
            StmtKind::Local { vars, exprs } => (vars, exprs),
            other => panic!("expected local statement, found {:?}", other),
        }
    }

    pub fn as_expression_stmt(&self, s: StmtId) -> (&[ExprId], &[ExprId]) {
        match &self.stmts[s].kind {
            StmtKind::Expression { vars, exprs } => (vars, exprs),
            other => panic!("expected expression statement, found {:?}", other),
        }
    }

    pub fn as_function_decl(&self, s: StmtId) -> FunctionDeclView<'_> {
        match &self.stmts[s].kind {
            StmtKind::FunctionDecl {
                name,
                selectors,
                method_name,
                function,
            } => FunctionDeclView {
                name: *name,
                selectors,
                method_name: *method_name,
                function: *function,
            },
            other => panic!("expected function statement, found {:?}", other),
        }
    }

    // ---- expression downcasts ----

    pub fn as_literal(&self, e: ExprId) -> Literal {
        match self.exprs[e].kind {
            ExprKind::Literal(lit) => lit,
            ref other => panic!("expected literal, found {:?}", other),
        }
    }

    pub fn as_symbol_ref(&self, e: ExprId) -> SymbolId {
        match self.exprs[e].kind {
            ExprKind::SymbolRef(sym) => sym,
            ref other => panic!("expected symbol reference, found {:?}", other),
        }
    }

    pub fn as_index(&self, e: ExprId) -> ExprId {
        match self.exprs[e].kind {
            ExprKind::Index(key) => key,
            ref other => panic!("expected index expression, found {:?}", other),
        }
    }

    pub fn as_field_selector(&self, e: ExprId) -> ExprId {
        match self.exprs[e].kind {
            ExprKind::FieldSelector(name) => name,
            ref other => panic!("expected field selector, found {:?}", other),
        }
    }

    pub fn as_unary(&self, e: ExprId) -> (UnaryOp, ExprId) {
        match self.exprs[e].kind {
            ExprKind::Unary { op, expr } => (op, expr),
            ref other => panic!("expected unary expression, found {:?}", other),
        }
    }

    pub fn as_binary(&self, e: ExprId) -> (BinaryOp, ExprId, ExprId) {
        match self.exprs[e].kind {
            ExprKind::Binary { op, left, right } => (op, left, right),
            ref other => panic!("expected binary expression, found {:?}", other),
        }
    }

    pub fn as_function_expr(&self, e: ExprId) -> FunctionId {
        match self.exprs[e].kind {
            ExprKind::Function(f) => f,
            ref other => panic!("expected function expression, found {:?}", other),
        }
    }

    pub fn as_call(&self, e: ExprId) -> (Option<Name>, &[ExprId]) {
        match &self.exprs[e].kind {
            ExprKind::Call { method_name, args } => (*method_name, args),
            other => panic!("expected call expression, found {:?}", other),
        }
    }

    pub fn as_suffixed(&self, e: ExprId) -> (ExprId, &[ExprId]) {
        match &self.exprs[e].kind {
            ExprKind::Suffixed { primary, suffixes } => (*primary, suffixes),
            other => panic!("expected suffixed expression, found {:?}", other),
        }
    }

    pub fn as_table(&self, e: ExprId) -> &[ExprId] {
        match &self.exprs[e].kind {
            ExprKind::Table { fields } => fields,
            other => panic!("expected table constructor, found {:?}", other),
        }
    }

    pub fn as_table_element(&self, e: ExprId) -> (Option<ExprId>, ExprId) {
        match self.exprs[e].kind {
            ExprKind::TableElementAssign { key, value } => (key, value),
            ref other => panic!("expected table element, found {:?}", other),
        }
    }
}

impl Module {
    /// The top-level procedure.
    pub fn main(&self) -> ProcId {
        self.main_proc.expect("module has no main proc")
    }

    /// Procedures in creation (id) order.
    pub fn procedures(&self) -> Vec<ProcId> {
        let mut ids: Vec<ProcId> = self.procs.iter().map(|(id, _)| id).collect();
        ids.sort_by_key(|&id| self.procs[id].id);
        ids
    }
}

impl Proc {
    /// Non-deleted blocks in id order.
    pub fn live_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| !b.insns.is_empty())
    }

    /// Every instruction in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.insns.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::StringPool;
    use crate::parser::parse_chunk;

    fn parse(source: &str) -> (SyntaxTree, StringPool) {
        let mut tree = SyntaxTree::new();
        let mut pool = StringPool::new();
        parse_chunk(source, "test", &mut tree, &mut pool).expect("parse failed");
        (tree, pool)
    }

    #[test]
    fn test_walk_local_and_return() {
        let (tree, _) = parse("local a: integer = 1 return a");
        let main = tree.main_function();
        let stmts = tree.function_statements(main);
        let (vars, exprs) = tree.as_local(stmts[0]);
        assert_eq!(vars.len(), 1);
        assert_eq!(exprs.len(), 1);
        assert_eq!(tree.as_literal(exprs[0]), Literal::Integer(1));
        let ret = tree.as_return(stmts[1]);
        let (primary, suffixes) = tree.as_suffixed(ret[0]);
        assert!(suffixes.is_empty());
        assert_eq!(tree.as_symbol_ref(primary), vars[0]);
    }

    #[test]
    fn test_walk_if_arms() {
        let (tree, _) = parse("if a then return 1 else return 2 end");
        let main = tree.main_function();
        let stmts = tree.function_statements(main);
        let view = tree.as_if(stmts[0]);
        assert_eq!(view.arms.len(), 1);
        let arm = tree.as_test_then(view.arms[0]);
        assert_eq!(arm.body.len(), 1);
        assert_eq!(view.else_body.len(), 1);
    }

    #[test]
    fn test_walk_function_nest() {
        let (tree, pool) = parse("local f = function(a, b) return a end");
        let main = tree.main_function();
        let children = tree.function_children(main);
        assert_eq!(children.len(), 1);
        let child = children[0];
        assert!(!tree.function_is_vararg(child));
        assert_eq!(tree.function_parent(child), Some(main));
        assert_eq!(tree.function_args(child).len(), 2);
        assert_eq!(pool.get(tree.symbol_name(tree.function_args(child)[0])), "a");
    }

    #[test]
    #[should_panic(expected = "expected return statement")]
    fn test_downcast_mismatch_panics() {
        let (tree, _) = parse("local a = 1");
        let main = tree.main_function();
        tree.as_return(tree.function_statements(main)[0]);
    }

    #[test]
    fn test_ir_walk() {
        let (tree, _) = parse("local x = 1 return function() return x end");
        let module = crate::linearizer::linearize(&tree, "test", "main").unwrap();
        let procs = module.procedures();
        assert_eq!(procs.len(), 2);
        let main = &module.procs[module.main()];
        assert!(main.instructions().count() > 0);
        for block in main.live_blocks() {
            assert!(!block.insns.is_empty());
        }
    }
}
