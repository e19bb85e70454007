//! Linearizer: lowers the syntax tree to typed IR
//!
//! Each function expression becomes a [`Proc`] with an entry basic block;
//! the walk appends instructions to the procedure's current block and
//! opens new blocks at control-flow fan-outs and joins. Operand static
//! types select specialized opcodes (`addii`, `iaget_ikey`, ...); scratch
//! values come from per-class pseudo generators whose freed registers are
//! reused LIFO, keeping every class compact.

use crate::ast::{
    BinaryOp, ExprId, ExprKind, FunctionId, Literal, ScopeId, StmtId, StmtKind, Symbol, SymbolId,
    SyntaxTree, UnaryOp,
};
use crate::diagnostics::CompilerError;
use crate::intern::Name;
use crate::ir::{BlockId, ConstantValue, Module, Opcode, Proc, ProcId, Pseudo};
use crate::types::TypeTag;

/// Lower a parsed chunk into a module of procedures. `main_name` names
/// the top-level closure constructor.
pub fn linearize(tree: &SyntaxTree, chunk: &str, main_name: &str) -> Result<Module, CompilerError> {
    let root = tree
        .root
        .ok_or_else(|| CompilerError::semantic(chunk, 0, "no parsed chunk"))?;
    let mut lin = Linearizer {
        tree,
        chunk,
        module: Module::new(),
        next_proc_id: 0,
    };
    let main = lin.new_proc(root, None, Some(main_name.to_string()));
    lin.linearize_proc(main)?;
    lin.module.main_proc = Some(main);
    tracing::debug!(target: "tarnc", procs = lin.module.procs.len(), "linearized chunk");
    Ok(lin.module)
}

/// The destination of one assignment.
enum StoreTarget {
    /// Local, upvalue or global variable.
    Symbol(SymbolId),
    /// `recv[key] = v` / `recv.name = v`.
    Indexed { receiver: Pseudo, key: Pseudo },
}

struct Linearizer<'a> {
    tree: &'a SyntaxTree,
    chunk: &'a str,
    module: Module,
    next_proc_id: u32,
}

impl<'a> Linearizer<'a> {
    // ---------------- procedure plumbing ----------------

    fn new_proc(
        &mut self,
        function: FunctionId,
        parent: Option<ProcId>,
        name: Option<String>,
    ) -> ProcId {
        let id = self.next_proc_id;
        self.next_proc_id += 1;
        let name = name.unwrap_or_else(|| format!("proc{}", id));
        let proc = self.module.procs.alloc(Proc::new(id, name, function, parent));
        if let Some(parent) = parent {
            self.module.procs[parent].sub_procs.push(proc);
        }
        proc
    }

    fn proc(&self, p: ProcId) -> &Proc {
        &self.module.procs[p]
    }

    fn proc_mut(&mut self, p: ProcId) -> &mut Proc {
        &mut self.module.procs[p]
    }

    fn emit(&mut self, p: ProcId, opcode: Opcode, operands: Vec<Pseudo>, targets: Vec<Pseudo>) {
        self.proc_mut(p).emit(opcode, operands, targets);
    }

    fn set_current(&mut self, p: ProcId, block: BlockId) {
        self.proc_mut(p).current_block = block;
    }

    fn create_block(&mut self, p: ProcId) -> BlockId {
        self.proc_mut(p).create_block()
    }

    /// Branch to `block` unless the current block already ended.
    fn branch(&mut self, p: ProcId, block: BlockId) {
        if !self.proc(p).current_block_terminated() {
            self.emit(p, Opcode::Br, vec![], vec![Pseudo::Block(block)]);
        }
    }

    fn linearize_proc(&mut self, p: ProcId) -> Result<(), CompilerError> {
        let tree = self.tree;
        let function = self.proc(p).function;
        for &arg in &tree.functions[function].args {
            self.allocate_local(p, arg);
        }
        for &stmt in &tree.functions[function].statements {
            self.lin_stmt(p, stmt)?;
        }
        if !self.proc(p).current_block_terminated() {
            self.emit(p, Opcode::Ret, vec![], vec![]);
        }
        Ok(())
    }

    // ---------------- register bookkeeping ----------------

    fn allocate_local(&mut self, p: ProcId, symbol: SymbolId) {
        let reg = self.proc_mut(p).local_pseudos.allocate();
        self.proc_mut(p).local_registers.insert(symbol, reg);
    }

    /// Release the registers of locals declared in `scope`, newest first.
    fn release_scope_locals(&mut self, p: ProcId, scope: ScopeId) {
        let tree = self.tree;
        for &symbol in tree.scopes[scope].symbols.iter().rev() {
            if !matches!(tree.symbols[symbol], Symbol::Local { .. }) {
                continue;
            }
            if let Some(&reg) = self.proc(p).local_registers.get(&symbol) {
                self.proc_mut(p).local_pseudos.release(reg);
            }
        }
    }

    fn new_temp(&mut self, p: ProcId, tag: TypeTag) -> Pseudo {
        let proc = self.proc_mut(p);
        match tag {
            TypeTag::Integer => Pseudo::TempInt(proc.temp_int_pseudos.allocate()),
            TypeTag::Number => Pseudo::TempFlt(proc.temp_flt_pseudos.allocate()),
            // Boolean temps share the integer numbering.
            TypeTag::Boolean => Pseudo::TempBool(proc.temp_int_pseudos.allocate()),
            _ => Pseudo::TempAny(proc.temp_any_pseudos.allocate()),
        }
    }

    fn free_temp(&mut self, p: ProcId, pseudo: Pseudo) {
        let proc = self.proc_mut(p);
        match pseudo {
            Pseudo::TempInt(r) | Pseudo::TempBool(r) => proc.temp_int_pseudos.release(r),
            Pseudo::TempFlt(r) => proc.temp_flt_pseudos.release(r),
            Pseudo::TempAny(r) | Pseudo::Range(r) => proc.temp_any_pseudos.release(r),
            Pseudo::RangeSelect { base, .. } => proc.temp_any_pseudos.release(base),
            _ => {}
        }
    }

    /// Narrow a multi-value range to its first value.
    fn single(&self, pseudo: Pseudo) -> Pseudo {
        match pseudo {
            Pseudo::Range(base) => Pseudo::RangeSelect { base, offset: 0 },
            other => other,
        }
    }

    fn pseudo_type(&self, p: ProcId, pseudo: &Pseudo) -> TypeTag {
        match *pseudo {
            Pseudo::Symbol(s) => self.tree.symbol_type(s).tag,
            Pseudo::TempInt(_) => TypeTag::Integer,
            Pseudo::TempFlt(_) => TypeTag::Number,
            Pseudo::TempBool(_) => TypeTag::Boolean,
            Pseudo::TempAny(_)
            | Pseudo::Range(_)
            | Pseudo::RangeSelect { .. }
            | Pseudo::Stack(_) => TypeTag::Any,
            Pseudo::Constant(c) => match self.proc(p).constant(c).value {
                ConstantValue::Integer(_) => TypeTag::Integer,
                ConstantValue::Number(_) => TypeTag::Number,
                ConstantValue::Str(_) => TypeTag::String,
            },
            Pseudo::Proc(_) => TypeTag::Function,
            Pseudo::Nil => TypeTag::Nil,
            Pseudo::True | Pseudo::False => TypeTag::Boolean,
            Pseudo::Block(_) => unreachable!("block pseudos are jump targets, not typed values"),
        }
    }

    // ---------------- expressions ----------------

    fn lin_expr(&mut self, p: ProcId, expr: ExprId) -> Result<Pseudo, CompilerError> {
        let tree = self.tree;
        let node = &tree.exprs[expr];
        match &node.kind {
            ExprKind::Literal(lit) => Ok(self.lin_literal(p, *lit)),
            ExprKind::SymbolRef(symbol) => Ok(self.lin_symbol_ref(p, *symbol)),
            ExprKind::Unary { op, expr: operand } => self.lin_unary(p, *op, *operand, expr),
            ExprKind::Binary { op, left, right } => self.lin_binary(p, *op, *left, *right),
            ExprKind::Function(function) => self.lin_function_expr(p, *function),
            ExprKind::Suffixed { primary, suffixes } => self.lin_suffixed(p, *primary, suffixes),
            ExprKind::Table { .. } => self.lin_table_constructor(p, expr),
            ExprKind::Index(_)
            | ExprKind::FieldSelector(_)
            | ExprKind::Call { .. }
            | ExprKind::TableElementAssign { .. } => {
                unreachable!("suffix nodes are lowered by their owners")
            }
        }
    }

    fn lin_literal(&mut self, p: ProcId, literal: Literal) -> Pseudo {
        match literal {
            Literal::Nil => Pseudo::Nil,
            Literal::True => Pseudo::True,
            Literal::False => Pseudo::False,
            Literal::Integer(i) => {
                Pseudo::Constant(self.proc_mut(p).add_constant(ConstantValue::Integer(i)))
            }
            Literal::Float(n) => {
                Pseudo::Constant(self.proc_mut(p).add_constant(ConstantValue::Number(n)))
            }
            Literal::Str(s) => {
                Pseudo::Constant(self.proc_mut(p).add_constant(ConstantValue::Str(s)))
            }
        }
    }

    /// Locals and upvalues are referenced directly; globals load through
    /// `loadglobal` into an untyped temp.
    fn lin_symbol_ref(&mut self, p: ProcId, symbol: SymbolId) -> Pseudo {
        if matches!(self.tree.symbols[symbol], Symbol::Global { .. }) {
            let target = self.new_temp(p, TypeTag::Any);
            self.emit(
                p,
                Opcode::LoadGlobal,
                vec![Pseudo::Symbol(symbol)],
                vec![target],
            );
            target
        } else {
            Pseudo::Symbol(symbol)
        }
    }

    fn lin_unary(
        &mut self,
        p: ProcId,
        op: UnaryOp,
        operand: ExprId,
        expr: ExprId,
    ) -> Result<Pseudo, CompilerError> {
        let value = self.lin_expr(p, operand)?;
        let value = self.single(value);
        let vt = self.pseudo_type(p, &value);
        let (opcode, result) = match op {
            UnaryOp::Minus => match vt {
                TypeTag::Integer => (Opcode::UnmI, TypeTag::Integer),
                TypeTag::Number => (Opcode::UnmF, TypeTag::Number),
                _ => (Opcode::Unm, TypeTag::Any),
            },
            UnaryOp::Not => (Opcode::Not, TypeTag::Boolean),
            UnaryOp::BitNot => (
                Opcode::BNot,
                if vt == TypeTag::Integer {
                    TypeTag::Integer
                } else {
                    TypeTag::Any
                },
            ),
            UnaryOp::Len => match vt {
                TypeTag::Table | TypeTag::IntegerArray | TypeTag::NumberArray => {
                    (Opcode::LenI, TypeTag::Integer)
                }
                _ => (Opcode::Len, TypeTag::Integer),
            },
            UnaryOp::ToInteger => (Opcode::ToInt, TypeTag::Integer),
            UnaryOp::ToNumber => (Opcode::ToFlt, TypeTag::Number),
            UnaryOp::ToIntegerArray => (Opcode::ToIArray, TypeTag::IntegerArray),
            UnaryOp::ToNumberArray => (Opcode::ToFArray, TypeTag::NumberArray),
            UnaryOp::ToTable => (Opcode::ToTable, TypeTag::Table),
            UnaryOp::ToString => (Opcode::ToString, TypeTag::String),
            UnaryOp::ToClosure => (Opcode::ToClosure, TypeTag::Function),
            UnaryOp::ToType => (Opcode::ToType, TypeTag::UserData),
        };
        let mut operands = vec![value];
        if op == UnaryOp::ToType {
            // The checked type name travels as a string constant.
            if let Some(name) = self.tree.exprs[expr].ty.name {
                let c = self.proc_mut(p).add_constant(ConstantValue::Str(name));
                operands.push(Pseudo::Constant(c));
            }
        }
        let target = self.new_temp(p, result);
        self.emit(p, opcode, operands, vec![target]);
        self.free_temp(p, value);
        Ok(target)
    }

    fn lin_binary(
        &mut self,
        p: ProcId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> Result<Pseudo, CompilerError> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lin_and_or(p, op, left, right);
        }
        // `a > b` is `b < a`; `a >= b` is `b <= a`.
        let (op, left, right) = match op {
            BinaryOp::Greater => (BinaryOp::Less, right, left),
            BinaryOp::GreaterEqual => (BinaryOp::LessEqual, right, left),
            _ => (op, left, right),
        };
        let lhs = self.lin_expr(p, left)?;
        let lhs = self.single(lhs);
        let rhs = self.lin_expr(p, right)?;
        let rhs = self.single(rhs);
        let lt = self.pseudo_type(p, &lhs);
        let rt = self.pseudo_type(p, &rhs);
        let (opcode, result, swap) = select_binary_opcode(op, lt, rt);
        let (a, b) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let target = self.new_temp(p, result);
        self.emit(p, opcode, vec![a, b], vec![target]);
        self.free_temp(p, a);
        self.free_temp(p, b);
        Ok(target)
    }

    /// Short-circuit `and`/`or`: the right operand is evaluated in its
    /// own block entered only when the left does not decide the result.
    fn lin_and_or(
        &mut self,
        p: ProcId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> Result<Pseudo, CompilerError> {
        let lhs = self.lin_expr(p, left)?;
        let lhs = self.single(lhs);
        let result = self.new_temp(p, TypeTag::Any);
        self.emit(p, Opcode::Mov, vec![lhs], vec![result]);
        self.free_temp(p, lhs);
        let rhs_block = self.create_block(p);
        let done = self.create_block(p);
        let targets = if op == BinaryOp::And {
            vec![Pseudo::Block(rhs_block), Pseudo::Block(done)]
        } else {
            vec![Pseudo::Block(done), Pseudo::Block(rhs_block)]
        };
        self.emit(p, Opcode::Cbr, vec![result], targets);
        self.set_current(p, rhs_block);
        let rhs = self.lin_expr(p, right)?;
        let rhs = self.single(rhs);
        self.emit(p, Opcode::Mov, vec![rhs], vec![result]);
        self.free_temp(p, rhs);
        self.branch(p, done);
        self.set_current(p, done);
        Ok(result)
    }

    fn lin_function_expr(&mut self, p: ProcId, function: FunctionId) -> Result<Pseudo, CompilerError> {
        let sub = self.new_proc(function, Some(p), None);
        self.linearize_proc(sub)?;
        let target = self.new_temp(p, TypeTag::Any);
        self.emit(p, Opcode::Closure, vec![Pseudo::Proc(sub)], vec![target]);
        Ok(target)
    }

    fn lin_suffixed(
        &mut self,
        p: ProcId,
        primary: ExprId,
        suffixes: &[ExprId],
    ) -> Result<Pseudo, CompilerError> {
        let mut value = self.lin_expr(p, primary)?;
        for &suffix in suffixes {
            value = self.single(value);
            value = self.lin_suffix(p, value, suffix)?;
        }
        Ok(value)
    }

    /// Apply one selector or call suffix to `receiver`.
    fn lin_suffix(
        &mut self,
        p: ProcId,
        receiver: Pseudo,
        suffix: ExprId,
    ) -> Result<Pseudo, CompilerError> {
        let tree = self.tree;
        match &tree.exprs[suffix].kind {
            ExprKind::FieldSelector(name_expr) => {
                let key = self.lin_expr(p, *name_expr)?;
                Ok(self.emit_indexed_load(p, receiver, key))
            }
            ExprKind::Index(key_expr) => {
                let key = self.lin_expr(p, *key_expr)?;
                let key = self.single(key);
                Ok(self.emit_indexed_load(p, receiver, key))
            }
            ExprKind::Call { method_name, args } => self.lin_call(p, receiver, *method_name, args),
            _ => unreachable!("not a suffix node"),
        }
    }

    fn emit_indexed_load(&mut self, p: ProcId, receiver: Pseudo, key: Pseudo) -> Pseudo {
        let rt = self.pseudo_type(p, &receiver);
        let kt = self.pseudo_type(p, &key);
        let (opcode, result) = select_get_opcode(rt, kt);
        let target = self.new_temp(p, result);
        self.emit(p, opcode, vec![receiver, key], vec![target]);
        self.free_temp(p, receiver);
        self.free_temp(p, key);
        target
    }

    /// Calls produce a register range for their multi-value results; the
    /// consumer narrows with a range-select or passes the range through.
    fn lin_call(
        &mut self,
        p: ProcId,
        callee_or_receiver: Pseudo,
        method_name: Option<Name>,
        args: &[ExprId],
    ) -> Result<Pseudo, CompilerError> {
        let mut operands = Vec::with_capacity(args.len() + 2);
        match method_name {
            Some(method) => {
                // o:m(...) -> load m from o, call with o first.
                let key =
                    Pseudo::Constant(self.proc_mut(p).add_constant(ConstantValue::Str(method)));
                let rt = self.pseudo_type(p, &callee_or_receiver);
                let (opcode, _) = select_get_opcode(rt, TypeTag::String);
                let callee = self.new_temp(p, TypeTag::Any);
                self.emit(p, opcode, vec![callee_or_receiver, key], vec![callee]);
                operands.push(callee);
                operands.push(callee_or_receiver);
            }
            None => operands.push(callee_or_receiver),
        }
        let n = args.len();
        for (i, &arg) in args.iter().enumerate() {
            let value = self.lin_expr(p, arg)?;
            // The last argument may pass its whole range along.
            let value = if i + 1 == n { value } else { self.single(value) };
            operands.push(value);
        }
        let base = self.proc_mut(p).temp_any_pseudos.allocate();
        self.emit(p, Opcode::Call, operands.clone(), vec![Pseudo::Range(base)]);
        for operand in operands {
            self.free_temp(p, operand);
        }
        Ok(Pseudo::Range(base))
    }

    /// `{ ... }` in a dynamically-typed position: a fresh table plus one
    /// put per field; positional fields count from 1.
    fn lin_table_constructor(&mut self, p: ProcId, expr: ExprId) -> Result<Pseudo, CompilerError> {
        let tree = self.tree;
        let ExprKind::Table { fields } = &tree.exprs[expr].kind else {
            unreachable!("not a table constructor");
        };
        let target = self.new_temp(p, TypeTag::Any);
        self.emit(p, Opcode::NewTable, vec![], vec![target]);
        let mut list_index: i64 = 1;
        for &field in fields {
            let ExprKind::TableElementAssign { key, value } = &tree.exprs[field].kind else {
                unreachable!("table field");
            };
            let key_pseudo = match key {
                Some(key_expr) => match &tree.exprs[*key_expr].kind {
                    ExprKind::FieldSelector(name_expr) => self.lin_expr(p, *name_expr)?,
                    ExprKind::Index(e) => {
                        let k = self.lin_expr(p, *e)?;
                        self.single(k)
                    }
                    _ => unreachable!("table key"),
                },
                None => {
                    let c = self
                        .proc_mut(p)
                        .add_constant(ConstantValue::Integer(list_index));
                    list_index += 1;
                    Pseudo::Constant(c)
                }
            };
            let v = self.lin_expr(p, *value)?;
            let v = self.single(v);
            let kt = self.pseudo_type(p, &key_pseudo);
            let vt = self.pseudo_type(p, &v);
            let opcode = select_put_opcode(TypeTag::Table, kt, vt);
            self.emit(p, opcode, vec![key_pseudo, v], vec![target]);
            self.free_temp(p, key_pseudo);
            self.free_temp(p, v);
        }
        Ok(target)
    }

    /// `{...}` initializing an `integer[]`/`number[]` local: the array is
    /// created straight into the symbol and positional stores use the
    /// value-specialized put.
    fn lin_array_constructor(
        &mut self,
        p: ProcId,
        expr: ExprId,
        symbol: SymbolId,
        array_tag: TypeTag,
    ) -> Result<(), CompilerError> {
        let tree = self.tree;
        let ExprKind::Table { fields } = &tree.exprs[expr].kind else {
            unreachable!("not a table constructor");
        };
        let new_op = if array_tag == TypeTag::IntegerArray {
            Opcode::NewIArray
        } else {
            Opcode::NewFArray
        };
        let target = Pseudo::Symbol(symbol);
        self.emit(p, new_op, vec![], vec![target]);
        let mut list_index: i64 = 1;
        for &field in fields {
            let ExprKind::TableElementAssign { key, value } = &tree.exprs[field].kind else {
                unreachable!("table field");
            };
            let key_pseudo = match key {
                Some(key_expr) => match &tree.exprs[*key_expr].kind {
                    ExprKind::FieldSelector(name_expr) => self.lin_expr(p, *name_expr)?,
                    ExprKind::Index(e) => {
                        let k = self.lin_expr(p, *e)?;
                        self.single(k)
                    }
                    _ => unreachable!("table key"),
                },
                None => {
                    let c = self
                        .proc_mut(p)
                        .add_constant(ConstantValue::Integer(list_index));
                    list_index += 1;
                    Pseudo::Constant(c)
                }
            };
            let v = self.lin_expr(p, *value)?;
            let v = self.single(v);
            let vt = self.pseudo_type(p, &v);
            let opcode = select_put_opcode(array_tag, TypeTag::Integer, vt);
            self.emit(p, opcode, vec![key_pseudo, v], vec![target]);
            self.free_temp(p, key_pseudo);
            self.free_temp(p, v);
        }
        Ok(())
    }

    // ---------------- assignments ----------------

    /// Store `value` into a named variable, picking the move or coercion
    /// opcode from the declared and incoming types.
    fn emit_store_symbol(&mut self, p: ProcId, symbol: SymbolId, value: Pseudo) {
        let vt = self.pseudo_type(p, &value);
        self.emit_store_symbol_typed(p, symbol, value, vt);
    }

    /// As [`Self::emit_store_symbol`], with the incoming type supplied by
    /// the caller (used where the value is statically better known than
    /// its register class, e.g. a fresh closure in an untyped temp).
    fn emit_store_symbol_typed(&mut self, p: ProcId, symbol: SymbolId, value: Pseudo, vt: TypeTag) {
        if matches!(self.tree.symbols[symbol], Symbol::Global { .. }) {
            self.emit(
                p,
                Opcode::StoreGlobal,
                vec![value],
                vec![Pseudo::Symbol(symbol)],
            );
            return;
        }
        let decl = self.tree.symbol_type(symbol);
        let opcode = select_store_symbol_opcode(decl.tag, vt);
        let mut operands = vec![value];
        if opcode == Opcode::ToType {
            if let Some(name) = decl.name {
                let c = self.proc_mut(p).add_constant(ConstantValue::Str(name));
                operands.push(Pseudo::Constant(c));
            }
        }
        self.emit(p, opcode, operands, vec![Pseudo::Symbol(symbol)]);
    }

    /// Declared-but-uninitialized locals: numeric types start at zero,
    /// everything else at nil.
    fn emit_default_init(&mut self, p: ProcId, symbol: SymbolId) {
        let decl = self.tree.symbol_type(symbol);
        match decl.tag {
            TypeTag::Integer => {
                let c = self.proc_mut(p).add_constant(ConstantValue::Integer(0));
                self.emit(
                    p,
                    Opcode::MovI,
                    vec![Pseudo::Constant(c)],
                    vec![Pseudo::Symbol(symbol)],
                );
            }
            TypeTag::Number => {
                let c = self.proc_mut(p).add_constant(ConstantValue::Number(0.0));
                self.emit(
                    p,
                    Opcode::MovF,
                    vec![Pseudo::Constant(c)],
                    vec![Pseudo::Symbol(symbol)],
                );
            }
            _ => {
                self.emit(p, Opcode::Mov, vec![Pseudo::Nil], vec![Pseudo::Symbol(symbol)]);
            }
        }
    }

    /// Lower an assignment target: either a bare symbol reference or an
    /// indexed store through a suffix chain.
    fn lin_assignment_target(
        &mut self,
        p: ProcId,
        expr: ExprId,
    ) -> Result<StoreTarget, CompilerError> {
        let tree = self.tree;
        let line = tree.exprs[expr].line;
        let ExprKind::Suffixed { primary, suffixes } = &tree.exprs[expr].kind else {
            return Err(CompilerError::semantic(
                self.chunk,
                line,
                "cannot assign to this expression",
            ));
        };
        if suffixes.is_empty() {
            let ExprKind::SymbolRef(symbol) = tree.exprs[*primary].kind else {
                return Err(CompilerError::semantic(
                    self.chunk,
                    line,
                    "cannot assign to this expression",
                ));
            };
            return Ok(StoreTarget::Symbol(symbol));
        }
        // All suffixes but the last are loads; the last must be a
        // selector.
        let mut receiver = self.lin_expr(p, *primary)?;
        for &suffix in &suffixes[..suffixes.len() - 1] {
            receiver = self.single(receiver);
            receiver = self.lin_suffix(p, receiver, suffix)?;
        }
        receiver = self.single(receiver);
        let last = *suffixes.last().unwrap();
        let key = match &tree.exprs[last].kind {
            ExprKind::FieldSelector(name_expr) => self.lin_expr(p, *name_expr)?,
            ExprKind::Index(key_expr) => {
                let k = self.lin_expr(p, *key_expr)?;
                self.single(k)
            }
            _ => {
                return Err(CompilerError::semantic(
                    self.chunk,
                    line,
                    "cannot assign to a function call",
                ));
            }
        };
        Ok(StoreTarget::Indexed { receiver, key })
    }

    fn emit_store(&mut self, p: ProcId, target: &StoreTarget, value: Pseudo) {
        match *target {
            StoreTarget::Symbol(symbol) => self.emit_store_symbol(p, symbol, value),
            StoreTarget::Indexed { receiver, key } => {
                let rt = self.pseudo_type(p, &receiver);
                let kt = self.pseudo_type(p, &key);
                let vt = self.pseudo_type(p, &value);
                let opcode = select_put_opcode(rt, kt, vt);
                self.emit(p, opcode, vec![key, value], vec![receiver]);
            }
        }
    }

    fn free_store_target(&mut self, p: ProcId, target: StoreTarget) {
        if let StoreTarget::Indexed { receiver, key } = target {
            self.free_temp(p, receiver);
            self.free_temp(p, key);
        }
    }

    /// Evaluate `exprs` into exactly `want` single values; a trailing
    /// call range fills remaining slots, missing values become nil,
    /// extras are discarded. The second list holds each scratch value to
    /// release (once) after the values have been consumed.
    fn lin_expr_list(
        &mut self,
        p: ProcId,
        exprs: &[ExprId],
        want: usize,
    ) -> Result<(Vec<Pseudo>, Vec<Pseudo>), CompilerError> {
        let mut out = Vec::with_capacity(want);
        let mut to_free = Vec::new();
        let n = exprs.len();
        for (i, &expr) in exprs.iter().enumerate() {
            let value = self.lin_expr(p, expr)?;
            if out.len() >= want {
                let value = self.single(value);
                self.free_temp(p, value);
                continue;
            }
            if i + 1 == n && out.len() + 1 < want {
                if let Pseudo::Range(base) = value {
                    let mut offset = 0;
                    while out.len() < want {
                        out.push(Pseudo::RangeSelect { base, offset });
                        offset += 1;
                    }
                    to_free.push(Pseudo::Range(base));
                    continue;
                }
            }
            let value = self.single(value);
            out.push(value);
            to_free.push(value);
        }
        while out.len() < want {
            out.push(Pseudo::Nil);
        }
        Ok((out, to_free))
    }

    // ---------------- statements ----------------

    fn lin_stmt(&mut self, p: ProcId, stmt: StmtId) -> Result<(), CompilerError> {
        let tree = self.tree;
        let node = &tree.stmts[stmt];
        match &node.kind {
            StmtKind::Local { vars, exprs } => self.lin_local(p, vars, exprs),
            StmtKind::Expression { vars, exprs } => self.lin_expression_stmt(p, vars, exprs),
            StmtKind::Return { exprs } => self.lin_return(p, exprs),
            StmtKind::Do { scope, body } => {
                for &s in body {
                    self.lin_stmt(p, s)?;
                }
                self.release_scope_locals(p, *scope);
                Ok(())
            }
            StmtKind::If {
                arms,
                else_scope,
                else_body,
            } => self.lin_if(p, arms, *else_scope, else_body),
            StmtKind::While {
                condition,
                scope,
                body,
            } => self.lin_while(p, *condition, *scope, body),
            StmtKind::Repeat {
                condition,
                scope,
                body,
            } => self.lin_repeat(p, *condition, *scope, body),
            StmtKind::ForNum {
                scope,
                var,
                exprs,
                body_scope,
                body,
            } => self.lin_for_num(p, *scope, *var, exprs, *body_scope, body),
            StmtKind::ForIn {
                scope,
                vars,
                exprs,
                body_scope,
                body,
            } => self.lin_for_in(p, *scope, vars, exprs, *body_scope, body),
            StmtKind::Goto {
                label,
                is_break,
                scope: _,
            } => self.lin_goto(p, *label, *is_break, node.line),
            StmtKind::Label { symbol } => {
                let name = tree.symbol_name(*symbol);
                let block = self.label_block(p, name);
                self.branch(p, block);
                self.set_current(p, block);
                Ok(())
            }
            StmtKind::FunctionDecl {
                name,
                selectors,
                method_name,
                function,
            } => self.lin_function_decl(p, *name, selectors, *method_name, *function),
            StmtKind::TestThen { .. } => unreachable!("test-then arms live inside if"),
        }
    }

    fn lin_local(
        &mut self,
        p: ProcId,
        vars: &[SymbolId],
        exprs: &[ExprId],
    ) -> Result<(), CompilerError> {
        let tree = self.tree;
        for &var in vars {
            self.allocate_local(p, var);
        }
        let n_vars = vars.len();
        let n_exprs = exprs.len();
        let mut range_base: Option<u32> = None;
        for (i, &expr) in exprs.iter().enumerate() {
            if i >= n_vars {
                // Surplus initializer: evaluate for effect.
                let value = self.lin_expr(p, expr)?;
                let value = self.single(value);
                self.free_temp(p, value);
                continue;
            }
            let var = vars[i];
            let decl = tree.symbol_type(var);
            if decl.is_typed_array() && matches!(tree.exprs[expr].kind, ExprKind::Table { .. }) {
                self.lin_array_constructor(p, expr, var, decl.tag)?;
                continue;
            }
            let mut value = self.lin_expr(p, expr)?;
            if i + 1 == n_exprs && n_vars > n_exprs {
                if let Pseudo::Range(base) = value {
                    range_base = Some(base);
                    value = Pseudo::RangeSelect { base, offset: 0 };
                }
            }
            let value = if range_base.is_some() {
                value
            } else {
                self.single(value)
            };
            if matches!(tree.exprs[expr].kind, ExprKind::Function(_)) {
                // A fresh closure sits in an untyped temp; its type is
                // still statically known.
                self.emit_store_symbol_typed(p, var, value, TypeTag::Function);
            } else {
                self.emit_store_symbol(p, var, value);
            }
            if range_base.is_none() {
                self.free_temp(p, value);
            }
        }
        if n_exprs == 0 {
            // No initializers at all: every var gets its default.
            for &var in vars {
                self.emit_default_init(p, var);
            }
        } else {
            for (i, &var) in vars.iter().enumerate().skip(n_exprs) {
                match range_base {
                    Some(base) => {
                        let offset = (i - (n_exprs - 1)) as u32;
                        self.emit_store_symbol(p, var, Pseudo::RangeSelect { base, offset });
                    }
                    None => self.emit_default_init(p, var),
                }
            }
        }
        if let Some(base) = range_base {
            self.proc_mut(p).temp_any_pseudos.release(base);
        }
        Ok(())
    }

    fn lin_expression_stmt(
        &mut self,
        p: ProcId,
        vars: &[ExprId],
        exprs: &[ExprId],
    ) -> Result<(), CompilerError> {
        if vars.is_empty() {
            for &expr in exprs {
                let value = self.lin_expr(p, expr)?;
                let value = self.single(value);
                self.free_temp(p, value);
            }
            return Ok(());
        }
        let mut targets = Vec::with_capacity(vars.len());
        for &var in vars {
            targets.push(self.lin_assignment_target(p, var)?);
        }
        let (values, to_free) = self.lin_expr_list(p, exprs, vars.len())?;
        for (target, value) in targets.iter().zip(values.iter()) {
            self.emit_store(p, target, *value);
        }
        for value in to_free {
            self.free_temp(p, value);
        }
        for target in targets {
            self.free_store_target(p, target);
        }
        Ok(())
    }

    /// `ret` takes the returned values; a trailing call passes its whole
    /// range through.
    fn lin_return(&mut self, p: ProcId, exprs: &[ExprId]) -> Result<(), CompilerError> {
        let mut operands = Vec::with_capacity(exprs.len());
        let n = exprs.len();
        for (i, &expr) in exprs.iter().enumerate() {
            let value = self.lin_expr(p, expr)?;
            let value = if i + 1 == n { value } else { self.single(value) };
            operands.push(value);
        }
        self.emit(p, Opcode::Ret, operands.clone(), vec![]);
        for value in operands {
            self.free_temp(p, value);
        }
        Ok(())
    }

    /// Chain of test blocks, each `cbr`-ing to its arm or the next test,
    /// all arms ending in a common join block.
    fn lin_if(
        &mut self,
        p: ProcId,
        arms: &[StmtId],
        else_scope: Option<ScopeId>,
        else_body: &[StmtId],
    ) -> Result<(), CompilerError> {
        let tree = self.tree;
        let join = self.create_block(p);
        for &arm in arms {
            let StmtKind::TestThen {
                condition,
                scope,
                body,
            } = &tree.stmts[arm].kind
            else {
                unreachable!("if arm");
            };
            let cond = self.lin_expr(p, *condition)?;
            let cond = self.single(cond);
            let then_block = self.create_block(p);
            let next_block = self.create_block(p);
            self.emit(
                p,
                Opcode::Cbr,
                vec![cond],
                vec![Pseudo::Block(then_block), Pseudo::Block(next_block)],
            );
            self.free_temp(p, cond);
            self.set_current(p, then_block);
            for &s in body {
                self.lin_stmt(p, s)?;
            }
            self.release_scope_locals(p, *scope);
            self.branch(p, join);
            self.set_current(p, next_block);
        }
        for &s in else_body {
            self.lin_stmt(p, s)?;
        }
        if let Some(scope) = else_scope {
            self.release_scope_locals(p, scope);
        }
        self.branch(p, join);
        self.set_current(p, join);
        Ok(())
    }

    fn lin_while(
        &mut self,
        p: ProcId,
        condition: ExprId,
        scope: ScopeId,
        body: &[StmtId],
    ) -> Result<(), CompilerError> {
        let header = self.create_block(p);
        self.branch(p, header);
        self.set_current(p, header);
        let cond = self.lin_expr(p, condition)?;
        let cond = self.single(cond);
        let body_block = self.create_block(p);
        let exit = self.create_block(p);
        self.emit(
            p,
            Opcode::Cbr,
            vec![cond],
            vec![Pseudo::Block(body_block), Pseudo::Block(exit)],
        );
        self.free_temp(p, cond);
        let saved = self.proc(p).current_break_target;
        self.proc_mut(p).current_break_target = Some(exit);
        self.set_current(p, body_block);
        for &s in body {
            self.lin_stmt(p, s)?;
        }
        self.release_scope_locals(p, scope);
        self.branch(p, header);
        self.proc_mut(p).current_break_target = saved;
        self.set_current(p, exit);
        Ok(())
    }

    /// `repeat` evaluates its condition inside the loop scope; the loop
    /// exits when the condition turns true.
    fn lin_repeat(
        &mut self,
        p: ProcId,
        condition: ExprId,
        scope: ScopeId,
        body: &[StmtId],
    ) -> Result<(), CompilerError> {
        let body_block = self.create_block(p);
        let exit = self.create_block(p);
        self.branch(p, body_block);
        let saved = self.proc(p).current_break_target;
        self.proc_mut(p).current_break_target = Some(exit);
        self.set_current(p, body_block);
        for &s in body {
            self.lin_stmt(p, s)?;
        }
        let cond = self.lin_expr(p, condition)?;
        let cond = self.single(cond);
        self.emit(
            p,
            Opcode::Cbr,
            vec![cond],
            vec![Pseudo::Block(exit), Pseudo::Block(body_block)],
        );
        self.free_temp(p, cond);
        self.release_scope_locals(p, scope);
        self.proc_mut(p).current_break_target = saved;
        self.set_current(p, exit);
        Ok(())
    }

    /// Copy a loop-control value into a stable temp so body mutations
    /// cannot disturb it.
    fn stabilize(&mut self, p: ProcId, value: Pseudo) -> Pseudo {
        match value {
            Pseudo::Symbol(_) | Pseudo::RangeSelect { .. } | Pseudo::Range(_) => {
                let value = self.single(value);
                let temp = self.new_temp(p, TypeTag::Any);
                self.emit(p, Opcode::Mov, vec![value], vec![temp]);
                self.free_temp(p, value);
                temp
            }
            other => other,
        }
    }

    /// init/condition/body/step block shape.
    fn lin_for_num(
        &mut self,
        p: ProcId,
        scope: ScopeId,
        var: SymbolId,
        exprs: &[ExprId],
        body_scope: ScopeId,
        body: &[StmtId],
    ) -> Result<(), CompilerError> {
        self.allocate_local(p, var);
        let init = self.lin_expr(p, exprs[0])?;
        let init = self.single(init);
        self.emit_store_symbol(p, var, init);
        self.free_temp(p, init);
        let limit = self.lin_expr(p, exprs[1])?;
        let limit = self.single(limit);
        let limit = self.stabilize(p, limit);
        let step = match exprs.get(2) {
            Some(&e) => {
                let s = self.lin_expr(p, e)?;
                let s = self.single(s);
                self.stabilize(p, s)
            }
            None => Pseudo::Constant(self.proc_mut(p).add_constant(ConstantValue::Integer(1))),
        };

        let cond_block = self.create_block(p);
        let body_block = self.create_block(p);
        let step_block = self.create_block(p);
        let exit = self.create_block(p);
        self.branch(p, cond_block);

        self.set_current(p, cond_block);
        let lt = self.pseudo_type(p, &Pseudo::Symbol(var));
        let rt = self.pseudo_type(p, &limit);
        let (le_op, _, _) = select_binary_opcode(BinaryOp::LessEqual, lt, rt);
        let test = self.new_temp(p, TypeTag::Boolean);
        self.emit(
            p,
            le_op,
            vec![Pseudo::Symbol(var), limit],
            vec![test],
        );
        self.emit(
            p,
            Opcode::Cbr,
            vec![test],
            vec![Pseudo::Block(body_block), Pseudo::Block(exit)],
        );
        self.free_temp(p, test);

        let saved = self.proc(p).current_break_target;
        self.proc_mut(p).current_break_target = Some(exit);
        self.set_current(p, body_block);
        for &s in body {
            self.lin_stmt(p, s)?;
        }
        self.release_scope_locals(p, body_scope);
        self.branch(p, step_block);
        self.proc_mut(p).current_break_target = saved;

        self.set_current(p, step_block);
        let sum = self.new_temp(p, TypeTag::Any);
        self.emit(p, Opcode::Add, vec![Pseudo::Symbol(var), step], vec![sum]);
        self.emit(p, Opcode::Mov, vec![sum], vec![Pseudo::Symbol(var)]);
        self.free_temp(p, sum);
        self.branch(p, cond_block);

        self.set_current(p, exit);
        self.free_temp(p, limit);
        self.free_temp(p, step);
        self.release_scope_locals(p, scope);
        Ok(())
    }

    /// Generic for: iterator/state/control triple, one call per
    /// iteration, loop ends when the control variable comes back nil.
    fn lin_for_in(
        &mut self,
        p: ProcId,
        scope: ScopeId,
        vars: &[SymbolId],
        exprs: &[ExprId],
        body_scope: ScopeId,
        body: &[StmtId],
    ) -> Result<(), CompilerError> {
        for &var in vars {
            self.allocate_local(p, var);
        }
        let (values, to_free) = self.lin_expr_list(p, exprs, 3)?;
        let mut triple = Vec::with_capacity(3);
        for value in values {
            let temp = self.new_temp(p, TypeTag::Any);
            self.emit(p, Opcode::Mov, vec![value], vec![temp]);
            triple.push(temp);
        }
        for value in to_free {
            self.free_temp(p, value);
        }
        let (iter, state, control) = (triple[0], triple[1], triple[2]);

        let header = self.create_block(p);
        let body_block = self.create_block(p);
        let exit = self.create_block(p);
        self.branch(p, header);

        self.set_current(p, header);
        let base = self.proc_mut(p).temp_any_pseudos.allocate();
        self.emit(
            p,
            Opcode::Call,
            vec![iter, state, control],
            vec![Pseudo::Range(base)],
        );
        self.emit(
            p,
            Opcode::Mov,
            vec![Pseudo::RangeSelect { base, offset: 0 }],
            vec![control],
        );
        for (i, &var) in vars.iter().enumerate() {
            self.emit_store_symbol(
                p,
                var,
                Pseudo::RangeSelect {
                    base,
                    offset: i as u32,
                },
            );
        }
        self.proc_mut(p).temp_any_pseudos.release(base);
        let test = self.new_temp(p, TypeTag::Boolean);
        self.emit(p, Opcode::Eq, vec![control, Pseudo::Nil], vec![test]);
        self.emit(
            p,
            Opcode::Cbr,
            vec![test],
            vec![Pseudo::Block(exit), Pseudo::Block(body_block)],
        );
        self.free_temp(p, test);

        let saved = self.proc(p).current_break_target;
        self.proc_mut(p).current_break_target = Some(exit);
        self.set_current(p, body_block);
        for &s in body {
            self.lin_stmt(p, s)?;
        }
        self.release_scope_locals(p, body_scope);
        self.branch(p, header);
        self.proc_mut(p).current_break_target = saved;

        self.set_current(p, exit);
        for temp in triple {
            self.free_temp(p, temp);
        }
        self.release_scope_locals(p, scope);
        Ok(())
    }

    /// Block for a label, created eagerly on first mention so forward
    /// gotos resolve.
    fn label_block(&mut self, p: ProcId, name: Name) -> BlockId {
        if let Some(&block) = self.proc(p).label_blocks.get(&name) {
            return block;
        }
        let block = self.create_block(p);
        self.proc_mut(p).label_blocks.insert(name, block);
        block
    }

    fn lin_goto(
        &mut self,
        p: ProcId,
        label: Name,
        is_break: bool,
        line: u32,
    ) -> Result<(), CompilerError> {
        if is_break {
            let Some(target) = self.proc(p).current_break_target else {
                return Err(CompilerError::semantic(
                    self.chunk,
                    line,
                    "break outside a loop",
                ));
            };
            self.emit(p, Opcode::Br, vec![], vec![Pseudo::Block(target)]);
        } else {
            let target = self.label_block(p, label);
            self.emit(p, Opcode::Br, vec![], vec![Pseudo::Block(target)]);
        }
        // Anything following the jump lands in a fresh (unreachable)
        // block; empty ones count as deleted.
        let dead = self.create_block(p);
        self.set_current(p, dead);
        Ok(())
    }

    /// `function n.a.b:m() ... end` — build the closure, then store it
    /// through the selector chain.
    fn lin_function_decl(
        &mut self,
        p: ProcId,
        name: ExprId,
        selectors: &[ExprId],
        method_name: Option<ExprId>,
        function: FunctionId,
    ) -> Result<(), CompilerError> {
        let tree = self.tree;
        let closure = self.lin_function_expr(p, function)?;
        let mut chain: Vec<ExprId> = selectors.to_vec();
        if let Some(m) = method_name {
            chain.push(m);
        }
        let ExprKind::SymbolRef(symbol) = tree.exprs[name].kind else {
            unreachable!("function name is a symbol reference");
        };
        if chain.is_empty() {
            self.emit_store_symbol_typed(p, symbol, closure, TypeTag::Function);
            self.free_temp(p, closure);
            return Ok(());
        }
        let mut receiver = self.lin_symbol_ref(p, symbol);
        for &selector in &chain[..chain.len() - 1] {
            receiver = self.lin_suffix(p, receiver, selector)?;
        }
        let last = *chain.last().unwrap();
        let ExprKind::FieldSelector(name_expr) = &tree.exprs[last].kind else {
            unreachable!("function name selector");
        };
        let key = self.lin_expr(p, *name_expr)?;
        let rt = self.pseudo_type(p, &receiver);
        let kt = self.pseudo_type(p, &key);
        let vt = self.pseudo_type(p, &closure);
        let opcode = select_put_opcode(rt, kt, vt);
        self.emit(p, opcode, vec![key, closure], vec![receiver]);
        self.free_temp(p, key);
        self.free_temp(p, closure);
        self.free_temp(p, receiver);
        Ok(())
    }
}

// ---------------- opcode selection ----------------

/// Pick the binary opcode from operand types. Returns the opcode, the
/// result type and whether the operands must swap (commutative mixed
/// forms are normalized to the float-first variant).
fn select_binary_opcode(op: BinaryOp, lt: TypeTag, rt: TypeTag) -> (Opcode, TypeTag, bool) {
    use TypeTag::{Any, Boolean, Integer, Number, String};
    let ii = lt == Integer && rt == Integer;
    let ff = lt == Number && rt == Number;
    let fi = lt == Number && rt == Integer;
    let if_ = lt == Integer && rt == Number;
    let numeric = ii || ff || fi || if_;
    match op {
        BinaryOp::Add => {
            if ii {
                (Opcode::AddII, Integer, false)
            } else if ff {
                (Opcode::AddFF, Number, false)
            } else if fi {
                (Opcode::AddFI, Number, false)
            } else if if_ {
                (Opcode::AddFI, Number, true)
            } else {
                (Opcode::Add, Any, false)
            }
        }
        BinaryOp::Sub => {
            if ii {
                (Opcode::SubII, Integer, false)
            } else if ff {
                (Opcode::SubFF, Number, false)
            } else if fi {
                (Opcode::SubFI, Number, false)
            } else if if_ {
                (Opcode::SubIF, Number, false)
            } else {
                (Opcode::Sub, Any, false)
            }
        }
        BinaryOp::Mul => {
            if ii {
                (Opcode::MulII, Integer, false)
            } else if ff {
                (Opcode::MulFF, Number, false)
            } else if fi {
                (Opcode::MulFI, Number, false)
            } else if if_ {
                (Opcode::MulFI, Number, true)
            } else {
                (Opcode::Mul, Any, false)
            }
        }
        BinaryOp::Div => {
            if ii {
                (Opcode::DivII, Integer, false)
            } else if ff {
                (Opcode::DivFF, Number, false)
            } else if fi {
                (Opcode::DivFI, Number, false)
            } else if if_ {
                (Opcode::DivIF, Number, false)
            } else {
                (Opcode::Div, Any, false)
            }
        }
        BinaryOp::IntDiv => (
            Opcode::IDiv,
            if ii { Integer } else { Any },
            false,
        ),
        BinaryOp::Mod => (
            Opcode::Mod,
            if ii {
                Integer
            } else if numeric {
                Number
            } else {
                Any
            },
            false,
        ),
        BinaryOp::Pow => (Opcode::Pow, if numeric { Number } else { Any }, false),
        BinaryOp::BitAnd => {
            if ii {
                (Opcode::BAndII, Integer, false)
            } else {
                (Opcode::BAnd, Any, false)
            }
        }
        BinaryOp::BitOr => {
            if ii {
                (Opcode::BOrII, Integer, false)
            } else {
                (Opcode::BOr, Any, false)
            }
        }
        BinaryOp::BitXor => {
            if ii {
                (Opcode::BXorII, Integer, false)
            } else {
                (Opcode::BXor, Any, false)
            }
        }
        BinaryOp::Shl => {
            if ii {
                (Opcode::ShlII, Integer, false)
            } else {
                (Opcode::Shl, Any, false)
            }
        }
        BinaryOp::Shr => {
            if ii {
                (Opcode::ShrII, Integer, false)
            } else {
                (Opcode::Shr, Any, false)
            }
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            // `~=` is `==` plus a `not` by the consumer; the linearizer
            // lowers both to the eq family.
            if ii {
                (Opcode::EqII, Boolean, false)
            } else if ff {
                (Opcode::EqFF, Boolean, false)
            } else {
                (Opcode::Eq, Boolean, false)
            }
        }
        BinaryOp::Less => {
            if ii {
                (Opcode::LtII, Boolean, false)
            } else if ff {
                (Opcode::LtFF, Boolean, false)
            } else {
                (Opcode::Lt, Boolean, false)
            }
        }
        BinaryOp::LessEqual => {
            if ii {
                (Opcode::LeII, Boolean, false)
            } else if ff {
                (Opcode::LeFF, Boolean, false)
            } else {
                (Opcode::Le, Boolean, false)
            }
        }
        BinaryOp::Concat => (Opcode::StringConcat, String, false),
        BinaryOp::Greater | BinaryOp::GreaterEqual | BinaryOp::And | BinaryOp::Or => {
            unreachable!("normalized before opcode selection")
        }
    }
}

/// Indexed load opcode by receiver and key types, with the result type.
fn select_get_opcode(receiver: TypeTag, key: TypeTag) -> (Opcode, TypeTag) {
    use TypeTag::{Any, Integer, IntegerArray, Number, NumberArray, String, Table};
    match receiver {
        IntegerArray => match key {
            Integer => (Opcode::IaGetIKey, Integer),
            _ => (Opcode::IaGet, Integer),
        },
        NumberArray => match key {
            Integer => (Opcode::FaGetIKey, Number),
            _ => (Opcode::FaGet, Number),
        },
        Table => match key {
            Integer => (Opcode::TGetIKey, Any),
            String => (Opcode::TGetSKey, Any),
            _ => (Opcode::TGet, Any),
        },
        _ => match key {
            Integer => (Opcode::GetIKey, Any),
            String => (Opcode::GetSKey, Any),
            _ => (Opcode::Get, Any),
        },
    }
}

/// Indexed store opcode; arrays specialize on the value type instead of
/// the key.
fn select_put_opcode(receiver: TypeTag, key: TypeTag, value: TypeTag) -> Opcode {
    use TypeTag::{Integer, IntegerArray, Number, NumberArray, String, Table};
    match receiver {
        IntegerArray => {
            if value == Integer {
                Opcode::IaPutIVal
            } else {
                Opcode::IaPut
            }
        }
        NumberArray => {
            if value == Number {
                Opcode::FaPutFVal
            } else {
                Opcode::FaPut
            }
        }
        Table => match key {
            Integer => Opcode::TPutIKey,
            String => Opcode::TPutSKey,
            _ => Opcode::TPut,
        },
        _ => match key {
            Integer => Opcode::PutIKey,
            String => Opcode::PutSKey,
            _ => Opcode::Put,
        },
    }
}

/// Move/coercion opcode for storing into a typed variable.
fn select_store_symbol_opcode(decl: TypeTag, value: TypeTag) -> Opcode {
    use TypeTag::{Function, Integer, IntegerArray, Number, NumberArray, String, Table, UserData};
    match decl {
        Integer => match value {
            Integer => Opcode::MovI,
            Number => Opcode::MovFI,
            _ => Opcode::ToInt,
        },
        Number => match value {
            Number => Opcode::MovF,
            Integer => Opcode::MovIF,
            _ => Opcode::ToFlt,
        },
        String => {
            if value == String {
                Opcode::Mov
            } else {
                Opcode::ToString
            }
        }
        Function => {
            if value == Function {
                Opcode::Mov
            } else {
                Opcode::ToClosure
            }
        }
        Table => {
            if value == Table {
                Opcode::Mov
            } else {
                Opcode::ToTable
            }
        }
        IntegerArray => {
            if value == IntegerArray {
                Opcode::Mov
            } else {
                Opcode::ToIArray
            }
        }
        NumberArray => {
            if value == NumberArray {
                Opcode::Mov
            } else {
                Opcode::ToFArray
            }
        }
        UserData => Opcode::ToType,
        _ => Opcode::Mov,
    }
}
