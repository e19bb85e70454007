//! End-to-end pipeline tests over the public API
//!
//! Each scenario compiles a small chunk and inspects the result through
//! the walker interfaces only.

use tarnc::ast::Symbol;
use tarnc::ir::{BlockId, Opcode, Pseudo};
use tarnc::{compile, CompileResult, CompilerOptions};

fn run(source: &str) -> CompileResult {
    compile(source, "test.tarn", &CompilerOptions::new()).expect("compile failed")
}

#[test]
fn test_empty_chunk() {
    let result = run("");
    let tree = &result.tree;
    let main_fn = tree.main_function();
    assert!(tree.function_is_vararg(main_fn));
    let scope = tree.function_scope(main_fn);
    assert!(tree.scopes[scope].symbols.is_empty());

    let module = result.module.as_ref().unwrap();
    assert_eq!(module.procedures().len(), 1);
    let main = &module.procs[module.main()];
    let insns: Vec<_> = main.instructions().collect();
    assert_eq!(insns.len(), 1);
    assert_eq!(insns[0].opcode, Opcode::Ret);
    assert!(insns[0].operands.is_empty());
}

#[test]
fn test_typed_arithmetic_specialization() {
    let result = run("local a: integer = 1 local b: integer = 2 return a + b");
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    let opcodes: Vec<Opcode> = main.instructions().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![Opcode::MovI, Opcode::MovI, Opcode::AddII, Opcode::Ret]
    );
    assert!(!opcodes.contains(&Opcode::Add), "no generic add");
    let add = main
        .instructions()
        .find(|i| i.opcode == Opcode::AddII)
        .unwrap();
    assert!(matches!(add.targets[0], Pseudo::TempInt(_)));
}

#[test]
fn test_closure_with_upvalue() {
    let result = run("local x = 1 return function() return x end");
    let tree = &result.tree;
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    assert!(main.instructions().any(|i| i.opcode == Opcode::Closure));
    assert_eq!(main.sub_procs.len(), 1);

    let sub = &module.procs[main.sub_procs[0]];
    let upvalues = tree.function_upvalues(sub.function);
    assert_eq!(upvalues.len(), 1);
    let Symbol::Upvalue { target, index, .. } = tree.symbols[upvalues[0]] else {
        panic!("expected an upvalue");
    };
    assert_eq!(index, 0);
    assert_eq!(target, tree.function_locals(tree.main_function())[0]);
}

#[test]
fn test_transitive_upvalue() {
    let result = run("local x = 1 return function() return function() return x end end");
    let tree = &result.tree;
    let main_fn = tree.main_function();
    let mid = tree.function_children(main_fn)[0];
    let inner = tree.function_children(mid)[0];
    let declared = tree.function_locals(main_fn)[0];

    for f in [mid, inner] {
        let ups = tree.function_upvalues(f);
        assert_eq!(ups.len(), 1, "every function on the chain has an entry");
        let Symbol::Upvalue { target, index, .. } = tree.symbols[ups[0]] else {
            panic!("expected an upvalue");
        };
        assert_eq!(target, declared, "all entries reference the same local");
        assert_eq!(index, 0);
    }
}

#[test]
fn test_goto_break_lowering() {
    let result = run("while true do if x then break end end");
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    assert!(
        main.current_break_target.is_none(),
        "break target restored after the loop"
    );
    let cbrs: Vec<_> = main
        .instructions()
        .filter(|i| i.opcode == Opcode::Cbr)
        .collect();
    assert_eq!(cbrs.len(), 2, "loop test plus if test");
    let Pseudo::Block(exit) = cbrs[0].targets[1] else {
        panic!("cbr false target is a block");
    };
    assert!(
        main.instructions()
            .any(|i| i.opcode == Opcode::Br && i.targets == vec![Pseudo::Block(exit)]),
        "break branches to the loop exit"
    );
}

#[test]
fn test_table_array_specialization() {
    let result = run("local t: integer[] = {} t[1] = 2 return t[1]");
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    let opcodes: Vec<Opcode> = main.instructions().map(|i| i.opcode).collect();
    assert!(opcodes.contains(&Opcode::NewIArray));
    assert!(opcodes.contains(&Opcode::IaPutIVal));
    assert!(opcodes.contains(&Opcode::IaGetIKey));
    let get = main
        .instructions()
        .find(|i| i.opcode == Opcode::IaGetIKey)
        .unwrap();
    let target = get.targets[0];
    assert!(matches!(target, Pseudo::TempInt(_)));
    let ret = main.instructions().find(|i| i.opcode == Opcode::Ret).unwrap();
    assert_eq!(ret.operands[0], target);
}

// ---- universal invariants ----

#[test]
fn test_scope_function_consistency() {
    let result = run(
        "local a = 1\n\
         do local b = 2 end\n\
         function f(p) local c = p return function() return c end end\n\
         for i = 1, 3 do local d = i end",
    );
    let tree = &result.tree;
    for (fid, function) in tree.functions.iter() {
        for &local in &function.locals {
            let Symbol::Local { scope, .. } = tree.symbols[local] else {
                panic!("locals list holds locals");
            };
            assert_eq!(
                tree.scopes[scope].function, fid,
                "a local's scope belongs to its declaring function"
            );
        }
    }
}

#[test]
fn test_reverse_shadowing() {
    let result = run("local x = 1 local x = 2 return x");
    let tree = &result.tree;
    let main_fn = tree.main_function();
    let stmts = tree.function_statements(main_fn);
    let ret = tree.as_return(stmts[2]);
    let (primary, _) = tree.as_suffixed(ret[0]);
    let resolved = tree.as_symbol_ref(primary);
    assert_eq!(resolved, tree.function_locals(main_fn)[1]);
}

#[test]
fn test_pseudo_register_compactness() {
    let result = run(
        "local a: integer = 1\n\
         local b: integer = 2\n\
         local c: integer = (a + b) * (a - b)\n\
         local d: integer = (a + b) * (a - b)\n\
         return c + d",
    );
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    // Every integer temp referenced by an instruction lies below the high
    // water mark, and reuse kept the mark low.
    let high = main.temp_int_pseudos.high_water();
    for insn in main.instructions() {
        for p in insn.operands.iter().chain(insn.targets.iter()) {
            if let Pseudo::TempInt(r) | Pseudo::TempBool(r) = *p {
                assert!(r < high);
            }
        }
    }
    assert!(high <= 3, "released registers are reused, mark stays low");
}

#[test]
fn test_instruction_block_backpointers() {
    let result = run("if a then return 1 elseif b then return 2 else return 3 end");
    let module = result.module.as_ref().unwrap();
    for pid in module.procedures() {
        let proc = &module.procs[pid];
        for (i, block) in proc.blocks.iter().enumerate() {
            assert_eq!(block.index, BlockId(i as u32), "ids in creation order");
            for insn in &block.insns {
                assert_eq!(insn.block, block.index);
            }
        }
    }
}

#[test]
fn test_constant_pool_density() {
    let result = run(
        "local a = 10 local b = 10 local c = 2.5 local d = 'hi' local e = 'hi' local f = 11",
    );
    let module = result.module.as_ref().unwrap();
    let main = &module.procs[module.main()];
    assert_eq!(main.num_int_constants, 2);
    assert_eq!(main.num_flt_constants, 1);
    assert_eq!(main.num_str_constants, 1);
    // Per-type indices form contiguous ranges from zero.
    let mut int_indices: Vec<u16> = main
        .constants()
        .iter()
        .filter(|c| matches!(c.value, tarnc::ir::ConstantValue::Integer(_)))
        .map(|c| c.index)
        .collect();
    int_indices.sort_unstable();
    assert_eq!(int_indices, vec![0, 1]);
}

#[test]
fn test_return_must_be_last() {
    // Parsing stops a statement list at `return`; anything after it in
    // the same block is a syntax error.
    let err = compile("return 1 return 2", "test.tarn", &CompilerOptions::new());
    assert!(err.is_err());

    let result = run("do return 1 end return 2");
    let tree = &result.tree;
    let main_fn = tree.main_function();
    let is_return =
        |s: tarnc::ast::StmtId| matches!(tree.stmts[s].kind, tarnc::ast::StmtKind::Return { .. });
    // Both the do-block body and the outer list end in their single
    // return.
    let stmts = tree.function_statements(main_fn);
    let outer: Vec<usize> = stmts
        .iter()
        .enumerate()
        .filter(|&(_, &s)| is_return(s))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(outer, vec![stmts.len() - 1]);
    let (_, do_body) = tree.as_do(stmts[0]);
    let inner: Vec<usize> = do_body
        .iter()
        .enumerate()
        .filter(|&(_, &s)| is_return(s))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(inner, vec![do_body.len() - 1]);
}

#[test]
fn test_literal_round_trip() {
    let source = "return 42, 2.5, \"hello\\n\", true, false, nil";
    let result = run(source);
    let tree = &result.tree;
    let exprs = tree.as_return(tree.function_statements(tree.main_function())[0]);

    // Re-serialize each literal and parse it again.
    let rendered: Vec<String> = exprs
        .iter()
        .map(|&e| match tree.as_literal(e) {
            tarnc::ast::Literal::Nil => "nil".to_string(),
            tarnc::ast::Literal::True => "true".to_string(),
            tarnc::ast::Literal::False => "false".to_string(),
            tarnc::ast::Literal::Integer(i) => i.to_string(),
            tarnc::ast::Literal::Float(f) => format!("{:?}", f),
            tarnc::ast::Literal::Str(s) => {
                format!("\"{}\"", result.strings.get(s).escape_default())
            }
        })
        .collect();
    let round = format!("return {}", rendered.join(", "));
    let second = run(&round);
    let tree2 = &second.tree;
    let exprs2 = tree2.as_return(tree2.function_statements(tree2.main_function())[0]);
    assert_eq!(exprs.len(), exprs2.len());
    for (&a, &b) in exprs.iter().zip(exprs2.iter()) {
        match (tree.as_literal(a), tree2.as_literal(b)) {
            (tarnc::ast::Literal::Str(x), tarnc::ast::Literal::Str(y)) => {
                assert_eq!(result.strings.get(x), second.strings.get(y));
            }
            (x, y) => assert_eq!(x, y),
        }
    }
}

#[test]
fn test_first_error_aborts_with_position() {
    let err = compile("local a =\n= 2", "bad.tarn", &CompilerOptions::new()).unwrap_err();
    assert!(err.message().contains("bad.tarn:2"));
}

#[test]
fn test_options_from_config_file() {
    use std::io::Write as _;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "linearize = false").unwrap();
    let text = std::fs::read_to_string(file.path()).unwrap();
    let options = CompilerOptions::from_toml_str(&text).unwrap();
    let result = compile("return 1", "test.tarn", &options).unwrap();
    assert!(result.module.is_none());
}
