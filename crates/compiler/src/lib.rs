//! Tarn compiler front-end
//!
//! Compiles Tarn source text (a dynamically-typed scripting language with
//! optional static type annotations) into a linear IR of basic blocks per
//! procedure, ready for a code generator.
//!
//! The pipeline is strictly forward: source bytes -> tokens -> resolved
//! syntax tree -> typed IR. A [`Compiler`] session owns the string pool
//! and every arena; dropping it releases the whole compilation at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use tarnc::{compile, CompilerOptions};
//!
//! let result = compile(
//!     "local a: integer = 1 return a + 1",
//!     "chunk.tarn",
//!     &CompilerOptions::new(),
//! )?;
//! let module = result.module.unwrap();
//! ```

pub mod allocator;
pub mod ast;
pub mod bitset;
pub mod config;
pub mod diagnostics;
pub mod intern;
pub mod ir;
pub mod lexer;
pub mod linearizer;
pub mod parser;
pub mod types;
pub mod walker;

pub use ast::{FunctionId, SyntaxTree};
pub use bitset::BitSet;
pub use config::CompilerOptions;
pub use diagnostics::{CollectingDiagnostics, CompilerError, Diagnostics, TracingDiagnostics};
pub use intern::{Name, StringPool};
pub use ir::{Module, Opcode, Proc, ProcId, Pseudo};
pub use linearizer::linearize;
pub use parser::parse_chunk;
pub use types::{TypeTag, ValueType};

/// One compile session. Owns the interned strings and the syntax tree
/// arenas; everything is released together when the session drops.
#[derive(Default)]
pub struct Compiler {
    pub strings: StringPool,
    pub tree: SyntaxTree,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::default()
    }

    /// Parse one chunk into this session's tree.
    pub fn parse(&mut self, source: &str, source_name: &str) -> Result<FunctionId, CompilerError> {
        tracing::debug!(target: "tarnc", chunk = source_name, bytes = source.len(), "parsing");
        parse_chunk(source, source_name, &mut self.tree, &mut self.strings)
    }
}

/// Output of a full pipeline run: the session plus the lowered module
/// (absent when lowering was disabled in the options).
#[derive(Debug)]
pub struct CompileResult {
    pub strings: StringPool,
    pub tree: SyntaxTree,
    pub module: Option<Module>,
}

/// Run the whole pipeline over one chunk.
pub fn compile(
    source: &str,
    source_name: &str,
    options: &CompilerOptions,
) -> Result<CompileResult, CompilerError> {
    options.validate().map_err(CompilerError::Semantic)?;
    let mut compiler = Compiler::new();
    compiler.parse(source, source_name)?;
    let module = if options.linearize {
        Some(linearize(
            &compiler.tree,
            source_name,
            &options.main_func_name,
        )?)
    } else {
        None
    };
    Ok(CompileResult {
        strings: compiler.strings,
        tree: compiler.tree,
        module,
    })
}

/// The embedder-facing request mirroring the host interface: inputs plus
/// the generated-code output slot.
pub struct CompileRequest<'a> {
    pub source: &'a str,
    pub source_name: &'a str,
    /// Name for the generated top-level closure constructor, at most 30
    /// bytes.
    pub main_func_name: &'a str,
    /// Filled on success; owned by the caller.
    pub generated_code: String,
}

impl<'a> CompileRequest<'a> {
    pub fn new(source: &'a str, source_name: &'a str, main_func_name: &'a str) -> Self {
        CompileRequest {
            source,
            source_name,
            main_func_name,
            generated_code: String::new(),
        }
    }
}

/// Seam for the downstream code generator, which turns the lowered
/// module into target text.
pub trait CodeEmitter {
    fn emit(&mut self, result: &CompileResult) -> Result<String, CompilerError>;
}

/// Placeholder emitter producing the IR listing; stands in until a real
/// generator is plugged into the seam.
#[derive(Default)]
pub struct ListingEmitter;

impl CodeEmitter for ListingEmitter {
    fn emit(&mut self, result: &CompileResult) -> Result<String, CompilerError> {
        Ok(result
            .module
            .as_ref()
            .map(|m| m.listing(&result.tree, &result.strings))
            .unwrap_or_default())
    }
}

/// Host entry point: 0 on success, non-zero on failure. On failure the
/// `error` callback has fired exactly once and `generated_code` is left
/// empty.
pub fn compile_for_host(
    request: &mut CompileRequest<'_>,
    emitter: &mut dyn CodeEmitter,
    diagnostics: &mut dyn Diagnostics,
) -> i32 {
    let options = CompilerOptions::new().with_main_func_name(request.main_func_name);
    let result = match compile(request.source, request.source_name, &options) {
        Ok(result) => result,
        Err(err) => {
            diagnostics.error(err.message());
            return 1;
        }
    };
    match emitter.emit(&result) {
        Ok(code) => {
            diagnostics.debug(request.source_name, 0, "compilation complete");
            request.generated_code = code;
            0
        }
        Err(err) => {
            diagnostics.error(err.message());
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_end_to_end() {
        let result = compile(
            "local a: integer = 1 return a + 1",
            "chunk.tarn",
            &CompilerOptions::new(),
        )
        .unwrap();
        let module = result.module.unwrap();
        let main = &module.procs[module.main()];
        assert!(main.instructions().any(|i| i.opcode == Opcode::AddII));
    }

    #[test]
    fn test_parse_only_mode() {
        let options = CompilerOptions::new().with_linearize(false);
        let result = compile("return 1", "chunk.tarn", &options).unwrap();
        assert!(result.module.is_none());
        assert!(result.tree.root.is_some());
    }

    #[test]
    fn test_host_interface_success() {
        let mut request = CompileRequest::new("return 1 + 2", "chunk.tarn", "init");
        let mut emitter = ListingEmitter;
        let mut sink = CollectingDiagnostics::default();
        let rc = compile_for_host(&mut request, &mut emitter, &mut sink);
        assert_eq!(rc, 0);
        assert!(request.generated_code.contains("init"));
        assert!(sink.errors.is_empty());
        assert!(!sink.debug_messages.is_empty());
    }

    #[test]
    fn test_host_interface_failure() {
        let mut request = CompileRequest::new("local = 1", "chunk.tarn", "init");
        let mut emitter = ListingEmitter;
        let mut sink = CollectingDiagnostics::default();
        let rc = compile_for_host(&mut request, &mut emitter, &mut sink);
        assert_ne!(rc, 0);
        assert!(request.generated_code.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("chunk.tarn"));
    }

    #[test]
    fn test_long_main_name_rejected() {
        let name = "x".repeat(40);
        let mut request = CompileRequest::new("return 1", "chunk.tarn", &name);
        let mut emitter = ListingEmitter;
        let mut sink = CollectingDiagnostics::default();
        assert_ne!(compile_for_host(&mut request, &mut emitter, &mut sink), 0);
        assert!(sink.errors[0].contains("main_func_name"));
    }
}
