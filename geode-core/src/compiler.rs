use std::path::PathBuf;

use tracing::debug;

use crate::codegen_llvm::generate_llvm_ir;
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::ir::Module;
use crate::lower::CompileContext;
use crate::parser::parse;
use crate::sources::SourceFile;
use crate::span::FileId;

/// Knobs for a single compilation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Package of units that do not start with `is <name>`.
    pub default_package: String,
    pub target_triple: String,
    /// Treat a non-void function falling off its end as an error.
    pub strict_returns: bool,
    pub module_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            default_package: "main".to_string(),
            target_triple: "x86_64-unknown-linux-gnu".to_string(),
            strict_returns: false,
            module_name: "geode".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct CompilationArtifact {
    pub module: Module,
    /// `module` rendered as LLVM assembly.
    pub ir: String,
    /// Recoverable diagnostics; fatal ones are returned as errors.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile every source into one module.
///
/// The `FileId` of a span is the index of its file in `sources`.
pub fn compile(sources: &[SourceFile], options: &CompileOptions) -> Result<CompilationArtifact, CoreError> {
    if sources.is_empty() {
        return Err(CoreError::MissingSources(PathBuf::new()));
    }

    let mut units = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let unit = parse(FileId(index as u32), &source.contents, &options.default_package)?;
        debug!(path = %source.path.display(), package = %unit.package, "unit ready");
        units.push(unit);
    }

    let mut ctx = CompileContext::new(options.clone());
    ctx.register_units(units)?;
    ctx.instantiate_entry_points()?;
    let (module, diagnostics) = ctx.finish();
    let ir = generate_llvm_ir(&module);
    debug!(
        functions = module.functions.len(),
        globals = module.globals.len(),
        warnings = diagnostics.len(),
        "compilation finished"
    );

    Ok(CompilationArtifact {
        module,
        ir,
        diagnostics,
    })
}

/// Compile a single in-memory source with default options and return the
/// LLVM text.
pub fn emit_llvm_ir(source: &str) -> Result<String, CoreError> {
    let sources = [SourceFile::new("<input>", source)];
    compile(&sources, &CompileOptions::default()).map(|artifact| artifact.ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SymbolKind;

    fn build(source: &str) -> CompilationArtifact {
        build_with(source, &CompileOptions::default()).expect("source should compile")
    }

    fn build_with(source: &str, options: &CompileOptions) -> Result<CompilationArtifact, CoreError> {
        compile(&[SourceFile::new("test.g", source)], options)
    }

    fn functions_named<'m>(module: &'m Module, prefix: &str) -> Vec<&'m str> {
        module
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    #[test]
    fn recursive_function_has_one_instantiation() {
        let artifact = build(
            "func f(int n) int { if n == 0 { return 1; } return n * f(n - 1); }\n\
             func main() int { return f(5); }",
        );
        assert_eq!(functions_named(&artifact.module, "_VM4mainN1f"), vec!["_VM4mainN1fT3i32"]);
        assert_eq!(artifact.ir.matches("call i32 @_VM4mainN1fT3i32(").count(), 2);
        assert!(artifact.ir.contains("define i32 @main()"));
        assert!(artifact.diagnostics.is_empty());
    }

    #[test]
    fn generic_calls_share_instantiations_per_signature() {
        let artifact = build(
            "func sq(? x) ? = x * x\n\
             func main() int { int a = sq(2); int b = sq(3); double c = sq(1.5); return a + b; }",
        );
        let mut variants = functions_named(&artifact.module, "_VM4mainN2sq");
        variants.sort_unstable();
        assert_eq!(variants, vec!["_VM4mainN2sqT1d", "_VM4mainN2sqT3i32"]);
        assert_eq!(artifact.ir.matches("call i32 @_VM4mainN2sqT3i32(").count(), 2);
        assert_eq!(artifact.ir.matches("call double @_VM4mainN2sqT1d(").count(), 1);
    }

    #[test]
    fn missing_return_is_a_warning_by_default() {
        let source = "func g(int x) int { if x > 0 { return 1; } }\nfunc main() int { return g(1); }";
        let artifact = build(source);
        assert_eq!(artifact.diagnostics.len(), 1);
        assert_eq!(artifact.diagnostics[0].code, Some("W0400"));
        assert!(!artifact.diagnostics[0].is_fatal());
        assert!(artifact.ir.contains("ret i32 0"));

        let strict = CompileOptions {
            strict_returns: true,
            ..CompileOptions::default()
        };
        let err = build_with(source, &strict).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn merge_block_after_two_returns_is_unreachable() {
        let artifact = build(
            "func h(int x) int { if x > 0 { return 1; } else { return 2; } }\n\
             func main() int { return h(1); }",
        );
        assert!(artifact.diagnostics.is_empty());
        assert!(artifact.ir.contains("if.merge.0:\n  unreachable"));
    }

    #[test]
    fn loops_produce_labelled_blocks() {
        let artifact = build(
            "func main() int {\n\
               int s = 0\n\
               for int i = 0; i < 3; i += 1 { s += i }\n\
               while s > 100 { s -= 1 }\n\
               return s\n\
             }",
        );
        for label in ["for.cond.0:", "for.body.0:", "for.step.0:", "for.merge.0:"] {
            assert!(artifact.ir.contains(label), "missing {label}");
        }
        for label in ["while.cond.1:", "while.body.1:", "while.merge.1:"] {
            assert!(artifact.ir.contains(label), "missing {label}");
        }
        assert!(artifact.ir.contains("br label %for.cond.0"));
    }

    #[test]
    fn classes_lay_out_fields_and_methods_take_this() {
        let artifact = build(
            "class Point { int x; int y\n func sum() int { return this.x + this.y } }\n\
             func main() int { Point p; p.x = 1; p.y = 2; return p.sum(); }",
        );
        assert!(artifact.ir.contains("%\"class.main:Point\" = type { i32, i32 }"));
        assert_eq!(functions_named(&artifact.module, "_VM4mainN5PointN3sum").len(), 1);
        assert!(artifact.ir.contains("getelementptr inbounds %\"class.main:Point\""));
    }

    #[test]
    fn globals_get_constant_or_startup_initializers() {
        let artifact = build(
            "int counter = 10\nint twice = counter * 2\nlong errno ...\n\
             func main() int { return twice; }",
        );
        assert!(artifact.ir.contains("@\"main:counter\" = global i32 10"));
        assert!(artifact.ir.contains("@\"main:twice\" = global i32 0"));
        assert!(artifact.ir.contains("@errno = external global i64"));
        assert!(artifact.ir.contains("store i32 %t"));
    }

    #[test]
    fn external_functions_are_declared_once() {
        let artifact = build(
            "func printf(string fmt, ...) int ...\n\
             func main() int { printf(\"%d\\n\", 1); printf(\"done\"); return 0; }",
        );
        assert_eq!(artifact.ir.matches("declare i32 @printf(i8*, ...)").count(), 1);
        assert_eq!(artifact.ir.matches("call i32 (i8*, ...) @printf(").count(), 2);
    }

    #[test]
    fn own_package_function_shadows_a_foreign_external() {
        let sources = [
            SourceFile::new("io.g", "is io\nfunc puts(string s) int ..."),
            SourceFile::new(
                "main.g",
                "func puts(string s) int { return 7; }\n\
                 func main() int { return puts(\"x\"); }",
            ),
        ];
        let artifact = compile(&sources, &CompileOptions::default()).expect("compile");
        assert!(artifact.ir.contains("call i32 @_VM4mainN4puts"));
        assert!(!artifact.ir.contains("call i32 @puts("));

        let sources = [
            SourceFile::new("io.g", "is io\nfunc puts(string s) int ..."),
            SourceFile::new("main.g", "func main() int { return puts(\"x\"); }"),
        ];
        let artifact = compile(&sources, &CompileOptions::default()).expect("compile");
        assert!(artifact.ir.contains("call i32 @puts("));
    }

    #[test]
    fn float_variadic_arguments_are_promoted_to_double() {
        let artifact = build(
            "func printf(string fmt, ...) int ...\n\
             func main() int { float f = 1.5; byte c = 'a'; printf(\"%f %c\", f, c); return 0; }",
        );
        assert!(artifact.ir.contains("fpext float %t"));
        assert!(artifact.ir.contains("sext i8 %t"));
        assert!(artifact.ir.contains(", double %t"));
        assert!(artifact.ir.contains(", i32 %t"));
    }

    #[test]
    fn bool_converts_to_floating_point_as_zero_or_one() {
        let artifact = build(
            "func main() int { bool b = true; double d = b; double e = true; return 0; }",
        );
        assert!(artifact.ir.contains("uitofp i1 %t"));
        assert!(!artifact.ir.contains("sitofp i1"));
        assert!(artifact.ir.contains("store double 0x3FF0000000000000"));
    }

    #[test]
    fn bool_comparisons_are_unsigned() {
        let artifact = build(
            "func main() int { bool t = true; bool f = false; if t > f { return 1; } return 0; }",
        );
        assert!(artifact.ir.contains("icmp ugt i1 %t"));
        assert!(!artifact.ir.contains("icmp sgt"));
    }

    #[test]
    fn pure_functions_reject_pointers_per_instantiation() {
        let artifact = build("pure sq(int x) int = x * x\nfunc main() int { return sq(3); }");
        assert!(artifact.ir.contains("define i32 @_VM4mainN2sqT3i32(i32 %arg0)"));

        let err = build_with(
            "pure first(string s) byte = s[0]\nfunc main() int { return 0; }",
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
        assert!(err.to_string().contains("pointer argument"));

        let err = build_with(
            "λ id(? x) ? = x\nfunc main() int { int n = id(1); string s = id(\"a\"); return n; }",
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("pure function `main:id`"));
    }

    #[test]
    fn format_calls_go_through_the_runtime_formatter() {
        let artifact = build(
            "func __runtime_str_format(string fmt, ...) string ...\n\
             func puts(string s) int ...\n\
             func main() int { int x = 3; puts(\"x = %d\"(x)); return 0; }",
        );
        assert!(artifact.ir.contains("declare i8* @__runtime_str_format(i8*, ...)"));
        assert!(artifact.ir.contains("call i8* (i8*, ...) @__runtime_str_format(i8* getelementptr"));
        assert!(artifact.ir.contains(", i32 %t"));

        let err = build_with(
            "func main() int { \"%d\"(1); return 0; }",
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unresolved function `__runtime_str_format`"));
    }

    #[test]
    fn unknown_function_is_unresolved() {
        let err = build_with("func main() int { return nope(1); }", &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnresolvedSymbol {
                kind: SymbolKind::Function,
                ..
            }
        ));
    }

    #[test]
    fn syntax_errors_carry_the_file_index() {
        let sources = [
            SourceFile::new("a.g", "func main() int { return 0; }"),
            SourceFile::new("b.g", "func broken( int {"),
        ];
        let err = compile(&sources, &CompileOptions::default()).unwrap_err();
        assert_eq!(err.span().map(|span| span.file), Some(FileId(1)));
        assert!(matches!(err, CoreError::AmbiguityExhausted { production: "parameter", .. }));
    }

    #[test]
    fn statement_that_is_neither_declaration_nor_expression() {
        let err = emit_llvm_ir("func main() int { int ) }").unwrap_err();
        assert_eq!(err.code(), "E0102");
        assert!(err.to_string().starts_with("could not parse statement operand"));
    }

    #[test]
    fn no_sources_is_an_error() {
        let err = compile(&[], &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingSources(_)));
    }

    #[test]
    fn emit_llvm_ir_uses_default_options() {
        let ir = emit_llvm_ir("func main() int { return 42; }").expect("compile");
        assert!(ir.starts_with("; ModuleID = 'geode'"));
        assert!(ir.contains("ret i32 42"));
    }
}
