//! A small scripting language compiled to stack-machine assembly, assembled to
//! bytecode and run on a purpose-built virtual machine.
//!
//! The three stages are independent: [`compile`] turns source into assembly
//! text, [`assemble`] turns assembly text into [`Bytecode`] and [`execute`]
//! runs bytecode. [`run_source`] chains them.
pub mod assembler;
pub mod assembly;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod grammar;
pub mod store;
pub mod types;
pub mod vm;

use thiserror::Error;

pub use assembler::{assemble, AssembleError, Bytecode};
use ast::Program;
use error::SourceMetadata;
use grammar::{ParseError, Parser};
use types::TypeError;
pub use vm::{execute, RuntimeFailure, Termination, VmConfig};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CompileError {
    pub fn position(&self) -> Option<error::Position> {
        match self {
            Self::Parse(err) => err.position(),
            Self::Type(err) => err.position(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("runtime failure: {0}")]
    Runtime(#[from] RuntimeFailure),
}

/// Compiles a whole source file to assembly text.
pub fn compile(meta: &SourceMetadata) -> Result<String, CompileError> {
    let program: Program = Parser::new(meta).parse()?;
    tracing::debug!(
        target: "codegen",
        "{} structs, {} functions, {} statics",
        program.structs.len(),
        program.functions.len(),
        program.statics.len()
    );
    Ok(codegen::compile_program(&program, meta)?.to_string())
}

pub fn compile_source(source: &str) -> Result<String, CompileError> {
    compile(&SourceMetadata::new(source))
}

/// Compiles, assembles and runs `source`.
pub fn run_source(source: &str, config: VmConfig) -> Result<Termination, PipelineError> {
    let assembly = compile_source(source)?;
    let code = assemble(&assembly)?;
    Ok(execute(&code, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn run(source: &str) -> anyhow::Result<Termination> {
        Ok(run_source(source, VmConfig::default())?)
    }

    fn result(source: &str) -> anyhow::Result<i32> {
        run(source)?
            .top_of_stack()
            .ok_or_else(|| anyhow!("nothing on the stack"))
    }

    #[test]
    fn returns_a_literal() -> anyhow::Result<()> {
        for n in [0, 1, 7, 42, 65_535, i32::MAX] {
            for (source, expected) in [(format!("return {n};"), n), (format!("return -{n};"), -n)] {
                let end = run(&source)?;
                assert_eq!(end.top_of_stack(), Some(expected), "{source}");
                assert_eq!(end.stack_pointer(), 1, "{source}");
            }
        }
        let end = run("return -2147483647 - 1;")?;
        assert_eq!(end.top_of_stack(), Some(i32::MIN));
        assert_eq!(end.stack_pointer(), 1);
        Ok(())
    }

    #[test]
    fn arithmetic_on_locals() -> anyhow::Result<()> {
        assert_eq!(result("int x = 3; int y = 4; return x + y;")?, 7);
        assert_eq!(result("int x = 3; int y = 4; return y * y - x / 2 * 10;")?, 6);
        assert_eq!(result("return -5 + !0;")?, -4);
        Ok(())
    }

    #[test]
    fn comparisons_are_zero_or_one() -> anyhow::Result<()> {
        assert_eq!(result("int x = 3; int y = 4; return x > y;")?, 0);
        assert_eq!(result("int x = 3; int y = 4; return y > x;")?, 1);
        assert_eq!(result("return 4 <= 4;")?, 1);
        assert_eq!(result("return 4 != 4;")?, 0);
        Ok(())
    }

    #[test]
    fn struct_fields() -> anyhow::Result<()> {
        let source = "
            struct P { int x; int y; }
            P p;
            p.x = 2;
            p.y = 5;
            return p.x * 10 + p.y;";
        assert_eq!(result(source)?, 25);
        assert_eq!(result("struct P { int x; int y; } return sizeof(P);")?, 2);
        Ok(())
    }

    #[test]
    fn live_registers_survive_calls() -> anyhow::Result<()> {
        let source = "
            func int id(int a) { return a; }
            struct P { int x; int y; }
            P p;
            p.x = 1;
            p.y = id(7);
            return p.y - p.x;";
        let end = run(source)?;
        assert_eq!(end.top_of_stack(), Some(6));
        // `p` and the returned value
        assert_eq!(end.stack_pointer(), 3);
        Ok(())
    }

    #[test]
    fn results_survive_several_saved_registers() -> anyhow::Result<()> {
        let source = "
            func int id(int a) { return a; }
            int a;
            int b;
            a = b = id(9);
            return a + b;";
        let end = run(source)?;
        assert_eq!(end.top_of_stack(), Some(18));
        assert_eq!(end.stack_pointer(), 3);
        Ok(())
    }

    #[test]
    fn wide_results_slide_past_saved_registers() -> anyhow::Result<()> {
        let pair = "
            struct Pair { int a; int b; }
            func Pair make(int a, int b) {
                Pair p;
                p.a = a;
                p.b = b;
                return p;
            }";
        let end = run(&format!("{pair} Pair q; q = make(3, 4); return q.a * 10 + q.b;"))?;
        assert_eq!(end.top_of_stack(), Some(34));
        assert_eq!(end.stack_pointer(), 3);

        let source = format!(
            "{pair} Pair q; Pair r; q = r = make(5, 6); return q.a * 1000 + q.b * 100 + r.a * 10 + r.b;"
        );
        assert_eq!(result(&source)?, 5656);
        Ok(())
    }

    #[test]
    fn recursion() -> anyhow::Result<()> {
        let source = "
            func int fact(int n) {
                if (n <= 1) return 1;
                return n * fact(n - 1);
            }
            return fact(5);";
        assert_eq!(result(source)?, 120);
        Ok(())
    }

    #[test]
    fn functions_return_structs() -> anyhow::Result<()> {
        let source = "
            struct Pair { int a; int b; }
            func Pair make(int a, int b) {
                Pair p;
                p.a = a;
                p.b = b;
                return p;
            }
            return 10 + make(3, 4).b;";
        assert_eq!(result(source)?, 14);
        Ok(())
    }

    #[test]
    fn structs_link_to_themselves() -> anyhow::Result<()> {
        let source = "
            struct Node { int value; Node& next; }
            Node a;
            Node b;
            a.value = 3;
            b.value = 4;
            a.next = b&;
            a.next@.value += 10;
            return a.value * 100 + a.next@.value;";
        assert_eq!(result(source)?, 314);
        Ok(())
    }

    #[test]
    fn methods_see_their_receiver() -> anyhow::Result<()> {
        let source = "
            struct Counter {
                int value;
                func void bump(int by) { this@.value += by; }
                func int get() { return this@.value; }
            }
            Counter c;
            c.value = 1;
            c.bump(4);
            c.bump(2);
            return c.get();";
        assert_eq!(result(source)?, 7);
        Ok(())
    }

    #[test]
    fn loops_and_branches() -> anyhow::Result<()> {
        let source = "
            int i = 0;
            int sum = 0;
            while (i < 5) {
                i += 1;
                if (i == 3) sum += 100; else sum += i;
            }
            return sum;";
        assert_eq!(result(source)?, 112);
        Ok(())
    }

    #[test]
    fn pointers_and_strings() -> anyhow::Result<()> {
        assert_eq!(result("return 'hello'@;")?, 5);
        assert_eq!(result("int& s = \"hi\"; return (s + 2)@;")?, 'i' as i32);
        assert_eq!(result("int a = 1; int& p = a&; p@ = 9; return a;")?, 9);
        Ok(())
    }

    #[test]
    fn statics_keep_their_value() -> anyhow::Result<()> {
        let source = "
            static int total = 5;
            func void add(int n) { total += n; }
            add(3);
            add(4);
            return total;";
        assert_eq!(result(source)?, 12);
        Ok(())
    }

    #[test]
    fn floats() -> anyhow::Result<()> {
        let value = result("float x = 1.5; return x * 2.0 + 0.5;")?;
        assert_eq!(f32::from_bits(value as u32), 3.5);
        assert_eq!(result("float x = 1.5; return x * 2.0 > 2.5;")?, 1);
        assert_eq!(f32::from_bits(result("return -2.0;")? as u32), -2.0);
        Ok(())
    }

    #[test]
    fn negative_zero_is_false() -> anyhow::Result<()> {
        assert_eq!(result("float z = -0.0; if (z) return 1; return 2;")?, 2);
        assert_eq!(result("float z = -0.0; return !z;")?, 1);
        assert_eq!(result("float z = -0.0; return z or 0.0;")?, 0);
        assert_eq!(result("float h = 0.5; return h and 1;")?, 1);
        Ok(())
    }

    #[test]
    fn logic_short_circuits() -> anyhow::Result<()> {
        assert_eq!(result("int a = 0; return a != 0 and 10 / a > 1;")?, 0);
        assert_eq!(result("int a = 0; return a == 0 or 10 / a > 1;")?, 1);
        assert_eq!(result("return 2 and 3;")?, 1);
        assert_eq!(result("return 0 or 0;")?, 0);
        Ok(())
    }

    #[test]
    fn compilation_is_deterministic() -> anyhow::Result<()> {
        let source = "
            func int max(int a, int b) { if (a > b) return a; return b; }
            static int best;
            best = max(3, 'xyz'@);
            return best;";
        assert_eq!(compile_source(source)?, compile_source(source)?);
        assert_eq!(result(source)?, 3);
        Ok(())
    }

    #[test]
    fn compile_errors_carry_positions() {
        let err = compile_source("int a = 1;\nreturn b;").unwrap_err();
        assert!(matches!(err, CompileError::Type(_)), "{err}");
        assert_eq!(err.position().map(|p| p.line), Some(2));

        let err = compile_source("int = 3;").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)), "{err}");
        assert!(err.position().is_some());
    }

    #[test]
    fn runtime_failures_stop_the_run() {
        let err = run_source("int a = 0; return 1 / a;", VmConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Runtime(RuntimeFailure::DivisionByZero { .. })
        ));

        let config = VmConfig {
            step_budget: Some(1_000),
            ..VmConfig::default()
        };
        let err = run_source("while (1) {}", config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Runtime(RuntimeFailure::StepBudgetExhausted { budget: 1_000, .. })
        ));
    }
}
