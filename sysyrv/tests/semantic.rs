use sysyrv::error::{CompileError, ExecError, SemanticError};
use sysyrv::frontend::ir::executor::{hex_float, Executor};
use sysyrv::frontend::ir::instruction::{Instruction, Operator};
use sysyrv::frontend::ir::operand::{Operand, OperandType};
use sysyrv::frontend::ir::program::Program;

fn ir(src: &str) -> Program {
    match sysyrv::compile_to_ir(src) {
        Ok(program) => program,
        Err(e) => panic!("failed to analyze:\n{}\nerror: {}", src, e),
    }
}

/// 编译并解释执行，返回 (退出码, 输出)
fn run_with_input(src: &str, input: &str) -> (i32, String) {
    let program = ir(src);
    let outcome = Executor::new(&program)
        .with_input(input)
        .run_main()
        .unwrap_or_else(|e| panic!("execution failed: {}\n{}", e, program.get_ir_string()));
    (outcome.exit_code, outcome.output)
}

fn run(src: &str) -> (i32, String) {
    run_with_input(src, "")
}

fn semantic_error(src: &str) -> SemanticError {
    match sysyrv::compile_to_ir(src) {
        Err(CompileError::Semantic(e)) => e,
        Err(e) => panic!("expected a semantic error, got {}", e),
        Ok(program) => panic!("expected a semantic error, got\n{}", program.get_ir_string()),
    }
}

#[test]
fn constants_fold_at_compile_time() {
    let src = "
        const int N = 2 + 3;
        int main() {
            int a[N * 2];
            return N * 2;
        }";
    let program = ir(src);
    let main = program.function("main").unwrap();
    assert!(main.body.contains(&Instruction::Return {
        value: Operand::int_literal(10),
    }));
    assert!(main
        .body
        .iter()
        .any(|inst| matches!(inst, Instruction::Alloc { size: 10, .. })));
    assert_eq!(run(src).0, 10);
}

#[test]
fn folded_and_runtime_arithmetic_agree() {
    let src = "
        int main() {
            int x = 7;
            const int y = 7 * 3 - 4 / 2 % 3;
            return x * 3 - 4 / 2 % 3 - y;
        }";
    assert_eq!(run(src).0, 0);
}

#[test]
fn literal_and_variable_evaluation_agree() {
    let folded = ir("int main() { return 3 + 4 * 2; }");
    let main = folded.function("main").unwrap();
    assert_eq!(
        main.body.last(),
        Some(&Instruction::Return {
            value: Operand::int_literal(11),
        })
    );
    assert_eq!(run("int main() { return 3 + 4 * 2; }").0, 11);
    assert_eq!(
        run("int main() { int a = 3; int b = 4; int c = 2; return a + b * c; }").0,
        11
    );
}

#[test]
fn nested_declaration_does_not_clobber_outer() {
    assert_eq!(run("int main() { int a = 1; { int a = 2; return a; } }").0, 2);
    assert_eq!(run("int main() { int a = 1; { int a = 2; } return a; }").0, 1);
}

#[test]
fn loop_exit_values() {
    let plain = "
        int main() {
            int i = 0;
            while (i < 5) { i = i + 1; }
            return i;
        }";
    let with_break = "
        int main() {
            int i = 0;
            while (i < 5) {
                if (i == 3) break;
                i = i + 1;
            }
            return i;
        }";
    let with_continue = "
        int main() {
            int i = 0;
            int skipped = 0;
            while (i < 5) {
                if (i == 3) {
                    skipped = skipped + 1;
                    i = i + 1;
                    continue;
                }
                i = i + 1;
            }
            return i * 10 + skipped;
        }";
    assert_eq!(run(plain).0, 5);
    assert_eq!(run(with_break).0, 3);
    let program = ir(with_continue);
    let outcome = Executor::new(&program).with_step_limit(10_000).run_main().unwrap();
    assert_eq!(outcome.exit_code, 51);
}

#[test]
fn library_calls_keep_locals_intact() {
    let src = "
        int add(int a, int b) { return a + b; }
        int main() {
            int x = 7;
            int y = add(2, 3);
            putint(y);
            putch(32);
            return x * 10 + y;
        }";
    assert_eq!(run(src), (75, String::from("5 ")));
}

#[test]
fn inner_scopes_shadow_outer_names() {
    let src = "
        int x = 1;
        int main() {
            int x = 2;
            {
                int x = 3;
                putint(x);
            }
            putint(x);
            return x;
        }";
    let program = ir(src);
    let text = program.get_ir_string();
    assert!(text.contains("global x.1: int"));
    assert!(text.contains("x.3"));
    assert!(text.contains("x.4"));
    assert_eq!(run(src), (2, String::from("32")));
}

#[test]
fn multi_dimensional_index_is_linearized() {
    let src = "
        int main() {
            int a[2][3];
            a[1][2] = 7;
            return a[1][2];
        }";
    let program = ir(src);
    let main = program.function("main").unwrap();
    let arr = Operand::new("a.3", OperandType::IntPtr);
    assert!(main.body.contains(&Instruction::op(
        Operator::Store,
        arr,
        Operand::int_literal(5),
        Operand::int_literal(7),
    )));
    assert_eq!(run(src).0, 7);
}

#[test]
fn while_with_break_and_continue() {
    let src = "
        int main() {
            int i = 0;
            int s = 0;
            while (i < 10) {
                i = i + 1;
                if (i % 2 == 0) continue;
                if (i > 5) break;
                s = s + i;
            }
            return s;
        }";
    assert_eq!(run(src).0, 9);
}

#[test]
fn break_only_leaves_the_innermost_loop() {
    let src = "
        int main() {
            int i = 0;
            int c = 0;
            while (i < 3) {
                int j = 0;
                while (1) {
                    j = j + 1;
                    if (j == 2) break;
                }
                c = c + j;
                i = i + 1;
            }
            return c;
        }";
    assert_eq!(run(src).0, 6);
}

#[test]
fn falling_off_the_end_returns_zero() {
    let src = "
        void hello() {
            putch(104);
        }
        float half(int n) {
            if (n > 0) return n / 2.0;
        }
        int main() {
            hello();
            if (half(-1) == 0.0) return 7;
        }";
    let program = ir(src);
    assert_eq!(
        program.function("hello").unwrap().body.last(),
        Some(&Instruction::Return {
            value: Operand::null(),
        })
    );
    assert_eq!(
        program.function("half").unwrap().body.last(),
        Some(&Instruction::Return {
            value: Operand::float_literal(0.0),
        })
    );
    assert_eq!(
        program.function("main").unwrap().body.last(),
        Some(&Instruction::Return {
            value: Operand::int_literal(0),
        })
    );
    assert_eq!(run(src), (7, String::from("h")));
}

#[test]
fn user_and_library_calls() {
    let src = "
        int add(int a, int b) {
            return a + b;
        }
        void show(int v) {
            putint(v);
            putch(10);
        }
        int main() {
            show(add(2, 3));
            return 0;
        }";
    assert_eq!(run(src), (0, String::from("5\n")));
}

#[test]
fn recursion() {
    let src = "
        int fib(int n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        int main() {
            return fib(10);
        }";
    assert_eq!(run(src).0, 55);
}

#[test]
fn logical_operators_short_circuit() {
    let src = "
        int g = 0;
        int f() {
            g = g + 1;
            return 1;
        }
        int main() {
            int a = 0;
            if (a && f()) putint(1);
            if (1 || f()) putint(2);
            if (a || f()) putint(3);
            if (!a && f()) putint(4);
            putint(g);
            return 0;
        }";
    assert_eq!(run(src).1, "2342");
}

#[test]
fn float_arithmetic_and_conversion() {
    let src = "
        float h = 1.5;
        int main() {
            float x = h * 2;
            putfloat(x);
            int n = x;
            return n + 1;
        }";
    assert_eq!(run(src), (4, hex_float(3.0)));
}

#[test]
fn global_array_initializer_runs_before_main() {
    let src = "
        int g[4] = {1, 2};
        int main() {
            return g[0] + g[1] * 10 + g[3];
        }";
    let program = ir(src);
    assert_eq!(program.functions[0].name, "_global");
    assert_eq!(program.global_vals.len(), 1);
    assert_eq!(program.global_vals[0].array_len, Some(4));
    assert_eq!(run(src).0, 21);
}

#[test]
fn local_arrays_are_zero_filled() {
    let src = "
        int main() {
            int a[20] = {1};
            int b[2][2] = {{3}, {4, 5}};
            return a[0] + a[19] + b[0][0] * 10 + b[0][1] + b[1][1] * 100;
        }";
    assert_eq!(run(src).0, 531);
}

#[test]
fn array_declared_in_a_loop_is_reinitialized() {
    let src = "
        int main() {
            int k = 0;
            int s = 0;
            while (k < 3) {
                int b[3] = {k};
                s = s + b[0] + b[2];
                b[2] = 9;
                k = k + 1;
            }
            return s;
        }";
    assert_eq!(run(src).0, 3);
}

#[test]
fn arrays_pass_by_reference() {
    let src = "
        int sum(int a[], int n) {
            int i = 0;
            int s = 0;
            while (i < n) {
                s = s + a[i];
                i = i + 1;
            }
            return s;
        }
        int corner(int m[][2]) {
            return m[2][1];
        }
        void bump(int a[]) {
            a[0] = a[0] + 1;
        }
        int main() {
            int a[3][2] = {{1, 2}, {3, 4}, {5, 6}};
            bump(a[1]);
            return sum(a[1], 2) * 10 + corner(a);
        }";
    assert_eq!(run(src).0, 86);
}

#[test]
fn reads_program_input() {
    let src = "
        int main() {
            int a = getint();
            int b = getint();
            int buf[4];
            int n = getarray(buf);
            putarray(n, buf);
            return a * b;
        }";
    assert_eq!(run_with_input(src, "4 5\n3 7 8 9\n"), (20, String::from("3: 7 8 9\n")));
}

#[test]
fn runtime_division_by_zero() {
    let program = ir("
        int main() {
            int z = 0;
            return 1 / z;
        }");
    assert_eq!(
        Executor::new(&program).run_main(),
        Err(ExecError::DivisionByZero(String::from("main")))
    );
}

#[test]
fn rejects_undeclared_identifier() {
    assert_eq!(
        semantic_error("int main() { return y; }"),
        SemanticError::Undeclared(String::from("y"))
    );
}

#[test]
fn rejects_redefinition_in_same_scope() {
    assert_eq!(
        semantic_error("int main() { int a; int a; return 0; }"),
        SemanticError::Redefinition(String::from("a"))
    );
}

#[test]
fn rejects_wrong_argument_count() {
    assert_eq!(
        semantic_error("int f(int x) { return x; } int main() { return f(1, 2); }"),
        SemanticError::ArityMismatch {
            callee: String::from("f"),
            expected: 1,
            found: 2,
        }
    );
}

#[test]
fn rejects_assignment_to_constant() {
    assert_eq!(
        semantic_error("const int c = 1; int main() { c = 2; return 0; }"),
        SemanticError::AssignToConst(String::from("c"))
    );
}

#[test]
fn rejects_break_outside_loop() {
    assert_eq!(
        semantic_error("int main() { break; return 0; }"),
        SemanticError::LoopControlOutsideLoop("break")
    );
    assert_eq!(
        semantic_error("int main() { if (1) continue; return 0; }"),
        SemanticError::LoopControlOutsideLoop("continue")
    );
}

#[test]
fn rejects_non_constant_initializers() {
    let err = semantic_error("int main() { int n = 3; const int m = n; return m; }");
    assert!(matches!(err, SemanticError::NonConstant(_)));
    let err = semantic_error("int main() { int n = 3; int a[n]; return 0; }");
    assert!(matches!(err, SemanticError::NonConstant(_)));
}

#[test]
fn rejects_bad_array_declarations() {
    assert_eq!(
        semantic_error("int a[2] = {1, 2, 3}; int main() { return 0; }"),
        SemanticError::TooManyInitializers(String::from("a"))
    );
    assert_eq!(
        semantic_error("int a[0]; int main() { return 0; }"),
        SemanticError::InvalidDimension(String::from("a"))
    );
}

#[test]
fn rejects_arrays_too_large_to_address() {
    assert_eq!(
        semantic_error("int a[2][65536][65536]; int main() { return a[1][0][0]; }"),
        SemanticError::InvalidDimension(String::from("a"))
    );
    assert_eq!(
        semantic_error("int f(int a[][65536][65536]) { return a[1][0][0]; } int main() { return 0; }"),
        SemanticError::InvalidDimension(String::from("a"))
    );
    // 恰好放得下的数组仍然合法
    assert!(sysyrv::compile_to_ir("int a[1024][1024]; int main() { return a[1023][1023]; }").is_ok());
}

#[test]
fn rejects_modulo_on_floats() {
    let err = semantic_error("int main() { float x = 1.0; return x % 2; }");
    assert!(matches!(err, SemanticError::TypeMismatch(_)));
}

#[test]
fn syntax_errors_are_reported() {
    assert!(matches!(
        sysyrv::compile_to_ir("int main( { return 0; }"),
        Err(CompileError::Parse(_))
    ));
}
