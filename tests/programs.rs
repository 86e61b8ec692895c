use assert2::{check, let_assert};
use c0c::{compile, ErrorKind, Fuel, Machine, RuntimeError, Status};

fn run_with_input(src: &str, input: &[i32]) -> Result<String, RuntimeError> {
    let_assert!(Ok(program) = compile(src));
    let mut machine = Machine::new(&program);
    machine.provide_input(input.iter().copied());
    let mut out = Vec::new();
    let status = machine.run(&mut Fuel::with(1_000_000), &mut out)?;
    check!(status == Status::Finished);
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn run(src: &str) -> String {
    let_assert!(Ok(out) = run_with_input(src, &[]));
    out
}

#[test]
fn main_prints_one() {
    check!(run("int main(void) { int x = 1; print(x); return 0; }") == "1\n");
}

#[test]
fn recursion() {
    let src = "
        int fib(int n) {
            if (n < 2) return n;
            else return fib(n - 1) + fib(n - 2);
        }
        void main() {
            print(fib(10), fib(15));
        }";
    check!(run(src) == "55 610\n");
}

#[test]
fn loops_and_nested_scopes() {
    let src = "
        void main() {
            int i = 1;
            while (i <= 3) {
                int square = i * i;
                {
                    int i = square + 100;
                    print(i);
                }
                i = i + 1;
            }
            print(i);
        }";
    check!(run(src) == "101\n104\n109\n4\n");
}

#[test]
fn globals_and_constants() {
    let src = "
        const int step = 5;
        int total = 0;
        void add(int n) { total = total + n * step; }
        void main() {
            add(1);
            add(2);
            print(total, step);
        }";
    check!(run(src) == "15 5\n");
}

#[test]
fn every_relation() {
    let src = "
        void compare(int a, int b) {
            if (a < b) print(1); else print(0);
            if (a <= b) print(1); else print(0);
            if (a > b) print(1); else print(0);
            if (a >= b) print(1); else print(0);
            if (a == b) print(1); else print(0);
            if (a != b) print(1); else print(0);
        }
        void main() { compare(1, 2); compare(2, 2); }";
    check!(run(src) == "1\n1\n0\n0\n0\n1\n0\n1\n0\n1\n1\n0\n");
}

#[test]
fn scanned_values() {
    let src = "
        void main() {
            int a, b;
            scan(a);
            scan(b);
            print(a - b, a / b);
        }";
    let_assert!(Ok(out) = run_with_input(src, &[17, 5]));
    check!(out == "12 3\n");
}

#[test]
fn empty_print_and_nop() {
    check!(run("void main() { ; print(); ; }") == "\n");
}

#[test]
fn early_return_from_void() {
    let src = "
        void countdown(int n) {
            while (1) {
                if (n == 0) return;
                print(n);
                n = n - 1;
            }
        }
        void main() { countdown(3); print(0); }";
    check!(run(src) == "3\n2\n1\n0\n");
}

#[test]
fn call_statement_discards_the_result() {
    let src = "
        int g = 0;
        int bump() { g = g + 1; return g; }
        void main() { bump(); bump(); print(bump()); }";
    check!(run(src) == "3\n");
}

#[test]
fn missing_return_is_rejected() {
    let_assert!(Err(err) = compile("int f() { }\nvoid main() { }"));
    check!(err.kind == ErrorKind::MissingReturn);
}

#[test]
fn if_without_else_is_not_a_definite_return() {
    let_assert!(Err(err) = compile("int f(int c) { if (c) return 1; }\nvoid main() { }"));
    check!(err.kind == ErrorKind::MissingReturn);
}

#[test]
fn return_in_loop_passes_the_check_but_can_fall_through() {
    // compile-time acceptance is the known gap in the return check
    let src = "int f(int c) { while (c) { return c; } } void main() { print(f(0)); }";
    check!(compile(src).is_ok());
    let_assert!(Err(RuntimeError::MissingReturn(0)) = run_with_input(src, &[]));
}

#[test]
fn then_branch_with_loop_return_still_skips_else() {
    let src = "
        int pick(int c) {
            if (c) { while (c) { return 1; } }
            else return 2;
            return 3;
        }
        void main() { print(pick(1), pick(0)); }";
    check!(run(src) == "1 2\n");
}

#[test]
fn errors_render_with_positions() {
    let_assert!(Err(err) = compile("void main() {\n    int x\n}"));
    check!(err.to_string() == "Line: 2 Column: 0 Error: missing ';'");
}
