use lox_core::diagnostics::{CollectingReporter, Stage};
use lox_lang::config::RuntimeConfig;
use lox_lang::interpreter::value::Value;
use lox_lang::{Lox, Status};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

// `print` output lands here so tests can read it back
#[derive(Clone, Default)]
struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedOutput {
    fn take(&self) -> String {
        String::from_utf8(std::mem::take(&mut *self.0.borrow_mut())).expect("utf-8 output")
    }
}

#[derive(Debug)]
struct Outcome {
    status: Status,
    output: String,
    errors: Vec<String>,
    stages: Vec<Stage>,
}

fn session(config: RuntimeConfig) -> (Lox, SharedOutput) {
    let out = SharedOutput::default();
    let lox = Lox::with_output(config, Box::new(out.clone()));
    (lox, out)
}

fn run_in(lox: &mut Lox, out: &SharedOutput, source: &str) -> Outcome {
    let mut reporter = CollectingReporter::default();
    let status = lox.run(source, &mut reporter);
    Outcome {
        status,
        output: out.take(),
        errors: reporter.diagnostics.iter().map(|d| d.to_string()).collect(),
        stages: reporter.diagnostics.iter().map(|d| d.stage).collect(),
    }
}

// Same as `run_in`, but through the prompt's line handling
fn prompt_line(lox: &mut Lox, out: &SharedOutput, line: &str) -> Outcome {
    let mut reporter = CollectingReporter::default();
    let status = lox.run_prompt_line(line, &mut reporter);
    Outcome {
        status,
        output: out.take(),
        errors: reporter.diagnostics.iter().map(|d| d.to_string()).collect(),
        stages: reporter.diagnostics.iter().map(|d| d.stage).collect(),
    }
}

// Mimic what the `lox` binary does with a script
fn eval(source: &str) -> Outcome {
    let (mut lox, out) = session(RuntimeConfig::default());
    run_in(&mut lox, &out, source)
}

fn output_of(source: &str) -> String {
    let outcome = eval(source);
    match outcome.status {
        Status::Ok => outcome.output,
        _ => panic!("expected success, got {:?}", outcome),
    }
}

fn runtime_error_of(source: &str) -> String {
    let outcome = eval(source);
    match (outcome.status, outcome.errors.as_slice()) {
        (Status::RuntimeError, [error]) => error.clone(),
        _ => panic!("expected one runtime error, got {:?}", outcome),
    }
}

#[test]
fn test_arithmetic_follows_ieee() {
    assert_eq!(
        output_of("print 1 + 2; print 7 - 10; print 2.5 * 4; print 1 / 4;"),
        "3\n-3\n10\n0.25\n"
    );
}

#[test]
fn test_division_by_zero_is_not_an_error() {
    assert_eq!(
        output_of("print 1 / 0; print -1 / 0; var n = 0 / 0; print n == n;"),
        "Infinity\n-Infinity\nfalse\n"
    );
}

#[test]
fn test_precedence() {
    assert_eq!(output_of("print 2 + 3 * 4 - -1;"), "15\n");
    assert_eq!(output_of("print (2 + 3) * 4;"), "20\n");
    assert_eq!(output_of("print !(1 < 2) == false;"), "true\n");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(output_of("print \"foo\" + \"bar\";"), "foobar\n");
}

#[test]
fn test_string_plus_number_is_a_type_error() {
    assert_eq!(
        runtime_error_of("print \"foo\" + 1;"),
        "[line 1] Error: Operands must be two numbers or two strings."
    );
}

#[test]
fn test_operand_type_errors() {
    assert_eq!(
        runtime_error_of("print 1 < \"2\";"),
        "[line 1] Error: Operands must be numbers."
    );
    assert_eq!(
        runtime_error_of("print \"a\" * 2;"),
        "[line 1] Error: Operands must be numbers."
    );
    assert_eq!(
        runtime_error_of("print -\"a\";"),
        "[line 1] Error: Operand must be a number."
    );
}

#[test]
fn test_truthiness() {
    let source = r#"
        if (nil) print "nil"; else print "nil is falsy";
        if (false) print "false"; else print "false is falsy";
        if (0) print "0 is truthy";
        if ("") print "empty string is truthy";
        fun f() {}
        if (f) print "functions are truthy";
        class C {}
        if (C()) print "instances are truthy";
    "#;
    assert_eq!(
        output_of(source),
        "nil is falsy\nfalse is falsy\n0 is truthy\nempty string is truthy\n\
         functions are truthy\ninstances are truthy\n"
    );
}

#[test]
fn test_equality() {
    let source = r#"
        print nil == nil;
        print nil == false;
        print 1 == 1;
        print "a" == "a";
        print 1 == "1";
        print true != false;
        class A {}
        var a = A();
        var b = a;
        print a == b;
        print A() == A();
    "#;
    assert_eq!(
        output_of(source),
        "true\nfalse\ntrue\ntrue\nfalse\ntrue\ntrue\nfalse\n"
    );
}

#[test]
fn test_logical_operators_return_deciding_operand() {
    assert_eq!(
        output_of("print nil or \"default\"; print 1 and 2; print false and crash();"),
        "default\n2\nfalse\n"
    );
}

#[test]
fn test_display_forms() {
    let source = r#"
        fun greet() {}
        class Point {}
        print greet;
        print clock;
        print Point;
        print Point();
        print nil;
        print 3.0;
    "#;
    assert_eq!(
        output_of(source),
        "<fn greet>\n<native fn>\nPoint\nPoint instance\nnil\n3\n"
    );
}

#[test]
fn test_closures_capture_by_reference() {
    let source = r#"
        fun makeCounter() {
            var count = 0;
            fun increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }

        var a = makeCounter();
        var b = makeCounter();
        print a();
        print a();
        print b();
    "#;
    assert_eq!(output_of(source), "1\n2\n1\n");
}

#[test]
fn test_closures_from_one_call_share_state() {
    let source = r#"
        var get;
        var set;
        fun pair() {
            var value = "before";
            fun g() { return value; }
            fun s(v) { value = v; }
            get = g;
            set = s;
        }
        pair();
        set("after");
        print get();
    "#;
    assert_eq!(output_of(source), "after\n");
}

#[test]
fn test_closure_sees_binding_not_later_shadow() {
    let source = r#"
        var a = "global";
        {
            fun showA() { print a; }
            showA();
            var a = "block";
            showA();
        }
    "#;
    assert_eq!(output_of(source), "global\nglobal\n");
}

#[test]
fn test_shadowing_leaves_outer_untouched() {
    let source = r#"
        var a = "outer";
        {
            var a = "inner";
            print a;
        }
        print a;
    "#;
    assert_eq!(output_of(source), "inner\nouter\n");
}

#[test]
fn test_self_initializer_rejected_before_execution() {
    let outcome = eval("print \"before\"; var a = a;");
    assert_eq!(outcome.status, Status::StaticError);
    assert_eq!(outcome.output, "");
    assert_eq!(
        outcome.errors,
        vec!["[line 1] Error at 'a': Can't read local variable in its own initializer."]
    );
}

#[test]
fn test_two_syntax_errors_one_parse() {
    let outcome = eval("print \"never\";\nvar = 1;\nprint 2\nprint 3;");
    assert_eq!(outcome.status, Status::StaticError);
    assert_eq!(outcome.output, "");
    assert_eq!(
        outcome.errors,
        vec![
            "[line 2] Error at '=': Expect variable name.",
            "[line 4] Error at 'print': Expect ';' after value.",
        ]
    );
    assert_eq!(outcome.stages, vec![Stage::Parse, Stage::Parse]);
}

#[test]
fn test_scan_and_parse_errors_reported_together() {
    let outcome = eval("var a = @;\nprint 1");
    assert_eq!(outcome.status, Status::StaticError);
    assert_eq!(outcome.stages.first(), Some(&Stage::Scan));
    assert!(outcome.stages.contains(&Stage::Parse));
    assert_eq!(
        outcome.errors[0],
        "[line 1] Error: Unexpected character '@'."
    );
}

#[test]
fn test_arity_mismatch_does_not_run_body() {
    let source = r#"
        fun add(a, b) {
            print "body ran";
            return a + b;
        }
        add(1, 2, 3);
    "#;
    let outcome = eval(source);
    assert_eq!(outcome.status, Status::RuntimeError);
    assert_eq!(outcome.output, "");
    assert_eq!(
        outcome.errors,
        vec!["[line 6] Error: Expected 2 arguments but got 3."]
    );
}

#[test]
fn test_calling_a_non_callable() {
    assert_eq!(
        runtime_error_of("\"not a function\"();"),
        "[line 1] Error: Can only call functions and classes."
    );
}

#[test]
fn test_undefined_variable() {
    assert_eq!(
        runtime_error_of("print missing;"),
        "[line 1] Error: Undefined variable 'missing'."
    );
    assert_eq!(
        runtime_error_of("missing = 1;"),
        "[line 1] Error: Undefined variable 'missing'."
    );
}

#[test]
fn test_recursion() {
    let source = r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(15);
    "#;
    assert_eq!(output_of(source), "610\n");
}

#[test]
fn test_local_recursion() {
    let source = r#"
        {
            fun count(n) {
                if (n > 0) count(n - 1);
                print n;
            }
            count(2);
        }
    "#;
    assert_eq!(output_of(source), "0\n1\n2\n");
}

#[test]
fn test_function_without_return_yields_nil() {
    assert_eq!(output_of("fun f() { 1; } print f();"), "nil\n");
    assert_eq!(output_of("fun f() { return; } print f();"), "nil\n");
}

#[test]
fn test_while_and_for_loops() {
    let source = r#"
        var i = 0;
        while (i < 3) {
            print i;
            i = i + 1;
        }
        for (var j = 10; j < 13; j = j + 1) print j;
    "#;
    assert_eq!(output_of(source), "0\n1\n2\n10\n11\n12\n");
}

#[test]
fn test_for_loop_variable_is_scoped() {
    let outcome = eval("for (var i = 0; i < 1; i = i + 1) {} print i;");
    assert_eq!(outcome.status, Status::RuntimeError);
    assert_eq!(
        outcome.errors,
        vec!["[line 1] Error: Undefined variable 'i'."]
    );
}

#[test]
fn test_continue_in_for_runs_increment() {
    let source = r#"
        for (var i = 0; i < 5; i = i + 1) {
            if (i == 2) continue;
            print i;
        }
    "#;
    assert_eq!(output_of(source), "0\n1\n3\n4\n");
}

#[test]
fn test_break_exits_innermost_loop() {
    let source = r#"
        for (var i = 0; i < 3; i = i + 1) {
            var j = 0;
            while (true) {
                if (j == i) break;
                j = j + 1;
            }
            print j;
        }
    "#;
    assert_eq!(output_of(source), "0\n1\n2\n");
}

#[test]
fn test_return_from_inside_loop() {
    let source = r#"
        fun firstOver(limit) {
            var n = 0;
            while (true) {
                n = n + 1;
                if (n > limit) return n;
            }
        }
        print firstOver(4);
    "#;
    assert_eq!(output_of(source), "5\n");
}

#[test]
fn test_lambdas() {
    let source = r#"
        fun apply(f, x) { return f(x); }
        print apply(fun (n) { return n * n; }, 7);
        var add = fun (a, b) { return a + b; };
        print add(2, 3);
    "#;
    assert_eq!(output_of(source), "49\n5\n");
}

#[test]
fn test_classes_fields_and_methods() {
    let source = r#"
        class Counter {
            init(start) {
                this.count = start;
            }
            bump() {
                this.count = this.count + 1;
                return this;
            }
        }
        var c = Counter(5);
        c.bump().bump();
        print c.count;
        c.extra = "field";
        print c.extra;
    "#;
    assert_eq!(output_of(source), "7\nfield\n");
}

#[test]
fn test_bound_methods_remember_this() {
    let source = r#"
        class Person {
            init(name) { this.name = name; }
            greet() { print "hi " + this.name; }
        }
        var greet = Person("ada").greet;
        greet();
    "#;
    assert_eq!(output_of(source), "hi ada\n");
}

#[test]
fn test_fields_shadow_methods() {
    let source = r#"
        class A {
            m() { return "method"; }
        }
        var a = A();
        a.m = fun () { return "field"; };
        print a.m();
    "#;
    assert_eq!(output_of(source), "field\n");
}

#[test]
fn test_initializer_returns_this() {
    let source = r#"
        class Foo {
            init() {
                this.ready = true;
                return;
            }
        }
        var foo = Foo();
        print foo.init() == foo;
        print foo.ready;
    "#;
    assert_eq!(output_of(source), "true\ntrue\n");
}

#[test]
fn test_class_arity_comes_from_init() {
    assert_eq!(
        runtime_error_of("class P { init(x, y) {} } P(1);"),
        "[line 1] Error: Expected 2 arguments but got 1."
    );
    assert_eq!(
        runtime_error_of("class Q {} Q(1);"),
        "[line 1] Error: Expected 0 arguments but got 1."
    );
}

#[test]
fn test_inheritance_and_super() {
    let source = r#"
        class Doughnut {
            cook() {
                print "Fry until golden brown.";
            }
            kind() { return "doughnut"; }
        }

        class BostonCream < Doughnut {
            cook() {
                super.cook();
                print "Pipe full of custard and coat with chocolate.";
                print this.kind();
            }
            kind() { return "boston cream"; }
        }

        BostonCream().cook();
    "#;
    assert_eq!(
        output_of(source),
        "Fry until golden brown.\nPipe full of custard and coat with chocolate.\nboston cream\n"
    );
}

#[test]
fn test_super_resolves_from_defining_class() {
    let source = r#"
        class A {
            method() { print "A method"; }
        }
        class B < A {
            method() { print "B method"; }
            test() { super.method(); }
        }
        class C < B {}
        C().test();
    "#;
    assert_eq!(output_of(source), "A method\n");
}

#[test]
fn test_inherited_methods_and_init() {
    let source = r#"
        class Base {
            init(v) { this.v = v; }
            show() { print this.v; }
        }
        class Derived < Base {}
        Derived(42).show();
    "#;
    assert_eq!(output_of(source), "42\n");
}

#[test]
fn test_getters_run_on_access() {
    let source = r#"
        class Circle {
            init(radius) { this.radius = radius; }
            area { return 3 * this.radius * this.radius; }
        }
        print Circle(2).area;
    "#;
    assert_eq!(output_of(source), "12\n");
}

#[test]
fn test_property_errors() {
    assert_eq!(
        runtime_error_of("class A {} print A().nope;"),
        "[line 1] Error: Undefined property 'nope'."
    );
    assert_eq!(
        runtime_error_of("var x = 1; print x.y;"),
        "[line 1] Error: Only instances have properties."
    );
    assert_eq!(
        runtime_error_of("var x = \"s\"; x.y = 2;"),
        "[line 1] Error: Only instances have fields."
    );
}

#[test]
fn test_superclass_must_be_a_class() {
    assert_eq!(
        runtime_error_of("var NotAClass = \"nope\";\nclass Sub < NotAClass {}"),
        "[line 2] Error: Superclass must be a class."
    );
}

#[test]
fn test_static_rules_reported_together() {
    let outcome = eval("return 1;\nclass A < A {}\nprint this;\nbreak;");
    assert_eq!(outcome.status, Status::StaticError);
    assert_eq!(
        outcome.errors,
        vec![
            "[line 1] Error at 'return': Can't return from top-level code.",
            "[line 2] Error at 'A': A class can't inherit from itself.",
            "[line 3] Error at 'this': Can't use 'this' outside of a class.",
            "[line 4] Error at 'break': Can't use 'break' outside of a loop.",
        ]
    );
}

#[test]
fn test_unbounded_recursion_is_fatal() {
    let outcome = eval("fun forever(n) { return forever(n + 1); }\nforever(0);");
    assert_eq!(outcome.status, Status::Fatal);
    assert_eq!(outcome.stages, vec![Stage::Fatal]);
    assert_eq!(outcome.errors, vec!["[line 1] Error: Stack overflow."]);
}

#[test]
fn test_call_depth_is_configurable() {
    let source = r#"
        fun depth(n) {
            if (n == 0) return 0;
            return 1 + depth(n - 1);
        }
        print depth(50);
    "#;
    let (mut shallow, out) = session(RuntimeConfig { max_call_depth: 10 });
    assert_eq!(run_in(&mut shallow, &out, source).status, Status::Fatal);

    let (mut deep, out) = session(RuntimeConfig { max_call_depth: 100 });
    let outcome = run_in(&mut deep, &out, source);
    assert_eq!(outcome.status, Status::Ok);
    assert_eq!(outcome.output, "50\n");
}

#[test]
fn test_globals_persist_across_runs() {
    let (mut lox, out) = session(RuntimeConfig::default());
    assert_eq!(run_in(&mut lox, &out, "var a = 1;").status, Status::Ok);
    assert_eq!(run_in(&mut lox, &out, "var a = a + 1;").status, Status::Ok);
    assert_eq!(run_in(&mut lox, &out, "print a;").output, "2\n");
}

#[test]
fn test_session_recovers_after_runtime_error() {
    let (mut lox, out) = session(RuntimeConfig::default());
    let failed = run_in(&mut lox, &out, "fun f() { { return 1 + nil; } } f();");
    assert_eq!(failed.status, Status::RuntimeError);

    // back at global scope: a new global goes into the table
    let recovered = run_in(&mut lox, &out, "var b = 3; print b;");
    assert_eq!(recovered.status, Status::Ok);
    assert_eq!(recovered.output, "3\n");
    assert_eq!(lox.interpreter().global("b"), Some(Value::Num(3.0)));
}

#[test]
fn test_output_before_runtime_error_is_kept() {
    let outcome = eval("print \"one\";\nprint 1 + nil;\nprint \"three\";");
    assert_eq!(outcome.status, Status::RuntimeError);
    assert_eq!(outcome.output, "one\n");
    assert_eq!(
        outcome.errors,
        vec!["[line 2] Error: Operands must be two numbers or two strings."]
    );
}

#[test]
fn test_custom_native_function() {
    let (mut lox, out) = session(RuntimeConfig::default());
    lox.define_native("double", 1, |args| match args {
        [Value::Num(n)] => Ok(Value::Num(n * 2.0)),
        _ => Err("double expects a number.".to_string()),
    });

    let ok = run_in(&mut lox, &out, "print double(21);");
    assert_eq!(ok.output, "42\n");

    let failed = run_in(&mut lox, &out, "double(\"x\");");
    assert_eq!(failed.status, Status::RuntimeError);
    assert_eq!(failed.errors, vec!["[line 1] Error: double expects a number."]);
}

#[test]
fn test_clock_is_installed() {
    assert_eq!(output_of("print clock() > 0;"), "true\n");
}

#[test]
fn test_deeply_nested_blocks() {
    let depth = 500;
    let source = format!("{}print \"deep\";{}", "{".repeat(depth), "}".repeat(depth));
    assert_eq!(output_of(&source), "deep\n");
}

#[test]
fn test_comments_are_ignored() {
    let source = "// line\n/* block /* nested */ still */ print 1; // trailing";
    assert_eq!(output_of(source), "1\n");
}

#[test]
fn test_multiline_string_literal() {
    assert_eq!(output_of("print \"a\nb\";"), "a\nb\n");
}

#[test]
fn test_long_expression_chain_runs_and_is_freed() {
    let source = format!("print 0{};", "+1".repeat(200_000));
    assert_eq!(output_of(&source), "200000\n");
}

#[test]
fn test_natives_may_initialize_a_global_of_the_same_name() {
    assert_eq!(output_of("var clock = clock; print clock;"), "<native fn>\n");

    let (mut lox, out) = session(RuntimeConfig::default());
    lox.define_native("double", 1, |args| match args {
        [Value::Num(n)] => Ok(Value::Num(n * 2.0)),
        _ => Err("double expects a number.".to_string()),
    });
    let outcome = run_in(&mut lox, &out, "var double = double; print double(4);");
    assert_eq!(outcome.status, Status::Ok, "{:?}", outcome.errors);
    assert_eq!(outcome.output, "8\n");
}

#[test]
fn test_getter_named_init_is_not_a_constructor() {
    let source = r#"
        class A {
            init { print "getter ran"; return 1; }
        }
        var a = A();
        print a;
        print a.init;
    "#;
    assert_eq!(output_of(source), "A instance\ngetter ran\n1\n");
}

#[test]
fn test_prompt_echoes_bare_expressions() {
    let (mut lox, out) = session(RuntimeConfig::default());

    assert_eq!(prompt_line(&mut lox, &out, "1 + 2").output, "3\n");
    assert_eq!(prompt_line(&mut lox, &out, "var a = \"x\";").output, "");
    assert_eq!(prompt_line(&mut lox, &out, "a + \"y\"").output, "xy\n");
    assert_eq!(prompt_line(&mut lox, &out, "a = 5").output, "5\n");
    assert_eq!(prompt_line(&mut lox, &out, "print a;").output, "5\n");
}

#[test]
fn test_prompt_reports_errors_like_a_script() {
    let (mut lox, out) = session(RuntimeConfig::default());

    let syntax = prompt_line(&mut lox, &out, "1 +");
    assert_eq!(syntax.status, Status::StaticError);
    assert_eq!(syntax.errors, vec!["[line 1] Error at end: Expect expression."]);

    let runtime = prompt_line(&mut lox, &out, "-\"s\"");
    assert_eq!(runtime.status, Status::RuntimeError);
    assert_eq!(runtime.stages, vec![Stage::Runtime]);
    assert_eq!(runtime.errors, vec!["[line 1] Error: Operand must be a number."]);
}
