//! End-to-end tests for `compile_module`, driving the full pipeline
//! (parse, substitute, codegen, X-Code validation) through the public API
//! rather than any one pass in isolation.

use avalanche_compiler::config::ExternalSymbol;
use avalanche_compiler::{compile_module, CompilerConfig};

#[test]
fn a_bare_constant_compiles_to_a_validated_program() {
    let config = CompilerConfig::default();
    let (program, errors) = compile_module("6", "const.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn assigning_an_arithmetic_expression_to_an_external_var_validates() {
    let config = CompilerConfig::new().with_external_symbol(ExternalSymbol {
        full_name: "Foo".into(),
        prototype: None,
    });
    let (program, errors) = compile_module("Foo = 6 + 7", "assign.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn an_undefined_reference_is_reported_and_produces_no_program() {
    let config = CompilerConfig::default();
    let (program, errors) = compile_module("definitely-not-declared", "undef.ava", &config);
    assert!(program.is_none());
    assert!(!errors.is_empty());
}

#[test]
fn if_else_and_while_loop_both_validate_through_xcode() {
    let config = CompilerConfig::default();

    let (if_program, if_errors) = compile_module("if [1] {2} else {3}", "ifelse.ava", &config);
    assert!(if_errors.is_empty(), "{}", if_errors.render(50, false));
    assert!(if_program.is_some());

    let (loop_program, loop_errors) = compile_module("loop [0] {1}", "loop.ava", &config);
    assert!(loop_errors.is_empty(), "{}", loop_errors.render(50, false));
    assert!(loop_program.is_some());
}

#[test]
fn try_catch_around_a_throw_links_a_real_landing_pad() {
    let config = CompilerConfig::default();
    let (program, errors) = compile_module("try {throw 1} catch {2}", "trycatch.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn a_function_may_forward_reference_one_declared_later_in_the_module() {
    let config = CompilerConfig::default();
    let source = "m-main; fun m-main () {m-helper}; fun m-helper () {1}";
    let (program, errors) = compile_module(source, "forward.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn a_function_with_parameters_reads_them_as_local_variables() {
    let config = CompilerConfig::default();
    let source = "m-add 1 2; fun m-add (x y) {x + y}";
    let (program, errors) = compile_module(source, "params.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn an_extern_fun_declared_locally_is_callable_from_the_init_body() {
    let config = CompilerConfig::default();
    let source = "extern-fun host-log \"1 message\"; host-log 6";
    let (program, errors) = compile_module(source, "extern.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}

#[test]
fn a_defop_declaration_compiles_without_invoking_the_operator() {
    let config = CompilerConfig::default();
    let source = "defop 15 macmac {statement left-side append left append right-side append right append}";
    let (program, errors) = compile_module(source, "defop.ava", &config);
    assert!(errors.is_empty(), "{}", errors.render(50, false));
    assert!(program.is_some());
}
