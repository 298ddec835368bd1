mod common;

use common::expand_str;
use sucrose::{resolve, Syntax};

fn occurrences<'a>(out: &'a [Syntax], value: &str) -> Vec<&'a Syntax> {
    out.iter().filter(|s| s.value() == value).collect()
}

#[test]
fn template_binding_does_not_capture_call_site_references() {
    let out = expand_str(
        "macro swap { rule { ( $a , $b ) } => { var tmp = $a ; $a = $b ; $b = tmp ; } } \
         var tmp = 1 ; \
         var x = 2 ; \
         swap ( tmp , x )",
    )
    .unwrap();

    // Occurrences of `tmp`, in output order: the program's own binding,
    // the template's binding, the spliced call-site argument twice, and
    // the template's closing reference.
    let tmps = occurrences(&out, "tmp");
    assert_eq!(tmps.len(), 5);
    let names: Vec<String> = tmps.iter().map(|s| resolve(s)).collect();

    // Program binding and both spliced arguments are the same variable.
    assert_eq!(names[0], names[2]);
    assert_eq!(names[0], names[3]);
    // The template's binding and its closing reference agree with each
    // other but name a different variable.
    assert_eq!(names[1], names[4]);
    assert_ne!(names[0], names[1]);
}

#[test]
fn each_application_introduces_a_distinct_binding() {
    let out = expand_str(
        "macro decl_t { rule { } => { var t = 0 ; } } decl_t decl_t",
    )
    .unwrap();
    let ts = occurrences(&out, "t");
    assert_eq!(ts.len(), 2);
    assert_ne!(resolve(ts[0]), resolve(ts[1]));
}

#[test]
fn resolution_is_stable_on_expanded_output() {
    let out = expand_str("var x = 1 ; x").unwrap();
    for stx in out.iter().filter(|s| s.is_identifier()) {
        assert_eq!(resolve(stx), resolve(stx));
    }
    let xs = occurrences(&out, "x");
    assert_eq!(xs.len(), 2);
    assert_eq!(resolve(xs[0]), resolve(xs[1]));
}

#[test]
fn declared_variables_get_synthetic_names() {
    let out = expand_str("var x = 1 ;").unwrap();
    let xs = occurrences(&out, "x");
    assert_eq!(xs.len(), 1);
    let name = resolve(xs[0]);
    assert_ne!(name, "x");
    assert!(name.starts_with("x$"));
}

#[test]
fn unrelated_spellings_are_left_alone() {
    let out = expand_str("var x = 1 ; y").unwrap();
    let ys = occurrences(&out, "y");
    assert_eq!(ys.len(), 1);
    assert_eq!(resolve(ys[0]), "y");
}

#[test]
fn function_parameters_shadow_outer_bindings() {
    let out = expand_str("var x = 1 ; function f ( x ) { x ; } x").unwrap();

    let xs = occurrences(&out, "x");
    // Outer binding, parameter, body reference, trailing outer reference.
    assert_eq!(xs.len(), 4);
    let names: Vec<String> = xs.iter().map(|s| resolve(s)).collect();
    assert_eq!(names[1], names[2]);
    assert_eq!(names[0], names[3]);
    assert_ne!(names[0], names[1]);
}

#[test]
fn catch_parameters_shadow_outer_bindings() {
    let out = expand_str("var e = 1 ; catch ( e ) { e ; } e").unwrap();

    let es = occurrences(&out, "e");
    // Outer binding, catch parameter, body reference, trailing outer
    // reference.
    assert_eq!(es.len(), 4);
    let names: Vec<String> = es.iter().map(|s| resolve(s)).collect();
    assert_eq!(names[1], names[2]);
    assert_eq!(names[0], names[3]);
    assert_ne!(names[0], names[1]);
}

#[test]
fn repetition_splices_keep_call_site_identity() {
    let out = expand_str(
        "macro list { rule { $x (,) ... } => { [ $x (,) ... ] } } \
         var a = 1 ; \
         list a , a",
    )
    .unwrap();
    let ays = occurrences(&out, "a");
    assert_eq!(ays.len(), 3);
    let names: Vec<String> = ays.iter().map(|s| resolve(s)).collect();
    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], names[2]);
}
