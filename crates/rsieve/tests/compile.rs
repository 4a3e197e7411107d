//! Compile-stage behaviour: require negotiation, tag dispatch and the
//! diagnostics contract.

use rsieve::{Diagnostics, Sieve, SieveConfig, SieveError};

fn sieve() -> Sieve {
    Sieve::with_defaults().unwrap()
}

fn compile_err(sieve: &Sieve, source: &str) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let result = sieve.compile_source("test", source, &mut diags);
    assert!(
        matches!(result, Err(SieveError::NotValid(_))),
        "expected NotValid for: {source}"
    );
    diags
}

fn compile_ok(sieve: &Sieve, source: &str) {
    let mut diags = Diagnostics::new();
    let result = sieve.compile_source("test", source, &mut diags);
    assert!(
        result.is_ok(),
        "compile failed for: {source}\n{:#?}",
        diags.entries()
    );
}

#[test]
fn require_must_come_first() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "keep; require \"fileinto\";");
    assert!(
        diags
            .first_error()
            .unwrap()
            .message
            .contains("require commands can only be placed at top level")
    );

    // Multiple leading requires are fine.
    compile_ok(
        &sieve,
        "require \"fileinto\"; require \"copy\"; fileinto :copy \"X\";",
    );
}

#[test]
fn require_not_allowed_in_blocks() {
    let sieve = sieve();
    compile_err(&sieve, "if true { require \"fileinto\"; }");
}

#[test]
fn unknown_capability_is_named() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "require \"ereject\";");
    let message = &diags.first_error().unwrap().message;
    assert!(message.contains("ereject"), "got: {message}");
}

#[test]
fn disabled_extension_cannot_be_required() {
    let mut config = SieveConfig::default();
    config.extensions = Some("-vacation".to_string());
    let sieve = Sieve::new(config).unwrap();
    let diags = compile_err(&sieve, "require \"vacation\"; vacation \"away\";");
    assert!(diags.first_error().unwrap().message.contains("vacation"));
}

#[test]
fn extension_commands_need_require() {
    let sieve = sieve();
    compile_err(&sieve, "fileinto \"Spam\";");
    compile_ok(&sieve, "require \"fileinto\"; fileinto \"Spam\";");
}

#[test]
fn extension_comparator_needs_require() {
    let sieve = sieve();
    compile_err(
        &sieve,
        "if header :comparator \"i;ascii-numeric\" :is \"x-score\" \"5\" { keep; }",
    );
    compile_ok(
        &sieve,
        "require \"comparator-i;ascii-numeric\"; \
         if header :comparator \"i;ascii-numeric\" :is \"x-score\" \"5\" { keep; }",
    );
    // The core comparators are always available.
    compile_ok(&sieve, "if header :comparator \"i;octet\" :is \"a\" \"b\" { keep; }");
}

#[test]
fn relational_tags_need_require() {
    let sieve = sieve();
    compile_err(&sieve, "if header :count \"ge\" \"to\" \"2\" { keep; }");
    compile_ok(
        &sieve,
        "require \"relational\"; if header :count \"ge\" \"to\" \"2\" { keep; }",
    );
}

#[test]
fn size_tag_arity() {
    let sieve = sieve();
    compile_ok(&sieve, "if size :over 100 { keep; }");
    compile_ok(&sieve, "if size :under 10K { discard; }");

    let diags = compile_err(&sieve, "if size 100 { keep; }");
    assert!(diags.first_error().unwrap().message.contains(":under"));

    let diags = compile_err(&sieve, "if size :over :under 100 { keep; }");
    assert!(diags.first_error().unwrap().message.contains("exactly one"));
}

#[test]
fn positional_type_errors() {
    let sieve = sieve();
    compile_err(&sieve, "if size :over \"big\" { keep; }");
    compile_err(&sieve, "redirect 42;");
    compile_err(&sieve, "if header \"subject\" { keep; }");
}

#[test]
fn unknown_tags_rejected() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "keep :shiny;");
    assert!(diags.first_error().unwrap().message.contains(":shiny"));
}

#[test]
fn copy_only_where_it_makes_sense() {
    let sieve = sieve();
    compile_ok(
        &sieve,
        "require [\"fileinto\", \"copy\"]; fileinto :copy \"X\"; redirect :copy \"a@b\";",
    );
    compile_err(&sieve, "require \"copy\"; keep :copy;");
}

#[test]
fn flags_tag_applies_to_storing_actions() {
    let sieve = sieve();
    compile_ok(
        &sieve,
        "require \"imap4flags\"; keep :flags [\"\\\\Seen\"];",
    );
    compile_err(
        &sieve,
        "require \"imap4flags\"; redirect :flags [\"\\\\Seen\"] \"a@b\";",
    );
}

#[test]
fn unknown_command_mentions_require() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "bounce \"x\";");
    assert!(diags.first_error().unwrap().message.contains("bounce"));
}

#[test]
fn elsif_requires_if() {
    let sieve = sieve();
    compile_err(&sieve, "elsif true { keep; }");
    compile_err(&sieve, "keep; else { keep; }");
    compile_ok(
        &sieve,
        "if true { keep; } elsif false { discard; } else { stop; }",
    );
}

#[test]
fn multiple_errors_are_collected() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "bounce; forward; keep :bad;");
    assert!(diags.error_count() >= 3, "got {}", diags.error_count());
}

#[test]
fn errors_carry_locations() {
    let sieve = sieve();
    let diags = compile_err(&sieve, "keep;\nbounce;");
    let error = diags.first_error().unwrap();
    assert_eq!(error.location.unwrap().line, 2);
}

#[test]
fn deprecated_imapflags_is_gated() {
    let sieve = sieve();
    compile_err(&sieve, "require \"imapflags\"; setflag [\"\\\\Seen\"];");

    let mut config = SieveConfig::default();
    config.allow_deprecated = true;
    let sieve = Sieve::new(config).unwrap();
    compile_ok(&sieve, "require \"imapflags\"; setflag [\"\\\\Seen\"];");
}

#[test]
fn capability_string_lists_extensions() {
    let sieve = sieve();
    let caps = sieve.capabilities();
    for name in [
        "fileinto",
        "reject",
        "envelope",
        "vacation",
        "subaddress",
        "comparator-i;ascii-numeric",
        "relational",
        "regex",
        "imap4flags",
        "copy",
        "variables",
    ] {
        assert!(caps.split(' ').any(|c| c == name), "missing {name} in {caps}");
    }
    // Hidden registrations never appear.
    assert!(!caps.contains('@'));
}

#[test]
fn binary_records_required_extensions() {
    let sieve = sieve();
    let mut diags = Diagnostics::new();
    let binary = sieve
        .compile_source(
            "test",
            "require [\"fileinto\", \"copy\"]; fileinto :copy \"X\";",
            &mut diags,
        )
        .unwrap();
    assert_eq!(binary.extensions(), &["fileinto", "copy"]);
}

#[test]
fn script_size_cap_enforced() {
    let mut config = SieveConfig::default();
    config.max_script_size = 10;
    let sieve = Sieve::new(config).unwrap();
    let mut diags = Diagnostics::new();
    let result = sieve.compile_source("big", "keep; keep; keep;", &mut diags);
    assert!(result.is_err());
}

#[test]
fn string_list_normalisation() {
    let sieve = sieve();
    // A one-element list is interchangeable with a single string.
    compile_ok(&sieve, "require [\"fileinto\"]; fileinto [\"Spam\"];");
    compile_ok(&sieve, "require \"fileinto\"; fileinto \"Spam\";");
}
