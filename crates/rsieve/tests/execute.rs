//! End-to-end execution scenarios.

use rsieve::testing::{CollectingDelivery, TestMessage};
use rsieve::{Action, Binary, Diagnostics, ExecStatus, Sieve, SieveConfig};

fn sieve() -> Sieve {
    Sieve::with_defaults().unwrap()
}

fn compile(sieve: &Sieve, source: &str) -> Binary {
    let mut diags = Diagnostics::new();
    match sieve.compile_source("test", source, &mut diags) {
        Ok(binary) => binary,
        Err(err) => panic!("compile failed: {err}\n{:#?}", diags.entries()),
    }
}

fn run(source: &str, message: &TestMessage) -> (ExecStatus, CollectingDelivery) {
    let sieve = sieve();
    let binary = compile(&sieve, source);
    let mut delivery = CollectingDelivery::default();
    let status = sieve.execute(&binary, message, &mut delivery);
    (status, delivery)
}

fn folders(delivery: &CollectingDelivery) -> Vec<&str> {
    delivery.stored.iter().map(|(f, _)| f.as_str()).collect()
}

// ============= Basic dispositions =============

#[test]
fn fileinto_cancels_implicit_keep() {
    let message = TestMessage::new().with_header("Subject", "x");
    let (status, delivery) = run("require \"fileinto\"; fileinto \"Spam\";", &message);
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["Spam"]);
}

#[test]
fn contains_uses_default_comparator() {
    let message = TestMessage::new().with_header("Subject", "big SALE today");
    let script = "if header :contains \"Subject\" \"sale\" { discard; }";
    let (status, delivery) = run(script, &message);
    assert_eq!(status, ExecStatus::Ok);
    assert!(delivery.discarded);
    assert!(delivery.stored.is_empty());

    // Same test under i;octet misses and the implicit keep fires.
    let script = "if header :comparator \"i;octet\" :contains \"Subject\" \"sale\" { discard; }";
    let (status, delivery) = run(script, &message);
    assert_eq!(status, ExecStatus::Ok);
    assert!(!delivery.discarded);
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn address_localpart_match() {
    let message = TestMessage::new().with_header("To", "Alice <alice@example.org>");
    let script = "if address :localpart :is \"to\" \"alice\" { redirect \"a@b\"; }";
    let (status, delivery) = run(script, &message);
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(delivery.redirected, vec!["a@b"]);
    assert!(delivery.stored.is_empty());
}

#[test]
fn size_over_threshold() {
    let script = "if size :over 1K { discard; }";
    let (_, delivery) = run(script, &TestMessage::new().with_size(2048));
    assert!(delivery.discarded);

    let (_, delivery) = run(script, &TestMessage::new().with_size(512));
    assert!(!delivery.discarded);
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn multiscript_accumulates_shared_result() {
    let sieve = sieve();
    let first = compile(&sieve, "require \"fileinto\"; fileinto \"A\";");
    let second = compile(&sieve, "keep;");
    let message = TestMessage::new();
    let mut delivery = CollectingDelivery::default();

    let mut chain = sieve.multiscript(&message);
    assert!(chain.run(&first));
    assert!(chain.run(&second));
    let status = chain.finish(&mut delivery);

    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["A", "INBOX"]);
    // One copy each: the keep and the fileinto deduplicated separately.
    assert_eq!(delivery.stored.len(), 2);
}

// ============= Invariants =============

#[test]
fn size_boundary_is_exclusive() {
    // Property 10: equality is false for both :over and :under.
    let message = TestMessage::new().with_size(1024);
    let (_, delivery) = run("if size :over 1K { discard; }", &message);
    assert!(!delivery.discarded);
    let (_, delivery) = run("if size :under 1K { discard; }", &message);
    assert!(!delivery.discarded);
}

#[test]
fn comparator_default_is_casemap() {
    // Property 2: absence of :comparator behaves like an explicit
    // i;ascii-casemap.
    let message = TestMessage::new().with_header("Subject", "HELLO");
    let implicit = "if header :is \"subject\" \"hello\" { discard; }";
    let explicit =
        "if header :comparator \"i;ascii-casemap\" :is \"subject\" \"hello\" { discard; }";
    let (_, d1) = run(implicit, &message);
    let (_, d2) = run(explicit, &message);
    assert!(d1.discarded);
    assert!(d2.discarded);
}

#[test]
fn glob_semantics() {
    let hits = [
        ("a*b", "ab"),
        ("a*b", "a-anything-b"),
        ("a?c", "abc"),
        ("\\\\*", "*"),
    ];
    for (pattern, subject) in hits {
        let message = TestMessage::new().with_header("Subject", subject);
        let script = format!("if header :matches \"subject\" \"{pattern}\" {{ discard; }}");
        let (_, delivery) = run(&script, &message);
        assert!(delivery.discarded, "{pattern} should match {subject}");
    }
    let misses = [("a*b", "ba"), ("a?c", "ac"), ("\\\\*", "x")];
    for (pattern, subject) in misses {
        let message = TestMessage::new().with_header("Subject", subject);
        let script = format!("if header :matches \"subject\" \"{pattern}\" {{ discard; }}");
        let (_, delivery) = run(&script, &message);
        assert!(!delivery.discarded, "{pattern} should not match {subject}");
    }
}

#[test]
fn duplicate_fileinto_collapses() {
    // Property 6.
    let script = "require \"fileinto\"; fileinto \"X\"; fileinto \"X\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["X"]);
}

#[test]
fn discard_loses_to_fileinto() {
    // Property 7.
    let script = "require \"fileinto\"; discard; fileinto \"X\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["X"]);
    assert!(!delivery.discarded);
}

#[test]
fn redirect_cap_aborts_run() {
    // Property 8: the fifth distinct redirect trips the default cap of
    // four; nothing executes and the message survives via implicit keep.
    let script = "redirect \"a@x\"; redirect \"b@x\"; redirect \"c@x\"; \
                  redirect \"d@x\"; redirect \"e@x\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Failure);
    assert!(delivery.redirected.is_empty());
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn implicit_keep_exactly_once() {
    // Property 9.
    let (_, delivery) = run("if false { discard; }", &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["INBOX"]);

    let (_, delivery) = run("keep;", &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["INBOX"]);
    assert_eq!(delivery.stored.len(), 1);
}

// ============= Control flow =============

#[test]
fn elsif_chain_takes_one_branch() {
    let script = "if header :is \"tag\" \"a\" { fileinto \"A\"; } \
                  elsif header :is \"tag\" \"b\" { fileinto \"B\"; } \
                  else { fileinto \"C\"; }";
    let script = format!("require \"fileinto\"; {script}");

    for (value, folder) in [("a", "A"), ("b", "B"), ("z", "C")] {
        let message = TestMessage::new().with_header("Tag", value);
        let (_, delivery) = run(&script, &message);
        assert_eq!(folders(&delivery), vec![folder], "tag {value}");
    }
}

#[test]
fn allof_anyof_short_circuit() {
    let message = TestMessage::new().with_header("A", "1");
    let script = "if allof (exists \"a\", exists \"b\") { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(!delivery.discarded);

    let script = "if anyof (exists \"b\", exists \"a\") { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);

    let script = "if not exists \"b\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);
}

#[test]
fn stop_ends_script() {
    let message = TestMessage::new().with_header("Subject", "x");
    let script = "if header :is \"subject\" \"x\" { stop; } discard;";
    let (status, delivery) = run(script, &message);
    assert_eq!(status, ExecStatus::Ok);
    assert!(!delivery.discarded);
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

// ============= Extensions =============

#[test]
fn envelope_test() {
    let message = TestMessage::new().with_envelope("bob@example.net", "alice@example.org");
    let script = "require \"envelope\"; \
                  if envelope :localpart :is \"to\" \"alice\" { redirect \"a@b\"; }";
    let (_, delivery) = run(script, &message);
    assert_eq!(delivery.redirected, vec!["a@b"]);
}

#[test]
fn subaddress_parts() {
    let message = TestMessage::new().with_header("To", "ml+sieve@example.org");
    let script = "require \"subaddress\"; \
                  if address :detail \"to\" \"sieve\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);
}

#[test]
fn relational_count() {
    let message = TestMessage::new()
        .with_header("To", "a@x.org")
        .with_header("To", "b@x.org");
    let script = "require \"relational\"; \
                  if header :count \"ge\" \"to\" \"2\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);

    let script = "require \"relational\"; \
                  if header :count \"gt\" \"to\" \"2\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(!delivery.discarded);
}

#[test]
fn relational_value_numeric() {
    let message = TestMessage::new().with_header("X-Score", "42");
    let script = "require [\"relational\", \"comparator-i;ascii-numeric\"]; \
                  if header :value \"ge\" :comparator \"i;ascii-numeric\" \
                  \"x-score\" \"10\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);
}

#[test]
fn regex_match() {
    let message = TestMessage::new().with_header("Subject", "ticket-1234: help");
    let script = "require \"regex\"; \
                  if header :regex \"subject\" \"^ticket-[0-9]+\" { discard; }";
    let (_, delivery) = run(script, &message);
    assert!(delivery.discarded);
}

#[test]
fn bad_regex_fails_test_not_script() {
    let message = TestMessage::new().with_header("Subject", "anything");
    let script = "require \"regex\"; \
                  if header :regex \"subject\" \"(unclosed\" { discard; }";
    let (status, delivery) = run(script, &message);
    assert_eq!(status, ExecStatus::Ok);
    assert!(!delivery.discarded);
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn reject_bounces() {
    let script = "require \"reject\"; reject \"not here\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(delivery.rejected, vec!["not here"]);
    assert!(delivery.stored.is_empty());
}

#[test]
fn reject_conflicts_with_fileinto() {
    let script = "require [\"reject\", \"fileinto\"]; fileinto \"X\"; reject \"no\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Failure);
    // The message survives via implicit keep.
    assert_eq!(folders(&delivery), vec!["INBOX"]);
    assert!(delivery.rejected.is_empty());
}

#[test]
fn vacation_responds_and_keeps() {
    let script = "require \"vacation\"; vacation :days 3 :subject \"Out\" \"gone fishing\";";
    let (status, delivery) = run(script, &TestMessage::new());
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(delivery.vacations, vec!["gone fishing"]);
    // Vacation does not cancel the implicit keep.
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn copy_preserves_implicit_keep() {
    let script = "require [\"fileinto\", \"copy\"]; fileinto :copy \"Archive\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["Archive", "INBOX"]);
}

#[test]
fn flags_snapshot_into_stores() {
    let script = "require [\"imap4flags\", \"fileinto\"]; \
                  setflag [\"\\\\Seen\"]; addflag [\"\\\\Flagged\"]; \
                  fileinto \"X\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(
        delivery.stored,
        vec![("X".to_string(), vec!["\\Seen".to_string(), "\\Flagged".to_string()])]
    );
}

#[test]
fn explicit_flags_override_internal_set() {
    let script = "require [\"imap4flags\", \"fileinto\"]; \
                  setflag [\"\\\\Seen\"]; \
                  fileinto :flags [\"\\\\Draft\"] \"X\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(
        delivery.stored,
        vec![("X".to_string(), vec!["\\Draft".to_string()])]
    );
}

#[test]
fn flags_apply_to_implicit_keep() {
    let script = "require \"imap4flags\"; setflag [\"\\\\Seen\"]; removeflag [\"\\\\Answered\"];";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(
        delivery.stored,
        vec![("INBOX".to_string(), vec!["\\Seen".to_string()])]
    );
}

#[test]
fn hasflag_reads_internal_set() {
    let script = "require [\"imap4flags\", \"fileinto\"]; \
                  addflag [\"\\\\Urgent\"]; \
                  if hasflag [\"\\\\Urgent\"] { fileinto \"Urgent\"; }";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["Urgent"]);
}

#[test]
fn variables_substitution() {
    let script = "require [\"variables\", \"fileinto\"]; \
                  set \"folder\" \"Work\"; fileinto \"${folder}\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["Work"]);
}

#[test]
fn variables_case_modifiers() {
    let script = "require [\"variables\", \"fileinto\"]; \
                  set :upper \"folder\" \"work\"; fileinto \"pre-${folder}\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["pre-WORK"]);
}

#[test]
fn match_values_feed_variables() {
    let message = TestMessage::new().with_header("Subject", "sale shoes");
    let script = "require [\"variables\", \"fileinto\"]; \
                  if header :matches \"subject\" \"sale *\" { fileinto \"${1}\"; }";
    let (_, delivery) = run(script, &message);
    assert_eq!(folders(&delivery), vec!["shoes"]);
}

#[test]
fn unset_variable_expands_empty() {
    let script = "require [\"variables\", \"fileinto\"]; fileinto \"pre${nothing}post\";";
    let (_, delivery) = run(script, &TestMessage::new());
    assert_eq!(folders(&delivery), vec!["prepost"]);
}

// ============= Multiscript =============

#[test]
fn multiscript_discard_skips_rest() {
    let sieve = sieve();
    let first = compile(&sieve, "discard;");
    let second = compile(&sieve, "keep;");
    let message = TestMessage::new();

    let mut chain = sieve.multiscript(&message);
    assert!(!chain.run(&first));
    // The second script is skipped entirely.
    assert!(!chain.run(&second));

    let mut delivery = CollectingDelivery::default();
    let status = chain.finish(&mut delivery);
    assert_eq!(status, ExecStatus::Ok);
    assert!(delivery.stored.is_empty());
    assert!(delivery.discarded);
}

#[test]
fn multiscript_stop_skips_rest() {
    let sieve = sieve();
    let first = compile(&sieve, "stop;");
    let second = compile(&sieve, "require \"fileinto\"; fileinto \"X\";");
    let message = TestMessage::new();

    let mut chain = sieve.multiscript(&message);
    assert!(!chain.run(&first));
    assert!(!chain.run(&second));

    let mut delivery = CollectingDelivery::default();
    assert_eq!(chain.finish(&mut delivery), ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["INBOX"]);
}

#[test]
fn multiscript_discard_script_runs_without_delivery() {
    let sieve = sieve();
    let main = compile(&sieve, "if false { keep; }");
    let discard_script = compile(&sieve, "require \"fileinto\"; fileinto \"Bulk\";");
    let message = TestMessage::new();

    let mut chain = sieve.multiscript(&message);
    chain.run(&main);
    assert!(chain.will_discard());
    chain.run_discard(&discard_script);

    let mut delivery = CollectingDelivery::default();
    assert_eq!(chain.finish(&mut delivery), ExecStatus::Ok);
    assert_eq!(folders(&delivery), vec!["Bulk"]);
}

#[test]
fn multiscript_discard_script_skipped_after_delivery() {
    let sieve = sieve();
    let main = compile(&sieve, "keep;");
    let message = TestMessage::new();

    let mut chain = sieve.multiscript(&message);
    chain.run(&main);
    assert!(!chain.will_discard());
}

#[test]
fn multiscript_tempfail_before_execution() {
    let sieve = sieve();
    let main = compile(&sieve, "keep;");
    let message = TestMessage::new();

    let mut chain = sieve.multiscript(&message);
    chain.run(&main);
    let mut delivery = CollectingDelivery::default();
    assert_eq!(chain.tempfail(&mut delivery), ExecStatus::TempFailure);
    assert!(delivery.stored.is_empty());
}

// ============= Failure handling =============

#[test]
fn temp_failing_store_returns_temp_failure() {
    let sieve = sieve();
    let binary = compile(&sieve, "keep;");
    let mut delivery = CollectingDelivery::default();
    delivery.fail_store = Some(rsieve::DeliveryError::Temporary("mailbox busy".into()));
    let status = sieve.execute(&binary, &TestMessage::new(), &mut delivery);
    assert_eq!(status, ExecStatus::TempFailure);
}

#[test]
fn keep_failed_is_reported() {
    let sieve = sieve();
    let binary = compile(&sieve, "keep;");
    let mut delivery = CollectingDelivery::default();
    delivery.fail_store = Some(rsieve::DeliveryError::Permanent("quota exceeded".into()));
    let status = sieve.execute(&binary, &TestMessage::new(), &mut delivery);
    assert_eq!(status, ExecStatus::Failure);
}

#[test]
fn runtime_errors_land_in_user_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sieve.log");
    let mut config = SieveConfig::default();
    config.max_redirects = 1;
    config.user_log = Some(log_path.clone());
    let sieve = Sieve::new(config).unwrap();

    let binary = compile(&sieve, "redirect \"a@x\"; redirect \"b@x\";");
    let mut delivery = CollectingDelivery::default();
    sieve.execute(&binary, &TestMessage::new(), &mut delivery);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("redirect limit"), "log: {log}");
}

#[test]
fn actions_recorded_in_result() {
    let sieve = sieve();
    let binary = compile(&sieve, "require \"fileinto\"; fileinto \"X\"; redirect \"a@b\";");
    let mut result = rsieve::SieveResult::new(sieve.config());
    let (status, stopped) = sieve.run_into(&binary, &TestMessage::new(), &mut result);
    assert_eq!(status, ExecStatus::Ok);
    assert!(!stopped);
    assert_eq!(result.actions().len(), 2);
    assert!(matches!(result.actions()[0], Action::FileInto { .. }));
    assert!(matches!(result.actions()[1], Action::Redirect { .. }));
}
