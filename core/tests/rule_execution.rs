//! End-to-end tests for the rule execution pipeline: diff parsing into the
//! patch model, dialect compilation, and sandboxed evaluation.

use std::time::Duration;

use rulegate_core::patch::{parse_unified_diff, LineOp, Patch, PatchOp};
use rulegate_core::rules::{compile_rule_source, RuleSourceLang};
use rulegate_core::sandbox::{
    run_rule, RuleExecutionOptions, RuleLogEntry, RuleLogLevel, RuleLogMode, SandboxError,
};

fn one_patch() -> Vec<Patch> {
    vec![Patch {
        contents_id: "helloworld".to_string(),
        path: "foo.txt".to_string(),
        op: PatchOp::Insert,
        additions: 0,
        deletions: 0,
        diff: vec![],
    }]
}

fn capture_opts() -> RuleExecutionOptions {
    RuleExecutionOptions {
        log_mode: RuleLogMode::Capture,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sanity_check() {
    let rule = "function main(inp) {\n  return inp.length === 1;\n}\n";
    let result = run_rule(rule, &one_patch(), RuleExecutionOptions::default())
        .await
        .unwrap();
    assert!(result.approve);
}

#[tokio::test]
async fn test_es5_compile_is_identity_and_runs() {
    let raw = "function main(inp) {\n  return inp.length === 1;\n}\n";
    let compiled = compile_rule_source(raw, RuleSourceLang::ES5).unwrap();
    assert_eq!(compiled, raw);
    let result = run_rule(&compiled, &one_patch(), RuleExecutionOptions::default())
        .await
        .unwrap();
    assert!(result.approve);
}

#[tokio::test]
async fn test_basic_logging() {
    let rule = "function main(inp) {\n  console.log(\"hello world\");\n  return inp.length === 1;\n}\n";
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert!(!result.approve);
    assert_eq!(
        result.logs,
        vec![RuleLogEntry {
            level: RuleLogLevel::Info,
            msg: "hello world".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_logging_with_multiple_objects() {
    let rule =
        "function main(inp) {\n  console.log(\"hello\", \"world\");\n  return inp.length === 1;\n}\n";
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert_eq!(result.logs.len(), 1);
    assert_eq!(result.logs[0].msg, "hello world");
}

#[tokio::test]
async fn test_logging_order() {
    let rule = "function main(inp) {\n  console.log(\"hello\");\n  console.log(\"world\");\n  return inp.length === 1;\n}\n";
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert_eq!(
        result.logs,
        vec![
            RuleLogEntry {
                level: RuleLogLevel::Info,
                msg: "hello".to_string(),
            },
            RuleLogEntry {
                level: RuleLogLevel::Info,
                msg: "world".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_logging_warn_and_error_levels() {
    let rule = "function main(inp) {\n  console.warn(\"w\");\n  console.error(\"e\");\n  return false;\n}\n";
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert_eq!(result.logs[0].level, RuleLogLevel::Warn);
    assert_eq!(result.logs[1].level, RuleLogLevel::Error);
}

#[tokio::test]
async fn test_log_alias_binding() {
    let rule = "function main(inp) {\n  log(\"via alias\");\n  return false;\n}\n";
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert_eq!(result.logs[0].msg, "via alias");
    assert_eq!(result.logs[0].level, RuleLogLevel::Info);
}

#[tokio::test]
async fn test_drop_mode_discards_logs() {
    let rule = "function main(inp) {\n  console.log(\"noisy\");\n  console.error(\"still noisy\");\n  return true;\n}\n";
    let result = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap();
    assert!(result.approve);
    assert!(result.logs.is_empty());
}

#[tokio::test]
async fn test_console_mode_forwards_without_capturing() {
    // Forwarded lines go to tracing; the result carries no log entries.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let rule = "function main(inp) {\n  console.log(\"forwarded\");\n  return true;\n}\n";
    let opts = RuleExecutionOptions {
        log_mode: RuleLogMode::Console,
        ..Default::default()
    };
    let result = run_rule(rule, &[], opts).await.unwrap();
    assert!(result.logs.is_empty());
}

#[tokio::test]
async fn test_main_return_must_be_boolean_string() {
    let rule = "function main(inp) {\n  return \"hello world\";\n}\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    let SandboxError::ContractViolation(msg) = err else {
        panic!("expected contract violation, got {err:?}");
    };
    assert!(msg.contains("main function must return boolean"));
}

#[tokio::test]
async fn test_main_return_must_be_boolean_other_types() {
    for ret in ["42", "{}", "[true]", "undefined", "null"] {
        let rule = format!("function main(inp) {{\n  return {ret};\n}}\n");
        let err = run_rule(&rule, &[], RuleExecutionOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, SandboxError::ContractViolation(_)),
            "return {ret} should be a contract violation, got {err:?}"
        );
    }
}

#[tokio::test]
async fn test_missing_main_is_contract_violation() {
    let rule = "var x = 1;\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ContractViolation(_)));
}

#[tokio::test]
async fn test_non_function_main_is_contract_violation() {
    let rule = "var main = 42;\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ContractViolation(_)));
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let rule = "function main(inp) {\n  while (true) {}\n  return true;\n}\n";
    let opts = RuleExecutionOptions {
        timeout: Duration::from_millis(150),
        ..Default::default()
    };
    let started = std::time::Instant::now();
    let err = run_rule(rule, &[], opts).await.unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)));
    assert!(err.to_string().contains("timed out"));
    // Bounded scheduling overhead, not an unbounded hang.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_xml_http_request_not_supported() {
    let rule = r#"function main(inp) {
  var req = new XMLHttpRequest();
  req.open("GET", inp);
  req.send();
  return true;
}"#;
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    let SandboxError::Runtime(msg) = err else {
        panic!("expected runtime error, got {err:?}");
    };
    assert!(msg.contains("XMLHttpRequest is not defined"));
}

#[tokio::test]
async fn test_fetch_not_supported() {
    let rule = "function main(inp) {\n  fetch(\"http://example.com\");\n  return true;\n}\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fetch is not defined"));
}

#[tokio::test]
async fn test_process_not_supported() {
    let rule = "function main(inp) {\n  console.log(process.env);\n  return true;\n}\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("process is not defined"));
}

#[tokio::test]
async fn test_timer_globals_not_supported() {
    let rule = "function main(inp) {\n  setTimeout(function() {}, 10);\n  return true;\n}\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("setTimeout is not defined"));
}

#[tokio::test]
async fn test_repeated_runs_are_deterministic() {
    let rule = "function main(inp) {\n  var n = 0;\n  for (var i = 0; i < inp.length; i++) {\n    n += inp[i].additions;\n  }\n  console.log(\"total:\", n);\n  return n < 10;\n}\n";
    let patches = vec![
        Patch {
            contents_id: "gh:a".to_string(),
            path: "a.txt".to_string(),
            op: PatchOp::Modified,
            additions: 3,
            deletions: 1,
            diff: vec![],
        },
        Patch {
            contents_id: "gh:b".to_string(),
            path: "b.txt".to_string(),
            op: PatchOp::Modified,
            additions: 4,
            deletions: 0,
            diff: vec![],
        },
    ];
    let first = run_rule(rule, &patches, capture_opts()).await.unwrap();
    let second = run_rule(rule, &patches, capture_opts()).await.unwrap();
    assert_eq!(first.approve, second.approve);
    assert_eq!(first.logs, second.logs);
    assert_eq!(first.logs[0].msg, "total: 7");
}

#[tokio::test]
async fn test_rule_reads_patch_model() {
    let diff = "@@ -1,2 +1,2 @@\n-foo\n+bar\n bar2";
    let hunks = parse_unified_diff(diff).unwrap();
    assert_eq!(hunks[0].diff_operations[0].op, LineOp::Modified);
    let patches = vec![Patch {
        contents_id: "gh:readme".to_string(),
        path: "README.md".to_string(),
        op: PatchOp::Modified,
        additions: 1,
        deletions: 1,
        diff: hunks,
    }];
    // Only the README changed, and only line modifications touched it.
    let rule = r#"function main(patches) {
  if (patches.length !== 1) {
    return false;
  }
  var p = patches[0];
  if (p.path !== "README.md" || p.op !== "modified") {
    return false;
  }
  var ops = p.diff[0].diffOperations;
  return ops[0].op === "modified" && ops[0].text === "foo" && ops[0].newText === "bar";
}"#;
    let result = run_rule(rule, &patches, RuleExecutionOptions::default())
        .await
        .unwrap();
    assert!(result.approve);
}

#[tokio::test]
async fn test_es6_rule_matches_es5_equivalent() {
    let es6 = r#"
const allowed = (p) => p.path.startsWith(`docs/`);
function main(patches) {
  return patches.every(allowed);
}
"#;
    let es5 = r#"
function allowed(p) { return p.path.indexOf("docs/") === 0; }
function main(patches) {
  var ok = true;
  for (var i = 0; i < patches.length; i++) {
    if (!allowed(patches[i])) { ok = false; }
  }
  return ok;
}
"#;
    let patches = vec![Patch {
        contents_id: "gh:docs".to_string(),
        path: "docs/guide.md".to_string(),
        op: PatchOp::Modified,
        additions: 1,
        deletions: 0,
        diff: vec![],
    }];
    let compiled = compile_rule_source(es6, RuleSourceLang::ES6).unwrap();
    let a = run_rule(&compiled, &patches, RuleExecutionOptions::default())
        .await
        .unwrap();
    let b = run_rule(es5, &patches, RuleExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(a.approve, b.approve);
    assert!(a.approve);
}

#[tokio::test]
async fn test_typescript_rule_compiles_and_runs() {
    let ts = r#"
interface Change { path: string; additions: number }
function small(c: Change): boolean {
  return c.additions < 5;
}
function main(patches: Change[]): boolean {
  return patches.every((c: Change) => small(c));
}
"#;
    let compiled = compile_rule_source(ts, RuleSourceLang::TypeScript).unwrap();
    let result = run_rule(&compiled, &one_patch(), RuleExecutionOptions::default())
        .await
        .unwrap();
    assert!(result.approve);
}

#[tokio::test]
async fn test_unbounded_recursion_is_a_runtime_error() {
    let rule = "function f(n) { return f(n + 1); }\nfunction main(inp) { return f(0); }\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    let SandboxError::Runtime(msg) = err else {
        panic!("expected runtime error, got {err:?}");
    };
    assert!(msg.contains("Maximum call stack size exceeded"));
}

#[tokio::test]
async fn test_thrown_errors_surface_as_runtime_errors() {
    let rule = "function main(inp) {\n  throw new Error(\"boom\");\n}\n";
    let err = run_rule(rule, &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Error: boom"));
}

#[tokio::test]
async fn test_rule_can_catch_its_own_errors() {
    let rule = r#"function main(inp) {
  try {
    throw new Error("recoverable");
  } catch (e) {
    console.log("caught:", e.message);
    return true;
  }
}"#;
    let result = run_rule(rule, &[], capture_opts()).await.unwrap();
    assert!(result.approve);
    assert_eq!(result.logs[0].msg, "caught: recoverable");
}

#[tokio::test]
async fn test_json_builtins_available() {
    let rule = r#"function main(inp) {
  var roundtrip = JSON.parse(JSON.stringify(inp));
  console.log(JSON.stringify({count: roundtrip.length}));
  return roundtrip.length === inp.length;
}"#;
    let result = run_rule(rule, &one_patch(), capture_opts()).await.unwrap();
    assert!(result.approve);
    assert_eq!(result.logs[0].msg, "{\"count\":1}");
}

#[tokio::test]
async fn test_compile_error_on_broken_source() {
    let err = run_rule("function main(inp { return true; }", &[], RuleExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Compile(_)));
}

#[tokio::test]
async fn test_concurrent_invocations_are_isolated() {
    let leak = "function main(inp) {\n  shared = (typeof shared === \"undefined\") ? 1 : shared + 1;\n  return shared === 1;\n}\n";
    let (a, b) = tokio::join!(
        run_rule(leak, &[], RuleExecutionOptions::default()),
        run_rule(leak, &[], RuleExecutionOptions::default()),
    );
    // Each invocation gets a fresh global scope, so both see the first write.
    assert!(a.unwrap().approve);
    assert!(b.unwrap().approve);
}
