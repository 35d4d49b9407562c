use uuid::Uuid;

use crate::js::{self, Flavor};
use crate::patch::Patch;

use super::builtins::install_globals;
use super::error::SandboxError;
use super::interp::{Abort, Control, Interp, GLOBAL_SCOPE};
use super::logsink::LogSink;
use super::types::{RuleExecutionOptions, RuleResult};

/// Harness appended after the rule source: feed the patch list to `main`
/// and hand its decision to the output bridge, which enforces the strict
/// boolean contract.
const HARNESS: &str = "var inp = getInput();\nvar out = main(inp);\nsetOutput(out);\n";

/// Execute a compiled (baseline-dialect) rule against a patch list.
///
/// Each invocation owns an independent interpreter; nothing is shared with
/// concurrent invocations. The evaluator yields to the scheduler on a fixed
/// step cadence and the whole run is raced against `opts.timeout` — on
/// expiry the evaluator future is dropped at its next yield point and no
/// partial result is returned.
pub async fn run_rule(
    compiled_source: &str,
    patches: &[Patch],
    opts: RuleExecutionOptions,
) -> Result<RuleResult, SandboxError> {
    let invocation = Uuid::new_v4();
    let program = js::lower(js::parse(compiled_source, Flavor::Es)?);
    let harness = js::lower(js::parse(HARNESS, Flavor::Es).expect("harness source parses"));

    let input = serde_json::to_value(patches).expect("patch model serializes to JSON");

    let mut interp = Interp::new(LogSink::new(opts.log_mode, invocation), opts.max_call_depth);
    install_globals(&mut interp);
    let input_value = interp.json_to_value(&input);
    interp.input_value = input_value;

    tracing::debug!(rule_invocation = %invocation, patches = patches.len(), "running rule");

    let deadline = opts.timeout;
    let outcome = tokio::time::timeout(deadline, async {
        if let Err(c) = interp.eval_program(&program).await {
            return Err(control_to_error(&interp, c));
        }
        check_main(&interp)?;
        if let Err(c) = interp.eval_program(&harness).await {
            return Err(control_to_error(&interp, c));
        }
        Ok(())
    })
    .await;

    match outcome {
        Err(_elapsed) => Err(SandboxError::Timeout(deadline)),
        Ok(Err(e)) => Err(e),
        Ok(Ok(())) => {
            let approve = interp.output.take().ok_or_else(|| {
                SandboxError::ContractViolation("rule did not produce a decision".to_string())
            })?;
            let logs = std::mem::replace(&mut interp.sink, LogSink::Drop).into_entries();
            tracing::debug!(rule_invocation = %invocation, approve, "rule finished");
            Ok(RuleResult { approve, logs })
        }
    }
}

fn check_main(interp: &Interp) -> Result<(), SandboxError> {
    match interp.lookup(GLOBAL_SCOPE, "main") {
        None => Err(SandboxError::ContractViolation(
            "rule source does not define a main function".to_string(),
        )),
        Some(v) if interp.type_of(&v) == "function" => Ok(()),
        Some(_) => Err(SandboxError::ContractViolation(
            "main is not a function".to_string(),
        )),
    }
}

fn control_to_error(interp: &Interp, ctrl: Control) -> SandboxError {
    match ctrl {
        Control::Throw(v) => SandboxError::Runtime(interp.format_thrown(&v)),
        Control::Abort(Abort::ContractViolation(msg)) => SandboxError::ContractViolation(msg),
        Control::Return(_) | Control::Break | Control::Continue => {
            SandboxError::Runtime("unexpected control flow at top level".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_bool(rule: &str) -> Result<RuleResult, SandboxError> {
        tokio_test::block_on(run_rule(rule, &[], RuleExecutionOptions::default()))
    }

    #[test]
    fn expression_semantics() {
        assert!(run_bool("function main(p) { return 1 + \"1\" === \"11\"; }")
            .unwrap()
            .approve);
        assert!(run_bool("function main(p) { return [1, 2, 3].length === 3; }")
            .unwrap()
            .approve);
        assert!(run_bool("function main(p) { return (2 + 3) * 4 === 20; }")
            .unwrap()
            .approve);
    }

    #[test]
    fn typeof_and_equality() {
        let rule = "function main(p) { return typeof p === \"object\" && null == undefined && null !== undefined; }";
        assert!(run_bool(rule).unwrap().approve);
    }

    #[test]
    fn closures_capture_environment() {
        let rule = "function make(n) { return function (x) { return x + n; }; }\nfunction main(p) { var add2 = make(2); return add2(3) === 5; }";
        assert!(run_bool(rule).unwrap().approve);
    }

    #[test]
    fn builtin_library_surface() {
        let checks = [
            "function main(p) { return Math.max(1, 5, 3) === 5 && Math.pow(2, 8) === 256; }",
            "function main(p) { return Object.keys({a: 1, b: 2}).join(\",\") === \"a,b\"; }",
            "function main(p) { return parseInt(\"0x10\") === 16 && isNaN(parseFloat(\"x\")); }",
            "function main(p) { return \"AbC\".toLowerCase() === \"abc\" && \"a,b,c\".split(\",\").length === 3; }",
        ];
        for rule in checks {
            assert!(run_bool(rule).unwrap().approve, "failed: {rule}");
        }
    }

    #[test]
    fn switch_and_loops() {
        let rule = r#"function classify(op) {
  switch (op) {
    case "insert":
      return 1;
    case "delete":
      return 2;
    default:
      return 0;
  }
}
function main(p) {
  var total = 0;
  var ops = ["insert", "delete", "modified"];
  for (var i = 0; i < ops.length; i++) {
    total += classify(ops[i]);
  }
  var seen = 0;
  for (var k in {x: 1, y: 2}) { seen++; }
  return total === 3 && seen === 2;
}"#;
        assert!(run_bool(rule).unwrap().approve);
    }

    #[test]
    fn array_iteration_methods() {
        let rule = r#"function main(p) {
  var xs = [1, 2, 3, 4];
  var evens = xs.filter(function (x) { return x % 2 === 0; });
  var doubled = xs.map(function (x) { return x * 2; });
  var total = xs.reduce(function (a, b) { return a + b; }, 0);
  return evens.length === 2 && doubled[3] === 8 && total === 10
    && xs.some(function (x) { return x > 3; })
    && xs.every(function (x) { return x > 0; });
}"#;
        assert!(run_bool(rule).unwrap().approve);
    }

    #[test]
    fn prototype_methods_via_new() {
        let rule = r#"function Gate(limit) { this.limit = limit; }
Gate.prototype.ok = function (n) { return n <= this.limit; };
function main(p) {
  var g = new Gate(3);
  return g.ok(2) && !g.ok(4) && g instanceof Gate;
}"#;
        assert!(run_bool(rule).unwrap().approve);
    }
}
