use crate::js::{self, Flavor};

use super::error::CompileError;
use super::types::RuleSourceLang;

/// Markers delimiting lines stripped before TypeScript compilation, so rule
/// authors can keep type-only imports out of the executable source.
const REMOVE_START: &str = "// rulegate remove-start";
const REMOVE_END: &str = "// rulegate remove-end";

/// Normalize rule source into the baseline dialect the sandbox executes.
///
/// ES5 source is returned unchanged. ES6 source is parsed, desugared, and
/// re-emitted as ES5. TypeScript source additionally has its removal-marker
/// blocks stripped and its type syntax discarded before taking the ES6
/// path. Pure: no caching, no I/O.
pub fn compile_rule_source(source: &str, lang: RuleSourceLang) -> Result<String, CompileError> {
    match lang {
        RuleSourceLang::ES5 => Ok(source.to_string()),
        RuleSourceLang::ES6 => transpile(source, Flavor::Es),
        RuleSourceLang::TypeScript => {
            let stripped = strip_removal_blocks(source);
            transpile(&stripped, Flavor::Ts)
        }
    }
}

/// Compile a rule file, inferring the dialect from its extension and
/// attaching the filename to any syntax error.
pub fn compile_rule_file(filename: &str, source: &str) -> Result<String, CompileError> {
    let ext = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    let lang = RuleSourceLang::from_extension(ext)?;
    compile_rule_source(source, lang).map_err(|e| e.with_file(filename))
}

fn transpile(source: &str, flavor: Flavor) -> Result<String, CompileError> {
    let program = js::parse(source, flavor)?;
    let lowered = js::lower(program);
    let out = js::emit(&lowered);
    tracing::debug!(
        in_bytes = source.len(),
        out_bytes = out.len(),
        "compiled rule source to baseline dialect"
    );
    Ok(out)
}

fn strip_removal_blocks(source: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut ignore = false;
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed == REMOVE_START {
            ignore = true;
        } else if trimmed == REMOVE_END {
            ignore = false;
        } else if !ignore {
            out.push(line);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn es5_is_identity_for_any_input() {
        let src = "function main(inp) { return inp.length === 1; }";
        assert_eq!(compile_rule_source(src, RuleSourceLang::ES5).unwrap(), src);
        // Identity even for source that is not valid script.
        let garbage = "this is not a program {{{";
        assert_eq!(
            compile_rule_source(garbage, RuleSourceLang::ES5).unwrap(),
            garbage
        );
    }

    #[test]
    fn es6_downlevels_to_es5() {
        let src = r#"
const check = (p) => p.path === `docs/${p.name}`;
function main(patches) {
  return patches.every(check);
}
"#;
        let out = compile_rule_source(src, RuleSourceLang::ES6).unwrap();
        assert!(!out.contains("=>"));
        assert!(!out.contains("const "));
        assert!(!out.contains('`'));
        assert!(out.contains("function"));
    }

    #[test]
    fn typescript_annotations_are_stripped() {
        let src = r#"
interface Named { name: string }
function main(patches: Named[]): boolean {
  const first = patches[0] as Named;
  return patches.length === 1 && first.name !== "";
}
"#;
        let out = compile_rule_source(src, RuleSourceLang::TypeScript).unwrap();
        assert!(!out.contains("interface"));
        assert!(!out.contains(": string"));
        assert!(!out.contains(" as "));
    }

    #[test]
    fn removal_markers_strip_lines() {
        let src = "// rulegate remove-start\nimport type { Patch } from \"./types\";\n// rulegate remove-end\nfunction main(p) { return true; }\n";
        let out = compile_rule_source(src, RuleSourceLang::TypeScript).unwrap();
        assert!(!out.contains("import"));
        assert!(out.contains("function main"));
    }

    #[test]
    fn syntax_error_carries_line_context() {
        let src = "function main(p) {\n  return p..path;\n}";
        let err = compile_rule_source(src, RuleSourceLang::ES6).unwrap_err();
        let CompileError::Syntax(parse) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(parse.line, 2);
    }

    #[test]
    fn file_compile_attaches_filename() {
        let err = compile_rule_file("check.ts", "function main(p) { return (; }").unwrap_err();
        assert!(err.to_string().starts_with("check.ts: "));
    }

    #[test]
    fn file_compile_rejects_unknown_extension() {
        assert!(matches!(
            compile_rule_file("check.py", "def main(): pass"),
            Err(CompileError::UnknownDialect(_))
        ));
    }

    #[test]
    fn unsupported_constructs_error() {
        assert!(compile_rule_source("function main(...args) { return true; }", RuleSourceLang::ES6)
            .is_err());
        assert!(compile_rule_source("enum E { A }", RuleSourceLang::TypeScript).is_err());
    }

    #[test]
    fn compiled_output_reparses_as_es5() {
        let src = "class Gate { constructor(limit) { this.limit = limit; } ok(n) { return n <= this.limit; } }\nfunction main(ps) { return new Gate(3).ok(ps.length); }";
        let out = compile_rule_source(src, RuleSourceLang::ES6).unwrap();
        // The emitted baseline must itself compile as ES5 input.
        assert!(compile_rule_source(&out, RuleSourceLang::ES6).is_ok());
        assert!(out.contains("Gate.prototype.ok"));
    }
}
