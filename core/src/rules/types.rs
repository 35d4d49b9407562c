use serde::{Deserialize, Serialize};

use super::compile::compile_rule_source;
use super::error::CompileError;

/// The declared (or extension-inferred) source dialect of a rule function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSourceLang {
    #[serde(rename = "es5")]
    ES5,
    #[serde(rename = "es6")]
    ES6,
    #[serde(rename = "ts")]
    TypeScript,
}

impl RuleSourceLang {
    /// Infer the dialect from a rule file extension (`ts` → TypeScript,
    /// `js` → ES6). Anything else is rejected.
    pub fn from_extension(ext: &str) -> Result<Self, CompileError> {
        match ext {
            "js" => Ok(Self::ES6),
            "ts" => Ok(Self::TypeScript),
            other => Err(CompileError::UnknownDialect(other.to_string())),
        }
    }
}

/// A compiled rule in the baseline dialect, ready for external caching.
///
/// The content hash is computed by the configuration loader (it owns cache
/// busting); this crate only carries it alongside the compiled code and the
/// source URL used in user-facing reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRuleSource {
    #[serde(rename = "sourceHash")]
    pub source_hash: String,
    #[serde(rename = "compiledCode")]
    pub compiled_code: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
}

impl CompiledRuleSource {
    pub fn build(
        source: &str,
        lang: RuleSourceLang,
        source_hash: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Result<Self, CompileError> {
        Ok(Self {
            source_hash: source_hash.into(),
            compiled_code: compile_rule_source(source, lang)?,
            source_url: source_url.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lang_serializes_to_short_names() {
        assert_eq!(
            serde_json::to_value(RuleSourceLang::TypeScript).unwrap(),
            serde_json::json!("ts")
        );
        assert_eq!(
            serde_json::to_value(RuleSourceLang::ES6).unwrap(),
            serde_json::json!("es6")
        );
    }

    #[test]
    fn extension_inference() {
        assert_eq!(
            RuleSourceLang::from_extension("js").unwrap(),
            RuleSourceLang::ES6
        );
        assert_eq!(
            RuleSourceLang::from_extension("ts").unwrap(),
            RuleSourceLang::TypeScript
        );
        assert!(matches!(
            RuleSourceLang::from_extension("py"),
            Err(CompileError::UnknownDialect(_))
        ));
    }

    #[test]
    fn compiled_source_serializes_wire_names() {
        let c = CompiledRuleSource::build(
            "function main(p) { return true; }",
            RuleSourceLang::ES5,
            "abc123",
            "https://example.com/rules/check.js",
        )
        .unwrap();
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["sourceHash"], "abc123");
        assert!(v["compiledCode"].as_str().unwrap().contains("main"));
        assert_eq!(v["sourceURL"], "https://example.com/rules/check.js");
    }
}
