mod compile;
mod error;
mod types;

pub use compile::{compile_rule_file, compile_rule_source};
pub use error::CompileError;
pub use types::{CompiledRuleSource, RuleSourceLang};
