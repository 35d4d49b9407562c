//! Runtime values for the sandbox evaluator.
//!
//! Everything lives in a per-invocation arena ([`HeapObj`] slots indexed by
//! `usize`), so values are plain `Send` data and nothing is shared between
//! concurrent invocations.

use std::sync::Arc;

use crate::js::ast::{Param, Stmt};

use super::types::RuleLogLevel;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// Index into the invocation heap.
    Ref(usize),
}

#[derive(Debug)]
pub(crate) enum HeapObj {
    Object(ObjectData),
    Array(Vec<Value>),
    Function(FnData),
    Native(Native),
}

/// Insertion-ordered property list plus an optional prototype link, which
/// is how down-leveled class instances find their methods.
#[derive(Debug, Default)]
pub(crate) struct ObjectData {
    pub props: Vec<(String, Value)>,
    pub proto: Option<usize>,
}

impl ObjectData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if let Some(slot) = self.props.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.props.push((key.to_string(), value));
        }
    }
}

#[derive(Debug)]
pub(crate) struct FnData {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Arc<Vec<Stmt>>,
    /// Scope the closure captured at creation time.
    pub scope: usize,
    /// Assigned properties (`prototype`, statics).
    pub props: Vec<(String, Value)>,
}

/// Host-injected bindings: the enumerable capability surface of the
/// sandbox, plus the pure language builtins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Native {
    Console(RuleLogLevel),
    GetInput,
    SetOutput,
    JsonParse,
    JsonStringify,
    ObjectKeys,
    ParseInt,
    ParseFloat,
    IsNan,
    StringCast,
    NumberCast,
    BooleanCast,
    ErrorCtor(&'static str),
    Math(MathFn),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MathFn {
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
    Sqrt,
}
