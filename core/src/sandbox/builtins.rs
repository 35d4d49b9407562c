//! The sandbox's injected bindings and pure language builtins.
//!
//! Everything a rule can reach is assembled here: the console bindings and
//! the two I/O bridges, plus side-effect-free library functions (JSON, Math,
//! string/array methods). Nothing here touches the network, filesystem,
//! process environment, or host clock.

use super::interp::{Abort, Control, EvalResult, Interp, GLOBAL_SCOPE};
use super::types::RuleLogLevel;
use super::value::{HeapObj, MathFn, Native, ObjectData, Value};

const STR_METHODS: &[&str] = &[
    "indexOf",
    "includes",
    "startsWith",
    "endsWith",
    "slice",
    "substring",
    "split",
    "toLowerCase",
    "toUpperCase",
    "trim",
    "charAt",
    "charCodeAt",
    "replace",
];

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "indexOf", "includes", "join", "slice", "concat", "map", "filter", "every",
    "some", "forEach", "reduce",
];

/// Marker for a self-referential structure met during JSON conversion.
pub(crate) struct CircularRef;

/// Populate the global scope. This is the complete ambient surface a rule
/// can see; any identifier outside this list resolves to a reference error.
pub(crate) fn install_globals(interp: &mut Interp) {
    let log = native(interp, Native::Console(RuleLogLevel::Info));
    let warn = native(interp, Native::Console(RuleLogLevel::Warn));
    let error = native(interp, Native::Console(RuleLogLevel::Error));
    let console = interp.alloc(HeapObj::Object(ObjectData {
        props: vec![
            ("log".to_string(), log.clone()),
            ("info".to_string(), log.clone()),
            ("debug".to_string(), log.clone()),
            ("warn".to_string(), warn),
            ("error".to_string(), error),
        ],
        proto: None,
    }));
    define(interp, "console", Value::Ref(console));
    define(interp, "log", log);

    let get_input = native(interp, Native::GetInput);
    define(interp, "getInput", get_input);
    let set_output = native(interp, Native::SetOutput);
    define(interp, "setOutput", set_output);

    let parse = native(interp, Native::JsonParse);
    let stringify = native(interp, Native::JsonStringify);
    let json = interp.alloc(HeapObj::Object(ObjectData {
        props: vec![
            ("parse".to_string(), parse),
            ("stringify".to_string(), stringify),
        ],
        proto: None,
    }));
    define(interp, "JSON", Value::Ref(json));

    let math_fns = [
        ("abs", MathFn::Abs),
        ("floor", MathFn::Floor),
        ("ceil", MathFn::Ceil),
        ("round", MathFn::Round),
        ("min", MathFn::Min),
        ("max", MathFn::Max),
        ("pow", MathFn::Pow),
        ("sqrt", MathFn::Sqrt),
    ];
    let mut math_props = Vec::with_capacity(math_fns.len());
    for (name, f) in math_fns {
        let v = native(interp, Native::Math(f));
        math_props.push((name.to_string(), v));
    }
    let math = interp.alloc(HeapObj::Object(ObjectData {
        props: math_props,
        proto: None,
    }));
    define(interp, "Math", Value::Ref(math));

    let keys = native(interp, Native::ObjectKeys);
    let object = interp.alloc(HeapObj::Object(ObjectData {
        props: vec![("keys".to_string(), keys)],
        proto: None,
    }));
    define(interp, "Object", Value::Ref(object));

    for (name, ctor) in [
        ("Error", Native::ErrorCtor("Error")),
        ("TypeError", Native::ErrorCtor("TypeError")),
        ("RangeError", Native::ErrorCtor("RangeError")),
    ] {
        let v = native(interp, ctor);
        define(interp, name, v);
    }

    for (name, n) in [
        ("parseInt", Native::ParseInt),
        ("parseFloat", Native::ParseFloat),
        ("isNaN", Native::IsNan),
        ("String", Native::StringCast),
        ("Number", Native::NumberCast),
        ("Boolean", Native::BooleanCast),
    ] {
        let v = native(interp, n);
        define(interp, name, v);
    }

    define(interp, "NaN", Value::Num(f64::NAN));
    define(interp, "Infinity", Value::Num(f64::INFINITY));
}

fn native(interp: &mut Interp, n: Native) -> Value {
    Value::Ref(interp.alloc(HeapObj::Native(n)))
}

fn define(interp: &mut Interp, name: &str, value: Value) {
    interp.scopes[GLOBAL_SCOPE]
        .vars
        .insert(name.to_string(), value);
}

impl Interp {
    pub(crate) fn call_native(&mut self, n: Native, args: Vec<Value>) -> EvalResult<Value> {
        match n {
            Native::Console(level) => {
                let msg = args
                    .iter()
                    .map(|a| self.to_log_string(a))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.sink.emit(level, msg);
                Ok(Value::Undefined)
            }
            Native::GetInput => Ok(self.input_value.clone()),
            Native::SetOutput => match args.first() {
                Some(Value::Bool(b)) => {
                    self.output = Some(*b);
                    Ok(Value::Undefined)
                }
                other => {
                    let rendered = match other {
                        Some(v) => self.to_display_string(v),
                        None => "undefined".to_string(),
                    };
                    Err(Control::Abort(Abort::ContractViolation(format!(
                        "main function must return boolean (returned {rendered})"
                    ))))
                }
            },
            Native::JsonParse => {
                let s = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    Some(v) => self.to_display_string(v),
                    None => "undefined".to_string(),
                };
                match serde_json::from_str::<serde_json::Value>(&s) {
                    Ok(j) => Ok(self.json_to_value(&j)),
                    Err(e) => Err(self.throw_syntax_error(format!("JSON.parse: {e}"))),
                }
            }
            Native::JsonStringify => {
                let v = args.first().cloned().unwrap_or(Value::Undefined);
                let mut seen = Vec::new();
                match self.value_to_json(&v, &mut seen) {
                    Ok(Some(j)) => Ok(Value::Str(j.to_string())),
                    Ok(None) => Ok(Value::Undefined),
                    Err(CircularRef) => {
                        Err(self.throw_type_error("Converting circular structure to JSON"))
                    }
                }
            }
            Native::ObjectKeys => {
                let v = args.first().cloned().unwrap_or(Value::Undefined);
                let elems: Vec<Value> = self.own_keys(&v).into_iter().map(Value::Str).collect();
                Ok(Value::Ref(self.alloc(HeapObj::Array(elems))))
            }
            Native::ParseInt => {
                let s = self.arg_string(&args, 0);
                let radix = args.get(1).map(|v| self.to_number(v));
                Ok(Value::Num(js_parse_int(&s, radix)))
            }
            Native::ParseFloat => {
                let s = self.arg_string(&args, 0);
                Ok(Value::Num(js_parse_float(&s)))
            }
            Native::IsNan => {
                let n = args.first().map(|v| self.to_number(v)).unwrap_or(f64::NAN);
                Ok(Value::Bool(n.is_nan()))
            }
            Native::StringCast => Ok(Value::Str(self.arg_string(&args, 0))),
            Native::NumberCast => {
                let n = args.first().map(|v| self.to_number(v)).unwrap_or(0.0);
                Ok(Value::Num(n))
            }
            Native::BooleanCast => {
                let b = args.first().map(|v| self.truthy(v)).unwrap_or(false);
                Ok(Value::Bool(b))
            }
            Native::ErrorCtor(name) => {
                let msg = match args.first() {
                    Some(v) => self.to_display_string(v),
                    None => String::new(),
                };
                Ok(self.alloc_error_value(name, msg))
            }
            Native::Math(f) => Ok(Value::Num(self.math_fn(f, &args))),
        }
    }

    fn arg_string(&self, args: &[Value], idx: usize) -> String {
        match args.get(idx) {
            Some(v) => self.to_display_string(v),
            None => String::new(),
        }
    }

    fn math_fn(&self, f: MathFn, args: &[Value]) -> f64 {
        let a = |i: usize| {
            args.get(i)
                .map(|v| self.to_number(v))
                .unwrap_or(f64::NAN)
        };
        match f {
            MathFn::Abs => a(0).abs(),
            MathFn::Floor => a(0).floor(),
            MathFn::Ceil => a(0).ceil(),
            MathFn::Round => (a(0) + 0.5).floor(),
            MathFn::Sqrt => a(0).sqrt(),
            MathFn::Pow => a(0).powf(a(1)),
            MathFn::Min | MathFn::Max => {
                let nums: Vec<f64> = args.iter().map(|v| self.to_number(v)).collect();
                if nums.iter().any(|n| n.is_nan()) {
                    return f64::NAN;
                }
                match f {
                    MathFn::Min => nums
                        .into_iter()
                        .fold(f64::INFINITY, f64::min),
                    _ => nums
                        .into_iter()
                        .fold(f64::NEG_INFINITY, f64::max),
                }
            }
        }
    }

    // ---- method dispatch ----

    pub(crate) async fn call_method(
        &mut self,
        recv: Value,
        key: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        // User-defined properties win on plain objects and functions.
        if let Value::Ref(idx) = &recv {
            if matches!(self.heap[*idx], HeapObj::Object(_) | HeapObj::Function(_)) {
                let prop = self.get_property(&recv, key)?;
                if !matches!(prop, Value::Undefined) {
                    return self.call_value(prop, recv, args, key).await;
                }
            }
        }
        if self.is_builtin_method(&recv, key) {
            return self.call_builtin_method(recv, key, args).await;
        }
        let prop = self.get_property(&recv, key)?;
        self.call_value(prop, recv, args, key).await
    }

    fn is_builtin_method(&self, recv: &Value, key: &str) -> bool {
        match recv {
            Value::Str(_) => STR_METHODS.contains(&key) || key == "toString",
            Value::Num(_) | Value::Bool(_) => key == "toString",
            Value::Ref(idx) => match self.heap[*idx] {
                HeapObj::Array(_) => {
                    ARRAY_METHODS.contains(&key) || key == "toString" || key == "hasOwnProperty"
                }
                HeapObj::Object(_) => key == "hasOwnProperty" || key == "toString",
                _ => false,
            },
            _ => false,
        }
    }

    async fn call_builtin_method(
        &mut self,
        recv: Value,
        key: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        match recv {
            Value::Str(s) => self.call_string_method(&s, key, &args),
            Value::Num(_) | Value::Bool(_) => Ok(Value::Str(self.to_display_string(&recv))),
            Value::Ref(idx) => {
                if matches!(self.heap[idx], HeapObj::Array(_)) {
                    return self.call_array_method(idx, key, args).await;
                }
                match key {
                    "hasOwnProperty" => {
                        let k = self.arg_string(&args, 0);
                        let has = self.own_keys(&recv).contains(&k);
                        Ok(Value::Bool(has))
                    }
                    _ => Ok(Value::Str("[object Object]".to_string())),
                }
            }
            _ => unreachable!("builtin dispatch checked the receiver"),
        }
    }

    fn array_len(&self, aref: usize) -> usize {
        match &self.heap[aref] {
            HeapObj::Array(v) => v.len(),
            _ => 0,
        }
    }

    fn array_elem(&self, aref: usize, i: usize) -> Value {
        match &self.heap[aref] {
            HeapObj::Array(v) => v.get(i).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    fn array_elems(&self, aref: usize) -> Vec<Value> {
        match &self.heap[aref] {
            HeapObj::Array(v) => v.clone(),
            _ => Vec::new(),
        }
    }

    async fn call_array_method(
        &mut self,
        aref: usize,
        key: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        match key {
            "push" => {
                if let HeapObj::Array(v) = &mut self.heap[aref] {
                    v.extend(args);
                }
                Ok(Value::Num(self.array_len(aref) as f64))
            }
            "pop" => {
                if let HeapObj::Array(v) = &mut self.heap[aref] {
                    Ok(v.pop().unwrap_or(Value::Undefined))
                } else {
                    Ok(Value::Undefined)
                }
            }
            "indexOf" => {
                let target = args.first().cloned().unwrap_or(Value::Undefined);
                let elems = self.array_elems(aref);
                let pos = elems.iter().position(|e| self.strict_eq(e, &target));
                Ok(Value::Num(pos.map(|p| p as f64).unwrap_or(-1.0)))
            }
            "includes" => {
                let target = args.first().cloned().unwrap_or(Value::Undefined);
                let elems = self.array_elems(aref);
                Ok(Value::Bool(
                    elems.iter().any(|e| self.strict_eq(e, &target)),
                ))
            }
            "join" => {
                let sep = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(v) => self.to_display_string(v),
                };
                let elems = self.array_elems(aref);
                let parts: Vec<String> = elems
                    .iter()
                    .map(|e| match e {
                        Value::Undefined | Value::Null => String::new(),
                        other => self.to_display_string(other),
                    })
                    .collect();
                Ok(Value::Str(parts.join(&sep)))
            }
            "slice" => {
                let elems = self.array_elems(aref);
                let len = elems.len();
                let start = norm_index(args.first().map(|v| self.to_number(v)), 0, len);
                let end = norm_index(args.get(1).map(|v| self.to_number(v)), len, len);
                let out: Vec<Value> = if start < end {
                    elems[start..end].to_vec()
                } else {
                    Vec::new()
                };
                Ok(Value::Ref(self.alloc(HeapObj::Array(out))))
            }
            "concat" => {
                let mut out = self.array_elems(aref);
                for arg in args {
                    match &arg {
                        Value::Ref(i) if matches!(self.heap[*i], HeapObj::Array(_)) => {
                            out.extend(self.array_elems(*i));
                        }
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::Ref(self.alloc(HeapObj::Array(out))))
            }
            "map" | "filter" | "every" | "some" | "forEach" => {
                let cb = args.first().cloned().unwrap_or(Value::Undefined);
                if !self.is_callable(&cb) {
                    return Err(
                        self.throw_type_error(format!("{key} requires a callback function"))
                    );
                }
                let len = self.array_len(aref);
                let mut mapped = Vec::new();
                let mut kept = Vec::new();
                for i in 0..len {
                    let elem = self.array_elem(aref, i);
                    let cb_args = vec![elem.clone(), Value::Num(i as f64), Value::Ref(aref)];
                    let r = self
                        .call_value(cb.clone(), Value::Undefined, cb_args, "callback")
                        .await?;
                    match key {
                        "map" => mapped.push(r),
                        "filter" => {
                            if self.truthy(&r) {
                                kept.push(elem);
                            }
                        }
                        "every" => {
                            if !self.truthy(&r) {
                                return Ok(Value::Bool(false));
                            }
                        }
                        "some" => {
                            if self.truthy(&r) {
                                return Ok(Value::Bool(true));
                            }
                        }
                        _ => {}
                    }
                }
                Ok(match key {
                    "map" => Value::Ref(self.alloc(HeapObj::Array(mapped))),
                    "filter" => Value::Ref(self.alloc(HeapObj::Array(kept))),
                    "every" => Value::Bool(true),
                    "some" => Value::Bool(false),
                    _ => Value::Undefined,
                })
            }
            "reduce" => {
                let cb = args.first().cloned().unwrap_or(Value::Undefined);
                if !self.is_callable(&cb) {
                    return Err(self.throw_type_error("reduce requires a callback function"));
                }
                let len = self.array_len(aref);
                let (mut acc, start) = match args.get(1) {
                    Some(init) => (init.clone(), 0),
                    None => {
                        if len == 0 {
                            return Err(self
                                .throw_type_error("Reduce of empty array with no initial value"));
                        }
                        (self.array_elem(aref, 0), 1)
                    }
                };
                for i in start..len {
                    let elem = self.array_elem(aref, i);
                    let cb_args = vec![acc, elem, Value::Num(i as f64), Value::Ref(aref)];
                    acc = self
                        .call_value(cb.clone(), Value::Undefined, cb_args, "callback")
                        .await?;
                }
                Ok(acc)
            }
            "hasOwnProperty" => {
                let k = self.arg_string(&args, 0);
                let len = self.array_len(aref);
                let has = k == "length" || k.parse::<usize>().map(|i| i < len).unwrap_or(false);
                Ok(Value::Bool(has))
            }
            "toString" => Ok(Value::Str(self.to_display_string(&Value::Ref(aref)))),
            _ => unreachable!("builtin dispatch checked the method name"),
        }
    }

    fn is_callable(&self, v: &Value) -> bool {
        matches!(
            v,
            Value::Ref(idx) if matches!(self.heap[*idx], HeapObj::Function(_) | HeapObj::Native(_))
        )
    }

    fn call_string_method(&mut self, s: &str, key: &str, args: &[Value]) -> EvalResult<Value> {
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        match key {
            "indexOf" => {
                let needle: Vec<char> = self.arg_string(args, 0).chars().collect();
                let from = args
                    .get(1)
                    .map(|v| self.to_number(v).max(0.0) as usize)
                    .unwrap_or(0);
                Ok(Value::Num(char_index_of(&chars, &needle, from)))
            }
            "includes" => {
                let needle = self.arg_string(args, 0);
                Ok(Value::Bool(s.contains(&needle)))
            }
            "startsWith" => {
                let needle = self.arg_string(args, 0);
                Ok(Value::Bool(s.starts_with(&needle)))
            }
            "endsWith" => {
                let needle = self.arg_string(args, 0);
                Ok(Value::Bool(s.ends_with(&needle)))
            }
            "slice" => {
                let start = norm_index(args.first().map(|v| self.to_number(v)), 0, len);
                let end = norm_index(args.get(1).map(|v| self.to_number(v)), len, len);
                let out: String = if start < end {
                    chars[start..end].iter().collect()
                } else {
                    String::new()
                };
                Ok(Value::Str(out))
            }
            "substring" => {
                let a = clamp_index(args.first().map(|v| self.to_number(v)).unwrap_or(0.0), len);
                let b = clamp_index(
                    args.get(1)
                        .map(|v| self.to_number(v))
                        .unwrap_or(len as f64),
                    len,
                );
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                Ok(Value::Str(chars[a..b].iter().collect()))
            }
            "split" => {
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::Str(s.to_string())],
                    Some(v) => {
                        let sep = self.to_display_string(v);
                        if sep.is_empty() {
                            chars.iter().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            s.split(&sep)
                                .map(|p| Value::Str(p.to_string()))
                                .collect()
                        }
                    }
                };
                Ok(Value::Ref(self.alloc(HeapObj::Array(parts))))
            }
            "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
            "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
            "trim" => Ok(Value::Str(s.trim().to_string())),
            "charAt" => {
                let i = args
                    .first()
                    .map(|v| self.to_number(v))
                    .unwrap_or(0.0);
                let out = if i >= 0.0 {
                    chars
                        .get(i as usize)
                        .map(|c| c.to_string())
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                Ok(Value::Str(out))
            }
            "charCodeAt" => {
                let i = args
                    .first()
                    .map(|v| self.to_number(v))
                    .unwrap_or(0.0);
                let out = if i >= 0.0 {
                    chars
                        .get(i as usize)
                        .map(|c| *c as u32 as f64)
                        .unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                };
                Ok(Value::Num(out))
            }
            "replace" => {
                let pat = self.arg_string(args, 0);
                let rep = self.arg_string(args, 1);
                let out = if pat.is_empty() {
                    format!("{rep}{s}")
                } else {
                    s.replacen(&pat, &rep, 1)
                };
                Ok(Value::Str(out))
            }
            _ => Ok(Value::Str(s.to_string())), // toString
        }
    }

    // ---- logging and JSON bridges ----

    /// Render one console argument: strings verbatim, structures as JSON.
    fn to_log_string(&self, v: &Value) -> String {
        if let Value::Ref(idx) = v {
            if matches!(self.heap[*idx], HeapObj::Object(_) | HeapObj::Array(_)) {
                let mut seen = Vec::new();
                if let Ok(Some(j)) = self.value_to_json(v, &mut seen) {
                    return j.to_string();
                }
            }
        }
        self.to_display_string(v)
    }

    /// Build the rule-side representation of a JSON document.
    pub(crate) fn json_to_value(&mut self, j: &serde_json::Value) -> Value {
        match j {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                let elems: Vec<Value> = items.iter().map(|i| self.json_to_value(i)).collect();
                Value::Ref(self.alloc(HeapObj::Array(elems)))
            }
            serde_json::Value::Object(map) => {
                let mut data = ObjectData::default();
                for (k, v) in map {
                    let val = self.json_to_value(v);
                    data.set(k, val);
                }
                Value::Ref(self.alloc(HeapObj::Object(data)))
            }
        }
    }

    /// `None` means the value has no JSON representation (undefined,
    /// functions), mirroring how JSON serialization drops them.
    pub(crate) fn value_to_json(
        &self,
        v: &Value,
        seen: &mut Vec<usize>,
    ) -> Result<Option<serde_json::Value>, CircularRef> {
        Ok(match v {
            Value::Undefined => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Num(n) => Some(
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Value::Str(s) => Some(serde_json::Value::String(s.clone())),
            Value::Ref(idx) => {
                if seen.contains(idx) {
                    return Err(CircularRef);
                }
                match &self.heap[*idx] {
                    HeapObj::Function(_) | HeapObj::Native(_) => None,
                    HeapObj::Array(elems) => {
                        seen.push(*idx);
                        let mut out = Vec::with_capacity(elems.len());
                        for e in elems {
                            out.push(
                                self.value_to_json(e, seen)?
                                    .unwrap_or(serde_json::Value::Null),
                            );
                        }
                        seen.pop();
                        Some(serde_json::Value::Array(out))
                    }
                    HeapObj::Object(obj) => {
                        seen.push(*idx);
                        let mut out = serde_json::Map::new();
                        for (k, val) in &obj.props {
                            if let Some(j) = self.value_to_json(val, seen)? {
                                out.insert(k.clone(), j);
                            }
                        }
                        seen.pop();
                        Some(serde_json::Value::Object(out))
                    }
                }
            }
        })
    }
}

fn norm_index(arg: Option<f64>, default: usize, len: usize) -> usize {
    match arg {
        None => default,
        Some(n) if n.is_nan() => 0,
        Some(n) if n < 0.0 => {
            let i = len as f64 + n;
            if i < 0.0 {
                0
            } else {
                i as usize
            }
        }
        Some(n) => (n as usize).min(len),
    }
}

fn clamp_index(n: f64, len: usize) -> usize {
    if n.is_nan() || n < 0.0 {
        0
    } else {
        (n as usize).min(len)
    }
}

fn char_index_of(haystack: &[char], needle: &[char], from: usize) -> f64 {
    if needle.is_empty() {
        return from.min(haystack.len()) as f64;
    }
    if needle.len() > haystack.len() {
        return -1.0;
    }
    for i in from..=(haystack.len() - needle.len()) {
        if haystack[i..i + needle.len()] == *needle {
            return i as f64;
        }
    }
    -1.0
}

fn js_parse_int(s: &str, radix: Option<f64>) -> f64 {
    let t = s.trim_start();
    let (sign, t) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let mut radix = match radix {
        Some(r) if r.is_finite() && r != 0.0 => r as u32,
        _ => 0,
    };
    let mut t = t;
    if (radix == 0 || radix == 16) && (t.starts_with("0x") || t.starts_with("0X")) {
        t = &t[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut acc = 0.0f64;
    let mut any = false;
    for c in t.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        acc = acc * radix as f64 + d as f64;
        any = true;
    }
    if !any {
        return f64::NAN;
    }
    sign * acc
}

fn js_parse_float(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    if t[i..].starts_with("Infinity") {
        return if t.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i == digits_start {
        return f64::NAN;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    t[..i].parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_handles_radix_and_prefixes() {
        assert_eq!(js_parse_int("42", None), 42.0);
        assert_eq!(js_parse_int("  -17px", None), -17.0);
        assert_eq!(js_parse_int("0xff", None), 255.0);
        assert_eq!(js_parse_int("101", Some(2.0)), 5.0);
        assert!(js_parse_int("zz", None).is_nan());
    }

    #[test]
    fn parse_float_takes_numeric_prefix() {
        assert_eq!(js_parse_float("1.5e2abc"), 150.0);
        assert_eq!(js_parse_float("-2.5"), -2.5);
        assert!(js_parse_float("abc").is_nan());
    }

    #[test]
    fn char_index_search() {
        let h: Vec<char> = "hello".chars().collect();
        let n: Vec<char> = "ll".chars().collect();
        assert_eq!(char_index_of(&h, &n, 0), 2.0);
        assert_eq!(char_index_of(&h, &n, 3), -1.0);
    }
}
