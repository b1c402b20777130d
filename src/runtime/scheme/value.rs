#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Scheme values and environments.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use super::eval::Interp;
use crate::error::SchemeError;

/// A shared environment frame.
pub type Env = Arc<Frame>;

/// Signature of a builtin procedure.
pub type BuiltinFn = fn(&mut Interp, Vec<Value>) -> Result<Value, SchemeError>;

/// How many arguments a builtin accepts.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    /// Exactly this many.
    Exact(usize),
    /// This many or more.
    AtLeast(usize),
}

impl Arity {
    /// Checks `got` against the arity of `name`.
    pub fn check(&self, name: &str, got: usize) -> Result<(), SchemeError> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
        };
        if ok {
            return Ok(());
        }
        let expected = match *self {
            Arity::Exact(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {n}"),
        };
        Err(SchemeError::Arity {
            name: name.to_string(),
            expected,
            got,
        })
    }
}

/// A procedure implemented in Rust.
pub struct Builtin {
    /// Name it is bound to.
    pub name:  &'static str,
    /// Accepted argument count.
    pub arity: Arity,
    /// Implementation.
    pub func:  BuiltinFn,
}

/// A user-defined procedure.
pub struct Lambda {
    /// Name for printing; `lambda` when anonymous.
    pub name:   Arc<str>,
    /// Required parameters.
    pub params: Vec<Arc<str>>,
    /// Parameter collecting extra arguments, if variadic.
    pub rest:   Option<Arc<str>>,
    /// Body expressions.
    pub body:   Vec<Value>,
    /// Defining environment.
    pub env:    Env,
}

/// State of a delayed expression.
pub enum PromiseState {
    /// Not yet forced.
    Delayed {
        /// Expression to evaluate.
        expr: Value,
        /// Environment to evaluate it in.
        env:  Env,
    },
    /// Forced; the value is cached.
    Forced(Value),
}

/// A memoizing delayed expression, as made by `delay` and `cons-stream`.
pub struct Promise(pub Mutex<PromiseState>);

/// Immutable cons cell.
pub struct Pair {
    /// First element.
    pub car: Value,
    /// Rest.
    pub cdr: Value,
}

impl Drop for Pair {
    /// Unlinks nested cells with an explicit worklist, so a list of any
    /// length is freed in constant stack.
    fn drop(&mut self) {
        let mut pending = vec![
            std::mem::replace(&mut self.car, Value::Nil),
            std::mem::replace(&mut self.cdr, Value::Nil),
        ];
        while let Some(value) = pending.pop() {
            match value {
                Value::Pair(pair) => {
                    if let Ok(mut pair) = Arc::try_unwrap(pair) {
                        pending.push(std::mem::replace(&mut pair.car, Value::Nil));
                        pending.push(std::mem::replace(&mut pair.cdr, Value::Nil));
                    }
                }
                Value::Promise(promise) => {
                    if let Ok(promise) = Arc::try_unwrap(promise) {
                        match promise.0.into_inner().unwrap_or_else(PoisonError::into_inner) {
                            PromiseState::Forced(value) => pending.push(value),
                            PromiseState::Delayed { expr, .. } => pending.push(expr),
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// A Scheme value.
#[derive(Clone)]
pub enum Value {
    /// The empty list.
    Nil,
    /// `#t` / `#f`.
    Bool(bool),
    /// Exact integer.
    Int(i64),
    /// Inexact number.
    Float(f64),
    /// String.
    Str(Arc<str>),
    /// Symbol.
    Symbol(Arc<str>),
    /// Cons cell.
    Pair(Arc<Pair>),
    /// Builtin procedure.
    Builtin(&'static Builtin),
    /// User procedure.
    Lambda(Arc<Lambda>),
    /// Delayed expression.
    Promise(Arc<Promise>),
    /// Result of forms evaluated only for effect; never printed.
    Unspecified,
}

impl Value {
    /// Makes a symbol.
    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Arc::from(name))
    }

    /// Makes a string.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Arc::from(s.into()))
    }

    /// Makes a cons cell.
    pub fn cons(car: Value, cdr: Value) -> Self {
        Value::Pair(Arc::new(Pair { car, cdr }))
    }

    /// Builds a proper list.
    pub fn list(items: Vec<Value>) -> Self {
        Self::list_with_tail(items, Value::Nil)
    }

    /// Builds a list ending in `tail` instead of nil.
    pub fn list_with_tail(items: Vec<Value>, tail: Value) -> Self {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    /// Returns the elements of a proper list, or `None` for anything else.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        let mut out = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                Value::Nil => return Some(out),
                Value::Pair(pair) => {
                    out.push(pair.car.clone());
                    cur = &pair.cdr;
                }
                _ => return None,
            }
        }
    }

    /// Everything except `#f` is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Returns the symbol name, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&Arc<str>> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true for procedures of either kind.
    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Builtin(_) | Value::Lambda(_))
    }

    /// Identity comparison, as `eq?`.
    pub fn eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Unspecified, Value::Unspecified) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Lambda(a), Value::Lambda(b)) => Arc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural comparison, as `equal?`.
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => {
                let (mut a, mut b) = (a, b);
                loop {
                    if !a.car.equal(&b.car) {
                        return false;
                    }
                    match (&a.cdr, &b.cdr) {
                        (Value::Pair(x), Value::Pair(y)) => (a, b) = (x, y),
                        (x, y) => return x.equal(y),
                    }
                }
            }
            _ => self.eqv(other),
        }
    }

    /// The text `display` writes: strings without quotes, everything else
    /// as printed.
    pub fn display_string(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }

    /// Converts a JSON value into Scheme data. Objects become association
    /// lists.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::list(
                map.iter()
                    .map(|(k, v)| Value::cons(Value::string(k.as_str()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Formats a float the way Python's `repr` does for ordinary values.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        f.to_string()
    }
}

/// Writes a string literal with escapes.
fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("()"),
            Value::Bool(true) => f.write_str("#t"),
            Value::Bool(false) => f.write_str("#f"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => write_string_literal(f, s),
            Value::Symbol(s) => f.write_str(s),
            Value::Pair(pair) => {
                f.write_str("(")?;
                write!(f, "{}", pair.car)?;
                let mut rest = &pair.cdr;
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", next.car)?;
                            rest = &next.cdr;
                        }
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                f.write_str(")")
            }
            Value::Builtin(b) => write!(f, "#[{}]", b.name),
            Value::Lambda(l) => {
                let mut params: Vec<String> = l.params.iter().map(|p| p.to_string()).collect();
                if let Some(rest) = &l.rest {
                    params.push(".".to_string());
                    params.push(rest.to_string());
                }
                write!(f, "(lambda ({})", params.join(" "))?;
                for expr in &l.body {
                    write!(f, " {expr}")?;
                }
                f.write_str(")")
            }
            Value::Promise(p) => match &*lock(&p.0) {
                PromiseState::Delayed { .. } => f.write_str("#[promise (not forced)]"),
                PromiseState::Forced(_) => f.write_str("#[promise (forced)]"),
            },
            Value::Unspecified => Ok(()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Locks a mutex, ignoring poisoning: values are plain data, so a panic
/// mid-update cannot leave them logically inconsistent.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One frame of bindings.
pub struct Frame {
    /// Names bound in this frame.
    vars:   Mutex<HashMap<Arc<str>, Value>>,
    /// Enclosing frame.
    parent: Option<Env>,
}

impl Frame {
    /// Creates an empty top-level frame.
    pub fn global() -> Env {
        Arc::new(Frame {
            vars:   Mutex::new(HashMap::new()),
            parent: None,
        })
    }

    /// Creates an empty frame inside `parent`.
    pub fn child(parent: &Env) -> Env {
        Arc::new(Frame {
            vars:   Mutex::new(HashMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// Binds `name` in this frame.
    pub fn define(&self, name: Arc<str>, value: Value) {
        lock(&self.vars).insert(name, value);
    }

    /// Finds `name` in this frame or an enclosing one.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(v) = lock(&frame.vars).get(name) {
                return Some(v.clone());
            }
            frame = frame.parent.as_deref()?;
        }
    }

    /// Rebinds an existing `name` in the nearest frame that has it. Returns
    /// false if it is unbound.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut frame = self;
        loop {
            {
                let mut vars = lock(&frame.vars);
                if let Some(slot) = vars.get_mut(name) {
                    *slot = value;
                    return true;
                }
            }
            match frame.parent.as_deref() {
                Some(parent) => frame = parent,
                None => return false,
            }
        }
    }

    /// Drops every binding in this frame.
    pub fn clear(&self) {
        let vars = std::mem::take(&mut *lock(&self.vars));
        drop(vars);
    }
}

/// Frames and promises created while running code in one scope.
///
/// A closure stored in the frame it captured, or a stream whose tail reaches
/// back to itself, keeps itself alive. [`Registry::teardown`] empties every
/// one of them that is still alive, which breaks those cycles.
#[derive(Default)]
pub struct Registry {
    /// Call and `let` frames.
    frames:   Mutex<Vec<Weak<Frame>>>,
    /// Promises from `delay` and `cons-stream`.
    promises: Mutex<Vec<Weak<Promise>>>,
}

impl Registry {
    /// Creates a frame inside `parent` and records it.
    pub fn child_frame(&self, parent: &Env) -> Env {
        let frame = Frame::child(parent);
        track(&self.frames, &frame);
        frame
    }

    /// Creates a promise for `expr` in `env` and records it.
    pub fn promise(&self, expr: Value, env: &Env) -> Value {
        let promise = Arc::new(Promise(Mutex::new(PromiseState::Delayed {
            expr,
            env: Arc::clone(env),
        })));
        track(&self.promises, &promise);
        Value::Promise(promise)
    }

    /// Number of recorded frames still alive.
    pub fn live_frames(&self) -> usize {
        lock(&self.frames).iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Number of recorded promises still alive.
    pub fn live_promises(&self) -> usize {
        lock(&self.promises).iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Empties every recorded frame and promise that is still alive.
    pub fn teardown(&self) {
        let promises: Vec<Arc<Promise>> = lock(&self.promises).iter().filter_map(Weak::upgrade).collect();
        for promise in promises {
            let state = std::mem::replace(&mut *lock(&promise.0), PromiseState::Forced(Value::Nil));
            drop(state);
        }
        let frames: Vec<Env> = lock(&self.frames).iter().filter_map(Weak::upgrade).collect();
        for frame in frames {
            frame.clear();
        }
    }
}

/// Records `item`, pruning dead entries whenever the list would grow.
fn track<T>(list: &Mutex<Vec<Weak<T>>>, item: &Arc<T>) {
    let mut list = lock(list);
    if list.len() == list.capacity() {
        list.retain(|w| w.strong_count() > 0);
    }
    list.push(Arc::downgrade(item));
}
