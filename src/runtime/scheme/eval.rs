#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Evaluator for the Scheme runtime.
//!
//! Tail positions (the last body expression, `if` branches, `cond` clauses,
//! the last operand of `and`/`or`) loop instead of recursing, so tail-recursive
//! student code runs in constant stack. Every step ticks a [`Budget`], which
//! enforces both the wall-clock deadline and a bound on nesting depth.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use super::value::{Env, Lambda, Promise, PromiseState, Registry, Value, lock};
use crate::error::SchemeError;

/// Deepest non-tail nesting allowed before evaluation fails.
pub const MAX_DEPTH: usize = 8_000;

/// Steps between clock reads.
const CLOCK_INTERVAL: u32 = 1_024;

/// Execution limits for one evaluation.
#[derive(Debug, Clone)]
pub struct Budget {
    /// When evaluation must stop.
    deadline:  Instant,
    /// Steps since the clock was last read.
    ticks:     u32,
    /// Maximum nesting depth.
    max_depth: usize,
}

impl Budget {
    /// A budget expiring `limit` from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline:  Instant::now() + limit,
            ticks:     0,
            max_depth: MAX_DEPTH,
        }
    }

    /// Overrides the depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Counts one step, failing once the deadline has passed.
    fn tick(&mut self) -> Result<(), SchemeError> {
        self.ticks += 1;
        if self.ticks >= CLOCK_INTERVAL {
            self.ticks = 0;
            if Instant::now() >= self.deadline {
                return Err(SchemeError::Timeout);
            }
        }
        Ok(())
    }
}

/// Outcome of a special form: a finished value, or an expression to
/// continue with in tail position.
enum Step {
    /// Evaluation is complete.
    Done(Value),
    /// Continue evaluating this expression in this environment.
    Tail(Value, Env),
}

/// Interpreter state for one evaluation.
pub struct Interp {
    /// Limits.
    budget: Budget,
    /// Current nesting depth.
    depth:    usize,
    /// Where new frames and promises are recorded.
    registry: Arc<Registry>,
    /// Text written by `display`, `print`, and `newline`.
    pub out:  String,
}

impl Interp {
    /// Creates an interpreter with the given limits and its own registry.
    pub fn new(budget: Budget) -> Self {
        Self::with_registry(budget, Arc::default())
    }

    /// Creates an interpreter that records what it allocates in `registry`.
    pub fn with_registry(budget: Budget, registry: Arc<Registry>) -> Self {
        Self {
            budget,
            depth: 0,
            registry,
            out: String::new(),
        }
    }

    /// Evaluates `expr` in `env`.
    pub fn eval(&mut self, expr: Value, env: Env) -> Result<Value, SchemeError> {
        self.depth += 1;
        let result = if self.depth > self.budget.max_depth {
            Err(SchemeError::RecursionDepth)
        } else {
            self.eval_loop(expr, env)
        };
        self.depth -= 1;
        result
    }

    /// The trampoline behind [`Interp::eval`].
    fn eval_loop(&mut self, mut expr: Value, mut env: Env) -> Result<Value, SchemeError> {
        loop {
            self.budget.tick()?;
            let pair = match &expr {
                Value::Symbol(name) => {
                    return env
                        .lookup(name)
                        .ok_or_else(|| SchemeError::UnknownIdentifier(name.to_string()));
                }
                Value::Pair(pair) => Arc::clone(pair),
                _ => return Ok(expr.clone()),
            };

            if let Value::Symbol(head) = &pair.car
                && let Some(step) = self.special_form(head, &pair.cdr, &env)?
            {
                match step {
                    Step::Done(value) => return Ok(value),
                    Step::Tail(next, next_env) => {
                        expr = next;
                        env = next_env;
                        continue;
                    }
                }
            }

            let operator = self.eval(pair.car.clone(), Arc::clone(&env))?;
            let operands = list_items(&pair.cdr, &expr)?;
            let mut args = Vec::with_capacity(operands.len());
            for operand in operands {
                args.push(self.eval(operand, Arc::clone(&env))?);
            }

            match operator {
                Value::Builtin(builtin) => {
                    builtin.arity.check(builtin.name, args.len())?;
                    return (builtin.func)(self, args);
                }
                Value::Lambda(lambda) => {
                    let frame = bind_params(&self.registry, &lambda, args)?;
                    match self.eval_body(&lambda.body, &frame)? {
                        Step::Done(value) => return Ok(value),
                        Step::Tail(next, next_env) => {
                            expr = next;
                            env = next_env;
                        }
                    }
                }
                other => return Err(SchemeError::NotCallable(other.to_string())),
            }
        }
    }

    /// Calls `procedure` with already-evaluated `args`.
    pub fn apply(&mut self, procedure: &Value, args: Vec<Value>) -> Result<Value, SchemeError> {
        match procedure {
            Value::Builtin(builtin) => {
                builtin.arity.check(builtin.name, args.len())?;
                (builtin.func)(self, args)
            }
            Value::Lambda(lambda) => {
                let frame = bind_params(&self.registry, lambda, args)?;
                match self.eval_body(&lambda.body, &frame)? {
                    Step::Done(value) => Ok(value),
                    Step::Tail(expr, env) => self.eval(expr, env),
                }
            }
            other => Err(SchemeError::NotCallable(other.to_string())),
        }
    }

    /// Forces a promise, caching its value.
    pub fn force(&mut self, promise: &Promise) -> Result<Value, SchemeError> {
        let pending = match &*lock(&promise.0) {
            PromiseState::Forced(value) => return Ok(value.clone()),
            PromiseState::Delayed { expr, env } => (expr.clone(), Arc::clone(env)),
        };
        let value = self.eval(pending.0, pending.1)?;
        *lock(&promise.0) = PromiseState::Forced(value.clone());
        Ok(value)
    }

    /// Evaluates all but the last expression of a body, returning the last
    /// for tail evaluation.
    fn eval_body(&mut self, body: &[Value], env: &Env) -> Result<Step, SchemeError> {
        let Some((last, init)) = body.split_last() else {
            return Ok(Step::Done(Value::Unspecified));
        };
        for expr in init {
            self.eval(expr.clone(), Arc::clone(env))?;
        }
        Ok(Step::Tail(last.clone(), Arc::clone(env)))
    }

    /// Handles `head` if it names a special form.
    fn special_form(&mut self, head: &str, rest: &Value, env: &Env) -> Result<Option<Step>, SchemeError> {
        let whole = || Value::cons(Value::symbol(head), rest.clone());
        let step = match head {
            "quote" => {
                let [datum] = exact::<1>(rest, &whole())?;
                Step::Done(datum)
            }
            "quasiquote" => {
                let [template] = exact::<1>(rest, &whole())?;
                Step::Done(self.quasiquote(&template, env, 1)?)
            }
            "if" => {
                let args = list_items(rest, &whole())?;
                if !(2..=3).contains(&args.len()) {
                    return Err(SchemeError::BadForm(whole().to_string()));
                }
                let mut args = args.into_iter();
                let test = args.next().unwrap_or(Value::Nil);
                let consequent = args.next().unwrap_or(Value::Nil);
                if self.eval(test, Arc::clone(env))?.is_truthy() {
                    Step::Tail(consequent, Arc::clone(env))
                } else {
                    match args.next() {
                        Some(alternative) => Step::Tail(alternative, Arc::clone(env)),
                        None => Step::Done(Value::Unspecified),
                    }
                }
            }
            "cond" => self.cond(rest, env, &whole())?,
            "and" => {
                let args = list_items(rest, &whole())?;
                let Some((last, init)) = args.split_last() else {
                    return Ok(Some(Step::Done(Value::Bool(true))));
                };
                for expr in init {
                    let value = self.eval(expr.clone(), Arc::clone(env))?;
                    if !value.is_truthy() {
                        return Ok(Some(Step::Done(value)));
                    }
                }
                Step::Tail(last.clone(), Arc::clone(env))
            }
            "or" => {
                let args = list_items(rest, &whole())?;
                let Some((last, init)) = args.split_last() else {
                    return Ok(Some(Step::Done(Value::Bool(false))));
                };
                for expr in init {
                    let value = self.eval(expr.clone(), Arc::clone(env))?;
                    if value.is_truthy() {
                        return Ok(Some(Step::Done(value)));
                    }
                }
                Step::Tail(last.clone(), Arc::clone(env))
            }
            "begin" => {
                let body = list_items(rest, &whole())?;
                if body.is_empty() {
                    return Err(SchemeError::BadForm(whole().to_string()));
                }
                self.eval_body(&body, env)?
            }
            "let" => {
                let args = list_items(rest, &whole())?;
                let Some((bindings, body)) = args.split_first() else {
                    return Err(SchemeError::BadForm(whole().to_string()));
                };
                let frame = self.registry.child_frame(env);
                for binding in list_items(bindings, &whole())? {
                    let [name, expr] = exact::<2>(&binding, &whole())?;
                    let name = name
                        .as_symbol()
                        .cloned()
                        .ok_or_else(|| SchemeError::BadForm(whole().to_string()))?;
                    let value = self.eval(expr, Arc::clone(env))?;
                    frame.define(name, value);
                }
                self.eval_body(body, &frame)?
            }
            "define" => {
                let args = list_items(rest, &whole())?;
                match args.as_slice() {
                    [Value::Symbol(name), expr] => {
                        let value = self.eval(expr.clone(), Arc::clone(env))?;
                        let value = name_lambda(value, name);
                        env.define(Arc::clone(name), value);
                        Step::Done(Value::Symbol(Arc::clone(name)))
                    }
                    [Value::Pair(signature), body @ ..] if !body.is_empty() => {
                        let name = signature
                            .car
                            .as_symbol()
                            .cloned()
                            .ok_or_else(|| SchemeError::BadForm(whole().to_string()))?;
                        let lambda = make_lambda(Arc::clone(&name), &signature.cdr, body, env, &whole())?;
                        env.define(Arc::clone(&name), lambda);
                        Step::Done(Value::Symbol(name))
                    }
                    _ => return Err(SchemeError::BadForm(whole().to_string())),
                }
            }
            "lambda" => {
                let args = list_items(rest, &whole())?;
                let Some((params, body)) = args.split_first() else {
                    return Err(SchemeError::BadForm(whole().to_string()));
                };
                if body.is_empty() {
                    return Err(SchemeError::BadForm(whole().to_string()));
                }
                Step::Done(make_lambda(Arc::from("lambda"), params, body, env, &whole())?)
            }
            "set!" => {
                let [target, expr] = exact::<2>(rest, &whole())?;
                let name = target
                    .as_symbol()
                    .cloned()
                    .ok_or_else(|| SchemeError::BadForm(whole().to_string()))?;
                let value = self.eval(expr, Arc::clone(env))?;
                if !env.set(&name, value) {
                    return Err(SchemeError::UnknownIdentifier(name.to_string()));
                }
                Step::Done(Value::Unspecified)
            }
            "delay" => {
                let [expr] = exact::<1>(rest, &whole())?;
                Step::Done(self.registry.promise(expr, env))
            }
            "cons-stream" => {
                let [first, rest_expr] = exact::<2>(rest, &whole())?;
                let first = self.eval(first, Arc::clone(env))?;
                Step::Done(Value::cons(first, self.registry.promise(rest_expr, env)))
            }
            _ => return Ok(None),
        };
        Ok(Some(step))
    }

    /// `(cond (test body...)... (else body...))`.
    fn cond(&mut self, clauses: &Value, env: &Env, whole: &Value) -> Result<Step, SchemeError> {
        for clause in list_items(clauses, whole)? {
            let parts = list_items(&clause, whole)?;
            let Some((test, body)) = parts.split_first() else {
                return Err(SchemeError::BadForm(whole.to_string()));
            };
            let value = match test.as_symbol() {
                Some(name) if &**name == "else" => Value::Bool(true),
                _ => self.eval(test.clone(), Arc::clone(env))?,
            };
            if value.is_truthy() {
                if body.is_empty() {
                    return Ok(Step::Done(value));
                }
                return self.eval_body(body, env);
            }
        }
        Ok(Step::Done(Value::Unspecified))
    }

    /// Expands a quasiquoted template at nesting `level`.
    fn quasiquote(&mut self, template: &Value, env: &Env, level: usize) -> Result<Value, SchemeError> {
        let Value::Pair(pair) = template else {
            return Ok(template.clone());
        };
        if let Some(head) = pair.car.as_symbol() {
            match &**head {
                "unquote" => {
                    let [inner] = exact::<1>(&pair.cdr, template)?;
                    return if level == 1 {
                        self.eval(inner, Arc::clone(env))
                    } else {
                        Ok(Value::list(vec![
                            Value::symbol("unquote"),
                            self.quasiquote(&inner, env, level - 1)?,
                        ]))
                    };
                }
                "quasiquote" => {
                    let [inner] = exact::<1>(&pair.cdr, template)?;
                    return Ok(Value::list(vec![
                        Value::symbol("quasiquote"),
                        self.quasiquote(&inner, env, level + 1)?,
                    ]));
                }
                _ => {}
            }
        }

        if level == 1
            && let Value::Pair(item) = &pair.car
            && item.car.as_symbol().is_some_and(|s| &**s == "unquote-splicing")
        {
            let [inner] = exact::<1>(&item.cdr, &pair.car)?;
            let spliced = self.eval(inner, Arc::clone(env))?;
            let items = spliced.to_vec().ok_or_else(|| SchemeError::WrongType {
                name:     "unquote-splicing".to_string(),
                index:    0,
                expected: "a list",
                got:      spliced.to_string(),
            })?;
            let tail = self.quasiquote(&pair.cdr, env, level)?;
            return Ok(Value::list_with_tail(items, tail));
        }

        let car = self.quasiquote(&pair.car, env, level)?;
        let cdr = self.quasiquote(&pair.cdr, env, level)?;
        Ok(Value::cons(car, cdr))
    }
}

/// Returns the elements of the proper list `list`, reporting `whole` as
/// badly formed otherwise.
fn list_items(list: &Value, whole: &Value) -> Result<Vec<Value>, SchemeError> {
    list.to_vec()
        .ok_or_else(|| SchemeError::BadForm(whole.to_string()))
}

/// Like [`list_items`], but requires exactly `N` elements.
fn exact<const N: usize>(list: &Value, whole: &Value) -> Result<[Value; N], SchemeError> {
    list_items(list, whole)?
        .try_into()
        .map_err(|_| SchemeError::BadForm(whole.to_string()))
}

/// Gives an anonymous lambda the name it is being defined as.
fn name_lambda(value: Value, name: &Arc<str>) -> Value {
    match value {
        Value::Lambda(lambda) if &*lambda.name == "lambda" => Value::Lambda(Arc::new(Lambda {
            name:   Arc::clone(name),
            params: lambda.params.clone(),
            rest:   lambda.rest.clone(),
            body:   lambda.body.clone(),
            env:    Arc::clone(&lambda.env),
        })),
        other => other,
    }
}

/// Builds a lambda from a parameter list, which may be a proper list, a
/// dotted list with a rest parameter, or a lone symbol taking all arguments.
fn make_lambda(
    name: Arc<str>,
    params: &Value,
    body: &[Value],
    env: &Env,
    whole: &Value,
) -> Result<Value, SchemeError> {
    let bad = || SchemeError::BadForm(whole.to_string());
    let mut required = Vec::new();
    let mut cur = params;
    let rest = loop {
        match cur {
            Value::Nil => break None,
            Value::Symbol(rest) => break Some(Arc::clone(rest)),
            Value::Pair(pair) => {
                required.push(pair.car.as_symbol().cloned().ok_or_else(bad)?);
                cur = &pair.cdr;
            }
            _ => return Err(bad()),
        }
    };
    Ok(Value::Lambda(Arc::new(Lambda {
        name,
        params: required,
        rest,
        body: body.to_vec(),
        env: Arc::clone(env),
    })))
}

/// Creates the call frame for `lambda` applied to `args`.
fn bind_params(
    registry: &Registry,
    lambda: &Lambda,
    mut args: Vec<Value>,
) -> Result<Env, SchemeError> {
    let required = lambda.params.len();
    let arity_ok = match lambda.rest {
        Some(_) => args.len() >= required,
        None => args.len() == required,
    };
    if !arity_ok {
        return Err(SchemeError::Arity {
            name:     lambda.name.to_string(),
            expected: match lambda.rest {
                Some(_) => format!("at least {required}"),
                None => required.to_string(),
            },
            got:      args.len(),
        });
    }

    let frame = registry.child_frame(&lambda.env);
    let extra = args.split_off(required);
    for (param, arg) in lambda.params.iter().zip(args) {
        frame.define(Arc::clone(param), arg);
    }
    if let Some(rest) = &lambda.rest {
        frame.define(Arc::clone(rest), Value::list(extra));
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheme::{builtins, reader::read_program};

    fn eval_all(source: &str, budget: Budget) -> Result<Value, SchemeError> {
        let env = builtins::global_frame();
        let mut interp = Interp::new(budget);
        let mut last = Value::Unspecified;
        for form in read_program(source)? {
            last = interp.eval(form, Arc::clone(&env))?;
        }
        env.clear();
        Ok(last)
    }

    fn eval_str(source: &str) -> String {
        eval_all(source, Budget::new(Duration::from_secs(5)))
            .unwrap()
            .to_string()
    }

    #[test]
    fn special_forms() {
        assert_eq!(eval_str("(if #f 1 2)"), "2");
        assert_eq!(eval_str("(if 0 'yes 'no)"), "yes");
        assert_eq!(eval_str("(cond ((= 1 2) 'a) ((= 1 1) 'b) (else 'c))"), "b");
        assert_eq!(eval_str("(cond (#f 1) (else 3))"), "3");
        assert_eq!(eval_str("(and 1 2 #f 3)"), "#f");
        assert_eq!(eval_str("(and)"), "#t");
        assert_eq!(eval_str("(or #f 7)"), "7");
        assert_eq!(eval_str("(let ((x 2) (y 3)) (* x y))"), "6");
        assert_eq!(eval_str("(begin 1 2 3)"), "3");
        assert_eq!(eval_str("(define x 5) (set! x 6) x"), "6");
        assert_eq!(eval_str("(define (f) 1)"), "f");
    }

    #[test]
    fn closures_and_variadics() {
        assert_eq!(
            eval_str("(define (adder n) (lambda (x) (+ x n))) ((adder 3) 4)"),
            "7"
        );
        assert_eq!(eval_str("(define (f a . rest) rest) (f 1 2 3)"), "(2 3)");
        assert_eq!(eval_str("((lambda args args) 1 2)"), "(1 2)");
    }

    #[test]
    fn quasiquote_unquotes_and_splices() {
        assert_eq!(eval_str("(define b 2) `(a ,b ,@(list 3 4) 5)"), "(a 2 3 4 5)");
        assert_eq!(eval_str("`(1 `(2 ,(3 ,(+ 1 3))))"), "(1 (quasiquote (2 (unquote (3 4)))))");
    }

    #[test]
    fn tail_calls_do_not_grow_depth() {
        let source = "(define (loop n acc) (if (= n 0) acc (loop (- n 1) (+ acc 1)))) (loop 100000 0)";
        let value = eval_all(source, Budget::new(Duration::from_secs(30)).with_max_depth(200)).unwrap();
        assert_eq!(value.to_string(), "100000");
    }

    #[test]
    fn deep_recursion_is_an_error() {
        let source = "(define (f n) (+ 1 (f n))) (f 0)";
        let err = eval_all(source, Budget::new(Duration::from_secs(30)).with_max_depth(100)).unwrap_err();
        assert_eq!(err, SchemeError::RecursionDepth);
    }

    #[test]
    fn infinite_loops_hit_the_deadline() {
        let started = Instant::now();
        let err = eval_all(
            "(define (spin) (spin)) (spin)",
            Budget::new(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert_eq!(err, SchemeError::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn errors_name_the_problem() {
        let err = eval_all("(undefined-thing 1)", Budget::new(Duration::from_secs(5))).unwrap_err();
        assert_eq!(err.to_string(), "SchemeError: unknown identifier: undefined-thing");
        let err = eval_all("(1 2)", Budget::new(Duration::from_secs(5))).unwrap_err();
        assert_eq!(err.to_string(), "SchemeError: cannot call: 1");
        let err = eval_all("(define (f x) x) (f)", Budget::new(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, SchemeError::Arity { got: 0, .. }));
        let err = eval_all("(if)", Budget::new(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, SchemeError::BadForm(_)));
    }

    #[test]
    fn streams_are_lazy_and_memoized() {
        let source = "
            (define calls 0)
            (define s (cons-stream 1 (begin (set! calls (+ calls 1)) (cons-stream 2 nil))))
            (car (cdr-stream s))
            (car (cdr-stream s))
            calls";
        assert_eq!(eval_str(source), "1");
    }
}
