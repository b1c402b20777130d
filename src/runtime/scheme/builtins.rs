#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Builtin procedures bound in every fresh global frame.

use std::sync::Arc;

use super::{
    eval::Interp,
    value::{Arity, Builtin, BuiltinFn, Env, Frame, Value},
};
use crate::error::SchemeError;

/// A number pulled out of a value.
#[derive(Debug, Clone, Copy)]
enum Num {
    /// Exact.
    Int(i64),
    /// Inexact.
    Float(f64),
}

impl Num {
    /// As a float, for mixed arithmetic.
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    /// Back to a value.
    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }
}

/// Reports `value` as the wrong type for argument `index` of `name`.
fn wrong_type(name: &str, index: usize, expected: &'static str, value: &Value) -> SchemeError {
    SchemeError::WrongType {
        name: name.to_string(),
        index,
        expected,
        got: value.to_string(),
    }
}

/// Extracts a number.
fn num(name: &str, index: usize, value: &Value) -> Result<Num, SchemeError> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        other => Err(wrong_type(name, index, "a number", other)),
    }
}

/// Extracts an integer.
fn int(name: &str, index: usize, value: &Value) -> Result<i64, SchemeError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
        other => Err(wrong_type(name, index, "an integer", other)),
    }
}

/// Extracts a proper list.
fn items(name: &str, index: usize, value: &Value) -> Result<Vec<Value>, SchemeError> {
    value.to_vec().ok_or_else(|| wrong_type(name, index, "a list", value))
}

/// Applies a binary operation, staying exact while both sides are and the
/// result fits.
fn combine(a: Num, b: Num, exact: fn(i64, i64) -> Option<i64>, inexact: fn(f64, f64) -> f64) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match exact(x, y) {
            Some(r) => Num::Int(r),
            None => Num::Float(inexact(x as f64, y as f64)),
        },
        _ => Num::Float(inexact(a.as_f64(), b.as_f64())),
    }
}

/// Folds `args` with a binary operation starting from `init`.
fn fold(
    name: &str,
    args: &[Value],
    init: Num,
    exact: fn(i64, i64) -> Option<i64>,
    inexact: fn(f64, f64) -> f64,
) -> Result<Value, SchemeError> {
    let mut acc = init;
    for (i, arg) in args.iter().enumerate() {
        acc = combine(acc, num(name, i, arg)?, exact, inexact);
    }
    Ok(acc.into_value())
}

/// `+`
fn add(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    fold("+", &args, Num::Int(0), i64::checked_add, |a, b| a + b)
}

/// `*`
fn mul(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    fold("*", &args, Num::Int(1), i64::checked_mul, |a, b| a * b)
}

/// `-`
fn sub(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let first = num("-", 0, &args[0])?;
    if args.len() == 1 {
        return Ok(combine(Num::Int(0), first, i64::checked_sub, |a, b| a - b).into_value());
    }
    let mut acc = first;
    for (i, arg) in args.iter().enumerate().skip(1) {
        acc = combine(acc, num("-", i, arg)?, i64::checked_sub, |a, b| a - b);
    }
    Ok(acc.into_value())
}

/// True division, exact when the quotient is whole.
fn divide(a: Num, b: Num) -> Result<Num, SchemeError> {
    if b.as_f64() == 0.0 {
        return Err(SchemeError::DivisionByZero);
    }
    Ok(match (a, b) {
        (Num::Int(x), Num::Int(y)) if x.checked_rem(y) == Some(0) => match x.checked_div(y) {
            Some(q) => Num::Int(q),
            None => Num::Float(x as f64 / y as f64),
        },
        _ => Num::Float(a.as_f64() / b.as_f64()),
    })
}

/// `/`
fn div(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let first = num("/", 0, &args[0])?;
    if args.len() == 1 {
        return Ok(divide(Num::Int(1), first)?.into_value());
    }
    let mut acc = first;
    for (i, arg) in args.iter().enumerate().skip(1) {
        acc = divide(acc, num("/", i, arg)?)?;
    }
    Ok(acc.into_value())
}

/// Reads the two integer operands of an integer division.
fn int_pair(name: &str, args: &[Value]) -> Result<(i64, i64), SchemeError> {
    let a = int(name, 0, &args[0])?;
    let b = int(name, 1, &args[1])?;
    if b == 0 {
        return Err(SchemeError::DivisionByZero);
    }
    Ok((a, b))
}

/// `quotient`, truncating toward zero.
fn quotient(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let (a, b) = int_pair("quotient", &args)?;
    Ok(Value::Int(a.wrapping_div(b)))
}

/// `remainder`, with the sign of the dividend.
fn remainder(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let (a, b) = int_pair("remainder", &args)?;
    Ok(Value::Int(a.wrapping_rem(b)))
}

/// `modulo`, with the sign of the divisor.
fn modulo(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let (a, b) = int_pair("modulo", &args)?;
    let r = a.wrapping_rem(b);
    Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
}

/// `abs`
fn abs(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(match num("abs", 0, &args[0])? {
        Num::Int(i) => i
            .checked_abs()
            .map_or(Value::Float((i as f64).abs()), Value::Int),
        Num::Float(f) => Value::Float(f.abs()),
    })
}

/// `expt`
fn expt(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let base = num("expt", 0, &args[0])?;
    let power = num("expt", 1, &args[1])?;
    if let (Num::Int(b), Num::Int(p)) = (base, power)
        && let Ok(p) = u32::try_from(p)
        && let Some(r) = b.checked_pow(p)
    {
        return Ok(Value::Int(r));
    }
    Ok(Value::Float(base.as_f64().powf(power.as_f64())))
}

/// Shared body of `min` and `max`.
fn extremum(name: &str, args: &[Value], pick_right: fn(f64, f64) -> bool) -> Result<Value, SchemeError> {
    let mut best = num(name, 0, &args[0])?;
    let mut inexact = matches!(best, Num::Float(_));
    for (i, arg) in args.iter().enumerate().skip(1) {
        let n = num(name, i, arg)?;
        inexact |= matches!(n, Num::Float(_));
        if pick_right(best.as_f64(), n.as_f64()) {
            best = n;
        }
    }
    Ok(if inexact {
        Value::Float(best.as_f64())
    } else {
        best.into_value()
    })
}

/// `min`
fn min(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    extremum("min", &args, |best, n| n < best)
}

/// `max`
fn max(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    extremum("max", &args, |best, n| n > best)
}

/// Compares adjacent arguments pairwise.
fn chain(name: &str, args: &[Value], holds: fn(Num, Num) -> bool) -> Result<Value, SchemeError> {
    let nums = args
        .iter()
        .enumerate()
        .map(|(i, v)| num(name, i, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Bool(nums.windows(2).all(|w| holds(w[0], w[1]))))
}

/// Numeric equality, exact when both sides are.
fn num_eq(a: Num, b: Num) -> bool {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
    }
}

/// `=`
fn eq_num(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    chain("=", &args, num_eq)
}

/// `<`
fn lt(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    chain("<", &args, |a, b| a.as_f64() < b.as_f64())
}

/// `>`
fn gt(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    chain(">", &args, |a, b| a.as_f64() > b.as_f64())
}

/// `<=`
fn le(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    chain("<=", &args, |a, b| a.as_f64() <= b.as_f64())
}

/// `>=`
fn ge(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    chain(">=", &args, |a, b| a.as_f64() >= b.as_f64())
}

/// `number?`
fn is_number(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Int(_) | Value::Float(_))))
}

/// `integer?`
fn is_integer(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(match args[0] {
        Value::Int(_) => true,
        Value::Float(f) => f.fract() == 0.0,
        _ => false,
    }))
}

/// `zero?`
fn is_zero(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(num("zero?", 0, &args[0])?.as_f64() == 0.0))
}

/// `even?`
fn is_even(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(int("even?", 0, &args[0])? % 2 == 0))
}

/// `odd?`
fn is_odd(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(int("odd?", 0, &args[0])? % 2 != 0))
}

/// `not`
fn not(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(!args[0].is_truthy()))
}

/// `eq?` and `eqv?`
fn is_eq(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(args[0].eqv(&args[1])))
}

/// `equal?`
fn is_equal(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(args[0].equal(&args[1])))
}

/// `null?`
fn is_null(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Nil)))
}

/// `pair?`
fn is_pair(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Pair(_))))
}

/// `list?`
fn is_list(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(args[0].to_vec().is_some()))
}

/// `symbol?`
fn is_symbol(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Symbol(_))))
}

/// `string?`
fn is_string(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Str(_))))
}

/// `boolean?`
fn is_boolean(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Bool(_))))
}

/// `procedure?`
fn is_procedure(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(args[0].is_procedure()))
}

/// `promise?`
fn is_promise(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Bool(matches!(args[0], Value::Promise(_))))
}

/// `cons`
fn cons(_: &mut Interp, mut args: Vec<Value>) -> Result<Value, SchemeError> {
    let cdr = args.pop().unwrap_or(Value::Nil);
    let car = args.pop().unwrap_or(Value::Nil);
    Ok(Value::cons(car, cdr))
}

/// `car`
fn car(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    match &args[0] {
        Value::Pair(pair) => Ok(pair.car.clone()),
        other => Err(wrong_type("car", 0, "a pair", other)),
    }
}

/// `cdr`
fn cdr(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    match &args[0] {
        Value::Pair(pair) => Ok(pair.cdr.clone()),
        other => Err(wrong_type("cdr", 0, "a pair", other)),
    }
}

/// `list`
fn list(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::list(args))
}

/// `append`: every argument but the last must be a proper list.
fn append(_: &mut Interp, mut args: Vec<Value>) -> Result<Value, SchemeError> {
    let Some(mut tail) = args.pop() else {
        return Ok(Value::Nil);
    };
    for (i, arg) in args.iter().enumerate().rev() {
        tail = Value::list_with_tail(items("append", i, arg)?, tail);
    }
    Ok(tail)
}

/// `length`
fn length(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    Ok(Value::Int(items("length", 0, &args[0])?.len() as i64))
}

/// `(map proc list)`
fn map(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let mut out = Vec::new();
    for item in items("map", 1, &args[1])? {
        out.push(interp.apply(&args[0], vec![item])?);
    }
    Ok(Value::list(out))
}

/// `(filter pred list)`
fn filter(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let mut out = Vec::new();
    for item in items("filter", 1, &args[1])? {
        if interp.apply(&args[0], vec![item.clone()])?.is_truthy() {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

/// `(reduce combiner list)`, folding from the left over a non-empty list.
fn reduce(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let mut list = items("reduce", 1, &args[1])?.into_iter();
    let Some(mut acc) = list.next() else {
        return Err(wrong_type("reduce", 1, "a non-empty list", &args[1]));
    };
    for item in list {
        acc = interp.apply(&args[0], vec![acc, item])?;
    }
    Ok(acc)
}

/// `(apply proc arg... list)`
fn apply(interp: &mut Interp, mut args: Vec<Value>) -> Result<Value, SchemeError> {
    let last_index = args.len() - 1;
    let spread = args.pop().unwrap_or(Value::Nil);
    let mut call_args = args.split_off(1);
    call_args.extend(items("apply", last_index, &spread)?);
    interp.apply(&args[0], call_args)
}

/// `display`
fn display(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    interp.out.push_str(&args[0].display_string());
    Ok(Value::Unspecified)
}

/// `print`
fn print(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    interp.out.push_str(&args[0].to_string());
    interp.out.push('\n');
    Ok(Value::Unspecified)
}

/// `newline`
fn newline(interp: &mut Interp, _: Vec<Value>) -> Result<Value, SchemeError> {
    interp.out.push('\n');
    Ok(Value::Unspecified)
}

/// `(error msg...)`
fn error(_: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    let message = args
        .iter()
        .map(Value::display_string)
        .collect::<Vec<_>>()
        .join(" ");
    Err(SchemeError::User(message))
}

/// `force`
fn force(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    match &args[0] {
        Value::Promise(promise) => interp.force(promise),
        other => Err(wrong_type("force", 0, "a promise", other)),
    }
}

/// `cdr-stream`
fn cdr_stream(interp: &mut Interp, args: Vec<Value>) -> Result<Value, SchemeError> {
    match &args[0] {
        Value::Pair(pair) => match &pair.cdr {
            Value::Promise(promise) => interp.force(promise),
            other => Err(wrong_type("cdr-stream", 0, "a stream", other)),
        },
        other => Err(wrong_type("cdr-stream", 0, "a stream", other)),
    }
}

/// Shorthand for a table entry.
const fn builtin(name: &'static str, arity: Arity, func: BuiltinFn) -> Builtin {
    Builtin { name, arity, func }
}

/// Every builtin procedure.
static BUILTINS: &[Builtin] = &[
    builtin("+", Arity::AtLeast(0), add),
    builtin("-", Arity::AtLeast(1), sub),
    builtin("*", Arity::AtLeast(0), mul),
    builtin("/", Arity::AtLeast(1), div),
    builtin("quotient", Arity::Exact(2), quotient),
    builtin("remainder", Arity::Exact(2), remainder),
    builtin("modulo", Arity::Exact(2), modulo),
    builtin("abs", Arity::Exact(1), abs),
    builtin("expt", Arity::Exact(2), expt),
    builtin("min", Arity::AtLeast(1), min),
    builtin("max", Arity::AtLeast(1), max),
    builtin("=", Arity::AtLeast(1), eq_num),
    builtin("<", Arity::AtLeast(1), lt),
    builtin(">", Arity::AtLeast(1), gt),
    builtin("<=", Arity::AtLeast(1), le),
    builtin(">=", Arity::AtLeast(1), ge),
    builtin("number?", Arity::Exact(1), is_number),
    builtin("integer?", Arity::Exact(1), is_integer),
    builtin("zero?", Arity::Exact(1), is_zero),
    builtin("even?", Arity::Exact(1), is_even),
    builtin("odd?", Arity::Exact(1), is_odd),
    builtin("not", Arity::Exact(1), not),
    builtin("eq?", Arity::Exact(2), is_eq),
    builtin("eqv?", Arity::Exact(2), is_eq),
    builtin("equal?", Arity::Exact(2), is_equal),
    builtin("null?", Arity::Exact(1), is_null),
    builtin("pair?", Arity::Exact(1), is_pair),
    builtin("list?", Arity::Exact(1), is_list),
    builtin("symbol?", Arity::Exact(1), is_symbol),
    builtin("string?", Arity::Exact(1), is_string),
    builtin("boolean?", Arity::Exact(1), is_boolean),
    builtin("procedure?", Arity::Exact(1), is_procedure),
    builtin("promise?", Arity::Exact(1), is_promise),
    builtin("cons", Arity::Exact(2), cons),
    builtin("car", Arity::Exact(1), car),
    builtin("cdr", Arity::Exact(1), cdr),
    builtin("list", Arity::AtLeast(0), list),
    builtin("append", Arity::AtLeast(0), append),
    builtin("length", Arity::Exact(1), length),
    builtin("map", Arity::Exact(2), map),
    builtin("filter", Arity::Exact(2), filter),
    builtin("reduce", Arity::Exact(2), reduce),
    builtin("apply", Arity::AtLeast(2), apply),
    builtin("display", Arity::Exact(1), display),
    builtin("print", Arity::Exact(1), print),
    builtin("newline", Arity::Exact(0), newline),
    builtin("error", Arity::AtLeast(0), error),
    builtin("force", Arity::Exact(1), force),
    builtin("cdr-stream", Arity::Exact(1), cdr_stream),
];

/// A fresh global frame with every builtin and `nil` bound.
pub fn global_frame() -> Env {
    let env = Frame::global();
    for b in BUILTINS {
        env.define(Arc::from(b.name), Value::Builtin(b));
    }
    env.define(Arc::from("nil"), Value::Nil);
    env
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::runtime::scheme::{eval::Budget, reader::read_program};

    fn eval_str(source: &str) -> Result<String, SchemeError> {
        let env = global_frame();
        let mut interp = Interp::new(Budget::new(Duration::from_secs(5)));
        let mut last = Value::Unspecified;
        for form in read_program(source)? {
            last = interp.eval(form, Arc::clone(&env))?;
        }
        env.clear();
        Ok(last.to_string())
    }

    fn ok(source: &str) -> String {
        eval_str(source).unwrap()
    }

    #[test]
    fn arithmetic_keeps_exactness() {
        assert_eq!(ok("(+ 1 2 3)"), "6");
        assert_eq!(ok("(+ 1 2.0)"), "3.0");
        assert_eq!(ok("(- 5)"), "-5");
        assert_eq!(ok("(- 10 1 2)"), "7");
        assert_eq!(ok("(/ 6 3)"), "2");
        assert_eq!(ok("(/ 7 2)"), "3.5");
        assert_eq!(ok("(quotient -7 2)"), "-3");
        assert_eq!(ok("(remainder -7 2)"), "-1");
        assert_eq!(ok("(modulo -7 2)"), "1");
        assert_eq!(ok("(expt 2 10)"), "1024");
        assert_eq!(ok("(expt 2 -1)"), "0.5");
        assert_eq!(ok("(max 1 2.0)"), "2.0");
        assert_eq!(ok("(min 3 1 2)"), "1");
        assert_eq!(ok("(abs -4)"), "4");
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(eval_str("(/ 1 0)"), Err(SchemeError::DivisionByZero));
        assert_eq!(eval_str("(modulo 1 0)"), Err(SchemeError::DivisionByZero));
    }

    #[test]
    fn comparisons_chain() {
        assert_eq!(ok("(< 1 2 3)"), "#t");
        assert_eq!(ok("(< 1 3 2)"), "#f");
        assert_eq!(ok("(= 2 2.0)"), "#t");
        assert_eq!(ok("(>= 3 3 1)"), "#t");
    }

    #[test]
    fn list_procedures() {
        assert_eq!(ok("(append '(1 2) '(3) '() '(4))"), "(1 2 3 4)");
        assert_eq!(ok("(length (list 1 2 3))"), "3");
        assert_eq!(ok("(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
        assert_eq!(ok("(filter odd? '(1 2 3 4 5))"), "(1 3 5)");
        assert_eq!(ok("(reduce + '(1 2 3 4))"), "10");
        assert_eq!(ok("(apply + 1 2 '(3 4))"), "10");
        assert_eq!(ok("(car (cdr '(a b c)))"), "b");
        assert_eq!(ok("(cons 1 nil)"), "(1)");
        assert_eq!(ok("(list? '(1 . 2))"), "#f");
        assert_eq!(ok("(equal? '(1 (2)) (list 1 (list 2)))"), "#t");
    }

    #[test]
    fn type_errors_name_the_procedure() {
        let err = eval_str("(car 1)").unwrap_err();
        assert_eq!(err.to_string(), "SchemeError: car: argument 0 is not a pair: 1");
        let err = eval_str("(+ 1 'a)").unwrap_err();
        assert!(matches!(err, SchemeError::WrongType { index: 1, .. }));
        let err = eval_str("(car)").unwrap_err();
        assert!(matches!(err, SchemeError::Arity { got: 0, .. }));
    }

    #[test]
    fn error_joins_its_arguments() {
        assert_eq!(
            eval_str("(error \"bad\" 'thing)"),
            Err(SchemeError::User("bad thing".to_string()))
        );
    }

    #[test]
    fn output_procedures_write_to_the_buffer() {
        let env = global_frame();
        let mut interp = Interp::new(Budget::new(Duration::from_secs(5)));
        for form in read_program("(display \"hi\") (newline) (print '(1 \"a\"))").unwrap() {
            interp.eval(form, Arc::clone(&env)).unwrap();
        }
        assert_eq!(interp.out, "hi\n(1 \"a\")\n");
        env.clear();
    }
}
