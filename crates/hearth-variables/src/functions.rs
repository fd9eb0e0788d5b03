//! The fixed built-in function table

use hearth_matcher::FunctionSignature;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// A built-in function available inside expressions
pub struct BuiltinFunction {
    /// Function name as written in expressions
    pub name: &'static str,

    /// Accepted argument counts
    pub signature: FunctionSignature,

    apply: fn(&[Value]) -> EvalResult<Value>,
}

impl BuiltinFunction {
    /// Apply the function to already-evaluated arguments
    ///
    /// The matcher enforces arity at parse time; a count violation here means
    /// the tree was not built from matched tokens.
    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        if !self.signature.accepts(args.len()) {
            return Err(EvalError::MalformedTokens(format!(
                "function \"{}\" called with {} arguments",
                self.name,
                args.len()
            )));
        }
        (self.apply)(args)
    }
}

static BUILTIN_FUNCTIONS: [BuiltinFunction; 6] = [
    BuiltinFunction {
        name: "min",
        signature: FunctionSignature::at_least(2),
        apply: fn_min,
    },
    BuiltinFunction {
        name: "max",
        signature: FunctionSignature::at_least(2),
        apply: fn_max,
    },
    BuiltinFunction {
        name: "avg",
        signature: FunctionSignature::at_least(1),
        apply: fn_avg,
    },
    BuiltinFunction {
        name: "round",
        signature: FunctionSignature::range(1, 2),
        apply: fn_round,
    },
    BuiltinFunction {
        name: "abs",
        signature: FunctionSignature::exact(1),
        apply: fn_abs,
    },
    BuiltinFunction {
        name: "formatNumber",
        signature: FunctionSignature::exact(1),
        apply: fn_format_number,
    },
];

/// The fixed built-in function table
pub fn builtin_functions() -> &'static [BuiltinFunction] {
    &BUILTIN_FUNCTIONS
}

/// Name-to-signature pairs for seeding a parse context
pub fn builtin_signatures() -> impl Iterator<Item = (&'static str, FunctionSignature)> {
    builtin_functions().iter().map(|f| (f.name, f.signature))
}

fn numbers(args: &[Value]) -> EvalResult<Vec<f64>> {
    args.iter().map(Value::as_number).collect()
}

fn fn_min(args: &[Value]) -> EvalResult<Value> {
    let values = numbers(args)?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    Ok(Value::with_unit(min, args[0].unit()))
}

fn fn_max(args: &[Value]) -> EvalResult<Value> {
    let values = numbers(args)?;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Value::with_unit(max, args[0].unit()))
}

fn fn_avg(args: &[Value]) -> EvalResult<Value> {
    let values = numbers(args)?;
    let sum: f64 = values.iter().sum();
    Ok(Value::with_unit(sum / values.len() as f64, args[0].unit()))
}

fn fn_round(args: &[Value]) -> EvalResult<Value> {
    let value = args[0].as_number()?;
    let digits = match args.get(1) {
        Some(arg) => arg.as_number()?.max(0.0) as u32,
        None => 0,
    };
    let factor = 10f64.powi(digits as i32);
    Ok(Value::with_unit(
        (value * factor).round() / factor,
        args[0].unit(),
    ))
}

fn fn_abs(args: &[Value]) -> EvalResult<Value> {
    Ok(Value::with_unit(
        args[0].as_number()?.abs(),
        args[0].unit(),
    ))
}

// Renders with an SI-style magnitude prefix and folds the operand's unit
// into the text, so the wrapping expression continues unitless.
fn fn_format_number(args: &[Value]) -> EvalResult<Value> {
    let value = args[0].as_number()?;
    Ok(Value::text(format!(
        "{}{}",
        si_format(value),
        args[0].unit()
    )))
}

const PREFIXES: &[(f64, &str)] = &[
    (1e12, "T"),
    (1e9, "G"),
    (1e6, "M"),
    (1e3, "k"),
    (1.0, ""),
    (1e-3, "m"),
    (1e-6, "\u{00b5}"),
    (1e-9, "n"),
];

fn si_format(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }

    let magnitude = value.abs();
    let (factor, prefix) = PREFIXES
        .iter()
        .find(|(factor, _)| magnitude >= *factor)
        .copied()
        .unwrap_or((1e-9, "n"));

    let scaled = value / factor;
    let mut text = format!("{:.2}", scaled);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{}{}", text, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> EvalResult<Value> {
        builtin_functions()
            .iter()
            .find(|f| f.name == name)
            .unwrap()
            .call(args)
    }

    #[test]
    fn test_min_max_keep_first_unit() {
        let args = [Value::with_unit(3.0, "V"), Value::number(1.0)];
        assert_eq!(call("min", &args).unwrap(), Value::with_unit(1.0, "V"));
        assert_eq!(call("max", &args).unwrap(), Value::with_unit(3.0, "V"));
    }

    #[test]
    fn test_avg() {
        let args = [Value::number(1.0), Value::number(2.0), Value::number(6.0)];
        assert_eq!(call("avg", &args).unwrap(), Value::number(3.0));
    }

    #[test]
    fn test_round_with_digits() {
        assert_eq!(
            call("round", &[Value::number(1.567)]).unwrap(),
            Value::number(2.0)
        );
        assert_eq!(
            call("round", &[Value::number(1.567), Value::number(2.0)]).unwrap(),
            Value::number(1.57)
        );
    }

    #[test]
    fn test_abs() {
        assert_eq!(
            call("abs", &[Value::with_unit(-4.0, "V")]).unwrap(),
            Value::with_unit(4.0, "V")
        );
    }

    #[test]
    fn test_format_number_folds_unit_into_text() {
        assert_eq!(
            call("formatNumber", &[Value::with_unit(1000.0, "V")]).unwrap(),
            Value::text("1kV")
        );
        assert_eq!(
            call("formatNumber", &[Value::number(1500.0)]).unwrap(),
            Value::text("1.5k")
        );
    }

    #[test]
    fn test_si_format_ranges() {
        assert_eq!(si_format(0.0), "0");
        assert_eq!(si_format(12.0), "12");
        assert_eq!(si_format(1234.0), "1.23k");
        assert_eq!(si_format(2_500_000.0), "2.5M");
        assert_eq!(si_format(3e9), "3G");
        assert_eq!(si_format(0.005), "5m");
        assert_eq!(si_format(-1000.0), "-1k");
    }

    #[test]
    fn test_text_argument_is_not_a_number() {
        assert!(matches!(
            call("min", &[Value::text("x"), Value::number(1.0)]),
            Err(EvalError::NotANumber(_))
        ));
    }
}
