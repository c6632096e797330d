//! `java.lang.Math`.
//!
//! # Emulated Methods
//!
//! | Method | Forms | Notes |
//! |--------|-------|-------|
//! | `abs` | `I`, `J`, `F`, `D` | `abs(Integer.MIN_VALUE)` stays negative |
//! | `max`, `min` | `I`, `J`, `F`, `D` | `NaN` wins, `-0.0` is smaller than `0.0` |
//! | `floor`, `ceil`, `rint`, `sqrt`, `pow`, `signum` | `D` (`signum` also `F`) | |
//! | `round` | `(D)J`, `(F)I` | half up, saturating |
//! | `addExact`, `subtractExact`, `multiplyExact` | `II`, `JJ` | `ArithmeticException` on overflow |
//! | `negateExact`, `incrementExact`, `decrementExact` | `I`, `J` | |
//! | `toIntExact` | `J` | |
//! | `floorDiv`, `floorMod` | `II`, `JJ` | `ArithmeticException` on a zero divisor |
//!
//! Transcendental functions (`sin`, `exp`, `log`, ...) are left out. The platform only
//! promises them within an ulp, so folding them would bake one machine's answer into the
//! output.

use crate::emulation::{
    context::ExecutionContext,
    runtime::{arg_double, arg_float, arg_int, arg_long, NativeRegistry},
    value::Value,
    EmulationError,
};

type NativeResult = Result<Option<Value>, EmulationError>;

const MATH: &str = "java/lang/Math";

/// Register the `Math` natives.
pub fn register(registry: &mut NativeRegistry) {
    register_natives!(registry, MATH, [
        ("abs", "(I)I", abs_int),
        ("abs", "(J)J", abs_long),
        ("abs", "(F)F", abs_float),
        ("abs", "(D)D", abs_double),
        ("max", "(II)I", max_int),
        ("max", "(JJ)J", max_long),
        ("max", "(FF)F", max_float),
        ("max", "(DD)D", max_double),
        ("min", "(II)I", min_int),
        ("min", "(JJ)J", min_long),
        ("min", "(FF)F", min_float),
        ("min", "(DD)D", min_double),
        ("floor", "(D)D", floor),
        ("ceil", "(D)D", ceil),
        ("rint", "(D)D", rint),
        ("sqrt", "(D)D", sqrt),
        ("pow", "(DD)D", pow),
        ("signum", "(D)D", signum_double),
        ("signum", "(F)F", signum_float),
        ("round", "(D)J", round_double),
        ("round", "(F)I", round_float),
        ("addExact", "(II)I", add_exact_int),
        ("addExact", "(JJ)J", add_exact_long),
        ("subtractExact", "(II)I", subtract_exact_int),
        ("subtractExact", "(JJ)J", subtract_exact_long),
        ("multiplyExact", "(II)I", multiply_exact_int),
        ("multiplyExact", "(JJ)J", multiply_exact_long),
        ("negateExact", "(I)I", negate_exact_int),
        ("negateExact", "(J)J", negate_exact_long),
        ("incrementExact", "(I)I", increment_exact_int),
        ("incrementExact", "(J)J", increment_exact_long),
        ("decrementExact", "(I)I", decrement_exact_int),
        ("decrementExact", "(J)J", decrement_exact_long),
        ("toIntExact", "(J)I", to_int_exact),
        ("floorDiv", "(II)I", floor_div_int),
        ("floorDiv", "(JJ)J", floor_div_long),
        ("floorMod", "(II)I", floor_mod_int),
        ("floorMod", "(JJ)J", floor_mod_long),
    ]);
}

fn int(value: i32) -> NativeResult {
    Ok(Some(Value::Int(value)))
}

fn long(value: i64) -> NativeResult {
    Ok(Some(Value::Long(value)))
}

fn float(value: f32) -> NativeResult {
    Ok(Some(Value::Float(value)))
}

fn double(value: f64) -> NativeResult {
    Ok(Some(Value::Double(value)))
}

fn overflow(ctx: &mut ExecutionContext<'_>, kind: &str) -> EmulationError {
    ctx.throw_new("java/lang/ArithmeticException", Some(&format!("{kind} overflow")))
}

fn exact_int(ctx: &mut ExecutionContext<'_>, result: Option<i32>) -> NativeResult {
    match result {
        Some(value) => int(value),
        None => Err(overflow(ctx, "integer")),
    }
}

fn exact_long(ctx: &mut ExecutionContext<'_>, result: Option<i64>) -> NativeResult {
    match result {
        Some(value) => long(value),
        None => Err(overflow(ctx, "long")),
    }
}

fn divide_by_zero(ctx: &mut ExecutionContext<'_>) -> EmulationError {
    ctx.throw_new("java/lang/ArithmeticException", Some("/ by zero"))
}

// abs, max, min

fn abs_int(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    int(arg_int(args, 0)?.wrapping_abs())
}

fn abs_long(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    long(arg_long(args, 0)?.wrapping_abs())
}

fn abs_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    float(arg_float(args, 0)?.abs())
}

fn abs_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(arg_double(args, 0)?.abs())
}

fn max_int(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    int(arg_int(args, 0)?.max(arg_int(args, 1)?))
}

fn max_long(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    long(arg_long(args, 0)?.max(arg_long(args, 1)?))
}

fn min_int(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    int(arg_int(args, 0)?.min(arg_int(args, 1)?))
}

fn min_long(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    long(arg_long(args, 0)?.min(arg_long(args, 1)?))
}

/// `Math.max` on doubles: `NaN` if either side is `NaN`, and `0.0` over `-0.0`.
pub(crate) fn java_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_negative() { b } else { a };
    }
    if a >= b {
        a
    } else {
        b
    }
}

/// `Math.min` on doubles: `NaN` if either side is `NaN`, and `-0.0` under `0.0`.
pub(crate) fn java_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == 0.0 && b == 0.0 {
        return if a.is_sign_negative() { a } else { b };
    }
    if a <= b {
        a
    } else {
        b
    }
}

fn max_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = java_max(f64::from(arg_float(args, 0)?), f64::from(arg_float(args, 1)?));
    float(result as f32)
}

fn max_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(java_max(arg_double(args, 0)?, arg_double(args, 1)?))
}

fn min_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = java_min(f64::from(arg_float(args, 0)?), f64::from(arg_float(args, 1)?));
    float(result as f32)
}

fn min_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(java_min(arg_double(args, 0)?, arg_double(args, 1)?))
}

// Rounding and roots

fn floor(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(arg_double(args, 0)?.floor())
}

fn ceil(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(arg_double(args, 0)?.ceil())
}

fn rint(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(arg_double(args, 0)?.round_ties_even())
}

fn sqrt(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(arg_double(args, 0)?.sqrt())
}

/// `Math.pow`. C's `pow` answers `1` for `pow(1, NaN)` and `pow(-1, ±Infinity)`; the
/// platform answers `NaN`.
pub(crate) fn java_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if base.abs() == 1.0 && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn pow(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    double(java_pow(arg_double(args, 0)?, arg_double(args, 1)?))
}

fn signum_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_double(args, 0)?;
    double(if value.is_nan() || value == 0.0 { value } else { value.signum() })
}

fn signum_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_float(args, 0)?;
    float(if value.is_nan() || value == 0.0 { value } else { value.signum() })
}

/// `Math.round(double)`: the closest `long`, ties towards positive infinity. `NaN` is `0`
/// and out-of-range values saturate.
pub(crate) fn java_round(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    rounded as i64
}

/// `Math.round(float)`, computed in single precision.
pub(crate) fn java_round_float(value: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    rounded as i32
}

fn round_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    long(java_round(arg_double(args, 0)?))
}

fn round_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    int(java_round_float(arg_float(args, 0)?))
}

// Exact arithmetic

fn add_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_add(arg_int(args, 1)?);
    exact_int(ctx, result)
}

fn add_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_add(arg_long(args, 1)?);
    exact_long(ctx, result)
}

fn subtract_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_sub(arg_int(args, 1)?);
    exact_int(ctx, result)
}

fn subtract_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_sub(arg_long(args, 1)?);
    exact_long(ctx, result)
}

fn multiply_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_mul(arg_int(args, 1)?);
    exact_int(ctx, result)
}

fn multiply_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_mul(arg_long(args, 1)?);
    exact_long(ctx, result)
}

fn negate_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_neg();
    exact_int(ctx, result)
}

fn negate_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_neg();
    exact_long(ctx, result)
}

fn increment_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_add(1);
    exact_int(ctx, result)
}

fn increment_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_add(1);
    exact_long(ctx, result)
}

fn decrement_exact_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_int(args, 0)?.checked_sub(1);
    exact_int(ctx, result)
}

fn decrement_exact_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = arg_long(args, 0)?.checked_sub(1);
    exact_long(ctx, result)
}

fn to_int_exact(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let result = i32::try_from(arg_long(args, 0)?).ok();
    exact_int(ctx, result)
}

// Floor division

fn floor_div_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (x, y) = (arg_int(args, 0)?, arg_int(args, 1)?);
    if y == 0 {
        return Err(divide_by_zero(ctx));
    }
    let quotient = x.wrapping_div(y);
    let adjust = (x % y != 0) && ((x ^ y) < 0);
    int(if adjust { quotient - 1 } else { quotient })
}

fn floor_div_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (x, y) = (arg_long(args, 0)?, arg_long(args, 1)?);
    if y == 0 {
        return Err(divide_by_zero(ctx));
    }
    let quotient = x.wrapping_div(y);
    let adjust = (x.wrapping_rem(y) != 0) && ((x ^ y) < 0);
    long(if adjust { quotient - 1 } else { quotient })
}

fn floor_mod_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (x, y) = (arg_int(args, 0)?, arg_int(args, 1)?);
    if y == 0 {
        return Err(divide_by_zero(ctx));
    }
    let remainder = x.wrapping_rem(y);
    let adjust = remainder != 0 && ((remainder ^ y) < 0);
    int(if adjust { remainder + y } else { remainder })
}

fn floor_mod_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (x, y) = (arg_long(args, 0)?, arg_long(args, 1)?);
    if y == 0 {
        return Err(divide_by_zero(ctx));
    }
    let remainder = x.wrapping_rem(y);
    let adjust = remainder != 0 && ((remainder ^ y) < 0);
    long(if adjust { remainder + y } else { remainder })
}
