//! Boxed primitives: `Integer`, `Long`, `Short`, `Byte`, `Float`, `Double`, `Boolean` and
//! `Character`.
//!
//! A box is a [`HeapObject::Boxed`] holding the primitive as a [`Value`]. `boolean`,
//! `char`, `short` and `byte` are stored as normalized `Value::Int`s. `valueOf` goes through
//! [`Heap::boxed`](crate::emulation::Heap::boxed), which reproduces the platform's box caches,
//! so identity comparisons of small boxes behave as on the JVM.
//!
//! # Emulated Methods
//!
//! ## Every wrapper
//!
//! | Method | Notes |
//! |--------|-------|
//! | `valueOf(primitive)`, `<init>(primitive)` | |
//! | `xxxValue()` | every `Number` conversion, `booleanValue`, `charValue` |
//! | `equals`, `hashCode`, `compareTo`, `toString()` | platform semantics for `NaN` and `-0.0` |
//! | static `toString`, `compare`, `hashCode` | |
//! | `TYPE` | the primitive class object |
//!
//! ## Parsing
//!
//! | Method | Failure |
//! |--------|---------|
//! | `Integer.parseInt`, `Long.parseLong` (with optional radix) | `NumberFormatException` with the platform message |
//! | `Short.parseShort`, `Byte.parseByte` | `NumberFormatException` (`Value out of range`) |
//! | `Double.parseDouble`, `Float.parseFloat` | `NumberFormatException`, `NullPointerException` for `null` |
//! | `Boolean.parseBoolean` | never fails |
//! | `valueOf(String)` | as the matching `parse` method, then boxed |
//!
//! ## Utilities
//!
//! `Integer`/`Long`: `toHexString`, `toBinaryString`, `toOctalString`, `bitCount`,
//! `numberOfLeadingZeros`, `numberOfTrailingZeros`, `signum`, `sum`, `max`, `min`,
//! `Integer.toString(int, int)`. `Double`/`Float`: `isNaN`, `isInfinite`, `isFinite` and the
//! bit conversions. `Character`: `isDigit`, `isLetter`, `isLetterOrDigit`, `isWhitespace`,
//! `isUpperCase`, `isLowerCase`, `toUpperCase`, `toLowerCase`, `digit`.
//!
//! Hexadecimal floating-point literals (`0x1.8p1`) are reported as unsupported rather than
//! parsed.

use crate::{
    classfile::FieldType,
    emulation::{
        context::ExecutionContext,
        heap::HeapObject,
        runtime::{
            arg, arg_double, arg_float, arg_int, arg_long, boolean,
            string::{is_java_whitespace, simple_case},
            NativeRegistry,
        },
        value::Value,
        EmulationError,
    },
};

type NativeResult = Result<Option<Value>, EmulationError>;

const INTEGER: &str = "java/lang/Integer";
const LONG: &str = "java/lang/Long";
const SHORT: &str = "java/lang/Short";
const BYTE: &str = "java/lang/Byte";
const FLOAT: &str = "java/lang/Float";
const DOUBLE: &str = "java/lang/Double";
const BOOLEAN: &str = "java/lang/Boolean";
const CHARACTER: &str = "java/lang/Character";

/// Wrapper class, primitive descriptor, primitive keyword.
const BOX_TYPES: &[(&str, &str, &str)] = &[
    (INTEGER, "I", "int"),
    (LONG, "J", "long"),
    (SHORT, "S", "short"),
    (BYTE, "B", "byte"),
    (FLOAT, "F", "float"),
    (DOUBLE, "D", "double"),
    (BOOLEAN, "Z", "boolean"),
    (CHARACTER, "C", "char"),
];

/// Generate a native that forwards to a shared implementation with a fixed wrapper class.
macro_rules! class_natives {
    ($($name:ident => $op:ident($class:expr);)*) => {
        $(
            fn $name(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
                $op(ctx, args, $class)
            }
        )*
    };
}

class_natives! {
    integer_value_of => value_of(INTEGER);
    long_value_of => value_of(LONG);
    short_value_of => value_of(SHORT);
    byte_value_of => value_of(BYTE);
    float_value_of => value_of(FLOAT);
    double_value_of => value_of(DOUBLE);
    boolean_value_of => value_of(BOOLEAN);
    character_value_of => value_of(CHARACTER);

    integer_parse => parse(INTEGER);
    long_parse => parse(LONG);
    short_parse => parse(SHORT);
    byte_parse => parse(BYTE);
    float_parse => parse(FLOAT);
    double_parse => parse(DOUBLE);
    boolean_parse => parse(BOOLEAN);

    integer_value_of_string => value_of_string(INTEGER);
    long_value_of_string => value_of_string(LONG);
    short_value_of_string => value_of_string(SHORT);
    byte_value_of_string => value_of_string(BYTE);
    float_value_of_string => value_of_string(FLOAT);
    double_value_of_string => value_of_string(DOUBLE);
    boolean_value_of_string => value_of_string(BOOLEAN);

    integer_to_string => static_to_string(INTEGER);
    long_to_string => static_to_string(LONG);
    short_to_string => static_to_string(SHORT);
    byte_to_string => static_to_string(BYTE);
    float_to_string => static_to_string(FLOAT);
    double_to_string => static_to_string(DOUBLE);
    boolean_to_string => static_to_string(BOOLEAN);
    character_to_string => static_to_string(CHARACTER);

    integer_compare => static_compare(INTEGER);
    long_compare => static_compare(LONG);
    short_compare => static_compare(SHORT);
    byte_compare => static_compare(BYTE);
    float_compare => static_compare(FLOAT);
    double_compare => static_compare(DOUBLE);
    boolean_compare => static_compare(BOOLEAN);
    character_compare => static_compare(CHARACTER);

    integer_hash => static_hash(INTEGER);
    long_hash => static_hash(LONG);
    short_hash => static_hash(SHORT);
    byte_hash => static_hash(BYTE);
    float_hash => static_hash(FLOAT);
    double_hash => static_hash(DOUBLE);
    boolean_hash => static_hash(BOOLEAN);
    character_hash => static_hash(CHARACTER);
}

/// Register the wrapper natives.
#[allow(clippy::too_many_lines)]
pub fn register(registry: &mut NativeRegistry) {
    for (class, primitive, _) in BOX_TYPES {
        let boxed = format!("L{class};");
        register_natives!(registry, class, [
            ("<init>", &format!("({primitive})V"), box_init),
            ("equals", "(Ljava/lang/Object;)Z", box_equals),
            ("hashCode", "()I", box_hash_code),
            ("compareTo", &format!("({boxed})I"), box_compare_to),
            ("compareTo", "(Ljava/lang/Object;)I", box_compare_to),
            ("toString", "()Ljava/lang/String;", box_to_string),
        ]);
        if !matches!(*class, BOOLEAN | CHARACTER) {
            register_natives!(registry, class, [
                ("intValue", "()I", number_int_value),
                ("longValue", "()J", number_long_value),
                ("floatValue", "()F", number_float_value),
                ("doubleValue", "()D", number_double_value),
                ("shortValue", "()S", number_short_value),
                ("byteValue", "()B", number_byte_value),
            ]);
        }
    }
    register_natives!(registry, BOOLEAN, [("booleanValue", "()Z", unbox_native)]);
    register_natives!(registry, CHARACTER, [("charValue", "()C", unbox_native)]);

    register_natives!(registry, INTEGER, [
        ("valueOf", "(I)Ljava/lang/Integer;", integer_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Integer;", integer_value_of_string),
        ("valueOf", "(Ljava/lang/String;I)Ljava/lang/Integer;", integer_value_of_string),
        ("parseInt", "(Ljava/lang/String;)I", integer_parse),
        ("parseInt", "(Ljava/lang/String;I)I", integer_parse),
        ("toString", "(I)Ljava/lang/String;", integer_to_string),
        ("toString", "(II)Ljava/lang/String;", integer_to_string_radix),
        ("compare", "(II)I", integer_compare),
        ("hashCode", "(I)I", integer_hash),
        ("toHexString", "(I)Ljava/lang/String;", integer_to_hex_string),
        ("toBinaryString", "(I)Ljava/lang/String;", integer_to_binary_string),
        ("toOctalString", "(I)Ljava/lang/String;", integer_to_octal_string),
        ("bitCount", "(I)I", integer_bit_count),
        ("numberOfLeadingZeros", "(I)I", integer_leading_zeros),
        ("numberOfTrailingZeros", "(I)I", integer_trailing_zeros),
        ("signum", "(I)I", integer_signum),
        ("sum", "(II)I", integer_sum),
        ("max", "(II)I", integer_max),
        ("min", "(II)I", integer_min),
    ]);

    register_natives!(registry, LONG, [
        ("valueOf", "(J)Ljava/lang/Long;", long_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Long;", long_value_of_string),
        ("parseLong", "(Ljava/lang/String;)J", long_parse),
        ("parseLong", "(Ljava/lang/String;I)J", long_parse),
        ("toString", "(J)Ljava/lang/String;", long_to_string),
        ("compare", "(JJ)I", long_compare),
        ("hashCode", "(J)I", long_hash),
        ("toHexString", "(J)Ljava/lang/String;", long_to_hex_string),
        ("toBinaryString", "(J)Ljava/lang/String;", long_to_binary_string),
        ("bitCount", "(J)I", long_bit_count),
        ("numberOfLeadingZeros", "(J)I", long_leading_zeros),
        ("numberOfTrailingZeros", "(J)I", long_trailing_zeros),
        ("signum", "(J)I", long_signum),
        ("sum", "(JJ)J", long_sum),
        ("max", "(JJ)J", long_max),
        ("min", "(JJ)J", long_min),
    ]);

    register_natives!(registry, SHORT, [
        ("valueOf", "(S)Ljava/lang/Short;", short_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Short;", short_value_of_string),
        ("parseShort", "(Ljava/lang/String;)S", short_parse),
        ("parseShort", "(Ljava/lang/String;I)S", short_parse),
        ("toString", "(S)Ljava/lang/String;", short_to_string),
        ("compare", "(SS)I", short_compare),
        ("hashCode", "(S)I", short_hash),
    ]);

    register_natives!(registry, BYTE, [
        ("valueOf", "(B)Ljava/lang/Byte;", byte_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Byte;", byte_value_of_string),
        ("parseByte", "(Ljava/lang/String;)B", byte_parse),
        ("parseByte", "(Ljava/lang/String;I)B", byte_parse),
        ("toString", "(B)Ljava/lang/String;", byte_to_string),
        ("compare", "(BB)I", byte_compare),
        ("hashCode", "(B)I", byte_hash),
    ]);

    register_natives!(registry, FLOAT, [
        ("valueOf", "(F)Ljava/lang/Float;", float_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Float;", float_value_of_string),
        ("parseFloat", "(Ljava/lang/String;)F", float_parse),
        ("toString", "(F)Ljava/lang/String;", float_to_string),
        ("compare", "(FF)I", float_compare),
        ("hashCode", "(F)I", float_hash),
        ("isNaN", "(F)Z", float_is_nan),
        ("isNaN", "()Z", float_box_is_nan),
        ("isInfinite", "(F)Z", float_is_infinite),
        ("isFinite", "(F)Z", float_is_finite),
        ("floatToIntBits", "(F)I", float_to_int_bits),
        ("floatToRawIntBits", "(F)I", float_to_raw_int_bits),
        ("intBitsToFloat", "(I)F", int_bits_to_float),
    ]);

    register_natives!(registry, DOUBLE, [
        ("valueOf", "(D)Ljava/lang/Double;", double_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Double;", double_value_of_string),
        ("parseDouble", "(Ljava/lang/String;)D", double_parse),
        ("toString", "(D)Ljava/lang/String;", double_to_string),
        ("compare", "(DD)I", double_compare),
        ("hashCode", "(D)I", double_hash),
        ("isNaN", "(D)Z", double_is_nan),
        ("isNaN", "()Z", double_box_is_nan),
        ("isInfinite", "(D)Z", double_is_infinite),
        ("isFinite", "(D)Z", double_is_finite),
        ("doubleToLongBits", "(D)J", double_to_long_bits),
        ("doubleToRawLongBits", "(D)J", double_to_raw_long_bits),
        ("longBitsToDouble", "(J)D", long_bits_to_double),
    ]);

    register_natives!(registry, BOOLEAN, [
        ("valueOf", "(Z)Ljava/lang/Boolean;", boolean_value_of),
        ("valueOf", "(Ljava/lang/String;)Ljava/lang/Boolean;", boolean_value_of_string),
        ("parseBoolean", "(Ljava/lang/String;)Z", boolean_parse),
        ("toString", "(Z)Ljava/lang/String;", boolean_to_string),
        ("compare", "(ZZ)I", boolean_compare),
        ("hashCode", "(Z)I", boolean_hash),
    ]);

    register_natives!(registry, CHARACTER, [
        ("valueOf", "(C)Ljava/lang/Character;", character_value_of),
        ("toString", "(C)Ljava/lang/String;", character_to_string),
        ("compare", "(CC)I", character_compare),
        ("hashCode", "(C)I", character_hash),
        ("isDigit", "(C)Z", character_is_digit),
        ("isLetter", "(C)Z", character_is_letter),
        ("isLetterOrDigit", "(C)Z", character_is_letter_or_digit),
        ("isWhitespace", "(C)Z", character_is_whitespace),
        ("isUpperCase", "(C)Z", character_is_upper_case),
        ("isLowerCase", "(C)Z", character_is_lower_case),
        ("toUpperCase", "(C)C", character_to_upper_case),
        ("toLowerCase", "(C)C", character_to_lower_case),
        ("digit", "(CI)I", character_digit),
    ]);

    registry.register_field(INTEGER, "TYPE", "Ljava/lang/Class;", integer_type);
    registry.register_field(LONG, "TYPE", "Ljava/lang/Class;", long_type);
    registry.register_field(SHORT, "TYPE", "Ljava/lang/Class;", short_type);
    registry.register_field(BYTE, "TYPE", "Ljava/lang/Class;", byte_type);
    registry.register_field(FLOAT, "TYPE", "Ljava/lang/Class;", float_type);
    registry.register_field(DOUBLE, "TYPE", "Ljava/lang/Class;", double_type);
    registry.register_field(BOOLEAN, "TYPE", "Ljava/lang/Class;", boolean_type);
    registry.register_field(CHARACTER, "TYPE", "Ljava/lang/Class;", character_type);
    registry.register_field(BOOLEAN, "TRUE", "Ljava/lang/Boolean;", boolean_true);
    registry.register_field(BOOLEAN, "FALSE", "Ljava/lang/Boolean;", boolean_false);
}

/// The primitive class a wrapper class boxes, by keyword.
#[must_use]
pub fn primitive_keyword(class: &str) -> Option<&'static str> {
    BOX_TYPES
        .iter()
        .find(|(wrapper, _, _)| *wrapper == class)
        .map(|(_, _, keyword)| *keyword)
}

fn primitive_type(class: &str) -> FieldType {
    match class {
        LONG => FieldType::Long,
        SHORT => FieldType::Short,
        BYTE => FieldType::Byte,
        FLOAT => FieldType::Float,
        DOUBLE => FieldType::Double,
        BOOLEAN => FieldType::Boolean,
        CHARACTER => FieldType::Char,
        _ => FieldType::Int,
    }
}

macro_rules! primitive_class_fields {
    ($($name:ident => $keyword:expr;)*) => {
        $(
            fn $name(ctx: &mut ExecutionContext<'_>) -> Result<Value, EmulationError> {
                Ok(ctx.class_object($keyword))
            }
        )*
    };
}

primitive_class_fields! {
    integer_type => "int";
    long_type => "long";
    short_type => "short";
    byte_type => "byte";
    float_type => "float";
    double_type => "double";
    boolean_type => "boolean";
    character_type => "char";
}

fn boolean_true(ctx: &mut ExecutionContext<'_>) -> Result<Value, EmulationError> {
    Ok(Value::Ref(ctx.heap_mut().boxed(BOOLEAN, Value::Int(1))))
}

fn boolean_false(ctx: &mut ExecutionContext<'_>) -> Result<Value, EmulationError> {
    Ok(Value::Ref(ctx.heap_mut().boxed(BOOLEAN, Value::Int(0))))
}

// Boxing

fn normalize(class: &str, value: Value) -> Value {
    match (class, value) {
        (BOOLEAN, Value::Int(v)) => Value::Int(i32::from(v != 0)),
        (CHARACTER, Value::Int(v)) => Value::Int(i32::from(v as u16)),
        (SHORT, Value::Int(v)) => Value::Int(i32::from(v as i16)),
        (BYTE, Value::Int(v)) => Value::Int(i32::from(v as i8)),
        _ => value,
    }
}

fn value_of(ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    let value = normalize(class, arg(args, 0)?);
    Ok(Some(Value::Ref(ctx.heap_mut().boxed(class, value))))
}

/// The box class and primitive of a receiver.
fn unbox(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<(&'static str, Value), EmulationError> {
    let Some(reference) = value.as_reference()? else {
        return Err(ctx.throw_new(
            "java/lang/NullPointerException",
            Some("Cannot unbox a null value"),
        ));
    };
    match ctx.heap().get(reference) {
        HeapObject::Boxed { class, value } => Ok((*class, *value)),
        _ => Err(EmulationError::type_mismatch("boxed primitive", &value)),
    }
}

fn box_init(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = arg(args, 0)?;
    let value = arg(args, 1)?;
    if let Some(reference) = this.as_reference()? {
        if let HeapObject::Boxed { class, value: slot } = ctx.heap_mut().get_mut(reference) {
            *slot = normalize(class, value);
        }
    }
    Ok(None)
}

fn unbox_native(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(value))
}

fn as_f64(value: Value) -> Result<f64, EmulationError> {
    Ok(match value {
        Value::Int(v) => f64::from(v),
        Value::Long(v) => v as f64,
        Value::Float(v) => f64::from(v),
        Value::Double(v) => v,
        other => return Err(EmulationError::type_mismatch("number", &other)),
    })
}

fn as_i64(value: Value) -> Result<i64, EmulationError> {
    Ok(match value {
        Value::Int(v) => i64::from(v),
        Value::Long(v) => v,
        Value::Float(v) => v as i64,
        Value::Double(v) => v as i64,
        other => return Err(EmulationError::type_mismatch("number", &other)),
    })
}

fn as_i32(value: Value) -> Result<i32, EmulationError> {
    Ok(match value {
        Value::Int(v) => v,
        Value::Long(v) => v as i32,
        Value::Float(v) => v as i32,
        Value::Double(v) => v as i32,
        other => return Err(EmulationError::type_mismatch("number", &other)),
    })
}

fn number_int_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Int(as_i32(value)?)))
}

fn number_long_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Long(as_i64(value)?)))
}

fn number_float_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    let converted = match value {
        Value::Float(v) => v,
        Value::Long(v) => v as f32,
        Value::Int(v) => v as f32,
        other => as_f64(other)? as f32,
    };
    Ok(Some(Value::Float(converted)))
}

fn number_double_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Double(as_f64(value)?)))
}

fn number_short_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Int(i32::from(as_i32(value)? as i16))))
}

fn number_byte_value(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Int(i32::from(as_i32(value)? as i8))))
}

// equals / hashCode / compare

const CANONICAL_FLOAT_NAN: i32 = 0x7fc0_0000;
const CANONICAL_DOUBLE_NAN: i64 = 0x7ff8_0000_0000_0000;

fn float_bits(value: f32) -> i32 {
    if value.is_nan() {
        CANONICAL_FLOAT_NAN
    } else {
        value.to_bits() as i32
    }
}

fn double_bits(value: f64) -> i64 {
    if value.is_nan() {
        CANONICAL_DOUBLE_NAN
    } else {
        value.to_bits() as i64
    }
}

fn same_value(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => float_bits(x) == float_bits(y),
        (Value::Double(x), Value::Double(y)) => double_bits(x) == double_bits(y),
        (x, y) => x == y,
    }
}

fn hash_value(class: &str, value: Value) -> Result<i32, EmulationError> {
    Ok(match (class, value) {
        (BOOLEAN, Value::Int(v)) => {
            if v != 0 {
                1231
            } else {
                1237
            }
        }
        (_, Value::Int(v)) => v,
        (_, Value::Long(v)) => (v ^ ((v as u64) >> 32) as i64) as i32,
        (_, Value::Float(v)) => float_bits(v),
        (_, Value::Double(v)) => {
            let bits = double_bits(v);
            (bits ^ ((bits as u64) >> 32) as i64) as i32
        }
        (_, other) => return Err(EmulationError::type_mismatch("primitive", &other)),
    })
}

fn compare_doubles(a: f64, b: f64) -> i32 {
    if a < b {
        -1
    } else if a > b {
        1
    } else {
        double_bits(a).cmp(&double_bits(b)) as i32
    }
}

fn compare_values(class: &str, a: Value, b: Value) -> Result<i32, EmulationError> {
    Ok(match class {
        INTEGER => a.as_int()?.cmp(&b.as_int()?) as i32,
        LONG => a.as_long()?.cmp(&b.as_long()?) as i32,
        SHORT | BYTE | CHARACTER => a.as_int()? - b.as_int()?,
        BOOLEAN => {
            let (x, y) = (a.as_int()? != 0, b.as_int()? != 0);
            match (x, y) {
                _ if x == y => 0,
                (true, _) => 1,
                _ => -1,
            }
        }
        FLOAT => compare_doubles(f64::from(a.as_float()?), f64::from(b.as_float()?)),
        _ => compare_doubles(a.as_double()?, b.as_double()?),
    })
}

fn box_equals(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (class, value) = unbox(ctx, arg(args, 0)?)?;
    let equal = match arg(args, 1)?.reference() {
        Some(other) => matches!(
            ctx.heap().get(other),
            HeapObject::Boxed { class: other_class, value: other_value }
                if *other_class == class && same_value(value, *other_value)
        ),
        None => false,
    };
    boolean(equal)
}

fn box_hash_code(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (class, value) = unbox(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Int(hash_value(class, value)?)))
}

fn box_compare_to(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (class, value) = unbox(ctx, arg(args, 0)?)?;
    let (other_class, other) = unbox(ctx, arg(args, 1)?)?;
    if class != other_class {
        let message = format!(
            "class {} cannot be cast to class {}",
            other_class.replace('/', "."),
            class.replace('/', ".")
        );
        return Err(ctx.throw_new("java/lang/ClassCastException", Some(&message)));
    }
    Ok(Some(Value::Int(compare_values(class, value, other)?)))
}

fn box_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (class, value) = unbox(ctx, arg(args, 0)?)?;
    let text = ctx.to_java_string(value, &primitive_type(class))?;
    Ok(Some(ctx.new_string(text)))
}

fn static_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    let text = ctx.to_java_string(arg(args, 0)?, &primitive_type(class))?;
    Ok(Some(ctx.new_string(text)))
}

fn static_compare(_ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    Ok(Some(Value::Int(compare_values(class, arg(args, 0)?, arg(args, 1)?)?)))
}

fn static_hash(_ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    Ok(Some(Value::Int(hash_value(class, normalize(class, arg(args, 0)?))?)))
}

// Parsing

fn number_format(ctx: &mut ExecutionContext<'_>, message: &str) -> EmulationError {
    ctx.throw_new("java/lang/NumberFormatException", Some(message))
}

fn for_input_string(ctx: &mut ExecutionContext<'_>, text: &str, radix: u32) -> EmulationError {
    let message = if radix == 10 {
        format!("For input string: \"{text}\"")
    } else {
        format!("For input string: \"{text}\" under radix {radix}")
    };
    number_format(ctx, &message)
}

fn parse_integral(
    ctx: &mut ExecutionContext<'_>,
    value: Value,
    radix: i32,
    min: i64,
    max: i64,
) -> Result<i64, EmulationError> {
    if value == Value::Null {
        return Err(number_format(ctx, "Cannot parse null string: null"));
    }
    if radix < 2 {
        return Err(number_format(ctx, &format!("radix {radix} less than Character.MIN_RADIX")));
    }
    if radix > 36 {
        return Err(number_format(ctx, &format!("radix {radix} greater than Character.MAX_RADIX")));
    }
    let radix = radix as u32;
    let text = String::from_utf16_lossy(&ctx.string_units(value)?);

    let (negative, digits) = match text.chars().next() {
        Some('-') => (true, &text[1..]),
        Some('+') => (false, &text[1..]),
        _ => (false, text.as_str()),
    };
    if digits.is_empty() {
        return Err(for_input_string(ctx, &text, radix));
    }
    let limit = if negative { -i128::from(min) } else { i128::from(max) };
    let mut result: i128 = 0;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            return Err(for_input_string(ctx, &text, radix));
        };
        result = result * i128::from(radix) + i128::from(digit);
        if result > limit {
            return Err(for_input_string(ctx, &text, radix));
        }
    }
    Ok(if negative { -result } else { result } as i64)
}

fn radix_argument(args: &[Value]) -> Result<i32, EmulationError> {
    match args.get(1) {
        Some(radix) => radix.as_int(),
        None => Ok(10),
    }
}

fn parse_narrow(
    ctx: &mut ExecutionContext<'_>,
    args: &[Value],
    min: i64,
    max: i64,
) -> Result<i64, EmulationError> {
    let radix = radix_argument(args)?;
    let text = arg(args, 0)?;
    let value = parse_integral(ctx, text, radix, i64::from(i32::MIN), i64::from(i32::MAX))?;
    if value < min || value > max {
        let shown = ctx.string_value(text).unwrap_or_default();
        let message = format!("Value out of range. Value:\"{shown}\" Radix:{radix}");
        return Err(number_format(ctx, &message));
    }
    Ok(value)
}

fn is_java_float_syntax(body: &str) -> bool {
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(split) => (&body[..split], Some(&body[split + 1..])),
        None => (body, None),
    };
    let mut parts = mantissa.splitn(2, '.');
    let integer = parts.next().unwrap_or("");
    let fraction = parts.next().unwrap_or("");
    let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits_ok(integer) || !digits_ok(fraction) || integer.len() + fraction.len() == 0 {
        return false;
    }
    match exponent {
        None => true,
        Some(exponent) => {
            let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !exponent.is_empty() && digits_ok(exponent)
        }
    }
}

fn parse_floating(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<f64, EmulationError> {
    if value == Value::Null {
        return Err(ctx.throw_new("java/lang/NullPointerException", None));
    }
    let units = ctx.string_units(value)?;
    let original = String::from_utf16_lossy(&units);
    let trimmed = original.trim_matches(|c: char| u32::from(c) <= 0x20);
    if trimmed.is_empty() {
        return Err(number_format(ctx, "empty String"));
    }
    let (negative, unsigned) = match trimmed.chars().next() {
        Some('-') => (true, &trimmed[1..]),
        Some('+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let magnitude = match unsigned {
        "NaN" => f64::NAN,
        "Infinity" => f64::INFINITY,
        _ => {
            if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
                return Err(EmulationError::Unsupported(format!(
                    "hexadecimal floating-point literal \"{trimmed}\""
                )));
            }
            let body = unsigned
                .strip_suffix(['d', 'D', 'f', 'F'])
                .unwrap_or(unsigned);
            if !is_java_float_syntax(body) {
                return Err(for_input_string(ctx, &original, 10));
            }
            // Validated above, so the standard parser accepts it.
            body.parse::<f64>()
                .map_err(|_| EmulationError::Unsupported(format!("float literal \"{body}\"")))?
        }
    };
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_float32(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<f32, EmulationError> {
    // Parse directly to f32: rounding through f64 first can differ in the last place.
    let wide = parse_floating(ctx, value)?;
    if !wide.is_finite() {
        return Ok(wide as f32);
    }
    let units = ctx.string_units(value)?;
    let text = String::from_utf16_lossy(&units);
    let body = text
        .trim_matches(|c: char| u32::from(c) <= 0x20)
        .trim_end_matches(['d', 'D', 'f', 'F']);
    Ok(body.parse::<f32>().unwrap_or(wide as f32))
}

fn parse_value(ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> Result<Value, EmulationError> {
    let text = arg(args, 0)?;
    Ok(match class {
        INTEGER => {
            let radix = radix_argument(args)?;
            Value::Int(parse_integral(ctx, text, radix, i64::from(i32::MIN), i64::from(i32::MAX))? as i32)
        }
        LONG => {
            let radix = radix_argument(args)?;
            Value::Long(parse_integral(ctx, text, radix, i64::MIN, i64::MAX)?)
        }
        SHORT => Value::Int(parse_narrow(ctx, args, i64::from(i16::MIN), i64::from(i16::MAX))? as i32),
        BYTE => Value::Int(parse_narrow(ctx, args, i64::from(i8::MIN), i64::from(i8::MAX))? as i32),
        FLOAT => Value::Float(parse_float32(ctx, text)?),
        DOUBLE => Value::Double(parse_floating(ctx, text)?),
        BOOLEAN => {
            let parsed = ctx
                .string_value(text)
                .is_some_and(|s| s.eq_ignore_ascii_case("true"));
            Value::Int(i32::from(parsed))
        }
        other => return Err(EmulationError::Unsupported(format!("parsing {other}"))),
    })
}

fn parse(ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    Ok(Some(parse_value(ctx, args, class)?))
}

fn value_of_string(ctx: &mut ExecutionContext<'_>, args: &[Value], class: &'static str) -> NativeResult {
    let value = parse_value(ctx, args, class)?;
    Ok(Some(Value::Ref(ctx.heap_mut().boxed(class, value))))
}

// Integer and Long utilities

fn string_result(ctx: &mut ExecutionContext<'_>, text: &str) -> NativeResult {
    Ok(Some(ctx.new_str(text)))
}

fn to_radix_string(value: i64, radix: u32) -> String {
    let mut magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= u64::from(radix);
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn integer_to_string_radix(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_int(args, 0)?;
    let radix = arg_int(args, 1)?;
    let radix = if (2..=36).contains(&radix) { radix as u32 } else { 10 };
    string_result(ctx, &to_radix_string(i64::from(value), radix))
}

fn integer_to_hex_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_int(args, 0)? as u32;
    string_result(ctx, &format!("{value:x}"))
}

fn integer_to_binary_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_int(args, 0)? as u32;
    string_result(ctx, &format!("{value:b}"))
}

fn integer_to_octal_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_int(args, 0)? as u32;
    string_result(ctx, &format!("{value:o}"))
}

fn integer_bit_count(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.count_ones() as i32)))
}

fn integer_leading_zeros(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.leading_zeros() as i32)))
}

fn integer_trailing_zeros(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.trailing_zeros() as i32)))
}

fn integer_signum(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.signum())))
}

fn integer_sum(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.wrapping_add(arg_int(args, 1)?))))
}

fn integer_max(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.max(arg_int(args, 1)?))))
}

fn integer_min(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_int(args, 0)?.min(arg_int(args, 1)?))))
}

fn long_to_hex_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_long(args, 0)? as u64;
    string_result(ctx, &format!("{value:x}"))
}

fn long_to_binary_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg_long(args, 0)? as u64;
    string_result(ctx, &format!("{value:b}"))
}

fn long_bit_count(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_long(args, 0)?.count_ones() as i32)))
}

fn long_leading_zeros(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_long(args, 0)?.leading_zeros() as i32)))
}

fn long_trailing_zeros(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_long(args, 0)?.trailing_zeros() as i32)))
}

fn long_signum(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_long(args, 0)?.signum() as i32)))
}

fn long_sum(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Long(arg_long(args, 0)?.wrapping_add(arg_long(args, 1)?))))
}

fn long_max(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Long(arg_long(args, 0)?.max(arg_long(args, 1)?))))
}

fn long_min(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Long(arg_long(args, 0)?.min(arg_long(args, 1)?))))
}

// Float and Double utilities

fn float_is_nan(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_float(args, 0)?.is_nan())
}

fn float_box_is_nan(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    boolean(value.as_float()?.is_nan())
}

fn float_is_infinite(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_float(args, 0)?.is_infinite())
}

fn float_is_finite(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_float(args, 0)?.is_finite())
}

fn float_to_int_bits(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(float_bits(arg_float(args, 0)?))))
}

fn float_to_raw_int_bits(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(arg_float(args, 0)?.to_bits() as i32)))
}

fn int_bits_to_float(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Float(f32::from_bits(arg_int(args, 0)? as u32))))
}

fn double_is_nan(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_double(args, 0)?.is_nan())
}

fn double_box_is_nan(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (_, value) = unbox(ctx, arg(args, 0)?)?;
    boolean(value.as_double()?.is_nan())
}

fn double_is_infinite(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_double(args, 0)?.is_infinite())
}

fn double_is_finite(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg_double(args, 0)?.is_finite())
}

fn double_to_long_bits(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Long(double_bits(arg_double(args, 0)?))))
}

fn double_to_raw_long_bits(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Long(arg_double(args, 0)?.to_bits() as i64)))
}

fn long_bits_to_double(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Double(f64::from_bits(arg_long(args, 0)? as u64))))
}

// Character utilities

fn char_arg(args: &[Value]) -> Result<Option<char>, EmulationError> {
    Ok(char::from_u32(u32::from(arg_int(args, 0)? as u16)))
}

fn character_is_digit(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(char_arg(args)?.is_some_and(char::is_numeric))
}

fn character_is_letter(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(char_arg(args)?.is_some_and(char::is_alphabetic))
}

fn character_is_letter_or_digit(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(char_arg(args)?.is_some_and(char::is_alphanumeric))
}

fn character_is_whitespace(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(is_java_whitespace(arg_int(args, 0)? as u16))
}

fn character_is_upper_case(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(char_arg(args)?.is_some_and(char::is_uppercase))
}

fn character_is_lower_case(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(char_arg(args)?.is_some_and(char::is_lowercase))
}

fn character_to_upper_case(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(i32::from(simple_case(arg_int(args, 0)? as u16, true)))))
}

fn character_to_lower_case(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(Value::Int(i32::from(simple_case(arg_int(args, 0)? as u16, false)))))
}

fn character_digit(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let radix = arg_int(args, 1)?;
    let digit = match (char_arg(args)?, u32::try_from(radix)) {
        (Some(c), Ok(radix)) if (2..=36).contains(&radix) => {
            c.to_digit(radix).map_or(-1, |d| d as i32)
        }
        _ => -1,
    };
    Ok(Some(Value::Int(digit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_match_platform() {
        assert_eq!(hash_value(INTEGER, Value::Int(42)).unwrap(), 42);
        assert_eq!(hash_value(BOOLEAN, Value::Int(1)).unwrap(), 1231);
        assert_eq!(hash_value(BOOLEAN, Value::Int(0)).unwrap(), 1237);
        assert_eq!(hash_value(LONG, Value::Long(1 << 32)).unwrap(), 1);
        assert_eq!(hash_value(DOUBLE, Value::Double(1.0)).unwrap(), 1_072_693_248);
        assert_eq!(hash_value(FLOAT, Value::Float(1.0)).unwrap(), 1_065_353_216);
    }

    #[test]
    fn comparisons_follow_wrapper_rules() {
        assert_eq!(compare_values(INTEGER, Value::Int(5), Value::Int(100)).unwrap(), -1);
        assert_eq!(compare_values(SHORT, Value::Int(5), Value::Int(100)).unwrap(), -95);
        assert_eq!(compare_values(BOOLEAN, Value::Int(1), Value::Int(0)).unwrap(), 1);
        assert_eq!(
            compare_values(DOUBLE, Value::Double(-0.0), Value::Double(0.0)).unwrap(),
            -1
        );
        assert_eq!(
            compare_values(DOUBLE, Value::Double(f64::NAN), Value::Double(f64::INFINITY)).unwrap(),
            1
        );
    }

    #[test]
    fn float_syntax() {
        assert!(is_java_float_syntax("1.5"));
        assert!(is_java_float_syntax(".5"));
        assert!(is_java_float_syntax("1."));
        assert!(is_java_float_syntax("1e10"));
        assert!(is_java_float_syntax("1.5E-3"));
        assert!(!is_java_float_syntax("."));
        assert!(!is_java_float_syntax("1e"));
        assert!(!is_java_float_syntax("inf"));
        assert!(!is_java_float_syntax("1_000"));
    }

    #[test]
    fn radix_strings() {
        assert_eq!(to_radix_string(255, 16), "ff");
        assert_eq!(to_radix_string(-10, 2), "-1010");
        assert_eq!(to_radix_string(0, 8), "0");
        assert_eq!(to_radix_string(i64::from(i32::MIN), 10), "-2147483648");
        assert_eq!(primitive_keyword(CHARACTER), Some("char"));
    }
}
