//! `java.lang.String`, `java.lang.StringBuilder` and string concatenation.
//!
//! Strings are UTF-16 code unit vectors on the heap; every operation works on code units
//! exactly as the platform does, so unpaired surrogates pass through untouched.
//!
//! # Emulated Methods
//!
//! ## String
//!
//! | Method | Notes |
//! |--------|-------|
//! | `length`, `isEmpty`, `isBlank`, `charAt`, `codePointAt` | |
//! | `equals`, `equalsIgnoreCase`, `hashCode`, `compareTo`, `compareToIgnoreCase` | |
//! | `indexOf`, `lastIndexOf` | character and string forms, with start index |
//! | `contains`, `startsWith`, `endsWith` | |
//! | `substring`, `concat`, `repeat`, `replace` | `replace` for chars and sequences |
//! | `trim`, `strip`, `toUpperCase`, `toLowerCase` | case mapping uses the root locale |
//! | `toCharArray`, `toString`, `intern` | |
//! | `valueOf` | every primitive, `Object` and `char[]` |
//! | `join(CharSequence, CharSequence[])` | |
//! | `<init>` | empty, copy, `char[]`, `char[]` range, `StringBuilder` |
//!
//! ## StringBuilder
//!
//! | Method | Notes |
//! |--------|-------|
//! | `<init>` | empty, capacity, `String`, `CharSequence` |
//! | `append` | every primitive, `String`, `Object`, `CharSequence`, `char[]` |
//! | `insert(int, String)`, `insert(int, char)` | |
//! | `length`, `charAt`, `setCharAt`, `setLength`, `deleteCharAt`, `delete` | |
//! | `reverse`, `indexOf`, `toString` | `reverse` keeps surrogate pairs intact |
//!
//! ## Concatenation
//!
//! `invokedynamic` call sites bootstrapped by `StringConcatFactory.makeConcat` and
//! `makeConcatWithConstants` are evaluated through [`concat_recipe`] and [`make_concat`].
//! In a recipe, `\u{1}` takes the next argument and `\u{2}` the next static constant.

use crate::{
    classfile::{ClassFile, FieldType, PoolEntry},
    emulation::{
        context::ExecutionContext,
        heap::HeapObject,
        runtime::{arg, arg_int, boolean, NativeRegistry},
        value::Value,
        EmulationError,
    },
};

type NativeResult = Result<Option<Value>, EmulationError>;

const STRING: &str = "java/lang/String";
const BUILDER: &str = "java/lang/StringBuilder";
const BUILDER_RETURN: &str = "Ljava/lang/StringBuilder;";

/// Register the string natives.
pub fn register(registry: &mut NativeRegistry) {
    register_natives!(registry, STRING, [
        ("<init>", "()V", string_init_empty),
        ("<init>", "(Ljava/lang/String;)V", string_init_copy),
        ("<init>", "([C)V", string_init_chars),
        ("<init>", "([CII)V", string_init_char_range),
        ("<init>", "(Ljava/lang/StringBuilder;)V", string_init_copy),
        ("length", "()I", string_length),
        ("isEmpty", "()Z", string_is_empty),
        ("isBlank", "()Z", string_is_blank),
        ("charAt", "(I)C", string_char_at),
        ("codePointAt", "(I)I", string_code_point_at),
        ("equals", "(Ljava/lang/Object;)Z", string_equals),
        ("equalsIgnoreCase", "(Ljava/lang/String;)Z", string_equals_ignore_case),
        ("hashCode", "()I", string_hash_code),
        ("compareTo", "(Ljava/lang/String;)I", string_compare_to),
        ("compareTo", "(Ljava/lang/Object;)I", string_compare_to),
        ("compareToIgnoreCase", "(Ljava/lang/String;)I", string_compare_to_ignore_case),
        ("indexOf", "(I)I", string_index_of_char),
        ("indexOf", "(II)I", string_index_of_char),
        ("indexOf", "(Ljava/lang/String;)I", string_index_of),
        ("indexOf", "(Ljava/lang/String;I)I", string_index_of),
        ("lastIndexOf", "(I)I", string_last_index_of_char),
        ("lastIndexOf", "(Ljava/lang/String;)I", string_last_index_of),
        ("contains", "(Ljava/lang/CharSequence;)Z", string_contains),
        ("startsWith", "(Ljava/lang/String;)Z", string_starts_with),
        ("startsWith", "(Ljava/lang/String;I)Z", string_starts_with),
        ("endsWith", "(Ljava/lang/String;)Z", string_ends_with),
        ("substring", "(I)Ljava/lang/String;", string_substring),
        ("substring", "(II)Ljava/lang/String;", string_substring),
        ("concat", "(Ljava/lang/String;)Ljava/lang/String;", string_concat),
        ("repeat", "(I)Ljava/lang/String;", string_repeat),
        ("replace", "(CC)Ljava/lang/String;", string_replace_char),
        (
            "replace",
            "(Ljava/lang/CharSequence;Ljava/lang/CharSequence;)Ljava/lang/String;",
            string_replace,
        ),
        ("trim", "()Ljava/lang/String;", string_trim),
        ("strip", "()Ljava/lang/String;", string_strip),
        ("toUpperCase", "()Ljava/lang/String;", string_to_upper_case),
        ("toLowerCase", "()Ljava/lang/String;", string_to_lower_case),
        ("toCharArray", "()[C", string_to_char_array),
        ("toString", "()Ljava/lang/String;", string_to_string),
        ("intern", "()Ljava/lang/String;", string_intern),
        ("valueOf", "(I)Ljava/lang/String;", string_value_of_int),
        ("valueOf", "(J)Ljava/lang/String;", string_value_of_long),
        ("valueOf", "(F)Ljava/lang/String;", string_value_of_float),
        ("valueOf", "(D)Ljava/lang/String;", string_value_of_double),
        ("valueOf", "(Z)Ljava/lang/String;", string_value_of_boolean),
        ("valueOf", "(C)Ljava/lang/String;", string_value_of_char),
        ("valueOf", "(Ljava/lang/Object;)Ljava/lang/String;", string_value_of_object),
        ("valueOf", "([C)Ljava/lang/String;", string_value_of_chars),
        (
            "join",
            "(Ljava/lang/CharSequence;[Ljava/lang/CharSequence;)Ljava/lang/String;",
            string_join,
        ),
    ]);

    register_natives!(registry, BUILDER, [
        ("<init>", "()V", builder_init),
        ("<init>", "(I)V", builder_init_capacity),
        ("<init>", "(Ljava/lang/String;)V", builder_init_sequence),
        ("<init>", "(Ljava/lang/CharSequence;)V", builder_init_sequence),
        ("length", "()I", builder_length),
        ("charAt", "(I)C", builder_char_at),
        ("setCharAt", "(IC)V", builder_set_char_at),
        ("setLength", "(I)V", builder_set_length),
        ("toString", "()Ljava/lang/String;", builder_to_string),
        ("indexOf", "(Ljava/lang/String;)I", builder_index_of),
    ]);

    // Chaining methods, all returning the receiver.
    let chained = |parameters: &str| format!("({parameters}){BUILDER_RETURN}");
    register_natives!(registry, BUILDER, [
        ("append", &chained("Ljava/lang/String;"), builder_append_string),
        ("append", &chained("Ljava/lang/Object;"), builder_append_object),
        ("append", &chained("Ljava/lang/CharSequence;"), builder_append_sequence),
        ("append", &chained("[C"), builder_append_chars),
        ("append", &chained("I"), builder_append_int),
        ("append", &chained("J"), builder_append_long),
        ("append", &chained("F"), builder_append_float),
        ("append", &chained("D"), builder_append_double),
        ("append", &chained("Z"), builder_append_boolean),
        ("append", &chained("C"), builder_append_char),
        ("insert", &chained("ILjava/lang/String;"), builder_insert_string),
        ("insert", &chained("IC"), builder_insert_char),
        ("deleteCharAt", &chained("I"), builder_delete_char_at),
        ("delete", &chained("II"), builder_delete),
        ("reverse", &chained(""), builder_reverse),
    ]);
}

// Helpers

fn receiver(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Vec<u16>, EmulationError> {
    let value = arg(args, 0)?;
    ctx.string_units(value)
}

fn string_result(ctx: &mut ExecutionContext<'_>, units: Vec<u16>) -> NativeResult {
    Ok(Some(ctx.new_string(units)))
}

fn int_result(value: i32) -> NativeResult {
    Ok(Some(Value::Int(value)))
}

fn index_error(ctx: &mut ExecutionContext<'_>, message: &str) -> EmulationError {
    ctx.throw_new("java/lang/StringIndexOutOfBoundsException", Some(message))
}

fn check_index(ctx: &mut ExecutionContext<'_>, index: i32, length: usize) -> Result<usize, EmulationError> {
    match usize::try_from(index) {
        Ok(i) if i < length => Ok(i),
        _ => Err(index_error(
            ctx,
            &format!("Index {index} out of bounds for length {length}"),
        )),
    }
}

fn check_range(
    ctx: &mut ExecutionContext<'_>,
    begin: i32,
    end: i32,
    length: usize,
) -> Result<(usize, usize), EmulationError> {
    if begin < 0 || end < begin || end as usize > length {
        return Err(index_error(
            ctx,
            &format!("begin {begin}, end {end}, length {length}"),
        ));
    }
    Ok((begin as usize, end as usize))
}

fn java_hash(units: &[u16]) -> i32 {
    units
        .iter()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(*unit)))
}

fn find(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..].starts_with(needle))
}

fn rfind(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..].starts_with(needle))
}

fn index_result(position: Option<usize>) -> NativeResult {
    int_result(position.map_or(-1, |p| p as i32))
}

fn code_point_units(code_point: i32) -> Vec<u16> {
    match u32::try_from(code_point).ok().and_then(char::from_u32) {
        Some(c) => {
            let mut buffer = [0u16; 2];
            c.encode_utf16(&mut buffer).to_vec()
        }
        // Lone surrogates are valid search targets.
        None if (0xD800..=0xDFFF).contains(&code_point) => vec![code_point as u16],
        None => Vec::new(),
    }
}

/// Single-unit case mapping as `Character.toUpperCase(char)` performs it.
pub(crate) fn simple_case(unit: u16, upper: bool) -> u16 {
    let Some(c) = char::from_u32(u32::from(unit)) else {
        return unit;
    };
    let mapped: Vec<char> = if upper {
        c.to_uppercase().collect()
    } else {
        c.to_lowercase().collect()
    };
    match mapped.as_slice() {
        [single] if u32::from(*single) <= 0xFFFF => u32::from(*single) as u16,
        _ => unit,
    }
}

fn map_case(units: &[u16], upper: bool) -> Vec<u16> {
    match String::from_utf16(units) {
        Ok(text) => {
            let mapped = if upper {
                text.to_uppercase()
            } else {
                text.to_lowercase()
            };
            mapped.encode_utf16().collect()
        }
        Err(_) => units.iter().map(|unit| simple_case(*unit, upper)).collect(),
    }
}

/// `Character.isWhitespace` for a code unit.
pub(crate) fn is_java_whitespace(unit: u16) -> bool {
    match unit {
        0x09..=0x0D | 0x1C..=0x1F => true,
        0x85 | 0xA0 | 0x2007 | 0x202F => false,
        _ => char::from_u32(u32::from(unit)).is_some_and(char::is_whitespace),
    }
}

fn char_array(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<Vec<u16>, EmulationError> {
    let Some(reference) = value.as_reference()? else {
        return Err(ctx.throw_new("java/lang/NullPointerException", None));
    };
    match ctx.heap().get(reference) {
        HeapObject::Array { elements, .. } => elements
            .iter()
            .map(|element| element.as_int().map(|v| v as u16))
            .collect(),
        other => Err(EmulationError::TypeMismatch {
            expected: "char[]",
            found: if matches!(other, HeapObject::String(_)) {
                "java/lang/String"
            } else {
                "object"
            },
        }),
    }
}

fn new_char_array(ctx: &mut ExecutionContext<'_>, units: &[u16]) -> Value {
    let elements = units.iter().map(|unit| Value::Int(i32::from(*unit))).collect();
    Value::Ref(ctx.heap_mut().alloc(HeapObject::Array {
        component: FieldType::Char,
        elements,
    }))
}

fn set_string(ctx: &mut ExecutionContext<'_>, target: Value, units: Vec<u16>) -> NativeResult {
    if let Some(reference) = target.as_reference()? {
        *ctx.heap_mut().get_mut(reference) = HeapObject::String(units);
    }
    Ok(None)
}

// String

fn string_init_empty(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    set_string(ctx, arg(args, 0)?, Vec::new())
}

fn string_init_copy(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let source = arg(args, 1)?;
    let units = ctx.char_sequence(source)?;
    set_string(ctx, arg(args, 0)?, units)
}

fn string_init_chars(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = char_array(ctx, arg(args, 1)?)?;
    set_string(ctx, arg(args, 0)?, units)
}

fn string_init_char_range(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = char_array(ctx, arg(args, 1)?)?;
    let offset = arg_int(args, 2)?;
    let count = arg_int(args, 3)?;
    let (begin, end) = check_range(ctx, offset, offset.saturating_add(count), units.len())?;
    set_string(ctx, arg(args, 0)?, units[begin..end].to_vec())
}

fn string_length(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    int_result(units.len() as i32)
}

fn string_is_empty(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    boolean(units.is_empty())
}

fn string_is_blank(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    boolean(units.iter().all(|unit| is_java_whitespace(*unit)))
}

fn string_char_at(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let index = check_index(ctx, arg_int(args, 1)?, units.len())?;
    int_result(i32::from(units[index]))
}

fn string_code_point_at(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let index = check_index(ctx, arg_int(args, 1)?, units.len())?;
    let code_point = match char::decode_utf16(units[index..].iter().copied()).next() {
        Some(Ok(c)) => u32::from(c) as i32,
        _ => i32::from(units[index]),
    };
    int_result(code_point)
}

fn string_equals(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let equal = match arg(args, 1)?.reference() {
        Some(other) => matches!(ctx.heap().get(other), HeapObject::String(o) if *o == units),
        None => false,
    };
    boolean(equal)
}

fn string_equals_ignore_case(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let other = arg(args, 1)?;
    if other == Value::Null {
        return boolean(false);
    }
    let other = ctx.string_units(other)?;
    boolean(
        units.len() == other.len()
            && units.iter().zip(&other).all(|(a, b)| {
                a == b
                    || simple_case(*a, true) == simple_case(*b, true)
                    || simple_case(*a, false) == simple_case(*b, false)
            }),
    )
}

fn string_hash_code(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    int_result(java_hash(&units))
}

fn compare_units(a: &[u16], b: &[u16]) -> i32 {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return i32::from(*x) - i32::from(*y);
        }
    }
    a.len() as i32 - b.len() as i32
}

fn string_compare_to(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let other = ctx.string_units(arg(args, 1)?)?;
    int_result(compare_units(&units, &other))
}

fn string_compare_to_ignore_case(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let fold = |units: Vec<u16>| -> Vec<u16> {
        units
            .into_iter()
            .map(|unit| simple_case(simple_case(unit, true), false))
            .collect()
    };
    let units = fold(receiver(ctx, args)?);
    let other = fold(ctx.string_units(arg(args, 1)?)?);
    int_result(compare_units(&units, &other))
}

fn start_index(args: &[Value], index: usize) -> Result<usize, EmulationError> {
    match args.get(index) {
        Some(value) => Ok(value.as_int()?.max(0) as usize),
        None => Ok(0),
    }
}

fn string_index_of_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let needle = code_point_units(arg_int(args, 1)?);
    let from = start_index(args, 2)?;
    if needle.is_empty() {
        return int_result(-1);
    }
    index_result(find(&units, &needle, from))
}

fn string_index_of(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let needle = ctx.string_units(arg(args, 1)?)?;
    let from = start_index(args, 2)?;
    if from > units.len() {
        return int_result(if needle.is_empty() { units.len() as i32 } else { -1 });
    }
    index_result(find(&units, &needle, from))
}

fn string_last_index_of_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let needle = code_point_units(arg_int(args, 1)?);
    if needle.is_empty() {
        return int_result(-1);
    }
    index_result(rfind(&units, &needle))
}

fn string_last_index_of(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let needle = ctx.string_units(arg(args, 1)?)?;
    index_result(rfind(&units, &needle))
}

fn string_contains(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let needle = ctx.char_sequence(arg(args, 1)?)?;
    boolean(find(&units, &needle, 0).is_some())
}

fn string_starts_with(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let prefix = ctx.string_units(arg(args, 1)?)?;
    let offset = match args.get(2) {
        Some(value) => value.as_int()?,
        None => 0,
    };
    let Ok(offset) = usize::try_from(offset) else {
        return boolean(false);
    };
    boolean(units.get(offset..).is_some_and(|rest| rest.starts_with(&prefix)))
}

fn string_ends_with(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let suffix = ctx.string_units(arg(args, 1)?)?;
    boolean(units.ends_with(&suffix))
}

fn string_substring(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let begin = arg_int(args, 1)?;
    let end = match args.get(2) {
        Some(value) => value.as_int()?,
        None => units.len() as i32,
    };
    let (begin, end) = check_range(ctx, begin, end, units.len())?;
    if begin == 0 && end == units.len() {
        return Ok(Some(arg(args, 0)?));
    }
    string_result(ctx, units[begin..end].to_vec())
}

fn string_concat(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let mut units = receiver(ctx, args)?;
    let other = ctx.string_units(arg(args, 1)?)?;
    if other.is_empty() {
        return Ok(Some(arg(args, 0)?));
    }
    units.extend(other);
    string_result(ctx, units)
}

fn string_repeat(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let count = arg_int(args, 1)?;
    if count < 0 {
        let message = format!("count is negative: {count}");
        return Err(ctx.throw_new("java/lang/IllegalArgumentException", Some(&message)));
    }
    if units.len().saturating_mul(count as usize) > i32::MAX as usize {
        return Err(ctx.throw_new("java/lang/OutOfMemoryError", Some("Repeating string is too long")));
    }
    string_result(ctx, units.repeat(count as usize))
}

fn string_replace_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let from = arg_int(args, 1)? as u16;
    let to = arg_int(args, 2)? as u16;
    if !units.contains(&from) {
        return Ok(Some(arg(args, 0)?));
    }
    let replaced = units
        .into_iter()
        .map(|unit| if unit == from { to } else { unit })
        .collect();
    string_result(ctx, replaced)
}

fn string_replace(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    let target = ctx.char_sequence(arg(args, 1)?)?;
    let replacement = ctx.char_sequence(arg(args, 2)?)?;

    let mut out = Vec::with_capacity(units.len());
    if target.is_empty() {
        out.extend_from_slice(&replacement);
        for unit in &units {
            out.push(*unit);
            out.extend_from_slice(&replacement);
        }
        return string_result(ctx, out);
    }
    let mut position = 0;
    while let Some(found) = find(&units, &target, position) {
        out.extend_from_slice(&units[position..found]);
        out.extend_from_slice(&replacement);
        position = found + target.len();
    }
    if position == 0 {
        return Ok(Some(arg(args, 0)?));
    }
    out.extend_from_slice(&units[position..]);
    string_result(ctx, out)
}

fn trimmed(ctx: &mut ExecutionContext<'_>, args: &[Value], strip: fn(u16) -> bool) -> NativeResult {
    let units = receiver(ctx, args)?;
    let start = units.iter().position(|u| !strip(*u)).unwrap_or(units.len());
    let end = units.iter().rposition(|u| !strip(*u)).map_or(start, |p| p + 1);
    if start == 0 && end == units.len() {
        return Ok(Some(arg(args, 0)?));
    }
    string_result(ctx, units[start..end].to_vec())
}

fn string_trim(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    trimmed(ctx, args, |unit| unit <= 0x20)
}

fn string_strip(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    trimmed(ctx, args, is_java_whitespace)
}

fn string_to_upper_case(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    string_result(ctx, map_case(&units, true))
}

fn string_to_lower_case(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    string_result(ctx, map_case(&units, false))
}

fn string_to_char_array(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = receiver(ctx, args)?;
    Ok(Some(new_char_array(ctx, &units)))
}

fn string_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    receiver(ctx, args)?;
    Ok(Some(arg(args, 0)?))
}

fn string_intern(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    receiver(ctx, args)?;
    match arg(args, 0)?.reference() {
        Some(reference) => Ok(Some(Value::Ref(ctx.heap_mut().intern_existing(reference)))),
        None => Ok(Some(Value::Null)),
    }
}

fn value_of(ctx: &mut ExecutionContext<'_>, args: &[Value], declared: FieldType) -> NativeResult {
    let units = ctx.to_java_string(arg(args, 0)?, &declared)?;
    string_result(ctx, units)
}

fn string_value_of_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Int)
}

fn string_value_of_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Long)
}

fn string_value_of_float(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Float)
}

fn string_value_of_double(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Double)
}

fn string_value_of_boolean(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Boolean)
}

fn string_value_of_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    value_of(ctx, args, FieldType::Char)
}

fn string_value_of_object(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg(args, 0)?;
    if let Some(reference) = value.reference() {
        if matches!(ctx.heap().get(reference), HeapObject::String(_)) {
            return Ok(Some(value));
        }
    }
    value_of(ctx, args, FieldType::Object("java/lang/Object".into()))
}

fn string_value_of_chars(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = char_array(ctx, arg(args, 0)?)?;
    string_result(ctx, units)
}

fn string_join(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let delimiter = ctx.char_sequence(arg(args, 0)?)?;
    let Some(array) = arg(args, 1)?.as_reference()? else {
        return Err(ctx.throw_new("java/lang/NullPointerException", None));
    };
    let elements = match ctx.heap().get(array) {
        HeapObject::Array { elements, .. } => elements.clone(),
        _ => return Err(EmulationError::Unsupported("String.join over a non-array".into())),
    };
    let mut out = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        if index > 0 {
            out.extend_from_slice(&delimiter);
        }
        if element == Value::Null {
            out.extend("null".encode_utf16());
        } else {
            out.extend(ctx.char_sequence(element)?);
        }
    }
    string_result(ctx, out)
}

// StringBuilder

fn with_builder<R>(
    ctx: &mut ExecutionContext<'_>,
    args: &[Value],
    f: impl FnOnce(&mut Vec<u16>) -> R,
) -> Result<R, EmulationError> {
    let this = arg(args, 0)?;
    let Some(reference) = this.as_reference()? else {
        return Err(ctx.throw_new("java/lang/NullPointerException", None));
    };
    match ctx.heap_mut().get_mut(reference) {
        HeapObject::StringBuilder(units) => Ok(f(units)),
        _ => Err(EmulationError::type_mismatch(BUILDER, &this)),
    }
}

fn builder_units(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> Result<Vec<u16>, EmulationError> {
    with_builder(ctx, args, |units| units.clone())
}

fn builder_init(_ctx: &mut ExecutionContext<'_>, _args: &[Value]) -> NativeResult {
    Ok(None)
}

fn builder_init_capacity(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let capacity = arg_int(args, 1)?;
    if capacity < 0 {
        let message = capacity.to_string();
        return Err(ctx.throw_new("java/lang/NegativeArraySizeException", Some(&message)));
    }
    Ok(None)
}

fn builder_init_sequence(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let initial = ctx.char_sequence(arg(args, 1)?)?;
    with_builder(ctx, args, |units| *units = initial)?;
    Ok(None)
}

fn builder_length(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let length = with_builder(ctx, args, |units| units.len())?;
    int_result(length as i32)
}

fn builder_char_at(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = builder_units(ctx, args)?;
    let index = check_index(ctx, arg_int(args, 1)?, units.len())?;
    int_result(i32::from(units[index]))
}

fn builder_set_char_at(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let length = with_builder(ctx, args, |units| units.len())?;
    let index = check_index(ctx, arg_int(args, 1)?, length)?;
    let unit = arg_int(args, 2)? as u16;
    with_builder(ctx, args, |units| units[index] = unit)?;
    Ok(None)
}

fn builder_set_length(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let length = arg_int(args, 1)?;
    if length < 0 {
        return Err(index_error(ctx, &format!("String index out of range: {length}")));
    }
    with_builder(ctx, args, |units| units.resize(length as usize, 0))?;
    Ok(None)
}

fn builder_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = builder_units(ctx, args)?;
    string_result(ctx, units)
}

fn builder_index_of(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let units = builder_units(ctx, args)?;
    let needle = ctx.string_units(arg(args, 1)?)?;
    index_result(find(&units, &needle, 0))
}

fn append_units(ctx: &mut ExecutionContext<'_>, args: &[Value], text: Vec<u16>) -> NativeResult {
    with_builder(ctx, args, |units| units.extend(text))?;
    Ok(Some(arg(args, 0)?))
}

fn append_value(ctx: &mut ExecutionContext<'_>, args: &[Value], declared: FieldType) -> NativeResult {
    let text = ctx.to_java_string(arg(args, 1)?, &declared)?;
    append_units(ctx, args, text)
}

fn builder_append_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Object(STRING.into()))
}

fn builder_append_object(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Object("java/lang/Object".into()))
}

fn builder_append_sequence(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg(args, 1)?;
    let text = if value == Value::Null {
        "null".encode_utf16().collect()
    } else {
        ctx.char_sequence(value)?
    };
    append_units(ctx, args, text)
}

fn builder_append_chars(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let text = char_array(ctx, arg(args, 1)?)?;
    append_units(ctx, args, text)
}

fn builder_append_int(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Int)
}

fn builder_append_long(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Long)
}

fn builder_append_float(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Float)
}

fn builder_append_double(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Double)
}

fn builder_append_boolean(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Boolean)
}

fn builder_append_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    append_value(ctx, args, FieldType::Char)
}

fn insert_units(ctx: &mut ExecutionContext<'_>, args: &[Value], text: Vec<u16>) -> NativeResult {
    let offset = arg_int(args, 1)?;
    let length = with_builder(ctx, args, |units| units.len())?;
    if offset < 0 || offset as usize > length {
        return Err(index_error(ctx, &format!("offset {offset}, length {length}")));
    }
    with_builder(ctx, args, |units| {
        units.splice(offset as usize..offset as usize, text);
    })?;
    Ok(Some(arg(args, 0)?))
}

fn builder_insert_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let text = ctx.to_java_string(arg(args, 2)?, &FieldType::Object(STRING.into()))?;
    insert_units(ctx, args, text)
}

fn builder_insert_char(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let unit = arg_int(args, 2)? as u16;
    insert_units(ctx, args, vec![unit])
}

fn builder_delete_char_at(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let length = with_builder(ctx, args, |units| units.len())?;
    let index = check_index(ctx, arg_int(args, 1)?, length)?;
    with_builder(ctx, args, |units| units.remove(index))?;
    Ok(Some(arg(args, 0)?))
}

fn builder_delete(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let length = with_builder(ctx, args, |units| units.len())?;
    let start = arg_int(args, 1)?;
    let end = arg_int(args, 2)?.min(length as i32);
    let (start, end) = check_range(ctx, start, end, length)?;
    with_builder(ctx, args, |units| {
        units.drain(start..end);
    })?;
    Ok(Some(arg(args, 0)?))
}

fn builder_reverse(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    with_builder(ctx, args, |units| {
        units.reverse();
        // Restore surrogate pairs, which the reversal swapped.
        let mut i = 0;
        while i + 1 < units.len() {
            let (low, high) = (units[i], units[i + 1]);
            if (0xDC00..=0xDFFF).contains(&low) && (0xD800..=0xDBFF).contains(&high) {
                units.swap(i, i + 1);
                i += 2;
            } else {
                i += 1;
            }
        }
    })?;
    Ok(Some(arg(args, 0)?))
}

// Concatenation

/// A decoded `StringConcatFactory` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConcatRecipe {
    /// The recipe; `None` for `makeConcat`, which concatenates its arguments.
    recipe: Option<Vec<u16>>,
    /// Static constants substituted for `\u{2}`.
    constants: Vec<Vec<u16>>,
}

fn pool_error(error: &crate::Error) -> EmulationError {
    EmulationError::Unsupported(format!("bootstrap arguments: {error}"))
}

fn constant_text(class: &ClassFile, index: u16) -> Result<Vec<u16>, EmulationError> {
    let pool = &class.pool;
    let text = match pool.get(index).map_err(|e| pool_error(&e))? {
        PoolEntry::String(utf8) => pool.get_utf8(*utf8).map_err(|e| pool_error(&e))?.to_string(),
        PoolEntry::Integer(v) => v.to_string(),
        PoolEntry::Long(v) => v.to_string(),
        PoolEntry::Float(v) => super::float_to_string(*v),
        PoolEntry::Double(v) => super::double_to_string(*v),
        other => {
            return Err(EmulationError::Unsupported(format!(
                "concatenation constant {other:?}"
            )))
        }
    };
    Ok(text.encode_utf16().collect())
}

/// Decode the bootstrap method of an `invokedynamic` call site if it is a string
/// concatenation. Returns `None` for every other bootstrap.
pub(crate) fn concat_recipe(
    class: &ClassFile,
    bootstrap: u16,
) -> Result<Option<ConcatRecipe>, EmulationError> {
    let Some(method) = class.bootstrap_methods.get(usize::from(bootstrap)) else {
        return Err(EmulationError::Unsupported(format!(
            "missing bootstrap method {bootstrap} in {}",
            class.name
        )));
    };
    let reference = match class.pool.get(method.handle).map_err(|e| pool_error(&e))? {
        PoolEntry::MethodHandle { reference, .. } => *reference,
        _ => return Ok(None),
    };
    let (factory, _) = class.pool.get_member(reference).map_err(|e| pool_error(&e))?;
    if factory.owner != "java/lang/invoke/StringConcatFactory" {
        return Ok(None);
    }
    match factory.name.as_str() {
        "makeConcat" => Ok(Some(ConcatRecipe {
            recipe: None,
            constants: Vec::new(),
        })),
        "makeConcatWithConstants" => {
            let Some((first, rest)) = method.arguments.split_first() else {
                return Ok(None);
            };
            let recipe = constant_text(class, *first)?;
            let constants = rest
                .iter()
                .map(|index| constant_text(class, *index))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(ConcatRecipe {
                recipe: Some(recipe),
                constants,
            }))
        }
        _ => Ok(None),
    }
}

fn concat_argument(
    ctx: &mut ExecutionContext<'_>,
    parameters: &[FieldType],
    args: &[Value],
    next: &mut usize,
    out: &mut Vec<u16>,
) -> Result<(), EmulationError> {
    let (Some(value), Some(declared)) = (args.get(*next), parameters.get(*next)) else {
        return Err(EmulationError::StackUnderflow);
    };
    *next += 1;
    out.extend(ctx.to_java_string(*value, declared)?);
    Ok(())
}

/// Evaluate a concatenation call site.
pub(crate) fn make_concat(
    ctx: &mut ExecutionContext<'_>,
    recipe: &ConcatRecipe,
    parameters: &[FieldType],
    args: &[Value],
) -> Result<Value, EmulationError> {
    let mut out = Vec::new();
    let mut next_argument = 0usize;
    let mut next_constant = 0usize;
    match &recipe.recipe {
        None => {
            for _ in 0..args.len() {
                concat_argument(ctx, parameters, args, &mut next_argument, &mut out)?;
            }
        }
        Some(units) => {
            for unit in units {
                match unit {
                    1 => concat_argument(ctx, parameters, args, &mut next_argument, &mut out)?,
                    2 => {
                        let constant = recipe.constants.get(next_constant).ok_or_else(|| {
                            EmulationError::Unsupported("concatenation constant missing".into())
                        })?;
                        next_constant += 1;
                        out.extend_from_slice(constant);
                    }
                    other => out.push(*other),
                }
            }
        }
    }
    Ok(ctx.new_string(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_platform() {
        let units: Vec<u16> = "hello".encode_utf16().collect();
        assert_eq!(java_hash(&units), 99_162_322);
        assert_eq!(java_hash(&[]), 0);
    }

    #[test]
    fn search_helpers() {
        let hay: Vec<u16> = "abcabc".encode_utf16().collect();
        let needle: Vec<u16> = "bc".encode_utf16().collect();
        assert_eq!(find(&hay, &needle, 0), Some(1));
        assert_eq!(find(&hay, &needle, 2), Some(4));
        assert_eq!(find(&hay, &needle, 5), None);
        assert_eq!(rfind(&hay, &needle), Some(4));
        assert_eq!(find(&hay, &[], 3), Some(3));
    }

    #[test]
    fn compare_follows_first_difference() {
        let a: Vec<u16> = "apple".encode_utf16().collect();
        let b: Vec<u16> = "apricot".encode_utf16().collect();
        assert_eq!(compare_units(&a, &b), i32::from(b'p') - i32::from(b'r'));
        assert_eq!(compare_units(&a[..2], &a), -3);
    }

    #[test]
    fn whitespace_excludes_non_breaking_space() {
        assert!(is_java_whitespace(u16::from(b' ')));
        assert!(is_java_whitespace(0x2003));
        assert!(!is_java_whitespace(0x00A0));
        assert_eq!(simple_case(u16::from(b'a'), true), u16::from(b'A'));
        // U+00DF has no single-unit upper case.
        assert_eq!(simple_case(0x00DF, true), 0x00DF);
    }
}
