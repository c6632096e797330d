//! `java.lang.Object`, `Class`, `Enum`, `Throwable`, `System` and `java.util.Objects`.
//!
//! # Emulated Methods
//!
//! | Class | Methods |
//! |-------|---------|
//! | `Object` | `<init>`, `equals`, `hashCode`, `toString`, `getClass`, `clone` |
//! | `Class` | `getName`, `getSimpleName`, `toString`, `isInstance`, `isAssignableFrom`, `isArray`, `isPrimitive`, `isInterface`, `desiredAssertionStatus` |
//! | `Enum` | `<init>`, `name`, `ordinal`, `toString`, `equals`, `hashCode`, `compareTo`, `getDeclaringClass`, `valueOf` |
//! | `Throwable` | `<init>` (all four public forms), `getMessage`, `getLocalizedMessage`, `getCause`, `initCause`, `toString`, `fillInStackTrace`, `addSuppressed` |
//! | `AssertionError` | `<init>(Object)` |
//! | `System` | `arraycopy`, `identityHashCode` |
//! | `Objects` | `equals`, `hashCode`, `hash`, `toString`, `isNull`, `nonNull`, `requireNonNull`, `requireNonNullElse` |
//!
//! Identity hash codes are derived from the heap handle, so they are stable within a run
//! and differ between objects, but they never match what a real JVM would print.
//! `Class.desiredAssertionStatus` answers `false`, as a JVM started without `-ea` does.

use crate::{
    classfile::{AccessFlags, FieldType, MemberReference},
    emulation::{
        context::{throwable_cause, throwable_message, ExecutionContext, InvokeKind},
        heap::{HeapObject, HeapRef},
        runtime::{arg, arg_int, boolean, NativeRegistry},
        value::Value,
        EmulationError,
    },
};

type NativeResult = Result<Option<Value>, EmulationError>;

/// Register the `java.lang` core natives.
pub fn register(registry: &mut NativeRegistry) {
    register_natives!(registry, "java/lang/Object", [
        ("<init>", "()V", object_init),
        ("equals", "(Ljava/lang/Object;)Z", object_equals),
        ("hashCode", "()I", object_hash_code),
        ("toString", "()Ljava/lang/String;", object_to_string),
        ("getClass", "()Ljava/lang/Class;", object_get_class),
        ("clone", "()Ljava/lang/Object;", object_clone),
    ]);

    register_natives!(registry, "java/lang/Class", [
        ("getName", "()Ljava/lang/String;", class_get_name),
        ("getSimpleName", "()Ljava/lang/String;", class_get_simple_name),
        ("toString", "()Ljava/lang/String;", class_to_string),
        ("isInstance", "(Ljava/lang/Object;)Z", class_is_instance),
        ("isAssignableFrom", "(Ljava/lang/Class;)Z", class_is_assignable_from),
        ("isArray", "()Z", class_is_array),
        ("isPrimitive", "()Z", class_is_primitive),
        ("isInterface", "()Z", class_is_interface),
        ("desiredAssertionStatus", "()Z", class_desired_assertion_status),
    ]);

    register_natives!(registry, "java/lang/Enum", [
        ("<init>", "(Ljava/lang/String;I)V", enum_init),
        ("name", "()Ljava/lang/String;", enum_name),
        ("toString", "()Ljava/lang/String;", enum_name),
        ("ordinal", "()I", enum_ordinal),
        ("equals", "(Ljava/lang/Object;)Z", object_equals),
        ("hashCode", "()I", object_hash_code),
        ("compareTo", "(Ljava/lang/Enum;)I", enum_compare_to),
        ("compareTo", "(Ljava/lang/Object;)I", enum_compare_to),
        ("getDeclaringClass", "()Ljava/lang/Class;", enum_get_declaring_class),
        ("valueOf", "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;", enum_value_of),
    ]);

    register_natives!(registry, "java/lang/Throwable", [
        ("<init>", "()V", throwable_init),
        ("<init>", "(Ljava/lang/String;)V", throwable_init),
        ("<init>", "(Ljava/lang/String;Ljava/lang/Throwable;)V", throwable_init),
        ("<init>", "(Ljava/lang/Throwable;)V", throwable_init_cause),
        ("getMessage", "()Ljava/lang/String;", throwable_get_message),
        ("getLocalizedMessage", "()Ljava/lang/String;", throwable_get_localized_message),
        ("getCause", "()Ljava/lang/Throwable;", throwable_get_cause),
        ("initCause", "(Ljava/lang/Throwable;)Ljava/lang/Throwable;", throwable_init_cause_method),
        ("toString", "()Ljava/lang/String;", throwable_to_string),
        ("fillInStackTrace", "()Ljava/lang/Throwable;", return_receiver),
        ("addSuppressed", "(Ljava/lang/Throwable;)V", ignore),
    ]);

    register_natives!(registry, "java/lang/AssertionError", [
        ("<init>", "(Ljava/lang/Object;)V", assertion_error_init),
    ]);

    register_natives!(registry, "java/lang/System", [
        ("arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V", system_arraycopy),
        ("identityHashCode", "(Ljava/lang/Object;)I", system_identity_hash_code),
    ]);

    register_natives!(registry, "java/util/Objects", [
        ("equals", "(Ljava/lang/Object;Ljava/lang/Object;)Z", objects_equals),
        ("hashCode", "(Ljava/lang/Object;)I", objects_hash_code),
        ("hash", "([Ljava/lang/Object;)I", objects_hash),
        ("toString", "(Ljava/lang/Object;)Ljava/lang/String;", objects_to_string),
        (
            "toString",
            "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/String;",
            objects_to_string_default,
        ),
        ("isNull", "(Ljava/lang/Object;)Z", objects_is_null),
        ("nonNull", "(Ljava/lang/Object;)Z", objects_non_null),
        ("requireNonNull", "(Ljava/lang/Object;)Ljava/lang/Object;", objects_require_non_null),
        (
            "requireNonNull",
            "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
            objects_require_non_null,
        ),
        (
            "requireNonNullElse",
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
            objects_require_non_null_else,
        ),
    ]);
}

fn enum_name_field() -> MemberReference {
    MemberReference::new("java/lang/Enum", "name", "Ljava/lang/String;")
}

fn enum_ordinal_field() -> MemberReference {
    MemberReference::new("java/lang/Enum", "ordinal", "I")
}

fn java_name(internal: &str) -> String {
    internal.replace('/', ".")
}

fn null_pointer(ctx: &mut ExecutionContext<'_>, message: Option<&str>) -> EmulationError {
    ctx.throw_new("java/lang/NullPointerException", message)
}

fn string_result(ctx: &mut ExecutionContext<'_>, text: &str) -> NativeResult {
    Ok(Some(ctx.new_str(text)))
}

fn this_ref(
    ctx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<HeapRef, EmulationError> {
    match arg(args, 0)?.as_reference()? {
        Some(reference) => Ok(reference),
        None => Err(null_pointer(ctx, None)),
    }
}

fn hash_code(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<i32, EmulationError> {
    if value == Value::Null {
        return Ok(0);
    }
    let member = MemberReference::new("java/lang/Object", "hashCode", "()I");
    match ctx.invoke(InvokeKind::Virtual, &member, vec![value])? {
        Some(Value::Int(hash)) => Ok(hash),
        other => Err(EmulationError::type_mismatch("int", &other.unwrap_or(Value::Null))),
    }
}

fn return_receiver(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    Ok(Some(arg(args, 0)?))
}

fn ignore(_ctx: &mut ExecutionContext<'_>, _args: &[Value]) -> NativeResult {
    Ok(None)
}

// Object

fn object_init(_ctx: &mut ExecutionContext<'_>, _args: &[Value]) -> NativeResult {
    Ok(None)
}

fn object_equals(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg(args, 0)? == arg(args, 1)?)
}

fn object_hash_code(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    Ok(Some(Value::Int(this.identity_hash())))
}

fn object_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = arg(args, 0)?;
    let class = ctx.runtime_class(this).unwrap_or_default();
    let hash = hash_code(ctx, this)?;
    string_result(ctx, &format!("{}@{:x}", java_name(&class), hash))
}

fn object_get_class(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let class = ctx.heap().get(this).class_name();
    Ok(Some(ctx.class_object(&class)))
}

fn object_clone(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let object = ctx.heap().get(this).clone();
    let cloneable = match &object {
        HeapObject::Array { .. } => true,
        HeapObject::Instance { class, .. } => ctx.universe().is_subtype(class, "java/lang/Cloneable"),
        _ => false,
    };
    if !cloneable {
        let message = java_name(&object.class_name());
        return Err(ctx.throw_new("java/lang/CloneNotSupportedException", Some(&message)));
    }
    Ok(Some(Value::Ref(ctx.heap_mut().alloc(object))))
}

// Class

fn class_name(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<String, EmulationError> {
    let Some(reference) = value.as_reference()? else {
        return Err(null_pointer(ctx, None));
    };
    match ctx.heap().get(reference) {
        HeapObject::Class(name) => Ok(name.clone()),
        _ => Err(EmulationError::type_mismatch("java/lang/Class", &value)),
    }
}

fn is_primitive_name(name: &str) -> bool {
    matches!(
        name,
        "int" | "long" | "short" | "byte" | "char" | "float" | "double" | "boolean" | "void"
    )
}

fn simple_name(name: &str) -> String {
    if name.starts_with('[') {
        return match FieldType::parse(name) {
            Ok(FieldType::Array(component)) => {
                let inner = component
                    .class_name()
                    .unwrap_or_else(|| component.java_name());
                format!("{}[]", simple_name(&inner))
            }
            _ => name.to_string(),
        };
    }
    let unqualified = name.rsplit('/').next().unwrap_or(name);
    let nested = unqualified.rsplit('$').next().unwrap_or(unqualified);
    // Anonymous classes have an empty simple name.
    if nested.chars().all(|c| c.is_ascii_digit()) && nested != unqualified {
        String::new()
    } else {
        nested.to_string()
    }
}

fn class_get_name(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    string_result(ctx, &java_name(&name))
}

fn class_get_simple_name(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    string_result(ctx, &simple_name(&name))
}

fn class_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    let text = if is_primitive_name(&name) {
        name
    } else if ctx.universe().class(&name).is_some_and(|c| c.is_interface()) {
        format!("interface {}", java_name(&name))
    } else {
        format!("class {}", java_name(&name))
    };
    string_result(ctx, &text)
}

fn class_is_instance(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    boolean(ctx.is_instance(arg(args, 1)?, &name))
}

fn class_is_assignable_from(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    let other = class_name(ctx, arg(args, 1)?)?;
    if is_primitive_name(&name) || is_primitive_name(&other) {
        return boolean(name == other);
    }
    boolean(ctx.universe().is_subtype(&other, &name))
}

fn class_is_array(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    boolean(name.starts_with('['))
}

fn class_is_primitive(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    boolean(is_primitive_name(&name))
}

fn class_is_interface(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let name = class_name(ctx, arg(args, 0)?)?;
    let interface = ctx.universe().class(&name).is_some_and(|c| c.is_interface())
        || matches!(
            name.as_str(),
            "java/lang/Comparable" | "java/lang/CharSequence" | "java/io/Serializable" | "java/lang/Cloneable"
        );
    boolean(interface)
}

fn class_desired_assertion_status(_ctx: &mut ExecutionContext<'_>, _args: &[Value]) -> NativeResult {
    boolean(false)
}

// Enum

fn enum_init(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let name = arg(args, 1)?;
    let ordinal = arg_int(args, 2)?;
    ctx.set_instance_field(this, enum_name_field(), name);
    ctx.set_instance_field(this, enum_ordinal_field(), Value::Int(ordinal));
    Ok(None)
}

fn enum_name(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    Ok(Some(ctx.instance_field(this, &enum_name_field()).unwrap_or(Value::Null)))
}

fn enum_ordinal(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    Ok(Some(ctx.instance_field(this, &enum_ordinal_field()).unwrap_or(Value::Int(0))))
}

fn declaring_enum(ctx: &ExecutionContext<'_>, class: &str) -> String {
    // Constants with bodies are anonymous subclasses of the enum class.
    match ctx.universe().superclass(class) {
        Some(parent) if parent != "java/lang/Enum" => parent.to_string(),
        _ => class.to_string(),
    }
}

fn enum_compare_to(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let Some(other) = arg(args, 1)?.as_reference()? else {
        return Err(null_pointer(ctx, None));
    };
    let this_class = declaring_enum(ctx, &ctx.heap().get(this).class_name());
    let other_class = declaring_enum(ctx, &ctx.heap().get(other).class_name());
    if this_class != other_class {
        let message = format!(
            "class {} cannot be cast to class {}",
            java_name(&other_class),
            java_name(&this_class)
        );
        return Err(ctx.throw_new("java/lang/ClassCastException", Some(&message)));
    }
    Ok(Some(Value::Int(ordinal_of(ctx, this) - ordinal_of(ctx, other))))
}

fn ordinal_of(ctx: &ExecutionContext<'_>, constant: HeapRef) -> i32 {
    ctx.instance_field(constant, &enum_ordinal_field())
        .and_then(|v| v.as_int().ok())
        .unwrap_or(0)
}

fn enum_get_declaring_class(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let class = declaring_enum(ctx, &ctx.heap().get(this).class_name());
    Ok(Some(ctx.class_object(&class)))
}

fn enum_value_of(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let class = class_name(ctx, arg(args, 0)?)?;
    let name = arg(args, 1)?;
    if name == Value::Null {
        return Err(null_pointer(ctx, Some("Name is null")));
    }
    let name = ctx.string_units(name)?;
    let name = String::from_utf16_lossy(&name);

    let universe = ctx.universe();
    let structure = universe
        .class(&class)
        .ok_or_else(|| EmulationError::ClassNotFound(class.clone()))?;
    let descriptor = format!("L{class};");
    let constant = structure
        .fields
        .iter()
        .find(|f| {
            f.access.contains(AccessFlags::ENUM | AccessFlags::STATIC)
                && f.descriptor == descriptor
                && f.name == name
        })
        .map(|f| structure.field_reference(f));
    match constant {
        Some(field) => Ok(Some(ctx.get_static(&field)?)),
        None => {
            let message = format!(
                "No enum constant {}.{name}",
                java_name(&class).replace('$', ".")
            );
            Err(ctx.throw_new("java/lang/IllegalArgumentException", Some(&message)))
        }
    }
}

// Throwable

fn throwable_init(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    if let Some(message) = args.get(1) {
        ctx.set_instance_field(this, throwable_message(), *message);
    }
    if let Some(cause) = args.get(2) {
        ctx.set_instance_field(this, throwable_cause(), *cause);
    }
    Ok(None)
}

fn throwable_init_cause(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let cause = arg(args, 1)?;
    let message = if cause == Value::Null {
        Value::Null
    } else {
        let text = ctx.to_java_string(cause, &FieldType::Object("java/lang/Throwable".into()))?;
        ctx.new_string(text)
    };
    ctx.set_instance_field(this, throwable_message(), message);
    ctx.set_instance_field(this, throwable_cause(), cause);
    Ok(None)
}

fn throwable_get_message(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    Ok(Some(ctx.instance_field(this, &throwable_message()).unwrap_or(Value::Null)))
}

fn throwable_get_localized_message(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let member = MemberReference::new("java/lang/Throwable", "getMessage", "()Ljava/lang/String;");
    ctx.invoke(InvokeKind::Virtual, &member, vec![arg(args, 0)?])
}

fn throwable_get_cause(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    Ok(Some(ctx.instance_field(this, &throwable_cause()).unwrap_or(Value::Null)))
}

fn throwable_init_cause_method(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let cause = arg(args, 1)?;
    if ctx.instance_field(this, &throwable_cause()).is_some() {
        return Err(ctx.throw_new("java/lang/IllegalStateException", Some("Can't overwrite cause")));
    }
    if cause == Value::Ref(this) {
        return Err(ctx.throw_new(
            "java/lang/IllegalArgumentException",
            Some("Self-causation not permitted"),
        ));
    }
    ctx.set_instance_field(this, throwable_cause(), cause);
    Ok(Some(Value::Ref(this)))
}

fn throwable_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let class = java_name(&ctx.heap().get(this).class_name());
    let member = MemberReference::new(
        "java/lang/Throwable",
        "getLocalizedMessage",
        "()Ljava/lang/String;",
    );
    let message = ctx
        .invoke(InvokeKind::Virtual, &member, vec![Value::Ref(this)])?
        .unwrap_or(Value::Null);
    if message == Value::Null {
        return string_result(ctx, &class);
    }
    let mut units: Vec<u16> = format!("{class}: ").encode_utf16().collect();
    units.extend(ctx.string_units(message)?);
    Ok(Some(ctx.new_string(units)))
}

fn assertion_error_init(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let this = this_ref(ctx, args)?;
    let detail = arg(args, 1)?;
    let text = ctx.to_java_string(detail, &FieldType::Object("java/lang/Object".into()))?;
    let message = ctx.new_string(text);
    ctx.set_instance_field(this, throwable_message(), message);
    if ctx.is_instance(detail, "java/lang/Throwable") {
        ctx.set_instance_field(this, throwable_cause(), detail);
    }
    Ok(None)
}

// System

fn system_arraycopy(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (Some(source), Some(target)) = (arg(args, 0)?.as_reference()?, arg(args, 2)?.as_reference()?)
    else {
        return Err(null_pointer(ctx, None));
    };
    let source_pos = arg_int(args, 1)?;
    let target_pos = arg_int(args, 3)?;
    let length = arg_int(args, 4)?;

    let (source_component, source_elements) = match ctx.heap().get(source) {
        HeapObject::Array { component, elements } => (component.clone(), elements.clone()),
        other => {
            let message = format!("arraycopy: source type {} is not an array", java_name(&other.class_name()));
            return Err(ctx.throw_new("java/lang/ArrayStoreException", Some(&message)));
        }
    };
    let (target_component, target_len) = match ctx.heap().get(target) {
        HeapObject::Array { component, elements } => (component.clone(), elements.len()),
        other => {
            let message = format!(
                "arraycopy: destination type {} is not an array",
                java_name(&other.class_name())
            );
            return Err(ctx.throw_new("java/lang/ArrayStoreException", Some(&message)));
        }
    };
    if (source_component.is_primitive() || target_component.is_primitive())
        && source_component != target_component
    {
        return Err(ctx.throw_new(
            "java/lang/ArrayStoreException",
            Some("arraycopy: type mismatch"),
        ));
    }
    if source_pos < 0
        || target_pos < 0
        || length < 0
        || source_pos as usize + length as usize > source_elements.len()
        || target_pos as usize + length as usize > target_len
    {
        let message = format!(
            "arraycopy: last source index {} out of bounds for length {}",
            i64::from(source_pos) + i64::from(length),
            source_elements.len()
        );
        return Err(ctx.throw_new("java/lang/ArrayIndexOutOfBoundsException", Some(&message)));
    }

    let (source_pos, target_pos, length) = (source_pos as usize, target_pos as usize, length as usize);
    let copied = &source_elements[source_pos..source_pos + length];
    if let Some(class) = target_component.class_name() {
        if let Some(bad) = copied
            .iter()
            .find(|value| value.reference().is_some() && !ctx.is_instance(**value, &class))
        {
            let message = java_name(&ctx.runtime_class(*bad).unwrap_or_default());
            return Err(ctx.throw_new("java/lang/ArrayStoreException", Some(&message)));
        }
    }
    if let HeapObject::Array { elements, .. } = ctx.heap_mut().get_mut(target) {
        elements[target_pos..target_pos + length].copy_from_slice(copied);
    }
    Ok(None)
}

fn system_identity_hash_code(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let hash = arg(args, 0)?.reference().map_or(0, |r| r.identity_hash());
    Ok(Some(Value::Int(hash)))
}

// Objects

fn objects_equals(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let (a, b) = (arg(args, 0)?, arg(args, 1)?);
    if a == b {
        return boolean(true);
    }
    if a == Value::Null {
        return boolean(false);
    }
    boolean(ctx.java_equals(a, b)?)
}

fn objects_hash_code(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let hash = hash_code(ctx, arg(args, 0)?)?;
    Ok(Some(Value::Int(hash)))
}

fn objects_hash(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let Some(array) = arg(args, 0)?.reference() else {
        return Ok(Some(Value::Int(0)));
    };
    let elements = match ctx.heap().get(array) {
        HeapObject::Array { elements, .. } => elements.clone(),
        _ => return Err(EmulationError::type_mismatch("java/lang/Object[]", &arg(args, 0)?)),
    };
    let mut result = 1i32;
    for element in elements {
        result = result.wrapping_mul(31).wrapping_add(hash_code(ctx, element)?);
    }
    Ok(Some(Value::Int(result)))
}

fn objects_to_string(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let text = ctx.to_java_string(arg(args, 0)?, &FieldType::Object("java/lang/Object".into()))?;
    Ok(Some(ctx.new_string(text)))
}

fn objects_to_string_default(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    if arg(args, 0)? == Value::Null {
        return Ok(Some(arg(args, 1)?));
    }
    objects_to_string(ctx, args)
}

fn objects_is_null(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg(args, 0)? == Value::Null)
}

fn objects_non_null(_ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    boolean(arg(args, 0)? != Value::Null)
}

fn objects_require_non_null(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg(args, 0)?;
    if value != Value::Null {
        return Ok(Some(value));
    }
    let message = match args.get(1) {
        Some(message) => ctx.string_value(*message),
        None => None,
    };
    Err(null_pointer(ctx, message.as_deref()))
}

fn objects_require_non_null_else(ctx: &mut ExecutionContext<'_>, args: &[Value]) -> NativeResult {
    let value = arg(args, 0)?;
    if value != Value::Null {
        return Ok(Some(value));
    }
    let fallback = arg(args, 1)?;
    if fallback == Value::Null {
        return Err(null_pointer(ctx, Some("defaultObj")));
    }
    Ok(Some(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("java/lang/String"), "String");
        assert_eq!(simple_name("demo/Outer$Inner"), "Inner");
        assert_eq!(simple_name("demo/Outer$1"), "");
        assert_eq!(simple_name("[Ljava/lang/String;"), "String[]");
        assert_eq!(simple_name("[[I"), "int[][]");
        assert_eq!(simple_name("int"), "int");
    }
}
