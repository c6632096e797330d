//! Class, field and method annotations.
//!
//! Annotations are kept as opaque byte ranges tagged with their type descriptor. Since the
//! constant pool only ever grows, the bytes stay valid and every annotation that is not
//! deliberately removed is written back unchanged.

use crate::{
    classfile::{constantpool::ConstantPool, parser::Parser},
    Result,
};

/// One annotation of a `Runtime(In)VisibleAnnotations` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Type descriptor (`Lclassfold/annotations/Constant;`)
    pub descriptor: String,
    /// True for runtime-visible retention
    pub visible: bool,
    /// The encoded `annotation` structure, starting with its type index
    pub raw: Vec<u8>,
}

impl Annotation {
    /// A marker annotation (no elements) of the given type.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn marker(pool: &mut ConstantPool, descriptor: &str, visible: bool) -> Result<Annotation> {
        let type_index = pool.add_utf8(descriptor)?;
        let mut raw = Vec::with_capacity(4);
        raw.extend_from_slice(&type_index.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        Ok(Annotation {
            descriptor: descriptor.to_string(),
            visible,
            raw,
        })
    }
}

/// Parse the body of a `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations` attribute.
///
/// # Errors
/// Returns an error if the structure is truncated or refers to invalid pool entries.
pub fn parse_annotations(body: &[u8], pool: &ConstantPool, visible: bool) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(body);
    let count = parser.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = parser.pos();
        let descriptor = pool.get_utf8(parser.read_u16()?)?.to_string();
        skip_element_pairs(&mut parser, 0)?;
        annotations.push(Annotation {
            descriptor,
            visible,
            raw: body[start..parser.pos()].to_vec(),
        });
    }
    Ok(annotations)
}

/// Encode annotations into an attribute body.
#[must_use]
pub fn write_annotations<'a>(annotations: impl IntoIterator<Item = &'a Annotation>) -> Vec<u8> {
    let annotations: Vec<_> = annotations.into_iter().collect();
    let mut out = Vec::new();
    out.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
    for annotation in annotations {
        out.extend_from_slice(&annotation.raw);
    }
    out
}

const MAX_NESTING: usize = 64;

fn skip_element_pairs(parser: &mut Parser<'_>, depth: usize) -> Result<()> {
    let pairs = parser.read_u16()?;
    for _ in 0..pairs {
        parser.advance_by(2)?;
        skip_element_value(parser, depth)?;
    }
    Ok(())
}

fn skip_element_value(parser: &mut Parser<'_>, depth: usize) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(crate::Error::RecursionLimit(MAX_NESTING));
    }
    match parser.read_u8()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => parser.advance_by(2),
        b'e' => parser.advance_by(4),
        b'@' => {
            parser.advance_by(2)?;
            skip_element_pairs(parser, depth + 1)
        }
        b'[' => {
            let count = parser.read_u16()?;
            for _ in 0..count {
                skip_element_value(parser, depth + 1)?;
            }
            Ok(())
        }
        tag => Err(malformed_error!("Invalid element value tag '{}'", tag as char)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_elements_are_skipped() {
        let mut pool = ConstantPool::new();
        let outer = pool.add_utf8("Ldemo/Outer;").unwrap();
        let inner = pool.add_utf8("Ldemo/Inner;").unwrap();
        let name = pool.add_utf8("value").unwrap();
        let marker = pool.add_utf8("Lclassfold/annotations/Constant;").unwrap();

        let mut body = vec![0, 2];
        body.extend_from_slice(&outer.to_be_bytes());
        body.extend_from_slice(&[0, 1]);
        body.extend_from_slice(&name.to_be_bytes());
        body.push(b'[');
        body.extend_from_slice(&[0, 2]);
        body.push(b'@');
        body.extend_from_slice(&inner.to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.push(b'e');
        body.extend_from_slice(&[0, 1, 0, 1]);
        body.extend_from_slice(&marker.to_be_bytes());
        body.extend_from_slice(&[0, 0]);

        let annotations = parse_annotations(&body, &pool, true).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].descriptor, "Ldemo/Outer;");
        assert_eq!(annotations[1].descriptor, "Lclassfold/annotations/Constant;");
        assert_eq!(annotations[1].raw.len(), 4);
        assert_eq!(write_annotations(&annotations), body);
    }

    #[test]
    fn truncated_annotation() {
        let pool = ConstantPool::new();
        assert!(parse_annotations(&[0, 1, 0], &pool, false).is_err());
    }
}
