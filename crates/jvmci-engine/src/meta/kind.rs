//! Java value kinds

#![allow(missing_docs)]

use serde::Serialize;

/// The kind of a Java value as seen by the compiler
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum JavaKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    Object,
    Void,
    Illegal,
}

impl JavaKind {
    /// Kind for a descriptor type character
    pub fn from_type_char(c: char) -> Option<JavaKind> {
        Some(match c {
            'Z' => JavaKind::Boolean,
            'B' => JavaKind::Byte,
            'S' => JavaKind::Short,
            'C' => JavaKind::Char,
            'I' => JavaKind::Int,
            'F' => JavaKind::Float,
            'J' => JavaKind::Long,
            'D' => JavaKind::Double,
            'L' | '[' => JavaKind::Object,
            'V' => JavaKind::Void,
            _ => return None,
        })
    }

    /// Descriptor character for this kind
    pub fn type_char(self) -> char {
        match self {
            JavaKind::Boolean => 'Z',
            JavaKind::Byte => 'B',
            JavaKind::Short => 'S',
            JavaKind::Char => 'C',
            JavaKind::Int => 'I',
            JavaKind::Float => 'F',
            JavaKind::Long => 'J',
            JavaKind::Double => 'D',
            JavaKind::Object => 'A',
            JavaKind::Void => 'V',
            JavaKind::Illegal => '-',
        }
    }

    /// Kind used on the operand stack: sub-int kinds widen to `Int`
    pub fn stack_kind(self) -> JavaKind {
        match self {
            JavaKind::Boolean | JavaKind::Byte | JavaKind::Short | JavaKind::Char => JavaKind::Int,
            other => other,
        }
    }

    /// Size of a value of this kind in bytes (objects assume uncompressed words)
    pub fn byte_count(self) -> usize {
        match self {
            JavaKind::Boolean | JavaKind::Byte => 1,
            JavaKind::Short | JavaKind::Char => 2,
            JavaKind::Int | JavaKind::Float => 4,
            JavaKind::Long | JavaKind::Double | JavaKind::Object => 8,
            JavaKind::Void | JavaKind::Illegal => 0,
        }
    }

    /// Whether this is a primitive value kind
    pub fn is_primitive(self) -> bool {
        !matches!(self, JavaKind::Object | JavaKind::Void | JavaKind::Illegal)
    }

    /// Whether this kind is floating point
    pub fn is_numeric_float(self) -> bool {
        matches!(self, JavaKind::Float | JavaKind::Double)
    }

    /// Whether this kind takes two interpreter slots
    pub fn needs_two_slots(self) -> bool {
        matches!(self, JavaKind::Long | JavaKind::Double)
    }

    /// Java name of the primitive type
    pub fn java_name(self) -> &'static str {
        match self {
            JavaKind::Boolean => "boolean",
            JavaKind::Byte => "byte",
            JavaKind::Short => "short",
            JavaKind::Char => "char",
            JavaKind::Int => "int",
            JavaKind::Float => "float",
            JavaKind::Long => "long",
            JavaKind::Double => "double",
            JavaKind::Object => "Object",
            JavaKind::Void => "void",
            JavaKind::Illegal => "illegal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_kind_widening() {
        assert_eq!(JavaKind::Boolean.stack_kind(), JavaKind::Int);
        assert_eq!(JavaKind::Char.stack_kind(), JavaKind::Int);
        assert_eq!(JavaKind::Long.stack_kind(), JavaKind::Long);
        assert_eq!(JavaKind::Object.stack_kind(), JavaKind::Object);
    }

    #[test]
    fn test_type_chars() {
        for c in "ZBSCIFJDV".chars() {
            assert_eq!(JavaKind::from_type_char(c).unwrap().type_char(), c);
        }
        assert_eq!(JavaKind::from_type_char('L'), Some(JavaKind::Object));
        assert_eq!(JavaKind::from_type_char('['), Some(JavaKind::Object));
        assert_eq!(JavaKind::from_type_char('Q'), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(JavaKind::Double.byte_count(), 8);
        assert_eq!(JavaKind::Float.byte_count(), 4);
        assert!(JavaKind::Long.needs_two_slots());
        assert!(!JavaKind::Object.is_primitive());
    }
}
