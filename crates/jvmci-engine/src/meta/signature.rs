//! Method descriptor parsing

use super::kind::JavaKind;

/// A parsed method descriptor such as `(ILjava/lang/String;[J)V`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    descriptor: String,
    parameters: Vec<String>,
    return_type: String,
}

impl Signature {
    /// Parse a method descriptor; `None` when malformed
    pub fn parse(descriptor: &str) -> Option<Signature> {
        let body = descriptor.strip_prefix('(')?;
        let close = body.find(')')?;
        let (params, rest) = (&body[..close], &body[close + 1..]);

        let mut parameters = Vec::new();
        let mut cursor = params;
        while !cursor.is_empty() {
            let len = field_descriptor_len(cursor)?;
            parameters.push(cursor[..len].to_string());
            cursor = &cursor[len..];
        }

        let ret_len = field_descriptor_len(rest)?;
        if ret_len != rest.len() {
            return None;
        }

        Some(Signature { descriptor: descriptor.to_string(), parameters, return_type: rest.to_string() })
    }

    /// The original descriptor
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Number of declared parameters (receiver excluded)
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Field descriptor of parameter `index`
    pub fn parameter_type(&self, index: usize) -> &str {
        &self.parameters[index]
    }

    /// Field descriptor of the return type
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Kind of parameter `index`
    pub fn parameter_kind(&self, index: usize) -> JavaKind {
        descriptor_kind(&self.parameters[index])
    }

    /// Kind of the return value
    pub fn return_kind(&self) -> JavaKind {
        descriptor_kind(&self.return_type)
    }

    /// Parameter kinds, with a leading `Object` for the receiver when requested
    pub fn parameter_kinds(&self, with_receiver: bool) -> Vec<JavaKind> {
        let mut kinds = Vec::with_capacity(self.parameters.len() + 1);
        if with_receiver {
            kinds.push(JavaKind::Object);
        }
        kinds.extend(self.parameters.iter().map(|p| descriptor_kind(p)));
        kinds
    }

    /// Interpreter slots used by the parameters
    pub fn parameter_slots(&self, with_receiver: bool) -> usize {
        let slots: usize = self
            .parameters
            .iter()
            .map(|p| if descriptor_kind(p).needs_two_slots() { 2 } else { 1 })
            .sum();
        slots + usize::from(with_receiver)
    }
}

/// Kind of a single field descriptor
pub fn descriptor_kind(descriptor: &str) -> JavaKind {
    descriptor.chars().next().and_then(JavaKind::from_type_char).unwrap_or(JavaKind::Illegal)
}

/// Length of the first field descriptor in `s`
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'L' => Some(i + s[i..].find(';')? + 1),
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'F' | b'J' | b'D' => Some(i + 1),
        b'V' if i == 0 => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed() {
        let sig = Signature::parse("(ILjava/lang/String;[JD)V").unwrap();
        assert_eq!(sig.parameter_count(), 4);
        assert_eq!(sig.parameter_type(1), "Ljava/lang/String;");
        assert_eq!(sig.parameter_type(2), "[J");
        assert_eq!(
            sig.parameter_kinds(true),
            vec![JavaKind::Object, JavaKind::Int, JavaKind::Object, JavaKind::Object, JavaKind::Double]
        );
        assert_eq!(sig.return_kind(), JavaKind::Void);
        assert_eq!(sig.parameter_slots(false), 5);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Signature::parse("I)V").is_none());
        assert!(Signature::parse("(Ljava/lang/String)V").is_none());
        assert!(Signature::parse("(V)V").is_none());
        assert!(Signature::parse("()VX").is_none());
        assert!(Signature::parse("(Q)V").is_none());
    }

    #[test]
    fn test_empty_params() {
        let sig = Signature::parse("()[[Ljava/lang/Object;").unwrap();
        assert_eq!(sig.parameter_count(), 0);
        assert_eq!(sig.return_kind(), JavaKind::Object);
    }
}
