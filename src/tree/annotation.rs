use std::fmt::Display;

/// A value stored in the annotation block of a [`Node`](super::Node).
///
/// Annotation blocks are written `[&key=value,...]` in extended Newick,
/// values are either plain strings or brace delimited lists that may nest:
/// ```
/// use phylonet::tree::{AnnotationValue, Tree};
///
/// let tree = Tree::from_newick("(A[&rate=0.5,states={a,{b,c}}],B);").unwrap();
/// let a = tree.get_by_label("A").unwrap();
///
/// assert_eq!(a.annotation["rate"], AnnotationValue::from("0.5"));
/// assert_eq!(
///     a.annotation["states"],
///     AnnotationValue::List(vec![
///         "a".into(),
///         AnnotationValue::List(vec!["b".into(), "c".into()]),
///     ])
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// A key with no value (NHX style flag)
    Null,
    /// A bare or quoted string
    String(String),
    /// A `{v1,v2,...}` list of values
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// Returns the string content if the value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value parsed as a number, if it is a numeric string
    pub fn as_f64(&self) -> Option<f64> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    /// Returns the list elements if the value is a list
    pub fn as_list(&self) -> Option<&[AnnotationValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Check if the value is [`AnnotationValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for AnnotationValue {
    fn from(v: &str) -> Self {
        AnnotationValue::String(v.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(v: String) -> Self {
        AnnotationValue::String(v)
    }
}

impl From<Vec<AnnotationValue>> for AnnotationValue {
    fn from(v: Vec<AnnotationValue>) -> Self {
        AnnotationValue::List(v)
    }
}

// Characters that cannot appear unquoted inside an annotation block
fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.chars().any(|c| {
            c.is_whitespace() || matches!(c, ',' | '=' | '{' | '}' | '[' | ']' | '\'' | '"')
        })
}

impl Display for AnnotationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) if needs_quotes(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Self::String(s) => write!(f, "{s}"),
            Self::List(values) => {
                write!(f, "{{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_values() {
        let value = AnnotationValue::List(vec![
            "a".into(),
            AnnotationValue::List(vec!["b c".into(), "d".into()]),
        ]);
        assert_eq!(format!("{value}"), "{a,{\"b c\",d}}");
        assert_eq!(format!("{}", AnnotationValue::from("#ff0000")), "#ff0000");
        assert_eq!(format!("{}", AnnotationValue::from("")), "\"\"");
    }

    #[test]
    fn accessors() {
        assert_eq!(AnnotationValue::from("0.25").as_f64(), Some(0.25));
        assert_eq!(AnnotationValue::from("red").as_f64(), None);
        assert!(AnnotationValue::Null.is_null());
        assert_eq!(
            AnnotationValue::List(vec!["x".into()]).as_list().map(|l| l.len()),
            Some(1)
        );
    }
}
