//! Parsing of declared type strings such as `Map<String,List<Foo>>`.

use std::fmt;
use std::str::FromStr;

use crate::SchemaError;

/// A reference to a type as written in a schema: a base name plus the
/// type parameters filled in at this use site.
///
/// `List<Foo>` is `TypeRef { base: "List", parameters: [Foo] }`; a plain
/// `Foo` has no parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// The base type name (declared or wire name).
    pub base: String,
    /// Type parameters, outermost level only; each may nest further.
    pub parameters: Vec<TypeRef>,
}

impl TypeRef {
    /// A reference without type parameters.
    pub fn named(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            parameters: Vec::new(),
        }
    }

    /// A reference with type parameters.
    pub fn generic(base: impl Into<String>, parameters: Vec<TypeRef>) -> Self {
        Self {
            base: base.into(),
            parameters,
        }
    }

    /// Parses a declared type string.
    ///
    /// The parameter list runs from the first `<` to the trailing `>` and
    /// is split on commas at nesting depth zero only, so
    /// `Map<String,List<Foo>>` yields two parameters, not three.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let text = text.trim();
        let invalid = |reason: &str| SchemaError::InvalidTypeRef {
            reference: text.to_string(),
            reason: reason.to_string(),
        };

        let Some(open) = text.find('<') else {
            if text.is_empty() {
                return Err(invalid("empty type name"));
            }
            if text.contains(['>', ',']) {
                return Err(invalid("unbalanced angle brackets"));
            }
            return Ok(Self::named(text));
        };

        let base = text[..open].trim();
        if base.is_empty() {
            return Err(invalid("missing base type before `<`"));
        }
        let Some(inner) = text[open + 1..].strip_suffix('>') else {
            return Err(invalid("type parameters must end with `>`"));
        };

        let parameters = split_top_level(inner)
            .ok_or_else(|| invalid("unbalanced angle brackets"))?
            .into_iter()
            .map(|part| {
                if part.trim().is_empty() {
                    Err(invalid("empty type parameter"))
                } else {
                    Self::parse(part)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::generic(base, parameters))
    }

    /// Visits this reference and every nested parameter, outermost first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TypeRef)) {
        visit(self);
        for parameter in &self.parameters {
            parameter.walk(visit);
        }
    }
}

/// Splits `a,B<c,d>,e` into `["a", "B<c,d>", "e"]`. Returns `None` if the
/// brackets don't balance.
fn split_top_level(inner: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&inner[start..]);
    Some(parts)
}

impl FromStr for TypeRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        if let Some((first, rest)) = self.parameters.split_first() {
            write!(f, "<{first}")?;
            for parameter in rest {
                write!(f, ",{parameter}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let ty = TypeRef::parse("  com.korwe.Foo ").unwrap();
        assert_eq!(ty, TypeRef::named("com.korwe.Foo"));
    }

    #[test]
    fn test_parse_single_parameter() {
        let ty = TypeRef::parse("List<Foo>").unwrap();
        assert_eq!(ty.base, "List");
        assert_eq!(ty.parameters, vec![TypeRef::named("Foo")]);
    }

    #[test]
    fn test_parse_nested_generic_splits_only_at_top_level() {
        let ty = TypeRef::parse("Map<String, List<Map<Integer,Foo>>>").unwrap();
        assert_eq!(ty.base, "Map");
        assert_eq!(ty.parameters.len(), 2);
        assert_eq!(ty.parameters[0], TypeRef::named("String"));

        let list = &ty.parameters[1];
        assert_eq!(list.base, "List");
        assert_eq!(list.parameters[0].base, "Map");
        assert_eq!(
            list.parameters[0].parameters,
            vec![TypeRef::named("Integer"), TypeRef::named("Foo")]
        );
    }

    #[test]
    fn test_display_round_trips_canonical_form() {
        let text = "Map<String,List<Foo>>";
        assert_eq!(TypeRef::parse(text).unwrap().to_string(), text);
        assert_eq!(
            TypeRef::parse("Map< String ,Foo >").unwrap().to_string(),
            "Map<String,Foo>"
        );
    }

    #[test]
    fn test_parse_rejects_unbalanced_brackets() {
        for bad in ["List<Foo", "List<Foo>>", "Map<String,List<Foo>", "Foo>", ""] {
            assert!(
                matches!(TypeRef::parse(bad), Err(SchemaError::InvalidTypeRef { .. })),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_empty_parameter() {
        assert!(TypeRef::parse("Map<String,>").is_err());
        assert!(TypeRef::parse("List<>").is_err());
        assert!(TypeRef::parse("<Foo>").is_err());
    }

    #[test]
    fn test_walk_visits_every_nested_reference() {
        let ty = TypeRef::parse("Map<String,List<Foo>>").unwrap();
        let mut seen = Vec::new();
        ty.walk(&mut |t| seen.push(t.base.clone()));
        assert_eq!(seen, ["Map", "String", "List", "Foo"]);
    }
}
