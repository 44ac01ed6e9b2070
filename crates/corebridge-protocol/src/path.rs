//! Reference paths: how a repeated object points back at its first
//! occurrence.
//!
//! Every element in an encoded tree has a position, the list of
//! segments from the root down to it. A segment is the element's tag,
//! plus `[n]` when it is the n-th (n > 1) sibling with that tag:
//!
//! ```text
//! <list>                    list
//!   <Foo>..</Foo>           list/Foo
//!   <Foo>..</Foo>           list/Foo[2]
//!   <Foo reference="../Foo"/>
//! </list>
//! ```
//!
//! A reference path is relative to the reference element itself: `..`
//! steps to the parent, a segment steps down into a child. Because the
//! reference element is a leaf, every path starts with `..`.

use std::collections::HashMap;
use std::fmt;

use crate::ProtocolError;

/// One step down the tree: a tag and its 1-based index among siblings
/// with the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub tag: String,
    pub index: usize,
}

impl Segment {
    pub fn new(tag: impl Into<String>, index: usize) -> Self {
        Self {
            tag: tag.into(),
            index,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index > 1 {
            write!(f, "{}[{}]", self.tag, self.index)
        } else {
            f.write_str(&self.tag)
        }
    }
}

/// Hands out segments for the children of one element, counting
/// repeated tags.
#[derive(Debug, Default)]
pub struct Siblings {
    seen: HashMap<String, usize>,
}

impl Siblings {
    pub fn next(&mut self, tag: &str) -> Segment {
        let count = self.seen.entry(tag.to_string()).or_insert(0);
        *count += 1;
        Segment::new(tag, *count)
    }
}

/// One parsed step of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Up,
    Down(Segment),
}

/// The relative path from the element at `from` to the element at `to`.
///
/// Both are absolute positions from the same root. The result climbs to
/// their closest common ancestor and descends from there.
pub fn relative(from: &[Segment], to: &[Segment]) -> String {
    let common = from
        .iter()
        .zip(to)
        .take_while(|(a, b)| a == b)
        .count();

    let ups = std::iter::repeat_n("..".to_string(), from.len() - common);
    let downs = to[common..].iter().map(Segment::to_string);
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

/// Parses a reference path into steps.
///
/// # Errors
/// [`ProtocolError::Decode`] for empty segments, bad indices, or a path
/// that doesn't start by leaving the reference element.
pub fn parse(path: &str) -> Result<Vec<Step>, ProtocolError> {
    let bad = |why: &str| ProtocolError::Decode(format!("bad reference path `{path}`: {why}"));

    let steps = path
        .split('/')
        .map(|part| {
            if part == ".." {
                return Ok(Step::Up);
            }
            if part.is_empty() {
                return Err(bad("empty segment"));
            }
            match part.strip_suffix(']').and_then(|p| p.split_once('[')) {
                Some((tag, index)) => {
                    let index: usize = index.parse().map_err(|_| bad("index is not a number"))?;
                    if tag.is_empty() || index == 0 {
                        return Err(bad("indices are 1-based and need a tag"));
                    }
                    Ok(Step::Down(Segment::new(tag, index)))
                }
                None => Ok(Step::Down(Segment::new(part, 1))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if steps.first() != Some(&Step::Up) {
        return Err(bad("must start with `..`"));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(text: &str) -> Vec<Segment> {
        text.split('/')
            .map(|s| match parse(&format!("../{s}")).unwrap().pop() {
                Some(Step::Down(segment)) => segment,
                other => panic!("unexpected step {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_siblings_number_repeated_tags() {
        let mut siblings = Siblings::default();
        assert_eq!(siblings.next("Foo").to_string(), "Foo");
        assert_eq!(siblings.next("Bar").to_string(), "Bar");
        assert_eq!(siblings.next("Foo").to_string(), "Foo[2]");
    }

    #[test]
    fn test_relative_to_earlier_sibling() {
        let from = position("list/Foo[3]");
        let to = position("list/Foo");
        assert_eq!(relative(&from, &to), "../Foo");
    }

    #[test]
    fn test_relative_to_ancestor_is_only_ups() {
        let from = position("Person/friend/self");
        let to = position("Person");
        assert_eq!(relative(&from, &to), "../..");
    }

    #[test]
    fn test_relative_across_branches() {
        let from = position("Order/lines/Line[2]/product");
        let to = position("Order/lines/Line/product");
        assert_eq!(relative(&from, &to), "../../Line/product");
    }

    #[test]
    fn test_parse_reads_indices() {
        let steps = parse("../../entry[2]/Foo").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Up,
                Step::Up,
                Step::Down(Segment::new("entry", 2)),
                Step::Down(Segment::new("Foo", 1)),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for bad in ["Foo", "../Foo[0]", "../Foo[x]", "..//Foo", "", "../[2]"] {
            assert!(parse(bad).is_err(), "`{bad}` should be rejected");
        }
    }
}
