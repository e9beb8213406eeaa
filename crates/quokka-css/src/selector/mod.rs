//! Selector matching and cascade priority.
//!
//! [Selectors Level 4](https://www.w3.org/TR/selectors-4/)
//!
//! Only the selector forms the pipeline needs are supported: type
//! selectors, class selectors, the descendant combinator and the `:focus`
//! pseudo-class. Parsing lives in [`crate::parser`].

use std::fmt;

use quokka_dom::{DomTree, NodeId};

/// Specificity of a type selector.
const TAG_PRIORITY: u32 = 1;

/// Specificity of a class selector.
const CLASS_PRIORITY: u32 = 10;

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// [§ 5.1 Type selector](https://www.w3.org/TR/selectors-4/#type-selectors)
    Tag(String),
    /// [§ 6.6 Class selectors](https://www.w3.org/TR/selectors-4/#class-html)
    ///
    /// "The class selector is given as a full stop (. U+002E) immediately
    /// followed by an identifier."
    Class(String),
    /// [§ 16.1 Descendant combinator](https://www.w3.org/TR/selectors-4/#descendant-combinators)
    Descendant {
        /// Must match some ancestor.
        ancestor: Box<Selector>,
        /// Must match the element itself.
        descendant: Box<Selector>,
    },
    /// [§ 9.4 The input focus pseudo-class](https://www.w3.org/TR/selectors-4/#focus-pseudo)
    Focus(Box<Selector>),
}

impl Selector {
    /// Cascade priority: tag = 1, class = 10, descendant = sum of both
    /// halves, `:focus` = its base.
    #[must_use]
    pub fn priority(&self) -> u32 {
        match self {
            Self::Tag(_) => TAG_PRIORITY,
            Self::Class(_) => CLASS_PRIORITY,
            Self::Descendant {
                ancestor,
                descendant,
            } => ancestor.priority() + descendant.priority(),
            Self::Focus(base) => base.priority(),
        }
    }

    /// Whether the selector matches `node`. Text nodes never match.
    #[must_use]
    pub fn matches(&self, dom: &DomTree, node: NodeId) -> bool {
        let Some(element) = dom.as_element(node) else {
            return false;
        };
        match self {
            Self::Tag(tag) => element.tag_name == *tag,
            Self::Class(class) => element.classes().contains(class.as_str()),
            Self::Descendant {
                ancestor,
                descendant,
            } => {
                descendant.matches(dom, node)
                    && dom.ancestors(node).any(|a| ancestor.matches(dom, a))
            }
            Self::Focus(base) => element.focused && base.matches(dom, node),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Class(class) => write!(f, ".{class}"),
            Self::Descendant {
                ancestor,
                descendant,
            } => write!(f, "{ancestor} {descendant}"),
            Self::Focus(base) => write!(f, "{base}:focus"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities() {
        let tag = Selector::Tag("p".into());
        let class = Selector::Class("x".into());
        let both = Selector::Descendant {
            ancestor: Box::new(tag.clone()),
            descendant: Box::new(class.clone()),
        };
        assert_eq!(tag.priority(), 1);
        assert_eq!(class.priority(), 10);
        assert_eq!(both.priority(), 11);
        assert_eq!(Selector::Focus(Box::new(tag)).priority(), 1);
        assert_eq!(both.to_string(), "p .x");
    }
}
