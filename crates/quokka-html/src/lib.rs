//! HTML parsing for the Quokka browser.
//!
//! # Scope
//!
//! This crate turns markup into a [`quokka_dom::DomTree`]:
//! - **Tree builder** - text/tag splitting, attribute parsing, raw-text
//!   elements (`script`, `style`), comments, void elements, and the implicit
//!   `html`/`head`/`body` insertion of
//!   [WHATWG § 13.2.6](https://html.spec.whatwg.org/multipage/parsing.html#tree-construction)
//! - **Character references** - common named references plus numeric ones
//!
//! # Not Implemented
//!
//! - The tokenizer state machine and insertion modes
//! - Table parsing, foster parenting, the adoption agency algorithm

/// Character reference decoding.
pub mod entities;
/// Tree construction.
pub mod tree_builder;

pub use tree_builder::{HtmlParser, parse_document, parse_fragment};
