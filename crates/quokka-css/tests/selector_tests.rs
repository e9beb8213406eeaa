//! Integration tests for selector parsing, matching and priority.

use quokka_css::{Selector, parse_stylesheet};
use quokka_dom::{DomTree, NodeId};
use quokka_html::parse_document;

fn selector(source: &str) -> Selector {
    let rules = parse_stylesheet(&format!("{source} {{ color: red; }}"));
    assert_eq!(rules.len(), 1, "selector '{source}' did not parse");
    rules.into_iter().next().unwrap().selector
}

fn find(dom: &DomTree, tag: &str) -> NodeId {
    dom.descendants(dom.root())
        .into_iter()
        .find(|id| dom.tag_name(*id) == Some(tag))
        .unwrap()
}

#[test]
fn test_parse_selector_forms() {
    assert_eq!(selector("div"), Selector::Tag("div".to_string()));
    assert_eq!(selector(".note"), Selector::Class("note".to_string()));
    assert_eq!(
        selector("DIV p"),
        Selector::Descendant {
            ancestor: Box::new(Selector::Tag("div".to_string())),
            descendant: Box::new(Selector::Tag("p".to_string())),
        }
    );
    assert_eq!(
        selector("a:focus"),
        Selector::Focus(Box::new(Selector::Tag("a".to_string())))
    );
}

#[test]
fn test_unsupported_pseudo_class_drops_rule() {
    let rules = parse_stylesheet("a:hover { color: red; } p { color: blue; }");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].selector, Selector::Tag("p".to_string()));
}

#[test]
fn test_priorities() {
    assert_eq!(selector("p").priority(), 1);
    assert_eq!(selector(".x").priority(), 10);
    assert_eq!(selector("div .x").priority(), 11);
    assert_eq!(selector("body div p").priority(), 3);
    assert_eq!(selector(".x:focus").priority(), 10);
}

#[test]
fn test_class_matches_any_listed_class() {
    let dom = parse_document(r#"<div class="one  two">x</div>"#);
    let div = find(&dom, "div");
    assert!(selector(".one").matches(&dom, div));
    assert!(selector(".two").matches(&dom, div));
    assert!(!selector(".three").matches(&dom, div));
}

#[test]
fn test_descendant_matches_any_ancestor() {
    let dom = parse_document("<section><div><p>x</p></div></section>");
    let p = find(&dom, "p");
    assert!(selector("section p").matches(&dom, p));
    assert!(selector("div p").matches(&dom, p));
    assert!(!selector("p div").matches(&dom, p));
}

#[test]
fn test_text_nodes_never_match() {
    let dom = parse_document("<p>x</p>");
    let p = find(&dom, "p");
    let text = dom.children(p)[0];
    assert!(!selector("p").matches(&dom, text));
}

#[test]
fn test_focus_checks_the_flag() {
    let mut dom = parse_document("<input>");
    let input = find(&dom, "input");
    let focus = selector("input:focus");
    assert!(!focus.matches(&dom, input));
    dom.as_element_mut(input).unwrap().focused = true;
    assert!(focus.matches(&dom, input));
}
