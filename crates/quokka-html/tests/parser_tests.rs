//! Integration tests for the HTML tree builder.

use quokka_dom::{DomTree, NodeId, NodeType};
use quokka_html::{parse_document, parse_fragment};

/// Helper to get element by tag name (first match, tree order)
fn find_element(tree: &DomTree, tag: &str) -> Option<NodeId> {
    tree.descendants(NodeId::ROOT)
        .into_iter()
        .find(|&id| tree.tag_name(id) == Some(tag))
}

#[test]
fn test_document_structure() {
    let tree = parse_document("<!DOCTYPE html><html><head></head><body></body></html>");

    let root = tree.get(NodeId::ROOT).expect("root");
    assert!(matches!(root.node_type, NodeType::Document));

    let html = tree.document_element().expect("html");
    assert_eq!(tree.tag_name(html), Some("html"));
    let children: Vec<_> = tree
        .children(html)
        .iter()
        .filter_map(|&c| tree.tag_name(c))
        .collect();
    assert_eq!(children, vec!["head", "body"]);
}

#[test]
fn test_implicit_html_head_body() {
    let tree = parse_document("<title>t</title><p>hello</p>");
    let html = tree.document_element().expect("html");
    let head = find_element(&tree, "head").expect("head");
    let body = tree.body().expect("body");
    assert_eq!(tree.parent(head), Some(html));
    assert_eq!(tree.parent(find_element(&tree, "title").unwrap()), Some(head));
    assert_eq!(tree.parent(find_element(&tree, "p").unwrap()), Some(body));
}

#[test]
fn test_bare_text_gets_body() {
    let tree = parse_document("just text");
    let body = tree.body().expect("body");
    assert_eq!(tree.text_content(body), "just text");
}

#[test]
fn test_empty_document_still_has_html() {
    let tree = parse_document("");
    assert!(tree.document_element().is_some());
}

#[test]
fn test_pre_preserves_whitespace() {
    let tree = parse_document("<pre> x\n  y\n</pre>");
    let pre = find_element(&tree, "pre").expect("pre");
    let text = tree.children(pre)[0];
    assert_eq!(tree.as_text(text), Some(" x\n  y\n"));
}

#[test]
fn test_void_elements_have_no_children() {
    let tree = parse_document("<p>a<br>b<img src=x.png>c</p>");
    let p = find_element(&tree, "p").unwrap();
    let kinds: Vec<String> = tree
        .children(p)
        .iter()
        .map(|&c| match tree.tag_name(c) {
            Some(tag) => tag.to_string(),
            None => tree.as_text(c).unwrap_or_default().to_string(),
        })
        .collect();
    assert_eq!(kinds, vec!["a", "br", "b", "img", "c"]);
    assert_eq!(tree.attribute(find_element(&tree, "img").unwrap(), "src"), Some("x.png"));
}

#[test]
fn test_script_content_is_raw_text() {
    let tree = parse_document("<script>if (a < b && c > d) { x = '<p>'; }</script><p>after</p>");
    let script = find_element(&tree, "script").unwrap();
    assert_eq!(
        tree.text_content(script),
        "if (a < b && c > d) { x = '<p>'; }"
    );
    assert!(find_element(&tree, "p").is_some());
    assert_eq!(tree.children(script).len(), 1);
}

#[test]
fn test_comments_are_skipped() {
    let tree = parse_document("<p>a<!-- <b>not</b> -->b</p>");
    let p = find_element(&tree, "p").unwrap();
    assert_eq!(tree.text_content(p), "ab");
    assert!(find_element(&tree, "b").is_none());
}

#[test]
fn test_entities_in_text_and_attributes() {
    let tree = parse_document(r#"<a title="x &amp; y">1 &lt; 2</a>"#);
    let a = find_element(&tree, "a").unwrap();
    assert_eq!(tree.attribute(a, "title"), Some("x & y"));
    assert_eq!(tree.text_content(a), "1 < 2");
}

#[test]
fn test_misnested_end_tag_closes_to_match() {
    let tree = parse_document("<div><b>bold<i>both</div><p>next</p>");
    let div = find_element(&tree, "div").unwrap();
    let p = find_element(&tree, "p").unwrap();
    assert_eq!(tree.parent(p), tree.parent(div));
}

#[test]
fn test_content_after_body_end_stays_in_body() {
    let tree = parse_document("<body><p>a</p></body>tail");
    let body = tree.body().unwrap();
    assert_eq!(tree.text_content(body), "atail");
    let html = tree.document_element().unwrap();
    assert_eq!(tree.children(html), &[body]);
}

#[test]
fn test_fragment_parsing() {
    let fragment = parse_fragment("<b>one</b> two");
    let body = fragment.body().unwrap();
    assert_eq!(fragment.children(body).len(), 2);
    assert_eq!(fragment.text_content(body), "one two");
}
