//! Tests for DOM tree mutation methods: remove_child, insert_before,
//! remove_all_children, import_subtree.

use quokka_dom::{DomTree, ElementData, NodeId, NodeType};

/// Helper to create an element node and return its NodeId.
fn alloc_element(tree: &mut DomTree, tag: &str) -> NodeId {
    tree.alloc(NodeType::Element(ElementData::new(tag, Default::default())))
}

// ========== remove_child ==========

#[test]
fn test_remove_child_single_child() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, parent);

    let child = alloc_element(&mut tree, "p");
    tree.append_child(parent, child);

    assert_eq!(tree.children(parent).len(), 1);

    tree.remove_child(parent, child);

    assert_eq!(tree.children(parent).len(), 0);
    assert_eq!(tree.parent(child), None);
    assert_eq!(tree.prev_sibling(child), None);
    assert_eq!(tree.next_sibling(child), None);
}

#[test]
fn test_remove_child_middle_of_three() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, parent);

    let a = alloc_element(&mut tree, "a");
    let b = alloc_element(&mut tree, "b");
    let c = alloc_element(&mut tree, "c");
    tree.append_child(parent, a);
    tree.append_child(parent, b);
    tree.append_child(parent, c);

    tree.remove_child(parent, b);

    // a and c are siblings now
    assert_eq!(tree.children(parent), &[a, c]);
    assert_eq!(tree.next_sibling(a), Some(c));
    assert_eq!(tree.prev_sibling(c), Some(a));
}

#[test]
fn test_remove_child_not_a_child_is_noop() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    let stranger = alloc_element(&mut tree, "span");
    tree.append_child(NodeId::ROOT, parent);
    tree.append_child(NodeId::ROOT, stranger);

    tree.remove_child(parent, stranger);

    assert_eq!(tree.parent(stranger), Some(NodeId::ROOT));
}

// ========== insert_before ==========

#[test]
fn test_insert_before_first_child() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, parent);

    let existing = alloc_element(&mut tree, "b");
    tree.append_child(parent, existing);

    let new_child = alloc_element(&mut tree, "a");
    tree.insert_before(parent, new_child, existing);

    assert_eq!(tree.children(parent), &[new_child, existing]);
    assert_eq!(tree.parent(new_child), Some(parent));
    assert_eq!(tree.next_sibling(new_child), Some(existing));
    assert_eq!(tree.prev_sibling(new_child), None);
    assert_eq!(tree.prev_sibling(existing), Some(new_child));
}

#[test]
fn test_insert_before_middle() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, parent);

    let a = alloc_element(&mut tree, "a");
    let c = alloc_element(&mut tree, "c");
    tree.append_child(parent, a);
    tree.append_child(parent, c);

    let b = alloc_element(&mut tree, "b");
    tree.insert_before(parent, b, c);

    assert_eq!(tree.children(parent), &[a, b, c]);
    assert_eq!(tree.next_sibling(a), Some(b));
    assert_eq!(tree.prev_sibling(b), Some(a));
    assert_eq!(tree.next_sibling(b), Some(c));
    assert_eq!(tree.prev_sibling(c), Some(b));
}

// ========== remove_all_children / import_subtree ==========

#[test]
fn test_remove_all_children_detaches_everything() {
    let mut tree = DomTree::new();
    let parent = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, parent);
    let a = alloc_element(&mut tree, "a");
    let b = alloc_element(&mut tree, "b");
    tree.append_child(parent, a);
    tree.append_child(parent, b);

    let removed = tree.remove_all_children(parent);

    assert_eq!(removed, vec![a, b]);
    assert!(tree.children(parent).is_empty());
    assert_eq!(tree.parent(a), None);
    assert_eq!(tree.next_sibling(a), None);
}

#[test]
fn test_import_subtree_copies_structure() {
    let mut fragment = DomTree::new();
    let p = alloc_element(&mut fragment, "p");
    fragment.append_child(NodeId::ROOT, p);
    let text = fragment.alloc(NodeType::Text("hello".to_string()));
    fragment.append_child(p, text);

    let mut tree = DomTree::new();
    let div = alloc_element(&mut tree, "div");
    tree.append_child(NodeId::ROOT, div);

    let copied = tree.import_subtree(&fragment, p, div);

    assert_eq!(tree.parent(copied), Some(div));
    assert_eq!(tree.tag_name(copied), Some("p"));
    assert_eq!(tree.text_content(div), "hello");
}

#[test]
fn test_descendants_are_in_tree_order() {
    let mut tree = DomTree::new();
    let html = alloc_element(&mut tree, "html");
    tree.append_child(NodeId::ROOT, html);
    let head = alloc_element(&mut tree, "head");
    let body = alloc_element(&mut tree, "body");
    tree.append_child(html, head);
    tree.append_child(html, body);
    let p = alloc_element(&mut tree, "p");
    tree.append_child(body, p);

    assert_eq!(tree.descendants(html), vec![html, head, body, p]);
    assert_eq!(tree.body(), Some(body));
    assert!(tree.is_descendant_of(p, html));
    assert!(!tree.is_descendant_of(head, body));
}
