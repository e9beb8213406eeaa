//! Property tests over arbitrary markup.

use quickcheck_macros::quickcheck;
use quokka_dom::NodeId;
use quokka_html::parse_document;

/// After parsing, `child.parent == node` iff `child` is in `node.children`.
#[quickcheck]
fn parsed_tree_links_are_consistent(fragments: Vec<(u8, String)>) -> bool {
    const TAGS: &[&str] = &["<div>", "</div>", "<p>", "</p>", "<b>", "</b>", "<br>", "<img>", "</i>"];
    let mut html = String::new();
    for (pick, text) in fragments {
        html.push_str(TAGS[usize::from(pick) % TAGS.len()]);
        html.push_str(&text.replace(['<', '>', '&'], " "));
    }
    let tree = parse_document(&html);
    (0..tree.len()).map(NodeId).all(|id| {
        tree.children(id).iter().all(|&c| tree.parent(c) == Some(id))
            && tree
                .parent(id)
                .is_none_or(|p| tree.children(p).contains(&id))
    })
}
