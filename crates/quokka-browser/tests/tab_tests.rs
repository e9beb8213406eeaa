//! End-to-end tests of a tab: loading, scripts, input and rendering.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use quickcheck_macros::quickcheck;
use quokka_browser::{BrowserConfig, Compositor, Role, Tab, ZoomChange, draw_display_list};
use quokka_common::net::{Fetcher, MemoryFetcher, Response};
use quokka_css::{ApproximateFontMetrics, Color, DisplayItem, DrawCommand, DrawKind, EffectKey, EffectKind};
use quokka_dom::{NodeId, Property, WindowId};

fn open_with(config: BrowserConfig, fetcher: MemoryFetcher, url: &str) -> (Rc<Tab>, Arc<MemoryFetcher>) {
    let fetcher = Arc::new(fetcher);
    let shared: Arc<dyn Fetcher> = fetcher.clone();
    let tab = Tab::new(config, shared, Box::new(ApproximateFontMetrics));
    tab.navigate_to(url).unwrap();
    let _ = tab.run_pending_tasks();
    (tab, fetcher)
}

fn open(fetcher: MemoryFetcher, url: &str) -> Rc<Tab> {
    open_with(BrowserConfig::default(), fetcher, url).0
}

fn page(html: &str) -> Rc<Tab> {
    open(MemoryFetcher::new().with_body("https://a.test/", html), "https://a.test/")
}

fn select(tab: &Tab, window: WindowId, selector: &str) -> NodeId {
    tab.with_frame(window, |frame| frame.query_selector_all(selector).unwrap()[0])
        .unwrap()
}

fn attribute(tab: &Tab, window: WindowId, selector: &str, name: &str) -> Option<String> {
    let node = select(tab, window, selector);
    tab.with_frame(window, |frame| frame.get_attribute(node, name)).flatten()
}

fn opacity(tab: &Tab, node: NodeId) -> String {
    tab.with_frame(tab.root_window(), |frame| {
        frame
            .dom()
            .get(node)
            .and_then(|n| n.style.as_ref())
            .unwrap()
            .get(frame.graph(), Property::Opacity)
            .to_string()
    })
    .unwrap()
}

fn draws(items: &[DisplayItem]) -> Vec<DrawCommand> {
    let mut out = Vec::new();
    collect_draws(items, &mut out);
    out
}

fn collect_draws(items: &[DisplayItem], out: &mut Vec<DrawCommand>) {
    for item in items {
        match item {
            DisplayItem::Draw(cmd) => out.push(cmd.clone()),
            DisplayItem::Effect(effect) => collect_draws(&effect.children, out),
        }
    }
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn test_simple_page_lays_out_and_paints() {
    let tab = page("<html><body><div>text</div></body></html>");
    let commit = tab.render().unwrap();
    assert!(!commit.display_list.unwrap().is_empty());
    assert_eq!(commit.url.to_string(), "https://a.test/");

    let (x, y, width) = tab
        .with_frame(tab.root_window(), |frame| {
            let layout = frame.layout();
            let root = layout.get(layout.root()).unwrap();
            (
                *root.x.get(frame.graph()),
                *root.y.get(frame.graph()),
                *root.width.get(frame.graph()),
            )
        })
        .unwrap();
    assert!(close(width, 774.0));
    assert!(close(x, 13.0));
    assert!(close(y, 18.0));

    // Nothing changed, nothing to commit.
    assert!(tab.render().is_none());
}

#[test]
fn test_typing_into_a_clicked_input() {
    let tab = page("<input>");
    let _ = tab.render();
    let root = tab.root_window();
    let input = select(&tab, root, "input");
    let rect = tab.with_frame(root, |frame| frame.layout_rect(input)).flatten().unwrap();

    tab.click(rect.left + 2.0, rect.top + 2.0);
    assert_eq!(tab.focus(), Some((root, input)));
    tab.keypress('a');
    tab.keypress('b');
    assert_eq!(attribute(&tab, root, "input", "value").as_deref(), Some("ab"));

    let list = tab.render().unwrap().display_list.unwrap();
    let cursor = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::Line { x1, .. } => Some(x1),
            _ => None,
        })
        .unwrap();
    // Two 7.2px glyphs of the 12pt input font.
    assert!(close(cursor, rect.left + 14.4));
}

#[test]
fn test_keydown_listener_can_cancel_typing() {
    let tab = page(
        "<input><script>
            document.querySelectorAll('input')[0].addEventListener('keydown', function (e) {
                if (e.key == 'x') { e.preventDefault(); }
            });
        </script>",
    );
    tab.advance_tab();
    for ch in ['a', 'x', 'b'] {
        tab.keypress(ch);
    }
    assert_eq!(
        attribute(&tab, tab.root_window(), "input", "value").as_deref(),
        Some("ab")
    );
}

#[test]
fn test_tab_into_an_inline_input() {
    let tab = page("<p>hello <input> world</p>");
    let root = tab.root_window();
    let input = select(&tab, root, "input");
    tab.advance_tab();
    assert_eq!(tab.focus(), Some((root, input)));
    assert!(tab.render().is_some());
}

#[test]
fn test_tab_scrolls_a_far_input_into_view() {
    let tab = page(&format!("{}<input>", "<p>line</p>".repeat(60)));
    let root = tab.root_window();
    let input = select(&tab, root, "input");
    let _ = tab.render();
    tab.advance_tab();
    assert_eq!(tab.focus(), Some((root, input)));

    let (scroll, rect) = tab
        .with_frame(root, |frame| (frame.scroll(), frame.layout_rect(input)))
        .unwrap();
    let rect = rect.unwrap();
    assert!(scroll > 0.0);
    assert!(scroll <= rect.top && rect.top < scroll + 600.0);
}

#[test]
fn test_csp_blocks_foreign_stylesheet() {
    let document = Response::new(
        200,
        [("content-security-policy", "default-src https://self.example")],
        br#"<link rel="stylesheet" href="https://other.example/s.css"><div>text</div>"#.to_vec(),
    );
    let fetcher = MemoryFetcher::new()
        .with("https://self.example/", document)
        .with_body("https://other.example/s.css", "div { color: red }");
    let (tab, fetcher) = open_with(BrowserConfig::default(), fetcher, "https://self.example/");

    assert!(!fetcher.requests().iter().any(|url| url.contains("other.example")));
    let list = tab.render().unwrap().display_list.unwrap();
    assert!(!list.is_empty());
    assert!(draws(&list).iter().all(|cmd| !matches!(
        cmd.kind,
        DrawKind::Text { color, .. } if color == Color::RED
    )));
}

#[test]
fn test_opacity_transition_runs_on_the_compositor() {
    let tab = page(
        "<div style=\"opacity: 1; transition: opacity 4\">fade</div>
        <script>
            requestAnimationFrame(function () {
                document.querySelectorAll('div')[0].style = 'opacity: 0; transition: opacity 4';
            });
        </script>",
    );
    let root = tab.root_window();
    let div = select(&tab, root, "div");
    let key = EffectKey { window: root, node: div };
    assert!(tab.render().is_some());
    assert!(tab.needs_animation_frame());

    // The change itself repaints, with the first step already applied.
    let first = tab.run_animation_frame().unwrap();
    assert_eq!(opacity(&tab, div), "0.750000");
    let mut composited = Vec::new();
    first.display_list.as_ref().unwrap().iter().for_each(|item| find_blends(item, key, &mut composited));
    assert!(composited.contains(&true));

    for expected in ["0.500000", "0.250000", "0.000000"] {
        let commit = tab.run_animation_frame().unwrap();
        assert!(commit.display_list.is_none());
        let updates = commit.composited_updates.unwrap();
        assert!(updates[&key].should_save);
        assert_eq!(opacity(&tab, div), expected);
    }
    assert!(!tab.needs_animation_frame());
}

fn find_blends(item: &DisplayItem, key: EffectKey, out: &mut Vec<bool>) {
    if let DisplayItem::Effect(effect) = item {
        if effect.node == Some(key) && matches!(effect.kind, EffectKind::Blend(_)) {
            out.push(effect.needs_compositing);
        }
        for child in &effect.children {
            find_blends(child, key, out);
        }
    }
}

#[test]
fn test_tab_order_follows_tabindex() {
    let tab = open(
        MemoryFetcher::new()
            .with_body(
                "https://a.test/",
                "<a href=/one tabindex=2>one</a> <a href=/two tabindex=1>two</a>",
            )
            .with_body("https://a.test/two", "<p>two</p>"),
        "https://a.test/",
    );
    let root = tab.root_window();
    let links = tab.with_frame(root, |frame| frame.query_selector_all("a").unwrap()).unwrap();

    tab.advance_tab();
    assert_eq!(tab.focus(), Some((root, links[1])));
    tab.advance_tab();
    assert_eq!(tab.focus(), Some((root, links[0])));
    tab.advance_tab();
    assert_eq!(tab.focus(), None);

    tab.advance_tab();
    tab.enter();
    assert_eq!(tab.url().to_string(), "https://a.test/two");
    tab.go_back();
    assert_eq!(tab.url().to_string(), "https://a.test/");
}

#[test]
fn test_clicking_a_link_navigates_unless_cancelled() {
    let fetcher = || {
        MemoryFetcher::new()
            .with_body("https://a.test/next", "<p>next</p>")
            .with_body(
                "https://a.test/",
                "<a href=next>go</a>",
            )
            .with_body(
                "https://a.test/cancel",
                "<p>stay</p><a href=next>go</a><script>
                    document.querySelectorAll('a')[0].addEventListener('click', function (e) {
                        e.preventDefault();
                    });
                </script>",
            )
    };
    let link_origin = |tab: &Tab| {
        let _ = tab.render();
        let tree = tab.accessibility_tree().unwrap();
        let rect = tree.find(Role::Link).unwrap().bounds[0];
        (rect.left + 1.0, rect.top + 1.0)
    };

    let tab = open(fetcher(), "https://a.test/");
    let (x, y) = link_origin(&tab);
    tab.click(x, y);
    assert_eq!(tab.url().to_string(), "https://a.test/next");
    assert_eq!(tab.history().len(), 2);

    let tab = open(fetcher(), "https://a.test/cancel");
    let (x, y) = link_origin(&tab);
    tab.click(x, y);
    assert_eq!(tab.url().to_string(), "https://a.test/cancel");
}

#[test]
fn test_enter_in_input_posts_the_form() {
    let (tab, fetcher) = open_with(
        BrowserConfig::default(),
        MemoryFetcher::new()
            .with_body(
                "https://a.test/",
                "<form action=/submit><input name=q value=hi><button>Go</button></form>",
            )
            .with_body("https://a.test/submit", "<p>thanks</p>"),
        "https://a.test/",
    );
    tab.advance_tab();
    tab.enter();
    assert_eq!(tab.url().to_string(), "https://a.test/submit");
    assert_eq!(fetcher.requests().last().map(String::as_str), Some("https://a.test/submit"));
}

#[test]
fn test_submit_listener_can_cancel() {
    let tab = page(
        "<form action=/submit><input name=q value=hi><button>Go</button></form><script>
            document.querySelectorAll('form')[0].addEventListener('submit', function (e) {
                e.preventDefault();
            });
        </script>",
    );
    tab.advance_tab();
    tab.enter();
    assert_eq!(tab.url().to_string(), "https://a.test/");
}

#[test]
fn test_cross_origin_parent_is_off_limits() {
    let child = "<p>child</p><script>
        var p = document.querySelectorAll('p')[0];
        try {
            window.parent.document.querySelectorAll('p');
            p.setAttribute('data-result', 'allowed');
        } catch (e) {
            p.setAttribute('data-result', 'blocked');
        }
    </script>";
    let fetcher = MemoryFetcher::new()
        .with_body(
            "https://a.test/",
            "<p>parent</p><iframe src=https://b.test/child.html></iframe><iframe src=/child.html></iframe>",
        )
        .with_body("https://b.test/child.html", child)
        .with_body("https://a.test/child.html", child);
    let tab = open(fetcher, "https://a.test/");

    let windows = tab.windows();
    assert_eq!(windows.len(), 3);
    assert_eq!(attribute(&tab, windows[1], "p", "data-result").as_deref(), Some("blocked"));
    assert_eq!(attribute(&tab, windows[2], "p", "data-result").as_deref(), Some("allowed"));
}

#[test]
fn test_post_message_checks_target_origin() {
    let fetcher = MemoryFetcher::new()
        .with_body(
            "https://a.test/",
            "<p>parent</p><iframe src=https://b.test/child.html></iframe><script>
                addEventListener('message', function (e) {
                    var p = document.querySelectorAll('p')[0];
                    p.setAttribute('data-messages', (p.getAttribute('data-messages') || '') + e.data + ';');
                });
            </script>",
        )
        .with_body(
            "https://b.test/child.html",
            "<script>
                window.parent.postMessage('wrong', 'https://other.test');
                window.parent.postMessage('right', 'https://a.test');
                window.parent.postMessage('any', '*');
            </script>",
        );
    let tab = open(fetcher, "https://a.test/");
    assert_eq!(
        attribute(&tab, tab.root_window(), "p", "data-messages").as_deref(),
        Some("right;any;")
    );
}

#[test]
fn test_xhr_same_origin_csp_and_async() {
    let document = Response::new(
        200,
        [("content-security-policy", "default-src https://a.test")],
        br#"<p>x</p><script>
            var p = document.querySelectorAll('p')[0];
            var sync = new XMLHttpRequest();
            sync.open('GET', '/data', false);
            sync.send();
            p.setAttribute('data-sync', sync.responseText);

            try {
                var other = new XMLHttpRequest();
                other.open('GET', 'https://b.test/data', false);
                other.send();
                p.setAttribute('data-other', 'sent');
            } catch (e) {
                p.setAttribute('data-other', 'blocked');
            }

            var later = new XMLHttpRequest();
            later.onload = function () { p.setAttribute('data-async', this.responseText); };
            later.open('GET', '/data', true);
            later.send();
        </script>"#
            .to_vec(),
    );
    let fetcher = MemoryFetcher::new()
        .with("https://a.test/", document)
        .with_body("https://a.test/data", "payload")
        .with_body("https://b.test/data", "secret");
    let (tab, fetcher) = open_with(BrowserConfig::default(), fetcher, "https://a.test/");
    let root = tab.root_window();

    assert_eq!(attribute(&tab, root, "p", "data-sync").as_deref(), Some("payload"));
    assert_eq!(attribute(&tab, root, "p", "data-other").as_deref(), Some("blocked"));
    assert!(!fetcher.requests().iter().any(|url| url.contains("b.test")));

    let task = tab.task_runner().next_timeout(Duration::from_secs(10)).unwrap();
    tab.run_task(task);
    assert_eq!(attribute(&tab, root, "p", "data-async").as_deref(), Some("payload"));
}

#[test]
fn test_zero_timeout_runs_as_a_task() {
    let tab = page(
        "<p>x</p><script>
            setTimeout(function () {
                document.querySelectorAll('p')[0].setAttribute('data-ran', 'yes');
            }, 0);
        </script>",
    );
    assert_eq!(
        attribute(&tab, tab.root_window(), "p", "data-ran").as_deref(),
        Some("yes")
    );
}

#[test]
fn test_zoom_and_dark_mode_repaint() {
    let tab = page("<div>text</div>");
    let before = tab.render().unwrap().display_list.unwrap();

    tab.zoom_by(ZoomChange::In);
    let zoomed = tab.render().unwrap().display_list.unwrap();
    assert_ne!(before, zoomed);

    tab.toggle_dark_mode();
    let commit = tab.render().unwrap();
    assert!(commit.dark_mode);
    assert!(draws(&commit.display_list.unwrap()).iter().any(|cmd| matches!(
        cmd.kind,
        DrawKind::Text { color, .. } if color == Color::WHITE
    )));
}

#[test]
fn test_accessibility_tree_tracks_focus() {
    let tab = page("<p>Hello</p><a href=/x>link</a><input value=v><button>Go</button>");
    let _ = tab.render();
    let tree = tab.accessibility_tree().unwrap();
    assert_eq!(tree.role, Role::Document);
    for role in [Role::StaticText, Role::Link, Role::Textbox, Role::Button] {
        assert!(tree.find(role).is_some(), "{role:?}");
    }
    assert!(!tree.find(Role::Link).unwrap().focused);

    tab.advance_tab();
    let commit = tab.render().unwrap();
    let tree = commit.accessibility_tree.unwrap();
    assert!(tree.find(Role::Link).unwrap().focused);
    assert_eq!(serde_json::to_value(&tree).unwrap()["role"], "document");
}

#[test]
fn test_click_passes_into_iframe() {
    let tab = open(
        MemoryFetcher::new()
            .with_body("https://a.test/", "<iframe src=child.html></iframe>")
            .with_body("https://a.test/child.html", "<input>"),
        "https://a.test/",
    );
    let _ = tab.render();
    let root = tab.root_window();
    let child = tab.windows()[1];
    let iframe = select(&tab, root, "iframe");
    let input = select(&tab, child, "input");
    let (left, top) = tab
        .with_frame(root, |frame| frame.iframe_content_origin(iframe))
        .flatten()
        .unwrap();
    let rect = tab.with_frame(child, |frame| frame.layout_rect(input)).flatten().unwrap();

    tab.click(left + rect.left + 2.0, top + rect.top + 2.0);
    assert_eq!(tab.focus(), Some((child, input)));
    let commit = tab.render().unwrap();
    assert!(!commit.root_frame_focused);
}

#[test]
fn test_composited_frame_matches_flat_draw() {
    let html = "<div style=\"background-color: blue\">under</div>
        <div style=\"opacity: 0.5; background-color: red; border-radius: 4px\">faded</div>
        <div style=\"transform: translate(10px, 5px); background-color: green\">moved</div>";
    let (tab, _) = open_with(
        BrowserConfig::with_viewport(200.0, 150.0),
        MemoryFetcher::new().with_body("https://a.test/", html),
        "https://a.test/",
    );
    let commit = tab.render().unwrap();
    let list = commit.display_list.clone().unwrap();
    let mut compositor = Compositor::new(200, 150);
    compositor.commit(commit);
    assert!(compositor.layers().len() > 1);

    let layered = compositor.composite().unwrap();
    let flat = draw_display_list(&list, 200, 150, 0.0, false).unwrap();
    assert!(layered.pixels().iter().zip(flat.pixels()).all(|(p, q)| {
        p.red().abs_diff(q.red()) <= 2
            && p.green().abs_diff(q.green()) <= 2
            && p.blue().abs_diff(q.blue()) <= 2
            && p.alpha().abs_diff(q.alpha()) <= 2
    }));
}

/// Typing into a page and repainting draws what a fresh load of the
/// resulting markup draws.
#[quickcheck]
fn typed_text_paints_like_a_fresh_load(keys: Vec<u8>) -> bool {
    let typed: String = keys.iter().take(8).map(|k| char::from(b'a' + k % 26)).collect();

    let edited = page("<div contenteditable>start</div>");
    edited.advance_tab();
    for ch in typed.chars() {
        edited.keypress(ch);
    }
    // Past the only focusable element, focus is cleared again.
    edited.advance_tab();
    let incremental = edited.render().and_then(|c| c.display_list);

    let fresh = page(&format!("<div contenteditable>start{typed}</div>"));
    let expected = fresh.render().and_then(|c| c.display_list);

    match (incremental, expected) {
        (Some(a), Some(b)) => draws(&a) == draws(&b),
        _ => false,
    }
}

/// Load `before`, let an animation frame run `script` against it, and
/// check the repaint draws what a fresh load of `after` draws.
fn assert_mutation_paints_like(before: &str, script: &str, after: &str) {
    let tab = page(&format!(
        "{before}<script>requestAnimationFrame(function () {{ {script} }});</script>"
    ));
    assert!(tab.render().is_some());
    let incremental = tab.run_animation_frame().and_then(|c| c.display_list).unwrap();

    let fresh = page(after);
    let expected = fresh.render().and_then(|c| c.display_list).unwrap();
    assert_eq!(draws(&incremental), draws(&expected), "{script}");
}

#[test]
fn test_image_width_change_rebreaks_lines() {
    assert_mutation_paints_like(
        "<div><img width=300><img width=300></div>",
        "document.querySelectorAll('img')[0].setAttribute('width', '600');",
        "<div><img width=600><img width=300></div>",
    );
}

#[test]
fn test_mutations_paint_like_a_fresh_load() {
    let cases = [
        (
            "<div><img width=50 height=50> after</div><p>below</p>",
            "document.querySelectorAll('img')[0].setAttribute('height', '120');",
            "<div><img width=50 height=120> after</div><p>below</p>",
        ),
        (
            "<div>old words</div><p>below</p>",
            "document.querySelectorAll('div')[0].innerHTML = '<b>new</b> and rather longer text';",
            "<div><b>new</b> and rather longer text</div><p>below</p>",
        ),
        (
            "<div>grow me</div><p>below</p>",
            "document.querySelectorAll('div')[0].style = 'font-size: 32px';",
            "<div style=\"font-size: 32px\">grow me</div><p>below</p>",
        ),
        (
            "<style>.big { font-size: 30px }</style><div>grow me</div><p>below</p>",
            "document.querySelectorAll('div')[0].setAttribute('class', 'big');",
            "<style>.big { font-size: 30px }</style><div class=big>grow me</div><p>below</p>",
        ),
        (
            "<div>one <img width=40> two</div>",
            "document.querySelectorAll('img')[0].setAttribute('width', '700');",
            "<div>one <img width=700> two</div>",
        ),
    ];
    for (before, script, after) in cases {
        assert_mutation_paints_like(before, script, after);
    }
}
