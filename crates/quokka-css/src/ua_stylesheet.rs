//! User-Agent Stylesheet
//!
//! [WHATWG HTML § 15 Rendering](https://html.spec.whatwg.org/multipage/rendering.html)
//!
//! "User agents are expected to have a default style sheet that presents elements
//! of HTML documents in ways consistent with general user expectations."
//!
//! The rules below come first in every frame's rule list, so author rules
//! of equal priority override them.

use std::sync::OnceLock;

use crate::parser::{Rule, parse_stylesheet};

/// Default rules for the elements the pipeline renders specially.
const UA_CSS: &str = r"
pre { background-color: gray; }
a { color: blue; }
i { font-style: italic; }
b { font-weight: bold; }
small { font-size: 90%; }
big { font-size: 110%; }
h1 { font-size: 200%; font-weight: bold; }
h2 { font-size: 150%; font-weight: bold; }

input {
    font-size: 16px; font-weight: normal; font-style: normal;
    background-color: lightblue;
}
button {
    font-size: 16px; font-weight: normal; font-style: normal;
    background-color: orange;
}

input:focus { outline: 1px solid black; }
button:focus { outline: 1px solid black; }
div:focus { outline: 1px solid black; }
a:focus { outline: 1px solid black; }

iframe { outline: 1px solid black; }

@media (prefers-color-scheme: dark) {
    a { color: lightblue; }
    input { background-color: blue; }
    button { background-color: orangered; }
    input:focus { outline: 1px solid white; }
    button:focus { outline: 1px solid white; }
    div:focus { outline: 1px solid white; }
    a:focus { outline: 1px solid white; }
    iframe { outline: 1px solid white; }
}
";

/// The parsed user-agent rules, in source order.
#[must_use]
pub fn default_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| parse_stylesheet(UA_CSS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Media;

    #[test]
    fn test_default_rules_parse_completely() {
        let rules = default_rules();
        assert_eq!(rules.len(), 23);
        assert_eq!(rules.iter().filter(|r| r.media == Some(Media::Dark)).count(), 8);
    }
}
