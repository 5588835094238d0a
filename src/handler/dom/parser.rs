use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::merge;

/// Builds a DOM from markup.
pub trait DomParser: Send + Sync {
    fn parse(&self, markup: &str, reference: &str) -> Box<dyn Dom>;
}

/// A parsed document supporting CSS-like selection.
pub trait Dom {
    /// Every node matching `selector`, in document order. An unparsable
    /// selector matches nothing.
    fn select(&self, selector: &str) -> Vec<Box<dyn DomNode + '_>>;
}

pub trait DomNode {
    /// Text of the node and its descendants, whitespace collapsed and trimmed.
    fn text(&self) -> String;
    /// Markup of the node's children.
    fn html(&self) -> String;
    /// Markup including the node's own tag.
    fn outer_html(&self) -> String;
}

/// HTML5 parser backed by `scraper`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScraperParser;

impl DomParser for ScraperParser {
    fn parse(&self, markup: &str, _reference: &str) -> Box<dyn Dom> {
        Box::new(ScraperDom(Html::parse_document(markup)))
    }
}

struct ScraperDom(Html);

impl Dom for ScraperDom {
    fn select(&self, selector: &str) -> Vec<Box<dyn DomNode + '_>> {
        match Selector::parse(selector) {
            Ok(selector) => self
                .0
                .select(&selector)
                .map(|element| Box::new(element) as Box<dyn DomNode + '_>)
                .collect(),
            Err(e) => {
                debug!("Selector '{}' does not parse ({}), matching nothing", selector, e);
                Vec::new()
            }
        }
    }
}

/// Elements whose boundaries separate words in rendered text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "option", "p", "pre", "section", "table", "tbody", "td",
    "tfoot", "th", "thead", "title", "tr", "ul",
];

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let block = BLOCK_ELEMENTS.contains(&el.name());
                if block {
                    out.push(' ');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

impl DomNode for ElementRef<'_> {
    fn text(&self) -> String {
        let mut text = String::new();
        push_text(*self, &mut text);
        merge::collapse_whitespace(&text)
    }

    fn html(&self) -> String {
        self.inner_html()
    }

    fn outer_html(&self) -> String {
        ElementRef::html(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>T</title></head><body>
        <div class="a"><p>Hello   <b>big</b>
        world</p></div>
        <div class="a"><span>Second</span></div>
    </body></html>"#;

    #[test]
    fn test_select_in_document_order() {
        let dom = ScraperParser.parse(PAGE, "r");
        let texts: Vec<_> = dom.select("div.a").iter().map(|n| n.text()).collect();
        assert_eq!(texts, vec!["Hello big world", "Second"]);
    }

    #[test]
    fn test_block_boundaries_separate_words() {
        let dom = ScraperParser.parse(
            "<div id=x><p>first</p><p>second</p>line<br>break<span>ing</span></div>",
            "r",
        );
        let nodes = dom.select("#x");
        assert_eq!(nodes[0].text(), "first second line breaking");
    }

    #[test]
    fn test_html_and_outer_html() {
        let dom = ScraperParser.parse(PAGE, "r");
        let nodes = dom.select("span");
        assert_eq!(nodes[0].html(), "Second");
        assert_eq!(nodes[0].outer_html(), "<span>Second</span>");
    }

    #[test]
    fn test_bad_selector_matches_nothing() {
        let dom = ScraperParser.parse(PAGE, "r");
        assert!(dom.select("div[[").is_empty());
    }
}
