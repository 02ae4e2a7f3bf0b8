use scraper::{ElementRef, Html, Node, Selector};

const SKIPPED: &[&str] = &["script", "style", "noscript", "head", "template", "svg"];

const BLOCK: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "ul", "ol", "li",
    "table", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "dd",
    "dt", "hr",
];

/// Readable text of an HTML document or fragment, one block per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    element_text(document.root_element())
}

/// Readable text of one element, one block per line.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect(element, &mut raw);
    normalize_whitespace(&raw)
}

fn collect(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED.contains(&name) {
                    continue;
                }
                let block = BLOCK.contains(&name);
                if block || name == "br" {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of whitespace inside each line and drop blank lines.
pub fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-line normalisation for short fields (titles, company names).
pub fn clean_inline(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}

/// First `max` characters of `text` (character count, not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Inline text of the first element matching `selector`.
pub fn select_text(html: &Html, selector: &Selector) -> Option<String> {
    html.select(selector)
        .next()
        .and_then(|el| clean_inline(&el.text().collect::<Vec<_>>().join(" ")))
}
