use scraper::{ElementRef, Html, Node, Selector};
use once_cell::sync::Lazy;

// Create static selectors to avoid recompiling them each time
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

// Tried in order before falling back to <body>
static MAIN_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "[role='main']"]
        .iter()
        .map(|s| Selector::parse(s).expect("Failed to parse main content selector"))
        .collect()
});

/// A main-content candidate must carry at least this much text to win over <body>.
const MIN_MAIN_CONTENT_CHARS: usize = 200;

const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "nav", "header", "footer", "aside",
    "form", "button", "select", "head",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol",
    "dl", "dt", "dd", "blockquote", "pre", "table", "tr", "td", "th", "br", "hr", "figure",
    "figcaption", "details", "summary",
];

/// Visible text of a page in document order, one paragraph per block element,
/// separated by blank lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in MAIN_SELECTORS.iter() {
        if let Some(element) = document.select(selector).next() {
            let text = element_text(element);
            if text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_MAIN_CONTENT_CHARS {
                return text;
            }
        }
    }

    match document.select(&BODY_SELECTOR).next() {
        Some(body) => element_text(body),
        None => element_text(document.root_element()),
    }
}

/// Pending work on the traversal stack.
enum Step<N> {
    Visit(N),
    EndBlock,
}

// Iterative so nesting depth is bounded by heap, not the thread stack.
fn element_text(element: ElementRef<'_>) -> String {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut stack: Vec<Step<_>> = element.children().rev().map(Step::Visit).collect();

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Visit(node) => node,
            Step::EndBlock => {
                flush(&mut blocks, &mut current);
                continue;
            }
        };
        match node.value() {
            Node::Text(text) => {
                for word in text.split_whitespace() {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(word);
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) || el.attr("hidden").is_some() {
                    continue;
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    flush(&mut blocks, &mut current);
                    stack.push(Step::EndBlock);
                }
                stack.extend(node.children().rev().map(Step::Visit));
            }
            _ => {}
        }
    }

    flush(&mut blocks, &mut current);
    blocks.join("\n\n")
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        blocks.push(std::mem::take(current));
    }
}
