use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
}

const SKIPPED: &[&str] = &["script", "style", "template"];

/// Visible text of an HTML document (or of plain text, which parses to itself),
/// with whitespace collapsed to single spaces.
pub fn plain_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    collect_text(doc.root_element())
}

fn collect_text(root: ElementRef<'_>) -> String {
    let mut buffer = String::with_capacity(1024);
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| SKIPPED.contains(&e.name())));
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(word);
        }
    }
    buffer
}

/// Trimmed `<title>` text, if the document has a non-empty one.
pub fn title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let title = doc.select(&TITLE).next()?.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Page title for display: the `<title>`, else the leading `max_chars` of the text.
pub fn display_title(html: &str, max_chars: usize) -> String {
    if let Some(t) = title(html) {
        return t;
    }
    let text = plain_text(html);
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_scripts() {
        let html = "<html><head><title>T</title><script>var x = 1;</script></head>\
                    <body><p>Quick  brown</p><p>fox</p><style>p{}</style></body></html>";
        assert_eq!(plain_text(html), "T Quick brown fox");
    }

    #[test]
    fn plain_input_is_kept() {
        assert_eq!(plain_text("just some words"), "just some words");
    }

    #[test]
    fn title_falls_back_to_text() {
        assert_eq!(display_title("<title> Home </title><p>x</p>", 50), "Home");
        let long = format!("<p>{}</p>", "a".repeat(60));
        assert_eq!(display_title(&long, 50), format!("{}...", "a".repeat(50)));
        assert_eq!(display_title("<p>short</p>", 50), "short");
    }
}
