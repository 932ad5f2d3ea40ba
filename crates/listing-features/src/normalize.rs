use std::sync::LazyLock;

use listing_core::AttributeRow;
use regex::Regex;
use serde_json::Value;

// `</li>` is optional in HTML: an open item also ends at the next sibling item
// or at the end of its list.
static LIST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)(li|ul|ol)(?:\s[^>]*)?>").expect("list tag pattern"));
static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup tag pattern"));

/// Display strings for one feature row.
///
/// The structured `text_items` list wins whenever it yields at least one entry;
/// otherwise the `<li>` texts of the rendered markup are used. A row with
/// neither contributes nothing.
pub fn normalize(row: &AttributeRow) -> Vec<String> {
    let items = row
        .structured_items
        .as_deref()
        .map(parse_structured_items)
        .unwrap_or_default();
    if !items.is_empty() {
        return items;
    }

    row.rendered_text
        .as_deref()
        .map(extract_list_items)
        .unwrap_or_default()
}

pub fn parse_structured_items(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => values.into_iter().filter_map(truthy_text).collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring malformed structured feature items");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OpenElement {
    List,
    Item(usize),
}

/// Text content of every `<li>` in document order, nested items included.
pub fn extract_list_items(markup: &str) -> Vec<String> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut open: Vec<OpenElement> = Vec::new();

    for tag in LIST_TAG.captures_iter(markup) {
        let (Some(whole), Some(name)) = (tag.get(0), tag.get(2)) else {
            continue;
        };
        let closing = tag.get(1).is_some_and(|slash| !slash.as_str().is_empty());
        let is_item = name.as_str().eq_ignore_ascii_case("li");

        match (closing, is_item) {
            (false, true) => {
                if let Some(&OpenElement::Item(index)) = open.last() {
                    spans[index].1 = whole.start();
                    open.pop();
                }
                open.push(OpenElement::Item(spans.len()));
                spans.push((whole.end(), markup.len()));
            }
            (true, true) => {
                if let Some(&OpenElement::Item(index)) = open.last() {
                    spans[index].1 = whole.start();
                    open.pop();
                }
            }
            (false, false) => open.push(OpenElement::List),
            (true, false) => {
                while let Some(element) = open.pop() {
                    match element {
                        OpenElement::Item(index) => spans[index].1 = whole.start(),
                        OpenElement::List => break,
                    }
                }
            }
        }
    }

    spans
        .into_iter()
        .map(|(start, end)| text_content(&markup[start..end]))
        .filter(|text| !text.is_empty())
        .collect()
}

fn text_content(fragment: &str) -> String {
    let stripped = MARKUP_TAG.replace_all(fragment, "");
    html_escape::decode_html_entities(&stripped).trim().to_owned()
}

fn truthy_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text),
        Value::Number(number) => number
            .as_f64()
            .filter(|value| *value != 0.0 && value.is_finite())
            .map(|_| number.to_string()),
        _ => None,
    }
}
