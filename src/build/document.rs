//! Parsed entry document with text-level mutations.
//!
//! Parsing goes through `tl`; mutations are byte-range splices on the
//! source text so untouched markup is written back verbatim.

use std::ops::Range;

use anyhow::{Result, anyhow};

/// One element located in the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, Option<String>)>,
    /// Text between the opening and closing tag.
    pub inner: String,
    /// Byte range of the whole element.
    pub span: Range<usize>,
    /// Byte range of `inner`.
    pub inner_span: Range<usize>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct HtmlDocument {
    html: String,
}

impl HtmlDocument {
    pub fn parse(html: impl Into<String>) -> Result<Self> {
        let html = html.into();
        tl::parse(&html, tl::ParserOptions::default())
            .map_err(|e| anyhow!("invalid HTML: {e:?}"))?;
        Ok(Self { html })
    }

    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// Elements named `name`, in document order.
    pub fn elements(&self, name: &str) -> Vec<Element> {
        let Ok(dom) = tl::parse(&self.html, tl::ParserOptions::default()) else {
            return Vec::new();
        };
        let parser = dom.parser();
        let Some(handles) = dom.query_selector(name) else {
            return Vec::new();
        };

        let mut cursor = 0;
        let mut found = Vec::new();
        for handle in handles {
            let Some(tag) = handle.get(parser).and_then(|n| n.as_tag()) else {
                continue;
            };
            let raw = tag.raw().as_utf8_str();
            let Some(offset) = self.html[cursor..].find(&*raw) else {
                continue;
            };
            let start = cursor + offset;
            let span = start..start + raw.len();
            cursor = span.end;

            let attributes = tag
                .attributes()
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.map(|v| v.into_owned())))
                .collect();
            let inner_span = inner_range(&raw, start);
            found.push(Element {
                name: tag.name().as_utf8_str().to_ascii_lowercase(),
                attributes,
                inner: self.html[inner_span.clone()].to_string(),
                span,
                inner_span,
            });
        }
        found
    }

    /// Apply byte-range replacements computed against the current text.
    ///
    /// Ranges must not overlap.
    pub fn splice(&mut self, mut edits: Vec<(Range<usize>, String)>) {
        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        for (range, text) in edits {
            if range.end <= self.html.len() && range.start <= range.end {
                self.html.replace_range(range, &text);
            }
        }
    }

    /// Replace the value of attribute `name` on `element`.
    pub fn set_attr(&mut self, element: &Element, name: &str, value: &str) -> bool {
        let Some(old) = element.attr(name) else {
            return false;
        };
        let open_end = self.html[element.span.clone()]
            .find('>')
            .map_or(element.span.end, |i| element.span.start + i);
        let open = &self.html[element.span.start..open_end];
        let Some(pos) = find_attr_value(open, name, old) else {
            return false;
        };
        let start = element.span.start + pos;
        self.html.replace_range(start..start + old.len(), value);
        true
    }

    /// Insert markup right before `</head>`, or at the top when absent.
    pub fn inject_head(&mut self, markup: &str) {
        match find_ci(&self.html, "</head>") {
            Some(i) => self.html.insert_str(i, markup),
            None => self.html.insert_str(0, markup),
        }
    }

}

/// Inner text range of a raw element starting at `start`.
fn inner_range(raw: &str, start: usize) -> Range<usize> {
    let open_end = raw.find('>').map_or(raw.len(), |i| i + 1);
    let close = raw.rfind("</").filter(|&i| i >= open_end).unwrap_or(open_end);
    start + open_end..start + close
}

/// Offset of `value` as the value of `name` inside an opening tag.
fn find_attr_value(open: &str, name: &str, value: &str) -> Option<usize> {
    let lower = open.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    let mut from = 0;
    while let Some(i) = lower[from..].find(&needle) {
        let at = from + i;
        let rest = &open[at + needle.len()..];
        let trimmed = rest.trim_start();
        if let Some(after_eq) = trimmed.strip_prefix('=') {
            let value_part = after_eq.trim_start();
            let quote_skip = usize::from(value_part.starts_with(['"', '\'']));
            if value_part[quote_skip..].starts_with(value) {
                return Some(open.len() - value_part.len() + quote_skip);
            }
        }
        from = at + needle.len();
    }
    None
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().rfind(needle)
}
