use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// One `<outline>` element and everything nested under it.
///
/// Every level of the document is normalized into a `Vec<Outline>` of
/// siblings, whether the source held one outline there or many.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    /// Raw `xmlUrl` attribute, if present.
    pub xml_url: Option<String>,
    pub children: Vec<Outline>,
}

impl Outline {
    pub fn feed(url: &str) -> Self {
        Self {
            xml_url: Some(url.to_string()),
            children: Vec::new(),
        }
    }

    pub fn folder(children: Vec<Outline>) -> Self {
        Self {
            xml_url: None,
            children,
        }
    }
}

impl Drop for Outline {
    // The derived drop would recurse once per nesting level
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Reads an OPML file and returns its feed URLs in pre-order.
pub async fn read_feed_urls(path: &Path) -> Result<Vec<String>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    let outlines = parse_outlines(&content)?;
    Ok(walk(&outlines))
}

/// Parses OPML content into its outline tree.
///
/// The tree is built with an explicit stack of open elements, so nesting
/// depth is bounded by memory rather than by the call stack.
///
/// # Security
///
/// XXE protection: quick-xml (0.37) never parses `<!ENTITY>`
/// declarations. Custom entities like `&xxe;` fail in
/// `decode_and_unescape_value()` with `EscapeError::UnrecognizedEntity`.
pub fn parse_outlines(content: &str) -> Result<Vec<Outline>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut roots: Vec<Outline> = Vec::new();
    let mut open: Vec<Outline> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                open.push(Outline {
                    xml_url: xml_url_attribute(&e, &reader)?,
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let node = Outline {
                    xml_url: xml_url_attribute(&e, &reader)?,
                    children: Vec::new(),
                };
                attach(&mut open, &mut roots, node);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                if let Some(node) = open.pop() {
                    attach(&mut open, &mut roots, node);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    // Outlines left open at EOF still count
    while let Some(node) = open.pop() {
        attach(&mut open, &mut roots, node);
    }

    Ok(roots)
}

fn attach(open: &mut [Outline], roots: &mut Vec<Outline>, node: Outline) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn xml_url_attribute(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<String>, OpmlError> {
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        if attr.key.as_ref() == b"xmlUrl" {
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Collects every non-blank `xmlUrl` in depth-first pre-order.
///
/// Outlines without the attribute contribute nothing, but their children are
/// still visited.
pub fn walk(outlines: &[Outline]) -> Vec<String> {
    let mut urls = Vec::new();
    let mut stack = vec![outlines.iter()];

    loop {
        let Some(siblings) = stack.last_mut() else {
            break;
        };
        match siblings.next() {
            Some(node) => {
                if let Some(url) = node.xml_url.as_deref().map(str::trim) {
                    if !url.is_empty() {
                        urls.push(url.to_string());
                    }
                }
                stack.push(node.children.iter());
            }
            None => {
                stack.pop();
            }
        }
    }

    urls
}
