//! Exclusive XML canonicalization without comments
//! (<http://www.w3.org/2001/10/xml-exc-c14n#>).
//!
//! Works directly on quick-xml events: the XML declaration, DOCTYPE and
//! comments are dropped, empty elements are expanded, attributes are
//! sorted by namespace URI then local name, and a namespace declaration is
//! emitted only on the element that visibly uses it, when no output
//! ancestor already declared the same binding.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::DSIG_NS;
use crate::core::ComprobanteError;

/// Algorithm identifier for exclusive canonicalization without comments.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Which part of the input to canonicalize.
#[derive(Debug, Clone, Copy, Default)]
pub struct C14nOptions<'a> {
    /// Only the element whose `Id`/`id` attribute equals this value, and its
    /// descendants. The whole document when `None`.
    pub subtree_id: Option<&'a str>,
    /// Leave out `ds:Signature` elements (the enveloped-signature transform).
    pub exclude_signature: bool,
}

/// Canonicalize a whole document.
pub fn canonicalize(xml: &str) -> Result<String, ComprobanteError> {
    canonicalize_with(xml, C14nOptions::default())
}

/// Canonicalize a whole document with its `ds:Signature` removed.
pub fn canonicalize_enveloped(xml: &str) -> Result<String, ComprobanteError> {
    canonicalize_with(
        xml,
        C14nOptions {
            subtree_id: None,
            exclude_signature: true,
        },
    )
}

/// Canonicalize the element carrying `Id="id"` (or `id="id"`).
pub fn canonicalize_subtree(
    xml: &str,
    id: &str,
    exclude_signature: bool,
) -> Result<String, ComprobanteError> {
    canonicalize_with(
        xml,
        C14nOptions {
            subtree_id: Some(id),
            exclude_signature,
        },
    )
}

pub fn canonicalize_with(xml: &str, options: C14nOptions<'_>) -> Result<String, ComprobanteError> {
    let mut c = Canonicalizer {
        options,
        out: String::with_capacity(xml.len()),
        stack: Vec::new(),
        apex: None,
        skipped: None,
        found: false,
    };

    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => c.open(&e)?,
            Event::Empty(e) => {
                c.open(&e)?;
                c.close();
            }
            Event::End(_) => c.close(),
            Event::Text(t) => {
                if c.in_visible_element() {
                    let normalized = normalize_newlines(utf8(&t)?);
                    let text = unescape(&normalized)?;
                    escape_text(&text, &mut c.out);
                }
            }
            Event::CData(t) => {
                if c.in_visible_element() {
                    let raw = utf8(&t)?;
                    escape_text(&normalize_newlines(raw), &mut c.out);
                }
            }
            Event::PI(pi) => {
                if c.in_visible_element() {
                    c.out.push_str("<?");
                    c.out.push_str(&normalize_newlines(utf8(&pi)?));
                    c.out.push_str("?>");
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(id) = options.subtree_id {
        if !c.found {
            return Err(ComprobanteError::Xml(format!("no element with Id '{id}'")));
        }
    }
    Ok(c.out)
}

struct Frame {
    qname: String,
    /// Namespace declarations present on this element in the input.
    declared: Vec<(String, String)>,
    /// Namespace declarations written for this element in the output.
    rendered: Vec<(String, String)>,
    visible: bool,
}

struct Canonicalizer<'a> {
    options: C14nOptions<'a>,
    out: String,
    stack: Vec<Frame>,
    /// Stack index of the subtree apex while inside it.
    apex: Option<usize>,
    /// Stack index of an excluded signature while inside it.
    skipped: Option<usize>,
    found: bool,
}

impl Canonicalizer<'_> {
    fn in_visible_element(&self) -> bool {
        self.stack.last().is_some_and(|f| f.visible)
    }

    fn lookup_declared(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.stack.iter().rev().find_map(|f| {
            f.declared
                .iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.as_str())
        })
    }

    /// Binding for `prefix` in effect in the output, ignoring the top frame.
    fn lookup_rendered(&self, prefix: &str) -> Option<&str> {
        let ancestors = &self.stack[..self.stack.len().saturating_sub(1)];
        ancestors.iter().rev().filter(|f| f.visible).find_map(|f| {
            f.rendered
                .iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.as_str())
        })
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ComprobanteError> {
        let qname = utf8(e.name().as_ref())?.to_string();
        let mut declared = Vec::new();
        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(xml_err)?;
            let key = utf8(attr.key.as_ref())?;
            let value = unescape(&normalize_attr_whitespace(utf8(&attr.value)?))?.into_owned();
            if key == "xmlns" {
                declared.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declared.push((prefix.to_string(), value));
            } else {
                attrs.push((key.to_string(), value));
            }
        }

        let depth = self.stack.len();
        let mut visible = if self.skipped.is_some() {
            false
        } else if self.apex.is_some() {
            true
        } else {
            match self.options.subtree_id {
                None => true,
                Some(id) if !self.found && has_id(&attrs, id) => {
                    self.apex = Some(depth);
                    self.found = true;
                    true
                }
                Some(_) => false,
            }
        };

        self.stack.push(Frame {
            qname,
            declared,
            rendered: Vec::new(),
            visible: false,
        });

        if visible && self.options.exclude_signature && self.is_signature(depth) {
            self.skipped = Some(depth);
            visible = false;
        }
        if visible {
            self.render_start(depth, attrs)?;
        }
        self.stack[depth].visible = visible;
        Ok(())
    }

    fn is_signature(&self, depth: usize) -> bool {
        let (prefix, local) = split_qname(&self.stack[depth].qname);
        local == "Signature" && self.lookup_declared(prefix) == Some(DSIG_NS)
    }

    fn render_start(
        &mut self,
        depth: usize,
        attrs: Vec<(String, String)>,
    ) -> Result<(), ComprobanteError> {
        let qname = self.stack[depth].qname.clone();

        let mut utilized: Vec<&str> = vec![split_qname(&qname).0];
        for (name, _) in &attrs {
            if let Some((prefix, _)) = name.split_once(':') {
                if prefix != "xml" && !utilized.contains(&prefix) {
                    utilized.push(prefix);
                }
            }
        }

        let mut ns_out: Vec<(String, String)> = Vec::new();
        for prefix in utilized {
            let uri = match self.lookup_declared(prefix) {
                Some(uri) => uri,
                None if prefix.is_empty() => "",
                None => {
                    return Err(ComprobanteError::Xml(format!(
                        "namespace prefix '{prefix}' is not declared"
                    )));
                }
            };
            let rendered = self.lookup_rendered(prefix);
            let needed = if prefix.is_empty() {
                rendered.unwrap_or("") != uri
            } else {
                rendered != Some(uri)
            };
            if needed {
                ns_out.push((prefix.to_string(), uri.to_string()));
            }
        }
        ns_out.sort();

        let mut sorted_attrs = Vec::with_capacity(attrs.len());
        for (name, value) in attrs {
            let (ns, local) = match name.split_once(':') {
                Some((prefix, local)) => (
                    self.lookup_declared(prefix).unwrap_or_default().to_string(),
                    local.to_string(),
                ),
                None => (String::new(), name.clone()),
            };
            sorted_attrs.push(((ns, local), name, value));
        }
        sorted_attrs.sort_by(|a, b| a.0.cmp(&b.0));

        self.out.push('<');
        self.out.push_str(&qname);
        for (prefix, uri) in &ns_out {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            escape_attr(uri, &mut self.out);
            self.out.push('"');
        }
        for (_, name, value) in &sorted_attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            escape_attr(value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');

        self.stack[depth].rendered = ns_out;
        Ok(())
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        if frame.visible {
            self.out.push_str("</");
            self.out.push_str(&frame.qname);
            self.out.push('>');
        }
        let depth = self.stack.len();
        if self.skipped == Some(depth) {
            self.skipped = None;
        }
        if self.apex == Some(depth) {
            self.apex = None;
        }
    }
}

fn has_id(attrs: &[(String, String)], id: &str) -> bool {
    attrs
        .iter()
        .any(|(name, value)| matches!(name.as_str(), "Id" | "id" | "ID") && value == id)
}

fn split_qname(qname: &str) -> (&str, &str) {
    qname.split_once(':').unwrap_or(("", qname))
}

fn utf8(bytes: &[u8]) -> Result<&str, ComprobanteError> {
    std::str::from_utf8(bytes).map_err(|e| ComprobanteError::Xml(format!("invalid UTF-8: {e}")))
}

fn xml_err(e: impl std::fmt::Display) -> ComprobanteError {
    ComprobanteError::Xml(format!("XML parse error: {e}"))
}

fn unescape(raw: &str) -> Result<Cow<'_, str>, ComprobanteError> {
    quick_xml::escape::unescape(raw).map_err(xml_err)
}

/// Line-end normalization a parser applies before C14N sees the text.
fn normalize_newlines(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Attribute-value normalization: literal whitespace becomes a space.
fn normalize_attr_whitespace(raw: &str) -> Cow<'_, str> {
    if raw.contains(['\t', '\n', '\r']) {
        Cow::Owned(raw.replace("\r\n", " ").replace(['\t', '\n', '\r'], " "))
    } else {
        Cow::Borrowed(raw)
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
