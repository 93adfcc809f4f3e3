use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;
use std::io::Cursor;

use crate::core::{ComprobanteError, MAX_TEXT_LEN};

pub type XmlResult = Result<String, ComprobanteError>;

fn xml_io(e: std::io::Error) -> ComprobanteError {
    ComprobanteError::Xml(format!("XML write error: {e}"))
}

pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    /// Indented document with an XML declaration.
    pub fn new() -> Result<Self, ComprobanteError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    /// Fragment without declaration or whitespace between elements.
    pub fn compact() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    pub fn into_string(self) -> Result<String, ComprobanteError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| ComprobanteError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, ComprobanteError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ComprobanteError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    /// `<name attr="..."/>`
    pub fn empty_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ComprobanteError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer
            .write_event(Event::Empty(elem))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, ComprobanteError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    /// Element with escaped text. For codes, numbers and dates.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, ComprobanteError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ComprobanteError> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Element with free text: control characters stripped, truncated to
    /// [`MAX_TEXT_LEN`], then escaped.
    pub fn clean_text_element(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<&mut Self, ComprobanteError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(sanitize_text(text))))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    pub fn clean_text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ComprobanteError> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(sanitize_text(text))))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write a monetary amount with two decimals.
    pub fn amount_element(
        &mut self,
        name: &str,
        amount: Decimal,
    ) -> Result<&mut Self, ComprobanteError> {
        self.text_element(name, &format_amount(amount))
    }

    /// Write a quantity or unit price with six decimals.
    pub fn quantity_element(
        &mut self,
        name: &str,
        qty: Decimal,
    ) -> Result<&mut Self, ComprobanteError> {
        self.text_element(name, &format_quantity(qty))
    }
}

fn is_forbidden_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}')
}

/// Strip control characters XML 1.0 cannot carry and keep at most
/// `max_chars` characters. The result is not escaped.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    text.chars()
        .filter(|c| !is_forbidden_control(*c))
        .take(max_chars)
        .collect()
}

/// Clean and escape free text for insertion as element content.
///
/// Truncation happens before escaping so an entity is never cut in half.
pub fn sanitize_text(text: &str) -> String {
    quick_xml::escape::escape(clean_text(text, MAX_TEXT_LEN)).into_owned()
}

/// Fixed-point decimal rounded half away from zero.
pub fn format_fixed(d: Decimal, dp: u32) -> String {
    let mut rounded = d.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded.to_string()
}

/// Money: exactly two decimals.
pub fn format_amount(d: Decimal) -> String {
    format_fixed(d, 2)
}

/// Quantities and unit prices: exactly six decimals.
pub fn format_quantity(d: Decimal) -> String {
    format_fixed(d, 6)
}
