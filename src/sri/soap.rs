//! SOAP 1.1 envelopes for the two authority services and parsers for their
//! responses.
//!
//! Parsing matches local element names only; the authority has changed
//! namespace prefixes between deployments.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::core::{AccessKey, AuthorityMessage, MessageSeverity};

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const RECEPTION_NS: &str = "http://ec.gob.sri.ws.recepcion";
pub const AUTHORIZATION_NS: &str = "http://ec.gob.sri.ws.autorizacion";

/// `validarComprobante` request carrying the base64 of the signed XML.
pub fn reception_envelope(signed_xml: &str) -> String {
    let payload = STANDARD.encode(signed_xml.as_bytes());
    envelope(
        RECEPTION_NS,
        &format!("<ec:validarComprobante><xml>{payload}</xml></ec:validarComprobante>"),
    )
}

/// `autorizacionComprobante` request for one access key.
pub fn authorization_envelope(access_key: &AccessKey) -> String {
    envelope(
        AUTHORIZATION_NS,
        &format!(
            "<ec:autorizacionComprobante><claveAccesoComprobante>{}</claveAccesoComprobante></ec:autorizacionComprobante>",
            escape(access_key.as_str())
        ),
    )
}

fn envelope(service_ns: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{SOAP_ENV_NS}\" xmlns:ec=\"{service_ns}\">\
         <soapenv:Header/><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"
    )
}

// ---------------------------------------------------------------------------
// Reception
// ---------------------------------------------------------------------------

/// `estado` of a reception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceptionStatus {
    /// RECIBIDA
    Received,
    /// DEVUELTA: the document failed the authority's checks.
    Returned,
    /// No usable status: transport failure, SOAP fault or unreadable body.
    Error,
}

impl ReceptionStatus {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "RECIBIDA" => Self::Received,
            "DEVUELTA" => Self::Returned,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionResult {
    pub status: ReceptionStatus,
    pub messages: Vec<AuthorityMessage>,
}

impl ReceptionResult {
    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReceptionStatus::Error,
            messages: vec![AuthorityMessage::local_error(message)],
        }
    }
}

/// Parse a `validarComprobanteResponse`.
///
/// When the body is not well-formed or has no `estado` element, a plain text
/// scan for `<estado>…</estado>` is attempted before settling on
/// [`ReceptionStatus::Error`].
pub fn parse_reception_response(body: &str) -> ReceptionResult {
    let parsed = parse_response(body, "comprobante");
    let (estado, mut messages, parse_error) = match parsed {
        Ok(p) => (p.estado, p.messages, p.fault),
        Err(e) => (None, Vec::new(), Some(format!("Error parsing response: {e}"))),
    };

    let token = estado.or_else(|| scan_estado(body));
    let Some(token) = token else {
        let text = parse_error.unwrap_or_else(|| "Respuesta de recepción sin estado".into());
        messages.push(AuthorityMessage::local_error(text));
        return ReceptionResult {
            status: ReceptionStatus::Error,
            messages,
        };
    };

    let status = ReceptionStatus::from_token(&token);
    if status == ReceptionStatus::Error && messages.is_empty() {
        messages.push(AuthorityMessage::local_error(format!(
            "Estado de recepción desconocido: {token}"
        )));
    }
    ReceptionResult { status, messages }
}

fn scan_estado(body: &str) -> Option<String> {
    let start = body.find("<estado>")? + "<estado>".len();
    let len = body[start..].find('<')?;
    let token = body[start..start + len].trim();
    (!token.is_empty()).then(|| token.to_string())
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// `estado` of an authorization block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    /// AUTORIZADO
    Authorized,
    /// NO AUTORIZADO
    NotAuthorized,
    /// EN PROCESO, EN PROCESAMIENTO, any other unrecognized state, or no
    /// authorization block yet.
    InProcess,
    Error,
}

impl AuthorizationStatus {
    /// Only the three terminal tokens are recognized; everything else keeps
    /// the document in process.
    pub fn from_token(token: &str) -> Self {
        let normalized = token.trim().to_ascii_uppercase().replace(' ', "_");
        match normalized.as_str() {
            "AUTORIZADO" => Self::Authorized,
            "NO_AUTORIZADO" => Self::NotAuthorized,
            "ERROR" => Self::Error,
            _ => Self::InProcess,
        }
    }
}

/// The first `autorizacion` block of an authorization response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    pub status: AuthorizationStatus,
    pub authorization_number: Option<String>,
    pub authorized_at: Option<DateTime<FixedOffset>>,
    /// `ambiente` as reported by the authority ("PRUEBAS", "PRODUCCIÓN").
    pub environment: Option<String>,
    /// The authorized document echoed back by the authority.
    pub document: Option<String>,
    pub messages: Vec<AuthorityMessage>,
}

impl AuthorizationOutcome {
    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::with_status(
            AuthorizationStatus::Error,
            vec![AuthorityMessage::local_error(message)],
        )
    }

    fn with_status(status: AuthorizationStatus, messages: Vec<AuthorityMessage>) -> Self {
        Self {
            status,
            authorization_number: None,
            authorized_at: None,
            environment: None,
            document: None,
            messages,
        }
    }
}

/// Parse an `autorizacionComprobanteResponse`. A response without any
/// `autorizacion` block means the authority is still processing.
pub fn parse_authorization_response(body: &str) -> AuthorizationOutcome {
    let parsed = match parse_response(body, "autorizacion") {
        Ok(p) => p,
        Err(e) => return AuthorizationOutcome::error(format!("Error parsing response: {e}")),
    };
    if let Some(fault) = parsed.fault {
        return AuthorizationOutcome::error(fault);
    }
    let Some(block) = parsed.block else {
        return AuthorizationOutcome::with_status(AuthorizationStatus::InProcess, Vec::new());
    };

    let status = block
        .estado
        .as_deref()
        .map(AuthorizationStatus::from_token)
        .unwrap_or(AuthorizationStatus::Error);
    AuthorizationOutcome {
        status,
        authorization_number: block.number,
        authorized_at: block.date.as_deref().and_then(parse_authorization_date),
        environment: block.environment,
        document: block.document,
        messages: parsed.messages,
    }
}

/// `fechaAutorizacion` is ISO 8601 with offset on current deployments and
/// `dd/mm/yyyy HH:MM:SS` (Ecuador time) on older ones.
fn parse_authorization_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    let ecuador = FixedOffset::west_opt(5 * 3600)?;
    ["%Y-%m-%dT%H:%M:%S%.f", "%d/%m/%Y %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| ecuador.from_local_datetime(&naive).single())
}

// ---------------------------------------------------------------------------
// Shared reader
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Block {
    estado: Option<String>,
    number: Option<String>,
    date: Option<String>,
    environment: Option<String>,
    document: Option<String>,
}

#[derive(Default)]
struct ParsedResponse {
    /// Reception `estado`, outside any block.
    estado: Option<String>,
    /// First block named `block_name`.
    block: Option<Block>,
    messages: Vec<AuthorityMessage>,
    fault: Option<String>,
}

#[derive(Default)]
struct MessageFields {
    code: String,
    text: String,
    info: Option<String>,
    kind: String,
}

fn parse_response(body: &str, block_name: &str) -> Result<ParsedResponse, quick_xml::Error> {
    let mut reader = Reader::from_str(body);
    let mut path: Vec<String> = Vec::new();
    let mut out = ParsedResponse::default();
    let mut blocks_seen = 0usize;
    let mut in_first_block = false;
    let mut message: Option<MessageFields> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if local == block_name {
                    blocks_seen += 1;
                    in_first_block = blocks_seen == 1;
                    if in_first_block && block_name == "autorizacion" {
                        out.block = Some(Block::default());
                    }
                }
                if local == "mensaje" && path.last().map(String::as_str) == Some("mensajes") {
                    message = Some(MessageFields::default());
                }
                path.push(local);
            }
            Event::End(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.pop();
                if local == "mensaje" && path.last().map(String::as_str) == Some("mensajes") {
                    if let Some(m) = message.take() {
                        if blocks_seen <= 1 {
                            out.messages.push(m.into_message());
                        }
                    }
                }
                if local == block_name {
                    in_first_block = false;
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                record_text(&mut out, &path, &mut message, in_first_block, text);
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                record_text(&mut out, &path, &mut message, in_first_block, Cow::Owned(text));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn record_text(
    out: &mut ParsedResponse,
    path: &[String],
    message: &mut Option<MessageFields>,
    in_first_block: bool,
    text: Cow<'_, str>,
) {
    let Some(current) = path.last().map(String::as_str) else {
        return;
    };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());

    if current == "faultstring" {
        append(&mut out.fault, &text);
        return;
    }

    if let Some(m) = message.as_mut() {
        if parent == Some("mensaje") {
            match current {
                "identificador" => m.code.push_str(text.trim()),
                "mensaje" => m.text.push_str(text.trim()),
                "informacionAdicional" => append(&mut m.info, text.trim()),
                "tipo" => m.kind.push_str(text.trim()),
                _ => {}
            }
        }
        return;
    }

    if let Some(block) = out.block.as_mut().filter(|_| in_first_block) {
        if parent == Some("autorizacion") {
            match current {
                "estado" => append(&mut block.estado, text.trim()),
                "numeroAutorizacion" => append(&mut block.number, text.trim()),
                "fechaAutorizacion" => append(&mut block.date, text.trim()),
                "ambiente" => append(&mut block.environment, text.trim()),
                "comprobante" => append(&mut block.document, &text),
                _ => {}
            }
        }
        return;
    }

    if current == "estado" && out.estado.is_none() {
        let token = text.trim();
        if !token.is_empty() {
            out.estado = Some(token.to_string());
        }
    }
}

fn append(slot: &mut Option<String>, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    slot.get_or_insert_with(String::new).push_str(text);
}

impl MessageFields {
    fn into_message(self) -> AuthorityMessage {
        let mut message =
            AuthorityMessage::new(self.code, self.text, MessageSeverity::from_token(&self.kind));
        if let Some(info) = self.info {
            message = message.with_additional_info(info);
        }
        message
    }
}
