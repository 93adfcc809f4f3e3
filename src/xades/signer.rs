use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use rand::Rng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::c14n::{EXC_C14N, canonicalize, canonicalize_subtree};
use super::credentials::SigningCredentials;
use super::{DSIG_NS, ENVELOPED_SIGNATURE, ETSI_NS, RSA_SHA1, SHA1, SIGNED_PROPERTIES_TYPE};
use crate::core::ComprobanteError;
use crate::xml::xml_utils::XmlWriter;

/// Element identifiers of one signature, all derived from a six-digit seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureIds {
    pub signature: String,
    pub signed_properties: String,
    pub certificate: String,
    pub signed_info: String,
    pub signed_properties_ref: String,
    pub document_ref: String,
    pub object: String,
    pub signature_value: String,
}

impl SignatureIds {
    pub fn from_seed(n: u32) -> Self {
        Self {
            signature: format!("Signature{n}"),
            signed_properties: format!("Signature{n}-SignedProperties{}", n + 1),
            certificate: format!("Certificate{}", n + 2),
            signed_info: format!("Signature-SignedInfo{}", n + 3),
            signed_properties_ref: format!("SignedPropertiesID{}", n + 4),
            document_ref: format!("Reference-ID-{}", n + 5),
            object: format!("Signature{n}-Object{}", n + 6),
            signature_value: format!("SignatureValue{n}"),
        }
    }

    pub fn random() -> Self {
        Self::from_seed(rand::thread_rng().gen_range(100_000..1_000_000))
    }
}

/// The inputs that vary between two signatures of the same document.
#[derive(Debug, Clone)]
pub struct SignOptions {
    pub ids: SignatureIds,
    pub signing_time: DateTime<Utc>,
}

impl SignOptions {
    /// Random identifiers and the current time.
    pub fn now() -> Self {
        Self {
            ids: SignatureIds::random(),
            signing_time: Utc::now(),
        }
    }
}

/// Sign an unsigned comprobante with XAdES-BES (RSA-SHA1), appending the
/// `ds:Signature` as the last child of the root element.
pub fn sign(unsigned_xml: &str, credentials: &SigningCredentials) -> Result<String, ComprobanteError> {
    sign_with(unsigned_xml, credentials, &SignOptions::now())
}

/// [`sign`] with fixed identifiers and signing time. Two calls with the same
/// options produce byte-identical output.
pub fn sign_with(
    unsigned_xml: &str,
    credentials: &SigningCredentials,
    options: &SignOptions,
) -> Result<String, ComprobanteError> {
    let root = read_root(unsigned_xml)?;
    if root.has_signature {
        return Err(ComprobanteError::Signing("document is already signed".into()));
    }
    let root_id = root.id.ok_or_else(|| {
        ComprobanteError::Signing(format!("root element <{}> has no id attribute", root.name))
    })?;

    if !credentials.info().is_valid_at(options.signing_time) {
        warn!(
            not_after = %credentials.info().not_after,
            signing_time = %options.signing_time,
            "signing with a certificate outside its validity period"
        );
    }

    let ids = &options.ids;
    let document_digest = sha1_base64(canonicalize_subtree(unsigned_xml, &root_id, true)?.as_bytes());

    let key_info_digest = digest_fragment(|w| write_key_info(w, ids, credentials, true))?;

    let signed_properties_digest =
        digest_fragment(|w| write_signed_properties(w, ids, credentials, options.signing_time, true))?;

    let digests = ReferenceDigests {
        root_id: &root_id,
        document: &document_digest,
        key_info: &key_info_digest,
        signed_properties: &signed_properties_digest,
    };

    let mut w = XmlWriter::compact();
    write_signed_info(&mut w, ids, &digests, true)?;
    let signed_info = canonicalize(&w.into_string()?)?;
    let signature_value = SigningKey::<Sha1>::new(credentials.private_key().clone())
        .try_sign(signed_info.as_bytes())
        .map_err(|e| ComprobanteError::Signing(format!("RSA signing failed: {e}")))?;
    let signature_value = STANDARD.encode(signature_value.to_vec());

    let mut w = XmlWriter::compact();
    w.start_element_with_attrs(
        "ds:Signature",
        &[("xmlns:ds", DSIG_NS), ("xmlns:etsi", ETSI_NS), ("Id", ids.signature.as_str())],
    )?;
    write_signed_info(&mut w, ids, &digests, false)?;
    w.text_element_with_attrs(
        "ds:SignatureValue",
        &signature_value,
        &[("Id", ids.signature_value.as_str())],
    )?;
    write_key_info(&mut w, ids, credentials, false)?;
    w.start_element_with_attrs("ds:Object", &[("Id", ids.object.as_str())])?;
    let target = format!("#{}", ids.signature);
    w.start_element_with_attrs("etsi:QualifyingProperties", &[("Target", target.as_str())])?;
    write_signed_properties(&mut w, ids, credentials, options.signing_time, false)?;
    w.end_element("etsi:QualifyingProperties")?;
    w.end_element("ds:Object")?;
    w.end_element("ds:Signature")?;
    let signature = w.into_string()?;

    debug!(
        signature_id = %ids.signature,
        document_digest = %document_digest,
        "document signed"
    );
    append_to_root(unsigned_xml, &root.name, &signature)
}

/// Shallow check: a `ds:Signature` with a non-empty `SignatureValue` exists.
/// No digest or RSA verification; see [`verify_integrity`] for that.
pub fn verify(signed_xml: &str) -> bool {
    let mut reader = Reader::from_str(signed_xml);
    let mut in_signature = 0usize;
    let mut in_value = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"Signature" {
                    in_signature += 1;
                } else if in_signature > 0 && name.as_ref() == b"SignatureValue" {
                    in_value = true;
                }
            }
            Ok(Event::Text(t)) if in_value => {
                if t.iter().any(|b| !b.is_ascii_whitespace()) {
                    return true;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"SignatureValue" {
                    in_value = false;
                } else if name.as_ref() == b"Signature" {
                    in_signature = in_signature.saturating_sub(1);
                }
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
    }
}

/// Recompute every reference digest in `SignedInfo` and compare it with the
/// recorded `DigestValue`.
pub fn verify_reference_digests(signed_xml: &str) -> Result<bool, ComprobanteError> {
    let parsed = parse_signature(signed_xml)?;
    check_digests(signed_xml, &parsed)
}

/// [`verify_reference_digests`] plus verification of the `SignatureValue`
/// against the embedded `RSAKeyValue`.
pub fn verify_integrity(signed_xml: &str) -> Result<bool, ComprobanteError> {
    let parsed = parse_signature(signed_xml)?;
    if !check_digests(signed_xml, &parsed)? {
        return Ok(false);
    }

    let signed_info = canonicalize_subtree(signed_xml, &parsed.signed_info_id, false)?;
    let decode = |s: &str| {
        STANDARD
            .decode(s.split_whitespace().collect::<String>())
            .map_err(|e| ComprobanteError::Signing(format!("invalid base64: {e}")))
    };
    let public_key = RsaPublicKey::new(
        BigUint::from_bytes_be(&decode(&parsed.modulus)?),
        BigUint::from_bytes_be(&decode(&parsed.exponent)?),
    )
    .map_err(|e| ComprobanteError::Signing(format!("invalid RSA key value: {e}")))?;
    let signature = Signature::try_from(decode(&parsed.signature_value)?.as_slice())
        .map_err(|e| ComprobanteError::Signing(format!("invalid signature value: {e}")))?;

    Ok(VerifyingKey::<Sha1>::new(public_key)
        .verify(signed_info.as_bytes(), &signature)
        .is_ok())
}

fn check_digests(signed_xml: &str, parsed: &ParsedSignature) -> Result<bool, ComprobanteError> {
    for reference in &parsed.references {
        let Some(id) = reference.uri.strip_prefix('#') else {
            return Err(ComprobanteError::Signing(format!(
                "unsupported reference URI '{}'",
                reference.uri
            )));
        };
        let canonical = canonicalize_subtree(signed_xml, id, reference.enveloped)?;
        if sha1_base64(canonical.as_bytes()) != reference.digest {
            debug!(uri = %reference.uri, "reference digest mismatch");
            return Ok(false);
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

struct ReferenceDigests<'a> {
    root_id: &'a str,
    document: &'a str,
    key_info: &'a str,
    signed_properties: &'a str,
}

/// Namespace declarations for a fragment canonicalized on its own. Inside
/// the assembled signature they are inherited from `ds:Signature`.
fn apex_namespaces(standalone: bool) -> Vec<(&'static str, &'static str)> {
    if standalone {
        vec![("xmlns:ds", DSIG_NS), ("xmlns:etsi", ETSI_NS)]
    } else {
        Vec::new()
    }
}

fn with_id<'a>(standalone: bool, id: &'a str) -> Vec<(&'a str, &'a str)> {
    let mut attrs: Vec<(&'a str, &'a str)> = apex_namespaces(standalone);
    attrs.push(("Id", id));
    attrs
}

fn digest_fragment(
    write: impl FnOnce(&mut XmlWriter) -> Result<(), ComprobanteError>,
) -> Result<String, ComprobanteError> {
    let mut w = XmlWriter::compact();
    write(&mut w)?;
    let canonical = canonicalize(&w.into_string()?)?;
    Ok(sha1_base64(canonical.as_bytes()))
}

fn write_key_info(
    w: &mut XmlWriter,
    ids: &SignatureIds,
    credentials: &SigningCredentials,
    standalone: bool,
) -> Result<(), ComprobanteError> {
    let public_key = credentials.public_key();
    w.start_element_with_attrs("ds:KeyInfo", &with_id(standalone, &ids.certificate))?;
    w.start_element("ds:X509Data")?;
    w.text_element("ds:X509Certificate", &STANDARD.encode(credentials.certificate_der()))?;
    w.end_element("ds:X509Data")?;
    w.start_element("ds:KeyValue")?;
    w.start_element("ds:RSAKeyValue")?;
    w.text_element("ds:Modulus", &STANDARD.encode(public_key.n().to_bytes_be()))?;
    w.text_element("ds:Exponent", &STANDARD.encode(public_key.e().to_bytes_be()))?;
    w.end_element("ds:RSAKeyValue")?;
    w.end_element("ds:KeyValue")?;
    w.end_element("ds:KeyInfo")?;
    Ok(())
}

fn write_signed_properties(
    w: &mut XmlWriter,
    ids: &SignatureIds,
    credentials: &SigningCredentials,
    signing_time: DateTime<Utc>,
    standalone: bool,
) -> Result<(), ComprobanteError> {
    let info = credentials.info();
    w.start_element_with_attrs(
        "etsi:SignedProperties",
        &with_id(standalone, &ids.signed_properties),
    )?;
    w.start_element("etsi:SignedSignatureProperties")?;
    w.text_element(
        "etsi:SigningTime",
        &signing_time.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;
    w.start_element("etsi:SigningCertificate")?;
    w.start_element("etsi:Cert")?;
    w.start_element("etsi:CertDigest")?;
    w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", SHA1)])?;
    w.text_element("ds:DigestValue", &sha1_base64(credentials.certificate_der()))?;
    w.end_element("etsi:CertDigest")?;
    w.start_element("etsi:IssuerSerial")?;
    w.text_element("ds:X509IssuerName", &info.issuer)?;
    w.text_element("ds:X509SerialNumber", &info.serial_number)?;
    w.end_element("etsi:IssuerSerial")?;
    w.end_element("etsi:Cert")?;
    w.end_element("etsi:SigningCertificate")?;
    w.end_element("etsi:SignedSignatureProperties")?;
    w.start_element("etsi:SignedDataObjectProperties")?;
    let object_reference = format!("#{}", ids.document_ref);
    w.start_element_with_attrs(
        "etsi:DataObjectFormat",
        &[("ObjectReference", object_reference.as_str())],
    )?;
    w.text_element("etsi:Description", "contenido comprobante")?;
    w.text_element("etsi:MimeType", "text/xml")?;
    w.end_element("etsi:DataObjectFormat")?;
    w.end_element("etsi:SignedDataObjectProperties")?;
    w.end_element("etsi:SignedProperties")?;
    Ok(())
}

fn write_signed_info(
    w: &mut XmlWriter,
    ids: &SignatureIds,
    digests: &ReferenceDigests<'_>,
    standalone: bool,
) -> Result<(), ComprobanteError> {
    let mut apex = vec![("Id", ids.signed_info.as_str())];
    if standalone {
        apex.insert(0, ("xmlns:ds", DSIG_NS));
    }
    w.start_element_with_attrs("ds:SignedInfo", &apex)?;
    w.empty_element_with_attrs("ds:CanonicalizationMethod", &[("Algorithm", EXC_C14N)])?;
    w.empty_element_with_attrs("ds:SignatureMethod", &[("Algorithm", RSA_SHA1)])?;

    let signed_properties_uri = format!("#{}", ids.signed_properties);
    let certificate_uri = format!("#{}", ids.certificate);
    let document_uri = format!("#{}", digests.root_id);
    write_reference(
        w,
        &[
            ("Id", ids.signed_properties_ref.as_str()),
            ("Type", SIGNED_PROPERTIES_TYPE),
            ("URI", signed_properties_uri.as_str()),
        ],
        &[EXC_C14N],
        digests.signed_properties,
    )?;
    write_reference(
        w,
        &[("URI", certificate_uri.as_str())],
        &[EXC_C14N],
        digests.key_info,
    )?;
    write_reference(
        w,
        &[
            ("Id", ids.document_ref.as_str()),
            ("URI", document_uri.as_str()),
        ],
        &[ENVELOPED_SIGNATURE, EXC_C14N],
        digests.document,
    )?;

    w.end_element("ds:SignedInfo")?;
    Ok(())
}

fn write_reference(
    w: &mut XmlWriter,
    attrs: &[(&str, &str)],
    transforms: &[&str],
    digest: &str,
) -> Result<(), ComprobanteError> {
    w.start_element_with_attrs("ds:Reference", attrs)?;
    w.start_element("ds:Transforms")?;
    for transform in transforms {
        w.empty_element_with_attrs("ds:Transform", &[("Algorithm", *transform)])?;
    }
    w.end_element("ds:Transforms")?;
    w.empty_element_with_attrs("ds:DigestMethod", &[("Algorithm", SHA1)])?;
    w.text_element("ds:DigestValue", digest)?;
    w.end_element("ds:Reference")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Document handling
// ---------------------------------------------------------------------------

fn sha1_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(bytes))
}

struct RootInfo {
    name: String,
    id: Option<String>,
    has_signature: bool,
}

fn read_root(xml: &str) -> Result<RootInfo, ComprobanteError> {
    let mut reader = Reader::from_str(xml);
    let mut root: Option<RootInfo> = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| ComprobanteError::Xml(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(e) | Event::Empty(e) => match &mut root {
                None => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let mut id = None;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" || attr.key.as_ref() == b"Id" {
                            id = Some(
                                attr.unescape_value()
                                    .map_err(|e| ComprobanteError::Xml(e.to_string()))?
                                    .into_owned(),
                            );
                        }
                    }
                    root = Some(RootInfo {
                        name,
                        id,
                        has_signature: false,
                    });
                }
                Some(info) => {
                    if e.local_name().as_ref() == b"Signature" {
                        info.has_signature = true;
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }
    root.ok_or_else(|| ComprobanteError::Xml("document has no root element".into()))
}

/// Insert `signature` right before the root's closing tag. Nothing else in
/// the document changes.
fn append_to_root(xml: &str, root_name: &str, signature: &str) -> Result<String, ComprobanteError> {
    let closing = format!("</{root_name}>");
    let pos = xml
        .rfind(&closing)
        .filter(|pos| xml[pos + closing.len()..].trim().is_empty())
        .ok_or_else(|| {
            ComprobanteError::Signing(format!("could not find the closing tag {closing}"))
        })?;
    let mut signed = String::with_capacity(xml.len() + signature.len());
    signed.push_str(&xml[..pos]);
    signed.push_str(signature);
    signed.push_str(&xml[pos..]);
    Ok(signed)
}

struct ParsedReference {
    uri: String,
    enveloped: bool,
    digest: String,
}

struct ParsedSignature {
    signed_info_id: String,
    references: Vec<ParsedReference>,
    signature_value: String,
    modulus: String,
    exponent: String,
}

fn parse_signature(xml: &str) -> Result<ParsedSignature, ComprobanteError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut parsed = ParsedSignature {
        signed_info_id: String::new(),
        references: Vec::new(),
        signature_value: String::new(),
        modulus: String::new(),
        exponent: String::new(),
    };

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ComprobanteError::Xml(format!("XML parse error: {e}")))?;
        let is_start = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let attr = |name: &[u8]| -> Option<String> {
                    e.attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == name)
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
                };
                let in_signed_info = path.iter().any(|p| p == "SignedInfo");
                match local.as_str() {
                    "SignedInfo" => parsed.signed_info_id = attr(b"Id").unwrap_or_default(),
                    "Reference" if in_signed_info => parsed.references.push(ParsedReference {
                        uri: attr(b"URI").unwrap_or_default(),
                        enveloped: false,
                        digest: String::new(),
                    }),
                    "Transform" if in_signed_info => {
                        if attr(b"Algorithm").as_deref() == Some(ENVELOPED_SIGNATURE) {
                            if let Some(r) = parsed.references.last_mut() {
                                r.enveloped = true;
                            }
                        }
                    }
                    _ => {}
                }
                if is_start {
                    path.push(local);
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ComprobanteError::Xml(e.to_string()))?
                    .into_owned();
                let current = path.last().map(String::as_str);
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                match (parent, current) {
                    (Some("Reference"), Some("DigestValue")) => {
                        if let Some(r) = parsed.references.last_mut() {
                            r.digest.push_str(text.trim());
                        }
                    }
                    (_, Some("SignatureValue")) => parsed.signature_value.push_str(&text),
                    (Some("RSAKeyValue"), Some("Modulus")) => parsed.modulus.push_str(&text),
                    (Some("RSAKeyValue"), Some("Exponent")) => parsed.exponent.push_str(&text),
                    _ => {}
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if parsed.signed_info_id.is_empty() || parsed.references.is_empty() {
        return Err(ComprobanteError::Signing(
            "no SignedInfo with references found".into(),
        ));
    }
    Ok(parsed)
}
