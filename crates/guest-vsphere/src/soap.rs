//! vim25 SOAP/HTTP transport.
//!
//! Builds SOAP envelopes for vSphere Web Services methods, posts them to
//! `https://{host}/sdk`, keeps the `vmware_soap_session` cookie in the client's
//! cookie store, and turns SOAP faults into [`GuestError`]s.

use crate::error::{GuestError, GuestResult};
use crate::types::{ManagedObjectRef, VsphereConfig};
use crate::xml::{self, Element};

use log::{debug, error, trace};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

// ─── Constants ───────────────────────────────────────────────────────

const NS_SOAPENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const NS_VIM25: &str = "urn:vim25";

/// API release sent in `SOAPAction`; 6.5 is the first with `PutUsbScanCodes`.
const VIM_VERSION: &str = "6.5";

// ─── Transport ───────────────────────────────────────────────────────

/// HTTP transport for a single vim25 endpoint.
#[derive(Debug)]
pub struct SoapTransport {
    client: Client,
    endpoint: Url,
    request_counter: AtomicU64,
}

impl SoapTransport {
    /// Build a transport from config (does NOT log in).
    pub fn new(config: &VsphereConfig) -> GuestResult<Self> {
        let endpoint = sdk_url(&config.host)?;

        let client = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GuestError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            request_counter: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Invoke `method` with the given (already serialised) parameter XML and
    /// return the `<{method}Response>` element.
    pub async fn invoke(&self, method: &str, params: &str) -> GuestResult<Element> {
        let req_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("vim25 request #{req_id}: {method}");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml; charset=utf-8"));
        let action = format!("{NS_VIM25}/{VIM_VERSION}");
        headers.insert(
            "SOAPAction",
            HeaderValue::from_str(&action)
                .map_err(|e| GuestError::parse(format!("Bad SOAPAction header: {e}")))?,
        );

        let resp = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(envelope(method, params))
            .send()
            .await
            .map_err(|e| GuestError::from(e).context(format!("{method} request failed")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GuestError::from(e).context(format!("Failed to read {method} response")))?;

        trace!("vim25 response #{req_id}: status={}, body length={}", status, body.len());

        let doc = match xml::parse(&body) {
            Ok(doc) => doc,
            Err(_) if !status.is_success() => {
                error!("{method} failed with HTTP {}", status.as_u16());
                return Err(GuestError::api(
                    status.as_u16(),
                    format!("{method} failed (HTTP {}): {}", status.as_u16(), snippet(&body)),
                ));
            }
            Err(e) => return Err(e.context(format!("Malformed {method} response"))),
        };

        let body_el = doc
            .child("Body")
            .ok_or_else(|| GuestError::parse(format!("{method} response has no SOAP Body")))?;

        if let Some(fault) = body_el.child("Fault") {
            let err = fault_to_error(method, fault);
            debug!("{method} fault: {err}");
            return Err(err);
        }

        if !status.is_success() {
            return Err(GuestError::api(
                status.as_u16(),
                format!("{method} failed (HTTP {})", status.as_u16()),
            ));
        }

        let response_name = format!("{method}Response");
        body_el
            .child(&response_name)
            .cloned()
            .ok_or_else(|| GuestError::parse(format!("Missing <{response_name}> in response")))
    }
}

// ─── Envelope / parameter helpers ────────────────────────────────────

/// Wrap a method call in a SOAP 1.1 envelope.
pub fn envelope(method: &str, params: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{NS_SOAPENV}" xmlns:xsd="{NS_XSD}" xmlns:xsi="{NS_XSI}">
  <soapenv:Body>
    <{method} xmlns="{NS_VIM25}">{params}</{method}>
  </soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// `<tag type="Kind">value</tag>`
pub fn moref(tag: &str, obj: &ManagedObjectRef) -> String {
    format!(
        r#"<{tag} type="{}">{}</{tag}>"#,
        xml::escape(&obj.kind),
        xml::escape(&obj.value)
    )
}

/// `<tag>value</tag>` with the value escaped.
pub fn text(tag: &str, value: &str) -> String {
    format!("<{tag}>{}</{tag}>", xml::escape(value))
}

/// Read a managed object reference out of an element carrying a `type` attribute.
pub fn parse_moref(el: &Element) -> Option<ManagedObjectRef> {
    let kind = el.attr("type")?;
    let value = el.text.trim();
    if value.is_empty() {
        return None;
    }
    Some(ManagedObjectRef::new(kind, value))
}

/// Normalise `--host` into the `/sdk` endpoint URL.
///
/// Accepts `vcsa.lab`, `vcsa.lab:8443`, `https://vcsa.lab` and
/// `https://vcsa.lab/sdk`.
pub fn sdk_url(host: &str) -> GuestResult<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(GuestError::missing_input("vSphere host is empty"));
    }
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let mut url = Url::parse(&with_scheme)
        .map_err(|e| GuestError::parse(format!("failed to parse host URL '{host}': {e}")))?;
    if url.host_str().is_none() {
        return Err(GuestError::parse(format!("host URL '{host}' has no host")));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/sdk");
    }
    Ok(url)
}

fn fault_to_error(method: &str, fault: &Element) -> GuestError {
    let message = fault
        .child_text("faultstring")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown SOAP fault")
        .to_string();

    // <detail><InvalidLoginFault xsi:type="InvalidLogin"/></detail>
    let detail = fault
        .child("detail")
        .and_then(|d| d.children.first())
        .map(|d| d.attr("xsi:type").unwrap_or(d.name.as_str()).trim_end_matches("Fault").to_string())
        .unwrap_or_default();

    let text = if detail.is_empty() {
        format!("{method}: {message}")
    } else {
        format!("{method}: {message} ({detail})")
    };

    match detail.as_str() {
        "InvalidLogin" | "NotAuthenticated" | "InvalidGuestLogin" | "GuestPermissionDenied" => {
            GuestError::auth(text)
        }
        "FileNotFound" | "GuestProcessNotFound" | "ManagedObjectNotFound" => {
            GuestError::not_found(text)
        }
        _ => GuestError::fault(text),
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(300)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuestErrorKind;

    #[test]
    fn test_sdk_url_variants() {
        assert_eq!(sdk_url("vcsa.lab").unwrap().as_str(), "https://vcsa.lab/sdk");
        assert_eq!(sdk_url("vcsa.lab:8443").unwrap().as_str(), "https://vcsa.lab:8443/sdk");
        assert_eq!(sdk_url("https://vcsa.lab/").unwrap().as_str(), "https://vcsa.lab/sdk");
        assert_eq!(sdk_url("https://vcsa.lab/sdk").unwrap().as_str(), "https://vcsa.lab/sdk");
        assert_eq!(
            sdk_url("http://10.0.0.5/custom").unwrap().as_str(),
            "http://10.0.0.5/custom"
        );
    }

    #[test]
    fn test_sdk_url_rejects_empty() {
        let err = sdk_url("  ").unwrap_err();
        assert_eq!(err.kind, GuestErrorKind::MissingInput);
    }

    #[test]
    fn test_envelope_wraps_method() {
        let env = envelope("Logout", &moref("_this", &ManagedObjectRef::new("SessionManager", "SessionManager")));
        assert!(env.contains(r#"<Logout xmlns="urn:vim25"><_this type="SessionManager">SessionManager</_this></Logout>"#));
        assert!(env.starts_with("<?xml"));
    }

    #[test]
    fn test_text_escapes() {
        assert_eq!(text("password", "a<b&c"), "<password>a&lt;b&amp;c</password>");
    }

    #[test]
    fn test_parse_moref() {
        let el = xml::parse(r#"<returnval type="Datacenter">datacenter-3</returnval>"#).unwrap();
        assert_eq!(parse_moref(&el), Some(ManagedObjectRef::new("Datacenter", "datacenter-3")));
        let untyped = xml::parse("<returnval>x</returnval>").unwrap();
        assert_eq!(parse_moref(&untyped), None);
    }

    fn fault_of(xml_body: &str) -> GuestError {
        let doc = xml::parse(xml_body).unwrap();
        let fault = doc.find("Fault").unwrap();
        fault_to_error("Login", fault)
    }

    #[test]
    fn test_invalid_login_fault_is_auth() {
        let err = fault_of(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
                 xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><soapenv:Body>
               <soapenv:Fault><faultcode>ServerFaultCode</faultcode>
                 <faultstring>Cannot complete login due to an incorrect user name or password.</faultstring>
                 <detail><InvalidLoginFault xmlns="urn:vim25" xsi:type="InvalidLogin"></InvalidLoginFault></detail>
               </soapenv:Fault></soapenv:Body></soapenv:Envelope>"#,
        );
        assert_eq!(err.kind, GuestErrorKind::AuthenticationError);
        assert!(err.message.contains("incorrect user name or password"));
        assert!(err.message.contains("InvalidLogin"));
    }

    #[test]
    fn test_file_not_found_fault() {
        let err = fault_of(
            r#"<Envelope><Body><Fault><faultstring>File /tmp/x was not found</faultstring>
               <detail><FileNotFoundFault/></detail></Fault></Body></Envelope>"#,
        );
        assert_eq!(err.kind, GuestErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_fault_without_detail() {
        let err = fault_of("<Envelope><Body><Fault><faultstring>boom</faultstring></Fault></Body></Envelope>");
        assert_eq!(err.kind, GuestErrorKind::SoapFault);
        assert_eq!(err.message, "Login: boom");
    }
}
