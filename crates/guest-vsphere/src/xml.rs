//! Minimal XML element tree for vim25 SOAP responses.
//!
//! Responses are small and deeply nested (`Envelope/Body/FooResponse/returnval/...`),
//! so they are read into an owned tree with namespace prefixes stripped and then
//! navigated by local name.

use crate::error::{GuestError, GuestResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name (prefix stripped).
    pub name: String,
    /// Attributes keyed by qualified name (`type`, `xsi:type`).
    pub attrs: HashMap<String, String>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Walk a `/`-separated path of local names from this element.
    pub fn path(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(self, |el, part| el.child(part))
    }

    /// Depth-first search for the first descendant (or self) with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Parse an XML document into its root element.
pub fn parse(xml: &str) -> GuestResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(start_element(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let el = start_element(e)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| GuestError::parse(format!("Bad XML text: {err}")))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(GuestError::parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    root.ok_or_else(|| GuestError::parse("Empty XML document"))
}

fn start_element(e: &BytesStart<'_>) -> GuestResult<Element> {
    let mut el = Element {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| GuestError::parse(format!("Bad XML attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| GuestError::parse(format!("Bad XML attribute value: {err}")))?;
        el.attrs.insert(key, value.into_owned());
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

/// Escape special characters for XML content.
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soapenv:Body>
    <FindByInventoryPathResponse xmlns="urn:vim25">
      <returnval type="VirtualMachine">vm-42</returnval>
      <note>a &amp; b</note>
      <empty xsi:nil="true"/>
    </FindByInventoryPathResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

    #[test]
    fn test_parse_strips_prefixes() {
        let root = parse(SAMPLE).unwrap();
        assert_eq!(root.name, "Envelope");
        let resp = root.path("Body/FindByInventoryPathResponse").unwrap();
        let rv = resp.child("returnval").unwrap();
        assert_eq!(rv.text, "vm-42");
        assert_eq!(rv.attr("type"), Some("VirtualMachine"));
    }

    #[test]
    fn test_text_is_unescaped() {
        let root = parse(SAMPLE).unwrap();
        assert_eq!(root.find("note").unwrap().text, "a & b");
    }

    #[test]
    fn test_empty_element_has_attrs() {
        let root = parse(SAMPLE).unwrap();
        let empty = root.find("empty").unwrap();
        assert_eq!(empty.attr("xsi:nil"), Some("true"));
        assert_eq!(empty.attr("nil"), None);
        assert!(empty.children.is_empty());
    }

    #[test]
    fn test_children_named() {
        let root = parse("<a><b>1</b><c/><b>2</b></a>").unwrap();
        let texts: Vec<&str> = root.children_named("b").map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn test_malformed_is_parse_error() {
        assert!(parse("").is_err());
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("it's <x> & \"y\""), "it&apos;s &lt;x&gt; &amp; &quot;y&quot;");
    }
}
