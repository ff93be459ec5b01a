//
// Small extensions on xmltree::Element: building elements from
// prefixed names, and streaming them out through an xml-rs EventWriter.
//
use std::io::{Read, Write};

use xml::writer::{EventWriter, XmlEvent as XmlWEvent};
use xmltree::{Element, XMLNode};

use crate::errors::DavError;

pub(crate) trait ElementExt {
    fn new2(name: &str) -> Element;
    fn text(self, text: impl Into<String>) -> Element;
    fn ns(self, prefix: &str, uri: &str) -> Element;
    fn parse2<R: Read>(r: R) -> Result<Element, DavError>;
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> Result<(), DavError>;
    fn child_elems(&self) -> Vec<&Element>;
    fn text_content(&self) -> Option<String>;
}

impl ElementExt for Element {
    // Build an element from a possibly prefixed name like "D:href".
    fn new2(name: &str) -> Element {
        match name.split_once(':') {
            Some((prefix, local)) => {
                let mut e = Element::new(local);
                e.prefix = Some(prefix.to_string());
                e
            }
            None => Element::new(name),
        }
    }

    fn text(mut self, text: impl Into<String>) -> Element {
        self.children.push(XMLNode::Text(text.into()));
        self
    }

    fn ns(mut self, prefix: &str, uri: &str) -> Element {
        let mut namespaces = self
            .namespaces
            .take()
            .unwrap_or_else(xmltree::Namespace::empty);
        namespaces.put(prefix, uri);
        self.namespaces = Some(namespaces);
        if self.prefix.as_deref() == Some(prefix) {
            self.namespace = Some(uri.to_string());
        }
        self
    }

    fn parse2<R: Read>(r: R) -> Result<Element, DavError> {
        Element::parse(r).map_err(|_| DavError::XmlParseError)
    }

    // Recursively write this element. Namespace declarations of
    // ancestors are assumed to be in scope.
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> Result<(), DavError> {
        let name = match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        };
        let mut ev = XmlWEvent::start_element(name.as_str());
        if let Some(namespaces) = &self.namespaces {
            for (prefix, uri) in namespaces.0.iter() {
                if prefix.is_empty() || prefix == "xml" || prefix == "xmlns" {
                    continue;
                }
                ev = ev.ns(prefix.as_str(), uri.as_str());
            }
        }
        if self.namespaces.is_none() {
            if let (Some(prefix), Some(uri)) = (&self.prefix, &self.namespace) {
                ev = ev.ns(prefix.as_str(), uri.as_str());
            }
        }
        for (key, value) in &self.attributes {
            ev = ev.attr(key.as_str(), value.as_str());
        }
        emitter.write(ev)?;
        for node in &self.children {
            match node {
                XMLNode::Element(e) => e.write_ev(emitter)?,
                XMLNode::Text(t) => emitter.write(XmlWEvent::characters(t))?,
                _ => {}
            }
        }
        emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    fn child_elems(&self) -> Vec<&Element> {
        self.children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn text_content(&self) -> Option<String> {
        self.get_text().map(|t| t.into_owned())
    }
}

// Serialize a single element to a standalone XML fragment.
pub(crate) fn element_to_xml(elem: &Element) -> Result<Vec<u8>, DavError> {
    let mut emitter = EventWriter::new_with_config(
        Vec::new(),
        xml::EmitterConfig {
            write_document_declaration: false,
            normalize_empty_elements: false,
            perform_indent: false,
            ..Default::default()
        },
    );
    elem.write_ev(&mut emitter)?;
    Ok(emitter.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new2_splits_prefix() {
        let e = Element::new2("D:href");
        assert_eq!(e.prefix.as_deref(), Some("D"));
        assert_eq!(e.name, "href");
        assert_eq!(Element::new2("plain").prefix, None);
    }

    #[test]
    fn roundtrip_fragment() {
        let e = Element::new2("D:owner")
            .ns("D", "DAV:")
            .text("hello");
        let xml = element_to_xml(&e).unwrap();
        let parsed = Element::parse2(std::io::Cursor::new(xml)).unwrap();
        assert_eq!(parsed.name, "owner");
        assert_eq!(parsed.text_content().as_deref(), Some("hello"));
    }
}
