//! Minimal namespace-agnostic XML tree used by the parsers.
//!
//! The backbone is inconsistent about namespace prefixes across message
//! variants, so matching happens on local names only.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::errors::EnvelopeParsingError;

#[derive(Debug, Clone, Default)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First element with the given local name in document order,
    /// including self.
    pub fn descendant(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.descendant(name))
    }

    /// All elements with the given local name in document order.
    pub fn descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.descendants(name, found);
        }
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text of the first descendant with the given local name.
    pub fn text_of(&self, name: &str) -> Option<String> {
        self.descendant(name).map(|e| e.text.trim().to_string())
    }
}

/// Parse a document into an [`XmlElement`] tree rooted at the document
/// element.
pub(crate) fn parse_document(input: &str) -> Result<XmlElement, EnvelopeParsingError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| EnvelopeParsingError::MalformedXml {
                    message: "unbalanced closing tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let unescaped = text
                    .unescape()
                    .map_err(|e| EnvelopeParsingError::MalformedXml {
                        message: e.to_string(),
                    })?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(EnvelopeParsingError::MalformedXml {
                    message: e.to_string(),
                })
            }
        }
    }

    if !stack.is_empty() {
        return Err(EnvelopeParsingError::MalformedXml {
            message: "unclosed element".to_string(),
        });
    }
    root.ok_or_else(|| EnvelopeParsingError::MalformedXml {
        message: "no document element".to_string(),
    })
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, EnvelopeParsingError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| EnvelopeParsingError::MalformedXml {
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| EnvelopeParsingError::MalformedXml {
                message: e.to_string(),
            })?
            .to_string();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), EnvelopeParsingError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(EnvelopeParsingError::MalformedXml {
            message: "multiple document elements".to_string(),
        });
    }
    Ok(())
}
