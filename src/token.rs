//! Token source abstraction and the quick-xml backed reference tokenizer
//!
//! The schema engine only ever looks at one structural event at a time:
//! element start, element end, or text. Attribute lookup is available for the
//! most recent element start. A self-closing element is reported as a single
//! [`Event::ElementStart`] with [`TokenSource::is_empty_element`] returning
//! true; no matching end event follows.

use std::fmt;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;

use crate::error::{ImportError, Result};

/// Structural event produced by a token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start of an element (local name, namespace prefix stripped).
    ElementStart(String),
    /// End of an element (local name).
    ElementEnd(String),
    /// Character content between elements.
    Text(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ElementStart(name) => write!(f, "<{name}>"),
            Event::ElementEnd(name) => write!(f, "</{name}>"),
            Event::Text(_) => write!(f, "text content"),
        }
    }
}

/// Streaming access to one XML document, one event of lookahead.
///
/// Implementations keep no buffering beyond the current node: after
/// [`TokenSource::next`] returns an element start, attribute lookup refers to
/// that element until the next call.
pub trait TokenSource {
    /// Advance to the next structural event. `None` means end of document.
    fn next(&mut self) -> Result<Option<Event>>;

    /// Whether the most recent element start was self-closing.
    fn is_empty_element(&self) -> bool;

    /// Attribute value by local name on the current element.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Attribute value by position on the current element.
    fn attribute_at(&self, index: usize) -> Option<String>;
}

/// Extract the local part of a possibly namespace-prefixed XML name.
pub(crate) fn local_part(name: &str) -> &str {
    match name.rfind(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Token source backed by a `quick_xml::Reader`.
///
/// Comments, processing instructions and the XML declaration are passed
/// over; CDATA sections surface as text. Namespace prefixes are stripped so
/// schemas match on local names.
pub struct XmlTokenSource<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    attributes: Vec<(String, String)>,
    empty_element: bool,
    file: String,
}

impl XmlTokenSource<std::io::Cursor<Vec<u8>>> {
    /// Build a token source over in-memory XML text.
    pub fn from_xml(xml: impl Into<Vec<u8>>, file: impl Into<String>) -> Self {
        Self::new(std::io::Cursor::new(xml.into()), file)
    }
}

impl<R: BufRead> XmlTokenSource<R> {
    /// Wrap a buffered reader. `file` labels errors with the origin document.
    pub fn new(reader: R, file: impl Into<String>) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            attributes: Vec::new(),
            empty_element: false,
            file: file.into(),
        }
    }

    fn xml_error(file: &str, details: impl fmt::Display) -> ImportError {
        ImportError::Xml {
            file: file.to_string(),
            details: details.to_string(),
        }
    }
}

impl<R: BufRead> TokenSource for XmlTokenSource<R> {
    fn next(&mut self) -> Result<Option<Event>> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf);
            let is_empty = matches!(&event, Ok(XmlEvent::Empty(_)));
            match event {
                Ok(XmlEvent::Start(ref e)) | Ok(XmlEvent::Empty(ref e)) => {
                    let qname = e.name();
                    let name = std::str::from_utf8(qname.as_ref())
                        .map_err(|err| Self::xml_error(&self.file, err))?;
                    let name = local_part(name).to_string();
                    self.attributes.clear();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| Self::xml_error(&self.file, err))?;
                        let key = std::str::from_utf8(attr.key.as_ref())
                            .map_err(|err| Self::xml_error(&self.file, err))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| Self::xml_error(&self.file, err))?;
                        self.attributes
                            .push((local_part(key).to_string(), value.into_owned()));
                    }
                    self.empty_element = is_empty;
                    return Ok(Some(Event::ElementStart(name)));
                }
                Ok(XmlEvent::End(ref e)) => {
                    let qname = e.name();
                    let name = std::str::from_utf8(qname.as_ref())
                        .map_err(|err| Self::xml_error(&self.file, err))?;
                    let name = local_part(name).to_string();
                    self.empty_element = false;
                    self.attributes.clear();
                    return Ok(Some(Event::ElementEnd(name)));
                }
                Ok(XmlEvent::Text(ref t)) => {
                    let text = t
                        .unescape()
                        .map_err(|err| Self::xml_error(&self.file, err))?;
                    if text.is_empty() {
                        continue;
                    }
                    self.empty_element = false;
                    return Ok(Some(Event::Text(text.into_owned())));
                }
                Ok(XmlEvent::CData(ref t)) => {
                    let text = std::str::from_utf8(t)
                        .map_err(|err| Self::xml_error(&self.file, err))?
                        .to_string();
                    self.empty_element = false;
                    return Ok(Some(Event::Text(text)));
                }
                Ok(XmlEvent::Eof) => return Ok(None),
                // Declaration, comments, PIs, DOCTYPE carry no structure.
                Ok(_) => continue,
                Err(err) => return Err(Self::xml_error(&self.file, err)),
            }
        }
    }

    fn is_empty_element(&self) -> bool {
        self.empty_element
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn attribute_at(&self, index: usize) -> Option<String> {
        self.attributes.get(index).map(|(_, value)| value.clone())
    }
}
