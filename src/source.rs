//! Forward-only document event streams
//!
//! Both passes of a conversion read the same logical document. A source is
//! therefore a factory: every call to [`EventSource::open`] yields a fresh,
//! independent stream starting at the top of the document. Streams are never
//! rewound.

use crate::error::{ConvertError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;
use xml::name::OwnedName;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

/// A structural event from the document
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// An element opened. The document root has depth 0.
    Open {
        name: String,
        attributes: Vec<(String, String)>,
        depth: usize,
    },
    /// An element closed. `text` is the element's own character data before
    /// its first child element, `None` when there was none.
    Close {
        name: String,
        attributes: Vec<(String, String)>,
        text: Option<String>,
        depth: usize,
    },
}

pub type EventStream<'a> = Box<dyn Iterator<Item = Result<DocEvent>> + 'a>;

/// Factory for independent forward-only passes over one document
pub trait EventSource {
    fn open(&self) -> Result<EventStream<'_>>;
}

#[derive(Debug, Clone)]
enum XmlInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// XML document source backed by xml-rs
#[derive(Debug, Clone)]
pub struct XmlSource {
    input: XmlInput,
    entities: HashMap<String, String>,
}

impl XmlSource {
    /// Read the document from a file, reopened for every pass
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        XmlSource {
            input: XmlInput::Path(path.into()),
            entities: HashMap::new(),
        }
    }

    /// Read the document from an in-memory buffer
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        XmlSource {
            input: XmlInput::Bytes(bytes.into()),
            entities: HashMap::new(),
        }
    }

    /// Register general entities declared outside the document (e.g. in a DTD)
    pub fn with_entities(mut self, entities: HashMap<String, String>) -> Self {
        self.entities.extend(entities);
        self
    }

    fn parser_config(&self) -> ParserConfig {
        let mut config = ParserConfig::new()
            .trim_whitespace(false)
            .cdata_to_characters(true)
            .ignore_comments(true)
            .coalesce_characters(true);
        for (name, value) in &self.entities {
            config = config.add_entity(name.clone(), value.clone());
        }
        config
    }
}

impl EventSource for XmlSource {
    fn open(&self) -> Result<EventStream<'_>> {
        let config = self.parser_config();
        match &self.input {
            XmlInput::Path(path) => {
                let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
                Ok(Box::new(XmlEvents::new(config.create_reader(BufReader::new(file)))))
            }
            XmlInput::Bytes(bytes) => {
                Ok(Box::new(XmlEvents::new(config.create_reader(Cursor::new(bytes.as_slice())))))
            }
        }
    }
}

/// An element that has opened but not yet closed
struct OpenElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    seen_child: bool,
}

/// Adapts raw xml-rs events into [`DocEvent`]s.
///
/// Only the currently open ancestors are held in memory, so a stream never
/// buffers more than one branch of the document.
pub struct XmlEvents<R: Read> {
    reader: EventReader<R>,
    stack: Vec<OpenElement>,
    finished: bool,
}

impl<R: Read> XmlEvents<R> {
    pub fn new(reader: EventReader<R>) -> Self {
        XmlEvents {
            reader,
            stack: Vec::new(),
            finished: false,
        }
    }
}

impl<R: Read> Iterator for XmlEvents<R> {
    type Item = Result<DocEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let event = match self.reader.next() {
                Ok(event) => event,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ConvertError::Source(e.to_string())));
                }
            };

            match event {
                XmlEvent::StartElement { name, attributes, .. } => {
                    if let Some(parent) = self.stack.last_mut() {
                        parent.seen_child = true;
                    }
                    let depth = self.stack.len();
                    let name = qualified(&name);
                    let attributes: Vec<(String, String)> = attributes
                        .into_iter()
                        .map(|attr| (qualified(&attr.name), attr.value))
                        .collect();

                    self.stack.push(OpenElement {
                        name: name.clone(),
                        attributes: attributes.clone(),
                        text: String::new(),
                        seen_child: false,
                    });
                    return Some(Ok(DocEvent::Open { name, attributes, depth }));
                }
                XmlEvent::EndElement { .. } => {
                    let Some(element) = self.stack.pop() else {
                        self.finished = true;
                        return Some(Err(ConvertError::Source(
                            "closing tag without a matching opening tag".to_string(),
                        )));
                    };
                    let text = if element.text.is_empty() {
                        None
                    } else {
                        Some(element.text)
                    };
                    return Some(Ok(DocEvent::Close {
                        name: element.name,
                        attributes: element.attributes,
                        text,
                        depth: self.stack.len(),
                    }));
                }
                XmlEvent::Characters(chunk) | XmlEvent::Whitespace(chunk) => {
                    if let Some(element) = self.stack.last_mut() {
                        if !element.seen_child {
                            element.text.push_str(&chunk);
                        }
                    }
                }
                XmlEvent::EndDocument => {
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
        }
    }
}

fn qualified(name: &OwnedName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local_name),
        None => name.local_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &str) -> Vec<DocEvent> {
        XmlSource::from_bytes(xml)
            .open()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_events_carry_depth_and_text() {
        let events = collect(r#"<dblp><article key="a1"><title>A</title></article></dblp>"#);

        assert_eq!(events.len(), 6);
        assert_eq!(
            events[1],
            DocEvent::Open {
                name: "article".to_string(),
                attributes: vec![("key".to_string(), "a1".to_string())],
                depth: 1,
            }
        );
        assert_eq!(
            events[3],
            DocEvent::Close {
                name: "title".to_string(),
                attributes: vec![],
                text: Some("A".to_string()),
                depth: 2,
            }
        );
    }

    #[test]
    fn test_text_stops_at_first_child() {
        let events = collect("<r><t>Lead <i>x</i> tail</t></r>");
        let title = events
            .iter()
            .find_map(|e| match e {
                DocEvent::Close { name, text, .. } if name == "t" => Some(text.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(title, Some("Lead ".to_string()));
    }

    #[test]
    fn test_whitespace_text_is_kept_verbatim() {
        let events = collect("<r><a> </a><b></b><c/></r>");
        let texts: Vec<(&str, Option<&str>)> = events
            .iter()
            .filter_map(|e| match e {
                DocEvent::Close { name, text, depth: 1, .. } => Some((name.as_str(), text.as_deref())),
                _ => None,
            })
            .collect();

        assert_eq!(texts, vec![("a", Some(" ")), ("b", None), ("c", None)]);
    }

    #[test]
    fn test_registered_entities_resolve() {
        let mut entities = HashMap::new();
        entities.insert("uuml".to_string(), "\u{fc}".to_string());
        let source = XmlSource::from_bytes("<r><a>M&uuml;ller</a></r>").with_entities(entities);
        let events: Vec<DocEvent> = source.open().unwrap().collect::<Result<_>>().unwrap();

        assert!(events.contains(&DocEvent::Close {
            name: "a".to_string(),
            attributes: vec![],
            text: Some("M\u{fc}ller".to_string()),
            depth: 1,
        }));
    }

    #[test]
    fn test_malformed_document_is_source_error() {
        let source = XmlSource::from_bytes("<r><a></b></r>");
        let mut stream = source.open().unwrap();
        let failure = stream.find_map(|e| e.err());

        assert!(matches!(failure, Some(ConvertError::Source(_))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_each_open_is_an_independent_pass() {
        let source = XmlSource::from_bytes("<r><a>1</a></r>");
        let first = source.open().unwrap().count();
        let second = source.open().unwrap().count();
        assert_eq!(first, second);
    }
}
