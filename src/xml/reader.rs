//! Pull-style XML reader with one token of lookahead.
//!
//! Wraps a quick-xml reader over the whole document text so that unmodeled
//! sub-trees can be captured verbatim as the exact source bytes.

use quick_xml::errors::IllFormedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, SedaError};

/// Attributes of a start element, in document order, keyed by qualified name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlAttributes(Vec<(String, String)>);

impl XmlAttributes {
    /// Get an attribute value by its qualified name ("id", "xml:lang", ...)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Element identifier, accepting both `id` and `xml:id`
    pub fn id(&self) -> Option<&str> {
        self.get("id").or_else(|| self.get("xml:id"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A significant XML token. Whitespace-only text, comments, processing
/// instructions and declarations never surface as tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlToken {
    /// Element start, with its local name
    Start { name: String, attributes: XmlAttributes },
    /// Element end, with its local name
    End { name: String },
    /// Unescaped character data
    Text(String),
    Eof,
}

impl XmlToken {
    fn describe(&self) -> String {
        match self {
            XmlToken::Start { name, .. } => format!("<{}>", name),
            XmlToken::End { name } => format!("</{}>", name),
            XmlToken::Text(text) => format!("text '{}'", text.trim()),
            XmlToken::Eof => "end of document".to_string(),
        }
    }
}

/// Token with its byte span in the source document
#[derive(Debug, Clone)]
struct Spanned {
    token: XmlToken,
    start: usize,
    end: usize,
}

/// Saved reader position, see [`SedaXmlReader::mark`]
#[derive(Debug, Clone)]
pub struct ReaderMark {
    position: usize,
    open: Vec<String>,
}

/// Streaming reader used by every importer in the crate
pub struct SedaXmlReader<'a> {
    input: &'a str,
    /// Offset of the inner reader's slice in `input`
    base: usize,
    reader: Reader<&'a [u8]>,
    peeked: Option<Spanned>,
    /// Names of the elements entered and not yet closed
    open: Vec<String>,
}

fn configured_reader(input: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(input);
    let config = reader.config_mut();
    config.expand_empty_elements = true;
    // End names are checked here, which keeps `reset` possible mid-document
    config.check_end_names = false;
    reader
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| SedaError::malformed("?", format!("invalid UTF-8 name: {}", e)))
}

fn attributes_of(start: &BytesStart<'_>) -> Result<XmlAttributes> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlAttributes(attributes))
}

impl<'a> SedaXmlReader<'a> {
    /// Create a reader over a complete document or fragment
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            base: 0,
            reader: configured_reader(input),
            peeked: None,
            open: Vec::new(),
        }
    }

    /// Slash-separated path of the currently open elements, for error context
    pub fn current_path(&self) -> String {
        if self.open.is_empty() {
            "document".to_string()
        } else {
            self.open.join("/")
        }
    }

    fn position(&self) -> usize {
        self.base + self.reader.buffer_position() as usize
    }

    fn read_spanned(&mut self) -> Result<Spanned> {
        loop {
            let start = self.position();
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(quick_xml::Error::IllFormed(IllFormedError::UnmatchedEndTag(name))) => {
                    // After a reset the inner reader has not seen the start
                    // tags of the elements still open here
                    let local = name.rsplit(':').next().unwrap_or_default().to_string();
                    if self.open.last() != Some(&local) {
                        return Err(SedaError::UnexpectedElement {
                            expected: format!("end of {}", self.current_path()),
                            found: format!("</{}>", name),
                        });
                    }
                    return Ok(Spanned {
                        token: XmlToken::End { name: local },
                        start,
                        end: self.position(),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            let end = self.position();
            let token = match event {
                Event::Start(e) => XmlToken::Start {
                    name: utf8(e.local_name().as_ref())?,
                    attributes: attributes_of(&e)?,
                },
                Event::End(e) => XmlToken::End {
                    name: utf8(e.local_name().as_ref())?,
                },
                Event::Empty(e) => {
                    return Err(SedaError::malformed(
                        utf8(e.local_name().as_ref())?,
                        "empty element not expanded by the reader",
                    ))
                }
                Event::Text(e) => {
                    let text = e.unescape()?;
                    if text.trim().is_empty() {
                        continue;
                    }
                    XmlToken::Text(text.into_owned())
                }
                Event::CData(e) => XmlToken::Text(String::from_utf8_lossy(&e).into_owned()),
                Event::Eof => XmlToken::Eof,
                _ => continue,
            };
            return Ok(Spanned { token, start, end });
        }
    }

    fn peek_spanned(&mut self) -> Result<&Spanned> {
        let spanned = match self.peeked.take() {
            Some(spanned) => spanned,
            None => self.read_spanned()?,
        };
        Ok(self.peeked.insert(spanned))
    }

    fn take_spanned(&mut self) -> Result<Spanned> {
        let spanned = match self.peeked.take() {
            Some(spanned) => spanned,
            None => self.read_spanned()?,
        };
        match &spanned.token {
            XmlToken::Start { name, .. } => self.open.push(name.clone()),
            XmlToken::End { .. } => {
                self.open.pop();
            }
            _ => {}
        }
        Ok(spanned)
    }

    // ========== Lookahead ==========

    /// Look at the next significant token without consuming it
    pub fn peek_token(&mut self) -> Result<&XmlToken> {
        Ok(&self.peek_spanned()?.token)
    }

    /// Consume the next significant token
    pub fn next_token(&mut self) -> Result<XmlToken> {
        Ok(self.take_spanned()?.token)
    }

    /// Local name of the next element if the next token starts one
    pub fn peek_name(&mut self) -> Result<Option<&str>> {
        match self.peek_token()? {
            XmlToken::Start { name, .. } => Ok(Some(name.as_str())),
            _ => Ok(None),
        }
    }

    /// True if the next token starts an element with this name
    pub fn peek_block_if_named(&mut self, name: &str) -> Result<bool> {
        Ok(self.peek_name()? == Some(name))
    }

    /// Attribute of the next start element, if any
    pub fn peek_attribute(&mut self, attribute: &str) -> Result<Option<String>> {
        match self.peek_token()? {
            XmlToken::Start { attributes, .. } => Ok(attributes.get(attribute).map(str::to_string)),
            _ => Ok(None),
        }
    }

    /// Attribute of the next start element when that element has the given name
    pub fn peek_attribute_block_if_named(&mut self, name: &str, attribute: &str) -> Result<Option<String>> {
        if self.peek_block_if_named(name)? {
            self.peek_attribute(attribute)
        } else {
            Ok(None)
        }
    }

    /// True if the next token closes the current element
    pub fn peek_is_end(&mut self) -> Result<bool> {
        Ok(matches!(self.peek_token()?, XmlToken::End { .. }))
    }

    // ========== Block navigation ==========

    /// Enter the next element if it has this name, returning its attributes
    pub fn next_block_if_named(&mut self, name: &str) -> Result<Option<XmlAttributes>> {
        if !self.peek_block_if_named(name)? {
            return Ok(None);
        }
        match self.next_token()? {
            XmlToken::Start { attributes, .. } => Ok(Some(attributes)),
            _ => Ok(None),
        }
    }

    /// Enter the next element, which must have this name
    pub fn next_mandatory_block(&mut self, name: &str) -> Result<XmlAttributes> {
        let context = self.current_path();
        match self.next_block_if_named(name)? {
            Some(attributes) => Ok(attributes),
            None => {
                let found = self.peek_token()?.describe();
                Err(SedaError::UnexpectedElement {
                    expected: format!("<{}> in {}", name, context),
                    found,
                })
            }
        }
    }

    /// Consume the closing tag of the named element
    pub fn end_block_named(&mut self, name: &str) -> Result<()> {
        let context = self.current_path();
        let spanned = self.take_spanned()?;
        match spanned.token {
            XmlToken::End { name: ref end } if end == name => Ok(()),
            XmlToken::Eof => Err(SedaError::UnexpectedEnd { context }),
            other => Err(SedaError::UnexpectedElement {
                expected: format!("</{}> in {}", name, context),
                found: other.describe(),
            }),
        }
    }

    fn read_text_until_end(&mut self, name: &str) -> Result<String> {
        let mut value = String::new();
        loop {
            match self.take_spanned()?.token {
                XmlToken::Text(text) => value.push_str(&text),
                XmlToken::End { name: end } if end == name => return Ok(value),
                XmlToken::Eof => {
                    return Err(SedaError::UnexpectedEnd {
                        context: self.current_path(),
                    })
                }
                other => {
                    return Err(SedaError::malformed(
                        name,
                        format!("unexpected {} in simple value", other.describe()),
                    ))
                }
            }
        }
    }

    /// Read a simple text element if the next element has this name
    pub fn next_value_if_named(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self
            .next_value_with_attributes_if_named(name)?
            .map(|(value, _)| value))
    }

    /// Read a simple text element and its attributes if the next element has this name
    pub fn next_value_with_attributes_if_named(
        &mut self,
        name: &str,
    ) -> Result<Option<(String, XmlAttributes)>> {
        match self.next_block_if_named(name)? {
            Some(attributes) => {
                let value = self.read_text_until_end(name)?;
                Ok(Some((value, attributes)))
            }
            None => Ok(None),
        }
    }

    /// Read a simple text element that must be present
    pub fn next_mandatory_value(&mut self, name: &str) -> Result<String> {
        let context = self.current_path();
        self.next_value_if_named(name)?
            .ok_or_else(|| SedaError::MissingElement {
                element: name.to_string(),
                context,
            })
    }

    /// Capture the next element verbatim if it has this name
    pub fn next_block_as_string_if_named(&mut self, name: &str) -> Result<Option<String>> {
        if self.peek_block_if_named(name)? {
            self.next_block_as_string().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Capture the next element, whatever its name, as its exact source text
    pub fn next_block_as_string(&mut self) -> Result<String> {
        let first = self.take_spanned()?;
        let name = match first.token {
            XmlToken::Start { name, .. } => name,
            other => {
                return Err(SedaError::UnexpectedElement {
                    expected: format!("element start in {}", self.current_path()),
                    found: other.describe(),
                })
            }
        };

        let mut depth = 1usize;
        loop {
            let spanned = self.take_spanned()?;
            match spanned.token {
                XmlToken::Start { .. } => depth += 1,
                XmlToken::End { .. } => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.input[first.start..spanned.end].to_string());
                    }
                }
                XmlToken::Eof => return Err(SedaError::UnexpectedEnd { context: name }),
                XmlToken::Text(_) => {}
            }
        }
    }

    /// Consume the next element and everything it contains
    pub fn skip_block(&mut self) -> Result<()> {
        self.next_block_as_string().map(|_| ())
    }

    /// Fail unless only insignificant content remains
    pub fn expect_end_of_document(&mut self) -> Result<()> {
        match self.next_token()? {
            XmlToken::Eof => Ok(()),
            other => Err(SedaError::UnexpectedElement {
                expected: "end of document".to_string(),
                found: other.describe(),
            }),
        }
    }

    // ========== Backtracking ==========

    /// Remember the position of the next unconsumed token
    pub fn mark(&self) -> ReaderMark {
        let position = match &self.peeked {
            Some(spanned) => spanned.start,
            None => self.position(),
        };
        ReaderMark {
            position,
            open: self.open.clone(),
        }
    }

    /// Return to a previously marked position
    pub fn reset(&mut self, mark: ReaderMark) {
        self.reader = configured_reader(&self.input[mark.position..]);
        self.base = mark.position;
        self.peeked = None;
        self.open = mark.open;
    }
}
