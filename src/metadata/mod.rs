//! Typed metadata values
//!
//! A [`Metadata`] is one named XML element with a typed [`Value`]. Composite
//! values hold ordered children and consult the versioned schema in
//! [`schema`] both when they are parsed and when children are added, so that
//! a composite built in code serializes in schema order.

pub mod schema;
pub mod values;

pub use schema::{
    schema_for, versioned_schema, CompositeKind, CompositeSchema, SchemaEntry, ValueKind,
    VersionedSchema,
};
pub use values::SedaDateTime;

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::{Result, SedaError};
use crate::version::SedaVersion;
use crate::xml::{SedaXmlReader, SedaXmlWriter};
use values::{check_enumerated, format_date, parse_date, parse_integer};

/// Value carried by a metadata element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Text { value: String, lang: Option<String> },
    Date(NaiveDate),
    DateTime(SedaDateTime),
    Integer(i64),
    Enumerated(String),
    Code { value: String, list_version_id: Option<String> },
    Composite(Composite),
    /// Verbatim XML of an element no schema models, tags included
    AnyXml(String),
}

/// A named metadata element
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    name: String,
    value: Value,
}

/// Ordered children of a composite metadata element
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    kind: CompositeKind,
    children: Vec<Metadata>,
}

// =============================================================================
// Metadata
// =============================================================================

impl Metadata {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    // ========== Typed factories ==========

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::String(value.into()))
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>, lang: Option<&str>) -> Self {
        Self::new(
            name,
            Value::Text {
                value: value.into(),
                lang: lang.map(str::to_string),
            },
        )
    }

    pub fn date(name: impl Into<String>, value: NaiveDate) -> Self {
        Self::new(name, Value::Date(value))
    }

    pub fn date_time(name: impl Into<String>, value: SedaDateTime) -> Self {
        Self::new(name, Value::DateTime(value))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, Value::Integer(value))
    }

    /// Enumerated value, checked against its allowed set
    pub fn enumerated(name: &str, value: &str, allowed: &[&str]) -> Result<Self> {
        check_enumerated(name, value, allowed)?;
        Ok(Self::new(name, Value::Enumerated(value.to_string())))
    }

    pub fn code(name: impl Into<String>, value: impl Into<String>, list_version_id: Option<&str>) -> Self {
        Self::new(
            name,
            Value::Code {
                value: value.into(),
                list_version_id: list_version_id.map(str::to_string),
            },
        )
    }

    pub fn composite(name: impl Into<String>, composite: Composite) -> Self {
        Self::new(name, Value::Composite(composite))
    }

    /// Raw XML element; `raw` must be the complete element, tags included
    pub fn any_xml(name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::new(name, Value::AnyXml(raw.into()))
    }

    /// Keyword with its content and optional type
    pub fn keyword(version: SedaVersion, content: &str, keyword_type: Option<&str>) -> Result<Self> {
        let mut keyword = Composite::new(CompositeKind::Keyword);
        keyword.add_metadata(version, Metadata::string("KeywordContent", content))?;
        if let Some(keyword_type) = keyword_type {
            keyword.add_metadata(
                version,
                Metadata::enumerated("KeywordType", keyword_type, schema::KEYWORD_TYPES)?,
            )?;
        }
        Ok(Self::composite("Keyword", keyword))
    }

    /// Person agent (Writer, Addressee, ...) from first and birth names
    pub fn agent_person(version: SedaVersion, name: &str, first_name: &str, birth_name: &str) -> Result<Self> {
        let mut agent = Composite::new(CompositeKind::Agent);
        agent.add_metadata(version, Metadata::string("FirstName", first_name))?;
        agent.add_metadata(version, Metadata::string("BirthName", birth_name))?;
        Ok(Self::composite(name, agent))
    }

    /// Event with identifier, type and date
    pub fn event(version: SedaVersion, identifier: &str, event_type: &str, date_time: SedaDateTime) -> Result<Self> {
        let mut event = Composite::new(CompositeKind::Event);
        event.add_metadata(version, Metadata::string("EventIdentifier", identifier))?;
        event.add_metadata(version, Metadata::string("EventType", event_type))?;
        event.add_metadata(version, Metadata::date_time("EventDateTime", date_time))?;
        Ok(Self::composite("Event", event))
    }

    /// Build a value of the given schema kind from string arguments.
    ///
    /// Fixed-arity factories are tried first; composites without one take
    /// the catch-all form of alternating child name / value arguments.
    pub fn build(version: SedaVersion, name: &str, kind: ValueKind, args: &[&str]) -> Result<Self> {
        let invalid = || SedaError::InvalidArguments {
            element: name.to_string(),
            count: args.len(),
        };

        match (kind, args) {
            (ValueKind::String, [value]) => Ok(Self::string(name, *value)),
            (ValueKind::Text, [value]) => Ok(Self::text(name, *value, None)),
            (ValueKind::Text, [value, lang]) => Ok(Self::text(name, *value, Some(*lang))),
            (ValueKind::Date, [value]) => Ok(Self::date(name, parse_date(name, value)?)),
            (ValueKind::DateTime, [value]) => {
                Ok(Self::date_time(name, SedaDateTime::parse(name, value)?))
            }
            (ValueKind::Integer, [value]) => Ok(Self::integer(name, parse_integer(name, value)?)),
            (ValueKind::Enumerated(allowed), [value]) => Self::enumerated(name, value, allowed),
            (ValueKind::Code, [value]) => Ok(Self::code(name, *value, None)),
            (ValueKind::Code, [value, list_version_id]) => {
                Ok(Self::code(name, *value, Some(*list_version_id)))
            }
            (ValueKind::AnyXml, [value]) => Ok(Self::any_xml(
                name,
                format!("<{0}>{1}</{0}>", name, quick_xml::escape::escape(*value)),
            )),
            (ValueKind::Composite(CompositeKind::Keyword), [content]) => {
                Self::keyword(version, content, None)
            }
            (ValueKind::Composite(CompositeKind::Keyword), [content, keyword_type]) => {
                Self::keyword(version, content, Some(*keyword_type))
            }
            (ValueKind::Composite(CompositeKind::Agent), [first_name, birth_name]) => {
                Self::agent_person(version, name, first_name, birth_name)
            }
            (ValueKind::Composite(CompositeKind::Agent), [full_name]) => {
                let mut agent = Composite::new(CompositeKind::Agent);
                agent.add_metadata(version, Metadata::string("FullName", *full_name))?;
                Ok(Self::composite(name, agent))
            }
            (ValueKind::Composite(CompositeKind::Event), [identifier, event_type, date_time]) => {
                Self::event(
                    version,
                    identifier,
                    event_type,
                    SedaDateTime::parse("EventDateTime", date_time)?,
                )
            }
            (ValueKind::Composite(rule), [rule_id]) if rule.is_rule() => {
                let mut composite = Composite::new(rule);
                composite.add_rule(rule_id, None)?;
                Ok(Self::composite(name, composite))
            }
            (ValueKind::Composite(rule), [rule_id, start_date]) if rule.is_rule() => {
                let mut composite = Composite::new(rule);
                composite.add_rule(rule_id, Some(parse_date("StartDate", start_date)?))?;
                Ok(Self::composite(name, composite))
            }
            (ValueKind::Composite(kind), pairs) if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                let mut composite = Composite::new(kind);
                for pair in pairs.chunks(2) {
                    composite.add_new_metadata(version, pair[0], &pair[1..])?;
                }
                Ok(Self::composite(name, composite))
            }
            _ => Err(invalid()),
        }
    }

    // ========== Accessors ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match &self.value {
            Value::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut Composite> {
        match &mut self.value {
            Value::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    /// Lexical form of a leaf value; composites have none
    pub fn simple_text(&self) -> Option<String> {
        match &self.value {
            Value::String(value) | Value::Enumerated(value) => Some(value.clone()),
            Value::Text { value, .. } | Value::Code { value, .. } => Some(value.clone()),
            Value::Date(date) => Some(format_date(date)),
            Value::DateTime(date_time) => Some(date_time.to_string()),
            Value::Integer(value) => Some(value.to_string()),
            Value::AnyXml(raw) => Some(raw.clone()),
            Value::Composite(_) => None,
        }
    }

    fn accepted_by(&self, kind: ValueKind) -> Result<()> {
        let accepted = match (kind, &self.value) {
            (ValueKind::String, Value::String(_))
            | (ValueKind::Text, Value::Text { .. })
            | (ValueKind::Date, Value::Date(_))
            | (ValueKind::DateTime, Value::DateTime(_))
            | (ValueKind::Integer, Value::Integer(_))
            | (ValueKind::Code, Value::Code { .. })
            | (ValueKind::AnyXml, Value::AnyXml(_)) => true,
            (ValueKind::Enumerated(allowed), Value::Enumerated(value)) => {
                return check_enumerated(&self.name, value, allowed)
            }
            (ValueKind::Composite(expected), Value::Composite(composite)) => {
                composite.kind == expected
            }
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(SedaError::InvalidValue {
                element: self.name.clone(),
                value: self.simple_text().unwrap_or_default(),
                reason: format!("expected a {:?} value", kind),
            })
        }
    }

    // ========== XML ==========

    /// Parse the next element as a value of the given kind
    pub fn read(reader: &mut SedaXmlReader<'_>, version: SedaVersion, kind: ValueKind) -> Result<Self> {
        let name = match reader.peek_name()?.map(str::to_string) {
            Some(name) => name,
            None => {
                return Err(SedaError::MissingElement {
                    element: format!("{:?} value", kind),
                    context: reader.current_path(),
                })
            }
        };

        let value = match kind {
            ValueKind::AnyXml => Value::AnyXml(reader.next_block_as_string()?),
            ValueKind::Composite(composite_kind) => {
                reader.next_mandatory_block(&name)?;
                let composite = Composite::read_children(reader, version, composite_kind, &name)?;
                reader.end_block_named(&name)?;
                Value::Composite(composite)
            }
            _ => {
                let (text, attributes) = reader
                    .next_value_with_attributes_if_named(&name)?
                    .ok_or_else(|| SedaError::MissingElement {
                        element: name.clone(),
                        context: reader.current_path(),
                    })?;
                match kind {
                    ValueKind::Text => Value::Text {
                        value: text,
                        lang: attributes.get("xml:lang").map(str::to_string),
                    },
                    ValueKind::Code => Value::Code {
                        value: text,
                        list_version_id: attributes.get("listVersionID").map(str::to_string),
                    },
                    ValueKind::Date => Value::Date(parse_date(&name, &text)?),
                    ValueKind::DateTime => Value::DateTime(SedaDateTime::parse(&name, &text)?),
                    ValueKind::Integer => Value::Integer(parse_integer(&name, &text)?),
                    ValueKind::Enumerated(allowed) => {
                        let text = text.trim().to_string();
                        check_enumerated(&name, &text, allowed)?;
                        Value::Enumerated(text)
                    }
                    _ => Value::String(text),
                }
            }
        };

        Ok(Self { name, value })
    }

    /// Parse a standalone XML fragment holding one element
    pub fn from_xml(xml: &str, version: SedaVersion, kind: ValueKind) -> Result<Self> {
        let mut reader = SedaXmlReader::new(xml);
        let metadata = Self::read(&mut reader, version, kind)?;
        reader.expect_end_of_document()?;
        Ok(metadata)
    }

    pub fn write(&self, writer: &mut SedaXmlWriter) -> Result<()> {
        match &self.value {
            Value::String(value) | Value::Enumerated(value) => {
                writer.write_element_value(&self.name, value)
            }
            Value::Text { value, lang } => {
                writer.write_element_value_with_attribute(&self.name, value, "xml:lang", lang.as_deref())
            }
            Value::Code { value, list_version_id } => writer.write_element_value_with_attribute(
                &self.name,
                value,
                "listVersionID",
                list_version_id.as_deref(),
            ),
            Value::Date(date) => writer.write_element_value(&self.name, &format_date(date)),
            Value::DateTime(date_time) => {
                writer.write_element_value(&self.name, &date_time.to_string())
            }
            Value::Integer(value) => writer.write_element_value(&self.name, &value.to_string()),
            Value::Composite(composite) => {
                writer.write_start_element(&self.name)?;
                for child in &composite.children {
                    child.write(writer)?;
                }
                writer.write_end_element()
            }
            Value::AnyXml(raw) => writer.write_raw_xml_block_if_not_empty(Some(raw)),
        }
    }

    /// Render as a compact XML fragment
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = SedaXmlWriter::new(false);
        self.write(&mut writer)?;
        writer.finish()
    }
}

// =============================================================================
// Composite
// =============================================================================

impl Composite {
    pub fn new(kind: CompositeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    pub fn children(&self) -> &[Metadata] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// First child with this name
    pub fn metadata(&self, name: &str) -> Option<&Metadata> {
        self.children.iter().find(|m| m.name == name)
    }

    pub fn metadata_mut(&mut self, name: &str) -> Option<&mut Metadata> {
        self.children.iter_mut().find(|m| m.name == name)
    }

    /// All children with this name, in order
    pub fn metadata_all<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Metadata> + 's {
        self.children.iter().filter(move |m| m.name == name)
    }

    /// Lexical value of the first child with this name
    pub fn simple_value(&self, name: &str) -> Option<String> {
        self.metadata(name).and_then(Metadata::simple_text)
    }

    /// Remove every child with this name, returning how many were removed
    pub fn remove_metadata(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|m| m.name != name);
        before - self.children.len()
    }

    /// Add a child at its schema position.
    ///
    /// A single-valued element replaces the existing instance. A repeatable
    /// element goes after the last instance of the same name, or at its
    /// schema position when it is the first. Unknown elements are only
    /// accepted by open schemas and go after their same-named siblings, or
    /// at the end.
    pub fn add_metadata(&mut self, version: SedaVersion, metadata: Metadata) -> Result<()> {
        let schema = schema_for(self.kind, version);

        let Some((rank, entry)) = schema.entry(&metadata.name) else {
            if !schema.is_open() {
                return Err(SedaError::UnknownMetadata {
                    metadata: self.kind.element_name().to_string(),
                    element: metadata.name,
                });
            }
            let position = self
                .last_position_of(&metadata.name)
                .map(|last| last + 1)
                .unwrap_or(self.children.len());
            self.children.insert(position, metadata);
            return Ok(());
        };

        metadata.accepted_by(entry.kind)?;

        if !entry.many {
            if let Some(existing) = self.children.iter_mut().find(|m| m.name == metadata.name) {
                *existing = metadata;
                return Ok(());
            }
        } else if let Some(last) = self.last_position_of(&metadata.name) {
            self.children.insert(last + 1, metadata);
            return Ok(());
        }

        // Before the first child that the schema places after this one
        let position = self
            .children
            .iter()
            .position(|child| {
                schema
                    .entry(&child.name)
                    .map(|(child_rank, _)| child_rank > rank)
                    .unwrap_or(false)
            })
            .unwrap_or(self.children.len());
        self.children.insert(position, metadata);
        Ok(())
    }

    /// Build a child from string arguments, dispatching on the element's
    /// schema kind, then add it
    pub fn add_new_metadata(&mut self, version: SedaVersion, name: &str, args: &[&str]) -> Result<()> {
        let schema = schema_for(self.kind, version);
        let kind = match schema.entry(name) {
            Some((_, entry)) => entry.kind,
            None if schema.is_open() => ValueKind::AnyXml,
            None => {
                return Err(SedaError::UnknownMetadata {
                    metadata: self.kind.element_name().to_string(),
                    element: name.to_string(),
                })
            }
        };
        let metadata = Metadata::build(version, name, kind, args)?;
        self.add_metadata(version, metadata)
    }

    /// Add a Rule with its optional StartDate, keeping them adjacent
    pub fn add_rule(&mut self, rule_id: &str, start_date: Option<NaiveDate>) -> Result<()> {
        if !self.kind.is_rule() {
            return Err(SedaError::UnknownMetadata {
                metadata: self.kind.element_name().to_string(),
                element: "Rule".to_string(),
            });
        }
        let position = self
            .children
            .iter()
            .rposition(|m| m.name == "Rule" || m.name == "StartDate")
            .map(|last| last + 1)
            .unwrap_or(0);
        self.children.insert(position, Metadata::string("Rule", rule_id));
        if let Some(start_date) = start_date {
            self.children
                .insert(position + 1, Metadata::date("StartDate", start_date));
        }
        Ok(())
    }

    fn last_position_of(&self, name: &str) -> Option<usize> {
        self.children.iter().rposition(|m| m.name == name)
    }

    /// Parse children until the enclosing element's end tag
    pub fn read_children(
        reader: &mut SedaXmlReader<'_>,
        version: SedaVersion,
        kind: CompositeKind,
        element_name: &str,
    ) -> Result<Self> {
        let schema = schema_for(kind, version);
        let mut composite = Composite::new(kind);

        while let Some(child_name) = reader.peek_name()?.map(str::to_string) {
            match schema.entry(&child_name) {
                Some((_, entry)) => {
                    let child = Metadata::read(reader, version, entry.kind)?;
                    composite.children.push(child);
                }
                None if schema.is_open() => {
                    let raw = reader.next_block_as_string()?;
                    composite.children.push(Metadata::any_xml(child_name, raw));
                }
                None => {
                    return Err(SedaError::UnknownMetadata {
                        metadata: element_name.to_string(),
                        element: child_name,
                    })
                }
            }
        }
        Ok(composite)
    }

    /// Flatten into (dot-path, value) pairs.
    ///
    /// Repeatable elements get an index suffix ("Title.0"), nested
    /// composites prefix their own keys, and xml:lang / listVersionID
    /// attributes are reported under "<key>.attr".
    pub fn to_csv_list(&self, version: SedaVersion) -> Vec<(String, String)> {
        let schema = schema_for(self.kind, version);
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for child in &self.children {
            *totals.entry(child.name.as_str()).or_default() += 1;
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut list = Vec::new();
        for child in &self.children {
            let name = child.name.as_str();
            let index = {
                let counter = seen.entry(name).or_default();
                *counter += 1;
                *counter - 1
            };
            let many = schema
                .entry(name)
                .map(|(_, entry)| entry.many)
                .unwrap_or_else(|| totals.get(name).copied().unwrap_or(0) > 1);
            let key = if many {
                format!("{}.{}", name, index)
            } else {
                name.to_string()
            };

            match &child.value {
                Value::Composite(composite) => {
                    for (sub_key, value) in composite.to_csv_list(version) {
                        list.push((format!("{}.{}", key, sub_key), value));
                    }
                }
                Value::Text { value, lang } => {
                    list.push((key.clone(), value.clone()));
                    if let Some(lang) = lang {
                        list.push((format!("{}.attr", key), format!("xml:lang=\"{}\"", lang)));
                    }
                }
                Value::Code { value, list_version_id } => {
                    list.push((key.clone(), value.clone()));
                    if let Some(list_version_id) = list_version_id {
                        list.push((
                            format!("{}.attr", key),
                            format!("listVersionID=\"{}\"", list_version_id),
                        ));
                    }
                }
                _ => list.push((key, child.simple_text().unwrap_or_default())),
            }
        }
        list
    }
}
