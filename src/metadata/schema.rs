//! Versioned metadata schema tables
//!
//! Every composite metadata type declares, per supported SEDA version, the
//! ordered list of child elements it accepts with their value kind and
//! multiplicity. Tables are written out with a small builder and resolved
//! against the caller's active version; a version with no table of its own
//! falls back to the first one declared for the type.

use std::sync::OnceLock;

use crate::version::SedaVersion;

// =============================================================================
// Kinds
// =============================================================================

/// Composite metadata types modeled by the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    Content,
    Management,
    AccessRule,
    AppraisalRule,
    StorageRule,
    DisseminationRule,
    ReuseRule,
    ClassificationRule,
    HoldRule,
    Agent,
    Keyword,
    Coverage,
    Event,
    LogBook,
    CustodialHistory,
    RelatedObjectReference,
    ObjectReference,
    Gps,
}

impl CompositeKind {
    /// Declaration order, matching the enum discriminants
    pub const ALL: [CompositeKind; 18] = [
        CompositeKind::Content,
        CompositeKind::Management,
        CompositeKind::AccessRule,
        CompositeKind::AppraisalRule,
        CompositeKind::StorageRule,
        CompositeKind::DisseminationRule,
        CompositeKind::ReuseRule,
        CompositeKind::ClassificationRule,
        CompositeKind::HoldRule,
        CompositeKind::Agent,
        CompositeKind::Keyword,
        CompositeKind::Coverage,
        CompositeKind::Event,
        CompositeKind::LogBook,
        CompositeKind::CustodialHistory,
        CompositeKind::RelatedObjectReference,
        CompositeKind::ObjectReference,
        CompositeKind::Gps,
    ];

    /// Element name used when the type appears under its own name
    pub fn element_name(&self) -> &'static str {
        match self {
            CompositeKind::Content => "Content",
            CompositeKind::Management => "Management",
            CompositeKind::AccessRule => "AccessRule",
            CompositeKind::AppraisalRule => "AppraisalRule",
            CompositeKind::StorageRule => "StorageRule",
            CompositeKind::DisseminationRule => "DisseminationRule",
            CompositeKind::ReuseRule => "ReuseRule",
            CompositeKind::ClassificationRule => "ClassificationRule",
            CompositeKind::HoldRule => "HoldRule",
            CompositeKind::Agent => "Agent",
            CompositeKind::Keyword => "Keyword",
            CompositeKind::Coverage => "Coverage",
            CompositeKind::Event => "Event",
            CompositeKind::LogBook => "LogBook",
            CompositeKind::CustodialHistory => "CustodialHistory",
            CompositeKind::RelatedObjectReference => "RelatedObjectReference",
            CompositeKind::ObjectReference => "DataObjectOrArchiveUnitReference",
            CompositeKind::Gps => "Gps",
        }
    }

    /// Management rule categories, which hold Rule/StartDate pairs
    pub fn is_rule(&self) -> bool {
        matches!(
            self,
            CompositeKind::AccessRule
                | CompositeKind::AppraisalRule
                | CompositeKind::StorageRule
                | CompositeKind::DisseminationRule
                | CompositeKind::ReuseRule
                | CompositeKind::ClassificationRule
                | CompositeKind::HoldRule
        )
    }
}

pub const DESCRIPTION_LEVELS: &[&str] = &[
    "Fonds", "Subfonds", "Class", "Collection", "Series", "Subseries", "RecordGrp", "SubGrp",
    "File", "Item", "OtherLevel",
];
pub const KEYWORD_TYPES: &[&str] = &[
    "corpname", "famname", "geogname", "name", "occupation", "subject", "genreform", "function",
];
pub const BOOLEANS: &[&str] = &["true", "false"];
pub const APPRAISAL_FINAL_ACTIONS: &[&str] = &["Keep", "Destroy"];
pub const STORAGE_FINAL_ACTIONS: &[&str] = &["RestrictAccess", "Transfer", "Copy"];

/// Shape of a metadata element value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain string
    String,
    /// String with an optional xml:lang attribute
    Text,
    /// xs:date
    Date,
    /// xs:dateTime, also accepting a plain date
    DateTime,
    Integer,
    /// One of a closed set of values
    Enumerated(&'static [&'static str]),
    /// Code with an optional listVersionID attribute
    Code,
    Composite(CompositeKind),
    /// Unmodeled element kept as raw XML
    AnyXml,
}

// =============================================================================
// Schema tables
// =============================================================================

/// One child element declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub name: &'static str,
    pub kind: ValueKind,
    /// Whether the element may repeat
    pub many: bool,
}

/// Ordered child declarations of a composite type for one version
#[derive(Debug, Clone)]
pub struct CompositeSchema {
    kind: CompositeKind,
    open: bool,
    entries: Vec<SchemaEntry>,
}

impl CompositeSchema {
    /// Schema accepting unknown elements as raw XML passthrough
    pub fn open(kind: CompositeKind) -> Self {
        Self {
            kind,
            open: true,
            entries: Vec::new(),
        }
    }

    /// Schema rejecting unknown elements
    pub fn closed(kind: CompositeKind) -> Self {
        Self {
            kind,
            open: false,
            entries: Vec::new(),
        }
    }

    /// Declare a single-valued element
    pub fn one(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.entries.push(SchemaEntry { name, kind, many: false });
        self
    }

    /// Declare a repeatable element
    pub fn many(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.entries.push(SchemaEntry { name, kind, many: true });
        self
    }

    /// Declare an element right after `anchor`, for version variants.
    /// Appends when the anchor is not declared.
    pub fn after(mut self, anchor: &str, name: &'static str, kind: ValueKind, many: bool) -> Self {
        let entry = SchemaEntry { name, kind, many };
        match self.entries.iter().position(|e| e.name == anchor) {
            Some(index) => self.entries.insert(index + 1, entry),
            None => self.entries.push(entry),
        }
        self
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Find an element declaration and its schema position
    pub fn entry(&self, name: &str) -> Option<(usize, &SchemaEntry)> {
        self.entries.iter().enumerate().find(|(_, e)| e.name == name)
    }
}

/// All tables declared for one composite type
#[derive(Debug, Clone)]
pub struct VersionedSchema {
    first: (SedaVersion, CompositeSchema),
    others: Vec<(SedaVersion, CompositeSchema)>,
}

impl VersionedSchema {
    fn declared(version: SedaVersion, schema: CompositeSchema) -> Self {
        Self {
            first: (version, schema),
            others: Vec::new(),
        }
    }

    fn and(mut self, version: SedaVersion, schema: CompositeSchema) -> Self {
        self.others.push((version, schema));
        self
    }

    /// Table of the active version, or the first declared one
    pub fn resolve(&self, version: SedaVersion) -> &CompositeSchema {
        std::iter::once(&self.first)
            .chain(self.others.iter())
            .find(|(declared, _)| *declared == version)
            .map(|(_, schema)| schema)
            .unwrap_or(&self.first.1)
    }

    /// Versions with a table of their own
    pub fn declared_versions(&self) -> Vec<SedaVersion> {
        std::iter::once(self.first.0)
            .chain(self.others.iter().map(|(v, _)| *v))
            .collect()
    }
}

static TABLES: OnceLock<[VersionedSchema; 18]> = OnceLock::new();

fn tables() -> &'static [VersionedSchema; 18] {
    TABLES.get_or_init(|| CompositeKind::ALL.map(declare))
}

/// Schema of a composite type under the active version
pub fn schema_for(kind: CompositeKind, version: SedaVersion) -> &'static CompositeSchema {
    tables()[kind as usize].resolve(version)
}

/// Every table declared for a composite type
pub fn versioned_schema(kind: CompositeKind) -> &'static VersionedSchema {
    &tables()[kind as usize]
}

// =============================================================================
// Declarations
// =============================================================================

use SedaVersion::{V2_1, V2_2, V2_3};
use ValueKind::*;

fn declare(kind: CompositeKind) -> VersionedSchema {
    match kind {
        CompositeKind::Content => content_schemas(),
        CompositeKind::Management => management_schemas(),
        CompositeKind::AccessRule
        | CompositeKind::DisseminationRule
        | CompositeKind::ReuseRule => VersionedSchema::declared(V2_1, rule_base(kind)),
        CompositeKind::AppraisalRule => VersionedSchema::declared(
            V2_1,
            rule_base(kind).one("FinalAction", Enumerated(APPRAISAL_FINAL_ACTIONS)),
        ),
        CompositeKind::StorageRule => VersionedSchema::declared(
            V2_1,
            rule_base(kind).one("FinalAction", Enumerated(STORAGE_FINAL_ACTIONS)),
        ),
        CompositeKind::ClassificationRule => VersionedSchema::declared(
            V2_1,
            rule_base(kind)
                .one("ClassificationAudience", String)
                .one("ClassificationLevel", String)
                .one("ClassificationOwner", String)
                .one("ClassificationReassessingDate", Date)
                .one("NeedReassessingAuthorization", Enumerated(BOOLEANS)),
        ),
        CompositeKind::HoldRule => VersionedSchema::declared(
            V2_3,
            CompositeSchema::closed(kind)
                .many("Rule", String)
                .many("StartDate", Date)
                .many("HoldEndDate", Date)
                .many("HoldOwner", String)
                .many("HoldReassessingDate", Date)
                .many("HoldReason", String)
                .many("PreventRearrangement", Enumerated(BOOLEANS))
                .one("PreventInheritance", Enumerated(BOOLEANS))
                .many("RefNonRuleId", String),
        ),
        CompositeKind::Agent => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .one("FirstName", String)
                .one("BirthName", String)
                .one("FullName", String)
                .one("GivenName", String)
                .one("Gender", String)
                .one("BirthDate", Date)
                .one("BirthPlace", AnyXml)
                .one("DeathDate", Date)
                .one("DeathPlace", AnyXml)
                .many("Nationality", String)
                .one("Corpname", String)
                .many("Identifier", String)
                .many("Function", Text)
                .many("Activity", Text)
                .many("Position", Text)
                .many("Role", Text)
                .many("Mandate", AnyXml),
        ),
        CompositeKind::Keyword => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .one("KeywordContent", String)
                .one("KeywordReference", String)
                .one("KeywordType", Enumerated(KEYWORD_TYPES)),
        ),
        CompositeKind::Coverage => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .many("Spatial", Text)
                .many("Temporal", Text)
                .many("Juridictional", Text),
        ),
        CompositeKind::Event => {
            let v21 = CompositeSchema::open(kind)
                .one("EventIdentifier", String)
                .one("EventTypeCode", String)
                .one("EventType", String)
                .one("EventDateTime", DateTime)
                .one("EventDetail", String)
                .one("Outcome", String)
                .one("OutcomeDetail", String)
                .one("OutcomeDetailMessage", String)
                .one("EventDetailData", String);
            let v22 = v21
                .clone()
                .after("EventDetailData", "LinkingAgentIdentifier", AnyXml, true);
            VersionedSchema::declared(V2_1, v21)
                .and(V2_2, v22.clone())
                .and(V2_3, v22)
        }
        CompositeKind::LogBook => VersionedSchema::declared(
            V2_2,
            CompositeSchema::closed(kind).many("Event", Composite(CompositeKind::Event)),
        ),
        CompositeKind::CustodialHistory => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .many("CustodialHistoryItem", Text)
                .one("CustodialHistoryFile", AnyXml),
        ),
        CompositeKind::RelatedObjectReference => {
            let reference = Composite(CompositeKind::ObjectReference);
            VersionedSchema::declared(
                V2_1,
                CompositeSchema::closed(kind)
                    .many("IsVersionOf", reference)
                    .many("Replaces", reference)
                    .many("Requires", reference)
                    .many("IsPartOf", reference)
                    .many("References", reference),
            )
        }
        CompositeKind::ObjectReference => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .one("ArchiveUnitRefId", String)
                .one("DataObjectReference", AnyXml)
                .one("RepositoryArchiveUnitPID", String)
                .one("RepositoryObjectPID", String)
                .one("ExternalReference", String),
        ),
        CompositeKind::Gps => VersionedSchema::declared(
            V2_1,
            CompositeSchema::closed(kind)
                .one("GpsVersionID", String)
                .one("GpsAltitude", Integer)
                .one("GpsAltitudeRef", String)
                .one("GpsLatitude", String)
                .one("GpsLatitudeRef", String)
                .one("GpsLongitude", String)
                .one("GpsLongitudeRef", String)
                .one("GpsDateStamp", String),
        ),
    }
}

fn rule_base(kind: CompositeKind) -> CompositeSchema {
    CompositeSchema::closed(kind)
        .many("Rule", String)
        .many("StartDate", Date)
        .one("PreventInheritance", Enumerated(BOOLEANS))
        .many("RefNonRuleId", String)
}

fn content_schemas() -> VersionedSchema {
    let agent = Composite(CompositeKind::Agent);
    let v21 = CompositeSchema::open(CompositeKind::Content)
        .one("DescriptionLevel", Enumerated(DESCRIPTION_LEVELS))
        .many("Title", Text)
        .many("FilePlanPosition", String)
        .many("SystemId", String)
        .many("OriginatingSystemId", String)
        .many("ArchivalAgencyArchiveUnitIdentifier", String)
        .many("OriginatingAgencyArchiveUnitIdentifier", String)
        .many("TransferringAgencyArchiveUnitIdentifier", String)
        .many("Description", Text)
        .one("CustodialHistory", Composite(CompositeKind::CustodialHistory))
        .one("Type", Text)
        .one("DocumentType", Text)
        .many("Language", Code)
        .one("DescriptionLanguage", Code)
        .one("Status", String)
        .one("Version", String)
        .many("Tag", String)
        .many("Keyword", Composite(CompositeKind::Keyword))
        .one("Coverage", Composite(CompositeKind::Coverage))
        .one("OriginatingAgency", AnyXml)
        .one("SubmissionAgency", AnyXml)
        .many("AuthorizedAgent", agent)
        .many("Writer", agent)
        .many("Addressee", agent)
        .many("Recipient", agent)
        .many("Transmitter", agent)
        .many("Sender", agent)
        .one("Source", String)
        .one("RelatedObjectReference", Composite(CompositeKind::RelatedObjectReference))
        .one("CreatedDate", DateTime)
        .one("TransactedDate", DateTime)
        .one("AcquiredDate", DateTime)
        .one("SentDate", DateTime)
        .one("ReceivedDate", DateTime)
        .one("RegisteredDate", DateTime)
        .one("StartDate", DateTime)
        .one("EndDate", DateTime)
        .many("Event", Composite(CompositeKind::Event))
        .many("Signature", AnyXml)
        .one("Gps", Composite(CompositeKind::Gps));

    let v22 = v21
        .clone()
        .after("Version", "OriginatingSystemIdReplyTo", String, false)
        .after("SubmissionAgency", "Agent", agent, true)
        .after("RegisteredDate", "DateLitteral", String, false)
        .after("Gps", "TextContent", Text, true);

    let v23 = v22.clone().after(
        "TransferringAgencyArchiveUnitIdentifier",
        "PersistentIdentifier",
        AnyXml,
        true,
    );

    VersionedSchema::declared(V2_1, v21)
        .and(V2_2, v22)
        .and(V2_3, v23)
}

fn management_schemas() -> VersionedSchema {
    let v21 = CompositeSchema::open(CompositeKind::Management)
        .one("StorageRule", Composite(CompositeKind::StorageRule))
        .one("AppraisalRule", Composite(CompositeKind::AppraisalRule))
        .one("AccessRule", Composite(CompositeKind::AccessRule))
        .one("DisseminationRule", Composite(CompositeKind::DisseminationRule))
        .one("ReuseRule", Composite(CompositeKind::ReuseRule))
        .one("ClassificationRule", Composite(CompositeKind::ClassificationRule))
        .one("NeedAuthorization", Enumerated(BOOLEANS))
        .one("UpdateOperation", AnyXml);

    let v22 = v21.clone().after(
        "ClassificationRule",
        "LogBook",
        Composite(CompositeKind::LogBook),
        false,
    );

    let v23 = v22.clone().after(
        "ClassificationRule",
        "HoldRule",
        Composite(CompositeKind::HoldRule),
        false,
    );

    VersionedSchema::declared(V2_1, v21)
        .and(V2_2, v22)
        .and(V2_3, v23)
}
