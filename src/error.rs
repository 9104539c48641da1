//! Error types for the SEDA package codec

use thiserror::Error;

/// Result type for package operations
pub type Result<T> = std::result::Result<T, SedaError>;

/// SEDA package errors
#[derive(Error, Debug)]
pub enum SedaError {
    // ========== Structural XML errors ==========
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed element <{element}>: {message}")]
    Malformed { element: String, message: String },

    #[error("Missing mandatory element <{element}> in {context}")]
    MissingElement { element: String, context: String },

    #[error("Unexpected element: expected {expected}, found {found}")]
    UnexpectedElement { expected: String, found: String },

    #[error("Unexpected end of document in {context}")]
    UnexpectedEnd { context: String },

    // ========== Schema violations ==========
    #[error("Cannot extend schema with unexpected metadata <{element}> in {metadata}")]
    UnknownMetadata { metadata: String, element: String },

    #[error("Invalid value '{value}' for enumerated element <{element}>")]
    InvalidEnumValue { element: String, value: String },

    #[error("Invalid value '{value}' for element <{element}>: {reason}")]
    InvalidValue { element: String, value: String, reason: String },

    #[error("No factory for <{element}> accepts {count} argument(s)")]
    InvalidArguments { element: String, count: usize },

    // ========== Graph consistency errors ==========
    #[error("Duplicate identifier: {0}")]
    DuplicateId(String),

    #[error("Dangling reference from {from} to unknown node {to}")]
    DanglingReference { from: String, to: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Cycle detected in archive unit tree: {path}")]
    Cycle { path: String },

    #[error("Impossible to merge data objects of unit {unit}: {object} is shared with another owner")]
    ImpossibleMerge { unit: String, object: String },

    #[error("Node {id} is still referenced by {by}")]
    StillReferenced { id: String, by: String },

    // ========== Operation control ==========
    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("In node {node}: {source}")]
    InNode {
        node: String,
        #[source]
        source: Box<SedaError>,
    },
}

impl SedaError {
    /// Wrap an error with the id of the node being processed
    pub fn in_node(node: impl Into<String>, source: SedaError) -> Self {
        match source {
            // Cancellation stays recognisable whatever the nesting
            SedaError::Cancelled => SedaError::Cancelled,
            source => SedaError::InNode {
                node: node.into(),
                source: Box::new(source),
            },
        }
    }

    /// Shorthand for a malformed element error
    pub fn malformed(element: impl Into<String>, message: impl Into<String>) -> Self {
        SedaError::Malformed {
            element: element.into(),
            message: message.into(),
        }
    }

    /// True when the operation was interrupted by its cancellation token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SedaError::Cancelled)
    }

    /// The innermost error, skipping node context wrappers
    pub fn root_cause(&self) -> &SedaError {
        match self {
            SedaError::InNode { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
