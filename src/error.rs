use thiserror::Error;

/// Main error type covering every failure mode of an import session
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("structural error in {file}: {details}")]
    Structural { file: String, details: String },

    #[error(
        "cardinality violation in {file}: element '{element}' occurred {actual} time(s), expected {}",
        bounds_text(*min, *max)
    )]
    Cardinality {
        file: String,
        element: String,
        actual: u32,
        min: u32,
        max: u32,
    },

    #[error("conversion error in {file} at element '{element}': {source}")]
    Conversion {
        file: String,
        element: String,
        #[source]
        source: ConversionError,
    },

    #[error("missing mandatory attribute '{attribute}' on element '{element}' in {file}")]
    MissingAttribute {
        file: String,
        element: String,
        attribute: String,
    },

    #[error("archive error for {file}: {details}")]
    Archive { file: String, details: String },

    #[error("malformed XML in {file}: {details}")]
    Xml { file: String, details: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text value could not be converted to the requested type.
///
/// Carries the offending text and the target type name so callers can
/// report exactly what failed without re-reading the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {text:?} to {target}: {reason}")]
pub struct ConversionError {
    pub text: String,
    pub target: &'static str,
    pub reason: String,
}

impl ConversionError {
    pub fn new(
        text: impl Into<String>,
        target: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            target,
            reason: reason.into(),
        }
    }

    /// Error for an empty mandatory field.
    pub fn empty(target: &'static str) -> Self {
        Self::new("", target, "empty value")
    }
}

fn bounds_text(min: u32, max: u32) -> String {
    if max == u32::MAX {
        format!("at least {min}")
    } else if min == max {
        format!("exactly {min}")
    } else {
        format!("between {min} and {max}")
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ImportError>;
