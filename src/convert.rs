//! Value conversion layer
//!
//! Converts attribute and text strings to typed values. All conversions are
//! pure functions; failures surface as [`ConversionError`] carrying the
//! offending text and the target type name.

use crate::error::ConversionError;

/// Characters treated as list delimiters by [`parse_list`].
///
/// Any run of these characters separates tokens; empty tokens are skipped,
/// so `"1,,2"` converts to two values.
pub const LIST_DELIMITERS: &[char] = &[',', '[', ']', ' ', '\t'];

/// A type that can be converted from XML attribute or text content.
pub trait FromXmlValue: Sized {
    /// Type name used in conversion error reports.
    const TYPE_NAME: &'static str;

    fn from_xml(text: &str) -> Result<Self, ConversionError>;
}

macro_rules! numeric_from_xml {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromXmlValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_xml(text: &str) -> Result<Self, ConversionError> {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        return Err(ConversionError::empty(Self::TYPE_NAME));
                    }
                    trimmed.parse::<$ty>().map_err(|e| {
                        ConversionError::new(text, Self::TYPE_NAME, e.to_string())
                    })
                }
            }
        )*
    };
}

numeric_from_xml!(i32, i64, u32, u64, usize, f32, f64);

impl FromXmlValue for bool {
    const TYPE_NAME: &'static str = "bool";

    /// Case-insensitive "true"/"false", with numeric fallback: 0 is false,
    /// any other number is true.
    fn from_xml(text: &str) -> Result<Self, ConversionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ConversionError::empty(Self::TYPE_NAME));
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Ok(false);
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Ok(value != 0.0),
            Err(_) => Err(ConversionError::new(
                text,
                Self::TYPE_NAME,
                "expected true, false, or a number",
            )),
        }
    }
}

impl FromXmlValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_xml(text: &str) -> Result<Self, ConversionError> {
        Ok(text.to_string())
    }
}

/// Convert a single text value to `T`.
pub fn parse<T: FromXmlValue>(text: &str) -> Result<T, ConversionError> {
    T::from_xml(text)
}

/// Convert a delimited list to `Vec<T>`.
///
/// Splits on any run of [`LIST_DELIMITERS`], skipping empty tokens. The whole
/// list conversion fails if any token fails.
pub fn parse_list<T: FromXmlValue>(text: &str) -> Result<Vec<T>, ConversionError> {
    text.split(|c| LIST_DELIMITERS.contains(&c))
        .filter(|token| !token.is_empty())
        .map(T::from_xml)
        .collect()
}
