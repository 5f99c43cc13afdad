//! Small utilities with no dependency on the data-access layer
//!
//! - [`obfuscate`] - reversible hex encoding of text (e.g. ids in query strings)
//! - [`NamedEnum`] - parse enums by variant name and list their values
//! - [`JsLiteral`] - render a `bool` as a JavaScript literal

pub mod obfuscate;

pub use obfuscate::{decode, encode, NULL_MARKER, PREFIX};

use crate::error::{DataError, Result};

/// Enums with a fixed, named set of variants
pub trait NamedEnum: Sized + Copy + 'static {
    /// Every variant, in declaration order
    const VARIANTS: &'static [Self];

    /// Variant name as written in code
    fn name(&self) -> &'static str;

    /// List of all the values of the enum
    #[must_use]
    fn values() -> Vec<Self> {
        Self::VARIANTS.to_vec()
    }

    /// Parse a variant name (case-sensitive)
    fn parse(value: &str) -> Result<Self> {
        Self::parse_with(value, false)
    }

    /// Parse a variant name, optionally ignoring ASCII case
    fn parse_with(value: &str, ignore_case: bool) -> Result<Self> {
        let value = value.trim();
        Self::VARIANTS
            .iter()
            .copied()
            .find(|variant| {
                if ignore_case {
                    variant.name().eq_ignore_ascii_case(value)
                } else {
                    variant.name() == value
                }
            })
            .ok_or_else(|| {
                let type_name = std::any::type_name::<Self>();
                let short = type_name.rsplit("::").next().unwrap_or(type_name);
                DataError::invalid_operation(format!("'{value}' is not a valid {short}"))
            })
    }
}

/// Rendering of values as JavaScript source literals
pub trait JsLiteral {
    fn js_literal(&self) -> &'static str;
}

impl JsLiteral for bool {
    fn js_literal(&self) -> &'static str {
        if *self {
            "true"
        } else {
            "false"
        }
    }
}
