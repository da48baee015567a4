//!
//! This module holds traits for extending functionalities for existing datatypes
//! & inbuilt datatypes.
//!

use error_stack::ResultExt;
use serde::Deserialize;

use crate::errors::{self, CustomResult};

///
/// Extending functionalities of `String` for performing parsing
///
pub trait StringExt<T> {
    ///
    /// Convert a JSON `String` into type `<T>` by using `serde::Deserialize`
    ///
    fn parse_struct<'de>(&'de self, type_name: &str) -> CustomResult<T, errors::ParsingError>
    where
        T: Deserialize<'de>;
}

impl<T> StringExt<T> for str {
    fn parse_struct<'de>(&'de self, type_name: &str) -> CustomResult<T, errors::ParsingError>
    where
        T: Deserialize<'de>,
    {
        serde_json::from_str::<T>(self)
            .change_context(errors::ParsingError)
            .attach_printable_lazy(|| format!("Unable to parse {type_name} from string"))
    }
}

///
/// Extending functionalities of configuration values for validation
///
pub trait ConfigExt {
    /// Returns whether the value of a field is empty, whitespace only or the default value.
    fn is_default_or_empty(&self) -> bool;
}

impl ConfigExt for u64 {
    fn is_default_or_empty(&self) -> bool {
        *self == u64::default()
    }
}

impl ConfigExt for String {
    fn is_default_or_empty(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T: ConfigExt> ConfigExt for Option<T> {
    fn is_default_or_empty(&self) -> bool {
        self.as_ref().map_or(true, ConfigExt::is_default_or_empty)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use test_case::test_case;

    use super::*;

    #[test_case("" ; "empty string")]
    #[test_case("   " ; "whitespace only")]
    #[test_case("\t\n" ; "control whitespace")]
    fn blank_strings_are_default_or_empty(value: &str) {
        assert!(value.to_string().is_default_or_empty());
    }

    #[test]
    fn missing_optional_value_is_empty() {
        let value: Option<String> = None;
        assert!(value.is_default_or_empty());
        assert!(!Some("workspace".to_string()).is_default_or_empty());
    }

    #[test]
    fn parse_struct_reports_invalid_json() {
        let parsed: CustomResult<serde_json::Value, _> = "{not json".parse_struct("Properties");
        assert!(parsed.is_err());

        let parsed: serde_json::Value = r#"{"a":1}"#.parse_struct("Properties").unwrap();
        assert_eq!(parsed["a"], 1);
    }
}
