use serde_json::Value;

/// Free-form custom dimensions attached to a telemetry event.
pub type PropertiesBag = serde_json::Map<String, Value>;

/// Name of the column whose raw text is parsed into a [`PropertiesBag`].
pub const PROPERTIES_COLUMN: &str = "Properties";

/// Keys of the custom dimensions this crate reads from, and writes into, a [`PropertiesBag`].
pub mod properties {
    pub const ORGANISATION_ID: &str = "OrganisationId";
    pub const DOMAIN_ID: &str = "DomainId";
    pub const USER_ID: &str = "UserId";
    pub const ORGANISATION_NAME: &str = "OrganisationName";
    pub const DOMAIN_NAME: &str = "DomainName";
    pub const USER_NAME: &str = "UserName";
}

#[derive(thiserror::Error, Debug)]
pub enum QueryExecutionError {
    #[error("Failed to send request to the log analytics workspace")]
    RequestFailed,
    #[error("Log analytics NON-200 response content: '{0}'")]
    ResponseNotOK(String),
    #[error("Failed to deserialize the log analytics response")]
    DeserializationError,
    #[error("Log analytics returned no result table")]
    MissingResult,
}

#[derive(thiserror::Error, Debug)]
pub enum MaterializationError {
    #[error("Unknown column type token: {0}")]
    UnknownColumnType(String),
    #[error("Row {row} has {actual} values but the result has {expected} columns")]
    RowShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Column types a log analytics workspace reports for a result table.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    serde::Serialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum ColumnType {
    Boolean,
    DateTime,
    Dynamic,
    Integer,
    Long,
    Real,
    String,
    Guid,
    Decimal,
    Timespan,
}

impl ColumnType {
    /// Maps the type token of a raw result column.
    pub fn from_source_token(token: &str) -> Result<Self, MaterializationError> {
        match token.to_ascii_lowercase().as_str() {
            "bool" => Ok(Self::Boolean),
            "datetime" => Ok(Self::DateTime),
            "dynamic" => Ok(Self::Dynamic),
            "int" => Ok(Self::Integer),
            "long" => Ok(Self::Long),
            "real" => Ok(Self::Real),
            "string" => Ok(Self::String),
            "guid" => Ok(Self::Guid),
            "decimal" => Ok(Self::Decimal),
            "timespan" => Ok(Self::Timespan),
            _ => Err(MaterializationError::UnknownColumnType(token.to_owned())),
        }
    }

    pub const fn source_token(self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::DateTime => "datetime",
            Self::Dynamic => "dynamic",
            Self::Integer => "int",
            Self::Long => "long",
            Self::Real => "real",
            Self::String => "string",
            Self::Guid => "guid",
            Self::Decimal => "decimal",
            Self::Timespan => "timespan",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Properties(PropertiesBag),
    Raw(Value),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RowValue {
    pub value_name: String,
    pub value_type: ColumnType,
    pub value: CellValue,
}

/// One materialized row; `values[i]` belongs to `columns[i]` of the owning [`QueryResult`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ResultRow {
    pub values: Vec<RowValue>,
}

impl ResultRow {
    pub fn properties(&self) -> Option<&PropertiesBag> {
        self.values.iter().find_map(|value| match &value.value {
            CellValue::Properties(bag) => Some(bag),
            CellValue::Raw(_) => None,
        })
    }

    pub fn properties_mut(&mut self) -> Option<&mut PropertiesBag> {
        self.values.iter_mut().find_map(|value| match &mut value.value {
            CellValue::Properties(bag) => Some(bag),
            CellValue::Raw(_) => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<ResultRow>,
    pub total_row_count: usize,
    pub execution_time: time::Duration,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct RawColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub name: String,
    pub columns: Vec<RawColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

/// The primary table of a log analytics answer together with the store's own statistics.
#[derive(Clone, Debug)]
pub struct RawTableResult {
    pub table: RawTable,
    pub statistics: Option<Value>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_source_token_maps_to_exactly_one_column_type() {
        let tokens = [
            "bool", "datetime", "dynamic", "int", "long", "real", "string", "guid", "decimal",
            "timespan",
        ];
        let mapped = tokens
            .iter()
            .map(|token| ColumnType::from_source_token(token).unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(mapped.len(), tokens.len());
        assert_eq!(mapped.len(), ColumnType::iter().count());
    }

    #[test]
    fn column_types_map_back_to_their_token_and_display_name() {
        for column_type in ColumnType::iter() {
            let token = column_type.source_token();
            assert_eq!(ColumnType::from_source_token(token).unwrap(), column_type);
            assert_eq!(
                ColumnType::from_source_token(&token.to_ascii_uppercase()).unwrap(),
                column_type
            );
        }
        assert_eq!(ColumnType::Boolean.to_string(), "Boolean");
        assert_eq!(ColumnType::DateTime.to_string(), "DateTime");
        assert_eq!(ColumnType::Timespan.to_string(), "Timespan");
    }

    #[test]
    fn unknown_token_is_rejected() {
        let error = ColumnType::from_source_token("uuid").unwrap_err();
        assert!(matches!(error, MaterializationError::UnknownColumnType(token) if token == "uuid"));
        assert!(ColumnType::from_source_token("Boolean").is_err());
    }

    #[test]
    fn properties_are_found_by_cell_kind() {
        let mut bag = PropertiesBag::new();
        bag.insert(properties::USER_ID.to_owned(), Value::from("9"));
        let mut row = ResultRow {
            values: vec![
                RowValue {
                    value_name: "Name".to_owned(),
                    value_type: ColumnType::String,
                    value: CellValue::Raw(Value::from("login")),
                },
                RowValue {
                    value_name: PROPERTIES_COLUMN.to_owned(),
                    value_type: ColumnType::Dynamic,
                    value: CellValue::Properties(bag),
                },
            ],
        };

        assert_eq!(row.properties().unwrap()[properties::USER_ID], "9");
        row.properties_mut()
            .unwrap()
            .insert(properties::USER_NAME.to_owned(), Value::from("Ada"));
        assert_eq!(row.properties().unwrap()[properties::USER_NAME], "Ada");
    }
}
