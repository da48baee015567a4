use admin_env::logger;
use common_utils::{errors::CustomResult, ext_traits::StringExt, fp_utils::when};
use error_stack::report;
use serde_json::Value;

use crate::{
    deanonymize::DeAnonymizer,
    identity::IdentityLookup,
    types::{
        CellValue, ColumnType, MaterializationError, PropertiesBag, QueryResult, RawTableResult,
        ResultColumn, ResultRow, RowValue, PROPERTIES_COLUMN,
    },
};

const EXECUTION_TIME_POINTER: &str = "/query/executionTime";

/// Upper bound on a reported execution time; anything larger is treated as bogus.
const MAX_EXECUTION_SECONDS: f64 = 86_400.0;

/// Turns the raw table of a log analytics answer into a [`QueryResult`].
#[derive(Debug)]
pub struct ResultMaterializer<'a, I: ?Sized> {
    identity: &'a I,
}

impl<'a, I> ResultMaterializer<'a, I>
where
    I: IdentityLookup + ?Sized,
{
    pub fn new(identity: &'a I) -> Self {
        Self { identity }
    }

    pub async fn materialize(
        &self,
        raw: RawTableResult,
    ) -> CustomResult<QueryResult, MaterializationError> {
        let RawTableResult { table, statistics } = raw;

        let columns = table
            .columns
            .iter()
            .map(|column| {
                Ok(ResultColumn {
                    name: column.name.clone(),
                    column_type: ColumnType::from_source_token(&column.column_type)?,
                })
            })
            .collect::<Result<Vec<_>, MaterializationError>>()
            .map_err(|error| report!(error))?;

        let mut rows = table
            .rows
            .into_iter()
            .enumerate()
            .map(|(index, cells)| materialize_row(index, &columns, cells))
            .collect::<CustomResult<Vec<_>, MaterializationError>>()?;

        DeAnonymizer::new(self.identity).populate(&mut rows).await;

        Ok(QueryResult {
            total_row_count: rows.len(),
            execution_time: execution_time(statistics.as_ref()),
            columns,
            rows,
        })
    }
}

fn materialize_row(
    index: usize,
    columns: &[ResultColumn],
    cells: Vec<Value>,
) -> CustomResult<ResultRow, MaterializationError> {
    when(cells.len() != columns.len(), || {
        Err(report!(MaterializationError::RowShapeMismatch {
            row: index,
            expected: columns.len(),
            actual: cells.len(),
        }))
    })?;

    let values = columns
        .iter()
        .zip(cells)
        .map(|(column, cell)| RowValue {
            value_name: column.name.clone(),
            value_type: column.column_type,
            value: if column.name.eq_ignore_ascii_case(PROPERTIES_COLUMN) {
                CellValue::Properties(parse_properties(index, cell))
            } else {
                CellValue::Raw(cell)
            },
        })
        .collect();

    Ok(ResultRow { values })
}

fn parse_properties(index: usize, cell: Value) -> PropertiesBag {
    match cell {
        Value::Object(bag) => bag,
        Value::String(text) if text.trim().is_empty() => PropertiesBag::new(),
        Value::String(text) => {
            let parsed: CustomResult<PropertiesBag, _> = text.parse_struct("PropertiesBag");
            parsed.unwrap_or_else(|error| {
                logger::warn!(row = index, ?error, "Unparseable properties, using an empty bag");
                PropertiesBag::new()
            })
        }
        Value::Null => PropertiesBag::new(),
        other => {
            logger::warn!(row = index, kind = ?other, "Properties cell is not an object");
            PropertiesBag::new()
        }
    }
}

fn execution_time(statistics: Option<&Value>) -> time::Duration {
    statistics
        .and_then(|statistics| statistics.pointer(EXECUTION_TIME_POINTER))
        .and_then(Value::as_f64)
        .filter(|seconds| seconds.is_finite() && (0.0..=MAX_EXECUTION_SECONDS).contains(seconds))
        .map_or(time::Duration::ZERO, time::Duration::seconds_f64)
}
