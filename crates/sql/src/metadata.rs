//! Typed rows projected out of Flight SQL metadata results.
//!
//! Column names are fixed by the protocol. A column that is missing from the result
//! schema, or a null in a column the protocol declares non-nullable, is a protocol
//! error. Columns are cast to the expected type before projection, so a server that
//! sends e.g. a dictionary-encoded `table_type` still decodes.

use std::marker::PhantomData;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{ArrowPrimitiveType, DataType, Int32Type, Schema, UInt8Type};
use flightline_common::{Error, Result};

use crate::result::QueryResult;

pub trait MetadataRow: Sized {
    /// Every column the row reads.
    const COLUMNS: &'static [&'static str];

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;

    fn from_result(result: &QueryResult) -> Result<Vec<Self>> {
        if let Some(schema) = result.schema() {
            require_columns(&schema, Self::COLUMNS)?;
        }
        let mut rows = Vec::with_capacity(result.total_rows);
        for batch in &result.batches {
            rows.extend(Self::from_batch(batch)?);
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSchema {
    pub catalog_name: Option<String>,
    pub db_schema_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub catalog_name: Option<String>,
    pub db_schema_name: Option<String>,
    pub table_name: String,
    pub table_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub catalog_name: Option<String>,
    pub db_schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub key_name: Option<String>,
    pub key_sequence: i32,
}

/// `update_rule` / `delete_rule` of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
    SetDefault,
}

impl TryFrom<u8> for ReferentialAction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ReferentialAction::Cascade),
            1 => Ok(ReferentialAction::Restrict),
            2 => Ok(ReferentialAction::SetNull),
            3 => Ok(ReferentialAction::NoAction),
            4 => Ok(ReferentialAction::SetDefault),
            other => Err(Error::Protocol(format!("unknown referential action {other}"))),
        }
    }
}

/// One column pair of an imported or exported key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub pk_catalog_name: Option<String>,
    pub pk_db_schema_name: Option<String>,
    pub pk_table_name: String,
    pub pk_column_name: String,
    pub fk_catalog_name: Option<String>,
    pub fk_db_schema_name: Option<String>,
    pub fk_table_name: String,
    pub fk_column_name: String,
    pub key_sequence: i32,
    pub fk_key_name: Option<String>,
    pub pk_key_name: Option<String>,
    pub update_rule: ReferentialAction,
    pub delete_rule: ReferentialAction,
}

impl MetadataRow for DbSchema {
    const COLUMNS: &'static [&'static str] = &["catalog_name", "db_schema_name"];

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let catalog = StringColumn::load(batch, "catalog_name")?;
        let schema = StringColumn::load(batch, "db_schema_name")?;
        (0..batch.num_rows())
            .map(|row| {
                Ok(DbSchema {
                    catalog_name: catalog.optional(row),
                    db_schema_name: schema.required(row)?,
                })
            })
            .collect()
    }
}

impl MetadataRow for TableInfo {
    const COLUMNS: &'static [&'static str] =
        &["catalog_name", "db_schema_name", "table_name", "table_type"];

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let catalog = StringColumn::load(batch, "catalog_name")?;
        let schema = StringColumn::load(batch, "db_schema_name")?;
        let table = StringColumn::load(batch, "table_name")?;
        let table_type = StringColumn::load(batch, "table_type")?;
        (0..batch.num_rows())
            .map(|row| {
                Ok(TableInfo {
                    catalog_name: catalog.optional(row),
                    db_schema_name: schema.optional(row),
                    table_name: table.required(row)?,
                    table_type: table_type.required(row)?,
                })
            })
            .collect()
    }
}

impl MetadataRow for PrimaryKey {
    const COLUMNS: &'static [&'static str] = &[
        "catalog_name",
        "db_schema_name",
        "table_name",
        "column_name",
        "key_name",
        "key_sequence",
    ];

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let catalog = StringColumn::load(batch, "catalog_name")?;
        let schema = StringColumn::load(batch, "db_schema_name")?;
        let table = StringColumn::load(batch, "table_name")?;
        let column = StringColumn::load(batch, "column_name")?;
        let key_name = StringColumn::load(batch, "key_name")?;
        let sequence = PrimitiveColumn::<Int32Type>::load(batch, "key_sequence")?;
        (0..batch.num_rows())
            .map(|row| {
                Ok(PrimaryKey {
                    catalog_name: catalog.optional(row),
                    db_schema_name: schema.optional(row),
                    table_name: table.required(row)?,
                    column_name: column.required(row)?,
                    key_name: key_name.optional(row),
                    key_sequence: sequence.required(row)?,
                })
            })
            .collect()
    }
}

impl MetadataRow for ForeignKey {
    const COLUMNS: &'static [&'static str] = &[
        "pk_catalog_name",
        "pk_db_schema_name",
        "pk_table_name",
        "pk_column_name",
        "fk_catalog_name",
        "fk_db_schema_name",
        "fk_table_name",
        "fk_column_name",
        "key_sequence",
        "fk_key_name",
        "pk_key_name",
        "update_rule",
        "delete_rule",
    ];

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let pk_catalog = StringColumn::load(batch, "pk_catalog_name")?;
        let pk_schema = StringColumn::load(batch, "pk_db_schema_name")?;
        let pk_table = StringColumn::load(batch, "pk_table_name")?;
        let pk_column = StringColumn::load(batch, "pk_column_name")?;
        let fk_catalog = StringColumn::load(batch, "fk_catalog_name")?;
        let fk_schema = StringColumn::load(batch, "fk_db_schema_name")?;
        let fk_table = StringColumn::load(batch, "fk_table_name")?;
        let fk_column = StringColumn::load(batch, "fk_column_name")?;
        let sequence = PrimitiveColumn::<Int32Type>::load(batch, "key_sequence")?;
        let fk_key = StringColumn::load(batch, "fk_key_name")?;
        let pk_key = StringColumn::load(batch, "pk_key_name")?;
        let update_rule = PrimitiveColumn::<UInt8Type>::load(batch, "update_rule")?;
        let delete_rule = PrimitiveColumn::<UInt8Type>::load(batch, "delete_rule")?;
        (0..batch.num_rows())
            .map(|row| {
                Ok(ForeignKey {
                    pk_catalog_name: pk_catalog.optional(row),
                    pk_db_schema_name: pk_schema.optional(row),
                    pk_table_name: pk_table.required(row)?,
                    pk_column_name: pk_column.required(row)?,
                    fk_catalog_name: fk_catalog.optional(row),
                    fk_db_schema_name: fk_schema.optional(row),
                    fk_table_name: fk_table.required(row)?,
                    fk_column_name: fk_column.required(row)?,
                    key_sequence: sequence.required(row)?,
                    fk_key_name: fk_key.optional(row),
                    pk_key_name: pk_key.optional(row),
                    update_rule: ReferentialAction::try_from(update_rule.required(row)?)?,
                    delete_rule: ReferentialAction::try_from(delete_rule.required(row)?)?,
                })
            })
            .collect()
    }
}

/// Non-null values of a single string column, in row order.
pub(crate) fn string_values(result: &QueryResult, name: &'static str) -> Result<Vec<String>> {
    if let Some(schema) = result.schema() {
        require_columns(&schema, &[name])?;
    }
    let mut values = Vec::with_capacity(result.total_rows);
    for batch in &result.batches {
        let column = StringColumn::load(batch, name)?;
        for row in 0..batch.num_rows() {
            values.push(column.required(row)?);
        }
    }
    Ok(values)
}

fn require_columns(schema: &Schema, columns: &[&str]) -> Result<()> {
    match columns
        .iter()
        .find(|name| schema.column_with_name(name).is_none())
    {
        Some(name) => Err(missing_column(name)),
        None => Ok(()),
    }
}

fn missing_column(name: &str) -> Error {
    Error::Protocol(format!("metadata result is missing column {name}"))
}

fn load(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| missing_column(name))?;
    Ok(cast(column, data_type)?)
}

fn null_in(name: &str) -> Error {
    Error::Protocol(format!("unexpected null in column {name}"))
}

struct StringColumn {
    name: &'static str,
    array: ArrayRef,
}

impl StringColumn {
    fn load(batch: &RecordBatch, name: &'static str) -> Result<Self> {
        Ok(Self {
            name,
            array: load(batch, name, &DataType::Utf8)?,
        })
    }

    fn optional(&self, row: usize) -> Option<String> {
        let values = self.array.as_string::<i32>();
        values.is_valid(row).then(|| values.value(row).to_string())
    }

    fn required(&self, row: usize) -> Result<String> {
        self.optional(row).ok_or_else(|| null_in(self.name))
    }
}

struct PrimitiveColumn<T> {
    name: &'static str,
    array: ArrayRef,
    _type: PhantomData<T>,
}

impl<T: ArrowPrimitiveType> PrimitiveColumn<T> {
    fn load(batch: &RecordBatch, name: &'static str) -> Result<Self> {
        Ok(Self {
            name,
            array: load(batch, name, &T::DATA_TYPE)?,
            _type: PhantomData,
        })
    }

    fn required(&self, row: usize) -> Result<T::Native> {
        let values = self.array.as_primitive::<T>();
        if values.is_null(row) {
            return Err(null_in(self.name));
        }
        Ok(values.value(row))
    }
}
