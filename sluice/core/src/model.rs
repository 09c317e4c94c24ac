//! Record types flowing between the stages and their Arrow layouts.

use std::{fmt, sync::Arc};

use chrono::NaiveDate;
use datafusion::arrow::{
    array::{
        ArrayRef, Date32Array, Decimal256Array, Float64Array, Int32Array, Int64Array,
        RecordBatch, StringArray,
    },
    compute::{cast_with_options, CastOptions},
    datatypes::{i256, DataType, Date32Type, Field, Schema, SchemaRef, TimeUnit},
};

use crate::error::{Error, Result};

/// Column order of the raw sales file
pub const RAW_COLUMNS: [&str; 7] = [
    "sale_id",
    "customer_id",
    "product_id",
    "quantity",
    "sale_date",
    "price",
    "region",
];

/// Columns written to the mirror by the replicator, `import_time` is filled by the store
pub const MIRROR_COLUMNS: [&str; 5] = [
    "product_id",
    "region",
    "num_of_sales",
    "total_sum",
    "average_sale_amount",
];

pub const IMPORT_TIME_COLUMN: &str = "import_time";

pub const AVERAGE_PRECISION: u8 = 76;
pub const AVERAGE_SCALE: i8 = 2;

/// Largest magnitude a `f64` holds without losing integer precision (2^53)
pub const MAX_EXACT_AMOUNT: i64 = 1 << 53;

/// One sale as produced by the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSaleRecord {
    pub sale_id: i32,
    pub customer_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub sale_date: NaiveDate,
    pub price: i32,
    pub region: String,
}

/// One sale after type casting, as stored in the sales table
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSaleRecord {
    pub sale_id: i32,
    pub customer_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub sale_date: NaiveDate,
    pub price: i32,
    pub region: String,
    pub sale_amount: f64,
}

/// One `(product_id, region)` group of the aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub product_id: i32,
    pub region: String,
    pub num_of_sales: i64,
    pub total_sum: i64,
    pub average_sale_amount: Decimal2,
}

/// Fixed point number with two fractional digits, stored as its value times 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal2(i128);

impl Decimal2 {
    pub const fn from_scaled(scaled: i128) -> Self {
        Self(scaled)
    }

    pub const fn scaled(&self) -> i128 {
        self.0
    }

    /// `numerator / denominator` rounded half away from zero to two places.
    pub fn ratio(numerator: i128, denominator: i64) -> Result<Self> {
        if denominator <= 0 {
            return Err(Error::Fatal(format!(
                "cannot average over {denominator} sales"
            )));
        }

        let scaled = numerator
            .checked_mul(100)
            .ok_or_else(|| Error::Fatal(format!("average of {numerator} overflows")))?;
        let denominator = i128::from(denominator);

        let quotient = scaled / denominator;
        let remainder = scaled % denominator;
        let rounded = if remainder.abs() * 2 >= denominator {
            quotient + scaled.signum()
        } else {
            quotient
        };

        Ok(Self(rounded))
    }

    pub fn to_i256(self) -> i256 {
        i256::from_i128(self.0)
    }
}

impl fmt::Display for Decimal2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Layout of the raw sales file when every field is read as text
pub fn raw_text_schema() -> SchemaRef {
    Arc::new(Schema::new(
        RAW_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

/// Layout the generator writes
pub fn raw_sales_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("sale_id", DataType::Int32, false),
        Field::new("customer_id", DataType::Int32, false),
        Field::new("product_id", DataType::Int32, false),
        Field::new("quantity", DataType::Int32, false),
        Field::new("sale_date", DataType::Date32, false),
        Field::new("price", DataType::Int32, false),
        Field::new("region", DataType::Utf8, false),
    ]))
}

/// Layout of the typed sales table
pub fn sales_schema() -> SchemaRef {
    let mut fields = raw_sales_schema().fields().to_vec();
    fields.push(Arc::new(Field::new("sale_amount", DataType::Float64, false)));
    Arc::new(Schema::new(fields))
}

pub fn average_data_type() -> DataType {
    DataType::Decimal256(AVERAGE_PRECISION, AVERAGE_SCALE)
}

/// Layout of the aggregate table, also the column set replicated to the mirror
pub fn aggregate_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("product_id", DataType::Int32, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("num_of_sales", DataType::Int64, false),
        Field::new("total_sum", DataType::Int64, false),
        Field::new("average_sale_amount", average_data_type(), false),
    ]))
}

/// Layout of the mirror table including the store-assigned import time
pub fn mirror_schema() -> SchemaRef {
    let mut fields = aggregate_schema().fields().to_vec();
    fields.push(Arc::new(Field::new(
        IMPORT_TIME_COLUMN,
        DataType::Timestamp(TimeUnit::Second, None),
        false,
    )));
    Arc::new(Schema::new(fields))
}

pub fn raw_records_batch(records: &[RawSaleRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.sale_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.customer_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.product_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.quantity))),
        Arc::new(Date32Array::from_iter_values(
            records.iter().map(|r| Date32Type::from_naive_date(r.sale_date)),
        )),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.price))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.region.as_str()))),
    ];

    Ok(RecordBatch::try_new(raw_sales_schema(), columns)?)
}

pub fn sales_batch(records: &[TypedSaleRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.sale_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.customer_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.product_id))),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.quantity))),
        Arc::new(Date32Array::from_iter_values(
            records.iter().map(|r| Date32Type::from_naive_date(r.sale_date)),
        )),
        Arc::new(Int32Array::from_iter_values(records.iter().map(|r| r.price))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.region.as_str()))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.sale_amount))),
    ];

    Ok(RecordBatch::try_new(sales_schema(), columns)?)
}

pub fn aggregate_batch(rows: &[AggregateRow]) -> Result<RecordBatch> {
    let averages = Decimal256Array::from_iter_values(
        rows.iter().map(|r| r.average_sale_amount.to_i256()),
    )
    .with_precision_and_scale(AVERAGE_PRECISION, AVERAGE_SCALE)?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.product_id))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.region.as_str()))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.num_of_sales))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.total_sum))),
        Arc::new(averages),
    ];

    Ok(RecordBatch::try_new(aggregate_schema(), columns)?)
}

/// Reshape `batch` into `target`, selecting columns by name and casting each one.
///
/// Casting is strict: a value that does not fit the target type is an error
/// rather than a null. Any failure is reported against `table`.
pub fn conform_batch(batch: &RecordBatch, target: &SchemaRef, table: &str) -> Result<RecordBatch> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let columns = target
        .fields()
        .iter()
        .map(|field| {
            let column = batch.column_by_name(field.name()).ok_or_else(|| {
                Error::schema_mismatch(table, format!("missing column '{}'", field.name()))
            })?;

            if column.data_type() == field.data_type() {
                return Ok(column.clone());
            }

            cast_with_options(column, field.data_type(), &options).map_err(|err| {
                Error::schema_mismatch(
                    table,
                    format!(
                        "column '{}' of type {} does not fit {}: {err}",
                        field.name(),
                        column.data_type(),
                        field.data_type()
                    ),
                )
            })
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    RecordBatch::try_new(target.clone(), columns)
        .map_err(|err| Error::schema_mismatch(table, err.to_string()))
}
