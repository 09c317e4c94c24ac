//! Type-casting loader: raw sales file into the typed sales table.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use datafusion::arrow::{
    array::{Array, AsArray, StringArray},
    csv::ReaderBuilder,
};
use sluice_schemas::InputConfig;
use tracing::{debug, info, instrument};

use super::{StageName, StageProvider, StageReport};
use crate::error::{CastError, Error, Result};
use crate::model::{
    raw_text_schema, sales_batch, sales_schema, TypedSaleRecord, MAX_EXACT_AMOUNT, RAW_COLUMNS,
};
use crate::store::Connections;

const CSV_BATCH_SIZE: usize = 8192;

/// Loads the raw sales file into the relational store, replacing the table wholesale
#[derive(Debug, Clone)]
pub struct Loader {
    input: InputConfig,
    table: String,
}

impl Loader {
    pub fn new(input: InputConfig, table: impl Into<String>) -> Self {
        Self {
            input,
            table: table.into(),
        }
    }
}

#[async_trait]
impl StageProvider for Loader {
    fn name(&self) -> StageName {
        StageName::Load
    }

    #[instrument(skip_all, fields(table = %self.table), err)]
    async fn execute(&self, connections: &Connections) -> Result<StageReport> {
        let path = self.input.location.local_path().ok_or_else(|| {
            Error::InvalidConfig(format!(
                "input '{}' is not a local file",
                self.input.location
            ))
        })?;

        let records = read_sales_file(&path, self.input.delimiter, self.input.has_header)?;
        info!("Cast {} records from {}", records.len(), path.display());

        let batch = sales_batch(&records)?;
        let rows = connections
            .relational()
            .replace_table(&self.table, sales_schema(), vec![batch])
            .await?;

        Ok(StageReport { rows })
    }
}

/// Read and cast every record of the raw sales file.
///
/// Fails on the first record that does not cast, nothing is returned partially.
pub fn read_sales_file(
    path: &Path,
    delimiter: char,
    has_header: bool,
) -> Result<Vec<TypedSaleRecord>> {
    if !delimiter.is_ascii() {
        return Err(Error::InvalidConfig(format!(
            "delimiter '{delimiter}' must be a single byte character"
        )));
    }

    let open = || {
        File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                Error::PrecursorMissing(format!("input file {} does not exist", path.display()))
            }
            _ => Error::Io(err),
        })
    };

    if has_header {
        check_header(open()?, path, delimiter)?;
    }

    let reader = ReaderBuilder::new(raw_text_schema())
        .with_header(has_header)
        .with_delimiter(delimiter as u8)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(open()?)?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|err| {
            Error::schema_mismatch(path.display().to_string(), err.to_string())
        })?;
        let columns = batch
            .columns()
            .iter()
            .map(|column| column.as_string::<i32>())
            .collect::<Vec<&StringArray>>();

        for row in 0..batch.num_rows() {
            let record = records.len() + 1;
            let mut fields = [""; 7];
            for (index, column) in columns.iter().enumerate() {
                if column.is_null(row) {
                    let err = CastError::new(record, RAW_COLUMNS[index], "", "value is empty");
                    return Err(err.into());
                }
                fields[index] = column.value(row);
            }

            records.push(cast_record(&fields, record)?);
        }
    }

    debug!("Read {} records from {}", records.len(), path.display());

    Ok(records)
}

fn check_header(file: File, path: &Path, delimiter: char) -> Result<()> {
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;

    let found = line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .split(delimiter)
        .map(|name| name.trim().trim_matches('"'))
        .collect::<Vec<&str>>();

    if found != RAW_COLUMNS {
        return Err(Error::schema_mismatch(
            path.display().to_string(),
            format!(
                "expected header '{}', found '{}'",
                RAW_COLUMNS.join(&delimiter.to_string()),
                found.join(&delimiter.to_string())
            ),
        ));
    }

    Ok(())
}

fn cast_int(record: usize, field: &str, value: &str) -> std::result::Result<i32, CastError> {
    value
        .parse::<i32>()
        .map_err(|err| CastError::new(record, field, value, err.to_string()))
}

fn cast_date(record: usize, value: &str) -> std::result::Result<NaiveDate, CastError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").map(|ts| ts.date())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.date())
        })
        .map_err(|err| CastError::new(record, "sale_date", value, err.to_string()))
}

/// Cast one raw record, fields in [`RAW_COLUMNS`] order.
///
/// `sale_date` accepts an ISO date, or an ISO date-time whose date part is kept.
/// `sale_amount` is `quantity * price`, computed exactly before widening to `f64`.
pub fn cast_record(
    fields: &[&str; 7],
    record: usize,
) -> std::result::Result<TypedSaleRecord, CastError> {
    let quantity = cast_int(record, "quantity", fields[3])?;
    let price = cast_int(record, "price", fields[5])?;

    let amount = i64::from(quantity) * i64::from(price);
    if amount < 0 {
        return Err(CastError::new(
            record,
            "sale_amount",
            amount.to_string(),
            "amount must not be negative",
        ));
    }
    if amount > MAX_EXACT_AMOUNT {
        return Err(CastError::new(
            record,
            "sale_amount",
            amount.to_string(),
            "amount exceeds exact floating point range",
        ));
    }

    Ok(TypedSaleRecord {
        sale_id: cast_int(record, "sale_id", fields[0])?,
        customer_id: cast_int(record, "customer_id", fields[1])?,
        product_id: cast_int(record, "product_id", fields[2])?,
        quantity,
        sale_date: cast_date(record, fields[4])?,
        price,
        region: fields[6].to_string(),
        sale_amount: amount as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cast_record() {
        let record =
            cast_record(&["7", "42", "3", "5", "2024-05-01", "20", "North"], 1).unwrap();

        assert_eq!(record.sale_id, 7);
        assert_eq!(record.customer_id, 42);
        assert_eq!(record.product_id, 3);
        assert_eq!(record.sale_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(record.region, "North");
        assert_eq!(record.sale_amount, 100.0);
    }

    #[test]
    fn test_cast_record_keeps_date_of_datetime() {
        let record = cast_record(
            &["1", "1", "1", "1", "2024-05-01 13:45:12.123456", "10", "West"],
            1,
        )
        .unwrap();
        assert_eq!(record.sale_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[rstest]
    #[case(["x", "1", "1", "1", "2024-05-01", "10", "West"], "sale_id")]
    #[case(["1", "1", "1", "12.0", "2024-05-01", "10", "West"], "quantity")]
    #[case(["1", "1", "1", "1", "2024-13-01", "10", "West"], "sale_date")]
    #[case(["1", "1", "1", "1", "01/05/2024", "10", "West"], "sale_date")]
    #[case(["1", "1", "1", "1", "2024-05-01", "99999999999", "West"], "price")]
    #[case(["1", "1", "1", "-2", "2024-05-01", "10", "West"], "sale_amount")]
    fn test_cast_record_rejects(#[case] fields: [&str; 7], #[case] field: &str) {
        let err = cast_record(&fields, 9).unwrap_err();
        assert_eq!(err.field, field);
        assert_eq!(err.record, 9);
    }

    #[test]
    fn test_read_sales_file() {
        let file = write_file(
            "sale_id,customer_id,product_id,quantity,sale_date,price,region\n\
             1,10,1,2,2024-01-02,100,North\n\
             2,11,1,1,2024-01-03 08:00:00,200,North\n",
        );

        let records = read_sales_file(file.path(), ',', true).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sale_amount, 200.0);
        assert_eq!(records[1].sale_amount, 200.0);
    }

    #[test]
    fn test_read_sales_file_without_header() {
        let file = write_file("1;10;1;2;2024-01-02;100;North\n");

        let records = read_sales_file(file.path(), ';', false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region, "North");
    }

    #[test]
    fn test_read_sales_file_reports_record_number() {
        let file = write_file(
            "sale_id,customer_id,product_id,quantity,sale_date,price,region\n\
             1,10,1,2,2024-01-02,100,North\n\
             2,11,1,,2024-01-03,200,North\n",
        );

        let err = read_sales_file(file.path(), ',', true).unwrap_err();
        match err {
            Error::Cast(cast) => {
                assert_eq!(cast.record, 2);
                assert_eq!(cast.field, "quantity");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_sales_file_rejects_wrong_header() {
        let file = write_file("id,customer,product,qty,date,price,region\n");

        let err = read_sales_file(file.path(), ',', true).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn test_read_sales_file_missing() {
        let err = read_sales_file(Path::new("/nonexistent/sales.csv"), ',', true).unwrap_err();
        assert!(matches!(err, Error::PrecursorMissing(_)));
    }
}
