//! PostgreSQL flavoured DDL rendering for Arrow schemas.

use std::sync::OnceLock;

use datafusion::arrow::datatypes::{DataType, Schema};
use regex::Regex;

use crate::error::{OdbcError, Result};

/// Reject anything that is not a plain, unquoted SQL identifier.
pub fn validate_identifier(name: &str) -> Result<&str> {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX
        .get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("invalid regex"));

    if regex.is_match(name) {
        Ok(name)
    } else {
        Err(OdbcError::InvalidIdentifier(name.to_string()))
    }
}

/// SQL column type for an Arrow data type
pub fn sql_type(column: &str, data_type: &DataType) -> Result<String> {
    let sql = match data_type {
        DataType::Boolean => "boolean".to_string(),
        DataType::Int16 => "smallint".to_string(),
        DataType::Int32 => "integer".to_string(),
        DataType::Int64 => "bigint".to_string(),
        DataType::Float32 => "real".to_string(),
        DataType::Float64 => "double precision".to_string(),
        DataType::Date32 => "date".to_string(),
        DataType::Timestamp(_, None) => "timestamp".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 => "varchar".to_string(),
        DataType::Decimal128(precision, scale) | DataType::Decimal256(precision, scale) => {
            format!("numeric({precision}, {scale})")
        }
        other => {
            return Err(OdbcError::UnsupportedType {
                column: column.to_string(),
                data_type: other.to_string(),
            })
        }
    };

    Ok(sql)
}

/// `CREATE TABLE` statement for the given schema
pub fn create_table_statement(table: &str, schema: &Schema) -> Result<String> {
    let table = validate_identifier(table)?;

    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let name = validate_identifier(field.name())?;
            let sql_type = sql_type(name, field.data_type())?;
            let nullability = if field.is_nullable() { "" } else { " NOT NULL" };

            Ok(format!("{name} {sql_type}{nullability}"))
        })
        .collect::<Result<Vec<String>>>()?;

    Ok(format!("CREATE TABLE {table} ({})", columns.join(", ")))
}

/// Name of the shadow table a replacement is staged into
pub fn staging_table(table: &str) -> String {
    format!("{table}__staging")
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::Field;
    use rstest::rstest;

    #[test]
    fn test_create_table_statement() {
        let schema = Schema::new(vec![
            Field::new("product_id", DataType::Int32, false),
            Field::new("region", DataType::Utf8, false),
            Field::new("total_sum", DataType::Int64, false),
            Field::new("average_sale_amount", DataType::Decimal256(76, 2), true),
        ]);

        let ddl = create_table_statement("aggregated_sales_data", &schema).unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE aggregated_sales_data (product_id integer NOT NULL, \
             region varchar NOT NULL, total_sum bigint NOT NULL, \
             average_sale_amount numeric(76, 2))"
        );
    }

    #[rstest]
    #[case("sales_data", true)]
    #[case("_tmp1", true)]
    #[case("1table", false)]
    #[case("sales; DROP TABLE x", false)]
    #[case("\"quoted\"", false)]
    #[case("", false)]
    fn test_validate_identifier(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_identifier(name).is_ok(), valid);
    }

    #[test]
    fn test_unsupported_type() {
        let schema = Schema::new(vec![Field::new("payload", DataType::Binary, true)]);

        let result = create_table_statement("blobs", &schema);
        assert!(matches!(result, Err(OdbcError::UnsupportedType { .. })));
    }

    #[test]
    fn test_staging_table() {
        assert_eq!(staging_table("sales_data"), "sales_data__staging");
    }
}
