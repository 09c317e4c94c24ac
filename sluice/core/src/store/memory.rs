//! Embedded stores used when no connection details are configured.
//!
//! [`MemoryRelationalStore`] is a DataFusion [`SessionContext`] holding one
//! [`MemTable`] per table. [`MemoryAnalyticalStore`] understands the ClickHouse
//! DDL the mirror stage issues and keeps every insert as an appended batch.
//! Both carry switches to simulate outages and partial writes.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use datafusion::{
    arrow::{
        array::{ArrayRef, RecordBatch, TimestampSecondArray},
        datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
    },
    datasource::MemTable,
    execution::context::SessionContext,
    sql::sqlparser::{
        ast::{
            ColumnDef, ColumnOption, DataType as SqlDataType, ExactNumberInfo, ObjectType,
            Statement,
        },
        dialect::ClickHouseDialect,
        parser::Parser,
    },
};
use tracing::{debug, instrument, warn};

use super::{AnalyticalStore, RelationalStore};
use crate::error::{Error, Result, StoreKind};

/// Relational store backed by an in-process DataFusion context
pub struct MemoryRelationalStore {
    ctx: SessionContext,
    // serialises deregister + register so a replace is never observed halfway
    swap: Mutex<()>,
    available: AtomicBool,
    closes: AtomicUsize,
}

impl Default for MemoryRelationalStore {
    fn default() -> Self {
        Self {
            ctx: SessionContext::new(),
            swap: Mutex::new(()),
            available: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        }
    }
}

impl std::fmt::Debug for MemoryRelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRelationalStore")
            .field("available", &self.available.load(Ordering::SeqCst))
            .field("closes", &self.closes.load(Ordering::SeqCst))
            .finish()
    }
}

impl MemoryRelationalStore {
    /// Simulate the store going offline (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// How many times the session was released
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable(
                StoreKind::Relational,
                "memory relational store is offline",
            ))
        }
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    #[instrument(skip(self), err)]
    async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        self.ensure_available()?;

        let df = self
            .ctx
            .sql(sql)
            .await
            .map_err(|err| Error::statement(StoreKind::Relational, err))?;

        df.collect()
            .await
            .map_err(|err| Error::statement(StoreKind::Relational, err))
    }

    #[instrument(skip(self), err)]
    async fn execute(&self, sql: &str) -> Result<()> {
        self.query(sql).await.map(|_| ())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.ensure_available()?;

        self.ctx
            .table_exist(table)
            .map_err(|err| Error::statement(StoreKind::Relational, err))
    }

    #[instrument(skip(self, schema, batches), err)]
    async fn replace_table(
        &self,
        table: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<u64> {
        self.ensure_available()?;

        let rows = batches.iter().map(|b| b.num_rows() as u64).sum::<u64>();
        let mem = MemTable::try_new(schema, vec![batches])
            .map_err(|err| Error::schema_mismatch(table, err.to_string()))?;

        let _swap = self
            .swap
            .lock()
            .map_err(|_| Error::Fatal("memory relational store lock poisoned".into()))?;

        let previous = self
            .ctx
            .deregister_table(table)
            .map_err(|err| Error::statement(StoreKind::Relational, err))?;

        if let Err(err) = self.ctx.register_table(table, Arc::new(mem)) {
            if let Some(previous) = previous {
                if let Err(restore_err) = self.ctx.register_table(table, previous) {
                    warn!("Failed to restore previous contents of {table}: {restore_err}");
                }
            }
            return Err(Error::statement(StoreKind::Relational, err));
        }

        debug!(
            "Replaced table {table} with {rows} rows (previous contents: {})",
            previous.is_some()
        );

        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One-shot failure applied to a future insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertFault {
    /// Number of inserts that succeed before the fault fires
    pub after_inserts: usize,
    /// Rows of the failing insert that are still written
    pub keep_rows: usize,
}

#[derive(Debug)]
struct MirrorTable {
    schema: SchemaRef,
    defaulted: HashSet<String>,
    batches: Vec<RecordBatch>,
}

/// Append-only analytical store kept in process memory
#[derive(Debug)]
pub struct MemoryAnalyticalStore {
    tables: Mutex<HashMap<String, MirrorTable>>,
    fault: Mutex<Option<InsertFault>>,
    inserts: AtomicUsize,
    available: AtomicBool,
    closes: AtomicUsize,
}

impl Default for MemoryAnalyticalStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            fault: Mutex::new(None),
            inserts: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        }
    }
}

impl MemoryAnalyticalStore {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Arm a fault for a later insert.
    ///
    /// With `keep_rows == 0` the insert fails as if the connection dropped,
    /// otherwise the first `keep_rows` rows are stored before it fails.
    pub fn inject_fault(&self, fault: InsertFault) -> Result<()> {
        *self.lock(&self.fault)? = Some(fault);
        self.inserts.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// All rows appended to `table` so far, one batch per insert
    pub fn batches(&self, table: &str) -> Result<Vec<RecordBatch>> {
        let tables = self.lock(&self.tables)?;
        tables
            .get(table)
            .map(|t| t.batches.clone())
            .ok_or_else(|| Error::PrecursorMissing(format!("table '{table}' does not exist")))
    }

    pub fn table_schema(&self, table: &str) -> Result<Option<SchemaRef>> {
        Ok(self.lock(&self.tables)?.get(table).map(|t| t.schema.clone()))
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.batches(table)?.iter().map(|b| b.num_rows()).sum())
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| Error::Fatal("memory analytical store lock poisoned".into()))
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable(
                StoreKind::Analytical,
                "memory analytical store is offline",
            ))
        }
    }

    fn take_fault(&self) -> Result<Option<InsertFault>> {
        let mut fault = self.lock(&self.fault)?;
        let done = self.inserts.load(Ordering::SeqCst);

        match *fault {
            Some(armed) if armed.after_inserts == done => Ok(fault.take()),
            _ => Ok(None),
        }
    }

    fn create_table(&self, name: String, if_not_exists: bool, columns: &[ColumnDef]) -> Result<()> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut defaulted = HashSet::new();

        for column in columns {
            let column_name = column.name.value.clone();
            let (data_type, nullable) = arrow_type(&column.data_type).ok_or_else(|| {
                Error::schema_mismatch(
                    &name,
                    format!("unsupported type {} for column '{column_name}'", column.data_type),
                )
            })?;

            if column
                .options
                .iter()
                .any(|o| matches!(o.option, ColumnOption::Default(_)))
            {
                defaulted.insert(column_name.clone());
            }
            fields.push(Field::new(column_name, data_type, nullable));
        }

        let mut tables = self.lock(&self.tables)?;
        if let Some(existing) = tables.get(&name) {
            if if_not_exists {
                debug!("Table {name} already exists, leaving it untouched");
                return Ok(());
            }
            return Err(Error::statement(
                StoreKind::Analytical,
                format!(
                    "table '{name}' already exists with {} columns",
                    existing.schema.fields().len()
                ),
            ));
        }

        tables.insert(
            name,
            MirrorTable {
                schema: Arc::new(Schema::new(fields)),
                defaulted,
                batches: vec![],
            },
        );

        Ok(())
    }
}

/// Arrow type and nullability for a ClickHouse column type
fn arrow_type(data_type: &SqlDataType) -> Option<(DataType, bool)> {
    let mapped = match data_type {
        SqlDataType::Nullable(inner) => return arrow_type(inner).map(|(t, _)| (t, true)),
        SqlDataType::Int32 | SqlDataType::Int(_) | SqlDataType::Integer(_) => DataType::Int32,
        SqlDataType::Int64 | SqlDataType::BigInt(_) => DataType::Int64,
        SqlDataType::Float64 => DataType::Float64,
        SqlDataType::String(_) | SqlDataType::Varchar(_) | SqlDataType::Text => DataType::Utf8,
        SqlDataType::Date => DataType::Date32,
        SqlDataType::Datetime(_) => DataType::Timestamp(TimeUnit::Second, None),
        SqlDataType::Decimal(ExactNumberInfo::PrecisionAndScale(precision, scale)) => {
            let (precision, scale) = (*precision as u8, *scale as i8);
            if precision <= 38 {
                DataType::Decimal128(precision, scale)
            } else {
                DataType::Decimal256(precision, scale)
            }
        }
        _ => return None,
    };

    Some((mapped, false))
}

#[async_trait]
impl AnalyticalStore for MemoryAnalyticalStore {
    #[instrument(skip(self), err)]
    async fn command(&self, sql: &str) -> Result<()> {
        self.ensure_available()?;

        let statements = Parser::parse_sql(&ClickHouseDialect {}, sql)
            .map_err(|err| Error::statement(StoreKind::Analytical, err))?;

        for statement in statements {
            match statement {
                Statement::CreateTable(create) => {
                    self.create_table(create.name.to_string(), create.if_not_exists, &create.columns)?
                }
                Statement::Drop {
                    object_type: ObjectType::Table,
                    if_exists,
                    names,
                    ..
                } => {
                    let mut tables = self.lock(&self.tables)?;
                    for name in names {
                        let name = name.to_string();
                        if tables.remove(&name).is_none() && !if_exists {
                            return Err(Error::PrecursorMissing(format!(
                                "table '{name}' does not exist"
                            )));
                        }
                    }
                }
                other => {
                    return Err(Error::statement(
                        StoreKind::Analytical,
                        format!("unsupported statement: {other}"),
                    ))
                }
            }
        }

        Ok(())
    }

    #[instrument(skip(self, batch), fields(rows = batch.num_rows()), err)]
    async fn insert(&self, table: &str, batch: &RecordBatch, column_names: &[&str]) -> Result<u64> {
        self.ensure_available()?;

        let fault = self.take_fault()?;
        let mut tables = self.lock(&self.tables)?;
        let target = tables
            .get_mut(table)
            .ok_or_else(|| Error::PrecursorMissing(format!("table '{table}' does not exist")))?;

        let requested = batch.num_rows();
        let rows = match fault {
            Some(InsertFault { keep_rows: 0, .. }) => {
                warn!("Injected fault: dropping insert into {table}");
                return Err(Error::unavailable(
                    StoreKind::Analytical,
                    "connection reset during insert",
                ));
            }
            Some(InsertFault { keep_rows, .. }) => keep_rows.min(requested),
            None => requested,
        };
        let batch = batch.slice(0, rows);
        let import_time = chrono::Utc::now().timestamp();

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(target.schema.fields().len());
        for field in target.schema.fields() {
            let name = field.name().as_str();

            if column_names.contains(&name) {
                let column = batch.column_by_name(name).ok_or_else(|| {
                    Error::schema_mismatch(table, format!("batch lacks column '{name}'"))
                })?;
                if column.data_type() != field.data_type() {
                    return Err(Error::schema_mismatch(
                        table,
                        format!(
                            "column '{name}' expects {} but got {}",
                            field.data_type(),
                            column.data_type()
                        ),
                    ));
                }
                columns.push(column.clone());
            } else if target.defaulted.contains(name)
                && matches!(field.data_type(), DataType::Timestamp(TimeUnit::Second, None))
            {
                columns.push(Arc::new(TimestampSecondArray::from_iter_values(
                    std::iter::repeat(import_time).take(rows),
                )));
            } else {
                return Err(Error::schema_mismatch(
                    table,
                    format!("no value for column '{name}'"),
                ));
            }
        }

        if let Some(unknown) = column_names
            .iter()
            .find(|name| target.schema.column_with_name(name).is_none())
        {
            return Err(Error::schema_mismatch(
                table,
                format!("unknown column '{unknown}'"),
            ));
        }

        let appended = RecordBatch::try_new(target.schema.clone(), columns)
            .map_err(|err| Error::schema_mismatch(table, err.to_string()))?;
        target.batches.push(appended);

        if fault.is_some() {
            return Err(Error::PartialReplication {
                table: table.to_string(),
                expected: requested as u64,
                written: rows as u64,
                reason: "connection reset during insert".into(),
            });
        }

        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(rows as u64)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
