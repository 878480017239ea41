//! Per-column bindings between backup values and native accessors.

use chrono::FixedOffset;
use std::fmt;
use std::sync::Arc;

use super::format::{ColumnRef, ValueFormat, ValueFormatRegistry};
use super::param::{ParameterBinder, ResultCursor};
use super::{Value, ValueType};
use crate::backup::metadata::{Column, Table};
use crate::db::dialect::Dialect;
use crate::error::FormatError;

/// Which native accessor a handle addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// A column of a fetched result row
    Result,
    /// A parameter slot of a prepared statement
    Statement,
}

/// Options passed to a format on every access
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessOptions {
    /// Zone in which zone-less temporal literals are interpreted. Formats
    /// apply it to zoned type codes only; plain TIMESTAMP keeps its wall clock.
    pub time_zone: Option<FixedOffset>,
}

/// One column's format, encoding and accessor position
#[derive(Clone)]
pub struct ValueHandle {
    column: ColumnRef,
    value_type: ValueType,
    format: Arc<dyn ValueFormat>,
    kind: AccessKind,
    index: usize,
    options: AccessOptions,
}

impl ValueHandle {
    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn options(&self) -> &AccessOptions {
        &self.options
    }

    /// Reads this handle's column from a fetched row
    pub fn get_value<C>(&self, cursor: &C) -> Result<Value, FormatError>
    where
        C: ResultCursor + ?Sized,
    {
        if self.kind != AccessKind::Result {
            return Err(self
                .column
                .conversion_error(self.index, "handle is bound to a statement parameter"));
        }
        let param = cursor.get(self.index).ok_or_else(|| {
            self.column
                .conversion_error(self.index, "result row has no column at this position")
        })?;
        self.format.get(param, &self.column, &self.options)
    }

    /// Converts `value` and binds it to this handle's parameter slot
    pub fn set_value<B>(&self, binder: &mut B, value: &Value) -> Result<(), FormatError>
    where
        B: ParameterBinder + ?Sized,
    {
        if self.kind != AccessKind::Statement {
            return Err(self
                .column
                .conversion_error(self.index, "handle is bound to a result column"));
        }
        let param = self.format.set(value, &self.column, &self.options)?;
        binder.set(self.index, param);
        Ok(())
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("column", &self.column.qualified_name)
            .field("type", &self.column.type_name)
            .field("value_type", &self.value_type)
            .field("format", &self.format)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("options", &self.options)
            .finish()
    }
}

/// Handles for an ordered column list, matching row-set column order and
/// statement parameter order.
#[derive(Debug, Clone, Default)]
pub struct ValueHandleList {
    handles: Vec<ValueHandle>,
}

impl ValueHandleList {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueHandle> {
        self.handles.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ValueHandle> {
        self.handles.get(index)
    }

    /// Encodings the backup must use for these columns, in order
    pub fn value_types(&self) -> Vec<ValueType> {
        self.handles.iter().map(ValueHandle::value_type).collect()
    }

    /// Binds one row's values; `values` must be in handle order
    pub fn set_values<B>(&self, binder: &mut B, values: &[Value]) -> Result<(), FormatError>
    where
        B: ParameterBinder + ?Sized,
    {
        for (handle, value) in self.handles.iter().zip(values) {
            handle.set_value(binder, value)?;
        }
        Ok(())
    }

    pub fn get_values<C>(&self, cursor: &C) -> Result<Vec<Value>, FormatError>
    where
        C: ResultCursor + ?Sized,
    {
        self.handles.iter().map(|h| h.get_value(cursor)).collect()
    }
}

/// Builds a [`ValueHandleList`] one column at a time.
///
/// Accessor positions are assigned from an internal cursor, so a builder is
/// consumed by exactly one result set or prepared statement.
pub struct ValueHandleListBuilder<'a> {
    dialect: &'a dyn Dialect,
    formats: &'a ValueFormatRegistry,
    kind: AccessKind,
    time_zone: Option<FixedOffset>,
    position: usize,
    handles: Vec<ValueHandle>,
}

impl<'a> ValueHandleListBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect, formats: &'a ValueFormatRegistry, kind: AccessKind) -> Self {
        Self {
            dialect,
            formats,
            kind,
            time_zone: None,
            position: 0,
            handles: Vec::new(),
        }
    }

    pub fn time_zone(mut self, time_zone: Option<FixedOffset>) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Adds the next column, resolving its type through the dialect
    pub fn column(mut self, table: &Table, column: &Column) -> Result<Self, FormatError> {
        let (type_code, type_name) = self.dialect.resolve_type(column.type_code, &column.type_name);
        let column_ref = ColumnRef::new(
            format!("{}.{}", table.qualified_name(), column.name),
            type_code,
            type_name,
        );
        let format = self.formats.lookup(&column_ref)?;
        let value_type = format.value_type(&column_ref);

        let options = AccessOptions {
            time_zone: self
                .time_zone
                .filter(|_| type_code.is_temporal() && self.dialect.requires_time_zone_binding()),
        };

        self.handles.push(ValueHandle {
            column: column_ref,
            value_type,
            format,
            kind: self.kind,
            index: self.position,
            options,
        });
        self.position += 1;
        Ok(self)
    }

    pub fn columns<'c, I>(self, table: &Table, columns: I) -> Result<Self, FormatError>
    where
        I: IntoIterator<Item = &'c Column>,
    {
        columns
            .into_iter()
            .try_fold(self, |builder, column| builder.column(table, column))
    }

    pub fn build(self) -> ValueHandleList {
        ValueHandleList {
            handles: self.handles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::{PostgresDialect, SqliteDialect};
    use crate::value::param::{Param, ParamRow};
    use crate::value::types::SqlTypeCode;
    use chrono::NaiveDate;

    fn table() -> Table {
        Table::new(Some("public"), "events")
            .with_column(Column::new("id", SqlTypeCode::INTEGER, "INTEGER"))
            .with_column(Column::new("at", SqlTypeCode::TIMESTAMP, "TIMESTAMP"))
            .with_column(Column::new("payload", SqlTypeCode::BLOB, "BLOB"))
    }

    #[test]
    fn test_positions_follow_column_order() {
        let dialect = SqliteDialect::new();
        let formats = ValueFormatRegistry::new(dialect.extensions());
        let table = table();
        let list = ValueHandleListBuilder::new(&dialect, &formats, AccessKind::Statement)
            .columns(&table, &table.columns)
            .unwrap()
            .build();

        assert_eq!(list.len(), 3);
        let positions: Vec<_> = list.iter().map(|h| h.index()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(
            list.value_types(),
            vec![ValueType::String, ValueType::String, ValueType::Binary]
        );
        assert_eq!(list.get(1).unwrap().column().qualified_name, "public.events.at");
    }

    #[test]
    fn test_time_zone_only_for_temporal_columns_when_required() {
        let tz = FixedOffset::east_opt(3600);
        let table = table().with_column(Column::new(
            "seen_at",
            SqlTypeCode::TIMESTAMP_WITH_TIMEZONE,
            "TIMESTAMPTZ",
        ));

        let pg = PostgresDialect::new();
        let formats = ValueFormatRegistry::new(pg.extensions());
        let list = ValueHandleListBuilder::new(&pg, &formats, AccessKind::Statement)
            .time_zone(tz)
            .columns(&table, &table.columns)
            .unwrap()
            .build();
        assert_eq!(list.get(0).unwrap().options().time_zone, None);
        assert_eq!(list.get(1).unwrap().options().time_zone, tz);
        assert_eq!(list.get(2).unwrap().options().time_zone, None);
        assert_eq!(list.get(3).unwrap().options().time_zone, tz);

        let sqlite = SqliteDialect::new();
        let list = ValueHandleListBuilder::new(&sqlite, &formats, AccessKind::Statement)
            .time_zone(tz)
            .columns(&table, &table.columns)
            .unwrap()
            .build();
        assert_eq!(list.get(1).unwrap().options().time_zone, None);
        assert_eq!(list.get(3).unwrap().options().time_zone, None);
    }

    #[test]
    fn test_postgres_timestamp_binds_wall_clock() {
        let pg = PostgresDialect::new();
        let formats = ValueFormatRegistry::new(pg.extensions());
        let table = Table::new(Some("public"), "events")
            .with_column(Column::new("at", SqlTypeCode::TIMESTAMP, "TIMESTAMP"))
            .with_column(Column::new(
                "seen_at",
                SqlTypeCode::VENDOR_TIMESTAMP_LTZ,
                "TIMESTAMP WITH LOCAL TIME ZONE",
            ));
        let list = ValueHandleListBuilder::new(&pg, &formats, AccessKind::Statement)
            .time_zone(FixedOffset::east_opt(2 * 3600))
            .columns(&table, &table.columns)
            .unwrap()
            .build();

        let mut row = ParamRow::new(list.len());
        let values = vec![Value::string("2024-01-15 10:30:00"), Value::string("2024-01-15 10:30:00")];
        list.set_values(&mut row, &values).unwrap();
        let params = row.into_params();

        let wall_clock = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(params[0], Param::Timestamp(wall_clock));
        match &params[1] {
            Param::TimestampTz(dt) => {
                assert_eq!(dt.naive_local(), wall_clock);
                assert_eq!(dt.offset().local_minus_utc(), 7200);
            }
            other => panic!("expected zoned timestamp, got {other:?}"),
        }
    }

    #[test]
    fn test_set_and_get_values() {
        let dialect = SqliteDialect::new();
        let formats = ValueFormatRegistry::new(dialect.extensions());
        let table = table();
        let values = vec![
            Value::string("7"),
            Value::string("2024-01-15 10:30:00"),
            Value::null(ValueType::Binary),
        ];

        let statement = ValueHandleListBuilder::new(&dialect, &formats, AccessKind::Statement)
            .columns(&table, &table.columns)
            .unwrap()
            .build();
        let mut row = ParamRow::new(statement.len());
        statement.set_values(&mut row, &values).unwrap();
        let params = row.into_params();
        assert_eq!(params[0], Param::I32(7));
        assert_eq!(
            params[1],
            Param::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 15)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap()
            )
        );
        assert!(params[2].is_null());

        let result = ValueHandleListBuilder::new(&dialect, &formats, AccessKind::Result)
            .columns(&table, &table.columns)
            .unwrap()
            .build();
        assert_eq!(result.get_values(&params).unwrap(), values);
    }

    #[test]
    fn test_unsupported_column_fails_build() {
        let dialect = SqliteDialect::new();
        let formats = ValueFormatRegistry::new(dialect.extensions());
        let table = Table::new(None::<&str>, "geo")
            .with_column(Column::new("shape", SqlTypeCode(9999), "GEOMETRY"));
        let err = ValueHandleListBuilder::new(&dialect, &formats, AccessKind::Statement)
            .columns(&table, &table.columns)
            .err()
            .unwrap();
        assert!(err.to_string().contains("geo.shape"), "{err}");
    }
}
