use super::statement::StatementCore;
use crate::driver::{ColumnDescription, Nullability};
use crate::error::{OdbcError, Result};
use crate::protocol::SqlType;

/// Column descriptions of an open result set.
#[derive(Debug, Clone)]
pub struct ResultSetMetaData {
    columns: Vec<ColumnDescription>,
}

impl ResultSetMetaData {
    pub fn new(columns: Vec<ColumnDescription>) -> Self {
        Self { columns }
    }

    pub(crate) fn describe(core: &mut StatementCore) -> Result<Self> {
        let result = core.proto.num_result_cols();
        let count = core.check(result, "Error fetching column count")?;
        let mut columns = Vec::with_capacity(count);
        for index in 1..=count {
            let result = core.proto.describe_col(index);
            columns.push(core.check(result, "Error describing column")?);
        }
        Ok(Self { columns })
    }

    fn column(&self, index: usize) -> Result<&ColumnDescription> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or(OdbcError::ColumnIndexOutOfRange(index))
    }

    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.name)
    }

    pub fn column_label(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.label)
    }

    pub fn table_name(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.table_name)
    }

    pub fn column_type(&self, index: usize) -> Result<SqlType> {
        Ok(self.column(index)?.sql_type)
    }

    pub fn column_type_name(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.type_name)
    }

    pub fn precision(&self, index: usize) -> Result<usize> {
        Ok(self.column(index)?.precision)
    }

    pub fn scale(&self, index: usize) -> Result<i16> {
        Ok(self.column(index)?.scale)
    }

    pub fn column_display_size(&self, index: usize) -> Result<usize> {
        Ok(self.column(index)?.display_size)
    }

    pub fn is_nullable(&self, index: usize) -> Result<Nullability> {
        Ok(self.column(index)?.nullable)
    }

    pub fn is_case_sensitive(&self, index: usize) -> Result<bool> {
        Ok(self.column(index)?.case_sensitive)
    }

    /// Type the rowset buffers column `index` as.
    pub(crate) fn buffer_type(&self, index: usize) -> SqlType {
        self.columns[index - 1].sql_type.remap_extended()
    }

    /// Buffer size a column needs: octet length for character and binary
    /// data on ODBC 3 drivers, precision otherwise.
    pub(crate) fn buffer_precision(&self, index: usize, odbc3: bool) -> usize {
        let desc = &self.columns[index - 1];
        let sized_by_length = matches!(
            self.buffer_type(index),
            SqlType::CHAR | SqlType::VARCHAR | SqlType::BINARY | SqlType::VARBINARY
        );
        if odbc3 && sized_by_length {
            desc.length
        } else {
            desc.precision
        }
    }

    /// True when any column is fetched with `get_data` instead of a bound
    /// buffer.
    pub fn needs_get_data(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.sql_type.remap_extended().is_streamed())
    }

    /// 1-based index of the first column named `name`, ignoring case.
    pub fn find_column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
            .ok_or_else(|| OdbcError::ColumnNotFound(name.to_string()))
    }
}
