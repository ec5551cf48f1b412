use super::column_buffer::ColumnBuffer;
use super::types::{NativeKind, SqlType};
use crate::error::Result;

/// Window onto one column's storage handed to the driver for a single call.
///
/// Row 0 of the view is the rowset row the column was bound at.
#[derive(Debug)]
pub struct BufferView<'a> {
    pub sql_type: SqlType,
    pub native: NativeKind,
    pub width: usize,
    pub streamed: bool,
    pub data: &'a mut [u8],
    pub status: &'a mut [i64],
}

impl BufferView<'_> {
    pub fn rows(&self) -> usize {
        self.status.len()
    }

    pub fn cell(&self, row: usize) -> &[u8] {
        &self.data[row * self.width..(row + 1) * self.width]
    }

    pub fn cell_mut(&mut self, row: usize) -> &mut [u8] {
        &mut self.data[row * self.width..(row + 1) * self.width]
    }
}

/// Column buffers sharing one row capacity and a movable current row.
#[derive(Debug)]
pub struct Rowset {
    rows: usize,
    current_row: usize,
    odbc3: bool,
    columns: Vec<ColumnBuffer>,
}

impl Rowset {
    pub fn new(rows: usize, odbc3: bool) -> Self {
        assert!(rows > 0, "rowset needs at least one row");
        Self {
            rows,
            current_row: 0,
            odbc3,
            columns: Vec::new(),
        }
    }

    fn create_column(&self, sql_type: SqlType, precision: usize, scale: i16) -> Result<ColumnBuffer> {
        let mut column = ColumnBuffer::new(sql_type, precision, scale, self.rows, self.odbc3)?;
        column.set_row(self.current_row);
        Ok(column)
    }

    pub fn add_column(&mut self, sql_type: SqlType, precision: usize, scale: i16) -> Result<()> {
        let column = self.create_column(sql_type, precision, scale)?;
        self.columns.push(column);
        Ok(())
    }

    /// Recreates column `index` (1-based). Only allowed while the rowset is
    /// positioned on row 0; returns false otherwise.
    pub fn replace_column(
        &mut self,
        index: usize,
        sql_type: SqlType,
        precision: usize,
        scale: i16,
    ) -> Result<bool> {
        assert!(
            index > 0 && index <= self.columns.len(),
            "column {} out of range",
            index
        );
        if self.current_row != 0 {
            return Ok(false);
        }
        let column = self.create_column(sql_type, precision, scale)?;
        self.columns[index - 1] = column;
        Ok(true)
    }

    pub fn current_row(&self) -> usize {
        self.current_row
    }

    pub fn set_current_row(&mut self, row: usize) {
        assert!(
            row < self.rows,
            "row {} outside rowset of {} rows",
            row,
            self.rows
        );
        self.current_row = row;
        for column in &mut self.columns {
            column.set_row(row);
            column.row_changed();
        }
    }

    /// 1-based column access.
    pub fn column(&self, index: usize) -> &ColumnBuffer {
        &self.columns[index - 1]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut ColumnBuffer {
        &mut self.columns[index - 1]
    }

    pub fn columns(&self) -> &[ColumnBuffer] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_odbc3(&self) -> bool {
        self.odbc3
    }

    pub fn after_update(&mut self) {
        for column in &mut self.columns {
            column.after_update();
        }
    }

    /// Views of every column starting at `from_row`, in column order.
    pub fn column_views(&mut self, from_row: usize) -> Vec<BufferView<'_>> {
        self.columns
            .iter_mut()
            .map(|c| {
                let (sql_type, native, width, streamed) =
                    (c.sql_type(), c.native(), c.width(), c.is_streamed());
                let (data, status) = c.storage_from(from_row);
                BufferView {
                    sql_type,
                    native,
                    width,
                    streamed,
                    data,
                    status,
                }
            })
            .collect()
    }
}
