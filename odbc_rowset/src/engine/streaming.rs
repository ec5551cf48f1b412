use super::statement::{lock_core, SharedCore, StatementCore};
use crate::driver::{DataToken, GetData};
use crate::error::{OdbcError, Result};
use crate::protocol::{
    pending_length, Chunk, ChunkSource, ChunkStream, NativeKind, Rowset, NO_TOTAL, NULL_DATA,
};
use std::sync::Arc;

const PARAM_DATA_FAILED: &str = "Error requesting data at execution";
const PUT_DATA_FAILED: &str = "Error sending data at execution";

/// Pulls a long column value chunk by chunk through `get_data`.
///
/// Locks the statement for each chunk only, so the cursor stays usable
/// between reads.
pub(crate) struct GetDataSource {
    core: SharedCore,
    column: usize,
    native: NativeKind,
}

impl GetDataSource {
    pub(crate) fn new(core: SharedCore, column: usize, native: NativeKind) -> Self {
        Self {
            core,
            column,
            native,
        }
    }
}

/// Number of value bytes the driver placed into a buffer of `buf_len`
/// bytes, given the indicator it returned.
fn delivered_bytes(native: NativeKind, indicator: i64, buf_len: usize) -> usize {
    match native {
        NativeKind::Char => {
            let room = buf_len.saturating_sub(1);
            if indicator == NO_TOTAL || indicator < 0 || indicator as usize >= buf_len {
                room
            } else {
                indicator as usize
            }
        }
        _ => {
            if indicator == NO_TOTAL || indicator < 0 {
                buf_len
            } else {
                (indicator as usize).min(buf_len)
            }
        }
    }
}

impl ChunkSource for GetDataSource {
    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        let mut core = lock_core(&self.core)?;
        let result = core.proto.get_data(self.column, self.native, buf);
        let chunk = match core.check(result, "Error fetching long data")? {
            GetData::NoData => Chunk::End,
            GetData::Indicator(NULL_DATA) => Chunk::Null,
            GetData::Indicator(indicator) => {
                Chunk::Data(delivered_bytes(self.native, indicator, buf.len()))
            }
        };
        Ok(chunk)
    }
}

/// Opens a stream over column `column` of the current cursor row.
pub(crate) fn open_fetch_stream(
    core: &SharedCore,
    column: usize,
    native: NativeKind,
    chunk_size: usize,
) -> Result<ChunkStream> {
    // Character data carries a terminating NUL in every chunk.
    let buffer = match native {
        NativeKind::Char => chunk_size + 1,
        _ => chunk_size,
    };
    let source = GetDataSource::new(Arc::clone(core), column, native);
    ChunkStream::fetch(Box::new(source), buffer)
}

/// Answers the driver's data-at-execution requests from the streams held by
/// `rowset`, until the pending operation completes.
///
/// With `declared_only` at most the declared length of each value is sent.
/// A value with no bytes is sent as one empty chunk.
pub(crate) fn supply_pending_data(
    core: &mut StatementCore,
    rowset: &mut Rowset,
    bind_row: usize,
    declared_only: bool,
) -> Result<()> {
    let mut buf = vec![0u8; core.config.putdata_chunk_size.max(1)];
    loop {
        let result = {
            let mut views = rowset.column_views(bind_row);
            core.proto.param_data(&mut views)
        };
        let Some(DataToken(index)) = core.check(result, PARAM_DATA_FAILED)? else {
            return Ok(());
        };
        if index == 0 || index > rowset.column_count() {
            return Err(OdbcError::InternalError(format!(
                "Driver requested data for unknown column {}",
                index
            )));
        }

        let column = rowset.column_mut(index);
        let limit = if declared_only {
            pending_length(column.status())
        } else {
            None
        };
        let sent = match column.get_stream()? {
            Some(stream) => push_stream(core, stream, &mut buf, limit)?,
            None => 0,
        };
        if sent == 0 {
            let result = core.proto.put_data(&[]);
            core.check_with_state(result, PUT_DATA_FAILED, "HY090")?;
        }
        core.logger.log_stream(index, sent as u64);
    }
}

fn push_stream(
    core: &mut StatementCore,
    stream: &mut ChunkStream,
    buf: &mut [u8],
    limit: Option<usize>,
) -> Result<u64> {
    let mut sent = 0usize;
    loop {
        let want = match limit {
            Some(limit) => (limit - sent).min(buf.len()),
            None => buf.len(),
        };
        if want == 0 {
            break;
        }
        let n = stream.read_chunk(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        let result = core.proto.put_data(&buf[..n]);
        core.check_with_state(result, PUT_DATA_FAILED, "HY090")?;
        sent += n;
    }
    Ok(sent as u64)
}
