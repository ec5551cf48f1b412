pub mod chunk_stream;
pub mod column_buffer;
pub mod datetime;
pub mod rowset;
pub mod types;

pub use chunk_stream::{Chunk, ChunkSource, ChunkStream, SharedReader};
pub use column_buffer::ColumnBuffer;
pub use datetime::{Date, Guid, Time, Timestamp};
pub use rowset::{BufferView, Rowset};
pub use types::{
    len_data_at_exec, pending_length, NativeKind, RowStatus, SqlType, DATA_AT_EXEC,
    LEN_DATA_AT_EXEC_OFFSET, NO_TOTAL, NTS, NULL_DATA,
};
