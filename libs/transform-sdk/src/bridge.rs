//! Host ↔ guest record batch encoding.
//!
//! All integers are big-endian. Lengths are signed so that `-1` can mark a
//! null key or value, the same convention as the Kafka record format.
//!
//! ```text
//! batch  := base_offset:i64 partition:i32 base_timestamp:i64 count:i32 record{count}
//! record := timestamp:i64 key:nbytes value:nbytes header_count:i32 header{header_count}
//! header := key_len:i32 key:utf8 value_len:i32 value
//! nbytes := len:i32 (-1 = null) bytes{len}
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::error::TransformError;
use crate::record::{BatchMeta, Record, RecordBatch, RecordHeader};

/// Size of the fixed batch header.
pub const BATCH_HEADER_LEN: usize = 8 + 4 + 8 + 4;

/// Smallest possible encoded record: timestamp, two null lengths, no headers.
const MIN_RECORD_LEN: usize = 8 + 4 + 4 + 4;

const NULL_LEN: i32 = -1;

/// Decode a host buffer into an owned [`RecordBatch`](crate::RecordBatch).
///
/// The host buffer is copied exactly once; record keys, values and header
/// values are slices of that single copy, so nothing produced here borrows
/// host memory after the call returns.
pub fn read_batch(raw: &[u8]) -> Result<RecordBatch, TransformError> {
    let mut buf = Bytes::copy_from_slice(raw);

    let meta = read_meta(&mut buf).map_err(|reason| TransformError::malformed(format!("header: {reason}")))?;
    let count = get_i32(&mut buf, "record count")
        .and_then(|n| non_negative(n, "record count"))
        .and_then(|n| check_offsets(&meta, n).map(|()| n))
        .map_err(|reason| TransformError::malformed(format!("header: {reason}")))?;

    let mut records = Vec::with_capacity(count.min(buf.remaining() / MIN_RECORD_LEN));
    for position in 0..count {
        if !buf.has_remaining() {
            return Err(TransformError::malformed(format!(
                "declared {count} records but buffer ends after {position}"
            )));
        }
        let record = read_record(&mut buf)
            .map_err(|reason| TransformError::malformed(format!("record {position}: {reason}")))?;
        records.push(record);
    }

    if buf.has_remaining() {
        return Err(TransformError::malformed(format!(
            "{} trailing bytes after {count} declared records",
            buf.remaining()
        )));
    }

    Ok(RecordBatch { meta, records })
}

/// Encode records for the host. Inverse of [`read_batch`].
pub fn write_batch(meta: &BatchMeta, records: &[Record]) -> Result<Vec<u8>, TransformError> {
    let size = BATCH_HEADER_LEN + records.iter().map(encoded_len).sum::<usize>();
    let mut buf = Vec::with_capacity(size);

    buf.put_i64(meta.base_offset);
    buf.put_i32(meta.partition);
    buf.put_i64(meta.base_timestamp);
    buf.put_i32(len_i32(records.len(), "record count")?);

    for record in records {
        buf.put_i64(record.timestamp());
        put_nullable(&mut buf, record.key(), "key")?;
        put_nullable(&mut buf, record.value(), "value")?;
        buf.put_i32(len_i32(record.headers().len(), "header count")?);
        for header in record.headers() {
            buf.put_i32(len_i32(header.key().len(), "header key")?);
            buf.put_slice(header.key().as_bytes());
            buf.put_i32(len_i32(header.value().len(), "header value")?);
            buf.put_slice(header.value());
        }
    }

    Ok(buf)
}

/// Exact encoded size of one record.
pub fn encoded_len(record: &Record) -> usize {
    let headers: usize = record
        .headers()
        .iter()
        .map(|h| 4 + h.key().len() + 4 + h.value().len())
        .sum();
    MIN_RECORD_LEN
        + record.key().map_or(0, Bytes::len)
        + record.value().map_or(0, Bytes::len)
        + headers
}

// ---------------------------------------------------------------------------
// Decoding helpers. Each returns a short reason; callers add position context.
// ---------------------------------------------------------------------------

fn read_meta(buf: &mut Bytes) -> Result<BatchMeta, String> {
    Ok(BatchMeta {
        base_offset: get_i64(buf, "base offset")?,
        partition: get_i32(buf, "partition")?,
        base_timestamp: get_i64(buf, "base timestamp")?,
    })
}

/// Every record offset, `base_offset..base_offset + count`, must be a
/// valid non-negative `i64`.
fn check_offsets(meta: &BatchMeta, count: usize) -> Result<(), String> {
    if meta.base_offset < 0 {
        return Err(format!("negative base offset: {}", meta.base_offset));
    }
    let last = count.saturating_sub(1) as i64;
    if meta.base_offset.checked_add(last).is_none() {
        return Err(format!(
            "base offset {} leaves no room for {count} records",
            meta.base_offset
        ));
    }
    Ok(())
}

fn read_record(buf: &mut Bytes) -> Result<Record, String> {
    let timestamp = get_i64(buf, "timestamp")?;
    let key = get_nullable(buf, "key")?;
    let value = get_nullable(buf, "value")?;

    let header_count = non_negative(get_i32(buf, "header count")?, "header count")?;
    let mut builder = Record::builder()
        .timestamp(timestamp)
        .maybe_key(key)
        .maybe_value(value);
    for index in 0..header_count {
        let header = read_header(buf).map_err(|reason| format!("header {index}: {reason}"))?;
        builder = builder.push_header(header);
    }
    Ok(builder.build())
}

fn read_header(buf: &mut Bytes) -> Result<RecordHeader, String> {
    let key_len = non_negative(get_i32(buf, "key length")?, "key length")?;
    let key = take(buf, key_len, "key")?;

    let value_len = non_negative(get_i32(buf, "value length")?, "value length")?;
    let value = take(buf, value_len, "value")?;
    RecordHeader::from_utf8(key, value).map_err(|_| "key is not valid UTF-8".to_string())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), String> {
    if buf.remaining() < n {
        return Err(format!(
            "{what} needs {n} bytes, {} remaining",
            buf.remaining()
        ));
    }
    Ok(())
}

fn get_i64(buf: &mut Bytes, what: &str) -> Result<i64, String> {
    need(buf, 8, what)?;
    Ok(buf.get_i64())
}

fn get_i32(buf: &mut Bytes, what: &str) -> Result<i32, String> {
    need(buf, 4, what)?;
    Ok(buf.get_i32())
}

fn non_negative(n: i32, what: &str) -> Result<usize, String> {
    usize::try_from(n).map_err(|_| format!("negative {what}: {n}"))
}

fn take(buf: &mut Bytes, len: usize, what: &str) -> Result<Bytes, String> {
    need(buf, len, what)?;
    Ok(buf.split_to(len))
}

fn get_nullable(buf: &mut Bytes, what: &str) -> Result<Option<Bytes>, String> {
    match get_i32(buf, what)? {
        NULL_LEN => Ok(None),
        n => {
            let len = non_negative(n, &format!("{what} length"))?;
            take(buf, len, what).map(Some)
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn len_i32(len: usize, what: &str) -> Result<i32, TransformError> {
    i32::try_from(len)
        .map_err(|_| TransformError::malformed(format!("{what} of {len} does not fit in i32")))
}

fn put_nullable(buf: &mut Vec<u8>, field: Option<&Bytes>, what: &str) -> Result<(), TransformError> {
    match field {
        None => buf.put_i32(NULL_LEN),
        Some(bytes) => {
            buf.put_i32(len_i32(bytes.len(), what)?);
            buf.put_slice(bytes);
        }
    }
    Ok(())
}
