use std::fmt;
use std::str::Utf8Error;

use bytes::Bytes;

/// One header entry. Keys are not required to be unique.
///
/// The key is UTF-8 text held in `Bytes`, so decoded headers share the
/// batch buffer instead of owning a separate `String`.
#[derive(Clone, PartialEq, Eq)]
pub struct RecordHeader {
    key: Bytes,
    value: Bytes,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: Bytes::from(key.into()),
            value: value.into(),
        }
    }

    /// Build from raw key bytes, checking they are UTF-8.
    pub fn from_utf8(key: Bytes, value: Bytes) -> Result<Self, Utf8Error> {
        std::str::from_utf8(&key)?;
        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        // SAFETY: `new` takes a `String` and `from_utf8` validates, so the
        // key bytes are always UTF-8.
        unsafe { std::str::from_utf8_unchecked(&self.key) }
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}

impl fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHeader")
            .field("key", &self.key())
            .field("value", &self.value)
            .finish()
    }
}

/// A single event record.
///
/// Immutable: transforms build new records (see [`Record::to_builder`])
/// rather than editing the input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    headers: Vec<RecordHeader>,
    key: Option<Bytes>,
    value: Option<Bytes>,
    timestamp: i64,
}

impl Record {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Start a new record from this one. Timestamp, key, value and headers
    /// are carried over.
    pub fn to_builder(&self) -> RecordBuilder {
        RecordBuilder {
            record: self.clone(),
        }
    }

    pub fn headers(&self) -> &[RecordHeader] {
        &self.headers
    }

    /// First header value with `key`, if any.
    pub fn header(&self, key: &str) -> Option<&Bytes> {
        self.headers.iter().find(|h| h.key() == key).map(RecordHeader::value)
    }

    pub fn key(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.record.key = Some(key.into());
        self
    }

    pub fn maybe_key(mut self, key: Option<Bytes>) -> Self {
        self.record.key = key;
        self
    }

    pub fn value(mut self, value: impl Into<Bytes>) -> Self {
        self.record.value = Some(value.into());
        self
    }

    pub fn maybe_value(mut self, value: Option<Bytes>) -> Self {
        self.record.value = value;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    /// Append a header. Existing headers with the same key are kept.
    pub fn header(self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.push_header(RecordHeader::new(key, value))
    }

    pub fn push_header(mut self, header: RecordHeader) -> Self {
        self.record.headers.push(header);
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}

/// Batch-level metadata supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchMeta {
    pub base_offset: i64,
    pub partition: i32,
    pub base_timestamp: i64,
}

impl BatchMeta {
    /// `base_offset + position`, saturating at `i64::MAX`.
    ///
    /// Decoded batches never saturate: the bridge rejects a base offset
    /// whose last record would pass `i64::MAX`.
    pub fn offset_of(&self, position: usize) -> i64 {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        self.base_offset.saturating_add(position)
    }
}

/// Records delivered in one host invocation. Read-only to transforms.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordBatch {
    pub meta: BatchMeta,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(meta: BatchMeta, records: Vec<Record>) -> Self {
        Self { meta, records }
    }

    /// Log offset of the record at `position`.
    pub fn offset_of(&self, position: usize) -> i64 {
        self.meta.offset_of(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_duplicate_headers_in_order() {
        let record = Record::builder()
            .key("k")
            .header("h", "1")
            .header("h", "2")
            .header("other", "x")
            .build();

        let keys: Vec<_> = record.headers().iter().map(RecordHeader::key).collect();
        assert_eq!(keys, ["h", "h", "other"]);
        assert_eq!(record.header("h"), Some(&Bytes::from_static(b"1")));
        assert_eq!(record.value(), None);
    }

    #[test]
    fn to_builder_leaves_source_untouched() {
        let input = Record::builder().key("k1").value("v").timestamp(42).build();
        let output = input.to_builder().value("V").build();

        assert_eq!(input.value(), Some(&Bytes::from_static(b"v")));
        assert_eq!(output.value(), Some(&Bytes::from_static(b"V")));
        assert_eq!(output.key(), input.key());
        assert_eq!(output.timestamp(), 42);
    }

    #[test]
    fn offsets_are_relative_to_base() {
        let batch = RecordBatch::new(
            BatchMeta {
                base_offset: 100,
                ..Default::default()
            },
            vec![Record::default(); 3],
        );
        assert_eq!(batch.offset_of(2), 102);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn offsets_saturate_instead_of_overflowing() {
        let meta = BatchMeta {
            base_offset: i64::MAX - 1,
            ..Default::default()
        };
        assert_eq!(meta.offset_of(1), i64::MAX);
        assert_eq!(meta.offset_of(2), i64::MAX);
        assert_eq!(meta.offset_of(usize::MAX), i64::MAX);
    }

    #[test]
    fn header_keys_must_be_utf8() {
        let header =
            RecordHeader::from_utf8(Bytes::from_static(b"trace"), Bytes::from_static(b"1")).unwrap();
        assert_eq!(header.key(), "trace");
        assert!(RecordHeader::from_utf8(Bytes::from_static(b"\xff"), Bytes::new()).is_err());
    }
}
