//! Reassembly of do-get frames into an Arrow IPC stream.
//!
//! Each [`FlightData`] carries one IPC message split in two: the flatbuffer metadata in
//! `data_header` and the raw column buffers in `data_body`. Putting back the framing the
//! server stripped gives a stream any IPC stream reader can parse:
//!
//! ```text
//! <0xFFFFFFFF> <metadata length: u32 LE> <header> <zero padding to 8 bytes> <body>
//! ```
//!
//! The metadata length covers the header plus its padding, which is what the reader
//! consumes before the body. Flatbuffer headers written by Arrow are already 8-byte
//! aligned, so for them the padding is empty and the length is exactly the header
//! length; the two only differ for an unaligned header. The body is written verbatim.

use arrow_flight::FlightData;
use prost::bytes::{BufMut, Bytes, BytesMut};

/// "Valid message follows" sentinel that starts every message.
pub const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

const ALIGNMENT: usize = 8;
/// Continuation marker plus length prefix.
const PREFIX_LEN: usize = 8;

/// Zero bytes needed after a header of `header_len` bytes so that
/// `(PREFIX_LEN + header_len + padding) % 8 == 0`.
pub fn padding_for(header_len: usize) -> usize {
    (ALIGNMENT - (PREFIX_LEN + header_len) % ALIGNMENT) % ALIGNMENT
}

/// Appends one framed message to `out`.
pub fn write_message(out: &mut BytesMut, header: &[u8], body: &[u8]) {
    let padding = padding_for(header.len());
    out.reserve(PREFIX_LEN + header.len() + padding + body.len());
    out.put_u32_le(CONTINUATION_MARKER);
    // Frames are capped by the channel's 100 MiB message limit, so this fits.
    out.put_u32_le((header.len() + padding) as u32);
    out.put_slice(header);
    out.put_bytes(0, padding);
    out.put_slice(body);
}

/// A byte-exact IPC stream rebuilt from the frames of one do-get call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassembledStream {
    bytes: Bytes,
    messages: usize,
}

impl ReassembledStream {
    /// Frames are processed in iteration order. Frames without a header carry no
    /// message and are skipped.
    pub fn from_frames<'a, I>(frames: I) -> Self
    where
        I: IntoIterator<Item = &'a FlightData>,
    {
        let mut out = BytesMut::new();
        let mut messages = 0;
        for frame in frames {
            if frame.data_header.is_empty() {
                continue;
            }
            write_message(&mut out, &frame.data_header, &frame.data_body);
            messages += 1;
        }
        Self {
            bytes: out.freeze(),
            messages,
        }
    }

    /// True when no frame produced a message; decodes to an empty, schema-less result.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.messages
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use arrow_array::types::Int32Type;
    use arrow_array::{ArrayRef, DictionaryArray, Int64Array, RecordBatch, StringArray};
    use arrow_flight::utils::batches_to_flight_data;
    use arrow_ipc::reader::StreamReader;
    use arrow_schema::{DataType, Field, Schema};

    fn frame(header: &[u8], body: &[u8]) -> FlightData {
        FlightData {
            data_header: Bytes::copy_from_slice(header),
            data_body: Bytes::copy_from_slice(body),
            ..Default::default()
        }
    }

    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn decode(stream: &ReassembledStream) -> Vec<RecordBatch> {
        let reader = StreamReader::try_new(Cursor::new(stream.as_bytes()), None).unwrap();
        reader.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn padding_keeps_messages_aligned() {
        for len in 0..64 {
            let padding = padding_for(len);
            assert!(padding < 8, "padding {padding} for header of {len} bytes");
            assert_eq!((4 + 4 + len + padding) % 8, 0, "header of {len} bytes");
        }
    }

    #[test]
    fn lays_out_marker_length_header_padding_body() {
        let stream = ReassembledStream::from_frames(&[frame(&[1, 2, 3], &[9, 9])]);
        let expected: Vec<u8> = vec![
            0xFF, 0xFF, 0xFF, 0xFF, // continuation
            8, 0, 0, 0, // header + padding
            1, 2, 3, 0, 0, 0, 0, 0, // header, padded
            9, 9, // body, unpadded
        ];
        assert_eq!(stream.as_bytes(), expected.as_slice());
        assert_eq!(stream.message_count(), 1);
    }

    #[test]
    fn aligned_header_is_prefixed_with_its_own_length() {
        let stream = ReassembledStream::from_frames(&[frame(&[5; 16], &[6; 8])]);
        let bytes = stream.as_bytes();
        assert_eq!(read_u32(bytes, 4), 16);
        assert_eq!(bytes.len(), 8 + 16 + 8);
        assert_eq!(&bytes[8..24], &[5; 16]);

        // Whatever the header size, the prefix never undercounts it.
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef],
        )
        .unwrap();
        let frames = batches_to_flight_data(&schema, vec![batch]).unwrap();
        let stream = ReassembledStream::from_frames(&frames);
        let mut offset = 0;
        for f in &frames {
            let prefix = read_u32(stream.as_bytes(), offset + 4) as usize;
            if f.data_header.len() % 8 == 0 {
                assert_eq!(prefix, f.data_header.len());
            }
            assert!(prefix - f.data_header.len() < 8);
            offset += 8 + prefix + f.data_body.len();
        }
    }

    #[test]
    fn every_block_starts_with_continuation_marker() {
        let frames: Vec<FlightData> = (1..=17)
            .map(|len| frame(&vec![0xAB; len], &vec![0xCD; 8 * (len % 3)]))
            .collect();
        let stream = ReassembledStream::from_frames(&frames);
        let bytes = stream.as_bytes();

        let mut offset = 0;
        for f in &frames {
            assert_eq!(read_u32(bytes, offset), CONTINUATION_MARKER);
            let meta_len = read_u32(bytes, offset + 4) as usize;
            assert_eq!(meta_len, f.data_header.len() + padding_for(f.data_header.len()));
            assert_eq!((offset + 8 + meta_len) % 8, 0);
            let header_start = offset + 8;
            assert_eq!(&bytes[header_start..header_start + f.data_header.len()], &f.data_header[..]);
            assert!(bytes[header_start + f.data_header.len()..header_start + meta_len]
                .iter()
                .all(|b| *b == 0));
            offset = header_start + meta_len + f.data_body.len();
        }
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn headerless_frames_contribute_nothing() {
        let a = frame(&[1; 12], &[2; 16]);
        let b = frame(&[3; 5], &[]);
        let with_gaps = ReassembledStream::from_frames(&[
            frame(&[], &[7; 32]),
            a.clone(),
            FlightData::default(),
            b.clone(),
            frame(&[], &[]),
        ]);
        let without = ReassembledStream::from_frames(&[a, b]);
        assert_eq!(with_gaps, without);
        assert_eq!(with_gaps.message_count(), 2);
    }

    #[test]
    fn no_frames_is_empty() {
        let stream = ReassembledStream::from_frames(&Vec::<FlightData>::new());
        assert!(stream.is_empty());
        assert_eq!(stream.message_count(), 0);
    }

    #[test]
    fn round_trips_through_stream_reader() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batches = vec![
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
                    Arc::new(StringArray::from(vec![Some("a"), None, Some("ccc")])),
                ],
            )
            .unwrap(),
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(vec![4])) as ArrayRef,
                    Arc::new(StringArray::from(vec![Some("a longer string value")])),
                ],
            )
            .unwrap(),
        ];

        let frames = batches_to_flight_data(&schema, batches.clone()).unwrap();
        let stream = ReassembledStream::from_frames(&frames);
        assert_eq!(stream.message_count(), 3);

        let decoded = decode(&stream);
        assert_eq!(decoded, batches);
    }

    #[test]
    fn round_trips_dictionary_batches() {
        let dict: DictionaryArray<Int32Type> = vec!["red", "green", "red", "blue"].into_iter().collect();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "color",
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            false,
        )]));
        let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(dict) as ArrayRef]).unwrap();

        let frames = batches_to_flight_data(&schema, vec![batch.clone()]).unwrap();
        let stream = ReassembledStream::from_frames(&frames);
        let decoded = decode(&stream);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].num_rows(), 4);
        assert_eq!(decoded[0].columns(), batch.columns());
    }

    #[test]
    fn matches_manually_framed_concatenation() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from((0..100).collect::<Vec<i64>>())) as ArrayRef],
        )
        .unwrap();
        let frames = batches_to_flight_data(&schema, vec![batch]).unwrap();

        let mut manual = BytesMut::new();
        for f in &frames {
            manual.put_u32_le(CONTINUATION_MARKER);
            let padded = (f.data_header.len() + 7) / 8 * 8;
            manual.put_u32_le(padded as u32);
            manual.put_slice(&f.data_header);
            manual.put_bytes(0, padded - f.data_header.len());
            manual.put_slice(&f.data_body);
        }

        let stream = ReassembledStream::from_frames(&frames);
        assert_eq!(stream.as_bytes(), &manual[..]);

        let decoded = decode(&stream);
        let total: usize = decoded.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 100);
    }
}
