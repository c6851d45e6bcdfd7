//! Attribute channel.
//!
//! Every face record of binary STL ends with a two byte _attribute byte
//! count_. The field is not a byte count in practice; some tools store a
//! color in it and most ignore it. Concatenated in face order, these fields
//! form a byte channel that carries a message:
//!
//! | Channel offset | Size | Content                          |
//! |----------------|------|----------------------------------|
//! | 0              | 4    | Message length `L` (u32, LE)     |
//! | 4              | `L`  | Message                          |
//! | 4 + `L`        | ...  | Padding                          |
//!
//! Padding is `0xFF` after a non-empty message, which viewers that read the
//! field as a color interpret as white. Without a message the whole channel
//! is zero, which is exactly what a plain export writes.

use byteorder::{ByteOrder, LittleEndian};
use std::iter::{Chain, Copied};
use std::slice;
use tracing::warn;

/// Size of the attribute field of a face record.
pub const ATTRIBUTE_SIZE: usize = 2;

/// Size of the length prefix of a message.
pub const LENGTH_SIZE: usize = 4;

const MESSAGE_PADDING: u8 = 0xFF;
const EMPTY_PADDING: u8 = 0x00;

/// Gets the largest message that fits in the channel of `face_count` faces.
///
/// The result is negative if not even the length prefix fits.
pub fn capacity(face_count: usize) -> i64 {
    (face_count as i64) * ATTRIBUTE_SIZE as i64 - LENGTH_SIZE as i64
}

/// Splits a message into attribute fields.
pub struct ChannelWriter<'a> {
    stream: Chain<std::array::IntoIter<u8, LENGTH_SIZE>, Copied<slice::Iter<'a, u8>>>,
    padding: u8,
}

impl<'a> ChannelWriter<'a> {
    /// Creates a writer for a message.
    ///
    /// An empty message is treated as no message. The length of the message
    /// must fit in a `u32`; longer messages must be rejected by the caller.
    pub fn new(message: Option<&'a [u8]>) -> Self {
        let message = message.unwrap_or(&[]);
        let mut length = [0u8; LENGTH_SIZE];
        LittleEndian::write_u32(&mut length, message.len() as u32);
        ChannelWriter {
            stream: length.into_iter().chain(message.iter().copied()),
            padding: if message.is_empty() {
                EMPTY_PADDING
            }
            else {
                MESSAGE_PADDING
            },
        }
    }

    /// Gets the attribute field of the next face.
    pub fn next_attribute(&mut self) -> [u8; ATTRIBUTE_SIZE] {
        let mut attribute = [self.padding; ATTRIBUTE_SIZE];
        for byte in attribute.iter_mut() {
            match self.stream.next() {
                Some(next) => *byte = next,
                None => break,
            }
        }
        attribute
    }
}

/// Reassembles a message from attribute fields.
#[derive(Debug, Default)]
pub struct ChannelReader {
    channel: Vec<u8>,
}

impl ChannelReader {
    pub fn with_capacity(face_count: usize) -> Self {
        ChannelReader {
            channel: Vec::with_capacity(face_count * ATTRIBUTE_SIZE),
        }
    }

    /// Appends the attribute field of the next face.
    pub fn push(&mut self, attribute: [u8; ATTRIBUTE_SIZE]) {
        self.channel.extend_from_slice(&attribute);
    }

    /// Extracts the message.
    ///
    /// Returns `None` if the channel is too short for a length prefix or if
    /// the length is zero. A length that exceeds the channel is clamped to
    /// the bytes that are available.
    pub fn into_message(self) -> Option<Vec<u8>> {
        if self.channel.len() < LENGTH_SIZE {
            return None;
        }
        let length = LittleEndian::read_u32(&self.channel[..LENGTH_SIZE]) as usize;
        if length == 0 {
            return None;
        }
        let available = self.channel.len() - LENGTH_SIZE;
        if length > available {
            warn!(
                length,
                available, "message length exceeds attribute channel; truncating"
            );
        }
        let end = LENGTH_SIZE + length.min(available);
        Some(self.channel[LENGTH_SIZE..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use crate::encoding::stl::channel::{capacity, ChannelReader, ChannelWriter};

    fn attributes(writer: &mut ChannelWriter, count: usize) -> Vec<[u8; 2]> {
        (0..count).map(|_| writer.next_attribute()).collect()
    }

    #[test]
    fn capacity_of_faces() {
        assert_eq!(-4, capacity(0));
        assert_eq!(-2, capacity(1));
        assert_eq!(0, capacity(2));
        assert_eq!(20, capacity(12));
    }

    #[test]
    fn write_message() {
        let mut writer = ChannelWriter::new(Some(b"abc"));
        assert_eq!(
            vec![[3, 0], [0, 0], [b'a', b'b'], [b'c', 0xFF], [0xFF, 0xFF]],
            attributes(&mut writer, 5),
        );
    }

    #[test]
    fn write_without_message() {
        for message in [None, Some(&b""[..])] {
            let mut writer = ChannelWriter::new(message);
            assert!(attributes(&mut writer, 4)
                .iter()
                .all(|attribute| *attribute == [0, 0]));
        }
    }

    #[test]
    fn read_message_ignores_padding() {
        let mut reader = ChannelReader::default();
        for attribute in [[2, 0], [0, 0], [b'h', b'i'], [0xFF, 0xFF]] {
            reader.push(attribute);
        }
        assert_eq!(Some(b"hi".to_vec()), reader.into_message());
    }

    #[test]
    fn read_without_message() {
        let mut reader = ChannelReader::default();
        reader.push([0, 0]);
        reader.push([0, 0]);
        assert_eq!(None, reader.into_message());

        let mut reader = ChannelReader::default();
        reader.push([9, 0]);
        assert_eq!(None, reader.into_message());
    }

    #[test]
    fn read_clamps_overlong_length() {
        let mut reader = ChannelReader::default();
        for attribute in [[10, 0], [0, 0], [b'o', b'k']] {
            reader.push(attribute);
        }
        assert_eq!(Some(b"ok".to_vec()), reader.into_message());
    }
}
