//! MAC frame codec.
//!
//! Four frame types share a compact binary header: a one-byte kind, a
//! 16-bit NAV duration in microseconds, source and destination link
//! addresses and a protocol identifier. DATA frames additionally carry a
//! 16-bit sequence number; the payload follows the header on the wire and
//! is not the codec's concern.

use core::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// Encoded length of RTS/CTS/ACK headers
pub const CTRL_HEADER_LEN: usize = 1 + 2 + ADDRESS_LEN * 2 + 2;

/// Encoded length of DATA headers
pub const DATA_HEADER_LEN: usize = CTRL_HEADER_LEN + 2;

/// Link-layer address length in bytes
pub const ADDRESS_LEN: usize = 6;

/// Fixed-width link-layer address
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Distinguished broadcast address (all ones)
    pub const BROADCAST: Address = Address([0xff; ADDRESS_LEN]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Frame type discriminant as encoded on the wire
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum FrameKind {
    Rts = 0,
    Cts = 1,
    Ack = 2,
    Data = 3,
}

impl FrameKind {
    /// Type-specific encoded header length
    pub fn header_len(&self) -> usize {
        match self {
            FrameKind::Rts | FrameKind::Cts | FrameKind::Ack => CTRL_HEADER_LEN,
            FrameKind::Data => DATA_HEADER_LEN,
        }
    }
}

/// Fields common to RTS, CTS and ACK frames
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Ctrl {
    /// NAV reservation in microseconds, truncated to 16 bits
    pub duration: u16,
    pub source: Address,
    pub destination: Address,
    pub protocol: u16,
}

/// Header fields of a DATA frame
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Data {
    /// NAV reservation in microseconds, truncated to 16 bits
    pub duration: u16,
    pub source: Address,
    pub destination: Address,
    pub protocol: u16,
    pub sequence: u16,
}

/// MAC frame header, tagged by frame type.
///
/// The codec only ever reads or writes the fields valid for the frame's
/// type; header size is a pure function of the type.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Frame {
    Rts(Ctrl),
    Cts(Ctrl),
    Ack(Ctrl),
    Data(Data),
}

/// Frame decode errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DecodeError {
    /// Buffer shorter than the header for the indicated type
    NotEnoughBytes,
    /// Unrecognised frame type byte
    UnknownKind(u8),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Rts(_) => FrameKind::Rts,
            Frame::Cts(_) => FrameKind::Cts,
            Frame::Ack(_) => FrameKind::Ack,
            Frame::Data(_) => FrameKind::Data,
        }
    }

    /// Encoded header length for this frame
    pub fn encoded_len(&self) -> usize {
        self.kind().header_len()
    }

    pub fn duration(&self) -> u16 {
        match self {
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.duration,
            Frame::Data(d) => d.duration,
        }
    }

    pub fn source(&self) -> Address {
        match self {
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.source,
            Frame::Data(d) => d.source,
        }
    }

    pub fn destination(&self) -> Address {
        match self {
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.destination,
            Frame::Data(d) => d.destination,
        }
    }

    /// Encode the header into `buf`, returning the number of bytes written.
    ///
    /// `buf` must be at least `self.encoded_len()` bytes.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.kind() as u8;

        match self {
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => {
                LittleEndian::write_u16(&mut buf[1..3], c.duration);
                buf[3..9].copy_from_slice(&c.source.0);
                buf[9..15].copy_from_slice(&c.destination.0);
                LittleEndian::write_u16(&mut buf[15..17], c.protocol);
                CTRL_HEADER_LEN
            }
            Frame::Data(d) => {
                LittleEndian::write_u16(&mut buf[1..3], d.duration);
                buf[3..9].copy_from_slice(&d.source.0);
                buf[9..15].copy_from_slice(&d.destination.0);
                LittleEndian::write_u16(&mut buf[15..17], d.protocol);
                LittleEndian::write_u16(&mut buf[17..19], d.sequence);
                DATA_HEADER_LEN
            }
        }
    }

    /// Decode a header from `buf`.
    ///
    /// Trailing bytes (the DATA payload) are ignored.
    pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::NotEnoughBytes);
        }

        let kind = match buf[0] {
            0 => FrameKind::Rts,
            1 => FrameKind::Cts,
            2 => FrameKind::Ack,
            3 => FrameKind::Data,
            b => return Err(DecodeError::UnknownKind(b)),
        };

        if buf.len() < kind.header_len() {
            return Err(DecodeError::NotEnoughBytes);
        }

        let duration = LittleEndian::read_u16(&buf[1..3]);
        let mut source = [0u8; ADDRESS_LEN];
        source.copy_from_slice(&buf[3..9]);
        let mut destination = [0u8; ADDRESS_LEN];
        destination.copy_from_slice(&buf[9..15]);
        let protocol = LittleEndian::read_u16(&buf[15..17]);

        let ctrl = Ctrl {
            duration,
            source: Address(source),
            destination: Address(destination),
            protocol,
        };

        let frame = match kind {
            FrameKind::Rts => Frame::Rts(ctrl),
            FrameKind::Cts => Frame::Cts(ctrl),
            FrameKind::Ack => Frame::Ack(ctrl),
            FrameKind::Data => Frame::Data(Data {
                duration,
                source: ctrl.source,
                destination: ctrl.destination,
                protocol,
                sequence: LittleEndian::read_u16(&buf[17..19]),
            }),
        };

        Ok(frame)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const A: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const B: Address = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

    fn ctrl() -> Ctrl {
        Ctrl {
            duration: 1234,
            source: A,
            destination: B,
            protocol: 0x0800,
        }
    }

    #[test]
    fn roundtrip_all_kinds() {
        let frames = [
            Frame::Rts(ctrl()),
            Frame::Cts(ctrl()),
            Frame::Ack(ctrl()),
            Frame::Data(Data {
                duration: 56,
                source: B,
                destination: Address::BROADCAST,
                protocol: 7,
                sequence: 0xbeef,
            }),
        ];

        for f in frames.iter() {
            let mut buf = [0u8; DATA_HEADER_LEN];
            let n = f.encode(&mut buf);

            assert_eq!(n, f.encoded_len());
            assert_eq!(Frame::decode(&buf[..n]), Ok(*f));
        }
    }

    #[test]
    fn header_sizes() {
        assert_eq!(Frame::Rts(ctrl()).encoded_len(), 17);
        assert_eq!(Frame::Cts(ctrl()).encoded_len(), 17);
        assert_eq!(Frame::Ack(ctrl()).encoded_len(), 17);
        assert_eq!(FrameKind::Data.header_len(), 19);
    }

    #[test]
    fn wire_layout() {
        let f = Frame::Data(Data {
            duration: 0x0102,
            source: A,
            destination: B,
            protocol: 0x0304,
            sequence: 0x0506,
        });

        let mut buf = [0u8; DATA_HEADER_LEN];
        f.encode(&mut buf);

        assert_eq!(buf[0], 3);
        // Little-endian duration
        assert_eq!(&buf[1..3], &[0x02, 0x01]);
        assert_eq!(&buf[3..9], &A.0);
        assert_eq!(&buf[9..15], &B.0);
        assert_eq!(&buf[15..17], &[0x04, 0x03]);
        assert_eq!(&buf[17..19], &[0x06, 0x05]);
    }

    #[test]
    fn decode_unknown_kind() {
        let mut buf = [0u8; DATA_HEADER_LEN];
        Frame::Rts(ctrl()).encode(&mut buf);
        buf[0] = 9;

        assert_eq!(Frame::decode(&buf), Err(DecodeError::UnknownKind(9)));
    }

    #[test]
    fn decode_short_buffer() {
        let mut buf = [0u8; DATA_HEADER_LEN];
        let n = Frame::Ack(ctrl()).encode(&mut buf);

        assert_eq!(Frame::decode(&buf[..n - 1]), Err(DecodeError::NotEnoughBytes));
        assert_eq!(Frame::decode(&[]), Err(DecodeError::NotEnoughBytes));
    }

    #[test]
    fn data_payload_ignored_by_codec() {
        let f = Frame::Data(Data {
            duration: 0,
            source: A,
            destination: B,
            protocol: 1,
            sequence: 9,
        });

        let mut buf = [0u8; 64];
        let n = f.encode(&mut buf);
        buf[n..n + 4].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(Frame::decode(&buf[..n + 4]), Ok(f));
    }
}
