//! Fixed-layout wire messages
//!
//! Both messages travel as packed little-endian byte strings with no
//! padding; the sizes are compile-time constants so socket reads can be
//! validated before decoding.

use crate::error::{Error, Result};
use crate::types::Symbol;

/// One trade on the multicast and replay wires.
///
/// Wire layout, little-endian, 51 bytes:
///
/// | Offset | Size | Field             |
/// |--------|------|-------------------|
/// | 0      | 1    | `message_type`    |
/// | 1      | 8    | `sequence_number` |
/// | 9      | 8    | `trade_id`        |
/// | 17     | 8    | `timestamp`       |
/// | 25     | 8    | `price`           |
/// | 33     | 8    | `quantity`        |
/// | 41     | 1    | `buyer_is_maker`  |
/// | 42     | 1    | `best_match`      |
/// | 43     | 8    | `symbol`          |
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TradeRecord {
    /// Always `b'P'` for a trade.
    pub message_type: u8,
    /// Dense, monotonically increasing ordering key.
    pub sequence_number: u64,
    /// Exchange trade id.
    pub trade_id: u64,
    /// Milliseconds since epoch.
    pub timestamp: u64,
    /// Trade price.
    pub price: f64,
    /// Trade quantity.
    pub quantity: f64,
    /// True when the passive side of the trade was the buyer.
    pub buyer_is_maker: bool,
    /// Exchange best-match flag.
    pub best_match: bool,
    /// Instrument symbol, NUL right-padded.
    pub symbol: Symbol,
}

/// Trade message type byte.
pub const TRADE_MESSAGE_TYPE: u8 = b'P';

impl TradeRecord {
    /// Exact size of the serialized record.
    pub const WIRE_SIZE: usize = 51;

    /// One-second aggregation bucket this trade falls into.
    #[inline]
    pub fn bucket(&self) -> u64 {
        self.timestamp / 1000
    }

    /// Serialize into the packed wire layout.
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = self.message_type;
        buf[1..9].copy_from_slice(&self.sequence_number.to_le_bytes());
        buf[9..17].copy_from_slice(&self.trade_id.to_le_bytes());
        buf[17..25].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[25..33].copy_from_slice(&self.price.to_le_bytes());
        buf[33..41].copy_from_slice(&self.quantity.to_le_bytes());
        buf[41] = u8::from(self.buyer_is_maker);
        buf[42] = u8::from(self.best_match);
        buf[43..51].copy_from_slice(self.symbol.as_bytes());
        buf
    }

    /// Deserialize from the packed wire layout.
    ///
    /// Rejects buffers of the wrong length and unknown message types.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(Error::Protocol(format!(
                "trade record of {} bytes, expected {}",
                buf.len(),
                Self::WIRE_SIZE
            )));
        }
        if buf[0] != TRADE_MESSAGE_TYPE {
            return Err(Error::Protocol(format!(
                "unknown trade message type 0x{:02x}",
                buf[0]
            )));
        }
        let mut symbol = [0u8; Symbol::LEN];
        symbol.copy_from_slice(&buf[43..51]);
        Ok(Self {
            message_type: buf[0],
            sequence_number: u64::from_le_bytes(buf[1..9].try_into().expect("8-byte slice")),
            trade_id: u64::from_le_bytes(buf[9..17].try_into().expect("8-byte slice")),
            timestamp: u64::from_le_bytes(buf[17..25].try_into().expect("8-byte slice")),
            price: f64::from_le_bytes(buf[25..33].try_into().expect("8-byte slice")),
            quantity: f64::from_le_bytes(buf[33..41].try_into().expect("8-byte slice")),
            buyer_is_maker: buf[41] != 0,
            best_match: buf[42] != 0,
            symbol: Symbol::from_bytes(symbol),
        })
    }
}

/// Recovery command sent from the sequencer to the snapshot server.
///
/// Wire layout, little-endian, 17 bytes: `kind`, `start_seq`, `end_seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRequest {
    /// `b'0'` for a gap fill, `b'1'` for a full replay.
    pub kind: u8,
    /// First missing sequence number, inclusive.
    pub start_seq: u64,
    /// Last missing sequence number, inclusive.
    pub end_seq: u64,
}

/// Gap-fill request kind byte.
pub const GAP_REQUEST_FILL: u8 = b'0';
/// Replay-everything request kind byte.
pub const GAP_REQUEST_REPLAY_ALL: u8 = b'1';

impl GapRequest {
    /// Exact size of the serialized request.
    pub const WIRE_SIZE: usize = 17;

    /// Request the inclusive range `[start, end]`.
    pub fn fill(start: u64, end: u64) -> Self {
        Self {
            kind: GAP_REQUEST_FILL,
            start_seq: start,
            end_seq: end,
        }
    }

    /// Request every record the server holds.
    pub fn replay_all() -> Self {
        Self {
            kind: GAP_REQUEST_REPLAY_ALL,
            start_seq: 0,
            end_seq: 0,
        }
    }

    /// Serialize into the packed wire layout.
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = self.kind;
        buf[1..9].copy_from_slice(&self.start_seq.to_le_bytes());
        buf[9..17].copy_from_slice(&self.end_seq.to_le_bytes());
        buf
    }

    /// Deserialize from the packed wire layout.
    ///
    /// An unknown kind byte is a protocol error; the server logs and ignores
    /// such frames.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(Error::Protocol(format!(
                "gap request of {} bytes, expected {}",
                buf.len(),
                Self::WIRE_SIZE
            )));
        }
        let kind = buf[0];
        if kind != GAP_REQUEST_FILL && kind != GAP_REQUEST_REPLAY_ALL {
            return Err(Error::Protocol(format!(
                "unknown gap request kind 0x{kind:02x}"
            )));
        }
        Ok(Self {
            kind,
            start_seq: u64::from_le_bytes(buf[1..9].try_into().expect("8-byte slice")),
            end_seq: u64::from_le_bytes(buf[9..17].try_into().expect("8-byte slice")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_trade(seq: u64) -> TradeRecord {
        TradeRecord {
            message_type: TRADE_MESSAGE_TYPE,
            sequence_number: seq,
            trade_id: 7_000_000 + seq,
            timestamp: 1_750_000_000_123,
            price: 2516.42,
            quantity: 0.375,
            buyer_is_maker: true,
            best_match: false,
            symbol: Symbol::new("ETHUSDC"),
        }
    }

    #[test]
    fn test_trade_record_round_trip() {
        let record = sample_trade(42);
        let bytes = record.encode();
        assert_eq!(bytes.len(), TradeRecord::WIRE_SIZE);
        let decoded = TradeRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        // Byte-level round trip as well: decode then re-encode.
        assert_eq!(decoded.encode(), bytes);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(u64::MAX)]
    fn test_trade_record_sequence_extremes(#[case] seq: u64) {
        let bytes = sample_trade(seq).encode();
        assert_eq!(TradeRecord::decode(&bytes).unwrap().sequence_number, seq);
    }

    #[test]
    fn test_trade_record_rejects_short_buffer() {
        let bytes = sample_trade(1).encode();
        assert!(matches!(
            TradeRecord::decode(&bytes[..TradeRecord::WIRE_SIZE - 1]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_trade_record_rejects_unknown_type() {
        let mut bytes = sample_trade(1).encode();
        bytes[0] = b'Q';
        assert!(matches!(
            TradeRecord::decode(&bytes),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_gap_request_round_trip() {
        let req = GapRequest::fill(500, 599);
        let bytes = req.encode();
        assert_eq!(bytes.len(), GapRequest::WIRE_SIZE);
        assert_eq!(GapRequest::decode(&bytes).unwrap(), req);

        let replay = GapRequest::replay_all();
        assert_eq!(
            GapRequest::decode(&replay.encode()).unwrap().kind,
            GAP_REQUEST_REPLAY_ALL
        );
    }

    #[test]
    fn test_gap_request_rejects_unknown_kind() {
        let mut bytes = GapRequest::fill(0, 1).encode();
        bytes[0] = b'9';
        assert!(matches!(
            GapRequest::decode(&bytes),
            Err(Error::Protocol(_))
        ));
    }
}
