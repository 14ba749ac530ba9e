//! Stream Codecs
//!
//! - [`MsgPackCodec`]: market data stream. Frames are `MessagePack` arrays of
//!   maps; each map is decoded on its own so one bad record does not cost
//!   the rest of the frame.
//! - [`JsonCodec`]: trading stream. Frames are `{"stream", "data"}` objects
//!   (or arrays of them), sent as text or as binary-wrapped JSON.
//!
//! Decoders return a frame-level `Result` holding per-record `Result`s:
//! the outer error means the bytes were unusable, an inner error concerns
//! one record only. [`CodecError::UnknownMessageType`] marks a record the
//! client does not know, which callers drop with a warning.
//!
//! # Timestamps
//!
//! The server encodes market data times with the `MessagePack` timestamp
//! extension (type `-1`). These are rewritten to RFC 3339 strings before
//! typed decoding so the entity types deserialize the same way from REST
//! JSON and from the stream.

use chrono::{DateTime, SecondsFormat};
use rmpv::Value;
use rmpv::ext::from_value;

use super::messages::{MarketDataMessage, TradingMessage};

/// `MessagePack` extension type for timestamps.
const TIMESTAMP_EXT: i8 = -1;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MessagePack` encoding failed.
    #[error("`MessagePack` encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// Bytes were not valid `MessagePack`.
    #[error("`MessagePack` read error: {0}")]
    MsgPackRead(#[from] rmpv::decode::Error),

    /// A record did not match its type.
    #[error("`MessagePack` decode error: {0}")]
    MsgPackDecode(#[from] rmpv::ext::Error),

    /// Discriminator not known to this client.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Structurally invalid frame or record.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Check if this only marks an unrecognized record type.
    #[must_use]
    pub const fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownMessageType(_))
    }
}

/// Per-record decode outcome.
pub type Record<T> = Result<T, CodecError>;

// =============================================================================
// MessagePack (market data)
// =============================================================================

/// `MessagePack` codec for the market data stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not `MessagePack` or the top level
    /// is neither an array nor a map.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<Record<MarketDataMessage>>, CodecError> {
        let mut reader = data;
        let frame = rmpv::decode::read_value(&mut reader)?;

        let records = match frame {
            Value::Array(records) => records,
            map @ Value::Map(_) => vec![map],
            other => {
                return Err(CodecError::InvalidFormat(format!(
                    "expected array of records, got {other}"
                )));
            }
        };

        Ok(records
            .into_iter()
            .map(|record| decode_record(normalize_timestamps(record)))
            .collect())
    }

    /// Encode an outbound frame as a `MessagePack` map with named fields.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }
}

fn decode_record(record: Value) -> Record<MarketDataMessage> {
    let tag = record
        .as_map()
        .and_then(|fields| {
            fields
                .iter()
                .find(|(key, _)| key.as_str() == Some("T"))
                .and_then(|(_, value)| value.as_str())
        })
        .map(str::to_owned)
        .ok_or_else(|| CodecError::InvalidFormat("record has no `T` discriminator".into()))?;

    Ok(match tag.as_str() {
        "success" => MarketDataMessage::Success(from_value(record)?),
        "error" => MarketDataMessage::Error(from_value(record)?),
        "subscription" => MarketDataMessage::Subscription(from_value(record)?),
        "t" => MarketDataMessage::Trade(from_value(record)?),
        "q" => MarketDataMessage::Quote(from_value(record)?),
        "b" => MarketDataMessage::Bar(from_value(record)?),
        "u" => MarketDataMessage::UpdatedBar(from_value(record)?),
        "d" => MarketDataMessage::DailyBar(from_value(record)?),
        "s" => MarketDataMessage::Status(from_value(record)?),
        "l" => MarketDataMessage::Luld(from_value(record)?),
        "x" => MarketDataMessage::CancelError(from_value(record)?),
        "c" => MarketDataMessage::Correction(from_value(record)?),
        _ => return Err(CodecError::UnknownMessageType(tag)),
    })
}

/// Rewrite timestamp extensions to RFC 3339 strings, recursively.
fn normalize_timestamps(value: Value) -> Value {
    match value {
        Value::Ext(TIMESTAMP_EXT, bytes) => match decode_timestamp(&bytes) {
            Some(text) => Value::from(text),
            None => Value::Ext(TIMESTAMP_EXT, bytes),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_timestamps).collect()),
        Value::Map(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| (key, normalize_timestamps(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Decode the 32, 64 and 96 bit timestamp extension layouts.
fn decode_timestamp(bytes: &[u8]) -> Option<String> {
    let (secs, nanos) = match bytes.len() {
        4 => (i64::from(u32::from_be_bytes(bytes.try_into().ok()?)), 0),
        8 => {
            let raw = u64::from_be_bytes(bytes.try_into().ok()?);
            let nanos = u32::try_from(raw >> 34).ok()?;
            let secs = i64::try_from(raw & 0x0000_0003_ffff_ffff).ok()?;
            (secs, nanos)
        }
        12 => {
            let nanos = u32::from_be_bytes(bytes[..4].try_into().ok()?);
            let secs = i64::from_be_bytes(bytes[4..].try_into().ok()?);
            (secs, nanos)
        }
        _ => return None,
    };
    DateTime::from_timestamp(secs, nanos).map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

// =============================================================================
// JSON (trading stream)
// =============================================================================

/// JSON codec for the trading stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one frame (text, or binary carrying JSON).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not JSON or the top level is
    /// neither an object nor an array.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<Record<TradingMessage>>, CodecError> {
        let frame: serde_json::Value = serde_json::from_slice(data)?;
        let messages = match frame {
            serde_json::Value::Array(messages) => messages,
            object @ serde_json::Value::Object(_) => vec![object],
            other => {
                return Err(CodecError::InvalidFormat(format!(
                    "expected JSON object or array, got {other}"
                )));
            }
        };
        Ok(messages.into_iter().map(decode_trading_message).collect())
    }

    /// Encode an outbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn decode_trading_message(mut message: serde_json::Value) -> Record<TradingMessage> {
    let stream = message
        .get("stream")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CodecError::InvalidFormat("message has no `stream` field".into()))?;
    let data = message
        .get_mut("data")
        .map(serde_json::Value::take)
        .unwrap_or_default();

    Ok(match stream.as_str() {
        "authorization" => TradingMessage::Authorization(serde_json::from_value(data)?),
        "listening" => TradingMessage::Listening(serde_json::from_value(data)?),
        "trade_updates" => TradingMessage::TradeUpdate(Box::new(serde_json::from_value(data)?)),
        "account_updates" => TradingMessage::AccountUpdate(data),
        _ => return Err(CodecError::UnknownMessageType(stream)),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::alpaca::messages::{SubscriptionAction, SubscriptionRequest, SuccessKind};
    use crate::domain::subscription::{Channel, SubscriptionDelta};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn pack(value: &serde_json::Value) -> Vec<u8> {
        rmp_serde::to_vec_named(value).unwrap()
    }

    #[test]
    fn decodes_multiple_records_in_order() {
        let frame = pack(&json!([
            { "T": "success", "msg": "authenticated" },
            { "T": "t", "S": "AAPL", "i": 1, "x": "Q", "p": 144.5, "s": 25,
              "t": "2021-01-27T10:35:34Z", "c": ["@"], "z": "C" },
            { "T": "b", "S": "GE", "o": 1, "h": 2, "l": 1, "c": 2, "v": 10,
              "t": "2021-05-25T04:00:00Z" }
        ]));

        let records = MsgPackCodec::new().decode(&frame).unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(
            &records[0],
            Ok(MarketDataMessage::Success(s)) if s.msg == SuccessKind::Authenticated
        ));
        match &records[1] {
            Ok(MarketDataMessage::Trade(trade)) => {
                assert_eq!(trade.symbol, "AAPL");
                assert_eq!(trade.price, Decimal::new(1445, 1));
            }
            other => panic!("expected trade, got {other:?}"),
        }
        assert!(matches!(&records[2], Ok(MarketDataMessage::Bar(bar)) if bar.vwap.is_none()));
    }

    #[test]
    fn success_notices_decode_from_plain_strings() {
        let frame = pack(&json!([
            { "T": "success", "msg": "connected" },
            { "T": "success", "msg": "authenticated" },
            { "T": "success", "msg": "something new" }
        ]));

        let kinds: Vec<_> = MsgPackCodec::new()
            .decode(&frame)
            .unwrap()
            .into_iter()
            .map(|record| match record {
                Ok(MarketDataMessage::Success(s)) => s.msg,
                other => panic!("expected success notice, got {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [SuccessKind::Connected, SuccessKind::Authenticated, SuccessKind::Other]
        );
    }

    #[test]
    fn unknown_type_is_isolated() {
        let frame = pack(&json!([
            { "T": "zz", "S": "AAPL" },
            { "T": "s", "S": "AAPL", "sc": "H", "sm": "Halt", "rc": "T1", "rm": "News",
              "t": "2021-01-27T10:35:34Z", "z": "C" }
        ]));

        let records = MsgPackCodec::new().decode(&frame).unwrap();
        assert!(matches!(&records[0], Err(e) if e.is_unknown_type()));
        assert!(matches!(&records[1], Ok(MarketDataMessage::Status(_))));
    }

    #[test]
    fn bad_record_does_not_spoil_frame() {
        let frame = pack(&json!([
            { "T": "q", "S": "AAPL" },
            { "T": "error", "code": 405, "msg": "symbol limit exceeded" }
        ]));

        let records = MsgPackCodec::new().decode(&frame).unwrap();
        assert!(matches!(&records[0], Err(CodecError::MsgPackDecode(_))));
        assert!(matches!(&records[1], Ok(MarketDataMessage::Error(e)) if e.code == 405));
    }

    #[test]
    fn garbage_bytes_rejected() {
        assert!(MsgPackCodec::new().decode(&[0xc1]).is_err());
        assert!(matches!(
            MsgPackCodec::new().decode(&pack(&json!(42))),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn timestamp_extension_becomes_rfc3339() {
        // 96-bit layout: nanos (u32) then seconds (i64).
        let mut bytes = 5_000u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&1_611_743_734i64.to_be_bytes());
        let record = Value::Map(vec![(Value::from("t"), Value::Ext(TIMESTAMP_EXT, bytes))]);

        let normalized = normalize_timestamps(record);
        let text = normalized.as_map().unwrap()[0].1.as_str().unwrap().to_string();
        assert_eq!(text, "2021-01-27T10:35:34.000005Z");
    }

    #[test]
    fn timestamp_32_bit_layout() {
        let text = decode_timestamp(&0u32.to_be_bytes()).unwrap();
        assert_eq!(text, "1970-01-01T00:00:00Z");
        assert!(decode_timestamp(&[1, 2, 3]).is_none());
    }

    #[test]
    fn encode_uses_named_fields() {
        let delta = SubscriptionDelta::new().with(Channel::Quotes, ["MSFT"]);
        let bytes = MsgPackCodec::new()
            .encode(&SubscriptionRequest::new(SubscriptionAction::Subscribe, &delta))
            .unwrap();
        let decoded: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded["action"], "subscribe");
        assert_eq!(decoded["quotes"], json!(["MSFT"]));
        assert_eq!(decoded["lulds"], json!([]));
    }

    #[test]
    fn json_codec_decodes_stream_objects() {
        let codec = JsonCodec::new();
        let records = codec
            .decode(br#"{"stream":"authorization","data":{"status":"authorized","action":"authenticate"}}"#)
            .unwrap();
        assert!(matches!(
            &records[0],
            Ok(TradingMessage::Authorization(a)) if a.is_authorized()
        ));

        let records = codec
            .decode(br#"[{"stream":"listening","data":{"streams":["trade_updates"]}},{"stream":"nope","data":{}}]"#)
            .unwrap();
        assert!(matches!(&records[0], Ok(TradingMessage::Listening(l)) if l.streams == ["trade_updates"]));
        assert!(matches!(&records[1], Err(e) if e.is_unknown_type()));
    }

    #[test]
    fn json_codec_passes_account_updates_through() {
        let records = JsonCodec::new()
            .decode(br#"{"stream":"account_updates","data":{"cash":"100.0"}}"#)
            .unwrap();
        assert!(matches!(
            &records[0],
            Ok(TradingMessage::AccountUpdate(v)) if v["cash"] == "100.0"
        ));
    }
}
