//! Wire PDUs, fixed by the substrate's contract.
//!
//! Three structs form the boundary every layer sends across: the frame
//! envelope, its byte encoding, and its integrity check. Only their shape
//! (a `Frame` carries a `Packet`-as-map, which carries a `Segment`-as-map)
//! is consumed by the layers in this crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport-level PDU. `payload` is an opaque keyed map so that the
/// reliable-transport layer and the application layer can both stash their
/// own keys into it without `Segment` knowing about either.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub seq_num: u8,
    pub is_ack: bool,
    pub payload: BTreeMap<String, Value>,
}

impl Segment {
    pub fn new(seq_num: u8, is_ack: bool) -> Self {
        Segment {
            seq_num,
            is_ack,
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_owned(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.get(key).and_then(Value::as_u64).map(|v| v as u16)
    }

    /// Encodes this segment as the `data`-map carried inside a `Packet`.
    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).expect("Segment always serializes")
    }

    pub fn from_map(map: &Value) -> Option<Self> {
        serde_json::from_value(map.clone()).ok()
    }
}

/// Network-level PDU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub src_vip: String,
    pub dst_vip: String,
    pub ttl: u8,
    pub data: Value,
}

impl Packet {
    pub fn new(src_vip: impl Into<String>, dst_vip: impl Into<String>, ttl: u8, data: Value) -> Self {
        Packet {
            src_vip: src_vip.into(),
            dst_vip: dst_vip.into(),
            ttl,
            data,
        }
    }

    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).expect("Packet always serializes")
    }

    pub fn from_map(map: &Value) -> Option<Self> {
        serde_json::from_value(map.clone()).ok()
    }
}

/// Link-level PDU. `fcs` is a simple frame check sequence (CRC32 of the
/// serialized packet bytes): a corrupted frame must never reach the
/// layers above the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub src_mac: String,
    pub dst_mac: String,
    pub data: Value,
    pub fcs: u32,
}

impl Frame {
    pub fn new(src_mac: impl Into<String>, dst_mac: impl Into<String>, data: Value) -> Self {
        let fcs = crc32(&serde_json::to_vec(&data).expect("packet map always serializes"));
        Frame {
            src_mac: src_mac.into(),
            dst_mac: dst_mac.into(),
            data,
            fcs,
        }
    }

    /// Serializes this frame to the bytes that travel over the substrate.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Frame always serializes")
    }

    /// Deserializes `bytes` into a packet map and whether its integrity
    /// check passed. Malformed bytes (not even valid JSON) are treated as a
    /// failed integrity check rather than propagated as an error, since the
    /// substrate gives no other way to tell corruption from truncation.
    pub fn from_bytes(bytes: &[u8]) -> (Option<Frame>, bool) {
        match serde_json::from_slice::<Frame>(bytes) {
            Ok(frame) => {
                let expected = crc32(
                    &serde_json::to_vec(&frame.data).expect("packet map always serializes"),
                );
                let ok = expected == frame.fcs;
                (Some(frame), ok)
            }
            Err(_) => (None, false),
        }
    }
}

/// Small CRC32 (IEEE 802.3 polynomial) used as the frame check sequence.
/// Table-free, byte-at-a-time: this runs once per frame on tiny payloads,
/// so throughput is not a concern.
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_roundtrips_through_map() {
        let seg = Segment::new(1, false).with("data", Value::String("hi".into()));
        let map = seg.to_map();
        let back = Segment::from_map(&map).unwrap();
        assert_eq!(seg, back);
    }

    #[test]
    fn frame_integrity_check_passes_for_untouched_bytes() {
        let packet = Packet::new("HOST_A", "HOST_B", 16, Value::Null).to_map();
        let frame = Frame::new("AA:AA:AA:AA:AA:AA", "DD:DD:DD:DD:DD:DD", packet);
        let bytes = frame.to_bytes();
        let (decoded, ok) = Frame::from_bytes(&bytes);
        assert!(ok);
        assert!(decoded.is_some());
    }

    #[test]
    fn frame_integrity_check_fails_for_corrupted_bytes() {
        let packet = Packet::new("HOST_A", "HOST_B", 16, Value::Null).to_map();
        let frame = Frame::new("AA:AA:AA:AA:AA:AA", "DD:DD:DD:DD:DD:DD", packet);
        let mut bytes = frame.to_bytes();
        // Flip a byte inside the JSON payload, not the fcs field itself.
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let (_decoded, ok) = Frame::from_bytes(&bytes);
        assert!(!ok);
    }
}
