//! Order record layouts.
//!
//! Box name of an order: `'o' || owner(32) || id(8) || length(8) || validity(8) || suffix`,
//! integers big-endian. The box value is the ABI tuple
//! `(uint64,address,byte[],byte[],byte[],uint64,uint64,uint64)`.

use crate::crypto::Address;

use super::{Order, OrderError, OrderHeader};

/// Namespace tag of order boxes.
pub const ORDER_TAG: u8 = b'o';
/// Namespace tag of fulfillment boxes.
pub const FULFILLMENT_TAG: u8 = b'f';

// Offsets within the order key (box name without the tag)
const OWNER_AT: usize = 0;
const ID_AT: usize = OWNER_AT + 32;
const LENGTH_AT: usize = ID_AT + 8;
const VALIDITY_AT: usize = LENGTH_AT + 8;
/// Shortest valid order key.
pub const MIN_KEY_LEN: usize = VALIDITY_AT + 8;

/// Fixed-size head of the order tuple: three uint64s after the owner, three
/// u16 offsets for the byte arrays, then three more uint64s.
const TUPLE_HEAD_LEN: usize = 8 + 32 + 2 * 3 + 8 * 3;
const TUPLE_FIELDS: usize = 8;

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(buf)
}

fn read_u16(bytes: &[u8], at: usize) -> usize {
    u16::from_be_bytes([bytes[at], bytes[at + 1]]) as usize
}

/// Builds an order key from its parts.
pub fn order_key(owner: &Address, id: u64, length: u64, validity: u64, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(MIN_KEY_LEN + suffix.len());
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(&length.to_be_bytes());
    key.extend_from_slice(&validity.to_be_bytes());
    key.extend_from_slice(suffix);
    key
}

/// Reads the header of a scanned box name.
///
/// Returns `Ok(None)` for boxes outside the order namespace.
pub fn parse_header(box_name: &[u8]) -> Result<Option<OrderHeader>, OrderError> {
    let Some((&tag, key)) = box_name.split_first() else {
        return Ok(None);
    };
    if tag != ORDER_TAG {
        return Ok(None);
    }
    if key.len() < MIN_KEY_LEN {
        return Err(OrderError::Decode(format!(
            "order key has {} bytes, expected at least {}",
            key.len(),
            MIN_KEY_LEN
        )));
    }

    Ok(Some(OrderHeader {
        key: key.to_vec(),
        length: read_u64(key, LENGTH_AT),
        validity: read_u64(key, VALIDITY_AT),
    }))
}

/// Decodes an order record fetched for `key`.
pub fn decode_order(key: &[u8], value: &[u8]) -> Result<Order, OrderError> {
    if value.len() < TUPLE_HEAD_LEN {
        return Err(OrderError::Decode(format!(
            "record has {} bytes, the {}-field head alone needs {}",
            value.len(),
            TUPLE_FIELDS,
            TUPLE_HEAD_LEN
        )));
    }

    let id = read_u64(value, 0);
    let owner = Address::from_slice(&value[8..40]).map_err(|e| OrderError::Decode(e.to_string()))?;

    // Byte arrays must follow the head back to back and end with the record
    let mut arrays: Vec<Vec<u8>> = Vec::with_capacity(3);
    let mut expected_offset = TUPLE_HEAD_LEN;
    for slot in 0..3 {
        let offset = read_u16(value, 40 + 2 * slot);
        if offset != expected_offset {
            return Err(OrderError::Decode(format!(
                "field {} starts at {}, expected {}",
                slot + 2,
                offset,
                expected_offset
            )));
        }
        if value.len() < offset + 2 {
            return Err(OrderError::Decode(format!("field {} is truncated", slot + 2)));
        }
        let len = read_u16(value, offset);
        let start = offset + 2;
        let Some(bytes) = value.get(start..start + len) else {
            return Err(OrderError::Decode(format!("field {} is truncated", slot + 2)));
        };
        arrays.push(bytes.to_vec());
        expected_offset = start + len;
    }
    if expected_offset != value.len() {
        return Err(OrderError::Decode(format!(
            "{} trailing bytes after {} fields",
            value.len() - expected_offset,
            TUPLE_FIELDS
        )));
    }

    let text = arrays.pop().unwrap_or_default();
    let mask = arrays.pop().unwrap_or_default();
    let prefix = arrays.pop().unwrap_or_default();
    let text = String::from_utf8(text).map_err(|e| OrderError::Decode(e.to_string()))?;

    Ok(Order {
        key: key.to_vec(),
        id,
        owner,
        prefix,
        mask,
        text,
        asset: read_u64(value, 46),
        amount: read_u64(value, 54),
        validity: read_u64(value, 62),
    })
}

/// Encodes an order as the record value.
pub fn encode_order(order: &Order) -> Result<Vec<u8>, OrderError> {
    let arrays = [&order.prefix[..], &order.mask[..], order.text.as_bytes()];

    let mut head = Vec::with_capacity(TUPLE_HEAD_LEN);
    let mut tail = Vec::new();
    head.extend_from_slice(&order.id.to_be_bytes());
    head.extend_from_slice(order.owner.as_bytes());
    for bytes in arrays {
        let offset = u16::try_from(TUPLE_HEAD_LEN + tail.len())
            .map_err(|_| OrderError::Decode("record too large".into()))?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| OrderError::Decode("field too large".into()))?;
        head.extend_from_slice(&offset.to_be_bytes());
        tail.extend_from_slice(&len.to_be_bytes());
        tail.extend_from_slice(bytes);
    }
    head.extend_from_slice(&order.asset.to_be_bytes());
    head.extend_from_slice(&order.amount.to_be_bytes());
    head.extend_from_slice(&order.validity.to_be_bytes());

    head.extend(tail);
    Ok(head)
}
