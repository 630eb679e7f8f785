//! Order discovery and selection.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::ledger::Ledger;

use super::codec::{self, ORDER_TAG};
use super::{is_expired, Order, OrderError, OrderHeader};

/// Read-only view of the orders held by one application.
#[derive(Clone, Copy)]
pub struct Catalog<'a> {
    ledger: &'a dyn Ledger,
    app_id: u64,
}

impl<'a> Catalog<'a> {
    pub fn new(ledger: &'a dyn Ledger, app_id: u64) -> Self {
        Self { ledger, app_id }
    }

    /// Lists eligible orders from a fresh storage snapshot.
    ///
    /// Orders longer than `max_length` (when given) and orders whose
    /// validity has passed are skipped. Only box names are inspected.
    pub fn list(
        &self,
        max_length: Option<u64>,
    ) -> Result<impl Iterator<Item = OrderHeader>, OrderError> {
        self.list_at(max_length, unix_now())
    }

    /// Same as [`Catalog::list`] with an explicit clock.
    pub fn list_at(
        &self,
        max_length: Option<u64>,
        now: u64,
    ) -> Result<impl Iterator<Item = OrderHeader>, OrderError> {
        let names = self.ledger.box_names(self.app_id)?;
        let max_length = max_length.filter(|m| *m > 0);

        Ok(names.into_iter().filter_map(move |name| {
            let header = match codec::parse_header(&name) {
                Ok(Some(header)) => header,
                Ok(None) => return None,
                Err(e) => {
                    debug!(box_name = %hex::encode(&name), error = %e, "Skipping malformed order box");
                    return None;
                }
            };

            if max_length.is_some_and(|max| header.length > max) {
                return None;
            }
            if is_expired(header.validity, now) {
                return None;
            }
            Some(header)
        }))
    }

    /// Fetches and decodes one order.
    pub fn read(&self, key: &[u8]) -> Result<Order, OrderError> {
        let mut name = Vec::with_capacity(1 + key.len());
        name.push(ORDER_TAG);
        name.extend_from_slice(key);

        let value = match self.ledger.box_value(self.app_id, &name) {
            Ok(value) => value,
            Err(e) if e.is_not_found() => return Err(OrderError::NotFound(key.to_vec())),
            Err(e) => return Err(e.into()),
        };
        codec::decode_order(key, &value)
    }
}

/// Picks the order with the smallest length; the first one seen wins ties.
pub fn select(headers: impl IntoIterator<Item = OrderHeader>) -> Option<OrderHeader> {
    let mut best: Option<OrderHeader> = None;
    for header in headers {
        if best.as_ref().map_or(true, |b| header.length < b.length) {
            best = Some(header);
        }
    }
    best
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Address;
    use crate::ledger::MemoryLedger;
    use crate::order::codec::{encode_order, order_key};

    const APP: u64 = 1234;
    const NOW: u64 = 1_700_000_000;

    fn put_order(ledger: &MemoryLedger, id: u64, text: &str, validity: u64) -> Vec<u8> {
        let owner = Address::from_bytes([id as u8; 32]);
        let key = order_key(&owner, id, text.len() as u64, validity, &[]);
        let order = Order {
            key: key.clone(),
            id,
            owner,
            prefix: vec![],
            mask: vec![],
            text: text.into(),
            asset: 0,
            amount: 5,
            validity,
        };
        let mut name = vec![ORDER_TAG];
        name.extend_from_slice(&key);
        ledger.insert_box(name, encode_order(&order).unwrap());
        key
    }

    fn header(length: u64, tag: u8) -> OrderHeader {
        OrderHeader {
            key: vec![tag],
            length,
            validity: 0,
        }
    }

    #[test]
    fn test_list_empty() {
        let ledger = MemoryLedger::new(APP);
        let catalog = Catalog::new(&ledger, APP);
        assert_eq!(catalog.list_at(None, NOW).unwrap().count(), 0);
    }

    #[test]
    fn test_list_filters_length_and_expiry() {
        let ledger = MemoryLedger::new(APP);
        put_order(&ledger, 1, "ABCDEF", 0);
        put_order(&ledger, 2, "ABC", NOW - 1);
        put_order(&ledger, 3, "ABCD", NOW + 60);
        put_order(&ledger, 4, "AB", 0);
        ledger.insert_box(b"f-not-an-order".to_vec(), vec![]);
        ledger.insert_box(b"o-short".to_vec(), vec![]);

        let catalog = Catalog::new(&ledger, APP);
        let lengths: Vec<u64> = catalog.list_at(Some(4), NOW).unwrap().map(|h| h.length).collect();
        assert_eq!(lengths, vec![4, 2]);

        for header in catalog.list_at(Some(4), NOW).unwrap() {
            assert!(header.length <= 4);
            assert!(!is_expired(header.validity, NOW));
        }
    }

    #[test]
    fn test_zero_max_length_means_unlimited() {
        let ledger = MemoryLedger::new(APP);
        put_order(&ledger, 1, "ABCDEFGHIJ", 0);
        let catalog = Catalog::new(&ledger, APP);
        assert_eq!(catalog.list_at(Some(0), NOW).unwrap().count(), 1);
    }

    #[test]
    fn test_read_found_and_missing() {
        let ledger = MemoryLedger::new(APP);
        let key = put_order(&ledger, 1, "GLOB", 0);
        let catalog = Catalog::new(&ledger, APP);

        let order = catalog.read(&key).unwrap();
        assert_eq!(order.text, "GLOB");
        assert_eq!(order.id, 1);

        let mut name = vec![ORDER_TAG];
        name.extend_from_slice(&key);
        ledger.remove_box(&name);
        assert!(matches!(catalog.read(&key), Err(OrderError::NotFound(_))));
    }

    #[test]
    fn test_read_corrupt_record() {
        let ledger = MemoryLedger::new(APP);
        let key = order_key(&Address::ZERO, 1, 4, 0, &[]);
        let mut name = vec![ORDER_TAG];
        name.extend_from_slice(&key);
        ledger.insert_box(name, vec![1, 2, 3]);

        let catalog = Catalog::new(&ledger, APP);
        assert!(matches!(catalog.read(&key), Err(OrderError::Decode(_))));
    }

    #[test]
    fn test_select_prefers_shortest() {
        let picked = select(vec![header(6, b'a'), header(3, b'b'), header(5, b'c')]).unwrap();
        assert_eq!(picked.key, vec![b'b']);
    }

    #[test]
    fn test_select_tie_goes_to_first_seen() {
        let picked = select(vec![header(4, b'a'), header(3, b'b'), header(3, b'c')]).unwrap();
        assert_eq!(picked.key, vec![b'b']);
    }

    #[test]
    fn test_select_empty() {
        assert!(select(Vec::new()).is_none());
    }
}
