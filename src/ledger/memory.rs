//! In-memory test backend holding a single application's boxes.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Ledger, LedgerError, SuggestedParams, VALIDITY_WINDOW};
use crate::crypto::{verify, verify_proof, Address};
use crate::fulfill::{fulfillment_box_name, order_box_name, FULFILL_METHOD};
use crate::txn::{abi, assign_group, Authorization, LogicSig, SignedTransaction, TxnKind};

/// A ledger kept entirely in memory, used by tests in place of a node.
///
/// Submitted groups are checked (group id, signatures, claim proof) and a
/// claim atomically replaces the order box with a fulfillment box, so the
/// first valid claim of an order wins and later ones are rejected.
pub struct MemoryLedger {
    app_id: u64,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Boxes in insertion order, which is also the scan order
    boxes: Vec<(Vec<u8>, Vec<u8>)>,
    groups: Vec<Vec<SignedTransaction>>,
    confirmed: HashSet<String>,
    round: u64,
    box_reads: usize,
}

impl State {
    fn position(&self, name: &[u8]) -> Option<usize> {
        self.boxes.iter().position(|(n, _)| n == name)
    }
}

impl MemoryLedger {
    pub fn new(app_id: u64) -> Self {
        Self {
            app_id,
            state: Mutex::new(State {
                round: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// Inserts or replaces a box.
    pub fn insert_box(&self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let (name, value) = (name.into(), value.into());
        let mut state = self.state();
        match state.position(&name) {
            Some(at) => state.boxes[at].1 = value,
            None => state.boxes.push((name, value)),
        }
    }

    /// Deletes a box, returning whether it existed.
    pub fn remove_box(&self, name: &[u8]) -> bool {
        let mut state = self.state();
        match state.position(name) {
            Some(at) => {
                state.boxes.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn has_box(&self, name: &[u8]) -> bool {
        self.state().position(name).is_some()
    }

    /// Every group accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Vec<SignedTransaction>> {
        self.state().groups.clone()
    }

    /// Number of single-box reads served.
    pub fn box_reads(&self) -> usize {
        self.state().box_reads
    }

    fn check_group(&self, group: &[SignedTransaction]) -> Result<Option<Claim>, LedgerError> {
        let mut txns: Vec<_> = group.iter().map(|stx| stx.txn.clone()).collect();
        let expected = assign_group(&mut txns).map_err(|e| LedgerError::Rejected(e.to_string()))?;
        if group.iter().any(|stx| stx.txn.header.group != Some(expected)) {
            return Err(LedgerError::Rejected("group id mismatch".into()));
        }

        for stx in group {
            let authorized = match &stx.auth {
                Authorization::Signature(sig) => {
                    let message = stx
                        .txn
                        .bytes_to_sign()
                        .map_err(|e| LedgerError::Rejected(e.to_string()))?;
                    verify(stx.txn.sender(), &message, sig)
                }
                Authorization::LogicSig(program) => {
                    LogicSig::new(program.clone()).address() == stx.txn.sender()
                }
            };
            if !authorized {
                return Err(LedgerError::Rejected(format!(
                    "invalid authorization for {}",
                    stx.txn.sender()
                )));
            }
        }

        let mut claim = None;
        for stx in group {
            if let Some(found) = self.parse_claim(stx)? {
                claim = Some(found);
            }
        }
        Ok(claim)
    }

    fn parse_claim(&self, stx: &SignedTransaction) -> Result<Option<Claim>, LedgerError> {
        let TxnKind::AppCall {
            app_id, args, boxes, ..
        } = &stx.txn.kind
        else {
            return Ok(None);
        };
        if *app_id != self.app_id || args.first().map(Vec::as_slice) != Some(&FULFILL_METHOD.selector()[..]) {
            return Ok(None);
        }

        let reject = |reason: &str| LedgerError::Rejected(reason.to_string());
        let [_, key, proof, reward] = args.as_slice() else {
            return Err(reject("fulfill expects three arguments"));
        };
        let key = abi::decode_bytes(key).ok_or_else(|| reject("malformed order key"))?;
        let proof: [u8; 64] = proof
            .as_slice()
            .try_into()
            .map_err(|_| reject("proof must be 64 bytes"))?;
        let reward = Address::from_slice(reward).map_err(|_| reject("malformed reward address"))?;

        if !verify_proof(stx.txn.sender(), key, &proof) {
            return Err(reject("proof does not match sender"));
        }

        let order_box = order_box_name(key);
        let fulfillment_box = fulfillment_box_name(key);
        for name in [&order_box, &fulfillment_box] {
            if !boxes.iter().any(|b| &b.name == name) {
                return Err(reject("missing box reference"));
            }
        }

        Ok(Some(Claim {
            order_box,
            fulfillment_box,
            reward,
        }))
    }
}

struct Claim {
    order_box: Vec<u8>,
    fulfillment_box: Vec<u8>,
    reward: Address,
}

impl Ledger for MemoryLedger {
    fn box_names(&self, app_id: u64) -> Result<Vec<Vec<u8>>, LedgerError> {
        if app_id != self.app_id {
            return Err(LedgerError::NotFound(format!("application {}", app_id)));
        }
        Ok(self.state().boxes.iter().map(|(n, _)| n.clone()).collect())
    }

    fn box_value(&self, app_id: u64, name: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let mut state = self.state();
        state.box_reads += 1;
        if app_id != self.app_id {
            return Err(LedgerError::NotFound(format!("application {}", app_id)));
        }
        state
            .position(name)
            .map(|at| state.boxes[at].1.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("box {}", hex::encode(name))))
    }

    fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let round = self.state().round;
        Ok(SuggestedParams {
            fee: 0,
            min_fee: 1000,
            first_valid: round,
            last_valid: round + VALIDITY_WINDOW,
            genesis_id: "memory-v1".into(),
            genesis_hash: [0x11; 32],
        })
    }

    fn compile_program(&self, source: &str) -> Result<Vec<u8>, LedgerError> {
        Ok(source.as_bytes().to_vec())
    }

    fn send_group(&self, group: &[SignedTransaction]) -> Result<String, LedgerError> {
        let claim = self.check_group(group)?;
        let first_id = group
            .first()
            .ok_or_else(|| LedgerError::Rejected("empty group".into()))?
            .txn
            .id_string()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let mut state = self.state();
        if let Some(claim) = claim {
            let Some(at) = state.position(&claim.order_box) else {
                return Err(LedgerError::Rejected("order does not exist".into()));
            };
            if state.position(&claim.fulfillment_box).is_some() {
                return Err(LedgerError::Rejected("order already fulfilled".into()));
            }
            state.boxes.remove(at);
            state
                .boxes
                .push((claim.fulfillment_box, claim.reward.as_bytes().to_vec()));
        }

        for stx in group {
            if let Ok(id) = stx.txn.id_string() {
                state.confirmed.insert(id);
            }
        }
        state.groups.push(group.to_vec());
        state.round += 1;
        Ok(first_id)
    }

    fn wait_for_confirmation(&self, txid: &str, rounds: u64) -> Result<u64, LedgerError> {
        let state = self.state();
        if state.confirmed.contains(txid) {
            Ok(state.round)
        } else {
            Err(LedgerError::Timeout {
                txid: txid.to_string(),
                rounds,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_lifecycle() {
        let ledger = MemoryLedger::new(7);
        ledger.insert_box(b"ob".to_vec(), b"v1".to_vec());
        ledger.insert_box(b"oa".to_vec(), b"v2".to_vec());

        // Insertion order is preserved
        assert_eq!(ledger.box_names(7).unwrap(), vec![b"ob".to_vec(), b"oa".to_vec()]);
        assert_eq!(ledger.box_value(7, b"oa").unwrap(), b"v2".to_vec());

        assert!(ledger.remove_box(b"oa"));
        assert!(ledger.box_value(7, b"oa").unwrap_err().is_not_found());
        assert_eq!(ledger.box_reads(), 2);
    }

    #[test]
    fn test_unknown_app() {
        let ledger = MemoryLedger::new(7);
        assert!(ledger.box_names(8).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rejects_empty_group() {
        let ledger = MemoryLedger::new(7);
        assert!(ledger.send_group(&[]).is_err());
    }
}
