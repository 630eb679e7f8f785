//! Claim bundles proving ownership of a matched key.
//!
//! A bundle is one atomic group, in this order:
//!
//! 1. [`PADDING_CALLS`] `extra()` calls from the claimant, which only buy
//!    opcode budget for the claim
//! 2. a subsidy payment from the logic-sig account to the claimant, whose
//!    flat fee covers the whole group
//! 3. the `fulfill(orderKey, proof, rewardRecipient)` call, referencing the
//!    order and fulfillment boxes and rekeying the claimant to the order owner

use tracing::info;

use crate::crypto::{Address, Keypair};
use crate::ledger::{Ledger, LedgerError, SuggestedParams};
use crate::order::codec::{FULFILLMENT_TAG, ORDER_TAG};
use crate::txn::abi::{self, Method};
use crate::txn::{assign_group, BoxReference, Header, LogicSig, SignedTransaction, Transaction, TxnError};

pub const EXTRA_METHOD: Method = Method::new("extra()void");
pub const FULFILL_METHOD: Method = Method::new("fulfill(byte[],byte[64],address)void");

/// Number of opcode-budget padding calls before the claim.
pub const PADDING_CALLS: usize = 5;
/// Amount paid from the subsidy account to the claimant, in microalgos.
pub const SUBSIDY_AMOUNT: u64 = 100_000;
/// Flat fee of the subsidy payment, covering every transaction in the group.
pub const SUBSIDY_FEE: u64 = 10_000;
/// Rounds to wait for the group to be confirmed.
pub const CONFIRMATION_ROUNDS: u64 = 4;

/// Name of the box holding an order.
pub fn order_box_name(order_key: &[u8]) -> Vec<u8> {
    tagged(ORDER_TAG, order_key)
}

/// Name of the box created when an order is claimed.
pub fn fulfillment_box_name(order_key: &[u8]) -> Vec<u8> {
    tagged(FULFILLMENT_TAG, order_key)
}

fn tagged(tag: u8, key: &[u8]) -> Vec<u8> {
    let mut name = Vec::with_capacity(1 + key.len());
    name.push(tag);
    name.extend_from_slice(key);
    name
}

/// A signed claim group ready for submission.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub transactions: Vec<SignedTransaction>,
}

impl Bundle {
    /// The claim call, always last.
    pub fn claim(&self) -> Option<&SignedTransaction> {
        self.transactions.last()
    }
}

/// Builds and submits claim bundles for one application.
pub struct Fulfiller<'a> {
    ledger: &'a dyn Ledger,
    app_id: u64,
    subsidy: &'a LogicSig,
}

impl<'a> Fulfiller<'a> {
    pub fn new(ledger: &'a dyn Ledger, app_id: u64, subsidy: &'a LogicSig) -> Self {
        Self {
            ledger,
            app_id,
            subsidy,
        }
    }

    /// Builds the signed bundle against the given params.
    pub fn build_bundle(
        &self,
        keypair: &Keypair,
        order_key: &[u8],
        owner: &Address,
        reward: &Address,
        params: &SuggestedParams,
    ) -> Result<Bundle, FulfillError> {
        let claimant = *keypair.address();
        let mut txns = Vec::with_capacity(PADDING_CALLS + 2);

        for i in 0..PADDING_CALLS {
            let mut header = Header::new(claimant, 0, params);
            header.note = format!("extra opcodes {}", i).into_bytes();
            txns.push(Transaction::app_call(
                header,
                self.app_id,
                vec![EXTRA_METHOD.selector().to_vec()],
                Vec::new(),
                Vec::new(),
            ));
        }

        txns.push(Transaction::payment(
            Header::new(*self.subsidy.address(), SUBSIDY_FEE, params),
            claimant,
            SUBSIDY_AMOUNT,
        ));

        let proof = keypair.sign_proof(order_key);
        let mut header = Header::new(claimant, 0, params);
        header.rekey_to = Some(*owner);
        txns.push(Transaction::app_call(
            header,
            self.app_id,
            vec![
                FULFILL_METHOD.selector().to_vec(),
                abi::encode_bytes(order_key)?,
                proof.to_vec(),
                reward.as_bytes().to_vec(),
            ],
            vec![*reward],
            vec![
                BoxReference {
                    app_index: 0,
                    name: order_box_name(order_key),
                },
                BoxReference {
                    app_index: 0,
                    name: fulfillment_box_name(order_key),
                },
            ],
        ));

        assign_group(&mut txns)?;

        let transactions = txns
            .into_iter()
            .map(|txn| {
                if txn.sender() == self.subsidy.address() {
                    self.subsidy.sign(txn)
                } else {
                    txn.sign(keypair)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Bundle { transactions })
    }

    /// Builds, submits and confirms a claim, returning the claim's txid.
    pub fn fulfill(
        &self,
        keypair: &Keypair,
        order_key: &[u8],
        owner: &Address,
        reward: &Address,
    ) -> Result<String, FulfillError> {
        let params = self
            .ledger
            .suggested_params()
            .map_err(FulfillError::Submission)?;
        let bundle = self.build_bundle(keypair, order_key, owner, reward, &params)?;

        let claim_id = match bundle.claim() {
            Some(claim) => claim.txn.id_string()?,
            None => return Err(FulfillError::Build(TxnError::GroupSize(0))),
        };

        self.ledger
            .send_group(&bundle.transactions)
            .map_err(FulfillError::Submission)?;
        let round = self
            .ledger
            .wait_for_confirmation(&claim_id, CONFIRMATION_ROUNDS)
            .map_err(FulfillError::Submission)?;

        info!(txid = %claim_id, round, claimant = %keypair.address(), "Claim confirmed");
        Ok(claim_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillError {
    #[error("Failed to build claim: {0}")]
    Build(#[from] TxnError),
    #[error("Claim submission failed: {0}")]
    Submission(#[source] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::verify_proof;
    use crate::ledger::MemoryLedger;
    use crate::order::codec::order_key;
    use crate::txn::{Authorization, TxnKind};

    const APP: u64 = 77;

    fn fixture() -> (MemoryLedger, LogicSig, Keypair, Vec<u8>, Address, Address) {
        let ledger = MemoryLedger::new(APP);
        let subsidy = LogicSig::new(vec![0x0a, 0x81, 0x01, 0x43]);
        let keypair = Keypair::from_seed([3u8; 32]);
        let owner = Address::from_bytes([5u8; 32]);
        let reward = Address::from_bytes([6u8; 32]);
        let key = order_key(&owner, 1, 4, 0, b"x");
        (ledger, subsidy, keypair, key, owner, reward)
    }

    #[test]
    fn test_bundle_layout() {
        let (ledger, subsidy, keypair, key, owner, reward) = fixture();
        let fulfiller = Fulfiller::new(&ledger, APP, &subsidy);
        let params = ledger.suggested_params().unwrap();
        let bundle = fulfiller
            .build_bundle(&keypair, &key, &owner, &reward, &params)
            .unwrap();

        assert_eq!(bundle.transactions.len(), 7);

        for (i, stx) in bundle.transactions[..PADDING_CALLS].iter().enumerate() {
            let TxnKind::AppCall { app_id, args, .. } = &stx.txn.kind else {
                panic!("padding {} is not an app call", i);
            };
            assert_eq!(*app_id, APP);
            assert_eq!(args, &vec![EXTRA_METHOD.selector().to_vec()]);
            assert_eq!(stx.txn.header.note, format!("extra opcodes {}", i).into_bytes());
            assert_eq!(stx.txn.sender(), keypair.address());
        }

        let payment = &bundle.transactions[PADDING_CALLS];
        assert_eq!(payment.txn.sender(), subsidy.address());
        assert_eq!(payment.txn.header.fee, SUBSIDY_FEE);
        assert!(matches!(payment.auth, Authorization::LogicSig(_)));
        assert_eq!(
            payment.txn.kind,
            TxnKind::Payment {
                receiver: *keypair.address(),
                amount: SUBSIDY_AMOUNT
            }
        );

        let claim = bundle.claim().unwrap();
        assert_eq!(claim.txn.header.rekey_to, Some(owner));
        let TxnKind::AppCall {
            args,
            accounts,
            boxes,
            ..
        } = &claim.txn.kind
        else {
            panic!("claim is not an app call");
        };
        assert_eq!(accounts, &vec![reward]);
        assert_eq!(boxes[0].name, [b"o".to_vec(), key.clone()].concat());
        assert_eq!(boxes[1].name, [b"f".to_vec(), key.clone()].concat());
        assert_eq!(args[0], FULFILL_METHOD.selector().to_vec());
        assert_eq!(abi::decode_bytes(&args[1]), Some(&key[..]));
        let proof: [u8; 64] = args[2].as_slice().try_into().unwrap();
        assert!(verify_proof(keypair.address(), &key, &proof));
        assert_eq!(args[3], reward.as_bytes().to_vec());

        let group = bundle.transactions[0].txn.header.group;
        assert!(group.is_some());
        assert!(bundle.transactions.iter().all(|t| t.txn.header.group == group));
    }

    #[test]
    fn test_fulfill_claims_order() {
        let (ledger, subsidy, keypair, key, owner, reward) = fixture();
        ledger.insert_box(order_box_name(&key), vec![1]);

        let fulfiller = Fulfiller::new(&ledger, APP, &subsidy);
        fulfiller.fulfill(&keypair, &key, &owner, &reward).unwrap();

        assert!(!ledger.has_box(&order_box_name(&key)));
        assert!(ledger.has_box(&fulfillment_box_name(&key)));
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[test]
    fn test_second_claim_rejected() {
        let (ledger, subsidy, keypair, key, owner, reward) = fixture();
        ledger.insert_box(order_box_name(&key), vec![1]);
        let fulfiller = Fulfiller::new(&ledger, APP, &subsidy);
        fulfiller.fulfill(&keypair, &key, &owner, &reward).unwrap();

        let rival = Keypair::from_seed([4u8; 32]);
        let result = fulfiller.fulfill(&rival, &key, &owner, &reward);
        assert!(matches!(result, Err(FulfillError::Submission(_))));
        assert_eq!(ledger.submitted().len(), 1);
    }
}
