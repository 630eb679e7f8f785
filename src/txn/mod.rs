//! Transactions, atomic groups and their signatures.
//!
//! Only the two transaction types the miner submits are modelled: payments
//! and application calls. Encoding follows the ledger's canonical msgpack
//! form so that ids and signatures match what the node computes.

pub mod abi;
mod logicsig;
pub mod msgpack;

pub use logicsig::LogicSig;

use data_encoding::BASE32_NOPAD;

use crate::crypto::{sha512_256, Address, Keypair};
use crate::ledger::SuggestedParams;
use msgpack::{Map, Value};

/// Maximum number of transactions in one atomic group.
pub const MAX_GROUP_SIZE: usize = 16;

/// Fields shared by every transaction type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub sender: Address,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub group: Option<[u8; 32]>,
    pub note: Vec<u8>,
    pub rekey_to: Option<Address>,
}

impl Header {
    /// Builds a header from suggested params with a flat fee.
    pub fn new(sender: Address, fee: u64, params: &SuggestedParams) -> Self {
        Self {
            sender,
            fee,
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            group: None,
            note: Vec::new(),
            rekey_to: None,
        }
    }
}

/// A reference to an application storage box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxReference {
    /// Index into the foreign apps array; 0 is the called application.
    pub app_index: u64,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnKind {
    Payment {
        receiver: Address,
        amount: u64,
    },
    AppCall {
        app_id: u64,
        args: Vec<Vec<u8>>,
        accounts: Vec<Address>,
        boxes: Vec<BoxReference>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub header: Header,
    pub kind: TxnKind,
}

impl Transaction {
    pub fn payment(header: Header, receiver: Address, amount: u64) -> Self {
        Self {
            header,
            kind: TxnKind::Payment { receiver, amount },
        }
    }

    pub fn app_call(
        header: Header,
        app_id: u64,
        args: Vec<Vec<u8>>,
        accounts: Vec<Address>,
        boxes: Vec<BoxReference>,
    ) -> Self {
        Self {
            header,
            kind: TxnKind::AppCall {
                app_id,
                args,
                accounts,
                boxes,
            },
        }
    }

    pub fn sender(&self) -> &Address {
        &self.header.sender
    }

    fn to_map(&self) -> Map {
        let h = &self.header;
        let map = Map::new()
            .field("fee", Value::Uint(h.fee))
            .field("fv", Value::Uint(h.first_valid))
            .field("lv", Value::Uint(h.last_valid))
            .field("gen", Value::Str(h.genesis_id.clone()))
            .field("gh", Value::Bin(h.genesis_hash.to_vec()))
            .optional("grp", h.group.map(|g| Value::Bin(g.to_vec())))
            .field("note", Value::Bin(h.note.clone()))
            .optional("rekey", h.rekey_to.map(address_value))
            .field("snd", address_value(h.sender));

        match &self.kind {
            TxnKind::Payment { receiver, amount } => map
                .field("type", Value::Str("pay".into()))
                .field("rcv", address_value(*receiver))
                .field("amt", Value::Uint(*amount)),
            TxnKind::AppCall {
                app_id,
                args,
                accounts,
                boxes,
            } => map
                .field("type", Value::Str("appl".into()))
                .field("apid", Value::Uint(*app_id))
                .field(
                    "apaa",
                    Value::Array(args.iter().cloned().map(Value::Bin).collect()),
                )
                .field(
                    "apat",
                    Value::Array(accounts.iter().copied().map(address_value).collect()),
                )
                .field(
                    "apbx",
                    Value::Array(
                        boxes
                            .iter()
                            .map(|b| {
                                Map::new()
                                    .field("i", Value::Uint(b.app_index))
                                    .field("n", Value::Bin(b.name.clone()))
                                    .into_value()
                            })
                            .collect(),
                    ),
                ),
        }
    }

    /// Canonical msgpack encoding of the unsigned transaction.
    pub fn encode(&self) -> Result<Vec<u8>, TxnError> {
        self.to_map().into_value().to_bytes()
    }

    /// Bytes that get signed: `"TX" || encode()`.
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>, TxnError> {
        let mut bytes = b"TX".to_vec();
        bytes.extend(self.encode()?);
        Ok(bytes)
    }

    /// Raw transaction id.
    pub fn id(&self) -> Result<[u8; 32], TxnError> {
        Ok(sha512_256(&[self.bytes_to_sign()?.as_slice()]))
    }

    /// Transaction id in the ledger's textual form.
    pub fn id_string(&self) -> Result<String, TxnError> {
        Ok(BASE32_NOPAD.encode(&self.id()?))
    }

    /// Signs the transaction with a single key.
    pub fn sign(self, keypair: &Keypair) -> Result<SignedTransaction, TxnError> {
        if keypair.address() != self.sender() {
            return Err(TxnError::WrongSigner {
                sender: *self.sender(),
                signer: *keypair.address(),
            });
        }
        let signature = keypair.sign(&self.bytes_to_sign()?);
        Ok(SignedTransaction {
            txn: self,
            auth: Authorization::Signature(signature),
        })
    }
}

/// How a transaction is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Signature([u8; 64]),
    LogicSig(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub txn: Transaction,
    pub auth: Authorization,
}

impl SignedTransaction {
    pub fn encode(&self) -> Result<Vec<u8>, TxnError> {
        let map = match &self.auth {
            Authorization::Signature(sig) => Map::new().field("sig", Value::Bin(sig.to_vec())),
            Authorization::LogicSig(program) => Map::new().field(
                "lsig",
                Map::new()
                    .field("l", Value::Bin(program.clone()))
                    .into_value(),
            ),
        };
        map.field("txn", self.txn.to_map().into_value())
            .into_value()
            .to_bytes()
    }
}

/// Computes the group id and assigns it to every transaction.
pub fn assign_group(txns: &mut [Transaction]) -> Result<[u8; 32], TxnError> {
    if txns.is_empty() || txns.len() > MAX_GROUP_SIZE {
        return Err(TxnError::GroupSize(txns.len()));
    }

    let mut ids = Vec::with_capacity(txns.len());
    for txn in txns.iter_mut() {
        txn.header.group = None;
        ids.push(Value::Bin(txn.id()?.to_vec()));
    }

    let encoded = Map::new()
        .field("txlist", Value::Array(ids))
        .into_value()
        .to_bytes()?;
    let group = sha512_256(&[b"TG".as_slice(), encoded.as_slice()]);

    for txn in txns.iter_mut() {
        txn.header.group = Some(group);
    }
    Ok(group)
}

fn address_value(address: Address) -> Value {
    Value::Bin(address.as_bytes().to_vec())
}

#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Invalid group size: {0}")]
    GroupSize(usize),
    #[error("Transaction from {sender} cannot be signed by {signer}")]
    WrongSigner { sender: Address, signer: Address },
}
