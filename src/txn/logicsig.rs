//! Program-bound authorization for the subsidy account.

use crate::crypto::{sha512_256, Address};

use super::{Authorization, SignedTransaction, Transaction, TxnError};

/// Placeholder in the subsidy program template replaced by the app id.
pub const APP_ID_PLACEHOLDER: &str = "TMPL_VANITY_APP_ID";

/// A compiled logic-sig program. Transactions from its address are
/// authorized by the program itself, without a private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicSig {
    program: Vec<u8>,
    address: Address,
}

impl LogicSig {
    pub fn new(program: Vec<u8>) -> Self {
        let address = Address::from_bytes(sha512_256(&[b"Program".as_slice(), program.as_slice()]));
        Self { program, address }
    }

    /// Substitutes the app id into a program template.
    pub fn render_template(template: &str, app_id: u64) -> String {
        template.replacen(APP_ID_PLACEHOLDER, &app_id.to_string(), 1)
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// The escrow address controlled by the program.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn sign(&self, txn: Transaction) -> Result<SignedTransaction, TxnError> {
        if txn.sender() != &self.address {
            return Err(TxnError::WrongSigner {
                sender: *txn.sender(),
                signer: self.address,
            });
        }
        Ok(SignedTransaction {
            txn,
            auth: Authorization::LogicSig(self.program.clone()),
        })
    }
}
