//! Long-lived miner context shared by every component.

use std::sync::Arc;

use tracing::info;

use crate::error::MinerError;
use crate::fulfill::Fulfiller;
use crate::ledger::Ledger;
use crate::order::Catalog;
use crate::txn::LogicSig;

/// Subsidy program template, bound to an application at startup.
pub const SUBSIDY_PROGRAM_TEMPLATE: &str = include_str!("teal/subsidy.teal");

/// Ledger handle, application id and subsidy authorization.
///
/// Built once at startup and only read afterwards.
pub struct Miner {
    ledger: Arc<dyn Ledger>,
    app_id: u64,
    subsidy: LogicSig,
}

impl Miner {
    /// Compiles the subsidy program for `app_id` and builds the context.
    pub fn new(ledger: Arc<dyn Ledger>, app_id: u64, program_template: &str) -> Result<Self, MinerError> {
        let source = LogicSig::render_template(program_template, app_id);
        let subsidy = LogicSig::new(ledger.compile_program(&source)?);
        info!(app_id, subsidy = %subsidy.address(), "Subsidy authorization ready");
        Ok(Self::with_subsidy(ledger, app_id, subsidy))
    }

    /// Builds the context from an already compiled subsidy program.
    pub fn with_subsidy(ledger: Arc<dyn Ledger>, app_id: u64, subsidy: LogicSig) -> Self {
        Self {
            ledger,
            app_id,
            subsidy,
        }
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn subsidy(&self) -> &LogicSig {
        &self.subsidy
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self.ledger.as_ref(), self.app_id)
    }

    pub fn fulfiller(&self) -> Fulfiller<'_> {
        Fulfiller::new(self.ledger.as_ref(), self.app_id, &self.subsidy)
    }
}
