//! The discover → select → search → fulfill cycle.
//!
//! Each cycle scans the catalog, picks the hardest eligible order (shortest
//! prefix), searches for a matching key while periodically re-checking that
//! the order still exists, and submits the claim. Every failure is confined
//! to its cycle; the loop itself only stops when asked to.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::crypto::{Address, Keypair};
use crate::error::MinerError;
use crate::miner::Miner;
use crate::order::{self, unix_now, Catalog, Order, OrderError, OrderHeader};
use crate::search::{Generator, ValidityCheck};

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Settings {
    /// Recipient of claimed bounties
    pub rewards: Address,
    /// Longest prefix to pursue; `None` for no limit
    pub max_length: Option<u64>,
    /// Sleep between scans when no order is eligible
    pub orders_interval: Duration,
    /// Minimum time between order re-checks during a search
    pub expiry_interval: Duration,
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do; sleep this long before rescanning
    Idle(Duration),
    Fulfilled { order_id: u64, txid: String },
    /// The order went away or the search was called off
    Abandoned,
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MiningStats {
    pub attempted: u64,
    /// Orders whose records could not be used and are no longer considered
    pub skipped: u64,
    pub fulfilled: u64,
    pub abandoned: u64,
    pub failed: u64,
}

pub struct MiningLoop<'a, G: Generator> {
    miner: &'a Miner,
    generator: G,
    settings: Settings,
    stop_flag: Arc<AtomicBool>,
    stats: MiningStats,
    /// Keys of orders with unusable records
    rejected: HashSet<Vec<u8>>,
}

impl<'a, G: Generator> MiningLoop<'a, G> {
    pub fn new(miner: &'a Miner, generator: G, settings: Settings) -> Self {
        Self {
            miner,
            generator,
            settings,
            stop_flag: Arc::new(AtomicBool::new(false)),
            stats: MiningStats::default(),
            rejected: HashSet::new(),
        }
    }

    /// Returns a clone of the stop flag for external use (e.g., signal handlers).
    pub fn stop_flag_clone(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> MiningStats {
        self.stats
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Mines until the stop flag is set.
    ///
    /// Failed cycles back off for the polling interval before rescanning.
    pub fn run(&mut self) -> MiningStats {
        info!(generator = self.generator.name(), "Miner started, awaiting orders");

        while !self.is_stopped() {
            match self.run_cycle() {
                CycleOutcome::Idle(delay) => self.sleep(delay),
                CycleOutcome::Failed => self.sleep(self.settings.orders_interval),
                CycleOutcome::Fulfilled { .. } | CycleOutcome::Abandoned => {}
            }
        }

        let stats = self.stats;
        info!(
            attempted = stats.attempted,
            skipped = stats.skipped,
            fulfilled = stats.fulfilled,
            abandoned = stats.abandoned,
            failed = stats.failed,
            "Miner stopped"
        );
        stats
    }

    /// Runs one cycle, containing any failure.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = match self.pursue() {
            Ok(None) => {
                let delay = self.settings.orders_interval;
                info!(delay_ms = delay.as_millis() as u64, "No orders found, sleeping");
                return CycleOutcome::Idle(delay);
            }
            Ok(Some((order_id, txid))) => {
                self.stats.fulfilled += 1;
                info!(order_id, %txid, "Order fulfilled");
                CycleOutcome::Fulfilled { order_id, txid }
            }
            Err(e) if e.is_abandonment() => {
                self.stats.abandoned += 1;
                info!(reason = %e, "Order abandoned");
                CycleOutcome::Abandoned
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(error = %e, "Order attempt failed");
                CycleOutcome::Failed
            }
        };

        debug!(stats = ?self.stats, "Cycle finished");
        outcome
    }

    fn pursue(&mut self) -> Result<Option<(u64, String)>, MinerError> {
        let miner = self.miner;
        let catalog = miner.catalog();

        // Unusable records are set aside and the next best order is taken
        let order = loop {
            let Some(header) = self.select(&catalog) else {
                return Ok(None);
            };

            match read_checked(&catalog, &header) {
                Ok(order) => break order,
                Err(e @ (OrderError::Decode(_) | OrderError::LengthMismatch { .. })) => {
                    warn!(key = %hex::encode(&header.key), error = %e, "Skipping unusable order");
                    self.stats.skipped += 1;
                    self.rejected.insert(header.key);
                }
                Err(e) => {
                    self.stats.attempted += 1;
                    return Err(e.into());
                }
            }
        };

        self.stats.attempted += 1;

        info!(
            order_id = order.id,
            prefix = %order.text,
            amount = order.amount,
            asset = order.asset,
            "Order received"
        );

        let keypair = self.search(&order)?;
        if !keypair.address().encode().starts_with(&order.text) {
            return Err(MinerError::PrefixMismatch {
                address: *keypair.address(),
                prefix: order.text,
            });
        }

        info!(order_id = order.id, address = %keypair.address(), "Fulfilling order");
        let txid = miner.fulfiller().fulfill(
            &keypair,
            &order.key,
            &order.owner,
            &self.settings.rewards,
        )?;
        Ok(Some((order.id, txid)))
    }

    /// Picks the shortest eligible order not already rejected.
    fn select(&self, catalog: &Catalog<'_>) -> Option<OrderHeader> {
        // An unreachable ledger looks the same as an empty one
        match catalog.list(self.settings.max_length) {
            Ok(headers) => order::select(headers.filter(|h| !self.rejected.contains(&h.key))),
            Err(e) => {
                warn!(error = %e, "Order scan failed");
                None
            }
        }
    }

    fn search(&mut self, order: &Order) -> Result<Keypair, MinerError> {
        let catalog = self.miner.catalog();
        let stop_flag = &self.stop_flag;
        let mut validity = ValidityCheck::new(self.settings.expiry_interval);

        let mut should_continue = || {
            if stop_flag.load(Ordering::Relaxed) {
                return false;
            }
            if order.is_expired(unix_now()) {
                info!(order_id = order.id, "Order expired, stopping search");
                return false;
            }

            validity.should_continue(|| {
                debug!(order_id = order.id, "Checking order validity");
                match catalog.read(&order.key) {
                    Err(OrderError::NotFound(_)) => {
                        info!(order_id = order.id, "Order is no longer available, stopping search");
                        false
                    }
                    Err(e) => {
                        warn!(order_id = order.id, error = %e, "Validity check failed, continuing search");
                        true
                    }
                    Ok(_) => {
                        debug!(order_id = order.id, "Order still valid, continuing search");
                        true
                    }
                }
            })
        };

        Ok(self.generator.generate(&order.text, &mut should_continue)?)
    }

    /// Sleeps for `delay`, waking early if the stop flag is set.
    fn sleep(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Reads an order and checks its text against the length its key declares.
fn read_checked(catalog: &Catalog<'_>, header: &OrderHeader) -> Result<Order, OrderError> {
    let order = catalog.read(&header.key)?;
    if order.text.len() as u64 != header.length {
        return Err(OrderError::LengthMismatch {
            declared: header.length,
            actual: order.text.len(),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulfill::{fulfillment_box_name, order_box_name, PADDING_CALLS};
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::order::codec::{encode_order, order_key};
    use crate::search::SearchError;
    use crate::txn::{LogicSig, TxnKind};

    const APP: u64 = 4242;

    fn setup() -> (Arc<MemoryLedger>, Miner) {
        let ledger = Arc::new(MemoryLedger::new(APP));
        let shared: Arc<dyn Ledger> = ledger.clone();
        let miner = Miner::with_subsidy(shared, APP, LogicSig::new(vec![0x0a, 0x81, 0x01]));
        (ledger, miner)
    }

    fn settings(expiry_interval: Duration) -> Settings {
        Settings {
            rewards: Address::from_bytes([0xEE; 32]),
            max_length: None,
            orders_interval: Duration::from_millis(2500),
            expiry_interval,
        }
    }

    fn put_order(ledger: &MemoryLedger, id: u64, text: &str, validity: u64) -> Vec<u8> {
        let owner = Address::from_bytes([id as u8; 32]);
        let key = order_key(&owner, id, text.len() as u64, validity, b"");
        let order = Order {
            key: key.clone(),
            id,
            owner,
            prefix: text.as_bytes().to_vec(),
            mask: vec![0xFF; text.len()],
            text: text.into(),
            asset: 0,
            amount: 1_000_000,
            validity,
        };
        ledger.insert_box(order_box_name(&key), encode_order(&order).unwrap());
        key
    }

    /// Returns the same key on the first poll.
    struct FixedGenerator {
        keypair: Keypair,
        prefixes: Vec<String>,
    }

    impl Generator for FixedGenerator {
        fn generate(
            &mut self,
            prefix: &str,
            _should_continue: &mut dyn FnMut() -> bool,
        ) -> Result<Keypair, SearchError> {
            self.prefixes.push(prefix.to_string());
            Ok(self.keypair.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Polls until told to stop, deleting a box at a chosen check.
    struct PollingGenerator {
        ledger: Arc<MemoryLedger>,
        delete: Option<(usize, Vec<u8>)>,
        poll: Duration,
        checks: usize,
        deleted_at: Option<Instant>,
    }

    impl Generator for PollingGenerator {
        fn generate(
            &mut self,
            _prefix: &str,
            should_continue: &mut dyn FnMut() -> bool,
        ) -> Result<Keypair, SearchError> {
            loop {
                thread::sleep(self.poll);
                self.checks += 1;
                if let Some((at, name)) = &self.delete {
                    if self.checks == *at {
                        self.ledger.remove_box(name);
                        self.deleted_at = Some(Instant::now());
                    }
                }
                if !should_continue() {
                    return Err(SearchError::Abandoned);
                }
                if self.checks > 10_000 {
                    return Err(SearchError::Engine("never abandoned".into()));
                }
            }
        }

        fn name(&self) -> &'static str {
            "polling"
        }
    }

    fn polling(ledger: &Arc<MemoryLedger>, delete: Option<(usize, Vec<u8>)>) -> PollingGenerator {
        PollingGenerator {
            ledger: ledger.clone(),
            delete,
            poll: Duration::from_millis(2),
            checks: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn test_single_order_is_claimed() {
        let (ledger, miner) = setup();
        let keypair = Keypair::from_seed([21u8; 32]);
        let text: String = keypair.address().encode().chars().take(4).collect();
        let key = put_order(&ledger, 1, &text, 0);

        let generator = FixedGenerator {
            keypair: keypair.clone(),
            prefixes: vec![],
        };
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::from_secs(30)));

        let outcome = mining.run_cycle();
        assert!(matches!(outcome, CycleOutcome::Fulfilled { order_id: 1, .. }));

        let groups = ledger.submitted();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.len(), PADDING_CALLS + 2);
        assert!(group[..PADDING_CALLS]
            .iter()
            .all(|stx| matches!(stx.txn.kind, TxnKind::AppCall { .. })));
        assert!(matches!(group[PADDING_CALLS].txn.kind, TxnKind::Payment { .. }));

        let TxnKind::AppCall { boxes, .. } = &group[PADDING_CALLS + 1].txn.kind else {
            panic!("last transaction is not the claim");
        };
        let names: Vec<_> = boxes.iter().map(|b| b.name.clone()).collect();
        assert_eq!(names, vec![order_box_name(&key), fulfillment_box_name(&key)]);

        assert!(!ledger.has_box(&order_box_name(&key)));
        assert!(ledger.has_box(&fulfillment_box_name(&key)));
        assert_eq!(mining.stats().fulfilled, 1);
    }

    #[test]
    fn test_shortest_order_selected_first() {
        let (ledger, miner) = setup();
        put_order(&ledger, 1, "ABCDEF", 0);
        put_order(&ledger, 2, "XYZ", 0);

        // Key that matches neither, so nothing is submitted
        let generator = FixedGenerator {
            keypair: Keypair::from_seed([1u8; 32]),
            prefixes: vec![],
        };
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::from_secs(30)));
        mining.run_cycle();

        assert_eq!(mining.generator().prefixes, vec!["XYZ".to_string()]);
    }

    #[test]
    fn test_shortest_order_selected_regardless_of_scan_order() {
        let (ledger, miner) = setup();
        put_order(&ledger, 1, "XYZ", 0);
        put_order(&ledger, 2, "ABCDEF", 0);

        let generator = FixedGenerator {
            keypair: Keypair::from_seed([1u8; 32]),
            prefixes: vec![],
        };
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::from_secs(30)));
        mining.run_cycle();

        assert_eq!(mining.generator().prefixes, vec!["XYZ".to_string()]);
        assert_eq!(mining.stats().attempted, 1);
    }

    #[test]
    fn test_mismatched_key_never_submitted() {
        let (ledger, miner) = setup();
        let keypair = Keypair::from_seed([1u8; 32]);
        let first = keypair.address().encode().chars().next().unwrap();
        let text = if first == 'A' { "BBBB" } else { "AAAA" };
        put_order(&ledger, 1, text, 0);

        let generator = FixedGenerator {
            keypair,
            prefixes: vec![],
        };
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::from_secs(30)));

        assert_eq!(mining.run_cycle(), CycleOutcome::Failed);
        assert!(ledger.submitted().is_empty());
    }

    #[test]
    fn test_deleted_order_abandons_search() {
        let (ledger, miner) = setup();
        let key = put_order(&ledger, 1, "GLOB", 0);

        let generator = polling(&ledger, Some((2, order_box_name(&key))));
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::ZERO));

        assert_eq!(mining.run_cycle(), CycleOutcome::Abandoned);
        assert_eq!(mining.generator().checks, 2);
        assert!(ledger.submitted().is_empty());
        assert_eq!(mining.stats().abandoned, 1);
    }

    #[test]
    fn test_deletion_noticed_within_expiry_interval() {
        let (ledger, miner) = setup();
        let key = put_order(&ledger, 1, "GLOB", 0);
        let expiry = Duration::from_millis(50);

        let generator = polling(&ledger, Some((1, order_box_name(&key))));
        let mut mining = MiningLoop::new(&miner, generator, settings(expiry));

        assert_eq!(mining.run_cycle(), CycleOutcome::Abandoned);
        let deleted_at = mining.generator().deleted_at.unwrap();
        assert!(deleted_at.elapsed() < expiry + Duration::from_millis(450));

        // One read to fetch the order, one for the check that noticed
        assert_eq!(ledger.box_reads(), 2);
        assert!(ledger.submitted().is_empty());
    }

    #[test]
    fn test_empty_catalog_idles_for_orders_interval() {
        let (ledger, miner) = setup();
        let generator = polling(&ledger, None);
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::ZERO));

        assert_eq!(
            mining.run_cycle(),
            CycleOutcome::Idle(Duration::from_millis(2500))
        );
        assert_eq!(mining.generator().checks, 0);
        assert_eq!(mining.stats(), MiningStats::default());
    }

    #[test]
    fn test_expired_orders_ignored() {
        let (ledger, miner) = setup();
        put_order(&ledger, 1, "GLOB", 1);
        let mut mining = MiningLoop::new(&miner, polling(&ledger, None), settings(Duration::ZERO));

        assert!(matches!(mining.run_cycle(), CycleOutcome::Idle(_)));
    }

    #[test]
    fn test_corrupt_order_does_not_stop_mining() {
        let (ledger, miner) = setup();
        let bad_key = order_key(&Address::ZERO, 1, 2, 0, b"");
        ledger.insert_box(order_box_name(&bad_key), vec![0xde, 0xad]);

        let keypair = Keypair::from_seed([8u8; 32]);
        let text: String = keypair.address().encode().chars().take(3).collect();
        put_order(&ledger, 2, &text, 0);

        let generator = FixedGenerator {
            keypair,
            prefixes: vec![],
        };
        let mut mining = MiningLoop::new(&miner, generator, settings(Duration::from_secs(30)));

        // The shorter corrupt order is passed over in the same cycle
        assert!(matches!(mining.run_cycle(), CycleOutcome::Fulfilled { order_id: 2, .. }));
        assert!(ledger.has_box(&order_box_name(&bad_key)));
        assert_eq!(mining.generator().prefixes, vec![text]);
        assert_eq!(mining.stats().skipped, 1);
        assert_eq!(mining.stats().failed, 0);

        // and is not read again
        let reads = ledger.box_reads();
        assert!(matches!(mining.run_cycle(), CycleOutcome::Idle(_)));
        assert_eq!(ledger.box_reads(), reads);
        assert_eq!(mining.stats().skipped, 1);
    }

    #[test]
    fn test_length_mismatch_skips_search() {
        let (ledger, miner) = setup();
        let owner = Address::from_bytes([1u8; 32]);
        // Key declares 3 characters, record holds 4
        let key = order_key(&owner, 1, 3, 0, b"");
        let order = Order {
            key: key.clone(),
            id: 1,
            owner,
            prefix: vec![],
            mask: vec![],
            text: "GLOB".into(),
            asset: 0,
            amount: 1,
            validity: 0,
        };
        ledger.insert_box(order_box_name(&key), encode_order(&order).unwrap());

        let mut mining = MiningLoop::new(&miner, polling(&ledger, None), settings(Duration::ZERO));
        assert!(matches!(mining.run_cycle(), CycleOutcome::Idle(_)));
        assert_eq!(mining.generator().checks, 0);
        assert_eq!(mining.stats().skipped, 1);
        assert_eq!(mining.stats().attempted, 0);
    }

    /// Fails every search immediately.
    struct FailingGenerator {
        calls: usize,
    }

    impl Generator for FailingGenerator {
        fn generate(
            &mut self,
            _prefix: &str,
            _should_continue: &mut dyn FnMut() -> bool,
        ) -> Result<Keypair, SearchError> {
            self.calls += 1;
            Err(SearchError::Engine("tool crashed".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_failed_cycle_waits_before_rescanning() {
        let (ledger, miner) = setup();
        put_order(&ledger, 1, "GLOB", 0);

        let mut mining = MiningLoop::new(
            &miner,
            FailingGenerator { calls: 0 },
            settings(Duration::from_secs(30)),
        );
        let stop_flag = mining.stop_flag_clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            stop_flag.store(true, Ordering::Relaxed);
        });

        let stats = mining.run();
        stopper.join().unwrap();

        // The first failure sleeps past the stop request
        assert_eq!(mining.generator().calls, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_stop_flag_abandons_search() {
        let (ledger, miner) = setup();
        put_order(&ledger, 1, "GLOB", 0);

        let mut mining = MiningLoop::new(&miner, polling(&ledger, None), settings(Duration::from_secs(30)));
        mining.stop_flag_clone().store(true, Ordering::Relaxed);

        assert_eq!(mining.run_cycle(), CycleOutcome::Abandoned);
        assert_eq!(mining.generator().checks, 1);
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let (ledger, miner) = setup();
        let mut mining = MiningLoop::new(&miner, polling(&ledger, None), settings(Duration::ZERO));
        mining.stop_flag_clone().store(true, Ordering::Relaxed);

        assert_eq!(mining.run(), MiningStats::default());
    }
}
