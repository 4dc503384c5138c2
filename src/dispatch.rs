//! Bounded-concurrency dispatch loop.
//!
//! Tasks are spawned strictly in index order with a fixed pause between
//! spawns. A semaphore caps how many of them are talking to the ledger at
//! once; the rest wait for a permit.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use solana_sdk::{pubkey::Pubkey, signature::Signer};
use tokio::{sync::Semaphore, time::sleep};

use crate::{
    builder::{TransferTask, DEFAULT_TRANSFER_LAMPORTS},
    errors::DispatchError,
    submitter::{execute, LedgerClient, TransferOutcome},
    wallet::WalletPool,
};

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub tx_count: usize,
    pub concurrency: usize,
    /// Micro-lamports per compute unit.
    pub priority_fee: u64,
    /// Delay between spawning consecutive tasks.
    pub pacing: Duration,
    pub lamports: u64,
    /// Extra attempts allowed after an expired blockhash. 0 disables retry.
    pub max_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            tx_count: 10,
            concurrency: 3,
            priority_fee: 1_000,
            pacing: Duration::from_millis(100),
            lamports: DEFAULT_TRANSFER_LAMPORTS,
            max_retries: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskReport {
    pub index: usize,
    pub payer: Pubkey,
    pub recipient: String,
    pub outcome: TransferOutcome,
}

#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    pub tasks: Vec<TaskReport>,
}

impl DispatchReport {
    pub fn confirmed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Confirmed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Wallet and recipient indices for task `index`.
pub fn assignment(index: usize, wallets: usize, recipients: usize) -> (usize, usize) {
    (index % wallets, index % recipients)
}

pub async fn run<C>(
    client: Arc<C>,
    pool: &WalletPool,
    recipients: &[String],
    settings: &DispatchSettings,
) -> Result<DispatchReport, DispatchError>
where
    C: LedgerClient + 'static,
{
    if recipients.is_empty() {
        return Err(DispatchError::EmptyAddressBook);
    }
    if pool.is_empty() {
        return Err(DispatchError::EmptyWalletPool);
    }
    if settings.concurrency == 0 {
        return Err(DispatchError::InvalidSettings(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if settings.concurrency > Semaphore::MAX_PERMITS {
        return Err(DispatchError::InvalidSettings(format!(
            "concurrency must be at most {}",
            Semaphore::MAX_PERMITS
        )));
    }

    log::info!(
        "dispatching {} transfers from {} wallets to {} recipients (concurrency {}, pacing {:?})",
        settings.tx_count,
        pool.len(),
        recipients.len(),
        settings.concurrency,
        settings.pacing
    );

    let semaphore = Arc::new(Semaphore::new(settings.concurrency));
    let mut handles = Vec::with_capacity(settings.tx_count);
    let mut pending = Vec::with_capacity(settings.tx_count);

    for index in 0..settings.tx_count {
        let (_, recipient_idx) = assignment(index, pool.len(), recipients.len());
        let payer = pool.for_task(index).ok_or(DispatchError::EmptyWalletPool)?;
        let task = TransferTask {
            index,
            payer,
            recipient: recipients[recipient_idx].clone(),
            lamports: settings.lamports,
            priority_fee: settings.priority_fee,
        };
        pending.push((index, task.payer.pubkey(), task.recipient.clone()));

        let client = client.clone();
        let semaphore = semaphore.clone();
        let max_retries = settings.max_retries;
        log::debug!("[{}] scheduled", index);
        handles.push(tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = semaphore.acquire_owned().await;
            execute(client.as_ref(), &task, max_retries).await
        }));

        if index + 1 < settings.tx_count {
            sleep(settings.pacing).await;
        }
    }

    let results = join_all(handles).await;
    let tasks = pending
        .into_iter()
        .zip(results)
        .map(|((index, payer, recipient), result)| {
            let outcome = result.unwrap_or_else(|e| {
                log::error!("[{}] task aborted: {}", index, e);
                TransferOutcome::Failed {
                    error: e.to_string(),
                    attempts: 0,
                }
            });
            TaskReport {
                index,
                payer,
                recipient,
                outcome,
            }
        })
        .collect();

    let report = DispatchReport { tasks };
    log::info!(
        "dispatch finished: {} confirmed, {} skipped, {} failed",
        report.confirmed(),
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use solana_sdk::signature::Keypair;
    use tokio::time::Instant;

    use super::*;
    use crate::submitter::tests::MockLedger;

    fn recipients(n: usize) -> Vec<String> {
        (0..n).map(|_| Pubkey::new_unique().to_string()).collect()
    }

    fn pool(n: usize) -> WalletPool {
        WalletPool::new((0..n).map(|_| Keypair::new()).collect())
    }

    fn settings(tx_count: usize, concurrency: usize, pacing_ms: u64) -> DispatchSettings {
        DispatchSettings {
            tx_count,
            concurrency,
            pacing: Duration::from_millis(pacing_ms),
            ..Default::default()
        }
    }

    #[test]
    fn assignment_is_cyclic() {
        for w in 1..5 {
            for r in 1..6 {
                for i in 0..40 {
                    assert_eq!(assignment(i, w, r), (i % w, i % r));
                }
            }
        }
        assert_eq!(assignment(0, 3, 4), (0, 0));
        assert_eq!(assignment(3, 3, 4), (0, 3));
        assert_eq!(assignment(4, 3, 4), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn reference_scenario() {
        let ledger = Arc::new(MockLedger::with_latency(Duration::from_millis(250)));
        let wallets = pool(3);
        let addrs = recipients(4);
        let start = Instant::now();

        let report = run(ledger.clone(), &wallets, &addrs, &settings(10, 3, 100))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(900));
        let started = ledger.started.lock().unwrap().clone();
        assert_eq!(started.len(), 10);
        assert!(started[9] - started[0] >= Duration::from_millis(900));
        assert_eq!(report.tasks.len(), 10);
        assert_eq!(report.confirmed(), 10);
        assert_eq!(ledger.submissions(), 10);
        assert!(ledger.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(ledger.in_flight.load(Ordering::SeqCst), 0);

        let payers = wallets.pubkeys();
        for (i, t) in report.tasks.iter().enumerate() {
            assert_eq!(t.index, i);
            assert_eq!(t.payer, payers[i % 3]);
            assert_eq!(t.recipient, addrs[i % 4]);
        }
        assert_eq!(report.tasks[3].payer, payers[0]);
        assert_eq!(report.tasks[3].recipient, addrs[3]);
        assert_eq!(report.tasks[4].payer, payers[1]);
        assert_eq!(report.tasks[4].recipient, addrs[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_bound_holds_under_slow_ledger() {
        let ledger = Arc::new(MockLedger::with_latency(Duration::from_secs(5)));

        let report = run(ledger.clone(), &pool(2), &recipients(7), &settings(20, 4, 0))
            .await
            .unwrap();

        assert_eq!(report.confirmed(), 20);
        assert_eq!(ledger.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn single_slot_serialises_submissions() {
        let ledger = Arc::new(MockLedger::with_latency(Duration::from_millis(50)));

        run(ledger.clone(), &pool(3), &recipients(2), &settings(6, 1, 10))
            .await
            .unwrap();

        assert_eq!(ledger.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_address_book_fails_fast() {
        let ledger = Arc::new(MockLedger::default());

        let err = run(ledger.clone(), &pool(3), &[], &DispatchSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::EmptyAddressBook));
        assert_eq!(ledger.submissions(), 0);
        assert!(ledger.anchors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_pool_and_zero_concurrency() {
        let ledger = Arc::new(MockLedger::default());

        let err = run(ledger.clone(), &WalletPool::default(), &recipients(1), &settings(1, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::EmptyWalletPool));

        let err = run(ledger.clone(), &pool(1), &recipients(1), &settings(1, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidSettings(_)));

        let err = run(ledger.clone(), &pool(1), &recipients(1), &settings(1, usize::MAX, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidSettings(_)));
        assert_eq!(ledger.submissions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_affect_siblings() {
        let ledger = Arc::new(MockLedger::with_latency(Duration::from_millis(20)));
        let mut addrs = recipients(4);
        addrs[1] = "not-a-valid-address".to_string();
        let failing: Pubkey = addrs[2].parse().unwrap();
        ledger.failing_recipients.lock().unwrap().push(failing);

        let report = run(ledger.clone(), &pool(3), &addrs, &settings(10, 3, 5))
            .await
            .unwrap();

        assert_eq!(report.tasks.len(), 10);
        // indices 1, 5, 9 hit the malformed address; 2 and 6 the failing one
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.confirmed(), 5);
        assert_eq!(ledger.submissions(), 7);
        for i in [1, 5, 9] {
            assert!(matches!(report.tasks[i].outcome, TransferOutcome::Skipped { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_transaction_gets_its_own_anchor() {
        let ledger = Arc::new(MockLedger::default());

        run(ledger.clone(), &pool(3), &recipients(4), &settings(10, 3, 1))
            .await
            .unwrap();

        let anchors = ledger.anchors.lock().unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(anchors.len(), 10);
        let mut used: Vec<_> = submitted.iter().map(|tx| tx.message.recent_blockhash).collect();
        used.sort();
        used.dedup();
        assert_eq!(used.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn launches_are_paced_independently_of_completion() {
        // every submission outlives the whole launch window
        let ledger = Arc::new(MockLedger::with_latency(Duration::from_secs(10)));
        let start = Instant::now();

        let report = run(ledger.clone(), &pool(3), &recipients(4), &settings(10, 10, 100))
            .await
            .unwrap();

        assert_eq!(report.confirmed(), 10);
        let started = ledger.started.lock().unwrap().clone();
        assert_eq!(started.len(), 10);
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        // the last launch happens long before the first confirmation
        assert!(started[9] - start < Duration::from_secs(1));
        assert_eq!(ledger.max_in_flight.load(Ordering::SeqCst), 10);
        assert!(start.elapsed() >= Duration::from_millis(10_900));
    }
}
