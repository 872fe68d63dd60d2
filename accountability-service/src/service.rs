//! Tokio event loops around the [`Orchestrator`].
//!
//! One task consumes block events, one consumes consensus messages, and a
//! ticker flushes the pending-proof queue. Each flushed batch is submitted
//! from its own detached task after a random delay, so honest nodes do not
//! all race to submit the same proof. Delivery is at-least-once: proofs that
//! another node already got on-chain are filtered again right before sending.

use {
    crate::{
        config::AccountabilityConfig,
        error::{Result, ServiceError},
        orchestrator::{BlockEvent, Orchestrator},
    },
    log::*,
    rand::Rng,
    solana_pubkey::Pubkey,
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{sync::mpsc, task::JoinHandle},
    trv1_accountability::{ChainReader, OnChainProof, Proof, SignedMessage},
};

/// Running accountability service.
pub struct AccountabilityService {
    orchestrator: Arc<Orchestrator>,
    handles: Vec<JoinHandle<()>>,
    exit: Arc<AtomicBool>,
}

impl std::fmt::Debug for AccountabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountabilityService")
            .field("handles", &self.handles.len())
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl AccountabilityService {
    /// Spawn the service's tasks on the current tokio runtime.
    ///
    /// The block and message loops end when their channels close. The flush
    /// loop ends when `exit` is set or the submission sink is dropped.
    pub fn start(
        config: AccountabilityConfig,
        identity: Pubkey,
        chain: Arc<dyn ChainReader>,
        mut block_rx: mpsc::Receiver<BlockEvent>,
        mut message_rx: mpsc::Receiver<SignedMessage>,
        sink: mpsc::Sender<Vec<OnChainProof>>,
        exit: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "accountability service starting (identity: {identity}, delta: {})",
            config.delta
        );

        let flush_interval = Duration::from_millis(config.flush_interval_ms);
        let orchestrator = Arc::new(Orchestrator::new(config, identity, chain));
        let mut handles = Vec::with_capacity(3);

        let orch = orchestrator.clone();
        let loop_exit = exit.clone();
        handles.push(tokio::spawn(async move {
            while let Some(BlockEvent { height }) = block_rx.recv().await {
                if loop_exit.load(Ordering::Relaxed) {
                    break;
                }
                orch.on_new_block(height);
            }
            debug!("block event loop finished");
        }));

        let orch = orchestrator.clone();
        let loop_exit = exit.clone();
        handles.push(tokio::spawn(async move {
            while let Some(msg) = message_rx.recv().await {
                if loop_exit.load(Ordering::Relaxed) {
                    break;
                }
                orch.on_message(msg);
            }
            debug!("consensus message loop finished");
        }));

        let orch = orchestrator.clone();
        let loop_exit = exit.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            loop {
                ticker.tick().await;
                if loop_exit.load(Ordering::Relaxed) || sink.is_closed() {
                    break;
                }
                flush(&orch, &sink);
            }
            debug!("proof flush loop finished");
        }));

        Ok(Self {
            orchestrator,
            handles,
            exit,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Signal shutdown. Event loops stop at their next event.
    pub fn exit(&self) {
        self.exit.store(true, Ordering::Relaxed);
    }

    /// Wait for all service tasks to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!("accountability task failed: {err}");
            }
        }
    }
}

/// Take the next batch from `orchestrator` and submit it after a random delay.
pub fn flush(orchestrator: &Arc<Orchestrator>, sink: &mpsc::Sender<Vec<OnChainProof>>) {
    let batch = orchestrator.take_batch();
    if batch.is_empty() {
        return;
    }

    let max_delay = orchestrator.config().max_submit_delay_ms;
    let delay = Duration::from_millis(rand::rng().random_range(0..=max_delay));
    let chain = orchestrator.chain().clone();
    let sink = sink.clone();
    debug!("submitting {} proof(s) in {delay:?}", batch.len());

    tokio::spawn(async move {
        match submit_after_delay(batch, delay, chain, sink).await {
            Ok(0) => debug!("batch fully superseded by on-chain proofs"),
            Ok(sent) => info!("submitted {sent} accountability proof(s)"),
            Err(err) => warn!("proof submission failed: {err}"),
        }
    });
}

/// Sleep, re-filter against on-chain state, encode and send. Returns the
/// number of proofs sent.
pub async fn submit_after_delay(
    batch: Vec<Proof>,
    delay: Duration,
    chain: Arc<dyn ChainReader>,
    sink: mpsc::Sender<Vec<OnChainProof>>,
) -> Result<usize> {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let records = batch
        .iter()
        .filter(|proof| !chain.proof_exists(&proof.msg_hash(), proof.kind))
        .map(Proof::to_on_chain)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if records.is_empty() {
        return Ok(0);
    }

    let sent = records.len();
    sink.send(records)
        .await
        .map_err(|_| ServiceError::ChannelClosed)?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        solana_keypair::Keypair,
        solana_signer::Signer,
        trv1_accountability::{
            test_utils::{init_logging, MemoryChain, TestCommittee},
            ProofKind, Rule,
        },
    };

    struct Harness {
        service: AccountabilityService,
        block_tx: mpsc::Sender<BlockEvent>,
        message_tx: mpsc::Sender<SignedMessage>,
        sink_rx: mpsc::Receiver<Vec<OnChainProof>>,
    }

    fn make_harness(tc: &TestCommittee) -> Harness {
        init_logging();
        let config = AccountabilityConfig::dev_default();
        let (block_tx, block_rx) = mpsc::channel(config.channel_buffer_size);
        let (message_tx, message_rx) = mpsc::channel(config.channel_buffer_size);
        let (sink_tx, sink_rx) = mpsc::channel(config.channel_buffer_size);
        let service = AccountabilityService::start(
            config,
            Keypair::new().pubkey(),
            Arc::new(tc.chain(100)),
            block_rx,
            message_rx,
            sink_tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        Harness {
            service,
            block_tx,
            message_tx,
            sink_rx,
        }
    }

    async fn next_batch(rx: &mut mpsc::Receiver<Vec<OnChainProof>>) -> Vec<OnChainProof> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch within timeout")
            .expect("sink open")
    }

    #[tokio::test]
    async fn test_equivocation_reaches_sink() {
        let tc = TestCommittee::new(4);
        let mut h = make_harness(&tc);

        h.message_tx.send(tc.prevote(3, 1, 0, Some(1))).await.unwrap();
        h.message_tx.send(tc.prevote(3, 1, 0, Some(2))).await.unwrap();

        let batch = next_batch(&mut h.sink_rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].sender, tc.pubkey(3));
        assert_eq!(batch[0].kind, ProofKind::Misbehaviour);
        assert_eq!(batch[0].decode_proof().unwrap().rule, Rule::Equivocation);
    }

    #[tokio::test]
    async fn test_block_events_drive_rule_scan() {
        let tc = TestCommittee::new(4);
        let mut h = make_harness(&tc);

        h.message_tx.send(tc.precommit(0, 1, 0, Some(1))).await.unwrap();
        // let the message loop store it before the scan runs
        while h.service.orchestrator().store().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.block_tx.send(BlockEvent { height: 3 }).await.unwrap();

        let batch = next_batch(&mut h.sink_rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ProofKind::Accusation);
        assert_eq!(batch[0].decode_proof().unwrap().rule, Rule::C);
    }

    #[tokio::test]
    async fn test_submission_skips_recorded_proofs() {
        let tc = TestCommittee::new(4);
        let chain = Arc::new(tc.chain(10));
        let proof = Proof::accusation(Rule::C, tc.precommit(0, 1, 0, Some(1)), vec![]);
        chain.record_proof(proof.msg_hash(), proof.kind);
        let (tx, mut rx) = mpsc::channel(1);

        let sent = submit_after_delay(vec![proof], Duration::ZERO, chain, tx)
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submission_to_closed_sink() {
        let tc = TestCommittee::new(4);
        let chain = Arc::new(tc.chain(10));
        let proof = Proof::accusation(Rule::C, tc.precommit(0, 1, 0, Some(1)), vec![]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_matches!(
            submit_after_delay(vec![proof], Duration::ZERO, chain, tx).await,
            Err(ServiceError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (_block_tx, block_rx) = mpsc::channel(1);
        let (_message_tx, message_rx) = mpsc::channel(1);
        let (sink_tx, _sink_rx) = mpsc::channel(1);
        let config = AccountabilityConfig {
            delta: 0,
            ..AccountabilityConfig::dev_default()
        };
        let result = AccountabilityService::start(
            config,
            Pubkey::default(),
            Arc::new(MemoryChain::new()),
            block_rx,
            message_rx,
            sink_tx,
            Arc::new(AtomicBool::new(false)),
        );
        assert_matches!(result, Err(ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let tc = TestCommittee::new(4);
        let h = make_harness(&tc);
        h.service.exit();
        drop(h.block_tx);
        drop(h.message_tx);
        tokio::time::timeout(Duration::from_secs(5), h.service.join())
            .await
            .expect("service stops");
    }
}
