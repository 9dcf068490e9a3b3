//! Shard Builder
//!
//! Runs after the barrier. A node ships the records other nodes need, receives the records
//! it needs, then writes each of its output shards as one complete archive.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::archive;
use super::exchange::NodePlan;
use crate::error::{Result, SortError};
use crate::membership::types::NodeId;
use crate::metrics::registry::NodeMetrics;
use crate::metrics::types::Phase;
use crate::storage::store::ObjectStore;

#[derive(Debug)]
pub enum TransferMessage {
    Record {
        from: NodeId,
        key: String,
        data: Vec<u8>,
    },
    /// The sender gave up; nothing more will come from it.
    Abandoned { from: NodeId },
}

pub type Inbox = mpsc::Receiver<TransferMessage>;

/// Bounded record channels between the nodes of one operation.
pub struct TransferHub {
    senders: HashMap<NodeId, mpsc::Sender<TransferMessage>>,
}

impl TransferHub {
    /// Returns the hub plus one inbox per node, to be handed to that node's agent.
    pub fn new(nodes: &[NodeId], buffer: usize) -> (Arc<Self>, HashMap<NodeId, Inbox>) {
        let mut senders = HashMap::new();
        let mut inboxes = HashMap::new();
        for node in nodes {
            let (tx, rx) = mpsc::channel(buffer.max(1));
            senders.insert(node.clone(), tx);
            inboxes.insert(node.clone(), rx);
        }
        (Arc::new(Self { senders }), inboxes)
    }

    pub fn sender(&self, node: &NodeId) -> Option<mpsc::Sender<TransferMessage>> {
        self.senders.get(node).cloned()
    }

    /// Tells `peer` that `from` will not deliver the rest of its records.
    pub async fn abandon(&self, peer: &NodeId, from: &NodeId, timeout: Duration) {
        let Some(sender) = self.sender(peer) else {
            return;
        };
        let message = TransferMessage::Abandoned { from: from.clone() };
        if tokio::time::timeout(timeout, sender.send(message)).await.is_err() {
            tracing::debug!("Peer {} did not take the abandon notice from {}", peer, from);
        }
    }
}

struct Incoming {
    records: HashMap<String, Vec<u8>>,
    abandoned: BTreeSet<NodeId>,
}

pub struct ShardBuilder<'a> {
    pub node: &'a NodeId,
    pub store: &'a dyn ObjectStore,
    pub bucket: &'a str,
    pub hub: &'a TransferHub,
    pub cancel: &'a CancellationToken,
    pub transfer_timeout: Duration,
    pub metrics: &'a NodeMetrics,
}

impl ShardBuilder<'_> {
    pub async fn run(
        &self,
        plan: &NodePlan,
        local: &HashMap<String, Vec<u8>>,
        inbox: &mut Inbox,
    ) -> Result<()> {
        let ((), incoming) = tokio::try_join!(
            self.send_outgoing(plan, local),
            self.receive_incoming(plan, inbox)
        )?;
        self.build_shards(plan, local, &incoming).await
    }

    async fn send_outgoing(&self, plan: &NodePlan, local: &HashMap<String, Vec<u8>>) -> Result<()> {
        for (peer, keys) in &plan.send {
            let sender = self
                .hub
                .sender(peer)
                .ok_or_else(|| SortError::transfer(format!("unknown peer {}", peer)))?;

            for (sent, key) in keys.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    return Err(SortError::Aborted);
                }
                let data = local.get(key).cloned().ok_or_else(|| {
                    SortError::transfer(format!("record '{}' is not held by {}", key, self.node))
                })?;
                let message = TransferMessage::Record {
                    from: self.node.clone(),
                    key: key.clone(),
                    data,
                };

                let delivered = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SortError::Aborted),
                    res = tokio::time::timeout(self.transfer_timeout, sender.send(message)) => res,
                };
                match delivered {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        // Inbox dropped: the peer stopped working on this operation
                        let dropped = keys.len() - sent;
                        tracing::warn!("Peer {} is gone, dropping {} records", peer, dropped);
                        self.metrics
                            .warn(format!("peer {} gone, {} records not delivered", peer, dropped));
                        break;
                    }
                    Err(_) => {
                        return Err(SortError::transfer(format!(
                            "peer {} accepted nothing for {:?}",
                            peer, self.transfer_timeout
                        )));
                    }
                }
            }
            tracing::debug!("Shipped {} records to {}", keys.len(), peer);
        }
        Ok(())
    }

    async fn receive_incoming(&self, plan: &NodePlan, inbox: &mut Inbox) -> Result<Incoming> {
        let mut expected = plan.expect.clone();
        expected.retain(|_, count| *count > 0);

        let mut incoming = Incoming {
            records: HashMap::new(),
            abandoned: BTreeSet::new(),
        };

        while !expected.is_empty() {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SortError::Aborted),
                next = tokio::time::timeout(self.transfer_timeout, inbox.recv()) => next,
            };

            match next {
                Ok(Some(TransferMessage::Record { from, key, data })) => {
                    if let Some(count) = expected.get_mut(&from) {
                        *count -= 1;
                        if *count == 0 {
                            expected.remove(&from);
                        }
                    }
                    incoming.records.insert(key, data);
                }
                Ok(Some(TransferMessage::Abandoned { from })) => {
                    if expected.remove(&from).is_some() {
                        tracing::warn!("Node {} abandoned its transfers", from);
                    }
                    incoming.abandoned.insert(from);
                }
                Ok(None) => return Err(SortError::transfer("record inbox closed")),
                Err(_) => {
                    return Err(SortError::transfer(format!(
                        "no records from {:?} for {:?}",
                        expected.keys().collect::<Vec<_>>(),
                        self.transfer_timeout
                    )));
                }
            }
        }

        Ok(incoming)
    }

    async fn build_shards(
        &self,
        plan: &NodePlan,
        local: &HashMap<String, Vec<u8>>,
        incoming: &Incoming,
    ) -> Result<()> {
        for shard in &plan.build {
            if self.cancel.is_cancelled() {
                return Err(SortError::Aborted);
            }

            let mut entries: Vec<(&str, &[u8])> = Vec::with_capacity(shard.records.len());
            let mut missing = 0usize;
            for record in &shard.records {
                match local
                    .get(&record.key)
                    .or_else(|| incoming.records.get(&record.key))
                {
                    Some(data) => entries.push((record.key.as_str(), data.as_slice())),
                    None => missing += 1,
                }
            }

            if missing > 0 {
                if incoming.abandoned.is_empty() {
                    return Err(SortError::partial_write(
                        &shard.name,
                        format!("{} records never arrived", missing),
                    ));
                }
                tracing::warn!("Skipping {}: {} records lost", shard.name, missing);
                self.metrics.warn(format!(
                    "skipped {}: {} records lost with {:?}",
                    shard.name, missing, incoming.abandoned
                ));
                continue;
            }

            // The archive only exists in memory until the put below publishes it whole
            let bytes = archive::write_archive(&shard.name, &entries, self.cancel)?;
            self.store
                .put(self.bucket, &shard.name, bytes)
                .await
                .map_err(|e| SortError::partial_write(&shard.name, e))?;

            self.metrics
                .add(Phase::ShardCreation, 1, shard.records.len() as u64, shard.size);
            tracing::debug!(
                "Wrote {} ({} records, {} bytes)",
                shard.name,
                shard.records.len(),
                shard.size
            );
        }
        Ok(())
    }
}
