//! Rank bookkeeping and point-to-point message exchange.
//!
//! Work (chains, stones) is partitioned statically across ranks, so there is
//! no shared state and no locking. Ranks only meet at explicit synchronisation
//! points: swap negotiation and start/end-of-phase barriers.

use std::ops::Range;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, TempoError};

/// Position of the current process within the group working on one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelContext {
    /// Rank of the current process.
    pub pid: usize,
    /// Number of ranks assigned to the object.
    pub num_processes: usize,
    /// First rank of the group; it makes shared decisions and prints progress.
    pub active_pid: usize,
}

impl Default for ParallelContext {
    fn default() -> Self {
        Self::single()
    }
}

impl ParallelContext {
    /// Context of a run with exactly one process.
    pub fn single() -> Self {
        Self {
            pid: 0,
            num_processes: 1,
            active_pid: 0,
        }
    }

    /// Context covering every rank of a communicator.
    pub fn from_communicator<C: Communicator + ?Sized>(comm: &C) -> Self {
        Self {
            pid: comm.rank(),
            num_processes: comm.size().max(1),
            active_pid: 0,
        }
    }

    /// Whether this process prints progress and makes shared decisions.
    pub fn is_active(&self) -> bool {
        self.pid == self.active_pid
    }

    /// Reassigns the group this process belongs to.
    pub fn with_active(self, active_pid: usize, num_processes: usize) -> Self {
        Self {
            pid: self.pid,
            num_processes: num_processes.max(1),
            active_pid,
        }
    }

    /// Ranks belonging to this group.
    pub fn ranks(&self) -> Range<usize> {
        self.active_pid..self.active_pid + self.num_processes
    }

    /// Whether this process is part of the group at all.
    pub fn in_group(&self) -> bool {
        self.ranks().contains(&self.pid)
    }

    /// Splits `items` into contiguous blocks over the group's ranks.
    ///
    /// No more ranks than items are used; the surplus ranks receive nothing.
    pub fn partition(&self, items: usize) -> Partition {
        let used = self.num_processes.min(items).max(1);
        let mut items_per_process = vec![Vec::new(); self.num_processes];
        let mut process_per_item = Vec::with_capacity(items);
        for block in 0..used {
            let start = block * items / used;
            let end = (block + 1) * items / used;
            for item in start..end {
                items_per_process[block].push(item);
                process_per_item.push(self.active_pid + block);
            }
        }
        Partition {
            active_pid: self.active_pid,
            items_per_process,
            process_per_item,
        }
    }
}

/// Static assignment of items to ranks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    active_pid: usize,
    items_per_process: Vec<Vec<usize>>,
    process_per_item: Vec<usize>,
}

impl Partition {
    /// Items owned by `pid` (empty for ranks outside the group).
    pub fn items_of(&self, pid: usize) -> &[usize] {
        pid.checked_sub(self.active_pid)
            .and_then(|offset| self.items_per_process.get(offset))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rank that owns `item`.
    pub fn owner(&self, item: usize) -> usize {
        self.process_per_item[item]
    }

    /// Ranks that own at least one item.
    pub fn owning_ranks(&self) -> Vec<usize> {
        self.items_per_process
            .iter()
            .enumerate()
            .filter(|(_, items)| !items.is_empty())
            .map(|(offset, _)| self.active_pid + offset)
            .collect()
    }
}

/// Blocking point-to-point exchange of scalar vectors between ranks.
///
/// Messages between a fixed pair of ranks are delivered in order. Components
/// share one communicator per rank through an `Arc`.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Blocks until every rank reached the barrier.
    fn barrier(&self);

    /// Sends `data` to rank `to`.
    fn send(&self, to: usize, data: &[f64]) -> Result<(), TempoError>;

    /// Receives the next message sent by rank `from`.
    fn recv(&self, from: usize) -> Result<Vec<f64>, TempoError>;

    /// Distributes `data` from `root` to every other rank in `members`.
    fn broadcast(
        &self,
        root: usize,
        members: Range<usize>,
        data: &mut Vec<f64>,
    ) -> Result<(), TempoError> {
        let rank = self.rank();
        if rank == root {
            for member in members.filter(|&member| member != root) {
                self.send(member, data)?;
            }
        } else if members.contains(&rank) {
            *data = self.recv(root)?;
        }
        Ok(())
    }

    /// Blocks until every rank in `members` reached this point.
    ///
    /// Unlike [`Communicator::barrier`] only the members take part, so groups
    /// working on different objects never wait on each other.
    fn barrier_among(&self, root: usize, members: Range<usize>) -> Result<(), TempoError> {
        let rank = self.rank();
        if members.len() <= 1 || !members.contains(&rank) {
            return Ok(());
        }
        if rank == root {
            for member in members.clone().filter(|&member| member != root) {
                self.recv(member)?;
            }
            for member in members.filter(|&member| member != root) {
                self.send(member, &[])?;
            }
        } else {
            self.send(root, &[])?;
            self.recv(root)?;
        }
        Ok(())
    }
}

/// Communicator of a run with a single process.
#[derive(Debug)]
pub struct LocalCommunicator {
    loopback: Mutex<Sender<Vec<f64>>>,
    inbox: Mutex<Receiver<Vec<f64>>>,
}

impl Default for LocalCommunicator {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCommunicator {
    /// Creates the single-rank communicator.
    pub fn new() -> Self {
        let (loopback, inbox) = channel();
        Self {
            loopback: Mutex::new(loopback),
            inbox: Mutex::new(inbox),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn send(&self, to: usize, data: &[f64]) -> Result<(), TempoError> {
        if to != 0 {
            return Err(unknown_rank(to, 1));
        }
        self.loopback
            .lock()
            .map_err(|_| poisoned(0))?
            .send(data.to_vec())
            .map_err(|_| disconnected(0, to))
    }

    fn recv(&self, from: usize) -> Result<Vec<f64>, TempoError> {
        if from != 0 {
            return Err(unknown_rank(from, 1));
        }
        let inbox = self.inbox.lock().map_err(|_| poisoned(0))?;
        inbox.try_recv().map_err(|_| {
            TempoError::Parallel(ErrorInfo::new(
                "empty-loopback",
                "receive on the single rank without a pending message",
            ))
        })
    }
}

/// In-process ranks connected by channels, one thread per rank.
///
/// Stands in for a message-passing runtime so the multi-rank protocols can run
/// on threads.
#[derive(Debug)]
pub struct ChannelCommunicator {
    rank: usize,
    outboxes: Vec<Mutex<Sender<Vec<f64>>>>,
    inboxes: Vec<Mutex<Receiver<Vec<f64>>>>,
    barrier: Arc<Barrier>,
}

impl ChannelCommunicator {
    /// Creates `size` connected communicators, one per rank.
    pub fn group(size: usize) -> Vec<ChannelCommunicator> {
        let size = size.max(1);
        let barrier = Arc::new(Barrier::new(size));
        // senders[from][to], receivers[to][from]
        let mut senders: Vec<Vec<Sender<Vec<f64>>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<f64>>>> = (0..size).map(|_| Vec::new()).collect();
        for from in 0..size {
            for to in 0..size {
                let (tx, rx) = channel();
                senders[from].push(tx);
                receivers[to].push(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ChannelCommunicator {
                rank,
                outboxes: outboxes.into_iter().map(Mutex::new).collect(),
                inboxes: inboxes.into_iter().map(Mutex::new).collect(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn barrier(&self) {
        self.barrier.wait();
    }

    fn send(&self, to: usize, data: &[f64]) -> Result<(), TempoError> {
        let outbox = self
            .outboxes
            .get(to)
            .ok_or_else(|| unknown_rank(to, self.size()))?;
        outbox
            .lock()
            .map_err(|_| poisoned(self.rank))?
            .send(data.to_vec())
            .map_err(|_| disconnected(self.rank, to))
    }

    fn recv(&self, from: usize) -> Result<Vec<f64>, TempoError> {
        let inbox = self
            .inboxes
            .get(from)
            .ok_or_else(|| unknown_rank(from, self.size()))?;
        inbox
            .lock()
            .map_err(|_| poisoned(self.rank))?
            .recv()
            .map_err(|_| disconnected(from, self.rank))
    }
}

fn unknown_rank(rank: usize, size: usize) -> TempoError {
    TempoError::Parallel(
        ErrorInfo::new("unknown-rank", "rank outside of the communicator")
            .with_context("rank", rank.to_string())
            .with_context("size", size.to_string()),
    )
}

fn poisoned(rank: usize) -> TempoError {
    TempoError::Parallel(
        ErrorInfo::new("poisoned-channel", "a thread panicked while holding a channel")
            .with_context("rank", rank.to_string()),
    )
}

fn disconnected(from: usize, to: usize) -> TempoError {
    TempoError::Parallel(
        ErrorInfo::new("rank-disconnected", "peer rank hung up")
            .with_context("from", from.to_string())
            .with_context("to", to.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_uses_contiguous_blocks() {
        let ctx = ParallelContext {
            pid: 1,
            num_processes: 3,
            active_pid: 0,
        };
        let partition = ctx.partition(7);
        assert_eq!(partition.items_of(0), &[0, 1]);
        assert_eq!(partition.items_of(1), &[2, 3]);
        assert_eq!(partition.items_of(2), &[4, 5, 6]);
        assert_eq!(partition.owner(3), 1);
    }

    #[test]
    fn partition_never_uses_more_ranks_than_items() {
        let ctx = ParallelContext {
            pid: 0,
            num_processes: 4,
            active_pid: 2,
        };
        let partition = ctx.partition(2);
        assert_eq!(partition.owning_ranks(), vec![2, 3]);
        assert!(partition.items_of(4).is_empty());
        assert!(partition.items_of(0).is_empty());
    }

    #[test]
    fn local_loopback_round_trips() {
        let comm = LocalCommunicator::new();
        comm.send(0, &[1.5, -2.0]).unwrap();
        assert_eq!(comm.recv(0).unwrap(), vec![1.5, -2.0]);
        assert!(comm.send(1, &[0.0]).is_err());
    }
}
