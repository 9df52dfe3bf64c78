use crate::transaction::{PRIORITY_COUNT, Transaction};
use std::collections::{BTreeMap, VecDeque};
use zwh_core::prelude::*;

/// The priority send queue. At most one transaction per sleeping node is
/// visible to the scheduler; the rest wait in that node's pending set until
/// a wake-up notification releases them.
#[derive(Default)]
pub struct TransactionQueue {
    queues: [VecDeque<Transaction>; PRIORITY_COUNT],
    parked: BTreeMap<NodeId, VecDeque<Transaction>>,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transaction to the queue. `node_asleep` reflects whether the
    /// target node is currently unreachable.
    pub fn enqueue(&mut self, transaction: Transaction, node_asleep: bool) {
        if node_asleep {
            if let Some(node_id) = transaction.node_id {
                self.parked.entry(node_id).or_default().push_back(transaction);
                return;
            }
        }
        self.queues[transaction.priority.index()].push_back(transaction);
    }

    /// Takes the next transaction to send: highest priority first, FIFO
    /// within one priority. Queued transactions whose originator stopped
    /// listening count as cancelled and are removed instead of sent.
    pub fn pop_next(&mut self) -> Option<Transaction> {
        for queue in self.queues.iter_mut() {
            while let Some(transaction) = queue.pop_front() {
                let cancelled = transaction
                    .promise
                    .as_ref()
                    .map(|p| p.is_closed())
                    .unwrap_or(false);
                if !cancelled {
                    return Some(transaction);
                }
            }
        }
        None
    }

    /// Releases the head of a woken-up node's pending set into the queue
    pub fn release_next_for_node(&mut self, node_id: NodeId) {
        let Some(pending) = self.parked.get_mut(&node_id) else {
            return;
        };
        if let Some(transaction) = pending.pop_front() {
            self.queues[transaction.priority.index()].push_back(transaction);
        }
        if pending.is_empty() {
            self.parked.remove(&node_id);
        }
    }

    /// Whether any transaction is waiting - visible or parked - for a node
    pub fn has_pending_for_node(&self, node_id: NodeId) -> bool {
        self.parked.contains_key(&node_id)
            || self
                .queues
                .iter()
                .flatten()
                .any(|t| t.node_id == Some(node_id))
    }

    /// Moves a transaction back into the node's pending set, e.g. after the
    /// node stopped answering. It goes to the front so it is retried first
    /// on the next wake-up.
    pub fn park(&mut self, transaction: Transaction) {
        let Some(node_id) = transaction.node_id else {
            self.queues[transaction.priority.index()].push_back(transaction);
            return;
        };
        self.parked.entry(node_id).or_default().push_front(transaction);
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty()) && self.parked.is_empty()
    }

    /// Cancels everything. Used on shutdown.
    pub fn drain(&mut self) -> Vec<Transaction> {
        let mut ret: Vec<Transaction> = self.queues.iter_mut().flat_map(|q| q.drain(..)).collect();
        for (_, mut pending) in std::mem::take(&mut self.parked) {
            ret.extend(pending.drain(..));
        }
        ret
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transaction::Priority;
    use zwh_serial::command::GetControllerVersionRequest;

    fn transaction(priority: Priority) -> Transaction {
        let (mut t, _rx) = Transaction::controller_command(
            GetControllerVersionRequest::default(),
            priority,
            3,
        );
        t.promise = None;
        t
    }

    fn send_data_transaction(node_id: u8) -> Transaction {
        use zwh_cc::prelude::*;
        use zwh_serial::command::SendDataRequest;
        let (mut t, _rx) = Transaction::send_data(
            SendDataRequest::builder()
                .node_id(NodeId::new(node_id))
                .command(BinarySwitchCCGet::default().into())
                .build(),
            Priority::Normal,
            3,
        );
        t.promise = None;
        t
    }

    #[test]
    fn test_priority_order() {
        let mut queue = TransactionQueue::new();
        queue.enqueue(transaction(Priority::Normal), false);
        queue.enqueue(transaction(Priority::Controller), false);

        assert_eq!(queue.pop_next().unwrap().priority, Priority::Controller);
        assert_eq!(queue.pop_next().unwrap().priority, Priority::Normal);
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = TransactionQueue::new();
        let mut first = transaction(Priority::Normal);
        first.attempts_left = 1;
        let mut second = transaction(Priority::Normal);
        second.attempts_left = 2;
        queue.enqueue(first, false);
        queue.enqueue(second, false);

        assert_eq!(queue.pop_next().unwrap().attempts_left, 1);
        assert_eq!(queue.pop_next().unwrap().attempts_left, 2);
    }

    #[test]
    fn test_sleeping_node_parks_transactions() {
        let mut queue = TransactionQueue::new();
        queue.enqueue(send_data_transaction(7), true);
        queue.enqueue(send_data_transaction(7), true);

        // Nothing visible to the scheduler
        assert!(queue.pop_next().is_none());
        assert!(queue.has_pending_for_node(NodeId::new(7)));

        // Wake-up releases exactly the head
        queue.release_next_for_node(NodeId::new(7));
        assert!(queue.pop_next().is_some());
        assert!(queue.pop_next().is_none());

        queue.release_next_for_node(NodeId::new(7));
        assert!(queue.pop_next().is_some());
        assert!(!queue.has_pending_for_node(NodeId::new(7)));
    }

    #[test]
    fn test_dropped_originator_cancels_queued_transaction() {
        let mut queue = TransactionQueue::new();
        let (t, rx) = Transaction::controller_command(
            GetControllerVersionRequest::default(),
            Priority::Normal,
            3,
        );
        queue.enqueue(t, false);

        // Once the originator stops listening, the transaction is removed
        // from the queue instead of being sent
        drop(rx);
        assert!(queue.pop_next().is_none());
    }
}
