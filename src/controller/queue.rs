//! # Per-pool request queues.
//!
//! One FIFO per pool, mutated only under the controller lock. A parked
//! request is a [`QueueNode`]: the request itself, its shared outcome
//! cell, and the enqueue timestamp used for wait-time accounting.
//!
//! Nodes are shared (`Arc`) between the queue, the submitting task, and
//! the dequeue worker; removal is by node identity, so the loser of an
//! outcome race can safely attempt a removal that already happened.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::outcome::OutcomeCell;
use crate::request::QueryRequest;

/// A request waiting in a pool queue.
#[derive(Debug)]
pub(crate) struct QueueNode {
    pub request: Arc<QueryRequest>,
    pub outcome: Arc<OutcomeCell>,
    pub enqueued_at: Instant,
}

impl QueueNode {
    pub fn new(request: Arc<QueryRequest>, outcome: Arc<OutcomeCell>) -> Arc<Self> {
        Arc::new(Self {
            request,
            outcome,
            enqueued_at: Instant::now(),
        })
    }
}

/// FIFO of parked requests for one pool.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    nodes: VecDeque<Arc<QueueNode>>,
}

impl RequestQueue {
    pub fn push_back(&mut self, node: Arc<QueueNode>) {
        self.nodes.push_back(node);
    }

    /// Head of the queue; admission from the queue only ever looks here.
    pub fn front(&self) -> Option<&Arc<QueueNode>> {
        self.nodes.front()
    }

    /// Removes `node` wherever it sits. Returns whether it was still
    /// queued.
    pub fn remove(&mut self, node: &Arc<QueueNode>) -> bool {
        match self.nodes.iter().position(|n| Arc::ptr_eq(n, node)) {
            Some(idx) => {
                self.nodes.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QueueNode>> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::QueryProfile;

    fn node(id: &str) -> Arc<QueueNode> {
        QueueNode::new(
            Arc::new(QueryRequest {
                query_id: id.to_string(),
                pool_name: "default".to_string(),
                executors: Vec::new(),
                per_host_mem_estimate: 0,
                largest_initial_reservation: 0,
                user_mem_limit: None,
                profile: Arc::new(QueryProfile::default()),
            }),
            Arc::new(OutcomeCell::new()),
        )
    }

    #[test]
    fn fifo_order_and_identity_removal() {
        let mut queue = RequestQueue::default();
        let a = node("a");
        let b = node("b");
        queue.push_back(Arc::clone(&a));
        queue.push_back(Arc::clone(&b));

        assert_eq!(queue.front().map(|n| n.request.query_id.as_str()), Some("a"));
        assert!(queue.remove(&a));
        assert!(!queue.remove(&a), "second removal is a no-op");
        assert_eq!(queue.front().map(|n| n.request.query_id.as_str()), Some("b"));
        assert_eq!(queue.len(), 1);
    }
}
