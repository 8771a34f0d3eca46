//! Deadline-ordered queue of opportunities awaiting their submission window.

use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tenderwatch_types::OpportunityRecord;

#[derive(Debug)]
struct Entry {
    deadline: DateTime<Utc>,
    seq: u64,
    record: OpportunityRecord,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Min-heap on deadline. Equal deadlines come out in insertion order.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, deadline: DateTime<Utc>, record: OpportunityRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { deadline, seq, record }));
    }

    /// Earliest deadline and its record
    pub fn peek(&self) -> Option<(DateTime<Utc>, &OpportunityRecord)> {
        self.heap.peek().map(|Reverse(e)| (e.deadline, &e.record))
    }

    pub fn pop(&mut self) -> Option<(DateTime<Utc>, OpportunityRecord)> {
        self.heap.pop().map(|Reverse(e)| (e.deadline, e.record))
    }

    /// Remove the earliest entry only if its deadline has been reached.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, OpportunityRecord)> {
        match self.peek() {
            Some((deadline, _)) if deadline <= now => self.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
