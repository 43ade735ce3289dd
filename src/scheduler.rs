// src/scheduler.rs
//! Three-tier priority queue with FIFO ordering inside each tier.
//!
//! Drains strictly `High` before `Medium` before `Low`. Items of equal
//! priority come out in arrival order.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Highest first.
    pub const DRAIN_ORDER: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    #[inline]
    fn tier(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        })
    }
}

pub struct PriorityQueue<T> {
    tiers: [VecDeque<T>; 3],
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }
    }

    pub fn push(&mut self, item: T, priority: Priority) {
        self.tiers[priority.tier()].push_back(item);
    }

    /// Next item in drain order, with the tier it came from.
    pub fn pop(&mut self) -> Option<(T, Priority)> {
        Priority::DRAIN_ORDER
            .iter()
            .find_map(|&p| self.tiers[p.tier()].pop_front().map(|item| (item, p)))
    }

    pub fn peek(&self) -> Option<(&T, Priority)> {
        Priority::DRAIN_ORDER
            .iter()
            .find_map(|&p| self.tiers[p.tier()].front().map(|item| (item, p)))
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    pub fn len_at(&self, priority: Priority) -> usize {
        self.tiers[priority.tier()].len()
    }

    pub fn clear(&mut self) {
        self.tiers.iter_mut().for_each(VecDeque::clear);
    }

    /// Removes and returns everything in drain order.
    pub fn drain(&mut self) -> Vec<(T, Priority)> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }

    /// Items in drain order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = (&T, Priority)> {
        Priority::DRAIN_ORDER
            .iter()
            .flat_map(move |&p| self.tiers[p.tier()].iter().map(move |item| (item, p)))
    }
}

impl<T: PartialEq> PriorityQueue<T> {
    pub fn priority_of(&self, item: &T) -> Option<Priority> {
        self.iter().find(|(queued, _)| *queued == item).map(|(_, p)| p)
    }

    /// Moves `item` into a higher tier, appended after that tier's existing items.
    ///
    /// Returns `false` if the item is not queued or already sits at `to` or above.
    pub fn promote(&mut self, item: &T, to: Priority) -> bool {
        let Some(current) = self.priority_of(item) else {
            return false;
        };
        if current >= to {
            return false;
        }
        let tier = &mut self.tiers[current.tier()];
        let Some(pos) = tier.iter().position(|queued| queued == item) else {
            return false;
        };
        if let Some(moved) = tier.remove(pos) {
            self.tiers[to.tier()].push_back(moved);
            return true;
        }
        false
    }

    /// Removes the first occurrence of `item`.
    pub fn remove(&mut self, item: &T) -> Option<Priority> {
        for p in Priority::DRAIN_ORDER {
            let tier = &mut self.tiers[p.tier()];
            if let Some(pos) = tier.iter().position(|queued| queued == item) {
                tier.remove(pos);
                return Some(p);
            }
        }
        None
    }
}
