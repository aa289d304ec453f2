//! # Timer List
//!
//! Armed timeouts ordered by expiry using delta encoding: every entry stores
//! its remaining ticks relative to the entry before it, so the true
//! remaining time of entry *k* is the sum of the deltas of entries 1..=k.
//! The per-tick check only ever touches the head, which makes it O(1) no
//! matter how many timers are armed; insertion and removal walk the list.

use heapless::Vec;

use crate::scheduler::Scheduler;

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Fail with `Timeout` immediately if the call would block.
    NoWait,
    /// Wait at most this many ticks. `Ticks(0)` behaves as `NoWait`.
    Ticks(u32),
    /// Wait until signalled.
    Forever,
}

impl Timeout {
    /// Raw tick encoding: `0` never waits and `u32::MAX` waits forever.
    pub const WAIT_NONE: u32 = 0;
    pub const WAIT_FOREVER: u32 = u32::MAX;

    /// Whether a blocking call must give up instead of waiting.
    pub const fn is_no_wait(self) -> bool {
        matches!(self, Timeout::NoWait | Timeout::Ticks(0))
    }

    /// Ticks to arm in the timer list, or `None` if no timer is needed.
    pub const fn ticks(self) -> Option<u32> {
        match self {
            Timeout::Ticks(n) if n > 0 => Some(n),
            _ => None,
        }
    }
}

impl From<u32> for Timeout {
    fn from(ticks: u32) -> Self {
        match ticks {
            Timeout::WAIT_NONE => Timeout::NoWait,
            Timeout::WAIT_FOREVER => Timeout::Forever,
            n => Timeout::Ticks(n),
        }
    }
}

/// Whether a software timer fires once or keeps re-arming itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    OneShot,
    Repeat,
}

/// Callback run by the tick when a software timer expires.
///
/// Runs in interrupt context with the kernel borrowed: it may signal
/// primitives (release, send) but must not block.
pub trait TimerCallback: Sync {
    fn on_expiry(&self, kernel: &mut Scheduler);
}

impl<F> TimerCallback for F
where
    F: Fn(&mut Scheduler) + Sync,
{
    fn on_expiry(&self, kernel: &mut Scheduler) {
        self(kernel)
    }
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry<K> {
    key: K,
    delta: u32,
}

/// Delta-encoded list of armed timers, identified by `K`.
#[derive(Debug)]
pub struct TimerList<K, const N: usize> {
    entries: Vec<TimerEntry<K>, N>,
}

impl<K: Copy + PartialEq, const N: usize> TimerList<K, N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Arm `key` to expire after `ticks` ticks.
    ///
    /// Entries with equal expiry keep insertion order. Fails with the key
    /// when the list is full.
    pub fn insert(&mut self, key: K, ticks: u32) -> Result<(), K> {
        if self.entries.is_full() {
            return Err(key);
        }
        let mut delta = ticks;
        let mut pos = self.entries.len();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if delta < entry.delta {
                entry.delta -= delta;
                pos = i;
                break;
            }
            delta -= entry.delta;
        }
        self.entries
            .insert(pos, TimerEntry { key, delta })
            .map_err(|e| e.key)
    }

    /// Disarm `key`. Its delta is folded into the successor so later
    /// expiries stay put. Returns whether it was armed.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.key == key) else {
            return false;
        };
        let removed = self.entries.remove(pos);
        if let Some(next) = self.entries.get_mut(pos) {
            next.delta += removed.delta;
        }
        true
    }

    /// Age the list by one tick and return every entry that expired.
    pub fn check(&mut self) -> Vec<K, N> {
        let mut expired = Vec::new();
        if let Some(head) = self.entries.first_mut() {
            head.delta = head.delta.saturating_sub(1);
        }
        while self.entries.first().is_some_and(|e| e.delta == 0) {
            let entry = self.entries.remove(0);
            // At most N entries can be armed, so this never overflows.
            let _ = expired.push(entry.key);
        }
        expired
    }

    /// True remaining ticks of `key`, or `None` if it is not armed.
    pub fn remaining(&self, key: K) -> Option<u32> {
        let mut total = 0u32;
        for entry in self.entries.iter() {
            total += entry.delta;
            if entry.key == key {
                return Some(total);
            }
        }
        None
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Armed keys in expiry order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy + PartialEq, const N: usize> Default for TimerList<K, N> {
    fn default() -> Self {
        TimerList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas<const N: usize>(list: &TimerList<u8, N>) -> Vec<(u8, u32), N> {
        list.entries.iter().map(|e| (e.key, e.delta)).collect()
    }

    #[test]
    fn test_insert_keeps_delta_encoding() {
        let mut list: TimerList<u8, 8> = TimerList::new();
        list.insert(1, 10).unwrap();
        list.insert(2, 4).unwrap();
        list.insert(3, 15).unwrap();
        list.insert(4, 10).unwrap();

        assert_eq!(deltas(&list).as_slice(), &[(2, 4), (1, 6), (4, 0), (3, 5)]);
        assert_eq!(list.remaining(2), Some(4));
        assert_eq!(list.remaining(1), Some(10));
        assert_eq!(list.remaining(4), Some(10));
        assert_eq!(list.remaining(3), Some(15));
        assert_eq!(list.remaining(9), None);
    }

    #[test]
    fn test_remove_folds_delta_into_successor() {
        let mut list: TimerList<u8, 8> = TimerList::new();
        list.insert(1, 3).unwrap();
        list.insert(2, 8).unwrap();
        list.insert(3, 12).unwrap();

        assert!(list.remove(2));
        assert!(!list.remove(2));
        assert_eq!(list.remaining(1), Some(3));
        assert_eq!(list.remaining(3), Some(12));

        assert!(list.remove(1));
        assert_eq!(deltas(&list).as_slice(), &[(3, 12)]);
    }

    #[test]
    fn test_check_only_ages_head() {
        let mut list: TimerList<u8, 8> = TimerList::new();
        list.insert(1, 2).unwrap();
        list.insert(2, 5).unwrap();

        assert!(list.check().is_empty());
        assert_eq!(deltas(&list).as_slice(), &[(1, 1), (2, 3)]);

        assert_eq!(list.check().as_slice(), &[1]);
        assert_eq!(list.remaining(2), Some(3));

        assert!(list.check().is_empty());
        assert!(list.check().is_empty());
        assert_eq!(list.check().as_slice(), &[2]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_equal_expiries_fire_together_in_order() {
        let mut list: TimerList<u8, 8> = TimerList::new();
        list.insert(1, 2).unwrap();
        list.insert(2, 2).unwrap();
        list.insert(3, 3).unwrap();

        assert!(list.check().is_empty());
        assert_eq!(list.check().as_slice(), &[1, 2]);
        assert_eq!(list.check().as_slice(), &[3]);
    }

    #[test]
    fn test_delta_invariant_over_mixed_operations() {
        // Track absolute expiry alongside the list and compare after each step.
        let mut list: TimerList<u8, 8> = TimerList::new();
        let mut expected: Vec<(u8, u32), 8> = Vec::new();
        let ops: [(u8, u32); 6] = [(1, 7), (2, 3), (3, 11), (4, 3), (5, 1), (6, 20)];

        for &(key, ticks) in ops.iter() {
            list.insert(key, ticks).unwrap();
            expected.push((key, ticks)).unwrap();
        }
        for &(key, ticks) in expected.iter() {
            assert_eq!(list.remaining(key), Some(ticks));
        }

        list.remove(4);
        list.remove(6);
        expected.retain(|&(k, _)| k != 4 && k != 6);

        for _ in 0..2 {
            list.check();
            for e in expected.iter_mut() {
                e.1 -= 1;
            }
            expected.retain(|&(_, t)| t > 0);
        }
        for &(key, ticks) in expected.iter() {
            assert_eq!(list.remaining(key), Some(ticks));
        }
        assert_eq!(list.len(), expected.len());
    }

    #[test]
    fn test_full_list_rejects_insert() {
        let mut list: TimerList<u8, 2> = TimerList::new();
        list.insert(1, 1).unwrap();
        list.insert(2, 1).unwrap();
        assert_eq!(list.insert(3, 1), Err(3));
    }

    #[test]
    fn test_timeout_encoding() {
        assert_eq!(Timeout::from(0), Timeout::NoWait);
        assert_eq!(Timeout::from(u32::MAX), Timeout::Forever);
        assert_eq!(Timeout::from(25), Timeout::Ticks(25));
        assert!(Timeout::Ticks(0).is_no_wait());
        assert_eq!(Timeout::Ticks(0).ticks(), None);
        assert_eq!(Timeout::Forever.ticks(), None);
        assert_eq!(Timeout::Ticks(9).ticks(), Some(9));
    }
}
