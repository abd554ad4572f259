// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-size pool of render targets
//!
//! Targets live in an arena indexed by slot. A [`Drawable`] handle grants
//! exclusive use of one slot from `acquire` until it is handed back with
//! `present` or `release`. Presented slots stay in flight until the backend
//! reports their GPU work complete and `reclaim` frees them.

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Acquired,
    InFlight,
}

struct Slot<T> {
    target: T,
    state: SlotState,
}

/// Exclusive handle to one acquired slot
///
/// Not `Clone`: each acquisition is consumed exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Drawable {
    slot: usize,
}

impl Drawable {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

pub struct DrawablePool<T> {
    slots: Vec<Slot<T>>,
    next: usize,
}

impl<T> DrawablePool<T> {
    pub fn new(targets: Vec<T>) -> Self {
        Self {
            slots: targets
                .into_iter()
                .map(|target| Slot {
                    target,
                    state: SlotState::Free,
                })
                .collect(),
            next: 0,
        }
    }

    /// Replace every target, e.g. after a surface resize
    pub fn rebuild(&mut self, targets: Vec<T>) {
        *self = Self::new(targets);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.count(SlotState::Free)
    }

    pub fn in_flight_count(&self) -> usize {
        self.count(SlotState::InFlight)
    }

    fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    /// Take the next free slot in round-robin order
    pub fn acquire(&mut self) -> Option<Drawable> {
        let len = self.slots.len();
        for offset in 0..len {
            let slot = (self.next + offset) % len;
            if self.slots[slot].state == SlotState::Free {
                self.slots[slot].state = SlotState::Acquired;
                self.next = (slot + 1) % len;
                return Some(Drawable { slot });
            }
        }
        None
    }

    pub fn target(&self, drawable: &Drawable) -> &T {
        &self.slots[drawable.slot].target
    }

    /// Hand a rendered drawable to the GPU; it stays unavailable until reclaimed
    pub fn present(&mut self, drawable: Drawable) {
        self.slots[drawable.slot].state = SlotState::InFlight;
    }

    /// Return a drawable that was never presented
    pub fn release(&mut self, drawable: Drawable) {
        self.slots[drawable.slot].state = SlotState::Free;
    }

    /// Free every in-flight slot whose target `is_idle` reports done
    pub fn reclaim(&mut self, mut is_idle: impl FnMut(&T) -> bool) -> usize {
        let mut reclaimed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == SlotState::InFlight && is_idle(&slot.target) {
                slot.state = SlotState::Free;
                reclaimed += 1;
                trace!(slot = index, "Drawable reclaimed");
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_and_exhaustion() {
        let mut pool = DrawablePool::new(vec!['a', 'b']);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(*pool.target(&first), 'a');
        assert_eq!(*pool.target(&second), 'b');
        assert!(pool.acquire().is_none());

        pool.present(first);
        pool.release(second);
        assert_eq!(pool.in_flight_count(), 1);

        // 'b' is free again, 'a' still in flight
        let again = pool.acquire().unwrap();
        assert_eq!(again.slot(), 1);
        pool.release(again);
    }

    #[test]
    fn test_reclaim_only_idle_targets() {
        let mut pool = DrawablePool::new(vec![0u32, 1, 2]);
        for _ in 0..3 {
            let drawable = pool.acquire().unwrap();
            pool.present(drawable);
        }
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.reclaim(|t| *t != 1), 2);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.reclaim(|_| true), 1);
    }

    #[test]
    fn test_empty_pool_never_acquires() {
        let mut pool: DrawablePool<()> = DrawablePool::new(Vec::new());
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
    }
}
