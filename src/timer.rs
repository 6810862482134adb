//! Shared discrete clock.
//!
//! Every participant (each core and the loader) holds a [`TickHandle`].
//! Calling [`TickHandle::next_slot`] reports that the participant has
//! finished the current tick and blocks until all attached participants
//! have done the same; the last one to arrive advances the clock and wakes
//! the others. Dropping a handle detaches it, which can itself complete a
//! round the remaining participants are waiting on.
//!
//! Each handle also has a seat, given out in attach order. Within a tick,
//! [`TickHandle::wait_turn`] holds a participant back until every attached
//! participant with a lower seat has finished the tick, so work done
//! between `wait_turn` and `next_slot` runs in seat order on every run.

use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// The clock moved on; carries the new tick.
    Advanced(u64),
    /// The deadline was reached. No further ticks will be released.
    Expired(u64),
}

#[derive(Debug, Default)]
struct ClockState {
    tick: u64,
    next_seat: usize,
    /// Seats currently attached.
    active: BTreeSet<usize>,
    /// Seats that finished the current tick.
    arrived: BTreeSet<usize>,
    generation: u64,
    expired: bool,
}

impl ClockState {
    fn all_arrived(&self) -> bool {
        self.arrived.len() >= self.active.len()
    }

    fn earlier_pending(&self, seat: usize) -> bool {
        self.active.range(..seat).any(|s| !self.arrived.contains(s))
    }
}

#[derive(Debug)]
pub struct TickCoordinator {
    state: Mutex<ClockState>,
    released: Condvar,
    deadline: Option<u64>,
}

impl TickCoordinator {
    pub fn new(deadline: Option<u64>) -> Arc<Self> {
        Arc::new(TickCoordinator {
            state: Mutex::new(ClockState::default()),
            released: Condvar::new(),
            deadline,
        })
    }

    /// Register a new participant. It takes part from the current tick on.
    pub fn attach(self: &Arc<Self>) -> TickHandle {
        let mut state = self.lock();
        let seat = state.next_seat;
        state.next_seat += 1;
        state.active.insert(seat);
        TickHandle {
            clock: Arc::clone(self),
            seat,
        }
    }

    pub fn current_time(&self) -> u64 {
        self.lock().tick
    }

    pub fn participants(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_expired(&self) -> bool {
        self.lock().expired
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        // The state is plain counters; a panicking participant cannot leave
        // it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, state: &ClockState) -> TickStatus {
        if state.expired {
            TickStatus::Expired(state.tick)
        } else {
            TickStatus::Advanced(state.tick)
        }
    }

    fn release(&self, state: &mut ClockState) {
        state.arrived.clear();
        state.tick += 1;
        state.generation = state.generation.wrapping_add(1);
        if self.deadline.is_some_and(|limit| state.tick >= limit) {
            state.expired = true;
        }
        self.released.notify_all();
    }

    fn wait_turn(&self, seat: usize) {
        let state = self.lock();
        let _state = self
            .released
            .wait_while(state, |s| !s.expired && s.earlier_pending(seat))
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn arrive(&self, seat: usize) -> TickStatus {
        let mut state = self.lock();
        if state.expired {
            return self.status(&state);
        }

        state.arrived.insert(seat);
        if state.all_arrived() {
            self.release(&mut state);
            return self.status(&state);
        }
        // Later seats may be waiting for their turn
        self.released.notify_all();

        let generation = state.generation;
        let state = self
            .released
            .wait_while(state, |s| s.generation == generation && !s.expired)
            .unwrap_or_else(PoisonError::into_inner);
        self.status(&state)
    }

    fn detach(&self, seat: usize) {
        let mut state = self.lock();
        state.active.remove(&seat);
        state.arrived.remove(&seat);
        if !state.arrived.is_empty() && state.all_arrived() && !state.expired {
            self.release(&mut state);
        } else {
            self.released.notify_all();
        }
    }
}

/// One participant's membership in the clock.
#[derive(Debug)]
pub struct TickHandle {
    clock: Arc<TickCoordinator>,
    seat: usize,
}

impl TickHandle {
    /// Block until every lower seat has finished the current tick.
    pub fn wait_turn(&self) {
        self.clock.wait_turn(self.seat);
    }

    /// Finish the current tick and wait for the next one.
    pub fn next_slot(&self) -> TickStatus {
        self.clock.arrive(self.seat)
    }

    pub fn current_time(&self) -> u64 {
        self.clock.current_time()
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.clock.detach(self.seat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    #[test]
    fn test_single_participant_advances_alone() {
        let clock = TickCoordinator::new(None);
        let handle = clock.attach();

        assert_eq!(handle.current_time(), 0);
        assert_eq!(handle.next_slot(), TickStatus::Advanced(1));
        assert_eq!(handle.next_slot(), TickStatus::Advanced(2));
        assert_eq!(clock.current_time(), 2);
    }

    #[test]
    fn test_deadline_expires() {
        let clock = TickCoordinator::new(Some(3));
        let handle = clock.attach();

        assert_eq!(handle.next_slot(), TickStatus::Advanced(1));
        assert_eq!(handle.next_slot(), TickStatus::Advanced(2));
        assert_eq!(handle.next_slot(), TickStatus::Expired(3));
        // Stays expired, the clock no longer moves
        assert_eq!(handle.next_slot(), TickStatus::Expired(3));
        assert!(clock.is_expired());
    }

    #[test]
    fn test_detach_releases_waiters() {
        let clock = TickCoordinator::new(None);
        let stays = clock.attach();
        let leaves = clock.attach();
        assert_eq!(clock.participants(), 2);

        let waiter = thread::spawn(move || stays.next_slot());
        // Wait until the waiter has checked in
        while clock.lock().arrived.is_empty() {
            thread::yield_now();
        }
        drop(leaves);

        assert_eq!(waiter.join().unwrap(), TickStatus::Advanced(1));
        assert_eq!(clock.participants(), 0);
    }

    #[test]
    fn test_lock_step_across_participants() {
        const PARTICIPANTS: usize = 5;
        const ROUNDS: u64 = 50;

        let clock = TickCoordinator::new(None);
        let start = Arc::new(Barrier::new(PARTICIPANTS));
        // Per round, how many participants have finished their work.
        let done: Arc<Vec<AtomicU64>> = Arc::new((0..ROUNDS).map(|_| AtomicU64::new(0)).collect());

        let handles: Vec<_> = (0..PARTICIPANTS).map(|_| clock.attach()).collect();
        let workers: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                let start = Arc::clone(&start);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    start.wait();
                    for round in 0..ROUNDS {
                        assert_eq!(handle.current_time(), round);
                        done[round as usize].fetch_add(1, Ordering::SeqCst);
                        let status = handle.next_slot();
                        // Nobody sees tick k+1 before all have finished tick k
                        assert_eq!(done[round as usize].load(Ordering::SeqCst), PARTICIPANTS as u64);
                        assert_eq!(status, TickStatus::Advanced(round + 1));
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(clock.current_time(), ROUNDS);
    }

    #[test]
    fn test_participant_leaving_mid_run() {
        let clock = TickCoordinator::new(None);
        let short = clock.attach();
        let long = clock.attach();

        let short = thread::spawn(move || {
            for _ in 0..3 {
                short.next_slot();
            }
        });
        let long = thread::spawn(move || {
            for _ in 0..10 {
                long.next_slot();
            }
        });

        short.join().unwrap();
        long.join().unwrap();
        assert_eq!(clock.current_time(), 10);
    }

    #[test]
    fn test_turns_follow_seat_order() {
        const PARTICIPANTS: usize = 4;
        const ROUNDS: u64 = 30;

        let clock = TickCoordinator::new(None);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..PARTICIPANTS).map(|_| clock.attach()).collect();

        // Spawn in reverse so thread start order works against seat order
        let workers: Vec<_> = handles
            .into_iter()
            .enumerate()
            .rev()
            .map(|(seat, handle)| {
                let order = Arc::clone(&order);
                thread::spawn(move || {
                    // The last seat leaves early, the others must not wait on it
                    let rounds = if seat == PARTICIPANTS - 1 { ROUNDS / 2 } else { ROUNDS };
                    for _ in 0..rounds {
                        handle.wait_turn();
                        order.lock().unwrap().push((handle.current_time(), seat));
                        handle.next_slot();
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }

        let order = order.lock().unwrap().clone();
        let mut expected = order.clone();
        expected.sort();
        assert_eq!(order, expected);
        assert_eq!(order.len(), (PARTICIPANTS - 1) * ROUNDS as usize + ROUNDS as usize / 2);
    }
}
