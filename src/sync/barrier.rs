use log::*;
use parking_lot::{Condvar, Mutex};
use std::fmt;

struct Round {
    arrived: usize,
    generation: u64,
}

///
/// Reusable rendezvous point for a fixed number of parties.
///
/// Every `parties`-th call to [`wait`](CyclicBarrier::wait) releases the whole round
/// and resets the barrier for the next one. A party that never arrives keeps the
/// others parked; abandonment is not detected.
pub struct CyclicBarrier {
    parties: usize,
    round: Mutex<Round>,
    cvar: Condvar,
}

///
/// Returned by [`CyclicBarrier::wait`]. Exactly one party per round is the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// The arrival that tripped the barrier.
    #[inline]
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Round this party took part in, starting at 0.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl CyclicBarrier {
    /// A barrier for zero parties behaves like one for a single party.
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            round: Mutex::new(Round {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties parked in the current round.
    #[inline]
    pub fn waiting(&self) -> usize {
        self.round.lock().arrived
    }

    ///
    /// Block until `parties` threads are waiting, then release all of them.
    pub fn wait(&self) -> BarrierWaitResult {
        let mut round = self.round.lock();
        let generation = round.generation;
        round.arrived += 1;

        if round.arrived == self.parties {
            round.arrived = 0;
            round.generation = round.generation.wrapping_add(1);
            trace!("barrier::tripped::{}", generation);
            self.cvar.notify_all();
            return BarrierWaitResult {
                leader: true,
                generation,
            };
        }

        while round.generation == generation {
            self.cvar.wait(&mut round);
        }
        BarrierWaitResult {
            leader: false,
            generation,
        }
    }
}

impl fmt::Debug for CyclicBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("waiting", &self.waiting())
            .finish()
    }
}
