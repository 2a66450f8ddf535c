//! Optimistic update bookkeeping for a single entity.
//!
//! A [`Tracked`] value keeps two copies of an entity's state: the last value
//! the server confirmed and the value currently displayed, which may include
//! an in-flight prediction. Every mutation gets a sequence number from
//! [`Tracked::begin`]; only the completion of the newest mutation is allowed to
//! change the displayed value. Older completions can still advance the
//! confirmed baseline, so a later rollback lands on the freshest server truth.
//!
//! A value counts as pending while any of its mutations is still in flight,
//! not only the newest one. Fetched data is refused until all of them
//! complete, so an older success can never be discarded by a snapshot taken
//! before it landed.

/// Lifecycle of the latest mutation issued for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// No mutation has been issued since the entity was loaded.
    Idle,
    /// The newest mutation is in flight.
    Pending,
    /// The newest mutation succeeded.
    Confirmed,
    /// The newest mutation failed and the display fell back to the confirmed value.
    RolledBack,
}

/// Outcome of feeding a completion into a [`Tracked`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The completion belonged to the newest mutation and updated the display.
    Applied,
    /// A newer mutation was issued meanwhile; the display was left alone.
    Superseded,
}

pub type MutationSeq = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<T> {
    confirmed: T,
    displayed: T,
    confirmed_seq: MutationSeq,
    latest_seq: MutationSeq,
    in_flight: u32,
    phase: MutationPhase,
}

impl<T: Clone> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            confirmed: value.clone(),
            displayed: value,
            confirmed_seq: 0,
            latest_seq: 0,
            in_flight: 0,
            phase: MutationPhase::Idle,
        }
    }

    pub fn displayed(&self) -> &T {
        &self.displayed
    }

    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// True while any mutation, newest or older, awaits its completion.
    pub fn is_pending(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Displays `predicted` and returns the sequence number of the new mutation.
    pub fn begin(&mut self, predicted: T) -> MutationSeq {
        self.latest_seq += 1;
        self.in_flight += 1;
        self.displayed = predicted;
        self.phase = MutationPhase::Pending;
        self.latest_seq
    }

    /// Records the server's answer to mutation `seq`.
    pub fn confirm(&mut self, seq: MutationSeq, value: T) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        let advances_baseline = seq > self.confirmed_seq;
        if advances_baseline {
            self.confirmed = value.clone();
            self.confirmed_seq = seq;
        }

        if seq == self.latest_seq {
            self.displayed = value;
            self.phase = MutationPhase::Confirmed;
            return Completion::Applied;
        }

        // A rolled back display mirrors the baseline, keep it that way.
        if advances_baseline && self.phase == MutationPhase::RolledBack {
            self.displayed = self.confirmed.clone();
        }
        Completion::Superseded
    }

    /// Records the failure of mutation `seq`.
    pub fn fail(&mut self, seq: MutationSeq) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        if seq != self.latest_seq {
            return Completion::Superseded;
        }
        self.displayed = self.confirmed.clone();
        self.phase = MutationPhase::RolledBack;
        Completion::Applied
    }

    /// Replaces the entity with freshly fetched server data.
    ///
    /// Ignored while any mutation is in flight, the pending completions will
    /// reconcile instead. Returns whether the value was taken.
    pub fn refresh(&mut self, value: T) -> bool {
        if self.is_pending() {
            return false;
        }
        self.confirmed = value.clone();
        self.displayed = value;
        self.confirmed_seq = self.latest_seq;
        true
    }
}
