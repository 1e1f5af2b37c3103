//! Shared holder of the charger state.

use std::sync::Arc;

use parking_lot::RwLock;

use super::reducer::ChargePointState;
use super::snapshot::StateSnapshot;
use crate::application::events::{Event, SharedEventBus};

pub struct StateStore {
    state: RwLock<ChargePointState>,
    events: SharedEventBus,
}

pub type SharedStateStore = Arc<StateStore>;

impl StateStore {
    pub fn new(events: SharedEventBus) -> Self {
        Self {
            state: RwLock::new(ChargePointState::default()),
            events,
        }
    }

    /// Run `mutate` under the write lock. When it reports a change, exactly
    /// one [`Event::StateChanged`] is published after the lock is released.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut ChargePointState) -> (bool, R)) -> R {
        let (changed, result) = {
            let mut state = self.state.write();
            mutate(&mut state)
        };
        if changed {
            metrics::counter!("ocpp_state_changes_total").increment(1);
            self.events.publish(Event::StateChanged);
        }
        result
    }

    /// [`update`](Self::update) for mutations that only report a change flag.
    pub fn apply(&self, mutate: impl FnOnce(&mut ChargePointState) -> bool) -> bool {
        self.update(|state| {
            let changed = mutate(state);
            (changed, changed)
        })
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChargePointState) -> R) -> R {
        f(&self.state.read())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from(&*self.state.read())
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }
}
