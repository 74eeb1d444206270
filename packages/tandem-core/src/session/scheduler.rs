//! Decides when the output device publishes state and queue snapshots.
//!
//! The scheduler only answers "what should go out now"; the engine does the
//! sending. Version ownership stays with the queue: a plan with `queue` set
//! means "bump the queue version, then send the queue".

/// Kind of local mutation that happened on the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// play, pause, seek, volume, mute, shuffle, repeat, track change
    Transport,
    /// Queue contents changed.
    Queue,
}

/// Which snapshots to broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastPlan {
    pub queue: bool,
    pub state: bool,
}

impl BroadcastPlan {
    pub const NONE: Self = Self {
        queue: false,
        state: false,
    };

    pub fn is_empty(&self) -> bool {
        !self.queue && !self.state
    }
}

/// Heartbeat and on-mutation broadcast scheduling.
#[derive(Debug, Default)]
pub struct BroadcastScheduler {
    active: bool,
}

impl BroadcastScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates on entering the output role. Both snapshots go out at once so
    /// controllers do not wait a full heartbeat period.
    pub fn start(&mut self) -> BroadcastPlan {
        self.active = true;
        BroadcastPlan {
            queue: true,
            state: true,
        }
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Heartbeat tick. A paused device does not repeat itself.
    pub fn on_tick(&self, is_playing: bool) -> BroadcastPlan {
        BroadcastPlan {
            queue: false,
            state: self.active && is_playing,
        }
    }

    /// Immediate broadcast after a local mutation.
    pub fn notify(&self, mutation: Mutation) -> BroadcastPlan {
        if !self.active {
            return BroadcastPlan::NONE;
        }
        BroadcastPlan {
            queue: mutation == Mutation::Queue,
            state: true,
        }
    }
}
