//! Simulated-time event scheduler.
//!
//! Events are kept in a min-heap ordered by firing time, ties broken by insertion
//! order. Cancellation is lazy: a cancelled event stays in the heap and is skipped
//! when it reaches the top.

use crate::frame::DevAddr;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle returned by [`EventScheduler::schedule`], used to cancel an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What to do when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReceiveWindow1,
    ReceiveWindow2,
    DownlinkTraffic,
}

/// The two Class A receive windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiveWindow {
    Rw1,
    Rw2,
}

impl std::fmt::Display for ReceiveWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiveWindow::Rw1 => write!(f, "RW1"),
            ReceiveWindow::Rw2 => write!(f, "RW2"),
        }
    }
}

/// Receive-window timer pending for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTimer {
    AwaitingRw1 { timer: TimerId, uplink_at: Duration },
    AwaitingRw2 { timer: TimerId, uplink_at: Duration },
}

impl WindowTimer {
    pub fn timer(&self) -> TimerId {
        match *self {
            WindowTimer::AwaitingRw1 { timer, .. } | WindowTimer::AwaitingRw2 { timer, .. } => timer,
        }
    }

    /// Reception time of the uplink that opened the windows.
    pub fn uplink_at(&self) -> Duration {
        match *self {
            WindowTimer::AwaitingRw1 { uplink_at, .. }
            | WindowTimer::AwaitingRw2 { uplink_at, .. } => uplink_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub time: Duration,
    pub id: TimerId,
    pub dev_addr: DevAddr,
    pub kind: EventKind,
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest time first, then insertion order
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct EventScheduler {
    now: Duration,
    heap: BinaryHeap<ScheduledEvent>,
    pending: HashSet<TimerId>,
    next_id: u64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Moves the clock forward. The clock never goes backwards.
    pub fn advance_to(&mut self, time: Duration) {
        if time > self.now {
            self.now = time;
        }
    }

    pub fn schedule(&mut self, dev_addr: DevAddr, delay: Duration, kind: EventKind) -> TimerId {
        self.schedule_at(dev_addr, self.now.saturating_add(delay), kind)
    }

    /// Schedules an event at an absolute time, clamped to now.
    pub fn schedule_at(&mut self, dev_addr: DevAddr, time: Duration, kind: EventKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(ScheduledEvent {
            time: time.max(self.now),
            id,
            dev_addr,
            kind,
        });
        self.pending.insert(id);
        id
    }

    /// Returns `false` if the event already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id)
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.contains(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Firing time of the next live event.
    pub fn next_event_time(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|event| event.time)
    }

    /// Pops the next live event with `time <= until` and advances the clock to it.
    pub fn pop_due(&mut self, until: Duration) -> Option<ScheduledEvent> {
        self.discard_cancelled();
        if self.heap.peek()?.time > until {
            return None;
        }
        let event = self.heap.pop()?;
        self.pending.remove(&event.id);
        self.advance_to(event.time);
        Some(event)
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}
