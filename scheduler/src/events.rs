use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use shared::errors::HostError;

/// Position of a render job in the batch (0-based, in camera list order).
pub type JobOrdinal = usize;

/// Work a job asks the host to hand back to it later, instead of a callback closure.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeferredAction {
    /// Mark the job as running. Deferred so that it is ordered with every other host interaction.
    MarkRunning { job: JobOrdinal },

    /// Consume the next pending frame of the job.
    AdvanceFrame { job: JobOrdinal },
}

impl DeferredAction {
    pub fn job(&self) -> JobOrdinal {
        match self {
            DeferredAction::MarkRunning { job } => *job,
            DeferredAction::AdvanceFrame { job } => *job,
        }
    }
}


/// Everything the host delivers to the scheduler, one event at a time.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SchedulerEvent {
    /// Periodic poll from the registered tick source.
    Tick,

    /// The outstanding render finished and its output was written.
    RenderComplete,

    /// The user cancelled rendering.
    RenderCancelled,

    /// The outstanding render was accepted by the host, but failed afterwards.
    RenderFailed(HostError),

    Deferred(DeferredAction),
}


/// How a submitted render ended, as observed by a host implementation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RenderOutcome {
    Completed,
    Cancelled,
    Failed(HostError),
}


#[derive(Clone, Debug)]
enum QueueEntry {
    Tick { generation: u64 },
    Event(SchedulerEvent),
}

#[derive(Clone, Debug)]
struct TimedEntry {
    due: Duration,
    sequence: u64,
    entry: QueueEntry,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, we want the earliest (due, sequence) on top.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}


/// Timer and callback bookkeeping shared by host implementations.
///
/// Times are offsets from the host's own epoch (a virtual clock or the host's start instant).
/// Events due at the same time are delivered in the order they were scheduled, and due events
/// are delivered before a due tick.
#[derive(Debug, Default)]
pub struct HostEventQueue {
    timers: BinaryHeap<TimedEntry>,
    next_sequence: u64,

    tick_interval: Option<Duration>,
    tick_generation: u64,

    post_render_armed: bool,
    cancel_armed: bool,
}

impl HostEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, due: Duration, entry: QueueEntry) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.timers.push(TimedEntry {
            due,
            sequence,
            entry,
        });
    }

    pub fn schedule(&mut self, now: Duration, event: SchedulerEvent, delay: Duration) {
        self.push(now + delay, QueueEntry::Event(event));
    }

    pub fn schedule_deferred(&mut self, now: Duration, action: DeferredAction, delay: Duration) {
        self.schedule(now, SchedulerEvent::Deferred(action), delay);
    }

    /// Starts delivering `Tick` every `interval`, the first one `interval` from now.
    /// Re-registering replaces the previous tick source.
    pub fn register_tick_source(&mut self, now: Duration, interval: Duration) {
        self.tick_generation += 1;
        self.tick_interval = Some(interval);

        self.push(
            now + interval,
            QueueEntry::Tick {
                generation: self.tick_generation,
            },
        );
    }

    /// Ticks that are already queued are dropped when they come due.
    pub fn unregister_tick_source(&mut self) {
        self.tick_generation += 1;
        self.tick_interval = None;
    }

    pub fn is_tick_source_registered(&self) -> bool {
        self.tick_interval.is_some()
    }

    pub fn arm_post_render(&mut self) {
        self.post_render_armed = true;
    }

    pub fn is_post_render_armed(&self) -> bool {
        self.post_render_armed
    }

    pub fn arm_cancel(&mut self) {
        self.cancel_armed = true;
    }

    pub fn disarm_cancel(&mut self) {
        self.cancel_armed = false;
    }

    pub fn is_cancel_armed(&self) -> bool {
        self.cancel_armed
    }

    /// Turns the end of a render into the matching event, delivered at `at`.
    /// Completion is only delivered once per `arm_post_render`; cancellation only while a cancel
    /// callback is armed.
    pub fn render_finished(&mut self, at: Duration, outcome: RenderOutcome) {
        let was_armed = std::mem::replace(&mut self.post_render_armed, false);

        match outcome {
            RenderOutcome::Completed => {
                if was_armed {
                    self.push(at, QueueEntry::Event(SchedulerEvent::RenderComplete));
                }
            }
            RenderOutcome::Cancelled => self.user_cancelled(at),
            RenderOutcome::Failed(error) => {
                self.push(at, QueueEntry::Event(SchedulerEvent::RenderFailed(error)));
            }
        }
    }

    /// A cancel request that did not come from a render (e.g. an interrupt signal).
    pub fn user_cancelled(&mut self, at: Duration) {
        if self.cancel_armed {
            self.push(at, QueueEntry::Event(SchedulerEvent::RenderCancelled));
        }
    }

    /// When the earliest queued entry comes due, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.peek().map(|timed| timed.due)
    }

    pub fn has_pending_entries(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Whether anything other than a tick is still queued.
    pub fn has_pending_events(&self) -> bool {
        self.timers
            .iter()
            .any(|timed| matches!(timed.entry, QueueEntry::Event(_)))
    }

    /// Pops the next entry that is due at `now`, re-arming the tick source on each tick.
    ///
    /// Due events always come before a due tick, even one that was due earlier: a host that
    /// falls behind must not let a tick overtake the deferred actions queued before it.
    pub fn pop_due(&mut self, now: Duration) -> Option<SchedulerEvent> {
        let mut due_tick: Option<(Duration, u64)> = None;

        while let Some(timed) = self.timers.peek() {
            if timed.due > now {
                break;
            }

            let timed = self.timers.pop()?;

            match timed.entry {
                QueueEntry::Event(event) => {
                    if let Some((due, sequence)) = due_tick {
                        self.timers.push(TimedEntry {
                            due,
                            sequence,
                            entry: QueueEntry::Tick {
                                generation: self.tick_generation,
                            },
                        });
                    }
                    return Some(event);
                }
                QueueEntry::Tick { generation } => {
                    let is_current =
                        self.tick_interval.is_some() && generation == self.tick_generation;

                    if is_current && due_tick.is_none() {
                        due_tick = Some((timed.due, timed.sequence));
                    }
                }
            }
        }

        if due_tick.is_none() {
            return None;
        }
        let interval = self.tick_interval?;

        self.push(
            now + interval,
            QueueEntry::Tick {
                generation: self.tick_generation,
            },
        );

        Some(SchedulerEvent::Tick)
    }
}
