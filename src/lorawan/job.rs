use super::time::Instant;

/// What the node does when its timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobAction {
    /// Start (or retry) over-the-air activation
    DoJoin,
    /// Send the next application payload
    DoUplink,
}

/// The next thing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduledJob {
    /// When the job becomes due
    pub fire_at: Instant,
    /// What to do
    pub action: JobAction,
}

impl ScheduledJob {
    /// Job firing at `fire_at`
    pub fn new(fire_at: Instant, action: JobAction) -> Self {
        Self { fire_at, action }
    }
}

/// Single-slot timer: arming a job replaces whatever was armed before
#[derive(Debug, Default)]
pub struct JobSlot {
    job: Option<ScheduledJob>,
}

impl JobSlot {
    /// Arm `job`, returning the job it replaced
    pub fn arm(&mut self, job: ScheduledJob) -> Option<ScheduledJob> {
        trace!("arming {:?} at {}", job.action, job.fire_at.ticks());
        self.job.replace(job)
    }

    /// Disarm the slot
    pub fn cancel(&mut self) -> Option<ScheduledJob> {
        self.job.take()
    }

    /// The armed job
    pub fn peek(&self) -> Option<&ScheduledJob> {
        self.job.as_ref()
    }

    /// Take the armed job if it is due at `now`
    pub fn take_due(&mut self, now: Instant) -> Option<ScheduledJob> {
        match self.job {
            Some(job) if now.has_reached(job.fire_at) => self.job.take(),
            _ => None,
        }
    }
}
