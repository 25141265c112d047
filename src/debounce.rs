//! Coalesces bursts of refresh requests into one deadline

#[derive(Clone, Debug, PartialEq)]
pub struct Debounce {
    delay: f64,
    due: Option<f64>,
}

impl Debounce {
    /// `delay` in seconds
    pub fn new(delay: f64) -> Self {
        Self { delay, due: None }
    }

    /// Request a refresh. The first request sets the deadline; requests
    /// before it fires are folded into it.
    pub fn schedule(&mut self, now: f64) {
        if self.due.is_none() {
            self.due = Some(now + self.delay);
        }
    }

    /// Request a refresh on the next `take_due`
    pub fn trigger(&mut self, now: f64) {
        self.due = Some(self.due.map_or(now, |due| due.min(now)));
    }

    /// Consume the deadline if it has passed
    pub fn take_due(&mut self, now: f64) -> bool {
        match self.due {
            Some(due) if due <= now => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    pub fn due(&self) -> Option<f64> {
        self.due
    }
}
