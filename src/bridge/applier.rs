use super::mailbox::UpdateMailbox;
use super::state::{ApplyError, StateStore};
use log::{debug, error};

/// Outcome of one `apply_pending` pass.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Entries written to the state.
    pub applied: usize,
    /// Entries that were rejected; the rest of the batch was still applied.
    pub errors: Vec<ApplyError>,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.errors.is_empty()
    }
}

/// Applies queued worker updates on the consumer thread.
///
/// Call `apply_pending` once per consumer tick, before the state is read.
#[derive(Debug, Clone)]
pub struct StateBridge {
    mailbox: UpdateMailbox,
}

impl StateBridge {
    pub fn new(mailbox: UpdateMailbox) -> Self {
        Self { mailbox }
    }

    pub fn mailbox(&self) -> &UpdateMailbox {
        &self.mailbox
    }

    pub fn apply_pending<S: StateStore + ?Sized>(&self, state: &mut S) -> ApplyReport {
        let mut report = ApplyReport::default();

        for entry in self.mailbox.drain() {
            match state.apply(&entry.key, entry.value) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!("Error processing thread update: {}", e);
                    report.errors.push(e);
                }
            }
        }

        if !report.is_empty() {
            debug!(
                "StateBridge: applied {} update(s), {} rejected",
                report.applied,
                report.errors.len()
            );
        }
        report
    }
}
