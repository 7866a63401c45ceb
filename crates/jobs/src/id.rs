//! Job number allocation.

use crate::types::JobNo;

/// Strictly increasing source of job numbers, starting at 0.
///
/// Owned by the registry loop, which is the only caller of [`next`](Self::next).
#[derive(Debug, Default)]
pub struct JobIdSource {
    next: JobNo,
}

impl JobIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next job number.
    pub fn next(&mut self) -> JobNo {
        let job_no = self.next;
        self.next += 1;
        job_no
    }
}
