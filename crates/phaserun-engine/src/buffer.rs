use std::time::Duration;

use tokio::time::Instant;

/// Per-task accumulator that coalesces content fragments into debounced
/// flushes.
///
/// The first fragment after a flush arms a deadline `interval` in the future;
/// everything appended before the deadline is surfaced together. Terminal
/// paths call [`OutputBuffer::flush`] directly, which ignores the deadline.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    interval: Duration,
    deadline: Option<Instant>,
}

impl OutputBuffer {
    pub fn new(interval: Duration) -> Self {
        Self {
            text: String::new(),
            interval,
            deadline: None,
        }
    }

    pub fn push(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.text.push_str(fragment);
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    /// When the pending fragments are due, if any are pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Debounced flush: returns the accumulated text only if something was
    /// appended since the last flush.
    pub fn take_due(&mut self) -> Option<String> {
        self.deadline.take().map(|_| self.text.clone())
    }

    /// Unconditional flush used on every terminal path.
    pub fn flush(&mut self) -> String {
        self.deadline = None;
        self.text.clone()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_fragment_arms_deadline() {
        let mut buf = OutputBuffer::new(Duration::from_millis(50));
        assert!(buf.deadline().is_none());

        let before = Instant::now();
        buf.push("a");
        let deadline = buf.deadline().unwrap();
        assert_eq!(deadline - before, Duration::from_millis(50));

        tokio::time::advance(Duration::from_millis(10)).await;
        buf.push("b");
        assert_eq!(buf.deadline(), Some(deadline), "later fragments do not re-arm");
    }

    #[tokio::test(start_paused = true)]
    async fn take_due_coalesces_and_clears() {
        let mut buf = OutputBuffer::new(Duration::from_millis(50));
        buf.push("he");
        buf.push("llo");
        assert_eq!(buf.take_due().as_deref(), Some("hello"));
        assert!(buf.deadline().is_none());
        assert_eq!(buf.take_due(), None);

        buf.push(" world");
        assert_eq!(buf.take_due().as_deref(), Some("hello world"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_is_unconditional() {
        let mut buf = OutputBuffer::new(Duration::from_secs(60));
        assert_eq!(buf.flush(), "");
        buf.push("tail");
        assert_eq!(buf.flush(), "tail");
        assert!(buf.deadline().is_none());
        assert_eq!(buf.text(), "tail");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_fragments_do_not_dirty() {
        let mut buf = OutputBuffer::new(Duration::from_millis(50));
        buf.push("");
        assert!(buf.deadline().is_none());
    }
}
