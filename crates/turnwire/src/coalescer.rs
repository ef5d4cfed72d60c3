use std::time::Duration;

use tokio::time::Instant;

/// Text accumulated for one assistant message, ready to be appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextBatch {
    pub message_id: String,
    pub text: String,
}

/// Debounces consecutive text fragments into fewer log mutations.
///
/// The coalescer owns its deadline but never sleeps itself: the driver waits
/// on [`TextCoalescer::deadline`] and calls [`TextCoalescer::flush`] when it
/// passes, and calls the same `flush` at end of stream.
#[derive(Debug)]
pub struct TextCoalescer {
    window: Duration,
    pending: String,
    active_id: Option<String>,
    deadline: Option<Instant>,
}

impl TextCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: String::new(),
            active_id: None,
            deadline: None,
        }
    }

    /// Buffers `fragment` for `message_id` and re-arms the deadline.
    ///
    /// If the fragment targets a different message than the buffered text,
    /// the buffered text is returned first so it can be applied before the
    /// new fragment.
    pub fn push(&mut self, message_id: &str, fragment: &str) -> Option<TextBatch> {
        let flushed = match self.active_id.as_deref() {
            Some(active) if active != message_id => self.flush(),
            _ => None,
        };
        if self.active_id.is_none() {
            self.active_id = Some(message_id.to_string());
        }
        self.pending.push_str(fragment);
        self.deadline = Some(Instant::now() + self.window);
        flushed
    }

    /// Takes whatever is buffered, regardless of which message is active.
    pub fn flush(&mut self) -> Option<TextBatch> {
        self.deadline = None;
        let message_id = self.active_id.take()?;
        if self.pending.is_empty() {
            return None;
        }
        Some(TextBatch {
            message_id,
            text: std::mem::take(&mut self.pending),
        })
    }

    /// Drops buffered text without applying it.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.active_id = None;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn consecutive_fragments_flush_as_one_batch() {
        let mut coalescer = TextCoalescer::new(Duration::from_millis(30));
        assert!(coalescer.push("m1", "Hel").is_none());
        assert!(coalescer.push("m1", "lo").is_none());

        let batch = coalescer.flush().expect("batch");
        assert_eq!(batch.message_id, "m1");
        assert_eq!(batch.text, "Hello");
        assert!(coalescer.flush().is_none());
        assert!(coalescer.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_message_flushes_previous_batch_first() {
        let mut coalescer = TextCoalescer::new(Duration::from_millis(30));
        coalescer.push("m1", "a");
        let previous = coalescer.push("m2", "b").expect("previous batch");
        assert_eq!(
            previous,
            TextBatch {
                message_id: "m1".into(),
                text: "a".into()
            }
        );
        let current = coalescer.flush().expect("current batch");
        assert_eq!(current.message_id, "m2");
        assert_eq!(current.text, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn each_push_re_arms_the_deadline() {
        let mut coalescer = TextCoalescer::new(Duration::from_millis(30));
        coalescer.push("m1", "a");
        let first = coalescer.deadline().expect("armed");
        tokio::time::advance(Duration::from_millis(20)).await;
        coalescer.push("m1", "b");
        let second = coalescer.deadline().expect("re-armed");
        assert_eq!(second - first, Duration::from_millis(20));
    }

    #[test]
    fn clear_discards_buffered_text() {
        let mut coalescer = TextCoalescer::new(Duration::from_millis(30));
        coalescer.push("m1", "kept?");
        assert!(!coalescer.is_empty());
        coalescer.clear();
        assert!(coalescer.is_empty());
        assert!(coalescer.flush().is_none());
    }
}
