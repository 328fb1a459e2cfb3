//! Single-slot "latest result" handoff from the capture worker to readers.

use lookout_core::ProcessedFrame;
use std::sync::Arc;
use tokio::sync::watch;

pub type LatestFrame = Option<Arc<ProcessedFrame>>;

/// Writer side. Holds at most one result; newer results replace older
/// unread ones and stale results are dropped.
pub struct LatestSlot {
    tx: watch::Sender<LatestFrame>,
}

impl LatestSlot {
    pub fn new() -> (Self, watch::Receiver<LatestFrame>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Publish `result` unless the slot already holds the same or a newer
    /// frame. Returns whether the slot changed.
    pub fn publish(&self, result: ProcessedFrame) -> bool {
        let sequence = result.frame.sequence;
        let published = self.tx.send_if_modified(|slot| match slot {
            Some(current) if current.frame.sequence >= sequence => false,
            _ => {
                *slot = Some(Arc::new(result));
                true
            }
        });
        if !published {
            tracing::debug!(sequence, "dropping stale result");
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::Frame;

    fn result(sequence: u64) -> ProcessedFrame {
        ProcessedFrame {
            frame: Frame::new(vec![0u8; 4], 2, 2, sequence),
            detections: Vec::new(),
        }
    }

    #[test]
    fn test_newer_overwrites_unread() {
        let (slot, rx) = LatestSlot::new();
        assert!(slot.publish(result(1)));
        assert!(slot.publish(result(2)));
        let latest = rx.borrow().clone().unwrap();
        assert_eq!(latest.frame.sequence, 2);
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let (slot, rx) = LatestSlot::new();
        assert!(slot.publish(result(5)));
        assert!(!slot.publish(result(4)));
        assert!(!slot.publish(result(5)));
        assert_eq!(rx.borrow().as_ref().unwrap().frame.sequence, 5);
    }

    #[tokio::test]
    async fn test_reader_is_notified() {
        let (slot, mut rx) = LatestSlot::new();
        let waiter = tokio::spawn(async move {
            rx.changed().await.unwrap();
            rx.borrow().as_ref().map(|r| r.frame.sequence)
        });
        slot.publish(result(9));
        assert_eq!(waiter.await.unwrap(), Some(9));
    }
}
