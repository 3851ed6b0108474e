//! Channel-backed notification sink
//!
//! Hands notifications to a delivery task over a bounded channel. Sending
//! never waits: a full channel is reported as an error for the action.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::NotifyMethod;
use crate::ports::outbound::{NotificationPayload, NotificationSink, NotifyError};

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Message handed to the delivery task
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub target: String,
    pub method: NotifyMethod,
    pub payload: NotificationPayload,
}

pub struct ChannelNotificationSink {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotificationSink {
    /// Create the sink and the receiving end for the delivery task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn send(
        &self,
        target: &str,
        method: NotifyMethod,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        let notification = Notification {
            target: target.to_string(),
            method,
            payload: payload.clone(),
        };
        self.sender.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::ChannelFull,
            TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TicketSnapshot;
    use chrono::Utc;

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let (sink, mut receiver) = ChannelNotificationSink::new(1);
        let ticket = TicketSnapshot::new("T-1", Utc::now());
        let payload = NotificationPayload::for_ticket("notify", &ticket);

        sink.send("a@example.com", NotifyMethod::Email, &payload).unwrap();
        assert_eq!(
            sink.send("b@example.com", NotifyMethod::Email, &payload),
            Err(NotifyError::ChannelFull)
        );

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.target, "a@example.com");

        drop(receiver);
        assert_eq!(
            sink.send("c@example.com", NotifyMethod::Sms, &payload),
            Err(NotifyError::Closed)
        );
    }
}
