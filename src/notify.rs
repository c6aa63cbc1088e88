use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::Span;

const CHANNEL_CAPACITY: usize = 256;

/// Something a user should hear about. Carries the denormalized fields so
/// delivery never has to read engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    BookingConfirmed {
        booking_id: Ulid,
        email: String,
        name: String,
        building: String,
        room: String,
        date: NaiveDate,
        span: Span,
    },
    BookingCancelled {
        booking_id: Ulid,
        email: String,
        name: String,
        building: String,
        room: String,
        date: NaiveDate,
        span: Span,
        reason: String,
    },
    AccountSuspended {
        email: String,
        name: String,
        reason: String,
    },
}

impl Notice {
    pub fn recipient(&self) -> &str {
        match self {
            Notice::BookingConfirmed { email, .. }
            | Notice::BookingCancelled { email, .. }
            | Notice::AccountSuspended { email, .. } => email,
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Notice::BookingConfirmed { .. } => "Booking Confirmation",
            Notice::BookingCancelled { .. } => "Booking Cancellation Notice",
            Notice::AccountSuspended { .. } => "Account Suspended",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notice::BookingConfirmed { name, building, room, date, span, .. } => format!(
                "Dear {name}, your booking for {room} in {building} on {date} {span} is confirmed."
            ),
            Notice::BookingCancelled { name, building, room, date, reason, .. } => format!(
                "Dear {name}, your booking for {room} in {building} on {date} has been canceled for the following reason: {reason}"
            ),
            Notice::AccountSuspended { name, reason, .. } => format!(
                "Dear {name}, your account has been suspended for the following reason: {reason}"
            ),
        }
    }
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound delivery of notices. The engine spawns each delivery and only
/// logs failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notice: Notice) -> Result<(), NotifyError>;
}

/// Broadcast hub for in-process subscribers.
pub struct NotifyHub {
    sender: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for NotifyHub {
    /// No-op if nobody is listening.
    async fn deliver(&self, notice: Notice) -> Result<(), NotifyError> {
        let _ = self.sender.send(notice);
        Ok(())
    }
}

/// Drain the hub into the log. Stands in for the mail relay.
pub async fn run_mail_log(mut rx: broadcast::Receiver<Notice>) {
    loop {
        match rx.recv().await {
            Ok(notice) => {
                info!("mail to {}: [{}] {}", notice.recipient(), notice.subject(), notice.body());
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("mail log lagged, {skipped} notices dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended(reason: &str) -> Notice {
        Notice::AccountSuspended {
            email: "ada@campus.edu".into(),
            name: "Ada".into(),
            reason: reason.into(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();

        let notice = suspended("spam");
        hub.deliver(notice.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, notice);
    }

    #[tokio::test]
    async fn deliver_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        assert!(hub.deliver(suspended("spam")).await.is_ok());
    }

    #[test]
    fn cancellation_body_carries_reason() {
        let notice = Notice::BookingCancelled {
            booking_id: Ulid::new(),
            email: "ada@campus.edu".into(),
            name: "Ada".into(),
            building: "Engineering".into(),
            room: "E-101".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            span: Span::new("10:00".parse().unwrap(), "11:00".parse().unwrap()),
            reason: "plans changed".into(),
        };
        assert_eq!(notice.recipient(), "ada@campus.edu");
        assert_eq!(notice.subject(), "Booking Cancellation Notice");
        let body = notice.body();
        assert!(body.contains("E-101"));
        assert!(body.contains("Engineering"));
        assert!(body.contains("plans changed"));
    }
}
