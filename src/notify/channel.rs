// src/notify/channel.rs
use tokio::sync::mpsc;

use super::{Alert, DispatchError, NotificationSink};

/// Posts alerts to the presentation loop. Delivery is FIFO per sender and
/// never waits for the receiver.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Alert>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end for the presentation loop.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn dispatch(&self, alert: &Alert) -> Result<(), DispatchError> {
        self.tx
            .send(alert.clone())
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{EventRecord, Importance};
    use chrono::{NaiveDate, NaiveTime};

    fn alert(name: &str) -> Alert {
        Alert::from(&EventRecord {
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            name: name.into(),
            currency: "BRL".into(),
            importance: Importance::Medium,
            forecast: None,
            previous: None,
            actual: None,
        })
    }

    #[test]
    fn posts_in_order() {
        let (sink, mut rx) = ChannelSink::pair();
        sink.dispatch(&alert("one")).unwrap();
        sink.dispatch(&alert("two")).unwrap();
        assert_eq!(rx.try_recv().unwrap().name, "one");
        assert_eq!(rx.try_recv().unwrap().name, "two");
    }

    #[test]
    fn closed_receiver_is_an_error() {
        let (sink, rx) = ChannelSink::pair();
        drop(rx);
        assert!(matches!(
            sink.dispatch(&alert("x")),
            Err(DispatchError::ChannelClosed)
        ));
    }
}
