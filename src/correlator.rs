// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The Request Correlator: a map from correlation id to a single-slot
//! rendezvous, backing REQ's timed wait for a matching REP.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AxonError, Result};
use crate::field::Message;

/// The in-process reduction of the original `"<pid>:<seq>"` correlation
/// id: there is exactly one process here, so the sequence number alone
/// is already unique. See the id sequence on the REQ endpoint for where
/// the numeric part comes from.
pub type CorrelationId = String;

#[derive(Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<CorrelationId, mpsc::Sender<Message>>>,
}

impl RequestCorrelator {
    pub fn new() -> RequestCorrelator {
        RequestCorrelator::default()
    }

    /// Allocates a completion slot for `id`. Must happen before the
    /// request is sent, so a reply that arrives unusually fast can never
    /// race ahead of slot creation.
    pub fn register(&self, id: CorrelationId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel();
        self.pending.lock().unwrap().insert(id, tx);
        rx
    }

    /// Best-effort delivery to the slot named `id`. Silently dropped if
    /// the requester already timed out and removed its slot — the
    /// sender side of a disconnected channel just swallows the send.
    pub fn fulfil(&self, id: &str, msg: Message) {
        let tx = self.pending.lock().unwrap().remove(id);
        if let Some(tx) = tx {
            let _ = tx.send(msg);
        }
    }

    /// Waits on `rx` up to `timeout`. The slot named `id` is removed
    /// either way, so `fulfil` arriving after a timeout is a no-op.
    pub fn await_reply(&self, id: &str, rx: mpsc::Receiver<Message>, timeout: Duration) -> Result<Message> {
        let result = rx.recv_timeout(timeout);
        self.pending.lock().unwrap().remove(id);
        result.map_err(|_| AxonError::Timeout)
    }

    /// Removes the slot named `id` without waiting on it. Used when the
    /// send that would have produced a reply already failed, so there is
    /// no point waiting out the full timeout for a reply that can never
    /// arrive.
    pub fn cancel(&self, id: &str) {
        self.pending.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fulfil_before_await_is_delivered() {
        let correlator = RequestCorrelator::new();
        let rx = correlator.register("1".to_owned());
        correlator.fulfil("1", Message::from_fields(vec![Field::Str("pong".into())]));

        let msg = correlator.await_reply("1", rx, Duration::from_millis(100)).unwrap();
        assert_eq!(msg.fields(), &[Field::Str("pong".into())]);
    }

    #[test]
    fn fulfil_from_another_thread_while_awaiting() {
        let correlator = Arc::new(RequestCorrelator::new());
        let rx = correlator.register("7".to_owned());

        let c = correlator.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c.fulfil("7", Message::from_fields(vec![Field::BigInt(42)]));
        });

        let msg = correlator.await_reply("7", rx, Duration::from_secs(1)).unwrap();
        assert_eq!(msg.fields(), &[Field::BigInt(42)]);
    }

    #[test]
    fn timeout_removes_the_slot_and_a_late_fulfil_is_dropped() {
        let correlator = RequestCorrelator::new();
        let rx = correlator.register("9".to_owned());

        let err = correlator.await_reply("9", rx, Duration::from_millis(10));
        assert!(matches!(err, Err(AxonError::Timeout)));

        // A late fulfil must not panic and must find no slot.
        correlator.fulfil("9", Message::new());
        assert!(correlator.pending.lock().unwrap().get("9").is_none());
    }
}
