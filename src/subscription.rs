// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The Subscription Table: an ordered, pattern-keyed list of topic
//! callbacks for SUB endpoints.

use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::error::{AxonError, Result};
use crate::field::Message;

type Callback = dyn Fn(Message) + Send + Sync;

struct Subscription {
    pattern: String,
    regex: Regex,
    callback: Arc<Callback>,
}

/// Ordered list of patterns, each with its own callback. Insertion order
/// is preserved; `subscribe` with an existing pattern replaces its
/// callback in place rather than appending a duplicate entry.
///
/// Patterns are compiled once, at `subscribe` time, rather than freshly
/// per dispatched message — `Regex::new` is the expensive part of a
/// match and there is no correctness reason to repeat it for every
/// incoming message.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: Mutex<Vec<Subscription>>,
}

impl SubscriptionTable {
    pub fn new() -> SubscriptionTable {
        SubscriptionTable::default()
    }

    pub fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let regex = Regex::new(pattern).map_err(|_| AxonError::InvalidPattern(pattern.to_owned()))?;
        let mut entries = self.entries.lock().unwrap();

        if let Some(existing) = entries.iter_mut().find(|s| s.pattern == pattern) {
            existing.regex = regex;
            existing.callback = Arc::new(callback);
        } else {
            entries.push(Subscription {
                pattern: pattern.to_owned(),
                regex,
                callback: Arc::new(callback),
            });
        }

        Ok(())
    }

    pub fn unsubscribe(&self, pattern: &str) {
        self.entries.lock().unwrap().retain(|s| s.pattern != pattern);
    }

    /// Invokes every subscription whose pattern matches `topic`, in
    /// insertion order, passing each a clone of `msg`. Returns the number
    /// of callbacks fired.
    pub fn dispatch(&self, topic: &str, msg: &Message) -> usize {
        let matching: Vec<Arc<Callback>> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .filter(|s| s.regex.is_match(topic))
                .map(|s| s.callback.clone())
                .collect()
        };

        let count = matching.len();
        for callback in matching {
            callback(msg.clone());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::field::Field;

    #[test]
    fn dispatches_to_every_matching_pattern() {
        let table = SubscriptionTable::new();
        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));

        let a = hits_a.clone();
        table.subscribe("topic1", move |_| { a.fetch_add(1, Ordering::SeqCst); }).unwrap();

        let b = hits_b.clone();
        table.subscribe("top.*", move |_| { b.fetch_add(1, Ordering::SeqCst); }).unwrap();

        let fired = table.dispatch("topic1", &Message::from_fields(vec![Field::Str("x".into())]));

        assert_eq!(fired, 2);
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resubscribing_the_same_pattern_replaces_the_callback() {
        let table = SubscriptionTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        table.subscribe("topic1", |_| {}).unwrap();
        let h = hits.clone();
        table.subscribe("topic1", move |_| { h.fetch_add(1, Ordering::SeqCst); }).unwrap();

        table.dispatch("topic1", &Message::new());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_the_pattern() {
        let table = SubscriptionTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        table.subscribe("topic1", move |_| { h.fetch_add(1, Ordering::SeqCst); }).unwrap();

        table.unsubscribe("topic1");
        table.dispatch("topic1", &Message::new());

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
