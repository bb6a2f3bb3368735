// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::time::Duration;

/// Every tunable an endpoint needs. `Config::default()` matches the
/// literal values named throughout the design: a 100ms initial back-off
/// growing ×1.5 up to a 5s cap, a 5s `select`/poll bound so worker
/// threads stay cancellable, and a 5s default REQ timeout when the
/// caller doesn't pick one explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    pub backoff_cap: Duration,
    /// How many consecutive times the round-robin "wait for a live peer"
    /// back-off can hit its cap before giving up and reporting failure.
    pub round_robin_wait_cap_hits: u32,
    /// Bound on the Listener/Dialer poll, so `release` has a guaranteed
    /// cancellation window.
    pub select_timeout: Duration,
    pub default_request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            backoff_initial: Duration::from_millis(100),
            backoff_multiplier: 1.5,
            backoff_cap: Duration::from_secs(5),
            round_robin_wait_cap_hits: 3,
            select_timeout: Duration::from_secs(5),
            default_request_timeout: Duration::from_secs(5),
        }
    }
}
