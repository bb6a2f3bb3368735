// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use axon::{Config, Endpoint, Field, Message};

fn bound_port(endpoint: &Endpoint) -> u16 {
    let (tx, rx) = mpsc::channel();
    endpoint.on_bind(move |port| {
        let _ = tx.send(port);
    });
    endpoint.bind(0).unwrap();
    rx.recv_timeout(Duration::from_secs(2)).expect("endpoint never bound")
}

#[test]
fn push_pull_round_robin_is_fair_across_peers() {
    let _ = env_logger::try_init();

    let push = Endpoint::create("push").unwrap();
    let port = bound_port(&push);

    let counts: Arc<Vec<AtomicUsize>> =
        Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());
    let mut pulls = Vec::new();

    for i in 0..3 {
        let pull = Endpoint::create("pull").unwrap();
        let counts = counts.clone();
        pull.on_message(move |_msg| {
            counts[i].fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pull.connect("127.0.0.1", port).unwrap();
        pulls.push(pull);
        // Give each connection time to register before the next one
        // dials in, so the round-robin cursor visits them in a known
        // order.
        thread::sleep(Duration::from_millis(100));
    }

    for i in 0..6 {
        push.send(vec![Field::BigInt(i)]).unwrap();
    }

    thread::sleep(Duration::from_millis(300));

    let total: usize = counts.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(total, 6);
    for c in counts.iter() {
        assert_eq!(c.load(Ordering::SeqCst), 2, "round-robin should split sends evenly");
    }
}

#[test]
fn pub_sub_filters_by_topic() {
    let _ = env_logger::try_init();

    let publisher = Endpoint::create("pub").unwrap();
    let port = bound_port(&publisher);

    let weather_sub = Endpoint::create("sub").unwrap();
    let (weather_tx, weather_rx) = mpsc::channel();
    weather_sub
        .subscribe("^weather\\..*", move |msg| {
            let _ = weather_tx.send(msg);
        })
        .unwrap();
    weather_sub.connect("127.0.0.1", port).unwrap();

    let sports_sub = Endpoint::create("sub").unwrap();
    let (sports_tx, sports_rx) = mpsc::channel();
    sports_sub
        .subscribe("^sports\\..*", move |msg| {
            let _ = sports_tx.send(msg);
        })
        .unwrap();
    sports_sub.connect("127.0.0.1", port).unwrap();

    thread::sleep(Duration::from_millis(150));

    publisher
        .send(vec![Field::Str("weather.paris".into()), Field::BigInt(21)])
        .unwrap();

    let received = weather_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received.fields(), &[Field::BigInt(21)]);
    assert!(sports_rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn sub_generic_message_callback_sees_the_topic_field() {
    let _ = env_logger::try_init();

    let publisher = Endpoint::create("pub").unwrap();
    let port = bound_port(&publisher);

    let sub = Endpoint::create("sub").unwrap();
    let (tx, rx) = mpsc::channel();
    sub.on_message(move |msg| {
        let _ = tx.send(msg);
    })
    .unwrap();
    sub.connect("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(150));

    publisher
        .send(vec![Field::Str("weather.paris".into()), Field::BigInt(21)])
        .unwrap();

    // The generic callback gets the complete frame, topic field and all,
    // unlike the per-subscription callbacks which only see the rest.
    let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(
        received.fields(),
        &[Field::Str("weather.paris".into()), Field::BigInt(21)]
    );
}

#[test]
fn pull_subscribes_to_topics_like_sub() {
    let _ = env_logger::try_init();

    let publisher = Endpoint::create("pub").unwrap();
    let port = bound_port(&publisher);

    let puller = Endpoint::create("pull").unwrap();
    let (tx, rx) = mpsc::channel();
    puller
        .subscribe("^weather\\..*", move |msg| {
            let _ = tx.send(msg);
        })
        .unwrap();
    puller.connect("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(150));

    publisher
        .send(vec![Field::Str("weather.paris".into()), Field::BigInt(21)])
        .unwrap();

    let received = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(received.fields(), &[Field::BigInt(21)]);
}

#[test]
fn sub_dispatches_to_every_pattern_that_matches_the_same_message() {
    let _ = env_logger::try_init();

    let publisher = Endpoint::create("pub").unwrap();
    let port = bound_port(&publisher);

    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));

    let sub = Endpoint::create("sub").unwrap();
    let a = hits_a.clone();
    sub.subscribe("^weather\\.paris$", move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    let b = hits_b.clone();
    sub.subscribe("^weather\\..*", move |_| {
        b.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    sub.connect("127.0.0.1", port).unwrap();

    thread::sleep(Duration::from_millis(150));
    publisher
        .send(vec![Field::Str("weather.paris".into())])
        .unwrap();
    thread::sleep(Duration::from_millis(200));

    assert_eq!(hits_a.load(Ordering::SeqCst), 1);
    assert_eq!(hits_b.load(Ordering::SeqCst), 1);
}

#[test]
fn req_rep_round_trip() {
    let _ = env_logger::try_init();

    let rep = Endpoint::create("rep").unwrap();
    let port = bound_port(&rep);
    rep.on_request(|msg| {
        let n = msg.fields()[0].as_bigint().unwrap();
        Some(Message::from_fields(vec![Field::BigInt(n * 2)]))
    })
    .unwrap();

    let req = Endpoint::create("req").unwrap();
    req.connect("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(150));

    let reply = req
        .request(vec![Field::BigInt(21)], Duration::from_secs(1))
        .unwrap();

    assert_eq!(reply.fields(), &[Field::BigInt(42)]);
}

#[test]
fn req_times_out_when_no_reply_arrives() {
    let _ = env_logger::try_init();

    let rep = Endpoint::create("rep").unwrap();
    let port = bound_port(&rep);
    rep.on_request(|_msg| None).unwrap();

    let req = Endpoint::create("req").unwrap();
    req.connect("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(150));

    let result = req.request(vec![Field::BigInt(1)], Duration::from_millis(200));

    assert!(matches!(result, Err(axon::AxonError::Timeout)));
}

#[test]
fn req_send_failure_returns_immediately_instead_of_stalling_for_the_timeout() {
    let _ = env_logger::try_init();

    let req = Endpoint::create("req").unwrap();

    let before = std::time::Instant::now();
    let result = req.request(vec![Field::BigInt(1)], Duration::from_secs(5));
    let elapsed = before.elapsed();

    // No peer was ever connected, so this must fail as a send failure,
    // not time out after the full 5s wait.
    assert!(matches!(result, Err(axon::AxonError::SendFailed(_))));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}, should fail fast");
}

#[test]
fn dialer_reconnects_after_the_listener_restarts_on_the_same_port() {
    let _ = env_logger::try_init();

    let config = Config {
        backoff_initial: Duration::from_millis(20),
        backoff_multiplier: 1.5,
        backoff_cap: Duration::from_millis(200),
        select_timeout: Duration::from_millis(200),
        ..Config::default()
    };

    let first_pull = Endpoint::create_with_config("pull", config.clone()).unwrap();
    let port = bound_port(&first_pull);

    let push = Endpoint::create_with_config("push", config.clone()).unwrap();
    push.connect("127.0.0.1", port).unwrap();
    thread::sleep(Duration::from_millis(150));

    drop(first_pull);
    thread::sleep(Duration::from_millis(100));

    let received = Arc::new(Mutex::new(None));
    let second_pull = Endpoint::create_with_config("pull", config).unwrap();
    let slot = received.clone();
    second_pull
        .on_message(move |msg| {
            *slot.lock().unwrap() = Some(msg);
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    second_pull.on_bind(move |p| {
        let _ = tx.send(p);
    });
    second_pull.bind(port).unwrap();
    rx.recv_timeout(Duration::from_secs(2)).expect("listener never rebound");

    // Give the dialer's back-off loop a chance to notice the listener is
    // back and reconnect.
    for _ in 0..30 {
        if push.send(vec![Field::Str("ping".into())]).is_ok() && received.lock().unwrap().is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let got = received.lock().unwrap().take().expect("push never reached the new listener");
    assert_eq!(got.fields(), &[Field::Str("ping".into())]);
    assert!(push.is_connected("127.0.0.1", port));
}
