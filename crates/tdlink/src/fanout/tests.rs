//! Unit tests for update fan-out.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::rstest;

use super::*;

fn hub(capacity: usize, policy: OverflowPolicy) -> Arc<UpdateHub> {
    Arc::new(UpdateHub::new(capacity, policy))
}

fn update(index: u64) -> Envelope {
    Envelope::parse(format!(r#"{{"@type":"updateOption","index":{index}}}"#))
        .unwrap_or_else(|error| panic!("parse: {error}"))
}

fn index_of(update: &Update) -> u64 {
    update
        .envelope()
        .to_value()
        .ok()
        .and_then(|value| value.get("index").and_then(serde_json::Value::as_u64))
        .unwrap_or_else(|| panic!("update without index: {update:?}"))
}

fn next_index(subscription: &Subscription) -> u64 {
    let received = subscription
        .recv_timeout(Duration::from_secs(1))
        .unwrap_or_else(|error| panic!("recv: {error}"));
    index_of(&received)
}

#[rstest]
fn every_subscriber_sees_every_update_in_order() {
    let hub = hub(16, OverflowPolicy::DropOldest);
    let subscriptions: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

    for index in 1..=5 {
        assert_eq!(hub.publish(update(index)), 3);
    }

    for subscription in &subscriptions {
        let seen: Vec<_> = (0..5).map(|_| next_index(subscription)).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }
}

#[rstest]
fn sequence_numbers_increase_across_updates() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();

    hub.publish(update(1));
    hub.publish(update(2));

    let first = subscription.try_recv().map(|received| received.sequence());
    let second = subscription.try_recv().map(|received| received.sequence());
    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(2));
    assert_eq!(
        subscription.try_recv().map(|received| received.sequence()),
        Err(RecvError::Empty)
    );
}

#[rstest]
fn drop_oldest_reports_the_gap_once() {
    let hub = hub(2, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();

    for index in 1..=5 {
        hub.publish(update(index));
    }

    assert_eq!(
        subscription.try_recv().map(|received| index_of(&received)),
        Err(RecvError::Lagged(3))
    );
    assert_eq!(next_index(&subscription), 4);
    assert_eq!(next_index(&subscription), 5);
    assert_eq!(subscription.dropped(), 3);
    assert_eq!(hub.subscriber_count(), 1);
}

#[rstest]
fn disconnect_drains_then_reports_gap_then_closes() {
    let hub = hub(2, OverflowPolicy::Disconnect);
    let subscription = hub.subscribe();

    for index in 1..=4 {
        hub.publish(update(index));
    }

    assert_eq!(hub.subscriber_count(), 0);
    assert!(subscription.is_closed());
    assert_eq!(next_index(&subscription), 1);
    assert_eq!(next_index(&subscription), 2);
    assert_eq!(
        subscription.try_recv().map(|received| index_of(&received)),
        Err(RecvError::Lagged(1))
    );
    assert_eq!(
        subscription.try_recv().map(|received| index_of(&received)),
        Err(RecvError::Closed)
    );
}

#[rstest]
fn slow_subscriber_does_not_affect_others() {
    let hub = hub(1, OverflowPolicy::DropOldest);
    let slow = hub.subscribe();
    let fast = hub.subscribe();

    for index in 1..=3 {
        hub.publish(update(index));
        assert_eq!(next_index(&fast), index);
    }

    assert_eq!(slow.try_recv().map(|_| ()), Err(RecvError::Lagged(2)));
    assert_eq!(next_index(&slow), 3);
    assert_eq!(fast.dropped(), 0);
}

#[rstest]
fn dropping_a_subscription_unregisters_it() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    assert_eq!(hub.subscriber_count(), 1);

    drop(subscription);

    assert_eq!(hub.subscriber_count(), 0);
    assert_eq!(hub.publish(update(1)), 0);
}

#[rstest]
fn unsubscribe_closes_the_subscription() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    hub.publish(update(1));

    assert!(hub.unsubscribe(subscription.id()));
    assert!(!hub.unsubscribe(subscription.id()));

    assert_eq!(next_index(&subscription), 1);
    assert_eq!(
        subscription.try_recv().map(|_| ()),
        Err(RecvError::Closed)
    );
}

#[rstest]
fn close_wakes_blocked_receivers_and_stops_dispatch() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    let waiter = thread::spawn(move || subscription.recv().map(|_| ()));

    thread::sleep(Duration::from_millis(20));
    hub.close();

    let outcome = waiter
        .join()
        .unwrap_or_else(|_| panic!("receiver thread panicked"));
    assert_eq!(outcome, Err(RecvError::Closed));
    assert_eq!(hub.publish(update(1)), 0);
    assert!(hub.subscribe().is_closed());
}

#[rstest]
fn iterator_ends_at_close() {
    let hub = hub(8, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    for index in 1..=3 {
        hub.publish(update(index));
    }
    hub.close();

    let seen: Vec<_> = subscription
        .iter()
        .map(|received| received.map(|value| index_of(&value)))
        .collect();

    assert_eq!(seen, vec![Ok(1), Ok(2), Ok(3)]);
}

#[rstest]
fn recv_timeout_expires_without_updates() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();

    let outcome = subscription.recv_timeout(Duration::from_millis(10));

    assert_eq!(outcome.map(|_| ()), Err(RecvError::Timeout));
}

#[rstest]
fn unbounded_timeout_on_closed_subscription_reports_closed() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    hub.close();

    assert_eq!(
        subscription.recv_timeout(Duration::MAX).map(|_| ()),
        Err(RecvError::Closed)
    );
}

#[rstest]
fn unbounded_timeout_returns_buffered_update() {
    let hub = hub(4, OverflowPolicy::DropOldest);
    let subscription = hub.subscribe();
    hub.publish(update(7));

    let received = subscription
        .recv_timeout(Duration::MAX)
        .unwrap_or_else(|error| panic!("recv: {error}"));

    assert_eq!(index_of(&received), 7);
}
