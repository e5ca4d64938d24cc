//! Lifecycle, delivery and write-path tests for `PortChannel` over the mock bus.

mod common;

use common::*;
use comlink::port::{ChannelOptions, ModemStatus, PortChannel, PortError};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Open / close
// ============================================================================

#[test]
fn test_open_then_close() {
    let (channel, endpoint) = mock_channel("MOCK0");
    assert!(!channel.is_open());

    channel.open(&endpoint_config("MOCK0")).unwrap();
    assert!(channel.is_open());
    assert!(endpoint.is_claimed());
    assert_eq!(channel.address().as_deref(), Some("MOCK0"));

    channel.close();
    assert!(!channel.is_open());
    assert!(!endpoint.is_claimed());
    assert_eq!(channel.address(), None);
}

#[test]
fn test_open_unknown_address_fails_and_stays_closed() {
    let (channel, _) = mock_channel("MOCK0");
    let err = channel.open(&endpoint_config("MOCK9")).unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
    assert!(!channel.is_open());
}

#[test]
fn test_second_open_of_in_use_address_fails() {
    let bus = bus_with(&["MOCK0"]);
    let first = channel_on(&bus);
    let second = channel_on(&bus);

    first.open(&endpoint_config("MOCK0")).unwrap();
    let err = second.open(&endpoint_config("MOCK0")).unwrap_err();
    assert!(matches!(err, PortError::InUse(_)));
    assert!(first.is_open());
    assert!(!second.is_open());

    first.close();
    second.open(&endpoint_config("MOCK0")).unwrap();
    assert!(second.is_open());
}

#[test]
fn test_reopen_closes_previous_connection() {
    let bus = bus_with(&["MOCK0", "MOCK1"]);
    let channel = channel_on(&bus);
    let zero = bus.endpoint("MOCK0").unwrap();
    let one = bus.endpoint("MOCK1").unwrap();

    channel.open(&endpoint_config("MOCK0")).unwrap();
    channel.open(&endpoint_config("MOCK1")).unwrap();

    assert!(!zero.is_claimed());
    assert!(one.is_claimed());
    assert_eq!(channel.address().as_deref(), Some("MOCK1"));
}

#[test]
fn test_open_close_open_starts_fresh_receive_loop() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);

    channel.open(&endpoint_config("MOCK0")).unwrap();
    channel.close();
    channel.open(&endpoint_config("MOCK0")).unwrap();
    assert_eq!(endpoint.open_count(), 2);

    endpoint.inject(b"again");
    assert_eq!(recv_bytes(&rx, 5), b"again");
}

#[test]
fn test_close_is_idempotent() {
    let (channel, _) = mock_channel("MOCK0");
    channel.close();
    channel.open(&endpoint_config("MOCK0")).unwrap();
    channel.close();
    channel.close();
    assert!(!channel.is_open());
}

#[test]
fn test_concurrent_close_is_safe() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                channel.close();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!channel.is_open());
    assert!(!endpoint.is_claimed());
}

#[test]
fn test_clone_failure_releases_claim() {
    let (channel, endpoint) = mock_channel("MOCK0");
    endpoint.fail_next_clone();

    assert!(channel.open(&endpoint_config("MOCK0")).is_err());
    assert!(!channel.is_open());
    assert!(!endpoint.is_claimed());

    channel.open(&endpoint_config("MOCK0")).unwrap();
    assert!(channel.is_open());
}

#[test]
fn test_zero_scratch_size_rejected() {
    let bus = bus_with(&["MOCK0"]);
    let options = ChannelOptions {
        scratch_size: 0,
        ..fast_options()
    };
    let channel = PortChannel::with_opener(Arc::new(bus.clone()), options);
    let err = channel.open(&endpoint_config("MOCK0")).unwrap_err();
    assert!(matches!(err, PortError::InvalidConfig(_)));
    assert_eq!(bus.endpoint("MOCK0").unwrap().open_count(), 0);
}

#[test]
fn test_line_settings_reach_device() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let mut config = endpoint_config("MOCK0");
    config.baud_rate = 9600;
    config.rts = true;
    config.dtr = true;

    channel.open(&config).unwrap();
    assert_eq!(endpoint.last_config(), Some(config));
    assert!(endpoint.rts());
    assert!(endpoint.dtr());
}

#[test]
fn test_drop_releases_endpoint() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();
    drop(channel);
    assert!(wait_until(RECV_WAIT, || !endpoint.is_claimed()));
}

// ============================================================================
// Receive path
// ============================================================================

#[test]
fn test_chunks_arrive_in_order() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    let mut expected = Vec::new();
    for i in 0..50u8 {
        let chunk = vec![i; (i as usize % 7) + 1];
        endpoint.inject(&chunk);
        expected.extend_from_slice(&chunk);
    }

    assert_eq!(recv_bytes(&rx, expected.len()), expected);
}

#[test]
fn test_callback_owns_its_copy() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.inject(b"first");
    endpoint.inject(b"2nd");
    let first = rx.recv_timeout(RECV_WAIT).unwrap();
    let second = rx.recv_timeout(RECV_WAIT).unwrap();
    assert_eq!(first, b"first");
    assert_eq!(second, b"2nd");
}

#[test]
fn test_replacing_callback_redirects_later_chunks() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let old_rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.inject(b"old");
    assert_eq!(old_rx.recv_timeout(RECV_WAIT).unwrap(), b"old");

    let new_rx = collect_chunks(&channel);
    endpoint.inject(b"new");
    assert_eq!(new_rx.recv_timeout(RECV_WAIT).unwrap(), b"new");
    assert!(old_rx.try_recv().is_err());
}

#[test]
fn test_chunks_without_callback_are_dropped() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.inject(b"nobody listens");
    assert!(wait_until(RECV_WAIT, || channel.stats().bytes_received == 14));
    assert_eq!(channel.stats().chunks_delivered, 0);

    let rx = collect_chunks(&channel);
    endpoint.inject(b"now");
    assert_eq!(rx.recv_timeout(RECV_WAIT).unwrap(), b"now");
}

#[test]
fn test_close_from_inside_callback() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let weak = Arc::downgrade(&channel);
    let (tx, rx) = mpsc::channel();
    channel.set_data_callback(move |_chunk| {
        if let Some(channel) = weak.upgrade() {
            let started = Instant::now();
            channel.close();
            let _ = tx.send(started.elapsed());
        }
    });
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.inject(b"bye");
    let elapsed = rx.recv_timeout(RECV_WAIT).expect("close returned");
    assert!(elapsed < Duration::from_millis(400), "close took {elapsed:?}");
    assert!(!channel.is_open());
    assert!(wait_until(RECV_WAIT, || !endpoint.is_claimed()));
}

#[test]
fn test_close_is_bounded_when_callback_blocks() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let (started_tx, started_rx) = mpsc::channel();
    channel.set_data_callback(move |_chunk| {
        let _ = started_tx.send(());
        thread::sleep(Duration::from_secs(2));
    });
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.inject(b"slow");
    started_rx.recv_timeout(RECV_WAIT).expect("callback entered");

    // close_timeout is 500ms; the receive thread is detached after that.
    let started = Instant::now();
    channel.close();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(450), "close took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "close took {elapsed:?}");
    assert!(!channel.is_open());
    assert!(endpoint.is_claimed());

    // The detached thread still exits once the callback returns.
    assert!(wait_until(Duration::from_secs(4), || !endpoint.is_claimed()));
}

#[test]
fn test_no_delivery_after_close_returns() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        channel.set_data_callback(move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        });
    }
    channel.open(&endpoint_config("MOCK0")).unwrap();
    channel.close();

    let before = delivered.load(Ordering::SeqCst);
    endpoint.inject(b"late");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(delivered.load(Ordering::SeqCst), before);
}

#[test]
fn test_read_failure_stops_loop_but_not_channel() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.fail_next_read(io::ErrorKind::BrokenPipe);
    thread::sleep(Duration::from_millis(50));
    endpoint.inject(b"unread");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // The failure is only visible as silence; the channel still reports open
    // and close completes without waiting out the timeout.
    assert!(channel.is_open());
    let started = Instant::now();
    channel.close();
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_empty_reads_do_not_spin() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.set_hung_up(true);
    let before = endpoint.read_calls();
    thread::sleep(Duration::from_millis(200));
    let during = endpoint.read_calls() - before;
    // One read per 10ms poll slice, give or take scheduling.
    assert!(during <= 40, "{during} reads in 200ms");

    endpoint.set_hung_up(false);
    endpoint.inject(b"back");
    assert_eq!(recv_bytes(&rx, 4), b"back");

    let started = Instant::now();
    channel.close();
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn test_transient_read_errors_are_retried() {
    let (channel, endpoint) = mock_channel("MOCK0");
    let rx = collect_chunks(&channel);
    channel.open(&endpoint_config("MOCK0")).unwrap();

    endpoint.fail_next_read(io::ErrorKind::Interrupted);
    endpoint.inject(b"still here");
    assert_eq!(recv_bytes(&rx, 10), b"still here");
}

// ============================================================================
// Write path
// ============================================================================

#[test]
fn test_write_reaches_device() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();

    assert_eq!(channel.write(b"AT\r\n").unwrap(), 4);
    assert_eq!(endpoint.written(), vec![b"AT\r\n".to_vec()]);
    assert_eq!(channel.stats().bytes_sent, 4);
}

#[test]
fn test_write_before_open_fails() {
    let (channel, _) = mock_channel("MOCK0");
    assert!(matches!(channel.write(b"x"), Err(PortError::NotOpen)));
}

#[test]
fn test_stalled_write_times_out() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();
    endpoint.stall_writes(true);

    let started = Instant::now();
    let err = channel.write(b"blocked").unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, PortError::Timeout(_)), "got {err:?}");
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
    assert!(channel.is_open());

    endpoint.stall_writes(false);
    assert_eq!(channel.write(b"ok").unwrap(), 2);
}

#[test]
fn test_close_interrupts_pending_write() {
    let bus = bus_with(&["MOCK0"]);
    let endpoint = bus.endpoint("MOCK0").unwrap();
    let options = ChannelOptions {
        write_timeout: Duration::from_secs(5),
        ..fast_options()
    };
    let channel = Arc::new(PortChannel::with_opener(Arc::new(bus), options));
    channel.open(&endpoint_config("MOCK0")).unwrap();
    endpoint.stall_writes(true);

    let writer = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.write(b"never"))
    };
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    channel.close();
    let result = writer.join().unwrap();

    assert!(matches!(result, Err(PortError::Shutdown)), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
}

// ============================================================================
// Modem lines
// ============================================================================

#[test]
fn test_modem_lines() {
    let (channel, endpoint) = mock_channel("MOCK0");
    channel.open(&endpoint_config("MOCK0")).unwrap();

    let status = ModemStatus {
        clear_to_send: true,
        data_set_ready: false,
        ring_indicator: true,
        carrier_detect: false,
    };
    endpoint.set_modem_status(status);
    assert_eq!(channel.modem_status().unwrap(), status);

    channel.set_rts(true).unwrap();
    channel.set_dtr(true).unwrap();
    assert!(endpoint.rts());
    assert!(endpoint.dtr());

    channel.set_dtr(false).unwrap();
    assert!(!endpoint.dtr());
}
