//! Feed engine integration tests against the simulated VS1053.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
)]
//!
//! The worker runs on the test task next to a "player" future that decodes
//! bytes out of the simulated FIFO and delivers DREQ edges through the
//! interrupt relay, the way the board's interrupt handler would.
//!
//! Run with: cargo test -p codec --test feed_engine

use core::cell::Cell;
use core::future::Future;

use codec::config::{BLOCK_SIZE, DRAIN_CEILING_BLOCKS, MIN_FILL_BLOCKS};
use codec::mock::{CallbackLog, MockVs1053, SimBus, SimDelay, SimReady, SimReset};
use codec::vs1053::registers::{SCI_CLOCKF, SCI_MODE, SCI_VOL, SM_CANCEL};
use codec::{AudioBuffer, BufferId, CodecConfig, CodecError, FeatureRequest, FeedShared, Vs1053};
use embassy_futures::join::{join, join3};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

type Shared = FeedShared<CriticalSectionRawMutex>;
type Driver = Vs1053<SimBus, SimReady, SimReset, SimDelay>;

/// Player iterations before the test gives up and closes the inbox.
const MAX_TICKS: u32 = 100_000;

fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

async fn initialized(chip: &MockVs1053) -> Driver {
    let mut dev = chip.driver(CodecConfig::DEFAULT);
    dev.initialize().await.expect("simulated VS1053 must initialise");
    dev
}

/// Let the worker handle whatever is in its inbox.
async fn settle() {
    for _ in 0..16 {
        yield_now().await;
    }
}

/// Run `worker` while decoding `play_step` bytes and raising DREQ edges
/// every tick, until the worker returns.
async fn drive<F: Future>(chip: &MockVs1053, shared: &Shared, play_step: usize, worker: F) -> F::Output {
    let done = Cell::new(false);
    let relay = shared.relay();
    let (output, ()) = join(
        async {
            let output = worker.await;
            done.set(true);
            output
        },
        async {
            let mut ticks = 0u32;
            while !done.get() {
                chip.play(play_step);
                chip.dreq_edge(&relay);
                yield_now().await;
                ticks += 1;
                if ticks == MAX_TICKS {
                    shared.control().shutdown().await;
                }
            }
        },
    )
    .await;
    output
}

/// Assert the decoder saw no protocol violations.
fn assert_clean_bus(chip: &MockVs1053) {
    assert_eq!(chip.overruns(), 0, "data sent while DREQ was low");
    assert_eq!(chip.double_locks(), 0, "bus locked twice");
    assert_eq!(chip.unlocked_access(), 0, "bus used without the lock");
    assert_eq!(chip.sci_overspeed(), 0, "SCI clocked faster than CLKI / 7");
    assert_eq!(chip.select_conflicts(), 0, "both chip selects active");
    assert!(!chip.is_locked(), "bus lock leaked");
    assert!(chip.data_blocks().iter().all(|len| *len <= BLOCK_SIZE));
}

/// 100 bytes (full) then 50 bytes in a 200-byte buffer: four blocks for the
/// first, two for the second, then fill blocks until the cancel is acked.
#[tokio::test]
async fn test_two_buffer_block_layout() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::new(BufferId(1), payload(1, 100), 100))
        .await
        .unwrap();
    control
        .enqueue(AudioBuffer::new(BufferId(2), payload(2, 50), 200))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.expect("start");
    assert_eq!(chip.register(SCI_CLOCKF), 0x9800, "decode clock");
    engine.run().await;

    let blocks = chip.data_blocks();
    assert_eq!(&blocks[..6], &[32, 32, 32, 4, 32, 18]);
    let fill = &blocks[6..];
    assert_eq!(fill.len(), usize::from(MIN_FILL_BLOCKS) + 1);
    assert!(fill.iter().all(|len| *len == BLOCK_SIZE));

    assert_eq!(log.dequeued, vec![BufferId(1), BufferId(2)]);
    assert!(log.discarded.is_empty());
    assert_eq!(log.completions, 1);
    assert!(log.errors.is_empty());
    assert_eq!(chip.soft_resets(), 2, "start + drain");
    assert_eq!(chip.hard_resets(), 1, "initialize only");
    assert!(!shared.is_running());
    assert!(!chip.irq_enabled());
    assert_clean_bus(&chip);
}

/// Many buffers through a small FIFO arrive in enqueue order, each reported
/// once, after all of its bytes went out.
#[tokio::test]
async fn test_fifo_order_through_small_fifo() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(128));
    let shared = Shared::new();
    let control = shared.control();

    let mut expected = Vec::new();
    for id in 0..8u32 {
        let data = payload(id as u8 * 17, 300);
        expected.extend_from_slice(&data);
        control
            .enqueue(AudioBuffer::full(BufferId(id), data))
            .await
            .unwrap();
    }
    let last = payload(99, 10);
    expected.extend_from_slice(&last);
    control
        .enqueue(AudioBuffer::new(BufferId(8), last, 64))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    drive(&chip, &shared, 48, engine.run()).await;

    let sent = chip.data();
    assert_eq!(&sent[..expected.len()], expected.as_slice());
    assert_eq!(log.dequeued, (0..9).map(BufferId).collect::<Vec<_>>());
    assert_eq!(log.completions, 1);
    assert_clean_bus(&chip);
}

/// Pause stops all traffic; resume re-primes from the same byte.
#[tokio::test]
async fn test_pause_holds_cursor_and_resume_continues() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(256));
    let shared = Shared::new();
    let control = shared.control();
    let data = payload(3, 1024);
    control
        .enqueue(AudioBuffer::full(BufferId(1), data.clone()))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    let relay = shared.relay();

    join(engine.run(), async {
        settle().await;
        assert_eq!(chip.data().len(), 256, "prime fills the FIFO");

        control.pause().await.unwrap();
        settle().await;
        assert!(!chip.irq_enabled());

        chip.play(256);
        assert!(!chip.dreq_edge(&relay), "edges are masked while paused");
        // A request that was already queued must not move data either.
        assert!(relay.on_ready_edge());
        settle().await;
        assert_eq!(chip.data().len(), 256, "no bytes while paused");

        control.resume().await.unwrap();
        settle().await;
        assert!(chip.irq_enabled());
        assert_eq!(chip.data().as_slice(), &data[..512]);

        chip.set_fifo_capacity(None);
        control.stop().await.unwrap();
    })
    .await;

    assert_eq!(log.discarded, vec![BufferId(1)]);
    assert_eq!(log.completions, 1);
    assert_clean_bus(&chip);
}

/// Stop with nothing in flight goes straight to idle: no SM_CANCEL, no
/// fill bytes.
#[tokio::test]
async fn test_stop_with_empty_queue_skips_drain() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(5, 64)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    let waited_before = chip.elapsed_us();

    join(engine.run(), async {
        settle().await;
        assert_eq!(chip.data().len(), 64, "underrun after the only buffer");
        control.stop().await.unwrap();
    })
    .await;

    assert_eq!(chip.data().len(), 64);
    assert_eq!(chip.fill_byte_reads(), 0);
    assert!(chip
        .writes_to(SCI_MODE)
        .iter()
        .all(|mode| mode & SM_CANCEL == 0));
    assert_eq!(log.dequeued, vec![BufferId(1)]);
    assert_eq!(log.completions, 1);
    assert_eq!(chip.register(SCI_CLOCKF), 0x1800, "stop drops CLKI");
    assert!(chip.elapsed_us() - waited_before >= 40_000, "stop settle delay");
    assert_clean_bus(&chip);
}

/// A buffer still queued behind a low DREQ when stop arrives is cancelled
/// like one in flight, not dropped without SM_CANCEL.
#[tokio::test]
async fn test_stop_cancels_buffer_queued_behind_low_dreq() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(4, 64)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();

    join(engine.run(), async {
        settle().await;
        chip.force_dreq(Some(false));
        control
            .enqueue(AudioBuffer::full(BufferId(2), payload(5, 4096)))
            .await
            .unwrap();
        settle().await;
        assert_eq!(shared.queue().len().await.unwrap(), 1);
        chip.force_dreq(None);
        control.stop().await.unwrap();
    })
    .await;

    assert!(chip
        .writes_to(SCI_MODE)
        .iter()
        .any(|mode| mode & SM_CANCEL != 0));
    assert_eq!(log.dequeued, vec![BufferId(1)]);
    assert_eq!(log.discarded, vec![BufferId(2)]);
    assert_eq!(log.completions, 1);
    assert_eq!(chip.soft_resets(), 2, "start + drain");
    assert_eq!(chip.fill_byte_reads(), 1);
    assert_clean_bus(&chip);
}

/// Stop mid-buffer: the decoder acknowledges, the rest of the buffer is
/// discarded and the engine soft-resets the decoder.
#[tokio::test]
async fn test_stop_mid_stream_discards_remainder() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(512));
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(7, 4096)))
        .await
        .unwrap();
    control
        .enqueue(AudioBuffer::full(BufferId(2), payload(8, 4096)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();

    join(engine.run(), async {
        settle().await;
        chip.set_fifo_capacity(None);
        control.stop().await.unwrap();
    })
    .await;

    assert!(chip.data().len() < 4096 + 128);
    assert_eq!(log.discarded, vec![BufferId(1), BufferId(2)]);
    assert!(log.dequeued.is_empty());
    assert_eq!(chip.soft_resets(), 2, "start + drain");
    assert_eq!(chip.fill_byte_reads(), 1);
    assert_clean_bus(&chip);
}

/// Several tasks ending the same stream all return once the worker exits,
/// whether they stop it or shut it down.
#[tokio::test]
async fn test_concurrent_stops_all_return() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(512));
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(3, 4096)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();

    let returned = Cell::new(0u32);
    let first = async {
        settle().await;
        chip.set_fifo_capacity(None);
        control.stop().await.unwrap();
        returned.set(returned.get() + 1);
    };
    let second = async {
        settle().await;
        control.stop().await.unwrap();
        returned.set(returned.get() + 1);
    };
    let teardown = async {
        settle().await;
        control.shutdown().await;
        returned.set(returned.get() + 1);
    };
    tokio::time::timeout(
        std::time::Duration::from_secs(2),
        join(engine.run(), join3(first, second, teardown)),
    )
    .await
    .expect("every waiter returns once the worker exits");

    assert_eq!(returned.get(), 3);
    assert_eq!(log.completions, 1);
    assert_eq!(log.discarded, vec![BufferId(1)]);
    assert!(!shared.is_running());
    assert_clean_bus(&chip);

    // A stop after the fact returns at once.
    control.stop().await.unwrap();
}

/// A decoder that never acknowledges the cancel is hard reset once the
/// late drain budget is spent, and the engine still reaches idle.
#[tokio::test]
async fn test_stop_reaches_idle_without_acknowledge() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(512));
    chip.set_cancel_ack_after(None);
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(9, 8192)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();

    let stopper = async {
        settle().await;
        control.stop().await.unwrap();
    };
    drive(&chip, &shared, 64, async { join(engine.run(), stopper).await }).await;

    let blocks = chip.data_blocks();
    let fill = blocks.len() - 8192 / BLOCK_SIZE;
    assert_eq!(fill, usize::from(DRAIN_CEILING_BLOCKS - MIN_FILL_BLOCKS));
    assert_eq!(chip.hard_resets(), 2, "initialize + wedged decoder");
    assert_eq!(log.dequeued, vec![BufferId(1)], "buffer went out in full");
    assert_eq!(log.completions, 1);
    assert!(!shared.is_running());
    assert_clean_bus(&chip);
}

/// A natural end with a decoder that never clears SM_CANCEL stops at the
/// drain ceiling and pulses the reset line.
#[tokio::test]
async fn test_drain_ceiling_forces_hard_reset() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_cancel_ack_after(None);
    let shared = Shared::new();
    shared
        .control()
        .enqueue(AudioBuffer::new(BufferId(1), payload(4, 50), 100))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    dev.start(&shared, &mut log).await.unwrap().run().await;

    let blocks = chip.data_blocks();
    assert_eq!(&blocks[..2], &[32, 18]);
    assert_eq!(blocks.len() - 2, usize::from(DRAIN_CEILING_BLOCKS));
    assert_eq!(chip.hard_resets(), 2);
    assert_eq!(chip.register(SCI_CLOCKF), 0x1800, "crystal clock after reset");
    assert!(chip
        .writes_to(SCI_MODE)
        .iter()
        .any(|mode| mode & SM_CANCEL != 0));
    assert_eq!(log.completions, 1);
    assert!(log.errors.is_empty(), "drain timeout is not an error");
    assert_clean_bus(&chip);
}

/// The end-fill byte is read once per stream and used for every fill block.
#[tokio::test]
async fn test_fill_byte_read_once_per_stream() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_end_fill_byte(0x3C);
    let shared = Shared::new();
    let mut log = CallbackLog::default();

    for stream in 0..2u32 {
        shared
            .control()
            .enqueue(AudioBuffer::new(BufferId(stream), payload(0, 40), 64))
            .await
            .unwrap();
        let before = chip.data().len();
        dev.start(&shared, &mut log).await.unwrap().run().await;
        assert_eq!(chip.fill_byte_reads(), stream + 1);
        assert!(chip.data()[before + 40..].iter().all(|b| *b == 0x3C));
    }
    assert_eq!(log.completions, 2);
    assert_clean_bus(&chip);
}

/// Buffers queued behind the final one are handed back unplayed.
#[tokio::test]
async fn test_buffers_after_final_are_discarded() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::new(BufferId(1), payload(1, 20), 32))
        .await
        .unwrap();
    control
        .enqueue(AudioBuffer::full(BufferId(2), payload(2, 64)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    dev.start(&shared, &mut log).await.unwrap().run().await;

    assert_eq!(log.dequeued, vec![BufferId(1)]);
    assert_eq!(log.discarded, vec![BufferId(2)]);
    assert_eq!(log.returned(), 2);
    assert!(shared.queue().is_empty().await.unwrap());
}

/// Enqueue after an underrun wakes the worker and streaming continues.
#[tokio::test]
async fn test_enqueue_after_underrun_resumes() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(1, 64)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    join(engine.run(), async {
        settle().await;
        assert_eq!(chip.data().len(), 64);
        control
            .enqueue(AudioBuffer::new(BufferId(2), payload(2, 10), 64))
            .await
            .unwrap();
    })
    .await;

    assert_eq!(&chip.data_blocks()[..3], &[32, 32, 10]);
    assert_eq!(log.dequeued, vec![BufferId(1), BufferId(2)]);
    assert_eq!(log.completions, 1);
}

/// Volume changes while streaming go through the worker.
#[tokio::test]
async fn test_configure_while_running() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    chip.set_fifo_capacity(Some(64));
    let shared = Shared::new();
    let control = shared.control();
    control
        .enqueue(AudioBuffer::full(BufferId(1), payload(1, 1024)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    join(engine.run(), async {
        control
            .configure(FeatureRequest::Volume(1000))
            .await
            .unwrap();
        settle().await;
        assert_eq!(chip.register(SCI_VOL), 0x0000);
        chip.set_fifo_capacity(None);
        control.stop().await.unwrap();
    })
    .await;

    assert_eq!(
        control.configure(FeatureRequest::Volume(0)).await,
        Err(CodecError::NotRunning)
    );
    assert_eq!(dev.volume(), 1000);
}

/// A bus failure is reported and ends the stream; buffers come back.
#[tokio::test]
async fn test_bus_error_ends_stream() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    shared
        .control()
        .enqueue(AudioBuffer::full(BufferId(1), payload(1, 64)))
        .await
        .unwrap();

    let mut log = CallbackLog::default();
    let engine = dev.start(&shared, &mut log).await.unwrap();
    chip.set_bus_fault(true);
    engine.run().await;

    assert_eq!(log.errors, vec![CodecError::Bus]);
    assert_eq!(log.discarded, vec![BufferId(1)]);
    assert_eq!(log.completions, 1);
    assert!(!chip.is_locked());
    assert!(!shared.is_running());
}

/// Start gives up when nothing is enqueued in time.
#[tokio::test]
async fn test_start_without_buffer_times_out() {
    let chip = MockVs1053::new();
    let config = CodecConfig {
        start_timeout_ms: 20,
        ..CodecConfig::DEFAULT
    };
    let mut dev = chip.driver(config);
    dev.initialize().await.unwrap();
    let shared = Shared::new();
    let mut log = CallbackLog::default();
    let result = dev.start(&shared, &mut log).await;
    assert!(matches!(result, Err(CodecError::NoBuffer)));
    assert_eq!(chip.register(SCI_CLOCKF), 0x1800, "CLKI back at XTALI");
    assert_eq!(chip.writes_to(SCI_CLOCKF).last(), Some(&0x1800));
    assert!(!chip.is_locked());
}

/// Edges are ignored once the worker has exited.
#[tokio::test]
async fn test_relay_quiet_after_stream() {
    let chip = MockVs1053::new();
    let mut dev = initialized(&chip).await;
    let shared = Shared::new();
    shared
        .control()
        .enqueue(AudioBuffer::new(BufferId(1), payload(1, 8), 32))
        .await
        .unwrap();
    let mut log = CallbackLog::default();
    dev.start(&shared, &mut log).await.unwrap().run().await;

    assert!(!shared.relay().on_ready_edge());
    assert!(!chip.dreq_edge(&shared.relay()));
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(48))]

    /// Whatever the buffer sizes and FIFO depth: order is preserved, no
    /// block exceeds 32 bytes, DREQ is never overrun and every buffer comes
    /// back exactly once.
    #[test]
    fn prop_stream_delivery(
        sizes in proptest::collection::vec(1usize..400, 1..6),
        fifo in 32usize..1024,
        step in 1usize..160,
    ) {
        embassy_futures::block_on(async {
            let chip = MockVs1053::new();
            let mut dev = initialized(&chip).await;
            chip.set_fifo_capacity(Some(fifo));
            let shared = Shared::new();
            let control = shared.control();

            let mut expected = Vec::new();
            let count = sizes.len();
            for (i, len) in sizes.iter().copied().enumerate() {
                let data = payload(i as u8, len);
                expected.extend_from_slice(&data);
                let capacity = if i + 1 == count { len + 1 } else { len };
                control
                    .enqueue(AudioBuffer::new(BufferId(i as u32), data, capacity))
                    .await
                    .unwrap();
            }

            let mut log = CallbackLog::default();
            let engine = dev.start(&shared, &mut log).await.unwrap();
            drive(&chip, &shared, step, engine.run()).await;

            let sent = chip.data();
            assert_eq!(&sent[..expected.len()], expected.as_slice());
            assert_eq!(log.dequeued, (0..count as u32).map(BufferId).collect::<Vec<_>>());
            assert_eq!(log.returned(), count);
            assert_eq!(log.completions, 1);
            assert_clean_bus(&chip);
        });
    }
}
