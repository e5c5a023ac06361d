//! End-to-end tests for the worker pool: dispatch, correlation, failure
//! isolation and teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use meshtile::decode::{ElementType, Quantization};
use meshtile::mesh::{NORMAL, POSITION};
use meshtile::{
    AttributeBuffer, DecodeRequest, DecodedTile, Error, MeshRecord, ParsedTile, PoolConfig,
    PrimitiveRecord, Result, WorkerPool, WorkerState,
};
use tokio::task::JoinSet;

const MALFORMED: u8 = 0xFF;
const PANIC: u8 = 0xFE;
const SLOW: u8 = 0xFD;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One triangle whose first X coordinate carries `tag`.
#[allow(clippy::cast_precision_loss)]
fn tagged_tile(tag: u64) -> ParsedTile {
    let positions = vec![tag as f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    ParsedTile::default().with_mesh(
        0,
        MeshRecord {
            primitives: vec![PrimitiveRecord::default().with_attribute(
                POSITION,
                AttributeBuffer::new(positions, ElementType::Vec3),
            )],
        },
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tag_of(tile: &DecodedTile) -> u64 {
    let positions = tile
        .primitive(0, 0)
        .and_then(|p| p.attribute(POSITION))
        .and_then(|a| a.data.as_f32())
        .expect("decoded positions");
    positions[0] as u64
}

fn tagged(tag: u64) -> Vec<u8> {
    tag.to_le_bytes().to_vec()
}

/// Parser stand-in. Eight-byte buffers are tags; completion time varies
/// with the tag so replies arrive out of submission order. Single-byte
/// buffers select a failure mode.
fn parse(buffer: Vec<u8>, source_path: &str) -> Result<ParsedTile> {
    if source_path != "tiles/" {
        return Err(Error::Parse(format!("unexpected source path {source_path}")));
    }
    match buffer.as_slice() {
        [MALFORMED] => {
            let positions = AttributeBuffer::new(vec![0u16; 9], ElementType::Vec3)
                .quantized(Quantization::new(40));
            Ok(ParsedTile::default().with_mesh(
                0,
                MeshRecord {
                    primitives: vec![PrimitiveRecord::default().with_attribute(POSITION, positions)],
                },
            ))
        }
        [PANIC] => panic!("truncated draco stream"),
        [SLOW] => {
            thread::sleep(Duration::from_millis(300));
            Ok(tagged_tile(0))
        }
        bytes => {
            let tag = u64::from_le_bytes(
                bytes
                    .try_into()
                    .map_err(|_| Error::Parse("tile header too short".into()))?,
            );
            thread::sleep(Duration::from_millis((tag * 37) % 17));
            Ok(tagged_tile(tag))
        }
    }
}

fn parser_factory() -> Result<fn(Vec<u8>, &str) -> Result<ParsedTile>> {
    Ok(parse)
}

async fn release(pool: WorkerPool) {
    tokio::task::spawn_blocking(move || pool.release())
        .await
        .expect("release task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_receive_their_own_replies() {
    init_tracing();
    let pool = WorkerPool::new(PoolConfig::default().size(4), parser_factory).unwrap();
    pool.wait_ready().await.unwrap();

    let clients: Vec<_> = (0..4).map(|_| Arc::new(pool.client())).collect();
    let mut tasks = JoinSet::new();
    for tag in 0..100u64 {
        let client = Arc::clone(&clients[usize::try_from(tag % 4).unwrap()]);
        tasks.spawn(async move {
            let tile = client.decode(tagged(tag), "tiles/").await.unwrap();
            (tag, tag_of(&tile))
        });
    }

    let mut received = 0;
    while let Some(result) = tasks.join_next().await {
        let (sent, got) = result.unwrap();
        assert_eq!(sent, got, "request {sent} received reply for {got}");
        received += 1;
    }
    assert_eq!(received, 100);
    assert_eq!(pool.pending_count(), 0);

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn round_robin_selects_each_worker_equally() {
    let pool = WorkerPool::new(PoolConfig::default().size(3), parser_factory).unwrap();
    pool.wait_ready().await.unwrap();

    let workers = pool.size();
    let rounds = 7;
    let mut counts = vec![0; workers];
    for _ in 0..workers * rounds {
        counts[pool.acquire_worker().unwrap().slot()] += 1;
    }
    assert!(counts.iter().all(|&c| c == rounds), "{counts:?}");

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn decoded_tiles_carry_normals_and_transfer_list() {
    let pool = WorkerPool::new(PoolConfig::default(), parser_factory).unwrap();
    let client = pool.client();

    let tile = client.decode(tagged(0), "tiles/").await.unwrap();
    let primitive = tile.primitive(0, 0).unwrap();
    let normals = primitive.attribute(NORMAL).unwrap();
    assert_eq!(normals.data.as_f32().unwrap()[..3], [0.0, 0.0, 1.0]);
    assert_eq!(tile.stats.synthesized_normals, 1);
    assert!(tile.transferables.contains(&normals.data));

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_stay_with_their_request() {
    init_tracing();
    let pool = WorkerPool::new(PoolConfig::default(), parser_factory).unwrap();
    let client = pool.client();

    let (malformed, panicked, healthy) = tokio::join!(
        client.decode(vec![MALFORMED], "tiles/"),
        client.decode(vec![PANIC], "tiles/"),
        client.decode(tagged(42), "tiles/"),
    );

    match malformed {
        Err(Error::Remote(message)) => {
            assert!(message.contains("invalid quantization bit width 40"), "{message}");
        }
        other => panic!("expected remote failure, got {other:?}"),
    }
    match panicked {
        Err(Error::Remote(message)) => assert!(message.contains("truncated draco stream")),
        other => panic!("expected remote failure, got {other:?}"),
    }
    assert_eq!(tag_of(&healthy.unwrap()), 42);

    assert_eq!(pool.worker_states(), vec![WorkerState::Ready]);
    let after = client.decode(tagged(7), "tiles/").await.unwrap();
    assert_eq!(tag_of(&after), 7);

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_worker_is_never_selected() {
    let boots = Arc::new(AtomicUsize::new(0));
    let factory = {
        let boots = Arc::clone(&boots);
        move || -> Result<fn(Vec<u8>, &str) -> Result<ParsedTile>> {
            if boots.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::Parse("draco module failed to load".into()));
            }
            Ok(parse)
        }
    };
    let pool = WorkerPool::new(PoolConfig::default().size(2), factory).unwrap();
    if pool.size() < 2 {
        release(pool).await;
        return;
    }

    let failed_slot = match pool.wait_ready().await {
        Err(Error::WorkerBoot { slot, message }) => {
            assert!(message.contains("draco module failed to load"));
            slot
        }
        other => panic!("expected boot failure, got {other:?}"),
    };
    assert!(matches!(pool.worker_states()[failed_slot], WorkerState::Failed(_)));

    for _ in 0..10 {
        assert_ne!(pool.acquire_worker().unwrap().slot(), failed_slot);
    }
    let tile = pool.client().decode(tagged(3), "tiles/").await.unwrap();
    assert_eq!(tag_of(&tile), 3);

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_without_usable_workers_refuses_work() {
    let factory = || -> Result<fn(Vec<u8>, &str) -> Result<ParsedTile>> {
        Err(Error::Parse("no decoder".into()))
    };
    let pool = WorkerPool::new(PoolConfig::default().size(2), factory).unwrap();

    assert!(matches!(
        pool.wait_ready().await,
        Err(Error::WorkerBoot { .. })
    ));
    assert!(matches!(pool.acquire_worker(), Err(Error::NoUsableWorkers)));
    assert!(matches!(
        pool.client().decode(tagged(1), "tiles/").await,
        Err(Error::NoUsableWorkers)
    ));

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoned_requests_release_their_slot() {
    let pool = WorkerPool::new(PoolConfig::default(), parser_factory).unwrap();
    pool.wait_ready().await.unwrap();
    let client = pool.client();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), client.decode(vec![SLOW], "tiles/")).await;
    assert!(abandoned.is_err());
    assert_eq!(pool.pending_count(), 0);

    // Queued behind the abandoned tile; its late reply is discarded.
    let tile = client.decode(tagged(9), "tiles/").await.unwrap();
    assert_eq!(tag_of(&tile), 9);
    assert_eq!(pool.pending_count(), 0);

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_in_flight_keys_are_rejected() {
    let pool = WorkerPool::new(PoolConfig::default(), parser_factory).unwrap();
    pool.wait_ready().await.unwrap();
    let client = pool.client();

    let request = |buffer: Vec<u8>| DecodeRequest {
        request_id: 5,
        client_id: client.id(),
        buffer,
        source_path: "tiles/".to_owned(),
    };

    let first = {
        let pool = pool.clone();
        let worker = pool.acquire_worker().unwrap();
        let request = request(vec![SLOW]);
        tokio::spawn(async move { pool.submit(worker, request).await })
    };
    while pool.pending_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let worker = pool.acquire_worker().unwrap();
    assert!(matches!(
        pool.submit(worker, request(tagged(1))).await,
        Err(Error::DuplicateRequest { request_id: 5, .. })
    ));
    assert!(first.await.unwrap().is_ok());

    release(pool).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn release_terminates_pending_requests() {
    let pool = WorkerPool::new(PoolConfig::default(), parser_factory).unwrap();
    pool.wait_ready().await.unwrap();

    let client = Arc::new(pool.client());
    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.decode(vec![SLOW], "tiles/").await })
    };
    while pool.pending_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    release(pool.clone()).await;

    assert!(matches!(in_flight.await.unwrap(), Err(Error::PoolTerminated)));
    assert_eq!(pool.worker_states(), vec![WorkerState::Terminated]);
    assert!(matches!(pool.acquire_worker(), Err(Error::PoolTerminated)));
    assert!(matches!(
        client.decode(tagged(1), "tiles/").await,
        Err(Error::PoolTerminated)
    ));
}
