//! End-to-end transfers over loopback UDP.
//!
//! Each test runs a sender and a receiver session on one current-thread
//! runtime; the sender's retransmission deadline drives loss recovery.

use std::net::SocketAddr;
use std::path::PathBuf;

use ferrystream::endpoint::Endpoint;
use ferrystream::error::FerryError;
use ferrystream::fault::{FaultInjector, FaultPlan};
use ferrystream::packet::Packet;
use ferrystream::receiver::receive_file;
use ferrystream::sender::{send_file, send_file_with_faults, TransferStats};
use ferrystream::session::Session;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Run one complete transfer of `contents` under the given fault plan.
/// Returns the received bytes and the sender's statistics.
async fn transfer(
    contents: &[u8],
    name: &str,
    faults: Option<FaultInjector>,
) -> (Vec<u8>, TransferStats) {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join(name);
    std::fs::write(&src, contents).unwrap();

    let mut receiver = Session::bind(loopback()).await.unwrap();
    let addr = receiver.local_addr().unwrap();
    let mut sender = Session::open().await.unwrap();

    let recv_side = async {
        receiver.accept().await.unwrap();
        let path = receive_file(&mut receiver, out_dir.path()).await.unwrap();
        receiver.handle_disconnect().await.unwrap();
        path
    };
    let send_side = async {
        sender.connect(addr).await.unwrap();
        let stats = match faults {
            Some(injector) => send_file_with_faults(&mut sender, &src, injector)
                .await
                .unwrap(),
            None => send_file(&mut sender, &src).await.unwrap(),
        };
        sender.disconnect().await.unwrap();
        stats
    };

    let (path, stats): (PathBuf, TransferStats) = tokio::join!(recv_side, send_side);
    let received = std::fs::read(&path).unwrap();
    (received, stats)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Lossless transfers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lossless_tiny_file() {
    let (received, stats) = transfer(b"abc", "tiny.txt", None).await;
    assert_eq!(received, b"abc");
    assert_eq!(stats.packets_sent, 1);
    assert_eq!(stats.packets_dropped, 0);
    assert_eq!(stats.packets_corrupted, 0);
}

#[tokio::test]
async fn lossless_multi_chunk() {
    let contents = pattern(2500);
    let (received, stats) = transfer(&contents, "multi.bin", None).await;
    assert_eq!(received, contents);
    // 1024 + 1024 + 452 -> three DATA packets.
    assert_eq!(stats.packets_sent, 3);
}

#[tokio::test]
async fn empty_file_transfers() {
    let (received, stats) = transfer(b"", "empty.bin", None).await;
    assert!(received.is_empty());
    assert_eq!(stats.packets_sent, 0);
}

#[tokio::test]
async fn exactly_one_chunk() {
    let contents = pattern(1024);
    let (received, stats) = transfer(&contents, "one-chunk.bin", None).await;
    assert_eq!(received, contents);
    assert_eq!(stats.packets_sent, 1);
}

#[tokio::test]
async fn short_final_chunk() {
    let contents = pattern(1024 + 100);
    let (received, _) = transfer(&contents, "uneven.bin", None).await;
    assert_eq!(received, contents);
}

#[tokio::test]
async fn non_ascii_filename() {
    let contents = pattern(300);
    let (received, _) = transfer(&contents, "données-日本語.bin", None).await;
    assert_eq!(received, contents);
}

// ---------------------------------------------------------------------------
// Loss recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_drop_is_retransmitted() {
    let contents = pattern(10 * 1024);
    let injector = FaultInjector::with_seed(FaultPlan::drop_seqs([4]), 1);
    let (received, stats) = transfer(&contents, "dropped.bin", Some(injector)).await;

    assert_eq!(received, contents);
    assert_eq!(stats.packets_dropped, 1);
    assert!(stats.retransmissions >= 1);
}

#[tokio::test]
async fn single_corruption_is_retransmitted() {
    let contents = pattern(10 * 1024);
    let injector = FaultInjector::with_seed(FaultPlan::corrupt_seqs([2]), 1);
    let (received, stats) = transfer(&contents, "corrupted.bin", Some(injector)).await;

    assert_eq!(received, contents);
    assert_eq!(stats.packets_corrupted, 1);
    assert!(stats.retransmissions >= 1);
}

#[tokio::test]
async fn burst_loss_recovers() {
    let contents = pattern(10 * 1024);
    let injector = FaultInjector::with_seed(FaultPlan::drop_seqs([3, 4, 5]), 1);
    let (received, stats) = transfer(&contents, "burst.bin", Some(injector)).await;

    assert_eq!(received, contents);
    assert_eq!(stats.packets_dropped, 3);
    assert!(stats.retransmissions >= 1);
}

#[tokio::test]
async fn corrupt_first_chunk_recovers_from_sentinel_ack() {
    // Corrupting seq 0 makes the receiver ACK the "nothing delivered"
    // sentinel; the sender must not mistake it for a huge cumulative ACK.
    let contents = pattern(3 * 1024);
    let injector = FaultInjector::with_seed(FaultPlan::corrupt_seqs([0]), 1);
    let (received, stats) = transfer(&contents, "head-corrupt.bin", Some(injector)).await;

    assert_eq!(received, contents);
    assert_eq!(stats.packets_corrupted, 1);
    assert!(stats.retransmissions >= 1);
}

#[tokio::test]
async fn random_faults_over_many_chunks() {
    let contents = pattern(100 * 1024);
    let plan = FaultPlan::Random {
        drop_rate: 0.05,
        corrupt_rate: 0.03,
    };
    let injector = FaultInjector::with_seed(plan, 42);
    let (received, stats) = transfer(&contents, "large.bin", Some(injector)).await;

    assert_eq!(received, contents);
    assert!(stats.packets_sent >= 100);
}

// ---------------------------------------------------------------------------
// Protocol failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receive_rejects_non_metadata_first_packet() {
    let out_dir = tempfile::tempdir().unwrap();
    let mut receiver = Session::bind(loopback()).await.unwrap();
    let addr = receiver.local_addr().unwrap();

    // A hand-rolled peer that skips METADATA and sends EOF directly.
    let mut rogue = Endpoint::ephemeral().await.unwrap();

    let recv_side = async {
        receiver.accept().await.unwrap();
        receive_file(&mut receiver, out_dir.path()).await
    };
    let send_side = async {
        rogue.send_to(&Packet::Syn.encode(), addr).await.unwrap();
        let _ = rogue.recv_from().await.unwrap();
        rogue.send_to(&Packet::Eof.encode(), addr).await.unwrap();
    };

    let (result, ()) = tokio::join!(recv_side, send_side);
    match result {
        Err(FerryError::UnexpectedPacket { .. }) => {}
        other => panic!("expected UnexpectedPacket, got {other:?}"),
    }
}

#[tokio::test]
async fn send_requires_connection() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("f.bin");
    std::fs::write(&src, b"data").unwrap();

    let mut session = Session::open().await.unwrap();
    match send_file(&mut session, &src).await {
        Err(FerryError::NotConnected) => {}
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn send_requires_existing_file() {
    let mut receiver = Session::bind(loopback()).await.unwrap();
    let addr = receiver.local_addr().unwrap();
    let mut sender = Session::open().await.unwrap();

    let (accepted, connected) = tokio::join!(receiver.accept(), sender.connect(addr));
    accepted.unwrap();
    connected.unwrap();

    let missing = std::path::Path::new("/definitely/not/here.bin");
    match send_file(&mut sender, missing).await {
        Err(FerryError::FileNotFound(_)) => {}
        other => panic!("expected FileNotFound, got {other:?}"),
    }
}
