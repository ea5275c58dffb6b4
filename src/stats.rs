//! 전송 통계

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::packet::Sequence;

/// 수신 통계 (Assembler 소유)
///
/// 명시적 `reset()` 외에는 감소하지 않는다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// 수신한 DATA 패킷 수
    pub packets_received: u64,

    /// 수신한 DATA 페이로드 총 바이트
    pub bytes_received: u64,

    /// 처리한 END 패킷 수
    pub files_completed: u64,

    /// 같은 스트림 내 중복 시퀀스
    pub duplicate_packets: u64,

    /// END 이후 도착한 패킷
    pub anomalous_packets: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// DATA 도착 기록
    pub fn record_data(&mut self, len: usize) {
        self.packets_received += 1;
        self.bytes_received += len as u64;
    }

    /// END 도착 기록
    pub fn record_end(&mut self) {
        self.files_completed += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicate_packets += 1;
    }

    pub fn record_anomaly(&mut self) {
        self.anomalous_packets += 1;
    }

    /// 통계 리셋
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Packets: {} | Bytes: {} | Files: {} | Duplicates: {} | Anomalies: {}",
            self.packets_received,
            self.bytes_received,
            self.files_completed,
            self.duplicate_packets,
            self.anomalous_packets,
        )
    }
}

/// 프로세스 전체 집계 통계 (여러 피어/태스크 공유)
#[derive(Debug, Default)]
pub struct SharedStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    files_completed: AtomicU64,
    duplicate_packets: AtomicU64,
    anomalous_packets: AtomicU64,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_data(&self, len: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_end(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalous_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 값 스냅샷
    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            duplicate_packets: self.duplicate_packets.load(Ordering::Relaxed),
            anomalous_packets: self.anomalous_packets.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.files_completed.store(0, Ordering::Relaxed);
        self.duplicate_packets.store(0, Ordering::Relaxed);
        self.anomalous_packets.store(0, Ordering::Relaxed);
    }
}

/// 송신 결과 보고
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    /// 소켓으로 나간 패킷 수 (END 포함)
    pub packets_sent: u64,

    /// 소켓으로 나간 페이로드 바이트
    pub bytes_sent: u64,

    /// 손실 시뮬레이션으로 버려진 패킷 수
    pub packets_dropped: u64,

    /// END 패킷 시퀀스 (= DATA 패킷 수)
    pub end_sequence: Sequence,

    /// 소요 시간
    pub elapsed: Duration,
}

impl SendStats {
    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / secs
    }

    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Packets: {} (+{} dropped) | Bytes: {} | Throughput: {:.2} KB/s",
            self.elapsed.as_secs_f64(),
            self.packets_sent,
            self.packets_dropped,
            self.bytes_sent,
            self.throughput() / 1024.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_transfer_stats_counts_and_reset() {
        let mut stats = TransferStats::new();
        stats.record_data(1024);
        stats.record_data(452);
        stats.record_end();

        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.bytes_received, 1476);
        assert_eq!(stats.files_completed, 1);

        stats.reset();
        assert_eq!(stats, TransferStats::default());
    }

    #[test]
    fn test_shared_stats_across_threads() {
        let shared = Arc::new(SharedStats::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        shared.record_data(10);
                    }
                    shared.record_end();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.packets_received, 4000);
        assert_eq!(snapshot.bytes_received, 40_000);
        assert_eq!(snapshot.files_completed, 4);

        shared.reset();
        assert_eq!(shared.snapshot(), TransferStats::default());
    }

    #[test]
    fn test_send_stats_throughput() {
        let stats = SendStats {
            bytes_sent: 2048,
            elapsed: Duration::from_secs(2),
            ..SendStats::default()
        };
        assert_eq!(stats.throughput(), 1024.0);
        assert_eq!(SendStats::default().throughput(), 0.0);
    }
}
