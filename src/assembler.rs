//! 수신 조립기
//!
//! 스트림 상태 머신:
//! ```text
//! AwaitingData --DATA--> Receiving --DATA--> Receiving
//!      |                     |
//!      +-------END-----------+----> Complete
//! ```
//! Complete에서 새 패킷이 오면 새 스트림으로 시작한다 (이상 패킷으로 기록).
//! 버퍼에 있는 시퀀스가 다른 내용으로 다시 오면 이전 스트림의 END가 유실된
//! 것으로 보고 버퍼를 버린 뒤 새 스트림으로 시작한다 (역시 이상 패킷).
//! 손실/순서 뒤바뀜은 상태 머신을 깨뜨리지 않는다.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::packet::{Packet, PacketKind, Sequence};
use crate::stats::{SharedStats, TransferStats};

/// 스트림 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingData,
    Receiving,
    Complete,
}

/// END 수신 시 보고되는 스트림 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedStream {
    /// 이 조립기에서 몇 번째 스트림인지 (0부터)
    pub stream_index: u64,

    /// END 패킷 시퀀스 (= 기대 DATA 패킷 수)
    pub end_sequence: Sequence,

    /// 이 스트림에서 받은 고유 DATA 패킷 수
    pub packets: u64,

    /// 이 스트림에서 받은 고유 DATA 바이트
    pub bytes: u64,

    /// `0..end_sequence` 중 누락된 시퀀스 수
    pub missing: u64,

    /// 재조립된 파일 (재조립 활성 + 누락 없음일 때만)
    pub data: Option<Bytes>,
}

impl CompletedStream {
    /// 손실 없이 도착했는지
    pub fn is_intact(&self) -> bool {
        self.missing == 0
    }
}

/// 버퍼된 DATA 하나
#[derive(Debug)]
struct Chunk {
    len: usize,
    /// 재조립 비활성이면 빈 Bytes
    payload: Bytes,
}

/// 진행 중 스트림 버퍼
#[derive(Debug, Default)]
struct StreamBuffer {
    chunks: BTreeMap<Sequence, Chunk>,
    bytes: u64,
}

/// 수신 조립기 (연결/피어당 하나)
#[derive(Debug)]
pub struct Assembler {
    state: StreamState,
    stats: TransferStats,
    shared: Option<Arc<SharedStats>>,
    reassemble: bool,
    stream_index: u64,
    current: StreamBuffer,
}

impl Assembler {
    pub fn new(reassemble: bool) -> Self {
        Self {
            state: StreamState::AwaitingData,
            stats: TransferStats::new(),
            shared: None,
            reassemble,
            stream_index: 0,
            current: StreamBuffer::default(),
        }
    }

    /// 프로세스 전체 집계에 함께 기록
    pub fn with_shared(mut self, shared: Arc<SharedStats>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// 패킷 하나 처리
    pub fn on_packet(&mut self, packet: Packet) -> Option<CompletedStream> {
        if self.state == StreamState::Complete {
            // 세션 ID가 없으므로 새 스트림과 늦게 온 패킷을 구분할 수 없음
            warn!(
                "완료된 스트림 이후 패킷: {:?} seq={}, 새 스트림으로 처리",
                packet.kind, packet.sequence
            );
            self.record_anomaly();
            self.begin_stream();
        }

        match packet.kind {
            PacketKind::Data => {
                self.on_data(packet);
                None
            }
            PacketKind::End => Some(self.on_end(packet.sequence)),
        }
    }

    fn on_data(&mut self, packet: Packet) {
        let len = packet.payload.len();

        self.stats.record_data(len);
        if let Some(shared) = &self.shared {
            shared.record_data(len);
        }

        if let Some(stored) = self.current.chunks.get(&packet.sequence) {
            let same = stored.len == len && (!self.reassemble || stored.payload == packet.payload);
            if same {
                debug!("중복 패킷: seq={}", packet.sequence);
                self.stats.record_duplicate();
                if let Some(shared) = &self.shared {
                    shared.record_duplicate();
                }
                return;
            }

            warn!(
                "seq={} 내용 충돌, END 유실로 판단: 버퍼된 {} 패킷 폐기 후 새 스트림 시작",
                packet.sequence,
                self.current.chunks.len()
            );
            self.record_anomaly();
            self.begin_stream();
        }

        self.state = StreamState::Receiving;
        let payload = if self.reassemble {
            packet.payload
        } else {
            Bytes::new()
        };
        self.current.chunks.insert(packet.sequence, Chunk { len, payload });
        self.current.bytes += len as u64;
    }

    fn on_end(&mut self, end_sequence: Sequence) -> CompletedStream {
        self.stats.record_end();
        if let Some(shared) = &self.shared {
            shared.record_end();
        }

        let present = self.current.chunks.range(..end_sequence).count() as u64;
        let missing = end_sequence.saturating_sub(present);
        let trailing = self.current.chunks.len() as u64 - present;
        if trailing > 0 {
            warn!(
                "END(seq={}) 이후 시퀀스의 DATA {}개 존재",
                end_sequence, trailing
            );
        }

        let data = if self.reassemble && missing == 0 {
            let mut file = BytesMut::with_capacity(self.current.bytes as usize);
            for (_, chunk) in self.current.chunks.range(..end_sequence) {
                file.extend_from_slice(&chunk.payload);
            }
            Some(file.freeze())
        } else {
            None
        };

        let completed = CompletedStream {
            stream_index: self.stream_index,
            end_sequence,
            packets: self.current.chunks.len() as u64,
            bytes: self.current.bytes,
            missing,
            data,
        };

        if missing == 0 {
            info!(
                "스트림 {} 완료: {} 패킷, {} bytes",
                completed.stream_index, completed.packets, completed.bytes
            );
        } else {
            warn!(
                "스트림 {} 완료 (손실): {}/{} 패킷 누락",
                completed.stream_index, missing, end_sequence
            );
        }

        self.state = StreamState::Complete;
        self.stream_index += 1;
        self.current = StreamBuffer::default();

        completed
    }

    fn begin_stream(&mut self) {
        self.state = StreamState::AwaitingData;
        self.current = StreamBuffer::default();
    }

    fn record_anomaly(&mut self) {
        self.stats.record_anomaly();
        if let Some(shared) = &self.shared {
            shared.record_anomaly();
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// 통계 리셋 (스트림 상태는 유지)
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// 완료된 스트림 수
    pub fn streams_completed(&self) -> u64 {
        self.stream_index
    }

    /// 아직 END를 받지 못한 스트림에 버퍼된 DATA 수
    pub fn pending_packets(&self) -> usize {
        self.current.chunks.len()
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(true)
    }
}
