//! # DGFT (Datagram File Transfer)
//!
//! UDP 기반 단방향 청크 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **Fire-and-forget**: ACK/재전송 없이 청크를 순서대로 흘려보냄
//! - **END 마커**: 스트림 끝을 명시적인 종료 패킷으로 표시
//! - **손실 허용**: 손실/순서 뒤바뀜이 수신측 상태를 깨뜨리지 않음
//! - **Pacing**: 고정 지연 또는 토큰 버킷 기반 송신 간격 제어
//! - **손실 시뮬레이션**: 테스트용 확률적 패킷 드롭
//!
//! ## 와이어 포맷
//! ```text
//! [1 byte kind: 0=DATA, 1=END][8 bytes sequence, big-endian][payload]
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod packet;
pub mod pacing;
pub mod segmenter;
pub mod session;
pub mod socket;
pub mod stats;
pub mod transport;

pub use assembler::{Assembler, CompletedStream, StreamState};
pub use config::Config;
pub use error::{Error, ProtocolError, Result};
pub use packet::{Packet, PacketKind, Sequence};
pub use pacing::{Pacer, TokenBucket};
pub use segmenter::{segment_bytes, Segmenter};
pub use session::{CompletedFile, CompletedReceiver, Connection, Receiver, Sender};
pub use socket::{DatagramSocket, MemorySocket};
pub use stats::{SendStats, SharedStats, TransferStats};
pub use transport::{Delivery, LossSimulator, Received, Transport, TransportCounters};

/// 기본 페이로드 크기 (BUFFER_SIZE, 바이트)
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// 기본 송신 간격 (밀리초)
pub const DEFAULT_PACING_DELAY_MS: u64 = 10;

/// 패킷 헤더 길이 (kind 1 + sequence 8)
pub const HEADER_LEN: usize = 9;

/// UDP 데이터그램 최대 페이로드 (IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65507;
