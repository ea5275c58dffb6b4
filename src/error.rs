//! 에러 타입 정의

use thiserror::Error;

/// 잘못된 데이터그램 (드롭 대상, 치명적이지 않음)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("알 수 없는 패킷 종류: {0}")]
    UnknownKind(u8),

    #[error("헤더 잘림: {len} bytes (최소 {expected} bytes)")]
    TruncatedHeader { len: usize, expected: usize },

    #[error("페이로드 크기 초과: {len} bytes (최대 {max} bytes)")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("END 패킷에 페이로드 존재: {len} bytes")]
    EndWithPayload { len: usize },
}

/// DGFT 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    /// 원본 데이터를 읽을 수 없음 (현재 전송 중단, 재시도 없음)
    #[error("소스 읽기 에러: {0}")]
    Source(#[source] std::io::Error),

    /// 소켓 수준 실패 (연결 해제)
    #[error("전송 에러: {0}")]
    Transport(#[source] std::io::Error),

    #[error("프로토콜 에러: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("원격 주소 없음")]
    NoPeer,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("태스크 실패: {0}")]
    TaskFailed(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
