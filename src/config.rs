//! 프로토콜 설정

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::{Error, Result, DEFAULT_BUFFER_SIZE, DEFAULT_PACING_DELAY_MS, HEADER_LEN, MAX_DATAGRAM_SIZE};

/// 기본 포트
pub const DEFAULT_PORT: u16 = 1234;

/// DGFT 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 송신 대상 주소
    pub remote_address: SocketAddr,

    /// 로컬 바인드 주소
    pub local_address: SocketAddr,

    /// 청크 크기 = 데이터그램당 최대 페이로드 (BUFFER_SIZE)
    pub chunk_size: usize,

    /// 패킷 간 송신 지연 (밀리초)
    /// 0이면 지연 없이 최대 속도로 전송
    pub pacing_delay_ms: u64,

    /// 토큰 버킷 송신 속도 (bytes/sec)
    /// 설정되면 고정 지연 대신 사용
    pub pacing_rate: Option<u64>,

    /// 토큰 버킷 버스트 크기 (바이트)
    pub pacing_burst: usize,

    /// 손실 시뮬레이션 확률 (0.0 ~ 1.0, 테스트 전용)
    pub loss_probability: f64,

    /// 손실 시뮬레이션 시드 (결정적 재현용)
    pub loss_seed: Option<u64>,

    /// 수신측 파일 재조립 여부
    pub reassemble: bool,

    /// 완료 스트림 채널 크기
    pub completed_queue_size: usize,

    /// 수신측 유휴 피어 제거 시간 (밀리초)
    /// 이 시간 동안 패킷이 없으면 조립기와 피어별 통계를 버림. 0이면 제거 안 함
    pub peer_idle_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            local_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            chunk_size: DEFAULT_BUFFER_SIZE,
            pacing_delay_ms: DEFAULT_PACING_DELAY_MS, // 10ms
            pacing_rate: None,
            pacing_burst: 16 * DEFAULT_BUFFER_SIZE,
            loss_probability: 0.0,
            loss_seed: None,
            reassemble: true,
            completed_queue_size: 100,
            peer_idle_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 손실 시뮬레이션용 설정
    pub fn simulation(loss_probability: f64) -> Self {
        Self {
            pacing_delay_ms: 0,
            loss_probability,
            loss_seed: Some(0x5EED),
            ..Self::default()
        }
    }

    /// 고성능 설정 (큰 청크 + 토큰 버킷)
    pub fn high_throughput() -> Self {
        Self {
            chunk_size: 1400,
            pacing_delay_ms: 0,
            pacing_rate: Some(50 * 1024 * 1024), // 50MB/s
            pacing_burst: 64 * 1400,
            completed_queue_size: 1000,
            ..Self::default()
        }
    }

    /// 데이터그램 최대 크기 (헤더 포함)
    pub fn max_datagram_len(&self) -> usize {
        HEADER_LEN + self.chunk_size
    }

    /// 유휴 피어 제거 시간 (비활성이면 `None`)
    pub fn peer_idle_timeout(&self) -> Option<Duration> {
        (self.peer_idle_timeout_ms > 0).then(|| Duration::from_millis(self.peer_idle_timeout_ms))
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }
        if self.max_datagram_len() > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} 초과: 데이터그램 최대 {} bytes",
                self.chunk_size, MAX_DATAGRAM_SIZE
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(Error::InvalidConfig(format!(
                "loss_probability {}는 0.0 ~ 1.0 범위여야 함",
                self.loss_probability
            )));
        }
        if self.pacing_rate == Some(0) {
            return Err(Error::InvalidConfig("pacing_rate는 0보다 커야 함".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.pacing_delay_ms, 10);
        assert_eq!(config.loss_probability, 0.0);
        assert_eq!(config.max_datagram_len(), 1033);
        assert_eq!(config.peer_idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_idle_timeout_disables_eviction() {
        let config = Config {
            peer_idle_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.peer_idle_timeout(), None);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::simulation(0.3).validate().is_ok());
        assert!(Config::high_throughput().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_chunk = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(zero_chunk.validate(), Err(Error::InvalidConfig(_))));

        let huge_chunk = Config {
            chunk_size: MAX_DATAGRAM_SIZE,
            ..Config::default()
        };
        assert!(huge_chunk.validate().is_err());

        assert!(Config::simulation(1.5).validate().is_err());
        assert!(Config::simulation(-0.1).validate().is_err());

        let zero_rate = Config {
            pacing_rate: Some(0),
            ..Config::default()
        };
        assert!(zero_rate.validate().is_err());
    }
}
