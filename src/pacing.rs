//! 송신 pacing
//!
//! 혼잡 제어가 아니라 채널을 과부하시키지 않기 위한 스케줄링 힌트.
//! - `Fixed`: 패킷마다 고정 지연
//! - `TokenBucket`: bytes/sec 속도 제한 (연결별로 독립)

use std::time::{Duration, Instant};

use crate::Config;

/// 토큰 버킷 속도 제한기
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// 충전 속도 (bytes/sec)
    rate: f64,

    /// 최대 토큰 (버스트 크기)
    capacity: f64,

    /// 현재 토큰, 음수면 빚
    tokens: f64,

    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: u64, burst: usize) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    pub fn new_at(rate: u64, burst: usize, now: Instant) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            rate: rate.max(1) as f64,
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + dt * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// `bytes`만큼 소비하고 다음 송신까지 기다릴 시간 반환
    pub fn reserve_at(&mut self, bytes: usize, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= bytes as f64;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }

    pub fn reserve(&mut self, bytes: usize) -> Duration {
        self.reserve_at(bytes, Instant::now())
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// 송신 간격 정책
#[derive(Debug, Clone)]
pub enum Pacer {
    /// 지연 없음
    Unpaced,

    /// 패킷마다 고정 지연
    Fixed(Duration),

    /// 토큰 버킷
    TokenBucket(TokenBucket),
}

impl Pacer {
    /// 설정에서 생성 (`pacing_rate`가 있으면 토큰 버킷 우선)
    pub fn from_config(config: &Config) -> Self {
        match config.pacing_rate {
            Some(rate) => Pacer::TokenBucket(TokenBucket::new(rate, config.pacing_burst)),
            None if config.pacing_delay_ms > 0 => {
                Pacer::Fixed(Duration::from_millis(config.pacing_delay_ms))
            }
            None => Pacer::Unpaced,
        }
    }

    /// `bytes` 송신 후 다음 송신 전 대기 시간
    pub fn delay_after(&mut self, bytes: usize) -> Duration {
        match self {
            Pacer::Unpaced => Duration::ZERO,
            Pacer::Fixed(delay) => *delay,
            Pacer::TokenBucket(bucket) => bucket.reserve(bytes),
        }
    }
}
