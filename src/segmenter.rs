//! 세그먼터 (송신측)
//!
//! 바이트 소스를 고정 크기 청크로 나누어 DATA 패킷을 만들고,
//! 소스가 끝나면 END 패킷 하나로 스트림을 닫는다.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::{Packet, Sequence};
use crate::{Error, Result};

/// 지연 패킷 생성기 (소스를 한 번만 소비)
pub struct Segmenter<R> {
    source: R,
    chunk_size: usize,
    next_sequence: Sequence,
    finished: bool,
}

impl<R: AsyncRead + Unpin> Segmenter<R> {
    pub fn new(source: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
        }

        Ok(Self {
            source,
            chunk_size,
            next_sequence: 0,
            finished: false,
        })
    }

    /// 다음 패킷 생성
    ///
    /// END 이후에는 항상 `None`.
    pub async fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;

        // 짧은 읽기는 청크가 찰 때까지 반복
        while filled < self.chunk_size {
            let n = self
                .source
                .read(&mut buf[filled..])
                .await
                .map_err(Error::Source)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if filled == 0 {
            self.finished = true;
            return Ok(Some(Packet::end(sequence)));
        }

        buf.truncate(filled);
        Ok(Some(Packet::data(sequence, Bytes::from(buf))))
    }

    /// 다음에 할당될 시퀀스 번호
    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// 메모리 데이터를 패킷 목록으로 분할
pub fn segment_bytes(data: &[u8], chunk_size: usize) -> Result<Vec<Packet>> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk_size는 0보다 커야 함".into()));
    }

    let mut packets: Vec<Packet> = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(idx, chunk)| Packet::data(idx as Sequence, Bytes::copy_from_slice(chunk)))
        .collect();
    packets.push(Packet::end(packets.len() as Sequence));

    Ok(packets)
}
