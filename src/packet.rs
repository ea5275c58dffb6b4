//! 패킷 정의 및 와이어 직렬화
//!
//! ```text
//! +--------+----------------------+-----------------+
//! | kind 1 | sequence 8 (BE)      | payload ...     |
//! +--------+----------------------+-----------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::HEADER_LEN;

/// 시퀀스 번호 (스트림 내 단조 증가)
pub type Sequence = u64;

/// 패킷 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// 데이터 청크
    Data = 0,

    /// 스트림 종료 마커
    End = 1,
}

impl TryFrom<u8> for PacketKind {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(PacketKind::Data),
            1 => Ok(PacketKind::End),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// 패킷 (데이터그램 하나)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: Sequence,
    pub kind: PacketKind,
    pub payload: Bytes,
}

impl Packet {
    /// DATA 패킷 생성
    pub fn data(sequence: Sequence, payload: Bytes) -> Self {
        Self {
            sequence,
            kind: PacketKind::Data,
            payload,
        }
    }

    /// END 패킷 생성 (빈 페이로드)
    pub fn end(sequence: Sequence) -> Self {
        Self {
            sequence,
            kind: PacketKind::End,
            payload: Bytes::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.kind == PacketKind::End
    }

    /// 직렬화된 길이
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// 버퍼에 직렬화
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_len());
        buf.put_u8(self.kind as u8);
        buf.put_u64(self.sequence);
        buf.put_slice(&self.payload);
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    ///
    /// `max_payload`를 넘는 페이로드, 페이로드가 있는 END는 거부한다.
    pub fn from_bytes(bytes: &[u8], max_payload: usize) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedHeader {
                len: bytes.len(),
                expected: HEADER_LEN,
            });
        }

        let mut cursor = bytes;
        let kind = PacketKind::try_from(cursor.get_u8())?;
        let sequence = cursor.get_u64();

        let payload_len = cursor.remaining();
        if payload_len > max_payload {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload_len,
                max: max_payload,
            });
        }
        if kind == PacketKind::End && payload_len > 0 {
            return Err(ProtocolError::EndWithPayload { len: payload_len });
        }

        Ok(Self {
            sequence,
            kind,
            payload: Bytes::copy_from_slice(cursor),
        })
    }
}
