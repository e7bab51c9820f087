//! 줄 단위 프레이밍
//!
//! [`LineFramer`]는 임의 크기로 나뉘어 도착한 바이트를 개행 기준의 완전한 줄로
//! 재조립합니다. 개행으로 끝나지 않은 마지막 조각은 버퍼에 남겨 두었다가
//! 다음 읽기에서 이어 붙입니다.
//!
//! `max_line_length`를 넘는 줄은 [`Frame::Oversized`]로 한 번 보고되고,
//! 그 줄의 나머지 바이트는 다음 개행까지 버려집니다.

use bytes::{Bytes, BytesMut};

/// 프레이머 출력
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 개행(`\n`, 선택적 `\r`)을 제외한 완전한 줄
    Line(Bytes),
    /// 최대 길이를 넘어 버려진 줄 (관측된 바이트 수)
    Oversized(usize),
}

/// 개행 기준 줄 재조립기
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_length: usize,
    /// 초과 길이 줄의 나머지를 버리는 중
    discarding: bool,
}

impl LineFramer {
    /// 새 프레이머를 생성합니다.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_line_length,
            discarding: false,
        }
    }

    /// 읽은 바이트를 덧붙입니다.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// 다음 완전한 줄을 꺼냅니다. 완전한 줄이 없으면 `None`.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let mut line = self.buf.split_to(pos + 1);
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    line.truncate(pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(pos - 1);
                    }
                    if line.len() > self.max_line_length {
                        return Some(Frame::Oversized(line.len()));
                    }
                    return Some(Frame::Line(line.freeze()));
                }
                None => {
                    if self.buf.len() > self.max_line_length {
                        let dropped = self.buf.len();
                        self.buf.clear();
                        if !self.discarding {
                            self.discarding = true;
                            return Some(Frame::Oversized(dropped));
                        }
                    }
                    return None;
                }
            }
        }
    }

    /// 아직 개행을 만나지 못한 바이트 수
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
