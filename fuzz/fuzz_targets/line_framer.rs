#![no_main]

use arbitrary::Arbitrary;
use frosty_eve_pipeline::tailer::framing::{Frame, LineFramer};
use frosty_eve_pipeline::tailer::router::classify;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    max_line_length: u8,
    chunks: Vec<Vec<u8>>,
}

fn frames(max: usize, chunks: &[Vec<u8>]) -> Vec<Frame> {
    let mut framer = LineFramer::new(max);
    let mut out = Vec::new();
    for chunk in chunks {
        framer.extend(chunk);
        while let Some(frame) = framer.next_frame() {
            out.push(frame);
        }
    }
    out
}

fn oversized(frames: &[Frame]) -> bool {
    frames.iter().any(|f| matches!(f, Frame::Oversized(_)))
}

fuzz_target!(|input: Input| {
    let max = usize::from(input.max_line_length).max(1);
    let split = frames(max, &input.chunks);
    let whole = frames(max, &[input.chunks.concat()]);

    // 길이 초과가 없으면 청크 경계와 무관하게 같은 줄이 나와야 함
    if !oversized(&split) && !oversized(&whole) {
        assert_eq!(split, whole);
    }

    for frame in &split {
        if let Frame::Line(line) = frame {
            assert!(line.len() <= max);
            let _ = classify(line);
        }
    }
});
