//! In-memory test audio

use std::io::Cursor;

/// 16-bit stereo WAV of `frames` frames holding a constant `value`
pub fn wav_bytes(frames: usize, sample_rate: u32, value: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let sample = (value * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for _ in 0..frames * 2 {
            writer.write_sample(sample).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}
