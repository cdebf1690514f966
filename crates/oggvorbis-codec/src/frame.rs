//! 解码后的音频帧 (AudioFrame).
//!
//! 采样数据为交错排列的小端字节, 格式由 [`SampleFormat`] 决定.

use oggvorbis_core::SampleFormat;

/// 音频帧
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 交错采样数据 (小端)
    pub data: Vec<u8>,
    /// 本帧包含的采样数 (每声道)
    pub nb_samples: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 本帧首个采样在所属逻辑流中的绝对位置
    pub pts: i64,
    /// 所属逻辑流的序列号
    pub serial: u32,
    /// 串接链序号 (从 0 开始)
    pub chain_index: u32,
}

impl AudioFrame {
    /// 创建空的音频帧
    pub fn new(sample_rate: u32, channels: u32, sample_format: SampleFormat) -> Self {
        Self {
            data: Vec::new(),
            nb_samples: 0,
            sample_rate,
            channels,
            sample_format,
            pts: 0,
            serial: 0,
            chain_index: 0,
        }
    }

    /// 每个采样帧 (所有声道) 的字节数
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// 截断到前 `nb_samples` 个采样帧
    pub fn truncate(&mut self, nb_samples: u32) {
        if nb_samples < self.nb_samples {
            self.nb_samples = nb_samples;
            self.data.truncate(nb_samples as usize * self.bytes_per_frame());
        }
    }

    /// 丢弃开头 `nb_samples` 个采样帧, pts 随之后移
    pub fn skip_front(&mut self, nb_samples: u32) {
        let n = nb_samples.min(self.nb_samples);
        self.data.drain(..n as usize * self.bytes_per_frame());
        self.nb_samples -= n;
        self.pts += i64::from(n);
    }

    /// 读取 S16 帧的全部采样 (交错)
    ///
    /// 非 S16 格式返回 `None`.
    pub fn samples_s16(&self) -> Option<Vec<i16>> {
        if self.sample_format != SampleFormat::S16 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect(),
        )
    }

    /// 读取 F32 帧的全部采样 (交错)
    ///
    /// 非 F32 格式返回 `None`.
    pub fn samples_f32(&self) -> Option<Vec<f32>> {
        if self.sample_format != SampleFormat::F32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_截断() {
        let mut frame = AudioFrame::new(44100, 2, SampleFormat::S16);
        frame.data = vec![0u8; 4 * 10];
        frame.nb_samples = 10;
        frame.truncate(3);
        assert_eq!(frame.nb_samples, 3);
        assert_eq!(frame.data.len(), 12);
        frame.truncate(5);
        assert_eq!(frame.nb_samples, 3);
    }

    #[test]
    fn test_丢弃开头() {
        let mut frame = AudioFrame::new(8000, 1, SampleFormat::S16);
        frame.data = vec![1, 0, 2, 0, 3, 0, 4, 0];
        frame.nb_samples = 4;
        frame.pts = 100;
        frame.skip_front(3);
        assert_eq!(frame.nb_samples, 1);
        assert_eq!(frame.pts, 103);
        assert_eq!(frame.samples_s16(), Some(vec![4]));
        frame.skip_front(5);
        assert_eq!(frame.nb_samples, 0);
        assert!(frame.data.is_empty());
        assert_eq!(frame.pts, 104);
    }

    #[test]
    fn test_采样读取() {
        let mut frame = AudioFrame::new(8000, 1, SampleFormat::S16);
        frame.data = vec![0x01, 0x00, 0xFF, 0xFF];
        frame.nb_samples = 2;
        assert_eq!(frame.samples_s16(), Some(vec![1, -1]));
        assert_eq!(frame.samples_f32(), None);
    }
}
