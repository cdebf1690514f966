//! 音频采样格式定义.
//!
//! 解码器内部以 f32 计算, 输出时按消费者请求的格式打包为交错小端字节.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 输出采样格式 (交错)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 有符号 16 位整数
    #[default]
    S16,
    /// 32 位浮点
    F32,
}

impl SampleFormat {
    /// 每个采样点占用的字节数
    pub const fn bytes_per_sample(&self) -> usize {
        match self {
            Self::S16 => 2,
            Self::F32 => 4,
        }
    }

    /// 将交错 f32 采样打包为字节, 追加到 `out`
    ///
    /// S16 为参考转换: 乘以 32767 后截断并钳位到 i16 范围.
    pub fn pack_into(&self, samples: &[f32], out: &mut Vec<u8>) {
        out.reserve(samples.len() * self.bytes_per_sample());
        match self {
            Self::S16 => {
                for &s in samples {
                    out.extend_from_slice(&f32_to_s16(s).to_le_bytes());
                }
            }
            Self::F32 => {
                for &s in samples {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::S16 => "s16",
            Self::F32 => "flt",
        };
        write!(f, "{name}")
    }
}

/// f32 → i16 参考转换 (向零截断, NaN 视为 0)
pub fn f32_to_s16(v: f32) -> i16 {
    ((v * 32767.0) as i32).clamp(-32768, 32767) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_截断() {
        assert_eq!(f32_to_s16(0.0), 0);
        assert_eq!(f32_to_s16(1.0), 32767);
        assert_eq!(f32_to_s16(2.5), 32767);
        assert_eq!(f32_to_s16(-1.0), -32767);
        assert_eq!(f32_to_s16(-3.0), -32768);
        assert_eq!(f32_to_s16(0.5), 16383);
        assert_eq!(f32_to_s16(f32::NAN), 0);
    }

    #[test]
    fn test_打包小端() {
        let mut out = Vec::new();
        SampleFormat::S16.pack_into(&[1.0, -1.0], &mut out);
        assert_eq!(out, vec![0xFF, 0x7F, 0x01, 0x80]);

        let mut out = Vec::new();
        SampleFormat::F32.pack_into(&[0.5], &mut out);
        assert_eq!(out, 0.5f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_显示名称() {
        assert_eq!(SampleFormat::S16.to_string(), "s16");
        assert_eq!(SampleFormat::F32.bytes_per_sample(), 4);
    }
}
