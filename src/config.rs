//! 解码器配置.

use oggvorbis_codec::{ChannelOrder, VorbisDecoderOptions};
use oggvorbis_core::SampleFormat;
use oggvorbis_format::page::DEFAULT_MAX_BUFFERED;
use serde::{Deserialize, Serialize};

/// 流式解码器配置
///
/// 所有字段都有默认值, 反序列化时可以只给出需要修改的字段.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 输出采样格式
    pub sample_format: SampleFormat,
    /// 输出声道顺序
    pub channel_order: ChannelOrder,
    /// 按 EOS 页的 granule position 截断流末尾
    pub trim_to_granule: bool,
    /// 寻找同步时最多缓冲的字节数
    pub max_buffered_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_format: SampleFormat::S16,
            channel_order: ChannelOrder::Vorbis,
            trim_to_granule: true,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED,
        }
    }
}

impl DecoderConfig {
    /// 转换为单个逻辑流解码器的选项
    pub fn vorbis_options(&self) -> VorbisDecoderOptions {
        VorbisDecoderOptions {
            sample_format: self.sample_format,
            channel_order: self.channel_order,
            trim_to_granule: self.trim_to_granule,
        }
    }
}
