//! # oggvorbis-codec
//!
//! Ogg Vorbis 解码器编解码层, 提供 Packet/AudioFrame 抽象与 Vorbis 解码器.
//!
//! 本 crate 对标 FFmpeg 的 libavcodec: 只处理已重组好的数据包,
//! 不关心 Ogg 页面与字节流同步.
//!
//! ## 使用示例
//!
//! ```rust
//! use oggvorbis_codec::{Decoder, VorbisDecoder, VorbisDecoderOptions};
//!
//! let decoder = VorbisDecoder::new(VorbisDecoderOptions::default());
//! assert_eq!(decoder.name(), "vorbis");
//! assert!(decoder.info().is_none());
//! ```

pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;

// 重导出常用类型
pub use decoder::Decoder;
pub use decoders::vorbis::{ChannelOrder, Comment, Info, VorbisDecoder, VorbisDecoderOptions};
pub use frame::AudioFrame;
pub use packet::{NO_GRANULE, Packet};
