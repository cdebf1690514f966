//! # oggvorbis
//!
//! 纯 Rust 实现的 Ogg Vorbis 流式解码器.
//!
//! 输入为任意切分的 Ogg 字节流, 输出为交错 PCM 帧:
//! - **容器层**: Ogg 页面同步与 CRC 校验、逻辑流包重组、串接/复用流
//! - **编解码层**: 三个 Vorbis 头包、codebook/floor/residue/mapping 解码、IMDCT 与 overlap-add
//!
//! # 快速开始
//!
//! ```rust
//! use oggvorbis::{DecoderConfig, StreamDecoder};
//! use oggvorbis::core::OvError;
//!
//! let mut decoder = StreamDecoder::new(DecoderConfig::default());
//! decoder.feed(b"not an ogg stream");
//! decoder.finish();
//! loop {
//!     match decoder.next_frame() {
//!         Ok(frame) => println!("{} 采样帧", frame.nb_samples),
//!         Err(OvError::EndOfStream) => break,
//!         Err(e) => eprintln!("解码错误: {e}"),
//!     }
//! }
//! assert_eq!(decoder.stats().sync_losses, 1);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `oggvorbis-core` | 错误类型、比特流读写、CRC、采样格式 |
//! | `oggvorbis-codec` | Packet/AudioFrame 与 Vorbis 解码器 |
//! | `oggvorbis-format` | Ogg 页面同步、逻辑流重组、页面封装 |

/// 核心类型与工具 (对标 libavutil)
pub use oggvorbis_core as core;

/// 编解码层 (对标 libavcodec)
pub use oggvorbis_codec as codec;

/// 容器层 (对标 libavformat)
pub use oggvorbis_format as format;

pub mod config;
pub mod decoder;
pub mod logging;

pub use config::DecoderConfig;
pub use decoder::{DecodeStats, DecoderState, StreamDecoder};

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
