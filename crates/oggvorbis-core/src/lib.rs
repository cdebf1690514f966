//! # oggvorbis-core
//!
//! Ogg Vorbis 解码器核心库, 提供错误类型、比特流读写、CRC 与采样格式.

pub mod bitreader;
pub mod bitwriter;
pub mod crc;
pub mod error;
pub mod sample_format;

// 重导出常用类型
pub use bitreader::{BitCursor, PrefixCode, ilog};
pub use bitwriter::BitWriter;
pub use error::{OvError, OvResult};
pub use sample_format::SampleFormat;
