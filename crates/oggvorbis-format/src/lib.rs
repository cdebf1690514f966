//! # oggvorbis-format
//!
//! Ogg Vorbis 解码器容器层, 负责 Ogg 页面的同步、校验、重组与封装.
//!
//! 本 crate 对标 FFmpeg 的 libavformat: 输入为任意切分的字节,
//! 输出为按逻辑流重组好的 [`Packet`](oggvorbis_codec::Packet).

pub mod logical_stream;
pub mod page;
pub mod page_writer;

// 重导出常用类型
pub use logical_stream::LogicalStream;
pub use page::{MAX_PAGE_SIZE, Page, PageDemuxer, PageFlags};
pub use page_writer::PageWriter;
