//! Ogg 页面封装: 把数据包切分为 lacing 段并组装成页面.

use bytes::Bytes;
use log::trace;

use crate::page::{Page, PageFlags};

/// 默认的页面数据目标大小 (字节)
pub const DEFAULT_PAGE_TARGET: usize = 4096;
/// 单页最大段数
const MAX_SEGMENTS: usize = 255;

/// 单个逻辑流的页面写入器
#[derive(Debug)]
pub struct PageWriter {
    serial: u32,
    sequence: u32,
    /// 页面数据达到该大小后在包边界 (或段边界) 换页
    page_target: usize,
    segments: Vec<u8>,
    body: Vec<u8>,
    /// 本页最后一个完结的包的 granule
    page_granule: Option<i64>,
    /// 本页首段延续上一页的包
    continued: bool,
    first_page: bool,
}

impl PageWriter {
    pub fn new(serial: u32) -> Self {
        Self::with_page_size(serial, DEFAULT_PAGE_TARGET)
    }

    pub fn with_page_size(serial: u32, page_target: usize) -> Self {
        Self {
            serial,
            sequence: 0,
            page_target: page_target.max(1),
            segments: Vec::new(),
            body: Vec::new(),
            page_granule: None,
            continued: false,
            first_page: true,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// 下一个输出页面的序号
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// 写入一个数据包, 返回因此填满的页面
    ///
    /// `eos` 为真时本包所在页面立即输出并带 EOS 标志.
    pub fn write_packet(&mut self, data: &[u8], granule: i64, eos: bool) -> Vec<Page> {
        let mut pages = Vec::new();
        let lacing_count = data.len() / 255 + 1;
        let mut offset = 0;

        for i in 0..lacing_count {
            let last = i + 1 == lacing_count;
            if self.segments.len() == MAX_SEGMENTS {
                pages.push(self.emit_page(false));
                self.continued = i > 0;
            }
            let seg = if last { data.len() - offset } else { 255 };
            self.segments.push(seg as u8);
            self.body.extend_from_slice(&data[offset..offset + seg]);
            offset += seg;

            if last {
                self.page_granule = Some(granule);
            } else if self.body.len() >= self.page_target {
                pages.push(self.emit_page(false));
                self.continued = true;
            }
        }

        if eos {
            pages.push(self.emit_page(true));
        } else if self.body.len() >= self.page_target {
            pages.push(self.emit_page(false));
        }
        pages
    }

    /// 输出缓存中的数据 (若有)
    pub fn flush(&mut self) -> Vec<Page> {
        if self.segments.is_empty() {
            Vec::new()
        } else {
            vec![self.emit_page(false)]
        }
    }

    fn emit_page(&mut self, eos: bool) -> Page {
        let mut flags = PageFlags::empty();
        if self.continued {
            flags |= PageFlags::CONTINUED;
        }
        if self.first_page {
            flags |= PageFlags::BOS;
        }
        if eos {
            flags |= PageFlags::EOS;
        }
        let granule = self.page_granule.take().unwrap_or(-1);
        let page = Page::new(
            flags,
            granule,
            self.serial,
            self.sequence,
            std::mem::take(&mut self.segments),
            Bytes::from(std::mem::take(&mut self.body)),
        );
        trace!(
            "Ogg 写入页面: serial={:08x}, seq={}, granule={}, {} 字节",
            self.serial,
            self.sequence,
            granule,
            page.size()
        );
        self.sequence = self.sequence.wrapping_add(1);
        self.first_page = false;
        self.continued = false;
        page
    }
}
