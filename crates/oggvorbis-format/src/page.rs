//! Ogg 页面与推送式页面同步.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace};
use oggvorbis_core::crc::ogg_page_crc;
use oggvorbis_core::{OvError, OvResult};

/// Ogg 同步字 (capture pattern)
pub const OGG_CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// 页头固定部分长度 (不含段表)
pub const PAGE_HEADER_SIZE: usize = 27;
/// 单个页面的最大长度
pub const MAX_PAGE_SIZE: usize = PAGE_HEADER_SIZE + 255 + 255 * 255;
/// 默认的缓冲上限
pub const DEFAULT_MAX_BUFFERED: usize = 1 << 20;

bitflags! {
    /// 页面头部标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PageFlags: u8 {
        /// 首个段延续上一页未完结的包
        const CONTINUED = 0x01;
        /// 逻辑流的第一页
        const BOS = 0x02;
        /// 逻辑流的最后一页
        const EOS = 0x04;
    }
}

/// 已校验的 Ogg 页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub version: u8,
    pub flags: PageFlags,
    /// 粒度位置, -1 表示本页没有完结的包
    pub granule: i64,
    /// 逻辑流序列号
    pub serial: u32,
    /// 页面序号
    pub sequence: u32,
    pub checksum: u32,
    /// 段表 (lacing values)
    pub segments: Vec<u8>,
    /// 页面数据, 长度等于段表之和
    pub body: Bytes,
}

impl Page {
    /// 构造页面并计算校验和
    pub fn new(
        flags: PageFlags,
        granule: i64,
        serial: u32,
        sequence: u32,
        segments: Vec<u8>,
        body: Bytes,
    ) -> Self {
        let mut page = Self {
            version: 0,
            flags,
            granule,
            serial,
            sequence,
            checksum: 0,
            segments,
            body,
        };
        page.checksum = ogg_page_crc(&page.to_bytes());
        page
    }

    pub fn is_continued(&self) -> bool {
        self.flags.contains(PageFlags::CONTINUED)
    }

    pub fn is_bos(&self) -> bool {
        self.flags.contains(PageFlags::BOS)
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(PageFlags::EOS)
    }

    /// 本页完结的包个数 (lacing 值小于 255 的段数)
    pub fn packets_completed(&self) -> usize {
        self.segments.iter().filter(|&&s| s < 255).count()
    }

    /// 页面总长度 (字节)
    pub fn size(&self) -> usize {
        PAGE_HEADER_SIZE + self.segments.len() + self.body.len()
    }

    /// 序列化为字节, 校验和字段取 `checksum`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(OGG_CAPTURE_PATTERN);
        out.push(self.version);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.granule.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.push(self.segments.len() as u8);
        out.extend_from_slice(&self.segments);
        out.extend_from_slice(&self.body);
        out
    }

    /// 从完整页面字节解析 (已确认长度与校验和)
    fn from_verified(raw: Bytes) -> Self {
        let nseg = raw[26] as usize;
        let flags = PageFlags::from_bits_truncate(raw[5]);
        Self {
            version: raw[4],
            flags,
            granule: LittleEndian::read_i64(&raw[6..14]),
            serial: LittleEndian::read_u32(&raw[14..18]),
            sequence: LittleEndian::read_u32(&raw[18..22]),
            checksum: LittleEndian::read_u32(&raw[22..26]),
            segments: raw[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + nseg].to_vec(),
            body: raw.slice(PAGE_HEADER_SIZE + nseg..),
        }
    }
}

/// 推送式页面同步器
///
/// 调用方通过 `feed()` 送入任意切分的字节, 再反复调用 `next_page()`
/// 取出校验通过的页面, 直到返回 `NeedMoreData`.
pub struct PageDemuxer {
    buf: BytesMut,
    max_buffered: usize,
    /// 当前失步是否已上报
    loss_reported: bool,
    /// 缓冲上限溢出丢弃了数据, 下次取页时上报
    overflow_pending: bool,
    consumed: u64,
}

impl Default for PageDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDemuxer {
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// 指定缓冲上限 (不小于单个页面的最大长度)
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_buffered: max_buffered.max(MAX_PAGE_SIZE),
            loss_reported: false,
            overflow_pending: false,
            consumed: 0,
        }
    }

    /// 追加输入字节
    ///
    /// 缓冲超过上限时丢弃最早的字节, 下次 `next_page()` 返回 `SyncLost`.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > self.max_buffered {
            let excess = self.buf.len() - self.max_buffered;
            debug!("Ogg: 缓冲超过上限, 丢弃 {} 字节", excess);
            self.discard(excess);
            self.overflow_pending = true;
        }
    }

    /// 取出下一个页面
    ///
    /// # 返回
    /// - `Ok(page)`: 校验通过的页面
    /// - `Err(OvError::NeedMoreData)`: 缓冲中没有完整页面
    /// - `Err(OvError::SyncLost)`: 跳过了无效数据, 可继续调用
    pub fn next_page(&mut self) -> OvResult<Page> {
        if self.overflow_pending {
            self.overflow_pending = false;
            self.loss_reported = true;
            return Err(OvError::SyncLost);
        }

        loop {
            match find_capture(&self.buf) {
                Some(0) => {}
                Some(pos) => {
                    trace!("Ogg: 跳过 {} 字节寻找同步字", pos);
                    self.discard(pos);
                    if let Some(e) = self.report_loss() {
                        return Err(e);
                    }
                }
                None => {
                    // 保留末尾可能是同步字前缀的字节
                    let keep = self.buf.len().min(OGG_CAPTURE_PATTERN.len() - 1);
                    let drop = self.buf.len() - keep;
                    if drop > 0 {
                        self.discard(drop);
                        if let Some(e) = self.report_loss() {
                            return Err(e);
                        }
                    }
                    return Err(OvError::NeedMoreData);
                }
            }

            if self.buf.len() < PAGE_HEADER_SIZE {
                return Err(OvError::NeedMoreData);
            }
            if self.buf[4] != 0 {
                debug!("Ogg: 版本号非法 ({}), 重新同步", self.buf[4]);
                self.discard(1);
                if let Some(e) = self.report_loss() {
                    return Err(e);
                }
                continue;
            }

            let nseg = self.buf[26] as usize;
            let header_len = PAGE_HEADER_SIZE + nseg;
            if self.buf.len() < header_len {
                return Err(OvError::NeedMoreData);
            }
            let body_len: usize = self.buf[PAGE_HEADER_SIZE..header_len]
                .iter()
                .map(|&s| s as usize)
                .sum();
            let total = header_len + body_len;
            if self.buf.len() < total {
                return Err(OvError::NeedMoreData);
            }

            let stored = LittleEndian::read_u32(&self.buf[22..26]);
            let computed = ogg_page_crc(&self.buf[..total]);
            if stored != computed {
                debug!(
                    "Ogg: 页面 CRC 校验失败: 读取=0x{stored:08X}, 计算=0x{computed:08X}"
                );
                self.discard(1);
                if let Some(e) = self.report_loss() {
                    return Err(e);
                }
                continue;
            }

            let raw = self.buf.split_to(total).freeze();
            self.consumed += total as u64;
            self.loss_reported = false;
            let page = Page::from_verified(raw);
            trace!(
                "Ogg: 页面 serial={:08x}, seq={}, granule={}, flags={:?}, {} 字节",
                page.serial,
                page.sequence,
                page.granule,
                page.flags,
                total
            );
            return Ok(page);
        }
    }

    /// 丢弃全部缓冲
    pub fn reset(&mut self) {
        let len = self.buf.len();
        self.discard(len);
        self.loss_reported = false;
        self.overflow_pending = false;
    }

    /// 当前缓冲的字节数
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// 已被消费 (输出为页面或丢弃) 的字节数
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    fn discard(&mut self, n: usize) {
        self.buf.advance(n);
        self.consumed += n as u64;
    }

    /// 同一段失步只上报一次
    fn report_loss(&mut self) -> Option<OvError> {
        if self.loss_reported {
            None
        } else {
            self.loss_reported = true;
            Some(OvError::SyncLost)
        }
    }
}

fn find_capture(buf: &[u8]) -> Option<usize> {
    buf.windows(OGG_CAPTURE_PATTERN.len())
        .position(|w| w == OGG_CAPTURE_PATTERN)
}
