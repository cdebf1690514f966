//! 逻辑流: 把同一 serial 的页面重组为数据包.
//!
//! 数据丢失 (页面序号跳号、续包不匹配、EOS 时残留的半包) 以
//! `Err(OvError::CorruptPage)` 的形式出现在输出序列中丢失发生的位置,
//! 同时包序号跳过一个值.

use bytes::Bytes;
use log::{debug, warn};
use oggvorbis_codec::{NO_GRANULE, Packet};
use oggvorbis_core::{OvError, OvResult};

use crate::page::Page;

/// 单个逻辑流的包重组状态
#[derive(Debug)]
pub struct LogicalStream {
    serial: u32,
    /// 跨页未完成的包
    partial: Option<Vec<u8>>,
    /// 正在丢弃跨页的孤立续包段
    discarding_orphan: bool,
    expected_sequence: Option<u32>,
    next_packet_no: i64,
    first_packet: bool,
    ended: bool,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            partial: None,
            discarding_orphan: false,
            expected_sequence: None,
            next_packet_no: 0,
            first_packet: true,
            ended: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// 是否已收到 EOS 页面
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// 是否有跨页未完成的包
    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// 下一个包的序号
    pub fn next_packet_no(&self) -> i64 {
        self.next_packet_no
    }

    /// 接收一个页面, 按顺序返回完结的数据包与数据丢失标记
    pub fn accept_page(&mut self, page: &Page) -> Vec<OvResult<Packet>> {
        if page.serial != self.serial {
            return vec![Err(OvError::CorruptPage(format!(
                "serial 不匹配: 期望 {:08x}, 实际 {:08x}",
                self.serial, page.serial
            )))];
        }
        if self.ended {
            return vec![Err(OvError::CorruptPage(format!(
                "serial {:08x} 已结束, 丢弃页面 seq={}",
                self.serial, page.sequence
            )))];
        }

        let mut out = Vec::new();
        let mut gap = false;

        if let Some(expected) = self.expected_sequence
            && page.sequence != expected
        {
            warn!(
                "Ogg: serial {:08x} 页面序号跳变: 期望 {}, 实际 {}",
                self.serial, expected, page.sequence
            );
            self.partial = None;
            self.discarding_orphan = false;
            out.push(self.hole(format!(
                "页面丢失: 期望 seq={}, 实际 seq={}",
                expected, page.sequence
            )));
            gap = true;
        }
        self.expected_sequence = Some(page.sequence.wrapping_add(1));

        let mut seg_index = 0;
        let mut offset = 0;

        if page.is_continued() {
            if self.partial.is_none() {
                // 跳过没有前导数据的续包段
                let mut skipped_to_end = true;
                while seg_index < page.segments.len() {
                    let seg = page.segments[seg_index] as usize;
                    seg_index += 1;
                    offset += seg;
                    if seg < 255 {
                        skipped_to_end = false;
                        break;
                    }
                }
                if !gap && !self.discarding_orphan {
                    debug!(
                        "Ogg: serial {:08x} 续包页面没有前导数据, 跳过 {} 字节",
                        self.serial, offset
                    );
                    out.push(self.hole("续包缺少前导数据".into()));
                }
                self.discarding_orphan = skipped_to_end;
            }
        } else {
            self.discarding_orphan = false;
            if self.partial.take().is_some() && !gap {
                debug!(
                    "Ogg: serial {:08x} 未完成的包被非续包页面打断",
                    self.serial
                );
                out.push(self.hole("未完成的包被非续包页面打断".into()));
            }
        }

        let first_completed = out.len();
        let mut packet_start = offset;
        let mut open = false;
        while seg_index < page.segments.len() {
            let seg = page.segments[seg_index] as usize;
            seg_index += 1;
            offset += seg;
            open = seg == 255;
            if open {
                continue;
            }
            let data = match self.partial.take() {
                Some(mut buf) => {
                    buf.extend_from_slice(&page.body[packet_start..offset]);
                    Bytes::from(buf)
                }
                None => page.body.slice(packet_start..offset),
            };
            packet_start = offset;
            let packet = self.make_packet(data);
            out.push(Ok(packet));
        }
        if open {
            self.partial
                .get_or_insert_with(Vec::new)
                .extend_from_slice(&page.body[packet_start..offset]);
        }

        // 只有本页最后一个完结的包携带页面 granule
        if out.len() > first_completed
            && let Some(Ok(last)) = out.last_mut()
        {
            last.granule = page.granule;
        }

        if page.is_eos() {
            self.ended = true;
            if self.partial.take().is_some() {
                debug!("Ogg: serial {:08x} EOS 时仍有未完成的包", self.serial);
                out.push(self.hole("EOS 时包未完成".into()));
            } else if out.len() > first_completed
                && let Some(Ok(last)) = out.last_mut()
            {
                last.eos = true;
            }
        }
        out
    }

    fn make_packet(&mut self, data: Bytes) -> Packet {
        let packet = Packet {
            data,
            granule: NO_GRANULE,
            bos: self.first_packet,
            eos: false,
            packet_no: self.next_packet_no,
            serial: self.serial,
        };
        self.first_packet = false;
        self.next_packet_no += 1;
        packet
    }

    fn hole(&mut self, msg: String) -> OvResult<Packet> {
        self.next_packet_no += 1;
        Err(OvError::CorruptPage(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageFlags;
    use crate::page_writer::PageWriter;

    const SERIAL: u32 = 0x1234;

    /// 三个包 A(100) B(1000) C(10), 页面布局: [A, B..] [..B..] [..B, C]
    fn three_pages() -> (Vec<Vec<u8>>, Vec<Page>) {
        let packets = vec![vec![0xA0; 100], vec![0xB0; 1000], vec![0xC0; 10]];
        let mut writer = PageWriter::with_page_size(SERIAL, 300);
        let mut pages = Vec::new();
        pages.extend(writer.write_packet(&packets[0], 1, false));
        pages.extend(writer.write_packet(&packets[1], 2, false));
        pages.extend(writer.write_packet(&packets[2], 3, true));
        (packets, pages)
    }

    fn feed(stream: &mut LogicalStream, pages: &[Page]) -> Vec<OvResult<Packet>> {
        pages.iter().flat_map(|p| stream.accept_page(p)).collect()
    }

    #[test]
    fn test_跨页重组() {
        let (packets, pages) = three_pages();
        assert_eq!(pages.len(), 3);
        let mut stream = LogicalStream::new(SERIAL);
        let out: Vec<Packet> = feed(&mut stream, &pages)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(out.len(), 3);
        for (i, packet) in out.iter().enumerate() {
            assert_eq!(packet.data.as_ref(), packets[i].as_slice());
            assert_eq!(packet.packet_no, i as i64);
            assert_eq!(packet.serial, SERIAL);
        }
        assert!(out[0].bos && !out[1].bos);
        assert_eq!(
            out.iter().map(|p| p.granule).collect::<Vec<_>>(),
            vec![1, NO_GRANULE, 3]
        );
        assert!(out[2].eos && !out[1].eos);
        assert!(stream.is_ended());
        assert!(!stream.has_partial());
    }

    #[test]
    fn test_页面丢失产生空洞() {
        let (packets, pages) = three_pages();
        let mut stream = LogicalStream::new(SERIAL);
        let out = feed(&mut stream, &[pages[0].clone(), pages[2].clone()]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().packet_no, 0);
        assert!(matches!(out[1], Err(OvError::CorruptPage(_))));
        let c = out[2].as_ref().unwrap();
        assert_eq!(c.data.as_ref(), packets[2].as_slice());
        // 丢失的 B 占用序号 1
        assert_eq!(c.packet_no, 2);
        assert_eq!(c.granule, 3);
    }

    #[test]
    fn test_孤立续包只报告一次() {
        let (packets, pages) = three_pages();
        let mut stream = LogicalStream::new(SERIAL);
        let first = stream.accept_page(&pages[1]);
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], Err(OvError::CorruptPage(_))));
        let second = stream.accept_page(&pages[2]);
        assert_eq!(second.len(), 1);
        let c = second[0].as_ref().unwrap();
        assert_eq!(c.data.as_ref(), packets[2].as_slice());
        assert_eq!(c.packet_no, 1);
        assert!(c.bos && c.eos);
    }

    #[test]
    fn test_半包被非续包页面打断() {
        let (_, pages) = three_pages();
        let mut stream = LogicalStream::new(SERIAL);
        stream.accept_page(&pages[0]);
        assert!(stream.has_partial());
        let page = Page::new(
            PageFlags::empty(),
            5,
            SERIAL,
            1,
            vec![4],
            Bytes::from_static(b"next"),
        );
        let out = stream.accept_page(&page);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(OvError::CorruptPage(_))));
        let p = out[1].as_ref().unwrap();
        assert_eq!(p.data.as_ref(), b"next");
        assert_eq!(p.packet_no, 2);
        assert_eq!(p.granule, 5);
    }

    #[test]
    fn test_eos_时残留半包() {
        let page = Page::new(
            PageFlags::BOS | PageFlags::EOS,
            -1,
            SERIAL,
            0,
            vec![255],
            Bytes::from(vec![0u8; 255]),
        );
        let mut stream = LogicalStream::new(SERIAL);
        let out = stream.accept_page(&page);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(OvError::CorruptPage(_))));
        assert!(stream.is_ended());
        assert!(!stream.has_partial());

        // EOS 之后的页面被拒绝
        let out = stream.accept_page(&page);
        assert!(matches!(out.as_slice(), [Err(OvError::CorruptPage(_))]));
    }

    #[test]
    fn test_serial_不匹配() {
        let (_, pages) = three_pages();
        let mut stream = LogicalStream::new(SERIAL + 1);
        let out = stream.accept_page(&pages[0]);
        assert!(matches!(out.as_slice(), [Err(OvError::CorruptPage(_))]));
        assert_eq!(stream.next_packet_no(), 0);
    }
}
