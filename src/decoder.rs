//! 流式解码器: 字节流 → Ogg 页面 → 数据包 → PCM 帧.
//!
//! 调用方以任意切分送入字节 (`feed`), 再反复 `next_frame` 取出解码结果.
//! 串接流 (多个 Vorbis 逻辑流首尾相接) 与复用流 (一节中多个逻辑流)
//! 在这里处理: 每一节只解码第一个 Vorbis 逻辑流.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info, trace, warn};
use oggvorbis_codec::{AudioFrame, Comment, Decoder, Info, Packet, VorbisDecoder};
use oggvorbis_core::{OvError, OvResult};
use oggvorbis_format::{LogicalStream, Page, PageDemuxer};
use serde::Serialize;

use crate::config::DecoderConfig;

/// 每次送入页面同步器的最大字节数
const FEED_CHUNK: usize = 64 * 1024;

/// 解码器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderState {
    /// 等待逻辑流起始页 (BOS)
    AwaitingSync,
    AwaitingIdHeader,
    AwaitingCommentHeader,
    AwaitingSetupHeader,
    DecodingAudio,
    /// 当前逻辑流已结束 (EOS 或输入耗尽)
    StreamEnded,
}

/// 解码统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// 校验通过的页面数
    pub pages: u64,
    /// 重组出的数据包数
    pub packets: u64,
    /// 失步次数
    pub sync_losses: u64,
    /// 数据丢失 (空洞) 与被拒绝的页面数
    pub corrupt_pages: u64,
    /// 以静音输出或被丢弃的音频包数
    pub block_errors: u64,
    /// 已输出的音频帧数
    pub frames_emitted: u64,
    /// 已输出的采样帧数 (每声道)
    pub samples_emitted: u64,
    /// 已开始的串接节数
    pub links: u32,
}

/// 串接链中的一节: 一组在任何数据页之前开始的逻辑流
#[derive(Default)]
struct Link {
    streams: HashMap<u32, LogicalStream>,
    ignored: HashSet<u32>,
    /// 正在解码的 Vorbis 逻辑流
    selected: Option<u32>,
    /// 已出现非 BOS 页面, 之后的 BOS 页面属于下一节
    has_data: bool,
    /// 非 Vorbis 流的错误, 本节没有 Vorbis 流时上报
    not_vorbis: Option<OvError>,
    /// 选中的流头包解析失败
    failed: bool,
    last_granule: i64,
}

/// Ogg Vorbis 流式解码器
pub struct StreamDecoder {
    config: DecoderConfig,
    demuxer: PageDemuxer,
    link: Link,
    decoder: Option<VorbisDecoder>,
    /// 上一节的解码器, 新一节头包完成前继续提供 info/comment
    previous: Option<VorbisDecoder>,
    output: VecDeque<OvResult<AudioFrame>>,
    state: DecoderState,
    stats: DecodeStats,
    finished: bool,
}

impl StreamDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            demuxer: PageDemuxer::with_max_buffered(config.max_buffered_bytes),
            link: Link::default(),
            decoder: None,
            previous: None,
            output: VecDeque::new(),
            state: DecoderState::AwaitingSync,
            stats: DecodeStats::default(),
            finished: false,
        }
    }

    /// 送入字节, 解出其中所有完整的页面
    pub fn feed(&mut self, data: &[u8]) {
        if self.finished {
            warn!("finish() 之后的 {} 字节输入被忽略", data.len());
            return;
        }
        for chunk in data.chunks(FEED_CHUNK) {
            self.demuxer.feed(chunk);
            self.drain_pages();
        }
    }

    /// 声明输入已结束
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.drain_pages();
        self.release_held_frames();

        let leftover = self.demuxer.buffered_len();
        if leftover > 0 {
            debug!("输入结束, 丢弃 {} 字节不完整的页面数据", leftover);
        }
        if self.stats.links > 0 && self.link.selected.is_none() {
            self.close_bos_group();
        }
        if !self.link.failed
            && let Some(decoder) = &self.decoder
            && !decoder.headers_complete()
        {
            warn!("输入在 Vorbis 头包完成前结束");
            self.output.push_back(Err(OvError::MissingHeaderPacket(
                "输入在头包完成前结束".into(),
            )));
        }
        self.state = DecoderState::StreamEnded;
    }

    /// 取出下一个解码结果
    ///
    /// # 返回
    /// - `Ok(frame)`: 一帧交错 PCM
    /// - `Err(OvError::NeedMoreData)`: 需要继续 `feed`
    /// - `Err(OvError::EndOfStream)`: `finish` 之后已全部取完
    /// - 其他错误: 某个逻辑流无法解码 (每个逻辑流只上报一次)
    pub fn next_frame(&mut self) -> OvResult<AudioFrame> {
        match self.output.pop_front() {
            Some(Ok(frame)) => {
                self.stats.frames_emitted += 1;
                self.stats.samples_emitted += u64::from(frame.nb_samples);
                Ok(frame)
            }
            Some(Err(e)) => Err(e),
            None if self.finished => Err(OvError::EndOfStream),
            None => Err(OvError::NeedMoreData),
        }
    }

    /// 当前流描述 (三个头包完成后可用)
    ///
    /// 串接流切换时, 新一节头包完成前仍返回上一节的描述.
    pub fn info(&self) -> Option<&Info> {
        match &self.decoder {
            Some(decoder) if decoder.headers_complete() => decoder.info(),
            _ => self.previous.as_ref().and_then(|d| d.info()),
        }
    }

    /// 当前流的用户注释, 与 [`Self::info`] 同步切换
    pub fn comment(&self) -> Option<&Comment> {
        match &self.decoder {
            Some(decoder) if decoder.headers_complete() => decoder.comment(),
            _ => self.previous.as_ref().and_then(|d| d.comment()),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 正在解码的逻辑流序列号
    pub fn serial(&self) -> Option<u32> {
        self.link.selected
    }

    /// 当前串接节序号 (从 0 开始)
    pub fn chain_index(&self) -> u32 {
        self.stats.links.saturating_sub(1)
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// 丢弃全部状态, 回到初始状态
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    fn drain_pages(&mut self) {
        loop {
            match self.demuxer.next_page() {
                Ok(page) => {
                    self.stats.pages += 1;
                    self.handle_page(&page);
                }
                Err(OvError::SyncLost) => {
                    self.stats.sync_losses += 1;
                    debug!(
                        "Ogg: 失去同步, 已消费 {} 字节",
                        self.demuxer.bytes_consumed()
                    );
                }
                Err(_) => break,
            }
        }
    }

    fn handle_page(&mut self, page: &Page) {
        let serial = page.serial;
        if page.is_bos() {
            if self.stats.links == 0 || self.link.has_data {
                self.start_link();
            }
            if self.link.streams.contains_key(&serial) || self.link.ignored.contains(&serial) {
                warn!("Ogg: serial {:08x} 重复的 BOS 页面, 丢弃", serial);
                self.stats.corrupt_pages += 1;
                return;
            }
            debug!("Ogg: 发现逻辑流 serial={:08x}", serial);
            self.link.streams.insert(serial, LogicalStream::new(serial));
        } else if self.link.streams.contains_key(&serial) || self.link.ignored.contains(&serial) {
            if !self.link.has_data {
                self.link.has_data = true;
                if self.link.selected.is_none() {
                    self.close_bos_group();
                }
            }
        } else {
            trace!("Ogg: 跳过未知逻辑流的页面 serial={:08x}", serial);
            return;
        }

        let Some(stream) = self.link.streams.get_mut(&serial) else {
            return;
        };
        let results = stream.accept_page(page);
        for result in results {
            match result {
                Ok(packet) => {
                    self.stats.packets += 1;
                    self.handle_packet(packet);
                }
                Err(e) => {
                    self.stats.corrupt_pages += 1;
                    warn!("Ogg: serial {:08x} 数据丢失: {}", serial, e);
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        let serial = packet.serial;
        match self.link.selected {
            None => {
                // 逻辑流的首包决定它是否为 Vorbis
                if !packet.bos || !is_vorbis_ident(&packet.data) {
                    self.ignore_stream(serial);
                    return;
                }
                info!(
                    "选中 Vorbis 逻辑流 serial={:08x} (第 {} 节)",
                    serial,
                    self.chain_index()
                );
                let mut decoder = VorbisDecoder::new(self.config.vorbis_options());
                decoder.set_chain_index(self.chain_index());
                self.decoder = Some(decoder);
                self.link.selected = Some(serial);
            }
            Some(selected) if selected != serial => {
                self.ignore_stream(serial);
                return;
            }
            Some(_) => {}
        }
        if self.link.failed {
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        let result = decoder.send_packet(&packet);
        while let Ok(frame) = decoder.receive_frame() {
            self.output.push_back(Ok(frame));
        }
        match result {
            Ok(()) => {}
            Err(OvError::BlockDecode(msg)) => {
                self.stats.block_errors += 1;
                debug!("音频包 packet_no={} 解码失败: {}", packet.packet_no, msg);
            }
            Err(e) if e.is_fatal_for_stream() => {
                warn!("逻辑流 serial={:08x} 无法解码, 等待下一节: {}", serial, e);
                self.link.failed = true;
                self.output.push_back(Err(e));
                self.state = DecoderState::AwaitingSync;
                return;
            }
            Err(e) => debug!("数据包 packet_no={} 被丢弃: {}", packet.packet_no, e),
        }

        if packet.has_granule() && decoder.headers_complete() {
            if packet.granule < self.link.last_granule {
                warn!(
                    "granule 回退 ({} < {}) 但没有新的 BOS 页面, 可能是串接边界, 继续解码",
                    packet.granule, self.link.last_granule
                );
            }
            self.link.last_granule = packet.granule;
        }

        self.state = if packet.eos {
            debug!(
                "逻辑流 serial={:08x} 结束, 共 {} 采样帧",
                serial,
                decoder.samples_decoded()
            );
            DecoderState::StreamEnded
        } else {
            stage_state(decoder)
        };
    }

    /// 开始串接链的新一节
    fn start_link(&mut self) {
        if self.stats.links > 0 {
            info!("Ogg: 串接流边界, 开始第 {} 节", self.stats.links);
        }
        self.release_held_frames();
        if let Some(decoder) = self.decoder.take() {
            if decoder.headers_complete() {
                self.previous = Some(decoder);
            } else if !self.link.failed {
                warn!("上一节在 Vorbis 头包完成前结束");
                self.output.push_back(Err(OvError::MissingHeaderPacket(
                    "逻辑流在头包完成前结束".into(),
                )));
            }
        }
        self.link = Link::default();
        self.stats.links += 1;
        self.state = DecoderState::AwaitingIdHeader;
    }

    /// 当前逻辑流结束时输出尚未确定起始位置的帧
    fn release_held_frames(&mut self) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        decoder.finish();
        while let Ok(frame) = decoder.receive_frame() {
            self.output.push_back(Ok(frame));
        }
    }

    /// BOS 组结束但没有 Vorbis 流
    fn close_bos_group(&mut self) {
        if self.link.failed {
            return;
        }
        let err = self
            .link
            .not_vorbis
            .take()
            .unwrap_or_else(|| OvError::NotVorbis("没有可解码的 Vorbis 逻辑流".into()));
        warn!("第 {} 节没有 Vorbis 逻辑流: {}", self.chain_index(), err);
        self.link.failed = true;
        self.output.push_back(Err(err));
        self.state = DecoderState::AwaitingSync;
    }

    fn ignore_stream(&mut self, serial: u32) {
        if self.link.streams.remove(&serial).is_none() {
            return;
        }
        debug!("Ogg: 忽略逻辑流 serial={:08x}", serial);
        self.link.ignored.insert(serial);
        if self.link.selected.is_none() && self.link.not_vorbis.is_none() {
            self.link.not_vorbis = Some(OvError::NotVorbis(format!(
                "serial {:08x} 的首包不是 Vorbis identification 头",
                serial
            )));
        }
    }
}

fn is_vorbis_ident(data: &[u8]) -> bool {
    data.len() >= 7 && data[0] == 0x01 && &data[1..7] == b"vorbis"
}

fn stage_state(decoder: &VorbisDecoder) -> DecoderState {
    if decoder.headers_complete() {
        DecoderState::DecodingAudio
    } else if decoder.comment().is_some() {
        DecoderState::AwaitingSetupHeader
    } else if decoder.info().is_some() {
        DecoderState::AwaitingCommentHeader
    } else {
        DecoderState::AwaitingIdHeader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_空输入() {
        let mut decoder = StreamDecoder::new(DecoderConfig::default());
        assert!(matches!(decoder.next_frame(), Err(OvError::NeedMoreData)));
        assert_eq!(decoder.state(), DecoderState::AwaitingSync);
        decoder.finish();
        assert!(matches!(decoder.next_frame(), Err(OvError::EndOfStream)));
        assert_eq!(decoder.state(), DecoderState::StreamEnded);
        assert_eq!(decoder.stats().links, 0);
    }

    #[test]
    fn test_垃圾输入只报告失步() {
        let mut decoder = StreamDecoder::new(DecoderConfig::default());
        decoder.feed(&[0x55; 10_000]);
        decoder.finish();
        assert!(matches!(decoder.next_frame(), Err(OvError::EndOfStream)));
        assert_eq!(decoder.stats().sync_losses, 1);
        assert_eq!(decoder.stats().pages, 0);
    }

    #[test]
    fn test_is_vorbis_ident() {
        assert!(is_vorbis_ident(b"\x01vorbis\0\0"));
        assert!(!is_vorbis_ident(b"\x03vorbis"));
        assert!(!is_vorbis_ident(b"OpusHead"));
        assert!(!is_vorbis_ident(b"\x01vor"));
    }

    #[test]
    fn test_reset_保留配置() {
        let config = DecoderConfig {
            trim_to_granule: false,
            ..DecoderConfig::default()
        };
        let mut decoder = StreamDecoder::new(config);
        decoder.feed(b"junk");
        decoder.finish();
        decoder.reset();
        assert_eq!(decoder.config(), &config);
        assert!(matches!(decoder.next_frame(), Err(OvError::NeedMoreData)));
        assert_eq!(decoder.state(), DecoderState::AwaitingSync);
    }
}
