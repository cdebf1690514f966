//! Vorbis 音频解码器.
//!
//! 解码链路:
//! - 三个头包 (identification/comment/setup) 解析与校验
//! - 音频包: floor → residue → 逆耦合 → floor 曲线相乘 → IMDCT
//! - 加窗 overlap-add 后按请求的采样格式与声道顺序输出交错 PCM
//!
//! 每个逻辑流使用一个独立的解码器实例, 串接流切换时由上层重建.

pub mod block;
pub mod codebook;
pub mod floor;
pub mod headers;
pub mod imdct;
pub mod mapping;
pub mod residue;
pub mod setup;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod test_stream;

use std::collections::VecDeque;

use log::{debug, warn};
use oggvorbis_core::{OvError, OvResult, SampleFormat};

use crate::decoder::Decoder;
use crate::frame::AudioFrame;
use crate::packet::Packet;

pub use self::headers::{Comment, Info};
pub use self::setup::{Mode, Setup};
pub use self::synthesis::{ChannelOrder, DecodeContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Identification,
    Comment,
    Setup,
    Audio,
    Failed,
}

/// 解码输出选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VorbisDecoderOptions {
    pub sample_format: SampleFormat,
    pub channel_order: ChannelOrder,
    /// 按 EOS 页的 granule position 截断最后一帧
    pub trim_to_granule: bool,
}

impl Default for VorbisDecoderOptions {
    fn default() -> Self {
        Self {
            sample_format: SampleFormat::S16,
            channel_order: ChannelOrder::Vorbis,
            trim_to_granule: true,
        }
    }
}

/// Vorbis 解码器
pub struct VorbisDecoder {
    options: VorbisDecoderOptions,
    stage: HeaderStage,
    info: Option<Info>,
    comment: Option<Comment>,
    ctx: Option<DecodeContext>,
    pending: VecDeque<AudioFrame>,
    /// 下一帧首个采样的位置
    next_pts: i64,
    /// 是否已由 granule position 确定起始位置, 之前的帧暂存不输出
    anchored: bool,
    chain_index: u32,
}

impl VorbisDecoder {
    pub fn new(options: VorbisDecoderOptions) -> Self {
        Self {
            options,
            stage: HeaderStage::Identification,
            info: None,
            comment: None,
            ctx: None,
            pending: VecDeque::new(),
            next_pts: 0,
            anchored: false,
            chain_index: 0,
        }
    }

    /// 设置输出帧携带的串接链序号
    pub fn set_chain_index(&mut self, chain_index: u32) {
        self.chain_index = chain_index;
    }

    /// 流描述 (identification 头解析后可用)
    pub fn info(&self) -> Option<&Info> {
        self.info.as_ref()
    }

    /// 用户注释 (comment 头解析后可用)
    pub fn comment(&self) -> Option<&Comment> {
        self.comment.as_ref()
    }

    /// 三个头包是否均已解析
    pub fn headers_complete(&self) -> bool {
        self.stage == HeaderStage::Audio
    }

    /// 已解码位置, 即下一帧首个采样的位置
    pub fn samples_decoded(&self) -> i64 {
        self.next_pts
    }

    /// 输入结束: 尚未确定起始位置的帧按 0 起点输出
    pub fn finish(&mut self) {
        if !self.anchored && !self.pending.is_empty() {
            debug!(
                "Vorbis 输入结束前没有 granule position, 按 0 起点输出 {} 帧",
                self.pending.len()
            );
        }
        self.anchored = true;
    }

    fn handle_header(&mut self, packet: &Packet) -> OvResult<()> {
        let data = packet.data.as_ref();
        match self.stage {
            HeaderStage::Identification => {
                let info = headers::parse_identification(data)?;
                debug!(
                    "Vorbis identification: serial={:08x}, channels={}, rate={}, blocksize={}/{}",
                    packet.serial,
                    info.channels,
                    info.sample_rate,
                    info.blocksize_short,
                    info.blocksize_long,
                );
                self.info = Some(info);
                self.stage = HeaderStage::Comment;
            }
            HeaderStage::Comment => {
                let comment = headers::parse_comment(data)?;
                debug!(
                    "Vorbis comment: vendor={}, {} 条注释",
                    comment.vendor,
                    comment.user_comments.len()
                );
                self.comment = Some(comment);
                self.stage = HeaderStage::Setup;
            }
            HeaderStage::Setup => {
                let info = self
                    .info
                    .as_mut()
                    .ok_or_else(|| {
                        OvError::MissingHeaderPacket("缺少 identification 头".into())
                    })?;
                let setup = setup::parse_setup(data, info)?;
                info.setup = Some(setup);
                self.ctx = Some(DecodeContext::new(info));
                self.stage = HeaderStage::Audio;
            }
            HeaderStage::Audio | HeaderStage::Failed => {}
        }
        Ok(())
    }

    fn handle_audio_packet(&mut self, packet: &Packet) -> OvResult<()> {
        let (Some(info), Some(ctx)) = (self.info.as_ref(), self.ctx.as_mut()) else {
            return Err(OvError::MissingHeaderPacket("头包未就绪".into()));
        };
        let Some(setup) = info.setup.as_ref() else {
            return Err(OvError::MissingHeaderPacket("缺少 setup 头".into()));
        };

        let block = block::decode_block(setup, ctx, packet.data.as_ref())?;
        if let Some(e) = &block.error {
            warn!(
                "Vorbis 块解码失败, 以静音输出: packet_no={}, {}",
                packet.packet_no, e
            );
        }

        if block.frames > 0 {
            let mut frame = AudioFrame::new(
                info.sample_rate,
                u32::from(info.channels),
                self.options.sample_format,
            );
            ctx.interleave(
                block.frames,
                self.options.channel_order,
                self.options.sample_format,
                &mut frame.data,
            );
            frame.nb_samples = block.frames as u32;
            frame.pts = self.next_pts;
            frame.serial = packet.serial;
            frame.chain_index = self.chain_index;
            self.next_pts += block.frames as i64;
            self.pending.push_back(frame);
        }

        if !self.anchored && packet.has_granule() {
            self.anchor(packet.granule, packet.eos);
        } else if packet.eos {
            self.anchored = true;
        }

        // 末页 granule 小于累计采样数时截掉多出的尾部
        if self.options.trim_to_granule
            && packet.eos
            && packet.has_granule()
            && self.next_pts > packet.granule
        {
            self.trim_tail(packet.granule);
        }

        match block.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 以首个 granule position 确定暂存帧的位置
    ///
    /// granule 大于已解码采样数时整体后移 pts; 小于时丢弃开头多出的采样.
    /// 逻辑流只有一个音频页时 (本包同时为 EOS) 多出的采样从尾部截掉.
    fn anchor(&mut self, granule: i64, eos: bool) {
        self.anchored = true;
        let offset = granule - self.next_pts;
        if offset == 0 {
            return;
        }
        debug!(
            "Vorbis 起始位置: granule={}, 已解码 {} 采样, 偏移 {}",
            granule, self.next_pts, offset
        );

        let mut skip = if offset < 0 && !eos { -offset } else { 0 };
        while skip > 0 {
            let Some(front) = self.pending.front_mut() else {
                break;
            };
            let n = skip.min(i64::from(front.nb_samples));
            front.skip_front(n as u32);
            skip -= n;
            if front.nb_samples == 0 {
                self.pending.pop_front();
            }
        }

        // 剩余帧紧接着排到 granule 之前
        let held: i64 = self.pending.iter().map(|f| i64::from(f.nb_samples)).sum();
        let mut pts = (granule - held).max(0);
        for frame in &mut self.pending {
            frame.pts = pts;
            pts += i64::from(frame.nb_samples);
        }
        self.next_pts = pts;
    }

    /// 截掉位置在 `granule` 之后的采样
    fn trim_tail(&mut self, granule: i64) {
        debug!(
            "Vorbis 末尾截断: granule={}, 截去 {} 帧",
            granule,
            self.next_pts - granule
        );
        while let Some(last) = self.pending.back_mut() {
            if last.pts >= granule {
                self.pending.pop_back();
                continue;
            }
            last.truncate((granule - last.pts) as u32);
            break;
        }
        self.next_pts = granule;
    }
}

impl Decoder for VorbisDecoder {
    fn name(&self) -> &str {
        "vorbis"
    }

    fn send_packet(&mut self, packet: &Packet) -> OvResult<()> {
        match self.stage {
            HeaderStage::Failed => Err(OvError::MissingHeaderPacket(
                "逻辑流头包解析已失败".into(),
            )),
            HeaderStage::Audio => self.handle_audio_packet(packet),
            _ => self.handle_header(packet).inspect_err(|e| {
                warn!("Vorbis 头包解析失败: serial={:08x}, {}", packet.serial, e);
                self.stage = HeaderStage::Failed;
            }),
        }
    }

    fn receive_frame(&mut self) -> OvResult<AudioFrame> {
        if !self.anchored {
            return Err(OvError::NeedMoreData);
        }
        self.pending.pop_front().ok_or(OvError::NeedMoreData)
    }

    fn flush(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.reset();
        }
        self.pending.clear();
        self.next_pts = 0;
        self.anchored = false;
    }
}
