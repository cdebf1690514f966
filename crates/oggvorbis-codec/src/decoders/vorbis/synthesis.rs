//! 时域合成: IMDCT 输出加窗, 跨块 overlap-add, PCM 交错输出.

use std::f64::consts::PI;

use oggvorbis_core::SampleFormat;
use serde::{Deserialize, Serialize};

use super::headers::Info;
use super::imdct::Imdct;

/// 输出声道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Vorbis 原生顺序
    #[default]
    Vorbis,
    /// SMPTE/WAVE 顺序, 仅对 3/5/6 声道重排
    Smpte,
}

impl ChannelOrder {
    /// 输出第 i 个声道取自的 Vorbis 声道序号
    pub fn source_indices(&self, channels: usize) -> Vec<usize> {
        match (self, channels) {
            (Self::Smpte, 3) => vec![0, 2, 1],
            (Self::Smpte, 5) => vec![0, 2, 1, 3, 4],
            (Self::Smpte, 6) => vec![0, 2, 1, 5, 3, 4],
            _ => (0..channels).collect(),
        }
    }
}

/// Vorbis 窗函数上升沿, 长度 `len`
pub(crate) fn window_slope(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let x = (PI * (i as f64 + 0.5) / (2 * len) as f64).sin();
            (PI / 2.0 * x * x).sin() as f32
        })
        .collect()
}

/// 每个逻辑流独占的解码状态
///
/// 缓冲区按长块大小一次分配, 逐块复用.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    blocksizes: [usize; 2],
    /// 短块/长块窗上升沿, 长度为块大小的一半
    slopes: [Vec<f32>; 2],
    imdcts: [Imdct; 2],
    /// 当前块每声道频谱, 由块解码器写入
    pub(crate) spectra: Vec<Vec<f32>>,
    /// floor 曲线展开缓冲
    pub(crate) floor_curve: Vec<f32>,
    /// 上一块加窗后的右半部分
    overlap: Vec<Vec<f32>>,
    prev_n: Option<usize>,
    time: Vec<f32>,
    /// 本块产出的每声道 PCM
    pcm: Vec<Vec<f32>>,
}

impl DecodeContext {
    pub fn new(info: &Info) -> Self {
        let channels = usize::from(info.channels);
        let bs0 = info.blocksize_short;
        let bs1 = info.blocksize_long;
        Self {
            blocksizes: [bs0, bs1],
            slopes: [window_slope(bs0 / 2), window_slope(bs1 / 2)],
            imdcts: [Imdct::new(bs0), Imdct::new(bs1)],
            spectra: vec![vec![0.0; bs1 / 2]; channels],
            floor_curve: vec![0.0; bs1 / 2],
            overlap: vec![vec![0.0; bs1 / 2]; channels],
            prev_n: None,
            time: vec![0.0; bs1],
            pcm: vec![Vec::with_capacity(bs1); channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.spectra.len()
    }

    pub fn blocksize(&self, long: bool) -> usize {
        self.blocksizes[usize::from(long)]
    }

    /// 丢弃重叠状态, 下一块视为流的第一块
    pub fn reset(&mut self) {
        self.prev_n = None;
        for o in &mut self.overlap {
            o.fill(0.0);
        }
        for p in &mut self.pcm {
            p.clear();
        }
    }

    /// 清零当前块前 `n2` 个频谱系数
    pub(crate) fn clear_spectra(&mut self, n2: usize) {
        for s in &mut self.spectra {
            s[..n2].fill(0.0);
        }
    }

    /// 对 `spectra` 做 IMDCT/加窗/overlap-add, 返回本块产出的采样帧数
    ///
    /// 流的第一块只建立重叠状态, 产出 0 帧. 之后每块产出
    /// `prev_n/4 + n/4` 帧 (两块中心之间的距离).
    pub fn synthesize(&mut self, long: bool, prev_long: bool, next_long: bool) -> usize {
        let n = self.blocksize(long);
        let n2 = n / 2;
        let n4 = n / 4;
        let out_len = self.prev_n.map_or(0, |p| p / 4 + n4);

        for ch in 0..self.spectra.len() {
            let time = &mut self.time[..n];
            self.imdcts[usize::from(long)].inverse(&self.spectra[ch][..n2], time);
            apply_window(
                time,
                &self.slopes,
                self.blocksizes,
                long,
                prev_long,
                next_long,
            );

            let out = &mut self.pcm[ch];
            out.clear();
            if let Some(prev_n) = self.prev_n {
                let overlap = &self.overlap[ch];
                let prev_half = prev_n / 2;
                let shift = prev_n / 4;
                out.extend((0..out_len).map(|i| {
                    let mut v = if i < prev_half { overlap[i] } else { 0.0 };
                    let j = i + n4;
                    if j >= shift && j - shift < n {
                        v += time[j - shift];
                    }
                    v
                }));
            }
            self.overlap[ch][..n2].copy_from_slice(&time[n2..n]);
        }

        self.prev_n = Some(n);
        out_len
    }

    /// 本块产出的每声道 PCM
    pub fn pcm(&self) -> &[Vec<f32>] {
        &self.pcm
    }

    /// 把前 `frames` 帧 PCM 按声道顺序交错打包
    pub fn interleave(
        &self,
        frames: usize,
        order: ChannelOrder,
        format: SampleFormat,
        out: &mut Vec<u8>,
    ) {
        let map = order.source_indices(self.pcm.len());
        let mut samples = Vec::with_capacity(frames * map.len());
        for i in 0..frames {
            for &src in &map {
                samples.push(self.pcm[src][i]);
            }
        }
        format.pack_into(&samples, out);
    }
}

/// 按前后块的大小对 N 点 IMDCT 输出加窗
///
/// 长块与短块相邻时, 长块对应一侧只在中心附近 `bs0/2` 范围内过渡,
/// 范围外一侧为 0, 另一侧为 1.
fn apply_window(
    buf: &mut [f32],
    slopes: &[Vec<f32>; 2],
    blocksizes: [usize; 2],
    long: bool,
    prev_long: bool,
    next_long: bool,
) {
    let n = buf.len();
    let (left_long, right_long) = if long {
        (prev_long, next_long)
    } else {
        (false, false)
    };

    let left_n = blocksizes[usize::from(left_long)];
    let left_slope = &slopes[usize::from(left_long)];
    let left_begin = n / 4 - left_n / 4;
    let left_end = n / 4 + left_n / 4;
    buf[..left_begin].fill(0.0);
    for (v, &w) in buf[left_begin..left_end].iter_mut().zip(left_slope) {
        *v *= w;
    }

    let right_n = blocksizes[usize::from(right_long)];
    let right_slope = &slopes[usize::from(right_long)];
    let right_begin = 3 * n / 4 - right_n / 4;
    let right_end = 3 * n / 4 + right_n / 4;
    for (v, &w) in buf[right_begin..right_end]
        .iter_mut()
        .zip(right_slope.iter().rev())
    {
        *v *= w;
    }
    buf[right_end..].fill(0.0);
}
