//! 集成测试公共工具: 用 BitWriter 与 PageWriter 合成 Ogg Vorbis 字节流.
//!
//! 合成流的 setup 配置固定为:
//! - codebook 0: 1 维, 2 个 1 位码字, 无查找表 (residue 分类)
//! - codebook 1: 2 维, 2 个 1 位码字, entry 0 = (1.0, 0.5), entry 1 = (-1.0, 0.0)
//! - floor 1: 无分区, multiplier 1, X = {0, 128}
//! - residue 2: 分区大小 16, 类 1 在 pass 0 使用 codebook 1
//! - 双声道及以上时声道 0/1 方幅耦合
//! - mode 0 为短块, mode 1 为长块

#![allow(dead_code)]

use oggvorbis::core::{BitWriter, ilog};
use oggvorbis::format::{Page, PageWriter};

pub const PARTITION_SIZE: usize = 16;

/// 测试中打开 log 输出, 用 `RUST_LOG=debug` 查看解码诊断
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 合成流参数
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub serial: u32,
    pub channels: u8,
    pub sample_rate: u32,
    pub bs0_exp: u8,
    pub bs1_exp: u8,
    /// 每个音频包是否为长块
    pub blocks: Vec<bool>,
    /// 每个 residue 向量前若干个分区有能量
    pub energetic_partitions: usize,
    /// 末页 granule 比实际采样数少的帧数
    pub trim: i64,
    pub vendor: String,
    pub comments: Vec<String>,
    /// 页面数据目标大小
    pub page_size: usize,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            serial: 0x5EED_0001,
            channels: 2,
            sample_rate: 44100,
            bs0_exp: 8,
            bs1_exp: 11,
            blocks: vec![false, false, true, true, false, true, false, false],
            energetic_partitions: 2,
            trim: 0,
            vendor: "synthetic encoder".to_string(),
            comments: vec!["TITLE=Test".to_string(), "ARTIST=Nobody".to_string()],
            page_size: 4096,
        }
    }
}

impl StreamSpec {
    pub fn blocksize(&self, long: bool) -> usize {
        1 << if long { self.bs1_exp } else { self.bs0_exp }
    }

    /// 各音频包产出的采样帧数 (首包为 0)
    pub fn frames_per_packet(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.blocks.len());
        let mut prev: Option<usize> = None;
        for &long in &self.blocks {
            let n = self.blocksize(long);
            out.push(prev.map_or(0, |p| (p / 4 + n / 4) as i64));
            prev = Some(n);
        }
        out
    }

    /// 未截断时的总采样帧数
    pub fn total_frames(&self) -> i64 {
        self.frames_per_packet().iter().sum()
    }

    /// 末页 granule (截断后应输出的总帧数)
    pub fn final_granule(&self) -> i64 {
        self.total_frames() - self.trim
    }
}

pub fn build_ident(spec: &StreamSpec) -> Vec<u8> {
    let mut v = vec![0x01];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(spec.channels);
    v.extend_from_slice(&spec.sample_rate.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&128_000i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.push((spec.bs1_exp << 4) | spec.bs0_exp);
    v.push(1);
    v
}

pub fn build_comment(spec: &StreamSpec) -> Vec<u8> {
    let mut v = vec![0x03];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&(spec.vendor.len() as u32).to_le_bytes());
    v.extend_from_slice(spec.vendor.as_bytes());
    v.extend_from_slice(&(spec.comments.len() as u32).to_le_bytes());
    for c in &spec.comments {
        v.extend_from_slice(&(c.len() as u32).to_le_bytes());
        v.extend_from_slice(c.as_bytes());
    }
    v.push(1);
    v
}

/// Vorbis 32 位浮点打包 (仅支持非零值)
fn float32_pack(value: f32) -> u32 {
    let mut mantissa = f64::from(value.abs());
    let mut exponent = 788i32;
    while mantissa < f64::from(1u32 << 20) {
        mantissa *= 2.0;
        exponent -= 1;
    }
    while mantissa >= f64::from(1u32 << 21) {
        mantissa /= 2.0;
        exponent += 1;
    }
    let sign = if value < 0.0 { 0x8000_0000 } else { 0 };
    sign | ((exponent as u32) << 21) | (mantissa as u32)
}

fn write_codebook(bw: &mut BitWriter, dimensions: u32, lookup: bool) {
    bw.write_bits(0x564342, 24);
    bw.write_bits(dimensions, 16);
    bw.write_bits(2, 24);
    bw.write_flag(false); // ordered
    bw.write_flag(false); // sparse
    bw.write_bits(0, 5);
    bw.write_bits(0, 5);
    if !lookup {
        bw.write_bits(0, 4);
        return;
    }
    bw.write_bits(2, 4);
    bw.write_bits(float32_pack(-1.0), 32);
    bw.write_bits(float32_pack(0.5), 32);
    bw.write_bits(2, 4);
    bw.write_flag(false);
    for m in [4u32, 3, 0, 2] {
        bw.write_bits(m, 3);
    }
}

pub fn build_setup(spec: &StreamSpec) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(&[0x05]);
    bw.write_bytes(b"vorbis");

    bw.write_bits(1, 8);
    write_codebook(&mut bw, 1, false);
    write_codebook(&mut bw, 2, true);

    // time
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);

    // floor 1
    bw.write_bits(0, 6);
    bw.write_bits(1, 16);
    bw.write_bits(0, 5);
    bw.write_bits(0, 2);
    bw.write_bits(7, 4);

    // residue 2
    bw.write_bits(0, 6);
    bw.write_bits(2, 16);
    bw.write_bits(0, 24);
    bw.write_bits(1 << 16, 24);
    bw.write_bits(PARTITION_SIZE as u32 - 1, 24);
    bw.write_bits(1, 6);
    bw.write_bits(0, 8);
    bw.write_bits(0, 3);
    bw.write_flag(false);
    bw.write_bits(1, 3);
    bw.write_flag(false);
    bw.write_bits(1, 8);

    // mapping
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);
    bw.write_flag(false);
    if spec.channels >= 2 {
        let ch_bits = ilog(u32::from(spec.channels) - 1);
        bw.write_flag(true);
        bw.write_bits(0, 8);
        bw.write_bits(0, ch_bits);
        bw.write_bits(1, ch_bits);
    } else {
        bw.write_flag(false);
    }
    bw.write_bits(0, 2);
    bw.write_bits(0, 8);
    bw.write_bits(0, 8);
    bw.write_bits(0, 8);

    // modes
    bw.write_bits(1, 6);
    for blockflag in [false, true] {
        bw.write_flag(blockflag);
        bw.write_bits(0, 16);
        bw.write_bits(0, 16);
        bw.write_bits(0, 8);
    }

    bw.write_flag(true);
    bw.finish()
}

/// 第 `index` 个音频包
pub fn build_audio_packet(spec: &StreamSpec, index: usize) -> Vec<u8> {
    let long = spec.blocks[index];
    let mut bw = BitWriter::new();
    bw.write_flag(false);
    bw.write_bits(u32::from(long), 1);
    if long {
        let prev_long = index > 0 && spec.blocks[index - 1];
        let next_long = spec.blocks.get(index + 1).copied().unwrap_or(false);
        bw.write_flag(prev_long);
        bw.write_flag(next_long);
    }

    // 每个声道的 floor 端点 Y 随包序号变化
    let y = 150 + (index as u32 * 13) % 100;
    for _ in 0..spec.channels {
        bw.write_flag(true);
        bw.write_bits(y, 8);
        bw.write_bits(255 - y / 2, 8);
    }

    let size = spec.blocksize(long) / 2 * usize::from(spec.channels);
    for p in 0..size / PARTITION_SIZE {
        let energetic = p < spec.energetic_partitions;
        bw.write_flag(energetic);
        if energetic {
            for k in 0..PARTITION_SIZE / 2 {
                bw.write_bits(((p + k + index) & 1) as u32, 1);
            }
        }
    }
    bw.finish()
}

/// 各音频包所在页的 granule: 累计采样数, 末包为 [`StreamSpec::final_granule`]
pub fn audio_granules(spec: &StreamSpec) -> Vec<i64> {
    let mut granule = 0i64;
    let mut out: Vec<i64> = spec
        .frames_per_packet()
        .iter()
        .map(|f| {
            granule += f;
            granule
        })
        .collect();
    if let Some(last) = out.last_mut() {
        *last = spec.final_granule();
    }
    out
}

/// 按 Vorbis 惯例组织页面: identification 头独占首页, comment 与 setup 同页
pub fn build_pages(spec: &StreamSpec) -> Vec<Page> {
    build_pages_custom(spec, &build_setup(spec), &audio_granules(spec))
}

/// 指定 setup 头包与每个音频包的 granule
pub fn build_pages_custom(spec: &StreamSpec, setup: &[u8], granules: &[i64]) -> Vec<Page> {
    let mut writer = PageWriter::with_page_size(spec.serial, spec.page_size);
    let mut pages = Vec::new();
    pages.extend(writer.write_packet(&build_ident(spec), 0, false));
    pages.extend(writer.flush());
    pages.extend(writer.write_packet(&build_comment(spec), 0, false));
    pages.extend(writer.write_packet(setup, 0, false));
    pages.extend(writer.flush());

    for (i, &granule) in granules.iter().enumerate() {
        let last = i + 1 == granules.len();
        pages.extend(writer.write_packet(&build_audio_packet(spec, i), granule, last));
    }
    pages.extend(writer.flush());
    pages
}

pub fn pages_to_bytes(pages: &[Page]) -> Vec<u8> {
    pages.iter().flat_map(|p| p.to_bytes()).collect()
}

pub fn build_stream(spec: &StreamSpec) -> Vec<u8> {
    pages_to_bytes(&build_pages(spec))
}
