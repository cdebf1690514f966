//! 单元测试用的合成 Vorbis 头包与音频包.
//!
//! setup 配置固定为:
//! - codebook 0: 1 维, 2 个 1 位码字, 无查找表 (residue 分类)
//! - codebook 1: 2 维, 2 个 1 位码字, entry 0 = (1.0, 0.5), entry 1 = (-1.0, 0.0)
//! - floor 1: 无分区, multiplier 1, X = {0, 128}
//! - floor 0 (可选): order 2, bark_map_size 64, amplitude 6 位, 使用 codebook 1
//! - residue: 分区大小 16, 2 个分类, 类 1 在 pass 0 使用 codebook 1
//! - mapping: 所有 submap 共用 floor 0 与 residue 0
//! - mode 0 为短块, mode 1 为长块, 块大小 64/256

use oggvorbis_core::{BitWriter, ilog};

pub(crate) const PARTITION_SIZE: usize = 16;

pub(crate) const FLOOR0_ORDER: u32 = 2;
pub(crate) const FLOOR0_RATE: u32 = 8000;
pub(crate) const FLOOR0_BARK_MAP_SIZE: u32 = 64;
pub(crate) const FLOOR0_AMPLITUDE_BITS: u32 = 6;
pub(crate) const FLOOR0_AMPLITUDE_OFFSET: u32 = 40;

#[derive(Debug, Clone)]
pub(crate) struct SetupOptions {
    pub channels: usize,
    pub coupling: bool,
    pub residue_type: u32,
    pub framing: bool,
    /// floor 类型 0 或 1
    pub floor_type: u32,
    /// 每声道所属 submap, 为空时只有一个 submap
    pub mux: Vec<usize>,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            channels: 2,
            coupling: true,
            residue_type: 2,
            framing: true,
            floor_type: 1,
            mux: Vec::new(),
        }
    }
}

impl SetupOptions {
    pub(crate) fn submaps(&self) -> usize {
        self.mux.iter().max().map_or(1, |&m| m + 1)
    }

    pub(crate) fn channel_submap(&self, ch: usize) -> usize {
        self.mux.get(ch).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AudioPacket {
    pub long: bool,
    pub prev_long: bool,
    pub next_long: bool,
    /// 每声道 floor 1 的两个端点 Y 值, `None` 表示所有声道无能量
    pub floor_y: Option<(u32, u32)>,
    /// floor 0 的 amplitude (非 0)
    pub floor0_amplitude: u32,
    /// floor 标记为未使用的声道
    pub unused_floors: Vec<usize>,
    /// 每个 residue 向量前若干个分区使用类 1
    pub energetic_partitions: usize,
    /// residue 全部分区使用类 0 的声道 (格式 0/1)
    pub quiet_residues: Vec<usize>,
}

impl Default for AudioPacket {
    fn default() -> Self {
        Self {
            long: false,
            prev_long: false,
            next_long: false,
            floor_y: Some((200, 200)),
            floor0_amplitude: 20,
            unused_floors: Vec::new(),
            energetic_partitions: 0,
            quiet_residues: Vec::new(),
        }
    }
}

pub(crate) fn build_ident(channels: u8, sample_rate: u32, bs0_exp: u8, bs1_exp: u8) -> Vec<u8> {
    let mut v = vec![0x01];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(channels);
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.push((bs1_exp << 4) | bs0_exp);
    v.push(1);
    v
}

pub(crate) fn build_comment(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut v = vec![0x03];
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    v.extend_from_slice(vendor.as_bytes());
    v.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        v.extend_from_slice(&(c.len() as u32).to_le_bytes());
        v.extend_from_slice(c.as_bytes());
    }
    v.push(1);
    v
}

/// Vorbis 32 位浮点打包 (仅支持非零值)
pub(crate) fn float32_pack(value: f32) -> u32 {
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
    bw.write_bits(2, 4); // value_bits = 3
    bw.write_flag(false);
    for m in [4u32, 3, 0, 2] {
        bw.write_bits(m, 3);
    }
}

pub(crate) fn build_setup(options: &SetupOptions) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bytes(&[0x05]);
    bw.write_bytes(b"vorbis");

    bw.write_bits(1, 8);
    write_codebook(&mut bw, 1, false);
    write_codebook(&mut bw, 2, true);

    // time
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);

    // floor
    bw.write_bits(0, 6);
    if options.floor_type == 0 {
        bw.write_bits(0, 16);
        bw.write_bits(FLOOR0_ORDER, 8);
        bw.write_bits(FLOOR0_RATE, 16);
        bw.write_bits(FLOOR0_BARK_MAP_SIZE, 16);
        bw.write_bits(FLOOR0_AMPLITUDE_BITS, 6);
        bw.write_bits(FLOOR0_AMPLITUDE_OFFSET, 8);
        bw.write_bits(0, 4); // 1 个 book
        bw.write_bits(1, 8);
    } else {
        bw.write_bits(1, 16);
        bw.write_bits(0, 5);
        bw.write_bits(0, 2);
        bw.write_bits(7, 4);
    }

    // residue
    bw.write_bits(0, 6);
    bw.write_bits(options.residue_type, 16);
    bw.write_bits(0, 24);
    bw.write_bits(4096, 24);
    bw.write_bits(PARTITION_SIZE as u32 - 1, 24);
    bw.write_bits(1, 6);
    bw.write_bits(0, 8);
    bw.write_bits(0, 3);
    bw.write_flag(false);
    bw.write_bits(1, 3);
    bw.write_flag(false);
    bw.write_bits(1, 8);

    // mapping
    let submaps = options.submaps();
    bw.write_bits(0, 6);
    bw.write_bits(0, 16);
    bw.write_flag(submaps > 1);
    if submaps > 1 {
        bw.write_bits(submaps as u32 - 1, 4);
    }
    if options.coupling {
        let ch_bits = ilog(options.channels as u32 - 1);
        bw.write_flag(true);
        bw.write_bits(0, 8);
        bw.write_bits(0, ch_bits);
        bw.write_bits(1, ch_bits);
    } else {
        bw.write_flag(false);
    }
    bw.write_bits(0, 2);
    if submaps > 1 {
        for ch in 0..options.channels {
            bw.write_bits(options.channel_submap(ch) as u32, 4);
        }
    }
    for _ in 0..submaps {
        bw.write_bits(0, 8);
        bw.write_bits(0, 8);
        bw.write_bits(0, 8);
    }

    // modes
    bw.write_bits(1, 6);
    for blockflag in [false, true] {
        bw.write_flag(blockflag);
        bw.write_bits(0, 16);
        bw.write_bits(0, 16);
        bw.write_bits(0, 8);
    }

    bw.write_flag(options.framing);
    bw.finish()
}

pub(crate) fn build_audio_packet(options: &SetupOptions, packet: &AudioPacket) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_flag(false);
    bw.write_bits(u32::from(packet.long), 1);
    if packet.long {
        bw.write_flag(packet.prev_long);
        bw.write_flag(packet.next_long);
    }

    let Some((y0, y1)) = packet.floor_y else {
        for _ in 0..options.channels {
            if options.floor_type == 0 {
                bw.write_bits(0, FLOOR0_AMPLITUDE_BITS);
            } else {
                bw.write_flag(false);
            }
        }
        return bw.finish();
    };

    let mut no_residue = vec![false; options.channels];
    for (ch, unused) in no_residue.iter_mut().enumerate() {
        *unused = packet.unused_floors.contains(&ch);
        match (options.floor_type, *unused) {
            (0, true) => bw.write_bits(0, FLOOR0_AMPLITUDE_BITS),
            (0, false) => {
                bw.write_bits(packet.floor0_amplitude, FLOOR0_AMPLITUDE_BITS);
                bw.write_bits(0, 1); // book 序号
                // 一个 2 维码字覆盖 order 2: entry 0 = (1.0, 0.5)
                bw.write_bits(0, 1);
            }
            (_, true) => bw.write_flag(false),
            (_, false) => {
                bw.write_flag(true);
                bw.write_bits(y0, 8);
                bw.write_bits(y1, 8);
            }
        }
    }
    // 耦合的两个声道只要有一个有能量, 两者都编码 residue
    if options.coupling && (!no_residue[0] || !no_residue[1]) {
        no_residue[0] = false;
        no_residue[1] = false;
    }

    let n2 = if packet.long { 128 } else { 32 };
    for submap in 0..options.submaps() {
        let members: Vec<usize> = (0..options.channels)
            .filter(|&c| options.channel_submap(c) == submap)
            .collect();
        if options.residue_type == 2 {
            if members.iter().all(|&c| no_residue[c]) {
                continue;
            }
            write_residue(
                &mut bw,
                &[packet.energetic_partitions],
                n2 * members.len(),
            );
        } else {
            let energies: Vec<usize> = members
                .iter()
                .filter(|&&c| !no_residue[c])
                .map(|c| {
                    if packet.quiet_residues.contains(c) {
                        0
                    } else {
                        packet.energetic_partitions
                    }
                })
                .collect();
            write_residue(&mut bw, &energies, n2);
        }
    }
    bw.finish()
}

/// 写入一组 residue 向量, `energies[j]` 为第 j 个向量前几个分区使用类 1
fn write_residue(bw: &mut BitWriter, energies: &[usize], size: usize) {
    for p in 0..size / PARTITION_SIZE {
        for &e in energies {
            bw.write_flag(p < e);
        }
        for &e in energies {
            if p < e {
                // 每个码字 0 对应 entry 0 = (1.0, 0.5)
                for _ in 0..PARTITION_SIZE / 2 {
                    bw.write_bits(0, 1);
                }
            }
        }
    }
}
