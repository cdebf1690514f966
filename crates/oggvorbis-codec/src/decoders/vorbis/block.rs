//! 音频包解码: floor → residue → 逆耦合 → 频谱合成 → IMDCT/overlap-add.

use oggvorbis_core::{BitCursor, OvError, OvResult, ilog};

use super::floor::FloorData;
use super::mapping::Mapping;
use super::residue::inverse_coupling;
use super::setup::Setup;
use super::synthesis::DecodeContext;

/// 音频包头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub mode: usize,
    pub long: bool,
    pub prev_long: bool,
    pub next_long: bool,
}

/// 单个音频块的解码结果
#[derive(Debug)]
pub struct DecodedBlock {
    pub header: BlockHeader,
    /// 本块产出的采样帧数, 见 [`DecodeContext::synthesize`]
    pub frames: usize,
    /// 块内解码失败 (本块以静音参与合成)
    pub error: Option<OvError>,
}

/// 读取音频包头
///
/// 非音频包, mode 越界或包头不完整时返回错误, 该包应被丢弃.
pub fn read_block_header(br: &mut BitCursor<'_>, setup: &Setup) -> OvResult<BlockHeader> {
    let header = (|| {
        if br.read_flag()? {
            return Err(OvError::BlockDecode("非音频包".into()));
        }
        let mode_bits = ilog(setup.modes.len().saturating_sub(1) as u32);
        let mode = br.read_bits(mode_bits)? as usize;
        let blockflag = setup
            .modes
            .get(mode)
            .map(|m| m.blockflag)
            .ok_or_else(|| OvError::BlockDecode(format!("mode 索引越界: {}", mode)))?;
        let (prev_long, next_long) = if blockflag {
            (br.read_flag()?, br.read_flag()?)
        } else {
            (false, false)
        };
        Ok(BlockHeader {
            mode,
            long: blockflag,
            prev_long,
            next_long,
        })
    })();
    header.map_err(|e| match e {
        OvError::EndOfPacket => OvError::BlockDecode("音频包头不完整".into()),
        other => other,
    })
}

/// 解码一个音频包并完成时域合成
///
/// 包头无效时返回 `Err`, 重叠状态不变. 块内解码失败时频谱清零后照常合成,
/// 错误记录在 [`DecodedBlock::error`] 中.
pub fn decode_block(
    setup: &Setup,
    ctx: &mut DecodeContext,
    packet: &[u8],
) -> OvResult<DecodedBlock> {
    let mut br = BitCursor::new(packet);
    let header = read_block_header(&mut br, setup)?;
    let mapping = &setup.mappings[setup.modes[header.mode].mapping];
    let n2 = ctx.blocksize(header.long) / 2;

    let error = decode_spectra(setup, mapping, ctx, &mut br, header.long, n2).err();
    if error.is_some() {
        ctx.clear_spectra(n2);
    }

    let frames = ctx.synthesize(header.long, header.prev_long, header.next_long);
    Ok(DecodedBlock {
        header,
        frames,
        error,
    })
}

fn decode_spectra(
    setup: &Setup,
    mapping: &Mapping,
    ctx: &mut DecodeContext,
    br: &mut BitCursor<'_>,
    long: bool,
    n2: usize,
) -> OvResult<()> {
    ctx.clear_spectra(n2);
    let channels = ctx.channels();

    let mut floors = Vec::with_capacity(channels);
    for ch in 0..channels {
        let floor = &setup.floors[mapping.channel_floor(ch)];
        floors.push(floor.decode(br, &setup.codebooks)?);
    }

    // 耦合的两个声道只要有一个有能量, 两者都要解 residue
    let mut no_residue: Vec<bool> = floors.iter().map(FloorData::is_unused).collect();
    for &(magnitude, angle) in &mapping.coupling {
        if !no_residue[magnitude] || !no_residue[angle] {
            no_residue[magnitude] = false;
            no_residue[angle] = false;
        }
    }

    for submap in 0..mapping.submaps() {
        let members: Vec<usize> = (0..channels).filter(|&c| mapping.mux[c] == submap).collect();
        if members.is_empty() {
            continue;
        }
        let do_not_decode: Vec<bool> = members.iter().map(|&c| no_residue[c]).collect();
        let mut vectors: Vec<Vec<f32>> = members
            .iter()
            .map(|&c| std::mem::take(&mut ctx.spectra[c]))
            .collect();

        let residue = &setup.residues[mapping.submap_residue[submap]];
        let result = residue.decode(br, &setup.codebooks, &mut vectors, &do_not_decode, n2);
        for (&c, v) in members.iter().zip(vectors) {
            ctx.spectra[c] = v;
        }
        result?;
    }

    for &(magnitude, angle) in mapping.coupling.iter().rev() {
        let (m, a) = pair_mut(&mut ctx.spectra, magnitude, angle);
        inverse_coupling(&mut m[..n2], &mut a[..n2]);
    }

    let curve = &mut ctx.floor_curve[..n2];
    for (ch, data) in floors.iter().enumerate() {
        let spectrum = &mut ctx.spectra[ch][..n2];
        if data.is_unused() {
            spectrum.fill(0.0);
            continue;
        }
        setup.floors[mapping.channel_floor(ch)].render(data, long, curve);
        for (s, &c) in spectrum.iter_mut().zip(curve.iter()) {
            *s *= c;
        }
    }
    Ok(())
}

/// 同时可变借用两个不同声道
fn pair_mut(v: &mut [Vec<f32>], a: usize, b: usize) -> (&mut Vec<f32>, &mut Vec<f32>) {
    if a < b {
        let (lo, hi) = v.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = v.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}
