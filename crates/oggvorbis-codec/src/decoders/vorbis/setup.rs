//! setup 头包解析: codebook / floor / residue / mapping / mode 配置.

use oggvorbis_core::{BitCursor, OvError, OvResult};

use super::codebook::Codebook;
use super::floor::Floor;
use super::headers::{Info, PACKET_TYPE_SETUP, check_header_marker};
use super::mapping::Mapping;
use super::residue::Residue;

/// 模式: 块大小标志与使用的 mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// 是否长块
    pub blockflag: bool,
    pub mapping: usize,
}

/// setup 头解析结果
#[derive(Debug, Clone)]
pub struct Setup {
    pub codebooks: Vec<Codebook>,
    pub floors: Vec<Floor>,
    pub residues: Vec<Residue>,
    pub mappings: Vec<Mapping>,
    pub modes: Vec<Mode>,
}

/// 解析 setup 头包, `info` 为已解析的 identification 头
pub fn parse_setup(packet: &[u8], info: &Info) -> OvResult<Setup> {
    check_header_marker(packet, PACKET_TYPE_SETUP)?;
    let mut br = BitCursor::new(&packet[7..]);
    parse_setup_body(&mut br, info).map_err(|e| match e {
        OvError::EndOfPacket => OvError::CorruptHeader(format!(
            "setup 头包被截断 (bit={})",
            br.bit_position()
        )),
        OvError::BlockDecode(msg) => OvError::CorruptHeader(msg),
        other => other,
    })
}

fn parse_setup_body(br: &mut BitCursor<'_>, info: &Info) -> OvResult<Setup> {
    let channels = usize::from(info.channels);
    let blocksizes = [info.blocksize_short, info.blocksize_long];

    let codebook_count = br.read_bits(8)? as usize + 1;
    let mut codebooks = Vec::with_capacity(codebook_count);
    for i in 0..codebook_count {
        let book = Codebook::read(br).map_err(|e| with_context(e, "codebook", i))?;
        codebooks.push(book);
    }

    // time domain transforms: 仅作占位, 必须全部为 0
    let time_count = br.read_bits(6)? + 1;
    for _ in 0..time_count {
        let value = br.read_bits(16)?;
        if value != 0 {
            return Err(OvError::CorruptHeader(format!(
                "time domain transform 非法: {}",
                value
            )));
        }
    }

    let floor_count = br.read_bits(6)? as usize + 1;
    let mut floors = Vec::with_capacity(floor_count);
    for i in 0..floor_count {
        let floor =
            Floor::read(br, &codebooks, blocksizes).map_err(|e| with_context(e, "floor", i))?;
        floors.push(floor);
    }

    let residue_count = br.read_bits(6)? as usize + 1;
    let mut residues = Vec::with_capacity(residue_count);
    for i in 0..residue_count {
        let residue = Residue::read(br, &codebooks).map_err(|e| with_context(e, "residue", i))?;
        residues.push(residue);
    }

    let mapping_count = br.read_bits(6)? as usize + 1;
    let mut mappings = Vec::with_capacity(mapping_count);
    for i in 0..mapping_count {
        let mapping = Mapping::read(br, channels, floor_count, residue_count)
            .map_err(|e| with_context(e, "mapping", i))?;
        mappings.push(mapping);
    }

    let mode_count = br.read_bits(6)? as usize + 1;
    let mut modes = Vec::with_capacity(mode_count);
    for _ in 0..mode_count {
        let blockflag = br.read_flag()?;
        let window_type = br.read_bits(16)?;
        let transform_type = br.read_bits(16)?;
        if window_type != 0 || transform_type != 0 {
            return Err(OvError::CorruptHeader(
                "mode window/transform 必须为 0".into(),
            ));
        }
        let mapping = br.read_bits(8)? as usize;
        if mapping >= mapping_count {
            return Err(OvError::CorruptHeader(format!(
                "mode mapping 索引越界: {}",
                mapping
            )));
        }
        modes.push(Mode { blockflag, mapping });
    }

    if !br.read_flag()? {
        return Err(OvError::CorruptHeader(
            "setup 头包 framing_flag 非法".into(),
        ));
    }

    log::debug!(
        "Vorbis setup: codebooks={}, floors={}, residues={}, mappings={}, modes={}",
        codebooks.len(),
        floors.len(),
        residues.len(),
        mappings.len(),
        modes.len(),
    );

    Ok(Setup {
        codebooks,
        floors,
        residues,
        mappings,
        modes,
    })
}

fn with_context(e: OvError, what: &str, index: usize) -> OvError {
    match e {
        OvError::CorruptHeader(msg) => {
            OvError::CorruptHeader(format!("{}[{}]: {}", what, index, msg))
        }
        other => other,
    }
}
