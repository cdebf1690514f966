//! mapping 配置: 声道到 submap 的分配与 channel coupling 步骤.

use oggvorbis_core::{BitCursor, OvError, OvResult, ilog};

/// mapping 配置 (仅 mapping type 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// coupling 步骤 `(magnitude, angle)`, 按读取顺序
    pub coupling: Vec<(usize, usize)>,
    /// 每声道所属 submap
    pub mux: Vec<usize>,
    /// 每个 submap 使用的 floor 序号
    pub submap_floor: Vec<usize>,
    /// 每个 submap 使用的 residue 序号
    pub submap_residue: Vec<usize>,
}

impl Mapping {
    /// 从 setup 头读取一个 mapping 配置
    pub fn read(
        br: &mut BitCursor<'_>,
        channels: usize,
        floor_count: usize,
        residue_count: usize,
    ) -> OvResult<Self> {
        let mapping_type = br.read_bits(16)?;
        if mapping_type != 0 {
            return Err(OvError::CorruptHeader(format!(
                "mapping_type 不支持: {}",
                mapping_type,
            )));
        }

        let submaps = if br.read_flag()? {
            br.read_bits(4)? as usize + 1
        } else {
            1
        };

        let mut coupling = Vec::new();
        if br.read_flag()? {
            let steps = br.read_bits(8)? as usize + 1;
            let ch_bits = ilog(channels.saturating_sub(1) as u32);
            coupling.reserve(steps);
            for _ in 0..steps {
                let magnitude = br.read_bits(ch_bits)? as usize;
                let angle = br.read_bits(ch_bits)? as usize;
                if magnitude == angle || magnitude >= channels || angle >= channels {
                    return Err(OvError::CorruptHeader(format!(
                        "coupling 参数非法: magnitude={}, angle={}",
                        magnitude, angle
                    )));
                }
                coupling.push((magnitude, angle));
            }
        }

        if br.read_bits(2)? != 0 {
            return Err(OvError::CorruptHeader(
                "mapping reserved bits 必须为 0".into(),
            ));
        }

        let mut mux = vec![0usize; channels];
        if submaps > 1 {
            for slot in mux.iter_mut() {
                let m = br.read_bits(4)? as usize;
                if m >= submaps {
                    return Err(OvError::CorruptHeader(format!("mapping mux 值越界: {}", m)));
                }
                *slot = m;
            }
        }

        let mut submap_floor = Vec::with_capacity(submaps);
        let mut submap_residue = Vec::with_capacity(submaps);
        for _ in 0..submaps {
            // time 配置占位, 未使用
            br.read_bits(8)?;
            let floor = br.read_bits(8)? as usize;
            let residue = br.read_bits(8)? as usize;
            if floor >= floor_count || residue >= residue_count {
                return Err(OvError::CorruptHeader(format!(
                    "mapping floor/residue 索引越界: floor={}, residue={}",
                    floor, residue
                )));
            }
            submap_floor.push(floor);
            submap_residue.push(residue);
        }

        Ok(Self {
            coupling,
            mux,
            submap_floor,
            submap_residue,
        })
    }

    /// submap 个数
    pub fn submaps(&self) -> usize {
        self.submap_floor.len()
    }

    /// 声道 `ch` 使用的 floor 序号
    pub fn channel_floor(&self, ch: usize) -> usize {
        self.submap_floor[self.mux[ch]]
    }
}
