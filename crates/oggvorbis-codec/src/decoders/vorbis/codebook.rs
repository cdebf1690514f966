//! Codebook: 前缀码解码树与 VQ 查找表.
//!
//! 码字分配规则: 按 entry 序号依次为每个已用 entry 分配其码长下
//! 当前可用的最小码字. 码长集合过度指定 (Kraft 和 > 1) 视为头包损坏;
//! 欠指定允许, 不可达的码字在解码时报错.

use oggvorbis_core::{BitCursor, OvError, OvResult, PrefixCode, ilog};

/// codebook 同步字 "BCV"
const CODEBOOK_SYNC: u32 = 0x56_4342;

/// 解码树节点的空子节点
const NODE_EMPTY: u32 = u32::MAX;
/// 叶子标记位
const NODE_LEAF: u32 = 1 << 31;

/// 单个 codebook
#[derive(Debug, Clone)]
pub struct Codebook {
    /// 每个 VQ 向量的维数
    pub dimensions: usize,
    /// entry 数量
    pub entries: usize,
    /// 每个 entry 的码长, 0 表示未使用
    pub lengths: Vec<u8>,
    /// VQ 查找表, `entries * dimensions` 个值, 无查找表时为 `None`
    vq: Option<Vec<f32>>,
    /// 扁平化解码树, 每个节点两个子节点 (0/1)
    nodes: Vec<[u32; 2]>,
    /// 仅一个已用 entry 时的特殊情况
    single_entry: Option<u32>,
}

impl Codebook {
    /// 从 setup 头中读取一个 codebook 描述并构建
    pub fn read(br: &mut BitCursor<'_>) -> OvResult<Self> {
        let sync = br.read_bits(24)?;
        if sync != CODEBOOK_SYNC {
            return Err(OvError::CorruptHeader(format!(
                "codebook 同步字错误: 0x{sync:06X}",
            )));
        }

        let dimensions = br.read_bits(16)?;
        let entries = br.read_bits(24)?;
        if dimensions == 0 || entries == 0 {
            return Err(OvError::CorruptHeader(format!(
                "codebook 参数非法: dimensions={}, entries={}",
                dimensions, entries
            )));
        }
        // entries * dimensions 必须小于 2^24, 限制查找表大小
        if ilog(dimensions) + ilog(entries) > 24 {
            return Err(OvError::CorruptHeader(format!(
                "codebook 过大: dimensions={}, entries={}",
                dimensions, entries
            )));
        }

        let lengths = read_lengths(br, entries as usize)?;

        let lookup_type = br.read_bits(4)?;
        let vq = match lookup_type {
            0 => None,
            1 | 2 => Some(read_lookup(br, lookup_type, entries, dimensions)?),
            _ => {
                return Err(OvError::CorruptHeader(format!(
                    "codebook lookup_type 非法: {}",
                    lookup_type,
                )));
            }
        };

        let mut book = Self::from_lengths(&lengths, dimensions as usize)?;
        book.vq = vq;
        Ok(book)
    }

    /// 从码长表构建 (无 VQ 查找表)
    pub fn from_lengths(lengths: &[u8], dimensions: usize) -> OvResult<Self> {
        let mut book = Self {
            dimensions,
            entries: lengths.len(),
            lengths: lengths.to_vec(),
            vq: None,
            nodes: vec![[NODE_EMPTY; 2]],
            single_entry: None,
        };

        let used: Vec<usize> = lengths
            .iter()
            .enumerate()
            .filter(|&(_, &len)| len > 0)
            .map(|(i, _)| i)
            .collect();
        if used.len() == 1 {
            book.single_entry = Some(used[0] as u32);
            return Ok(book);
        }

        let codewords = assign_codewords(lengths)?;
        for (entry, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            book.insert(codewords[entry], len, entry as u32)?;
        }
        Ok(book)
    }

    /// 直接指定 VQ 查找表, 用于构造测试码本
    #[cfg(test)]
    pub(crate) fn with_vq(mut self, table: Vec<f32>) -> Self {
        assert_eq!(table.len(), self.entries * self.dimensions);
        self.vq = Some(table);
        self
    }

    /// 是否带有 VQ 查找表
    pub fn has_lookup(&self) -> bool {
        self.vq.is_some()
    }

    /// 解码一个标量 (entry 序号)
    pub fn decode_scalar(&self, br: &mut BitCursor<'_>) -> OvResult<u32> {
        br.read_codeword(self)
    }

    /// 解码一个 VQ 向量, 返回查找表中对应的切片
    pub fn decode_vq<'s>(&'s self, br: &mut BitCursor<'_>) -> OvResult<&'s [f32]> {
        let entry = br.read_codeword(self)? as usize;
        self.vq_values(entry)
    }

    /// 取 entry 对应的 VQ 向量
    pub fn vq_values(&self, entry: usize) -> OvResult<&[f32]> {
        let table = self
            .vq
            .as_ref()
            .ok_or_else(|| OvError::BlockDecode("标量 codebook 不能用于 VQ 解码".into()))?;
        let start = entry * self.dimensions;
        table
            .get(start..start + self.dimensions)
            .ok_or_else(|| OvError::BlockDecode(format!("VQ entry 越界: {}", entry)))
    }

    fn insert(&mut self, codeword: u32, len: u8, entry: u32) -> OvResult<()> {
        let mut node = 0usize;
        for depth in (0..len).rev() {
            let bit = ((codeword >> depth) & 1) as usize;
            let child = self.nodes[node][bit];
            if depth == 0 {
                if child != NODE_EMPTY {
                    return Err(OvError::CorruptHeader("codebook 码字冲突".into()));
                }
                self.nodes[node][bit] = NODE_LEAF | entry;
                return Ok(());
            }
            if child == NODE_EMPTY {
                let next = self.nodes.len() as u32;
                self.nodes.push([NODE_EMPTY; 2]);
                self.nodes[node][bit] = next;
                node = next as usize;
            } else if child & NODE_LEAF != 0 {
                return Err(OvError::CorruptHeader("codebook 码字冲突".into()));
            } else {
                node = child as usize;
            }
        }
        Ok(())
    }
}

impl PrefixCode for Codebook {
    fn decode_symbol(&self, br: &mut BitCursor<'_>) -> OvResult<u32> {
        if let Some(entry) = self.single_entry {
            br.read_bits(1)?;
            return Ok(entry);
        }

        let mut node = 0usize;
        loop {
            let bit = br.read_bits(1)? as usize;
            let child = self.nodes[node][bit];
            if child == NODE_EMPTY {
                return Err(OvError::BlockDecode("无效码字".into()));
            }
            if child & NODE_LEAF != 0 {
                return Ok(child & !NODE_LEAF);
            }
            node = child as usize;
        }
    }
}

/// 按规范顺序分配码字, 返回每个 entry 的码字 (高位为首个读取的位)
fn assign_codewords(lengths: &[u8]) -> OvResult<Vec<u32>> {
    // marker[len]: 码长 len 下一个可用码字
    let mut marker = [0u32; 33];
    let mut out = vec![0u32; lengths.len()];

    for (entry, &len) in lengths.iter().enumerate() {
        if len == 0 {
            continue;
        }
        let len = usize::from(len);
        let code = marker[len];
        if len < 32 && (code >> len) != 0 {
            return Err(OvError::CorruptHeader(format!(
                "codebook 码长表过度指定 (entry={})",
                entry
            )));
        }
        out[entry] = code;

        // 占用 code 后, 更新更短码长的下一个可用码字
        for j in (1..=len).rev() {
            if marker[j] & 1 != 0 {
                if j == 1 {
                    marker[1] = marker[1].wrapping_add(1);
                } else {
                    marker[j] = marker[j - 1] << 1;
                }
                break;
            }
            marker[j] = marker[j].wrapping_add(1);
        }

        // 更长码长中以 code 为前缀的码字不再可用
        let mut prefix = code;
        for j in (len + 1)..33 {
            if (marker[j] >> 1) == prefix {
                prefix = marker[j];
                marker[j] = marker[j - 1] << 1;
            } else {
                break;
            }
        }
    }
    Ok(out)
}

fn read_lengths(br: &mut BitCursor<'_>, entries: usize) -> OvResult<Vec<u8>> {
    let mut lengths = vec![0u8; entries];
    let ordered = br.read_flag()?;
    if ordered {
        let mut current_entry = 0usize;
        let mut current_length = br.read_bits(5)? + 1;
        while current_entry < entries {
            if current_length > 32 {
                return Err(OvError::CorruptHeader("codebook 码长超过 32".into()));
            }
            let bits = ilog((entries - current_entry) as u32);
            let number = br.read_bits(bits)? as usize;
            if number > entries - current_entry {
                return Err(OvError::CorruptHeader(
                    "codebook ordered 长度组越界".into(),
                ));
            }
            lengths[current_entry..current_entry + number].fill(current_length as u8);
            current_entry += number;
            current_length += 1;
        }
    } else {
        let sparse = br.read_flag()?;
        for slot in &mut lengths {
            let used = if sparse { br.read_flag()? } else { true };
            if used {
                *slot = br.read_bits(5)? as u8 + 1;
            }
        }
    }
    Ok(lengths)
}

fn read_lookup(
    br: &mut BitCursor<'_>,
    lookup_type: u32,
    entries: u32,
    dimensions: u32,
) -> OvResult<Vec<f32>> {
    let minimum_value = float32_unpack(br.read_bits(32)?);
    let delta_value = float32_unpack(br.read_bits(32)?);
    let value_bits = br.read_bits(4)? + 1;
    let sequence_p = br.read_flag()?;

    let lookup_values = if lookup_type == 1 {
        lookup1_values(entries, dimensions)
    } else {
        entries * dimensions
    };
    if lookup_values == 0 {
        return Err(OvError::CorruptHeader("codebook lookup_values 为 0".into()));
    }
    // 每个 multiplicand 至少 1 位, 用剩余位数限制分配
    if lookup_values as usize > br.bits_left() {
        return Err(OvError::CorruptHeader(
            "codebook multiplicands 超出包长度".into(),
        ));
    }
    let mut multiplicands = Vec::with_capacity(lookup_values as usize);
    for _ in 0..lookup_values {
        multiplicands.push(br.read_bits(value_bits)?);
    }

    let entries = entries as usize;
    let dims = dimensions as usize;
    let mut table = Vec::with_capacity(entries * dims);
    for entry in 0..entries {
        let mut last = 0.0f32;
        let mut index_divisor = 1usize;
        for i in 0..dims {
            let offset = if lookup_type == 1 {
                (entry / index_divisor) % lookup_values as usize
            } else {
                entry * dims + i
            };
            let v = multiplicands[offset] as f32 * delta_value + minimum_value + last;
            if sequence_p {
                last = v;
            }
            table.push(v);
            if lookup_type == 1 {
                index_divisor = index_divisor.saturating_mul(lookup_values as usize);
            }
        }
    }
    Ok(table)
}

/// Vorbis 32 位压缩浮点格式解包
///
/// 21 位尾数, 10 位偏移指数 (偏移 788), 1 位符号.
pub fn float32_unpack(x: u32) -> f32 {
    let mantissa = (x & 0x1F_FFFF) as f64;
    let sign = x & 0x8000_0000;
    let exponent = ((x & 0x7FE0_0000) >> 21) as i32;
    let m = if sign != 0 { -mantissa } else { mantissa };
    (m * 2f64.powi(exponent - 788)) as f32
}

/// 满足 `v^dimensions <= entries` 的最大整数 v
pub fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }

    let mut lo = 1u32;
    let mut hi = entries;
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if pow_le_entries(mid, dimensions, entries) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn pow_le_entries(base: u32, exp: u32, entries: u32) -> bool {
    let mut out = 1u128;
    let limit = u128::from(entries);
    for _ in 0..exp {
        out *= u128::from(base);
        if out > limit {
            return false;
        }
    }
    true
}
