//! residue 解码: 分区向量量化的频谱细节.
//!
//! 三种格式共用同一套分区/分类流程, 区别只在分区内 VQ 向量的摆放:
//! - 格式 0: 向量元素按 `partition_size / dimensions` 步长交错写入
//! - 格式 1: 向量元素顺序写入
//! - 格式 2: 所有声道交错成一个长向量按格式 1 解码, 再拆回各声道

use oggvorbis_core::{BitCursor, OvError, OvResult};

use super::codebook::Codebook;

/// 每个分类最多 8 轮 (pass)
const RESIDUE_PASSES: usize = 8;

/// residue 配置
#[derive(Debug, Clone)]
pub struct Residue {
    /// 格式 0/1/2
    pub residue_type: u32,
    pub begin: usize,
    pub end: usize,
    pub partition_size: usize,
    pub classifications: usize,
    pub classbook: usize,
    /// `books[class][pass]`
    pub books: Vec<[Option<usize>; RESIDUE_PASSES]>,
}

impl Residue {
    /// 从 setup 头读取一个 residue 配置
    pub fn read(br: &mut BitCursor<'_>, codebooks: &[Codebook]) -> OvResult<Self> {
        let residue_type = br.read_bits(16)?;
        if residue_type > 2 {
            return Err(OvError::CorruptHeader(format!(
                "residue_type 不支持: {}",
                residue_type,
            )));
        }
        let begin = br.read_bits(24)? as usize;
        let end = br.read_bits(24)? as usize;
        let partition_size = br.read_bits(24)? as usize + 1;
        let classifications = br.read_bits(6)? as usize + 1;
        let classbook = br.read_bits(8)? as usize;
        if classbook >= codebooks.len() {
            return Err(OvError::CorruptHeader(format!(
                "residue classbook 越界: {}",
                classbook
            )));
        }

        let mut cascades = Vec::with_capacity(classifications);
        for _ in 0..classifications {
            let low_bits = br.read_bits(3)?;
            let high_bits = if br.read_flag()? { br.read_bits(5)? } else { 0 };
            cascades.push((high_bits << 3) | low_bits);
        }

        let mut books = Vec::with_capacity(classifications);
        for cascade in cascades {
            let mut passes = [None; RESIDUE_PASSES];
            for (pass, slot) in passes.iter_mut().enumerate() {
                if cascade & (1 << pass) == 0 {
                    continue;
                }
                let book = br.read_bits(8)? as usize;
                if book >= codebooks.len() || !codebooks[book].has_lookup() {
                    return Err(OvError::CorruptHeader(format!(
                        "residue VQ book 非法: {}",
                        book
                    )));
                }
                *slot = Some(book);
            }
            books.push(passes);
        }

        Ok(Self {
            residue_type,
            begin,
            end,
            partition_size,
            classifications,
            classbook,
            books,
        })
    }

    /// 解码一个 submap 内各声道的 residue 向量
    ///
    /// `vectors` 每项长度为 `n2` (块大小一半), 调用方负责清零.
    /// 包数据耗尽时保留已解码部分并正常返回.
    pub fn decode(
        &self,
        br: &mut BitCursor<'_>,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
        n2: usize,
    ) -> OvResult<()> {
        if self.residue_type != 2 {
            return self.decode_partitioned(br, codebooks, vectors, do_not_decode, n2);
        }

        if do_not_decode.iter().all(|&d| d) {
            return Ok(());
        }
        let ch = vectors.len();
        let mut interleaved = [vec![0.0f32; n2 * ch]];
        let result = self.decode_partitioned(br, codebooks, &mut interleaved, &[false], n2 * ch);
        for (i, &v) in interleaved[0].iter().enumerate() {
            vectors[i % ch][i / ch] = v;
        }
        result
    }

    fn decode_partitioned(
        &self,
        br: &mut BitCursor<'_>,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
        actual_size: usize,
    ) -> OvResult<()> {
        match self.decode_passes(br, codebooks, vectors, do_not_decode, actual_size) {
            Err(OvError::EndOfPacket) => Ok(()),
            other => other,
        }
    }

    fn decode_passes(
        &self,
        br: &mut BitCursor<'_>,
        codebooks: &[Codebook],
        vectors: &mut [Vec<f32>],
        do_not_decode: &[bool],
        actual_size: usize,
    ) -> OvResult<()> {
        let limit_begin = self.begin.min(actual_size);
        let limit_end = self.end.min(actual_size);
        let partitions = limit_end.saturating_sub(limit_begin) / self.partition_size;
        if partitions == 0 {
            return Ok(());
        }

        let classbook = &codebooks[self.classbook];
        let classwords = classbook.dimensions;
        let ch = vectors.len();
        let mut classes = vec![vec![0usize; partitions + classwords]; ch];

        for pass in 0..RESIDUE_PASSES {
            let mut partition = 0usize;
            while partition < partitions {
                if pass == 0 {
                    for (j, class_row) in classes.iter_mut().enumerate() {
                        if do_not_decode[j] {
                            continue;
                        }
                        // 分类码字的高位数字对应靠前的分区
                        let mut temp = classbook.decode_scalar(br)? as usize;
                        for i in (0..classwords).rev() {
                            class_row[partition + i] = temp % self.classifications;
                            temp /= self.classifications;
                        }
                    }
                }

                let mut word = 0usize;
                while word < classwords && partition < partitions {
                    for (j, vector) in vectors.iter_mut().enumerate() {
                        if do_not_decode[j] {
                            continue;
                        }
                        let class = classes[j][partition];
                        if let Some(book) = self.books[class][pass] {
                            let offset = limit_begin + partition * self.partition_size;
                            self.decode_partition(br, &codebooks[book], vector, offset)?;
                        }
                    }
                    word += 1;
                    partition += 1;
                }
            }
        }
        Ok(())
    }

    fn decode_partition(
        &self,
        br: &mut BitCursor<'_>,
        book: &Codebook,
        out: &mut [f32],
        offset: usize,
    ) -> OvResult<()> {
        let psize = self.partition_size;
        if self.residue_type == 0 {
            let step = psize / book.dimensions;
            for j in 0..step {
                let values = book.decode_vq(br)?;
                for (k, &v) in values.iter().enumerate() {
                    if let Some(slot) = out.get_mut(offset + j + k * step) {
                        *slot += v;
                    }
                }
            }
        } else {
            let mut i = 0usize;
            while i < psize {
                for &v in book.decode_vq(br)? {
                    if let Some(slot) = out.get_mut(offset + i) {
                        *slot += v;
                    }
                    i += 1;
                }
            }
        }
        Ok(())
    }
}

/// 方形极坐标 channel coupling 逆变换 (单个耦合步骤)
pub fn inverse_coupling(magnitude: &mut [f32], angle: &mut [f32]) {
    for (m_slot, a_slot) in magnitude.iter_mut().zip(angle.iter_mut()) {
        let m = *m_slot;
        let a = *a_slot;
        let (new_m, new_a) = if m > 0.0 {
            if a > 0.0 { (m, m - a) } else { (m + a, m) }
        } else if a > 0.0 {
            (m, m + a)
        } else {
            (m - a, m)
        };
        *m_slot = new_m;
        *a_slot = new_a;
    }
}
