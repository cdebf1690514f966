//! 比特流读取器.
//!
//! Vorbis 包内所有字段按小端位序打包 (LSB first): 先读到的位落在结果的低位,
//! 字节内从最低位开始消费. 这与 FLAC/H.264 常用的 MSB first 相反.
//!
//! 读取位数超过剩余数据时返回 [`OvError::EndOfPacket`], 与合法的 0 值区分.

use crate::{OvError, OvResult};

/// 前缀码 (Huffman) 表
///
/// 由 codebook 实现, 使 [`BitCursor::read_codeword`] 可以逐位遍历解码树.
pub trait PrefixCode {
    /// 从读取器中解码一个符号 (entry 序号)
    fn decode_symbol(&self, br: &mut BitCursor<'_>) -> OvResult<u32>;
}

/// LSB first 比特流读取器
///
/// 每个包一个实例, 除内部位置外无副作用.
///
/// # 示例
/// ```
/// use oggvorbis_core::bitreader::BitCursor;
///
/// let data = [0b1011_0010];
/// let mut br = BitCursor::new(&data);
/// assert_eq!(br.read_bits(1).unwrap(), 0);
/// assert_eq!(br.read_bits(3).unwrap(), 0b001);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// ```
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    /// 源数据
    data: &'a [u8],
    /// 已消费的位数
    bit_pos: usize,
}

impl<'a> BitCursor<'a> {
    /// 创建新的读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// 已读取的位数
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// 是否已无数据可读
    pub fn is_exhausted(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 位标志
    pub fn read_flag(&mut self) -> OvResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 读取 N 个位 (0..=32)
    pub fn read_bits(&mut self, n: u32) -> OvResult<u32> {
        if n > 32 {
            return Err(OvError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n
            )));
        }
        Ok(self.read_wide(n)? as u32)
    }

    /// 读取 N 个位 (0..=64)
    ///
    /// floor0 的 amplitude 字段最宽可达 63 位.
    pub fn read_bits_u64(&mut self, n: u32) -> OvResult<u64> {
        if n > 64 {
            return Err(OvError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n
            )));
        }
        self.read_wide(n)
    }

    /// 解码一个前缀码码字, 返回 entry 序号
    pub fn read_codeword<C: PrefixCode + ?Sized>(&mut self, code: &C) -> OvResult<u32> {
        code.decode_symbol(self)
    }

    fn read_wide(&mut self, n: u32) -> OvResult<u64> {
        if n == 0 {
            return Ok(0);
        }
        if self.bits_left() < n as usize {
            // 耗尽时把位置推到末尾, 之后的读取一律返回 EndOfPacket
            self.bit_pos = self.data.len() * 8;
            return Err(OvError::EndOfPacket);
        }

        let mut out = 0u64;
        let mut got = 0u32;
        while got < n {
            let byte = self.data[self.bit_pos >> 3];
            let offset = (self.bit_pos & 7) as u32;
            let take = (8 - offset).min(n - got);
            let bits = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            out |= bits << got;
            got += take;
            self.bit_pos += take as usize;
        }
        Ok(out)
    }
}

/// 整数以 2 为底的位宽 (Vorbis `ilog`)
///
/// `ilog(0) = 0`, `ilog(1) = 1`, `ilog(7) = 3`, `ilog(8) = 4`.
pub fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}
