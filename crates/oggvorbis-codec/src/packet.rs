//! 压缩数据包 (Packet).
//!
//! 从 Ogg 逻辑流重组出的一个编解码单元: 一个头包或一个音频块.

use bytes::Bytes;

/// 无效 granule position (页面上没有完结的包)
pub const NO_GRANULE: i64 = -1;

/// 压缩数据包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 包数据
    pub data: Bytes,
    /// granule position, 仅当本包是所在页面最后一个完结的包时有效
    pub granule: i64,
    /// 是否为逻辑流的第一个包
    pub bos: bool,
    /// 是否为逻辑流的最后一个包
    pub eos: bool,
    /// 逻辑流内的包序号, 出现跳号表示中间有数据丢失
    pub packet_no: i64,
    /// 所属逻辑流的序列号
    pub serial: u32,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            granule: NO_GRANULE,
            bos: false,
            eos: false,
            packet_no: 0,
            serial: 0,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否携带有效 granule position
    pub fn has_granule(&self) -> bool {
        self.granule != NO_GRANULE
    }
}
