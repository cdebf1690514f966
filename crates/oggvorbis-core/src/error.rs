//! 统一错误类型定义.
//!
//! 所有 oggvorbis crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误按恢复策略分为三类:
//! - 容器级 (`SyncLost`, `CorruptPage`): 在解封装层局部恢复, 跳过并重新同步
//! - 逻辑流级 (`MissingHeaderPacket`, `CorruptHeader`, `CorruptSecondaryHeader`, `NotVorbis`):
//!   仅终止当前逻辑流, 后续串接流仍可尝试
//! - 块级 (`BlockDecode`): 当前块输出静音, 继续解码下一个包

use thiserror::Error;

/// 统一错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OvError {
    /// 未找到 capture pattern 或页面校验失败, 解封装器将重新同步
    #[error("失去页面同步")]
    SyncLost,

    /// 段表异常或续包不匹配, 该页数据被丢弃
    #[error("页面损坏: {0}")]
    CorruptPage(String),

    /// 头包缺失或乱序
    #[error("缺少头包: {0}")]
    MissingHeaderPacket(String),

    /// identification/setup 头包内容非法
    #[error("头包损坏: {0}")]
    CorruptHeader(String),

    /// comment 头包内容非法
    #[error("次级头包损坏: {0}")]
    CorruptSecondaryHeader(String),

    /// 合法 Ogg 页面, 但负载不是 Vorbis
    #[error("不是 Vorbis 流: {0}")]
    NotVorbis(String),

    /// 音频包内码字或分区解码失败, 对应块输出静音
    #[error("块解码失败: {0}")]
    BlockDecode(String),

    /// 正常结束信号
    #[error("已到达流末尾")]
    EndOfStream,

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 包内位数据已耗尽 (与读到数值 0 区分)
    #[error("包数据已耗尽")]
    EndOfPacket,

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),
}

impl OvError {
    /// 是否可在局部恢复 (不影响逻辑流继续解码)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SyncLost | Self::CorruptPage(_) | Self::BlockDecode(_) | Self::EndOfPacket
        )
    }

    /// 是否对所属逻辑流致命
    pub fn is_fatal_for_stream(&self) -> bool {
        matches!(
            self,
            Self::MissingHeaderPacket(_)
                | Self::CorruptHeader(_)
                | Self::CorruptSecondaryHeader(_)
                | Self::NotVorbis(_)
        )
    }
}

/// 统一 Result 类型
pub type OvResult<T> = Result<T, OvError>;
