//! 解码器 trait 定义.

use oggvorbis_core::OvResult;

use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 解码流程:
/// 1. 调用 `send_packet()` 送入压缩数据
/// 2. 调用 `receive_frame()` 取出解码后的帧, 直到返回 `NeedMoreData`
/// 3. 重复以上步骤直到所有数据处理完毕
pub trait Decoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 送入一个压缩数据包进行解码
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已接受 (可能产生 0 个或多个帧)
    /// - `Err(OvError::BlockDecode)`: 音频块解码失败, 该块以静音输出, 可继续送包
    /// - `Err(..)` 头包类错误: 当前逻辑流无法继续解码
    fn send_packet(&mut self, packet: &Packet) -> OvResult<()>;

    /// 从解码器取出一帧解码数据
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧
    /// - `Err(OvError::NeedMoreData)`: 需要送入更多数据包
    fn receive_frame(&mut self) -> OvResult<AudioFrame>;

    /// 刷新解码器, 丢弃跨块重叠状态与缓存帧
    fn flush(&mut self);
}
