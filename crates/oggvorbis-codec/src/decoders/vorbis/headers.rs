//! identification / comment 头包解析.

use oggvorbis_core::{OvError, OvResult};

use super::setup::Setup;

/// 头包类型字节
pub(crate) const PACKET_TYPE_IDENT: u8 = 0x01;
pub(crate) const PACKET_TYPE_COMMENT: u8 = 0x03;
pub(crate) const PACKET_TYPE_SETUP: u8 = 0x05;

/// Vorbis 流描述
///
/// identification 头解析后得到部分信息, setup 头解析后 `setup` 被填充,
/// 之后在整个逻辑流内不再变化.
#[derive(Debug, Clone)]
pub struct Info {
    /// 声道数
    pub channels: u8,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 最大码率, 未指定为 `None`
    pub bitrate_maximum: Option<i32>,
    /// 标称码率, 未指定为 `None`
    pub bitrate_nominal: Option<i32>,
    /// 最小码率, 未指定为 `None`
    pub bitrate_minimum: Option<i32>,
    /// 短块大小
    pub blocksize_short: usize,
    /// 长块大小
    pub blocksize_long: usize,
    /// setup 头解析结果 (codebook/floor/residue/mapping/mode)
    pub setup: Option<Setup>,
}

impl Info {
    /// 三个头包是否已全部解析
    pub fn is_complete(&self) -> bool {
        self.setup.is_some()
    }

    /// 按块标志返回块大小
    pub fn blocksize(&self, long: bool) -> usize {
        if long {
            self.blocksize_long
        } else {
            self.blocksize_short
        }
    }
}

/// 用户注释
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    /// 编码器标识
    pub vendor: String,
    /// 注释字符串, 通常为 `KEY=value`
    pub user_comments: Vec<String>,
}

impl Comment {
    /// 查询第 `index` 个键为 `tag` 的值 (键不区分大小写)
    pub fn query(&self, tag: &str, index: usize) -> Option<&str> {
        self.iter_pairs()
            .filter(|(k, _)| k.eq_ignore_ascii_case(tag))
            .nth(index)
            .map(|(_, v)| v)
    }

    /// 键为 `tag` 的注释条数
    pub fn query_count(&self, tag: &str) -> usize {
        self.iter_pairs()
            .filter(|(k, _)| k.eq_ignore_ascii_case(tag))
            .count()
    }

    /// 遍历 `(key, value)` 对, 不含 `=` 的条目被跳过
    pub fn iter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.user_comments.iter().filter_map(|c| c.split_once('='))
    }
}

/// 检查头包类型与 "vorbis" 标识
pub(crate) fn check_header_marker(packet: &[u8], expected: u8) -> OvResult<()> {
    if packet.len() < 7 || &packet[1..7] != b"vorbis" {
        return Err(OvError::NotVorbis("缺少 vorbis 标识".into()));
    }
    if packet[0] != expected {
        return Err(OvError::MissingHeaderPacket(format!(
            "期望头包类型 {}, 实际 {}",
            expected, packet[0]
        )));
    }
    Ok(())
}

/// 解析 identification 头包
pub fn parse_identification(packet: &[u8]) -> OvResult<Info> {
    check_header_marker(packet, PACKET_TYPE_IDENT)?;
    if packet.len() < 30 {
        return Err(OvError::CorruptHeader(format!(
            "identification 头包长度不足: {}",
            packet.len(),
        )));
    }

    let mut pos = 7usize;
    let version = read_le_u32(packet, &mut pos)?;
    if version != 0 {
        return Err(OvError::CorruptHeader(format!(
            "Vorbis 版本不支持: {}",
            version,
        )));
    }

    let channels = packet[11];
    if channels == 0 {
        return Err(OvError::CorruptHeader("声道数不能为 0".into()));
    }

    pos = 12;
    let sample_rate = read_le_u32(packet, &mut pos)?;
    if sample_rate == 0 {
        return Err(OvError::CorruptHeader("采样率不能为 0".into()));
    }
    let bitrate_maximum = bitrate_field(read_le_u32(packet, &mut pos)?);
    let bitrate_nominal = bitrate_field(read_le_u32(packet, &mut pos)?);
    let bitrate_minimum = bitrate_field(read_le_u32(packet, &mut pos)?);

    let bs = packet[28];
    let bs0_exp = u32::from(bs & 0x0F);
    let bs1_exp = u32::from(bs >> 4);
    if !(6..=13).contains(&bs0_exp) || !(6..=13).contains(&bs1_exp) || bs0_exp > bs1_exp {
        return Err(OvError::CorruptHeader(format!(
            "blocksize 非法: bs0_exp={}, bs1_exp={}",
            bs0_exp, bs1_exp,
        )));
    }

    if packet[29] & 0x01 == 0 {
        return Err(OvError::CorruptHeader(
            "identification 头包 framing_flag 非法".into(),
        ));
    }

    Ok(Info {
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        blocksize_short: 1usize << bs0_exp,
        blocksize_long: 1usize << bs1_exp,
        setup: None,
    })
}

/// 解析 comment 头包
pub fn parse_comment(packet: &[u8]) -> OvResult<Comment> {
    check_header_marker(packet, PACKET_TYPE_COMMENT)?;
    let corrupt = |e: OvError| match e {
        OvError::CorruptHeader(msg) => OvError::CorruptSecondaryHeader(msg),
        other => other,
    };

    let mut pos = 7usize;
    let vendor = read_string(packet, &mut pos, "vendor 字段").map_err(corrupt)?;

    let comment_count = read_le_u32(packet, &mut pos).map_err(corrupt)? as usize;
    // 每条注释至少占 4 字节长度前缀
    if comment_count > (packet.len() - pos) / 4 {
        return Err(OvError::CorruptSecondaryHeader(format!(
            "注释条数超出包长度: {}",
            comment_count
        )));
    }
    let mut user_comments = Vec::with_capacity(comment_count);
    for _ in 0..comment_count {
        user_comments.push(read_string(packet, &mut pos, "comment 项").map_err(corrupt)?);
    }

    ensure_left(packet, pos, 1, "comment framing_flag").map_err(corrupt)?;
    if packet[pos] & 0x01 == 0 {
        return Err(OvError::CorruptSecondaryHeader(
            "comment 头包 framing_flag 非法".into(),
        ));
    }

    Ok(Comment {
        vendor,
        user_comments,
    })
}

fn bitrate_field(raw: u32) -> Option<i32> {
    let v = raw as i32;
    if v > 0 { Some(v) } else { None }
}

fn read_string(data: &[u8], pos: &mut usize, what: &str) -> OvResult<String> {
    let len = read_le_u32(data, pos)? as usize;
    ensure_left(data, *pos, len, what)?;
    let s = String::from_utf8_lossy(&data[*pos..*pos + len]).into_owned();
    *pos += len;
    Ok(s)
}

fn ensure_left(data: &[u8], pos: usize, need: usize, what: &str) -> OvResult<()> {
    if pos.saturating_add(need) > data.len() {
        return Err(OvError::CorruptHeader(format!(
            "{} 读取越界: pos={}, need={}, len={}",
            what,
            pos,
            need,
            data.len(),
        )));
    }
    Ok(())
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> OvResult<u32> {
    ensure_left(data, *pos, 4, "u32")?;
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(v)
}
