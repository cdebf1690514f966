//! CRC 校验和计算.
//!
//! Ogg 页面使用 CRC-32 (多项式 0x04C11DB7, 初始值 0, 不反射, 无最终异或),
//! 计算时页头中的 CRC 字段视为 0.

/// CRC-32 查找表 (多项式 0x04C11DB7)
const OGG_CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// 在已有 CRC 值上继续累加
pub fn ogg_crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ OGG_CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// 计算 Ogg CRC-32
pub fn ogg_crc32(data: &[u8]) -> u32 {
    ogg_crc32_update(0, data)
}

/// 计算整页 CRC, 页头第 22..26 字节 (CRC 字段) 按 0 参与计算
pub fn ogg_page_crc(page: &[u8]) -> u32 {
    if page.len() < 26 {
        return ogg_crc32(page);
    }
    let crc = ogg_crc32_update(0, &page[..22]);
    let crc = ogg_crc32_update(crc, &[0u8; 4]);
    ogg_crc32_update(crc, &page[26..])
}
