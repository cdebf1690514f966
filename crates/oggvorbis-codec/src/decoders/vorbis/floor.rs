//! floor 解码: 每声道的频谱包络曲线.
//!
//! - floor 0: LSP 系数, 按 bark 映射求余弦乘积得到包络
//! - floor 1: 分段线性, 由一组 (X, Y) 点插值后查逆 dB 表
//!
//! 解码分两步: `decode` 从包中读出本声道的 floor 参数 (决定 residue 是否跳过),
//! `render` 在 residue 解码后把曲线展开到频谱长度.

use std::f64::consts::PI;

use oggvorbis_core::{BitCursor, OvError, OvResult, ilog};

use super::codebook::Codebook;

/// floor 1 最多允许的点数
pub(crate) const FLOOR1_MAX_VALUES: usize = 65;

/// floor 1 multiplier 对应的 Y 值范围
const FLOOR1_RANGES: [i32; 4] = [256, 128, 86, 64];

/// floor 配置
#[derive(Debug, Clone)]
pub enum Floor {
    /// LSP floor
    Type0(Floor0),
    /// 分段线性 floor
    Type1(Floor1),
}

/// floor 0 配置
#[derive(Debug, Clone)]
pub struct Floor0 {
    pub order: usize,
    pub rate: u32,
    pub bark_map_size: u32,
    pub amplitude_bits: u32,
    pub amplitude_offset: u32,
    pub books: Vec<usize>,
    /// 短块/长块的 bark 映射, 长度为块大小的一半
    bark_maps: [Vec<i32>; 2],
}

/// floor 1 分区类
#[derive(Debug, Clone)]
pub struct Floor1Class {
    pub dimensions: usize,
    pub subclasses: u32,
    pub masterbook: Option<usize>,
    pub subclass_books: Vec<Option<usize>>,
}

/// floor 1 配置
#[derive(Debug, Clone)]
pub struct Floor1 {
    pub partition_classes: Vec<usize>,
    pub classes: Vec<Floor1Class>,
    pub multiplier: u32,
    pub range_bits: u32,
    pub x_list: Vec<u32>,
    /// 按 X 升序排列的点序号
    sorted: Vec<usize>,
    /// 第 i+2 个点的 (低邻居, 高邻居)
    neighbors: Vec<(usize, usize)>,
}

/// 单个声道的 floor 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum FloorData {
    /// 本声道本块无能量
    Unused,
    Floor0 {
        amplitude: u64,
        coefficients: Vec<f32>,
    },
    Floor1 {
        y: Vec<i32>,
        step2: Vec<bool>,
    },
}

impl FloorData {
    pub fn is_unused(&self) -> bool {
        matches!(self, Self::Unused)
    }
}

impl Floor {
    /// 从 setup 头读取一个 floor 配置
    pub fn read(
        br: &mut BitCursor<'_>,
        codebooks: &[Codebook],
        blocksizes: [usize; 2],
    ) -> OvResult<Self> {
        let floor_type = br.read_bits(16)?;
        match floor_type {
            0 => Ok(Self::Type0(Floor0::read(br, codebooks, blocksizes)?)),
            1 => Ok(Self::Type1(Floor1::read(br, codebooks)?)),
            _ => Err(OvError::CorruptHeader(format!(
                "floor_type 不支持: {}",
                floor_type
            ))),
        }
    }

    /// 从音频包读取本声道的 floor 参数
    ///
    /// 包数据耗尽时本声道视为无能量; 无效码字返回 `BlockDecode`.
    pub fn decode(&self, br: &mut BitCursor<'_>, codebooks: &[Codebook]) -> OvResult<FloorData> {
        let result = match self {
            Self::Type0(f) => f.decode(br, codebooks),
            Self::Type1(f) => f.decode(br, codebooks),
        };
        match result {
            Err(OvError::EndOfPacket) => Ok(FloorData::Unused),
            other => other,
        }
    }

    /// 把曲线展开到 `curve` (长度为当前块大小的一半)
    pub fn render(&self, data: &FloorData, long: bool, curve: &mut [f32]) {
        match (self, data) {
            (Self::Type0(f), FloorData::Floor0 {
                amplitude,
                coefficients,
            }) => f.render(*amplitude, coefficients, long, curve),
            (Self::Type1(f), FloorData::Floor1 { y, step2 }) => f.render(y, step2, curve),
            _ => curve.fill(0.0),
        }
    }
}

fn check_book(index: u32, codebooks: &[Codebook]) -> OvResult<usize> {
    let index = index as usize;
    if index >= codebooks.len() {
        return Err(OvError::CorruptHeader(format!(
            "floor codebook 索引越界: {}",
            index
        )));
    }
    Ok(index)
}

impl Floor0 {
    fn read(
        br: &mut BitCursor<'_>,
        codebooks: &[Codebook],
        blocksizes: [usize; 2],
    ) -> OvResult<Self> {
        let order = br.read_bits(8)? as usize;
        let rate = br.read_bits(16)?;
        let bark_map_size = br.read_bits(16)?;
        let amplitude_bits = br.read_bits(6)?;
        let amplitude_offset = br.read_bits(8)?;
        let book_count = br.read_bits(4)? + 1;
        let mut books = Vec::with_capacity(book_count as usize);
        for _ in 0..book_count {
            let book = check_book(br.read_bits(8)?, codebooks)?;
            if !codebooks[book].has_lookup() {
                return Err(OvError::CorruptHeader(
                    "floor0 codebook 缺少 VQ 查找表".into(),
                ));
            }
            books.push(book);
        }
        if order == 0 || rate == 0 || bark_map_size == 0 {
            return Err(OvError::CorruptHeader(format!(
                "floor0 参数非法: order={}, rate={}, bark_map_size={}",
                order, rate, bark_map_size
            )));
        }

        let bark_maps = [
            bark_map(blocksizes[0] / 2, rate, bark_map_size),
            bark_map(blocksizes[1] / 2, rate, bark_map_size),
        ];
        Ok(Self {
            order,
            rate,
            bark_map_size,
            amplitude_bits,
            amplitude_offset,
            books,
            bark_maps,
        })
    }

    fn decode(&self, br: &mut BitCursor<'_>, codebooks: &[Codebook]) -> OvResult<FloorData> {
        let amplitude = br.read_bits_u64(self.amplitude_bits)?;
        if amplitude == 0 {
            return Ok(FloorData::Unused);
        }

        let book_number = br.read_bits(ilog(self.books.len() as u32))? as usize;
        let book = self
            .books
            .get(book_number)
            .map(|&b| &codebooks[b])
            .ok_or_else(|| {
                OvError::BlockDecode(format!("floor0 book 序号越界: {}", book_number))
            })?;

        let mut coefficients = Vec::with_capacity(self.order + book.dimensions);
        let mut last = 0.0f32;
        while coefficients.len() < self.order {
            for &v in book.decode_vq(br)? {
                coefficients.push(v + last);
            }
            last = coefficients.last().copied().unwrap_or(0.0);
        }
        coefficients.truncate(self.order);

        Ok(FloorData::Floor0 {
            amplitude,
            coefficients,
        })
    }

    fn render(&self, amplitude: u64, coefficients: &[f32], long: bool, curve: &mut [f32]) {
        let map = &self.bark_maps[usize::from(long)];
        let n = curve.len().min(map.len());
        let cos_coef: Vec<f64> = coefficients.iter().map(|&c| f64::from(c).cos()).collect();
        let amp = amplitude as f64;
        let offset = f64::from(self.amplitude_offset);
        let max_amp = ((1u128 << self.amplitude_bits) - 1) as f64;

        let mut i = 0usize;
        while i < n {
            let k = map[i];
            let cw = (PI * f64::from(k) / f64::from(self.bark_map_size)).cos();

            let mut p = 1.0f64;
            let mut q = 1.0f64;
            for (j, &c) in cos_coef.iter().enumerate() {
                let term = 4.0 * (c - cw) * (c - cw);
                if j & 1 == 1 {
                    p *= term;
                } else {
                    q *= term;
                }
            }
            if self.order & 1 == 1 {
                p *= 1.0 - cw * cw;
                q *= 0.25;
            } else {
                p *= (1.0 - cw) / 2.0;
                q *= (1.0 + cw) / 2.0;
            }

            let denom = max_amp * (p + q).sqrt().max(f64::MIN_POSITIVE);
            let value = (0.115_129_25 * (amp * offset / denom - offset)).exp() as f32;
            while i < n && map[i] == k {
                curve[i] = value;
                i += 1;
            }
        }
        curve[n..].fill(0.0);
    }
}

fn bark(x: f64) -> f64 {
    13.1 * (0.000_74 * x).atan() + 2.24 * (0.000_000_018_5 * x * x).atan() + 0.000_1 * x
}

/// 频点 → bark 刻度索引
fn bark_map(n: usize, rate: u32, bark_map_size: u32) -> Vec<i32> {
    let rate = f64::from(rate);
    let size = f64::from(bark_map_size);
    let nyquist = bark(0.5 * rate);
    (0..n)
        .map(|i| {
            let v = (bark(rate * i as f64 / (2.0 * n as f64)) * size / nyquist).floor() as i32;
            v.min(bark_map_size as i32 - 1)
        })
        .collect()
}

impl Floor1 {
    fn read(br: &mut BitCursor<'_>, codebooks: &[Codebook]) -> OvResult<Self> {
        let partitions = br.read_bits(5)?;
        let mut partition_classes = Vec::with_capacity(partitions as usize);
        for _ in 0..partitions {
            partition_classes.push(br.read_bits(4)? as usize);
        }

        let class_count = partition_classes.iter().max().map_or(0, |&m| m + 1);
        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            let dimensions = br.read_bits(3)? as usize + 1;
            let subclasses = br.read_bits(2)?;
            let masterbook = if subclasses > 0 {
                Some(check_book(br.read_bits(8)?, codebooks)?)
            } else {
                None
            };
            let mut subclass_books = Vec::with_capacity(1 << subclasses);
            for _ in 0..(1u32 << subclasses) {
                // 存储值减 1, 0 表示该子类不编码
                let raw = br.read_bits(8)?;
                subclass_books.push(if raw == 0 {
                    None
                } else {
                    Some(check_book(raw - 1, codebooks)?)
                });
            }
            classes.push(Floor1Class {
                dimensions,
                subclasses,
                masterbook,
                subclass_books,
            });
        }

        let multiplier = br.read_bits(2)? + 1;
        let range_bits = br.read_bits(4)?;

        // 前两个点 X=0 和 X=(1<<range_bits) 为隐式常量
        let mut x_list = vec![0u32, 1u32 << range_bits];
        for &class_idx in &partition_classes {
            for _ in 0..classes[class_idx].dimensions {
                x_list.push(br.read_bits(range_bits)?);
            }
            if x_list.len() > FLOOR1_MAX_VALUES {
                return Err(OvError::CorruptHeader(format!(
                    "floor1 点数超过 {}",
                    FLOOR1_MAX_VALUES
                )));
            }
        }

        let mut sorted: Vec<usize> = (0..x_list.len()).collect();
        sorted.sort_by_key(|&i| x_list[i]);
        if sorted.windows(2).any(|w| x_list[w[0]] == x_list[w[1]]) {
            return Err(OvError::CorruptHeader("floor1 X 值重复".into()));
        }

        let neighbors = (2..x_list.len())
            .map(|i| find_neighbors(&x_list, i))
            .collect();

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            range_bits,
            x_list,
            sorted,
            neighbors,
        })
    }

    fn range(&self) -> i32 {
        FLOOR1_RANGES[(self.multiplier - 1) as usize]
    }

    fn decode(&self, br: &mut BitCursor<'_>, codebooks: &[Codebook]) -> OvResult<FloorData> {
        if !br.read_flag()? {
            return Ok(FloorData::Unused);
        }

        let range = self.range();
        let y_bits = ilog((range - 1) as u32);
        let mut y = Vec::with_capacity(self.x_list.len());
        y.push(br.read_bits(y_bits)? as i32);
        y.push(br.read_bits(y_bits)? as i32);

        for &class_idx in &self.partition_classes {
            let class = &self.classes[class_idx];
            let cbits = class.subclasses;
            let csub = (1u32 << cbits) - 1;
            let mut cval = match class.masterbook {
                Some(book) if cbits > 0 => codebooks[book].decode_scalar(br)?,
                _ => 0,
            };
            for _ in 0..class.dimensions {
                let book = class.subclass_books[(cval & csub) as usize];
                cval >>= cbits;
                y.push(match book {
                    Some(b) => codebooks[b].decode_scalar(br)? as i32,
                    None => 0,
                });
            }
        }

        let (final_y, step2) = self.synthesize_amplitudes(&y, range);
        Ok(FloorData::Floor1 { y: final_y, step2 })
    }

    /// 由预测值与残差还原每个点的 Y 值, 同时标记参与绘制的点
    fn synthesize_amplitudes(&self, y: &[i32], range: i32) -> (Vec<i32>, Vec<bool>) {
        let mut step2 = vec![false; y.len()];
        step2[0] = true;
        step2[1] = true;
        let mut final_y = y.to_vec();

        for i in 2..y.len() {
            let (low, high) = self.neighbors[i - 2];
            let predicted = render_point(
                self.x_list[low] as i32,
                final_y[low],
                self.x_list[high] as i32,
                final_y[high],
                self.x_list[i] as i32,
            );
            let val = y[i];
            if val != 0 {
                step2[low] = true;
                step2[high] = true;
                step2[i] = true;
                final_y[i] = dequantize_y(val, predicted, range);
            } else {
                final_y[i] = predicted;
            }
        }

        for v in &mut final_y {
            *v = (*v).clamp(0, range - 1);
        }
        (final_y, step2)
    }

    fn render(&self, y: &[i32], step2: &[bool], curve: &mut [f32]) {
        let n = curve.len();
        let mult = self.multiplier as i32;
        let mut lx = 0usize;
        let mut ly = y[self.sorted[0]] * mult;
        let mut hx = 0usize;
        let mut hy = ly;

        for &idx in &self.sorted[1..] {
            if !step2[idx] {
                continue;
            }
            hy = y[idx] * mult;
            hx = self.x_list[idx] as usize;
            render_line(lx, ly, hx, hy, curve);
            lx = hx;
            ly = hy;
        }
        if hx < n {
            render_line(hx, hy, n, hy, curve);
        }
    }
}

/// 在已解码的点中寻找 X 值最接近的低/高邻居
fn find_neighbors(x_list: &[u32], i: usize) -> (usize, usize) {
    let xi = x_list[i];
    let mut low = 0usize;
    let mut high = 1usize;
    for (j, &xj) in x_list.iter().enumerate().take(i) {
        if xj < xi && xj > x_list[low] {
            low = j;
        }
        if xj > xi && xj < x_list[high] {
            high = j;
        }
    }
    (low, high)
}

fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    if x1 == x0 {
        return y0;
    }
    let dy = y1 - y0;
    let adx = x1 - x0;
    let err = dy.abs() * (x - x0);
    let off = err / adx;
    if dy < 0 { y0 - off } else { y0 + off }
}

fn dequantize_y(val: i32, predicted: i32, range: i32) -> i32 {
    let highroom = range - predicted;
    let lowroom = predicted;
    let room = 2 * highroom.min(lowroom);
    if val < room {
        if val & 1 == 1 {
            predicted - ((val + 1) >> 1)
        } else {
            predicted + (val >> 1)
        }
    } else if highroom > lowroom {
        predicted + (val - lowroom)
    } else {
        predicted - (val - highroom) - 1
    }
}

/// 整数 Bresenham 画线, 写入 `[x0, x1)` 中落在曲线范围内的部分
fn render_line(x0: usize, y0: i32, x1: usize, y1: i32, curve: &mut [f32]) {
    if x1 <= x0 {
        return;
    }
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let ady = dy.abs() - base.abs() * adx;
    let end = x1.min(curve.len());

    let mut y = y0;
    let mut err = 0i32;
    if x0 < end {
        curve[x0] = inverse_db(y);
    }
    for slot in curve.iter_mut().take(end).skip(x0 + 1) {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        *slot = inverse_db(y);
    }
}

fn inverse_db(y: i32) -> f32 {
    FLOOR1_INVERSE_DB_TABLE[y.clamp(0, 255) as usize]
}


#[allow(clippy::excessive_precision)]
static FLOOR1_INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 1.0181521e-04, 1.0843174e-04, 1.1547824e-04,
    1.2298267e-04, 1.3097477e-04, 1.3948625e-04, 1.4855085e-04,
    1.5820453e-04, 1.6848555e-04, 1.7943469e-04, 1.9109536e-04,
    2.0351382e-04, 2.1673929e-04, 2.3082423e-04, 2.4582449e-04,
    2.6179955e-04, 2.7881275e-04, 2.9693158e-04, 3.1622787e-04,
    3.3677814e-04, 3.5866388e-04, 3.8197188e-04, 4.0679456e-04,
    4.3323036e-04, 4.6138411e-04, 4.9136745e-04, 5.2329927e-04,
    5.5730621e-04, 5.9352311e-04, 6.3209358e-04, 6.7317058e-04,
    7.1691700e-04, 7.6350630e-04, 8.1312324e-04, 8.6596457e-04,
    9.2223983e-04, 9.8217216e-04, 1.0459992e-03, 1.1139742e-03,
    1.1863665e-03, 1.2634633e-03, 1.3455702e-03, 1.4330129e-03,
    1.5261382e-03, 1.6253153e-03, 1.7309374e-03, 1.8434235e-03,
    1.9632195e-03, 2.0908006e-03, 2.2266726e-03, 2.3713743e-03,
    2.5254795e-03, 2.6895994e-03, 2.8643847e-03, 3.0505286e-03,
    3.2487691e-03, 3.4598925e-03, 3.6847358e-03, 3.9241906e-03,
    4.1792066e-03, 4.4507950e-03, 4.7400328e-03, 5.0480668e-03,
    5.3761186e-03, 5.7254891e-03, 6.0975636e-03, 6.4938176e-03,
    6.9158225e-03, 7.3652516e-03, 7.8438871e-03, 8.3536271e-03,
    8.8964928e-03, 9.4746370e-03, 1.0090352e-02, 1.0746080e-02,
    1.1444421e-02, 1.2188144e-02, 1.2980198e-02, 1.3823725e-02,
    1.4722068e-02, 1.5678791e-02, 1.6697687e-02, 1.7782797e-02,
    1.8938423e-02, 2.0169149e-02, 2.1479854e-02, 2.2875735e-02,
    2.4362330e-02, 2.5945531e-02, 2.7631618e-02, 2.9427276e-02,
    3.1339626e-02, 3.3376252e-02, 3.5545228e-02, 3.7855157e-02,
    4.0315199e-02, 4.2935108e-02, 4.5725273e-02, 4.8696758e-02,
    5.1861348e-02, 5.5231591e-02, 5.8820850e-02, 6.2643361e-02,
    6.6714279e-02, 7.1049749e-02, 7.5666962e-02, 8.0584227e-02,
    8.5821044e-02, 9.1398179e-02, 9.7337747e-02, 1.0366330e-01,
    1.1039993e-01, 1.1757434e-01, 1.2521498e-01, 1.3335215e-01,
    1.4201813e-01, 1.5124727e-01, 1.6107617e-01, 1.7154380e-01,
    1.8269168e-01, 1.9456402e-01, 2.0720788e-01, 2.2067342e-01,
    2.3501402e-01, 2.5028656e-01, 2.6655159e-01, 2.8387361e-01,
    3.0232132e-01, 3.2196786e-01, 3.4289114e-01, 3.6517414e-01,
    3.8890521e-01, 4.1417847e-01, 4.4109412e-01, 4.6975890e-01,
    5.0028648e-01, 5.3279791e-01, 5.6742212e-01, 6.0429640e-01,
    6.4356699e-01, 6.8538959e-01, 7.2993007e-01, 7.7736504e-01,
    8.2788260e-01, 8.8168307e-01, 9.3897980e-01, 1.0,
];
