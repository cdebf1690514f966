//! 快速 IMDCT.
//!
//! 对 N 点块 (N/2 个频谱系数) 计算
//! `y[i] = Σ X[k] · cos(2π/N · (i + 1/2 + N/4) · (k + 1/2))`, 不带缩放因子.
//!
//! 实现: N/4 点复数 FFT 求 N/2 点 DCT-IV, 再按 IMDCT 对称性展开到 N 点.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, Default)]
struct Complex {
    re: f32,
    im: f32,
}

impl Complex {
    fn from_angle(theta: f64) -> Self {
        Self {
            re: theta.cos() as f32,
            im: theta.sin() as f32,
        }
    }

    fn mul(self, o: Self) -> Self {
        Self {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }

    fn add(self, o: Self) -> Self {
        Self {
            re: self.re + o.re,
            im: self.im + o.im,
        }
    }

    fn sub(self, o: Self) -> Self {
        Self {
            re: self.re - o.re,
            im: self.im - o.im,
        }
    }
}

/// 单一块大小的 IMDCT 上下文, 旋转因子与缓冲区只分配一次
#[derive(Debug, Clone)]
pub struct Imdct {
    n: usize,
    pre: Vec<Complex>,
    post: Vec<Complex>,
    roots: Vec<Complex>,
    bitrev: Vec<usize>,
    buf: Vec<Complex>,
    dct: Vec<f32>,
}

impl Imdct {
    /// 创建 N 点 IMDCT, N 为 2 的幂且不小于 16
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 16);
        let n2 = n / 2;
        let n4 = n / 4;
        let bits = n4.trailing_zeros();

        let pre = (0..n4)
            .map(|k| Complex::from_angle(-PI * (k as f64 + 0.25) / n2 as f64))
            .collect();
        let post = (0..n4)
            .map(|k| Complex::from_angle(-PI * k as f64 / n2 as f64))
            .collect();
        let roots = (0..n4 / 2)
            .map(|j| Complex::from_angle(-2.0 * PI * j as f64 / n4 as f64))
            .collect();
        let bitrev = (0..n4)
            .map(|k| if bits == 0 { 0 } else { k.reverse_bits() >> (usize::BITS - bits) })
            .collect();

        Self {
            n,
            pre,
            post,
            roots,
            bitrev,
            buf: vec![Complex::default(); n4],
            dct: vec![0.0; n2],
        }
    }

    /// 块大小 N
    pub fn size(&self) -> usize {
        self.n
    }

    /// `spectrum` 长度 N/2, `out` 长度 N
    pub fn inverse(&mut self, spectrum: &[f32], out: &mut [f32]) {
        let n2 = self.n / 2;
        let n4 = self.n / 4;
        debug_assert!(spectrum.len() >= n2 && out.len() >= self.n);

        for k in 0..n4 {
            let x = Complex {
                re: spectrum[2 * k],
                im: spectrum[n2 - 1 - 2 * k],
            };
            self.buf[self.bitrev[k]] = x.mul(self.pre[k]);
        }

        self.fft();

        for k in 0..n4 {
            let v = self.buf[k].mul(self.post[k]);
            self.dct[2 * k] = v.re;
            self.dct[n2 - 1 - 2 * k] = -v.im;
        }

        // DCT-IV 输出按奇偶对称展开
        let dct = &self.dct;
        for i in 0..n4 {
            out[i] = dct[i + n4];
        }
        for i in n4..3 * n4 {
            out[i] = -dct[3 * n4 - 1 - i];
        }
        for i in 3 * n4..self.n {
            out[i] = -dct[i - 3 * n4];
        }
    }

    /// 原地 radix-2 FFT, 输入已按位反转顺序排列
    fn fft(&mut self) {
        let len = self.buf.len();
        let mut size = 2usize;
        while size <= len {
            let half = size / 2;
            let step = len / size;
            for start in (0..len).step_by(size) {
                for j in 0..half {
                    let w = self.roots[j * step];
                    let a = self.buf[start + j];
                    let b = self.buf[start + j + half].mul(w);
                    self.buf[start + j] = a.add(b);
                    self.buf[start + j + half] = a.sub(b);
                }
            }
            size *= 2;
        }
    }
}

/// 直接按定义计算的 IMDCT, 用于校验
#[cfg(test)]
pub(crate) fn imdct_reference(spectrum: &[f32], out: &mut [f32]) {
    let n2 = spectrum.len();
    let n = n2 * 2;
    for (i, slot) in out.iter_mut().enumerate().take(n) {
        let mut acc = 0.0f64;
        for (k, &x) in spectrum.iter().enumerate() {
            let angle =
                2.0 * PI / n as f64 * (i as f64 + 0.5 + n as f64 / 4.0) * (k as f64 + 0.5);
            acc += f64::from(x) * angle.cos();
        }
        *slot = acc as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_spectrum(n2: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..n2)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((state >> 16) & 0x7FFF) as f32 / 16384.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_imdct_与参考实现一致() {
        for n in [64usize, 256, 2048] {
            let spectrum = pseudo_random_spectrum(n / 2, n as u32);
            let mut fast = vec![0.0f32; n];
            let mut reference = vec![0.0f32; n];
            let mut imdct = Imdct::new(n);
            imdct.inverse(&spectrum, &mut fast);
            imdct_reference(&spectrum, &mut reference);

            let peak = reference.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let max_err = fast
                .iter()
                .zip(&reference)
                .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
            assert!(
                max_err <= peak * 1e-4 + 1e-4,
                "n={} max_err={} peak={}",
                n,
                max_err,
                peak
            );
        }
    }

    #[test]
    fn test_imdct_零输入() {
        let mut imdct = Imdct::new(64);
        let mut out = vec![1.0f32; 64];
        imdct.inverse(&[0.0; 32], &mut out);
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(imdct.size(), 64);
    }

    #[test]
    fn test_imdct_重复调用结果一致() {
        let spectrum = pseudo_random_spectrum(128, 7);
        let mut imdct = Imdct::new(256);
        let mut a = vec![0.0f32; 256];
        let mut b = vec![0.0f32; 256];
        imdct.inverse(&spectrum, &mut a);
        imdct.inverse(&spectrum, &mut b);
        assert_eq!(a, b);
    }
}
