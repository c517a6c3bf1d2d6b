//! Dequantization and fixed-point inverse DCT
//!
//! Separable AAN transform with 11 fractional bits. The AAN output scale
//! factors are folded into the quantization table once per frame, so each
//! block costs only the butterflies.

const ISHIFT: u32 = 11;

/// Scale factors `cos(k*pi/16) / 2` (with `1 / (2*sqrt(2))` for k = 0), fixed point
const AAN_SCALE: [i64; 8] = [724, 1004, 946, 851, 724, 569, 392, 200];

const S22: i64 = 1567; // 2 * sin(pi/8)
const C22: i64 = 3784; // 2 * cos(pi/8)
const IC4: i64 = 2896; // sqrt(2)

/// 128.5 in fixed point: level shift plus rounding, added to the DC term.
const DC_OFFSET: i64 = 263_168;

/// Largest DC magnitude an 8-bit image can carry. Anything past it already
/// saturates every sample, and a corrupt predictor could otherwise overflow.
const DC_LIMIT: i32 = 2047;

#[inline]
fn imul(a: i64, b: i64) -> i64 {
    (a * b) >> ISHIFT
}

/// Quantization table with the AAN scale folded in, natural order
#[derive(Clone)]
pub struct ScaledQuant([i64; 64]);

impl ScaledQuant {
    pub fn new(quant: &[u16; 64]) -> Self {
        let mut scaled = [0i64; 64];
        for row in 0..8 {
            for col in 0..8 {
                let i = row * 8 + col;
                scaled[i] = i64::from(quant[i]) * imul(AAN_SCALE[row], AAN_SCALE[col]);
            }
        }
        Self(scaled)
    }
}

/// One 1-D pass over natural-order inputs `s[0..8]`.
fn butterfly(s: [i64; 8]) -> [i64; 8] {
    // Even part takes frequencies 0, 4, 2, 6; odd part 5, 1, 7, 3.
    let [s0, s1, s2, s3, s4, s5, s6, s7] = s;

    let tmp0 = s0 + s4;
    let t1 = s0 - s4;
    let t3 = s2 + s6;
    let tmp2 = imul(s2 - s6, IC4) - t3;
    let tmp3 = tmp0 + t3;
    let t3 = tmp0 - t3;
    let tmp1 = t1 + tmp2;
    let tmp2 = t1 - tmp2;

    let tmp4 = s5 - s3;
    let t7 = s5 + s3;
    let tmp5 = s1 + s7;
    let t6 = s1 - s7;
    let tmp6 = tmp5 - t7;
    let t7 = tmp5 + t7;
    let tmp5 = imul(tmp6, IC4);
    let tmp6 = imul(tmp4 + t6, S22);
    let tmp4 = imul(tmp4, C22 - S22) + tmp6;
    let t6 = imul(t6, C22 + S22) - tmp6 - t7;
    let t5 = tmp5 - t6;
    let t4 = tmp4 - t5;

    [
        tmp3 + t7,
        tmp1 + t6,
        tmp2 + t5,
        t3 + t4,
        t3 - t4,
        tmp2 - t5,
        tmp1 - t6,
        tmp3 - t7,
    ]
}

/// Pass-through when every AC input is zero.
#[inline]
fn pass(s: [i64; 8]) -> [i64; 8] {
    if s[1..].iter().all(|&v| v == 0) {
        [s[0]; 8]
    } else {
        butterfly(s)
    }
}

#[inline]
fn to_sample(v: i64) -> u8 {
    (v >> ISHIFT).clamp(0, 255) as u8
}

/// Dequantize and inverse transform one block into level-shifted samples.
pub fn transform(coefficients: &[i32; 64], quant: &ScaledQuant, has_ac: bool, out: &mut [u8; 64]) {
    let dc = i64::from(coefficients[0].clamp(-DC_LIMIT, DC_LIMIT));
    if !has_ac {
        out.fill(to_sample(DC_OFFSET + dc * quant.0[0]));
        return;
    }

    let mut columns = [0i64; 64];
    for col in 0..8 {
        let mut s: [i64; 8] = std::array::from_fn(|row| {
            let i = row * 8 + col;
            let c = if i == 0 { dc } else { i64::from(coefficients[i]) };
            c * quant.0[i]
        });
        if col == 0 {
            s[0] += DC_OFFSET;
        }
        for (row, v) in pass(s).into_iter().enumerate() {
            columns[row * 8 + col] = v;
        }
    }

    for (row, samples) in out.chunks_exact_mut(8).enumerate() {
        let s: [i64; 8] = std::array::from_fn(|col| columns[row * 8 + col]);
        for (px, v) in samples.iter_mut().zip(pass(s)) {
            *px = to_sample(v);
        }
    }
}
