//! 按位打包/拆包
//!
//! 字段按高位在前写入，可以跨越字节边界。单个字段超过 64 位、或者要求 `divide`
//! 读出比缓冲区更多的位，属于编程错误，直接 panic。

/// `n` 的低 `bits` 位
pub fn limit(n: u64, bits: u32) -> u64 {
    if bits >= 64 { n } else { n & ((1u64 << bits) - 1) }
}

/// 把 `(value, width)` 依次打包成字节；末尾不满一字节的部分右侧补零。
pub fn spread(fields: &[(u64, u32)]) -> Vec<u8> {
    let total: usize = fields.iter().map(|&(_, w)| w as usize).sum();
    let mut out = vec![0u8; total.div_ceil(8)];
    let mut bit = 0usize;
    for &(value, width) in fields {
        assert!(width <= 64, "bit field wider than 64 bits: {width}");
        debug_assert_eq!(limit(value, width), value, "value {value:#x} overflows {width} bits");
        let v = limit(value, width);
        for i in (0..width).rev() {
            if (v >> i) & 1 == 1 {
                out[bit / 8] |= 0x80 >> (bit % 8);
            }
            bit += 1;
        }
    }
    out
}

/// [`spread`] 的逆操作。声明宽度之后剩余的位按 8 位一组继续返回
/// （剩余不足一字节时最后一组更窄）。
pub fn divide(bytes: &[u8], widths: &[u32]) -> Vec<u64> {
    let available = bytes.len() * 8;
    let declared: usize = widths.iter().map(|&w| w as usize).sum();
    assert!(
        declared <= available,
        "bit widths ({declared} bits) exceed buffer ({available} bits)"
    );

    let mut out = Vec::with_capacity(widths.len() + (available - declared) / 8 + 1);
    let mut bit = 0usize;
    for &width in widths {
        assert!(width <= 64, "bit field wider than 64 bits: {width}");
        out.push(read_bits(bytes, bit, width));
        bit += width as usize;
    }
    while bit < available {
        let width = (available - bit).min(8) as u32;
        out.push(read_bits(bytes, bit, width));
        bit += width as usize;
    }
    out
}

fn read_bits(bytes: &[u8], start: usize, width: u32) -> u64 {
    let mut v = 0u64;
    for bit in start..start + width as usize {
        let b = (bytes[bit / 8] >> (7 - bit % 8)) & 1;
        v = (v << 1) | b as u64;
    }
    v
}

/// 左侧补零到 4 的倍数且不少于 `min` 字节；结果超过 `max` 时 panic。
pub fn pad_to_32bit_words(bytes: &[u8], min: usize, max: usize) -> Vec<u8> {
    let target = bytes.len().next_multiple_of(4).max(min);
    assert!(target <= max, "{} bytes do not fit in {max} after padding", bytes.len());
    let mut out = vec![0u8; target - bytes.len()];
    out.extend_from_slice(bytes);
    out
}
