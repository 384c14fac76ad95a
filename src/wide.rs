//! Extended-precision helpers. Squares of 64-bit edges need up to 128 bits, and
//! sums of two or three of them are compared exactly here rather than at each
//! call site.

/// Square of a 64-bit value, exact.
#[inline]
pub fn square(x: u64) -> u128 {
    let x = x as u128;
    x * x
}

/// Sum of two squares, `None` when it does not fit in 128 bits.
#[inline]
pub fn sum_of_squares(a: u64, b: u64) -> Option<u128> {
    square(a).checked_add(square(b))
}

/// Sum of three squares, `None` on overflow.
#[inline]
pub fn sum_of_three_squares(a: u64, b: u64, c: u64) -> Option<u128> {
    sum_of_squares(a, b)?.checked_add(square(c))
}

/// `factor * x^2 >= y^2`, exact. An overflowing left side exceeds any `y^2`.
#[inline]
pub fn scaled_square_reaches(factor: u128, x: u64, y: u64) -> bool {
    square(x)
        .checked_mul(factor)
        .is_none_or(|scaled| scaled >= square(y))
}

/// Floor of the square root.
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // f64 seed, one Newton step, then exact correction by at most a few units.
    let mut r = (n as f64).sqrt() as u128;
    if r > 0 {
        r = (r + n / r) / 2;
    }
    while r.checked_mul(r).is_none_or(|sq| sq > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= n) {
        r += 1;
    }
    r
}

/// Floor of the square root of a 64-bit value.
pub fn isqrt_u64(n: u64) -> u64 {
    isqrt(n as u128) as u64
}

/// Returns the root if `n` is a perfect square.
pub fn exact_sqrt(n: u128) -> Option<u128> {
    // Squares mod 16 are 0, 1, 4 or 9.
    if !matches!(n & 0xf, 0 | 1 | 4 | 9) {
        return None;
    }
    let r = isqrt(n);
    (r * r == n).then_some(r)
}

pub fn is_perfect_square(n: u128) -> bool {
    exact_sqrt(n).is_some()
}
