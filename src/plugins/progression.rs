//! Progression: experience points to level.
//!
//! xp is the single source of truth; level is always recomputed from it.
//! Level `n` starts at `100 * (n - 1)^2` xp.

const XP_PER_LEVEL_UNIT: i64 = 100;

/// Level for an xp total. Negative input is treated as zero.
pub fn level_from_xp(xp: i64) -> i64 {
    let units = xp.max(0) / XP_PER_LEVEL_UNIT;
    1 + isqrt(units)
}

/// Minimum xp at which `level` is reached.
pub fn xp_for_level(level: i64) -> i64 {
    let n = level.max(1) - 1;
    XP_PER_LEVEL_UNIT * n * n
}

/// Remaining xp until the next level.
pub fn xp_to_next_level(xp: i64) -> i64 {
    xp_for_level(level_from_xp(xp) + 1) - xp.max(0)
}

fn isqrt(n: i64) -> i64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as i64;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}
