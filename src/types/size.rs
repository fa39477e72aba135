//! Byte size helpers.

pub const fn kb(n: u64) -> u64 {
    n * 1024
}

pub const fn mb(n: u64) -> u64 {
    kb(n) * 1024
}

pub const fn gb(n: u64) -> u64 {
    mb(n) * 1024
}
