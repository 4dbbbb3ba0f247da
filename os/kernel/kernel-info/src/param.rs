//! # Kernel Parameters
//!
//! Fixed capacities of the kernel's resource pools. Runtime configuration
//! structs default to these values.

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// Max # of blocks any FS op writes.
pub const MAXOPBLOCKS: usize = 10;

/// Size of the disk block cache.
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// Number of buffer cache hash buckets.
///
/// A prime, so that block numbers that are small multiples of each other
/// still spread across buckets.
pub const NBUCKET: usize = 13;

/// Block size in bytes.
pub const BSIZE: usize = 1024;

/// Filler written into every page handed out by the allocator.
pub const ALLOC_FILL: u8 = 0x05;

/// Filler written into every page returned to the allocator.
pub const FREE_FILL: u8 = 0x01;

const fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

const _: () = {
    assert!(NCPU > 0);
    assert!(NBUF > 0);
    assert!(is_prime(NBUCKET));
    assert!(BSIZE.is_power_of_two());
    assert!(ALLOC_FILL != FREE_FILL);
};

#[cfg(test)]
mod tests {
    use super::is_prime;

    #[test]
    fn primality() {
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(is_prime(2));
        assert!(is_prime(13));
        assert!(!is_prime(15));
        assert!(is_prime(31));
    }
}
