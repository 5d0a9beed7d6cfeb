//! Pure check-combination functions and the per-format running check.
//!
//! The combine functions let the writer fold each block's independently
//! computed check value into a whole-stream check without ever re-reading
//! the block's bytes. Both combiners are ports of the classic zlib
//! algorithms (`crc32_combine`/`adler32_combine`); neither `crc32fast` nor
//! `adler32` expose stream combination, so this is the one piece of
//! arithmetic the crate owns outright rather than delegating.

/// CRC-32 polynomial in reflected (LSB-first) form, as used by zlib/gzip.
const CRC32_POLY: u32 = 0xEDB8_8320;

/// Largest prime smaller than 65536; the Adler-32 modulus.
const ADLER_BASE: u32 = 65521;

fn gf2_matrix_times(mat: &[u32; 32], mut vec: u32) -> u32 {
    let mut sum = 0u32;
    let mut i = 0;
    while vec != 0 {
        if vec & 1 != 0 {
            sum ^= mat[i];
        }
        vec >>= 1;
        i += 1;
    }
    sum
}

fn gf2_matrix_square(square: &mut [u32; 32], mat: &[u32; 32]) {
    for n in 0..32 {
        square[n] = gf2_matrix_times(mat, mat[n]);
    }
}

/// Combine two CRC-32 values: given `crc1 = crc32(A)` and `crc2 = crc32(B)`,
/// returns `crc32(A ++ B)` where `len_b == B.len()`.
///
/// Implemented via GF(2)-matrix exponentiation of the "append one zero byte"
/// operator, iterated `log2(len_b)` times -- the standard zlib technique for
/// combining checksums without revisiting the underlying bytes.
pub fn crc32_comb(crc1: u32, crc2: u32, len_b: u64) -> u32 {
    if len_b == 0 {
        return crc1;
    }

    let mut odd = [0u32; 32];
    let mut even = [0u32; 32];

    // Operator for one zero bit.
    odd[0] = CRC32_POLY;
    let mut row = 1u32;
    for n in odd.iter_mut().take(32).skip(1) {
        *n = row;
        row <<= 1;
    }

    // Operator for two zero bits, then four.
    gf2_matrix_square(&mut even, &odd);
    gf2_matrix_square(&mut odd, &even);

    let mut crc1 = crc1;
    let mut len2 = len_b;
    loop {
        // Operator for 2^k zero bytes, k starting at 0 (one zero byte, eight
        // zero bits) and doubling each iteration.
        gf2_matrix_square(&mut even, &odd);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&even, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }

        gf2_matrix_square(&mut odd, &even);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&odd, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }
    }

    crc1 ^ crc2
}

/// Combine two Adler-32 values: given `adler1 = adler32(A)` and
/// `adler2 = adler32(B)`, returns `adler32(A ++ B)` where `len_b == B.len()`.
///
/// Closed-form modular arithmetic over the prime 65521, matching zlib's
/// `adler32_combine`.
pub fn adler32_comb(adler1: u32, adler2: u32, len_b: u64) -> u32 {
    let rem = (len_b % ADLER_BASE as u64) as u32;
    let mut sum1 = adler1 & 0xffff;
    let mut sum2 = (rem.wrapping_mul(sum1)) % ADLER_BASE;
    sum1 = (sum1 + (adler2 & 0xffff) + ADLER_BASE - 1) % ADLER_BASE;
    sum2 = (sum2
        + ((adler1 >> 16) & 0xffff)
        + ((adler2 >> 16) & 0xffff)
        + ADLER_BASE
        - rem)
        % ADLER_BASE;
    sum1 | (sum2 << 16)
}

/// A running check value for one of the two supported algorithms.
///
/// Unifies CRC-32 (`crc32fast`) and Adler-32 (`adler32`) behind a single
/// interface so the writer and the decompression verify path don't need to
/// branch on format by hand.
pub trait RunningCheck {
    /// The check value of the empty string.
    fn seed() -> u32;
    /// Fold `data` into `running`.
    fn update(running: u32, data: &[u8]) -> u32;
    /// Combine two check values given the byte length of the second region.
    fn combine(a: u32, b: u32, len_b: u64) -> u32;
}

/// CRC-32 as used by gzip and zip.
pub struct Crc32Check;

impl RunningCheck for Crc32Check {
    fn seed() -> u32 {
        0
    }

    fn update(running: u32, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new_with_initial(running);
        hasher.update(data);
        hasher.finalize()
    }

    fn combine(a: u32, b: u32, len_b: u64) -> u32 {
        crc32_comb(a, b, len_b)
    }
}

/// Adler-32 as used by zlib.
pub struct Adler32Check;

impl RunningCheck for Adler32Check {
    fn seed() -> u32 {
        1
    }

    fn update(running: u32, data: &[u8]) -> u32 {
        let mut rolling = adler32::RollingAdler32::from_value(running);
        rolling.update_buffer(data);
        rolling.hash()
    }

    fn combine(a: u32, b: u32, len_b: u64) -> u32 {
        adler32_comb(a, b, len_b)
    }
}

/// Compute the check value for `data` under the given format (seed-to-seed,
/// ignoring any running state) -- a convenience for one-shot use in tests and
/// the scenario fixtures.
pub fn whole_stream_check(format: crate::config::Format, data: &[u8]) -> u32 {
    if format.uses_adler32() {
        Adler32Check::update(Adler32Check::seed(), data)
    } else {
        Crc32Check::update(Crc32Check::seed(), data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc32_comb_matches_direct_computation() {
        let a = b"hello, ";
        let b = b"world!";
        let whole = Crc32Check::update(Crc32Check::seed(), &[a.as_slice(), b.as_slice()].concat());
        let ca = Crc32Check::update(Crc32Check::seed(), a);
        let cb = Crc32Check::update(Crc32Check::seed(), b);
        assert_eq!(crc32_comb(ca, cb, b.len() as u64), whole);
    }

    #[test]
    fn adler32_comb_matches_direct_computation() {
        let a = b"the quick brown fox ";
        let b = b"jumps over the lazy dog";
        let whole = Adler32Check::update(Adler32Check::seed(), &[a.as_slice(), b.as_slice()].concat());
        let ca = Adler32Check::update(Adler32Check::seed(), a);
        let cb = Adler32Check::update(Adler32Check::seed(), b);
        assert_eq!(adler32_comb(ca, cb, b.len() as u64), whole);
    }

    #[test]
    fn combine_with_empty_second_region_is_identity() {
        let ca = Crc32Check::update(Crc32Check::seed(), b"abc");
        assert_eq!(crc32_comb(ca, Crc32Check::seed(), 0), ca);
    }

    proptest::proptest! {
        #[test]
        fn crc32_comb_holds_for_arbitrary_split(a in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512),
                                                 b in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
            let whole_bytes: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
            let whole = Crc32Check::update(Crc32Check::seed(), &whole_bytes);
            let ca = Crc32Check::update(Crc32Check::seed(), &a);
            let cb = Crc32Check::update(Crc32Check::seed(), &b);
            proptest::prop_assert_eq!(crc32_comb(ca, cb, b.len() as u64), whole);
        }

        #[test]
        fn adler32_comb_holds_for_arbitrary_split(a in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512),
                                                   b in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
            let whole_bytes: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
            let whole = Adler32Check::update(Adler32Check::seed(), &whole_bytes);
            let ca = Adler32Check::update(Adler32Check::seed(), &a);
            let cb = Adler32Check::update(Adler32Check::seed(), &b);
            proptest::prop_assert_eq!(adler32_comb(ca, cb, b.len() as u64), whole);
        }
    }
}
