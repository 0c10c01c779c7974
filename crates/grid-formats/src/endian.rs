//! Typed binary decoding with an explicit byte-swap decision.
//!
//! The historical grid formats come in both byte orders; each file's
//! header records (implicitly or explicitly) whether its fields must be
//! swapped relative to the host. The decision is made once per file and
//! passed to every decode call, so raw buffers are never mutated in
//! place.

/// Whether the host stores the least significant byte first.
pub const HOST_IS_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

/// Decode an `f64` at `offset`, swapping byte order if `swap` is set.
pub fn read_f64(buf: &[u8], offset: usize, swap: bool) -> f64 {
    let mut raw: [u8; 8] = buf[offset..offset + 8].try_into().unwrap();
    if swap {
        raw.reverse();
    }
    f64::from_ne_bytes(raw)
}

/// Decode an `f32` at `offset`, swapping byte order if `swap` is set.
pub fn read_f32(buf: &[u8], offset: usize, swap: bool) -> f32 {
    let mut raw: [u8; 4] = buf[offset..offset + 4].try_into().unwrap();
    if swap {
        raw.reverse();
    }
    f32::from_ne_bytes(raw)
}

/// Decode an `i32` at `offset`, swapping byte order if `swap` is set.
pub fn read_i32(buf: &[u8], offset: usize, swap: bool) -> i32 {
    let mut raw: [u8; 4] = buf[offset..offset + 4].try_into().unwrap();
    if swap {
        raw.reverse();
    }
    i32::from_ne_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_f64_native_and_swapped() {
        let value = 123.456_f64;
        let native = value.to_ne_bytes();
        let mut swapped = native;
        swapped.reverse();

        assert_eq!(read_f64(&native, 0, false), value);
        assert_eq!(read_f64(&swapped, 0, true), value);
    }

    #[test]
    fn test_read_i32_at_offset() {
        let mut buf = vec![0u8; 12];
        buf[4..8].copy_from_slice(&42i32.to_ne_bytes());
        assert_eq!(read_i32(&buf, 4, false), 42);

        let mut be = 42i32.to_be_bytes();
        if HOST_IS_LITTLE_ENDIAN {
            assert_eq!(read_i32(&be, 0, true), 42);
            be.reverse();
            assert_eq!(read_i32(&be, 0, false), 42);
        }
    }
}
