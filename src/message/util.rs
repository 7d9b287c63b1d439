use std::io::prelude::*;
use std::io;

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Decode a little-endian f64 from the front of a byte slice.
///
pub fn f64_from_bytes(bytes: &[u8]) -> f64 {
    let mut buffer = [0; 8];
    buffer.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buffer)
}

/// Read a little-endian u64 out of the given stream.
///
pub fn read_u64<R: Read>(stream: &mut R) -> io::Result<u64> {
    read_bytes_array(stream).map(u64::from_le_bytes)
}

/// Read a little-endian u32 out of the given stream.
///
pub fn read_u32<R: Read>(stream: &mut R) -> io::Result<u32> {
    read_bytes_array(stream).map(u32::from_le_bytes)
}

/// Read the given number of bytes from a stream, into a vec.
///
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
///
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn ceil_log2_rounds_up() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn framed_integers_read_back() {
        let mut bytes = Vec::new();
        bytes.extend(7u64.to_le_bytes());
        bytes.extend(3u32.to_le_bytes());
        bytes.extend([1, 2, 3]);
        let mut stream = &bytes[..];
        assert_eq!(read_u64(&mut stream).unwrap(), 7);
        assert_eq!(read_u32(&mut stream).unwrap(), 3);
        assert_eq!(read_bytes_vec(&mut stream, 3).unwrap(), vec![1, 2, 3]);
        assert!(read_u32(&mut stream).is_err());
    }
}
