use std::io;

use fault_injection::annotate;

pub(crate) fn zstd_error(errno: zstd_safe::ErrorCode) -> io::Error {
    let name = zstd_safe::get_error_name(errno);
    io::Error::new(io::ErrorKind::Other, name.to_string())
}

pub(crate) fn compress(buf: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(zstd_safe::compress_bound(buf.len()));

    zstd_safe::compress(&mut out, buf, level).map_err(|e| annotate!(zstd_error(e)))?;

    Ok(out)
}

pub(crate) fn decompress(buf: &[u8], exact_size: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(exact_size);

    zstd_safe::decompress(&mut out, buf).map_err(|e| annotate!(zstd_error(e)))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressible_data_shrinks() {
        let buf = vec![7_u8; 64 * 1024];
        let compressed = compress(&buf, 3).unwrap();
        assert!(compressed.len() < buf.len());
        assert_eq!(decompress(&compressed, buf.len()).unwrap(), buf);
    }
}
