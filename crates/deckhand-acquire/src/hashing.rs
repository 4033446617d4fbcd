use std::{fs, io, path::Path};

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a staged archive, streamed from disk.
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = io::BufReader::new(fs::File::open(path)?);
    let mut digest = Sha256::new();
    io::copy(&mut reader, &mut digest)?;
    Ok(hex_encode(&digest.finalize()))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_known_content() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc")?;
        assert_eq!(
            sha256_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
