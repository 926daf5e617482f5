//! Content hashing (MD5, as required by the upload protocol)

use crate::uploader::error::{UploadError, UploadResult};
use md5::{Digest, Md5};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Buffer size for streaming reads (64KB)
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Hash and size of a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub md5: String,
    pub size: u64,
}

/// Lowercase hex MD5 of a byte slice
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Stream a file through MD5, counting its size on the way
pub async fn hash_file(path: &Path) -> UploadResult<FileDigest> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            UploadError::InvalidArgument(format!("local file not found: {}", path.display()))
        }
        _ => UploadError::FileReadError(format!("{}: {}", path.display(), e)),
    })?;
    if !metadata.is_file() {
        return Err(UploadError::InvalidArgument(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigest {
        md5: format!("{:x}", hasher.finalize()),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_hash_file_streams_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let digest = hash_file(&path).await.unwrap();
        assert_eq!(digest.size, data.len() as u64);
        assert_eq!(digest.md5, md5_hex(&data));
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_directory_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(dir.path()).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }
}
