//! Filesystem-backed blob storage for rendered PDFs.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{BlobStore, BlobStoreError, ByteStream};

/// Stores blobs as files under a root directory. Keys are relative paths.
#[derive(Debug)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Obtain the absolute filesystem path for a stored blob.
    pub fn absolute_path(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        self.resolve(key)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        let relative = Path::new(key);
        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
        if key.is_empty()
            || !valid_chars
            || relative.is_absolute()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn save(&self, key: &str, stream: ByteStream) -> Result<String, BlobStoreError> {
        let absolute = self.resolve(key)?;
        let parent = absolute
            .parent()
            .ok_or_else(|| BlobStoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).await?;

        // Written beside the target and renamed into place once complete.
        let staging = parent.join(format!(".{}.partial", Uuid::new_v4()));
        let total_bytes = match stage(&staging, stream).await {
            Ok(total_bytes) => total_bytes,
            Err(err) => {
                let _ = fs::remove_file(&staging).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&staging, &absolute).await {
            let _ = fs::remove_file(&staging).await;
            return Err(BlobStoreError::Io(err));
        }

        info!(
            target = "infra::blobs",
            op = "blob::save",
            result = "stored",
            key,
            size_bytes = total_bytes,
            "Blob stored"
        );
        Ok(key.to_string())
    }
}

/// Fill the staging file and make it durable. The file handle is closed on return.
async fn stage(staging: &Path, stream: ByteStream) -> Result<u64, BlobStoreError> {
    let mut file = fs::File::create(staging).await?;
    let total_bytes = copy_stream(&mut file, stream).await?;
    file.sync_all().await?;
    Ok(total_bytes)
}

async fn copy_stream<W>(writer: &mut W, mut stream: ByteStream) -> Result<u64, BlobStoreError>
where
    W: AsyncWrite + Unpin,
{
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        total_bytes = total_bytes
            .checked_add(chunk.len() as u64)
            .ok_or(BlobStoreError::SizeOverflow)?;
        writer.write_all(&chunk).await?;
    }

    if total_bytes == 0 {
        return Err(BlobStoreError::EmptyPayload);
    }

    writer.flush().await?;
    Ok(total_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tempfile::TempDir;

    #[derive(Default)]
    struct FlushFails(Vec<u8>);

    impl AsyncWrite for FlushFails {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn chunks(parts: Vec<&'static [u8]>) -> ByteStream {
        stream::iter(parts.into_iter().map(|part| Ok(Bytes::from_static(part)))).boxed()
    }

    #[tokio::test]
    async fn streams_chunks_into_place() {
        let dir = TempDir::new().expect("temp dir");
        let store = FilesystemBlobStore::new(dir.path().join("blobs")).expect("store");

        let reference = store
            .save("report-pdfs/a/b.pdf", chunks(vec![&b"%PDF-"[..], &b""[..], &b"1.7"[..]]))
            .await
            .expect("save");

        assert_eq!(reference, "report-pdfs/a/b.pdf");
        let stored = std::fs::read(store.absolute_path(&reference).expect("path")).expect("read");
        assert_eq!(stored, b"%PDF-1.7");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("blobs/report-pdfs/a"))
            .expect("list")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn rejects_traversal_and_absolute_keys() {
        let dir = TempDir::new().expect("temp dir");
        let store = FilesystemBlobStore::new(dir.path().to_path_buf()).expect("store");

        for key in ["../escape.pdf", "/etc/passwd", "./a.pdf", "", "a b.pdf"] {
            let err = store
                .save(key, chunks(vec![&b"x"[..]]))
                .await
                .expect_err("invalid key");
            assert!(matches!(err, BlobStoreError::InvalidKey(_)), "{key}: {err}");
        }
    }

    #[tokio::test]
    async fn empty_and_failing_streams_leave_nothing_behind() {
        let dir = TempDir::new().expect("temp dir");
        let store = FilesystemBlobStore::new(dir.path().to_path_buf()).expect("store");

        let err = store
            .save("x/empty.pdf", chunks(vec![]))
            .await
            .expect_err("empty");
        assert!(matches!(err, BlobStoreError::EmptyPayload));

        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("source went away")),
        ])
        .boxed();
        let err = store.save("x/broken.pdf", failing).await.expect_err("io");
        assert!(matches!(err, BlobStoreError::Io(_)));

        let remaining = std::fs::read_dir(dir.path().join("x"))
            .expect("list")
            .count();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn flush_failure_surfaces_as_io_error() {
        let mut writer = FlushFails::default();

        let err = copy_stream(&mut writer, chunks(vec![&b"%PDF-"[..], &b"1.7"[..]]))
            .await
            .expect_err("flush failure");

        assert!(matches!(err, BlobStoreError::Io(_)), "{err}");
        assert_eq!(writer.0, b"%PDF-1.7");
    }
}
