//! Gzipped tar build context

use std::fs::File;
use std::io::BufReader;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder as TarBuilder, EntryType, Header};

use super::tree::archive_path;
use super::{ContextError, EntryKind, SourceTree};
use crate::recipe::DOCKERFILE_NAME;

/// Pack the generated Dockerfile and every selected file into one archive
///
/// Headers carry no timestamps or ownership so the same tree always yields
/// the same archive. The Dockerfile is the first entry.
pub fn build_context_archive(
    tree: &SourceTree,
    dockerfile: &str,
) -> Result<Vec<u8>, ContextError> {
    let mut archive_buffer = Vec::new();

    {
        let encoder = GzEncoder::new(&mut archive_buffer, Compression::default());
        let mut tar = TarBuilder::new(encoder);
        tar.mode(tar::HeaderMode::Deterministic);

        let dockerfile_bytes = dockerfile.as_bytes();
        let mut header = file_header(0o644, dockerfile_bytes.len() as u64);
        tar.append_data(&mut header, DOCKERFILE_NAME, dockerfile_bytes)?;

        for file in tree.files() {
            let path = archive_path(&file.relative);
            match &file.kind {
                EntryKind::File => {
                    let reader = File::open(&file.absolute)
                        .map(BufReader::new)
                        .map_err(|source| ContextError::Io {
                            path: file.absolute.clone(),
                            source,
                        })?;
                    let mut header = file_header(file.mode, file.size);
                    tar.append_data(&mut header, &path, reader)?;
                }
                EntryKind::Symlink(target) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    normalize(&mut header, 0o777);
                    tar.append_link(&mut header, &path, target)?;
                }
            }
        }

        tar.finish()?;
        let encoder = tar.into_inner()?;
        encoder.finish()?;
    }

    tracing::debug!(
        "Build context: {} files, {} bytes compressed",
        tree.files().len(),
        archive_buffer.len()
    );
    Ok(archive_buffer)
}

fn file_header(mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    normalize(&mut header, mode);
    header
}

fn normalize(header: &mut Header, mode: u32) {
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
}
