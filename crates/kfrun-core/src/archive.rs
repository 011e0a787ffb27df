//! Packaging a compiled graph as a `.tar.gz` archive.
//!
//! The archive holds a single `pipeline.json`. Header metadata is fixed so
//! that identical graphs produce byte-identical archives.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;
use std::path::Path;

use crate::{CompileError, CompiledGraph};

/// Name of the manifest entry inside the archive.
pub const MANIFEST_ENTRY: &str = "pipeline.json";

impl CompiledGraph {
    /// Pack the manifest into a gzip-compressed tar archive.
    pub fn to_archive(&self) -> Result<Vec<u8>, CompileError> {
        let json = self.to_json()?;

        let mut header = tar::Header::new_gnu();
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_data(&mut header, MANIFEST_ENTRY, json.as_bytes())?;
        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }

    /// Read a graph back from an archive produced by [`Self::to_archive`].
    pub fn from_archive(bytes: &[u8]) -> Result<Self, CompileError> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.as_os_str() == MANIFEST_ENTRY {
                let mut json = String::new();
                entry.read_to_string(&mut json)?;
                return Self::from_json(&json);
            }
        }
        Err(CompileError::Archive(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("archive has no {MANIFEST_ENTRY}"),
        )))
    }

    /// Write the archive to a file.
    pub fn write_archive(&self, path: impl AsRef<Path>) -> Result<(), CompileError> {
        std::fs::write(path, self.to_archive()?)?;
        Ok(())
    }

    /// Read an archive from a file.
    pub fn read_archive(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        Self::from_archive(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{compile, Job, PipelineDef, RuntimeConfig};

    use super::*;

    fn graph() -> CompiledGraph {
        let pipeline = PipelineDef::new("p")
            .with_job(Job::new("prep").output("train_path"))
            .with_job(Job::new("train").input_upstream("train_path", "prep"));
        let runtime = RuntimeConfig::new("gcs", "bucket").with_default_image("img");
        compile(&pipeline, &runtime).unwrap()
    }

    #[test]
    fn test_archive_is_deterministic() {
        assert_eq!(graph().to_archive().unwrap(), graph().to_archive().unwrap());
    }

    #[test]
    fn test_archive_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.tar.gz");

        let saved = graph();
        saved.write_archive(&path).unwrap();
        assert_eq!(CompiledGraph::read_archive(&path).unwrap(), saved);
    }

    #[test]
    fn test_archive_without_manifest() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let builder = tar::Builder::new(encoder);
        let bytes = builder.into_inner().unwrap().finish().unwrap();
        assert!(matches!(
            CompiledGraph::from_archive(&bytes),
            Err(CompileError::Archive(_))
        ));
    }
}
