//! Host I/O boundary.
//!
//! Compilation units enter a run as [`ClassInput`]s and leave it through an [`OutputMode`].
//! Two inputs are provided:
//!
//! - [`BytesInput`] - class bytes already in memory (archive entries, generated classes)
//! - [`PathInput`] - a class file on disk, memory-mapped with `memmap2`
//!
//! Hosts with other sources (archive entries, URIs) implement [`ClassInput`] themselves.
//!
//! # Keys
//!
//! Every input has a key, the path of the unit relative to its root with `/` separators
//! (`com/example/Holder.class`). Keys identify units in the event log and in outputs, and
//! keys below `META-INF/versions/` mark platform-specific variants, which a run rejects.
//!
//! # Output
//!
//! Rewritten classes are delivered only after every primary input was processed without a
//! hard failure. [`OutputMode::Sink`] hands the bytes to an [`OutputSink`] such as
//! [`CollectingSink`], [`OutputMode::Directory`] writes `<dir>/<key>`, and
//! [`OutputMode::InPlace`] overwrites the file backing each input.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use memmap2::Mmap;

use crate::{Error, Result};

/// A compilation unit supplied by the host.
pub trait ClassInput: Send + Sync + fmt::Debug {
    /// Key of the unit, its path relative to the input root.
    fn key(&self) -> &str;

    /// The class file bytes.
    fn bytes(&self) -> &[u8];

    /// The file backing this input, if any. Required for in-place output.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// A class held in memory.
#[derive(Debug, Clone)]
pub struct BytesInput {
    key: String,
    data: Vec<u8>,
}

impl BytesInput {
    /// Create an input from owned bytes.
    pub fn new(key: impl Into<String>, data: Vec<u8>) -> Self {
        BytesInput {
            key: key.into(),
            data,
        }
    }

    /// Create an input keyed by the conventional path of a class (`a/b/C.class`).
    pub fn for_class(class: &str, data: Vec<u8>) -> Self {
        BytesInput::new(format!("{class}.class"), data)
    }
}

impl ClassInput for BytesInput {
    fn key(&self) -> &str {
        &self.key
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// A class file on disk, mapped into memory when opened.
#[derive(Debug)]
pub struct PathInput {
    key: String,
    path: PathBuf,
    data: Mmap,
}

impl PathInput {
    /// Open and map a class file.
    ///
    /// ## Arguments
    /// * 'key'  - The key of the unit, normally its path relative to the input root
    /// * 'path' - The file to map
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be opened or mapped.
    pub fn open(key: impl Into<String>, path: impl AsRef<Path>) -> Result<PathInput> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        // Safety: the mapping is read-only and inputs are only rewritten after all reads.
        let data = unsafe { Mmap::map(&file) }?;
        Ok(PathInput {
            key: key.into(),
            path,
            data,
        })
    }

    /// Open every `.class` file below a directory, keyed relative to it, in key order.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the directory cannot be walked or a file cannot be
    /// mapped.
    pub fn scan_directory(root: impl AsRef<Path>) -> Result<Vec<PathInput>> {
        let root = root.as_ref();
        let mut files = Vec::new();
        collect_class_files(root, root, &mut files)?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
            .into_iter()
            .map(|(key, path)| PathInput::open(key, path))
            .collect()
    }
}

fn collect_class_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_class_files(root, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::Error(e.to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((key, path));
        }
    }
    Ok(())
}

impl ClassInput for PathInput {
    fn key(&self) -> &str {
        &self.key
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Receives the rewritten bytes of modified primary inputs.
pub trait OutputSink: Send + Sync + fmt::Debug {
    /// Accept the rewritten form of `input`.
    ///
    /// # Errors
    /// Any error aborts delivery of the remaining outputs.
    fn accept(&self, input: &dyn ClassInput, bytes: &[u8]) -> Result<()>;
}

/// An [`OutputSink`] that keeps every output in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    outputs: DashMap<String, Vec<u8>>,
}

impl CollectingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        CollectingSink::default()
    }

    /// Number of collected outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// True if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// The bytes collected for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.outputs.get(key).map(|entry| entry.value().clone())
    }

    /// All outputs, ordered by key.
    #[must_use]
    pub fn outputs(&self) -> BTreeMap<String, Vec<u8>> {
        self.outputs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl OutputSink for CollectingSink {
    fn accept(&self, input: &dyn ClassInput, bytes: &[u8]) -> Result<()> {
        self.outputs.insert(input.key().to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Where rewritten classes go.
#[derive(Debug, Clone)]
pub enum OutputMode {
    /// Hand every output to a sink
    Sink(Arc<dyn OutputSink>),
    /// Write `<dir>/<key>` for every output
    Directory(PathBuf),
    /// Overwrite the file backing each input
    InPlace,
}

impl OutputMode {
    /// Name of the mode, used in conflict errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            OutputMode::Sink(_) => "sink",
            OutputMode::Directory(_) => "output directory",
            OutputMode::InPlace => "in-place",
        }
    }

    /// Deliver the rewritten classes of a run.
    ///
    /// File outputs are first written next to their targets as `<target>.classfold` and only
    /// renamed into place once every file was written. A failed write removes the staged
    /// files and leaves every target untouched.
    ///
    /// # Errors
    /// Returns [`Error::InPlaceUnsupported`] for in-place output of an input without a
    /// backing file, or [`Error::FileError`] if writing fails.
    pub fn deliver(&self, outputs: &[(&dyn ClassInput, &[u8])]) -> Result<()> {
        let targets: Vec<PathBuf> = match self {
            OutputMode::Sink(sink) => {
                for (input, bytes) in outputs {
                    sink.accept(*input, bytes)?;
                }
                return Ok(());
            }
            OutputMode::Directory(dir) => outputs.iter().map(|(input, _)| dir.join(input.key())).collect(),
            OutputMode::InPlace => outputs
                .iter()
                .map(|(input, _)| {
                    input
                        .path()
                        .map(Path::to_path_buf)
                        .ok_or_else(|| Error::InPlaceUnsupported(input.key().to_string()))
                })
                .collect::<Result<_>>()?,
        };

        let mut staged = Vec::with_capacity(targets.len());
        for (target, (_, bytes)) in targets.iter().zip(outputs) {
            match stage(target, bytes) {
                Ok(staging) => staged.push(staging),
                Err(error) => {
                    discard(&staged);
                    return Err(error);
                }
            }
        }
        // An in-place input may still be mapped; renaming replaces the file instead of
        // truncating it.
        for (index, (staging, target)) in staged.iter().zip(&targets).enumerate() {
            if let Err(error) = fs::rename(staging, target) {
                discard(&staged[index..]);
                return Err(error.into());
            }
        }
        Ok(())
    }
}

/// Write `bytes` to the staging file of `target`, creating its directory.
fn stage(target: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut staging = target.as_os_str().to_owned();
    staging.push(".classfold");
    let staging = PathBuf::from(staging);
    fs::write(&staging, bytes)?;
    Ok(staging)
}

fn discard(staged: &[PathBuf]) {
    for path in staged {
        let _ = fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_orders_by_key() {
        let sink = CollectingSink::new();
        sink.accept(&BytesInput::new("b/B.class", vec![]), &[2]).unwrap();
        sink.accept(&BytesInput::new("a/A.class", vec![]), &[1]).unwrap();
        let keys: Vec<_> = sink.outputs().into_keys().collect();
        assert_eq!(keys, ["a/A.class", "b/B.class"]);
        assert_eq!(sink.get("a/A.class"), Some(vec![1]));
    }

    #[test]
    fn directory_scan_and_output() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("demo/inner")).unwrap();
        fs::write(root.path().join("demo/inner/B.class"), [0xCA, 0xFE]).unwrap();
        fs::write(root.path().join("demo/A.class"), [0xCA]).unwrap();
        fs::write(root.path().join("demo/readme.txt"), b"skip").unwrap();

        let inputs = PathInput::scan_directory(root.path()).unwrap();
        let keys: Vec<_> = inputs.iter().map(|i| i.key().to_string()).collect();
        assert_eq!(keys, ["demo/A.class", "demo/inner/B.class"]);
        assert_eq!(inputs[1].bytes(), &[0xCA, 0xFE]);

        let out = tempfile::tempdir().unwrap();
        let nested: &dyn ClassInput = &inputs[1];
        OutputMode::Directory(out.path().to_path_buf())
            .deliver(&[(nested, &[1, 2, 3][..])])
            .unwrap();
        assert_eq!(fs::read(out.path().join("demo/inner/B.class")).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn in_place_requires_a_backing_file() {
        let input = BytesInput::for_class("demo/A", vec![1]);
        assert_eq!(input.key(), "demo/A.class");
        assert!(matches!(
            OutputMode::InPlace.deliver(&[(&input as &dyn ClassInput, &[0][..])]),
            Err(Error::InPlaceUnsupported(_))
        ));
    }

    #[test]
    fn failed_write_leaves_no_partial_output() {
        let out = tempfile::tempdir().unwrap();
        let first: &dyn ClassInput = &BytesInput::for_class("demo/A", vec![]);
        let second: &dyn ClassInput = &BytesInput::for_class("demo/B", vec![]);
        // A directory in place of the second staging file makes its write fail.
        fs::create_dir_all(out.path().join("demo/B.class.classfold")).unwrap();

        let mode = OutputMode::Directory(out.path().to_path_buf());
        let result = mode.deliver(&[(first, &[1][..]), (second, &[2][..])]);
        assert!(matches!(result, Err(Error::FileError(_))));
        assert!(!out.path().join("demo/A.class").exists());
        assert!(!out.path().join("demo/A.class.classfold").exists());
        assert!(!out.path().join("demo/B.class").exists());
    }
}
