//! Test harness for isolated test execution.
//!
//! `TestHarness` owns a temporary input directory and an in-memory store.
//! `ScriptedProvider` stands in for a network backend: it replays a fixed
//! script and records which files it was shown, so tests can check what
//! the pipeline handed over and whether scratch files outlived the call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use ledgerscan::extraction::{ExtractionProvider, ProviderError, ProviderStats};
use ledgerscan::{ExtractionPipeline, Jurisdiction, RecordStore};

/// One scripted backend reaction.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this raw reply text.
    Reply(String),
    /// Fail as the service would on a bad key.
    Unauthorized,
    /// Panic inside `execute`.
    Panic(&'static str),
}

pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Step>>,
    /// Used once the script runs out.
    fallback: Step,
    seen: Mutex<Vec<PathBuf>>,
    stats: ProviderStats,
}

impl ScriptedProvider {
    /// Reacts the same way to every call.
    pub fn always(name: &str, step: Step) -> Arc<Self> {
        Self::sequence(name, Vec::new(), step)
    }

    /// Plays `steps` in order, then `fallback` forever.
    pub fn sequence(name: &str, steps: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(steps.into()),
            fallback,
            seen: Mutex::new(Vec::new()),
            stats: ProviderStats::new(),
        })
    }

    /// Paths passed to `execute`, in call order.
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl ExtractionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    fn execute(&self, document_path: &Path, _prompt: &str) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(document_path.to_path_buf());
        assert!(
            document_path.is_file(),
            "provider was given a missing file: {}",
            document_path.display()
        );

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Reply(text) => Ok(text),
            Step::Unauthorized => Err(ProviderError::Authentication("invalid api key".into())),
            Step::Panic(message) => panic!("{}", message),
        }
    }
}

/// Test harness providing an isolated environment for integration tests.
pub struct TestHarness {
    /// Temporary directory holding the input documents.
    temp_dir: TempDir,
    /// Where `write_*` helpers put documents.
    pub input_dir: PathBuf,
    pub store: RecordStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        let store = RecordStore::open_in_memory().expect("Failed to open store");

        Self {
            temp_dir,
            input_dir,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline(&self, provider: Arc<dyn ExtractionProvider>) -> ExtractionPipeline {
        ExtractionPipeline::new(provider, Jurisdiction::Cra)
    }

    /// Writes a small valid image in `format` under the input directory.
    pub fn write_image(&self, name: &str, format: ImageFormat) -> PathBuf {
        let path = self.input_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        RgbImage::from_pixel(16, 16, Rgb([240, 240, 240]))
            .save_with_format(&path, format)
            .expect("Failed to write image");
        path
    }

    pub fn write_png(&self, name: &str) -> PathBuf {
        self.write_image(name, ImageFormat::Png)
    }

    pub fn write_bmp(&self, name: &str) -> PathBuf {
        self.write_image(name, ImageFormat::Bmp)
    }

    pub fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
