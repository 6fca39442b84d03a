//! Shared fixtures: fake converter scripts and an in-memory object store.
#![allow(dead_code)]

use async_trait::async_trait;
use clubscribe::{ObjectStore, PipelineConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Write an executable shell script standing in for a converter binary.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Fake resampler: writes a stand-in WAV to its last argument.
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg",
        "for last; do :; done\nprintf 'RIFFfakewav' > \"$last\"",
    )
}

/// Fake speech-to-text converter: writes a timestamped transcript next to
/// its last argument, the way whisper-style tools do.
pub fn fake_whisper(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-whisper",
        concat!(
            "for last; do :; done\n",
            "printf '[00:00:00.000 --> 00:00:02.000] hello club members\\n' > \"$last.txt\"\n",
            "printf '[00:00:02.000 --> 00:00:04.000] meeting adjourned\\n' >> \"$last.txt\"",
        ),
    )
}

/// Fake deck renderer: writes a minimal PNG next to its last argument.
pub fn fake_deck_converter(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-deck2png",
        concat!(
            "for last; do :; done\n",
            "printf '\\211PNG\\r\\n\\032\\n' > \"$last.png\"\n",
            "printf 'not-a-real-raster-but-enough' >> \"$last.png\"",
        ),
    )
}

/// Config pointed at a private temp root with short-but-safe timeouts.
pub fn test_config(temp_root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.limits.temp_root = Some(temp_root.to_path_buf());
    config.limits.convert_timeout_seconds = 20;
    config.limits.upload_timeout_seconds = 10;
    config
}

/// The temp root must hold no residual job directories once a pipeline
/// call returns, whatever the outcome.
pub fn assert_temp_root_empty(root: &Path) {
    if !root.exists() {
        return;
    }
    let leftovers: Vec<PathBuf> = std::fs::read_dir(root)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    assert!(leftovers.is_empty(), "residual files in temp root: {leftovers:?}");
}

/// In-memory object store for staging downloads and thumbnail uploads.
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    fail_uploads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_uploads: false,
        }
    }

    pub fn failing_uploads() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_uploads: true,
        }
    }

    pub fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content_type.to_string(), bytes));
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| anyhow::anyhow!("no such object: {key}"))
    }

    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        if self.fail_uploads {
            anyhow::bail!("storage returned 503");
        }
        self.put(key, content_type, bytes);
        Ok(())
    }
}
