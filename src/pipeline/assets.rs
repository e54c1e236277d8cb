use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

pub const PALM_DETECTOR_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";
pub const HAND_LANDMARK_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";

/// Local paths of the two models the hand landmarker runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelAssets {
    pub palm_detector: PathBuf,
    pub hand_landmarks: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetLocation {
    Remote(String),
    Local(PathBuf),
}

impl AssetLocation {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            AssetLocation::Remote(location.trim_end_matches('/').to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            AssetLocation::Local(PathBuf::from(path))
        } else {
            AssetLocation::Local(PathBuf::from(location))
        }
    }
}

/// Makes both model files available locally, downloading remote ones into
/// `cache_dir` the first time they are needed.
pub fn ensure_model_assets(location: &str, cache_dir: &Path) -> Result<ModelAssets> {
    let location = AssetLocation::parse(location);
    Ok(ModelAssets {
        palm_detector: ensure_asset(&location, cache_dir, PALM_DETECTOR_FILENAME)?,
        hand_landmarks: ensure_asset(&location, cache_dir, HAND_LANDMARK_FILENAME)?,
    })
}

fn ensure_asset(location: &AssetLocation, cache_dir: &Path, filename: &str) -> Result<PathBuf> {
    match location {
        AssetLocation::Local(dir) => {
            let path = dir.join(filename);
            if path.is_file() {
                Ok(path)
            } else {
                Err(anyhow!("model file {} does not exist", path.display()))
            }
        }
        AssetLocation::Remote(base) => {
            let dest = cache_dir.join(filename);
            if dest.is_file() {
                log::info!("using cached model {}", dest.display());
                return Ok(dest);
            }
            fs::create_dir_all(cache_dir).with_context(|| {
                format!("failed to create model directory {}", cache_dir.display())
            })?;
            download_to_path(&format!("{base}/{filename}"), &dest)?;
            Ok(dest)
        }
    }
}

fn download_to_path(url: &str, dest: &Path) -> Result<()> {
    log::info!("downloading model from {url} to {}", dest.display());

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());
    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("failed while writing model to disk")?;
        progress.inc(read as u64);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    progress.finish_with_message("model ready");
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_location_kinds() {
        assert_eq!(
            AssetLocation::parse("https://example.com/models/"),
            AssetLocation::Remote("https://example.com/models".to_string())
        );
        assert_eq!(
            AssetLocation::parse("file:///opt/models"),
            AssetLocation::Local(PathBuf::from("/opt/models"))
        );
        assert_eq!(
            AssetLocation::parse("models"),
            AssetLocation::Local(PathBuf::from("models"))
        );
    }

    #[test]
    fn local_assets_are_used_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(PALM_DETECTOR_FILENAME), b"palm").expect("write");
        fs::write(dir.path().join(HAND_LANDMARK_FILENAME), b"hand").expect("write");

        let cache = dir.path().join("cache");
        let assets =
            ensure_model_assets(dir.path().to_str().expect("utf8"), &cache).expect("assets");
        assert_eq!(assets.palm_detector, dir.path().join(PALM_DETECTOR_FILENAME));
        assert_eq!(assets.hand_landmarks, dir.path().join(HAND_LANDMARK_FILENAME));
        assert!(!cache.exists());
    }

    #[test]
    fn missing_local_asset_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(PALM_DETECTOR_FILENAME), b"palm").expect("write");
        let err = ensure_model_assets(dir.path().to_str().expect("utf8"), dir.path())
            .expect_err("landmark model missing");
        assert!(format!("{err:#}").contains(HAND_LANDMARK_FILENAME));
    }

    #[test]
    fn cached_remote_assets_skip_the_network() {
        let cache = tempfile::tempdir().expect("tempdir");
        fs::write(cache.path().join(PALM_DETECTOR_FILENAME), b"palm").expect("write");
        fs::write(cache.path().join(HAND_LANDMARK_FILENAME), b"hand").expect("write");

        // Unroutable host: any download attempt would fail the test.
        let assets =
            ensure_model_assets("http://127.0.0.1:9/models", cache.path()).expect("cached");
        assert_eq!(assets.palm_detector, cache.path().join(PALM_DETECTOR_FILENAME));
    }
}
