use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::InventoryArgs;
use crate::model::{ImageEntry, ImageInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.input_dir)?;

    if args.dry_run {
        info!(
            image_count = manifest.image_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.input_dir.join("image_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote image inventory");
    info!(image_count = manifest.image_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(input_dir: &Path) -> Result<ImageInventoryManifest> {
    let image_paths = discover_images(input_dir)?;

    if image_paths.is_empty() {
        bail!("no images found in {}", input_dir.display());
    }

    let mut images = Vec::with_capacity(image_paths.len());
    for path in image_paths {
        let filename = image_filename(&path)?;
        let bytes = fs::metadata(&path)
            .with_context(|| format!("failed to inspect {}", path.display()))?
            .len();
        let sha256 = sha256_file(&path)?;

        images.push(ImageEntry {
            filename,
            bytes,
            sha256,
        });
    }

    Ok(ImageInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: input_dir.display().to_string(),
        image_count: images.len(),
        images,
    })
}

/// Image files directly under `input_dir`, sorted by path.
pub fn discover_images(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if is_image(&path) {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

pub fn image_filename(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_images_filters_extensions_case_insensitively() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        for name in ["b.JPG", "a.png", "notes.txt", "c.webp", "d.jpeg.bak"] {
            fs::write(dir.path().join(name), b"x").expect("fixture should be written");
        }
        fs::create_dir(dir.path().join("nested.png")).expect("nested dir should be created");

        let names = discover_images(dir.path())
            .expect("directory should be listed")
            .iter()
            .map(|path| image_filename(path).expect("fixture names are UTF-8"))
            .collect::<Vec<String>>();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.webp"]);
    }

    #[test]
    fn build_manifest_hashes_each_image() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("tag.jpg"), b"abc").expect("fixture should be written");

        let manifest = build_manifest(dir.path()).expect("manifest should build");
        assert_eq!(manifest.image_count, 1);
        assert_eq!(manifest.images[0].bytes, 3);
        assert_eq!(
            manifest.images[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn build_manifest_fails_on_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        assert!(build_manifest(dir.path()).is_err());
    }
}
