//! Random photo selection for the `picl` command.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::seq::SliceRandom;

use crate::{errors::Error, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Image files directly inside `dir`, sorted by path.
///
/// Errors with `NotFound` when `dir` is not a directory.
pub fn list_photos(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("{} is not a directory", dir.display())));
    }

    let mut out = Vec::new();
    for ent in fs::read_dir(dir)?.flatten() {
        let path = ent.path();
        if path.is_file() && is_image(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn pick_photo(dir: &Path) -> Result<Option<PathBuf>> {
    let photos = list_photos(dir)?;
    Ok(photos.choose(&mut rand::thread_rng()).cloned())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
