use std::{
    fs::{self, File},
    io,
    path::Path,
};

use zip::{result::ZipError, ZipArchive};

const ARCHIVE_EXTENSIONS: [&str; 1] = ["zip"];

pub fn is_recognized_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Unpacks every entry of `archive` below `target` and returns the entry count.
///
/// Entries whose names would escape `target` abort the extraction.
pub(crate) fn extract_zip(archive: &Path, target: &Path) -> Result<usize, ZipError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    fs::create_dir_all(target)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or(ZipError::InvalidArchive("entry path escapes the target directory"))?;
        let destination = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&destination)?;
        io::copy(&mut entry, &mut output)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(zip.len())
}
