//! Finds the media helpers when no explicit path is configured.
//!
//! The helpers are .NET builds that live next to the app, either beside the
//! binary or under the working directory, in their usual Release output
//! folder.

use std::path::{Path, PathBuf};

pub const READER_NAME: &str = "media-reader";
pub const CONTROLLER_NAME: &str = "media-controller";

const RELEASE_DIR: &str = "bin/Release/net8.0-windows10.0.19041.0/win-x64";

/// Relative locations tried for a helper, in order of preference.
fn candidates(name: &str) -> Vec<PathBuf> {
    let release = Path::new(name).join(RELEASE_DIR);
    let publish = release.join("publish");

    vec![
        release.join(format!("{name}.exe")),
        release.join(format!("{name}.dll")),
        publish.join(format!("{name}.exe")),
        publish.join(format!("{name}.dll")),
    ]
}

/// Directories searched: the binary's folder, its parent, then the working
/// directory.
pub fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        if let Some(parent) = dir.parent() {
            roots.push(dir.clone());
            roots.push(parent.to_path_buf());
        } else {
            roots.push(dir);
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        if !roots.contains(&cwd) {
            roots.push(cwd);
        }
    }
    roots
}

/// First existing build of helper `name` under `roots`.
pub fn find_helper(roots: &[PathBuf], name: &str) -> Option<PathBuf> {
    let relative = candidates(name);
    roots
        .iter()
        .flat_map(|root| relative.iter().map(move |rel| root.join(rel)))
        .find(|path| path.is_file())
}

pub fn locate_reader() -> Option<PathBuf> {
    find_helper(&search_roots(), READER_NAME)
}

pub fn locate_controller() -> Option<PathBuf> {
    find_helper(&search_roots(), CONTROLLER_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_nothing_built_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_helper(&[dir.path().to_path_buf()], READER_NAME), None);
    }

    #[test]
    fn test_exe_preferred_over_dll() {
        let dir = tempfile::tempdir().unwrap();
        let dll = touch(dir.path(), &format!("media-reader/{RELEASE_DIR}/media-reader.dll"));
        assert_eq!(find_helper(&[dir.path().to_path_buf()], READER_NAME), Some(dll));

        let exe = touch(dir.path(), &format!("media-reader/{RELEASE_DIR}/media-reader.exe"));
        assert_eq!(find_helper(&[dir.path().to_path_buf()], READER_NAME), Some(exe));
    }

    #[test]
    fn test_publish_folder_and_root_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let published = touch(
            second.path(),
            &format!("media-controller/{RELEASE_DIR}/publish/media-controller.dll"),
        );

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(find_helper(&roots, CONTROLLER_NAME), Some(published));

        let preferred = touch(
            first.path(),
            &format!("media-controller/{RELEASE_DIR}/media-controller.exe"),
        );
        assert_eq!(find_helper(&roots, CONTROLLER_NAME), Some(preferred));
    }

    #[test]
    fn test_search_roots_include_working_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert!(search_roots().contains(&cwd));
    }
}
