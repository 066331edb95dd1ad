// Path resolution
// Walks '/'-separated paths from the root through directory indexes,
// following symbolic links with a bounded depth

use crate::ntfs::file::NtfsFile;
use crate::ntfs::index::{self, FileType};
use crate::ntfs::reparse::read_symlink;
use crate::ntfs::volume::Volume;
use log::debug;
use openntfs_core::NtfsError;
use std::collections::VecDeque;

fn components(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('/').filter(|c| !c.is_empty()).map(str::to_string)
}

/// Resolve absolute `path` starting at `root`, returning the node reached
/// and its type. Links met along the way are followed.
pub fn resolve(volume: &Volume, root: &NtfsFile, path: &str) -> Result<(NtfsFile, FileType), NtfsError> {
    if !path.starts_with('/') {
        debug!("Invalid file name `{}'", path);
        return Err(NtfsError::invalid(format!("path `{}' is not absolute", path)));
    }

    let depth_limit = volume.config().symlink_depth_limit;
    let mut stack: Vec<(NtfsFile, FileType)> = vec![(root.clone(), FileType::Directory)];
    let mut pending: VecDeque<String> = components(path).collect();
    let mut depth = 0u32;

    while let Some(component) = pending.pop_front() {
        let Some((current, current_type)) = stack.last_mut() else {
            return Err(NtfsError::corrupted("path walk lost its root"));
        };
        if *current_type != FileType::Directory {
            debug!("`{}' is not a directory", component);
            return Err(NtfsError::invalid("not a directory"));
        }

        match component.as_str() {
            "." => continue,
            ".." => {
                if stack.len() > 1 {
                    stack.pop();
                }
                continue;
            }
            _ => {}
        }

        let Some(entry) = index::find_entry(volume, current, &component)? else {
            debug!("File `{}' not found", component);
            return Err(NtfsError::not_found(component));
        };

        if entry.file_type == FileType::Symlink {
            depth += 1;
            if depth >= depth_limit {
                debug!("Too deep nesting of symlinks at `{}'", component);
                return Err(NtfsError::invalid("too many levels of symbolic links"));
            }

            let target = read_symlink(volume, entry.mft_record)?;
            if target.starts_with('/') {
                stack.truncate(1);
            }
            let mut redirected: VecDeque<String> = components(&target).collect();
            redirected.extend(pending.drain(..));
            pending = redirected;
            continue;
        }

        stack.push((entry.to_node(), entry.file_type));
    }

    stack
        .pop()
        .ok_or_else(|| NtfsError::corrupted("path walk lost its root"))
}

/// Resolve `path` and require the result to be of type `expected`.
pub fn find_file(volume: &Volume, root: &NtfsFile, path: &str, expected: FileType) -> Result<NtfsFile, NtfsError> {
    let (node, found) = resolve(volume, root, path)?;
    if found != expected {
        debug!("`{}' is {:?}, expected {:?}", path, found, expected);
        return Err(NtfsError::corrupted(match expected {
            FileType::Regular => "not a regular file",
            FileType::Directory => "not a directory",
            FileType::Symlink => "not a symbolic link",
        }));
    }
    Ok(node)
}

/// Collapse `.`, `..` and repeated separators of an absolute path.
/// Climbing above the root is an error.
pub fn relative_to_absolute(path: &str) -> Result<String, NtfsError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    debug!("Invalid path `{}': root has no parent", path);
                    return Err(NtfsError::invalid("root has no parent"));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Split an absolute normalized path into its directory and final name.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("/", path),
    }
}
