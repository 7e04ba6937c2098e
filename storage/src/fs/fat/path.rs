use super::{FatError, FatFs, FatResult, fat::ClusterAllocator, inode::Inode};
use crate::{BlockDevice, fs::Path};

/// Longest path component kept by the tokenizer, in bytes.
///
/// Longer components are truncated, which is enough for any 8.3 name.
pub const MAX_NAME_LEN: usize = 12;

/// Splits the next component off `path`.
///
/// Separators around the component are skipped, so that the remainder is empty
/// exactly when the component was the last one.
///
/// ```
/// # use storage::fs::fat::path::split_next;
/// assert_eq!(split_next("///a//bb"), Some(("a", "bb")));
/// assert_eq!(split_next("a"), Some(("a", "")));
/// assert_eq!(split_next("////"), None);
/// ```
#[must_use]
pub fn split_next(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return None;
    }

    let end = path.find('/').unwrap_or(path.len());
    let (name, rest) = path.split_at(end);

    Some((truncate(name, MAX_NAME_LEN), rest.trim_start_matches('/')))
}

fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a path walk.
pub struct Resolution<'p> {
    /// Inode the walk stopped at.
    pub inode: Inode,
    /// Directory `inode` was found in, if it is not the root.
    pub parent: Option<Inode>,
    /// Last component of the path: the name of `inode`, or when resolving a parent,
    /// the name left to be looked up in `inode`.
    pub name: Option<&'p str>,
}

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    /// Walks an absolute path from the root directory.
    ///
    /// With `want_parent`, the walk stops before the last component.
    pub fn resolve_path<'p>(&mut self, path: &'p str, want_parent: bool) -> FatResult<Resolution<'p>> {
        if !path.starts_with('/') {
            return Err(FatError::InvalidPath);
        }

        let mut resolution = Resolution {
            inode: self.root()?,
            parent: None,
            name: None,
        };
        let mut rest = path;

        while let Some((name, next)) = split_next(rest) {
            if want_parent && next.is_empty() {
                resolution.name = Some(name);
                return Ok(resolution);
            }

            let child = self.lookup(&resolution.inode, name)?;
            resolution = Resolution {
                inode: child,
                parent: Some(resolution.inode),
                name: Some(name),
            };
            rest = next;
        }

        if want_parent {
            // The root has no parent
            return Err(FatError::InvalidPath);
        }
        Ok(resolution)
    }

    /// Returns the inode at `path`.
    pub fn resolve(&mut self, path: Path) -> FatResult<Inode> {
        self.resolve_path(path.as_str(), false)
            .map(|resolution| resolution.inode)
    }

    /// Returns the directory holding the last component of `path`, and that component.
    ///
    /// The last component does not need to exist.
    pub fn resolve_parent<'p>(&mut self, path: Path<'p>) -> FatResult<(Inode, &'p str)> {
        let resolution = self.resolve_path(path.as_str(), true)?;
        let name = resolution.name.ok_or(FatError::InvalidPath)?;
        Ok((resolution.inode, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_next() {
        assert_eq!(split_next("a/bb/c"), Some(("a", "bb/c")));
        assert_eq!(split_next("///a//bb"), Some(("a", "bb")));
        assert_eq!(split_next("/a/"), Some(("a", "")));
        assert_eq!(split_next("a"), Some(("a", "")));
        assert_eq!(split_next(""), None);
        assert_eq!(split_next("////"), None);
    }

    #[test]
    fn test_split_next_truncates() {
        assert_eq!(
            split_next("/ABCDEFGH.TXTXYZ/B"),
            Some(("ABCDEFGH.TXT", "B"))
        );
        // Never cut inside a character
        let (name, _) = split_next("/ABCDEFGHIJK\u{E9}").unwrap();
        assert_eq!(name, "ABCDEFGHIJK");
    }
}
