//! Module naming: the generated module's name comes from its file names.

use std::fmt;
use std::path::Path;

use crate::error::NameError;

/// A validated module name: non-empty, letters, digits and underscores only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: &str) -> Result<Self, NameError> {
        let valid = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if valid {
            Ok(ModuleName(name.to_string()))
        } else {
            Err(NameError::InvalidName(name.to_string()))
        }
    }

    /// `foo.lua` translated to `some/dir/foo.c` is module `foo`.
    pub fn from_paths(input: &Path, output: &Path) -> Result<Self, NameError> {
        let input_stem = stem_with_extension(input, "lua")
            .ok_or_else(|| NameError::InputExtension(input.to_path_buf()))?;
        let output_stem = stem_with_extension(output, "c")
            .ok_or_else(|| NameError::OutputExtension(output.to_path_buf()))?;
        if input_stem != output_stem {
            return Err(NameError::Mismatch {
                input: input_stem,
                output: output_stem,
            });
        }
        ModuleName::new(&input_stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host's module entry symbol.
    pub fn open_symbol(&self) -> String {
        format!("luaopen_{}", self.0)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn stem_with_extension(path: &Path, ext: &str) -> Option<String> {
    if path.extension()?.to_str()? != ext {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}
