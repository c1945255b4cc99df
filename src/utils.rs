//! # Utility Functions Module
//!
//! Small helpers shared by the command builders and the reporting code.

use std::borrow::Cow;
use std::path::Path;

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// Used to assemble external command lines where literals, numbers and
/// formatted values are mixed:
///
/// ```ignore
/// let args = to_string_vec(["-b:v", &format!("{}k", 420), "-movflags", "+faststart"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds a `Vec<String>` of command arguments from heterogeneous expressions.
///
/// ```ignore
/// let kbps = 420;
/// let args = args!["-maxrate", format!("{}k", kbps)];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

/// File name for log and progress messages, falling back to the full path
pub fn display_name(path: &Path) -> Cow<'_, str> {
    match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => path.to_string_lossy(),
    }
}

/// Rate argument in the `<n>k` form ffmpeg expects
pub fn kbps_arg(kbps: u64) -> String {
    format!("{}k", kbps)
}
