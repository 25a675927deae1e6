//! Output naming and kernel dumps.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::filter::Kernel;

/// Default directory for sharpened images.
pub const DEFAULT_OUT_DIR: &str = "sharpened_images";

/// Write the kernel as a fixed-width table.
///
/// Format:
/// ```text
/// Generated Kernel:
///    0   -1    0
///   -1    4   -1
///    0   -1    0
/// ```
pub fn write_kernel<W: Write>(kernel: &Kernel, writer: &mut W) -> Result<()> {
    writeln!(writer, "Generated Kernel:")?;
    write!(writer, "{}", kernel)?;
    writeln!(writer)?;
    Ok(())
}

/// `<out_dir>/<stem>_sharpened_<stamp><ext>`, keeping the input's extension
/// (`.png` when it has none).
pub fn output_path(input: &Path, out_dir: &Path, stamp: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    out_dir.join(format!("{}_sharpened_{}.{}", stem, stamp, ext))
}

/// `output_path` stamped with the current Unix time in seconds, creating
/// `out_dir` if needed.
pub fn timestamped_output_path(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(output_path(input, out_dir, &secs.to_string()))
}
