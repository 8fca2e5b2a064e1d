//! On-disk record of a captured vtable
//!
//! One line per slot, in capture order:
//!
//! ```text
//! 0x0\t0x10\tlibfoo.so
//! 0x1\t0x18\tlibfoo.so
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::CapturedTable;
use crate::error::DumpError;

pub const VTABLE_FILE_NAME: &str = "onTransact_vtable.txt";

/// `{target_root}/{device_or_meta_id}/{service_name}/onTransact_vtable.txt`
pub fn output_path(target_root: &Path, device_or_meta_id: &str, service_name: &str) -> PathBuf {
    target_root
        .join(device_or_meta_id)
        .join(service_name)
        .join(VTABLE_FILE_NAME)
}

/// Hex literal for an offset; negative offsets keep their sign
pub fn format_offset(offset: i64) -> String {
    if offset < 0 {
        format!("-{:#x}", offset.unsigned_abs())
    } else {
        format!("{:#x}", offset)
    }
}

pub fn render(table: &CapturedTable) -> String {
    let mut out = String::new();
    for (slot, entry) in table.iter() {
        let _ = writeln!(
            out,
            "{}\t{}\t{}",
            slot,
            format_offset(entry.resolved_offset),
            entry.module
        );
    }
    out
}

/// Write the table, replacing any previous record for the service
pub fn write_capture(path: &Path, table: &CapturedTable) -> Result<(), DumpError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render(table))?;
    tracing::info!(path = %path.display(), slots = table.len(), "wrote vtable dump");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{SlotKey, VtableEntry};
    use tempfile::tempdir;

    fn table(entries: &[(&str, i64, &str)]) -> CapturedTable {
        let mut table = CapturedTable::new();
        for (slot, offset, module) in entries {
            table.insert(
                SlotKey::parse(slot).unwrap(),
                VtableEntry {
                    resolved_offset: *offset,
                    module: module.to_string(),
                },
            );
        }
        table
    }

    #[test]
    fn test_render_format() {
        let t = table(&[("0", 16, "libfoo.so"), ("1", 24, "libfoo.so")]);
        assert_eq!(render(&t), "0x0\t0x10\tlibfoo.so\n0x1\t0x18\tlibfoo.so\n");
    }

    #[test]
    fn test_render_keeps_insertion_order() {
        let t = table(&[
            ("1f", 0x2a0, "libbinder.so"),
            ("2", 0, "libfoo.so"),
            ("a", -16, "libfoo.so"),
        ]);
        let rendered = render(&t);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0x1f\t0x2a0\tlibbinder.so");
        assert_eq!(lines[1], "0x2\t0x0\tlibfoo.so");
        assert_eq!(lines[2], "0xa\t-0x10\tlibfoo.so");
    }

    #[test]
    fn test_render_empty_table() {
        assert_eq!(render(&CapturedTable::new()), "");
    }

    #[test]
    fn test_output_path_layout() {
        let path = output_path(Path::new("/targets"), "pixel7", "media.player");
        assert_eq!(
            path,
            PathBuf::from("/targets/pixel7/media.player/onTransact_vtable.txt")
        );
    }

    #[test]
    fn test_write_capture_creates_dirs_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = output_path(dir.path(), "dev-1", "media.player");

        write_capture(&path, &table(&[("0", 8, "a.so"), ("1", 16, "a.so")])).unwrap();
        write_capture(&path, &table(&[("0", 32, "b.so")])).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0x0\t0x20\tb.so\n");
    }
}
