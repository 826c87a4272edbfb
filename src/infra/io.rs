use anyhow::{Context, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Full-replace write through a same-directory temp file.
///
/// Readers observe either the old or the new content, never a torn write.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions when replacing
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut file = tmp.as_file();
        file.write_all(data)?;
        file.sync_all()?;
    }

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms)?;
    }

    tmp.persist(path).map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        if let Ok(parent_file) = fs::File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}

/// Read a bundle from a file path, `-` for stdin, or the clipboard.
pub fn read_input(source: Option<&Path>, from_clipboard: bool) -> Result<String> {
    if from_clipboard {
        return get_clipboard_content();
    }
    match source {
        Some(p) if p == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read bundle from stdin")?;
            Ok(buf)
        }
        Some(p) => fs::read_to_string(p)
            .with_context(|| format!("Failed to read bundle file: {}", p.display())),
        None => Err(crate::core::error::CliError::InvalidInput(
            "Must specify a bundle file, '-' for stdin, or --from-clipboard".to_string(),
        )
        .into()),
    }
}

/// Get content from system clipboard
fn get_clipboard_content() -> Result<String> {
    use arboard::Clipboard;
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Failed to get text from clipboard")
}
