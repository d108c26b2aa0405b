use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Read a label file: one class name per line, line index = class index.
///
/// Blank lines are kept so that indices stay aligned with the model outputs.
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    log::debug!("reading labels from {}", path.display());
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to open label file {}", path.display()))?;
    let labels = parse_labels(&raw);
    if labels.is_empty() {
        return Err(anyhow!("label file {} is empty", path.display()));
    }
    log::debug!("read {} labels", labels.len());
    Ok(labels)
}

fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines().map(|line| line.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn one_label_per_line() {
        assert_eq!(parse_labels("cat\ndog\nbird\n"), vec!["cat", "dog", "bird"]);
        assert_eq!(parse_labels("cat\r\ndog"), vec!["cat", "dog"]);
    }

    #[test]
    fn blank_lines_keep_their_index() {
        assert_eq!(parse_labels("background\n\nperson\n"), vec!["background", "", "person"]);
    }

    #[test]
    fn reads_from_disk() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"cat\ndog\nbird\n")?;
        assert_eq!(read_labels(file.path())?, vec!["cat", "dog", "bird"]);
        Ok(())
    }

    #[test]
    fn empty_or_missing_file_is_an_error() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(read_labels(file.path()).is_err());
        assert!(read_labels("/nonexistent/labels.txt").is_err());
        Ok(())
    }
}
