//! Output comparison
//!
//! Literal output expectations are checked through the `Differ`
//! capability so the comparison backend can be swapped (an external diff
//! tool, a custom renderer) without touching the runner. The built-in
//! implementation produces a unified diff and treats trailing carriage
//! returns as insignificant, which keeps expectations portable across
//! line-ending conventions.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use similar::TextDiff;

pub trait Differ {
    /// Compare two text files line-wise, ignoring trailing CRs. Returns
    /// true when they are equal; otherwise writes a unified-diff-shaped
    /// delta to `out` and returns false.
    fn compare(&self, expected: &Path, actual: &Path, out: &mut dyn Write) -> io::Result<bool>;
}

/// The built-in line differ
#[derive(Debug, Default, Clone, Copy)]
pub struct LineDiffer;

impl Differ for LineDiffer {
    fn compare(&self, expected: &Path, actual: &Path, out: &mut dyn Write) -> io::Result<bool> {
        let exp = read_normalized(expected)?;
        let act = read_normalized(actual)?;
        if exp == act {
            return Ok(true);
        }
        let exp_name = expected.display().to_string();
        let act_name = actual.display().to_string();
        let diff = TextDiff::from_lines(&exp, &act);
        let udiff = diff
            .unified_diff()
            .header(&exp_name, &act_name)
            .to_string();
        out.write_all(udiff.as_bytes())?;
        Ok(false)
    }
}

fn read_normalized(p: &Path) -> io::Result<String> {
    let bytes = fs::read(p)?;
    Ok(String::from_utf8_lossy(&bytes).replace("\r\n", "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_modulo_trailing_cr() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "one\r\ntwo\r\n")?;
        fs::write(&b, "one\ntwo\n")?;
        let mut out = Vec::new();
        assert!(LineDiffer.compare(&a, &b, &mut out)?);
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn test_difference_produces_unified_diff() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "one\ntwo\n")?;
        fs::write(&b, "one\nthree\n")?;
        let mut out = Vec::new();
        assert!(!LineDiffer.compare(&a, &b, &mut out)?);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("-two"), "{text}");
        assert!(text.contains("+three"), "{text}");
        Ok(())
    }
}
